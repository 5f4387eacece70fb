use std::path::PathBuf;

use crate::value::PathError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The cookie file could not be opened or read.
    #[error("cookie source {path} is unavailable: {source}")]
    CookieSourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cookie line could not be parsed. The whole source is rejected.
    #[error("malformed cookie data on line {line}: {reason}")]
    MalformedCookieData { line: usize, reason: String },

    /// None of the identity cookies are present in the source.
    #[error("no session cookie found (expected one of: {})", .expected.join(", "))]
    MissingSessionCredential { expected: Vec<String> },

    /// The response no longer matches the structure the decoder relies on.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The response parsed but the session behind it is not signed in.
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// One shared-location entry could not be decoded.
    #[error("invalid person data: {0}")]
    InvalidPersonData(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn envelope(e: PathError) -> Self {
        Self::InvalidEnvelope(e.to_string())
    }

    pub(crate) fn person(e: PathError) -> Self {
        Self::InvalidPersonData(e.to_string())
    }
}
