use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use url::Url;

use crate::config::Config;
use crate::cookie::{Cookie, has_identity_cookie, parse_cookie_source};
use crate::error::Error;

/// An HTTP client carrying a browser's cookies.
///
/// Built only from a cookie source that contains at least one identity
/// cookie. Whether the cookies are still signed in is not known until the
/// first read (or an explicit [`probe`](Session::probe)).
pub struct Session {
    cookies: Vec<Cookie>,
    jar: Arc<Jar>,
    http: reqwest::Client,
}

impl Session {
    /// Load a Netscape-format cookie file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CookieSourceUnavailable`] if the file cannot be read,
    /// plus everything [`from_cookie_text`](Self::from_cookie_text) returns.
    pub fn load(path: impl AsRef<Path>, config: &Config) -> Result<Self, Error> {
        let path = path.as_ref();
        let unavailable = |source| Error::CookieSourceUnavailable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(unavailable)?;
        Self::from_reader(BufReader::new(file), config).map_err(|e| match e {
            Error::CookieSourceUnavailable { source, .. } => unavailable(source),
            other => other,
        })
    }

    /// Load cookies from any reader.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CookieSourceUnavailable`] on I/O failure and
    /// [`Error::MalformedCookieData`] if the content is not UTF-8 text (the
    /// legacy pickled jar format is not supported).
    pub fn from_reader(mut reader: impl Read, config: &Config) -> Result<Self, Error> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|source| Error::CookieSourceUnavailable {
                path: "<reader>".into(),
                source,
            })?;
        let text = String::from_utf8(bytes).map_err(|e| Error::MalformedCookieData {
            line: 0,
            reason: format!("cookie source is not text: {e}"),
        })?;
        Self::from_cookie_text(&text, config)
    }

    /// Parse Netscape-format cookie text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCookieData`] if any line is malformed and
    /// [`Error::MissingSessionCredential`] if no identity cookie is present.
    pub fn from_cookie_text(text: &str, config: &Config) -> Result<Self, Error> {
        Self::from_cookies(parse_cookie_source(text)?, config)
    }

    /// Build a session from already parsed cookies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSessionCredential`] if no identity cookie is
    /// present, [`Error::MalformedCookieData`] if a cookie's domain and path do
    /// not form a URL, and [`Error::Http`] if the client cannot be built.
    pub fn from_cookies(cookies: Vec<Cookie>, config: &Config) -> Result<Self, Error> {
        if !has_identity_cookie(&cookies, config.identity_cookies()) {
            return Err(Error::MissingSessionCredential {
                expected: config.identity_cookies().to_vec(),
            });
        }

        let jar = Arc::new(Jar::default());
        for (index, cookie) in cookies.iter().enumerate() {
            let url = cookie_url(cookie).map_err(|reason| Error::MalformedCookieData {
                line: index + 1,
                reason,
            })?;
            jar.add_cookie_str(&cookie.to_set_cookie(), &url);
        }

        let http = build_client(config, jar.clone())?;
        tracing::debug!(cookies = cookies.len(), "Session built from cookie source");

        Ok(Self { cookies, jar, http })
    }

    /// Cookies installed in this session's jar, in source order.
    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    #[must_use]
    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Checks that the cookies still belong to a signed-in account by
    /// loading the accounts page and looking for the sign-in form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSession`] if the response is the sign-in page,
    /// or [`Error::Http`] on network failure.
    pub async fn probe(&self, config: &Config) -> Result<(), Error> {
        let response = self.http.get(config.probe_url().clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if body.contains(config.signed_out_marker()) {
            tracing::warn!(status = status.as_u16(), "Liveness probe landed on sign-in page");
            return Err(Error::InvalidSession(
                "the cookies do not provide a signed-in session".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

fn cookie_url(cookie: &Cookie) -> Result<Url, String> {
    let path = if cookie.path.starts_with('/') {
        cookie.path.clone()
    } else {
        format!("/{}", cookie.path)
    };
    Url::parse(&format!("https://{}{path}", cookie.host()))
        .map_err(|e| format!("domain {:?} does not form a URL: {e}", cookie.domain))
}

fn build_client(config: &Config, jar: Arc<Jar>) -> Result<reqwest::Client, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(config.user_agent())
            .map_err(|e| Error::Config(format!("user agent: {e}")))?,
    );
    headers.insert(
        REFERER,
        HeaderValue::from_str(config.referer())
            .map_err(|e| Error::Config(format!("referer: {e}")))?,
    );

    reqwest::Client::builder()
        .cookie_provider(jar)
        .default_headers(headers)
        .timeout(config.timeout())
        .build()
        .map_err(Into::into)
}
