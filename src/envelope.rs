use serde_json::Value;

use crate::error::Error;
use crate::value;

/// Position of the shared-location entry list.
pub(crate) const SHARED_ENTRIES: usize = 0;
/// Position of the authentication-state marker.
pub(crate) const AUTH_MARKER: usize = 6;
/// Position of the signed-in account's own data.
pub(crate) const ACCOUNT: usize = 9;

/// The top-level JSON array returned by the read endpoint.
///
/// Nothing in it is named; see [`crate::value`] for guarded access.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEnvelope {
    value: Value,
}

impl RawEnvelope {
    /// The stand-in used when the service answers with a non-success status.
    /// It decodes to no people.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            value: Value::Array(Vec::new()),
        }
    }

    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self { value }
    }

    /// Strips the hijack prefix from a response body and parses the rest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvelope`] if the prefix is absent, the
    /// remainder is not JSON, or the JSON is not an array.
    pub fn parse(body: &str, hijack_prefix: &str) -> Result<Self, Error> {
        let json = body
            .trim_start()
            .strip_prefix(hijack_prefix)
            .ok_or_else(|| {
                Error::InvalidEnvelope(format!("response does not start with {hijack_prefix:?}"))
            })?;
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::InvalidEnvelope(format!("response is not JSON: {e}")))?;
        if !value.is_array() {
            return Err(Error::InvalidEnvelope("top-level value is not an array".into()));
        }
        Ok(Self { value })
    }

    /// `true` for the non-success stand-in (or any envelope with no positions).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.as_array().is_none_or(Vec::is_empty)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// The shared-location entries. A `null` or absent list is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvelope`] if the list position holds something
    /// other than an array.
    pub fn shared_entries(&self) -> Result<&[Value], Error> {
        match value::array_at(&self.value, &[SHARED_ENTRIES]) {
            Ok(entries) => Ok(entries),
            Err(value::PathError::Missing { .. }) => Ok(&[]),
            Err(e) => Err(Error::envelope(e)),
        }
    }

    /// Reads the authentication marker.
    ///
    /// Returns `Ok(false)` when the marker is present but `null`, empty, or
    /// equal to `unauthenticated_marker`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEnvelope`] if the marker position does not exist.
    pub fn validate_authenticated(&self, unauthenticated_marker: &str) -> Result<bool, Error> {
        let items = self
            .value
            .as_array()
            .ok_or_else(|| Error::InvalidEnvelope("top-level value is not an array".into()))?;
        let marker = items.get(AUTH_MARKER).ok_or_else(|| {
            Error::InvalidEnvelope(format!(
                "authentication marker at position {AUTH_MARKER} is absent ({} positions)",
                items.len()
            ))
        })?;
        Ok(match marker {
            Value::Null => false,
            Value::String(s) => !s.is_empty() && s != unauthenticated_marker,
            Value::Array(a) => !a.is_empty(),
            _ => true,
        })
    }
}
