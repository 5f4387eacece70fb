use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Cookie expiry as written in a Netscape cookie file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// `0`: the cookie lives for the browser session only.
    Session,
    /// Absolute expiry in epoch seconds.
    At(i64),
}

impl Expiry {
    #[must_use]
    pub fn as_unix_seconds(&self) -> Option<i64> {
        match self {
            Self::Session => None,
            Self::At(secs) => Some(*secs),
        }
    }
}

/// One line of a Netscape-format cookie file:
/// `domain include_subdomains path secure expiry name value [rest...]`.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Cookie {
    pub domain: String,
    /// `TRUE` in the second column. A cookie without it is host-only.
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub expiry: Expiry,
    pub name: String,
    pub value: String,
    /// Any columns after the value, joined by single spaces.
    pub rest: Option<String>,
}

impl Cookie {
    #[must_use]
    pub fn host_only(&self) -> bool {
        !self.include_subdomains
    }

    /// Domain without the leading dot some exporters add.
    #[must_use]
    pub fn host(&self) -> &str {
        self.domain.trim_start_matches('.')
    }

    /// Renders the cookie as a `Set-Cookie` header value for installing into a jar.
    pub(crate) fn to_set_cookie(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            header.push_str("; Domain=");
            header.push_str(self.host());
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

// Values are credentials: keep them out of logs.
impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("domain", &self.domain)
            .field("include_subdomains", &self.include_subdomains)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expiry", &self.expiry)
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl FromStr for Cookie {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            return Err(format!("expected at least 7 fields, found {}", fields.len()));
        }

        let expiry = match fields[4].parse::<i64>() {
            Ok(0) => Expiry::Session,
            Ok(secs) => Expiry::At(secs),
            Err(_) => return Err(format!("expiry {:?} is not an integer", fields[4])),
        };

        let rest = (fields.len() > 7).then(|| fields[7..].join(" "));

        Ok(Self {
            domain: fields[0].to_string(),
            include_subdomains: parse_flag("subdomain flag", fields[1])?,
            path: fields[2].to_string(),
            secure: parse_flag("secure flag", fields[3])?,
            expiry,
            name: fields[5].to_string(),
            value: fields[6].to_string(),
            rest,
        })
    }
}

fn parse_flag(what: &str, raw: &str) -> Result<bool, String> {
    if raw.eq_ignore_ascii_case("TRUE") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("FALSE") {
        Ok(false)
    } else {
        Err(format!("{what} {raw:?} is neither TRUE nor FALSE"))
    }
}

/// Parses a whole cookie file. Blank lines and `#` comments are skipped.
///
/// Any malformed line rejects the entire source; a partial jar is never returned.
///
/// # Errors
///
/// Returns [`Error::MalformedCookieData`] with the 1-based line number of the
/// first line that fails to parse.
pub fn parse_cookie_source(text: &str) -> Result<Vec<Cookie>, Error> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| {
            line.parse::<Cookie>()
                .map_err(|reason| Error::MalformedCookieData {
                    line: index + 1,
                    reason,
                })
        })
        .collect()
}

/// Returns `true` if any cookie carries one of the identity names.
#[must_use]
pub fn has_identity_cookie(cookies: &[Cookie], identity_names: &[String]) -> bool {
    cookies
        .iter()
        .any(|c| identity_names.iter().any(|name| *name == c.name))
}
