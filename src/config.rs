use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Literal prepended to every read response to defeat script-tag inclusion.
pub const DEFAULT_HIJACK_PREFIX: &str = ")]}'";

/// Marker the service puts in the authentication slot for signed-out sessions.
pub const DEFAULT_UNAUTHENTICATED_MARKER: &str = "GgA=";

/// Cookies whose presence marks a jar as belonging to a signed-in account.
pub const DEFAULT_IDENTITY_COOKIES: [&str; 2] = ["__Secure-1PSID", "__Secure-3PSID"];

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";
const DEFAULT_SIGNED_OUT_MARKER: &str = "Sign in - Google Accounts";

// Map rendering parameters. The service refuses the read without them but
// their content is irrelevant to location sharing.
const DEFAULT_PB: &str = "!1m7!8m6!1m3!1i14!2i8413!3i5385!2i6!3x4095\
    !2m3!1e0!2sm!3i407105169!3m7!2sen!5e1105!12m4\
    !1e68!2m2!1sset!2sRoadmap!4e1!5m4!1e4!8m2!1e0!\
    1e1!6m9!1e12!2i2!26m1!4b1!30m1!\
    1f1.3953487873077393!39b1!44e1!50e0!23i4111425";

/// Location-sharing client configuration.
///
/// Every field has a working default; the service contract is undocumented,
/// so the endpoint, markers and cookie names are all overridable without a
/// code change.
///
/// ```rust,ignore
/// use location_sharing::Config;
///
/// let config = Config::new()
///     .with_cache_ttl(std::time::Duration::from_secs(60))
///     .with_unauthenticated_marker("GgA=");
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    pub(crate) read_url: Url,
    pub(crate) read_params: Vec<(String, String)>,
    pub(crate) probe_url: Url,
    pub(crate) logout_url: Url,
    pub(crate) signed_out_marker: String,
    pub(crate) hijack_prefix: String,
    pub(crate) unauthenticated_marker: String,
    pub(crate) identity_cookies: Vec<String>,
    pub(crate) user_agent: String,
    pub(crate) referer: String,
    pub(crate) timeout: Duration,
    pub(crate) cache_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a configuration pointing at the live service.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_url: "https://www.google.com/maps/rpc/locationsharing/read"
                .parse()
                .expect("valid default URL"),
            read_params: vec![
                ("authuser".into(), "0".into()),
                ("hl".into(), "en".into()),
                ("gl".into(), "us".into()),
                ("pb".into(), DEFAULT_PB.into()),
            ],
            probe_url: "https://accounts.google.com"
                .parse()
                .expect("valid default URL"),
            logout_url: "https://accounts.google.com/Logout"
                .parse()
                .expect("valid default URL"),
            signed_out_marker: DEFAULT_SIGNED_OUT_MARKER.into(),
            hijack_prefix: DEFAULT_HIJACK_PREFIX.into(),
            unauthenticated_marker: DEFAULT_UNAUTHENTICATED_MARKER.into(),
            identity_cookies: DEFAULT_IDENTITY_COOKIES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            user_agent: DEFAULT_USER_AGENT.into(),
            referer: "https://www.google.com".into(),
            timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(30),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Optional env vars
    /// - `LOCATION_SHARING_READ_URL`: Override the location read endpoint
    /// - `LOCATION_SHARING_PROBE_URL`: Override the session liveness probe
    /// - `LOCATION_SHARING_LOGOUT_URL`: Override the logout endpoint
    /// - `LOCATION_SHARING_UNAUTHENTICATED_MARKER`: Signed-out marker value
    /// - `LOCATION_SHARING_IDENTITY_COOKIES`: Comma-separated cookie names
    /// - `LOCATION_SHARING_TIMEOUT_SECS`: Request timeout in seconds
    /// - `LOCATION_SHARING_CACHE_TTL_SECS`: Response cache lifetime in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::new();

        if let Some(url) = lookup("LOCATION_SHARING_READ_URL") {
            config = config.with_read_url(parse_url("LOCATION_SHARING_READ_URL", &url)?);
        }
        if let Some(url) = lookup("LOCATION_SHARING_PROBE_URL") {
            config = config.with_probe_url(parse_url("LOCATION_SHARING_PROBE_URL", &url)?);
        }
        if let Some(url) = lookup("LOCATION_SHARING_LOGOUT_URL") {
            config = config.with_logout_url(parse_url("LOCATION_SHARING_LOGOUT_URL", &url)?);
        }
        if let Some(marker) = lookup("LOCATION_SHARING_UNAUTHENTICATED_MARKER") {
            config = config.with_unauthenticated_marker(marker);
        }
        if let Some(names) = lookup("LOCATION_SHARING_IDENTITY_COOKIES") {
            let names: Vec<String> = names
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if names.is_empty() {
                return Err(Error::Config(
                    "LOCATION_SHARING_IDENTITY_COOKIES must name at least one cookie".into(),
                ));
            }
            config = config.with_identity_cookies(names);
        }
        if let Some(secs) = lookup("LOCATION_SHARING_TIMEOUT_SECS") {
            config = config.with_timeout(parse_secs("LOCATION_SHARING_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("LOCATION_SHARING_CACHE_TTL_SECS") {
            config =
                config.with_cache_ttl(parse_secs("LOCATION_SHARING_CACHE_TTL_SECS", &secs)?);
        }

        Ok(config)
    }

    /// Override the location read endpoint.
    #[must_use]
    pub fn with_read_url(mut self, url: Url) -> Self {
        self.read_url = url;
        self
    }

    /// Replace the query parameters sent with every read.
    #[must_use]
    pub fn with_read_params(mut self, params: Vec<(String, String)>) -> Self {
        self.read_params = params;
        self
    }

    /// Override the URL used to check whether the cookies are still signed in.
    #[must_use]
    pub fn with_probe_url(mut self, url: Url) -> Self {
        self.probe_url = url;
        self
    }

    #[must_use]
    pub fn with_logout_url(mut self, url: Url) -> Self {
        self.logout_url = url;
        self
    }

    /// Page text that identifies a signed-out probe response.
    #[must_use]
    pub fn with_signed_out_marker(mut self, marker: impl Into<String>) -> Self {
        self.signed_out_marker = marker.into();
        self
    }

    #[must_use]
    pub fn with_hijack_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.hijack_prefix = prefix.into();
        self
    }

    /// Value of the authentication slot that means "not signed in"
    /// (default: `"GgA="`).
    #[must_use]
    pub fn with_unauthenticated_marker(mut self, marker: impl Into<String>) -> Self {
        self.unauthenticated_marker = marker.into();
        self
    }

    /// Cookie names accepted as proof of a signed-in session.
    #[must_use]
    pub fn with_identity_cookies(mut self, names: Vec<String>) -> Self {
        self.identity_cookies = names;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    /// Per-request timeout applied by the HTTP client (default: 30s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long a fetched response is reused before the next fetch (default: 30s).
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn read_url(&self) -> &Url {
        &self.read_url
    }

    #[must_use]
    pub fn read_params(&self) -> &[(String, String)] {
        &self.read_params
    }

    #[must_use]
    pub fn probe_url(&self) -> &Url {
        &self.probe_url
    }

    #[must_use]
    pub fn logout_url(&self) -> &Url {
        &self.logout_url
    }

    #[must_use]
    pub fn signed_out_marker(&self) -> &str {
        &self.signed_out_marker
    }

    #[must_use]
    pub fn hijack_prefix(&self) -> &str {
        &self.hijack_prefix
    }

    #[must_use]
    pub fn unauthenticated_marker(&self) -> &str {
        &self.unauthenticated_marker
    }

    #[must_use]
    pub fn identity_cookies(&self) -> &[String] {
        &self.identity_cookies
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn referer(&self) -> &str {
        &self.referer
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }
}

fn parse_url(var: &str, value: &str) -> Result<Url, Error> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}

fn parse_secs(var: &str, value: &str) -> Result<Duration, Error> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| Error::Config(format!("{var}: {e}")))
}
