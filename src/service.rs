use std::path::Path;
use std::sync::Arc;

use time::OffsetDateTime;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::envelope::RawEnvelope;
use crate::error::Error;
use crate::person::{
    Person, decode_all, decode_authenticated_person, find_by_full_name, find_by_nickname,
};
use crate::session::Session;

/// Location-sharing reader for one signed-in account.
///
/// Every query goes through a single response cache, so a burst of queries
/// costs one remote read per TTL window. `Service` is `Send + Sync`; share it
/// behind an `Arc` to query from several tasks.
///
/// ```rust,ignore
/// use location_sharing::{Config, Service};
///
/// let config = Config::new();
/// let service = Service::load("cookies.txt", "me@gmail.com", config)?;
/// for person in service.shared_people().await? {
///     println!("{person}");
/// }
/// ```
pub struct Service {
    session: Session,
    account_email: String,
    config: Config,
    cache: ResponseCache<RawEnvelope>,
}

impl Service {
    /// Wrap an already loaded session. No request is made until the first query.
    #[must_use]
    pub fn new(session: Session, account_email: impl Into<String>, config: Config) -> Self {
        Self {
            cache: ResponseCache::new(config.cache_ttl()),
            session,
            account_email: account_email.into(),
            config,
        }
    }

    /// Load a cookie file and wrap it. No request is made until the first query.
    ///
    /// # Errors
    ///
    /// Returns the cookie errors of [`Session::load`].
    pub fn load(
        cookies_file: impl AsRef<Path>,
        account_email: impl Into<String>,
        config: Config,
    ) -> Result<Self, Error> {
        let session = Session::load(cookies_file, &config)?;
        Ok(Self::new(session, account_email, config))
    }

    /// Wrap a session and perform the first read immediately, so expired
    /// cookies fail here rather than on the first query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSession`] if the service reports the session
    /// as signed out, and the errors of [`fetch`](Self::fetch).
    pub async fn connect(
        session: Session,
        account_email: impl Into<String>,
        config: Config,
    ) -> Result<Self, Error> {
        let service = Self::new(session, account_email, config);
        service.snapshot().await?;
        Ok(service)
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn account_email(&self) -> &str {
        &self.account_email
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Performs one uncached read.
    ///
    /// A non-success HTTP status is logged and yields [`RawEnvelope::empty`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure or timeout, and
    /// [`Error::InvalidEnvelope`] if a successful response cannot be parsed.
    pub async fn fetch(&self) -> Result<RawEnvelope, Error> {
        let response = self
            .session
            .http()
            .get(self.config.read_url().clone())
            .query(self.config.read_params())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Location read returned non-success status");
            return Ok(RawEnvelope::empty());
        }

        let body = response.text().await?;
        tracing::debug!(bytes = body.len(), "Location read response received");
        RawEnvelope::parse(&body, self.config.hijack_prefix()).inspect_err(|e| {
            tracing::error!(error = %e, bytes = body.len(), "Unable to parse location response");
        })
    }

    /// The cached envelope, fetching and checking authentication on a miss.
    async fn snapshot(&self) -> Result<Arc<RawEnvelope>, Error> {
        self.cache
            .get_or_fetch(move || async move {
                let envelope = self.fetch().await?;
                if !envelope.is_empty()
                    && !envelope.validate_authenticated(self.config.unauthenticated_marker())?
                {
                    tracing::warn!("Location read reports a signed-out session");
                    return Err(Error::InvalidSession(
                        "the cookies do not provide a signed-in session".into(),
                    ));
                }
                Ok(envelope)
            })
            .await
    }

    /// Drops the cached response so the next query reads again.
    pub async fn invalidate_cache(&self) {
        self.cache.invalidate().await;
    }

    /// Everyone sharing their location with this account.
    ///
    /// # Errors
    ///
    /// Fails only if the response as a whole is unusable; entries that do
    /// not decode are skipped.
    pub async fn shared_people(&self) -> Result<Vec<Person>, Error> {
        let envelope = self.snapshot().await?;
        decode_all(&envelope)
    }

    /// This account's own location, if the service reports one.
    ///
    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people).
    pub async fn authenticated_person(&self) -> Result<Option<Person>, Error> {
        let envelope = self.snapshot().await?;
        Ok(decode_authenticated_person(&envelope, &self.account_email))
    }

    /// Shared people followed by this account's own record, when present.
    ///
    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people).
    pub async fn all_people(&self) -> Result<Vec<Person>, Error> {
        let envelope = self.snapshot().await?;
        let mut people = decode_all(&envelope)?;
        people.extend(decode_authenticated_person(&envelope, &self.account_email));
        Ok(people)
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn person_by_nickname(&self, nickname: &str) -> Result<Option<Person>, Error> {
        let people = self.all_people().await?;
        Ok(find_by_nickname(&people, nickname).cloned())
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn person_by_full_name(&self, full_name: &str) -> Result<Option<Person>, Error> {
        let people = self.all_people().await?;
        Ok(find_by_full_name(&people, full_name).cloned())
    }

    /// `(latitude, longitude)` of the person with this nickname.
    ///
    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn coordinates_by_nickname(
        &self,
        nickname: &str,
    ) -> Result<Option<(f64, f64)>, Error> {
        Ok(self
            .person_by_nickname(nickname)
            .await?
            .map(|p| p.coordinates()))
    }

    /// `(latitude, longitude)` of the person with this full name.
    ///
    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn coordinates_by_full_name(
        &self,
        full_name: &str,
    ) -> Result<Option<(f64, f64)>, Error> {
        Ok(self
            .person_by_full_name(full_name)
            .await?
            .map(|p| p.coordinates()))
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn latitude_by_nickname(&self, nickname: &str) -> Result<Option<f64>, Error> {
        Ok(self.person_by_nickname(nickname).await?.map(|p| p.latitude()))
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn longitude_by_nickname(&self, nickname: &str) -> Result<Option<f64>, Error> {
        Ok(self.person_by_nickname(nickname).await?.map(|p| p.longitude()))
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn timestamp_by_nickname(
        &self,
        nickname: &str,
    ) -> Result<Option<OffsetDateTime>, Error> {
        Ok(self
            .person_by_nickname(nickname)
            .await?
            .and_then(|p| p.datetime()))
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn latitude_by_full_name(&self, full_name: &str) -> Result<Option<f64>, Error> {
        Ok(self.person_by_full_name(full_name).await?.map(|p| p.latitude()))
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn longitude_by_full_name(&self, full_name: &str) -> Result<Option<f64>, Error> {
        Ok(self.person_by_full_name(full_name).await?.map(|p| p.longitude()))
    }

    /// # Errors
    ///
    /// See [`shared_people`](Self::shared_people). No match is `Ok(None)`.
    pub async fn timestamp_by_full_name(
        &self,
        full_name: &str,
    ) -> Result<Option<OffsetDateTime>, Error> {
        Ok(self
            .person_by_full_name(full_name)
            .await?
            .and_then(|p| p.datetime()))
    }

    /// Signs the session out remotely, invalidating the cookies.
    ///
    /// Returns `true` if the service answered with a success status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure.
    pub async fn logout(&self) -> Result<bool, Error> {
        let response = self
            .session
            .http()
            .get(self.config.logout_url().clone())
            .send()
            .await?;
        self.cache.invalidate().await;
        let ok = response.status().is_success();
        tracing::info!(status = response.status().as_u16(), "Logged out");
        Ok(ok)
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("account_email", &self.account_email)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{Value, json};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::person::tests::entry;

    const COOKIES: &str = ".google.com\tTRUE\t/\tTRUE\t1893456000\t__Secure-1PSID\tsecret\n";
    const READ_PATH: &str = "/maps/rpc/locationsharing/read";

    fn body(envelope: &Value) -> String {
        format!("{}\n{envelope}", ")]}'")
    }

    fn envelope(entries: Value, marker: &str) -> Value {
        json!([
            entries,
            null,
            null,
            null,
            null,
            null,
            marker,
            null,
            null,
            [
                null,
                [
                    null,
                    [null, 4.89, 52.37],
                    "1700000000000",
                    15,
                    "Dam, Amsterdam",
                    null,
                    "NL"
                ]
            ]
        ])
    }

    fn config_for(server: &MockServer) -> Config {
        Config::new()
            .with_read_url(format!("{}{READ_PATH}", server.uri()).parse().unwrap())
            .with_logout_url(format!("{}/Logout", server.uri()).parse().unwrap())
    }

    fn service(config: Config) -> Service {
        let session = Session::from_cookie_text(COOKIES, &config).unwrap();
        Service::new(session, "me@example.com", config)
    }

    async fn mount_read(server: &MockServer, template: ResponseTemplate, expected: u64) {
        Mock::given(method("GET"))
            .and(path(READ_PATH))
            .respond_with(template)
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_shared_people_skips_malformed_entries() {
        let server = MockServer::start().await;
        let ok = entry("Alice Example", "Alice", 37.42, -122.08);
        let mut missing_coords = entry("Bob Example", "Bob", 1.0, 2.0);
        missing_coords[1] = Value::Null;
        let payload = envelope(json!([ok.clone(), missing_coords]), "CgAQ");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 1).await;

        let people = service(config_for(&server)).shared_people().await.unwrap();

        assert_eq!(people, vec![crate::person::decode_person(&ok).unwrap()]);
    }

    #[tokio::test]
    async fn test_sends_parameter_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(READ_PATH))
            .and(query_param("authuser", "0"))
            .and(query_param("hl", "en"))
            .and(query_param("gl", "us"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(body(&envelope(json!([]), "CgAQ"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let people = service(config_for(&server)).shared_people().await.unwrap();
        assert!(people.is_empty());
    }

    #[tokio::test]
    async fn test_queries_within_ttl_fetch_once() {
        let server = MockServer::start().await;
        let payload = envelope(json!([entry("Alice Example", "Alice", 37.42, -122.08)]), "CgAQ");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 1).await;

        let service = service(config_for(&server));
        service.shared_people().await.unwrap();
        service.coordinates_by_nickname("alice").await.unwrap();
        service.person_by_full_name("Alice Example").await.unwrap();
        service.authenticated_person().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_after_ttl_fetches_again() {
        let server = MockServer::start().await;
        let payload = envelope(json!([]), "CgAQ");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 2).await;

        let service = service(config_for(&server).with_cache_ttl(Duration::from_millis(50)));
        service.shared_people().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        service.shared_people().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_queries_fetch_once() {
        let server = MockServer::start().await;
        let payload = envelope(json!([]), "CgAQ");
        mount_read(
            &server,
            ResponseTemplate::new(200)
                .set_body_string(body(&payload))
                .set_delay(Duration::from_millis(100)),
            1,
        )
        .await;

        let service = Arc::new(service(config_for(&server)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.shared_people().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_missing_prefix_is_invalid_envelope() {
        let server = MockServer::start().await;
        let payload = envelope(json!([]), "CgAQ");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(payload.to_string()), 2)
            .await;

        let service = service(config_for(&server));
        assert!(matches!(service.fetch().await, Err(Error::InvalidEnvelope(_))));
        assert!(matches!(
            service.shared_people().await,
            Err(Error::InvalidEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn test_short_envelope_is_invalid() {
        let server = MockServer::start().await;
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&json!([[]]))), 1)
            .await;

        let result = service(config_for(&server)).shared_people().await;
        assert!(matches!(result, Err(Error::InvalidEnvelope(_))));
    }

    #[tokio::test]
    async fn test_signed_out_marker_fails_connect() {
        let server = MockServer::start().await;
        let payload = envelope(json!([entry("Alice Example", "Alice", 1.0, 1.0)]), "GgA=");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 1).await;

        let config = config_for(&server);
        let session = Session::from_cookie_text(COOKIES, &config).unwrap();
        let result = Service::connect(session, "me@example.com", config).await;

        assert!(matches!(result, Err(Error::InvalidSession(_))));
    }

    #[tokio::test]
    async fn test_signed_out_is_not_cached() {
        let server = MockServer::start().await;
        let payload = envelope(json!([]), "GgA=");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 2).await;

        let service = service(config_for(&server));
        assert!(matches!(service.shared_people().await, Err(Error::InvalidSession(_))));
        assert!(matches!(service.all_people().await, Err(Error::InvalidSession(_))));
    }

    #[tokio::test]
    async fn test_connect_with_valid_session() {
        let server = MockServer::start().await;
        let payload = envelope(json!([entry("Alice Example", "Alice", 1.0, 1.0)]), "CgAQ");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 1).await;

        let config = config_for(&server);
        let session = Session::from_cookie_text(COOKIES, &config).unwrap();
        let service = Service::connect(session, "me@example.com", config).await.unwrap();

        // served from the read made by connect
        assert_eq!(service.shared_people().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_yields_no_people() {
        let server = MockServer::start().await;
        mount_read(&server, ResponseTemplate::new(503), 1).await;

        let service = service(config_for(&server));
        assert!(service.shared_people().await.unwrap().is_empty());
        assert!(service.authenticated_person().await.unwrap().is_none());
        assert_eq!(service.coordinates_by_nickname("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookups() {
        let server = MockServer::start().await;
        let payload = envelope(
            json!([
                entry("Alice Example", "Alice", 37.42, -122.08),
                entry("Bob Example", "Bob", 51.5, -0.12),
            ]),
            "CgAQ",
        );
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 1).await;

        let service = service(config_for(&server));

        let upper = service.person_by_nickname("Alice").await.unwrap();
        let lower = service.person_by_nickname("alice").await.unwrap();
        assert!(upper.is_some());
        assert_eq!(upper, lower);

        assert_eq!(
            service.coordinates_by_full_name("BOB EXAMPLE").await.unwrap(),
            Some((51.5, -0.12))
        );
        assert_eq!(service.latitude_by_nickname("bob").await.unwrap(), Some(51.5));
        assert_eq!(service.longitude_by_full_name("alice example").await.unwrap(), Some(-122.08));
        assert_eq!(
            service
                .timestamp_by_nickname("alice")
                .await
                .unwrap()
                .map(|dt| dt.unix_timestamp()),
            Some(1_700_000_000)
        );

        assert_eq!(service.coordinates_by_nickname("nobody").await.unwrap(), None);
        assert_eq!(service.latitude_by_full_name("nobody").await.unwrap(), None);
        assert_eq!(service.timestamp_by_full_name("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_all_people_includes_account_owner() {
        let server = MockServer::start().await;
        let payload = envelope(json!([entry("Alice Example", "Alice", 37.42, -122.08)]), "CgAQ");
        mount_read(&server, ResponseTemplate::new(200).set_body_string(body(&payload)), 1).await;

        let service = service(config_for(&server));
        let people = service.all_people().await.unwrap();

        assert_eq!(people.len(), 2);
        assert_eq!(people[1].full_name(), "me@example.com");
        assert_eq!(
            service.coordinates_by_nickname("ME@example.com").await.unwrap(),
            Some((52.37, 4.89))
        );
    }

    #[tokio::test]
    async fn test_request_timeout_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(READ_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body(&envelope(json!([]), "CgAQ")))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let service = service(config_for(&server).with_timeout(Duration::from_millis(100)));
        match service.shared_people().await {
            Err(Error::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_logout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Logout"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        assert!(service(config_for(&server)).logout().await.unwrap());
    }
}
