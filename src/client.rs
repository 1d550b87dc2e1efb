//! High-level entry point.
//!
//! [`ClientBuilder`] collects connection settings, loads the credential
//! file, and performs the session handshake; the resulting [`Client`] is a
//! cheap clonable handle over the shared
//! [`ConnectionManager`](crate::ConnectionManager).

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::manager::ConnectionManager;
use crate::ratelimit::RateLimitConfig;
use crate::types::{BaseUrl, Credential, Result};

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("espalier/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Client`].
///
/// Only the credential file is required; every other setting has a default.
///
/// # Example
///
/// ```no_run
/// # use espalier::{BaseUrl, ClientBuilder, RateLimitConfig, Result};
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let client = ClientBuilder::builder()
///     .credentials_file("keyfile.toml")
///     .base_url(BaseUrl::Canada)
///     .max_connections(5)
///     .rate_limit(RateLimitConfig::new(20, 5.0))
///     .build()
///     .connect()
///     .await?;
/// # client.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(default, setter(into)))]
pub struct ClientBuilder {
    /// Path to a TOML file holding the API `key` and `secret`
    #[builder(!default)]
    credentials_file: PathBuf,

    /// API region or custom root URL
    base_url: BaseUrl,

    /// Connection slots per endpoint
    /// ([`DEFAULT_MAX_CONNECTIONS`](crate::DEFAULT_MAX_CONNECTIONS) when unset)
    max_connections: Option<usize>,

    /// Token bucket settings; unset disables rate limiting
    rate_limit: Option<RateLimitConfig>,

    /// User agent sent with every request
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Total per-request timeout; unset leaves requests unbounded
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Load the credential file, perform the session handshake, and return
    /// a connected client.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::CredentialsNotFound`](crate::ErrorKind::CredentialsNotFound)
    ///   or [`ErrorKind::InvalidCredentials`](crate::ErrorKind::InvalidCredentials)
    ///   if the credential file is unreadable or malformed; no network
    ///   traffic happens in that case
    /// - [`ErrorKind::SessionHandshake`](crate::ErrorKind::SessionHandshake)
    ///   if the API rejects the credential
    pub async fn connect(&self) -> Result<Client> {
        // Credentials load first so a bad path fails before any handshake.
        let credential = Credential::from_file(&self.credentials_file)?;
        let base_url = self.base_url.url()?;
        let manager = ConnectionManager::create(
            base_url,
            credential,
            self.max_connections,
            self.rate_limit,
            &self.user_agent,
            self.timeout,
        )
        .await?;

        Ok(Client {
            conn: Arc::new(manager),
        })
    }

    /// Connect, run `op` with the client, then close it.
    ///
    /// The client closes whether `op` succeeds or fails, so connections and
    /// credential material never outlive the scope.
    ///
    /// # Errors
    ///
    /// Returns connection errors from [`connect`](Self::connect), otherwise
    /// whatever `op` returns.
    pub async fn with<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.connect().await?;
        let result = op(client.clone()).await;
        client.close();
        result
    }
}

/// Handle to a connected API session.
///
/// Clones share one [`ConnectionManager`]; closing any handle closes them
/// all.
#[derive(Debug, Clone)]
pub struct Client {
    conn: Arc<ConnectionManager>,
}

impl Client {
    /// Connect with default settings and the given credential file.
    ///
    /// Shorthand for [`ClientBuilder`] with only
    /// [`credentials_file`](ClientBuilder::builder) set.
    ///
    /// # Errors
    ///
    /// See [`ClientBuilder::connect`].
    pub async fn connect(credentials_file: impl Into<PathBuf>) -> Result<Self> {
        ClientBuilder::builder()
            .credentials_file(credentials_file.into())
            .build()
            .connect()
            .await
    }

    /// The connection manager this handle wraps
    #[must_use]
    pub fn conn(&self) -> &ConnectionManager {
        &self.conn
    }

    /// Close the shared connection manager; see
    /// [`ConnectionManager::close`]
    pub fn close(&self) {
        self.conn.close();
    }

    /// `true` once the shared connection manager has started shutting down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.state().is_shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "key = \"pk-key\"\nsecret = \"shh-secret\"").unwrap();
        file
    }

    async fn session_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessToken": "session-token",
                "refreshToken": "refresh-token",
                "userId": 1234,
                "orgId": 5678,
            })))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::builder()
            .credentials_file("keyfile.toml")
            .build();

        assert_eq!(builder.credentials_file, PathBuf::from("keyfile.toml"));
        assert_eq!(builder.base_url, BaseUrl::UnitedStates);
        assert_eq!(builder.max_connections, None);
        assert_eq!(builder.rate_limit, None);
        assert_eq!(builder.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.timeout, None);
    }

    #[tokio::test]
    async fn test_bad_credential_path_fails_before_handshake() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = ClientBuilder::builder()
            .credentials_file("/definitely/missing/keyfile.toml")
            .base_url(Url::parse(&server.uri()).unwrap())
            .build()
            .connect()
            .await;

        assert!(matches!(
            result,
            Err(ErrorKind::CredentialsNotFound(file, _))
                if file == PathBuf::from("/definitely/missing/keyfile.toml")
        ));
    }

    #[tokio::test]
    async fn test_connect_and_close() {
        let server = session_server().await;
        let keyfile = credentials_file();

        let client = ClientBuilder::builder()
            .credentials_file(keyfile.path())
            .base_url(Url::parse(&server.uri()).unwrap())
            .build()
            .connect()
            .await
            .unwrap();

        assert!(!client.is_closed());
        assert_eq!(client.conn().user_id(), Some(1234));

        // All clones observe the close.
        let other = client.clone();
        client.close();
        assert!(other.is_closed());
    }

    #[tokio::test]
    async fn test_with_closes_on_success() {
        let server = session_server().await;
        let keyfile = credentials_file();

        let client = ClientBuilder::builder()
            .credentials_file(keyfile.path())
            .base_url(Url::parse(&server.uri()).unwrap())
            .build()
            .with(|client| async move { Ok(client) })
            .await
            .unwrap();

        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_with_closes_on_error() {
        let server = session_server().await;
        let keyfile = credentials_file();
        let escaped: Arc<Mutex<Option<Client>>> = Arc::default();

        let result = ClientBuilder::builder()
            .credentials_file(keyfile.path())
            .base_url(Url::parse(&server.uri()).unwrap())
            .build()
            .with(|client| {
                let escaped = escaped.clone();
                async move {
                    *escaped.lock().unwrap() = Some(client);
                    Err::<(), _>(ErrorKind::InvalidUrlHost)
                }
            })
            .await;

        assert!(matches!(result, Err(ErrorKind::InvalidUrlHost)));
        let escaped = escaped.lock().unwrap();
        assert!(escaped.as_ref().unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_client_connect_shorthand_checks_credentials() {
        let result = Client::connect("/definitely/missing/keyfile.toml").await;
        assert!(matches!(result, Err(ErrorKind::CredentialsNotFound(..))));
    }
}
