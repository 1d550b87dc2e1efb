//! Connection lifecycle and request dispatch.
//!
//! [`ConnectionManager`] owns everything a live API session needs: the
//! authenticated session, the token bucket, and the per-endpoint connection
//! pool. Requests flow through [`dispatch`](ConnectionManager::dispatch),
//! which takes a rate-limit token, leases a pooled connection, attaches the
//! session headers, and performs the exchange. The connection returns to
//! its pool when the call finishes, on success and on failure alike.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use secrecy::ExposeSecret;
use tokio::sync::watch;
use url::Url;

use crate::pool::{ConnectionPool, EndpointKey, EndpointStats};
use crate::ratelimit::{RateLimitConfig, TokenBucket};
use crate::types::{join_url, ApiRequest, Credential, ErrorKind, Result, Session};

/// How long to wait for the TCP handshake of a new connection
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Keepalive probe interval for pooled TCP connections
const TCP_KEEPALIVE_SECS: u64 = 60;

/// Lifecycle of a [`ConnectionManager`].
///
/// States advance in one direction only: `Uninitialized` →
/// `Initializing` → `Ready` → `Closing` → `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Created, session handshake not yet started
    Uninitialized,
    /// Session handshake in flight
    Initializing,
    /// Session established, requests can be dispatched
    Ready,
    /// Shutdown requested, resources being released
    Closing,
    /// Fully shut down
    Closed,
}

impl ManagerState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    /// `true` once shutdown has started, whether or not it has finished
    #[must_use]
    pub const fn is_shutdown(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication material held while the manager is live.
///
/// Cleared as a unit when the manager closes.
#[derive(Debug)]
struct AuthState {
    credential: Credential,
    session: Session,
}

/// Coordinates rate limiting, connection pooling, and authentication for
/// one API session.
///
/// Created through [`ClientBuilder`](crate::ClientBuilder), which performs
/// the session handshake before handing the manager out. Dropping a manager
/// closes it, but callers should prefer an explicit
/// [`close`](ConnectionManager::close).
#[derive(Debug)]
pub struct ConnectionManager {
    /// Root of the API, e.g. `https://api.filevine.io/`
    base_url: Url,

    /// Rate limiter consulted before every dispatch
    bucket: TokenBucket,

    /// Per-endpoint connection slots
    pool: ConnectionPool,

    /// Credential and session, released together on close
    auth: RwLock<Option<AuthState>>,

    /// Lifecycle state; dispatches waiting on the bucket watch this so a
    /// close can wake them
    state_tx: watch::Sender<ManagerState>,
}

impl ConnectionManager {
    /// Establish a session and return a ready manager.
    ///
    /// Builds the HTTP transport, performs the session handshake with the
    /// given credential, and wires up the token bucket and connection pool.
    /// `rate_limit: None` disables rate limiting; `max_connections: None`
    /// applies the pool default.
    pub(crate) async fn create(
        base_url: Url,
        credential: Credential,
        max_connections: Option<usize>,
        rate_limit: Option<RateLimitConfig>,
        user_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let http = build_http_client(user_agent, timeout)?;

        let (state_tx, _) = watch::channel(ManagerState::Uninitialized);
        state_tx.send_replace(ManagerState::Initializing);

        log::debug!("establishing session at {base_url}");
        let session = handshake(&http, &base_url, &credential).await?;
        log::debug!("session established for user {}", session.user_id());

        let manager = Self {
            base_url,
            bucket: TokenBucket::new(rate_limit),
            pool: ConnectionPool::new(max_connections, http),
            auth: RwLock::new(Some(AuthState {
                credential,
                session,
            })),
            state_tx,
        };
        manager.state_tx.send_replace(ManagerState::Ready);
        Ok(manager)
    }

    /// Dispatch a request and return the raw response.
    ///
    /// Waits for a rate-limit token, then for a connection slot at the
    /// request's endpoint, attaches the session headers, and performs the
    /// exchange. Slot waiters are served in arrival order; token waits are
    /// unordered but starvation-free. There is no intrinsic wait timeout;
    /// wrap the call in [`tokio::time::timeout`] to bound it.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::ManagerClosed`] if the manager is closed or closes
    ///   while this call is waiting
    /// - [`ErrorKind::InvalidUrlHost`] if the request resolves to a URL
    ///   without a usable host
    /// - [`ErrorKind::RequestBody`] if the JSON body fails to serialize
    /// - [`ErrorKind::NetworkRequest`] if the exchange itself fails
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub async fn dispatch(&self, request: ApiRequest) -> Result<reqwest::Response> {
        if self.state() != ManagerState::Ready {
            return Err(ErrorKind::ManagerClosed);
        }

        // Token waits can be unbounded, so race the bucket against the
        // lifecycle channel: a concurrent close must wake this caller.
        let mut state_rx = self.state_tx.subscribe();
        tokio::select! {
            () = self.bucket.acquire() => {}
            _ = state_rx.wait_for(|state| state.is_shutdown()) => {
                return Err(ErrorKind::ManagerClosed);
            }
        }

        let url = request.url(&self.base_url)?;
        let key = EndpointKey::try_from(&url)?;
        let mut pooled = self.pool.acquire(&key).await?;

        let outbound = self.build_request(&request, url)?;
        log::debug!("dispatching {request} over connection {}", pooled.id());
        pooled.execute(outbound).await
    }

    /// `GET` the given path with query parameters.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let mut request = ApiRequest::get(path);
        for (name, value) in query {
            request = request.with_query(*name, *value);
        }
        self.dispatch(request).await
    }

    /// `POST` a JSON body to the given path.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        self.dispatch(ApiRequest::post(path, body)).await
    }

    /// `PATCH` the given path with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        self.dispatch(ApiRequest::patch(path, body)).await
    }

    /// `DELETE` the given path.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn delete(&self, path: &str) -> Result<reqwest::Response> {
        self.dispatch(ApiRequest::delete(path)).await
    }

    /// Attach session headers, per-request headers, and the JSON body
    fn build_request(&self, request: &ApiRequest, url: Url) -> Result<reqwest::Request> {
        let auth = self.auth.read().unwrap();
        let Some(auth) = auth.as_ref() else {
            return Err(ErrorKind::ManagerClosed);
        };

        let mut outbound = reqwest::Request::new(request.method.clone(), url);
        outbound.headers_mut().extend(auth.session.headers()?);
        // Per-request headers win over the session set.
        outbound.headers_mut().extend(request.headers.clone());
        if let Some(body) = &request.body {
            outbound
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            *outbound.body_mut() = Some(serde_json::to_vec(body)?.into());
        }
        Ok(outbound)
    }

    /// Shut the manager down.
    ///
    /// Wakes every caller waiting on the token bucket or a connection slot
    /// with [`ErrorKind::ManagerClosed`], drops idle connections, and
    /// releases the credential and session. Closing an already closed
    /// manager is a no-op. Requests already past dispatch admission run to
    /// completion; their connections are discarded on return.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub fn close(&self) {
        let initiated = self.state_tx.send_if_modified(|state| {
            if state.is_shutdown() {
                false
            } else {
                *state = ManagerState::Closing;
                true
            }
        });
        if !initiated {
            return;
        }

        self.pool.drain();
        if let Some(auth) = self.auth.write().unwrap().take() {
            log::debug!("released credential {}", auth.credential.key());
        }
        self.state_tx.send_replace(ManagerState::Closed);
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state_tx.borrow()
    }

    /// Root URL requests are resolved against
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// User id of the authenticated session; `None` once closed
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        self.auth
            .read()
            .unwrap()
            .as_ref()
            .map(|auth| auth.session.user_id())
    }

    /// Org id of the authenticated session; `None` once closed
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    #[must_use]
    pub fn org_id(&self) -> Option<i64> {
        self.auth
            .read()
            .unwrap()
            .as_ref()
            .map(|auth| auth.session.org_id())
    }

    /// Rate-limit tokens currently available; `None` when unlimited
    #[must_use]
    pub fn available_tokens(&self) -> Option<f64> {
        self.bucket.available()
    }

    /// Number of endpoints dispatched to so far
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.pool.endpoint_count()
    }

    /// Connection counters for one endpoint; zeroes if never dispatched to
    #[must_use]
    pub fn endpoint_stats(&self, key: &EndpointKey) -> EndpointStats {
        self.pool.stats(key)
    }

    /// Connection counters for every endpoint dispatched to so far
    #[must_use]
    pub fn all_endpoint_stats(&self) -> HashMap<String, EndpointStats> {
        self.pool.all_stats()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.state() == ManagerState::Ready {
            log::warn!("connection manager dropped without close");
        }
        self.close();
    }
}

/// Perform the session handshake: exchange the credential for a session
async fn handshake(
    http: &reqwest::Client,
    base_url: &Url,
    credential: &Credential,
) -> Result<Session> {
    let url = join_url(base_url, "session")?;
    let body = serde_json::json!({
        "mode": "key",
        "apiKey": credential.key(),
        "apiSecret": credential.secret().expose_secret(),
    });

    let response = http
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(ErrorKind::NetworkRequest)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ErrorKind::SessionHandshake { status });
    }

    response
        .json::<Session>()
        .await
        .map_err(ErrorKind::InvalidSessionResponse)
}

/// Build the shared HTTP transport all connections clone from
fn build_http_client(user_agent: &str, timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);

    let mut builder = reqwest::ClientBuilder::new()
        .gzip(true)
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .tcp_keepalive(Duration::from_secs(TCP_KEEPALIVE_SECS));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(ErrorKind::NetworkRequest)
}
