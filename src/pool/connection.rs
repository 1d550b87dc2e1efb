use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::OwnedSemaphorePermit;

use crate::pool::endpoint::Endpoint;
use crate::pool::EndpointKey;
use crate::types::Result;
use crate::ErrorKind;

/// A reusable connection to one endpoint.
///
/// Holds a handle to the shared HTTP client; the transport-level socket
/// reuse itself happens inside the client's connection pool. What this type
/// adds is identity and accounting: which endpoint the slot belongs to, how
/// old it is, and how many requests it has served.
#[derive(Debug)]
pub(crate) struct Connection {
    id: u64,
    key: EndpointKey,
    http: reqwest::Client,
    created_at: Instant,
    requests_served: u64,
}

impl Connection {
    pub(crate) fn new(id: u64, key: EndpointKey, http: reqwest::Client) -> Self {
        Self {
            id,
            key,
            http,
            created_at: Instant::now(),
            requests_served: 0,
        }
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    #[cfg(test)]
    pub(crate) const fn key(&self) -> &EndpointKey {
        &self.key
    }

    pub(crate) fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) const fn requests_served(&self) -> u64 {
        self.requests_served
    }
}

/// An acquired connection slot.
///
/// Dropping the guard releases the slot on every exit path, including
/// cancellation and unwinding: the connection returns to its endpoint's
/// idle set (or is discarded if marked broken or the pool is draining),
/// and the slot permit is handed to the longest-waiting caller.
#[derive(Debug)]
pub(crate) struct PooledConnection {
    /// `Some` until the guard is dropped
    conn: Option<Connection>,
    endpoint: Arc<Endpoint>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub(crate) fn new(
        conn: Connection,
        endpoint: Arc<Endpoint>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            conn: Some(conn),
            endpoint,
            broken: false,
            _permit: permit,
        }
    }

    fn conn(&self) -> &Connection {
        // Invariant: only `drop` takes the connection out.
        self.conn.as_ref().expect("connection present until drop")
    }

    /// Execute a request on this connection.
    ///
    /// A failure at the transport level (unreachable host, timed-out or
    /// interrupted exchange) marks the connection broken so it is discarded
    /// instead of reused. The HTTP status of the response is not inspected;
    /// error statuses are a successful exchange from the pool's point of
    /// view.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::NetworkRequest`] if the transport fails.
    pub(crate) async fn execute(&mut self, request: reqwest::Request) -> Result<reqwest::Response> {
        let conn = self
            .conn
            .as_mut()
            .expect("connection present until drop");

        match conn.http.execute(request).await {
            Ok(response) => {
                conn.requests_served += 1;
                self.endpoint.record_request();
                Ok(response)
            }
            Err(e) => {
                if is_connection_fault(&e) {
                    log::debug!(
                        "connection {} to {} failed at transport level, discarding",
                        conn.id,
                        conn.key
                    );
                    self.broken = true;
                }
                Err(ErrorKind::NetworkRequest(e))
            }
        }
    }

    /// Mark this connection broken; it will be discarded instead of
    /// returned to the idle set.
    #[cfg(test)]
    pub(crate) fn mark_broken(&mut self) {
        self.broken = true;
    }

    #[cfg(test)]
    pub(crate) const fn is_broken(&self) -> bool {
        self.broken
    }

    /// Identity of the underlying connection, unique per endpoint
    pub(crate) fn id(&self) -> u64 {
        self.conn().id()
    }

    /// The endpoint this slot belongs to
    #[cfg(test)]
    pub(crate) fn key(&self) -> &EndpointKey {
        self.conn().key()
    }

    /// Requests served over the lifetime of the underlying connection
    #[cfg(test)]
    pub(crate) fn requests_served(&self) -> u64 {
        self.conn().requests_served()
    }

    /// Time since the underlying connection was created
    #[cfg(test)]
    pub(crate) fn age(&self) -> Duration {
        self.conn().age()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.endpoint.give_back(conn, self.broken);
        }
        // The permit drops with the guard, waking the next waiter in line.
    }
}

/// Whether a transport failure invalidates the pooled connection.
/// Decode and redirect errors leave the connection usable; connect,
/// timeout and interrupted-request errors do not.
fn is_connection_fault(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}
