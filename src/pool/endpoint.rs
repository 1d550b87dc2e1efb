use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::pool::connection::{Connection, PooledConnection};
use crate::pool::EndpointKey;
use crate::types::Result;
use crate::ErrorKind;

/// The connection slots of a single `(host, port)` endpoint.
///
/// A fair semaphore bounds how many slots can be out at once; waiters are
/// queued in arrival order and a released slot is handed directly to the
/// longest-waiting caller. Released connections are kept in an idle set
/// for reuse until the pool drains.
#[derive(Debug)]
pub(crate) struct Endpoint {
    key: EndpointKey,

    /// Bounds concurrent slots; closed on drain, which wakes all waiters
    semaphore: Arc<Semaphore>,

    /// Connections released and available for reuse, most recent last
    idle: Mutex<Vec<Connection>>,

    /// Slots currently handed out
    in_use: AtomicUsize,

    /// Next connection id, unique per endpoint
    next_id: AtomicU64,

    stats: Mutex<EndpointStats>,
}

impl Endpoint {
    pub(crate) fn new(key: EndpointKey, capacity: usize) -> Self {
        Self {
            key,
            semaphore: Arc::new(Semaphore::new(capacity)),
            idle: Mutex::new(Vec::new()),
            in_use: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            stats: Mutex::new(EndpointStats::default()),
        }
    }

    /// Wait for a free slot, then hand out an idle connection or create a
    /// fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ManagerClosed`] if the pool drained while
    /// waiting.
    ///
    /// # Panics
    ///
    /// Panics if an internal mutex is poisoned.
    pub(crate) async fn acquire_slot(
        self: Arc<Self>,
        http: &reqwest::Client,
    ) -> Result<PooledConnection> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ErrorKind::ManagerClosed)?;

        self.in_use.fetch_add(1, Ordering::SeqCst);
        let conn = self.checkout(http);
        Ok(PooledConnection::new(conn, self, permit))
    }

    /// Pop an idle connection, or create a new one if none is available
    fn checkout(&self, http: &reqwest::Client) -> Connection {
        if let Some(conn) = self.idle.lock().unwrap().pop() {
            self.stats.lock().unwrap().connections_reused += 1;
            log::debug!("reusing connection {} to {}", conn.id(), self.key);
            return conn;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.stats.lock().unwrap().connections_created += 1;
        log::debug!("opening connection {id} to {}", self.key);
        Connection::new(id, self.key.clone(), http.clone())
    }

    /// Take a slot back. The connection returns to the idle set unless it
    /// is broken or the endpoint has been closed, in which case it is
    /// discarded; the slot counts as released either way.
    pub(crate) fn give_back(&self, conn: Connection, broken: bool) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);

        if !broken {
            // Checked under the idle lock: `close` sweeps the idle set
            // after closing the semaphore, so a connection racing a close
            // is either rejected here or swept there, never stranded.
            let mut idle = self.idle.lock().unwrap();
            if !self.is_closed() {
                idle.push(conn);
                return;
            }
        }

        self.stats.lock().unwrap().connections_discarded += 1;
        log::debug!(
            "discarding connection {} to {} after {} request(s) ({:?} old)",
            conn.id(),
            self.key,
            conn.requests_served(),
            conn.age()
        );
    }

    /// Close the endpoint: pending and future slot waits fail, idle
    /// connections are swept and counted as discarded.
    pub(crate) fn close(&self) {
        self.semaphore.close();
        let swept = std::mem::take(&mut *self.idle.lock().unwrap());
        if !swept.is_empty() {
            self.stats.lock().unwrap().connections_discarded += swept.len() as u64;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    pub(crate) fn record_request(&self) {
        self.stats.lock().unwrap().requests_dispatched += 1;
    }

    /// Slots currently handed out
    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    /// Connections currently parked for reuse
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    /// Snapshot of this endpoint's counters
    pub(crate) fn stats(&self) -> EndpointStats {
        *self.stats.lock().unwrap()
    }
}

/// Counters for a single pooled endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    /// Connections opened for this endpoint
    pub connections_created: u64,

    /// Acquisitions served from the idle set instead of a fresh connection
    pub connections_reused: u64,

    /// Connections dropped because they broke or the pool drained
    pub connections_discarded: u64,

    /// Requests executed over this endpoint's connections
    pub requests_dispatched: u64,
}
