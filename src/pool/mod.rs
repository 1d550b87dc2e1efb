//! Per-endpoint connection pooling.
//!
//! Connections are grouped by [`EndpointKey`] (`host:port`); each endpoint
//! holds a bounded set of reusable connection slots. Slot sets are created
//! lazily on first touch and all of them drain together when the owning
//! manager closes.
//!
//! # Architecture
//!
//! - [`EndpointKey`]: identity of one pooled destination
//! - [`Endpoint`]: slot bookkeeping for one destination
//! - [`PooledConnection`]: RAII guard that releases its slot on drop
//! - [`ConnectionPool`]: routes acquisitions and owns shutdown

mod connection;
mod endpoint;
mod key;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dashmap::DashMap;

pub(crate) use connection::PooledConnection;
use endpoint::Endpoint;
pub use endpoint::EndpointStats;
pub use key::EndpointKey;

use crate::types::Result;
use crate::ErrorKind;

/// Default number of connection slots per endpoint
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Routes connection acquisitions to per-endpoint slot sets.
///
/// Slot sets are created on demand; every endpoint gets the same capacity.
/// [`drain`](Self::drain) closes all of them at once: pending waiters wake
/// with [`ErrorKind::ManagerClosed`] and later acquisitions fail without
/// suspending.
#[derive(Debug)]
pub(crate) struct ConnectionPool {
    /// Map of endpoint to slot set, created on demand
    endpoints: DashMap<EndpointKey, Arc<Endpoint>>,

    /// Connection slots per endpoint
    capacity: usize,

    /// Shared HTTP client, cloned into each pooled connection
    http: reqwest::Client,

    /// Set once by `drain`. Acquisitions hold the read side while they
    /// check the flag and touch the endpoint map, so no endpoint can be
    /// created concurrently with a drain and escape it.
    closed: RwLock<bool>,
}

impl ConnectionPool {
    /// Create a pool. Every endpoint gets `max_connections` slots
    /// ([`DEFAULT_MAX_CONNECTIONS`] when unset).
    pub(crate) fn new(max_connections: Option<usize>, http: reqwest::Client) -> Self {
        Self {
            endpoints: DashMap::new(),
            capacity: max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
            http,
            closed: RwLock::new(false),
        }
    }

    /// Acquire a connection slot for the given endpoint, suspending in
    /// FIFO order behind earlier callers while the endpoint is saturated.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ManagerClosed`] if the pool has drained or
    /// drains while waiting.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub(crate) async fn acquire(&self, key: &EndpointKey) -> Result<PooledConnection> {
        let endpoint = self.get_or_create_endpoint(key)?;
        endpoint.acquire_slot(&self.http).await
    }

    /// Get an existing slot set or create a new one for the given endpoint
    fn get_or_create_endpoint(&self, key: &EndpointKey) -> Result<Arc<Endpoint>> {
        // Hold the read side across the existence check and the insert so
        // a concurrent drain either sees the new endpoint or rejects us.
        let closed = self.closed.read().unwrap();
        if *closed {
            return Err(ErrorKind::ManagerClosed);
        }

        if let Some(endpoint) = self.endpoints.get(key) {
            return Ok(endpoint.clone());
        }

        let endpoint = Arc::new(Endpoint::new(key.clone(), self.capacity));

        // Handle the race where another caller first-touched the same
        // endpoint between our check and this insert.
        match self.endpoints.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Ok(entry.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(entry) => Ok(entry.insert(endpoint).clone()),
        }
    }

    /// Close every endpoint: idle connections are dropped, waiting
    /// acquisitions wake with [`ErrorKind::ManagerClosed`], and all later
    /// acquisitions fail immediately. Draining twice is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if an internal lock is poisoned.
    pub(crate) fn drain(&self) {
        let mut closed = self.closed.write().unwrap();
        if *closed {
            return;
        }
        *closed = true;

        for entry in self.endpoints.iter() {
            let endpoint = entry.value();
            log::debug!(
                "draining {}: {} slot(s) in use, {} idle connection(s) dropped",
                entry.key(),
                endpoint.in_use(),
                endpoint.idle_count()
            );
            endpoint.close();
        }
        log::debug!("drained {} endpoint(s)", self.endpoints.len());
    }

    /// `true` once the pool has drained
    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        *self.closed.read().unwrap()
    }

    /// Number of endpoints that have been touched so far
    pub(crate) fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Slots currently handed out for the given endpoint
    #[cfg(test)]
    pub(crate) fn in_use(&self, key: &EndpointKey) -> usize {
        self.endpoints
            .get(key)
            .map_or(0, |endpoint| endpoint.in_use())
    }

    /// Connections parked for reuse at the given endpoint
    #[cfg(test)]
    pub(crate) fn idle_count(&self, key: &EndpointKey) -> usize {
        self.endpoints
            .get(key)
            .map_or(0, |endpoint| endpoint.idle_count())
    }

    /// Counters for the given endpoint; zeroes if it has never been touched
    pub(crate) fn stats(&self, key: &EndpointKey) -> EndpointStats {
        self.endpoints
            .get(key)
            .map(|endpoint| endpoint.stats())
            .unwrap_or_default()
    }

    /// Counters for every endpoint touched so far
    pub(crate) fn all_stats(&self) -> HashMap<String, EndpointStats> {
        self.endpoints
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn pool(capacity: usize) -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::new(Some(capacity), reqwest::Client::new()))
    }

    fn key() -> EndpointKey {
        EndpointKey::from(("api.filevine.io", 443))
    }

    #[test]
    fn test_pool_creation() {
        let pool = ConnectionPool::new(None, reqwest::Client::new());

        assert_eq!(pool.capacity, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(pool.endpoint_count(), 0);
        assert!(!pool.is_closed());
    }

    #[tokio::test]
    async fn test_endpoint_created_on_demand() {
        let pool = pool(2);

        assert_eq!(pool.endpoint_count(), 0);
        let slot = pool.acquire(&key()).await.unwrap();

        assert_eq!(pool.endpoint_count(), 1);
        assert_eq!(pool.in_use(&key()), 1);
        assert_eq!(slot.id(), 1);
        assert_eq!(*slot.key(), key());
        assert_eq!(slot.requests_served(), 0);
        assert!(slot.age() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_connection_reused_after_release() {
        let pool = pool(2);

        let first = pool.acquire(&key()).await.unwrap();
        let first_id = first.id();
        drop(first);

        assert_eq!(pool.idle_count(&key()), 1);

        let second = pool.acquire(&key()).await.unwrap();
        assert_eq!(second.id(), first_id);
        assert_eq!(pool.idle_count(&key()), 0);

        let stats = pool.stats(&key());
        assert_eq!(stats.connections_created, 1);
        assert_eq!(stats.connections_reused, 1);
    }

    #[tokio::test]
    async fn test_endpoints_are_independent() {
        let pool = pool(1);
        let other = EndpointKey::from(("api.filevine.ca", 443));

        // Both acquisitions succeed instantly even though each endpoint
        // only has a single slot.
        let _first = pool.acquire(&key()).await.unwrap();
        let _second = pool.acquire(&other).await.unwrap();

        assert_eq!(pool.endpoint_count(), 2);
        assert_eq!(pool.in_use(&key()), 1);
        assert_eq!(pool.in_use(&other), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_never_exceeded() {
        let pool = pool(3);
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let pool = pool.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let _slot = pool.acquire(&key()).await.unwrap();
                    peak.fetch_max(pool.in_use(&key()), Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                })
            })
            .collect();

        join_all(tasks).await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(pool.in_use(&key()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_caller_waits_for_release() {
        let pool = pool(1);

        let first = pool.acquire(&key()).await.unwrap();

        let second = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire(&key()).await.unwrap() }
        });

        // The second caller stays queued while the slot is out.
        sleep(Duration::from_millis(10)).await;
        assert!(!second.is_finished());

        drop(first);
        let slot = second.await.unwrap();
        assert_eq!(pool.in_use(&key()), 1);
        drop(slot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_woken_in_fifo_order() {
        let pool = pool(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let held = pool.acquire(&key()).await.unwrap();

        let mut waiters = Vec::new();
        for i in 0..3 {
            let pool = pool.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                let slot = pool.acquire(&key()).await.unwrap();
                order.lock().unwrap().push(i);
                drop(slot);
            }));
            // Let the waiter reach the queue before spawning the next one.
            sleep(Duration::from_millis(1)).await;
        }

        drop(held);
        join_all(waiters).await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_leaves_counts_unchanged() {
        let pool = pool(1);

        let held = pool.acquire(&key()).await.unwrap();

        let result = timeout(Duration::from_secs(1), pool.acquire(&key())).await;
        assert!(result.is_err());

        // The cancelled waiter neither holds nor leaks a slot.
        assert_eq!(pool.in_use(&key()), 1);
        drop(held);
        assert_eq!(pool.in_use(&key()), 0);

        let reacquired = pool.acquire(&key()).await.unwrap();
        assert_eq!(pool.in_use(&key()), 1);
        drop(reacquired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_wakes_pending_waiters() {
        let pool = pool(1);

        let held = pool.acquire(&key()).await.unwrap();

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire(&key()).await }
        });
        sleep(Duration::from_millis(1)).await;

        pool.drain();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ErrorKind::ManagerClosed)));
        drop(held);
    }

    #[tokio::test]
    async fn test_acquire_after_drain_fails_immediately() {
        let pool = pool(1);
        let _slot = pool.acquire(&key()).await.unwrap();

        pool.drain();
        pool.drain();

        assert!(pool.is_closed());
        let result = pool.acquire(&key()).await;
        assert!(matches!(result, Err(ErrorKind::ManagerClosed)));

        // Endpoints first touched after the drain are rejected as well.
        let fresh = EndpointKey::from(("untouched.example.com", 443));
        let result = pool.acquire(&fresh).await;
        assert!(matches!(result, Err(ErrorKind::ManagerClosed)));
    }

    #[tokio::test]
    async fn test_slot_released_after_drain_is_discarded() {
        let pool = pool(1);
        let slot = pool.acquire(&key()).await.unwrap();

        pool.drain();
        drop(slot);

        assert_eq!(pool.idle_count(&key()), 0);
        assert_eq!(pool.stats(&key()).connections_discarded, 1);
    }

    #[tokio::test]
    async fn test_idle_connection_swept_by_drain() {
        let pool = pool(1);
        drop(pool.acquire(&key()).await.unwrap());
        assert_eq!(pool.idle_count(&key()), 1);

        pool.drain();

        assert_eq!(pool.idle_count(&key()), 0);
        assert_eq!(pool.stats(&key()).connections_discarded, 1);
    }

    #[tokio::test]
    async fn test_broken_connection_not_reused() {
        let pool = pool(1);

        let mut slot = pool.acquire(&key()).await.unwrap();
        slot.mark_broken();
        assert!(slot.is_broken());
        drop(slot);

        assert_eq!(pool.idle_count(&key()), 0);

        let replacement = pool.acquire(&key()).await.unwrap();
        assert_eq!(replacement.id(), 2);

        let stats = pool.stats(&key());
        assert_eq!(stats.connections_created, 2);
        assert_eq!(stats.connections_discarded, 1);
        assert_eq!(stats.connections_reused, 0);
    }

    #[test]
    fn test_stats_for_untouched_endpoint() {
        let pool = pool(1);
        assert_eq!(pool.stats(&key()), EndpointStats::default());
        assert!(pool.all_stats().is_empty());
    }
}
