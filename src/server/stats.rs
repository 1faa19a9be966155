//! Lock-free runtime counters shared by the accept loop, connections and workers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Live counters for one server instance.
#[derive(Debug, Default)]
pub struct ServerStats {
    accepted: AtomicU64,
    accept_errors: AtomicU64,
    connections_started: AtomicU64,
    connections_active: AtomicUsize,
    connections_completed: AtomicU64,
    handshake_failures: AtomicU64,
    handler_errors: AtomicU64,
    pending_accepts: AtomicUsize,
    peak_pending_accepts: AtomicUsize,
    worker_threads_spawned: AtomicUsize,
    worker_threads_alive: AtomicUsize,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Accepts that completed successfully.
    pub accepted: u64,
    /// Accepts that completed with a non-cancellation error.
    pub accept_errors: u64,
    /// `Connection::start` invocations.
    pub connections_started: u64,
    /// Connections whose task is still running.
    pub connections_active: usize,
    /// Connections whose task has finished, successfully or not.
    pub connections_completed: u64,
    /// TLS handshakes that failed.
    pub handshake_failures: u64,
    /// Handler invocations that returned an error.
    pub handler_errors: u64,
    /// Accept operations currently outstanding.
    pub pending_accepts: usize,
    /// Highest number of simultaneously outstanding accepts ever observed.
    pub peak_pending_accepts: usize,
    /// Worker threads started by the pool.
    pub worker_threads_spawned: usize,
    /// Worker threads that have started and not yet exited.
    pub worker_threads_alive: usize,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            connections_started: self.connections_started.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_completed: self.connections_completed.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            pending_accepts: self.pending_accepts.load(Ordering::SeqCst),
            peak_pending_accepts: self.peak_pending_accepts.load(Ordering::SeqCst),
            worker_threads_spawned: self.worker_threads_spawned.load(Ordering::SeqCst),
            worker_threads_alive: self.worker_threads_alive.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_started(&self) {
        self.connections_started.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_finished(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
        self.connections_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn accept_armed(&self) {
        let now = self.pending_accepts.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_pending_accepts.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn accept_settled(&self) {
        self.pending_accepts.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_started(&self) {
        self.worker_threads_spawned.fetch_add(1, Ordering::SeqCst);
        self.worker_threads_alive.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn worker_stopped(&self) {
        self.worker_threads_alive.fetch_sub(1, Ordering::SeqCst);
    }
}
