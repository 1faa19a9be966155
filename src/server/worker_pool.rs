//! The event loop and the fixed set of worker threads that drive it.

use std::cell::Cell;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use log::{info, warn};
use tokio::runtime::{Builder, Handle, Runtime};

use crate::server::error::Error;
use crate::server::stats::ServerStats;

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Id of the pool owning the current thread, 0 for threads outside any pool.
    static CURRENT_POOL: Cell<usize> = const { Cell::new(0) };
}

/// An owned tokio runtime plus the worker threads executing it.
///
/// With `workers >= 1` a multi-thread runtime runs exactly that many workers, all
/// pulling from one shared scheduler. With `workers == 0` no thread is created and
/// the loop only makes progress inside [`WorkerPool::block_on`].
#[derive(Debug)]
pub(crate) struct WorkerPool {
    id: usize,
    runtime: Runtime,
    workers: usize,
}

impl WorkerPool {
    pub(crate) fn start(workers: usize, thread_name: &str, stats: &Arc<ServerStats>) -> Result<Self, Error> {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let built = if workers == 0 {
            Builder::new_current_thread().enable_all().build()
        } else {
            let name = thread_name.to_string();
            let next_index = AtomicUsize::new(0);
            let started = Arc::clone(stats);
            let stopped = Arc::clone(stats);

            Builder::new_multi_thread()
                .worker_threads(workers)
                .thread_name_fn(move || format!("{name}-{}", next_index.fetch_add(1, Ordering::Relaxed)))
                .on_thread_start(move || {
                    CURRENT_POOL.with(|pool| pool.set(id));
                    started.worker_started();
                })
                .on_thread_stop(move || {
                    CURRENT_POOL.with(|pool| pool.set(0));
                    stopped.worker_stopped();
                })
                .enable_all()
                .build()
        };
        let runtime = built.map_err(Error::Runtime)?;

        if workers == 0 {
            info!("Event loop started without worker threads; caller drives it");
        } else {
            info!("Event loop started with {workers} worker thread(s)");
        }

        Ok(Self { id, runtime, workers })
    }

    pub(crate) fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Number of worker threads this pool was started with.
    pub(crate) fn workers(&self) -> usize {
        self.workers
    }

    /// Run `future` to completion on the calling thread, driving the event loop meanwhile.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stop the event loop and join every worker thread.
    ///
    /// A worker cannot join itself, so when called from one of this pool's own
    /// threads the workers are released in the background instead. Inside any
    /// other async context the runtime is dropped on a helper thread, which is
    /// joined before returning.
    pub(crate) fn shutdown(self) {
        let runtime = self.runtime;
        if CURRENT_POOL.with(Cell::get) == self.id {
            warn!("Event loop stopped from one of its own worker threads; worker threads are not joined");
            runtime.shutdown_background();
        } else if Handle::try_current().is_ok() {
            thread::scope(|scope| {
                scope.spawn(move || drop(runtime));
            });
        } else {
            drop(runtime);
        }
        info!("Event loop stopped");
    }
}
