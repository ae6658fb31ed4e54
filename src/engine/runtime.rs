use std::sync::Arc;
use std::thread;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::engine::physics::{contract_violation, PhysicsError};

/// Engine runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Worker pool size; `None` means hardware concurrency minus one
    pub worker_threads: Option<usize>,
}

impl RuntimeSettings {
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Pool size after applying the default, never below one
    pub fn resolved_worker_threads(&self) -> usize {
        let threads = self.worker_threads.unwrap_or_else(|| {
            // Leave one hardware thread for the caller
            thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
        });
        threads.max(1)
    }
}

/// Owned engine runtime: the worker pool every world steps on
///
/// Create one with [`EngineRuntime::init`] before any world and tear it down
/// with [`EngineRuntime::shutdown`] after the last world is gone.
pub struct EngineRuntime {
    pool: Arc<ThreadPool>,
    worker_threads: usize,
}

impl EngineRuntime {
    pub fn init(settings: RuntimeSettings) -> Result<Self, PhysicsError> {
        let worker_threads = settings.resolved_worker_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("physics-worker-{}", i))
            .build()
            .map_err(|e| PhysicsError::Runtime(e.to_string()))?;

        log::info!("engine runtime up with {} worker threads", worker_threads);
        Ok(Self {
            pool: Arc::new(pool),
            worker_threads,
        })
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Number of worlds still holding this runtime's pool
    pub fn live_worlds(&self) -> usize {
        Arc::strong_count(&self.pool) - 1
    }

    pub(crate) fn pool(&self) -> Arc<ThreadPool> {
        Arc::clone(&self.pool)
    }

    /// Tear the runtime down
    ///
    /// # Panics
    /// Shutting down while a world created from this runtime is still alive is
    /// a contract violation.
    pub fn shutdown(self) {
        let live = self.live_worlds();
        if live > 0 {
            contract_violation!("engine runtime shut down with {} live world(s)", live);
        }
        log::info!("engine runtime shut down");
    }
}
