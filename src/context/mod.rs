//! Explicit execution state shared by the optimizers and solvers: where work runs,
//! the random generator used for noise, and a cancellation flag checked between
//! iterations.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use rand::{SeedableRng, rngs::StdRng};
use rayon::{ThreadPool, ThreadPoolBuilder};


/// Where per-neuron work is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Every neuron is processed one after another on the calling thread
    Sequential,
    /// Neurons are processed on a dedicated `rayon` pool with the given number of threads
    ThreadPool { threads: usize },
}

impl Device {
    /// `0` threads selects [`Device::Sequential`]
    pub fn from_threads(threads: usize) -> Self {
        if threads == 0 {
            Device::Sequential
        } else {
            Device::ThreadPool { threads }
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Device::ThreadPool { .. })
    }
}

/// Shared flag used to stop long running optimizations, checked at every
/// iteration boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    /// Requests cancellation, visible to every clone of the token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Execution context passed to every component instead of global device
/// or random state
pub struct ExecutionContext {
    /// Where per-neuron work runs
    pub device: Device,
    /// Random generator used for noise images and synthetic data
    pub rng: StdRng,
    /// Cancellation flag for long running optimizations
    pub cancellation: CancellationToken,
    pool: Option<Arc<ThreadPool>>,
}

impl ExecutionContext {
    /// Creates a context with a seeded random generator, if the thread pool cannot
    /// be built the context falls back to sequential execution
    pub fn new(device: Device, seed: u64) -> Self {
        let pool = match device {
            Device::Sequential => None,
            Device::ThreadPool { threads } => {
                match ThreadPoolBuilder::new().num_threads(threads).build() {
                    Ok(pool) => Some(Arc::new(pool)),
                    Err(err) => {
                        log::warn!("Could not build thread pool ({}), running sequentially", err);
                        None
                    }
                }
            }
        };

        let device = if pool.is_some() { device } else { Device::Sequential };

        ExecutionContext {
            device,
            rng: StdRng::seed_from_u64(seed),
            cancellation: CancellationToken::new(),
            pool,
        }
    }

    /// Sequential context with seed `42`
    pub fn default_impl() -> Self {
        ExecutionContext::new(Device::Sequential, 42)
    }

    /// Whether per-neuron work should be spread over the pool
    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Runs the closure inside the configured pool (or directly when sequential)
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}
