//! Execution backend for the data-parallel passes
//!
//! Every pass is written once against rayon parallel iterators and runs
//! inside the backend's dedicated thread pool. One worker gives the
//! sequential backend; the choice is made when the engine is built.

use crate::core::{Error, Result};

/// Dedicated worker pool for allocation, integration and decay passes
pub struct ExecutionBackend {
    pool: rayon::ThreadPool,
}

impl ExecutionBackend {
    /// Build a backend with `threads` workers (0 = one per core)
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("voxfuse-worker-{}", i))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {}", e)))?;
        log::info!("Fusion backend: {} worker thread(s)", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Single-threaded backend
    pub fn sequential() -> Result<Self> {
        Self::new(1)
    }

    /// Run a pass on this backend's workers
    pub fn install<R: Send>(&self, pass: impl FnOnce() -> R + Send) -> R {
        self.pool.install(pass)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_sequential_backend() {
        let backend = ExecutionBackend::sequential().unwrap();
        assert_eq!(backend.threads(), 1);
        let sum: u64 = backend.install(|| (0..1000u64).into_par_iter().sum());
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn test_parallel_backend_matches_sequential() {
        let backend = ExecutionBackend::new(4).unwrap();
        assert_eq!(backend.threads(), 4);
        let squares: Vec<u32> = backend.install(|| (0..100u32).into_par_iter().map(|x| x * x).collect());
        assert_eq!(squares[99], 9801);
    }
}
