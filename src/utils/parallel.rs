//! Parallel processing utilities

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

/// Configuration for parallel processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Run independent tasks (one per date) on a thread pool
    pub enabled: bool,
    /// Number of threads (None = use all available)
    pub n_threads: Option<usize>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_threads: None,
        }
    }
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Run everything on the calling thread
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            n_threads: None,
        }
    }

    /// Set number of threads
    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// Get the number of threads to use
    pub fn num_threads(&self) -> usize {
        self.n_threads.unwrap_or_else(rayon::current_num_threads)
    }
}

/// Map a fallible function over `items`, preserving input order.
///
/// Every item is processed even when some fail; the first error in input
/// order is returned.
pub fn parallel_try_map<T, U, F>(items: Vec<T>, config: &ParallelConfig, f: F) -> Result<Vec<U>>
where
    T: Send,
    U: Send,
    F: Fn(T) -> Result<U> + Send + Sync,
{
    let results: Vec<Result<U>> = if !config.enabled || items.len() < 2 {
        items.into_iter().map(f).collect()
    } else if let Some(n) = config.n_threads {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| PanelError::ThreadPool(e.to_string()))?;
        pool.install(|| items.into_par_iter().map(&f).collect())
    } else {
        items.into_par_iter().map(&f).collect()
    };

    results.into_iter().collect()
}
