//! Utility functions and types

mod parallel;
mod timer;
pub mod data_loader;

pub use parallel::{parallel_try_map, ParallelConfig};
pub use timer::Timer;
pub use data_loader::{DataLoader, DataSaver};
