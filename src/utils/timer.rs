//! Timing utilities

use std::time::{Duration, Instant};
use tracing::info;

/// Timer for measuring execution time
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    checkpoints: Vec<(String, Duration)>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            checkpoints: Vec::new(),
        }
    }

    /// Add a checkpoint
    pub fn checkpoint(&mut self, name: impl Into<String>) {
        self.checkpoints.push((name.into(), self.start.elapsed()));
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop and log the timer, including checkpoints
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();

        let mut prev_time = Duration::ZERO;
        for (name, time) in &self.checkpoints {
            let delta = *time - prev_time;
            info!(
                timer = %self.name,
                checkpoint = %name,
                "{:.3}s (+{:.3}s)",
                time.as_secs_f64(),
                delta.as_secs_f64()
            );
            prev_time = *time;
        }

        info!("{} completed in {:.3}s", self.name, elapsed.as_secs_f64());
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timer() {
        let timer = Timer::start("test");
        sleep(Duration::from_millis(10));
        let elapsed = timer.stop();

        assert!(elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn test_timer_checkpoints() {
        let mut timer = Timer::start("test");

        sleep(Duration::from_millis(5));
        timer.checkpoint("load");

        sleep(Duration::from_millis(5));
        timer.checkpoint("pivot");

        assert_eq!(timer.checkpoints.len(), 2);
        assert!(timer.checkpoints[1].1 >= timer.checkpoints[0].1);
    }
}
