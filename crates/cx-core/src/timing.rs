//! Wall-clock timing for runs.
//!
//! Elapsed time only accumulates while the stopwatch is running, so a run
//! that spends time paused reports its computing time only.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Stopwatch {
    accumulated: Duration,
    started: Option<Instant>,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Create a stopped stopwatch with zero elapsed time.
    pub fn new() -> Self {
        Self {
            accumulated: Duration::ZERO,
            started: None,
        }
    }

    /// Create and start a stopwatch.
    pub fn start_new() -> Self {
        let mut sw = Self::new();
        sw.start();
        sw
    }

    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    pub fn stop(&mut self) {
        if let Some(t0) = self.started.take() {
            self.accumulated += t0.elapsed();
        }
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        match self.started {
            Some(t0) => self.accumulated + t0.elapsed(),
            None => self.accumulated,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_watch_does_not_advance() {
        let mut sw = Stopwatch::start_new();
        std::thread::sleep(Duration::from_millis(2));
        sw.stop();
        let frozen = sw.elapsed();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(sw.elapsed(), frozen);
        assert!(frozen >= Duration::from_millis(2));
    }

    #[test]
    fn restart_accumulates() {
        let mut sw = Stopwatch::new();
        assert!(!sw.is_running());
        sw.start();
        sw.stop();
        let first = sw.elapsed();
        sw.start();
        assert!(sw.is_running());
        std::thread::sleep(Duration::from_millis(1));
        assert!(sw.elapsed() > first);
    }
}
