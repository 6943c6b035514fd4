//! Simple stopwatch for measuring query round trips.

use std::time::Instant;

/// A lightweight stopwatch that measures elapsed time.
///
/// Readers use it to report how long a backend call took in their
/// `debug` diagnostics.
pub struct Watch {
    start: Instant,
}

impl Watch {
    /// Starts a new stopwatch.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn measures_elapsed_time() {
        let watch = Watch::start();
        thread::sleep(Duration::from_millis(10));
        assert!(watch.elapsed_ms() >= 9, "elapsed was {}ms", watch.elapsed_ms());
    }
}
