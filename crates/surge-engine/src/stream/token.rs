use std::time::{Duration, Instant};

/// Marker for a point on the device's execution timeline.
///
/// A token is stamped after the commands that read a region were recorded. Once it
/// is satisfied, the device no longer reads that region and the CPU may overwrite it.
pub trait CompletionToken {
    /// Non-blocking check.
    fn is_satisfied(&self) -> bool;

    /// Blocks until the token is satisfied or `timeout` elapses.
    fn wait(&self, timeout: Duration) -> Result<(), WaitTimedOut>;
}

/// Returned by [`CompletionToken::wait`] when the device did not reach the token in time.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WaitTimedOut {
    pub waited: Duration,
}

/// Spin-polls `ready` until it returns `true` or `timeout` elapses.
///
/// `ready` is always evaluated at least once, so a zero timeout degenerates into a
/// single non-blocking check.
pub fn spin_until(timeout: Duration, mut ready: impl FnMut() -> bool) -> Result<(), WaitTimedOut> {
    let start = Instant::now();
    loop {
        if ready() {
            return Ok(());
        }

        let waited = start.elapsed();
        if waited >= timeout {
            return Err(WaitTimedOut { waited });
        }

        std::hint::spin_loop();
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_immediately_never_times_out() {
        assert!(spin_until(Duration::ZERO, || true).is_ok());
    }

    #[test]
    fn never_ready_reports_elapsed_time() {
        let err = spin_until(Duration::from_millis(2), || false).unwrap_err();
        assert!(err.waited >= Duration::from_millis(2));
    }

    #[test]
    fn polls_until_condition_flips() {
        let mut polls = 0;
        let res = spin_until(Duration::from_secs(5), || {
            polls += 1;
            polls == 3
        });
        assert!(res.is_ok());
        assert_eq!(polls, 3);
    }
}
