use std::time::Duration;

/// Default number of regions in rotation.
pub const DEFAULT_REDUNDANCY: usize = 3;

/// Default upper bound for a single wait on a region token.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Creation parameters for a [`StreamingArena`](super::StreamingArena).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Name used in logs and errors.
    pub label: String,

    /// Maximum elements per region.
    pub capacity: usize,

    /// Number of regions kept in rotation.
    ///
    /// The CPU may run up to `redundancy - 1` frames ahead of the device before a
    /// write into a recycled region has to wait.
    pub redundancy: usize,

    /// Bound for every wait on a region token. A device that never signals turns
    /// into a `StreamError::Timeout` instead of a hang.
    pub wait_timeout: Duration,
}

impl StreamConfig {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        Self {
            label: label.into(),
            capacity,
            redundancy: DEFAULT_REDUNDANCY,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    pub fn with_redundancy(mut self, redundancy: usize) -> Self {
        self.redundancy = redundancy;
        self
    }

    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new("stream", 1024)
    }
}
