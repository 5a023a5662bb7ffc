//! CPU-only timeline.
//!
//! Tokens are completed explicitly by whoever plays the device: a test, a headless
//! tool, or another thread. Useful wherever the arena must run without a GPU.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::backend::{RegionDesc, StreamBackend};
use super::error::{StreamError, StreamResult};
use super::token::{spin_until, CompletionToken, WaitTimedOut};

#[derive(Debug, Default)]
struct Shared {
    stamped: AtomicU64,
    completed: AtomicU64,
    waits: AtomicU64,
    flushes: AtomicU64,
    allocated: AtomicU64,
    complete_on_wait: AtomicBool,
}

/// Timeline whose progress is driven by explicit `complete_*` calls.
///
/// Clones share state, so a clone can be handed to another thread that completes
/// tokens while the owner blocks in a wait.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeline {
    shared: Arc<Shared>,
    memory_limit: Option<u64>,
}

impl ManualTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails region allocations once `bytes` have been handed out.
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Satisfies a token as soon as someone waits on it.
    ///
    /// Models a device that is always behind by less than one wait.
    pub fn complete_on_wait(self) -> Self {
        self.shared.complete_on_wait.store(true, Ordering::Release);
        self
    }

    /// Marks every token with a value `<= value` as satisfied.
    pub fn complete_through(&self, value: u64) {
        self.shared.completed.fetch_max(value, Ordering::AcqRel);
    }

    /// Marks every token stamped so far as satisfied.
    pub fn complete_all(&self) {
        self.complete_through(self.stamped());
    }

    /// Number of tokens stamped so far (also the value of the latest token).
    pub fn stamped(&self) -> u64 {
        self.shared.stamped.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Number of blocking waits issued against this timeline's tokens.
    pub fn waits(&self) -> u64 {
        self.shared.waits.load(Ordering::Acquire)
    }

    pub fn flushes(&self) -> u64 {
        self.shared.flushes.load(Ordering::Acquire)
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.shared.allocated.load(Ordering::Acquire)
    }
}

/// Token issued by [`ManualTimeline`].
#[derive(Debug)]
pub struct ManualToken {
    value: u64,
    shared: Arc<Shared>,
}

impl ManualToken {
    pub fn value(&self) -> u64 {
        self.value
    }
}

impl CompletionToken for ManualToken {
    fn is_satisfied(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire) >= self.value
    }

    fn wait(&self, timeout: Duration) -> Result<(), WaitTimedOut> {
        self.shared.waits.fetch_add(1, Ordering::AcqRel);
        if self.shared.complete_on_wait.load(Ordering::Acquire) {
            self.shared.completed.fetch_max(self.value, Ordering::AcqRel);
        }
        spin_until(timeout, || self.is_satisfied())
    }
}

/// Host memory standing in for a device buffer.
#[derive(Debug)]
pub struct ManualBuffer {
    index: usize,
    contents: Mutex<Vec<u8>>,
}

impl ManualBuffer {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Snapshot of what the "device" would read.
    pub fn contents(&self) -> Vec<u8> {
        self.contents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StreamBackend for ManualTimeline {
    type Token = ManualToken;
    type Buffer = ManualBuffer;

    fn create_region(&self, desc: &RegionDesc<'_>) -> StreamResult<ManualBuffer> {
        let total = self.shared.allocated.load(Ordering::Acquire) + desc.size;
        if let Some(limit) = self.memory_limit {
            if total > limit {
                return Err(StreamError::allocation(
                    desc,
                    format!("memory limit of {limit} B exceeded"),
                ));
            }
        }

        let len = usize::try_from(desc.size)
            .map_err(|_| StreamError::allocation(desc, "size does not fit in host memory"))?;
        let mut contents = Vec::new();
        contents
            .try_reserve_exact(len)
            .map_err(|e| StreamError::allocation(desc, e))?;
        contents.resize(len, 0);

        self.shared.allocated.store(total, Ordering::Release);

        Ok(ManualBuffer {
            index: desc.index,
            contents: Mutex::new(contents),
        })
    }

    fn flush(&self, buffer: &ManualBuffer, bytes: &[u8]) {
        let mut contents = buffer.contents.lock().unwrap_or_else(PoisonError::into_inner);
        let n = bytes.len().min(contents.len());
        contents[..n].copy_from_slice(&bytes[..n]);
        self.shared.flushes.fetch_add(1, Ordering::AcqRel);
    }

    fn stamp(&self) -> ManualToken {
        let value = self.shared.stamped.fetch_add(1, Ordering::AcqRel) + 1;
        ManualToken {
            value,
            shared: Arc::clone(&self.shared),
        }
    }
}
