//! wgpu implementation of the streaming backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::stream::{
    spin_until, CompletionToken, RegionDesc, StreamBackend, StreamError, StreamResult,
    WaitTimedOut,
};

#[derive(Debug, Default)]
struct FenceState {
    signaled: AtomicBool,
}

/// Completion timeline of one wgpu queue.
///
/// Fences stamped between two submissions are armed by the second one: they are
/// signaled once the device has finished every command buffer submitted up to and
/// including it. Region buffers are plain device buffers written through
/// `Queue::write_buffer`.
pub struct GpuTimeline {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pending: Mutex<Vec<Arc<FenceState>>>,
}

impl GpuTimeline {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            device: device.clone(),
            queue: queue.clone(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Submits `commands` and arms every fence stamped since the last submission.
    pub fn submit<I>(&self, commands: I) -> wgpu::SubmissionIndex
    where
        I: IntoIterator<Item = wgpu::CommandBuffer>,
    {
        let index = self.queue.submit(commands);

        let armed = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !armed.is_empty() {
            log::trace!("arming {} fence(s)", armed.len());
            self.queue.on_submitted_work_done(move || {
                for fence in armed {
                    fence.signaled.store(true, Ordering::Release);
                }
            });
        }

        index
    }
}

/// Token issued by [`GpuTimeline`].
pub struct GpuFence {
    state: Arc<FenceState>,
    device: wgpu::Device,
}

impl CompletionToken for GpuFence {
    fn is_satisfied(&self) -> bool {
        if self.state.signaled.load(Ordering::Acquire) {
            return true;
        }
        // Delivers pending `on_submitted_work_done` callbacks without blocking.
        let _ = self.device.poll(wgpu::PollType::Poll);
        self.state.signaled.load(Ordering::Acquire)
    }

    fn wait(&self, timeout: Duration) -> Result<(), WaitTimedOut> {
        spin_until(timeout, || self.is_satisfied())
    }
}

impl StreamBackend for GpuTimeline {
    type Token = GpuFence;
    type Buffer = wgpu::Buffer;

    fn create_region(&self, desc: &RegionDesc<'_>) -> StreamResult<wgpu::Buffer> {
        let max = self.device.limits().max_buffer_size;
        if desc.size > max {
            return Err(StreamError::allocation(
                desc,
                format!("exceeds device limit of {max} B"),
            ));
        }

        let label = format!("surge {} region {}", desc.label, desc.index);
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&label),
            size: desc.size,
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn flush(&self, buffer: &wgpu::Buffer, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.queue.write_buffer(buffer, 0, bytes);
        }
    }

    fn stamp(&self) -> GpuFence {
        let state = Arc::new(FenceState::default());
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&state));
        GpuFence {
            state,
            device: self.device.clone(),
        }
    }
}
