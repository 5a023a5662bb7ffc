//! GPU device + surface management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - creating & configuring the Surface (swapchain) and its depth attachment
//! - acquiring frames and submitting them through the completion timeline
//!
//! [`GpuTimeline`] is the [`StreamBackend`](crate::stream::StreamBackend) used by the
//! draw databases: every submission arms the fences stamped since the previous one.

mod gpu;
mod init;
mod timeline;

pub use gpu::{Gpu, GpuFrame, SurfaceErrorAction, DEPTH_FORMAT};
pub use init::GpuInit;
pub use timeline::{GpuFence, GpuTimeline};
