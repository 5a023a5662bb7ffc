//! CPU -> device streaming.
//!
//! A [`StreamingArena`] owns `redundancy` fixed-capacity regions arranged in a ring.
//! Per frame the owner rewinds the active region, pushes elements, binds the written
//! range for one draw, and locks the region, which stamps a [`CompletionToken`] and
//! rotates to the next region. A region is only written again after its token is
//! satisfied; the check happens lazily on the next write.
//!
//! Device specifics live behind [`StreamBackend`]. The wgpu implementation is
//! `device::GpuTimeline`; [`ManualTimeline`] is a CPU-only stand-in.

mod arena;
mod backend;
mod config;
mod error;
mod manual;
mod token;

pub use arena::{BoundRange, ElementHandle, Pushed, RegionState, StreamingArena};
pub use backend::{RegionDesc, StreamBackend};
pub use config::{StreamConfig, DEFAULT_REDUNDANCY, DEFAULT_WAIT_TIMEOUT};
pub use error::{StreamError, StreamResult};
pub use manual::{ManualBuffer, ManualTimeline, ManualToken};
pub use token::{spin_until, CompletionToken, WaitTimedOut};
