use std::time::Duration;

use thiserror::Error;

use super::backend::RegionDesc;

/// Errors surfaced by the streaming layer.
///
/// Capacity overflow is not an error. It is a per-frame condition reported
/// through [`Pushed::Dropped`](super::Pushed) and the arena's drop counter.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The arena (or one of its regions) could not be created.
    ///
    /// Fatal to the owning subsystem's initialization.
    #[error("stream `{label}`: resource creation failed: {reason}")]
    ResourceCreation { label: String, reason: String },

    /// A region was still in flight when the bounded wait expired.
    #[error("stream `{label}`: region {region} still in flight after {waited:?}")]
    Timeout {
        label: String,
        region: usize,
        waited: Duration,
    },
}

impl StreamError {
    pub(crate) fn creation(label: &str, reason: impl Into<String>) -> Self {
        Self::ResourceCreation {
            label: label.to_owned(),
            reason: reason.into(),
        }
    }

    /// Builds an allocation failure for a specific region buffer.
    pub fn allocation(desc: &RegionDesc<'_>, reason: impl std::fmt::Display) -> Self {
        Self::ResourceCreation {
            label: desc.label.to_owned(),
            reason: format!("region {} ({} B): {reason}", desc.index, desc.size),
        }
    }

    /// Returns `true` for failures that leave the arena usable on the next frame.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
