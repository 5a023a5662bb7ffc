use super::error::StreamResult;
use super::token::CompletionToken;

/// Describes one region buffer requested by an arena.
#[derive(Debug, Copy, Clone)]
pub struct RegionDesc<'a> {
    pub label: &'a str,
    pub index: usize,
    pub size: u64,
}

/// Device-side half of a streaming arena.
///
/// Implementations own the actual memory and the completion timeline. The arena only
/// decides *when* a region may be written, flushed, and fenced. The backend is an
/// explicit context object: it is created once by the renderer and passed by
/// reference to every arena operation that touches the device.
pub trait StreamBackend {
    type Token: CompletionToken;
    type Buffer;

    /// Allocates the device buffer backing one region.
    fn create_region(&self, desc: &RegionDesc<'_>) -> StreamResult<Self::Buffer>;

    /// Makes `bytes` visible to the device at offset 0 of `buffer`.
    fn flush(&self, buffer: &Self::Buffer, bytes: &[u8]);

    /// Stamps a token covering all device work recorded so far.
    fn stamp(&self) -> Self::Token;
}
