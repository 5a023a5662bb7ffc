use std::time::Duration;

use bytemuck::Pod;

use super::backend::{RegionDesc, StreamBackend};
use super::config::StreamConfig;
use super::error::{StreamError, StreamResult};
use super::token::CompletionToken;

/// Checked reference to an element pushed into the active region.
///
/// A handle is only honoured while the arena's epoch is unchanged; `reset`,
/// `reinit`, and a rotating `lock_write_buffer` all retire it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ElementHandle {
    region: usize,
    index: usize,
    epoch: u64,
}

impl ElementHandle {
    pub fn region(self) -> usize {
        self.region
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub fn epoch(self) -> u64 {
        self.epoch
    }
}

/// Outcome of a push that did not fail outright.
#[must_use]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Pushed {
    Stored(ElementHandle),
    /// The active region was full; the element was discarded.
    Dropped,
}

impl Pushed {
    pub fn is_stored(self) -> bool {
        matches!(self, Self::Stored(_))
    }

    pub fn handle(self) -> Option<ElementHandle> {
        match self {
            Self::Stored(h) => Some(h),
            Self::Dropped => None,
        }
    }
}

/// Per-region synchronization state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RegionState {
    /// CPU-owned; pushes may land here.
    Writable,
    /// Handed to the device; holds a token that has not been retired yet.
    Submitted,
}

/// Written sub-range of the active region, ready for a draw call.
#[derive(Debug)]
pub struct BoundRange<'a, Buf> {
    pub region: usize,
    pub buffer: &'a Buf,
    /// Byte offset of the range inside `buffer`.
    pub offset: u64,
    /// Byte length of the range.
    pub size: u64,
    /// Number of elements in the range.
    pub count: u32,
}

impl<Buf> BoundRange<'_, Buf> {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

struct Region<T, B: StreamBackend> {
    staging: Vec<T>,
    buffer: B::Buffer,
    token: Option<B::Token>,
    // Written since it last became the active region.
    dirty: bool,
}

/// N-way rotated arena streaming per-frame elements to the device.
///
/// Exactly one region is writable at a time. After a draw consumed it,
/// [`lock_write_buffer`](Self::lock_write_buffer) fences the region and moves on to the
/// next one, so the CPU can fill up to `redundancy - 1` further regions before it
/// has to wait for the device. Waiting happens lazily: a region's token is only
/// checked when that region is about to be written again.
///
/// Single-threaded by design; the only concurrency is with the device timeline.
pub struct StreamingArena<T, B: StreamBackend> {
    label: String,
    capacity: usize,
    wait_timeout: Duration,
    regions: Vec<Region<T, B>>,
    write_region: usize,
    epoch: u64,
    dropped: u64,
}

impl<T: Pod, B: StreamBackend> StreamingArena<T, B> {
    /// Allocates `redundancy` regions of `capacity` elements each.
    pub fn create(backend: &B, config: &StreamConfig) -> StreamResult<Self> {
        let StreamConfig {
            label,
            capacity,
            redundancy,
            wait_timeout,
        } = config;

        if *capacity == 0 {
            return Err(StreamError::creation(label, "capacity must be non-zero"));
        }
        if *redundancy == 0 {
            return Err(StreamError::creation(label, "redundancy must be non-zero"));
        }

        let element_size = std::mem::size_of::<T>();
        if element_size == 0 {
            return Err(StreamError::creation(label, "zero-sized element type"));
        }

        let region_bytes = capacity
            .checked_mul(element_size)
            .and_then(|b| u64::try_from(b).ok())
            .ok_or_else(|| StreamError::creation(label, "region size overflows"))?;

        let mut regions = Vec::with_capacity(*redundancy);
        for index in 0..*redundancy {
            let desc = RegionDesc {
                label,
                index,
                size: region_bytes,
            };

            let mut staging = Vec::new();
            staging
                .try_reserve_exact(*capacity)
                .map_err(|e| StreamError::allocation(&desc, e))?;

            let buffer = backend.create_region(&desc)?;

            regions.push(Region {
                staging,
                buffer,
                token: None,
                dirty: false,
            });
        }

        log::info!(
            "created stream `{label}`: {region_bytes} B x {redundancy} regions = {} B",
            region_bytes.saturating_mul(*redundancy as u64)
        );

        Ok(Self {
            label: label.clone(),
            capacity: *capacity,
            wait_timeout: *wait_timeout,
            regions,
            write_region: 0,
            epoch: 0,
            dropped: 0,
        })
    }

    /// Waits for every region to retire, then releases the arena.
    ///
    /// Must run before the device resources behind the backend are torn down.
    pub fn destroy(mut self) -> StreamResult<()> {
        log::info!("destroying stream `{}`", self.label);
        self.wait_idle()
    }

    /// Makes the active region writable, blocking on its token if needed.
    pub fn begin_write(&mut self) -> StreamResult<()> {
        self.retire(self.write_region)
    }

    /// Appends `value` to the active region.
    ///
    /// Blocks (bounded) while the device may still read the region. A full region
    /// drops the element and counts it in [`dropped`](Self::dropped).
    pub fn push(&mut self, value: T) -> StreamResult<Pushed> {
        self.begin_write()?;

        let region = &mut self.regions[self.write_region];
        if region.staging.len() >= self.capacity {
            self.dropped += 1;
            log::warn!(
                "stream `{}`: capacity of {} reached, dropping element",
                self.label,
                self.capacity
            );
            return Ok(Pushed::Dropped);
        }

        let index = region.staging.len();
        region.staging.push(value);
        region.dirty = true;

        Ok(Pushed::Stored(ElementHandle {
            region: self.write_region,
            index,
            epoch: self.epoch,
        }))
    }

    /// Element `index` of the active region.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.regions[self.write_region].staging.get(index)
    }

    /// Editable element `index` of the active region, `None` if not written yet.
    ///
    /// The borrow ends before the next `reset` or `lock_write_buffer` can run.
    pub fn get_mutable(&mut self, index: usize) -> Option<&mut T> {
        self.regions[self.write_region].staging.get_mut(index)
    }

    /// Resolves a handle, rejecting it if the arena has moved on since the push.
    pub fn element(&self, handle: ElementHandle) -> Option<&T> {
        if !self.is_current(handle) {
            return None;
        }
        self.get(handle.index)
    }

    /// Mutable counterpart of [`element`](Self::element).
    pub fn element_mut(&mut self, handle: ElementHandle) -> Option<&mut T> {
        if !self.is_current(handle) {
            return None;
        }
        self.get_mutable(handle.index)
    }

    fn is_current(&self, handle: ElementHandle) -> bool {
        handle.epoch == self.epoch && handle.region == self.write_region
    }

    /// Flushes `[0, size)` of the active region and returns the range to draw from.
    ///
    /// Does not stamp a token; call [`lock_write_buffer`](Self::lock_write_buffer)
    /// after the draw that consumes the range.
    pub fn bind(&self, backend: &B) -> BoundRange<'_, B::Buffer> {
        let region = &self.regions[self.write_region];
        debug_assert!(
            region.staging.is_empty() || region.token.is_none(),
            "written region still holds a token"
        );

        let bytes: &[u8] = bytemuck::cast_slice(&region.staging);
        if !bytes.is_empty() {
            backend.flush(&region.buffer, bytes);
        }

        BoundRange {
            region: self.write_region,
            buffer: &region.buffer,
            offset: 0,
            size: bytes.len() as u64,
            count: u32::try_from(region.staging.len()).unwrap_or(u32::MAX),
        }
    }

    /// Rewinds the active region's cursor.
    ///
    /// Neither waits on nor clears the region's token and never rotates.
    pub fn reset(&mut self) {
        self.regions[self.write_region].staging.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Fences the active region and rotates to the next one.
    ///
    /// No-op (returns `false`) if the active region already holds a token or has not
    /// been written since it became active.
    pub fn lock_write_buffer(&mut self, backend: &B) -> bool {
        let region = &mut self.regions[self.write_region];
        if region.token.is_some() || !region.dirty {
            return false;
        }

        region.token = Some(backend.stamp());
        region.dirty = false;

        let locked = self.write_region;
        self.write_region = (self.write_region + 1) % self.regions.len();

        // The device reads the region buffer, never the staging span, so the CPU
        // copy of the next region can be rewound even while it is in flight.
        let next = &mut self.regions[self.write_region];
        next.staging.clear();
        next.dirty = false;

        self.epoch = self.epoch.wrapping_add(1);

        log::trace!(
            "stream `{}`: locked region {locked}, writing region {}",
            self.label,
            self.write_region
        );
        true
    }

    /// Blocks until every region's token is satisfied and clears them all.
    pub fn wait_idle(&mut self) -> StreamResult<()> {
        for index in 0..self.regions.len() {
            self.retire(index)?;
        }
        Ok(())
    }

    /// `wait_idle` followed by a full rewind: region 0 active, every cursor at 0.
    pub fn reinit(&mut self) -> StreamResult<()> {
        self.wait_idle()?;

        for region in &mut self.regions {
            region.staging.clear();
            region.dirty = false;
        }
        self.write_region = 0;
        self.epoch = self.epoch.wrapping_add(1);

        log::debug!("stream `{}`: reinitialized", self.label);
        Ok(())
    }

    fn retire(&mut self, index: usize) -> StreamResult<()> {
        let region = &mut self.regions[index];
        let Some(token) = region.token.as_ref() else {
            return Ok(());
        };

        if !token.is_satisfied() {
            token
                .wait(self.wait_timeout)
                .map_err(|e| StreamError::Timeout {
                    label: self.label.clone(),
                    region: index,
                    waited: e.waited,
                })?;
        }

        region.token = None;
        Ok(())
    }

    /// Elements written to the active region.
    pub fn size(&self) -> usize {
        self.regions[self.write_region].staging.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn redundancy(&self) -> usize {
        self.regions.len()
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Index of the writable region.
    pub fn write_region(&self) -> usize {
        self.write_region
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Total elements discarded because a region was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// # Panics
    /// If `region >= redundancy()`.
    pub fn region_state(&self, region: usize) -> RegionState {
        if self.regions[region].token.is_some() {
            RegionState::Submitted
        } else {
            RegionState::Writable
        }
    }

    /// `true` while `region` holds a token (submitted, not yet recycled).
    pub fn is_in_flight(&self, region: usize) -> bool {
        self.region_state(region) == RegionState::Submitted
    }

    /// Elements the CPU holds for `region`.
    ///
    /// A submitted region keeps its count until it becomes active again.
    pub fn region_len(&self, region: usize) -> usize {
        self.regions[region].staging.len()
    }

    pub fn region_contents(&self, region: usize) -> &[T] {
        &self.regions[region].staging
    }

    pub fn region_buffer(&self, region: usize) -> &B::Buffer {
        &self.regions[region].buffer
    }
}

impl<T, B: StreamBackend> Drop for StreamingArena<T, B> {
    fn drop(&mut self) {
        let in_flight = self
            .regions
            .iter()
            .filter(|r| r.token.as_ref().is_some_and(|t| !t.is_satisfied()))
            .count();
        if in_flight > 0 {
            log::debug!(
                "stream `{}` dropped with {in_flight} region(s) in flight",
                self.label
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ManualTimeline;

    const SHORT: Duration = Duration::from_millis(2);

    fn arena(tl: &ManualTimeline, capacity: usize, redundancy: usize) -> StreamingArena<u32, ManualTimeline> {
        let config = StreamConfig::new("test", capacity)
            .with_redundancy(redundancy)
            .with_wait_timeout(SHORT);
        StreamingArena::create(tl, &config).unwrap()
    }

    /// One frame: write `n` elements, bind, pretend to draw, lock.
    fn frame(a: &mut StreamingArena<u32, ManualTimeline>, tl: &ManualTimeline, n: u32) -> StreamResult<()> {
        a.begin_write()?;
        a.reset();
        for i in 0..n {
            let _ = a.push(i)?;
        }
        let _ = a.bind(tl);
        a.lock_write_buffer(tl);
        Ok(())
    }

    // ── capacity ──────────────────────────────────────────────────────────

    #[test]
    fn push_grows_size_by_one_until_capacity() {
        for capacity in 1..=8 {
            let tl = ManualTimeline::new();
            let mut a = arena(&tl, capacity, 3);
            for expected in 1..=capacity {
                assert!(a.push(expected as u32).unwrap().is_stored());
                assert_eq!(a.size(), expected);
            }
        }
    }

    #[test]
    fn overflow_is_capped_and_counted_per_push() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 3, 2);
        for i in 0..3 {
            let _ = a.push(i).unwrap();
        }
        for excess in 1..=4 {
            assert_eq!(a.push(99).unwrap(), Pushed::Dropped);
            assert_eq!(a.size(), 3);
            assert_eq!(a.dropped(), excess);
        }
        assert_eq!(a.region_contents(0), &[0, 1, 2]);
    }

    // ── reset ─────────────────────────────────────────────────────────────

    #[test]
    fn reset_rewinds_without_touching_tokens() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 2);
        frame(&mut a, &tl, 2).unwrap();
        assert_eq!(a.region_state(0), RegionState::Submitted);

        let _ = a.push(7).unwrap();
        a.reset();

        assert_eq!(a.size(), 0);
        assert_eq!(a.write_region(), 1);
        assert_eq!(a.region_state(0), RegionState::Submitted);
        assert_eq!(tl.waits(), 0);
    }

    #[test]
    fn reset_on_a_submitted_region_keeps_its_token() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 1);
        frame(&mut a, &tl, 1).unwrap();
        assert_eq!(a.write_region(), 0);

        a.reset();
        assert_eq!(a.region_state(0), RegionState::Submitted);
        assert_eq!(tl.waits(), 0);
    }

    // ── lock ──────────────────────────────────────────────────────────────

    #[test]
    fn lock_stamps_and_rotates_exactly_once() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 3);
        for i in 0..4 {
            let _ = a.push(i).unwrap();
        }
        let bound = a.bind(&tl);
        assert_eq!(bound.count, 4);

        assert!(a.lock_write_buffer(&tl));
        assert!(a.is_in_flight(0));
        assert_eq!(a.write_region(), 1);

        assert!(!a.lock_write_buffer(&tl));
        assert_eq!(a.write_region(), 1);
        assert_eq!(tl.stamped(), 1);
    }

    #[test]
    fn lock_without_writes_does_not_rotate() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 3);
        assert!(!a.lock_write_buffer(&tl));
        assert_eq!(a.write_region(), 0);
        assert_eq!(tl.stamped(), 0);
    }

    // ── waits ─────────────────────────────────────────────────────────────

    #[test]
    fn wait_idle_twice_blocks_only_once() {
        let tl = ManualTimeline::new().complete_on_wait();
        let mut a = arena(&tl, 4, 3);
        for _ in 0..3 {
            frame(&mut a, &tl, 1).unwrap();
        }
        assert_eq!(tl.waits(), 0);

        a.wait_idle().unwrap();
        assert_eq!(tl.waits(), 3);
        for r in 0..3 {
            assert_eq!(a.region_state(r), RegionState::Writable);
        }

        a.wait_idle().unwrap();
        assert_eq!(tl.waits(), 3);
    }

    #[test]
    fn wait_idle_times_out_on_a_stalled_device() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 2);
        frame(&mut a, &tl, 1).unwrap();

        let err = a.wait_idle().unwrap_err();
        assert!(matches!(err, StreamError::Timeout { region: 0, .. }));
        assert!(err.is_transient());
        assert_eq!(a.region_state(0), RegionState::Submitted);
    }

    #[test]
    fn regions_rotate_round_robin() {
        let tl = ManualTimeline::new().complete_on_wait();
        let mut a = arena(&tl, 4, 3);

        let mut visited = Vec::new();
        let mut waits = Vec::new();
        for _ in 0..5 {
            visited.push(a.write_region());
            frame(&mut a, &tl, 2).unwrap();
            waits.push(tl.waits());
        }

        assert_eq!(visited, [0, 1, 2, 0, 1]);
        // The first lap writes into fresh regions; the second lap has to retire the
        // previous token of each region before writing.
        assert_eq!(waits, [0, 0, 0, 1, 2]);
    }

    #[test]
    fn reused_region_is_not_written_before_its_token_clears() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 3);
        for _ in 0..3 {
            frame(&mut a, &tl, 1).unwrap();
        }
        assert_eq!(a.write_region(), 0);

        // Region 0's first token (value 1) is still pending.
        let err = a.push(42).unwrap_err();
        assert!(matches!(err, StreamError::Timeout { region: 0, .. }));
        assert_eq!(a.size(), 0);

        tl.complete_through(1);
        assert!(a.push(42).unwrap().is_stored());
        assert_eq!(a.get(0), Some(&42));
        assert_eq!(a.region_state(1), RegionState::Submitted);
    }

    #[test]
    fn push_resumes_when_another_thread_completes_the_token() {
        let tl = ManualTimeline::new();
        let config = StreamConfig::new("threaded", 2)
            .with_redundancy(1)
            .with_wait_timeout(Duration::from_secs(5));
        let mut a: StreamingArena<u32, _> = StreamingArena::create(&tl, &config).unwrap();
        frame(&mut a, &tl, 1).unwrap();

        let device = tl.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(5));
            device.complete_all();
        });

        assert!(a.push(5).unwrap().is_stored());
        handle.join().unwrap();
        assert_eq!(a.region_state(0), RegionState::Writable);
    }

    // ── concrete scenario ─────────────────────────────────────────────────

    #[test]
    fn capacity_four_redundancy_two() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 2);

        for i in 0..4 {
            let _ = a.push(i).unwrap();
        }
        assert_eq!(a.size(), 4);

        assert_eq!(a.push(4).unwrap(), Pushed::Dropped);
        assert_eq!(a.size(), 4);
        assert_eq!(a.dropped(), 1);

        let _ = a.bind(&tl);
        assert!(a.lock_write_buffer(&tl));
        assert_eq!(a.write_region(), 1);

        let h = a.push(10).unwrap().handle().unwrap();
        assert_eq!((h.region(), h.index()), (1, 0));

        assert_eq!(a.region_len(0), 4);
        assert_eq!(a.region_contents(0), &[0, 1, 2, 3]);
        assert_eq!(a.region_state(0), RegionState::Submitted);

        // What the device reads for region 0 is untouched by writes into region 1.
        let expected: Vec<u8> = (0..4u32).flat_map(u32::to_ne_bytes).collect();
        assert_eq!(a.region_buffer(0).contents(), expected);
        assert_eq!(a.region_buffer(1).contents(), vec![0; 16]);
    }

    // ── element access ────────────────────────────────────────────────────

    #[test]
    fn get_mutable_is_limited_to_written_elements() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 2);
        let _ = a.push(1).unwrap();
        let _ = a.push(2).unwrap();

        *a.get_mutable(1).unwrap() += 40;
        assert_eq!(a.get(1), Some(&42));
        assert!(a.get_mutable(2).is_none());
        assert!(a.get_mutable(usize::MAX).is_none());
    }

    #[test]
    fn handles_expire_on_reset_and_lock() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 2);

        let h = a.push(1).unwrap().handle().unwrap();
        let _ = a.push(2).unwrap();
        *a.element_mut(h).unwrap() = 11;
        assert_eq!(a.element(h), Some(&11));

        a.reset();
        let _ = a.push(3).unwrap();
        assert!(a.element_mut(h).is_none());

        let h = a.push(4).unwrap().handle().unwrap();
        let _ = a.bind(&tl);
        a.lock_write_buffer(&tl);
        assert!(a.element(h).is_none());
    }

    // ── bind ──────────────────────────────────────────────────────────────

    #[test]
    fn bind_flushes_only_the_written_prefix() {
        let tl = ManualTimeline::new();
        let mut a = arena(&tl, 4, 2);
        let _ = a.push(0xAABBCCDD).unwrap();
        let _ = a.push(7).unwrap();

        let bound = a.bind(&tl);
        assert_eq!((bound.region, bound.offset, bound.size, bound.count), (0, 0, 8, 2));

        let contents = bound.buffer.contents();
        assert_eq!(contents.len(), 16);
        assert_eq!(&contents[..4], &0xAABBCCDDu32.to_ne_bytes());
        assert_eq!(&contents[4..8], &7u32.to_ne_bytes());
        assert_eq!(&contents[8..], &[0; 8]);
    }

    #[test]
    fn bind_of_an_empty_region_skips_the_flush() {
        let tl = ManualTimeline::new();
        let a = arena(&tl, 4, 2);
        assert!(a.bind(&tl).is_empty());
        assert_eq!(tl.flushes(), 0);
    }

    // ── reinit / destroy ──────────────────────────────────────────────────

    #[test]
    fn reinit_rewinds_rotation() {
        let tl = ManualTimeline::new().complete_on_wait();
        let mut a = arena(&tl, 4, 3);
        frame(&mut a, &tl, 2).unwrap();
        frame(&mut a, &tl, 3).unwrap();
        assert_eq!(a.write_region(), 2);

        a.reinit().unwrap();
        assert_eq!(a.write_region(), 0);
        for r in 0..3 {
            assert_eq!(a.region_len(r), 0);
            assert_eq!(a.region_state(r), RegionState::Writable);
        }
    }

    #[test]
    fn destroy_waits_for_outstanding_tokens() {
        let tl = ManualTimeline::new().complete_on_wait();
        let mut a = arena(&tl, 4, 2);
        frame(&mut a, &tl, 1).unwrap();
        a.destroy().unwrap();
        assert_eq!(tl.waits(), 1);
    }

    // ── creation ──────────────────────────────────────────────────────────

    #[test]
    fn create_rejects_degenerate_layouts() {
        let tl = ManualTimeline::new();
        let zero_cap = StreamConfig::new("z", 0);
        assert!(StreamingArena::<u32, _>::create(&tl, &zero_cap).is_err());

        let zero_n = StreamConfig::new("z", 4).with_redundancy(0);
        assert!(StreamingArena::<u32, _>::create(&tl, &zero_n).is_err());

        let overflow = StreamConfig::new("z", usize::MAX);
        assert!(StreamingArena::<u64, _>::create(&tl, &overflow).is_err());
    }

    #[test]
    fn create_propagates_allocation_failure() {
        // Two regions of 4 x u32 fit, the third does not.
        let tl = ManualTimeline::new().with_memory_limit(32);
        let config = StreamConfig::new("oom", 4).with_redundancy(3);
        let err = StreamingArena::<u32, _>::create(&tl, &config).err().unwrap();
        assert!(matches!(err, StreamError::ResourceCreation { .. }));
        assert!(!err.is_transient());
    }
}
