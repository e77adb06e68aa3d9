use crate::error::{BorgError, BorgResult};
use crate::utils::align_up;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A first-fit, split-and-coalesce allocator over a window of GPU virtual addresses.
///
/// Free ranges are kept in an address-ordered map (`start -> size`) so that neighbors can
/// be found and merged when a range comes back.
///
/// # Invariants
/// - Free ranges are non-overlapping, non-adjacent and lie inside `[start, end)`.
/// - Every range handed out by [`VaHeap::alloc`] is disjoint from the free list until it is
///   passed back to [`VaHeap::free`].
#[derive(Debug)]
pub struct VaHeap {
    start: u64,
    end: u64,
    free: Mutex<BTreeMap<u64, u64>>,
}

impl VaHeap {
    /// Creates a heap managing `[start, end)`, entirely free.
    ///
    /// # Panics
    /// Panics if the window is empty.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        assert!(start < end, "empty VA heap window 0x{start:x}..0x{end:x}");

        let mut free = BTreeMap::new();
        free.insert(start, end - start);

        Self {
            start,
            end,
            free: Mutex::new(free),
        }
    }

    // The free list is only written through code paths that cannot panic halfway, so a
    // poisoned lock still guards a consistent map.
    fn ranges(&self) -> MutexGuard<'_, BTreeMap<u64, u64>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub const fn bounds(&self) -> (u64, u64) {
        (self.start, self.end)
    }

    /// Reserves `size` bytes aligned to `align`, taking the lowest fitting address.
    ///
    /// # Errors
    /// `InvalidArgument` for a zero size or a non-power-of-two alignment, and
    /// `OutOfAddressSpace` when no free range can hold the request.
    pub fn alloc(&self, size: u64, align: u64) -> BorgResult<u64> {
        if size == 0 {
            return Err(BorgError::InvalidArgument("VA allocation of zero bytes"));
        }
        if !align.is_power_of_two() {
            return Err(BorgError::InvalidArgument("VA alignment must be a power of two"));
        }

        let mut free = self.ranges();

        let found = free.iter().find_map(|(&hole, &hole_size)| {
            let addr = align_up(hole, align)?;
            let hole_end = hole + hole_size;
            let alloc_end = addr.checked_add(size)?;
            (alloc_end <= hole_end).then_some((hole, hole_end, addr, alloc_end))
        });

        let Some((hole, hole_end, addr, alloc_end)) = found else {
            return Err(BorgError::OutOfAddressSpace { size, align });
        };

        free.remove(&hole);
        if addr > hole {
            free.insert(hole, addr - hole);
        }
        if hole_end > alloc_end {
            free.insert(alloc_end, hole_end - alloc_end);
        }

        Ok(addr)
    }

    /// Returns `[addr, addr + size)` to the heap, merging it with free neighbors.
    ///
    /// The range must be exactly one that [`VaHeap::alloc`] handed out. Ranges that leave
    /// the window or overlap free space are refused and the free list is left as it was.
    ///
    /// # Errors
    /// `InvalidFree` if the range cannot have come from this heap.
    ///
    /// # Panics
    /// Panics if `addr + size` overflows a `u64`.
    pub fn free(&self, addr: u64, size: u64) -> BorgResult<()> {
        let end = addr
            .checked_add(size)
            .expect("VA range end overflows the 64-bit address space");

        if size == 0 || addr < self.start || end > self.end {
            return Err(BorgError::InvalidFree { addr, size });
        }

        let mut free = self.ranges();

        let prev = free
            .range(..=addr)
            .next_back()
            .map(|(&start, &len)| (start, start + len));
        let next = free
            .range(addr..)
            .next()
            .map(|(&start, &len)| (start, start + len));

        let overlaps_prev = prev.is_some_and(|(_, prev_end)| prev_end > addr);
        let overlaps_next = next.is_some_and(|(next_start, _)| next_start < end);
        if overlaps_prev || overlaps_next {
            return Err(BorgError::InvalidFree { addr, size });
        }

        let mut merged_start = addr;
        let mut merged_end = end;

        if let Some((prev_start, prev_end)) = prev
            && prev_end == addr
        {
            free.remove(&prev_start);
            merged_start = prev_start;
        }
        if let Some((next_start, next_end)) = next
            && next_start == end
        {
            free.remove(&next_start);
            merged_end = next_end;
        }

        free.insert(merged_start, merged_end - merged_start);
        Ok(())
    }

    /// Total number of free bytes in the window.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.ranges().values().sum()
    }

    /// Whether `[addr, addr + size)` lies entirely inside a single free range.
    #[must_use]
    pub fn is_free(&self, addr: u64, size: u64) -> bool {
        let Some(end) = addr.checked_add(size) else {
            return false;
        };
        self.ranges()
            .range(..=addr)
            .next_back()
            .is_some_and(|(&start, &len)| start + len >= end)
    }

    /// Snapshot of the free list as `(start, size)` pairs in address order.
    #[must_use]
    pub fn free_ranges(&self) -> Vec<(u64, u64)> {
        self.ranges().iter().map(|(&start, &len)| (start, len)).collect()
    }
}
