//! Registry of memory regions eligible for upsets.
//!
//! Regions live in an arena keyed by a monotonically increasing
//! [`RegionId`], so arena order is registration order and iteration
//! (newest first) is a reverse walk.  A secondary index maps start
//! addresses to every handle registered there; duplicates are kept, and
//! [`RegionRegistry::unregister`] removes the newest one, matching a
//! front-to-back scan of a push-front list.
//!
//! Overlapping regions are not rejected.  Each accrues faults
//! independently.

use bitflips_protocol::{split_flags, ElementType, Layout};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Stable handle of a registered region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(u64);

impl RegionId {
    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

/// Where a region was registered from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provenance {
    /// Host thread that issued the registration.
    pub thread: u32,
    /// Engine tick count at registration.
    pub tick: u64,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread {} @ tick {}", self.thread, self.tick)
    }
}

/// A contiguous, typed block of guest memory susceptible to upsets.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRegion {
    pub id: RegionId,
    pub start: u64,
    /// Last byte of the region (`start + num_bytes - 1`); meaningless when
    /// `num_bytes == 0`.
    pub end: u64,
    /// Raw type code as registered.
    pub type_code: u32,
    /// `None` when the type code is not one of the known element types.
    pub element_type: Option<ElementType>,
    pub layout: Layout,
    pub rows: u64,
    pub cols: u64,
    pub num_elems: u64,
    pub num_bytes: u64,
    pub kilobytes: f64,
    /// Expected flip events not yet materialised.  In `[0, 1)` between ticks.
    pub fault_carry: f64,
    pub description: String,
    pub provenance: Provenance,
}

impl MemoryRegion {
    fn new(
        id: RegionId,
        start: u64,
        rows: u64,
        cols: u64,
        flags: u32,
        description: String,
        provenance: Provenance,
    ) -> Self {
        let (type_code, layout_bits) = split_flags(flags);
        let element_type = ElementType::from_code(type_code);
        let width = element_type.map_or(0, |t| u64::from(t.width_bytes()));

        let num_elems = rows.saturating_mul(cols);
        let num_bytes = num_elems.saturating_mul(width);
        let end = start.saturating_add(num_bytes.saturating_sub(1));

        Self {
            id,
            start,
            end,
            type_code,
            element_type,
            layout: Layout::from_bits(layout_bits),
            rows,
            cols,
            num_elems,
            num_bytes,
            kilobytes: num_bytes as f64 / 1000.0,
            fault_carry: 0.0,
            description,
            provenance,
        }
    }

    /// Width of one element in bytes (0 for an unknown type).
    pub fn element_width(&self) -> u32 {
        self.element_type.map_or(0, ElementType::width_bytes)
    }

    /// Whether `addr` lies inside the region.
    pub fn contains(&self, addr: u64) -> bool {
        self.num_bytes > 0 && addr >= self.start && addr <= self.end
    }

    /// Address of element `n` (no bounds check).
    pub fn element_address(&self, n: u64) -> u64 {
        self.start
            .wrapping_add(n.wrapping_mul(u64::from(self.element_width())))
    }

    fn element_offset(&self, addr: u64) -> u64 {
        match self.element_width() {
            0 => 0,
            w => addr.wrapping_sub(self.start) / u64::from(w),
        }
    }

    /// Matrix column of the element at `addr`.
    pub fn col_of(&self, addr: u64) -> u64 {
        if self.rows == 0 {
            return 0;
        }
        let offset = self.element_offset(addr);
        match self.layout {
            Layout::ColMajor => offset / self.rows,
            _ => offset % self.rows,
        }
    }

    /// Matrix row of the element at `addr`.
    pub fn row_of(&self, addr: u64) -> u64 {
        if self.cols == 0 {
            return 0;
        }
        let offset = self.element_offset(addr);
        match self.layout {
            Layout::RowMajor => offset / self.cols,
            _ => offset % self.cols,
        }
    }
}

/// Insertion-ordered collection of registered regions.
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: BTreeMap<RegionId, MemoryRegion>,
    by_start: HashMap<u64, Vec<RegionId>>,
    next_id: u64,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a region and return its handle.
    ///
    /// `flags` carries the element type in its low bits and the layout in
    /// its high bits.  Nothing is validated: zero-sized and overlapping
    /// regions are accepted.
    pub fn register(
        &mut self,
        start: u64,
        rows: u64,
        cols: u64,
        flags: u32,
        description: impl Into<String>,
        provenance: Provenance,
    ) -> RegionId {
        let id = RegionId::from_raw(self.next_id);
        self.next_id += 1;

        let region = MemoryRegion::new(id, start, rows, cols, flags, description.into(), provenance);
        self.regions.insert(id, region);
        self.by_start.entry(start).or_default().push(id);
        id
    }

    /// Remove the most recently registered region starting at `start`.
    ///
    /// Returns `None` (and changes nothing) if no region starts there.
    pub fn unregister(&mut self, start: u64) -> Option<MemoryRegion> {
        let ids = self.by_start.get_mut(&start)?;
        let id = ids.pop()?;
        if ids.is_empty() {
            self.by_start.remove(&start);
        }
        self.regions.remove(&id)
    }

    /// Regions, most recently registered first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MemoryRegion> {
        self.regions.values().rev()
    }

    /// Mutable regions, most recently registered first.
    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut MemoryRegion> {
        self.regions.values_mut().rev()
    }

    pub fn get(&self, id: RegionId) -> Option<&MemoryRegion> {
        self.regions.get(&id)
    }

    /// First region in iteration order containing `addr`.
    pub fn region_containing(&self, addr: u64) -> Option<&MemoryRegion> {
        self.iter().find(|r| r.contains(addr))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of every region's size in kilobytes.
    pub fn total_kilobytes(&self) -> f64 {
        self.regions.values().map(|r| r.kilobytes).sum()
    }

    /// Drop every region.
    pub fn clear(&mut self) {
        self.regions.clear();
        self.by_start.clear();
    }
}
