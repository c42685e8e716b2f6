//! Faulty-link table.
//!
//! A sparse list of `(src, dst, health)` triples shared read-only by
//! every topology. Lookup is undirected and first-match-wins; links
//! with no entry are healthy.

use crate::DeviceId;

/// One faulty link. `health` is the bandwidth-scaling factor in
/// `[0, 1]`; zero means the link must be routed around.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultEntry {
    pub src: DeviceId,
    pub dst: DeviceId,
    pub health: f64,
}

impl FaultEntry {
    #[inline]
    pub fn new(src: DeviceId, dst: DeviceId, health: f64) -> Self {
        FaultEntry { src, dst, health }
    }

    #[inline]
    fn matches(&self, u: DeviceId, v: DeviceId) -> bool {
        (self.src == u && self.dst == v) || (self.src == v && self.dst == u)
    }
}

/// The fault table is small (failures are sparse) and immutable after
/// construction, so a linear scan is deliberate.
#[derive(Debug, Clone, Default)]
pub struct FaultTable {
    entries: Vec<FaultEntry>,
}

impl FaultTable {
    pub fn new(entries: Vec<FaultEntry>) -> Self {
        FaultTable { entries }
    }

    pub fn empty() -> Self {
        Default::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FaultEntry] {
        &self.entries
    }

    /// Effective health of the (undirected) link between `u` and `v`.
    /// The first matching entry wins; `1.0` when none matches.
    pub fn derate(&self, u: DeviceId, v: DeviceId) -> f64 {
        for entry in &self.entries {
            if entry.matches(u, v) {
                return entry.health;
            }
        }
        1.0
    }

    /// True when the link is fully down and routing must detour.
    #[inline]
    pub fn is_down(&self, u: DeviceId, v: DeviceId) -> bool {
        self.derate(u, v) == 0.0
    }
}
