//! The materialised network: shared device nodes plus directed links
//! carrying effective bandwidth and latency.
//!
//! Devices live in an arena indexed by their stable [`DeviceId`]; every
//! link and every route refers to devices by id. Device ids are dense
//! and assigned in creation order, so a `DeviceId` doubles as the
//! `petgraph` node index.

use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

use fnv::FnvHashMap as HashMap;
use lazy_static::lazy_static;
use petgraph::graph::{EdgeIndex, Graph, NodeIndex};

use crate::bandwidth::Bandwidth;
use crate::{DeviceId, Latency};

lazy_static! {
    static ref LINK_ID: AtomicUsize = AtomicUsize::new(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Npu,
    Switch,
}

/// An addressable endpoint. Created once during topology assembly and
/// referred to by id everywhere else.
#[derive(Debug, Clone)]
pub struct Device {
    id: DeviceId,
    kind: DeviceKind,
}

impl Device {
    #[inline]
    pub fn new(id: DeviceId, kind: DeviceKind) -> Device {
        Device { id, kind }
    }

    #[inline]
    pub fn id(&self) -> DeviceId {
        self.id
    }

    #[inline]
    pub fn is_npu(&self) -> bool {
        matches!(self.kind, DeviceKind::Npu)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            DeviceKind::Npu => write!(f, "npu_{}", self.id),
            DeviceKind::Switch => write!(f, "switch_{}", self.id),
        }
    }
}

/// A directed link with its effective (post-derate) bandwidth and
/// latency. Identity is a process-unique id, so two links with equal
/// bandwidth are still distinguishable.
#[derive(Debug, Clone)]
pub struct Link {
    id: usize,
    pub bandwidth: Bandwidth,
    pub latency: Latency,
}

impl Link {
    #[inline]
    pub fn new(bandwidth: Bandwidth, latency: Latency) -> Link {
        Link {
            id: LINK_ID.fetch_add(1, SeqCst),
            bandwidth,
            latency,
        }
    }

    #[inline]
    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    #[inline]
    pub fn latency(&self) -> Latency {
        self.latency
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bandwidth)
    }
}

impl std::cmp::PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Link {}

impl std::hash::Hash for Link {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Device arena plus the directed link set.
#[derive(Debug, Default, Clone)]
pub struct Fabric {
    graph: Graph<Device, Link>,
    edge_map: HashMap<(DeviceId, DeviceId), EdgeIndex>,
    npus_count: usize,
}

impl Fabric {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a device; ids are handed out densely in creation order.
    pub fn add_device(&mut self, kind: DeviceKind) -> DeviceId {
        let id = self.graph.node_count();
        if kind == DeviceKind::Npu {
            self.npus_count += 1;
        }
        let ix = self.graph.add_node(Device::new(id, kind));
        debug_assert_eq!(ix.index(), id);
        id
    }

    #[inline]
    pub fn devices_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn npus_count(&self) -> usize {
        self.npus_count
    }

    #[inline]
    pub fn switches_count(&self) -> usize {
        self.graph.node_count() - self.npus_count
    }

    #[inline]
    pub fn links_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Installs the directed link `src -> dst` (both directions when
    /// `bidirectional`). A second call for the same ordered pair
    /// replaces the earlier link: construction relies on
    /// last-write-wins.
    pub fn connect(
        &mut self,
        src: DeviceId,
        dst: DeviceId,
        bandwidth: Bandwidth,
        latency: Latency,
        bidirectional: bool,
    ) {
        self.connect_directed(src, dst, bandwidth, latency);
        if bidirectional {
            self.connect_directed(dst, src, bandwidth, latency);
        }
    }

    fn connect_directed(
        &mut self,
        src: DeviceId,
        dst: DeviceId,
        bandwidth: Bandwidth,
        latency: Latency,
    ) {
        assert!(
            src < self.devices_count() && dst < self.devices_count(),
            "connect({}, {}) out of range, devices_count: {}",
            src,
            dst,
            self.devices_count()
        );
        let link = Link::new(bandwidth, latency);
        match self.edge_map.get(&(src, dst)) {
            Some(&eix) => self.graph[eix] = link,
            None => {
                let eix = self
                    .graph
                    .add_edge(NodeIndex::new(src), NodeIndex::new(dst), link);
                self.edge_map.insert((src, dst), eix);
            }
        }
    }

    /// The installed link `src -> dst`, if any.
    #[inline]
    pub fn link(&self, src: DeviceId, dst: DeviceId) -> Option<&Link> {
        self.edge_map.get(&(src, dst)).map(|&eix| &self.graph[eix])
    }

    #[inline]
    pub fn has_link(&self, src: DeviceId, dst: DeviceId) -> bool {
        self.edge_map.contains_key(&(src, dst))
    }

    /// All installed links as `(src, dst, link)`.
    pub fn links(&self) -> impl Iterator<Item = (DeviceId, DeviceId, &Link)> {
        self.graph.edge_indices().map(move |eix| {
            let (a, b) = self.graph.edge_endpoints(eix).expect("edge exists");
            (a.index(), b.index(), &self.graph[eix])
        })
    }
}

impl std::ops::Index<DeviceId> for Fabric {
    type Output = Device;
    fn index(&self, id: DeviceId) -> &Self::Output {
        &self.graph[NodeIndex::new(id)]
    }
}

/// An ordered sequence of devices produced by routing. Consecutive
/// elements are connected by installed links; under faults a route may
/// stop short of its destination (see [`Route::reaches`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    hops: Vec<DeviceId>,
}

impl Route {
    #[inline]
    pub fn new(hops: Vec<DeviceId>) -> Self {
        Route { hops }
    }

    #[inline]
    pub fn front(&self) -> Option<DeviceId> {
        self.hops.first().copied()
    }

    #[inline]
    pub fn back(&self) -> Option<DeviceId> {
        self.hops.last().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeviceId> {
        self.hops.iter()
    }

    #[inline]
    pub fn hops(&self) -> &[DeviceId] {
        &self.hops
    }

    /// Whether the route actually arrives at `dst`. False means the
    /// routing gave up under faults and the path is partial.
    #[inline]
    pub fn reaches(&self, dst: DeviceId) -> bool {
        self.back() == Some(dst)
    }
}

impl std::ops::Index<usize> for Route {
    type Output = DeviceId;
    fn index(&self, i: usize) -> &Self::Output {
        &self.hops[i]
    }
}

impl<'a> IntoIterator for &'a Route {
    type Item = &'a DeviceId;
    type IntoIter = std::slice::Iter<'a, DeviceId>;
    fn into_iter(self) -> Self::IntoIter {
        self.hops.iter()
    }
}

impl IntoIterator for Route {
    type Item = DeviceId;
    type IntoIter = std::vec::IntoIter<DeviceId>;
    fn into_iter(self) -> Self::IntoIter {
        self.hops.into_iter()
    }
}

impl From<Vec<DeviceId>> for Route {
    fn from(hops: Vec<DeviceId>) -> Self {
        Route::new(hops)
    }
}
