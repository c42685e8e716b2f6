//! Basic (single-dimension) topologies.
//!
//! Each variant owns its NPU slice, knows its device count, exposes
//! the canonical set of directed links it wants to exist, and routes
//! locally. A variant is constructed either standalone (it
//! materialises its own device/link fabric) or as one dimension of a
//! [`crate::MultiDimTopology`] (the outer topology materialises the
//! links by lifting the connection policies).

use crate::bandwidth::Bandwidth;
use crate::config::TopologyKind;
use crate::fabric::{DeviceKind, Fabric};
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

mod bus;
mod chain;
mod fully_connected;
mod hypercube;
mod king_mesh2d;
mod mesh2d;
mod ring;
mod switch;
mod torus2d;
mod tree;

pub use bus::Bus;
pub use chain::Chain;
pub use fully_connected::FullyConnected;
pub use hypercube::HyperCube;
pub use king_mesh2d::KingMesh2D;
pub use mesh2d::Mesh2D;
pub use ring::Ring;
pub use switch::Switch;
pub use torus2d::Torus2D;
pub use tree::{BinaryTree, DoubleBinaryTree};

/// A directed link the topology wants to exist, prior to
/// bandwidth/latency/fault resolution. Bidirectional topologies emit
/// both `(a, b)` and `(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionPolicy {
    pub src: DeviceId,
    pub dst: DeviceId,
}

impl ConnectionPolicy {
    #[inline]
    pub fn new(src: DeviceId, dst: DeviceId) -> Self {
        ConnectionPolicy { src, dst }
    }
}

/// Whether a topology materialises its own fabric or defers to the
/// enclosing multi-dimensional topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyMode {
    Standalone,
    Dimension,
}

/// Capability surface of a basic topology.
///
/// `route` works on local device ids (`0..devices_count()`), returns
/// `[src]` when `src == dst`, and under faults may return a path that
/// stops short of `dst`.
pub trait BasicTopology: Send + Sync {
    fn kind(&self) -> TopologyKind;

    fn npus_count(&self) -> usize;

    /// Larger than `npus_count` exactly when the topology introduces a
    /// switch (hub) node.
    fn devices_count(&self) -> usize;

    /// The canonical directed edges this topology requires. The set is
    /// deterministic and stable.
    fn connection_policies(&self) -> Vec<ConnectionPolicy>;

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId>;

    fn link_latency(&self) -> Latency;

    /// Nominal per-link bandwidth of this dimension, as consumed by
    /// the enclosing topology when lifting the dimension.
    fn link_bandwidth(&self) -> Bandwidth;

    /// Per-link nominal used when self-materialising. Ring folds its
    /// two parallel directions into a doubled effective capacity.
    fn standalone_link_bandwidth(&self) -> Bandwidth {
        self.link_bandwidth()
    }

    /// The materialised fabric; `Some` only in standalone mode.
    fn standalone_fabric(&self) -> Option<&Fabric>;
}

/// Builds the standalone fabric of a basic topology: devices first
/// (NPUs, then any hub node), then one directed link per connection
/// policy.
///
/// A faulty link is installed at `bandwidth * health`; a fully-down
/// link (`health == 0`) is still installed at full nominal bandwidth.
/// Its brokenness lives in the fault table alone, consulted at
/// routing time, so that link existence stays observable to bandwidth
/// accounting.
pub(crate) fn materialize(topology: &dyn BasicTopology, faults: &FaultTable) -> Fabric {
    let mut fabric = Fabric::new();
    for _ in 0..topology.npus_count() {
        fabric.add_device(DeviceKind::Npu);
    }
    for _ in topology.npus_count()..topology.devices_count() {
        fabric.add_device(DeviceKind::Switch);
    }

    let bandwidth = topology.standalone_link_bandwidth();
    let latency = topology.link_latency();
    for policy in topology.connection_policies() {
        let health = faults.derate(policy.src, policy.dst);
        let effective = if health != 0.0 {
            bandwidth * health
        } else {
            bandwidth
        };
        fabric.connect(policy.src, policy.dst, effective, latency, false);
    }
    fabric
}

/// Side length of a square grid topology. Panics when `npus_count` is
/// not a perfect square; the builder validates this upfront for
/// configured topologies.
pub(crate) fn grid_side(npus_count: usize) -> usize {
    let side = (npus_count as f64).sqrt().round() as usize;
    assert!(
        side * side == npus_count,
        "2D grid requires a square npus_count, got {}",
        npus_count
    );
    side
}
