//! netfabric: a congestion-aware interconnect topology model.
//!
//! Given a declarative description of a multi-dimensional network
//! (each dimension a basic topology: ring, chain, switch, 2D grid,
//! tree, ...), this crate instantiates the implied devices and
//! directed links with bandwidth/latency annotations, routes
//! device-to-device requests deterministically with dimension-order
//! routing, and accounts for a user-supplied set of faulty links —
//! derated in bandwidth, or fully down and detoured around.
//!
//! Routing is a pure function of the topology and the fault list; it
//! never observes live link utilisation. The surrounding simulator
//! charges already-computed routes against link bandwidth shares.

pub mod bandwidth;
pub mod fabric;
pub mod fault;

pub mod basic;

pub mod address;
pub mod multidim;

pub mod builder;
pub mod config;

pub mod logging;

pub use bandwidth::{Bandwidth, BandwidthTrait};
pub use builder::{build_standalone, build_topology};
pub use config::{ConfigError, NetworkConfig, NetworkSpec, TopologyKind};
pub use fabric::{Device, DeviceKind, Fabric, Link, Route};
pub use fault::{FaultEntry, FaultTable};
pub use multidim::MultiDimTopology;

/// Stable, dense identifier of a device (NPU or switch node).
pub type DeviceId = usize;

/// Link latency, in nanoseconds.
pub type Latency = f64;

/// Coordinates of a device, one entry per dimension. Entry `d` is in
/// `[0, npus_count_per_dim[d])` for an NPU; it equals
/// `npus_count_per_dim[d]` exactly when the address designates the
/// switch node of a switch dimension.
pub type MultiDimAddress = Vec<usize>;
