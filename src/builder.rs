//! Builds topologies from a validated [`NetworkConfig`]: one basic
//! topology per dimension, assembled into a [`MultiDimTopology`].

use std::sync::Arc;

use log::debug;

use crate::bandwidth::Bandwidth;
use crate::basic::{
    BasicTopology, BinaryTree, Bus, Chain, DoubleBinaryTree, FullyConnected, HyperCube,
    KingMesh2D, Mesh2D, Ring, Switch, Torus2D, TopologyMode,
};
use crate::config::{ConfigError, NetworkConfig, TopologyKind};
use crate::fault::FaultTable;
use crate::multidim::MultiDimTopology;
use crate::Latency;

/// Builds the full multi-dimensional topology: every dimension in
/// declaration order, devices, switch translation, then the link set
/// for the configured composition mode.
pub fn build_topology(config: &NetworkConfig) -> Result<MultiDimTopology, ConfigError> {
    let faults = Arc::new(FaultTable::new(config.faulty_links.clone()));

    let mut topology = MultiDimTopology::new(Arc::clone(&faults), config.non_recursive_mask.clone());
    for dim in 0..config.dims_count() {
        let basic = instantiate(
            config.topology_per_dim[dim],
            config.npus_count_per_dim[dim],
            config.bandwidth_per_dim[dim],
            config.latency_per_dim[dim],
            TopologyMode::Dimension,
            Arc::clone(&faults),
        )?;
        topology.append_dimension(basic);
    }

    topology.initialize_all_devices();
    topology.build_switch_translation();
    if topology.is_cluster() {
        topology.make_non_recursive_connections();
    } else {
        topology.make_connections();
    }

    debug!(
        "built {}-dim topology: {} npus, {} devices, {} links, cluster: {}",
        topology.dims_count(),
        topology.npus_count(),
        topology.devices_count(),
        topology.fabric().links_count(),
        topology.is_cluster()
    );
    Ok(topology)
}

/// Builds a single basic topology that owns its own devices and links.
pub fn build_standalone(
    kind: TopologyKind,
    npus_count: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
) -> Result<Box<dyn BasicTopology>, ConfigError> {
    instantiate(
        kind,
        npus_count,
        bandwidth,
        latency,
        TopologyMode::Standalone,
        faults,
    )
}

fn instantiate(
    kind: TopologyKind,
    npus_count: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    mode: TopologyMode,
    faults: Arc<FaultTable>,
) -> Result<Box<dyn BasicTopology>, ConfigError> {
    let topology: Box<dyn BasicTopology> = match kind {
        TopologyKind::Ring => Box::new(Ring::new(
            npus_count, bandwidth, latency, true, mode, faults,
        )),
        TopologyKind::FullyConnected => Box::new(FullyConnected::new(
            npus_count, bandwidth, latency, mode, faults,
        )),
        TopologyKind::Switch => Box::new(Switch::new(npus_count, bandwidth, latency, mode, faults)),
        TopologyKind::Bus => Box::new(Bus::new(npus_count, bandwidth, latency, mode, faults)),
        TopologyKind::Mesh => Box::new(Chain::new(npus_count, bandwidth, latency, mode, faults)),
        TopologyKind::BinaryTree => Box::new(BinaryTree::new(
            npus_count, bandwidth, latency, mode, faults,
        )),
        TopologyKind::DoubleBinaryTree => Box::new(DoubleBinaryTree::new(
            npus_count, bandwidth, latency, mode, faults,
        )),
        TopologyKind::HyperCube => {
            if !npus_count.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo(npus_count));
            }
            Box::new(HyperCube::new(npus_count, bandwidth, latency, mode, faults))
        }
        TopologyKind::Mesh2D => {
            let _ = checked_grid_side(kind, npus_count)?;
            Box::new(Mesh2D::new(
                npus_count, bandwidth, latency, true, mode, faults,
            ))
        }
        TopologyKind::Torus2D => {
            let _ = checked_grid_side(kind, npus_count)?;
            Box::new(Torus2D::new(
                npus_count, bandwidth, latency, true, mode, faults,
            ))
        }
        TopologyKind::KingMesh2D => {
            // One count per dimension in the configuration, so the
            // grid is square.
            let side = checked_grid_side(kind, npus_count)?;
            Box::new(KingMesh2D::new(side, side, bandwidth, latency, mode, faults))
        }
    };
    Ok(topology)
}

fn checked_grid_side(kind: TopologyKind, npus_count: usize) -> Result<usize, ConfigError> {
    let side = (npus_count as f64).sqrt().round() as usize;
    if side * side != npus_count {
        return Err(ConfigError::NotSquare {
            kind,
            got: npus_count,
        });
    }
    Ok(side)
}
