//! Cartesian composition of basic topologies, and dimension-order
//! routing over the composed fabric.
//!
//! Assembly is single-threaded and strictly ordered:
//! [`MultiDimTopology::append_dimension`] per dimension, then
//! [`MultiDimTopology::initialize_all_devices`], then
//! [`MultiDimTopology::build_switch_translation`], then one of the two
//! link-materialisation passes. After that the topology is immutable
//! and [`MultiDimTopology::route`] is a pure read-only query, safe to
//! call from concurrent readers.

use std::sync::Arc;

use log::{debug, trace};

use crate::address::{self, SwitchTranslationUnit};
use crate::bandwidth::Bandwidth;
use crate::basic::{BasicTopology, ConnectionPolicy};
use crate::fabric::{DeviceKind, Fabric, Route};
use crate::fault::FaultTable;
use crate::{DeviceId, Latency, MultiDimAddress};

pub struct MultiDimTopology {
    topology_per_dim: Vec<Box<dyn BasicTopology>>,
    npus_count: usize,
    devices_count: usize,
    npus_count_per_dim: Vec<usize>,
    bandwidth_per_dim: Vec<Bandwidth>,
    /// Zeros-prefix / ones-suffix; `true` marks a non-recursive
    /// (cluster overlay) dimension.
    non_recursive_mask: Vec<bool>,
    cluster: bool,
    faults: Arc<FaultTable>,
    translation: Option<SwitchTranslationUnit>,
    fabric: Fabric,
}

impl MultiDimTopology {
    /// Cluster mode is in effect exactly when the mask holds at least
    /// one non-recursive dimension.
    pub fn new(faults: Arc<FaultTable>, non_recursive_mask: Vec<bool>) -> Self {
        let cluster = non_recursive_mask.iter().any(|&non_recursive| non_recursive);
        MultiDimTopology {
            topology_per_dim: Vec::new(),
            npus_count: 1,
            devices_count: 0,
            npus_count_per_dim: Vec::new(),
            bandwidth_per_dim: Vec::new(),
            non_recursive_mask,
            cluster,
            faults,
            translation: None,
            fabric: Fabric::new(),
        }
    }

    #[inline]
    pub fn dims_count(&self) -> usize {
        self.topology_per_dim.len()
    }

    #[inline]
    pub fn npus_count(&self) -> usize {
        self.npus_count
    }

    #[inline]
    pub fn devices_count(&self) -> usize {
        self.devices_count
    }

    #[inline]
    pub fn npus_count_per_dim(&self) -> &[usize] {
        &self.npus_count_per_dim
    }

    #[inline]
    pub fn is_cluster(&self) -> bool {
        self.cluster
    }

    /// The installed device/link graph (the bandwidth-accounting
    /// surface).
    #[inline]
    pub fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    /// The shared fault table consulted at routing time.
    #[inline]
    pub fn faults(&self) -> &FaultTable {
        &self.faults
    }

    pub fn append_dimension(&mut self, topology: Box<dyn BasicTopology>) {
        assert!(
            self.fabric.devices_count() == 0,
            "append_dimension must precede initialize_all_devices"
        );
        let npus_count = topology.npus_count();
        self.npus_count *= npus_count;
        self.npus_count_per_dim.push(npus_count);
        self.bandwidth_per_dim.push(topology.link_bandwidth());
        self.topology_per_dim.push(topology);
    }

    /// NPUs plus one switch node per hub dimension and per combination
    /// of the coordinates above it.
    pub fn total_num_devices(&self) -> usize {
        let mut total = self.npus_count;
        for (dim, topology) in self.topology_per_dim.iter().enumerate() {
            if topology.devices_count() > topology.npus_count() {
                total += self.npus_count_per_dim[dim + 1..].iter().product::<usize>();
            }
        }
        total
    }

    /// Materialises the device arena: NPUs first, then switch nodes in
    /// switch-translation order.
    pub fn initialize_all_devices(&mut self) {
        assert!(self.dims_count() > 0, "no dimensions appended");
        assert!(self.fabric.devices_count() == 0, "devices already initialized");

        let total = self.total_num_devices();
        for _ in 0..self.npus_count {
            self.fabric.add_device(DeviceKind::Npu);
        }
        for _ in self.npus_count..total {
            self.fabric.add_device(DeviceKind::Switch);
        }
        self.devices_count = total;
    }

    /// Builds the switch translation unit, lazily: a no-op when it
    /// already exists.
    pub fn build_switch_translation(&mut self) {
        if self.translation.is_none() {
            let is_switch_dim: Vec<bool> = self
                .topology_per_dim
                .iter()
                .map(|topology| topology.devices_count() > topology.npus_count())
                .collect();
            let translation =
                SwitchTranslationUnit::new(&self.npus_count_per_dim, &is_switch_dim);
            debug_assert_eq!(translation.devices_count(), self.total_num_devices());
            self.translation = Some(translation);
        }
    }

    /// Lifts every dimension's connection policies over the full
    /// Cartesian product of the other dimensions (recursive mode).
    pub fn make_connections(&mut self) {
        let all = vec![true; self.dims_count()];
        self.materialize_links(|_| all.clone());
    }

    /// Cluster-mode materialisation: recursive dimensions stay fully
    /// replicated, while a non-recursive dimension's links form a
    /// single overlay — lifted only over the other non-recursive
    /// dimensions, with every recursive coordinate pinned to zero.
    pub fn make_non_recursive_connections(&mut self) {
        assert_eq!(
            self.non_recursive_mask.len(),
            self.dims_count(),
            "non-recursive mask length doesn't match dims_count"
        );
        let mask = self.non_recursive_mask.clone();
        let dims_count = self.dims_count();
        self.materialize_links(|dim| {
            if mask[dim] {
                mask.clone()
            } else {
                vec![true; dims_count]
            }
        });
    }

    fn materialize_links(&mut self, vary_for_dim: impl Fn(usize) -> Vec<bool>) {
        assert!(
            self.translation.is_some(),
            "switch translation unit is not initialized"
        );
        assert_eq!(self.fabric.devices_count(), self.devices_count);

        let mut planned: Vec<(DeviceId, DeviceId, Bandwidth, Latency)> = Vec::new();
        for dim in 0..self.dims_count() {
            let topology = &self.topology_per_dim[dim];
            let policies = topology.connection_policies();
            assert!(!policies.is_empty());

            let bandwidth = self.bandwidth_per_dim[dim];
            let latency = topology.link_latency();
            let vary = vary_for_dim(dim);

            for policy in &policies {
                for (src_addr, dst_addr) in self.lifted_pairs(dim, policy, &vary) {
                    let src = self.resolve(&src_addr);
                    let dst = self.resolve(&dst_addr);
                    assert!(src < self.devices_count && dst < self.devices_count);

                    // A dead link is still installed, at nominal
                    // bandwidth; routing detours via the fault table.
                    let health = self.faults.derate(src, dst);
                    let effective = if health != 0.0 {
                        bandwidth * health
                    } else {
                        bandwidth
                    };
                    planned.push((src, dst, effective, latency));
                }
            }
        }

        for (src, dst, bandwidth, latency) in planned {
            self.fabric.connect(src, dst, bandwidth, latency, false);
        }
    }

    /// All `(src, dst)` address pairs induced by lifting `policy` of
    /// dimension `dim` across the dimensions selected by `vary`;
    /// unselected dimensions stay pinned at coordinate zero.
    fn lifted_pairs(
        &self,
        dim: usize,
        policy: &ConnectionPolicy,
        vary: &[bool],
    ) -> Vec<(MultiDimAddress, MultiDimAddress)> {
        let dims_count = self.dims_count();
        let radix: Vec<usize> = (0..dims_count)
            .map(|j| {
                if j != dim && vary[j] {
                    self.npus_count_per_dim[j]
                } else {
                    1
                }
            })
            .collect();

        let mut pairs = Vec::new();
        let mut counter: MultiDimAddress = vec![0; dims_count];
        'odometer: loop {
            let mut src_addr = counter.clone();
            let mut dst_addr = counter.clone();
            src_addr[dim] = policy.src;
            dst_addr[dim] = policy.dst;
            pairs.push((src_addr, dst_addr));

            for j in 0..dims_count {
                if j == dim {
                    continue;
                }
                counter[j] += 1;
                if counter[j] < radix[j] {
                    continue 'odometer;
                }
                counter[j] = 0;
            }
            return pairs;
        }
    }

    /// Mixed-radix decode of an NPU id, least significant digit at
    /// dimension 0.
    pub fn translate_address(&self, id: DeviceId) -> MultiDimAddress {
        address::translate_address(id, &self.npus_count_per_dim)
    }

    pub fn translate_address_back(&self, addr: &[usize]) -> DeviceId {
        address::translate_address_back(addr, &self.npus_count_per_dim)
    }

    fn is_switch(&self, addr: &[usize]) -> bool {
        address::is_switch_address(addr, &self.npus_count_per_dim)
    }

    fn resolve(&self, addr: &[usize]) -> DeviceId {
        if self.is_switch(addr) {
            self.translation
                .as_ref()
                .expect("switch translation unit is not initialized")
                .translate_address_to_id(addr)
        } else {
            self.translate_address_back(addr)
        }
    }

    /// Deterministic route between two NPUs. Under faults the result
    /// may stop short of `dst`; callers detect this with
    /// [`Route::reaches`].
    pub fn route(&self, src: DeviceId, dst: DeviceId) -> Route {
        assert!(
            src < self.npus_count && dst < self.npus_count,
            "route endpoint out of range"
        );
        if src == dst {
            return Route::new(vec![src]);
        }
        if self.cluster {
            self.route_cluster(src, dst)
        } else {
            self.route_normal(src, dst)
        }
    }

    fn route_normal(&self, src: DeviceId, dst: DeviceId) -> Route {
        let order: Vec<usize> = (0..self.dims_count()).rev().collect();
        let mut budget = self.devices_count;
        Route::new(self.route_helper(src, dst, &order, &mut budget))
    }

    /// Cluster-mode routing: exit the sub-cluster via its agent, cross
    /// the top-level overlay, then descend to the destination.
    fn route_cluster(&self, src: DeviceId, dst: DeviceId) -> Route {
        let dims_count = self.dims_count();
        let normal_order: Vec<usize> = (0..dims_count).rev().collect();
        let reverse_order: Vec<usize> = (0..dims_count).collect();

        let src_addr = self.translate_address(src);

        // The sub-cluster agent: recursive coordinates zeroed.
        let mut agent_addr = src_addr.clone();
        for (coord, &non_recursive) in agent_addr.iter_mut().zip(&self.non_recursive_mask) {
            if non_recursive {
                break;
            }
            *coord = 0;
        }
        let cluster_agent = self.translate_address_back(&agent_addr);

        // The top-level agent: only the highest coordinate preserved.
        let mut top_addr: MultiDimAddress = vec![0; dims_count];
        top_addr[dims_count - 1] = src_addr[dims_count - 1];
        let top_agent = self.translate_address_back(&top_addr);

        trace!(
            "cluster route {} -> {} via agents {} and {}",
            src,
            dst,
            cluster_agent,
            top_agent
        );

        let mut budget = self.devices_count;
        let mut segments: Vec<Vec<DeviceId>> = Vec::new();
        if src != cluster_agent {
            segments.push(self.route_helper(src, cluster_agent, &normal_order, &mut budget));
        }
        if cluster_agent != top_agent {
            segments.push(self.route_helper(cluster_agent, top_agent, &reverse_order, &mut budget));
        }
        if top_agent != dst {
            segments.push(self.route_helper(top_agent, dst, &normal_order, &mut budget));
        }

        let mut hops: Vec<DeviceId> = Vec::new();
        for segment in segments {
            if segment.is_empty() {
                continue;
            }
            if hops.is_empty() {
                hops.extend(segment);
            } else {
                // Consecutive segments share their junction device.
                hops.extend(segment.into_iter().skip(1));
            }
        }
        if hops.is_empty() {
            hops.push(src);
        }
        Route::new(hops)
    }

    /// Dimension-order routing in the given dimension order, with
    /// fault-driven truncation and reroute.
    fn route_helper(
        &self,
        src: DeviceId,
        dst: DeviceId,
        order: &[usize],
        budget: &mut usize,
    ) -> Vec<DeviceId> {
        assert!(
            src < self.npus_count && dst < self.npus_count,
            "route endpoint out of range"
        );

        let dst_addr = self.translate_address(dst);
        let mut cursor_addr = self.translate_address(src);
        let mut route: Vec<DeviceId> = Vec::new();

        for &dim in order {
            if cursor_addr[dim] == dst_addr[dim] {
                continue;
            }

            // The intra-dimension endpoint: the cursor with this
            // dimension's coordinate moved to its final value.
            let mut target_addr = cursor_addr.clone();
            target_addr[dim] = dst_addr[dim];

            let local = self.topology_per_dim[dim].route(cursor_addr[dim], target_addr[dim]);

            // Lift the local hops back into global device ids; a hop
            // sitting at the dimension's NPU count is that dimension's
            // switch node.
            let mut segment: Vec<DeviceId> = Vec::with_capacity(local.len());
            for &local_id in &local {
                let mut addr = cursor_addr.clone();
                addr[dim] = local_id;
                segment.push(self.resolve(&addr));
            }

            // First dead link wins: keep the hops up to its upstream
            // device, then reroute from nearby.
            let mut fault_met = false;
            for i in 0..segment.len().saturating_sub(1) {
                if self.faults.is_down(segment[i], segment[i + 1]) {
                    trace!(
                        "dead link {} -> {} in dimension {}, truncating segment",
                        segment[i],
                        segment[i + 1],
                        dim
                    );
                    segment.truncate(i + 1);
                    fault_met = true;
                    break;
                }
            }

            if !route.is_empty() && !segment.is_empty() {
                segment.remove(0);
            }
            route.extend(segment);

            if fault_met {
                // A switch node has no NPU address to restart from.
                while route.last().map_or(false, |&id| id >= self.npus_count) {
                    route.pop();
                }
                let last_id = *route.last().expect("segment starts at an NPU");

                if *budget == 0 {
                    debug!(
                        "route {} -> {}: reroute budget exhausted, returning partial route",
                        src, dst
                    );
                    return route;
                }
                *budget -= 1;

                // Restart one step over in the next dimension, with the
                // faulted dimension demoted in the routing order.
                let next_dim = (dim + 1) % self.dims_count();
                let mut restart_addr = self.translate_address(last_id);
                restart_addr[next_dim] =
                    (restart_addr[next_dim] + 1) % self.npus_count_per_dim[next_dim];
                let restart = self.translate_address_back(&restart_addr);

                let mut new_order = order.to_vec();
                let swapped = if dim == 0 { new_order.len() - 1 } else { dim - 1 };
                new_order.swap(dim, swapped);

                debug!(
                    "route {} -> {}: rerouting from {} with dimension order {:?}",
                    src, dst, restart, new_order
                );
                let tail = self.route_helper(restart, dst, &new_order, budget);
                route.extend(tail);
                return route;
            }

            cursor_addr = target_addr;
        }

        if route.is_empty() {
            route.push(src);
        }
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandwidth::BandwidthTrait;
    use crate::basic::{Ring, Switch, TopologyMode};

    fn assemble(
        dims: Vec<Box<dyn BasicTopology>>,
        faults: Arc<FaultTable>,
        mask: Vec<bool>,
    ) -> MultiDimTopology {
        let mut topology = MultiDimTopology::new(faults, mask);
        for dim in dims {
            topology.append_dimension(dim);
        }
        topology.initialize_all_devices();
        topology.build_switch_translation();
        if topology.is_cluster() {
            topology.make_non_recursive_connections();
        } else {
            topology.make_connections();
        }
        topology
    }

    fn two_rings(faults: Arc<FaultTable>, mask: Vec<bool>) -> MultiDimTopology {
        let dims: Vec<Box<dyn BasicTopology>> = vec![
            Box::new(Ring::new(4, 100.gbps(), 1.0, true, TopologyMode::Dimension, Arc::clone(&faults))),
            Box::new(Ring::new(4, 50.gbps(), 2.0, true, TopologyMode::Dimension, Arc::clone(&faults))),
        ];
        assemble(dims, faults, mask)
    }

    #[test]
    fn cartesian_counts() {
        let topology = two_rings(Arc::new(FaultTable::empty()), vec![false, false]);
        assert_eq!(topology.dims_count(), 2);
        assert_eq!(topology.npus_count(), 16);
        assert_eq!(topology.devices_count(), 16);
        // Each ring dimension contributes 8 directed links per copy,
        // lifted over 4 copies.
        assert_eq!(topology.fabric().links_count(), 2 * 8 * 4);
    }

    #[test]
    fn switch_dimension_adds_hub_devices() {
        let faults = Arc::new(FaultTable::empty());
        let dims: Vec<Box<dyn BasicTopology>> = vec![
            Box::new(Switch::new(2, 100.gbps(), 1.0, TopologyMode::Dimension, Arc::clone(&faults))),
            Box::new(Ring::new(4, 50.gbps(), 1.0, true, TopologyMode::Dimension, Arc::clone(&faults))),
        ];
        let topology = assemble(dims, faults, vec![false, false]);
        assert_eq!(topology.npus_count(), 8);
        // One switch per coordinate of the outer ring.
        assert_eq!(topology.devices_count(), 8 + 4);
        // NPU (i, r) attaches to the dimension-0 switch of ring
        // coordinate r, which carries id 8 + r.
        for r in 0..4 {
            for i in 0..2 {
                let npu = i + 2 * r;
                assert!(topology.fabric().has_link(npu, 8 + r));
                assert!(topology.fabric().has_link(8 + r, npu));
            }
        }
    }

    #[test]
    fn per_dimension_bandwidth_and_latency_are_applied() {
        let topology = two_rings(Arc::new(FaultTable::empty()), vec![false, false]);
        // Dimension 0 hop: 0 -> 1; dimension 1 hop: 0 -> 4.
        let dim0 = topology.fabric().link(0, 1).unwrap();
        assert_eq!(dim0.bandwidth(), 100.gbps());
        assert_eq!(dim0.latency(), 1.0);
        let dim1 = topology.fabric().link(0, 4).unwrap();
        assert_eq!(dim1.bandwidth(), 50.gbps());
        assert_eq!(dim1.latency(), 2.0);
    }

    #[test]
    fn faulty_link_is_derated_but_installed() {
        let faults = Arc::new(FaultTable::new(vec![
            crate::fault::FaultEntry::new(0, 1, 0.5),
            crate::fault::FaultEntry::new(1, 2, 0.0),
        ]));
        let topology = two_rings(faults, vec![false, false]);
        assert_eq!(topology.fabric().link(0, 1).unwrap().bandwidth(), 50.gbps());
        assert_eq!(topology.fabric().link(1, 0).unwrap().bandwidth(), 50.gbps());
        // The dead link stays at nominal bandwidth.
        assert_eq!(topology.fabric().link(1, 2).unwrap().bandwidth(), 100.gbps());
    }

    #[test]
    fn address_round_trip_over_all_npus() {
        let topology = two_rings(Arc::new(FaultTable::empty()), vec![false, false]);
        for id in 0..topology.npus_count() {
            let addr = topology.translate_address(id);
            assert_eq!(topology.translate_address_back(&addr), id);
        }
    }

    #[test]
    fn normal_route_goes_high_dimension_first() {
        let topology = two_rings(Arc::new(FaultTable::empty()), vec![false, false]);
        // 0 = (0, 0), 15 = (3, 3): one anticlockwise hop per ring.
        let route = topology.route(0, 15);
        assert_eq!(route.hops(), &[0, 12, 15]);
    }

    #[test]
    fn route_to_self_is_singleton() {
        let recursive = two_rings(Arc::new(FaultTable::empty()), vec![false, false]);
        let clustered = two_rings(Arc::new(FaultTable::empty()), vec![false, true]);
        for topology in [&recursive, &clustered] {
            for x in [0, 5, 15] {
                assert_eq!(topology.route(x, x).hops(), &[x]);
            }
        }
    }

    #[test]
    fn cluster_mode_links_form_a_single_overlay() {
        let topology = two_rings(Arc::new(FaultTable::empty()), vec![false, true]);
        assert!(topology.is_cluster());
        // Recursive dimension 0 is replicated everywhere...
        assert!(topology.fabric().has_link(5, 4));
        assert!(topology.fabric().has_link(13, 14));
        // ...while the non-recursive dimension 1 only exists at
        // dimension-0 coordinate zero.
        assert!(topology.fabric().has_link(4, 8));
        assert!(!topology.fabric().has_link(5, 9));
    }

    #[test]
    fn cluster_route_transits_the_agents() {
        let topology = two_rings(Arc::new(FaultTable::empty()), vec![false, true]);
        let route = topology.route(5, 14);
        assert_eq!(route.hops(), &[5, 4, 8, 12, 13, 14]);
        for pair in route.hops().windows(2) {
            assert!(
                topology.fabric().has_link(pair[0], pair[1]),
                "missing link {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }
}
