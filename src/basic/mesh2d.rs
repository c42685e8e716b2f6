//! Mesh2D: a square grid without wrap-around. Routing is greedy
//! XY-first; a dead link on the next intended hop triggers a one-hop
//! detour on the orthogonal axis (`+1` preferred, then `-1`), and the
//! route is cut short when no detour exists.

use std::sync::Arc;

use log::debug;

use crate::bandwidth::Bandwidth;
use crate::basic::{grid_side, materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct Mesh2D {
    npus_count: usize,
    side: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    bidirectional: bool,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl Mesh2D {
    pub fn new(
        npus_count: usize,
        bandwidth: Bandwidth,
        latency: Latency,
        bidirectional: bool,
        mode: TopologyMode,
        faults: Arc<FaultTable>,
    ) -> Self {
        assert!(npus_count > 0);
        assert!(bandwidth.val() > 0);
        assert!(latency >= 0.0);

        let mut mesh = Mesh2D {
            npus_count,
            side: grid_side(npus_count),
            bandwidth,
            latency,
            bidirectional,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&mesh, &mesh.faults);
            mesh.fabric = Some(fabric);
        }
        mesh
    }

    /// One step along the blocked hop's orthogonal axis, `+1`
    /// preferred. `None` when both candidates are out of bounds or
    /// down as well.
    fn orthogonal_detour(&self, cur: DeviceId, cx: usize, cy: usize, vertical: bool) -> Option<DeviceId> {
        let side = self.side;
        let candidates = if vertical {
            [
                (cy + 1 < side).then(|| (cy + 1) * side + cx),
                (cy >= 1).then(|| (cy - 1) * side + cx),
            ]
        } else {
            [
                (cx + 1 < side).then(|| cy * side + cx + 1),
                (cx >= 1).then(|| cy * side + cx - 1),
            ]
        };
        candidates
            .into_iter()
            .flatten()
            .find(|&next| !self.faults.is_down(cur, next))
    }
}

impl BasicTopology for Mesh2D {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Mesh2D
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        let side = self.side;
        let mut policies = Vec::new();
        for row in 0..side {
            for col in 0..side {
                let current = row * side + col;
                if col + 1 < side {
                    policies.push(ConnectionPolicy::new(current, current + 1));
                }
                if row + 1 < side {
                    policies.push(ConnectionPolicy::new(current, current + side));
                }
            }
        }
        if self.bidirectional {
            for row in 0..side {
                for col in 0..side {
                    let current = row * side + col;
                    if col >= 1 {
                        policies.push(ConnectionPolicy::new(current, current - 1));
                    }
                    if row >= 1 {
                        policies.push(ConnectionPolicy::new(current, current - side));
                    }
                }
            }
        }
        policies
    }

    fn route(&self, src: DeviceId, dst: DeviceId) -> Vec<DeviceId> {
        assert!(
            src < self.npus_count && dst < self.npus_count,
            "route endpoint out of range"
        );
        let side = self.side;
        let (dx, dy) = (dst % side, dst / side);

        let mut hops = vec![src];
        let mut cur = src;
        // Detours can revisit rows; bound the walk so a pathological
        // fault pattern yields a partial route instead of a cycle.
        let mut steps_left = 4 * self.npus_count;

        while cur != dst {
            if steps_left == 0 {
                debug!("mesh2d route {} -> {} gave up after detour cycle", src, dst);
                break;
            }
            steps_left -= 1;

            let (cx, cy) = (cur % side, cur / side);
            let next = if cx != dx {
                let nx = if dx > cx { cx + 1 } else { cx - 1 };
                let next = cy * side + nx;
                if self.faults.is_down(cur, next) {
                    match self.orthogonal_detour(cur, cx, cy, true) {
                        Some(detour) => detour,
                        None => break,
                    }
                } else {
                    next
                }
            } else {
                let ny = if dy > cy { cy + 1 } else { cy - 1 };
                let next = ny * side + cx;
                if self.faults.is_down(cur, next) {
                    match self.orthogonal_detour(cur, cx, cy, false) {
                        Some(detour) => detour,
                        None => break,
                    }
                } else {
                    next
                }
            };
            hops.push(next);
            cur = next;
        }
        hops
    }

    fn link_latency(&self) -> Latency {
        self.latency
    }

    fn link_bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    fn standalone_fabric(&self) -> Option<&Fabric> {
        self.fabric.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bandwidth::BandwidthTrait;
    use crate::fault::FaultEntry;

    fn mesh(n: usize, faults: Vec<FaultEntry>) -> Mesh2D {
        Mesh2D::new(
            n,
            100.gbps(),
            1.0,
            true,
            TopologyMode::Standalone,
            Arc::new(FaultTable::new(faults)),
        )
    }

    #[test]
    fn xy_order_without_faults() {
        let topology = mesh(9, vec![]);
        assert_eq!(topology.route(0, 8), vec![0, 1, 2, 5, 8]);
        assert_eq!(topology.route(8, 0), vec![8, 7, 6, 3, 0]);
    }

    #[test]
    fn route_length_is_manhattan_distance_plus_one() {
        let topology = mesh(16, vec![]);
        let side: usize = 4;
        for src in 0..16usize {
            for dst in 0..16usize {
                let manhattan = (src % side).abs_diff(dst % side) + (src / side).abs_diff(dst / side);
                assert_eq!(topology.route(src, dst).len(), manhattan + 1);
            }
        }
    }

    #[test]
    fn dead_link_takes_the_orthogonal_detour() {
        let topology = mesh(9, vec![FaultEntry::new(1, 2, 0.0)]);
        let route = topology.route(0, 8);
        assert_eq!(route.first(), Some(&0));
        assert_eq!(route.last(), Some(&8));
        assert_eq!(route[..3], [0, 1, 4]);
        for pair in route.windows(2) {
            assert!(!topology.faults.is_down(pair[0], pair[1]));
        }
    }

    #[test]
    fn corner_with_no_detour_yields_partial_route() {
        // 2x2 grid, both links out of NPU 0 dead: nothing to do.
        let topology = mesh(4, vec![FaultEntry::new(0, 1, 0.0), FaultEntry::new(0, 2, 0.0)]);
        let route = topology.route(0, 3);
        assert_eq!(route, vec![0]);
    }

    #[test]
    fn no_wrap_links_installed() {
        let topology = mesh(9, vec![]);
        let fabric = topology.standalone_fabric().unwrap();
        assert!(!fabric.has_link(2, 0));
        assert!(!fabric.has_link(6, 0));
        // 2 * 2 * side * (side - 1) directed links for side = 3.
        assert_eq!(fabric.links_count(), 24);
    }
}
