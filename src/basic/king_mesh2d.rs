//! KingMesh2D: an `nx` by `ny` grid where every NPU also links to its
//! diagonal neighbours (the king's move neighbourhood, no wrap).
//! Routing steps diagonally while both axes still need progress and
//! falls back to single-axis moves on fault.

use std::sync::Arc;

use log::debug;

use crate::bandwidth::Bandwidth;
use crate::basic::{materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct KingMesh2D {
    npus_count: usize,
    nx: usize,
    ny: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl KingMesh2D {
    pub fn new(
        nx: usize,
        ny: usize,
        bandwidth: Bandwidth,
        latency: Latency,
        mode: TopologyMode,
        faults: Arc<FaultTable>,
    ) -> Self {
        assert!(nx > 0 && ny > 0);
        assert!(bandwidth.val() > 0);
        assert!(latency >= 0.0);

        let mut mesh = KingMesh2D {
            npus_count: nx * ny,
            nx,
            ny,
            bandwidth,
            latency,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&mesh, &mesh.faults);
            mesh.fabric = Some(fabric);
        }
        mesh
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> DeviceId {
        y * self.nx + x
    }

    /// Single-axis fallback: try X progress first, then Y, skipping
    /// dead links.
    fn axis_move(
        &self,
        cur: DeviceId,
        cx: usize,
        cy: usize,
        step_x: isize,
        step_y: isize,
    ) -> Option<DeviceId> {
        if step_x != 0 {
            let next = self.at((cx as isize + step_x) as usize, cy);
            if !self.faults.is_down(cur, next) {
                return Some(next);
            }
        }
        if step_y != 0 {
            let next = self.at(cx, (cy as isize + step_y) as usize);
            if !self.faults.is_down(cur, next) {
                return Some(next);
            }
        }
        None
    }

    /// One-hop detour on the orthogonal axis when a single-axis move
    /// is blocked, `+1` preferred.
    fn orthogonal_detour(&self, cur: DeviceId, cx: usize, cy: usize, vertical: bool) -> Option<DeviceId> {
        let candidates = if vertical {
            [
                (cy + 1 < self.ny).then(|| self.at(cx, cy + 1)),
                (cy >= 1).then(|| self.at(cx, cy - 1)),
            ]
        } else {
            [
                (cx + 1 < self.nx).then(|| self.at(cx + 1, cy)),
                (cx >= 1).then(|| self.at(cx - 1, cy)),
            ]
        };
        candidates
            .into_iter()
            .flatten()
            .find(|&next| !self.faults.is_down(cur, next))
    }
}

impl BasicTopology for KingMesh2D {
    fn kind(&self) -> TopologyKind {
        TopologyKind::KingMesh2D
    }

    fn npus_count(&self) -> usize {
        self.npus_count
    }

    fn devices_count(&self) -> usize {
        self.npus_count
    }

    fn connection_policies(&self) -> Vec<ConnectionPolicy> {
        // The 8-neighbourhood sweep is symmetric, so both directions of
        // every link are already emitted.
        let mut policies = Vec::new();
        for row in 0..self.ny {
            for col in 0..self.nx {
                let current = self.at(col, row);
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let new_col = col as i64 + dx;
                        let new_row = row as i64 + dy;
                        if (0..self.nx as i64).contains(&new_col)
                            && (0..self.ny as i64).contains(&new_row)
                        {
                            policies.push(ConnectionPolicy::new(
                                current,
                                self.at(new_col as usize, new_row as usize),
                            ));
                        }
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
        let (dx, dy) = (dst % self.nx, dst / self.nx);

        let mut hops = vec![src];
        let mut cur = src;
        let mut steps_left = 4 * self.npus_count;

        while cur != dst {
            if steps_left == 0 {
                debug!("king mesh route {} -> {} gave up after detour cycle", src, dst);
                break;
            }
            steps_left -= 1;

            let (cx, cy) = (cur % self.nx, cur / self.nx);
            let step_x: isize = match dx.cmp(&cx) {
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
            };
            let step_y: isize = match dy.cmp(&cy) {
                std::cmp::Ordering::Greater => 1,
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
            };

            let next = if step_x != 0 && step_y != 0 {
                // Diagonal move while both axes need progress.
                let diagonal = self.at(
                    (cx as isize + step_x) as usize,
                    (cy as isize + step_y) as usize,
                );
                if self.faults.is_down(cur, diagonal) {
                    match self.axis_move(cur, cx, cy, step_x, step_y) {
                        Some(next) => next,
                        None => break,
                    }
                } else {
                    diagonal
                }
            } else if step_x != 0 {
                let next = self.at((cx as isize + step_x) as usize, cy);
                if self.faults.is_down(cur, next) {
                    match self.orthogonal_detour(cur, cx, cy, true) {
                        Some(detour) => detour,
                        None => break,
                    }
                } else {
                    next
                }
            } else {
                let next = self.at(cx, (cy as isize + step_y) as usize);
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

    fn king(nx: usize, ny: usize, faults: Vec<FaultEntry>) -> KingMesh2D {
        KingMesh2D::new(
            nx,
            ny,
            100.gbps(),
            1.0,
            TopologyMode::Standalone,
            Arc::new(FaultTable::new(faults)),
        )
    }

    #[test]
    fn diagonal_route_covers_chebyshev_distance() {
        let topology = king(3, 3, vec![]);
        assert_eq!(topology.route(0, 8), vec![0, 4, 8]);
        for src in 0..9usize {
            for dst in 0..9usize {
                let chebyshev =
                    ((src % 3).abs_diff(dst % 3)).max((src / 3).abs_diff(dst / 3));
                assert_eq!(topology.route(src, dst).len(), chebyshev + 1);
            }
        }
    }

    #[test]
    fn rectangular_grids_are_supported() {
        let topology = king(4, 2, vec![]);
        assert_eq!(topology.npus_count(), 8);
        assert_eq!(topology.route(0, 7), vec![0, 5, 6, 7]);
    }

    #[test]
    fn corner_has_three_neighbours() {
        let topology = king(3, 3, vec![]);
        let fabric = topology.standalone_fabric().unwrap();
        assert!(fabric.has_link(0, 1));
        assert!(fabric.has_link(0, 3));
        assert!(fabric.has_link(0, 4));
        assert!(!fabric.has_link(0, 2));
        // 8 inner degrees: corners 3, edges 5, centre 8.
        assert_eq!(fabric.links_count(), 4 * 3 + 4 * 5 + 8);
    }

    #[test]
    fn dead_diagonal_falls_back_to_single_axis() {
        let topology = king(3, 3, vec![FaultEntry::new(0, 4, 0.0)]);
        let route = topology.route(0, 8);
        assert_eq!(route.first(), Some(&0));
        assert_eq!(route.last(), Some(&8));
        assert_eq!(route[1], 1);
        for pair in route.windows(2) {
            assert!(!topology.faults.is_down(pair[0], pair[1]));
        }
    }
}
