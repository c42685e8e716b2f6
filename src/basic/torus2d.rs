//! Torus2D: a square grid with wrap-around links. Routing picks the
//! shorter wrap direction per axis, X first; dead links detour one hop
//! on the orthogonal axis with wrap arithmetic.

use std::sync::Arc;

use log::debug;

use crate::bandwidth::Bandwidth;
use crate::basic::{grid_side, materialize, BasicTopology, ConnectionPolicy, TopologyMode};
use crate::config::TopologyKind;
use crate::fabric::Fabric;
use crate::fault::FaultTable;
use crate::{DeviceId, Latency};

pub struct Torus2D {
    npus_count: usize,
    side: usize,
    bandwidth: Bandwidth,
    latency: Latency,
    bidirectional: bool,
    faults: Arc<FaultTable>,
    fabric: Option<Fabric>,
}

impl Torus2D {
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

        let mut torus = Torus2D {
            npus_count,
            side: grid_side(npus_count),
            bandwidth,
            latency,
            bidirectional,
            faults,
            fabric: None,
        };
        if mode == TopologyMode::Standalone {
            let fabric = materialize(&torus, &torus.faults);
            torus.fabric = Some(fabric);
        }
        torus
    }

    fn orthogonal_detour(&self, cur: DeviceId, cx: usize, cy: usize, vertical: bool) -> Option<DeviceId> {
        let side = self.side;
        let candidates = if vertical {
            [
                ((cy + 1) % side) * side + cx,
                ((cy + side - 1) % side) * side + cx,
            ]
        } else {
            [
                cy * side + (cx + 1) % side,
                cy * side + (cx + side - 1) % side,
            ]
        };
        candidates
            .into_iter()
            .find(|&next| next != cur && !self.faults.is_down(cur, next))
    }
}

impl BasicTopology for Torus2D {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Torus2D
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
                let right = row * side + (col + 1) % side;
                let down = ((row + 1) % side) * side + col;
                policies.push(ConnectionPolicy::new(current, right));
                policies.push(ConnectionPolicy::new(current, down));
            }
        }
        if self.bidirectional {
            for row in 0..side {
                for col in 0..side {
                    let current = row * side + col;
                    let left = row * side + (col + side - 1) % side;
                    let up = ((row + side - 1) % side) * side + col;
                    policies.push(ConnectionPolicy::new(current, left));
                    policies.push(ConnectionPolicy::new(current, up));
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
        let mut steps_left = 4 * self.npus_count;

        while cur != dst {
            if steps_left == 0 {
                debug!("torus2d route {} -> {} gave up after detour cycle", src, dst);
                break;
            }
            steps_left -= 1;

            let (cx, cy) = (cur % side, cur / side);
            let next = if cx != dx {
                // Shorter wrap direction along X.
                let diff = (dx + side - cx) % side;
                let nx = if diff > side / 2 {
                    (cx + side - 1) % side
                } else {
                    (cx + 1) % side
                };
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
                let diff = (dy + side - cy) % side;
                let ny = if diff > side / 2 {
                    (cy + side - 1) % side
                } else {
                    (cy + 1) % side
                };
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
