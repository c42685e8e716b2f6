//! End-to-end checks of the standalone basic topologies.

use std::sync::Arc;

use netfabric::bandwidth::BandwidthTrait;
use netfabric::basic::BasicTopology;
use netfabric::{build_standalone, logging, FaultTable, TopologyKind};

fn standalone(kind: TopologyKind, npus_count: usize) -> Box<dyn BasicTopology> {
    build_standalone(
        kind,
        npus_count,
        100.gbps(),
        1.0,
        Arc::new(FaultTable::empty()),
    )
    .unwrap()
}

#[test]
fn ring_routes_take_the_shorter_direction() {
    logging::init_log();
    let ring = standalone(TopologyKind::Ring, 4);

    assert_eq!(ring.route(0, 3), vec![0, 3]);
    // Tie between the two directions: clockwise wins.
    assert_eq!(ring.route(0, 2), vec![0, 1, 2]);

    let n = 4;
    for src in 0..n {
        for dst in 0..n {
            let clockwise = (dst + n - src) % n;
            let expected = 1 + clockwise.min(n - clockwise);
            assert_eq!(ring.route(src, dst).len(), expected);
        }
    }
}

#[test]
fn fully_connected_routes_are_always_direct() {
    logging::init_log();
    let fc = standalone(TopologyKind::FullyConnected, 4);

    assert_eq!(fc.route(2, 0), vec![2, 0]);
    assert_eq!(fc.connection_policies().len(), 12);
    for src in 0..4 {
        for dst in 0..4 {
            if src != dst {
                assert_eq!(fc.route(src, dst).len(), 2);
            }
        }
    }
}

#[test]
fn switch_routes_cross_the_hub() {
    logging::init_log();
    let switch = standalone(TopologyKind::Switch, 3);

    assert_eq!(switch.devices_count(), 4);
    assert_eq!(switch.route(0, 2), vec![0, 3, 2]);
    for src in 0..3 {
        for dst in 0..3 {
            if src != dst {
                let route = switch.route(src, dst);
                assert_eq!(route.len(), 3);
                assert_eq!(route[1], 3);
            }
        }
    }
}

#[test]
fn mesh2d_routes_x_first() {
    logging::init_log();
    let mesh = standalone(TopologyKind::Mesh2D, 9);
    assert_eq!(mesh.route(0, 8), vec![0, 1, 2, 5, 8]);
}

#[test]
fn torus_wraps_the_shorter_way() {
    logging::init_log();
    let torus = standalone(TopologyKind::Torus2D, 16);
    assert_eq!(torus.route(0, 2).len(), 3);
}

#[test]
fn grid_route_lengths_match_their_metric() {
    logging::init_log();
    let side = 4;
    let n = side * side;

    let mesh = standalone(TopologyKind::Mesh2D, n);
    let torus = standalone(TopologyKind::Torus2D, n);
    let king = standalone(TopologyKind::KingMesh2D, n);

    let min_wrap = |a: usize, b: usize| {
        let d = (b + side - a) % side;
        d.min(side - d)
    };

    for src in 0..n {
        for dst in 0..n {
            let (sx, sy) = (src % side, src / side);
            let (dx, dy) = (dst % side, dst / side);

            let manhattan = sx.abs_diff(dx) + sy.abs_diff(dy);
            assert_eq!(mesh.route(src, dst).len(), manhattan + 1);

            let wrap_manhattan = min_wrap(sx, dx) + min_wrap(sy, dy);
            assert_eq!(torus.route(src, dst).len(), wrap_manhattan + 1);

            let chebyshev = sx.abs_diff(dx).max(sy.abs_diff(dy));
            assert_eq!(king.route(src, dst).len(), chebyshev + 1);
        }
    }
}

#[test]
fn routes_without_faults_follow_installed_links() {
    logging::init_log();
    let cases = [
        (TopologyKind::Ring, 6),
        (TopologyKind::FullyConnected, 5),
        (TopologyKind::Switch, 4),
        (TopologyKind::Bus, 4),
        (TopologyKind::Mesh, 5),
        (TopologyKind::BinaryTree, 10),
        (TopologyKind::DoubleBinaryTree, 10),
        (TopologyKind::HyperCube, 8),
        (TopologyKind::Mesh2D, 9),
        (TopologyKind::Torus2D, 9),
        (TopologyKind::KingMesh2D, 9),
    ];
    for (kind, npus_count) in cases {
        let topology = standalone(kind, npus_count);
        let fabric = topology.standalone_fabric().expect("standalone");
        for src in 0..npus_count {
            for dst in 0..npus_count {
                let route = topology.route(src, dst);
                assert_eq!(route.first(), Some(&src), "{kind}: route must start at src");
                assert_eq!(route.last(), Some(&dst), "{kind}: route must end at dst");
                for pair in route.windows(2) {
                    assert!(
                        fabric.has_link(pair[0], pair[1]),
                        "{kind}: hop {} -> {} is not an installed link",
                        pair[0],
                        pair[1]
                    );
                }
            }
        }
    }
}

#[test]
fn two_npus_work_everywhere_legal() {
    logging::init_log();
    let kinds = [
        TopologyKind::Ring,
        TopologyKind::FullyConnected,
        TopologyKind::Switch,
        TopologyKind::Bus,
        TopologyKind::Mesh,
        TopologyKind::BinaryTree,
        TopologyKind::DoubleBinaryTree,
        TopologyKind::HyperCube,
    ];
    for kind in kinds {
        let topology = standalone(kind, 2);
        let route = topology.route(0, 1);
        assert_eq!(route.first(), Some(&0), "{kind}");
        assert_eq!(route.last(), Some(&1), "{kind}");
    }
}
