//! End-to-end checks of the non-recursive (cluster) composition mode.

use netfabric::{build_topology, logging, ConfigError, NetworkConfig, NetworkSpec};

fn build(spec: &NetworkSpec) -> netfabric::MultiDimTopology {
    build_topology(&NetworkConfig::validate(spec).unwrap()).unwrap()
}

fn clustered_rings() -> NetworkSpec {
    NetworkSpec {
        topology: vec!["Ring".into(), "Ring".into()],
        npus_count: vec![4, 4],
        bandwidth: vec![100.0, 100.0],
        latency: vec![1.0, 1.0],
        non_recursive_from: Some(1),
        ..Default::default()
    }
}

#[test]
fn cluster_route_exits_via_the_agents() {
    logging::init_log();
    let topology = build(&clustered_rings());
    assert!(topology.is_cluster());

    // (1,1) -> (2,3): out to the local agent (0,1) = 4, along the top
    // dimension to (0,3) = 12, then out to (2,3) = 14.
    let route = topology.route(5, 14);
    assert_eq!(route.front(), Some(5));
    assert!(route.reaches(14));
    assert_eq!(route.hops(), &[5, 4, 8, 12, 13, 14]);
    for pair in route.hops().windows(2) {
        assert!(
            topology.fabric().has_link(pair[0], pair[1]),
            "hop {} -> {} is not an installed link",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn overlay_links_exist_only_at_the_agents() {
    logging::init_log();
    let topology = build(&clustered_rings());

    // The recursive dimension is replicated across the overlay...
    for row in 0..4 {
        let base = 4 * row;
        assert!(topology.fabric().has_link(base, base + 1));
        assert!(topology.fabric().has_link(base + 1, base));
    }
    // ...the non-recursive dimension exists once, at recursive
    // coordinate zero.
    assert!(topology.fabric().has_link(0, 4));
    assert!(topology.fabric().has_link(4, 8));
    assert!(topology.fabric().has_link(12, 0));
    assert!(!topology.fabric().has_link(1, 5));
    assert!(!topology.fabric().has_link(5, 9));
}

#[test]
fn every_pair_routes_over_installed_links() {
    logging::init_log();
    let topology = build(&clustered_rings());
    for src in 0..topology.npus_count() {
        for dst in 0..topology.npus_count() {
            let route = topology.route(src, dst);
            assert_eq!(route.front(), Some(src));
            assert!(route.reaches(dst), "route {} -> {} fell short", src, dst);
            for pair in route.hops().windows(2) {
                assert!(
                    topology.fabric().has_link(pair[0], pair[1]),
                    "route {} -> {}: hop {} -> {} is not installed",
                    src,
                    dst,
                    pair[0],
                    pair[1]
                );
            }
        }
    }
}

#[test]
fn three_level_cluster_routes_end_to_end() {
    logging::init_log();
    let spec = NetworkSpec {
        topology: vec!["Ring".into(), "Ring".into(), "Ring".into()],
        npus_count: vec![2, 2, 2],
        bandwidth: vec![100.0, 100.0, 100.0],
        latency: vec![1.0, 1.0, 1.0],
        non_recursive_from: Some(1),
        ..Default::default()
    };
    let topology = build(&spec);
    assert!(topology.is_cluster());
    for src in 0..topology.npus_count() {
        for dst in 0..topology.npus_count() {
            let route = topology.route(src, dst);
            assert_eq!(route.front(), Some(src));
            assert!(route.reaches(dst), "route {} -> {} fell short", src, dst);
            for pair in route.hops().windows(2) {
                assert!(
                    topology.fabric().has_link(pair[0], pair[1]),
                    "route {} -> {}: hop {} -> {} is not installed",
                    src,
                    dst,
                    pair[0],
                    pair[1]
                );
            }
        }
    }
}

#[test]
fn equivalent_mask_and_crossover_declarations_agree() {
    logging::init_log();
    let by_crossover = build(&clustered_rings());

    let mut spec = clustered_rings();
    spec.non_recursive_from = None;
    spec.non_recursive_topology = Some(vec![0, 1]);
    let by_mask = build(&spec);

    assert_eq!(
        by_crossover.fabric().links_count(),
        by_mask.fabric().links_count()
    );
    for (src, dst, _) in by_crossover.fabric().links() {
        assert!(by_mask.fabric().has_link(src, dst));
    }
    assert_eq!(
        by_crossover.route(5, 14).hops(),
        by_mask.route(5, 14).hops()
    );
}

#[test]
fn mixed_masks_are_rejected() {
    logging::init_log();
    let mut spec = clustered_rings();
    spec.non_recursive_from = None;

    for bad in [vec![1, 0], vec![1, 0, 1], vec![0, 1, 0]] {
        let mut broken = spec.clone();
        broken.topology = vec!["Ring".into(); bad.len()];
        broken.npus_count = vec![4; bad.len()];
        broken.bandwidth = vec![100.0; bad.len()];
        broken.latency = vec![1.0; bad.len()];
        broken.non_recursive_topology = Some(bad);
        assert!(matches!(
            NetworkConfig::validate(&broken).unwrap_err(),
            ConfigError::MaskShape(_)
        ));
    }
}
