use std::collections::BTreeSet;

use griffith::front::{CrackFront, CrackFrontConfig, DirectionStrategy, PointFrontConfig};
use griffith::nalgebra::{Point3, Vector3};
use griffith::qfunction::{GeometricQFunction, QFunction, RingMembership, TopologicalQFunction};

use super::{chain_mesh, grid_node, hex_grid_mesh};

fn straight_front_along_z() -> CrackFront<f64> {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(0.0, 0.0, 2.0),
    ];
    let config = PointFrontConfig::new(DirectionStrategy::FixedVector(Vector3::x()));
    CrackFront::from_points(points, &config).unwrap()
}

#[test]
fn geometric_weights_ramp_radially_and_tangentially() {
    let front = straight_front_along_z();
    let q = GeometricQFunction::new(&front, 0.5, 1.5).unwrap();

    // Inside the inner radius the weight is 1.
    assert_eq!(q.node_weight(1, 0, &Point3::new(0.3, 0.0, 1.0)), 1.0);
    // Halfway down the radial ramp.
    let weight = q.node_weight(1, 0, &Point3::new(1.0, 0.0, 1.0));
    assert!((weight - 0.5).abs() < 1e-14);
    // Beyond the outer radius.
    assert_eq!(q.node_weight(1, 0, &Point3::new(2.0, 0.0, 1.0)), 0.0);
    // The radius is measured perpendicular to the tangent.
    let weight = q.node_weight(1, 0, &Point3::new(0.6, 0.8, 1.0));
    assert!((weight - 0.5).abs() < 1e-14);

    // Tangential tent towards the forward neighbor.
    let weight = q.node_weight(1, 0, &Point3::new(0.3, 0.0, 1.5));
    assert!((weight - 0.5).abs() < 1e-14);
    // A node past the neighbor clamps to 0 instead of going negative.
    assert_eq!(q.node_weight(1, 0, &Point3::new(0.3, 0.0, 2.5)), 0.0);

    // The first point has a zero-length backward segment, so the weight does
    // not decay off the open end.
    assert_eq!(q.node_weight(0, 0, &Point3::new(0.3, 0.0, -0.3)), 1.0);
    let weight = q.node_weight(0, 0, &Point3::new(0.3, 0.0, 0.4));
    assert!((weight - 0.6).abs() < 1e-14);
}

#[test]
fn geometric_weights_decrease_with_radius() {
    let front = straight_front_along_z();
    let q = GeometricQFunction::new(&front, 0.5, 1.5).unwrap();

    let mut previous = f64::INFINITY;
    for step in 0..=8 {
        let radius = 0.25 * step as f64;
        let weight = q.node_weight(1, 0, &Point3::new(radius, 0.0, 1.0));
        assert!((0.0..=1.0).contains(&weight));
        assert!(weight <= previous);
        previous = weight;
    }
}

#[test]
fn geometric_weights_ignore_the_tangent_in_2d() {
    let mut config = PointFrontConfig::new(DirectionStrategy::FixedVector(Vector3::x()));
    config.treat_as_2d = true;
    let front = CrackFront::<f64>::from_points(vec![Point3::origin()], &config).unwrap();
    let q = GeometricQFunction::new(&front, 0.5, 1.5).unwrap();

    // Offsets along the out-of-plane axis do not affect the weight.
    assert_eq!(q.node_weight(0, 0, &Point3::new(0.3, 0.0, 57.0)), 1.0);
    let weight = q.node_weight(0, 0, &Point3::new(0.0, 1.0, -3.0));
    assert!((weight - 0.5).abs() < 1e-14);
}

#[test]
fn geometric_radii_are_validated() {
    let front = straight_front_along_z();
    for (inner, outer) in [(-0.1, 1.0), (1.0, 1.0), (1.0, 0.5)] {
        let error = GeometricQFunction::new(&front, inner, outer).unwrap_err();
        assert!(error.to_string().contains("0 <= inner < outer"));
    }
}

#[test]
fn topological_rings_grow_by_element_connectivity() {
    // Two stacked front nodes in the middle of a 4x4x1 grid.
    let mesh = hex_grid_mesh(4, 4, 1);
    let lower = grid_node(4, 4, 2, 2, 0);
    let upper = grid_node(4, 4, 2, 2, 1);
    let mesh = mesh.with_node_set("front", [lower, upper]).unwrap();
    let config = CrackFrontConfig::new("front", DirectionStrategy::FixedVector(Vector3::x()));
    let front = CrackFront::from_mesh(&mesh, &config).unwrap();

    // Canonical ordering starts at the node with more positive coordinates.
    let seeds = front.seed_nodes().unwrap();
    assert_eq!(seeds[0], vec![upper]);
    assert_eq!(seeds[1], vec![lower]);

    let q = TopologicalQFunction::new(&front, &mesh, 1).unwrap();

    assert_eq!(q.ring_nodes(0, 0), BTreeSet::from([upper]));
    assert_eq!(q.ring_nodes(1, 0), BTreeSet::from([lower]));

    // Ring 1 holds the remaining nodes of the four incident element columns.
    let mut expected = BTreeSet::new();
    for k in 0..=1 {
        for j in 1..=3 {
            for i in 1..=3 {
                expected.insert(grid_node(4, 4, i, j, k));
            }
        }
    }
    expected.remove(&lower);
    expected.remove(&upper);
    assert_eq!(expected.len(), 16);
    assert_eq!(q.ring_nodes(0, 1), expected);
    // Same-level rings of adjacent front points may overlap; here the two
    // points share all their incident elements, so the rings coincide.
    assert_eq!(q.ring_nodes(1, 1), q.ring_nodes(0, 1));

    // Levels of a fixed front point are pairwise disjoint.
    assert!(q.ring_nodes(0, 0).is_disjoint(&q.ring_nodes(0, 1)));
    assert!(q.ring_nodes(0, 1).is_disjoint(&q.ring_nodes(0, 2)));

    // Ring 2 picks up every node not yet assigned around either point.
    assert_eq!(q.ring_nodes(0, 2).len(), 50 - 18);
}

#[test]
fn topological_weights_are_cumulative_indicator_values() {
    let mesh = hex_grid_mesh(4, 4, 1);
    let lower = grid_node(4, 4, 2, 2, 0);
    let upper = grid_node(4, 4, 2, 2, 1);
    let mesh = mesh.with_node_set("front", [lower, upper]).unwrap();
    let config = CrackFrontConfig::new("front", DirectionStrategy::FixedVector(Vector3::x()));
    let front = CrackFront::from_mesh(&mesh, &config).unwrap();
    let q = TopologicalQFunction::new(&front, &mesh, 1).unwrap();

    let origin = Point3::<f64>::origin();
    // Point 0 is seeded by the upper node.
    assert_eq!(q.node_weight(0, upper, &origin), 1.0);
    assert_eq!(q.node_weight(1, lower, &origin), 1.0);
    // The other point's seed is excluded from ring 1.
    assert_eq!(q.node_weight(0, lower, &origin), 0.0);
    // A ring-1 node has full weight, a far corner has none.
    assert_eq!(q.node_weight(0, grid_node(4, 4, 1, 1, 0), &origin), 1.0);
    assert_eq!(q.node_weight(0, grid_node(4, 4, 0, 0, 0), &origin), 0.0);
}

#[test]
fn collapsed_2d_fronts_seed_all_their_nodes() {
    let mesh = hex_grid_mesh(4, 4, 1);
    let lower = grid_node(4, 4, 2, 2, 0);
    let upper = grid_node(4, 4, 2, 2, 1);
    let mesh = mesh.with_node_set("front", [lower, upper]).unwrap();
    let mut config = CrackFrontConfig::new("front", DirectionStrategy::FixedVector(Vector3::x()));
    config.treat_as_2d = true;
    let front = CrackFront::from_mesh(&mesh, &config).unwrap();
    let q = TopologicalQFunction::new(&front, &mesh, 0).unwrap();

    assert_eq!(front.num_points(), 1);
    assert_eq!(q.ring_nodes(0, 0), BTreeSet::from([lower, upper]));
    assert_eq!(q.ring_nodes(0, 1).len(), 16);
}

#[test]
fn point_defined_fronts_cannot_use_topological_rings() {
    let front = straight_front_along_z();
    let mesh = hex_grid_mesh(2, 2, 2);
    let error = TopologicalQFunction::new(&front, &mesh, 1).unwrap_err();
    assert!(error.to_string().contains("defined by mesh nodes"));
}

#[test]
fn ring_exclusion_wraps_around_closed_loops() {
    // Eight nodes on a circle, front points on every other node.
    let positions: Vec<_> = (0..8)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / 8.0;
            Point3::new(angle.cos(), angle.sin(), 0.0)
        })
        .collect();
    let mesh = chain_mesh(positions, true);
    let seeds = vec![vec![0], vec![2], vec![4], vec![6]];

    // Ring 1 of the first point spreads to both chain neighbors.
    let closed = RingMembership::new(seeds.clone(), true);
    assert_eq!(closed.ring_nodes(&mesh, 0, 1), BTreeSet::from([1, 7]));
    // With wrap-around adjacency the last point's rings already claim nodes
    // 5, 6 and 7, leaving nothing for ring 2 of the first point.
    assert_eq!(closed.ring_nodes(&mesh, 0, 2), BTreeSet::new());

    // Without the wrap the first point is only adjacent to the second, so
    // ring 2 reaches node 6.
    let open = RingMembership::new(seeds, false);
    assert_eq!(open.ring_nodes(&mesh, 0, 2), BTreeSet::from([6]));
}
