use std::collections::BTreeSet;

use griffith::front::topology::FrontTopology;
use griffith::mesh::{CrackMesh, TaggedMesh};
use griffith::nalgebra::Point3;
use proptest::prelude::*;

use super::{chain_mesh, grid_node, hex_grid_mesh};

#[test]
fn orders_open_front_along_grid_edge() {
    let mesh = hex_grid_mesh(4, 2, 2)
        .with_node_set("front", (0..=4).map(|i| grid_node(4, 2, i, 0, 0)))
        .unwrap();

    let topology = FrontTopology::order_nodes(&mesh, mesh.node_set("front").unwrap()).unwrap();

    // The end at (4, 0, 0) has a strictly positive component, so it is the
    // canonical first end.
    let expected: Vec<_> = (0..=4).rev().map(|i| grid_node(4, 2, i, 0, 0)).collect();
    assert_eq!(topology.nodes(), expected.as_slice());
    assert!(!topology.closed_loop());
    assert_eq!(topology.len(), 5);
    assert_eq!(
        topology.end_nodes(),
        Some((grid_node(4, 2, 4, 0, 0), grid_node(4, 2, 0, 0, 0)))
    );
}

#[test]
fn orders_closed_loop_with_deterministic_cut() {
    // Eight nodes on a circle of radius 1 around (2, 0, 0), chained into a
    // loop. The node at (3, 0, 0) is uniquely farthest from the origin.
    let positions: Vec<_> = (0..8)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / 8.0;
            Point3::new(2.0 + angle.cos(), angle.sin(), 0.0)
        })
        .collect();
    let mesh = chain_mesh(positions, true)
        .with_node_set("front", 0..8)
        .unwrap();

    let topology = FrontTopology::order_nodes(&mesh, mesh.node_set("front").unwrap()).unwrap();

    assert!(topology.closed_loop());
    assert_eq!(topology.len(), 8);
    assert_eq!(topology.end_nodes(), None);
    // The cut starts at the farthest node and ends at its neighbor with the
    // larger y coordinate, so the walk leaves through the other neighbor.
    assert_eq!(topology.nodes()[0], 0);
    assert_eq!(topology.nodes()[1], 7);
    assert_eq!(*topology.nodes().last().unwrap(), 1);
    // Every consecutive pair, including the wrap, is adjacent on the circle.
    for pair in topology.nodes().windows(2) {
        let difference = (pair[0] as i64 - pair[1] as i64).rem_euclid(8);
        assert!(difference == 1 || difference == 7);
    }
}

#[test]
fn rejects_single_node_sets() {
    let mesh = hex_grid_mesh(2, 1, 1)
        .with_node_set("front", [grid_node(2, 1, 1, 0, 0)])
        .unwrap();
    let error = FrontTopology::order_nodes(&mesh, mesh.node_set("front").unwrap()).unwrap_err();
    assert!(error.to_string().contains("at least two nodes"));
}

#[test]
fn rejects_disconnected_nodes() {
    // Nodes 0 and 3 belong to elements that do not touch.
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(5.0, 0.0, 0.0),
        Point3::new(6.0, 0.0, 0.0),
    ];
    let elements = vec![vec![0, 1], vec![2, 3]];
    let mesh = TaggedMesh::from_elements(positions, elements).unwrap();
    let node_set: BTreeSet<usize> = [0, 3].into_iter().collect();

    let error = FrontTopology::order_nodes(&mesh, &node_set).unwrap_err();
    assert!(error.to_string().contains("shares no element"));
}

#[test]
fn rejects_branching_fronts() {
    // Node 0 is connected to three other front nodes.
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    let elements = vec![vec![0, 1], vec![0, 2], vec![0, 3]];
    let mesh = TaggedMesh::from_elements(positions, elements).unwrap();
    let node_set: BTreeSet<usize> = [0, 1, 2, 3].into_iter().collect();

    let error = FrontTopology::order_nodes(&mesh, &node_set).unwrap_err();
    assert!(error.to_string().contains("at most 2 are allowed"));
}

#[test]
fn rejects_multiple_disjoint_chains() {
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(10.0, 0.0, 0.0),
        Point3::new(11.0, 0.0, 0.0),
        Point3::new(12.0, 0.0, 0.0),
    ];
    let elements = vec![vec![0, 1], vec![1, 2], vec![3, 4], vec![4, 5]];
    let mesh = TaggedMesh::from_elements(positions, elements).unwrap();
    let node_set: BTreeSet<usize> = (0..6).collect();

    let error = FrontTopology::order_nodes(&mesh, &node_set).unwrap_err();
    assert!(error.to_string().contains("4 end nodes"));
}

#[test]
fn rejects_out_of_bounds_nodes() {
    let mesh = hex_grid_mesh(1, 1, 1);
    let node_set: BTreeSet<usize> = [0, 1000].into_iter().collect();
    let error = FrontTopology::order_nodes(&mesh, &node_set).unwrap_err();
    assert!(error.to_string().contains("only has 8 nodes"));
}

fn shuffled_chain_labels() -> impl Strategy<Value = Vec<usize>> {
    (3..20usize).prop_flat_map(|n| Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
}

proptest! {
    /// Ordering an open chain must recover the chain regardless of how node
    /// labels are assigned, and always start from the same canonical end.
    #[test]
    fn open_chain_ordering_is_label_invariant(chain_to_label in shuffled_chain_labels()) {
        let n = chain_to_label.len();
        let mut positions = vec![Point3::new(0.0, 0.0, 0.0); n];
        for (chain_position, &label) in chain_to_label.iter().enumerate() {
            positions[label] = Point3::new(chain_position as f64, 0.0, 0.0);
        }
        let elements: Vec<Vec<usize>> = chain_to_label
            .windows(2)
            .map(|pair| vec![pair[0], pair[1]])
            .collect();
        let mesh = TaggedMesh::from_elements(positions, elements).unwrap();
        let node_set: BTreeSet<usize> = (0..n).collect();

        let topology = FrontTopology::order_nodes(&mesh, &node_set).unwrap();

        prop_assert!(!topology.closed_loop());
        prop_assert_eq!(topology.len(), n);
        // The far end of the chain has a strictly positive x coordinate, so
        // the ordered sequence must walk the chain backwards.
        let expected: Vec<usize> = chain_to_label.iter().rev().copied().collect();
        prop_assert_eq!(topology.nodes(), expected.as_slice());
    }
}
