use std::collections::{BTreeMap, BTreeSet};

use eyre::eyre;
use itertools::Itertools;
use log::debug;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

use crate::front::Axis;
use crate::mesh::{CrackMesh, MeshTopology};
use crate::Real;

/// The ordered node sequence of a crack front.
///
/// Constructed from an unordered node set by connecting every pair of nodes
/// that share a mesh element and walking the resulting chain. For an open
/// front the sequence runs from the canonically chosen first end to the other
/// end. For a closed loop the sequence covers the loop exactly once, starting
/// at a deterministic cut; the last and first nodes remain adjacent for
/// geometric purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontTopology {
    nodes: Vec<usize>,
    closed_loop: bool,
}

impl FrontTopology {
    /// Orders an unordered crack front node set into a traversable sequence.
    ///
    /// Two nodes are considered adjacent on the front if their
    /// connected-element sets intersect. Every node must end up with one or
    /// two front neighbors; a node set with any other degree, or one that
    /// does not form a single chain or loop, is rejected.
    pub fn order_nodes<T, M>(mesh: &M, node_set: &BTreeSet<usize>) -> eyre::Result<Self>
    where
        T: Real,
        M: CrackMesh<T>,
    {
        let nodes: Vec<usize> = node_set.iter().copied().collect();
        if nodes.len() < 2 {
            return Err(eyre!(
                "crack front ordering requires at least two nodes, got {}",
                nodes.len()
            ));
        }
        if let Some(&out_of_bounds) = nodes.iter().find(|&&node| node >= mesh.num_nodes()) {
            return Err(eyre!(
                "crack front node set references node {}, but the mesh only has {} nodes",
                out_of_bounds,
                mesh.num_nodes()
            ));
        }

        let mut neighbors: BTreeMap<usize, Vec<usize>> =
            nodes.iter().map(|&node| (node, Vec::new())).collect();
        for (&a, &b) in nodes.iter().tuple_combinations() {
            if shares_element(mesh, a, b) {
                neighbors.entry(a).or_default().push(b);
                neighbors.entry(b).or_default().push(a);
            }
        }

        let mut end_nodes = Vec::new();
        for (&node, adjacent) in &neighbors {
            match adjacent.len() {
                0 => {
                    return Err(eyre!(
                        "crack front node {} shares no element with any other front node",
                        node
                    ))
                }
                1 => end_nodes.push(node),
                2 => {}
                degree => {
                    return Err(eyre!(
                        "crack front node {} is connected to {} other front nodes, at most 2 are allowed",
                        node,
                        degree
                    ))
                }
            }
        }

        let (ordered, closed_loop) = match end_nodes.len() {
            2 => {
                let (start, _) = canonical_open_end(mesh, end_nodes[0], end_nodes[1]);
                (walk_chain(&neighbors, start, usize::MAX)?, false)
            }
            0 => {
                let (end1, end2) = cut_loop(mesh, &neighbors)?;
                let ordered = walk_chain(&neighbors, end1, end2)?;
                if ordered.last() != Some(&end2) {
                    return Err(eyre!(
                        "crack front loop traversal ended at node {} instead of the cut neighbor {}",
                        ordered.last().copied().unwrap_or(end1),
                        end2
                    ));
                }
                (ordered, true)
            }
            count => {
                return Err(eyre!(
                    "crack front node set has {} end nodes, expected exactly 0 (closed loop) or 2 (open front)",
                    count
                ))
            }
        };

        debug!(
            "ordered crack front: {} nodes, closed loop: {}",
            ordered.len(),
            closed_loop
        );
        Ok(Self {
            nodes: ordered,
            closed_loop,
        })
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn closed_loop(&self) -> bool {
        self.closed_loop
    }

    /// The two end nodes, in canonical order, for an open front.
    pub fn end_nodes(&self) -> Option<(usize, usize)> {
        if self.closed_loop {
            None
        } else {
            Some((*self.nodes.first()?, *self.nodes.last()?))
        }
    }
}

fn shares_element<M: MeshTopology>(mesh: &M, a: usize, b: usize) -> bool {
    // Both adjacency lists are ascending, so a merge scan suffices.
    let elements_a = mesh.node_elements(a);
    let elements_b = mesh.node_elements(b);
    let (mut i, mut j) = (0, 0);
    while i < elements_a.len() && j < elements_b.len() {
        match elements_a[i].cmp(&elements_b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

fn walk_chain(
    neighbors: &BTreeMap<usize, Vec<usize>>,
    start: usize,
    first_previous: usize,
) -> eyre::Result<Vec<usize>> {
    let total = neighbors.len();
    let mut ordered = Vec::with_capacity(total);
    ordered.push(start);
    let mut previous = first_previous;
    let mut current = start;
    while ordered.len() < total {
        let next = neighbors[&current]
            .iter()
            .copied()
            .find(|&candidate| candidate != previous)
            .ok_or_else(|| {
                eyre!(
                    "crack front traversal stopped after {} of {} nodes; the node set is not a single chain",
                    ordered.len(),
                    total
                )
            })?;
        if next == start {
            return Err(eyre!(
                "crack front traversal returned to node {} after visiting {} of {} nodes; the node set is not a single chain",
                start,
                ordered.len(),
                total
            ));
        }
        ordered.push(next);
        previous = current;
        current = next;
    }
    Ok(ordered)
}

/// Picks the canonical first end of an open front.
///
/// Preference order: more strictly positive coordinate components, then
/// larger distance from the origin, then smaller node id.
fn canonical_open_end<T, M>(mesh: &M, a: usize, b: usize) -> (usize, usize)
where
    T: Real,
    M: CrackMesh<T>,
{
    let position_a = mesh.node_position(a);
    let position_b = mesh.node_position(b);
    let positive_a = count_positive_components(&position_a.coords);
    let positive_b = count_positive_components(&position_b.coords);
    if positive_a != positive_b {
        return if positive_a > positive_b { (a, b) } else { (b, a) };
    }
    let distance_a = position_a.coords.norm();
    let distance_b = position_b.coords.norm();
    if definitely_greater(distance_a, distance_b) {
        (a, b)
    } else if definitely_greater(distance_b, distance_a) {
        (b, a)
    } else if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Picks the deterministic cut of a closed loop.
///
/// End 1 is the node farthest from the origin, ties broken by larger x, then
/// y, then z coordinate. End 2 is whichever of end 1's two neighbors has the
/// larger coordinate under the rotated axis priority y, z, x.
fn cut_loop<T, M>(mesh: &M, neighbors: &BTreeMap<usize, Vec<usize>>) -> eyre::Result<(usize, usize)>
where
    T: Real,
    M: CrackMesh<T>,
{
    let mut candidates = neighbors.keys().copied();
    let mut end1 = candidates
        .next()
        .ok_or_else(|| eyre!("crack front node set is empty"))?;
    for node in candidates {
        if replaces_loop_end(mesh, node, end1) {
            end1 = node;
        }
    }
    let adjacent = &neighbors[&end1];
    let end2 = larger_by_axis_priority(mesh, adjacent[0], adjacent[1], [1, 2, 0]);
    Ok((end1, end2))
}

fn replaces_loop_end<T, M>(mesh: &M, candidate: usize, best: usize) -> bool
where
    T: Real,
    M: CrackMesh<T>,
{
    let position_candidate = mesh.node_position(candidate);
    let position_best = mesh.node_position(best);
    let distance_candidate = position_candidate.coords.norm();
    let distance_best = position_best.coords.norm();
    if definitely_greater(distance_candidate, distance_best) {
        return true;
    }
    if definitely_greater(distance_best, distance_candidate) {
        return false;
    }
    for axis in 0..3 {
        if definitely_greater(position_candidate[axis], position_best[axis]) {
            return true;
        }
        if definitely_greater(position_best[axis], position_candidate[axis]) {
            return false;
        }
    }
    // Full tie: nodes are iterated in ascending order, keep the earlier one.
    false
}

fn larger_by_axis_priority<T, M>(mesh: &M, a: usize, b: usize, priority: [usize; 3]) -> usize
where
    T: Real,
    M: CrackMesh<T>,
{
    let position_a = mesh.node_position(a);
    let position_b = mesh.node_position(b);
    for axis in priority {
        if definitely_greater(position_a[axis], position_b[axis]) {
            return a;
        }
        if definitely_greater(position_b[axis], position_a[axis]) {
            return b;
        }
    }
    a.min(b)
}

fn count_positive_components<T: Real>(coords: &nalgebra::Vector3<T>) -> usize {
    coords.iter().filter(|&&c| c > T::zero()).count()
}

/// Validates that the nodes of a 2D-treated front are collinear along the
/// out-of-plane axis and collapses them to one logical front point.
///
/// Returns the logical node (smallest out-of-plane coordinate, ties broken by
/// smaller node id) together with all nodes, which seed topological rings.
pub(crate) fn collapse_2d<T, M>(
    mesh: &M,
    node_set: &BTreeSet<usize>,
    axis: Axis,
) -> eyre::Result<(usize, Vec<usize>)>
where
    T: Real,
    M: CrackMesh<T>,
{
    let axis_index = axis.index();
    let mut iter = node_set.iter().copied();
    let first = iter
        .next()
        .ok_or_else(|| eyre!("crack front node set is empty"))?;
    let first_position = mesh.node_position(first);
    let mut logical = first;
    for node in iter {
        let position = mesh.node_position(node);
        for in_plane in (0..3).filter(|&index| index != axis_index) {
            if !roughly_equal(position[in_plane], first_position[in_plane]) {
                return Err(eyre!(
                    "crack front nodes {} and {} are not collinear along the {:?} axis; a 2D crack front must reduce to a single in-plane point",
                    first,
                    node,
                    axis
                ));
            }
        }
        if definitely_greater(mesh.node_position(logical)[axis_index], position[axis_index]) {
            logical = node;
        }
    }
    Ok((logical, node_set.iter().copied().collect()))
}

/// Strictly-greater comparison with a tolerance that scales with the
/// magnitude of the operands, so end selection does not depend on the length
/// unit of the mesh.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub(crate) fn definitely_greater<T: Real>(a: T, b: T) -> bool {
    let scale = 1.0.max(a.abs().max(b.abs()));
    a > b + 1.0e-12 * scale
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub(crate) fn roughly_equal<T: Real>(a: T, b: T) -> bool {
    let scale = 1.0.max(a.abs().max(b.abs()));
    (a - b).abs() <= 1.0e-12 * scale
}
