//! Weight (q) functions that localize the domain integral around the crack
//! front.
//!
//! A q function is 1 at the crack front and decays to 0 away from it, either
//! smoothly with physical distance ([`GeometricQFunction`]) or discretely
//! with element-connectivity distance ([`TopologicalQFunction`]).

use std::collections::BTreeSet;

use eyre::eyre;
use nalgebra::{Point3, Scalar};
use numeric_literals::replace_float_literals;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::front::CrackFront;
use crate::mesh::MeshTopology;
use crate::Real;

/// Per-node weight of the q function associated with a crack front point.
///
/// Values are always in `[0, 1]`. The domain integral evaluator interpolates
/// nodal weights to quadrature points with the element's shape functions.
pub trait QFunction<T: Real> {
    fn node_weight(&self, point_index: usize, node_index: usize, node_position: &Point3<T>) -> T;
}

impl<T: Real, Q: QFunction<T> + ?Sized> QFunction<T> for &Q {
    fn node_weight(&self, point_index: usize, node_index: usize, node_position: &Point3<T>) -> T {
        (*self).node_weight(point_index, node_index, node_position)
    }
}

/// A q function that ramps linearly from 1 to 0 between an inner and outer
/// radius around the crack front, and along the front between a point and
/// its neighbors.
#[derive(Debug)]
pub struct GeometricQFunction<'a, T: Scalar> {
    front: &'a CrackFront<T>,
    inner_radius: T,
    outer_radius: T,
}

impl<'a, T: Real> GeometricQFunction<'a, T> {
    pub fn new(front: &'a CrackFront<T>, inner_radius: T, outer_radius: T) -> eyre::Result<Self> {
        if !(inner_radius >= T::zero()) || !(outer_radius > inner_radius) {
            return Err(eyre!(
                "geometric q function radii must satisfy 0 <= inner < outer, got inner = {:?}, outer = {:?}",
                inner_radius,
                outer_radius
            ));
        }
        Ok(Self {
            front,
            inner_radius,
            outer_radius,
        })
    }
}

impl<'a, T: Real> QFunction<T> for GeometricQFunction<'a, T> {
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    fn node_weight(&self, point_index: usize, _node_index: usize, node_position: &Point3<T>) -> T {
        let point = self.front.point(point_index);
        let radius = self.front.polar_coordinates(node_position, point_index).radius;

        let radial = if radius <= self.inner_radius {
            1.0
        } else if radius < self.outer_radius {
            (self.outer_radius - radius) / (self.outer_radius - self.inner_radius)
        } else {
            0.0
        };

        // In 3D the weight additionally ramps to 0 towards the neighboring
        // front points. A zero segment length at an open end leaves the
        // weight constant in that direction.
        let mut tangential = 1.0;
        if !self.front.treat_as_2d() {
            let along_tangent = (node_position - point.position).dot(&point.tangent);
            if along_tangent >= 0.0 {
                if point.forward_segment_length > 0.0 {
                    tangential = 1.0 - along_tangent / point.forward_segment_length;
                }
            } else if point.backward_segment_length > 0.0 {
                tangential = 1.0 + along_tangent / point.backward_segment_length;
            }
        }

        num::clamp(radial * tangential, 0.0, 1.0)
    }
}

/// Nodes at a fixed element-connectivity distance from each crack front
/// point, built lazily one level at a time and cached.
///
/// Level 0 of a front point is its seed node(s); level k+1 contains every
/// node sharing an element with level k that is not already assigned to an
/// earlier level of the same or a structurally adjacent front point. Levels
/// of a fixed front point are therefore pairwise disjoint.
#[derive(Debug)]
pub struct RingMembership {
    seeds: Vec<Vec<usize>>,
    closed_loop: bool,
    cache: RwLock<RingCache>,
}

#[derive(Debug)]
struct RingCache {
    /// Number of levels built so far, for every front point in lockstep.
    levels_built: usize,
    /// Exclusive ring node sets, indexed by front point, then level.
    rings: Vec<Vec<BTreeSet<usize>>>,
}

impl RingMembership {
    pub fn new(seeds: Vec<Vec<usize>>, closed_loop: bool) -> Self {
        let num_points = seeds.len();
        Self {
            seeds,
            closed_loop,
            cache: RwLock::new(RingCache {
                levels_built: 0,
                rings: vec![Vec::new(); num_points],
            }),
        }
    }

    /// Whether the node belongs to any ring up to and including `ring` of
    /// the given front point.
    pub fn contains<M: MeshTopology>(
        &self,
        mesh: &M,
        point_index: usize,
        ring: usize,
        node_index: usize,
    ) -> bool {
        {
            let cache = self.cache.read();
            if cache.levels_built > ring {
                return cache.rings[point_index][..=ring]
                    .iter()
                    .any(|level| level.contains(&node_index));
            }
        }
        let mut cache = self.cache.write();
        self.build_levels(mesh, &mut cache, ring);
        cache.rings[point_index][..=ring]
            .iter()
            .any(|level| level.contains(&node_index))
    }

    /// The nodes of the exclusive ring at the given level around a front
    /// point.
    pub fn ring_nodes<M: MeshTopology>(
        &self,
        mesh: &M,
        point_index: usize,
        ring: usize,
    ) -> BTreeSet<usize> {
        {
            let cache = self.cache.read();
            if cache.levels_built > ring {
                return cache.rings[point_index][ring].clone();
            }
        }
        let mut cache = self.cache.write();
        self.build_levels(mesh, &mut cache, ring);
        cache.rings[point_index][ring].clone()
    }

    fn build_levels<M: MeshTopology>(&self, mesh: &M, cache: &mut RingCache, target_ring: usize) {
        // Re-check under the write lock: another thread may have built these
        // levels while we waited.
        while cache.levels_built <= target_ring {
            let level = cache.levels_built;
            if level == 0 {
                for (point, seeds) in self.seeds.iter().enumerate() {
                    cache.rings[point].push(seeds.iter().copied().collect());
                }
            } else {
                let num_points = self.seeds.len();
                let mut new_levels = Vec::with_capacity(num_points);
                let mut element_nodes = Vec::new();
                for point in 0..num_points {
                    let mut candidates = BTreeSet::new();
                    for &node in &cache.rings[point][level - 1] {
                        for &element in mesh.node_elements(node) {
                            element_nodes.resize(mesh.element_node_count(element), 0);
                            mesh.populate_element_nodes(&mut element_nodes, element);
                            candidates.extend(element_nodes.iter().copied());
                        }
                    }
                    let mut excluded = FxHashSet::default();
                    for neighbor in self.adjacent_points(point) {
                        for earlier in &cache.rings[neighbor][..level] {
                            excluded.extend(earlier.iter().copied());
                        }
                    }
                    let ring: BTreeSet<usize> = candidates
                        .into_iter()
                        .filter(|node| !excluded.contains(node))
                        .collect();
                    new_levels.push(ring);
                }
                for (point, ring) in new_levels.into_iter().enumerate() {
                    cache.rings[point].push(ring);
                }
            }
            cache.levels_built += 1;
        }
    }

    /// The front point itself and its structural neighbors, with wrap-around
    /// adjacency for closed loops.
    fn adjacent_points(&self, point: usize) -> Vec<usize> {
        let num_points = self.seeds.len();
        let mut adjacent = vec![point];
        if point > 0 {
            adjacent.push(point - 1);
        } else if self.closed_loop && num_points > 1 {
            adjacent.push(num_points - 1);
        }
        if point + 1 < num_points {
            adjacent.push(point + 1);
        } else if self.closed_loop && num_points > 1 {
            adjacent.push(0);
        }
        adjacent
    }
}

/// A q function that is 1 on the nodes within a fixed number of element
/// connectivity rings around each crack front point and 0 elsewhere.
#[derive(Debug)]
pub struct TopologicalQFunction<'a, M> {
    mesh: &'a M,
    rings: RingMembership,
    ring: usize,
}

impl<'a, M: MeshTopology> TopologicalQFunction<'a, M> {
    /// Creates a topological q function supported on rings `0..=ring` around
    /// each front point.
    pub fn new<T: Real>(
        front: &CrackFront<T>,
        mesh: &'a M,
        ring: usize,
    ) -> eyre::Result<Self> {
        let seeds = front.seed_nodes().ok_or_else(|| {
            eyre!("the topological q function requires a crack front defined by mesh nodes")
        })?;
        Ok(Self {
            mesh,
            rings: RingMembership::new(seeds.to_vec(), front.closed_loop()),
            ring,
        })
    }

    /// The nodes of the exclusive ring at the given level around a front
    /// point.
    pub fn ring_nodes(&self, point_index: usize, ring: usize) -> BTreeSet<usize> {
        self.rings.ring_nodes(self.mesh, point_index, ring)
    }
}

impl<'a, T: Real, M: MeshTopology> QFunction<T> for TopologicalQFunction<'a, M> {
    fn node_weight(&self, point_index: usize, node_index: usize, _node_position: &Point3<T>) -> T {
        if self
            .rings
            .contains(self.mesh, point_index, self.ring, node_index)
        {
            T::one()
        } else {
            T::zero()
        }
    }
}
