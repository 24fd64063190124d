use std::collections::{BTreeMap, BTreeSet};

use eyre::eyre;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::Real;

/// Node-element adjacency of a mesh.
///
/// This is the connectivity information needed to reconstruct a crack front
/// from a node set and to grow topological q-function rings: which nodes make
/// up an element, and which elements touch a node. Only membership matters;
/// the local node ordering within an element is not interpreted.
pub trait MeshTopology {
    fn num_nodes(&self) -> usize;

    fn num_elements(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    /// Writes the node indices of the given element into `output`, whose
    /// length must equal `element_node_count(element_index)`.
    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);

    /// The indices of all elements connected to the given node, in ascending
    /// order.
    fn node_elements(&self, node_index: usize) -> &[usize];
}

/// A mesh that can position its nodes and resolve named node sets.
///
/// Node sets play the role of boundary/nodeset tags: the crack front node
/// set, the crack mouth set and intersecting-boundary sets are all looked up
/// by name.
pub trait CrackMesh<T: Real>: MeshTopology {
    fn node_position(&self, node_index: usize) -> Point3<T>;

    /// The node set registered under the given name, if any.
    fn node_set(&self, name: &str) -> Option<&BTreeSet<usize>>;
}

/// A minimal mesh with named node sets.
///
/// Stores node positions, element connectivity and the inverse
/// node-to-elements map. This is all the mesh data crack front extraction and
/// ring construction require, and it doubles as the reference implementation
/// of [`MeshTopology`] and [`CrackMesh`] for tests and standalone use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct TaggedMesh<T: Real> {
    positions: Vec<Point3<T>>,
    elements: Vec<Vec<usize>>,
    node_elements: Vec<Vec<usize>>,
    node_sets: BTreeMap<String, BTreeSet<usize>>,
}

impl<T: Real> TaggedMesh<T> {
    /// Builds a mesh from node positions and per-element node lists.
    ///
    /// Fails if any element references a node index out of bounds.
    pub fn from_elements(
        positions: Vec<Point3<T>>,
        elements: Vec<Vec<usize>>,
    ) -> eyre::Result<Self> {
        let mut node_elements = vec![Vec::new(); positions.len()];
        for (element_index, element) in elements.iter().enumerate() {
            for &node in element {
                if node >= positions.len() {
                    return Err(eyre!(
                        "element {} references node {}, but the mesh only has {} nodes",
                        element_index,
                        node,
                        positions.len()
                    ));
                }
                node_elements[node].push(element_index);
            }
        }
        // Elements were visited in ascending order, so each per-node list is
        // sorted; duplicates occur only if an element lists a node twice.
        for elements_of_node in &mut node_elements {
            elements_of_node.dedup();
        }
        Ok(Self {
            positions,
            elements,
            node_elements,
            node_sets: BTreeMap::new(),
        })
    }

    /// Registers a named node set, replacing any set with the same name.
    ///
    /// Fails if the set references a node index out of bounds.
    pub fn set_node_set(
        &mut self,
        name: impl Into<String>,
        nodes: impl IntoIterator<Item = usize>,
    ) -> eyre::Result<()> {
        let name = name.into();
        let nodes: BTreeSet<usize> = nodes.into_iter().collect();
        if let Some(&out_of_bounds) = nodes.iter().find(|&&node| node >= self.positions.len()) {
            return Err(eyre!(
                "node set '{}' references node {}, but the mesh only has {} nodes",
                name,
                out_of_bounds,
                self.positions.len()
            ));
        }
        self.node_sets.insert(name, nodes);
        Ok(())
    }

    /// Builder-style variant of [`set_node_set`](Self::set_node_set).
    pub fn with_node_set(
        mut self,
        name: impl Into<String>,
        nodes: impl IntoIterator<Item = usize>,
    ) -> eyre::Result<Self> {
        self.set_node_set(name, nodes)?;
        Ok(self)
    }

    pub fn positions(&self) -> &[Point3<T>] {
        &self.positions
    }

    pub fn element_nodes(&self, element_index: usize) -> &[usize] {
        &self.elements[element_index]
    }
}

impl<T: Real> MeshTopology for TaggedMesh<T> {
    fn num_nodes(&self) -> usize {
        self.positions.len()
    }

    fn num_elements(&self) -> usize {
        self.elements.len()
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.elements[element_index].len()
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(&self.elements[element_index]);
    }

    fn node_elements(&self, node_index: usize) -> &[usize] {
        &self.node_elements[node_index]
    }
}

impl<T: Real> CrackMesh<T> for TaggedMesh<T> {
    fn node_position(&self, node_index: usize) -> Point3<T> {
        self.positions[node_index]
    }

    fn node_set(&self, name: &str) -> Option<&BTreeSet<usize>> {
        self.node_sets.get(name)
    }
}
