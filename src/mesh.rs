//! A simple in-memory mesh topology and element groups over it.
use crate::error::FieldError;
use crate::topology::{next_domain_id, ElementId, ElementSet, ElementShape, MeshTopology, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub mod procedural;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub shape: ElementShape,
    pub nodes: Vec<NodeId>,
}

/// Elements and nodes identified by user-chosen ids.
///
/// Every mutation assigns a new domain id, so searches cached against an older
/// version of the mesh are recognized as stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    elements: BTreeMap<ElementId, Element>,
    nodes: BTreeSet<NodeId>,
    #[serde(skip, default = "next_domain_id")]
    domain_id: u64,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            elements: BTreeMap::new(),
            nodes: BTreeSet::new(),
            domain_id: next_domain_id(),
        }
    }

    pub fn add_node(&mut self, node: NodeId) -> bool {
        let inserted = self.nodes.insert(node);
        if inserted {
            self.domain_id = next_domain_id();
        }
        inserted
    }

    /// Adds an element referring to existing nodes, replacing any element with the same id.
    pub fn add_element(&mut self, id: ElementId, shape: ElementShape, nodes: Vec<NodeId>) -> Result<(), FieldError> {
        if nodes.len() != shape.num_vertices() {
            return Err(FieldError::InvalidArgument(format!(
                "{:?} element {} needs {} nodes, got {}",
                shape,
                id.0,
                shape.num_vertices(),
                nodes.len()
            )));
        }
        if let Some(missing) = nodes.iter().find(|node| !self.nodes.contains(node)) {
            return Err(FieldError::InvalidArgument(format!(
                "element {} refers to unknown {}",
                id.0, missing
            )));
        }
        self.insert_element_unchecked(id, shape, nodes);
        Ok(())
    }

    pub(crate) fn insert_element_unchecked(&mut self, id: ElementId, shape: ElementShape, nodes: Vec<NodeId>) {
        debug_assert_eq!(nodes.len(), shape.num_vertices());
        self.elements.insert(id, Element { shape, nodes });
        self.domain_id = next_domain_id();
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements.iter().map(|(id, element)| (*id, element))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

impl MeshTopology for Mesh {
    fn dimension(&self) -> usize {
        self.elements
            .values()
            .map(|element| element.shape.dimension())
            .max()
            .unwrap_or(0)
    }

    fn element_shape(&self, element: ElementId) -> Option<ElementShape> {
        self.elements.get(&element).map(|element| element.shape)
    }

    fn element_nodes(&self, element: ElementId) -> Option<&[NodeId]> {
        self.elements
            .get(&element)
            .map(|element| element.nodes.as_slice())
    }

    fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }
}

impl ElementSet for Mesh {
    fn domain_id(&self) -> u64 {
        self.domain_id
    }

    fn dimension(&self) -> usize {
        MeshTopology::dimension(self)
    }

    fn contains_element(&self, element: ElementId) -> bool {
        self.elements.contains_key(&element)
    }

    fn element_ids(&self) -> Box<dyn Iterator<Item = ElementId> + '_> {
        Box::new(self.elements.keys().copied())
    }

    fn num_elements(&self) -> usize {
        self.elements.len()
    }
}

/// A subset of the elements of a mesh, searched in ascending id order.
#[derive(Debug, Clone)]
pub struct ElementGroup {
    elements: BTreeSet<ElementId>,
    dimension: usize,
    domain_id: u64,
}

impl ElementGroup {
    pub fn new(dimension: usize) -> Self {
        Self {
            elements: BTreeSet::new(),
            dimension,
            domain_id: next_domain_id(),
        }
    }

    /// Collects the elements of `mesh` selected by `predicate` that have the highest dimension.
    pub fn from_mesh<P>(mesh: &Mesh, mut predicate: P) -> Self
    where
        P: FnMut(ElementId, &Element) -> bool,
    {
        let dimension = MeshTopology::dimension(mesh);
        let mut group = Self::new(dimension);
        group.elements = mesh
            .elements()
            .filter(|(_, element)| element.shape.dimension() == dimension)
            .filter(|(id, element)| predicate(*id, element))
            .map(|(id, _)| id)
            .collect();
        group
    }

    pub fn insert(&mut self, element: ElementId) -> bool {
        let inserted = self.elements.insert(element);
        if inserted {
            self.domain_id = next_domain_id();
        }
        inserted
    }

    pub fn remove(&mut self, element: ElementId) -> bool {
        let removed = self.elements.remove(&element);
        if removed {
            self.domain_id = next_domain_id();
        }
        removed
    }
}

impl ElementSet for ElementGroup {
    fn domain_id(&self) -> u64 {
        self.domain_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn contains_element(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    fn element_ids(&self) -> Box<dyn Iterator<Item = ElementId> + '_> {
        Box::new(self.elements.iter().copied())
    }

    fn num_elements(&self) -> usize {
        self.elements.len()
    }
}
