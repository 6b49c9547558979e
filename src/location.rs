use crate::topology::{ElementId, NodeId};
use nalgebra::{DVector, Scalar};
use serde::{Deserialize, Serialize};

/// A place in a mesh at which fields are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Scalar + Serialize", deserialize = "T: Scalar + Deserialize<'de>"))]
pub enum MeshLocation<T: Scalar> {
    Node(NodeId),
    ElementXi { element: ElementId, xi: DVector<T> },
}

impl<T: Scalar> MeshLocation<T> {
    pub fn node(node: NodeId) -> Self {
        Self::Node(node)
    }

    pub fn element_xi(element: ElementId, xi: impl Into<DVector<T>>) -> Self {
        Self::ElementXi {
            element,
            xi: xi.into(),
        }
    }

    pub fn from_slice(element: ElementId, xi: &[T]) -> Self {
        Self::element_xi(element, DVector::from_column_slice(xi))
    }

    pub fn element(&self) -> Option<ElementId> {
        match self {
            Self::ElementXi { element, .. } => Some(*element),
            Self::Node(_) => None,
        }
    }

    pub fn xi(&self) -> Option<&DVector<T>> {
        match self {
            Self::ElementXi { xi, .. } => Some(xi),
            Self::Node(_) => None,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Node(node) => Some(*node),
            Self::ElementXi { .. } => None,
        }
    }

    pub fn is_element_xi(&self) -> bool {
        matches!(self, Self::ElementXi { .. })
    }
}
