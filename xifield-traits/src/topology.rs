//! Contracts for the finite element mesh that fields are evaluated on.
//!
//! The evaluation engine never mutates topology. It only asks for element shapes,
//! element nodes and set membership through the traits in this module.
use crate::Real;
use nalgebra::DVector;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

/// Parametric shape of an element.
///
/// All shapes use xi coordinates in `[0, 1]` per direction. Simplex shapes additionally
/// require the xi coordinates in their simplex directions to sum to at most one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementShape {
    Line,
    Square,
    Cube,
    Triangle,
    Tetrahedron,
    /// Triangle in xi1-xi2 extruded along xi3.
    Wedge,
}

impl ElementShape {
    pub fn dimension(&self) -> usize {
        match self {
            Self::Line => 1,
            Self::Square | Self::Triangle => 2,
            Self::Cube | Self::Tetrahedron | Self::Wedge => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Line => 2,
            Self::Triangle => 3,
            Self::Square | Self::Tetrahedron => 4,
            Self::Wedge => 6,
            Self::Cube => 8,
        }
    }

    /// The xi directions that are linked by a simplex constraint.
    pub fn simplex_directions(&self) -> &'static [usize] {
        match self {
            Self::Triangle | Self::Wedge => &[0, 1],
            Self::Tetrahedron => &[0, 1, 2],
            Self::Line | Self::Square | Self::Cube => &[],
        }
    }

    pub fn is_simplex(&self) -> bool {
        !self.simplex_directions().is_empty()
    }

    /// Centroid of the shape in xi space.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn centroid<T: Real>(&self) -> DVector<T> {
        let mut xi = DVector::from_element(self.dimension(), 0.5);
        let simplex = self.simplex_directions();
        if !simplex.is_empty() {
            let n = T::from_usize(simplex.len() + 1).unwrap();
            for &direction in simplex {
                xi[direction] = 1.0 / n;
            }
        }
        xi
    }

    /// Moves `xi` back into the shape, allowing it to lie up to `tolerance` outside.
    ///
    /// Simplex directions are first reduced equally until their sum is within bounds,
    /// then every direction is limited to `[-tolerance, 1 + tolerance]`.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn clamp_xi<T: Real>(&self, xi: &mut [T], tolerance: T) {
        let simplex = self.simplex_directions();
        if !simplex.is_empty() && simplex.iter().all(|&d| d < xi.len()) {
            let mut excess = -1.0 - tolerance;
            for &direction in simplex {
                excess += xi[direction];
            }
            if excess > 0.0 {
                let share = excess / T::from_usize(simplex.len()).unwrap();
                for &direction in simplex {
                    xi[direction] -= share;
                }
            }
        }
        for xi_i in xi.iter_mut().take(self.dimension()) {
            if *xi_i < -tolerance {
                *xi_i = -tolerance;
            } else if *xi_i > 1.0 + tolerance {
                *xi_i = 1.0 + tolerance;
            }
        }
    }

    /// Whether `xi` lies inside the shape, extended by `tolerance` in every direction.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn contains_xi<T: Real>(&self, xi: &[T], tolerance: T) -> bool {
        if xi.len() != self.dimension() {
            return false;
        }
        let in_box = xi
            .iter()
            .all(|&xi_i| xi_i >= -tolerance && xi_i <= 1.0 + tolerance);
        let simplex_sum = self
            .simplex_directions()
            .iter()
            .fold(T::zero(), |sum, &d| sum + xi[d]);
        in_box && simplex_sum <= 1.0 + tolerance
    }
}

/// Read-only access to the topology of a finite element mesh.
pub trait MeshTopology: Send + Sync {
    /// The highest element dimension in the mesh.
    fn dimension(&self) -> usize;

    fn element_shape(&self, element: ElementId) -> Option<ElementShape>;

    fn element_dimension(&self, element: ElementId) -> Option<usize> {
        self.element_shape(element).map(|shape| shape.dimension())
    }

    /// Nodes of the element in the local ordering of its shape.
    fn element_nodes(&self, element: ElementId) -> Option<&[NodeId]>;

    fn contains_node(&self, node: NodeId) -> bool;

    fn contains_element(&self, element: ElementId) -> bool {
        self.element_shape(element).is_some()
    }
}

/// An ordered set of elements to search, e.g. a whole mesh or a group of its elements.
pub trait ElementSet: Send + Sync {
    /// Identifies the set and the version of its contents.
    ///
    /// Two calls return the same id only if the set has not been modified in between.
    fn domain_id(&self) -> u64;

    /// The highest element dimension in the set.
    fn dimension(&self) -> usize;

    fn contains_element(&self, element: ElementId) -> bool;

    /// Elements in their natural enumeration order.
    fn element_ids(&self) -> Box<dyn Iterator<Item = ElementId> + '_>;

    fn num_elements(&self) -> usize;
}

static NEXT_DOMAIN_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a process-wide unique domain id.
pub fn next_domain_id() -> u64 {
    NEXT_DOMAIN_ID.fetch_add(1, Ordering::Relaxed)
}
