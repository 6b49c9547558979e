use crate::basis::{populate_basis, populate_basis_gradients};
use crate::cache::FieldValueCache;
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation, LocationContext};
use crate::location::MeshLocation;
use crate::module::FieldModule;
use crate::topology::NodeId;
use crate::Real;
use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use std::any::Any;

/// Nodal parameters interpolated with the linear basis of each element.
///
/// Defined at nodes holding parameters and in elements whose nodes all hold parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FiniteElementField<T> {
    num_components: usize,
    parameters: FxHashMap<NodeId, Vec<T>>,
}

#[derive(Debug)]
struct BasisScratch<T: Real> {
    basis: Vec<T>,
    gradients: DMatrix<T>,
}

impl<T: Real> Default for BasisScratch<T> {
    fn default() -> Self {
        Self {
            basis: Vec::new(),
            gradients: DMatrix::zeros(0, 0),
        }
    }
}

impl<T: Real> FiniteElementField<T> {
    pub fn node_parameters(&self, node: NodeId) -> Option<&[T]> {
        self.parameters.get(&node).map(Vec::as_slice)
    }

    pub fn set_node_parameters(&mut self, node: NodeId, values: &[T]) -> Result<(), FieldError> {
        if values.len() != self.num_components {
            return Err(FieldError::InvalidArgument(format!(
                "finite element field has {} components, got {} values for {}",
                self.num_components,
                values.len(),
                node
            )));
        }
        self.parameters.insert(node, values.to_vec());
        Ok(())
    }

    pub fn remove_node_parameters(&mut self, node: NodeId) -> bool {
        self.parameters.remove(&node).is_some()
    }

    pub fn num_nodes_with_parameters(&self) -> usize {
        self.parameters.len()
    }
}

impl<T: Real> FieldCore<T> for FiniteElementField<T> {
    fn type_name(&self) -> &'static str {
        "finite_element"
    }

    fn is_defined_at(&self, context: &LocationContext<'_, T>) -> bool {
        match context.location() {
            MeshLocation::Node(node) => self.parameters.contains_key(node),
            MeshLocation::ElementXi { element, .. } => context
                .topology()
                .element_nodes(*element)
                .map_or(false, |nodes| nodes.iter().all(|node| self.parameters.contains_key(node))),
        }
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let (element, xi) = match evaluation.location() {
            MeshLocation::Node(node) => {
                let parameters = self
                    .parameters
                    .get(node)
                    .ok_or_else(|| evaluation.undefined(format!("no parameters at {}", node)))?;
                output.values_mut().copy_from_slice(parameters);
                return Ok(());
            }
            MeshLocation::ElementXi { element, xi } => (*element, xi),
        };

        let topology = evaluation.topology();
        let shape = topology
            .element_shape(element)
            .ok_or_else(|| evaluation.undefined(format!("unknown {}", element)))?;
        let nodes = topology
            .element_nodes(element)
            .ok_or_else(|| evaluation.undefined(format!("unknown {}", element)))?;
        let dimension = shape.dimension();
        let wants_derivatives = evaluation.wants_derivatives();

        let (values, derivatives, workspace) = output.parts_mut();
        let scratch = workspace.get_or_default::<BasisScratch<T>>();
        scratch.basis.resize(nodes.len(), T::zero());
        populate_basis(shape, xi.as_slice(), &mut scratch.basis);
        if wants_derivatives {
            if scratch.gradients.shape() != (dimension, nodes.len()) {
                scratch.gradients = DMatrix::zeros(dimension, nodes.len());
            }
            populate_basis_gradients(shape, xi.as_slice(), &mut scratch.gradients);
        }

        for (n, node) in nodes.iter().enumerate() {
            let parameters = self
                .parameters
                .get(node)
                .ok_or_else(|| evaluation.undefined(format!("no parameters at {}", node)))?;
            for (k, &p) in parameters.iter().enumerate() {
                values[k] += scratch.basis[n] * p;
                if wants_derivatives {
                    for i in 0..dimension {
                        derivatives[k * dimension + i] += scratch.gradients[(i, n)] * p;
                    }
                }
            }
        }
        output.set_derivatives_valid(wants_derivatives);
        Ok(())
    }

    fn clone_core(&self) -> Box<dyn FieldCore<T>> {
        Box::new(self.clone())
    }

    fn compare(&self, other: &dyn FieldCore<T>) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| other == self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Real> FieldModule<T> {
    /// Finite element field without any nodal parameters.
    pub fn create_finite_element(&self, num_components: usize) -> Result<Field<T>, FieldError> {
        let core = FiniteElementField {
            num_components,
            parameters: FxHashMap::default(),
        };
        self.create_field(num_components, Vec::new(), Box::new(core))
    }

    /// Finite element field with the given nodal parameters.
    pub fn create_finite_element_with_parameters<'a, I>(
        &self,
        num_components: usize,
        parameters: I,
    ) -> Result<Field<T>, FieldError>
    where
        I: IntoIterator<Item = (NodeId, &'a [T])>,
    {
        let mut core = FiniteElementField {
            num_components,
            parameters: FxHashMap::default(),
        };
        for (node, values) in parameters {
            if !self.topology().contains_node(node) {
                return Err(FieldError::InvalidArgument(format!("unknown {}", node)));
            }
            core.set_node_parameters(node, values)?;
        }
        self.create_field(num_components, Vec::new(), Box::new(core))
    }
}
