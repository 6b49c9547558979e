use crate::cache::FieldValueCache;
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation, LocationContext};
use crate::module::FieldModule;
use crate::Real;
use std::any::Any;

/// The element xi coordinates of the location, padded with zeros to the mesh dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XiField;

impl<T: Real> FieldCore<T> for XiField {
    fn type_name(&self) -> &'static str {
        "xi"
    }

    fn is_defined_at(&self, context: &LocationContext<'_, T>) -> bool {
        context.location().is_element_xi()
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let (_, xi) = evaluation.element_xi()?;
        let dimension = xi.len();
        let num_components = output.values().len();
        output.values_mut()[..dimension].copy_from_slice(xi.as_slice());

        if evaluation.wants_derivatives() {
            let derivatives = output.derivatives_mut();
            for k in 0..num_components.min(dimension) {
                derivatives[k * dimension + k] = T::one();
            }
            output.set_derivatives_valid(true);
        }
        Ok(())
    }

    fn clone_core(&self) -> Box<dyn FieldCore<T>> {
        Box::new(*self)
    }

    fn compare(&self, other: &dyn FieldCore<T>) -> bool {
        other.as_any().is::<Self>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Real> FieldModule<T> {
    /// Field with one component per dimension of the mesh.
    pub fn create_xi(&self) -> Result<Field<T>, FieldError> {
        let dimension = self.topology().dimension();
        if dimension == 0 {
            return Err(FieldError::InvalidArgument("xi field requires a mesh with elements".into()));
        }
        self.create_field(dimension, Vec::new(), Box::new(XiField))
    }
}
