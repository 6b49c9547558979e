use crate::cache::FieldValueCache;
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation};
use crate::module::FieldModule;
use crate::Real;
use std::any::Any;

/// The same values everywhere, with zero derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantField<T> {
    values: Vec<T>,
}

impl<T: Real> ConstantField<T> {
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Replaces the values, keeping the number of components.
    pub fn set_values(&mut self, values: &[T]) -> Result<(), FieldError> {
        if values.len() != self.values.len() {
            return Err(FieldError::InvalidArgument(format!(
                "constant field has {} components, got {} values",
                self.values.len(),
                values.len()
            )));
        }
        self.values.copy_from_slice(values);
        Ok(())
    }
}

impl<T: Real> FieldCore<T> for ConstantField<T> {
    fn type_name(&self) -> &'static str {
        "constant"
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        output.values_mut().copy_from_slice(&self.values);
        // Derivative storage is zeroed when the output is prepared
        output.set_derivatives_valid(evaluation.wants_derivatives());
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
    pub fn create_constant(&self, values: &[T]) -> Result<Field<T>, FieldError> {
        let core = ConstantField {
            values: values.to_vec(),
        };
        self.create_field(values.len(), Vec::new(), Box::new(core))
    }
}
