use crate::cache::{FieldCache, FieldValueCache};
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation, FieldValueType};
use crate::module::FieldModule;
use crate::Real;
use std::any::Any;

/// Evaluates a field at the location produced by a mesh-location valued field.
///
/// Derivatives with respect to the outer location are not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbeddedField;

impl<T: Real> FieldCore<T> for EmbeddedField {
    fn type_name(&self) -> &'static str {
        "embedded"
    }

    fn source_derivative_order(&self, _order: usize) -> usize {
        0
    }

    fn evaluates_source_at_location(&self, index: usize) -> bool {
        index == 0
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let location = evaluation
            .source(0)?
            .mesh_location()
            .ok_or_else(|| evaluation.undefined("source has no mesh location"))?;
        let embedded = evaluation.source_field(1)?;
        let module = evaluation.module();

        let (values, _, workspace) = output.parts_mut();
        let cache = workspace.get_or_insert_with(|| FieldCache::new(module));
        cache.set_location(location.clone(), evaluation.time())?;
        values.copy_from_slice(cache.evaluate_at_order(embedded, 0)?.values());
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
    /// Field with the values of `field` at the location given by `mesh_location`.
    pub fn create_embedded(&self, mesh_location: &Field<T>, field: &Field<T>) -> Result<Field<T>, FieldError> {
        if mesh_location.value_type() != FieldValueType::MeshLocation {
            return Err(FieldError::WrongFieldType {
                field: mesh_location.name(),
                expected: "mesh location valued",
            });
        }
        if field.value_type() != FieldValueType::Real {
            return Err(FieldError::NotRealValued(field.name()));
        }
        self.create_field(
            field.num_components(),
            vec![mesh_location.clone(), field.clone()],
            Box::new(EmbeddedField),
        )
    }
}
