//! Component-wise arithmetic on source fields.
use crate::cache::FieldValueCache;
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation, FieldValueType};
use crate::module::FieldModule;
use crate::Real;
use itertools::izip;
use std::any::Any;

/// `weights[0] * a + weights[1] * b`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddField<T> {
    weights: [T; 2],
}

impl<T: Real> AddField<T> {
    pub fn weights(&self) -> [T; 2] {
        self.weights
    }

    pub fn set_weights(&mut self, weights: [T; 2]) {
        self.weights = weights;
    }
}

impl<T: Real> FieldCore<T> for AddField<T> {
    fn type_name(&self) -> &'static str {
        "add"
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let (a, b) = (evaluation.source(0)?, evaluation.source(1)?);
        let [wa, wb] = self.weights;
        for (value, &a_k, &b_k) in izip!(output.values_mut(), a.values(), b.values()) {
            *value = wa * a_k + wb * b_k;
        }

        if evaluation.wants_derivatives() {
            if let (Some(da), Some(db)) = (a.derivatives(), b.derivatives()) {
                for (d, &da_ki, &db_ki) in izip!(output.derivatives_mut(), da, db) {
                    *d = wa * da_ki + wb * db_ki;
                }
                output.set_derivatives_valid(true);
            }
        }
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

/// Source values multiplied by a factor per component.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleField<T> {
    factors: Vec<T>,
}

impl<T: Real> ScaleField<T> {
    pub fn factors(&self) -> &[T] {
        &self.factors
    }

    pub fn set_factors(&mut self, factors: &[T]) -> Result<(), FieldError> {
        if factors.len() != self.factors.len() {
            return Err(FieldError::InvalidArgument(format!(
                "scale field has {} components, got {} factors",
                self.factors.len(),
                factors.len()
            )));
        }
        self.factors.copy_from_slice(factors);
        Ok(())
    }
}

impl<T: Real> FieldCore<T> for ScaleField<T> {
    fn type_name(&self) -> &'static str {
        "scale"
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let source = evaluation.source(0)?;
        for (value, &s_k, &factor) in izip!(output.values_mut(), source.values(), &self.factors) {
            *value = factor * s_k;
        }

        if evaluation.wants_derivatives() {
            if let Some(ds) = source.derivatives() {
                let dimension = source.derivative_dimension();
                let derivatives = output.derivatives_mut();
                for (k, &factor) in self.factors.iter().enumerate() {
                    for i in 0..dimension {
                        derivatives[k * dimension + i] = factor * ds[k * dimension + i];
                    }
                }
                output.set_derivatives_valid(true);
            }
        }
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

/// Selected components of the source, in the given order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentField {
    components: Vec<usize>,
}

impl ComponentField {
    pub fn components(&self) -> &[usize] {
        &self.components
    }
}

impl<T: Real> FieldCore<T> for ComponentField {
    fn type_name(&self) -> &'static str {
        "component"
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let source = evaluation.source(0)?;
        for (value, &component) in output.values_mut().iter_mut().zip(&self.components) {
            *value = source.values()[component];
        }

        if evaluation.wants_derivatives() {
            if let Some(ds) = source.derivatives() {
                let dimension = source.derivative_dimension();
                let derivatives = output.derivatives_mut();
                for (k, &component) in self.components.iter().enumerate() {
                    let row = &ds[component * dimension..(component + 1) * dimension];
                    derivatives[k * dimension..(k + 1) * dimension].copy_from_slice(row);
                }
                output.set_derivatives_valid(true);
            }
        }
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

fn check_real<T: Real>(field: &Field<T>) -> Result<(), FieldError> {
    match field.value_type() {
        FieldValueType::Real => Ok(()),
        FieldValueType::MeshLocation => Err(FieldError::NotRealValued(field.name())),
    }
}

impl<T: Real> FieldModule<T> {
    pub fn create_add(&self, a: &Field<T>, b: &Field<T>) -> Result<Field<T>, FieldError> {
        self.create_weighted_add(a, T::one(), b, T::one())
    }

    pub fn create_weighted_add(
        &self,
        a: &Field<T>,
        weight_a: T,
        b: &Field<T>,
        weight_b: T,
    ) -> Result<Field<T>, FieldError> {
        check_real(a)?;
        check_real(b)?;
        if a.num_components() != b.num_components() {
            return Err(FieldError::InvalidArgument(format!(
                "cannot add `{}` with {} components to `{}` with {} components",
                a.name(),
                a.num_components(),
                b.name(),
                b.num_components()
            )));
        }
        let core = AddField {
            weights: [weight_a, weight_b],
        };
        self.create_field(a.num_components(), vec![a.clone(), b.clone()], Box::new(core))
    }

    pub fn create_scale(&self, source: &Field<T>, factors: &[T]) -> Result<Field<T>, FieldError> {
        check_real(source)?;
        if factors.len() != source.num_components() {
            return Err(FieldError::ValueCountMismatch {
                field: source.name(),
                expected: source.num_components(),
                actual: factors.len(),
            });
        }
        let core = ScaleField {
            factors: factors.to_vec(),
        };
        self.create_field(factors.len(), vec![source.clone()], Box::new(core))
    }

    /// Zero-based `components` of `source`.
    pub fn create_component(&self, source: &Field<T>, components: &[usize]) -> Result<Field<T>, FieldError> {
        check_real(source)?;
        if let Some(&invalid) = components
            .iter()
            .find(|&&component| component >= source.num_components())
        {
            return Err(FieldError::InvalidArgument(format!(
                "component {} out of range for `{}` with {} components",
                invalid,
                source.name(),
                source.num_components()
            )));
        }
        let core = ComponentField {
            components: components.to_vec(),
        };
        self.create_field(components.len(), vec![source.clone()], Box::new(core))
    }
}
