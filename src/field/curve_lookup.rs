use crate::cache::FieldValueCache;
use crate::curve::Curve;
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation, FieldValueType};
use crate::module::FieldModule;
use crate::Real;
use std::any::Any;

/// Looks up a scalar source in a curve.
///
/// Derivatives follow the chain rule: `d value_k / d xi_i = curve'_k(t) * d t / d xi_i`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveLookupField<T> {
    curve: Curve<T>,
}

/// Derivatives of the curve with respect to its parameter, kept apart from the output.
#[derive(Debug)]
struct CurveDerivatives<T> {
    dvalues_dt: Vec<T>,
}

impl<T> Default for CurveDerivatives<T> {
    fn default() -> Self {
        Self { dvalues_dt: Vec::new() }
    }
}

impl<T: Real> CurveLookupField<T> {
    pub fn curve(&self) -> &Curve<T> {
        &self.curve
    }

    /// Replaces the curve. The number of components cannot change.
    pub fn set_curve(&mut self, curve: Curve<T>) -> Result<(), FieldError> {
        if curve.nodes().is_empty() {
            return Err(FieldError::InvalidArgument("curve has no nodes".to_string()));
        }
        if curve.num_components() != self.curve.num_components() {
            return Err(FieldError::InvalidArgument(format!(
                "curve has {} components, expected {}",
                curve.num_components(),
                self.curve.num_components()
            )));
        }
        self.curve = curve;
        Ok(())
    }
}

impl<T: Real> FieldCore<T> for CurveLookupField<T> {
    fn type_name(&self) -> &'static str {
        "curve_lookup"
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let source = evaluation.source(0)?;
        let parameter = source.values()[0];
        let source_derivatives = source
            .derivatives()
            .filter(|_| evaluation.wants_derivatives());

        let (values, derivatives, workspace) = output.parts_mut();
        match source_derivatives {
            Some(dt_dxi) => {
                let scratch = workspace.get_or_default::<CurveDerivatives<T>>();
                scratch
                    .dvalues_dt
                    .resize(self.curve.num_components(), T::zero());
                self.curve
                    .evaluate(parameter, values, Some(&mut scratch.dvalues_dt))?;
                let dimension = dt_dxi.len();
                for (k, &dvalue_dt) in scratch.dvalues_dt.iter().enumerate() {
                    for (i, &dt_dxi_i) in dt_dxi.iter().enumerate() {
                        derivatives[k * dimension + i] = dvalue_dt * dt_dxi_i;
                    }
                }
                output.set_derivatives_valid(true);
            }
            None => self.curve.evaluate(parameter, values, None)?,
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

impl<T: Real> FieldModule<T> {
    pub fn create_curve_lookup(&self, source: &Field<T>, curve: Curve<T>) -> Result<Field<T>, FieldError> {
        if source.value_type() != FieldValueType::Real {
            return Err(FieldError::NotRealValued(source.name()));
        }
        if source.num_components() != 1 {
            return Err(FieldError::InvalidArgument(format!(
                "curve lookup source `{}` must be scalar",
                source.name()
            )));
        }
        if curve.nodes().is_empty() {
            return Err(FieldError::InvalidArgument("curve has no nodes".to_string()));
        }
        let num_components = curve.num_components();
        self.create_field(num_components, vec![source.clone()], Box::new(CurveLookupField { curve }))
    }
}
