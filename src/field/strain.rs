use crate::cache::FieldValueCache;
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation, FieldValueType, LocationContext};
use crate::module::FieldModule;
use crate::Real;
use nalgebra::{DVector, Matrix2, Vector2};
use numeric_literals::replace_float_literals;
use std::any::Any;

/// Green strain of a surface in a fibre-aligned basis.
///
/// Sources are the deformed coordinates, the undeformed coordinates and a scalar fibre
/// angle measured from the first xi direction of the undeformed element in its tangent
/// plane. Uses the first two xi directions, so the element dimension must be at least two.
/// The output is the row-major 2x2 tensor `[E_ff, E_fs, E_sf, E_ss]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strain2dField;

/// Column `i` of a row-major `rows x dimension` derivative matrix.
fn derivative_column<T: Real>(derivatives: &[T], rows: usize, dimension: usize, i: usize) -> DVector<T> {
    DVector::from_fn(rows, |k, _| derivatives[k * dimension + i])
}

impl<T: Real> FieldCore<T> for Strain2dField {
    fn type_name(&self) -> &'static str {
        "strain_2d"
    }

    fn source_derivative_order(&self, _order: usize) -> usize {
        1
    }

    fn is_defined_at(&self, context: &LocationContext<'_, T>) -> bool {
        context
            .element_dimension()
            .map_or(false, |dimension| dimension >= 2)
    }

    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let deformed = evaluation.source(0)?;
        let undeformed = evaluation.source(1)?;
        let angle = evaluation.source(2)?.values()[0];
        let (dx, d_big_x) = match (deformed.derivatives(), undeformed.derivatives()) {
            (Some(dx), Some(d_big_x)) => (dx, d_big_x),
            _ => return Err(evaluation.undefined("coordinate derivatives are unavailable")),
        };
        let rows = deformed.values().len();
        let dimension = deformed.derivative_dimension();
        if dimension < 2 {
            return Err(evaluation.undefined("element dimension is below two"));
        }

        let big_x1 = derivative_column(d_big_x, rows, dimension, 0);
        let big_x2 = derivative_column(d_big_x, rows, dimension, 1);
        let x1 = derivative_column(dx, rows, dimension, 0);
        let x2 = derivative_column(dx, rows, dimension, 1);

        // Orthonormal basis of the undeformed tangent plane
        let degenerate = || evaluation.undefined("undeformed geometry is degenerate");
        let e1 = big_x1.try_normalize(1e-12).ok_or_else(degenerate)?;
        let e2 = (&big_x2 - &e1 * big_x2.dot(&e1))
            .try_normalize(1e-12)
            .ok_or_else(degenerate)?;
        let (sin, cos) = angle.sin_cos();
        let fibre = &e1 * cos + &e2 * sin;
        let sheet = &e2 * cos - &e1 * sin;

        // Express the fibre and sheet directions in xi through the undeformed Jacobian
        let metric = Matrix2::new(
            big_x1.dot(&big_x1),
            big_x1.dot(&big_x2),
            big_x2.dot(&big_x1),
            big_x2.dot(&big_x2),
        );
        let metric_inverse = metric.try_inverse().ok_or_else(degenerate)?;
        let r_fibre = metric_inverse * Vector2::new(big_x1.dot(&fibre), big_x2.dot(&fibre));
        let r_sheet = metric_inverse * Vector2::new(big_x1.dot(&sheet), big_x2.dot(&sheet));

        let undeformed_fibre = &big_x1 * r_fibre[0] + &big_x2 * r_fibre[1];
        let undeformed_sheet = &big_x1 * r_sheet[0] + &big_x2 * r_sheet[1];
        let deformed_fibre = &x1 * r_fibre[0] + &x2 * r_fibre[1];
        let deformed_sheet = &x1 * r_sheet[0] + &x2 * r_sheet[1];

        let e_ff = 0.5 * (deformed_fibre.dot(&deformed_fibre) - undeformed_fibre.dot(&undeformed_fibre));
        let e_fs = 0.5 * (deformed_fibre.dot(&deformed_sheet) - undeformed_fibre.dot(&undeformed_sheet));
        let e_ss = 0.5 * (deformed_sheet.dot(&deformed_sheet) - undeformed_sheet.dot(&undeformed_sheet));
        output
            .values_mut()
            .copy_from_slice(&[e_ff, e_fs, e_fs, e_ss]);
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
    pub fn create_strain_2d(
        &self,
        deformed: &Field<T>,
        undeformed: &Field<T>,
        fibre_angle: &Field<T>,
    ) -> Result<Field<T>, FieldError> {
        for field in [deformed, undeformed, fibre_angle] {
            if field.value_type() != FieldValueType::Real {
                return Err(FieldError::NotRealValued(field.name()));
            }
        }
        if deformed.num_components() != undeformed.num_components() || deformed.num_components() < 2 {
            return Err(FieldError::InvalidArgument(format!(
                "coordinate fields `{}` and `{}` must have the same number of components, at least two",
                deformed.name(),
                undeformed.name()
            )));
        }
        if fibre_angle.num_components() != 1 {
            return Err(FieldError::InvalidArgument(format!(
                "fibre angle `{}` must be scalar",
                fibre_angle.name()
            )));
        }
        self.create_field(
            4,
            vec![deformed.clone(), undeformed.clone(), fibre_angle.clone()],
            Box::new(Strain2dField),
        )
    }
}
