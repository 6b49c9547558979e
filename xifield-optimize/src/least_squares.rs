use crate::lu::{LuDecomposition, LuError};
use log::trace;
use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView};
use numeric_literals::replace_float_literals;
use xifield_traits::Real;

/// Computes the Gauss-Newton increment `dx` for the least-squares problem
///  min_x || target - f(x) ||^2
/// given the Jacobian `J` of `f` and the residual `r = target - f(x)`.
///
/// The possibly rectangular system `J dx = r` (more rows than columns) is reduced to the
/// square normal equations
///  J^T J dx = J^T r,
/// which are solved by LU decomposition. Fails if the normal matrix has a pivot not larger
/// than `singular_tolerance`.
pub fn gauss_newton_increment<'a, 'b, T>(
    jacobian: impl Into<DMatrixView<'a, T>>,
    residual: impl Into<DVectorView<'b, T>>,
    singular_tolerance: T,
) -> Result<DVector<T>, LuError>
where
    T: Real,
{
    let jacobian = jacobian.into();
    let residual = residual.into();
    if jacobian.nrows() != residual.len() {
        return Err(LuError::DimensionMismatch {
            rows: jacobian.nrows(),
            cols: jacobian.ncols(),
            rhs: residual.len(),
        });
    }

    let n = jacobian.ncols();
    let mut normal_matrix = DMatrix::zeros(n, n);
    let mut rhs = DVector::zeros(n);
    for i in 0..n {
        for j in 0..n {
            normal_matrix[(i, j)] = jacobian.column(j).dot(&jacobian.column(i));
        }
        rhs[i] = jacobian.column(i).dot(&residual);
    }

    let lu = LuDecomposition::decompose(normal_matrix, singular_tolerance)?;
    lu.solve_mut(&mut rhs)?;
    trace!("Gauss-Newton increment: {:?}", rhs.as_slice());
    Ok(rhs)
}

/// Scales `step` down so that its Euclidean length does not exceed `max_length`.
///
/// Returns `true` if the step was shortened.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn limit_step_length<T: Real>(step: &mut DVector<T>, max_length: T) -> bool {
    let length = step.norm();
    if length > max_length && length > 0.0 {
        *step *= max_length / length;
        true
    } else {
        false
    }
}

/// Returns `true` if every component of `step` has magnitude at most `tolerance`.
pub fn is_step_within_tolerance<T: Real>(step: &DVector<T>, tolerance: T) -> bool {
    step.iter().all(|dx_i| dx_i.abs() <= tolerance)
}

/// Checks that each residual component of an overdetermined system is explained by the
/// last increment.
///
/// For each row `k` this requires
///  |r_k| <= slack * |(J dx)_k|.
/// In other words, no single component wants the solution to move further than the last
/// increment (scaled by `slack`) did.
pub fn residual_explained_by_step<'a, T>(
    jacobian: impl Into<DMatrixView<'a, T>>,
    residual: &[T],
    step: &DVector<T>,
    slack: T,
) -> bool
where
    T: Real,
{
    let jacobian = jacobian.into();
    let predicted = jacobian * step;
    predicted
        .iter()
        .zip(residual)
        .all(|(&predicted_k, &residual_k)| residual_k.abs() <= slack * predicted_k.abs())
}
