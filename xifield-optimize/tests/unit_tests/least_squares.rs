use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use xifield_optimize::least_squares::{
    gauss_newton_increment, is_step_within_tolerance, limit_step_length, residual_explained_by_step,
};
use xifield_optimize::lu::LuError;

#[test]
fn gauss_newton_increment_square_system_is_newton_step() {
    #[rustfmt::skip]
    let j = DMatrix::from_row_slice(2, 2, &[2.0, 1.0,
                                            0.0, 3.0]);
    let dx_expected = DVector::from_column_slice(&[0.25, -0.5]);
    let r = &j * &dx_expected;
    let dx = gauss_newton_increment(&j, &r, 1e-12).unwrap();
    assert_matrix_eq!(dx, dx_expected, comp = abs, tol = 1e-12);
}

#[test]
fn gauss_newton_increment_overdetermined_is_least_squares_solution() {
    // Fit y = a + b t through (0, 1), (1, 2), (2, 2)
    #[rustfmt::skip]
    let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0,
                                            1.0, 1.0,
                                            1.0, 2.0]);
    let r = DVector::from_column_slice(&[1.0, 2.0, 2.0]);
    let dx = gauss_newton_increment(&j, &r, 1e-12).unwrap();
    let expected = DVector::from_column_slice(&[7.0 / 6.0, 0.5]);
    assert_matrix_eq!(dx, expected, comp = abs, tol = 1e-12);
}

#[test]
fn gauss_newton_increment_singular_jacobian() {
    #[rustfmt::skip]
    let j = DMatrix::from_row_slice(2, 2, &[1.0, 1.0,
                                            1.0, 1.0]);
    let r = DVector::from_column_slice(&[1.0, 0.0]);
    assert!(gauss_newton_increment(&j, &r, 1e-12).is_err());
}

#[test]
fn gauss_newton_increment_dimension_mismatch() {
    let j = DMatrix::<f64>::identity(2, 2);
    let r = DVector::from_column_slice(&[1.0, 0.0, 3.0]);
    assert!(matches!(
        gauss_newton_increment(&j, &r, 1e-12),
        Err(LuError::DimensionMismatch { .. })
    ));
}

#[test]
fn limit_step_length_scales_long_steps_only() {
    let mut step = DVector::from_column_slice(&[0.3, 0.4]);
    assert!(limit_step_length(&mut step, 0.2));
    assert_matrix_eq!(step, DVector::from_column_slice(&[0.12, 0.16]), comp = abs, tol = 1e-14);

    let mut short = DVector::from_column_slice(&[0.01, 0.0]);
    assert!(!limit_step_length(&mut short, 0.2));
    assert_eq!(short[0], 0.01);
}

#[test]
fn step_tolerance_is_per_component() {
    let step = DVector::from_column_slice(&[1e-6, -2e-6]);
    assert!(is_step_within_tolerance(&step, 1e-5));
    let step = DVector::from_column_slice(&[1e-6, -2e-4]);
    assert!(!is_step_within_tolerance(&step, 1e-5));
}

#[test]
fn residual_explained_by_step_uses_slack() {
    let j = DMatrix::from_row_slice(2, 1, &[1.0, 0.0]);
    let step = DVector::from_column_slice(&[1e-3]);
    // First component moved by 1e-3, residual 1.5e-3 is within twice that
    assert!(residual_explained_by_step(&j, &[1.5e-3, 0.0], &step, 2.0));
    // Second component is insensitive to xi but has a residual
    assert!(!residual_explained_by_step(&j, &[1.5e-3, 1e-4], &step, 2.0));
}
