use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Scalar counterpart of `assert_approx_matrix_eq`.
#[macro_export]
macro_rules! assert_approx_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y) = ($x, $y);
        let absdiff = (x - y).abs();
        if !(absdiff <= $tol) {
            panic!("assert_approx_eq failed: left = {:e}, right = {:e}, abstol = {:e}", x, y, $tol);
        }
    }};
}

/// Regular grid of `samples_per_dim^dimension` points covering `[0, 1]^dimension`.
pub fn unit_cube_grid(dimension: usize, samples_per_dim: usize) -> Vec<DVector<f64>> {
    assert!(samples_per_dim >= 2, "Need at least two samples per dimension.");
    let step = 1.0 / (samples_per_dim - 1) as f64;
    let num_points = samples_per_dim.pow(dimension as u32);
    (0..num_points)
        .map(|mut index| {
            DVector::from_fn(dimension, |_, _| {
                let i = index % samples_per_dim;
                index /= samples_per_dim;
                i as f64 * step
            })
        })
        .collect()
}

/// Approximates the `m x n` Jacobian of `f: R^n -> R^m` at `x` with central differences of step `h`.
///
/// `f` writes its value into the output view and returns `false` if it cannot be evaluated
/// at the given point, in which case `None` is returned.
pub fn approximate_jacobian_fd(
    m: usize,
    mut f: impl FnMut(DVectorView<f64>, DVectorViewMut<f64>) -> bool,
    x: &DVector<f64>,
    h: f64,
) -> Option<DMatrix<f64>> {
    let mut jacobian = DMatrix::zeros(m, x.len());
    let mut x = x.clone();
    let mut f_plus = DVector::zeros(m);
    let mut f_minus = DVector::zeros(m);

    for i in 0..x.len() {
        let xi = x[i];
        x[i] = xi + h;
        let plus_ok = f(DVectorView::from(&x), DVectorViewMut::from(&mut f_plus));
        x[i] = xi - h;
        let minus_ok = f(DVectorView::from(&x), DVectorViewMut::from(&mut f_minus));
        x[i] = xi;
        if !(plus_ok && minus_ok) {
            return None;
        }
        jacobian.set_column(i, &((&f_plus - &f_minus) / (2.0 * h)));
    }
    Some(jacobian)
}
