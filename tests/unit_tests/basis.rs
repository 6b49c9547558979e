use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use proptest::prelude::*;
use util::approximate_jacobian_fd;
use xifield::basis::{populate_basis, populate_basis_gradients};
use xifield::proptest::interior_xi;
use xifield::topology::ElementShape;

const ALL_SHAPES: [ElementShape; 6] = [
    ElementShape::Line,
    ElementShape::Square,
    ElementShape::Cube,
    ElementShape::Triangle,
    ElementShape::Tetrahedron,
    ElementShape::Wedge,
];

/// Reference coordinates of vertex `n` of `shape`.
fn vertex_xi(shape: ElementShape, n: usize) -> Vec<f64> {
    let simplex_vertex = |a: usize, dim: usize| -> Vec<f64> {
        let mut xi = vec![0.0; dim];
        if a > 0 {
            xi[a - 1] = 1.0;
        }
        xi
    };
    match shape {
        ElementShape::Line | ElementShape::Square | ElementShape::Cube => (0..shape.dimension())
            .map(|d| ((n >> d) & 1) as f64)
            .collect(),
        ElementShape::Triangle | ElementShape::Tetrahedron => simplex_vertex(n, shape.dimension()),
        ElementShape::Wedge => {
            let mut xi = simplex_vertex(n % 3, 2);
            xi.push((n / 3) as f64);
            xi
        }
    }
}

#[test]
fn basis_is_kronecker_delta_at_vertices() {
    for shape in ALL_SHAPES {
        let num_vertices = shape.num_vertices();
        let mut basis = vec![0.0; num_vertices];
        for n in 0..num_vertices {
            populate_basis(shape, &vertex_xi(shape, n), &mut basis);
            let expected = DVector::from_fn(num_vertices, |m, _| if m == n { 1.0 } else { 0.0 });
            assert_matrix_eq!(DVector::from_column_slice(&basis), expected, comp = abs, tol = 1e-14);
        }
    }
}

#[test]
fn square_basis_at_centroid() {
    let mut basis = [0.0; 4];
    populate_basis(ElementShape::Square, &[0.5, 0.5], &mut basis);
    assert_eq!(basis, [0.25; 4]);

    let mut gradients = DMatrix::zeros(2, 4);
    populate_basis_gradients(ElementShape::Square, &[0.5, 0.5], &mut gradients);
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 4, &[
        -0.5,  0.5, -0.5, 0.5,
        -0.5, -0.5,  0.5, 0.5,
    ]);
    assert_matrix_eq!(gradients, expected, comp = abs, tol = 1e-14);
}

fn shape_and_xi() -> impl Strategy<Value = (ElementShape, DVector<f64>)> {
    proptest::sample::select(ALL_SHAPES.to_vec()).prop_flat_map(|shape| (Just(shape), interior_xi(shape, 0.01)))
}

proptest! {
    #[test]
    fn basis_is_partition_of_unity((shape, xi) in shape_and_xi()) {
        let mut basis = vec![0.0; shape.num_vertices()];
        populate_basis(shape, xi.as_slice(), &mut basis);
        let sum: f64 = basis.iter().sum();
        prop_assert!((sum - 1.0).abs() <= 1e-12);
    }

    #[test]
    fn basis_gradients_match_finite_differences((shape, xi) in shape_and_xi()) {
        let num_vertices = shape.num_vertices();
        let mut gradients = DMatrix::zeros(shape.dimension(), num_vertices);
        populate_basis_gradients(shape, xi.as_slice(), &mut gradients);

        let basis_fn = |xi: DVectorView<f64>, mut basis: DVectorViewMut<f64>| {
            populate_basis(shape, xi.as_slice(), basis.as_mut_slice());
            true
        };
        let jacobian = approximate_jacobian_fd(num_vertices, basis_fn, &xi, 1e-6).unwrap();
        assert_matrix_eq!(gradients, jacobian.transpose(), comp = abs, tol = 1e-8);
    }
}
