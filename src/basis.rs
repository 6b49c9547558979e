//! Linear Lagrange basis functions on the reference shapes.
//!
//! Node numbering follows the shape's parametric directions. Tensor-product shapes number
//! their nodes with xi1 varying fastest, i.e. node `i + 2j + 4k` sits at xi `(i, j, k)`.
//! Simplex shapes place node 0 at the origin and node `d + 1` on the unit axis of
//! direction `d`. Wedges combine a triangle in xi1-xi2 with a line in xi3, node `a + 3b`.
use crate::topology::ElementShape;
use crate::Real;
use nalgebra::DMatrix;
use numeric_literals::replace_float_literals;

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn line<T: Real>(t: T) -> [T; 2] {
    [1.0 - t, t]
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn line_derivative<T: Real>() -> [T; 2] {
    [-1.0, 1.0]
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn simplex<T: Real>(xi: &[T], basis: &mut [T]) {
    let mut first = 1.0;
    for (d, &xi_d) in xi.iter().enumerate() {
        first -= xi_d;
        basis[d + 1] = xi_d;
    }
    basis[0] = first;
}

/// Evaluates the basis functions of `shape` at `xi` into `basis`.
///
/// `xi` must have `shape.dimension()` entries and `basis` `shape.num_vertices()` entries.
pub fn populate_basis<T: Real>(shape: ElementShape, xi: &[T], basis: &mut [T]) {
    assert_eq!(xi.len(), shape.dimension());
    assert_eq!(basis.len(), shape.num_vertices());
    match shape {
        ElementShape::Line => basis.copy_from_slice(&line(xi[0])),
        ElementShape::Square => {
            let (x, y) = (line(xi[0]), line(xi[1]));
            for j in 0..2 {
                for i in 0..2 {
                    basis[i + 2 * j] = x[i] * y[j];
                }
            }
        }
        ElementShape::Cube => {
            let (x, y, z) = (line(xi[0]), line(xi[1]), line(xi[2]));
            for k in 0..2 {
                for j in 0..2 {
                    for i in 0..2 {
                        basis[i + 2 * j + 4 * k] = x[i] * y[j] * z[k];
                    }
                }
            }
        }
        ElementShape::Triangle | ElementShape::Tetrahedron => simplex(xi, basis),
        ElementShape::Wedge => {
            let mut triangle = [T::zero(); 3];
            simplex(&xi[..2], &mut triangle);
            let z = line(xi[2]);
            for b in 0..2 {
                for a in 0..3 {
                    basis[a + 3 * b] = triangle[a] * z[b];
                }
            }
        }
    }
}

/// Evaluates the parametric gradients of the basis functions of `shape` at `xi`.
///
/// Column `n` of the `dimension x num_vertices` output holds the gradient of basis
/// function `n`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn populate_basis_gradients<T: Real>(shape: ElementShape, xi: &[T], gradients: &mut DMatrix<T>) {
    let dim = shape.dimension();
    assert_eq!(xi.len(), dim);
    assert_eq!(gradients.shape(), (dim, shape.num_vertices()));
    let dl = line_derivative::<T>();
    match shape {
        ElementShape::Line => {
            gradients[(0, 0)] = dl[0];
            gradients[(0, 1)] = dl[1];
        }
        ElementShape::Square => {
            let (x, y) = (line(xi[0]), line(xi[1]));
            for j in 0..2 {
                for i in 0..2 {
                    gradients[(0, i + 2 * j)] = dl[i] * y[j];
                    gradients[(1, i + 2 * j)] = x[i] * dl[j];
                }
            }
        }
        ElementShape::Cube => {
            let (x, y, z) = (line(xi[0]), line(xi[1]), line(xi[2]));
            for k in 0..2 {
                for j in 0..2 {
                    for i in 0..2 {
                        let n = i + 2 * j + 4 * k;
                        gradients[(0, n)] = dl[i] * y[j] * z[k];
                        gradients[(1, n)] = x[i] * dl[j] * z[k];
                        gradients[(2, n)] = x[i] * y[j] * dl[k];
                    }
                }
            }
        }
        ElementShape::Triangle | ElementShape::Tetrahedron => {
            gradients.fill(0.0);
            for d in 0..dim {
                gradients[(d, 0)] = -1.0;
                gradients[(d, d + 1)] = 1.0;
            }
        }
        ElementShape::Wedge => {
            let mut triangle = [T::zero(); 3];
            simplex(&xi[..2], &mut triangle);
            let z = line(xi[2]);
            // Gradients of the triangle factor in xi1 and xi2
            let triangle_gradients = [[-1.0, 1.0, 0.0], [-1.0, 0.0, 1.0]];
            for b in 0..2 {
                for a in 0..3 {
                    let n = a + 3 * b;
                    gradients[(0, n)] = triangle_gradients[0][a] * z[b];
                    gradients[(1, n)] = triangle_gradients[1][a] * z[b];
                    gradients[(2, n)] = triangle[a] * dl[b];
                }
            }
        }
    }
}
