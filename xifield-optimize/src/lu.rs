use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use xifield_traits::Real;

#[derive(Debug, Clone, PartialEq)]
pub enum LuError {
    /// The matrix is not square, or the right-hand side does not match its dimension.
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
    /// A row of the matrix is entirely zero.
    ZeroRow(usize),
    /// The pivot in the given column is not larger than the singular tolerance.
    SingularPivot(usize),
}

impl Display for LuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            &LuError::DimensionMismatch { rows, cols, rhs } => {
                write!(f, "Cannot solve {}x{} system with right-hand side of length {}.", rows, cols, rhs)
            }
            &LuError::ZeroRow(row) => write!(f, "Matrix is singular: row {} is zero.", row),
            &LuError::SingularPivot(col) => {
                write!(f, "Matrix is singular: pivot in column {} is below tolerance.", col)
            }
        }
    }
}

impl Error for LuError {}

/// In-place LU decomposition of a dense square matrix with partial pivoting.
///
/// Pivots are chosen by largest implicitly scaled magnitude (each row is scaled by the
/// reciprocal of its largest entry). The decomposition fails if any pivot has magnitude not
/// larger than the singular tolerance.
#[derive(Debug, Clone)]
pub struct LuDecomposition<T: Real> {
    lu: DMatrix<T>,
    permutation: Vec<usize>,
    parity: T,
}

impl<T: Real> LuDecomposition<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn decompose(mut a: DMatrix<T>, singular_tolerance: T) -> Result<Self, LuError> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LuError::DimensionMismatch {
                rows: n,
                cols: a.ncols(),
                rhs: n,
            });
        }

        let mut scaling = Vec::with_capacity(n);
        for i in 0..n {
            let row_max = a.row(i).iter().fold(T::zero(), |max, a_ij| max.max(a_ij.abs()));
            if row_max == 0.0 {
                return Err(LuError::ZeroRow(i));
            }
            scaling.push(1.0 / row_max);
        }

        let mut permutation = Vec::with_capacity(n);
        let mut parity = 1.0;
        for j in 0..n {
            // Upper part of column j
            for i in 0..j {
                let mut sum = a[(i, j)];
                for k in 0..i {
                    sum -= a[(i, k)] * a[(k, j)];
                }
                a[(i, j)] = sum;
            }

            // Lower part of column j, tracking the largest scaled candidate pivot
            let mut best = T::zero();
            let mut pivot_row = j;
            for i in j..n {
                let mut sum = a[(i, j)];
                for k in 0..j {
                    sum -= a[(i, k)] * a[(k, j)];
                }
                a[(i, j)] = sum;
                let scaled = scaling[i] * sum.abs();
                if scaled >= best {
                    best = scaled;
                    pivot_row = i;
                }
            }

            if pivot_row != j {
                a.swap_rows(pivot_row, j);
                parity = -parity;
                scaling.swap(pivot_row, j);
            }
            permutation.push(pivot_row);

            let pivot = a[(j, j)];
            if pivot.abs() <= singular_tolerance {
                return Err(LuError::SingularPivot(j));
            }
            for i in (j + 1)..n {
                a[(i, j)] /= pivot;
            }
        }

        Ok(Self {
            lu: a,
            permutation,
            parity,
        })
    }

    pub fn dimension(&self) -> usize {
        self.lu.nrows()
    }

    /// Determinant of the decomposed matrix.
    pub fn determinant(&self) -> T {
        self.lu
            .diagonal()
            .iter()
            .fold(self.parity, |det, &u_ii| det * u_ii)
    }

    /// Solves `A x = b` by forward and back substitution, overwriting `b` with `x`.
    pub fn solve_mut(&self, b: &mut DVector<T>) -> Result<(), LuError> {
        let n = self.dimension();
        if b.len() != n {
            return Err(LuError::DimensionMismatch {
                rows: n,
                cols: n,
                rhs: b.len(),
            });
        }

        // Forward substitution with the unit lower triangle, applying the row permutation
        // as we go. `first_nonzero` skips leading zeros of b.
        let mut first_nonzero = None;
        for i in 0..n {
            let p = self.permutation[i];
            let mut sum = b[p];
            b[p] = b[i];
            if let Some(start) = first_nonzero {
                for k in start..i {
                    sum -= self.lu[(i, k)] * b[k];
                }
            } else if sum != T::zero() {
                first_nonzero = Some(i);
            }
            b[i] = sum;
        }

        for i in (0..n).rev() {
            let mut sum = b[i];
            for k in (i + 1)..n {
                sum -= self.lu[(i, k)] * b[k];
            }
            b[i] = sum / self.lu[(i, i)];
        }
        Ok(())
    }

    pub fn solve(&self, b: &DVector<T>) -> Result<DVector<T>, LuError> {
        let mut x = b.clone();
        self.solve_mut(&mut x)?;
        Ok(x)
    }
}
