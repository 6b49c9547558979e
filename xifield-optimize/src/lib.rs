/// Gauss-Newton steps for small least-squares problems
pub mod least_squares;
/// LU decomposition with partial pivoting and a singular pivot tolerance
pub mod lu;
