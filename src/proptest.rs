//! Proptest strategies for locations and geometry used in property tests.
use crate::location::MeshLocation;
use crate::topology::{ElementId, ElementShape};
use ::proptest::prelude::*;
use nalgebra::{DVector, Vector2};

/// Xi coordinates strictly inside `shape`, bounded away from its boundary by `margin`.
pub fn interior_xi(shape: ElementShape, margin: f64) -> impl Strategy<Value = DVector<f64>> {
    let dimension = shape.dimension();
    let simplex_directions = shape.simplex_directions();
    prop::collection::vec(margin..1.0 - margin, dimension).prop_map(move |mut xi| {
        // Squeeze the simplex directions so that they sum to at most 1 - margin
        let sum: f64 = simplex_directions.iter().map(|&i| xi[i]).sum();
        let limit = 1.0 - margin;
        if sum > limit {
            for &i in simplex_directions {
                xi[i] *= limit / sum;
            }
        }
        DVector::from_vec(xi)
    })
}

/// Element xi location inside one of the elements `0..num_elements`, all of shape `shape`.
pub fn element_xi_location(
    shape: ElementShape,
    num_elements: usize,
) -> impl Strategy<Value = MeshLocation<f64>> {
    (0..num_elements, interior_xi(shape, 0.05))
        .prop_map(|(element, xi)| MeshLocation::element_xi(ElementId(element), xi))
}

/// Fibre angle in `[-pi, pi]`.
pub fn fibre_angle() -> impl Strategy<Value = f64> {
    -std::f64::consts::PI..=std::f64::consts::PI
}

/// Displacement of the corners of a unit square small enough to keep the element convex.
pub fn square_corner_perturbations() -> impl Strategy<Value = [Vector2<f64>; 4]> {
    let range = -0.2..0.2;
    let offset = [range.clone(), range].prop_map(|[x, y]| Vector2::new(x, y));
    [offset.clone(), offset.clone(), offset.clone(), offset]
}
