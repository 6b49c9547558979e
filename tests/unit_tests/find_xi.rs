use crate::{module_with_coordinates, single_element_module};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, Vector2};
use proptest::prelude::*;
use util::{assert_approx_eq, unit_cube_grid};
use xifield::mesh::procedural::{create_rectangular_uniform_quad_mesh_2d, create_unit_square_uniform_quad_mesh_2d};
use xifield::find_xi::nearest_step_limit;
use xifield::mesh::{ElementGroup, Mesh};
use xifield::proptest::{interior_xi, square_corner_perturbations};
use xifield::topology::{ElementId, ElementSet, ElementShape};
use xifield::{
    find_element_xi, ElementXiFinder, FieldError, FieldErrorKind, FindElementXiSettings, MeshLocation,
    SharedElementXiFinder,
};

const DISTORTED_QUAD: [&[f64]; 4] = [&[0.0, 0.0], &[2.0, 0.2], &[-0.1, 1.5], &[2.3, 1.8]];

fn whole_mesh(mesh: &Mesh) -> ElementGroup {
    ElementGroup::from_mesh(mesh, |_, _| true)
}

#[test]
fn finds_xi_in_distorted_quad() {
    let (module, coordinates, mesh) = single_element_module(ElementShape::Square, &DISTORTED_QUAD);
    let mut cache = module.create_field_cache();
    cache.set_element_xi(ElementId(0), &[0.3, 0.6]).unwrap();
    let target = cache.evaluate_real(&coordinates).unwrap();
    cache.clear_location();

    let group = whole_mesh(&mesh);
    assert_eq!(group.num_elements(), 1);
    let found = find_element_xi(&mut cache, &coordinates, &target, &group, false)
        .unwrap()
        .unwrap();
    assert_eq!(found.element, ElementId(0));
    assert_matrix_eq!(found.xi, DVector::from_column_slice(&[0.3, 0.6]), comp = abs, tol = 1e-6);
    assert!(found.residual_squared < 1e-12);
    // The cache is left at the found location
    assert_eq!(cache.location(), Some(&found.to_location()));
}

#[test]
fn finds_containing_element_of_uniform_mesh() {
    let generated = create_unit_square_uniform_quad_mesh_2d(4);
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let mut finder = ElementXiFinder::default();

    let found = finder
        .find(&mut cache, &coordinates, &[0.61, 0.37], &generated.mesh)
        .unwrap()
        .unwrap();
    assert_eq!(found.element, ElementId(6));
    assert_matrix_eq!(found.xi, DVector::from_column_slice(&[0.44, 0.48]), comp = abs, tol = 1e-8);
    assert_eq!(finder.last_element(), Some(ElementId(6)));

    // An identical search is answered from the cached result
    let iterations = finder.statistics().iterations;
    let again = finder
        .find(&mut cache, &coordinates, &[0.61, 0.37], &generated.mesh)
        .unwrap();
    assert_eq!(again, Some(found));
    assert_eq!(finder.statistics().cached_searches, 1);
    assert_eq!(finder.statistics().iterations, iterations);

    // A new search starts from the last element and succeeds there
    let elements_tried = finder.statistics().elements_tried;
    let nearby = finder
        .find(&mut cache, &coordinates, &[0.6, 0.4], &generated.mesh)
        .unwrap()
        .unwrap();
    assert_eq!(nearby.element, ElementId(6));
    assert_eq!(finder.statistics().elements_tried, elements_tried + 1);
}

#[test]
fn exact_search_outside_mesh_finds_nothing() {
    let generated = create_unit_square_uniform_quad_mesh_2d(2);
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let found = find_element_xi(&mut cache, &coordinates, &[1.5, 0.5], &generated.mesh, false).unwrap();
    assert_eq!(found, None);
}

#[test]
fn nearest_search_outside_mesh_finds_closest_boundary_point() {
    let generated = create_rectangular_uniform_quad_mesh_2d(1.0, 3, 1, 1, &Vector2::zeros());
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let target = [3.5, 0.5];

    let found = find_element_xi(&mut cache, &coordinates, &target, &generated.mesh, true)
        .unwrap()
        .unwrap();
    assert_eq!(found.element, ElementId(2));
    assert_matrix_eq!(found.xi, DVector::from_column_slice(&[1.0, 0.5]), comp = abs, tol = 1e-6);
    assert_approx_eq!(found.residual_squared, 0.25, abstol = 1e-9);

    // No sampled point of any element is closer
    for element in generated.mesh.element_ids() {
        for xi in unit_cube_grid(2, 11) {
            cache.set_element_xi(element, xi.as_slice()).unwrap();
            let x = cache.evaluate_real(&coordinates).unwrap();
            let distance_squared = (x[0] - target[0]).powi(2) + (x[1] - target[1]).powi(2);
            assert!(found.residual_squared <= distance_squared + 1e-9);
        }
    }
}

#[test]
fn nearest_search_checks_every_element_and_keeps_exact_match() {
    let generated = create_rectangular_uniform_quad_mesh_2d(1.0, 3, 1, 1, &Vector2::zeros());
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let mut finder = ElementXiFinder::new(FindElementXiSettings::nearest());

    let found = finder
        .find(&mut cache, &coordinates, &[1.25, 0.75], &generated.mesh)
        .unwrap()
        .unwrap();
    assert_eq!(found.element, ElementId(1));
    assert_matrix_eq!(found.xi, DVector::from_column_slice(&[0.25, 0.75]), comp = abs, tol = 1e-6);
    assert!(found.residual_squared < 1e-12);
    assert_eq!(finder.statistics().elements_tried, 3);
    assert_eq!(finder.last_element(), Some(ElementId(1)));

    // The matching element is tried first next time, but the others are still compared
    finder
        .find(&mut cache, &coordinates, &[1.5, 0.5], &generated.mesh)
        .unwrap()
        .unwrap();
    assert_eq!(finder.statistics().elements_tried, 6);
}

#[test]
fn nearest_step_limit_shrinks_with_iterations() {
    assert_eq!(nearest_step_limit::<f64>(0), 0.2);
    assert_eq!(nearest_step_limit::<f64>(4), 0.2);
    assert_eq!(nearest_step_limit::<f64>(5), 0.1);
    assert_eq!(nearest_step_limit::<f64>(19), 0.1);
    assert_eq!(nearest_step_limit::<f64>(20), 0.05);
    assert_eq!(nearest_step_limit::<f64>(1000), 0.05);
}

#[test]
fn nearest_search_takes_limited_steps() {
    let (module, coordinates, _) =
        single_element_module(ElementShape::Square, &[&[0.0, 0.0], &[1.0, 0.0], &[0.0, 1.0], &[1.0, 1.0]]);
    let mut cache = module.create_field_cache();

    // Stopping after k iterations reports where the k-th step ended
    let mut path = vec![DVector::from_column_slice(&[0.0, 0.0])];
    for max_iterations in 1..=10 {
        let mut finder = ElementXiFinder::new(FindElementXiSettings {
            max_iterations,
            start_with_data_xi: true,
            ..FindElementXiSettings::nearest()
        });
        let found = finder
            .find_in_element(&mut cache, &coordinates, &[1.0, 1.0], ElementId(0), Some(&[0.0, 0.0][..]))
            .unwrap()
            .unwrap();
        path.push(found.xi);
    }

    for (iteration, pair) in path.windows(2).enumerate() {
        let step_length = (&pair[1] - &pair[0]).norm();
        let limit = nearest_step_limit::<f64>(iteration);
        assert!(step_length <= limit + 1e-12);
        // The target is far enough away that every step but the last is cut to the limit
        if iteration + 1 < 10 {
            assert_approx_eq!(step_length, limit, abstol = 1e-12);
        }
    }
    assert_matrix_eq!(path[10], DVector::from_column_slice(&[1.0, 1.0]), comp = abs, tol = 1e-12);
}

#[test]
fn finds_xi_in_triangle() {
    let (module, coordinates, mesh) =
        single_element_module(ElementShape::Triangle, &[&[0.0, 0.0], &[2.0, 0.0], &[0.0, 2.0]]);
    let mut cache = module.create_field_cache();
    let found = find_element_xi(&mut cache, &coordinates, &[0.5, 0.5], &*mesh, false)
        .unwrap()
        .unwrap();
    assert_matrix_eq!(found.xi, DVector::from_column_slice(&[0.25, 0.25]), comp = abs, tol = 1e-8);

    // Outside the hypotenuse
    let outside = find_element_xi(&mut cache, &coordinates, &[1.5, 1.5], &*mesh, false).unwrap();
    assert_eq!(outside, None);
}

#[test]
fn degenerate_element_is_skipped() {
    // Both edges along xi2 collapse, so the element has no extent in y
    let (module, coordinates, mesh) =
        single_element_module(ElementShape::Square, &[&[0.0, 0.0], &[1.0, 0.0], &[0.0, 0.0], &[1.0, 0.0]]);
    let mut cache = module.create_field_cache();
    let found = find_element_xi(&mut cache, &coordinates, &[0.5, 0.0], &*mesh, false).unwrap();
    assert_eq!(found, None);
}

#[test]
fn overdetermined_search_rejects_unexplained_residual() {
    // A flat square in the z = 0 plane
    let (module, coordinates, mesh) = single_element_module(
        ElementShape::Square,
        &[&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], &[1.0, 1.0, 0.0]],
    );
    let mut cache = module.create_field_cache();

    let on_plane = find_element_xi(&mut cache, &coordinates, &[0.25, 0.75, 0.0], &*mesh, false)
        .unwrap()
        .unwrap();
    assert_matrix_eq!(on_plane.xi, DVector::from_column_slice(&[0.25, 0.75]), comp = abs, tol = 1e-8);

    let above = [0.25, 0.75, 1.0];
    assert_eq!(find_element_xi(&mut cache, &coordinates, &above, &*mesh, false).unwrap(), None);
    let nearest = find_element_xi(&mut cache, &coordinates, &above, &*mesh, true)
        .unwrap()
        .unwrap();
    assert_matrix_eq!(nearest.xi, DVector::from_column_slice(&[0.25, 0.75]), comp = abs, tol = 1e-6);
    assert_approx_eq!(nearest.residual_squared, 1.0, abstol = 1e-9);
}

#[test]
fn structural_errors_are_reported() {
    let generated = create_unit_square_uniform_quad_mesh_2d(1);
    let (module, coordinates) = module_with_coordinates(&generated);
    let x = module.create_component(&coordinates, &[0]).unwrap();
    let mut cache = module.create_field_cache();
    let mut finder = ElementXiFinder::default();

    let error = finder
        .find(&mut cache, &x, &[0.5], &generated.mesh)
        .unwrap_err();
    assert!(matches!(error, FieldError::Underdetermined { dimension: 2, values: 1 }));
    assert_eq!(error.kind(), FieldErrorKind::StructuralPrecondition);

    let error = finder
        .find(&mut cache, &coordinates, &[0.5, 0.5, 0.5], &generated.mesh)
        .unwrap_err();
    assert!(matches!(error, FieldError::ValueCountMismatch { expected: 2, actual: 3, .. }));

    finder.set_settings(FindElementXiSettings {
        xi_tolerance: 0.0,
        ..FindElementXiSettings::default()
    });
    assert!(finder
        .find(&mut cache, &coordinates, &[0.5, 0.5], &generated.mesh)
        .is_err());
}

#[test]
fn starting_from_data_xi_saves_iterations() {
    let (module, coordinates, _) = single_element_module(ElementShape::Square, &DISTORTED_QUAD);
    let mut cache = module.create_field_cache();
    cache.set_element_xi(ElementId(0), &[0.7, 0.2]).unwrap();
    let target = cache.evaluate_real(&coordinates).unwrap();

    let mut from_centroid = ElementXiFinder::default();
    from_centroid
        .find_in_element(&mut cache, &coordinates, &target, ElementId(0), Some(&[0.7, 0.2][..]))
        .unwrap()
        .unwrap();

    let mut from_data = ElementXiFinder::new(FindElementXiSettings {
        start_with_data_xi: true,
        ..FindElementXiSettings::default()
    });
    let found = from_data
        .find_in_element(&mut cache, &coordinates, &target, ElementId(0), Some(&[0.7, 0.2][..]))
        .unwrap()
        .unwrap();
    assert_matrix_eq!(found.xi, DVector::from_column_slice(&[0.7, 0.2]), comp = abs, tol = 1e-8);
    assert_eq!(from_data.statistics().iterations, 1);
    assert!(from_centroid.statistics().iterations > 1);
}

#[test]
fn search_from_start_location_tries_its_element_first() {
    let generated = create_unit_square_uniform_quad_mesh_2d(4);
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let mut finder = ElementXiFinder::default();

    let start = MeshLocation::element_xi(ElementId(15), vec![0.5, 0.5]);
    let found = finder
        .find_from(&mut cache, &coordinates, &[0.9, 0.9], &generated.mesh, &start)
        .unwrap()
        .unwrap();
    assert_eq!(found.element, ElementId(15));
    assert_eq!(finder.statistics().elements_tried, 1);

    let node_start = MeshLocation::node(xifield::topology::NodeId(0));
    assert!(finder
        .find_from(&mut cache, &coordinates, &[0.9, 0.9], &generated.mesh, &node_start)
        .is_err());
}

#[test]
fn element_group_restricts_search() {
    let generated = create_unit_square_uniform_quad_mesh_2d(2);
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let mut group = ElementGroup::from_mesh(&generated.mesh, |id, _| id != ElementId(3));

    let mut finder = ElementXiFinder::default();
    let target = [0.75, 0.75];
    assert_eq!(finder.find(&mut cache, &coordinates, &target, &group).unwrap(), None);

    // Adding the element changes the group and the cached miss is not reused
    group.insert(ElementId(3));
    let found = finder
        .find(&mut cache, &coordinates, &target, &group)
        .unwrap()
        .unwrap();
    assert_eq!(found.element, ElementId(3));
    assert_eq!(finder.statistics().cached_searches, 0);
}

#[test]
fn repeated_search_at_another_time_is_not_answered_from_cache() {
    let generated = create_unit_square_uniform_quad_mesh_2d(2);
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let mut finder = ElementXiFinder::default();
    let target = [0.3, 0.8];

    let found = finder.find(&mut cache, &coordinates, &target, &generated.mesh).unwrap();
    cache.set_time(1.0);
    let later = finder.find(&mut cache, &coordinates, &target, &generated.mesh).unwrap();
    assert_eq!(finder.statistics().cached_searches, 0);
    assert_eq!(later, found);

    finder.find(&mut cache, &coordinates, &target, &generated.mesh).unwrap();
    assert_eq!(finder.statistics().cached_searches, 1);
    assert_eq!(cache.time(), 1.0);
}

#[test]
fn shared_finder_refuses_concurrent_use() {
    let generated = create_unit_square_uniform_quad_mesh_2d(1);
    let (module, coordinates) = module_with_coordinates(&generated);
    let mut cache = module.create_field_cache();
    let shared = SharedElementXiFinder::new(ElementXiFinder::default());

    {
        let _guard = shared.lock();
        let error = shared
            .try_find(&mut cache, &coordinates, &[0.5, 0.5], &generated.mesh)
            .unwrap_err();
        assert_eq!(error.kind(), FieldErrorKind::ResourceBusy);
    }
    assert!(shared
        .try_find(&mut cache, &coordinates, &[0.5, 0.5], &generated.mesh)
        .unwrap()
        .is_some());

    let other = shared.clone();
    assert!(matches!(shared.try_destroy(), Err(FieldError::ResourceBusy(_))));
    let finder = other.try_destroy().unwrap();
    assert_eq!(finder.statistics().searches, 1);
}

#[test]
fn settings_deserialize_with_defaults() {
    let settings: FindElementXiSettings<f64> = serde_json::from_str(r#"{ "find_nearest": true }"#).unwrap();
    assert_eq!(settings, FindElementXiSettings::nearest());
    assert_eq!(settings.max_iterations, 50);

    let json = serde_json::to_string(&settings).unwrap();
    let parsed: FindElementXiSettings<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, settings);
}

proptest! {
    #[test]
    fn finds_xi_in_perturbed_squares(
        perturbations in square_corner_perturbations(),
        xi in interior_xi(ElementShape::Square, 0.05),
    ) {
        let corners = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let coordinates: Vec<Vec<f64>> = corners
            .iter()
            .zip(&perturbations)
            .map(|(corner, offset)| vec![corner[0] + offset.x, corner[1] + offset.y])
            .collect();
        let coordinates: Vec<&[f64]> = coordinates.iter().map(Vec::as_slice).collect();
        let (module, field, mesh) = single_element_module(ElementShape::Square, &coordinates);

        let mut cache = module.create_field_cache();
        cache.set_element_xi(ElementId(0), xi.as_slice()).unwrap();
        let target = cache.evaluate_real(&field).unwrap();
        let found = find_element_xi(&mut cache, &field, &target, &*mesh, false).unwrap();

        prop_assert!(found.is_some());
        let found = found.unwrap();
        prop_assert!((&found.xi - &xi).amax() <= 1e-4);
        prop_assert!(mesh.contains_element(found.element));
    }
}
