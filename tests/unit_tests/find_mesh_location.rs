use crate::{line_mesh, module_with_coordinates};
use std::sync::Arc;
use util::assert_approx_eq;
use xifield::field::{ConstantField, FindMeshLocationField, SearchMode};
use xifield::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use xifield::mesh::ElementGroup;
use xifield::topology::{ElementId, NodeId};
use xifield::{FieldErrorKind, FieldModule, FieldValueType};

#[test]
fn finds_location_of_source_values() {
    let generated = create_unit_square_uniform_quad_mesh_2d(2);
    let (module, coordinates) = module_with_coordinates(&generated);
    let target = module.create_constant(&[0.8, 0.3]).unwrap();
    let location = module
        .create_find_mesh_location(&target, &coordinates, Arc::new(generated.mesh.clone()))
        .unwrap();
    assert_eq!(location.value_type(), FieldValueType::MeshLocation);

    let mut cache = module.create_field_cache();
    cache.set_node(NodeId(0)).unwrap();
    let found = cache.evaluate_mesh_location(&location).unwrap();
    assert_eq!(found.element(), Some(ElementId(1)));
    let xi = found.xi().unwrap();
    assert_approx_eq!(xi[0], 0.6, abstol = 1e-8);
    assert_approx_eq!(xi[1], 0.6, abstol = 1e-8);

    // The outer cache stays where it was
    assert_eq!(cache.location().and_then(|location| location.node_id()), Some(NodeId(0)));
}

#[test]
fn exact_mode_is_undefined_outside_the_domain_and_nearest_mode_is_not() {
    let generated = create_unit_square_uniform_quad_mesh_2d(1);
    let (module, coordinates) = module_with_coordinates(&generated);
    let target = module.create_constant(&[2.0, 0.5]).unwrap();
    let location = module
        .create_find_mesh_location(&target, &coordinates, Arc::new(generated.mesh.clone()))
        .unwrap();
    let mut cache = module.create_field_cache();
    cache.set_node(NodeId(0)).unwrap();

    let error = cache.evaluate_mesh_location(&location).unwrap_err();
    assert_eq!(error.kind(), FieldErrorKind::EvaluationUndefined);

    location
        .update_core(|core: &mut FindMeshLocationField<f64>| {
            core.set_search_mode(SearchMode::Nearest);
            Ok(())
        })
        .unwrap();
    let found = cache.evaluate_mesh_location(&location).unwrap();
    let xi = found.xi().unwrap();
    assert_approx_eq!(xi[0], 1.0, abstol = 1e-12);
    assert_approx_eq!(xi[1], 0.5, abstol = 1e-6);
}

#[test]
fn location_follows_changes_of_the_source() {
    let generated = create_unit_square_uniform_quad_mesh_2d(2);
    let (module, coordinates) = module_with_coordinates(&generated);
    let target = module.create_constant(&[0.25, 0.25]).unwrap();
    let location = module
        .create_find_mesh_location(&target, &coordinates, Arc::new(generated.mesh.clone()))
        .unwrap();
    let mut cache = module.create_field_cache();
    cache.set_node(NodeId(0)).unwrap();
    assert_eq!(
        cache.evaluate_mesh_location(&location).unwrap().element(),
        Some(ElementId(0))
    );

    target
        .update_core(|constant: &mut ConstantField<f64>| constant.set_values(&[0.75, 0.75]))
        .unwrap();
    assert_eq!(
        cache.evaluate_mesh_location(&location).unwrap().element(),
        Some(ElementId(3))
    );
}

#[test]
fn creation_checks_sources_and_domain() {
    let generated = create_unit_square_uniform_quad_mesh_2d(1);
    let (module, coordinates) = module_with_coordinates(&generated);
    let domain = Arc::new(generated.mesh.clone());

    let scalar = module.create_constant(&[0.5]).unwrap();
    let x = module.create_component(&coordinates, &[0]).unwrap();
    let error = module
        .create_find_mesh_location(&scalar, &coordinates, domain.clone())
        .unwrap_err();
    assert_eq!(error.kind(), FieldErrorKind::StructuralPrecondition);
    assert!(module
        .create_find_mesh_location(&scalar, &x, domain.clone())
        .is_err());

    // A one-dimensional group can be searched with a scalar field
    let lines = FieldModule::new(Arc::new(line_mesh(3)));
    let positions: Vec<[f64; 1]> = (0..4).map(|i| [i as f64 * 0.5]).collect();
    let position = lines
        .create_finite_element_with_parameters(
            1,
            positions
                .iter()
                .enumerate()
                .map(|(i, x)| (NodeId(i), &x[..])),
        )
        .unwrap();
    let target = lines.create_constant(&[1.25]).unwrap();
    let mut group = ElementGroup::new(1);
    group.insert(ElementId(2));
    let location = lines
        .create_find_mesh_location(&target, &position, Arc::new(group))
        .unwrap();
    let mut cache = lines.create_field_cache();
    cache.set_node(NodeId(0)).unwrap();
    let found = cache.evaluate_mesh_location(&location).unwrap();
    assert_eq!(found.element(), Some(ElementId(2)));
    assert_approx_eq!(found.xi().unwrap()[0], 0.5, abstol = 1e-10);
}

#[test]
fn embedded_field_evaluates_at_found_location() {
    let generated = create_unit_square_uniform_quad_mesh_2d(2);
    let (module, coordinates) = module_with_coordinates(&generated);
    let nodal_temperatures: Vec<_> = generated
        .coordinates
        .iter()
        .map(|(node, x)| (*node, [x[0] + 10.0 * x[1]]))
        .collect();
    let temperature = module
        .create_finite_element_with_parameters(
            1,
            nodal_temperatures
                .iter()
                .map(|(node, value)| (*node, &value[..])),
        )
        .unwrap();
    let target = module.create_constant(&[0.3, 0.9]).unwrap();
    let location = module
        .create_find_mesh_location(&target, &coordinates, Arc::new(generated.mesh.clone()))
        .unwrap();
    let embedded = module.create_embedded(&location, &temperature).unwrap();
    assert!(module.create_embedded(&coordinates, &temperature).is_err());
    assert!(module.create_embedded(&location, &location).is_err());

    let mut cache = module.create_field_cache();
    cache.set_node(NodeId(4)).unwrap();
    let values = cache.evaluate_real(&embedded).unwrap();
    assert_approx_eq!(values[0], 9.3, abstol = 1e-8);
}
