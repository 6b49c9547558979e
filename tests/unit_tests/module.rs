use crate::module_with_coordinates;
use std::sync::{Arc, Mutex};
use xifield::field::ConstantField;
use xifield::mesh::procedural::create_unit_square_uniform_quad_mesh_2d;
use xifield::FieldErrorKind;

#[test]
fn fields_get_unique_names() {
    let (module, coordinates) = module_with_coordinates(&create_unit_square_uniform_quad_mesh_2d(1));
    let constant = module.create_constant(&[1.0]).unwrap();
    assert_ne!(coordinates.name(), constant.name());

    constant.set_name("one").unwrap();
    assert_eq!(module.field_by_name("one"), Some(constant.clone()));
    assert!(coordinates.set_name("one").is_err());
    // Renaming to the current name is a no-op
    constant.set_name("one").unwrap();

    coordinates.set_name("coordinates").unwrap();
    assert_eq!(module.field_by_name("coordinates"), Some(coordinates.clone()));
    assert_eq!(module.num_fields(), 2);
    assert_eq!(module.fields(), vec![coordinates, constant]);
}

#[test]
fn change_observers_see_changed_field_and_dependents() {
    let (module, coordinates) = module_with_coordinates(&create_unit_square_uniform_quad_mesh_2d(1));
    let offset = module.create_constant(&[1.0, 1.0]).unwrap();
    let shifted = module.create_add(&coordinates, &offset).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let seen = seen.clone();
        let shifted = shifted.clone();
        let coordinates = coordinates.clone();
        module.add_change_observer(move |change| {
            seen.lock()
                .unwrap()
                .push((change.affects(&shifted), change.affects(&coordinates)));
        })
    };

    offset
        .update_core(|constant: &mut ConstantField<f64>| constant.set_values(&[2.0, 2.0]))
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(true, false)]);

    coordinates.notify_dependency_changed();
    assert_eq!(*seen.lock().unwrap(), vec![(true, false), (true, true)]);

    assert!(module.remove_change_observer(observer));
    assert!(!module.remove_change_observer(observer));
    offset.notify_dependency_changed();
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn modification_counter_advances_on_changes() {
    let (module, _) = module_with_coordinates(&create_unit_square_uniform_quad_mesh_2d(1));
    let constant = module.create_constant(&[0.0]).unwrap();
    let before = module.modification_counter();
    constant
        .update_core(|constant: &mut ConstantField<f64>| constant.set_values(&[1.0]))
        .unwrap();
    assert!(module.modification_counter() > before);
    assert!(constant.latest_change() > before);
}

#[test]
fn fields_in_use_cannot_be_removed() {
    let (module, coordinates) = module_with_coordinates(&create_unit_square_uniform_quad_mesh_2d(1));
    coordinates.set_name("coordinates").unwrap();
    let doubled = module.create_add(&coordinates, &coordinates).unwrap();

    let error = module.remove_field(&coordinates).unwrap_err();
    assert_eq!(error.kind(), FieldErrorKind::StructuralPrecondition);

    module.remove_field(&doubled).unwrap();
    module.remove_field(&coordinates).unwrap();
    assert!(module.field_by_name("coordinates").is_none());
    assert_eq!(module.num_fields(), 0);
    // A removed field is no longer registered
    assert!(module.remove_field(&coordinates).is_err());

    // Handles stay usable after removal
    let mut cache = module.create_field_cache();
    cache.set_node(xifield::topology::NodeId(3)).unwrap();
    assert_eq!(cache.evaluate_real(&coordinates).unwrap(), vec![1.0, 1.0]);
}

#[test]
fn equivalent_fields_are_found() {
    let (module, coordinates) = module_with_coordinates(&create_unit_square_uniform_quad_mesh_2d(1));
    let first = module.create_scale(&coordinates, &[2.0, 2.0]).unwrap();
    let second = module.create_scale(&coordinates, &[2.0, 2.0]).unwrap();
    let different = module.create_scale(&coordinates, &[2.0, 3.0]).unwrap();

    assert_eq!(module.find_equivalent(&second), Some(first.clone()));
    assert_eq!(module.find_equivalent(&first), Some(second));
    assert_eq!(module.find_equivalent(&different), None);
    assert!(first.same_definition(&first));
    assert!(!first.same_definition(&coordinates));
}
