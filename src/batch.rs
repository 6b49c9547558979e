//! Parallel evaluation and search over many locations or targets.
//!
//! Each rayon worker gets its own [`FieldCache`] (and finder), so the per-location
//! memoization of a cache is never shared between threads.
use crate::cache::FieldCache;
use crate::error::FieldError;
use crate::field::Field;
use crate::find_xi::{ElementXiFinder, FindElementXiSettings, FoundElementXi};
use crate::location::MeshLocation;
use crate::module::FieldModule;
use crate::topology::ElementSet;
use crate::Real;
use log::debug;
use rayon::prelude::*;

/// Evaluates a real-valued field at every location, with the given time.
///
/// Results are in the order of `locations`. A location where the field is undefined gives
/// an error in its own entry without affecting the others.
pub fn evaluate_at_locations<T: Real>(
    module: &FieldModule<T>,
    field: &Field<T>,
    locations: &[MeshLocation<T>],
    time: T,
) -> Vec<Result<Vec<T>, FieldError>> {
    debug!(
        "Evaluating field {} at {} locations in parallel",
        field.name(),
        locations.len()
    );
    let mut results = Vec::with_capacity(locations.len());
    locations
        .par_iter()
        .map_init(
            || module.create_field_cache(),
            |cache: &mut FieldCache<T>, location| {
                cache.set_location(location.clone(), time)?;
                cache.evaluate_real(field)
            },
        )
        .collect_into_vec(&mut results);
    results
}

/// Finds element xi locations for many target points stored contiguously in `targets`.
///
/// `targets` holds `field.num_components()` values per point. Neighbouring points are
/// likely to lie in the same element, so each worker keeps one finder across the points it
/// handles and starts from the element it found last.
pub fn find_element_xi_many<T: Real>(
    module: &FieldModule<T>,
    field: &Field<T>,
    targets: &[T],
    domain: &dyn ElementSet,
    settings: &FindElementXiSettings<T>,
) -> Result<Vec<Result<Option<FoundElementXi<T>>, FieldError>>, FieldError> {
    settings.validate()?;
    let num_components = field.num_components();
    if targets.len() % num_components != 0 {
        return Err(FieldError::InvalidArgument(format!(
            "{} target values is not a multiple of the {} components of field `{}`",
            targets.len(),
            num_components,
            field.name()
        )));
    }

    debug!(
        "Finding element xi for {} target points of field {}",
        targets.len() / num_components,
        field.name()
    );
    let mut results = Vec::with_capacity(targets.len() / num_components);
    targets
        .par_chunks_exact(num_components)
        .map_init(
            || (module.create_field_cache(), ElementXiFinder::new(settings.clone())),
            |(cache, finder), point| finder.find(cache, field, point, domain),
        )
        .collect_into_vec(&mut results);
    Ok(results)
}
