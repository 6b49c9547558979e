//! Inverse evaluation: finding the element and xi at which a field takes given values.
//!
//! For each candidate element the finder runs a Gauss-Newton iteration on
//!  min_xi || target - f(element, xi) ||^2,
//! starting from the element centroid (or caller-supplied xi), clamping xi back into the
//! element between iterations. Failure in one element is never fatal: singular systems,
//! undefined evaluations, stagnation and the iteration cap only eliminate that element.
use crate::cache::FieldCache;
use crate::error::FieldError;
use crate::field::{Field, FieldValueType};
use crate::location::MeshLocation;
use crate::topology::{ElementId, ElementSet, ElementShape};
use crate::Real;
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use xifield_optimize::least_squares::{
    gauss_newton_increment, is_step_within_tolerance, limit_step_length, residual_explained_by_step,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    default,
    bound(serialize = "T: Serialize", deserialize = "T: Real + Deserialize<'de>")
)]
pub struct FindElementXiSettings<T> {
    /// Convergence is reached when every xi increment is at most this large.
    pub xi_tolerance: T,
    pub max_iterations: usize,
    /// Pivots of the normal equations at or below this magnitude make an element singular.
    pub singular_tolerance: T,
    /// Start from the caller-supplied xi instead of the element centroid.
    pub start_with_data_xi: bool,
    /// Return the closest point found when no element matches exactly.
    pub find_nearest: bool,
}

impl<T: Real> Default for FindElementXiSettings<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn default() -> Self {
        Self {
            xi_tolerance: 1e-5,
            max_iterations: 50,
            singular_tolerance: 1e-12,
            start_with_data_xi: false,
            find_nearest: false,
        }
    }
}

impl<T: Real> FindElementXiSettings<T> {
    pub fn nearest() -> Self {
        Self {
            find_nearest: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        if !(self.xi_tolerance > T::zero()) {
            return Err(FieldError::InvalidArgument("xi tolerance must be positive".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(FieldError::InvalidArgument("at least one iteration is required".to_string()));
        }
        if self.singular_tolerance < T::zero() {
            return Err(FieldError::InvalidArgument(
                "singular tolerance must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FoundElementXi<T: Real> {
    pub element: ElementId,
    pub xi: DVector<T>,
    /// Sum of squared differences between the target values and the field at `xi`.
    pub residual_squared: T,
}

impl<T: Real> FoundElementXi<T> {
    pub fn to_location(&self) -> MeshLocation<T> {
        MeshLocation::element_xi(self.element, self.xi.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindStatistics {
    pub searches: usize,
    /// Searches answered from the result of an identical previous search.
    pub cached_searches: usize,
    pub elements_tried: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
struct CachedSearch<T: Real> {
    module_id: u64,
    field_index: usize,
    modification_stamp: u64,
    domain_id: u64,
    time: T,
    targets: Vec<T>,
    settings: FindElementXiSettings<T>,
    result: Option<FoundElementXi<T>>,
}

/// Reusable working state for repeated find-element-xi searches.
///
/// Buffers are kept between searches, the last successful element is tried first, and a
/// search repeating the previous one exactly is answered without iterating.
#[derive(Debug)]
pub struct ElementXiFinder<T: Real> {
    settings: FindElementXiSettings<T>,
    targets: Vec<T>,
    residual: DVector<T>,
    jacobian: DMatrix<T>,
    last_xi: DVector<T>,
    last_element: Option<ElementId>,
    nearest: Option<FoundElementXi<T>>,
    cached: Option<CachedSearch<T>>,
    statistics: FindStatistics,
}

impl<T: Real> Default for ElementXiFinder<T> {
    fn default() -> Self {
        Self::new(FindElementXiSettings::default())
    }
}

impl<T: Real> ElementXiFinder<T> {
    pub fn new(settings: FindElementXiSettings<T>) -> Self {
        Self {
            settings,
            targets: Vec::new(),
            residual: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
            last_xi: DVector::zeros(0),
            last_element: None,
            nearest: None,
            cached: None,
            statistics: FindStatistics::default(),
        }
    }

    pub fn settings(&self) -> &FindElementXiSettings<T> {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: FindElementXiSettings<T>) {
        if settings != self.settings {
            self.settings = settings;
            self.cached = None;
        }
    }

    /// Element of the last successful search, tried first by the next search.
    pub fn last_element(&self) -> Option<ElementId> {
        self.last_element
    }

    pub fn statistics(&self) -> FindStatistics {
        self.statistics
    }

    /// Forgets the last element and the result of the last search.
    pub fn clear_cache(&mut self) {
        self.last_element = None;
        self.cached = None;
    }

    /// Searches `domain` for a location where `field` takes the `targets` values.
    ///
    /// On success `cache` is left at the found location. `Ok(None)` means no element
    /// matched (or, in nearest mode, none could be evaluated).
    pub fn find(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        targets: &[T],
        domain: &dyn ElementSet,
    ) -> Result<Option<FoundElementXi<T>>, FieldError> {
        self.check_preconditions(cache, field, targets, domain.dimension())?;

        let modification_stamp = field.latest_change();
        let domain_id = domain.domain_id();
        if let Some(cached) = &self.cached {
            let repeated = cached.module_id == field.module_id()
                && cached.field_index == field.cache_index()
                && cached.modification_stamp == modification_stamp
                && cached.domain_id == domain_id
                && cached.time == cache.time()
                && cached.targets == targets
                && cached.settings == self.settings;
            if repeated {
                trace!("Answering repeated find element xi search from cache");
                self.statistics.cached_searches += 1;
                let result = cached.result.clone();
                if let Some(found) = &result {
                    cache.set_element_xi(found.element, found.xi.as_slice())?;
                }
                return Ok(result);
            }
        }

        let last_element = self
            .last_element
            .filter(|&element| domain.contains_element(element));
        let candidates = last_element
            .into_iter()
            .chain(
                domain
                    .element_ids()
                    .filter(move |&element| Some(element) != last_element),
            )
            .map(|element| (element, None));
        let result = self.search(cache, field, targets, candidates)?;

        self.cached = Some(CachedSearch {
            module_id: field.module_id(),
            field_index: field.cache_index(),
            modification_stamp,
            domain_id,
            time: cache.time(),
            targets: targets.to_vec(),
            settings: self.settings.clone(),
            result: result.clone(),
        });
        Ok(result)
    }

    /// Like [`find`](Self::find), but tries the element of `start` first, from its xi if
    /// `start_with_data_xi` is set.
    pub fn find_from(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        targets: &[T],
        domain: &dyn ElementSet,
        start: &MeshLocation<T>,
    ) -> Result<Option<FoundElementXi<T>>, FieldError> {
        self.check_preconditions(cache, field, targets, domain.dimension())?;
        let (start_element, start_xi) = match start {
            MeshLocation::ElementXi { element, xi } => (*element, xi.as_slice()),
            MeshLocation::Node(node) => {
                return Err(FieldError::InvalidArgument(format!(
                    "search must start from an element location, not {}",
                    node
                )))
            }
        };

        let first = Some(start_element).filter(|&element| domain.contains_element(element));
        let last_element = self
            .last_element
            .filter(|&element| domain.contains_element(element) && Some(element) != first);
        let candidates = first
            .map(|element| (element, Some(start_xi)))
            .into_iter()
            .chain(last_element.map(|element| (element, None)))
            .chain(
                domain
                    .element_ids()
                    .filter(move |&element| Some(element) != first && Some(element) != last_element)
                    .map(|element| (element, None)),
            );
        self.search(cache, field, targets, candidates)
    }

    /// Searches a single element, optionally starting from `data_xi`.
    pub fn find_in_element(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        targets: &[T],
        element: ElementId,
        data_xi: Option<&[T]>,
    ) -> Result<Option<FoundElementXi<T>>, FieldError> {
        let dimension = cache
            .module()
            .topology()
            .element_dimension(element)
            .ok_or_else(|| FieldError::InvalidArgument(format!("unknown {}", element)))?;
        self.check_preconditions(cache, field, targets, dimension)?;
        self.search(cache, field, targets, std::iter::once((element, data_xi)))
    }

    fn check_preconditions(
        &self,
        cache: &FieldCache<T>,
        field: &Field<T>,
        targets: &[T],
        dimension: usize,
    ) -> Result<(), FieldError> {
        self.settings.validate()?;
        if field.module_id() != cache.module().id() {
            return Err(FieldError::WrongModule(field.name()));
        }
        if field.value_type() != FieldValueType::Real {
            return Err(FieldError::NotRealValued(field.name()));
        }
        if targets.len() != field.num_components() {
            return Err(FieldError::ValueCountMismatch {
                field: field.name(),
                expected: field.num_components(),
                actual: targets.len(),
            });
        }
        if dimension > targets.len() {
            return Err(FieldError::Underdetermined {
                dimension,
                values: targets.len(),
            });
        }
        Ok(())
    }

    fn search<'x, I>(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        targets: &[T],
        candidates: I,
    ) -> Result<Option<FoundElementXi<T>>, FieldError>
    where
        I: IntoIterator<Item = (ElementId, Option<&'x [T]>)>,
    {
        self.targets.clear();
        self.targets.extend_from_slice(targets);
        self.nearest = None;
        self.statistics.searches += 1;

        for (element, data_xi) in candidates {
            if let Some(found) = self.try_element(cache, field, element, data_xi)? {
                debug!("Found {} at xi {:?}", element, found.xi.as_slice());
                self.last_element = Some(element);
                return Ok(Some(found));
            }
        }

        let nearest = self.nearest.take();
        match &nearest {
            Some(found) => {
                debug!(
                    "Nearest location is {} at xi {:?}, residual {}",
                    found.element,
                    found.xi.as_slice(),
                    found.residual_squared
                );
                self.last_element = Some(found.element);
                cache.set_element_xi(found.element, found.xi.as_slice())?;
            }
            None => debug!("No element found"),
        }
        Ok(nearest)
    }

    /// Returns the location if `element` matches exactly. In nearest mode nothing is
    /// returned; the closest point reached in the element is recorded instead.
    fn try_element(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        element: ElementId,
        data_xi: Option<&[T]>,
    ) -> Result<Option<FoundElementXi<T>>, FieldError> {
        let shape = match cache.module().topology().element_shape(element) {
            Some(shape) => shape,
            None => {
                debug!("Skipping {}: not in the mesh", element);
                return Ok(None);
            }
        };
        let dimension = shape.dimension();
        if dimension > self.targets.len() {
            debug!(
                "Skipping {}: dimension {} exceeds {} values",
                element,
                dimension,
                self.targets.len()
            );
            return Ok(None);
        }
        self.statistics.elements_tried += 1;

        let mut xi = match data_xi {
            Some(data_xi) if self.settings.start_with_data_xi && data_xi.len() == dimension => {
                DVector::from_column_slice(data_xi)
            }
            _ => shape.centroid(),
        };

        match self.iterate(cache, field, element, shape, &mut xi) {
            // Nearest mode compares every element by residual
            Ok(true) if self.settings.find_nearest => {}
            Ok(true) => match self.residual_squared_at(cache, field, element, &xi) {
                Ok(residual_squared) => {
                    return Ok(Some(FoundElementXi {
                        element,
                        xi,
                        residual_squared,
                    }))
                }
                Err(error) if error.is_recoverable() => debug!("Rejecting {}: {}", element, error),
                Err(error) => return Err(error),
            },
            Ok(false) => {}
            Err(error) if error.is_recoverable() => debug!("Rejecting {}: {}", element, error),
            Err(error) => return Err(error),
        }

        if self.settings.find_nearest {
            shape.clamp_xi(xi.as_mut_slice(), T::zero());
            match self.residual_squared_at(cache, field, element, &xi) {
                Ok(residual_squared) => {
                    let improves = self
                        .nearest
                        .as_ref()
                        .map_or(true, |best| residual_squared < best.residual_squared);
                    if improves {
                        self.nearest = Some(FoundElementXi {
                            element,
                            xi,
                            residual_squared,
                        });
                    }
                }
                Err(error) if error.is_recoverable() => {
                    debug!("Cannot measure distance in {}: {}", element, error)
                }
                Err(error) => return Err(error),
            }
        }
        Ok(None)
    }

    /// Runs the iteration in one element. Returns whether it converged.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn iterate(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        element: ElementId,
        shape: ElementShape,
        xi: &mut DVector<T>,
    ) -> Result<bool, FieldError> {
        let tolerance = self.settings.xi_tolerance;
        let overdetermined = self.targets.len() > shape.dimension();
        self.last_xi.clone_from(xi);

        let mut iterations = 0;
        loop {
            self.evaluate_jacobian(cache, field, element, xi)?;
            let mut step = gauss_newton_increment(&self.jacobian, &self.residual, self.settings.singular_tolerance)?;
            if self.settings.find_nearest {
                limit_step_length(&mut step, nearest_step_limit(iterations));
            }
            *xi += &step;
            iterations += 1;
            self.statistics.iterations += 1;

            if is_step_within_tolerance(&step, tolerance) {
                if overdetermined && !residual_explained_by_step(&self.jacobian, self.residual.as_slice(), &step, 2.0)
                {
                    debug!("Rejecting {}: residual is not explained by the last step", element);
                    return Ok(false);
                }
                trace!("Converged in {} after {} iterations", element, iterations);
                return Ok(true);
            }

            shape.clamp_xi(xi.as_mut_slice(), tolerance);
            if iterations >= self.settings.max_iterations {
                debug!("Giving up on {} after {} iterations", element, iterations);
                return Ok(false);
            }
            if iterations > 1
                && xi
                    .iter()
                    .zip(self.last_xi.iter())
                    .all(|(&xi_i, &last_i)| (xi_i - last_i).abs() <= tolerance)
            {
                // Usually means the solution lies outside this element
                debug!("Giving up on {}: xi stopped changing at {:?}", element, xi.as_slice());
                return Ok(false);
            }
            self.last_xi.copy_from(xi);
        }
    }

    /// Evaluates the residual `target - f(xi)` and the Jacobian of `f` at `xi`.
    fn evaluate_jacobian(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        element: ElementId,
        xi: &DVector<T>,
    ) -> Result<(), FieldError> {
        cache.set_element_xi(element, xi.as_slice())?;
        let value_cache = cache.evaluate_at_order(field, 1)?;
        let derivatives = value_cache
            .derivatives()
            .ok_or_else(|| FieldError::MissingDerivatives(field.name()))?;

        let (rows, cols) = (self.targets.len(), xi.len());
        if self.jacobian.shape() != (rows, cols) {
            self.jacobian = DMatrix::zeros(rows, cols);
        }
        if self.residual.len() != rows {
            self.residual = DVector::zeros(rows);
        }
        for k in 0..rows {
            self.residual[k] = self.targets[k] - value_cache.values()[k];
            for i in 0..cols {
                self.jacobian[(k, i)] = derivatives[k * cols + i];
            }
        }
        Ok(())
    }

    fn residual_squared_at(
        &mut self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        element: ElementId,
        xi: &DVector<T>,
    ) -> Result<T, FieldError> {
        cache.set_element_xi(element, xi.as_slice())?;
        let values = cache.evaluate_at_order(field, 0)?.values();
        Ok(self
            .targets
            .iter()
            .zip(values)
            .fold(T::zero(), |sum, (&target, &value)| sum + (target - value) * (target - value)))
    }
}

/// Largest xi step taken by a nearest search in the given iteration, counted from zero.
///
/// Short steps keep the iteration from leaving the element when the target lies outside it.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn nearest_step_limit<T: Real>(iteration: usize) -> T {
    if iteration >= 20 {
        0.05
    } else if iteration >= 5 {
        0.1
    } else {
        0.2
    }
}

/// One-off search with default settings.
pub fn find_element_xi<T: Real>(
    cache: &mut FieldCache<T>,
    field: &Field<T>,
    targets: &[T],
    domain: &dyn ElementSet,
    find_nearest: bool,
) -> Result<Option<FoundElementXi<T>>, FieldError> {
    let settings = FindElementXiSettings {
        find_nearest,
        ..FindElementXiSettings::default()
    };
    ElementXiFinder::new(settings).find(cache, field, targets, domain)
}

/// An [`ElementXiFinder`] shared between owners.
///
/// A search holds the finder for its whole duration. Other owners are refused instead of
/// waiting, and the finder cannot be taken apart while another handle exists.
#[derive(Debug, Clone)]
pub struct SharedElementXiFinder<T: Real> {
    inner: Arc<Mutex<ElementXiFinder<T>>>,
}

impl<T: Real> SharedElementXiFinder<T> {
    pub fn new(finder: ElementXiFinder<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(finder)),
        }
    }

    pub fn try_find(
        &self,
        cache: &mut FieldCache<T>,
        field: &Field<T>,
        targets: &[T],
        domain: &dyn ElementSet,
    ) -> Result<Option<FoundElementXi<T>>, FieldError> {
        let mut finder = self
            .inner
            .try_lock()
            .ok_or(FieldError::ResourceBusy("element xi finder"))?;
        finder.find(cache, field, targets, domain)
    }

    /// Exclusive access, waiting for a search in progress to finish.
    pub fn lock(&self) -> MutexGuard<'_, ElementXiFinder<T>> {
        self.inner.lock()
    }

    /// Recovers the finder if this is the only handle.
    pub fn try_destroy(self) -> Result<ElementXiFinder<T>, FieldError> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|_| FieldError::ResourceBusy("element xi finder"))
    }
}
