//! Per-location memoization of field values.
//!
//! A [`FieldCache`] holds one [`FieldValueCache`] slot per field of its module. Slots are
//! invalidated lazily: every location change bumps a counter, and a slot is current only
//! while its recorded counter matches. Structural changes to fields are picked up from
//! the module's modification counter on the next evaluation.
use crate::error::FieldError;
use crate::field::{Field, FieldEvaluation, FieldValueType, LocationContext};
use crate::location::MeshLocation;
use crate::module::FieldModule;
use crate::topology::{ElementId, NodeId};
use crate::workspace::Workspace;
use crate::Real;
use log::trace;
use nalgebra::DMatrix;
use std::mem;

/// Highest parametric derivative order any field computes.
pub const MAX_DERIVATIVE_ORDER: usize = 1;

/// The value of one field at the location of its owning [`FieldCache`].
#[derive(Debug)]
pub struct FieldValueCache<T: Real> {
    values: Vec<T>,
    /// Row-major `num_components x derivative_dimension`.
    derivatives: Vec<T>,
    derivative_dimension: usize,
    derivatives_valid: bool,
    mesh_location: Option<MeshLocation<T>>,
    valid: bool,
    evaluation_counter: u64,
    derivative_order: usize,
    modification_stamp: u64,
    workspace: Workspace,
}

impl<T: Real> Default for FieldValueCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> FieldValueCache<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            derivatives: Vec::new(),
            derivative_dimension: 0,
            derivatives_valid: false,
            mesh_location: None,
            valid: false,
            evaluation_counter: 0,
            derivative_order: 0,
            modification_stamp: 0,
            workspace: Workspace::default(),
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Parametric derivatives, `derivatives[k * dimension + i] = d value_k / d xi_i`.
    pub fn derivatives(&self) -> Option<&[T]> {
        self.derivatives_valid.then_some(self.derivatives.as_slice())
    }

    /// Derivative storage for the current location, sized when derivatives were requested.
    pub fn derivatives_mut(&mut self) -> &mut [T] {
        &mut self.derivatives
    }

    pub fn derivatives_valid(&self) -> bool {
        self.derivatives_valid
    }

    pub fn set_derivatives_valid(&mut self, valid: bool) {
        self.derivatives_valid = valid && self.derivatives.len() == self.values.len() * self.derivative_dimension;
    }

    pub fn derivative_dimension(&self) -> usize {
        self.derivative_dimension
    }

    /// Derivatives as a `num_components x dimension` matrix.
    pub fn derivative_matrix(&self) -> Option<DMatrix<T>> {
        self.derivatives()
            .map(|d| DMatrix::from_row_slice(self.values.len(), self.derivative_dimension, d))
    }

    pub fn mesh_location(&self) -> Option<&MeshLocation<T>> {
        self.mesh_location.as_ref()
    }

    pub fn set_mesh_location(&mut self, location: Option<MeshLocation<T>>) {
        self.mesh_location = location;
    }

    /// Whether the slot holds a successfully computed value.
    ///
    /// This does not imply the value belongs to the current location of the owning cache.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    /// Values, derivative storage and workspace borrowed together.
    pub(crate) fn parts_mut(&mut self) -> (&mut [T], &mut [T], &mut Workspace) {
        (&mut self.values, &mut self.derivatives, &mut self.workspace)
    }

    fn is_current(&self, evaluation_counter: u64, order: usize) -> bool {
        self.valid && self.evaluation_counter == evaluation_counter && self.derivative_order >= order
    }

    fn prepare(&mut self, num_components: usize, dimension: usize, order: usize) {
        self.values.clear();
        self.values.resize(num_components, T::zero());
        self.derivatives.clear();
        if order > 0 {
            self.derivatives.resize(num_components * dimension, T::zero());
        }
        self.derivative_dimension = dimension;
        self.derivatives_valid = false;
        self.mesh_location = None;
    }

    fn finish(&mut self, success: bool, evaluation_counter: u64, order: usize, modification_stamp: u64) {
        self.valid = success;
        self.evaluation_counter = evaluation_counter;
        self.derivative_order = order;
        self.modification_stamp = modification_stamp;
        if !success {
            self.derivatives_valid = false;
            self.mesh_location = None;
        }
    }
}

#[derive(Debug)]
enum Slot<T: Real> {
    Empty,
    Evaluating,
    Ready(Box<FieldValueCache<T>>),
}

/// Evaluation context binding fields of one module to a location and time.
#[derive(Debug)]
pub struct FieldCache<T: Real> {
    module: FieldModule<T>,
    location: Option<MeshLocation<T>>,
    time: T,
    requested_derivative_order: usize,
    location_counter: u64,
    seen_modifications: u64,
    slots: Vec<Slot<T>>,
    evaluation_count: usize,
}

impl<T: Real> FieldCache<T> {
    pub fn new(module: &FieldModule<T>) -> Self {
        Self {
            module: module.clone(),
            location: None,
            time: T::zero(),
            requested_derivative_order: 0,
            location_counter: 0,
            seen_modifications: module.modification_counter(),
            slots: Vec::new(),
            evaluation_count: 0,
        }
    }

    pub fn module(&self) -> &FieldModule<T> {
        &self.module
    }

    pub fn location(&self) -> Option<&MeshLocation<T>> {
        self.location.as_ref()
    }

    pub fn time(&self) -> T {
        self.time
    }

    /// Replaces location and time, invalidating every slot.
    pub fn set_location(&mut self, location: MeshLocation<T>, time: T) -> Result<(), FieldError> {
        self.validate_location(&location)?;
        self.location = Some(location);
        self.time = time;
        self.invalidate();
        Ok(())
    }

    pub fn set_mesh_location(&mut self, location: MeshLocation<T>) -> Result<(), FieldError> {
        let time = self.time;
        self.set_location(location, time)
    }

    pub fn set_node(&mut self, node: NodeId) -> Result<(), FieldError> {
        self.set_mesh_location(MeshLocation::Node(node))
    }

    /// Moves to `xi` in `element`, reusing the current xi storage where possible.
    pub fn set_element_xi(&mut self, element: ElementId, xi: &[T]) -> Result<(), FieldError> {
        self.validate_element_xi(element, xi.len())?;
        match &mut self.location {
            Some(MeshLocation::ElementXi {
                element: current_element,
                xi: current_xi,
            }) if current_xi.len() == xi.len() => {
                *current_element = element;
                current_xi.copy_from_slice(xi);
            }
            location => *location = Some(MeshLocation::from_slice(element, xi)),
        }
        self.invalidate();
        Ok(())
    }

    pub fn set_time(&mut self, time: T) {
        if time != self.time {
            self.time = time;
            self.invalidate();
        }
    }

    pub fn clear_location(&mut self) {
        self.location = None;
        self.invalidate();
    }

    /// Maximum parametric derivative order computed by [`evaluate`](Self::evaluate).
    pub fn requested_derivatives(&self) -> usize {
        self.requested_derivative_order
    }

    pub fn set_requested_derivatives(&mut self, order: usize) -> Result<(), FieldError> {
        if order > MAX_DERIVATIVE_ORDER {
            return Err(FieldError::InvalidArgument(format!(
                "derivative order {} exceeds supported maximum {}",
                order, MAX_DERIVATIVE_ORDER
            )));
        }
        self.requested_derivative_order = order;
        Ok(())
    }

    /// Number of type-specific evaluation routines run through this cache.
    pub fn evaluation_count(&self) -> usize {
        self.evaluation_count
    }

    /// Evaluates `field` at the current location up to the requested derivative order.
    pub fn evaluate(&mut self, field: &Field<T>) -> Result<&FieldValueCache<T>, FieldError> {
        let order = self.requested_derivative_order;
        self.evaluate_at_order(field, order)
    }

    pub fn evaluate_at_order(&mut self, field: &Field<T>, order: usize) -> Result<&FieldValueCache<T>, FieldError> {
        self.check_module(field)?;
        if order > MAX_DERIVATIVE_ORDER {
            return Err(FieldError::InvalidArgument(format!(
                "derivative order {} exceeds supported maximum {}",
                order, MAX_DERIVATIVE_ORDER
            )));
        }
        self.sync_modifications();
        self.ensure_evaluated(field, order)?;
        self.value_cache(field)
            .ok_or_else(|| FieldError::undefined(&field.name(), "value was not stored"))
    }

    pub fn evaluate_real(&mut self, field: &Field<T>) -> Result<Vec<T>, FieldError> {
        check_real_valued(field)?;
        Ok(self.evaluate(field)?.values().to_vec())
    }

    /// Values and the `num_components x dimension` parametric derivative matrix.
    pub fn evaluate_with_derivatives(&mut self, field: &Field<T>) -> Result<(Vec<T>, DMatrix<T>), FieldError> {
        check_real_valued(field)?;
        let value_cache = self.evaluate_at_order(field, 1)?;
        let derivatives = value_cache
            .derivative_matrix()
            .ok_or_else(|| FieldError::MissingDerivatives(field.name()))?;
        Ok((value_cache.values().to_vec(), derivatives))
    }

    pub fn evaluate_mesh_location(&mut self, field: &Field<T>) -> Result<MeshLocation<T>, FieldError> {
        if field.value_type() != FieldValueType::MeshLocation {
            return Err(FieldError::WrongFieldType {
                field: field.name(),
                expected: "mesh location valued",
            });
        }
        self.evaluate_at_order(field, 0)?
            .mesh_location()
            .cloned()
            .ok_or_else(|| FieldError::undefined(&field.name(), "no mesh location"))
    }

    /// The slot of `field` if it holds a value for the current location.
    ///
    /// Slots of fields changed since their last evaluation are not returned, even when this
    /// cache has not yet seen the change.
    pub fn value_cache(&self, field: &Field<T>) -> Option<&FieldValueCache<T>> {
        match self.slots.get(field.cache_index()) {
            Some(Slot::Ready(value_cache)) if value_cache.evaluation_counter == self.location_counter => {
                let unchanged = self.module.modification_counter() == self.seen_modifications
                    || field.latest_change() <= value_cache.modification_stamp;
                (value_cache.valid && unchanged).then_some(&**value_cache)
            }
            _ => None,
        }
    }

    /// Drops the slot of `field` together with any extension state it carries.
    ///
    /// Returns `true` if there was a slot to drop.
    pub fn clear_value_cache(&mut self, field: &Field<T>) -> bool {
        match self.slots.get_mut(field.cache_index()) {
            Some(slot) if matches!(slot, Slot::Ready(_)) => {
                *slot = Slot::Empty;
                true
            }
            _ => false,
        }
    }

    /// Cheap check whether `field` and its sources can be evaluated at the current location.
    pub fn is_field_defined(&self, field: &Field<T>) -> bool {
        match &self.location {
            Some(location) => {
                let context = LocationContext::new(location, self.module.topology());
                field.is_defined_at(&context)
            }
            None => false,
        }
    }

    fn invalidate(&mut self) {
        self.location_counter = self.location_counter.wrapping_add(1);
    }

    fn check_module(&self, field: &Field<T>) -> Result<(), FieldError> {
        if field.module_id() == self.module.id() {
            Ok(())
        } else {
            Err(FieldError::WrongModule(field.name()))
        }
    }

    fn validate_element_xi(&self, element: ElementId, xi_len: usize) -> Result<(), FieldError> {
        match self.module.topology().element_dimension(element) {
            None => Err(FieldError::InvalidArgument(format!("unknown {}", element))),
            Some(dimension) if dimension != xi_len => Err(FieldError::InvalidArgument(format!(
                "{} has dimension {} but xi has {} entries",
                element, dimension, xi_len
            ))),
            Some(_) => Ok(()),
        }
    }

    fn validate_location(&self, location: &MeshLocation<T>) -> Result<(), FieldError> {
        match location {
            MeshLocation::Node(node) if !self.module.topology().contains_node(*node) => {
                Err(FieldError::InvalidArgument(format!("unknown {}", node)))
            }
            MeshLocation::Node(_) => Ok(()),
            MeshLocation::ElementXi { element, xi } => self.validate_element_xi(*element, xi.len()),
        }
    }

    /// Invalidates slots of fields changed since they were computed.
    fn sync_modifications(&mut self) {
        let current = self.module.modification_counter();
        if current == self.seen_modifications {
            return;
        }
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Ready(value_cache) = slot {
                match self.module.field_at(index) {
                    Some(field) => {
                        if field.latest_change() > value_cache.modification_stamp {
                            trace!("Invalidating cached value of field `{}`", field.name());
                            value_cache.valid = false;
                        }
                    }
                    None => *slot = Slot::Empty,
                }
            }
        }
        self.seen_modifications = current;
    }

    fn ensure_evaluated(&mut self, field: &Field<T>, order: usize) -> Result<(), FieldError> {
        let index = field.cache_index();
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || Slot::Empty);
        }
        match &self.slots[index] {
            Slot::Evaluating => return Err(FieldError::CyclicEvaluation(field.name())),
            Slot::Ready(value_cache) if value_cache.is_current(self.location_counter, order) => {
                trace!("Cache hit for field `{}`", field.name());
                return Ok(());
            }
            _ => {}
        }

        let mut value_cache = match mem::replace(&mut self.slots[index], Slot::Evaluating) {
            Slot::Ready(value_cache) => value_cache,
            _ => Box::new(FieldValueCache::new()),
        };
        let result = self.compute(field, order, &mut value_cache);
        value_cache.finish(result.is_ok(), self.location_counter, order, self.seen_modifications);
        self.slots[index] = Slot::Ready(value_cache);
        result
    }

    fn compute(&mut self, field: &Field<T>, order: usize, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        trace!("Evaluating field `{}`", field.name());
        let core = field.read_core();
        {
            let location = self.current_location(field)?;
            let context = LocationContext::new(location, self.module.topology());
            if !core.is_defined_at(&context) {
                return Err(FieldError::undefined(
                    &field.name(),
                    format!("{} field is not defined at {:?}", core.type_name(), location),
                ));
            }
        }

        let source_order = core.source_derivative_order(order);
        for (i, source) in field.sources().iter().enumerate() {
            if core.evaluates_source_at_location(i) {
                self.ensure_evaluated(source, source_order)?;
            }
        }

        self.evaluation_count += 1;
        let location = self.current_location(field)?;
        let dimension = location.xi().map_or(0, |xi| xi.len());
        output.prepare(field.num_components(), dimension, order);
        let evaluation = FieldEvaluation::new(self, field, location, order);
        core.evaluate(&evaluation, output)
    }

    fn current_location(&self, field: &Field<T>) -> Result<&MeshLocation<T>, FieldError> {
        self.location
            .as_ref()
            .ok_or_else(|| FieldError::undefined(&field.name(), "no location set"))
    }
}

fn check_real_valued<T: Real>(field: &Field<T>) -> Result<(), FieldError> {
    if field.value_type() == FieldValueType::Real {
        Ok(())
    } else {
        Err(FieldError::NotRealValued(field.name()))
    }
}
