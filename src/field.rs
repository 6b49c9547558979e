//! Fields as nodes of a dependency graph.
//!
//! A [`Field`] is a shared handle. Its sources are fixed when it is created, while its
//! type-specific definition lives behind a lock in a boxed [`FieldCore`] and can only be
//! changed through [`Field::update_core`], which notifies the owning module.
use crate::cache::{FieldCache, FieldValueCache};
use crate::error::FieldError;
use crate::location::MeshLocation;
use crate::module::{FieldModule, ModuleShared};
use crate::topology::{ElementId, ElementShape, MeshTopology};
use crate::Real;
use log::debug;
use nalgebra::DVector;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub mod arithmetic;
pub mod constant;
pub mod curve_lookup;
pub mod embedded;
pub mod find_mesh_location;
pub mod finite_element;
pub mod strain;
pub mod xi;

pub use arithmetic::{AddField, ComponentField, ScaleField};
pub use constant::ConstantField;
pub use curve_lookup::CurveLookupField;
pub use embedded::EmbeddedField;
pub use find_mesh_location::{FindMeshLocationField, SearchMode};
pub use finite_element::FiniteElementField;
pub use strain::Strain2dField;
pub use xi::XiField;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValueType {
    Real,
    MeshLocation,
}

/// A location together with the topology it refers to.
#[derive(Clone, Copy)]
pub struct LocationContext<'a, T: Real> {
    location: &'a MeshLocation<T>,
    topology: &'a dyn MeshTopology,
}

impl<'a, T: Real> LocationContext<'a, T> {
    pub fn new(location: &'a MeshLocation<T>, topology: &'a dyn MeshTopology) -> Self {
        Self { location, topology }
    }

    pub fn location(&self) -> &'a MeshLocation<T> {
        self.location
    }

    pub fn topology(&self) -> &'a dyn MeshTopology {
        self.topology
    }

    pub fn element_shape(&self) -> Option<ElementShape> {
        self.location
            .element()
            .and_then(|element| self.topology.element_shape(element))
    }

    pub fn element_dimension(&self) -> Option<usize> {
        self.element_shape().map(|shape| shape.dimension())
    }
}

/// Everything a field needs while computing its value at one location.
///
/// Sources that the field evaluates at the location have already been evaluated
/// through the same cache when [`FieldCore::evaluate`] is called.
pub struct FieldEvaluation<'a, T: Real> {
    cache: &'a FieldCache<T>,
    field: &'a Field<T>,
    location: &'a MeshLocation<T>,
    derivative_order: usize,
}

impl<'a, T: Real> FieldEvaluation<'a, T> {
    pub(crate) fn new(
        cache: &'a FieldCache<T>,
        field: &'a Field<T>,
        location: &'a MeshLocation<T>,
        derivative_order: usize,
    ) -> Self {
        Self {
            cache,
            field,
            location,
            derivative_order,
        }
    }

    pub fn field(&self) -> &'a Field<T> {
        self.field
    }

    pub fn location(&self) -> &'a MeshLocation<T> {
        self.location
    }

    pub fn time(&self) -> T {
        self.cache.time()
    }

    pub fn derivative_order(&self) -> usize {
        self.derivative_order
    }

    /// Whether parametric derivatives should be computed at this location.
    pub fn wants_derivatives(&self) -> bool {
        self.derivative_order > 0 && self.location.is_element_xi()
    }

    pub fn module(&self) -> &'a FieldModule<T> {
        self.cache.module()
    }

    pub fn topology(&self) -> &'a dyn MeshTopology {
        self.cache.module().topology()
    }

    pub fn element_xi(&self) -> Result<(ElementId, &'a DVector<T>), FieldError> {
        match self.location {
            MeshLocation::ElementXi { element, xi } => Ok((*element, xi)),
            MeshLocation::Node(_) => Err(self.undefined("requires an element location")),
        }
    }

    pub fn source_field(&self, index: usize) -> Result<&'a Field<T>, FieldError> {
        self.field
            .sources()
            .get(index)
            .ok_or_else(|| self.undefined(format!("has no source {}", index)))
    }

    /// Value of a source evaluated at this location.
    pub fn source(&self, index: usize) -> Result<&'a FieldValueCache<T>, FieldError> {
        let source = self.source_field(index)?;
        self.cache
            .value_cache(source)
            .ok_or_else(|| self.undefined(format!("source `{}` has no value here", source.name())))
    }

    pub fn undefined(&self, reason: impl Into<String>) -> FieldError {
        FieldError::undefined(&self.field.name(), reason)
    }
}

/// Type-specific definition and evaluation of a field.
pub trait FieldCore<T: Real>: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    fn value_type(&self) -> FieldValueType {
        FieldValueType::Real
    }

    /// Derivative order needed from sources to produce this field's value at `order`.
    fn source_derivative_order(&self, order: usize) -> usize {
        order
    }

    /// Whether source `index` is evaluated at the current location before [`evaluate`](Self::evaluate).
    ///
    /// Sources evaluated elsewhere, e.g. at a location found by a search, return `false`.
    fn evaluates_source_at_location(&self, _index: usize) -> bool {
        true
    }

    /// Cheap local check of whether this field can be evaluated at a location.
    fn is_defined_at(&self, _context: &LocationContext<'_, T>) -> bool {
        true
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError>;

    fn clone_core(&self) -> Box<dyn FieldCore<T>>;

    /// Whether `other` is of the same type with identical parameters.
    fn compare(&self, other: &dyn FieldCore<T>) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub(crate) struct FieldInner<T: Real> {
    name: RwLock<String>,
    cache_index: usize,
    num_components: usize,
    value_type: FieldValueType,
    sources: Vec<Field<T>>,
    core: RwLock<Box<dyn FieldCore<T>>>,
    changed_at: AtomicU64,
    module: Weak<ModuleShared<T>>,
    module_id: u64,
}

/// Shared handle to a field registered in a [`FieldModule`].
#[derive(Clone)]
pub struct Field<T: Real> {
    inner: Arc<FieldInner<T>>,
}

impl<T: Real> Field<T> {
    pub(crate) fn new(
        name: String,
        cache_index: usize,
        num_components: usize,
        sources: Vec<Field<T>>,
        core: Box<dyn FieldCore<T>>,
        module: Weak<ModuleShared<T>>,
        module_id: u64,
    ) -> Self {
        let value_type = core.value_type();
        Self {
            inner: Arc::new(FieldInner {
                name: RwLock::new(name),
                cache_index,
                num_components,
                value_type,
                sources,
                core: RwLock::new(core),
                changed_at: AtomicU64::new(0),
                module,
                module_id,
            }),
        }
    }

    pub fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    /// Renames the field. Names are unique within a module.
    pub fn set_name(&self, name: &str) -> Result<(), FieldError> {
        let module = self.module()?;
        module.rename_field(self, name)
    }

    pub(crate) fn replace_name(&self, name: String) -> String {
        std::mem::replace(&mut *self.inner.name.write(), name)
    }

    /// Index of this field's slot in every [`FieldCache`] of its module.
    pub fn cache_index(&self) -> usize {
        self.inner.cache_index
    }

    pub fn num_components(&self) -> usize {
        self.inner.num_components
    }

    pub fn value_type(&self) -> FieldValueType {
        self.inner.value_type
    }

    pub fn sources(&self) -> &[Field<T>] {
        &self.inner.sources
    }

    pub fn type_name(&self) -> &'static str {
        self.read_core().type_name()
    }

    pub fn module(&self) -> Result<FieldModule<T>, FieldError> {
        self.inner
            .module
            .upgrade()
            .map(FieldModule::from_shared)
            .ok_or_else(|| FieldError::WrongModule(self.name()))
    }

    pub(crate) fn module_id(&self) -> u64 {
        self.inner.module_id
    }

    pub(crate) fn read_core(&self) -> RwLockReadGuard<'_, Box<dyn FieldCore<T>>> {
        self.inner.core.read_recursive()
    }

    /// Reads the definition of a field of concrete type `C`.
    pub fn core_as<C, R, F>(&self, read: F) -> Result<R, FieldError>
    where
        C: FieldCore<T>,
        F: FnOnce(&C) -> R,
    {
        let core = self.read_core();
        let core = core
            .as_any()
            .downcast_ref::<C>()
            .ok_or_else(|| FieldError::WrongFieldType {
                field: self.name(),
                expected: std::any::type_name::<C>(),
            })?;
        Ok(read(core))
    }

    /// Changes the definition of a field of concrete type `C`.
    ///
    /// On success every cached value depending on this field becomes stale and the
    /// module's change observers are told about the field and its dependents.
    pub fn update_core<C, R, F>(&self, update: F) -> Result<R, FieldError>
    where
        C: FieldCore<T>,
        F: FnOnce(&mut C) -> Result<R, FieldError>,
    {
        let result = {
            let mut guard = self.inner.core.write();
            let core = guard
                .as_any_mut()
                .downcast_mut::<C>()
                .ok_or_else(|| FieldError::WrongFieldType {
                    field: self.name(),
                    expected: std::any::type_name::<C>(),
                })?;
            update(core)?
        };
        self.notify_dependency_changed();
        Ok(result)
    }

    /// Records that the definition of this field changed outside of [`update_core`](Self::update_core).
    pub fn notify_dependency_changed(&self) {
        match self.module() {
            Ok(module) => module.notify_changed(self),
            Err(_) => debug!("Field `{}` changed after its module was dropped", self.name()),
        }
    }

    pub(crate) fn mark_changed(&self, stamp: u64) {
        self.inner.changed_at.store(stamp, Ordering::Release);
    }

    /// Latest modification stamp of this field or any field it depends on.
    pub fn latest_change(&self) -> u64 {
        self.sources()
            .iter()
            .fold(self.inner.changed_at.load(Ordering::Acquire), |latest, source| {
                latest.max(source.latest_change())
            })
    }

    /// Whether `other` is a direct or indirect source of this field.
    pub fn depends_on(&self, other: &Field<T>) -> bool {
        self.sources()
            .iter()
            .any(|source| source.ptr_eq(other) || source.depends_on(other))
    }

    /// Local definedness of this field and of every source evaluated at the same location.
    pub fn is_defined_at(&self, context: &LocationContext<'_, T>) -> bool {
        let core = self.read_core();
        core.is_defined_at(context)
            && self
                .sources()
                .iter()
                .enumerate()
                .all(|(i, source)| !core.evaluates_source_at_location(i) || source.is_defined_at(context))
    }

    /// Registers a new field with a copy of this field's definition and the same sources.
    pub fn copy(&self) -> Result<Field<T>, FieldError> {
        let module = self.module()?;
        let core = self.read_core().clone_core();
        module.create_field(self.num_components(), self.sources().to_vec(), core)
    }

    /// Same type, same sources and same parameters.
    pub fn same_definition(&self, other: &Field<T>) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.num_components() == other.num_components()
            && self.sources().len() == other.sources().len()
            && self
                .sources()
                .iter()
                .zip(other.sources())
                .all(|(a, b)| a.ptr_eq(b))
            && {
                let (a, b) = (self.read_core(), other.read_core());
                a.type_name() == b.type_name() && a.compare(&**b)
            }
    }

    pub fn ptr_eq(&self, other: &Field<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Real> PartialEq for Field<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: Real> Eq for Field<T> {}

impl<T: Real> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name())
            .field("type", &self.type_name())
            .field("num_components", &self.num_components())
            .field("cache_index", &self.cache_index())
            .finish()
    }
}
