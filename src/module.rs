//! The field registry of one mesh.
use crate::cache::FieldCache;
use crate::error::FieldError;
use crate::field::{Field, FieldCore};
use crate::topology::MeshTopology;
use crate::Real;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_MODULE_ID: AtomicU64 = AtomicU64::new(1);

pub type ObserverId = u64;

type Observer<T> = Arc<dyn Fn(&FieldChange<T>) + Send + Sync>;

/// Sent to change observers after the definition of a field changed.
#[derive(Debug, Clone)]
pub struct FieldChange<T: Real> {
    pub field: Field<T>,
    /// Registered fields depending directly or indirectly on `field`.
    pub dependents: Vec<Field<T>>,
    /// Module modification counter after the change.
    pub modification: u64,
}

impl<T: Real> FieldChange<T> {
    /// Whether `field` is the changed field or one of its dependents.
    pub fn affects(&self, field: &Field<T>) -> bool {
        self.field.ptr_eq(field) || self.dependents.iter().any(|dependent| dependent.ptr_eq(field))
    }
}

struct Registry<T: Real> {
    /// Indexed by cache index. Removed fields leave a hole so indices stay stable.
    fields: Vec<Option<Field<T>>>,
    by_name: FxHashMap<String, usize>,
    next_auto_name: usize,
}

impl<T: Real> Registry<T> {
    fn auto_name(&mut self) -> String {
        loop {
            self.next_auto_name += 1;
            let name = format!("temp{}", self.next_auto_name);
            if !self.by_name.contains_key(&name) {
                return name;
            }
        }
    }

    fn live(&self) -> impl Iterator<Item = &Field<T>> {
        self.fields.iter().flatten()
    }
}

pub(crate) struct ModuleShared<T: Real> {
    id: u64,
    topology: Arc<dyn MeshTopology>,
    registry: RwLock<Registry<T>>,
    modification_counter: AtomicU64,
    observers: Mutex<Vec<(ObserverId, Observer<T>)>>,
    next_observer_id: AtomicU64,
}

/// Owns the fields defined on one mesh and tracks changes to their definitions.
///
/// Cloning a module yields another handle to the same registry.
#[derive(Clone)]
pub struct FieldModule<T: Real> {
    shared: Arc<ModuleShared<T>>,
}

impl<T: Real> FieldModule<T> {
    pub fn new(topology: Arc<dyn MeshTopology>) -> Self {
        Self {
            shared: Arc::new(ModuleShared {
                id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
                topology,
                registry: RwLock::new(Registry {
                    fields: Vec::new(),
                    by_name: FxHashMap::default(),
                    next_auto_name: 0,
                }),
                modification_counter: AtomicU64::new(0),
                observers: Mutex::new(Vec::new()),
                next_observer_id: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ModuleShared<T>>) -> Self {
        Self { shared }
    }

    pub(crate) fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn topology(&self) -> &dyn MeshTopology {
        &*self.shared.topology
    }

    pub fn create_field_cache(&self) -> FieldCache<T> {
        FieldCache::new(self)
    }

    /// Number of changes to field definitions or the registry so far.
    pub fn modification_counter(&self) -> u64 {
        self.shared.modification_counter.load(Ordering::Acquire)
    }

    /// Registers a field with an automatically chosen name.
    ///
    /// Sources must belong to this module and are fixed for the lifetime of the field.
    pub fn create_field(
        &self,
        num_components: usize,
        sources: Vec<Field<T>>,
        core: Box<dyn FieldCore<T>>,
    ) -> Result<Field<T>, FieldError> {
        if let Some(foreign) = sources.iter().find(|source| source.module_id() != self.id()) {
            return Err(FieldError::WrongModule(foreign.name()));
        }
        if num_components == 0 {
            return Err(FieldError::InvalidArgument(format!(
                "{} field needs at least one component",
                core.type_name()
            )));
        }

        let mut registry = self.shared.registry.write();
        let name = registry.auto_name();
        let cache_index = registry.fields.len();
        let type_name = core.type_name();
        let field = Field::new(
            name.clone(),
            cache_index,
            num_components,
            sources,
            core,
            Arc::downgrade(&self.shared),
            self.id(),
        );
        registry.by_name.insert(name, cache_index);
        registry.fields.push(Some(field.clone()));
        debug!(
            "Created {} field `{}` with {} components",
            type_name,
            field.name(),
            num_components
        );
        Ok(field)
    }

    pub(crate) fn rename_field(&self, field: &Field<T>, name: &str) -> Result<(), FieldError> {
        self.check_registered(field)?;
        let mut registry = self.shared.registry.write();
        match registry.by_name.get(name) {
            Some(&index) if index == field.cache_index() => return Ok(()),
            Some(_) => {
                return Err(FieldError::InvalidArgument(format!(
                    "a field named `{}` already exists",
                    name
                )))
            }
            None => {}
        }
        let old_name = field.replace_name(name.to_string());
        registry.by_name.remove(&old_name);
        registry.by_name.insert(name.to_string(), field.cache_index());
        Ok(())
    }

    pub fn field_by_name(&self, name: &str) -> Option<Field<T>> {
        let registry = self.shared.registry.read();
        registry
            .by_name
            .get(name)
            .and_then(|&index| registry.fields[index].clone())
    }

    pub(crate) fn field_at(&self, cache_index: usize) -> Option<Field<T>> {
        self.shared
            .registry
            .read()
            .fields
            .get(cache_index)
            .cloned()
            .flatten()
    }

    /// All registered fields in creation order.
    pub fn fields(&self) -> Vec<Field<T>> {
        self.shared.registry.read().live().cloned().collect()
    }

    pub fn num_fields(&self) -> usize {
        self.shared.registry.read().live().count()
    }

    /// Unregisters a field no other registered field depends on.
    ///
    /// Existing handles stay usable, but the field can no longer be found by name.
    pub fn remove_field(&self, field: &Field<T>) -> Result<(), FieldError> {
        self.check_registered(field)?;
        {
            let mut registry = self.shared.registry.write();
            if let Some(dependent) = registry
                .live()
                .find(|candidate| candidate.sources().iter().any(|source| source.ptr_eq(field)))
            {
                return Err(FieldError::InvalidArgument(format!(
                    "field `{}` is a source of `{}`",
                    field.name(),
                    dependent.name()
                )));
            }
            registry.by_name.remove(&field.name());
            registry.fields[field.cache_index()] = None;
        }
        self.shared.modification_counter.fetch_add(1, Ordering::AcqRel);
        debug!("Removed field `{}`", field.name());
        Ok(())
    }

    /// A registered field other than `field` with the same definition, if any.
    pub fn find_equivalent(&self, field: &Field<T>) -> Option<Field<T>> {
        self.shared
            .registry
            .read()
            .live()
            .find(|candidate| !candidate.ptr_eq(field) && candidate.same_definition(field))
            .cloned()
    }

    /// Registered fields depending directly or indirectly on `field`.
    pub fn dependents_of(&self, field: &Field<T>) -> Vec<Field<T>> {
        self.shared
            .registry
            .read()
            .live()
            .filter(|candidate| candidate.depends_on(field))
            .cloned()
            .collect()
    }

    pub fn add_change_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&FieldChange<T>) + Send + Sync + 'static,
    {
        let id = self.shared.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.shared.observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn remove_change_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.shared.observers.lock();
        let len_before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != len_before
    }

    pub(crate) fn notify_changed(&self, field: &Field<T>) {
        let modification = self
            .shared
            .modification_counter
            .fetch_add(1, Ordering::AcqRel)
            + 1;
        field.mark_changed(modification);
        trace!("Field `{}` changed, modification {}", field.name(), modification);

        // Observers may register or remove observers, so call them without the lock
        let observers: Vec<Observer<T>> = self
            .shared
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        if observers.is_empty() {
            return;
        }
        let change = FieldChange {
            field: field.clone(),
            dependents: self.dependents_of(field),
            modification,
        };
        for observer in observers {
            observer(&change);
        }
    }

    fn check_registered(&self, field: &Field<T>) -> Result<(), FieldError> {
        let registered = field.module_id() == self.id()
            && self
                .field_at(field.cache_index())
                .map_or(false, |registered| registered.ptr_eq(field));
        if registered {
            Ok(())
        } else {
            Err(FieldError::WrongModule(field.name()))
        }
    }

    pub fn ptr_eq(&self, other: &FieldModule<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T: Real> fmt::Debug for FieldModule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldModule")
            .field("id", &self.id())
            .field("num_fields", &self.num_fields())
            .field("modification_counter", &self.modification_counter())
            .finish()
    }
}
