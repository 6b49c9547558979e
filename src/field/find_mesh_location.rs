use crate::cache::{FieldCache, FieldValueCache};
use crate::error::FieldError;
use crate::field::{Field, FieldCore, FieldEvaluation, FieldValueType};
use crate::find_xi::{ElementXiFinder, FindElementXiSettings};
use crate::location::MeshLocation;
use crate::module::FieldModule;
use crate::topology::ElementSet;
use crate::Real;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchMode {
    /// Only locations where the mesh field equals the source values.
    #[default]
    Exact,
    /// The location minimizing the distance to the source values.
    Nearest,
}

/// Mesh location at which a mesh field takes the values of a source field.
///
/// Sources are the field supplying target values and the mesh field searched. The search
/// runs in a field cache of its own, kept with the finder in this field's value cache so
/// that consecutive evaluations reuse the last element found.
#[derive(Clone)]
pub struct FindMeshLocationField<T: Real> {
    domain: Arc<dyn ElementSet>,
    mode: SearchMode,
    settings: FindElementXiSettings<T>,
}

struct SearchState<T: Real> {
    cache: FieldCache<T>,
    finder: ElementXiFinder<T>,
    targets: Vec<T>,
}

impl<T: Real> FindMeshLocationField<T> {
    pub fn search_mode(&self) -> SearchMode {
        self.mode
    }

    pub fn set_search_mode(&mut self, mode: SearchMode) {
        self.mode = mode;
    }

    pub fn settings(&self) -> &FindElementXiSettings<T> {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: FindElementXiSettings<T>) -> Result<(), FieldError> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn domain(&self) -> &Arc<dyn ElementSet> {
        &self.domain
    }

    /// Settings used by the finder, with the nearest flag following the search mode.
    fn finder_settings(&self) -> FindElementXiSettings<T> {
        FindElementXiSettings {
            find_nearest: self.mode == SearchMode::Nearest,
            ..self.settings.clone()
        }
    }
}

impl<T: Real> fmt::Debug for FindMeshLocationField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindMeshLocationField")
            .field("domain_id", &self.domain.domain_id())
            .field("mode", &self.mode)
            .field("settings", &self.settings)
            .finish()
    }
}

impl<T: Real> FieldCore<T> for FindMeshLocationField<T> {
    fn type_name(&self) -> &'static str {
        "find_mesh_location"
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::MeshLocation
    }

    fn source_derivative_order(&self, _order: usize) -> usize {
        0
    }

    fn evaluates_source_at_location(&self, index: usize) -> bool {
        // The mesh field is evaluated at trial locations in the search cache
        index == 0
    }

    fn evaluate(&self, evaluation: &FieldEvaluation<'_, T>, output: &mut FieldValueCache<T>) -> Result<(), FieldError> {
        let source = evaluation.source(0)?;
        let mesh_field = evaluation.source_field(1)?;
        let module = evaluation.module();

        let state = output.workspace_mut().get_or_insert_with(|| SearchState {
            cache: module.create_field_cache(),
            finder: ElementXiFinder::default(),
            targets: Vec::new(),
        });
        state.targets.clear();
        state.targets.extend_from_slice(source.values());
        state.finder.set_settings(self.finder_settings());
        state.cache.set_time(evaluation.time());
        let found = state
            .finder
            .find(&mut state.cache, mesh_field, &state.targets, &*self.domain)?;

        match found {
            Some(found) => {
                output.set_mesh_location(Some(MeshLocation::element_xi(found.element, found.xi)));
                Ok(())
            }
            None => Err(evaluation.undefined("no mesh location matches the source values")),
        }
    }

    fn clone_core(&self) -> Box<dyn FieldCore<T>> {
        Box::new(self.clone())
    }

    fn compare(&self, other: &dyn FieldCore<T>) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .map_or(false, |other| {
                Arc::ptr_eq(&self.domain, &other.domain) && self.mode == other.mode && self.settings == other.settings
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Real> FieldModule<T> {
    /// Field finding where `mesh_field` takes the values of `source` within `domain`.
    pub fn create_find_mesh_location(
        &self,
        source: &Field<T>,
        mesh_field: &Field<T>,
        domain: Arc<dyn ElementSet>,
    ) -> Result<Field<T>, FieldError> {
        for field in [source, mesh_field] {
            if field.value_type() != FieldValueType::Real {
                return Err(FieldError::NotRealValued(field.name()));
            }
        }
        if source.num_components() != mesh_field.num_components() {
            return Err(FieldError::ValueCountMismatch {
                field: mesh_field.name(),
                expected: mesh_field.num_components(),
                actual: source.num_components(),
            });
        }
        if domain.dimension() > mesh_field.num_components() {
            return Err(FieldError::Underdetermined {
                dimension: domain.dimension(),
                values: mesh_field.num_components(),
            });
        }
        let core = FindMeshLocationField {
            domain,
            mode: SearchMode::Exact,
            settings: FindElementXiSettings::default(),
        };
        self.create_field(1, vec![source.clone(), mesh_field.clone()], Box::new(core))
    }
}
