//! Computed fields on finite element meshes.
//!
//! Fields form a directed acyclic graph of shared nodes. Each field is evaluated through a
//! [`FieldCache`](cache::FieldCache), which holds the location being evaluated and memoizes
//! the value of every field evaluated at that location. The inverse problem, finding the
//! element and xi at which a field takes given values, is solved by the
//! [`ElementXiFinder`](find_xi::ElementXiFinder).
pub mod basis;
pub mod batch;
pub mod cache;
pub mod curve;
pub mod error;
pub mod field;
pub mod find_xi;
pub mod location;
pub mod mesh;
pub mod module;

pub(crate) mod workspace;

pub mod optimize {
    pub use xifield_optimize::*;
}

pub mod topology {
    pub use xifield_traits::topology::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;

pub use xifield_traits::Real;

pub use cache::{FieldCache, FieldValueCache};
pub use error::{FieldError, FieldErrorKind};
pub use field::{Field, FieldCore, FieldValueType};
pub use find_xi::{find_element_xi, ElementXiFinder, FindElementXiSettings, FoundElementXi, SharedElementXiFinder};
pub use location::MeshLocation;
pub use module::FieldModule;
