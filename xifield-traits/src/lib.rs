use nalgebra::RealField;

pub use nalgebra;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

pub mod topology;

pub use topology::{next_domain_id, ElementId, ElementSet, ElementShape, MeshTopology, NodeId};
