//! Basic procedural mesh generation routines.
use crate::mesh::Mesh;
use crate::topology::{ElementId, ElementShape, NodeId};
use crate::Real;
use nalgebra::Vector2;
use rustc_hash::FxHashMap;

/// A generated mesh together with the coordinates of its nodes.
#[derive(Debug, Clone)]
pub struct MeshWithCoordinates<T> {
    pub mesh: Mesh,
    pub coordinates: FxHashMap<NodeId, Vec<T>>,
}

/// Generates an axis-aligned rectangular uniform quad mesh given a unit length,
/// dimensions as multipliers of the unit length and the number of cells per unit length.
///
/// Nodes and elements are numbered row by row starting at `bottom_left`, so that xi1
/// follows the x axis and xi2 follows the y axis in every element.
pub fn create_rectangular_uniform_quad_mesh_2d<T>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    bottom_left: &Vector2<T>,
) -> MeshWithCoordinates<T>
where
    T: Real,
{
    let mut mesh = Mesh::new();
    let mut coordinates = FxHashMap::default();
    if cells_per_unit == 0 || units_x == 0 || units_y == 0 {
        return MeshWithCoordinates { mesh, coordinates };
    }

    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;
    let cell_size = unit_length / nalgebra::convert::<f64, T>(cells_per_unit as f64);
    let to_node = |i: usize, j: usize| NodeId((num_cells_x + 1) * j + i);

    for j in 0..=num_cells_y {
        for i in 0..=num_cells_x {
            let offset = Vector2::new(
                nalgebra::convert::<f64, T>(i as f64),
                nalgebra::convert::<f64, T>(j as f64),
            ) * cell_size;
            let x = bottom_left + offset;
            mesh.add_node(to_node(i, j));
            coordinates.insert(to_node(i, j), vec![x.x, x.y]);
        }
    }

    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            let nodes = vec![to_node(i, j), to_node(i + 1, j), to_node(i, j + 1), to_node(i + 1, j + 1)];
            let id = ElementId(num_cells_x * j + i);
            mesh.insert_element_unchecked(id, ElementShape::Square, nodes);
        }
    }

    MeshWithCoordinates { mesh, coordinates }
}

/// Unit square `[0, 1]^2` divided into `cells_per_dim` cells in each direction.
pub fn create_unit_square_uniform_quad_mesh_2d<T: Real>(cells_per_dim: usize) -> MeshWithCoordinates<T> {
    create_rectangular_uniform_quad_mesh_2d(T::one(), 1, 1, cells_per_dim, &Vector2::zeros())
}
