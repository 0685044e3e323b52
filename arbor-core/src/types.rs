/// Identifier for a branch in a [`crate::tree::Tree`].
///
/// This is an index into `Tree::branches`, and is only meaningful within
/// the lifetime of a given `Tree` instance (a reset invalidates it).
pub type BranchId = usize;

/// Identifier for a mesh node inside one mesh generation pass.
///
/// Mesh nodes live in an arena that is rebuilt on every call to
/// [`crate::mesh::generate`]; ids never outlive that call.
pub type MeshNodeId = usize;

/// Packed integer id of a cell in a [`crate::grid::OccupancyGrid`].
pub type CellId = i64;
