//! Procedural 3-D tree growth, mesh skinning and voxel occupancy.
//!
//! Main components:
//! - [`growth`]: tick-driven growth of a [`tree::Tree`] (subdivision,
//!   budding, apex splits, bud activation).
//! - [`phyllotaxy`]: placement of buds around a node.
//! - [`mesh`]: skins a tree into one seamless triangle mesh.
//! - [`grid`]: voxel occupancy grid and ray rasterization.
//! - [`geometry`]: shared numerical primitives.
//! - [`branch`] / [`tree`]: the branch data model and its arena.
//! - [`config`]: growth parameters and their TOML form.
//! - [`rng`]: seedable random source.
//! - [`types`]: shared type aliases and IDs.
//!
//! A driver typically owns a [`tree::Tree`], a [`grid::OccupancyGrid`] and a
//! generator from [`rng::create_rng`], then once per step calls
//! [`growth::tick`], [`mesh::generate`] and [`tree::Tree::rasterize`].

pub mod branch;
pub mod config;
pub mod geometry;
pub mod grid;
pub mod growth;
pub mod mesh;
pub mod phyllotaxy;
pub mod rng;
pub mod tree;
pub mod types;
