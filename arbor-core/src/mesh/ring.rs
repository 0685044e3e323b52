//! Index-addressed ring graph, rebuilt for every mesh generation.

use crate::{
    geometry::{PlaneBasis, regular_polygon_with_normals},
    types::MeshNodeId,
};
use glam::Vec3;
use std::ops::{Index, IndexMut};

/// One vertex of a ring, with its neighbours in the ring graph.
///
/// `left`/`right` walk around the ring; `up`/`down` point to the matching
/// node on the next/previous ring of the same branch. After splicing, the
/// `down` of a side branch's base node points into the parent ring instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshNode {
    pub position: Vec3,
    pub normal: Vec3,
    pub up: Option<MeshNodeId>,
    pub down: Option<MeshNodeId>,
    pub left: MeshNodeId,
    pub right: MeshNodeId,
    pub vertex: u32,
}

/// Cross-section polygon at one branch node.
#[derive(Clone, Debug)]
pub struct Ring {
    pub centre: Vec3,
    pub radius: f32,
    pub basis: PlaneBasis,
    pub nodes: Vec<MeshNodeId>,
}

impl Ring {
    #[inline]
    pub fn resolution(&self) -> usize {
        self.nodes.len()
    }

    /// Node at a circular index.
    #[inline]
    pub fn at(&self, index: usize) -> MeshNodeId {
        self.nodes[index % self.nodes.len()]
    }
}

#[derive(Debug, Default)]
pub struct RingArena {
    nodes: Vec<MeshNode>,
}

impl RingArena {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a regular ring whose nodes emit vertices `first_vertex..`.
    pub fn add_ring(
        &mut self,
        centre: Vec3,
        radius: f32,
        basis: PlaneBasis,
        resolution: usize,
        first_vertex: u32,
    ) -> Ring {
        let (positions, normals) = regular_polygon_with_normals(&basis, centre, radius, resolution);
        let start = self.nodes.len();

        for (i, (position, normal)) in positions.into_iter().zip(normals).enumerate() {
            self.nodes.push(MeshNode {
                position,
                normal,
                up: None,
                down: None,
                left: start + (i + resolution - 1) % resolution,
                right: start + (i + 1) % resolution,
                vertex: first_vertex + i as u32,
            });
        }

        Ring {
            centre,
            radius,
            basis,
            nodes: (start..start + resolution).collect(),
        }
    }

    /// Connects corresponding nodes of two consecutive rings.
    ///
    /// ### Panics
    /// Panics if the rings differ in resolution.
    pub fn link_vertical(&mut self, lower: &Ring, upper: &Ring) {
        assert_eq!(
            lower.resolution(),
            upper.resolution(),
            "consecutive rings of one branch must share a resolution"
        );
        for (&a, &b) in lower.nodes.iter().zip(&upper.nodes) {
            self.nodes[a].up = Some(b);
            self.nodes[b].down = Some(a);
        }
    }

    /// Nodes of a ring in `right` order, starting at `start` and stopping
    /// before it comes round again.
    pub fn walk_right(&self, start: MeshNodeId) -> impl Iterator<Item = MeshNodeId> + '_ {
        let mut current = Some(start);
        std::iter::from_fn(move || {
            let id = current?;
            let next = self.nodes[id].right;
            current = (next != start).then_some(next);
            Some(id)
        })
    }
}

impl Index<MeshNodeId> for RingArena {
    type Output = MeshNode;

    fn index(&self, id: MeshNodeId) -> &MeshNode {
        &self.nodes[id]
    }
}

impl IndexMut<MeshNodeId> for RingArena {
    fn index_mut(&mut self, id: MeshNodeId) -> &mut MeshNode {
        &mut self.nodes[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_neighbours_are_circular() {
        let mut arena = RingArena::default();
        let ring = arena.add_ring(Vec3::ZERO, 1.0, PlaneBasis::standard(), 5, 10);

        assert_eq!(arena.len(), 5);
        for (i, &id) in ring.nodes.iter().enumerate() {
            let node = arena[id];
            assert_eq!(node.vertex, 10 + i as u32);
            assert_eq!(arena[node.right].left, id);
            assert_eq!(arena[node.left].right, id);
            assert!((node.position.length() - 1.0).abs() < 1e-5);
        }
        assert_eq!(ring.at(5), ring.nodes[0]);
    }

    #[test]
    fn walk_visits_each_node_once() {
        let mut arena = RingArena::default();
        arena.add_ring(Vec3::ZERO, 1.0, PlaneBasis::standard(), 3, 0);
        let ring = arena.add_ring(Vec3::Y, 1.0, PlaneBasis::standard(), 4, 3);

        let walked: Vec<_> = arena.walk_right(ring.nodes[2]).collect();
        assert_eq!(walked, vec![ring.nodes[2], ring.nodes[3], ring.nodes[0], ring.nodes[1]]);
    }

    #[test]
    fn vertical_links_pair_matching_nodes() {
        let mut arena = RingArena::default();
        let lower = arena.add_ring(Vec3::ZERO, 1.0, PlaneBasis::standard(), 4, 0);
        let upper = arena.add_ring(Vec3::Y, 1.0, PlaneBasis::standard(), 4, 4);
        arena.link_vertical(&lower, &upper);

        for (&a, &b) in lower.nodes.iter().zip(&upper.nodes) {
            assert_eq!(arena[a].up, Some(b));
            assert_eq!(arena[b].down, Some(a));
            assert_eq!(arena[a].down, None);
            assert_eq!(arena[b].up, None);
        }
    }

    #[test]
    #[should_panic]
    fn linking_mismatched_rings_panics() {
        let mut arena = RingArena::default();
        let lower = arena.add_ring(Vec3::ZERO, 1.0, PlaneBasis::standard(), 4, 0);
        let upper = arena.add_ring(Vec3::Y, 1.0, PlaneBasis::standard(), 6, 4);
        arena.link_vertical(&lower, &upper);
    }
}
