//! Skinning of a [`Tree`] into one seamless triangle mesh.
//!
//! Every branch node gets a ring of vertices. Consecutive rings of a branch
//! are stitched into quad panels and the last ring is closed with a fan.
//! Where a side branch leaves its parent, the vertices of the child's base
//! ring are pulled onto the parent panel they face, and the nearest parent
//! ring vertices are moved onto them, so the two skins meet without a gap.
//! This distorts the parent polygon locally around large side branches.
//!
//! Vertex and triangle counts depend only on node counts and ring
//! resolutions; see [`topology_counts`].

mod ring;

pub use ring::{MeshNode, Ring, RingArena};

use crate::{
    geometry::{
        EPSILON, PlaneBasis, intersect_line_with_plane, oblique_proj_to_line, ortho_proj_to_line,
        ortho_proj_to_plane,
    },
    tree::{ROOT, Tree},
    types::{BranchId, MeshNodeId},
};
use glam::Vec3;
use hashbrown::HashSet;
use std::f32::consts::TAU;

/// How far (in multiples of the wider ring radius) a junction vertex may
/// travel along the child's skin line before the oblique fallback is used.
const JUNCTION_REACH: f32 = 4.0;

/// Indexed triangle mesh produced by [`generate`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    /// Outward unit normal per vertex.
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// Vertex and triangle counts [`generate`] produces for `tree`.
pub fn topology_counts(tree: &Tree, resolution: impl Fn(usize) -> usize) -> (usize, usize) {
    tree.branches.iter().fold((0, 0), |(vertices, triangles), branch| {
        let res = resolution(branch.depth);
        let count = branch.node_count();
        (
            vertices + count * res,
            triangles + (count - 1) * 2 * res + res.saturating_sub(2),
        )
    })
}

/// Builds the mesh of the whole tree.
///
/// ### Parameters
/// - `tree` - Snapshot to skin; it is only read.
/// - `resolution` - Ring resolution for a branch depth.
///
/// ### Panics
/// Panics if `resolution` returns less than 3 for any depth present in the
/// tree, or if a side branch sits on its parent's root node or terminus.
pub fn generate(tree: &Tree, resolution: impl Fn(usize) -> usize) -> Mesh {
    let mut skinner = Skinner {
        tree,
        resolution,
        arena: RingArena::default(),
        mesh: Mesh::default(),
        claimed: HashSet::new(),
        fallbacks: 0,
    };
    skinner.skin_branch(ROOT, None);

    log::debug!(
        "mesh generated: {} branches, {} vertices, {} triangles, {} junction fallbacks",
        tree.branch_count(),
        skinner.mesh.vertex_count(),
        skinner.mesh.triangle_count(),
        skinner.fallbacks
    );
    skinner.mesh
}

/// State shared by the recursive calls of one [`generate`].
struct Skinner<'a, F> {
    tree: &'a Tree,
    resolution: F,
    arena: RingArena,
    mesh: Mesh,
    /// Parent ring nodes already moved onto a junction.
    claimed: HashSet<MeshNodeId>,
    fallbacks: usize,
}

impl<F: Fn(usize) -> usize> Skinner<'_, F> {
    /// Emits the rings of `id` and, recursively, of its side branches.
    /// Returns the branch's rings, base first.
    fn skin_branch(&mut self, id: BranchId, inherited: Option<PlaneBasis>) -> Vec<Ring> {
        let tree = self.tree;
        let branch = tree.branch(id);
        let resolution = (self.resolution)(branch.depth);
        assert!(
            resolution >= 3,
            "ring resolution must be at least 3, got {resolution} for depth {}",
            branch.depth
        );

        let count = branch.node_count();
        let mut rings: Vec<Ring> = Vec::with_capacity(count);

        for index in 0..count {
            let (node, direction) = branch.node(index);
            let hint = rings.last().map(|ring| ring.basis).or(inherited);

            // A freshly materialized node shares its position with the
            // terminus; keep the previous ring's orientation there.
            let direction = match hint {
                Some(h) if direction.length() < EPSILON => h.normal,
                _ => direction,
            };
            let basis = match hint {
                Some(h) => PlaneBasis::with_hints(direction, &[h.u, h.v]),
                None => PlaneBasis::new(direction),
            };

            let ring = self.add_ring(node.position, node.width, basis, resolution);
            if let Some(lower) = rings.last() {
                self.arena.link_vertical(lower, &ring);
            }
            rings.push(ring);
        }

        for side in branch.side_branches() {
            assert!(
                side.node_index > 0 && side.node_index + 2 <= count,
                "side branch {} of branch {id} sits on non-interior node {}",
                side.branch,
                side.node_index
            );
            let child = self.skin_branch(side.branch, Some(rings[side.node_index].basis));
            self.splice(&rings, side.node_index, &child);
        }

        self.stitch(&rings);
        if let Some(top) = rings.last() {
            self.cap(top);
        }
        rings
    }

    fn add_ring(&mut self, centre: Vec3, radius: f32, basis: PlaneBasis, resolution: usize) -> Ring {
        let first = self.mesh.vertices.len() as u32;
        let ring = self.arena.add_ring(centre, radius, basis, resolution, first);
        for &id in &ring.nodes {
            self.mesh.vertices.push(self.arena[id].position);
            self.mesh.normals.push(self.arena[id].normal);
        }
        ring
    }

    /// Moves every vertex of the child's base ring onto the parent panel
    /// it faces and links it down into the parent ring. Each panel end that
    /// a child vertex lands nearest to is then moved onto the closest such
    /// vertex. A parent node moves at most once per mesh.
    fn splice(&mut self, parent: &[Ring], index: usize, child: &[Ring]) {
        let ring = &parent[index];
        let resolution = ring.resolution();
        let base = &child[0];
        let next = child.get(1);
        let reach = JUNCTION_REACH * ring.radius.max(base.radius).max(EPSILON);
        // (parent node, target, squared distance from the node)
        let mut pulls: Vec<(MeshNodeId, Vec3, f32)> = Vec::new();

        for (k, &id) in base.nodes.iter().enumerate() {
            let position = self.arena[id].position;

            let theta = ring.basis.angle_of(position, ring.centre);
            let panel = ((theta * resolution as f32 / TAU) as usize).min(resolution - 1);
            let left = ring.at(panel);
            let right = ring.at(panel + 1);

            let above = (position - ring.centre).dot(ring.basis.normal) >= 0.0;
            let beside = if above { self.arena[left].up } else { self.arena[left].down };
            let Some(beside) = beside else {
                continue;
            };

            let l = self.arena[left].position;
            let r = self.arena[right].position;
            let s = self.arena[beside].position;

            let normal = (r - l).cross(s - l);
            let (target, fallback) = if normal.length() < EPSILON * EPSILON {
                (ortho_proj_to_line(position, r - l, l), Some("collapsed panel, projecting onto edge"))
            } else {
                let towards = next.map(|upper| self.arena[upper.nodes[k]].position);
                project_onto_panel(position, towards, normal.normalize(), (l, r), reach)
            };
            if let Some(what) = fallback {
                self.fallback(index, k, what);
            }

            let (anchor, from) = if l.distance_squared(target) <= r.distance_squared(target) {
                (left, l)
            } else {
                (right, r)
            };
            let pull = from.distance_squared(target);
            match pulls.iter_mut().find(|(node, ..)| *node == anchor) {
                Some(best) if pull < best.2 => *best = (anchor, target, pull),
                Some(_) => {}
                None => pulls.push((anchor, target, pull)),
            }

            let node = &mut self.arena[id];
            node.position = target;
            node.down = Some(left);
            self.mesh.vertices[node.vertex as usize] = target;
        }

        for (anchor, target, _) in pulls {
            if !self.claimed.insert(anchor) {
                continue;
            }
            let node = &mut self.arena[anchor];
            node.position = target;
            self.mesh.vertices[node.vertex as usize] = target;
        }
    }

    fn fallback(&mut self, index: usize, k: usize, what: &str) {
        self.fallbacks += 1;
        log::trace!("junction at node {index}, child vertex {k}: {what}");
    }

    /// Two triangles per quad between each pair of consecutive rings,
    /// wound so that they face away from the branch axis.
    fn stitch(&mut self, rings: &[Ring]) {
        for lower in &rings[..rings.len().saturating_sub(1)] {
            for a in self.arena.walk_right(lower.nodes[0]) {
                let a_next = self.arena[a].right;
                let (Some(b), Some(b_next)) = (self.arena[a].up, self.arena[a_next].up) else {
                    continue;
                };
                let [a, a_next, b, b_next] = [a, a_next, b, b_next].map(|id| self.arena[id].vertex);
                self.mesh.triangles.push([a, a_next, b_next]);
                self.mesh.triangles.push([a, b_next, b]);
            }
        }
    }

    fn cap(&mut self, top: &Ring) {
        let first = self.arena[top.nodes[0]].vertex;
        for pair in top.nodes[1..].windows(2) {
            let (b, c) = (self.arena[pair[0]].vertex, self.arena[pair[1]].vertex);
            self.mesh.triangles.push([first, b, c]);
        }
    }
}

/// Follows a child's skin line from `p` towards `towards` until it meets
/// the panel plane through `edge.0` with unit normal `n`. The second value
/// names the fallback taken, if any.
fn project_onto_panel(
    p: Vec3,
    towards: Option<Vec3>,
    n: Vec3,
    (l, r): (Vec3, Vec3),
    reach: f32,
) -> (Vec3, Option<&'static str>) {
    let Some(q) = towards.filter(|q| q.distance(p) >= EPSILON) else {
        return (ortho_proj_to_plane(p, n, l), Some("no skin line, projecting onto panel plane"));
    };

    match intersect_line_with_plane(p, q, n, l) {
        Some(hit) if hit.distance(p) <= reach => (hit, None),
        _ => (
            oblique_proj_to_line(p, q - p, l, r, Some((0.0, 1.0))),
            Some("skin line misses panel, oblique projection onto edge"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        branch::{Branch, Node},
        config::GrowthParameters,
        growth::tick,
        rng::create_rng,
    };
    use hashbrown::HashMap;

    fn trunk(count: usize, width: f32) -> Branch {
        let nodes = (0..count)
            .map(|i| Node::new(Vec3::new(0.0, i as f32, 0.0), width))
            .collect();
        Branch::from_nodes(0, nodes, Node::new(Vec3::new(0.0, count as f32, 0.0), width), Vec3::Y)
    }

    fn side(base: Vec3, direction: Vec3, width: f32) -> Branch {
        Branch::from_nodes(
            1,
            vec![Node::new(base, width)],
            Node::new(base + direction, width),
            direction,
        )
    }

    fn assert_indices_valid(mesh: &Mesh) {
        let n = mesh.vertex_count() as u32;
        for tri in &mesh.triangles {
            assert!(tri.iter().all(|&i| i < n), "triangle {tri:?} out of range");
        }
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
        assert!(mesh.vertices.iter().all(|v| v.is_finite()));
    }

    fn triangle_normal(mesh: &Mesh, tri: [u32; 3]) -> Vec3 {
        let [a, b, c] = tri.map(|i| mesh.vertices[i as usize]);
        (b - a).cross(c - a)
    }

    #[test]
    fn single_trunk_counts() {
        let tree = Tree::from_root(trunk(3, 0.2));
        let mesh = generate(&tree, |_| 6);

        assert_eq!(mesh.vertex_count(), 4 * 6);
        assert_eq!(mesh.triangle_count(), 3 * 2 * 6 + 4);
        assert_eq!(topology_counts(&tree, |_| 6), (24, 40));
        assert_indices_valid(&mesh);
    }

    #[test]
    fn trunk_skin_is_closed_except_at_base() {
        let tree = Tree::from_root(trunk(3, 0.2));
        let mesh = generate(&tree, |_| 5);

        let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
        for tri in &mesh.triangles {
            for e in 0..3 {
                *directed.entry((tri[e], tri[(e + 1) % 3])).or_default() += 1;
            }
        }
        // Consistent orientation: no directed edge is used twice.
        assert!(directed.values().all(|&c| c == 1));

        let boundary = directed
            .keys()
            .filter(|&&(a, b)| !directed.contains_key(&(b, a)))
            .count();
        assert_eq!(boundary, 5);
    }

    #[test]
    fn trunk_triangles_face_outwards() {
        let tree = Tree::from_root(trunk(2, 0.3));
        let mesh = generate(&tree, |_| 8);

        for &tri in &mesh.triangles {
            let normal = triangle_normal(&mesh, tri);
            let centroid = tri.iter().map(|&i| mesh.vertices[i as usize]).sum::<Vec3>() / 3.0;
            let ys = tri.map(|i| mesh.vertices[i as usize].y);
            if ys.iter().all(|&y| (y - ys[0]).abs() < 1e-6) {
                // Cap fan.
                assert!(normal.y > 0.0);
            } else {
                let radial = Vec3::new(centroid.x, 0.0, centroid.z);
                assert!(normal.dot(radial) > 0.0, "inward triangle {tri:?}");
            }
        }
    }

    #[test]
    fn side_branch_base_lands_on_parent_skin() {
        let radius = 0.5;
        let mut tree = Tree::from_root(trunk(3, radius));
        let child_id = tree.attach(ROOT, 1, side(Vec3::new(radius, 1.0, 0.0), Vec3::X, 0.1));
        let mesh = generate(&tree, |_| 8);

        assert_eq!(tree.branch(child_id).node_count(), 2);
        assert_eq!(topology_counts(&tree, |_| 8), (mesh.vertex_count(), mesh.triangle_count()));
        assert_indices_valid(&mesh);

        let apothem = radius * (std::f32::consts::PI / 8.0).cos();
        let parent_vertices = 4 * 8;
        for v in &mesh.vertices[parent_vertices..parent_vertices + 8] {
            let axial = Vec3::new(v.x, 0.0, v.z).length();
            assert!(axial >= apothem - 1e-3 && axial <= radius + 1e-3, "vertex {v} off the skin");
            assert!((v.y - 1.0).abs() <= 0.1 + 1e-3);
        }
    }

    #[test]
    fn junction_pulls_parent_ring_onto_child_base() {
        let radius = 0.5;
        let bare = generate(&Tree::from_root(trunk(3, radius)), |_| 8);
        let mut tree = Tree::from_root(trunk(3, radius));
        tree.attach(ROOT, 1, side(Vec3::new(radius, 1.0, 0.0), Vec3::X, 0.1));
        let mesh = generate(&tree, |_| 8);
        assert_eq!(mesh.vertex_count(), bare.vertex_count() + 2 * 8);

        let parent_vertices = 4 * 8;
        let child_base = &mesh.vertices[parent_vertices..parent_vertices + 8];
        let moved: Vec<usize> = (0..parent_vertices)
            .filter(|&i| mesh.vertices[i].distance(bare.vertices[i]) > 1e-6)
            .collect();

        assert!(!moved.is_empty());
        for &i in &moved {
            // Only the attachment ring is distorted.
            assert!((8..16).contains(&i), "vertex {i} of another ring moved");
            assert!(
                child_base.iter().any(|v| v.distance(mesh.vertices[i]) < 1e-6),
                "vertex {i} moved off the child base"
            );
        }
    }

    #[test]
    fn degenerate_junctions_keep_counts() {
        let mut tree = Tree::from_root(trunk(4, 0.3));
        // Base only: no skin line to follow.
        tree.attach(
            ROOT,
            1,
            Branch::from_nodes(1, vec![], Node::new(Vec3::new(0.3, 1.0, 0.0), 0.1), Vec3::X),
        );
        // Zero-width branch, itself carrying a child, based on the trunk axis.
        let thin = Branch::from_nodes(
            1,
            (0..3).map(|i| Node::new(Vec3::new(i as f32, 2.0, 0.0), 0.0)).collect(),
            Node::new(Vec3::new(3.0, 2.0, 0.0), 0.0),
            Vec3::X,
        );
        let thin_id = tree.attach(ROOT, 2, thin);
        tree.attach(thin_id, 1, side(Vec3::new(1.0, 2.0, 0.0), Vec3::Z, 0.02));
        // Child running parallel to the parent panel.
        tree.attach(ROOT, 3, side(Vec3::new(0.3, 3.0, 0.0), Vec3::Y, 0.05));

        let resolution = |depth: usize| if depth == 0 { 6 } else { 4 };
        let mesh = generate(&tree, resolution);
        assert_eq!(
            topology_counts(&tree, resolution),
            (mesh.vertex_count(), mesh.triangle_count())
        );
        assert_indices_valid(&mesh);
    }

    #[test]
    fn grown_tree_matches_topology_counts() {
        let params = GrowthParameters {
            growth_speed: 3.0,
            ..GrowthParameters::default()
        };
        let mut rng = create_rng(21);
        let mut tree = Tree::new(Vec3::ZERO, Vec3::Y, &params, &mut rng);
        for _ in 0..300 {
            tick(&mut tree, 1.0, &params, &mut rng);
        }

        let resolution = |depth: usize| 8usize.saturating_sub(2 * depth).max(3);
        let mesh = generate(&tree, resolution);
        assert_eq!(
            topology_counts(&tree, resolution),
            (mesh.vertex_count(), mesh.triangle_count())
        );
        assert_indices_valid(&mesh);
    }

    #[test]
    #[should_panic]
    fn resolution_below_three_panics() {
        let tree = Tree::from_root(trunk(2, 0.1));
        generate(&tree, |_| 2);
    }
}
