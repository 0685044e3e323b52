use crate::{
    config::{GrowthParameters, MAX_DEPTH},
    geometry::PlaneBasis,
    types::BranchId,
};
use glam::Vec3;
use rand::Rng;

/// Maximum random rotation (radians) of a new branch's phyllotaxy basis
/// around its initial direction.
const PHYLLOTAXY_BASIS_JITTER: f32 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    pub position: Vec3,
    pub width: f32,
}

impl Node {
    pub fn new(position: Vec3, width: f32) -> Self {
        Self { position, width }
    }
}

/// A latent side-branch direction recorded at a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bud {
    pub node_index: usize,
    pub direction: Vec3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SideBranch {
    pub node_index: usize,
    pub branch: BranchId,
}

/// One growable polyline of the tree.
///
/// A branch always has at least one materialized node plus the floating
/// terminus, so [`Branch::node_count`] is never below 2 for grown branches
/// and never below 1 for hand-built ones.
#[derive(Clone, Debug)]
pub struct Branch {
    pub depth: usize,
    pub parent: Option<BranchId>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) terminus: Node,
    pub(crate) terminus_direction: Vec3,
    pub(crate) side_branches: Vec<SideBranch>,
    pub(crate) buds: Vec<Bud>,
    pub(crate) phyllotaxy_basis: PlaneBasis,
    pub(crate) cycle_state: u32,
    pub(crate) pre_split_count: u32,
}

impl Branch {
    /// A fresh branch rooted at `base`, with its terminus on top of it.
    ///
    /// ### Panics
    /// Panics if `depth` exceeds [`MAX_DEPTH`].
    pub fn new(depth: usize, base: Node, direction: Vec3, rng: &mut impl Rng) -> Self {
        let direction = direction.try_normalize().unwrap_or(Vec3::Y);

        let unbiased = PlaneBasis::new(direction);
        let twist = rng.random_range(-PHYLLOTAXY_BASIS_JITTER..=PHYLLOTAXY_BASIS_JITTER);
        let phyllotaxy_basis = PlaneBasis::with_hints(direction, &[unbiased.direction_at(twist)]);

        let mut branch = Self::from_nodes(depth, vec![base], base, direction);
        branch.phyllotaxy_basis = phyllotaxy_basis;
        branch
    }

    /// A branch with a fixed skeleton, for hand-built trees.
    ///
    /// ### Panics
    /// Panics if `depth` exceeds [`MAX_DEPTH`].
    pub fn from_nodes(depth: usize, nodes: Vec<Node>, terminus: Node, direction: Vec3) -> Self {
        assert!(
            depth <= MAX_DEPTH,
            "branch depth {depth} exceeds the supported maximum of {MAX_DEPTH}"
        );
        let direction = direction.try_normalize().unwrap_or(Vec3::Y);

        Self {
            depth,
            parent: None,
            nodes,
            terminus,
            terminus_direction: direction,
            side_branches: Vec::new(),
            buds: Vec::new(),
            phyllotaxy_basis: PlaneBasis::new(direction),
            cycle_state: 0,
            pre_split_count: 0,
        }
    }

    /// Offsets this branch's length against the shared per-depth maximum,
    /// as for one sibling of an apex split.
    pub fn with_pre_split_count(mut self, count: u32) -> Self {
        self.pre_split_count = count;
        self
    }

    /// Number of nodes in the branch, including the terminus.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len() + 1
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn terminus(&self) -> Node {
        self.terminus
    }

    pub fn terminus_direction(&self) -> Vec3 {
        self.terminus_direction
    }

    pub fn side_branches(&self) -> &[SideBranch] {
        &self.side_branches
    }

    pub fn buds(&self) -> &[Bud] {
        &self.buds
    }

    pub fn pre_split_count(&self) -> u32 {
        self.pre_split_count
    }

    /// Node `index` (the terminus for the last index) together with its
    /// growth direction: the segment towards the next node, or the terminus
    /// direction for the terminus itself. The segment is not normalized.
    ///
    /// ### Panics
    /// Panics if `index >= node_count()`.
    pub fn node(&self, index: usize) -> (Node, Vec3) {
        let count = self.node_count();
        assert!(index < count, "node index {index} out of range (node count {count})");

        if index == count - 1 {
            return (self.terminus, self.terminus_direction);
        }

        let next = if index + 1 == count - 1 {
            self.terminus
        } else {
            self.nodes[index + 1]
        };
        let node = self.nodes[index];
        (node, next.position - node.position)
    }

    pub fn side_branches_at(&self, index: usize) -> impl Iterator<Item = BranchId> + '_ {
        self.side_branches
            .iter()
            .filter(move |sb| sb.node_index == index)
            .map(|sb| sb.branch)
    }

    /// Materialized nodes plus the pre-split offset.
    pub fn effective_length(&self) -> u32 {
        self.nodes.len() as u32 + self.pre_split_count
    }

    /// A terminal branch no longer advances, buds or spawns side branches.
    pub fn is_terminal(&self, params: &GrowthParameters) -> bool {
        self.effective_length() >= params.max_branch_length(self.depth)
    }

    pub(crate) fn translate(&mut self, delta: Vec3) {
        for node in &mut self.nodes {
            node.position += delta;
        }
        self.terminus.position += delta;
    }

    pub(crate) fn enlarge(&mut self, width: f32) {
        for node in &mut self.nodes {
            node.width += width;
        }
        self.terminus.width += width;
    }

    /// Records `child` as a side branch at `node_index`.
    ///
    /// ### Panics
    /// Panics unless `0 < node_index <= node_count() - 2`: side branches never
    /// sit on the root node or on the terminus.
    pub(crate) fn attach_side_branch(&mut self, node_index: usize, child: BranchId) {
        assert!(
            node_index > 0 && node_index + 2 <= self.node_count(),
            "side branch index {node_index} must be interior (node count {})",
            self.node_count()
        );
        self.side_branches.push(SideBranch {
            node_index,
            branch: child,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::create_rng;

    fn straight(count: usize) -> Branch {
        let nodes = (0..count)
            .map(|i| Node::new(Vec3::new(0.0, i as f32, 0.0), 1.0))
            .collect();
        let terminus = Node::new(Vec3::new(0.0, count as f32 + 0.5, 0.0), 0.5);
        Branch::from_nodes(0, nodes, terminus, Vec3::Y)
    }

    #[test]
    fn new_branch_has_one_node_and_terminus() {
        let mut rng = create_rng(3);
        let base = Node::new(Vec3::new(1.0, 2.0, 3.0), 0.1);
        let branch = Branch::new(1, base, Vec3::new(0.0, 2.0, 0.0), &mut rng);

        assert_eq!(branch.node_count(), 2);
        assert_eq!(branch.nodes().len(), 1);
        assert_eq!(branch.terminus(), base);
        assert_eq!(branch.terminus_direction(), Vec3::Y);

        let basis = branch.phyllotaxy_basis;
        assert!(basis.u.dot(Vec3::Y).abs() < 1e-5);
        assert!(basis.v.dot(Vec3::Y).abs() < 1e-5);
    }

    #[test]
    fn zero_direction_defaults_to_up() {
        let branch = Branch::from_nodes(0, vec![], Node::new(Vec3::ZERO, 1.0), Vec3::ZERO);
        assert_eq!(branch.terminus_direction(), Vec3::Y);
        assert_eq!(branch.node_count(), 1);
    }

    #[test]
    fn node_returns_segment_directions() {
        let branch = straight(3);
        assert_eq!(branch.node_count(), 4);

        let (n0, d0) = branch.node(0);
        assert_eq!(n0.position, Vec3::ZERO);
        assert_eq!(d0, Vec3::Y);

        let (_, d2) = branch.node(2);
        assert_eq!(d2, Vec3::new(0.0, 1.5, 0.0));

        let (t, dt) = branch.node(3);
        assert_eq!(t, branch.terminus());
        assert_eq!(dt, Vec3::Y);
    }

    #[test]
    #[should_panic]
    fn node_index_out_of_range_panics() {
        straight(2).node(3);
    }

    #[test]
    fn translate_and_enlarge_touch_every_node() {
        let mut branch = straight(2);
        branch.translate(Vec3::X);
        branch.enlarge(0.25);

        for node in branch.nodes() {
            assert_eq!(node.position.x, 1.0);
            assert_eq!(node.width, 1.25);
        }
        assert_eq!(branch.terminus().position.x, 1.0);
        assert_eq!(branch.terminus().width, 0.75);
    }

    #[test]
    fn side_branches_are_grouped_by_index() {
        let mut branch = straight(4);
        branch.attach_side_branch(1, 10);
        branch.attach_side_branch(2, 11);
        branch.attach_side_branch(1, 12);

        assert_eq!(branch.side_branches_at(1).collect::<Vec<_>>(), vec![10, 12]);
        assert_eq!(branch.side_branches_at(2).collect::<Vec<_>>(), vec![11]);
        assert_eq!(branch.side_branches_at(3).count(), 0);
    }

    #[test]
    #[should_panic]
    fn side_branch_on_root_node_panics() {
        straight(3).attach_side_branch(0, 1);
    }

    #[test]
    #[should_panic]
    fn side_branch_on_terminus_panics() {
        let mut branch = straight(3);
        let last = branch.node_count() - 1;
        branch.attach_side_branch(last, 1);
    }

    #[test]
    fn terminal_length_counts_pre_split_offset() {
        let mut params = GrowthParameters::default();
        params.branch_length_by_depth = [4, 0, 0, 0, 0];

        let branch = straight(2);
        assert!(!branch.is_terminal(&params));

        let branch = straight(2).with_pre_split_count(2);
        assert_eq!(branch.effective_length(), 4);
        assert!(branch.is_terminal(&params));
    }

    #[test]
    #[should_panic]
    fn depth_beyond_ceiling_panics() {
        Branch::from_nodes(MAX_DEPTH + 1, vec![], Node::new(Vec3::ZERO, 1.0), Vec3::Y);
    }
}
