use crate::{
    branch::{Branch, Node},
    config::GrowthParameters,
    grid::{GridSet, OccupancyGrid},
    types::BranchId,
};
use glam::Vec3;
use rand::Rng;

/// Id of the trunk in every [`Tree`].
pub const ROOT: BranchId = 0;

/// Arena of branches. Children refer to their parent by id and parents list
/// their children as [`crate::branch::SideBranch`] records; nothing is ever
/// removed except by replacing the whole arena.
#[derive(Clone, Debug)]
pub struct Tree {
    pub branches: Vec<Branch>,
}

impl Tree {
    pub fn new(origin: Vec3, direction: Vec3, params: &GrowthParameters, rng: &mut impl Rng) -> Self {
        let base = Node::new(origin, params.initial_width);
        Self::from_root(Branch::new(0, base, direction, rng))
    }

    pub fn from_root(mut root: Branch) -> Self {
        root.parent = None;
        Self {
            branches: vec![root],
        }
    }

    pub fn reset(&mut self, origin: Vec3, direction: Vec3, params: &GrowthParameters, rng: &mut impl Rng) {
        *self = Self::new(origin, direction, params, rng);
        log::debug!("tree reset at {origin} growing towards {direction}");
    }

    pub fn root(&self) -> &Branch {
        &self.branches[ROOT]
    }

    pub fn branch(&self, id: BranchId) -> &Branch {
        &self.branches[id]
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Adds `branch` as a side branch of `parent` at `node_index` and returns its id.
    ///
    /// ### Panics
    /// Panics if `node_index` is the parent's root node or its terminus.
    pub fn attach(&mut self, parent: BranchId, node_index: usize, mut branch: Branch) -> BranchId {
        let id = self.branches.len();
        self.branches[parent].attach_side_branch(node_index, id);
        branch.parent = Some(parent);
        self.branches.push(branch);
        id
    }

    /// Sum of [`Branch::node_count`] over all branches.
    pub fn node_total(&self) -> usize {
        self.branches.iter().map(Branch::node_count).sum()
    }

    /// True once every branch is terminal, after which ticks only thicken
    /// and displace existing geometry.
    pub fn has_reached_max_growth(&self, params: &GrowthParameters) -> bool {
        self.branches.iter().all(|b| b.is_terminal(params))
    }

    /// Rasterizes every branch segment into one candidate set, using the
    /// width at the start of the segment as the sweep radius.
    pub fn rasterize(&self, grid: &OccupancyGrid) -> GridSet {
        let mut set = grid.empty_set();
        for branch in &self.branches {
            for index in 0..branch.node_count() - 1 {
                let (node, segment) = branch.node(index);
                let cells = grid.cast_ray(node.position, segment, node.width, segment.length());
                set.merge(&cells);
            }
        }
        set
    }
}
