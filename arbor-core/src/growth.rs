//! Tick-driven growth of a [`Tree`].
//!
//! One call to [`tick`] walks the whole tree from the trunk outwards. For
//! each branch it:
//! 1. translates every node by the displacement inherited from ancestors,
//! 2. thickens the branch and recurses into its side branches, carrying
//!    them outwards by the added width,
//! 3. advances the terminus and materializes a node once an internode is
//!    long enough, either splitting the apex or continuing with a slightly
//!    perturbed direction and fresh buds,
//! 4. occasionally turns its oldest bud into a new side branch.
//!
//! Terminal branches skip steps 2 to 4 for themselves. Branches created
//! during a tick first grow on the next one.

use crate::{
    branch::{Branch, Bud, Node},
    config::GrowthParameters,
    geometry::{PlaneBasis, invert_sphere, sphere},
    phyllotaxy::bud_directions,
    tree::{ROOT, Tree},
    types::BranchId,
};
use glam::Vec3;
use rand::Rng;
use std::f32::consts::TAU;

/// Terminus advance per tick at unit growth factor.
pub const LENGTH_PER_TICK: f32 = 0.05;

/// Per-tick chance of activating a bud at unit growth factor.
pub const BUD_ACTIVATION_RATE: f32 = 0.05;

/// Chance of an apex split per materialized trunk node when apical
/// dominance is zero.
pub const APEX_SPLIT_RATE: f32 = 0.25;

/// Inactive buds more than this many nodes behind the newest node are dropped.
pub const BUD_LOOKBACK: usize = 3;

/// Relative growth rate of a branch at `depth`, before light is applied.
///
/// Decays exponentially with depth; stronger apical dominance makes the
/// decay steeper, so the trunk outgrows its side branches.
pub fn growth_factor(depth: usize, params: &GrowthParameters) -> f32 {
    params.growth_speed * (-(depth as f32) * (1.0 + params.apical_dominance)).exp()
}

/// Advances the whole tree by one step.
///
/// ### Parameters
/// - `tree` - The tree to grow; branches are appended, never removed.
/// - `light` - Externally supplied light scalar, multiplied into every
///   branch's growth factor. Zero freezes growth.
/// - `params` - Growth parameters; assumed valid.
/// - `rng` - Source of every stochastic decision in the tick.
///
/// ### Panics
/// Panics if the parameters let a branch spawn children deeper than
/// [`crate::config::MAX_DEPTH`].
pub fn tick(tree: &mut Tree, light: f32, params: &GrowthParameters, rng: &mut impl Rng) {
    grow_branch(tree, ROOT, Vec3::ZERO, light, params, rng);
}

fn grow_branch(
    tree: &mut Tree,
    id: BranchId,
    delta: Vec3,
    light: f32,
    params: &GrowthParameters,
    rng: &mut impl Rng,
) {
    let branch = &mut tree.branches[id];
    branch.translate(delta);
    // Snapshot so that children spawned below are not grown this tick.
    let children = branch.side_branches.clone();

    if branch.is_terminal(params) {
        for child in children {
            grow_branch(tree, child.branch, delta, light, params, rng);
        }
        return;
    }

    let factor = growth_factor(branch.depth, params) * light;
    let length_growth = factor * LENGTH_PER_TICK;
    let width_growth = params.width_to_len_growth_ratio * length_growth;
    branch.enlarge(width_growth);

    for child in children {
        let anchor = tree.branches[id].nodes[child.node_index].position;
        // The child has not been translated yet, so add the delta back in.
        let base = tree.branches[child.branch].node(0).0.position + delta;
        let outward = (base - anchor).normalize_or_zero();
        grow_branch(tree, child.branch, delta + width_growth * outward, light, params, rng);
    }

    let branch = &mut tree.branches[id];
    branch.terminus.position += branch.terminus_direction * length_growth;

    let internode_complete = branch.nodes.last().is_none_or(|last| {
        last.position.distance(branch.terminus.position) >= params.internode_length
    });
    if internode_complete {
        materialize(tree, id, params, rng);
    }

    activate_bud(tree, id, factor, params, rng);
}

/// Commits the terminus as a new node, then splits or continues.
fn materialize(tree: &mut Tree, id: BranchId, params: &GrowthParameters, rng: &mut impl Rng) {
    let branch = &mut tree.branches[id];
    branch.nodes.push(branch.terminus);
    let index = branch.nodes.len() - 1;
    log::debug!(
        "branch {id} (depth {}) materialized node {index} at {}",
        branch.depth,
        branch.terminus.position
    );

    // The lookback window is measured from the newest node, whichever way
    // this node ends up: split, straight or terminal.
    branch.buds.retain(|bud| bud.node_index + BUD_LOOKBACK >= index);

    // Terminal now, or a hand-built branch that only just got its base node.
    if branch.is_terminal(params) || index == 0 {
        return;
    }

    // A tree whose trunk may not carry side branches stays a single stem.
    let split_chance = if branch.depth == 0 && params.can_spawn_children(branch.depth) {
        (1.0 - params.apical_dominance) * APEX_SPLIT_RATE
    } else {
        0.0
    };

    if split_chance > 0.0 && rng.random::<f32>() < split_chance {
        split_apex(tree, id, index, params, rng);
    } else {
        continue_straight(tree, id, index, params, rng);
    }
}

/// Replaces the single terminus with two diverging ones: the branch keeps
/// one, a new sibling of the same depth takes the other.
fn split_apex(tree: &mut Tree, id: BranchId, index: usize, params: &GrowthParameters, rng: &mut impl Rng) {
    let branch = &tree.branches[id];
    let direction = branch.terminus_direction;
    let basis = PlaneBasis::with_hints(
        direction,
        &[branch.phyllotaxy_basis.u, branch.phyllotaxy_basis.v],
    );

    let azimuth = rng.random_range(0.0..TAU);
    let side = basis.direction_at(azimuth);
    let (sin, cos) = params.apex_split_angle.sin_cos();
    let kept = (cos * direction + sin * side).normalize_or(direction);
    let given = (cos * direction - sin * side).normalize_or(direction);

    let node = branch.nodes[index];
    let depth = branch.depth;
    // The sibling starts with one node, so this leaves both with the same
    // effective length.
    let pre_split = branch.effective_length().saturating_sub(1);

    let sibling = Branch::new(depth, node, given, rng).with_pre_split_count(pre_split);
    tree.branches[id].terminus_direction = kept;
    let sibling_id = tree.attach(id, index, sibling);

    log::debug!("branch {id} split at node {index} into sibling {sibling_id}");
}

fn continue_straight(
    tree: &mut Tree,
    id: BranchId,
    index: usize,
    params: &GrowthParameters,
    rng: &mut impl Rng,
) {
    let branch = &mut tree.branches[id];
    let stem = (branch.nodes[index].position - branch.nodes[index - 1].position)
        .normalize_or(branch.terminus_direction);
    branch.terminus_direction =
        jitter_direction(branch.terminus_direction, params.max_direction_change_angle, rng);

    if !params.can_spawn_children(branch.depth) {
        return;
    }

    let directions = bud_directions(stem, &branch.phyllotaxy_basis, branch.cycle_state, params, rng);
    branch.cycle_state += 1;
    branch.buds.extend(directions.into_iter().map(|direction| Bud {
        node_index: index,
        direction,
    }));
}

/// Perturbs a unit direction by independent uniform offsets of at most
/// `max_change` in both spherical angles.
pub fn jitter_direction(direction: Vec3, max_change: f32, rng: &mut impl Rng) -> Vec3 {
    if max_change <= 0.0 {
        return direction;
    }
    let (theta, phi) = invert_sphere(direction);
    let theta = theta + rng.random_range(-max_change..=max_change);
    let phi = phi + rng.random_range(-max_change..=max_change);
    sphere(theta, phi, 1.0)
}

/// With a chance proportional to `factor`, turns the lowest-indexed bud
/// into a side branch one level deeper.
fn activate_bud(tree: &mut Tree, id: BranchId, factor: f32, params: &GrowthParameters, rng: &mut impl Rng) {
    let branch = &tree.branches[id];
    if branch.buds.is_empty() || branch.is_terminal(params) || !params.can_spawn_children(branch.depth) {
        return;
    }
    if rng.random::<f32>() >= factor * BUD_ACTIVATION_RATE {
        return;
    }

    let Some(position) = (0..branch.buds.len()).min_by_key(|&i| branch.buds[i].node_index) else {
        return;
    };
    let branch = &mut tree.branches[id];
    let bud = branch.buds.remove(position);

    let (node, stem) = branch.node(bud.node_index);
    let stem = stem.normalize_or_zero();
    let outward = (bud.direction - bud.direction.dot(stem) * stem).normalize_or_zero();
    let start = Node::new(node.position + outward * node.width, node.width * params.child_width_ratio);
    let depth = branch.depth + 1;

    let child = Branch::new(depth, start, bud.direction, rng);
    let child_id = tree.attach(id, bud.node_index, child);
    log::debug!(
        "branch {id} activated bud at node {} into branch {child_id} (depth {depth})",
        bud.node_index
    );
}
