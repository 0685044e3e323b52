//! Bud placement around a node.

use crate::{
    config::{GrowthParameters, Phyllotaxy, PhyllotaxyCycle},
    geometry::PlaneBasis,
};
use glam::Vec3;
use rand::Rng;
use std::f32::consts::{PI, TAU};

/// 180° × (3 − √5), the divergence angle of spiral phyllotaxy.
pub const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Azimuth by which the whole bud arrangement turns from one node to the next.
pub fn cycle_step(phyllotaxy: Phyllotaxy, cycle: PhyllotaxyCycle) -> f32 {
    match cycle {
        PhyllotaxyCycle::Planar => match phyllotaxy {
            Phyllotaxy::Alternate => PI,
            Phyllotaxy::Opposite | Phyllotaxy::Whorled => 0.0,
        },
        PhyllotaxyCycle::Decussate => PI / phyllotaxy.buds_per_node().max(2) as f32,
        PhyllotaxyCycle::Spiral => GOLDEN_ANGLE,
    }
}

/// Candidate bud directions for a node whose stem points along `stem`.
///
/// The transverse basis is re-derived from `stem` at every call, biased
/// towards the branch's fixed `reference` basis, so the arrangement follows
/// the branch as it curves instead of staying locked to its first
/// direction. Each bud leaves the transverse plane towards the stem by an
/// angle drawn from `[min_branching_angle, max_branching_angle]`.
///
/// ### Parameters
/// - `stem` - Local growth direction at the node; need not be normalized.
/// - `reference` - The branch's phyllotaxy basis.
/// - `cycle_state` - Number of nodes that already received buds on this branch.
/// - `params` - Supplies the arrangement and the branching angle range.
/// - `rng` - Source for the per-bud branching angle.
///
/// ### Returns
/// [`Phyllotaxy::buds_per_node`] unit vectors, evenly spread in azimuth.
pub fn bud_directions(
    stem: Vec3,
    reference: &PlaneBasis,
    cycle_state: u32,
    params: &GrowthParameters,
    rng: &mut impl Rng,
) -> Vec<Vec3> {
    let basis = PlaneBasis::with_hints(stem, &[reference.u, reference.v]);
    let count = params.phyllotaxy.buds_per_node();
    let step = cycle_step(params.phyllotaxy, params.phyllotaxy_cycle);
    let start = (cycle_state as f32 * step).rem_euclid(TAU);

    (0..count)
        .map(|i| {
            let azimuth = start + i as f32 * TAU / count as f32;
            let lift = rng.random_range(params.min_branching_angle..=params.max_branching_angle);
            let transverse = basis.direction_at(azimuth);
            (lift.cos() * transverse + lift.sin() * basis.normal).normalize()
        })
        .collect()
}
