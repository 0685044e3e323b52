//! Voxel occupancy record of where branch material exists.
//!
//! World space is quantized into a bounded integer lattice with `density`
//! cells per world unit. Valid cell coordinates run from 1 to
//! `length * density` on each axis; coordinate 0 is reserved because
//! truncation maps both sides of the origin plane onto it.

use crate::{geometry::PlaneBasis, types::CellId};
use glam::{IVec3, Vec3};
use hashbrown::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GRID_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Sampling slack so that lengths that are exact multiples of the cell size
/// still reach their last sample despite rounding.
const SAMPLE_SLACK: f32 = 1e-4;

/// Candidate cell ids from one or more ray casts, in first-hit order and
/// without duplicates.
///
/// A set is bound to the grid that produced it; handing it to any other
/// grid instance is a logic error and panics.
#[derive(Clone, Debug)]
pub struct GridSet {
    grid: u64,
    ids: Vec<CellId>,
    seen: HashSet<CellId>,
}

impl GridSet {
    fn new(grid: u64) -> Self {
        Self {
            grid,
            ids: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn push(&mut self, id: CellId) {
        if self.seen.insert(id) {
            self.ids.push(id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[CellId] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = CellId> + '_ {
        self.ids.iter().copied()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.seen.contains(&id)
    }

    /// Appends the ids of `other` that are not yet present.
    ///
    /// ### Panics
    /// Panics if the sets come from different grid instances.
    pub fn merge(&mut self, other: &GridSet) {
        assert_eq!(self.grid, other.grid, "cannot merge grid sets of different grids");
        for &id in &other.ids {
            self.push(id);
        }
    }
}

#[derive(Debug)]
pub struct OccupancyGrid {
    token: u64,
    origin: Vec3,
    extent: IVec3,
    density: i32,
    mult_y: i64,
    mult_z: i64,
    occupied: HashSet<CellId>,
}

impl OccupancyGrid {
    /// A grid spanning `length_x` by `length_y` by `length_z` world units
    /// from `origin`, with `density` cells per world unit.
    ///
    /// ### Panics
    /// Panics if any length or the density is not positive.
    pub fn new(origin: Vec3, length_x: i32, length_y: i32, length_z: i32, density: i32) -> Self {
        assert!(
            length_x > 0 && length_y > 0 && length_z > 0 && density > 0,
            "grid lengths and density must be positive"
        );

        let extent = IVec3::new(length_x, length_y, length_z) * density;
        // Twice the extent per axis, so that out-of-range coordinates (after
        // clamping) can never alias an in-range one.
        let mult_y = 2 * extent.x as i64;
        let mult_z = mult_y * 2 * extent.y as i64;

        Self {
            token: NEXT_GRID_TOKEN.fetch_add(1, Ordering::Relaxed),
            origin,
            extent,
            density,
            mult_y,
            mult_z,
            occupied: HashSet::new(),
        }
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn density(&self) -> i32 {
        self.density
    }

    pub fn min_cell(&self) -> IVec3 {
        IVec3::ONE
    }

    pub fn max_cell(&self) -> IVec3 {
        self.extent
    }

    pub fn contains_cell(&self, cell: IVec3) -> bool {
        cell.cmpge(self.min_cell()).all() && cell.cmple(self.max_cell()).all()
    }

    /// Truncating conversion; every in-range position has positive
    /// coordinates, so truncation and flooring agree where it matters.
    pub fn world_to_grid(&self, position: Vec3) -> IVec3 {
        ((position - self.origin) * self.density as f32).as_ivec3()
    }

    pub fn grid_to_world(&self, cell: IVec3) -> Vec3 {
        cell.as_vec3() / self.density as f32 + self.origin
    }

    /// Packs a cell coordinate into one id. Coordinates outside the grid
    /// are clamped into the safety margin first, so they stay out of range
    /// after decoding.
    pub fn cell_to_id(&self, cell: IVec3) -> CellId {
        let cell = cell.clamp(IVec3::ZERO, self.extent * 2 - IVec3::ONE);
        cell.x as i64 + cell.y as i64 * self.mult_y + cell.z as i64 * self.mult_z
    }

    pub fn id_to_cell(&self, id: CellId) -> IVec3 {
        let x = id % self.mult_y;
        let y = (id % self.mult_z) / self.mult_y;
        let z = id / self.mult_z;
        IVec3::new(x as i32, y as i32, z as i32)
    }

    /// An empty set scoped to this grid, for accumulating several casts.
    pub fn empty_set(&self) -> GridSet {
        GridSet::new(self.token)
    }

    /// Rasterizes a capsule-like sweep into a candidate set.
    ///
    /// Samples are taken along the segment every `1 / density` world units,
    /// starting one step past `origin` and ending at `length`; the start cell
    /// belongs to whatever segment ends there. Around each sample, discs of
    /// increasing radius (also `1 / density` apart) are walked with an
    /// angular step that keeps the arc between samples at one cell.
    ///
    /// A zero `direction` yields an empty set.
    pub fn cast_ray(&self, origin: Vec3, direction: Vec3, radius: f32, length: f32) -> GridSet {
        let mut set = self.empty_set();
        let Some(direction) = direction.try_normalize() else {
            return set;
        };

        let basis = PlaneBasis::new(direction);
        let density = self.density as f32;
        let step = 1.0 / density;
        let steps_along = (length.max(0.0) * density + SAMPLE_SLACK).floor() as i32;
        let rings = (radius.max(0.0) * density + SAMPLE_SLACK).floor() as i32;

        let mut samples = 0usize;
        for k in 1..=steps_along {
            let centre = origin + direction * (k as f32 * step);

            for ring in 0..=rings {
                if ring == 0 {
                    set.push(self.cell_to_id(self.world_to_grid(centre)));
                    samples += 1;
                    continue;
                }

                let r = ring as f32 * step;
                // Arc length r * dtheta == step.
                let dtheta = 1.0 / ring as f32;
                let count = (std::f32::consts::TAU / dtheta).ceil() as i32;
                for a in 0..count {
                    let sample = centre + basis.direction_at(a as f32 * dtheta) * r;
                    set.push(self.cell_to_id(self.world_to_grid(sample)));
                    samples += 1;
                }
            }
        }

        log::trace!("ray cast: {} samples, {} cells", samples, set.len());
        set
    }

    /// Commits every in-range id of `set`; out-of-range ids are dropped.
    ///
    /// ### Panics
    /// Panics if `set` was produced by a different grid.
    pub fn set_occupied(&mut self, set: &GridSet) {
        self.check_scope(set);
        for &id in &set.ids {
            if self.contains_cell(self.id_to_cell(id)) {
                self.occupied.insert(id);
            }
        }
    }

    /// Whether some id of `include` is occupied without also being in
    /// `exclude`. Passing a structure's own freshly cast segment as
    /// `exclude` keeps it from colliding with itself.
    ///
    /// ### Panics
    /// Panics if either set was produced by a different grid.
    pub fn is_occupied(&self, include: &GridSet, exclude: &GridSet) -> bool {
        self.check_scope(include);
        self.check_scope(exclude);
        include
            .ids
            .iter()
            .any(|id| self.occupied.contains(id) && !exclude.contains(*id))
    }

    pub fn clear(&mut self) {
        self.occupied.clear();
    }

    pub fn occupied_len(&self) -> usize {
        self.occupied.len()
    }

    pub fn occupied_cells(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.occupied.iter().map(|&id| self.id_to_cell(id))
    }

    fn check_scope(&self, set: &GridSet) {
        assert_eq!(set.grid, self.token, "grid set belongs to a different grid instance");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells_of(grid: &OccupancyGrid, set: &GridSet) -> HashSet<IVec3> {
        set.ids().iter().map(|&id| grid.id_to_cell(id)).collect()
    }

    #[test]
    fn id_roundtrip_and_injective_over_grid() {
        let grid = OccupancyGrid::new(Vec3::ZERO, 2, 3, 2, 2);
        let (min, max) = (grid.min_cell(), grid.max_cell());
        assert_eq!(max, IVec3::new(4, 6, 4));

        let mut ids = HashSet::new();
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    let cell = IVec3::new(x, y, z);
                    let id = grid.cell_to_id(cell);
                    assert_eq!(grid.id_to_cell(id), cell);
                    assert!(ids.insert(id), "id {id} reused for {cell:?}");
                }
            }
        }
        assert_eq!(ids.len(), 4 * 6 * 4);
    }

    #[test]
    fn out_of_range_cells_never_alias_in_range_cells() {
        let grid = OccupancyGrid::new(Vec3::ZERO, 2, 2, 2, 2);
        for z in -6..12 {
            for y in -6..12 {
                for x in -6..12 {
                    let cell = IVec3::new(x, y, z);
                    if grid.contains_cell(cell) {
                        continue;
                    }
                    let decoded = grid.id_to_cell(grid.cell_to_id(cell));
                    assert!(!grid.contains_cell(decoded), "{cell:?} aliased {decoded:?}");
                }
            }
        }
    }

    #[test]
    fn world_grid_conversion() {
        let grid = OccupancyGrid::new(Vec3::new(-1.0, 0.0, 2.0), 4, 4, 4, 4);
        assert_eq!(grid.world_to_grid(Vec3::new(0.0, 1.1, 2.5)), IVec3::new(4, 4, 2));
        assert_eq!(grid.grid_to_world(IVec3::new(4, 4, 2)), Vec3::new(0.0, 1.0, 2.5));
        // Just below the origin truncates onto the reserved coordinate 0.
        assert_eq!(grid.world_to_grid(Vec3::new(-1.1, 0.0, 2.0)).x, 0);
    }

    #[test]
    fn axial_ray_hits_only_on_axis_cells() {
        let grid = OccupancyGrid::new(Vec3::ZERO, 4, 4, 4, 4);
        let set = grid.cast_ray(Vec3::ZERO, Vec3::Y, 0.0, 1.0);

        let expected: HashSet<IVec3> = (1..=4).map(|y| IVec3::new(0, y, 0)).collect();
        assert_eq!(cells_of(&grid, &set), expected);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn ray_with_radius_fills_a_disc() {
        let grid = OccupancyGrid::new(Vec3::splat(-4.0), 8, 8, 8, 4);
        let origin = Vec3::new(0.1, 0.0, 0.1);
        let set = grid.cast_ray(origin, Vec3::Y, 0.5, 0.25);
        let cells = cells_of(&grid, &set);

        let centre = grid.world_to_grid(origin + Vec3::Y * 0.25);
        assert!(cells.contains(&centre));
        assert!(cells.len() > 5);
        for cell in &cells {
            assert_eq!(cell.y, centre.y);
            let offset = (*cell - centre).abs();
            assert!(offset.x <= 3 && offset.z <= 3, "{cell:?} too far from {centre:?}");
        }
    }

    #[test]
    fn zero_direction_casts_nothing() {
        let grid = OccupancyGrid::new(Vec3::ZERO, 2, 2, 2, 2);
        assert!(grid.cast_ray(Vec3::ONE, Vec3::ZERO, 1.0, 1.0).is_empty());
    }

    #[test]
    fn set_occupied_drops_out_of_range_ids() {
        let mut grid = OccupancyGrid::new(Vec3::ZERO, 4, 4, 4, 4);
        // x = z = 0 is the reserved coordinate.
        let set = grid.cast_ray(Vec3::ZERO, Vec3::Y, 0.0, 1.0);
        grid.set_occupied(&set);
        assert_eq!(grid.occupied_len(), 0);

        let inside = grid.cast_ray(Vec3::new(1.0, 1.0, 1.0), Vec3::Y, 0.0, 1.0);
        grid.set_occupied(&inside);
        assert_eq!(grid.occupied_len(), 4);
        assert!(grid.occupied_cells().all(|c| c.x == 4 && c.z == 4));
    }

    #[test]
    fn set_never_occupies_itself() {
        let mut grid = OccupancyGrid::new(Vec3::splat(-2.0), 4, 4, 4, 4);
        let set = grid.cast_ray(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0), 0.25, 1.0);
        assert!(!set.is_empty());

        grid.set_occupied(&set);
        assert!(!grid.is_occupied(&set, &set));
        assert!(grid.is_occupied(&set, &grid.empty_set()));
    }

    #[test]
    fn is_occupied_detects_other_structures() {
        let mut grid = OccupancyGrid::new(Vec3::splat(-2.0), 4, 4, 4, 4);
        let trunk = grid.cast_ray(Vec3::new(0.0, -1.0, 0.0), Vec3::Y, 0.0, 2.0);
        grid.set_occupied(&trunk);

        let crossing = grid.cast_ray(Vec3::new(-1.0, 0.5, 0.0), Vec3::X, 0.0, 2.0);
        let elsewhere = grid.cast_ray(Vec3::new(-1.0, 0.5, 1.0), Vec3::X, 0.0, 2.0);
        assert!(grid.is_occupied(&crossing, &grid.empty_set()));
        assert!(!grid.is_occupied(&elsewhere, &grid.empty_set()));

        grid.clear();
        assert!(!grid.is_occupied(&crossing, &grid.empty_set()));
    }

    #[test]
    fn merge_skips_duplicates() {
        let grid = OccupancyGrid::new(Vec3::splat(-2.0), 4, 4, 4, 4);
        let mut a = grid.cast_ray(Vec3::ZERO, Vec3::Y, 0.0, 1.0);
        let b = grid.cast_ray(Vec3::new(0.0, 0.5, 0.0), Vec3::Y, 0.0, 1.0);
        a.merge(&b);
        assert_eq!(a.len(), 6);
        assert!(b.iter().all(|id| a.contains(id)));
    }

    #[test]
    #[should_panic]
    fn set_from_another_grid_panics() {
        let a = OccupancyGrid::new(Vec3::ZERO, 2, 2, 2, 2);
        let mut b = OccupancyGrid::new(Vec3::ZERO, 2, 2, 2, 2);
        let set = a.cast_ray(Vec3::ONE, Vec3::Y, 0.0, 0.5);
        b.set_occupied(&set);
    }
}
