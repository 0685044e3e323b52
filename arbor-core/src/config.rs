//! Growth parameters and their TOML representation.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deepest branch depth the engine supports. Depth 0 is the trunk.
pub const MAX_DEPTH: usize = 4;

/// How many buds a node gets and how they are spread around the stem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phyllotaxy {
    /// Two buds on opposite sides of the stem.
    Opposite,
    /// One bud per node.
    #[default]
    Alternate,
    /// Four buds spaced a quarter turn apart.
    Whorled,
}

impl Phyllotaxy {
    pub fn buds_per_node(self) -> usize {
        match self {
            Phyllotaxy::Opposite => 2,
            Phyllotaxy::Alternate => 1,
            Phyllotaxy::Whorled => 4,
        }
    }
}

/// How the bud arrangement rotates from one node to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhyllotaxyCycle {
    /// All buds stay in one plane (alternate buds flip sides).
    Planar,
    /// Successive nodes are rotated a quarter turn (an eighth for whorls).
    Decussate,
    /// Successive nodes are rotated by the golden angle.
    #[default]
    Spiral,
}

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("failed to read parameter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse parameter file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: f32 },

    #[error("branching angle range is inverted (min {min} > max {max})")]
    InvertedRange { min: f32, max: f32 },
}

/// Externally configured knobs of the growth engine. Angles are radians.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthParameters {
    /// In `[0, 1]`. Higher values favour the trunk over side branches and
    /// make apex splits rarer.
    pub apical_dominance: f32,
    pub growth_speed: f32,
    pub min_branching_angle: f32,
    pub max_branching_angle: f32,
    pub max_direction_change_angle: f32,
    pub width_to_len_growth_ratio: f32,
    pub internode_length: f32,
    pub phyllotaxy: Phyllotaxy,
    pub phyllotaxy_cycle: PhyllotaxyCycle,
    /// Maximum node count per depth; the shallowest zero entry is the
    /// depth at which no branch may grow any more.
    pub branch_length_by_depth: [u32; MAX_DEPTH + 1],
    pub apex_split_angle: f32,
    pub initial_width: f32,
    pub child_width_ratio: f32,
}

impl Default for GrowthParameters {
    fn default() -> Self {
        Self {
            apical_dominance: 0.5,
            growth_speed: 1.0,
            min_branching_angle: 0.5,
            max_branching_angle: 0.9,
            max_direction_change_angle: 0.12,
            width_to_len_growth_ratio: 0.02,
            internode_length: 0.5,
            phyllotaxy: Phyllotaxy::default(),
            phyllotaxy_cycle: PhyllotaxyCycle::default(),
            branch_length_by_depth: [12, 6, 3, 0, 0],
            apex_split_angle: 0.35,
            initial_width: 0.05,
            child_width_ratio: 0.5,
        }
    }
}

impl GrowthParameters {
    /// Parses parameters from TOML and validates them. Missing fields keep
    /// their default values.
    pub fn from_toml_str(content: &str) -> Result<Self, ParamsError> {
        let params: Self = toml::from_str(content)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        let non_negative = [
            ("growth_speed", self.growth_speed),
            ("min_branching_angle", self.min_branching_angle),
            ("max_branching_angle", self.max_branching_angle),
            ("max_direction_change_angle", self.max_direction_change_angle),
            ("width_to_len_growth_ratio", self.width_to_len_growth_ratio),
            ("apex_split_angle", self.apex_split_angle),
            ("initial_width", self.initial_width),
            ("child_width_ratio", self.child_width_ratio),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ParamsError::OutOfRange { field, value });
            }
        }

        if !self.internode_length.is_finite() || self.internode_length <= 0.0 {
            return Err(ParamsError::OutOfRange {
                field: "internode_length",
                value: self.internode_length,
            });
        }

        if !(0.0..=1.0).contains(&self.apical_dominance) {
            return Err(ParamsError::OutOfRange {
                field: "apical_dominance",
                value: self.apical_dominance,
            });
        }

        if self.min_branching_angle > self.max_branching_angle {
            return Err(ParamsError::InvertedRange {
                min: self.min_branching_angle,
                max: self.max_branching_angle,
            });
        }

        Ok(())
    }

    /// Maximum node count (materialized nodes plus any pre-split offset) of a
    /// branch at `depth`.
    ///
    /// ### Panics
    /// Panics if `depth` exceeds [`MAX_DEPTH`]; the engine never creates such
    /// a branch unless the parameters and engine disagree.
    pub fn max_branch_length(&self, depth: usize) -> u32 {
        assert!(
            depth <= MAX_DEPTH,
            "branch depth {depth} exceeds the supported maximum of {MAX_DEPTH}"
        );
        self.branch_length_by_depth[depth]
    }

    /// Shallowest depth whose max length is zero, or `MAX_DEPTH + 1` when
    /// every supported depth may grow.
    pub fn terminal_depth(&self) -> usize {
        self.branch_length_by_depth
            .iter()
            .position(|&len| len == 0)
            .unwrap_or(MAX_DEPTH + 1)
    }

    /// Whether a branch at `depth` may spawn children one level deeper.
    pub fn can_spawn_children(&self, depth: usize) -> bool {
        depth + 1 < self.terminal_depth()
    }
}
