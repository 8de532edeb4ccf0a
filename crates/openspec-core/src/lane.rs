//! Lane policy: which stages run for a change and how strictly quality is
//! enforced.
//!
//! A `LaneRegistry` is built once (built-in lanes plus any custom lanes from
//! `.openspec/config.yaml`) and is read-only afterwards.

use crate::error::{Result, WorkflowError};
use crate::types::{Stage, MAX_STAGE_ID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DOCS_LANE: &str = "docs";
pub const STANDARD_LANE: &str = "standard";
pub const HEAVY_LANE: &str = "heavy";

// ---------------------------------------------------------------------------
// Lane
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub stage_ids: Vec<u8>,
    #[serde(with = "duration_secs")]
    pub max_duration: Duration,
    pub quality_gates_enabled: bool,
    pub strict_thresholds: bool,
}

impl Lane {
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stage_ids.iter().filter_map(|&id| Stage::from_id(id))
    }

    pub fn is_docs(&self) -> bool {
        self.name == DOCS_LANE
    }

    fn docs() -> Self {
        Self {
            name: DOCS_LANE.to_string(),
            display_name: "Documentation".to_string(),
            description: "Fast track for documentation-only changes; skips code validation \
                          and quality gates"
                .to_string(),
            stage_ids: vec![0, 2, 3, 4, 9, 10, 11, 12],
            max_duration: Duration::from_secs(5 * 60),
            quality_gates_enabled: false,
            strict_thresholds: false,
        }
    }

    fn standard() -> Self {
        Self {
            name: STANDARD_LANE.to_string(),
            display_name: "Standard".to_string(),
            description: "All stages with quality gates at standard thresholds".to_string(),
            stage_ids: (0..=MAX_STAGE_ID).collect(),
            max_duration: Duration::from_secs(15 * 60),
            quality_gates_enabled: true,
            strict_thresholds: false,
        }
    }

    fn heavy() -> Self {
        Self {
            name: HEAVY_LANE.to_string(),
            display_name: "Heavy".to_string(),
            description: "All stages with strict quality thresholds for high-risk changes"
                .to_string(),
            stage_ids: (0..=MAX_STAGE_ID).collect(),
            max_duration: Duration::from_secs(20 * 60),
            quality_gates_enabled: true,
            strict_thresholds: true,
        }
    }
}

// ---------------------------------------------------------------------------
// LaneDefinition (user-supplied)
// ---------------------------------------------------------------------------

/// A custom lane as written in the `lanes:` list of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneDefinition {
    pub name: String,
    pub stages: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_minutes: Option<u64>,
    #[serde(default = "default_quality_gates")]
    pub quality_gates: bool,
    #[serde(default)]
    pub strict_thresholds: bool,
}

fn default_quality_gates() -> bool {
    true
}

impl LaneDefinition {
    /// Check the definition against the lane schema and build a `Lane`.
    pub fn validate(&self) -> Result<Lane> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(WorkflowError::Configuration(
                "custom lane is missing a name".to_string(),
            ));
        }
        if self.stages.is_empty() {
            return Err(WorkflowError::Configuration(format!(
                "lane '{name}' must list at least one stage"
            )));
        }

        let mut stage_ids = Vec::with_capacity(self.stages.len());
        for &raw in &self.stages {
            if !(0..=i64::from(MAX_STAGE_ID)).contains(&raw) {
                return Err(WorkflowError::Configuration(format!(
                    "lane '{name}' has stage {raw} outside 0..={MAX_STAGE_ID}"
                )));
            }
            let id = raw as u8;
            if let Some(&prev) = stage_ids.last() {
                if id <= prev {
                    return Err(WorkflowError::Configuration(format!(
                        "lane '{name}' stages must be strictly increasing ({prev} then {id})"
                    )));
                }
            }
            stage_ids.push(id);
        }

        let max_duration = match self.max_duration_minutes {
            Some(0) => {
                return Err(WorkflowError::Configuration(format!(
                    "lane '{name}' has a zero max_duration_minutes"
                )))
            }
            Some(m) => m.checked_mul(60).map(Duration::from_secs).ok_or_else(|| {
                WorkflowError::Configuration(format!(
                    "lane '{name}' has max_duration_minutes={m}, which is too large"
                ))
            })?,
            None => Lane::standard().max_duration,
        };

        Ok(Lane {
            name: name.to_string(),
            display_name: self.display_name.clone().unwrap_or_else(|| name.to_string()),
            description: self.description.clone().unwrap_or_default(),
            stage_ids,
            max_duration,
            quality_gates_enabled: self.quality_gates,
            strict_thresholds: self.strict_thresholds,
        })
    }
}

// ---------------------------------------------------------------------------
// LaneRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LaneRegistry {
    lanes: BTreeMap<String, Lane>,
}

impl Default for LaneRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LaneRegistry {
    pub fn builtin() -> Self {
        let lanes = [Lane::docs(), Lane::standard(), Lane::heavy()]
            .into_iter()
            .map(|l| (l.name.clone(), l))
            .collect();
        Self { lanes }
    }

    /// Built-in lanes overlaid with validated custom definitions.
    ///
    /// Any invalid definition rejects the whole set; a custom lane may
    /// replace a built-in of the same name.
    pub fn with_custom(definitions: &[LaneDefinition]) -> Result<Self> {
        let mut registry = Self::builtin();
        let mut seen = std::collections::HashSet::new();
        for def in definitions {
            let lane = def.validate()?;
            if !seen.insert(lane.name.clone()) {
                return Err(WorkflowError::Configuration(format!(
                    "lane '{}' is defined more than once",
                    lane.name
                )));
            }
            registry.lanes.insert(lane.name.clone(), lane);
        }
        Ok(registry)
    }

    /// The named lane, or the standard lane when the name is unknown.
    pub fn get_lane(&self, name: &str) -> &Lane {
        match self.lanes.get(name) {
            Some(lane) => lane,
            None => {
                tracing::warn!(lane = name, "unknown lane, falling back to standard");
                self.standard()
            }
        }
    }

    pub fn stages_for(&self, name: &str) -> Vec<u8> {
        self.get_lane(name).stage_ids.clone()
    }

    pub fn quality_gates_required(&self, name: &str) -> bool {
        self.get_lane(name).quality_gates_enabled
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lanes.contains_key(name)
    }

    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.values()
    }

    fn standard(&self) -> &Lane {
        // Custom lanes may replace standard but never remove it.
        &self.lanes[STANDARD_LANE]
    }
}

// ---------------------------------------------------------------------------
// Serde helper: Duration as whole seconds
// ---------------------------------------------------------------------------

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
