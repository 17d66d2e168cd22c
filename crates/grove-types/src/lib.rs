//! `grove-types` – shared vocabulary of the Grove memory engine.
//!
//! Records owned by the stores ([`record`]), the value objects handed in by
//! collaborators ([`collab`]), the event payloads the facade translates into
//! memories ([`event`]), and the flat views returned to callers ([`view`]).

pub mod collab;
pub mod event;
pub mod record;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use collab::{ContextFactor, FactorValue, MemoryContext, NodeSnapshot, TaskSnapshot};
pub use event::{
    Conversation, NodeInteraction, Remembered, TaskExperience, TaskOutcome, UserPreference,
};
pub use record::{
    EpisodicMemory, MemoryEntity, MemoryInsight, MemoryQuery, MemoryRelation, SemanticConcept,
    TimeRange,
};
pub use view::{ConceptView, EntityView, MemoryView, RelatedEntityView};

/// Free-form metadata bag attached to entities, relations, concepts and
/// collaborator objects.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Recall-likelihood label of an episodic memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStrength {
    Strong,
    Medium,
    Weak,
    Fading,
}

impl MemoryStrength {
    /// Ordinal used to decide whether a transition strengthened or weakened a
    /// memory. Higher is stronger.
    pub fn rank(self) -> u8 {
        match self {
            MemoryStrength::Strong => 3,
            MemoryStrength::Medium => 2,
            MemoryStrength::Weak => 1,
            MemoryStrength::Fading => 0,
        }
    }

    /// `true` for the two labels that make a memory eligible for promotion.
    pub fn is_faint(self) -> bool {
        matches!(self, MemoryStrength::Weak | MemoryStrength::Fading)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MemoryStrength::Strong => "strong",
            MemoryStrength::Medium => "medium",
            MemoryStrength::Weak => "weak",
            MemoryStrength::Fading => "fading",
        }
    }
}

/// Priority of a semantic concept or of a collaborator task/node.
///
/// Ordering is defined by [`Priority::rank`] and never by declaration order:
/// `Critical > High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 3,
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }

    /// The higher-ranked of `self` and `other`.
    pub fn max_rank(self, other: Priority) -> Priority {
        if other.rank() > self.rank() { other } else { self }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// Errors surfaced by memory engine operations.
///
/// Unknown ids and names are not errors: lookups return `Option`, `bool` or
/// an explicit `found` flag instead.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemoryError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl MemoryError {
    pub fn missing(field: &str) -> Self {
        MemoryError::Validation(format!("`{field}` must not be empty"))
    }
}

/// Clamp `value` into `[lo, hi]`, mapping NaN to `lo`.
pub fn clamp_unit(value: f32, lo: f32, hi: f32) -> f32 {
    if value.is_nan() { lo } else { value.clamp(lo, hi) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_rank_table_orders_critical_first() {
        assert!(Priority::Critical.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
    }

    #[test]
    fn priority_max_rank_is_symmetric() {
        assert_eq!(Priority::Low.max_rank(Priority::Critical), Priority::Critical);
        assert_eq!(Priority::Critical.max_rank(Priority::Low), Priority::Critical);
        assert_eq!(Priority::Medium.max_rank(Priority::Medium), Priority::Medium);
    }

    #[test]
    fn strength_faint_labels() {
        assert!(MemoryStrength::Weak.is_faint());
        assert!(MemoryStrength::Fading.is_faint());
        assert!(!MemoryStrength::Medium.is_faint());
        assert!(!MemoryStrength::Strong.is_faint());
    }

    #[test]
    fn strength_serializes_lowercase() {
        let json = serde_json::to_string(&MemoryStrength::Fading).unwrap();
        assert_eq!(json, "\"fading\"");
        let back: Priority = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(back, Priority::Critical);
    }

    #[test]
    fn clamp_handles_nan() {
        assert_eq!(clamp_unit(f32::NAN, 0.0, 1.0), 0.0);
        assert_eq!(clamp_unit(1.7, 0.0, 1.0), 1.0);
        assert_eq!(clamp_unit(-3.0, -1.0, 1.0), -1.0);
    }

    #[test]
    fn memory_error_display() {
        let err = MemoryError::missing("title");
        assert!(err.to_string().contains("title"));
    }
}
