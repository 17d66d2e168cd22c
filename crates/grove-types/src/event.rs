//! Domain event payloads the facade turns into memories.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a task attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Failed,
    Skipped,
    InProgress,
}

impl TaskOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed => "failed",
            TaskOutcome::Skipped => "skipped",
            TaskOutcome::InProgress => "in_progress",
        }
    }
}

/// A task attempt reported by the task tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExperience {
    pub outcome: TaskOutcome,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Free text such as `"morning"` or `"late evening"`.
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl TaskExperience {
    pub fn new(outcome: TaskOutcome) -> Self {
        Self {
            outcome,
            feedback: None,
            time_of_day: None,
            location: None,
            duration_minutes: None,
        }
    }
}

/// A user interaction with a goal-tree node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInteraction {
    /// e.g. `"viewed"`, `"updated"`, `"completed"`.
    pub kind: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// An explicitly stated user preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    /// Area the preference applies to, e.g. `"task"` or `"learning"`.
    pub domain: String,
    pub statement: String,
    #[serde(default)]
    pub context: Option<String>,
    /// How strongly the preference was expressed, in `[0.0, 1.0]`.
    #[serde(default = "default_preference_strength")]
    pub strength: f32,
}

fn default_preference_strength() -> f32 {
    0.5
}

/// A conversation summary handed over by the dialogue collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub topic: String,
    pub summary: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    /// Overall sentiment in `[-1.0, 1.0]`.
    #[serde(default)]
    pub sentiment: f32,
}

/// Identifiers produced by one of the facade's `remember_*` operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Remembered {
    pub memory_id: Uuid,
    pub concept_id: Option<Uuid>,
    pub entity_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_strength_defaults_when_absent() {
        let pref: UserPreference =
            serde_json::from_str(r#"{"domain": "task", "statement": "short sprints"}"#).unwrap();
        assert!((pref.strength - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn outcome_uses_snake_case() {
        let json = serde_json::to_string(&TaskOutcome::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(TaskOutcome::InProgress.as_str(), "in_progress");
    }
}
