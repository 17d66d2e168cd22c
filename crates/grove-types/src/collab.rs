//! Value objects owned by collaborators (the task tree, the context tracker).
//!
//! The engine only reads these, except for the `attributes` bag of tasks and
//! nodes which the facade's enhancement operations write into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Attributes, Priority};

/// A task from the collaborator's goal tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub node_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: Priority,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub mental_preparation: bool,
    #[serde(default)]
    pub physical_preparation: bool,
    #[serde(default)]
    pub emotional_preparation: bool,
}

impl TaskSnapshot {
    /// Number of preparation flags set on the task.
    pub fn preparation_load(&self) -> u8 {
        [self.mental_preparation, self.physical_preparation, self.emotional_preparation]
            .into_iter()
            .filter(|f| *f)
            .count() as u8
    }
}

/// A node from the collaborator's goal tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub is_milestone: bool,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Value of a named context factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorValue {
    Number(f64),
    Text(String),
}

impl FactorValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactorValue::Number(n) => Some(*n),
            FactorValue::Text(_) => None,
        }
    }
}

/// A situational factor with the weight it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFactor {
    pub value: FactorValue,
    #[serde(default)]
    pub influence: f32,
}

/// Ephemeral snapshot of the user's situation, used only as retrieval input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryContext {
    pub location: Option<String>,
    pub time_of_day: Option<String>,
    pub activity: Option<String>,
    pub emotional_state: Option<String>,
    pub physical_state: Option<String>,
    pub social_context: Option<String>,
    pub device_context: Option<String>,
    #[serde(default)]
    pub factors: BTreeMap<String, ContextFactor>,
}
