//! Flat, serializable projections returned to collaborators.
//!
//! Views are detached copies; mutating one never touches the stores.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EpisodicMemory, MemoryEntity, MemoryStrength, Priority, SemanticConcept};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MemoryView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    pub emotional_valence: f32,
    pub significance: f32,
    pub strength: MemoryStrength,
}

impl From<&EpisodicMemory> for MemoryView {
    fn from(m: &EpisodicMemory) -> Self {
        Self {
            id: m.id,
            title: m.title.clone(),
            description: m.description.clone(),
            timestamp: m.timestamp,
            tags: m.tags.iter().cloned().collect(),
            emotional_valence: m.emotional_valence,
            significance: m.significance,
            strength: m.strength,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConceptView {
    pub id: Uuid,
    pub name: String,
    pub definition: String,
    pub category: String,
    pub confidence: f32,
    pub priority: Priority,
    pub last_reinforced: DateTime<Utc>,
}

impl From<&SemanticConcept> for ConceptView {
    fn from(c: &SemanticConcept) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            definition: c.definition.clone(),
            category: c.category.clone(),
            confidence: c.confidence,
            priority: c.priority,
            last_reinforced: c.last_reinforced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntityView {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub aliases: Vec<String>,
    pub importance: f32,
    pub first_encountered: DateTime<Utc>,
    pub last_encountered: DateTime<Utc>,
}

impl From<&MemoryEntity> for EntityView {
    fn from(e: &MemoryEntity) -> Self {
        Self {
            id: e.id,
            name: e.name.clone(),
            entity_type: e.entity_type.clone(),
            aliases: e.aliases.iter().cloned().collect(),
            importance: e.importance,
            first_encountered: e.first_encountered,
            last_encountered: e.last_encountered,
        }
    }
}

/// An entity reached through a relation, with a human-readable label such as
/// `"works_with"` or `"is mentor of"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelatedEntityView {
    pub entity: EntityView,
    pub relation: String,
}
