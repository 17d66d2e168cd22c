//! Records owned by the memory stores.
//!
//! Callers never receive these through the facade; they get the flat
//! [`view`](crate::view) projections instead.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Attributes, MemoryStrength, Priority};

// ─────────────────────────────────────────────────────────────────────────────
// Entities and relations
// ─────────────────────────────────────────────────────────────────────────────

/// A named thing (person, place, concept, object) that memories reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntity {
    pub id: Uuid,
    pub name: String,
    /// Free-form type tag, e.g. `"person"`, `"place"`, `"task"`.
    pub entity_type: String,
    pub aliases: BTreeSet<String>,
    pub attributes: Attributes,
    pub first_encountered: DateTime<Utc>,
    pub last_encountered: DateTime<Utc>,
    /// Importance in `[0.0, 1.0]`.
    pub importance: f32,
}

/// A typed, directed edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation_type: String,
    pub attributes: Attributes,
    /// Confidence in `[0.0, 1.0]`; re-observation keeps the maximum.
    pub confidence: f32,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Episodic memory
// ─────────────────────────────────────────────────────────────────────────────

/// A record of a single dated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicMemory {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub location: Option<String>,
    pub related_entities: BTreeSet<Uuid>,
    pub related_tasks: BTreeSet<String>,
    pub related_nodes: BTreeSet<String>,
    /// Emotional valence in `[-1.0, 1.0]`.
    pub emotional_valence: f32,
    /// Emotional arousal in `[0.0, 1.0]`.
    pub emotional_arousal: f32,
    pub strength: MemoryStrength,
    pub access_count: u32,
    /// `None` until the memory is first read back.
    pub last_accessed: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    /// Significance in `[0.0, 1.0]`.
    pub significance: f32,
}

impl EpisodicMemory {
    /// Number of shared entity, task, node and tag ids with `other`.
    pub fn overlap_with(&self, other: &EpisodicMemory) -> usize {
        self.related_entities.intersection(&other.related_entities).count()
            + self.related_tasks.intersection(&other.related_tasks).count()
            + self.related_nodes.intersection(&other.related_nodes).count()
            + self.tags.intersection(&other.tags).count()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Semantic concept
// ─────────────────────────────────────────────────────────────────────────────

/// A durable, de-duplicated knowledge unit distilled from episodic memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConcept {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub definition: String,
    pub category: String,
    pub related_concepts: BTreeSet<Uuid>,
    pub attributes: Attributes,
    /// Episodic memories this concept was derived from, without duplicates.
    pub source_memories: Vec<Uuid>,
    pub confidence: f32,
    /// Grows by a fixed step on each retrieval, capped at `1.0`.
    pub stability: f32,
    pub last_reinforced: DateTime<Utc>,
    pub priority: Priority,
}

impl SemanticConcept {
    /// Append `memory_id` to the source list unless already present.
    pub fn add_source(&mut self, memory_id: Uuid) -> bool {
        if self.source_memories.contains(&memory_id) {
            false
        } else {
            self.source_memories.push(memory_id);
            true
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Insight
// ─────────────────────────────────────────────────────────────────────────────

/// A synthesized summary of patterns across a set of memories.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MemoryInsight {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub source_memories: Vec<Uuid>,
    pub source_concepts: Vec<Uuid>,
    pub confidence: f32,
    pub domain: String,
    pub generated_at: DateTime<Utc>,
    pub relevance: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Query
// ─────────────────────────────────────────────────────────────────────────────

/// Inclusive `[start, end]` time window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window ending at `end` and reaching `days` back.
    ///
    /// A span too wide to represent starts at [`DateTime::<Utc>::MIN_UTC`],
    /// i.e. the window is unbounded in the past.
    pub fn trailing_days(end: DateTime<Utc>, days: i64) -> Self {
        let start = TimeDelta::try_days(days)
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.end
    }
}

/// Filter parameters accepted by episodic retrieval.
///
/// Empty/absent fields do not filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// Owner whose memories are searched; other users are never returned.
    pub user_id: String,
    /// Lowercase substrings; a memory matches when its title or description
    /// contains at least one.
    pub keywords: Vec<String>,
    /// A memory matches when it references any of these entities.
    pub entity_ids: Vec<Uuid>,
    /// Inclusive timestamp window.
    pub time_range: Option<TimeRange>,
    /// Case-insensitive substring of the memory's location.
    pub location: Option<String>,
    /// Minimum significance; applied only when strictly positive.
    pub significance_threshold: f32,
    /// Inclusive `(min, max)` valence window.
    pub valence_range: Option<(f32, f32)>,
    /// Maximum number of results after ranking.
    pub limit: usize,
}

impl MemoryQuery {
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            keywords: Vec::new(),
            entity_ids: Vec::new(),
            time_range: None,
            location: None,
            significance_threshold: 0.0,
            valence_range: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entities(mut self, entity_ids: Vec<Uuid>) -> Self {
        self.entity_ids = entity_ids;
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_significance(mut self, threshold: f32) -> Self {
        self.significance_threshold = threshold;
        self
    }

    pub fn with_valence(mut self, min: f32, max: f32) -> Self {
        self.valence_range = Some((min, max));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
