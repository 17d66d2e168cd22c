//! Semantic Concept Store.
//!
//! Durable, de-duplicated knowledge units (facts, preferences, patterns)
//! distilled from episodic memories, plus the [`EntityGraph`] they are
//! cross-referenced with.
//!
//! ## Model
//!
//! Each [`SemanticConcept`] is unique by name (case-insensitive) within the
//! store.  Concepts carry a **stability** score in `[0.0, 1.0]` that starts at
//! `0.5` and grows by [`REINFORCEMENT_STEP`] every time the concept is read
//! back, modelling consolidation through use:
//!
//! ```text
//! stability = min(1.0, stability + 0.01)
//! ```
//!
//! Relations between concepts are kept symmetric: if `A` lists `B` as
//! related, `B` lists `A`.
//!
//! # Example
//!
//! ```rust
//! use grove_memory::semantic::{NewConcept, SemanticStore};
//!
//! let mut store = SemanticStore::new();
//! let focus = store
//!     .create_concept(NewConcept::new("u1", "Deep focus", "task_pattern"))
//!     .unwrap();
//!
//! // Creating the same name again (any case) returns the existing concept.
//! let again = store
//!     .create_concept(NewConcept::new("u1", "deep FOCUS", "task_pattern"))
//!     .unwrap();
//! assert_eq!(focus.id, again.id);
//!
//! // Every read reinforces the concept.
//! let read = store.retrieve_concept(&focus.id).unwrap();
//! assert!(read.stability > focus.stability);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Utc;
use grove_types::{
    Attributes, MemoryEntity, MemoryError, MemoryRelation, Priority, SemanticConcept, clamp_unit,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::graph::{EntityGraph, EntityRelations, NewEntity, NewRelation};

/// Stability gained by a concept on every retrieval.
pub const REINFORCEMENT_STEP: f32 = 0.01;

/// Stability assigned to freshly created concepts.
pub const INITIAL_STABILITY: f32 = 0.5;

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for [`SemanticStore::create_concept`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConcept {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub definition: String,
    pub category: String,
    #[serde(default)]
    pub related_concepts: Vec<Uuid>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub source_memories: Vec<Uuid>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub priority: Priority,
}

fn default_confidence() -> f32 {
    0.7
}

impl NewConcept {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            definition: String::new(),
            category: category.into(),
            related_concepts: Vec::new(),
            attributes: Attributes::new(),
            source_memories: Vec::new(),
            confidence: default_confidence(),
            priority: Priority::default(),
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = definition.into();
        self
    }

    pub fn with_related(mut self, related: Vec<Uuid>) -> Self {
        self.related_concepts = related;
        self
    }

    pub fn with_sources(mut self, sources: Vec<Uuid>) -> Self {
        self.source_memories = sources;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// Field updates for [`SemanticStore::update_concept`].  `None` / empty
/// fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptUpdate {
    pub name: Option<String>,
    pub definition: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub add_related: Vec<Uuid>,
    #[serde(default)]
    pub remove_related: Vec<Uuid>,
    /// Merged into the existing attributes; these values win.
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub add_sources: Vec<Uuid>,
    pub confidence: Option<f32>,
    pub priority: Option<Priority>,
}

// ─────────────────────────────────────────────────────────────────────────────
// SemanticStore
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory concept store indexed by name, category and owning user.
#[derive(Debug, Default)]
pub struct SemanticStore {
    concepts: HashMap<Uuid, SemanticConcept>,
    name_index: HashMap<String, Uuid>,
    category_index: HashMap<String, HashSet<Uuid>>,
    user_index: HashMap<String, HashSet<Uuid>>,
    graph: EntityGraph,
}

impl SemanticStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── concepts ─────────────────────────────────────────────────────────────

    /// Create a concept, or return the existing one with the same name.
    ///
    /// An existing concept is returned as-is: no fields are merged and it is
    /// not reinforced.  Unknown ids in `related_concepts` are dropped; known
    /// ones receive a back-reference.
    pub fn create_concept(&mut self, new: NewConcept) -> Result<SemanticConcept, MemoryError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(MemoryError::missing("name"));
        }
        if new.user_id.trim().is_empty() {
            return Err(MemoryError::missing("user_id"));
        }
        if new.category.trim().is_empty() {
            return Err(MemoryError::missing("category"));
        }
        if let Some(existing) = self.name_index.get(&name.to_lowercase()).and_then(|id| self.concepts.get(id)) {
            debug!(concept_id = %existing.id, "concept already exists");
            return Ok(existing.clone());
        }

        let id = Uuid::new_v4();
        let related: BTreeSet<Uuid> = new
            .related_concepts
            .iter()
            .copied()
            .filter(|rid| self.concepts.contains_key(rid))
            .collect();
        let mut sources = Vec::with_capacity(new.source_memories.len());
        for source in new.source_memories {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        let concept = SemanticConcept {
            id,
            user_id: new.user_id,
            name: name.to_string(),
            definition: new.definition,
            category: new.category.trim().to_string(),
            related_concepts: related.clone(),
            attributes: new.attributes,
            source_memories: sources,
            confidence: clamp_unit(new.confidence, 0.0, 1.0),
            stability: INITIAL_STABILITY,
            last_reinforced: Utc::now(),
            priority: new.priority,
        };
        self.index_concept(&concept);
        self.concepts.insert(id, concept.clone());
        for rid in related {
            if let Some(other) = self.concepts.get_mut(&rid) {
                other.related_concepts.insert(id);
            }
        }
        info!(concept_id = %id, name = %concept.name, category = %concept.category, "concept created");
        Ok(concept)
    }

    fn index_concept(&mut self, concept: &SemanticConcept) {
        self.name_index.insert(concept.name.to_lowercase(), concept.id);
        self.category_index
            .entry(concept.category.to_lowercase())
            .or_default()
            .insert(concept.id);
        self.user_index
            .entry(concept.user_id.clone())
            .or_default()
            .insert(concept.id);
    }

    fn deindex_concept(&mut self, concept: &SemanticConcept) {
        let name_key = concept.name.to_lowercase();
        if self.name_index.get(&name_key) == Some(&concept.id) {
            self.name_index.remove(&name_key);
        }
        let category_key = concept.category.to_lowercase();
        if let Some(set) = self.category_index.get_mut(&category_key) {
            set.remove(&concept.id);
            if set.is_empty() {
                self.category_index.remove(&category_key);
            }
        }
        if let Some(set) = self.user_index.get_mut(&concept.user_id) {
            set.remove(&concept.id);
            if set.is_empty() {
                self.user_index.remove(&concept.user_id);
            }
        }
    }

    fn reinforce(&mut self, id: &Uuid) -> Option<SemanticConcept> {
        let concept = self.concepts.get_mut(id)?;
        concept.stability = (concept.stability + REINFORCEMENT_STEP).min(1.0);
        concept.last_reinforced = Utc::now();
        Some(concept.clone())
    }

    /// Fetch a concept by id, reinforcing it.
    pub fn retrieve_concept(&mut self, id: &Uuid) -> Option<SemanticConcept> {
        self.reinforce(id)
    }

    /// Case-insensitive exact name lookup, reinforcing the hit.
    pub fn find_concept_by_name(&mut self, name: &str) -> Option<SemanticConcept> {
        let id = *self.name_index.get(&name.trim().to_lowercase())?;
        self.reinforce(&id)
    }

    /// Concepts in `category` (case-insensitive), highest confidence first,
    /// each reinforced.
    pub fn find_concepts_by_category(&mut self, category: &str, limit: usize) -> Vec<SemanticConcept> {
        let mut ids: Vec<Uuid> = self
            .category_index
            .get(&category.trim().to_lowercase())
            .into_iter()
            .flatten()
            .copied()
            .collect();
        self.sort_by_confidence(&mut ids);
        ids.truncate(limit);
        ids.iter().filter_map(|id| self.reinforce(id)).collect()
    }

    /// Concepts owned by `user_id` whose name equals or contains `keyword`
    /// (case-insensitive), each reinforced.
    pub fn search_concepts(&mut self, user_id: &str, keyword: &str) -> Vec<SemanticConcept> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Vec::new();
        }
        let mut ids: Vec<Uuid> = self
            .concepts_for_user(user_id)
            .into_iter()
            .filter(|c| c.name.to_lowercase().contains(&keyword))
            .map(|c| c.id)
            .collect();
        self.sort_by_confidence(&mut ids);
        ids.iter().filter_map(|id| self.reinforce(id)).collect()
    }

    /// All concepts owned by `user_id`, without side effects.
    pub fn concepts_for_user(&self, user_id: &str) -> Vec<&SemanticConcept> {
        self.user_index
            .get(user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.concepts.get(id))
            .collect()
    }

    /// Borrow a concept without reinforcing it.
    pub fn peek_concept(&self, id: &Uuid) -> Option<&SemanticConcept> {
        self.concepts.get(id)
    }

    fn sort_by_confidence(&self, ids: &mut [Uuid]) {
        ids.sort_by(|a, b| {
            let (ca, cb) = (&self.concepts[a], &self.concepts[b]);
            cb.confidence
                .total_cmp(&ca.confidence)
                .then_with(|| ca.name.cmp(&cb.name))
        });
    }

    /// Apply `update` to a concept: deindex, mutate, reindex, reinforce.
    ///
    /// Returns `Ok(None)` for an unknown id, and a validation error when the
    /// new name is empty or already taken by another concept.
    pub fn update_concept(
        &mut self,
        id: &Uuid,
        update: ConceptUpdate,
    ) -> Result<Option<SemanticConcept>, MemoryError> {
        let Some(current) = self.concepts.get(id).cloned() else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(MemoryError::missing("name"));
            }
            if let Some(other) = self.name_index.get(&trimmed.to_lowercase())
                && other != id
            {
                return Err(MemoryError::Validation(format!(
                    "concept name `{trimmed}` is already in use"
                )));
            }
        }
        if let Some(category) = &update.category
            && category.trim().is_empty()
        {
            return Err(MemoryError::missing("category"));
        }

        self.deindex_concept(&current);
        let mut concept = current;
        if let Some(name) = update.name {
            concept.name = name.trim().to_string();
        }
        if let Some(definition) = update.definition {
            concept.definition = definition;
        }
        if let Some(category) = update.category {
            concept.category = category.trim().to_string();
        }
        concept.attributes.extend(update.attributes);
        for source in update.add_sources {
            concept.add_source(source);
        }
        if let Some(confidence) = update.confidence {
            concept.confidence = clamp_unit(confidence, 0.0, 1.0);
        }
        if let Some(priority) = update.priority {
            concept.priority = priority;
        }
        self.index_concept(&concept);
        self.concepts.insert(*id, concept);

        for rid in update.remove_related {
            self.unlink(id, &rid);
        }
        for rid in update.add_related {
            self.link(id, &rid);
        }
        Ok(self.reinforce(id))
    }

    fn link(&mut self, a: &Uuid, b: &Uuid) {
        if a == b || !self.concepts.contains_key(a) || !self.concepts.contains_key(b) {
            return;
        }
        if let Some(c) = self.concepts.get_mut(a) {
            c.related_concepts.insert(*b);
        }
        if let Some(c) = self.concepts.get_mut(b) {
            c.related_concepts.insert(*a);
        }
    }

    fn unlink(&mut self, a: &Uuid, b: &Uuid) {
        if let Some(c) = self.concepts.get_mut(a) {
            c.related_concepts.remove(b);
        }
        if let Some(c) = self.concepts.get_mut(b) {
            c.related_concepts.remove(a);
        }
    }

    /// Fold `secondary_id` into `primary_id` and delete the secondary.
    ///
    /// * related concepts: union, minus self-references and each other;
    /// * source memories: union without duplicates;
    /// * attributes: secondary's map overlaid by primary's;
    /// * confidence, stability, priority: element-wise maximum (priority by
    ///   [`Priority::rank`]);
    /// * definition: secondary's if strictly longer;
    /// * every other concept referencing the secondary now references the
    ///   primary, exactly once.
    ///
    /// Returns `None` when either id is unknown.  Merging a concept into
    /// itself returns it unchanged.
    pub fn merge_concepts(&mut self, primary_id: &Uuid, secondary_id: &Uuid) -> Option<SemanticConcept> {
        if primary_id == secondary_id {
            return self.concepts.get(primary_id).cloned();
        }
        let secondary = self.concepts.get(secondary_id)?.clone();
        if !self.concepts.contains_key(primary_id) {
            return None;
        }

        let referrers: Vec<Uuid> = self
            .concepts
            .values()
            .filter(|c| c.id != *primary_id && c.id != *secondary_id)
            .filter(|c| c.related_concepts.contains(secondary_id))
            .map(|c| c.id)
            .collect();
        for rid in &referrers {
            if let Some(c) = self.concepts.get_mut(rid) {
                c.related_concepts.remove(secondary_id);
                c.related_concepts.insert(*primary_id);
            }
        }

        let related = {
            let primary = self.concepts.get_mut(primary_id)?;
            primary.related_concepts.extend(secondary.related_concepts.iter().copied());
            primary.related_concepts.extend(referrers.iter().copied());
            primary.related_concepts.remove(primary_id);
            primary.related_concepts.remove(secondary_id);
            for source in &secondary.source_memories {
                primary.add_source(*source);
            }
            let mut attributes = secondary.attributes.clone();
            attributes.extend(std::mem::take(&mut primary.attributes));
            primary.attributes = attributes;
            primary.confidence = primary.confidence.max(secondary.confidence);
            primary.stability = primary.stability.max(secondary.stability);
            primary.priority = primary.priority.max_rank(secondary.priority);
            if secondary.definition.chars().count() > primary.definition.chars().count() {
                primary.definition = secondary.definition.clone();
            }
            primary.last_reinforced = Utc::now();
            primary.related_concepts.clone()
        };
        for rid in &related {
            if let Some(c) = self.concepts.get_mut(rid) {
                c.related_concepts.insert(*primary_id);
            }
        }

        self.delete_concept(secondary_id);
        info!(primary = %primary_id, secondary = %secondary_id, "concepts merged");
        self.concepts.get(primary_id).cloned()
    }

    /// Remove a concept from every index and every other concept's related
    /// set.  Returns `false` for an unknown id.
    pub fn delete_concept(&mut self, id: &Uuid) -> bool {
        let Some(concept) = self.concepts.get(id).cloned() else {
            return false;
        };
        self.deindex_concept(&concept);
        for other in self.concepts.values_mut() {
            other.related_concepts.remove(id);
        }
        self.concepts.remove(id);
        debug!(concept_id = %id, "concept deleted");
        true
    }

    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    // ── entities (delegated to the graph) ────────────────────────────────────

    pub fn create_entity(&mut self, new: NewEntity) -> Result<MemoryEntity, MemoryError> {
        self.graph.create_entity(new)
    }

    pub fn create_relation(&mut self, new: NewRelation) -> Option<MemoryRelation> {
        self.graph.create_relation(new)
    }

    pub fn get_entity(&self, id: &Uuid) -> Option<&MemoryEntity> {
        self.graph.get_entity(id)
    }

    pub fn find_entity_by_name(&self, name: &str) -> Option<&MemoryEntity> {
        self.graph.find_entity_by_name(name)
    }

    pub fn find_entities_by_type(&self, entity_type: &str) -> Vec<&MemoryEntity> {
        self.graph.find_entities_by_type(entity_type)
    }

    pub fn find_relations_for_entity(&self, id: &Uuid) -> EntityRelations {
        self.graph.find_relations_for_entity(id)
    }

    pub fn find_related_entities(
        &self,
        id: &Uuid,
        relation_type: Option<&str>,
    ) -> Vec<(MemoryEntity, String)> {
        self.graph.find_related_entities(id, relation_type)
    }

    pub fn delete_entity(&mut self, id: &Uuid) -> bool {
        self.graph.delete_entity(id)
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
