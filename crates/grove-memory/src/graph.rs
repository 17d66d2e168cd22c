//! Entity/Relation Store.
//!
//! Holds named entities and the typed, directed relations between them.
//!
//! ## Indices
//!
//! | index          | key                               | value            |
//! |----------------|-----------------------------------|------------------|
//! | `name_index`   | lowercased name **and** aliases   | entity id        |
//! | `type_index`   | lowercased type tag               | set of entity ids|
//! | `relation_key` | `(source, target, relation_type)` | relation id      |
//! | `outgoing`     | source entity id                  | relation ids     |
//! | `incoming`     | target entity id                  | relation ids     |
//!
//! A name or alias that collides with another entity's overwrites the index
//! entry (last writer wins).
//!
//! ## Deduplication
//!
//! [`EntityGraph::create_entity`] first looks up the new name, then every new
//! alias, in `name_index`.  An alias hit folds the new name into the existing
//! entity as an alias instead of creating a duplicate:
//!
//! ```rust
//! use grove_memory::graph::{EntityGraph, NewEntity};
//!
//! let mut graph = EntityGraph::new();
//! let alex = graph.create_entity(NewEntity::new("Alex", "person")).unwrap();
//! let again = graph
//!     .create_entity(NewEntity::new("Alexandra", "person").with_aliases(["Alex"]))
//!     .unwrap();
//!
//! assert_eq!(alex.id, again.id);
//! assert!(again.aliases.contains("Alexandra"));
//! ```

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use grove_types::{Attributes, MemoryEntity, MemoryError, MemoryRelation, clamp_unit};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Inputs and outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for [`EntityGraph::create_entity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default = "default_importance")]
    pub importance: f32,
}

fn default_importance() -> f32 {
    0.5
}

impl NewEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            aliases: Vec::new(),
            attributes: Attributes::new(),
            importance: default_importance(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }
}

/// Parameters for [`EntityGraph::create_relation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelation {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation_type: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl NewRelation {
    pub fn new(source_id: Uuid, target_id: Uuid, relation_type: impl Into<String>) -> Self {
        Self {
            source_id,
            target_id,
            relation_type: relation_type.into(),
            attributes: Attributes::new(),
            confidence: default_confidence(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }
}

/// All relations touching one entity, split by direction.
#[derive(Debug, Clone, Default)]
pub struct EntityRelations {
    pub outgoing: Vec<MemoryRelation>,
    pub incoming: Vec<MemoryRelation>,
}

// ─────────────────────────────────────────────────────────────────────────────
// EntityGraph
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory entity/relation store with name, alias and type lookup.
#[derive(Debug, Default)]
pub struct EntityGraph {
    entities: HashMap<Uuid, MemoryEntity>,
    relations: HashMap<Uuid, MemoryRelation>,
    name_index: HashMap<String, Uuid>,
    type_index: HashMap<String, HashSet<Uuid>>,
    relation_key: HashMap<(Uuid, Uuid, String), Uuid>,
    outgoing: HashMap<Uuid, Vec<Uuid>>,
    incoming: HashMap<Uuid, Vec<Uuid>>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity, or fold the request into an existing one.
    ///
    /// Resolution order:
    /// 1. the name (case-insensitive) already maps to an entity → that entity
    ///    is returned with `last_encountered` bumped and new aliases added;
    /// 2. any alias maps to an entity → the new name and aliases become
    ///    aliases of that entity;
    /// 3. otherwise a new entity is created and indexed by name, aliases and
    ///    type.
    pub fn create_entity(&mut self, new: NewEntity) -> Result<MemoryEntity, MemoryError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(MemoryError::missing("name"));
        }
        if new.entity_type.trim().is_empty() {
            return Err(MemoryError::missing("entity_type"));
        }

        let existing = self.name_index.get(&name.to_lowercase()).copied().or_else(|| {
            new.aliases
                .iter()
                .find_map(|alias| self.name_index.get(&alias.trim().to_lowercase()).copied())
        });

        if let Some(id) = existing {
            let mut extra: Vec<String> = new.aliases.iter().map(|a| a.trim().to_string()).collect();
            extra.push(name.to_string());
            if let Some(entity) = self.absorb_aliases(id, extra) {
                return Ok(entity);
            }
        }

        let now = Utc::now();
        let entity = MemoryEntity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            entity_type: new.entity_type.trim().to_string(),
            aliases: new
                .aliases
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case(name))
                .collect(),
            attributes: new.attributes,
            first_encountered: now,
            last_encountered: now,
            importance: clamp_unit(new.importance, 0.0, 1.0),
        };
        self.index_entity(&entity);
        debug!(entity_id = %entity.id, name = %entity.name, "entity created");
        self.entities.insert(entity.id, entity.clone());
        Ok(entity)
    }

    /// Add every label in `labels` that is not already the entity's name or an
    /// alias, re-index, and bump `last_encountered`.
    fn absorb_aliases(&mut self, id: Uuid, labels: Vec<String>) -> Option<MemoryEntity> {
        let entity = self.entities.get_mut(&id)?;
        let mut added = Vec::new();
        for label in labels {
            if label.is_empty() || label.eq_ignore_ascii_case(&entity.name) {
                continue;
            }
            let known = entity.aliases.iter().any(|a| a.eq_ignore_ascii_case(&label));
            if !known {
                entity.aliases.insert(label.clone());
                added.push(label);
            }
        }
        entity.last_encountered = Utc::now();
        let snapshot = entity.clone();
        for label in &added {
            self.name_index.insert(label.to_lowercase(), id);
        }
        if !added.is_empty() {
            debug!(entity_id = %id, aliases = ?added, "entity aliases extended");
        }
        Some(snapshot)
    }

    fn index_entity(&mut self, entity: &MemoryEntity) {
        self.name_index.insert(entity.name.to_lowercase(), entity.id);
        for alias in &entity.aliases {
            self.name_index.insert(alias.to_lowercase(), entity.id);
        }
        self.type_index
            .entry(entity.entity_type.to_lowercase())
            .or_default()
            .insert(entity.id);
    }

    fn deindex_entity(&mut self, entity: &MemoryEntity) {
        let labels = std::iter::once(&entity.name).chain(entity.aliases.iter());
        for label in labels {
            let key = label.to_lowercase();
            if self.name_index.get(&key) == Some(&entity.id) {
                self.name_index.remove(&key);
            }
        }
        let type_key = entity.entity_type.to_lowercase();
        if let Some(set) = self.type_index.get_mut(&type_key) {
            set.remove(&entity.id);
            if set.is_empty() {
                self.type_index.remove(&type_key);
            }
        }
    }

    pub fn get_entity(&self, id: &Uuid) -> Option<&MemoryEntity> {
        self.entities.get(id)
    }

    /// Look up an entity by name or alias, case-insensitively.
    pub fn find_entity_by_name(&self, name: &str) -> Option<&MemoryEntity> {
        self.name_index
            .get(&name.trim().to_lowercase())
            .and_then(|id| self.entities.get(id))
    }

    /// All entities carrying `entity_type` (case-insensitive), most important
    /// first.
    pub fn find_entities_by_type(&self, entity_type: &str) -> Vec<&MemoryEntity> {
        let mut found: Vec<&MemoryEntity> = self
            .type_index
            .get(&entity_type.to_lowercase())
            .into_iter()
            .flatten()
            .filter_map(|id| self.entities.get(id))
            .collect();
        found.sort_by(|a, b| b.importance.total_cmp(&a.importance).then(a.name.cmp(&b.name)));
        found
    }

    /// Remove an entity, every relation touching it, and its index entries.
    pub fn delete_entity(&mut self, id: &Uuid) -> bool {
        let Some(entity) = self.entities.get(id).cloned() else {
            return false;
        };
        let touching: Vec<Uuid> = self
            .outgoing
            .get(id)
            .into_iter()
            .chain(self.incoming.get(id))
            .flatten()
            .copied()
            .collect();
        for relation_id in touching {
            self.remove_relation(&relation_id);
        }
        self.deindex_entity(&entity);
        self.outgoing.remove(id);
        self.incoming.remove(id);
        self.entities.remove(id);
        debug!(entity_id = %id, "entity deleted");
        true
    }

    // ── relations ────────────────────────────────────────────────────────────

    /// Record a relation between two existing entities.
    ///
    /// Returns `None` when either endpoint is unknown.  Observing the same
    /// `(source, target, type)` triple again keeps the higher confidence and
    /// merges attributes (newer values win) instead of adding a duplicate.
    pub fn create_relation(&mut self, new: NewRelation) -> Option<MemoryRelation> {
        if !self.entities.contains_key(&new.source_id) || !self.entities.contains_key(&new.target_id)
        {
            debug!(source = %new.source_id, target = %new.target_id, "relation endpoint missing");
            return None;
        }
        let confidence = clamp_unit(new.confidence, 0.0, 1.0);
        let key = (new.source_id, new.target_id, new.relation_type.clone());
        let now = Utc::now();

        if let Some(existing) = self.relation_key.get(&key).and_then(|id| self.relations.get_mut(id)) {
            existing.confidence = existing.confidence.max(confidence);
            existing.attributes.extend(new.attributes);
            existing.last_observed = now;
            return Some(existing.clone());
        }

        let relation = MemoryRelation {
            id: Uuid::new_v4(),
            source_id: new.source_id,
            target_id: new.target_id,
            relation_type: new.relation_type,
            attributes: new.attributes,
            confidence,
            first_observed: now,
            last_observed: now,
        };
        self.relation_key.insert(key, relation.id);
        self.outgoing.entry(relation.source_id).or_default().push(relation.id);
        self.incoming.entry(relation.target_id).or_default().push(relation.id);
        self.relations.insert(relation.id, relation.clone());
        Some(relation)
    }

    fn remove_relation(&mut self, relation_id: &Uuid) {
        let Some(relation) = self.relations.remove(relation_id) else {
            return;
        };
        self.relation_key.remove(&(
            relation.source_id,
            relation.target_id,
            relation.relation_type.clone(),
        ));
        if let Some(ids) = self.outgoing.get_mut(&relation.source_id) {
            ids.retain(|id| id != relation_id);
        }
        if let Some(ids) = self.incoming.get_mut(&relation.target_id) {
            ids.retain(|id| id != relation_id);
        }
    }

    pub fn find_relations_for_entity(&self, id: &Uuid) -> EntityRelations {
        let collect = |ids: Option<&Vec<Uuid>>| -> Vec<MemoryRelation> {
            ids.into_iter()
                .flatten()
                .filter_map(|rid| self.relations.get(rid).cloned())
                .collect()
        };
        EntityRelations {
            outgoing: collect(self.outgoing.get(id)),
            incoming: collect(self.incoming.get(id)),
        }
    }

    /// Entities one hop away from `id`, each paired with a label describing
    /// the relation from `id`'s point of view.
    ///
    /// Outgoing relations use the raw type; incoming ones read
    /// `"is {type} of"`.  `relation_type` restricts both directions.
    pub fn find_related_entities(
        &self,
        id: &Uuid,
        relation_type: Option<&str>,
    ) -> Vec<(MemoryEntity, String)> {
        let relations = self.find_relations_for_entity(id);
        let wanted = |r: &MemoryRelation| relation_type.is_none_or(|t| r.relation_type == t);
        let mut related = Vec::new();
        for r in relations.outgoing.iter().filter(|&r| wanted(r)) {
            if let Some(target) = self.entities.get(&r.target_id) {
                related.push((target.clone(), r.relation_type.clone()));
            }
        }
        for r in relations.incoming.iter().filter(|&r| wanted(r)) {
            if let Some(source) = self.entities.get(&r.source_id) {
                related.push((source.clone(), format!("is {} of", r.relation_type)));
            }
        }
        related
    }

    /// Resolve a lowercased label straight through the name/alias index.
    pub fn resolve_label(&self, label: &str) -> Option<Uuid> {
        self.name_index.get(label).copied()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person(graph: &mut EntityGraph, name: &str) -> MemoryEntity {
        graph.create_entity(NewEntity::new(name, "person")).unwrap()
    }

    // ── create_entity ────────────────────────────────────────────────────────

    #[test]
    fn create_entity_indexes_name_aliases_and_type() {
        let mut graph = EntityGraph::new();
        let e = graph
            .create_entity(NewEntity::new("Morning Run", "activity").with_aliases(["jog"]))
            .unwrap();
        assert_eq!(graph.find_entity_by_name("morning run").unwrap().id, e.id);
        assert_eq!(graph.find_entity_by_name("JOG").unwrap().id, e.id);
        assert_eq!(graph.find_entities_by_type("Activity").len(), 1);
    }

    #[test]
    fn create_entity_rejects_empty_name() {
        let mut graph = EntityGraph::new();
        let err = graph.create_entity(NewEntity::new("  ", "person")).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn same_name_any_case_returns_existing() {
        let mut graph = EntityGraph::new();
        let first = person(&mut graph, "Alex");
        let second = person(&mut graph, "alex");
        assert_eq!(first.id, second.id);
        assert_eq!(graph.entity_count(), 1);
        assert!(second.aliases.is_empty());
    }

    #[test]
    fn alias_match_folds_new_name_into_first_entity() {
        let mut graph = EntityGraph::new();
        let alex = person(&mut graph, "Alex");
        let again = graph
            .create_entity(NewEntity::new("Alexandra", "person").with_aliases(["Alex"]))
            .unwrap();

        assert_eq!(again.id, alex.id);
        assert_eq!(graph.entity_count(), 1);
        assert!(again.aliases.contains("Alexandra"));
        assert_eq!(graph.find_entity_by_name("alexandra").unwrap().id, alex.id);
        assert!(again.last_encountered >= alex.last_encountered);
    }

    #[test]
    fn importance_is_clamped() {
        let mut graph = EntityGraph::new();
        let e = graph
            .create_entity(NewEntity::new("Gym", "place").with_importance(3.0))
            .unwrap();
        assert_eq!(e.importance, 1.0);
    }

    // ── relations ────────────────────────────────────────────────────────────

    #[test]
    fn relation_requires_both_endpoints() {
        let mut graph = EntityGraph::new();
        let a = person(&mut graph, "Sam");
        assert!(graph.create_relation(NewRelation::new(a.id, Uuid::new_v4(), "knows")).is_none());
        assert_eq!(graph.relation_count(), 0);
    }

    #[test]
    fn repeat_relation_keeps_max_confidence_and_merges_attributes() {
        let mut graph = EntityGraph::new();
        let a = person(&mut graph, "Sam");
        let b = person(&mut graph, "Riley");
        let first = graph
            .create_relation(
                NewRelation::new(a.id, b.id, "mentors")
                    .with_confidence(0.4)
                    .with_attribute("since", json!("2023")),
            )
            .unwrap();
        let second = graph
            .create_relation(
                NewRelation::new(a.id, b.id, "mentors")
                    .with_confidence(0.9)
                    .with_attribute("topic", json!("rust")),
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(graph.relation_count(), 1);
        assert!((second.confidence - 0.9).abs() < 1e-6);
        assert_eq!(second.attributes.len(), 2);

        let third = graph
            .create_relation(NewRelation::new(a.id, b.id, "mentors").with_confidence(0.1))
            .unwrap();
        assert!((third.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn related_entities_label_direction() {
        let mut graph = EntityGraph::new();
        let sam = person(&mut graph, "Sam");
        let riley = person(&mut graph, "Riley");
        graph.create_relation(NewRelation::new(sam.id, riley.id, "mentor")).unwrap();

        let from_sam = graph.find_related_entities(&sam.id, None);
        assert_eq!(from_sam.len(), 1);
        assert_eq!(from_sam[0].0.id, riley.id);
        assert_eq!(from_sam[0].1, "mentor");

        let from_riley = graph.find_related_entities(&riley.id, None);
        assert_eq!(from_riley[0].0.id, sam.id);
        assert_eq!(from_riley[0].1, "is mentor of");

        assert!(graph.find_related_entities(&sam.id, Some("sibling")).is_empty());
    }

    #[test]
    fn relations_split_by_direction() {
        let mut graph = EntityGraph::new();
        let a = person(&mut graph, "A");
        let b = person(&mut graph, "B");
        graph.create_relation(NewRelation::new(a.id, b.id, "knows")).unwrap();
        let rels = graph.find_relations_for_entity(&a.id);
        assert_eq!(rels.outgoing.len(), 1);
        assert!(rels.incoming.is_empty());
        let rels = graph.find_relations_for_entity(&b.id);
        assert_eq!(rels.incoming.len(), 1);
    }

    #[test]
    fn delete_entity_drops_relations_and_index_entries() {
        let mut graph = EntityGraph::new();
        let a = graph
            .create_entity(NewEntity::new("Coach", "person").with_aliases(["trainer"]))
            .unwrap();
        let b = person(&mut graph, "Jordan");
        graph.create_relation(NewRelation::new(a.id, b.id, "trains")).unwrap();

        assert!(graph.delete_entity(&a.id));
        assert!(!graph.delete_entity(&a.id));
        assert!(graph.find_entity_by_name("trainer").is_none());
        assert_eq!(graph.relation_count(), 0);
        assert!(graph.find_relations_for_entity(&b.id).incoming.is_empty());
        assert!(graph.find_entities_by_type("person").iter().all(|e| e.id != a.id));
    }
}
