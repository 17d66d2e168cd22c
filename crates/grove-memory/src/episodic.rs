//! Episodic Memory Store.
//!
//! Holds timestamped event records ("episodes") and the indices used to
//! narrow queries, and implements the strength lifecycle that models
//! forgetting and consolidation.
//!
//! # Indices
//!
//! | index       | key                    | value              |
//! |-------------|------------------------|--------------------|
//! | `by_user`   | owning user id         | memory ids         |
//! | `by_entity` | related entity id      | memory ids         |
//! | `by_task`   | related task id        | memory ids         |
//! | `by_node`   | related node id        | memory ids         |
//! | `by_tag`    | lowercased tag         | memory ids         |
//! | `by_date`   | UTC calendar date      | memory ids         |
//!
//! # Strength lifecycle
//!
//! Every read ([`EpisodicStore::retrieve`], every hit of
//! [`EpisodicStore::query`]) bumps the access count and applies the
//! strengthening rule: `WEAK`/`FADING` become `MEDIUM`, and any memory read
//! more than five times becomes `STRONG`.
//!
//! [`EpisodicStore::run_maintenance`] relabels a user's memories from how long
//! ago they were last read (never-read memories count as infinitely old):
//!
//! | condition                                   | new strength |
//! |---------------------------------------------|--------------|
//! | days > 180 and access_count < 3             | `FADING`     |
//! | days > 90 and access_count < 5              | `WEAK`       |
//! | days < 30 and access_count > 5              | `STRONG`     |
//! | days < 60 and strength is `WEAK`/`FADING`   | `MEDIUM`     |
//!
//! The first matching row wins.  Nothing is ever deleted by maintenance.
//!
//! # Example
//!
//! ```rust
//! use grove_memory::episodic::{EpisodicStore, NewEpisode};
//! use grove_types::MemoryQuery;
//!
//! let mut store = EpisodicStore::new();
//! let m = store
//!     .create(NewEpisode::new("u1", "Finished the report", "Wrapped up Q3 numbers").with_significance(0.9))
//!     .unwrap();
//!
//! let hits = store.query(&MemoryQuery::for_user("u1").with_keywords(["report"]));
//! assert_eq!(hits[0].id, m.id);
//! assert_eq!(hits[0].access_count, 2);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use grove_types::{EpisodicMemory, MemoryError, MemoryQuery, MemoryStrength, clamp_unit};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Inputs and outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for [`EpisodicStore::create`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEpisode {
    /// Owning user; must not be empty.
    pub user_id: String,
    /// Short headline; must not be empty.
    pub title: String,
    /// Free-text body searched by keyword queries.
    pub description: String,
    /// Entities the episode involves, indexed for entity lookups.
    #[serde(default)]
    pub related_entities: Vec<Uuid>,
    /// Collaborator task ids, indexed for task lookups.
    #[serde(default)]
    pub related_tasks: Vec<String>,
    /// Collaborator goal-tree node ids, indexed for node lookups.
    #[serde(default)]
    pub related_nodes: Vec<String>,
    /// Where it happened; blank values are dropped.
    #[serde(default)]
    pub location: Option<String>,
    /// Clamped to `[-1.0, 1.0]`.
    #[serde(default)]
    pub emotional_valence: f32,
    /// Clamped to `[0.0, 1.0]`; defaults to `0.5`.
    #[serde(default = "default_arousal")]
    pub emotional_arousal: f32,
    /// Free labels, stored lowercased.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Clamped to `[0.0, 1.0]`; defaults to `0.5`.
    #[serde(default = "default_significance")]
    pub significance: f32,
    /// Defaults to the creation time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_arousal() -> f32 {
    0.5
}

fn default_significance() -> f32 {
    0.5
}

impl NewEpisode {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            description: description.into(),
            related_entities: Vec::new(),
            related_tasks: Vec::new(),
            related_nodes: Vec::new(),
            location: None,
            emotional_valence: 0.0,
            emotional_arousal: default_arousal(),
            tags: Vec::new(),
            significance: default_significance(),
            timestamp: None,
        }
    }

    pub fn with_entities(mut self, ids: Vec<Uuid>) -> Self {
        self.related_entities = ids;
        self
    }

    pub fn with_tasks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_tasks = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nodes<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_nodes = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_emotion(mut self, valence: f32, arousal: f32) -> Self {
        self.emotional_valence = valence;
        self.emotional_arousal = arousal;
        self
    }

    pub fn with_significance(mut self, significance: f32) -> Self {
        self.significance = significance;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Field updates for [`EpisodicStore::update`].  `None` / empty fields are
/// left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeUpdate {
    /// Replacement headline; must not be blank.
    pub title: Option<String>,
    pub description: Option<String>,
    /// Replacement location; a blank value clears it.
    pub location: Option<String>,
    /// Moves the memory to another day in the date index.
    pub timestamp: Option<DateTime<Utc>>,
    /// Clamped to `[-1.0, 1.0]`.
    pub emotional_valence: Option<f32>,
    /// Clamped to `[0.0, 1.0]`.
    pub emotional_arousal: Option<f32>,
    /// Clamped to `[0.0, 1.0]`.
    pub significance: Option<f32>,
    /// Tags to add (lowercased).
    #[serde(default)]
    pub add_tags: Vec<String>,
    /// Tags to remove, matched case-insensitively.
    #[serde(default)]
    pub remove_tags: Vec<String>,
    /// Entity ids to link in addition to the existing ones.
    #[serde(default)]
    pub add_entities: Vec<Uuid>,
    /// Task ids to link in addition to the existing ones.
    #[serde(default)]
    pub add_tasks: Vec<String>,
    /// Node ids to link in addition to the existing ones.
    #[serde(default)]
    pub add_nodes: Vec<String>,
}

/// Outcome of one [`EpisodicStore::run_maintenance`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub examined: usize,
    pub strengthened: usize,
    pub weakened: usize,
    /// Significant memories (> 0.7) that ended the pass `WEAK` or `FADING`.
    pub needs_reinforcement: Vec<Uuid>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Strength rules
// ─────────────────────────────────────────────────────────────────────────────

/// Significance above which a faint memory is flagged for reinforcement.
pub const REINFORCEMENT_SIGNIFICANCE: f32 = 0.7;

fn strengthen(memory: &mut EpisodicMemory) {
    if memory.strength.is_faint() {
        memory.strength = MemoryStrength::Medium;
    }
    if memory.access_count > 5 {
        memory.strength = MemoryStrength::Strong;
    }
}

fn touch(memory: &mut EpisodicMemory, now: DateTime<Utc>) {
    memory.access_count = memory.access_count.saturating_add(1);
    memory.last_accessed = Some(now);
    strengthen(memory);
}

/// Maintenance relabel for a memory last read `days` ago.
fn decayed_strength(memory: &EpisodicMemory, days: f64) -> Option<MemoryStrength> {
    let count = memory.access_count;
    if days > 180.0 && count < 3 {
        Some(MemoryStrength::Fading)
    } else if days > 90.0 && count < 5 {
        Some(MemoryStrength::Weak)
    } else if days < 30.0 && count > 5 {
        Some(MemoryStrength::Strong)
    } else if days < 60.0 && memory.strength.is_faint() {
        Some(MemoryStrength::Medium)
    } else {
        None
    }
}

fn days_since(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last {
        Some(at) => (now - at).num_seconds() as f64 / 86_400.0,
        None => f64::INFINITY,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EpisodicStore
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory episodic store with per-attribute indices.
#[derive(Debug, Default)]
pub struct EpisodicStore {
    memories: HashMap<Uuid, EpisodicMemory>,
    by_user: HashMap<String, HashSet<Uuid>>,
    by_entity: HashMap<Uuid, HashSet<Uuid>>,
    by_task: HashMap<String, HashSet<Uuid>>,
    by_node: HashMap<String, HashSet<Uuid>>,
    by_tag: HashMap<String, HashSet<Uuid>>,
    by_date: BTreeMap<NaiveDate, HashSet<Uuid>>,
}

fn index_insert<K: std::hash::Hash + Eq>(index: &mut HashMap<K, HashSet<Uuid>>, key: K, id: Uuid) {
    index.entry(key).or_default().insert(id);
}

fn index_remove<K: std::hash::Hash + Eq>(index: &mut HashMap<K, HashSet<Uuid>>, key: &K, id: &Uuid) {
    if let Some(set) = index.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

impl EpisodicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new episode.  It starts `STRONG` with an access count of 1.
    pub fn create(&mut self, new: NewEpisode) -> Result<EpisodicMemory, MemoryError> {
        if new.user_id.trim().is_empty() {
            return Err(MemoryError::missing("user_id"));
        }
        if new.title.trim().is_empty() {
            return Err(MemoryError::missing("title"));
        }
        let memory = EpisodicMemory {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            title: new.title.trim().to_string(),
            description: new.description,
            timestamp: new.timestamp.unwrap_or_else(Utc::now),
            location: new.location.filter(|l| !l.trim().is_empty()),
            related_entities: new.related_entities.into_iter().collect(),
            related_tasks: new.related_tasks.into_iter().filter(|t| !t.is_empty()).collect(),
            related_nodes: new.related_nodes.into_iter().filter(|n| !n.is_empty()).collect(),
            emotional_valence: clamp_unit(new.emotional_valence, -1.0, 1.0),
            emotional_arousal: clamp_unit(new.emotional_arousal, 0.0, 1.0),
            strength: MemoryStrength::Strong,
            access_count: 1,
            last_accessed: None,
            tags: new
                .tags
                .iter()
                .map(|t| normalize_tag(t))
                .filter(|t| !t.is_empty())
                .collect(),
            significance: clamp_unit(new.significance, 0.0, 1.0),
        };
        self.index(&memory);
        debug!(memory_id = %memory.id, user = %memory.user_id, "episodic memory created");
        self.memories.insert(memory.id, memory.clone());
        Ok(memory)
    }

    fn index(&mut self, m: &EpisodicMemory) {
        index_insert(&mut self.by_user, m.user_id.clone(), m.id);
        for e in &m.related_entities {
            index_insert(&mut self.by_entity, *e, m.id);
        }
        for t in &m.related_tasks {
            index_insert(&mut self.by_task, t.clone(), m.id);
        }
        for n in &m.related_nodes {
            index_insert(&mut self.by_node, n.clone(), m.id);
        }
        for tag in &m.tags {
            index_insert(&mut self.by_tag, tag.clone(), m.id);
        }
        self.by_date.entry(m.timestamp.date_naive()).or_default().insert(m.id);
    }

    fn deindex(&mut self, m: &EpisodicMemory) {
        index_remove(&mut self.by_user, &m.user_id, &m.id);
        for e in &m.related_entities {
            index_remove(&mut self.by_entity, e, &m.id);
        }
        for t in &m.related_tasks {
            index_remove(&mut self.by_task, t, &m.id);
        }
        for n in &m.related_nodes {
            index_remove(&mut self.by_node, n, &m.id);
        }
        for tag in &m.tags {
            index_remove(&mut self.by_tag, tag, &m.id);
        }
        let date = m.timestamp.date_naive();
        if let Some(set) = self.by_date.get_mut(&date) {
            set.remove(&m.id);
            if set.is_empty() {
                self.by_date.remove(&date);
            }
        }
    }

    /// Read a memory back, applying the access side effect.
    pub fn retrieve(&mut self, id: &Uuid) -> Option<EpisodicMemory> {
        let memory = self.memories.get_mut(id)?;
        touch(memory, Utc::now());
        Some(memory.clone())
    }

    /// Borrow a memory without counting it as an access.
    pub fn peek(&self, id: &Uuid) -> Option<&EpisodicMemory> {
        self.memories.get(id)
    }

    /// Run the filter pipeline described by `query`.
    ///
    /// Stages narrow a working id set in order: user, entities, time range,
    /// location, significance threshold, valence range, keywords.  Results
    /// are sorted by `(significance, timestamp)` descending, truncated to
    /// `query.limit`, and each hit counts as an access.
    pub fn query(&mut self, query: &MemoryQuery) -> Vec<EpisodicMemory> {
        let Some(owned) = self.by_user.get(&query.user_id) else {
            return Vec::new();
        };
        let mut ids: HashSet<Uuid> = owned.clone();

        if !query.entity_ids.is_empty() {
            let tagged: HashSet<Uuid> = query
                .entity_ids
                .iter()
                .filter_map(|e| self.by_entity.get(e))
                .flatten()
                .copied()
                .collect();
            ids.retain(|id| tagged.contains(id));
        }

        if let Some(range) = query.time_range {
            if range.start > range.end {
                return Vec::new();
            }
            let in_days: HashSet<Uuid> = self
                .by_date
                .range(range.start.date_naive()..=range.end.date_naive())
                .flat_map(|(_, set)| set.iter().copied())
                .collect();
            ids.retain(|id| in_days.contains(id) && range.contains(self.memories[id].timestamp));
        }

        if let Some(location) = query.location.as_deref().map(str::to_lowercase) {
            ids.retain(|id| {
                self.memories[id]
                    .location
                    .as_deref()
                    .is_some_and(|l| l.to_lowercase().contains(&location))
            });
        }

        if query.significance_threshold > 0.0 {
            ids.retain(|id| self.memories[id].significance >= query.significance_threshold);
        }

        if let Some((min, max)) = query.valence_range {
            ids.retain(|id| {
                let v = self.memories[id].emotional_valence;
                v >= min && v <= max
            });
        }

        let keywords: Vec<String> = query
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if !keywords.is_empty() {
            ids.retain(|id| {
                let m = &self.memories[id];
                let text = format!("{} {}", m.title, m.description).to_lowercase();
                keywords.iter().any(|k| text.contains(k.as_str()))
            });
        }

        let mut ranked: Vec<Uuid> = ids.into_iter().collect();
        self.sort_by_rank(&mut ranked);
        ranked.truncate(query.limit);

        let now = Utc::now();
        ranked
            .iter()
            .filter_map(|id| {
                let m = self.memories.get_mut(id)?;
                touch(m, now);
                Some(m.clone())
            })
            .collect()
    }

    fn sort_by_rank(&self, ids: &mut [Uuid]) {
        ids.sort_by(|a, b| {
            let (ma, mb) = (&self.memories[a], &self.memories[b]);
            mb.significance
                .total_cmp(&ma.significance)
                .then(mb.timestamp.cmp(&ma.timestamp))
        });
    }

    /// Apply `update` to a memory: deindex, mutate, reindex, then count the
    /// write as an access.
    pub fn update(
        &mut self,
        id: &Uuid,
        update: EpisodeUpdate,
    ) -> Result<Option<EpisodicMemory>, MemoryError> {
        if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(MemoryError::missing("title"));
        }
        let Some(current) = self.memories.get(id).cloned() else {
            return Ok(None);
        };
        self.deindex(&current);
        let mut m = current;
        if let Some(title) = update.title {
            m.title = title.trim().to_string();
        }
        if let Some(description) = update.description {
            m.description = description;
        }
        if let Some(location) = update.location {
            m.location = Some(location).filter(|l| !l.trim().is_empty());
        }
        if let Some(timestamp) = update.timestamp {
            m.timestamp = timestamp;
        }
        if let Some(v) = update.emotional_valence {
            m.emotional_valence = clamp_unit(v, -1.0, 1.0);
        }
        if let Some(a) = update.emotional_arousal {
            m.emotional_arousal = clamp_unit(a, 0.0, 1.0);
        }
        if let Some(s) = update.significance {
            m.significance = clamp_unit(s, 0.0, 1.0);
        }
        for tag in &update.remove_tags {
            m.tags.remove(&normalize_tag(tag));
        }
        m.tags.extend(
            update
                .add_tags
                .iter()
                .map(|t| normalize_tag(t))
                .filter(|t| !t.is_empty()),
        );
        m.related_entities.extend(update.add_entities);
        m.related_tasks.extend(update.add_tasks);
        m.related_nodes.extend(update.add_nodes);
        touch(&mut m, Utc::now());
        self.index(&m);
        self.memories.insert(*id, m.clone());
        Ok(Some(m))
    }

    /// Remove a memory from every index and then from the store.
    pub fn delete(&mut self, id: &Uuid) -> bool {
        let Some(memory) = self.memories.get(id).cloned() else {
            return false;
        };
        self.deindex(&memory);
        self.memories.remove(id);
        debug!(memory_id = %id, "episodic memory deleted");
        true
    }

    /// Memories of the same user sharing entities, tasks, nodes or tags with
    /// `id`, most overlapping first (ties broken by significance).
    pub fn related(&self, id: &Uuid, limit: usize) -> Vec<EpisodicMemory> {
        let Some(source) = self.memories.get(id) else {
            return Vec::new();
        };
        let mut candidates: HashSet<Uuid> = HashSet::new();
        for e in &source.related_entities {
            candidates.extend(self.by_entity.get(e).into_iter().flatten());
        }
        for t in &source.related_tasks {
            candidates.extend(self.by_task.get(t).into_iter().flatten());
        }
        for n in &source.related_nodes {
            candidates.extend(self.by_node.get(n).into_iter().flatten());
        }
        for tag in &source.tags {
            candidates.extend(self.by_tag.get(tag).into_iter().flatten());
        }
        candidates.remove(id);

        let mut scored: Vec<(usize, &EpisodicMemory)> = candidates
            .iter()
            .filter_map(|cid| self.memories.get(cid))
            .filter(|m| m.user_id == source.user_id)
            .map(|m| (source.overlap_with(m), m))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.significance.total_cmp(&a.1.significance)));
        scored.into_iter().take(limit).map(|(_, m)| m.clone()).collect()
    }

    /// Memories indexed under `task_id`, newest first.
    pub fn memories_for_task(&self, task_id: &str) -> Vec<&EpisodicMemory> {
        self.collect_sorted(self.by_task.get(task_id))
    }

    /// Memories indexed under `node_id`, newest first.
    pub fn memories_for_node(&self, node_id: &str) -> Vec<&EpisodicMemory> {
        self.collect_sorted(self.by_node.get(node_id))
    }

    /// Memories indexed under `tag` (case-insensitive), newest first.
    pub fn memories_with_tag(&self, tag: &str) -> Vec<&EpisodicMemory> {
        self.collect_sorted(self.by_tag.get(&normalize_tag(tag)))
    }

    /// All memories owned by `user_id`, newest first, without side effects.
    pub fn memories_for_user(&self, user_id: &str) -> Vec<&EpisodicMemory> {
        self.collect_sorted(self.by_user.get(user_id))
    }

    fn collect_sorted(&self, ids: Option<&HashSet<Uuid>>) -> Vec<&EpisodicMemory> {
        let mut found: Vec<&EpisodicMemory> = ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.memories.get(id))
            .collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found
    }

    /// Relabel every memory of `user_id` according to the decay table.
    pub fn run_maintenance(&mut self, user_id: &str) -> MaintenanceReport {
        self.run_maintenance_at(user_id, Utc::now())
    }

    /// [`run_maintenance`](Self::run_maintenance) with an explicit clock.
    pub fn run_maintenance_at(&mut self, user_id: &str, now: DateTime<Utc>) -> MaintenanceReport {
        let ids: BTreeSet<Uuid> = self.by_user.get(user_id).into_iter().flatten().copied().collect();
        let mut report = MaintenanceReport {
            examined: ids.len(),
            ..Default::default()
        };
        for id in ids {
            let Some(m) = self.memories.get_mut(&id) else {
                continue;
            };
            let days = days_since(m.last_accessed, now);
            if let Some(next) = decayed_strength(m, days) {
                let before = m.strength.rank();
                m.strength = next;
                if next.rank() > before {
                    report.strengthened += 1;
                } else if next.rank() < before {
                    report.weakened += 1;
                }
            }
            if m.significance > REINFORCEMENT_SIGNIFICANCE && m.strength.is_faint() {
                report.needs_reinforcement.push(id);
            }
        }
        info!(
            user = %user_id,
            examined = report.examined,
            strengthened = report.strengthened,
            weakened = report.weakened,
            needs_reinforcement = report.needs_reinforcement.len(),
            "episodic maintenance finished"
        );
        report
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use grove_types::TimeRange;

    fn episode(store: &mut EpisodicStore, title: &str, significance: f32) -> EpisodicMemory {
        store
            .create(NewEpisode::new("u1", title, format!("{title} details")).with_significance(significance))
            .unwrap()
    }

    fn set_last_accessed(store: &mut EpisodicStore, id: &Uuid, at: Option<DateTime<Utc>>) {
        store.memories.get_mut(id).unwrap().last_accessed = at;
    }

    // ── create / retrieve ────────────────────────────────────────────────────

    #[test]
    fn create_then_retrieve_round_trip() {
        let mut store = EpisodicStore::new();
        let entity = Uuid::new_v4();
        let created = store
            .create(
                NewEpisode::new("u1", "Ran 5k", "Morning run by the river")
                    .with_entities(vec![entity])
                    .with_tasks(["t1"])
                    .with_nodes(["n1"])
                    .with_tags(["Health"])
                    .with_location("Riverside Park")
                    .with_emotion(0.6, 0.7)
                    .with_significance(0.8),
            )
            .unwrap();
        assert_eq!(created.strength, MemoryStrength::Strong);
        assert_eq!(created.access_count, 1);
        assert!(created.last_accessed.is_none());

        let read = store.retrieve(&created.id).unwrap();
        assert_eq!(read.title, "Ran 5k");
        assert_eq!(read.location.as_deref(), Some("Riverside Park"));
        assert!(read.related_entities.contains(&entity));
        assert!(read.tags.contains("health"));
        assert!((read.significance - 0.8).abs() < 1e-6);
        assert_eq!(read.access_count, 2);
        assert!(read.last_accessed.is_some());

        let again = store.retrieve(&created.id).unwrap();
        assert_eq!(again.access_count, 3);
    }

    #[test]
    fn create_requires_user_and_title() {
        let mut store = EpisodicStore::new();
        assert!(matches!(
            store.create(NewEpisode::new("", "t", "d")).unwrap_err(),
            MemoryError::Validation(_)
        ));
        assert!(matches!(
            store.create(NewEpisode::new("u1", "  ", "d")).unwrap_err(),
            MemoryError::Validation(_)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn create_clamps_emotion_and_significance() {
        let mut store = EpisodicStore::new();
        let m = store
            .create(NewEpisode::new("u1", "x", "y").with_emotion(-4.0, 2.0).with_significance(1.5))
            .unwrap();
        assert_eq!(m.emotional_valence, -1.0);
        assert_eq!(m.emotional_arousal, 1.0);
        assert_eq!(m.significance, 1.0);
    }

    #[test]
    fn retrieve_unknown_is_none() {
        let mut store = EpisodicStore::new();
        assert!(store.retrieve(&Uuid::new_v4()).is_none());
    }

    // ── query ────────────────────────────────────────────────────────────────

    #[test]
    fn significance_threshold_filters_and_orders() {
        let mut store = EpisodicStore::new();
        let t = Utc::now() - Duration::hours(3);
        for (i, sig) in [0.3f32, 0.6, 0.9].into_iter().enumerate() {
            store
                .create(
                    NewEpisode::new("u1", format!("task {i}"), "did a task")
                        .with_tags(["task"])
                        .with_significance(sig)
                        .at(t + Duration::hours(i as i64)),
                )
                .unwrap();
        }
        let hits = store.query(&MemoryQuery::for_user("u1").with_significance(0.5).with_limit(10));
        assert_eq!(hits.len(), 2);
        assert!((hits[0].significance - 0.9).abs() < 1e-6);
        assert_eq!(hits[0].timestamp, t + Duration::hours(2));
        assert!((hits[1].significance - 0.6).abs() < 1e-6);
        assert_eq!(hits[1].timestamp, t + Duration::hours(1));
    }

    #[test]
    fn threshold_keeps_equal_significance() {
        let mut store = EpisodicStore::new();
        for sig in [0.2f32, 0.5, 0.9] {
            episode(&mut store, &format!("m{sig}"), sig);
        }
        let hits = store.query(&MemoryQuery::for_user("u1").with_significance(0.5));
        let sigs: Vec<f32> = hits.iter().map(|m| m.significance).collect();
        assert_eq!(sigs, vec![0.9, 0.5]);
    }

    #[test]
    fn query_is_user_scoped() {
        let mut store = EpisodicStore::new();
        episode(&mut store, "mine", 0.5);
        store.create(NewEpisode::new("u2", "theirs", "")).unwrap();
        assert_eq!(store.query(&MemoryQuery::for_user("u1")).len(), 1);
        assert!(store.query(&MemoryQuery::for_user("nobody")).is_empty());
    }

    #[test]
    fn query_by_entity_unions_entity_indices() {
        let mut store = EpisodicStore::new();
        let (e1, e2) = (Uuid::new_v4(), Uuid::new_v4());
        store.create(NewEpisode::new("u1", "a", "").with_entities(vec![e1])).unwrap();
        store.create(NewEpisode::new("u1", "b", "").with_entities(vec![e2])).unwrap();
        store.create(NewEpisode::new("u1", "c", "")).unwrap();
        let hits = store.query(&MemoryQuery::for_user("u1").with_entities(vec![e1, e2]));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn query_by_time_range_location_and_keywords() {
        let mut store = EpisodicStore::new();
        let now = Utc::now();
        store
            .create(
                NewEpisode::new("u1", "Old gym session", "lifted weights")
                    .with_location("Downtown Gym")
                    .at(now - Duration::days(10)),
            )
            .unwrap();
        let recent = store
            .create(
                NewEpisode::new("u1", "Gym session", "Lifted weights")
                    .with_location("Downtown Gym")
                    .at(now - Duration::hours(2)),
            )
            .unwrap();
        store
            .create(NewEpisode::new("u1", "Reading", "novel").at(now - Duration::hours(1)))
            .unwrap();

        let q = MemoryQuery::for_user("u1")
            .with_time_range(TimeRange::trailing_days(now, 1))
            .with_location("downtown")
            .with_keywords(["WEIGHTS"]);
        let hits = store.query(&q);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, recent.id);
    }

    #[test]
    fn query_by_valence_range() {
        let mut store = EpisodicStore::new();
        store.create(NewEpisode::new("u1", "happy", "").with_emotion(0.8, 0.5)).unwrap();
        store.create(NewEpisode::new("u1", "sad", "").with_emotion(-0.7, 0.5)).unwrap();
        let hits = store.query(&MemoryQuery::for_user("u1").with_valence(0.5, 1.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "happy");
    }

    #[test]
    fn query_hits_count_as_access() {
        let mut store = EpisodicStore::new();
        let m = episode(&mut store, "thing", 0.5);
        store.query(&MemoryQuery::for_user("u1"));
        assert_eq!(store.peek(&m.id).unwrap().access_count, 2);
    }

    #[test]
    fn query_limit_truncates() {
        let mut store = EpisodicStore::new();
        for i in 0..5 {
            episode(&mut store, &format!("m{i}"), 0.5);
        }
        assert_eq!(store.query(&MemoryQuery::for_user("u1").with_limit(3)).len(), 3);
    }

    // ── update / delete ──────────────────────────────────────────────────────

    #[test]
    fn update_reindexes_tags_and_counts_access() {
        let mut store = EpisodicStore::new();
        let m = store.create(NewEpisode::new("u1", "x", "").with_tags(["old"])).unwrap();
        let updated = store
            .update(
                &m.id,
                EpisodeUpdate {
                    add_tags: vec!["New".into()],
                    remove_tags: vec!["old".into()],
                    significance: Some(0.9),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.access_count, 2);
        assert!(store.memories_with_tag("old").is_empty());
        assert_eq!(store.memories_with_tag("new").len(), 1);
        assert!((updated.significance - 0.9).abs() < 1e-6);
    }

    #[test]
    fn update_moves_date_index() {
        let mut store = EpisodicStore::new();
        let now = Utc::now();
        let m = store.create(NewEpisode::new("u1", "x", "").at(now)).unwrap();
        let earlier = now - Duration::days(40);
        store
            .update(&m.id, EpisodeUpdate { timestamp: Some(earlier), ..Default::default() })
            .unwrap();
        let q = MemoryQuery::for_user("u1").with_time_range(TimeRange::trailing_days(now, 7));
        assert!(store.query(&q).is_empty());
    }

    #[test]
    fn update_rejects_empty_title_and_ignores_unknown() {
        let mut store = EpisodicStore::new();
        let m = episode(&mut store, "x", 0.5);
        assert!(store
            .update(&m.id, EpisodeUpdate { title: Some(" ".into()), ..Default::default() })
            .is_err());
        assert!(store.update(&Uuid::new_v4(), EpisodeUpdate::default()).unwrap().is_none());
    }

    #[test]
    fn delete_removes_from_every_index() {
        let mut store = EpisodicStore::new();
        let e = Uuid::new_v4();
        let m = store
            .create(
                NewEpisode::new("u1", "x", "")
                    .with_entities(vec![e])
                    .with_tasks(["t1"])
                    .with_nodes(["n1"])
                    .with_tags(["tag"]),
            )
            .unwrap();
        assert!(store.delete(&m.id));
        assert!(!store.delete(&m.id));
        assert!(store.memories_for_task("t1").is_empty());
        assert!(store.memories_for_node("n1").is_empty());
        assert!(store.memories_with_tag("tag").is_empty());
        assert!(store.memories_for_user("u1").is_empty());
        assert!(store.query(&MemoryQuery::for_user("u1").with_entities(vec![e])).is_empty());
        assert!(store.by_date.is_empty());
    }

    // ── related ──────────────────────────────────────────────────────────────

    #[test]
    fn related_ranks_by_overlap_then_significance() {
        let mut store = EpisodicStore::new();
        let source = store
            .create(NewEpisode::new("u1", "src", "").with_tasks(["t1"]).with_tags(["focus", "work"]))
            .unwrap();
        let two = store
            .create(
                NewEpisode::new("u1", "two", "")
                    .with_tasks(["t1"])
                    .with_tags(["focus"])
                    .with_significance(0.1),
            )
            .unwrap();
        let one_hi = store
            .create(NewEpisode::new("u1", "one-hi", "").with_tags(["work"]).with_significance(0.9))
            .unwrap();
        let one_lo = store
            .create(NewEpisode::new("u1", "one-lo", "").with_tags(["work"]).with_significance(0.2))
            .unwrap();
        store.create(NewEpisode::new("u1", "none", "").with_tags(["other"])).unwrap();
        store.create(NewEpisode::new("u2", "foreign", "").with_tags(["work"])).unwrap();

        let related = store.related(&source.id, 10);
        let ids: Vec<Uuid> = related.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![two.id, one_hi.id, one_lo.id]);
        assert_eq!(store.related(&source.id, 1).len(), 1);
    }

    // ── maintenance ──────────────────────────────────────────────────────────

    #[test]
    fn stale_memory_fades_then_recovers_on_read() {
        let mut store = EpisodicStore::new();
        let m = episode(&mut store, "old", 0.9);
        set_last_accessed(&mut store, &m.id, Some(Utc::now() - Duration::days(200)));

        let report = store.run_maintenance("u1");
        assert_eq!(store.peek(&m.id).unwrap().strength, MemoryStrength::Fading);
        assert_eq!(report.weakened, 1);
        assert_eq!(report.needs_reinforcement, vec![m.id]);

        let read = store.retrieve(&m.id).unwrap();
        assert_eq!(read.access_count, 2);
        assert_eq!(read.strength, MemoryStrength::Medium);
    }

    #[test]
    fn frequently_read_memory_jumps_to_strong() {
        let mut store = EpisodicStore::new();
        let m = episode(&mut store, "hot", 0.5);
        store.memories.get_mut(&m.id).unwrap().strength = MemoryStrength::Weak;
        for _ in 0..4 {
            store.retrieve(&m.id);
        }
        let before = store.peek(&m.id).unwrap();
        assert_eq!(before.access_count, 5);
        assert_eq!(before.strength, MemoryStrength::Medium);
        let read = store.retrieve(&m.id).unwrap();
        assert_eq!(read.strength, MemoryStrength::Strong);
    }

    #[test]
    fn maintenance_rules_apply_in_order() {
        let mut store = EpisodicStore::new();
        let now = Utc::now();

        let weak = episode(&mut store, "weak", 0.8);
        set_last_accessed(&mut store, &weak.id, Some(now - Duration::days(100)));

        let busy = episode(&mut store, "busy", 0.5);
        {
            let m = store.memories.get_mut(&busy.id).unwrap();
            m.access_count = 6;
            m.strength = MemoryStrength::Medium;
            m.last_accessed = Some(now - Duration::days(5));
        }

        let recovering = episode(&mut store, "recovering", 0.5);
        {
            let m = store.memories.get_mut(&recovering.id).unwrap();
            m.strength = MemoryStrength::Fading;
            m.last_accessed = Some(now - Duration::days(45));
        }

        let untouched = episode(&mut store, "untouched", 0.5);
        set_last_accessed(&mut store, &untouched.id, Some(now - Duration::days(70)));

        let report = store.run_maintenance_at("u1", now);
        assert_eq!(report.examined, 4);
        assert_eq!(store.peek(&weak.id).unwrap().strength, MemoryStrength::Weak);
        assert_eq!(store.peek(&busy.id).unwrap().strength, MemoryStrength::Strong);
        assert_eq!(store.peek(&recovering.id).unwrap().strength, MemoryStrength::Medium);
        assert_eq!(store.peek(&untouched.id).unwrap().strength, MemoryStrength::Strong);
        assert_eq!(report.strengthened, 2);
        assert_eq!(report.weakened, 1);
        assert_eq!(report.needs_reinforcement, vec![weak.id]);
    }

    #[test]
    fn never_read_memory_counts_as_infinitely_old() {
        let mut store = EpisodicStore::new();
        let m = episode(&mut store, "fresh", 0.5);
        store.run_maintenance("u1");
        assert_eq!(store.peek(&m.id).unwrap().strength, MemoryStrength::Fading);
    }

    #[test]
    fn maintenance_ignores_other_users() {
        let mut store = EpisodicStore::new();
        let other = store.create(NewEpisode::new("u2", "x", "")).unwrap();
        let report = store.run_maintenance("u1");
        assert_eq!(report, MaintenanceReport::default());
        assert_eq!(store.peek(&other.id).unwrap().strength, MemoryStrength::Strong);
    }
}
