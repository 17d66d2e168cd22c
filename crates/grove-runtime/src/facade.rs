//! Memory Facade – the only entry point collaborators call.
//!
//! Translates domain events (task attempts, node interactions, stated
//! preferences, conversations) into episodic memories and, when the event
//! carries a signal worth keeping, into semantic concepts.  Also composes
//! retrieval and [`insight`](crate::insight) synthesis into enrichment
//! payloads for tasks and nodes.
//!
//! ## Concurrency
//!
//! State is sharded by user.  A registry hands out one
//! `Arc<Mutex<UserMemory>>` per user id; every operation holds that user's
//! lock for its whole (synchronous) body, so index and primary-store writes
//! are atomic with respect to other calls for the same user.  Different users
//! only meet on the registry's read lock.
//!
//! ## Significance
//!
//! | Event | Base | Bonus |
//! |---|---|---|
//! | task | `0.3 + 0.15 · priority rank` | `+0.1` when completed, feedback length |
//! | node | `0.8` for milestones, else `0.3 + 0.1 · priority rank` | feedback length |
//! | preference | `0.4 + 0.4 · strength` | – |
//! | conversation | `0.4 + 0.02 · participants` (max `+0.1`) | feedback length |
//!
//! The feedback bonus is `min(0.2, chars / 500)`.  Results are clamped to
//! `[0.0, 1.0]`.
//!
//! # Example
//!
//! ```rust
//! use grove_runtime::{EngineConfig, MemoryFacade};
//! use grove_types::{TaskExperience, TaskOutcome, TaskSnapshot};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let facade = MemoryFacade::new(EngineConfig::default());
//!     let task = TaskSnapshot {
//!         id: "t1".into(),
//!         title: "Write chapter one".into(),
//!         ..Default::default()
//!     };
//!     let remembered = facade
//!         .remember_task_experience("u1", &task, &TaskExperience::new(TaskOutcome::Completed))
//!         .await
//!         .unwrap();
//!     assert!(remembered.concept_id.is_some());
//! });
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use grove_memory::retrieval::extract_keywords;
use grove_memory::{
    ConceptUpdate, EntityMemories, MaintenanceReport, NaturalQueryResult, NewConcept, NewEntity,
    NewEpisode, SemanticStore, TaskPatterns, UserMemory,
};
use grove_types::{
    Attributes, ConceptView, Conversation, EpisodicMemory, MemoryContext, MemoryError,
    MemoryInsight, MemoryQuery, MemoryView, NodeInteraction, NodeSnapshot, Remembered,
    TaskExperience, TaskOutcome, TaskSnapshot, UserPreference, clamp_unit,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::insight;

/// Attribute key written by the `enhance_*_with_memory` operations.
pub const RELATED_MEMORIES_KEY: &str = "related_memories";
/// Attribute key written by the `enhance_*_with_memory` operations.
pub const MEMORY_INSIGHTS_KEY: &str = "memory_insights";

const FEEDBACK_BONUS_CAP: f32 = 0.2;
const MILESTONE_SIGNIFICANCE: f32 = 0.8;

/// Output of [`MemoryFacade::retrieve_memory_based_context`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContextualMemories {
    pub memories: Vec<MemoryView>,
    pub insights: Vec<MemoryInsight>,
}

type Shard = Arc<Mutex<UserMemory>>;

pub struct MemoryFacade {
    config: EngineConfig,
    shards: RwLock<HashMap<String, Shard>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scoring helpers
// ─────────────────────────────────────────────────────────────────────────────

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn feedback_bonus(feedback: Option<&str>) -> f32 {
    non_empty(feedback).map_or(0.0, |f| (f.chars().count() as f32 / 500.0).min(FEEDBACK_BONUS_CAP))
}

fn task_significance(task: &TaskSnapshot, experience: &TaskExperience) -> f32 {
    let mut score = 0.3 + 0.15 * f32::from(task.priority.rank());
    if experience.outcome == TaskOutcome::Completed {
        score += 0.1;
    }
    clamp_unit(score + feedback_bonus(experience.feedback.as_deref()), 0.0, 1.0)
}

fn node_significance(node: &NodeSnapshot, interaction: &NodeInteraction) -> f32 {
    let base = if node.is_milestone {
        MILESTONE_SIGNIFICANCE
    } else {
        0.3 + 0.1 * f32::from(node.priority.rank())
    };
    clamp_unit(base + feedback_bonus(interaction.feedback.as_deref()), 0.0, 1.0)
}

fn outcome_valence(outcome: TaskOutcome) -> f32 {
    match outcome {
        TaskOutcome::Completed => 0.5,
        TaskOutcome::Failed => -0.4,
        TaskOutcome::Skipped => -0.1,
        TaskOutcome::InProgress => 0.1,
    }
}

fn ensure_user(user_id: &str) -> Result<(), MemoryError> {
    if user_id.trim().is_empty() {
        Err(MemoryError::missing("user_id"))
    } else {
        Ok(())
    }
}

/// Create (or find) a concept and make sure `memory_id` is among its sources.
fn derive_concept(
    semantic: &mut SemanticStore,
    new: NewConcept,
    memory_id: Uuid,
) -> Result<Uuid, MemoryError> {
    let concept = semantic.create_concept(new.with_sources(vec![memory_id]))?;
    if !concept.source_memories.contains(&memory_id) {
        semantic.update_concept(
            &concept.id,
            ConceptUpdate {
                add_sources: vec![memory_id],
                ..Default::default()
            },
        )?;
    }
    Ok(concept.id)
}

fn summarize(memory: &EpisodicMemory) -> Value {
    json!({
        "id": memory.id,
        "title": memory.title,
        "timestamp": memory.timestamp,
        "significance": memory.significance,
        "strength": memory.strength.as_str(),
    })
}

fn summarize_insight(insight: &MemoryInsight) -> Value {
    json!({
        "title": insight.title,
        "description": insight.description,
        "confidence": insight.confidence,
        "domain": insight.domain,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Shard-level synthesis
// ─────────────────────────────────────────────────────────────────────────────

/// Gather memories for `domain` (or the explicit `ids`) and synthesize.
fn insight_for(
    config: &EngineConfig,
    shard: &mut UserMemory,
    user_id: &str,
    domain: &str,
    ids: Option<&[Uuid]>,
) -> Option<MemoryInsight> {
    let memories: Vec<EpisodicMemory> = match ids {
        Some(ids) => ids
            .iter()
            .filter_map(|id| shard.episodic.peek(id))
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect(),
        None => {
            let query = MemoryQuery::for_user(user_id)
                .with_keywords([domain])
                .with_significance(config.insight_significance_threshold)
                .with_limit(config.insight_search_limit);
            shard.episodic.query(&query)
        }
    };

    let needle = domain.to_lowercase();
    let concepts: Vec<Uuid> = shard
        .semantic
        .concepts_for_user(user_id)
        .into_iter()
        .filter(|c| c.category.to_lowercase() == needle || c.name.to_lowercase().contains(&needle))
        .map(|c| c.id)
        .collect();

    let result = insight::synthesize(domain, &memories, concepts);
    if result.is_none() {
        info!(user = %user_id, domain = %domain, "no memories matched; no insight generated");
    }
    result
}

/// Shared body of the two `enhance_*` operations.
fn enhance(
    config: &EngineConfig,
    shard: &mut UserMemory,
    user_id: &str,
    anchored: Vec<EpisodicMemory>,
    title: &str,
    attributes: &mut Attributes,
) {
    let limit = config.related_memories_per_item;
    let keywords = extract_keywords(title);

    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut related: Vec<EpisodicMemory> = anchored
        .into_iter()
        .filter(|m| m.user_id == user_id && seen.insert(m.id))
        .collect();
    related.sort_by(|a, b| b.significance.total_cmp(&a.significance));
    related.truncate(limit);
    if related.len() < limit && !keywords.is_empty() {
        let query = MemoryQuery::for_user(user_id)
            .with_keywords(keywords.clone())
            .with_limit(limit);
        for m in shard.episodic.query(&query) {
            if related.len() < limit && seen.insert(m.id) {
                related.push(m);
            }
        }
    }

    let insights: Vec<Value> = keywords
        .iter()
        .filter_map(|k| insight_for(config, shard, user_id, k, None))
        .take(config.insights_per_item)
        .map(|i| summarize_insight(&i))
        .collect();

    debug!(related = related.len(), insights = insights.len(), "enhanced item");
    attributes.insert(
        RELATED_MEMORIES_KEY.to_string(),
        Value::Array(related.iter().map(summarize).collect()),
    );
    attributes.insert(MEMORY_INSIGHTS_KEY.to_string(), Value::Array(insights));
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryFacade
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryFacade {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            shards: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of users with a shard.
    pub async fn user_count(&self) -> usize {
        self.shards.read().await.len()
    }

    async fn shard(&self, user_id: &str) -> Shard {
        if let Some(shard) = self.shards.read().await.get(user_id) {
            return Arc::clone(shard);
        }
        let mut shards = self.shards.write().await;
        let shard = shards.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user = %user_id, "creating user shard");
            Arc::new(Mutex::new(UserMemory::new()))
        });
        Arc::clone(shard)
    }

    async fn existing_shard(&self, user_id: &str) -> Option<Shard> {
        self.shards.read().await.get(user_id).cloned()
    }

    /// Run `f` on the user's shard, or return `T::default()` when the user
    /// has never written anything.
    async fn with_existing_shard<T: Default>(&self, user_id: &str, f: impl FnOnce(&mut UserMemory) -> T) -> T {
        match self.existing_shard(user_id).await {
            Some(shard) => {
                let mut guard = shard.lock().await;
                f(&mut guard)
            }
            None => T::default(),
        }
    }

    fn limit_or_default(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.config.default_query_limit)
    }

    // ── event translators ────────────────────────────────────────────────────

    /// Record a task attempt.  Creates a concept on completion
    /// (`"Effective approach for …"`) or when feedback is given.
    #[instrument(skip(self, task, experience), fields(user = %user_id, task = %task.id, outcome = experience.outcome.as_str()))]
    pub async fn remember_task_experience(
        &self,
        user_id: &str,
        task: &TaskSnapshot,
        experience: &TaskExperience,
    ) -> Result<Remembered, MemoryError> {
        ensure_user(user_id)?;
        let outcome = experience.outcome.as_str();
        let task_title = task.title.trim();
        let label = if task_title.is_empty() { task.id.as_str() } else { task_title };

        let mut description = format!("{outcome} task '{label}'");
        if let Some(time) = non_empty(experience.time_of_day.as_deref()) {
            description.push_str(&format!(" in the {time}"));
        }
        if let Some(location) = non_empty(experience.location.as_deref()) {
            description.push_str(&format!(" at {location}"));
        }
        if let Some(minutes) = experience.duration_minutes {
            description.push_str(&format!(" after {minutes} minutes"));
        }
        let feedback = non_empty(experience.feedback.as_deref());
        if let Some(feedback) = feedback {
            description.push_str(&format!(". Feedback: {feedback}"));
        }

        let shard = self.shard(user_id).await;
        let mut guard = shard.lock().await;
        let UserMemory { episodic, semantic } = &mut *guard;

        let mut entity_ids = Vec::new();
        if !task_title.is_empty() {
            let entity = semantic.create_entity(
                NewEntity::new(task_title, "task").with_attribute("task_id", json!(task.id)),
            )?;
            entity_ids.push(entity.id);
        }

        let mut episode = NewEpisode::new(user_id, format!("Task {outcome}: {label}"), description.clone())
            .with_entities(entity_ids.clone())
            .with_tasks([task.id.as_str()])
            .with_tags(["task", outcome])
            .with_emotion(
                outcome_valence(experience.outcome),
                0.4 + 0.1 * f32::from(task.preparation_load()),
            )
            .with_significance(task_significance(task, experience));
        if let Some(node_id) = non_empty(task.node_id.as_deref()) {
            episode = episode.with_nodes([node_id]);
        }
        if let Some(location) = non_empty(experience.location.as_deref()) {
            episode = episode.with_location(location);
        }
        let memory = episodic.create(episode)?;

        let concept = match (experience.outcome, feedback) {
            (TaskOutcome::Completed, _) => Some(
                NewConcept::new(user_id, format!("Effective approach for {label}"), "task_pattern")
                    .with_definition(description)
                    .with_confidence(0.6)
                    .with_priority(task.priority),
            ),
            (TaskOutcome::Failed | TaskOutcome::Skipped, Some(feedback)) => Some(
                NewConcept::new(user_id, format!("Struggle with {label}"), "task_pattern")
                    .with_definition(feedback)
                    .with_confidence(0.5)
                    .with_priority(task.priority),
            ),
            (TaskOutcome::InProgress, Some(feedback)) => Some(
                NewConcept::new(user_id, format!("Progress notes on {label}"), "task")
                    .with_definition(feedback)
                    .with_confidence(0.4),
            ),
            _ => None,
        };
        let concept_id = concept
            .map(|c| derive_concept(semantic, c, memory.id))
            .transpose()?;

        info!(memory_id = %memory.id, concept = ?concept_id, "task experience remembered");
        Ok(Remembered {
            memory_id: memory.id,
            concept_id,
            entity_ids,
        })
    }

    /// Record a node interaction.  Milestones and feedback produce a concept.
    #[instrument(skip(self, node, interaction), fields(user = %user_id, node = %node.id, kind = %interaction.kind))]
    pub async fn remember_node_interaction(
        &self,
        user_id: &str,
        node: &NodeSnapshot,
        interaction: &NodeInteraction,
    ) -> Result<Remembered, MemoryError> {
        ensure_user(user_id)?;
        let kind = interaction.kind.trim().to_lowercase();
        let kind = if kind.is_empty() { "interaction".to_string() } else { kind };
        let node_title = node.title.trim();
        let label = if node_title.is_empty() { node.id.as_str() } else { node_title };

        let mut description = format!("{kind} node '{label}'");
        if let Some(details) = non_empty(interaction.details.as_deref()) {
            description.push_str(&format!(": {details}"));
        }
        let feedback = non_empty(interaction.feedback.as_deref());
        if let Some(feedback) = feedback {
            description.push_str(&format!(". Feedback: {feedback}"));
        }

        let shard = self.shard(user_id).await;
        let mut guard = shard.lock().await;
        let UserMemory { episodic, semantic } = &mut *guard;

        let mut entity_ids = Vec::new();
        if !node_title.is_empty() {
            let entity = semantic.create_entity(
                NewEntity::new(node_title, "node").with_attribute("node_id", json!(node.id)),
            )?;
            entity_ids.push(entity.id);
        }

        let mut tags = vec!["node".to_string(), kind.clone()];
        if node.is_milestone {
            tags.push("milestone".to_string());
        }
        let memory = episodic.create(
            NewEpisode::new(user_id, format!("Node {kind}: {label}"), description.clone())
                .with_entities(entity_ids.clone())
                .with_nodes([node.id.as_str()])
                .with_tags(tags)
                .with_significance(node_significance(node, interaction)),
        )?;

        let concept = if node.is_milestone {
            Some(
                NewConcept::new(user_id, format!("Milestone: {label}"), "milestone")
                    .with_definition(description)
                    .with_confidence(0.7)
                    .with_priority(node.priority),
            )
        } else {
            feedback.map(|feedback| {
                NewConcept::new(user_id, format!("Feedback on {label}"), "node_feedback")
                    .with_definition(feedback)
                    .with_priority(node.priority)
            })
        };
        let concept_id = concept
            .map(|c| derive_concept(semantic, c, memory.id))
            .transpose()?;

        info!(memory_id = %memory.id, concept = ?concept_id, "node interaction remembered");
        Ok(Remembered {
            memory_id: memory.id,
            concept_id,
            entity_ids,
        })
    }

    /// Record an explicitly stated preference.  Always produces a concept in
    /// the preference's domain.
    #[instrument(skip(self, preference), fields(user = %user_id, domain = %preference.domain))]
    pub async fn remember_user_preference(
        &self,
        user_id: &str,
        preference: &UserPreference,
    ) -> Result<Remembered, MemoryError> {
        ensure_user(user_id)?;
        let domain = preference.domain.trim();
        let statement = preference.statement.trim();
        if domain.is_empty() {
            return Err(MemoryError::missing("domain"));
        }
        if statement.is_empty() {
            return Err(MemoryError::missing("statement"));
        }
        let strength = clamp_unit(preference.strength, 0.0, 1.0);

        let mut description = statement.to_string();
        if let Some(context) = non_empty(preference.context.as_deref()) {
            description.push_str(&format!(" (context: {context})"));
        }

        let shard = self.shard(user_id).await;
        let mut guard = shard.lock().await;
        let UserMemory { episodic, semantic } = &mut *guard;

        let memory = episodic.create(
            NewEpisode::new(user_id, format!("Preference in {domain}"), description)
                .with_tags(["preference".to_string(), domain.to_lowercase()])
                .with_emotion(0.3, 0.4)
                .with_significance(0.4 + 0.4 * strength),
        )?;
        let concept_id = derive_concept(
            semantic,
            NewConcept::new(user_id, format!("{domain} preference: {statement}"), domain)
                .with_definition(statement)
                .with_confidence(strength.max(0.1)),
            memory.id,
        )?;

        info!(memory_id = %memory.id, %concept_id, "user preference remembered");
        Ok(Remembered {
            memory_id: memory.id,
            concept_id: Some(concept_id),
            entity_ids: Vec::new(),
        })
    }

    /// Record a conversation summary.  Participants become `person` entities;
    /// feedback produces a concept.
    #[instrument(skip(self, conversation), fields(user = %user_id, topic = %conversation.topic))]
    pub async fn remember_conversation(
        &self,
        user_id: &str,
        conversation: &Conversation,
    ) -> Result<Remembered, MemoryError> {
        ensure_user(user_id)?;
        let topic = conversation.topic.trim();
        if topic.is_empty() {
            return Err(MemoryError::missing("topic"));
        }
        let participants: Vec<&str> = conversation
            .participants
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();

        let mut description = conversation.summary.trim().to_string();
        if !participants.is_empty() {
            description.push_str(&format!(" (with {})", participants.join(", ")));
        }
        let feedback = non_empty(conversation.feedback.as_deref());
        if let Some(feedback) = feedback {
            description.push_str(&format!(". Feedback: {feedback}"));
        }
        let significance = 0.4
            + (0.02 * participants.len() as f32).min(0.1)
            + feedback_bonus(conversation.feedback.as_deref());

        let shard = self.shard(user_id).await;
        let mut guard = shard.lock().await;
        let UserMemory { episodic, semantic } = &mut *guard;

        let mut entity_ids = Vec::with_capacity(participants.len());
        for name in &participants {
            let entity = semantic.create_entity(NewEntity::new(*name, "person"))?;
            if !entity_ids.contains(&entity.id) {
                entity_ids.push(entity.id);
            }
        }

        let memory = episodic.create(
            NewEpisode::new(user_id, format!("Conversation: {topic}"), description)
                .with_entities(entity_ids.clone())
                .with_tags(["conversation"])
                .with_emotion(conversation.sentiment, 0.5)
                .with_significance(clamp_unit(significance, 0.0, 1.0)),
        )?;

        let concept_id = feedback
            .map(|feedback| {
                derive_concept(
                    semantic,
                    NewConcept::new(user_id, format!("Conversation insight: {topic}"), "conversation")
                        .with_definition(feedback),
                    memory.id,
                )
            })
            .transpose()?;

        info!(memory_id = %memory.id, concept = ?concept_id, participants = entity_ids.len(), "conversation remembered");
        Ok(Remembered {
            memory_id: memory.id,
            concept_id,
            entity_ids,
        })
    }

    // ── insight and enrichment ───────────────────────────────────────────────

    /// Synthesize an insight for `domain` from the explicit `memory_ids`, or
    /// from a thresholded keyword search when `None`.
    #[instrument(skip(self, memory_ids), fields(user = %user_id))]
    pub async fn generate_memory_insight(
        &self,
        user_id: &str,
        domain: &str,
        memory_ids: Option<&[Uuid]>,
    ) -> Option<MemoryInsight> {
        let Some(shard) = self.existing_shard(user_id).await else {
            info!(user = %user_id, domain = %domain, "no memories for user; no insight generated");
            return None;
        };
        let mut guard = shard.lock().await;
        insight_for(&self.config, &mut guard, user_id, domain, memory_ids)
    }

    /// Attach related memories and insights to `task.attributes`.  Only the
    /// `related_memories` and `memory_insights` keys are written.
    #[instrument(skip(self, task), fields(user = %user_id, task = %task.id))]
    pub async fn enhance_task_with_memory(&self, user_id: &str, task: &mut TaskSnapshot) {
        let config = &self.config;
        let Some(shard) = self.existing_shard(user_id).await else {
            task.attributes.insert(RELATED_MEMORIES_KEY.to_string(), Value::Array(Vec::new()));
            task.attributes.insert(MEMORY_INSIGHTS_KEY.to_string(), Value::Array(Vec::new()));
            return;
        };
        let mut guard = shard.lock().await;
        let anchored = guard
            .episodic
            .memories_for_task(&task.id)
            .into_iter()
            .cloned()
            .collect();
        enhance(config, &mut guard, user_id, anchored, &task.title, &mut task.attributes);
    }

    /// Attach related memories and insights to `node.attributes`.  Only the
    /// `related_memories` and `memory_insights` keys are written.
    #[instrument(skip(self, node), fields(user = %user_id, node = %node.id))]
    pub async fn enhance_node_with_memory(&self, user_id: &str, node: &mut NodeSnapshot) {
        let config = &self.config;
        let Some(shard) = self.existing_shard(user_id).await else {
            node.attributes.insert(RELATED_MEMORIES_KEY.to_string(), Value::Array(Vec::new()));
            node.attributes.insert(MEMORY_INSIGHTS_KEY.to_string(), Value::Array(Vec::new()));
            return;
        };
        let mut guard = shard.lock().await;
        let anchored = guard
            .episodic
            .memories_for_node(&node.id)
            .into_iter()
            .cloned()
            .collect();
        enhance(config, &mut guard, user_id, anchored, &node.title, &mut node.attributes);
    }

    /// Union of memories matching the context's location and time of day,
    /// plus an insight for every numeric factor above the configured
    /// threshold.
    #[instrument(skip(self, context), fields(user = %user_id))]
    pub async fn retrieve_memory_based_context(
        &self,
        user_id: &str,
        context: &MemoryContext,
    ) -> ContextualMemories {
        let config = &self.config;
        self.with_existing_shard(user_id, |shard| {
            let limit = config.default_query_limit;
            let mut found: Vec<EpisodicMemory> = Vec::new();
            let mut seen = HashSet::new();
            let mut queries = Vec::new();
            if let Some(location) = non_empty(context.location.as_deref()) {
                queries.push(MemoryQuery::for_user(user_id).with_location(location).with_limit(limit));
            }
            if let Some(time) = non_empty(context.time_of_day.as_deref()) {
                queries.push(MemoryQuery::for_user(user_id).with_keywords([time]).with_limit(limit));
            }
            for query in &queries {
                for m in shard.episodic.query(query) {
                    if seen.insert(m.id) {
                        found.push(m);
                    }
                }
            }
            found.sort_by(|a, b| {
                b.significance
                    .total_cmp(&a.significance)
                    .then(b.timestamp.cmp(&a.timestamp))
            });

            let insights = context
                .factors
                .iter()
                .filter(|(_, f)| {
                    f.value
                        .as_number()
                        .is_some_and(|v| v > config.context_factor_threshold)
                })
                .filter_map(|(name, _)| insight_for(config, shard, user_id, name, None))
                .collect();

            ContextualMemories {
                memories: found.iter().map(MemoryView::from).collect(),
                insights,
            }
        })
        .await
    }

    // ── retrieval pass-throughs ──────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn natural_query(&self, user_id: &str, text: &str, limit: Option<usize>) -> NaturalQueryResult {
        let limit = self.limit_or_default(limit);
        self.with_existing_shard(user_id, |s| s.retriever().natural_query(user_id, text, limit))
            .await
    }

    pub async fn recent_memories(&self, user_id: &str, days: i64, limit: Option<usize>) -> Vec<MemoryView> {
        let limit = self.limit_or_default(limit);
        self.with_existing_shard(user_id, |s| s.retriever().recent(user_id, days, limit))
            .await
    }

    pub async fn memories_by_emotion(
        &self,
        user_id: &str,
        min_valence: f32,
        max_valence: f32,
        limit: Option<usize>,
    ) -> Vec<MemoryView> {
        let limit = self.limit_or_default(limit);
        self.with_existing_shard(user_id, |s| {
            s.retriever().by_emotion(user_id, min_valence, max_valence, limit)
        })
        .await
    }

    pub async fn task_patterns(&self, user_id: &str) -> TaskPatterns {
        self.with_existing_shard(user_id, |s| s.retriever().task_patterns(user_id))
            .await
    }

    pub async fn entity_memories(&self, user_id: &str, entity_name: &str, limit: Option<usize>) -> EntityMemories {
        let limit = self.limit_or_default(limit);
        let mut result = self
            .with_existing_shard(user_id, |s| s.retriever().entity_memories(user_id, entity_name, limit))
            .await;
        result.query = entity_name.to_string();
        result
    }

    /// Read a memory back (counts as an access).
    pub async fn get_memory(&self, user_id: &str, memory_id: Uuid) -> Option<MemoryView> {
        self.with_existing_shard(user_id, |s| {
            s.episodic
                .peek(&memory_id)
                .is_some_and(|m| m.user_id == user_id)
                .then(|| s.episodic.retrieve(&memory_id))
                .flatten()
                .map(|m| MemoryView::from(&m))
        })
        .await
    }

    pub async fn get_concept(&self, user_id: &str, concept_id: Uuid) -> Option<ConceptView> {
        self.with_existing_shard(user_id, |s| {
            s.semantic
                .retrieve_concept(&concept_id)
                .map(|c| ConceptView::from(&c))
        })
        .await
    }

    pub async fn related_memories(&self, user_id: &str, memory_id: Uuid, limit: Option<usize>) -> Vec<MemoryView> {
        let limit = self.limit_or_default(limit);
        self.with_existing_shard(user_id, |s| {
            s.episodic
                .related(&memory_id, limit)
                .iter()
                .filter(|m| m.user_id == user_id)
                .map(MemoryView::from)
                .collect()
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_memory(&self, user_id: &str, memory_id: Uuid) -> bool {
        self.with_existing_shard(user_id, |s| {
            s.episodic.peek(&memory_id).is_some_and(|m| m.user_id == user_id) && s.episodic.delete(&memory_id)
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete_concept(&self, user_id: &str, concept_id: Uuid) -> bool {
        self.with_existing_shard(user_id, |s| s.semantic.delete_concept(&concept_id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn merge_concepts(&self, user_id: &str, primary: Uuid, secondary: Uuid) -> Option<ConceptView> {
        self.with_existing_shard(user_id, |s| {
            s.semantic
                .merge_concepts(&primary, &secondary)
                .map(|c| ConceptView::from(&c))
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn run_maintenance(&self, user_id: &str) -> MaintenanceReport {
        self.with_existing_shard(user_id, |s| s.episodic.run_maintenance(user_id))
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
