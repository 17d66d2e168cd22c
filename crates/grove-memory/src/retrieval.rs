//! Retrieval Engine.
//!
//! Composes the [`EpisodicStore`] and the [`SemanticStore`] to answer
//! structured and coarse natural-language queries.  All matching is lexical:
//! literal time phrases, name/alias index hits, and lowercase substring
//! keywords.  Results are returned as detached views.

use chrono::{DateTime, Utc};
use grove_types::{
    ConceptView, EntityView, MemoryQuery, MemoryView, RelatedEntityView, TimeRange,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::episodic::EpisodicStore;
use crate::graph::EntityGraph;
use crate::semantic::SemanticStore;

/// Concept categories scanned by [`Retriever::task_patterns`].
pub const TASK_CATEGORIES: [&str; 4] = ["task", "task_pattern", "work", "productivity"];

/// Bucket size of [`Retriever::task_patterns`].
pub const PATTERN_BUCKET: usize = 5;

const STOPWORDS: &[&str] = &[
    "what", "when", "where", "which", "who", "whom", "why", "how", "did", "does", "the", "and",
    "for", "with", "about", "that", "this", "these", "those", "have", "has", "had", "from", "into",
    "your", "you", "was", "were", "are", "been", "being", "there", "their", "them", "they",
    "then", "than", "some", "any", "can", "could", "would", "should", "will", "tell", "show",
    "remember", "recall", "yesterday", "today", "last", "week", "month",
];

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NaturalQueryResult {
    pub memories: Vec<MemoryView>,
    pub concepts: Vec<ConceptView>,
    pub entities: Vec<EntityView>,
    pub time_range: Option<TimeRange>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatterns {
    pub effective: Vec<ConceptView>,
    pub ineffective: Vec<ConceptView>,
    pub preferences: Vec<ConceptView>,
}

/// Memories and neighbours of a named entity.  `found` is `false` (and
/// everything else empty) when the name resolves to nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityMemories {
    pub found: bool,
    pub query: String,
    pub entity: Option<EntityView>,
    pub related_entities: Vec<RelatedEntityView>,
    pub memories: Vec<MemoryView>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Lexical extraction
// ─────────────────────────────────────────────────────────────────────────────

fn tokens(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Time window named by a literal phrase in `text`, relative to `now`.
///
/// `"yesterday"` → 1 day, `"last week"` → 7 days, `"last month"` → 30
/// days; anything else is unbounded.
pub fn extract_time_range(text: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    let lower = text.to_lowercase();
    if lower.contains("yesterday") {
        Some(TimeRange::trailing_days(now, 1))
    } else if lower.contains("last week") {
        Some(TimeRange::trailing_days(now, 7))
    } else if lower.contains("last month") {
        Some(TimeRange::trailing_days(now, 30))
    } else {
        None
    }
}

/// Lowercase tokens longer than three characters that are not stopwords,
/// in first-seen order without duplicates.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in tokens(text) {
        let word = word.to_lowercase();
        if word.chars().count() <= 3 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

/// Entity ids whose name or alias equals a word longer than three characters
/// or an adjacent word pair of `text`.
pub fn extract_entities(graph: &EntityGraph, text: &str) -> Vec<Uuid> {
    let words = tokens(text);
    let mut candidates: Vec<String> = words
        .iter()
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect();
    candidates.extend(
        words
            .windows(2)
            .map(|pair| format!("{} {}", pair[0], pair[1]).to_lowercase()),
    );
    let mut ids = Vec::new();
    for label in candidates {
        match graph.resolve_label(&label) {
            Some(id) if !ids.contains(&id) => ids.push(id),
            _ => {}
        }
    }
    ids
}

// ─────────────────────────────────────────────────────────────────────────────
// Retriever
// ─────────────────────────────────────────────────────────────────────────────

/// Query front-end over one pair of stores.
///
/// Holds mutable borrows because reads carry side effects (episodic access
/// counting, concept reinforcement).
pub struct Retriever<'a> {
    episodic: &'a mut EpisodicStore,
    semantic: &'a mut SemanticStore,
}

impl<'a> Retriever<'a> {
    pub fn new(episodic: &'a mut EpisodicStore, semantic: &'a mut SemanticStore) -> Self {
        Self { episodic, semantic }
    }

    /// Answer a free-text question such as `"What did I work on yesterday?"`.
    pub fn natural_query(&mut self, user_id: &str, text: &str, limit: usize) -> NaturalQueryResult {
        self.natural_query_at(user_id, text, limit, Utc::now())
    }

    /// [`natural_query`](Self::natural_query) with an explicit clock.
    pub fn natural_query_at(
        &mut self,
        user_id: &str,
        text: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> NaturalQueryResult {
        let time_range = extract_time_range(text, now);
        let entity_ids = extract_entities(self.semantic.graph(), text);
        let keywords = extract_keywords(text);
        debug!(
            user = %user_id,
            ?time_range,
            entities = entity_ids.len(),
            ?keywords,
            "natural query parsed"
        );

        let mut query = MemoryQuery::for_user(user_id)
            .with_keywords(keywords.clone())
            .with_entities(entity_ids.clone())
            .with_limit(limit);
        query.time_range = time_range;
        let memories = self.episodic.query(&query).iter().map(MemoryView::from).collect();

        let mut concept_ids: Vec<Uuid> = Vec::new();
        for concept in self.semantic.concepts_for_user(user_id) {
            let name = concept.name.to_lowercase();
            if keywords.iter().any(|k| name.contains(k.as_str())) {
                concept_ids.push(concept.id);
            }
        }
        let concepts = concept_ids
            .iter()
            .filter_map(|id| self.semantic.retrieve_concept(id))
            .map(|c| ConceptView::from(&c))
            .collect();

        let entities = entity_ids
            .iter()
            .filter_map(|id| self.semantic.get_entity(id))
            .map(EntityView::from)
            .collect();

        NaturalQueryResult {
            memories,
            concepts,
            entities,
            time_range,
            keywords,
        }
    }

    /// Memories from the last `days` days.
    pub fn recent(&mut self, user_id: &str, days: i64, limit: usize) -> Vec<MemoryView> {
        let query = MemoryQuery::for_user(user_id)
            .with_time_range(TimeRange::trailing_days(Utc::now(), days))
            .with_limit(limit);
        self.run(&query)
    }

    /// Memories whose valence lies in `[min, max]`.
    pub fn by_emotion(&mut self, user_id: &str, min: f32, max: f32, limit: usize) -> Vec<MemoryView> {
        let query = MemoryQuery::for_user(user_id).with_valence(min, max).with_limit(limit);
        self.run(&query)
    }

    /// Run an explicit [`MemoryQuery`].
    pub fn run(&mut self, query: &MemoryQuery) -> Vec<MemoryView> {
        self.episodic.query(query).iter().map(MemoryView::from).collect()
    }

    /// Task-related concepts bucketed by what their names say about them.
    pub fn task_patterns(&self, user_id: &str) -> TaskPatterns {
        let mut patterns = TaskPatterns::default();
        let mut concepts: Vec<_> = self
            .semantic
            .concepts_for_user(user_id)
            .into_iter()
            .filter(|c| TASK_CATEGORIES.contains(&c.category.to_lowercase().as_str()))
            .collect();
        concepts.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then(a.name.cmp(&b.name)));

        for concept in concepts {
            let name = concept.name.to_lowercase();
            let bucket = if name.contains("ineffective") || name.contains("struggle") {
                &mut patterns.ineffective
            } else if name.contains("effective") {
                &mut patterns.effective
            } else if name.contains("preference") {
                &mut patterns.preferences
            } else {
                continue;
            };
            if bucket.len() < PATTERN_BUCKET {
                bucket.push(ConceptView::from(concept));
            }
        }
        patterns
    }

    /// Resolve `entity_name`, then gather its neighbours and the user's
    /// memories tagged with it.
    pub fn entity_memories(&mut self, user_id: &str, entity_name: &str, limit: usize) -> EntityMemories {
        let Some(entity) = self.semantic.find_entity_by_name(entity_name).cloned() else {
            debug!(name = %entity_name, "entity not found");
            return EntityMemories {
                found: false,
                query: entity_name.to_string(),
                ..Default::default()
            };
        };
        let related_entities = self
            .semantic
            .find_related_entities(&entity.id, None)
            .iter()
            .map(|(e, label)| RelatedEntityView {
                entity: EntityView::from(e),
                relation: label.clone(),
            })
            .collect();
        let query = MemoryQuery::for_user(user_id)
            .with_entities(vec![entity.id])
            .with_limit(limit);
        EntityMemories {
            found: true,
            query: entity_name.to_string(),
            entity: Some(EntityView::from(&entity)),
            related_entities,
            memories: self.run(&query),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episodic::NewEpisode;
    use crate::graph::{NewEntity, NewRelation};
    use crate::semantic::NewConcept;
    use chrono::Duration;

    fn stores() -> (EpisodicStore, SemanticStore) {
        (EpisodicStore::new(), SemanticStore::new())
    }

    // ── extraction ───────────────────────────────────────────────────────────

    #[test]
    fn time_phrases_map_to_windows() {
        let now = Utc::now();
        let y = extract_time_range("What did I do yesterday?", now).unwrap();
        assert_eq!(y.end - y.start, Duration::days(1));
        let w = extract_time_range("anything LAST WEEK", now).unwrap();
        assert_eq!(w.end - w.start, Duration::days(7));
        let m = extract_time_range("last month's goals", now).unwrap();
        assert_eq!(m.end - m.start, Duration::days(30));
        assert!(extract_time_range("my goals", now).is_none());
    }

    #[test]
    fn keywords_drop_short_words_and_stopwords() {
        let kw = extract_keywords("What did I work on yesterday with the Running club? running!");
        assert_eq!(kw, vec!["work", "running", "club"]);
    }

    #[test]
    fn entities_match_words_and_bigrams() {
        let mut graph = EntityGraph::new();
        let alex = graph.create_entity(NewEntity::new("Alex", "person")).unwrap();
        let park = graph.create_entity(NewEntity::new("Central Park", "place")).unwrap();
        graph.create_entity(NewEntity::new("Bo", "person")).unwrap();

        let ids = extract_entities(&graph, "Walked with alex and Bo in central park");
        assert_eq!(ids, vec![alex.id, park.id]);
    }

    // ── natural_query ────────────────────────────────────────────────────────

    #[test]
    fn yesterday_query_without_recent_memories_is_empty() {
        let (mut ep, mut sem) = stores();
        ep.create(
            NewEpisode::new("u1", "Worked on the budget", "work stuff").at(Utc::now() - Duration::days(3)),
        )
        .unwrap();
        let result = Retriever::new(&mut ep, &mut sem).natural_query("u1", "What did I work on yesterday?", 10);
        assert!(result.memories.is_empty());
        assert!(result.entities.is_empty());
        assert!(result.time_range.is_some());
    }

    #[test]
    fn natural_query_returns_memories_concepts_and_entities() {
        let (mut ep, mut sem) = stores();
        let alex = sem.create_entity(NewEntity::new("Alex", "person")).unwrap();
        ep.create(
            NewEpisode::new("u1", "Planning session", "Planning the launch with Alex")
                .with_entities(vec![alex.id])
                .at(Utc::now() - Duration::days(2)),
        )
        .unwrap();
        ep.create(NewEpisode::new("u1", "Planning alone", "solo planning")).unwrap();
        sem.create_concept(NewConcept::new("u1", "Effective planning", "task_pattern"))
            .unwrap();
        sem.create_concept(NewConcept::new("u2", "Planning for u2", "task_pattern"))
            .unwrap();

        let result = Retriever::new(&mut ep, &mut sem).natural_query("u1", "planning with Alex last week", 10);
        assert_eq!(result.memories.len(), 1);
        assert_eq!(result.memories[0].title, "Planning session");
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].name, "Alex");
        assert_eq!(result.concepts.len(), 1);
        assert_eq!(result.concepts[0].name, "Effective planning");
    }

    // ── wrappers ─────────────────────────────────────────────────────────────

    #[test]
    fn recent_and_by_emotion() {
        let (mut ep, mut sem) = stores();
        ep.create(NewEpisode::new("u1", "old", "").at(Utc::now() - Duration::days(20)))
            .unwrap();
        ep.create(NewEpisode::new("u1", "new", "").with_emotion(-0.6, 0.5)).unwrap();
        let mut r = Retriever::new(&mut ep, &mut sem);
        let recent = r.recent("u1", 7, 10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "new");
        assert_eq!(r.by_emotion("u1", -1.0, -0.5, 10).len(), 1);
        assert!(r.by_emotion("u1", 0.5, 1.0, 10).is_empty());
    }

    #[test]
    fn recent_with_huge_window_returns_everything() {
        let (mut ep, mut sem) = stores();
        ep.create(NewEpisode::new("u1", "ancient", "").at(Utc::now() - Duration::days(3650)))
            .unwrap();
        let mut r = Retriever::new(&mut ep, &mut sem);
        assert_eq!(r.recent("u1", 1_000_000_000, 10).len(), 1);
        assert_eq!(r.recent("u1", i64::MAX, 10).len(), 1);
    }

    #[test]
    fn task_patterns_bucket_by_name() {
        let (mut ep, mut sem) = stores();
        for (name, category) in [
            ("Effective morning blocks", "task_pattern"),
            ("Ineffective multitasking", "task_pattern"),
            ("Struggle with email", "work"),
            ("Preference for short tasks", "task"),
            ("Effective but unrelated", "hobby"),
            ("Neutral note", "task"),
        ] {
            sem.create_concept(NewConcept::new("u1", name, category)).unwrap();
        }
        let patterns = Retriever::new(&mut ep, &mut sem).task_patterns("u1");
        assert_eq!(patterns.effective.len(), 1);
        assert_eq!(patterns.ineffective.len(), 2);
        assert_eq!(patterns.preferences.len(), 1);
    }

    #[test]
    fn task_patterns_cap_each_bucket() {
        let (mut ep, mut sem) = stores();
        for i in 0..8 {
            sem.create_concept(NewConcept::new("u1", format!("Effective habit {i}"), "task"))
                .unwrap();
        }
        let patterns = Retriever::new(&mut ep, &mut sem).task_patterns("u1");
        assert_eq!(patterns.effective.len(), PATTERN_BUCKET);
    }

    // ── entity_memories ──────────────────────────────────────────────────────

    #[test]
    fn entity_memories_reports_not_found() {
        let (mut ep, mut sem) = stores();
        let res = Retriever::new(&mut ep, &mut sem).entity_memories("u1", "Nobody", 10);
        assert!(!res.found);
        assert_eq!(res.query, "Nobody");
        assert!(res.memories.is_empty());
    }

    #[test]
    fn entity_memories_gathers_neighbours_and_memories() {
        let (mut ep, mut sem) = stores();
        let coach = sem
            .create_entity(NewEntity::new("Coach Kim", "person").with_aliases(["Kim"]))
            .unwrap();
        let gym = sem.create_entity(NewEntity::new("Gym", "place")).unwrap();
        sem.create_relation(NewRelation::new(coach.id, gym.id, "works_at")).unwrap();
        ep.create(NewEpisode::new("u1", "Training", "").with_entities(vec![coach.id]))
            .unwrap();
        ep.create(NewEpisode::new("u2", "Other user", "").with_entities(vec![coach.id]))
            .unwrap();

        let res = Retriever::new(&mut ep, &mut sem).entity_memories("u1", "kim", 10);
        assert!(res.found);
        assert_eq!(res.entity.unwrap().id, coach.id);
        assert_eq!(res.related_entities.len(), 1);
        assert_eq!(res.related_entities[0].relation, "works_at");
        assert_eq!(res.memories.len(), 1);
    }
}
