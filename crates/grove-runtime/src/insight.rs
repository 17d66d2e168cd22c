//! Insight synthesis.
//!
//! Turns a set of episodic memories into a [`MemoryInsight`] by counting
//! three kinds of recurring signal in them:
//!
//! | Tally | Source |
//! |---|---|
//! | tasks | `related_tasks` ids |
//! | time of day | `morning`, `afternoon`, `evening`, `night` in the description |
//! | outcome | `completed`, `failed`, `skipped`, `struggled`, `in_progress` in the description |
//!
//! Confidence grows with the evidence: `min(0.9, 0.3 + 0.05 · n)`.

use std::collections::BTreeMap;

use chrono::Utc;
use grove_types::{EpisodicMemory, MemoryInsight};
use uuid::Uuid;

pub const TIMES_OF_DAY: [&str; 4] = ["morning", "afternoon", "evening", "night"];
pub const OUTCOME_KEYWORDS: [&str; 5] = ["completed", "failed", "skipped", "struggled", "in_progress"];

/// Entries kept per tally in the rendered description.
pub const TOP_N: usize = 3;

const MAX_CONFIDENCE: f32 = 0.9;

/// Frequency counts gathered from a memory set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PatternTally {
    pub tasks: BTreeMap<String, usize>,
    pub times_of_day: BTreeMap<String, usize>,
    pub outcomes: BTreeMap<String, usize>,
}

impl PatternTally {
    pub fn from_memories<'a>(memories: impl IntoIterator<Item = &'a EpisodicMemory>) -> Self {
        let mut tally = PatternTally::default();
        for memory in memories {
            for task in &memory.related_tasks {
                *tally.tasks.entry(task.clone()).or_default() += 1;
            }
            let text = memory.description.to_lowercase();
            for time in TIMES_OF_DAY.iter().filter(|t| text.contains(*t)) {
                *tally.times_of_day.entry(time.to_string()).or_default() += 1;
            }
            for outcome in OUTCOME_KEYWORDS.iter().filter(|o| text.contains(*o)) {
                *tally.outcomes.entry(outcome.to_string()).or_default() += 1;
            }
        }
        tally
    }

    fn outcome(&self, key: &str) -> usize {
        self.outcomes.get(key).copied().unwrap_or(0)
    }

    /// Heuristic one-line conclusions drawn from the tallies.
    pub fn implications(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some((time, count)) = top(&self.times_of_day, 1).into_iter().next() {
            out.push(format!("Most activity happens in the {time} ({count} memories)."));
        }
        let (completed, failed) = (self.outcome("completed"), self.outcome("failed"));
        if completed + failed > 0 {
            let line = match completed.cmp(&failed) {
                std::cmp::Ordering::Greater => {
                    format!("Completions outnumber failures ({completed} vs {failed}).")
                }
                std::cmp::Ordering::Less => {
                    format!("Failures outnumber completions ({failed} vs {completed}); consider smaller steps.")
                }
                std::cmp::Ordering::Equal => {
                    format!("Completions and failures are balanced ({completed} each).")
                }
            };
            out.push(line);
        }
        out
    }
}

/// Highest counts first, ties broken alphabetically.
pub fn top(tally: &BTreeMap<String, usize>, n: usize) -> Vec<(&str, usize)> {
    let mut entries: Vec<(&str, usize)> = tally.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    entries.truncate(n);
    entries
}

fn render(label: &str, tally: &BTreeMap<String, usize>) -> Option<String> {
    let entries = top(tally, TOP_N);
    if entries.is_empty() {
        return None;
    }
    let parts: Vec<String> = entries.iter().map(|(k, v)| format!("{k} ({v})")).collect();
    Some(format!("{label}: {}", parts.join(", ")))
}

/// Build an insight for `domain` from `memories`; `None` for an empty set.
pub fn synthesize(
    domain: &str,
    memories: &[EpisodicMemory],
    source_concepts: Vec<Uuid>,
) -> Option<MemoryInsight> {
    if memories.is_empty() {
        return None;
    }
    let n = memories.len();
    let tally = PatternTally::from_memories(memories);

    let mut lines: Vec<String> = [
        render("Frequent tasks", &tally.tasks),
        render("Times of day", &tally.times_of_day),
        render("Outcomes", &tally.outcomes),
    ]
    .into_iter()
    .flatten()
    .collect();
    if lines.is_empty() {
        lines.push("No recurring tasks, times or outcomes yet.".to_string());
    }
    lines.extend(tally.implications());

    let relevance = memories.iter().map(|m| m.significance).sum::<f32>() / n as f32;

    Some(MemoryInsight {
        id: Uuid::new_v4(),
        title: format!("Patterns in {domain} across {n} memories"),
        description: lines.join("\n"),
        source_memories: memories.iter().map(|m| m.id).collect(),
        source_concepts,
        confidence: (0.3 + 0.05 * n as f32).min(MAX_CONFIDENCE),
        domain: domain.to_string(),
        generated_at: Utc::now(),
        relevance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_types::MemoryStrength;
    use std::collections::BTreeSet;

    fn memory(description: &str, tasks: &[&str], significance: f32) -> EpisodicMemory {
        EpisodicMemory {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            title: "t".into(),
            description: description.into(),
            timestamp: Utc::now(),
            location: None,
            related_entities: BTreeSet::new(),
            related_tasks: tasks.iter().map(|t| t.to_string()).collect(),
            related_nodes: BTreeSet::new(),
            emotional_valence: 0.0,
            emotional_arousal: 0.5,
            strength: MemoryStrength::Strong,
            access_count: 1,
            last_accessed: None,
            tags: BTreeSet::new(),
            significance,
        }
    }

    #[test]
    fn empty_set_yields_none() {
        assert!(synthesize("work", &[], Vec::new()).is_none());
    }

    #[test]
    fn tallies_count_tasks_times_and_outcomes() {
        let memories = vec![
            memory("Completed 'Write' in the morning", &["t1"], 0.6),
            memory("Completed 'Write' in the morning", &["t1"], 0.6),
            memory("Failed 'Run' in the evening", &["t2"], 0.6),
        ];
        let tally = PatternTally::from_memories(&memories);
        assert_eq!(tally.tasks["t1"], 2);
        assert_eq!(tally.times_of_day["morning"], 2);
        assert_eq!(tally.outcomes["completed"], 2);
        assert_eq!(tally.outcomes["failed"], 1);
        assert_eq!(top(&tally.times_of_day, 1), vec![("morning", 2)]);
    }

    #[test]
    fn implications_name_best_time_and_outcome_balance() {
        let memories = vec![
            memory("failed at night", &[], 0.5),
            memory("failed at night", &[], 0.5),
            memory("completed in the afternoon", &[], 0.5),
        ];
        let lines = PatternTally::from_memories(&memories).implications();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("night"));
        assert!(lines[1].starts_with("Failures outnumber completions (2 vs 1)"));
    }

    #[test]
    fn insight_scores_confidence_and_relevance() {
        let memories = vec![
            memory("completed in the morning", &["t1"], 0.4),
            memory("completed in the morning", &["t1"], 0.8),
        ];
        let concept = Uuid::new_v4();
        let insight = synthesize("work", &memories, vec![concept]).unwrap();
        assert!((insight.confidence - 0.4).abs() < 1e-6);
        assert!((insight.relevance - 0.6).abs() < 1e-6);
        assert_eq!(insight.source_memories.len(), 2);
        assert_eq!(insight.source_concepts, vec![concept]);
        assert!(insight.description.contains("Frequent tasks: t1 (2)"));
        assert_eq!(insight.domain, "work");
    }

    #[test]
    fn confidence_is_capped() {
        let memories: Vec<_> = (0..40).map(|_| memory("quiet day", &[], 0.5)).collect();
        let insight = synthesize("rest", &memories, Vec::new()).unwrap();
        assert!((insight.confidence - MAX_CONFIDENCE).abs() < 1e-6);
        assert!(insight.description.starts_with("No recurring"));
    }
}
