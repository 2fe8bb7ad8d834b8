//! Memory search and composite ranking.
//!
//! Pipeline: filter → term containment → optional fuzzy fallback →
//! composite score. The fuzzy pass only runs when exact matching yields few
//! candidates, and every numeric input is clamped to a finite `[0, 1]` so a
//! pathological weight or timestamp can never poison the ordering.

use chrono::{DateTime, Utc};

use crate::model::{Category, Memory, MemoryStatus};
use crate::settings::SearchSettings;

/// Query text plus the optional candidate filters.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<Category>,
    pub status: Option<MemoryStatus>,
    /// Allow the fuzzy fallback pass.
    pub fuzzy: bool,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fuzzy: true,
            ..Self::default()
        }
    }
}

/// The three fuzzy modes: maximum normalized edit distance per mode.
const FUZZY_MODES: [f64; 3] = [0.3, 0.6, 0.8];

/// Minimum query length before fuzzy matching is worth running.
const FUZZY_MIN_QUERY_LEN: usize = 4;

/// How many content words the fuzzy scan inspects per record.
const FUZZY_SCAN_WORDS: usize = 400;

struct Candidate<'a> {
    memory: &'a Memory,
    /// Query terms found verbatim in the body.
    body_hits: usize,
    /// Any query term found in the title line.
    title_hit: bool,
    /// Best fuzzy similarity for records that only matched approximately.
    fuzzy_quality: Option<f64>,
}

/// Rank `records` against `query`. Returns `(memory, score)` pairs sorted
/// best-first; ties break on newer `timestamp`, then smaller `id`.
pub fn search<'a>(
    records: &[&'a Memory],
    query: &SearchQuery,
    tuning: &SearchSettings,
    now: DateTime<Utc>,
) -> Vec<(&'a Memory, f64)> {
    let filtered: Vec<&Memory> = records
        .iter()
        .copied()
        .filter(|m| passes_filters(m, query))
        .collect();

    let terms: Vec<String> = query
        .text
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();

    let mut candidates: Vec<Candidate> = Vec::new();
    if terms.is_empty() {
        candidates.extend(filtered.iter().map(|m| Candidate {
            memory: m,
            body_hits: 0,
            title_hit: false,
            fuzzy_quality: None,
        }));
    } else {
        for memory in &filtered {
            if let Some(c) = exact_candidate(memory, &terms) {
                candidates.push(c);
            }
        }

        let run_fuzzy = query.fuzzy
            && candidates.len() < tuning.fuzzy_candidate_threshold
            && query.text.len() >= FUZZY_MIN_QUERY_LEN;
        if run_fuzzy {
            fuzzy_pass(&filtered, &terms, &mut candidates);
        }
    }

    let mut scored: Vec<(&Memory, f64)> = candidates
        .into_iter()
        .map(|c| {
            let score = composite_score(&c, &terms, tuning, now);
            (c.memory, score)
        })
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.id.cmp(&b.id))
    });
    scored
}

fn passes_filters(memory: &Memory, query: &SearchQuery) -> bool {
    if let Some(project) = &query.project {
        if &memory.project != project {
            return false;
        }
    }
    if let Some(category) = query.category {
        if memory.category != category {
            return false;
        }
    }
    if let Some(status) = query.status {
        if memory.status != status {
            return false;
        }
    }
    query
        .tags
        .iter()
        .all(|t| memory.tags.iter().any(|mt| mt == &t.to_lowercase()))
}

fn exact_candidate<'a>(memory: &'a Memory, terms: &[String]) -> Option<Candidate<'a>> {
    let content = memory.content.to_lowercase();
    let title = memory.title_line().to_lowercase();
    let mut body_hits = 0;
    let mut title_hit = false;
    let mut tag_hit = false;
    for term in terms {
        if content.contains(term) {
            body_hits += 1;
        }
        if title.contains(term.as_str()) {
            title_hit = true;
        }
        if memory.tags.iter().any(|t| t.contains(term.as_str())) {
            tag_hit = true;
        }
    }
    if body_hits == 0 && !title_hit && !tag_hit {
        return None;
    }
    Some(Candidate {
        memory,
        body_hits,
        title_hit,
        fuzzy_quality: None,
    })
}

/// Approximate matching over the filtered set, three modes from strict to
/// tolerant, deduplicated keeping the best similarity per id.
fn fuzzy_pass<'a>(filtered: &[&'a Memory], terms: &[String], candidates: &mut Vec<Candidate<'a>>) {
    let already: std::collections::HashSet<&str> =
        candidates.iter().map(|c| c.memory.id.as_str()).collect();

    for memory in filtered {
        if already.contains(memory.id.as_str()) {
            continue;
        }
        let similarity = best_word_similarity(memory, terms);
        let distance = 1.0 - similarity;
        let matched = FUZZY_MODES.iter().any(|mode| distance <= *mode);
        if matched {
            candidates.push(Candidate {
                memory,
                body_hits: 0,
                title_hit: false,
                fuzzy_quality: Some(similarity),
            });
        }
    }
}

fn best_word_similarity(memory: &Memory, terms: &[String]) -> f64 {
    let words = memory
        .content
        .split_whitespace()
        .take(FUZZY_SCAN_WORDS)
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty());

    let mut best: f64 = 0.0;
    for word in words.chain(memory.tags.iter().cloned()) {
        for term in terms {
            let sim = strsim::normalized_levenshtein(&word, term);
            if sim > best {
                best = sim;
            }
        }
    }
    best
}

fn composite_score(
    candidate: &Candidate<'_>,
    terms: &[String],
    tuning: &SearchSettings,
    now: DateTime<Utc>,
) -> f64 {
    let memory = candidate.memory;

    let days_since_access =
        (now - memory.last_accessed).num_seconds().max(0) as f64 / 86_400.0;
    let recency = (-days_since_access / 30.0).exp();

    let mut relevance: f64 = 0.5;
    if candidate.title_hit {
        relevance += 0.3;
    }
    relevance += 0.1 * candidate.body_hits as f64;
    if let Some(quality) = candidate.fuzzy_quality {
        relevance += 0.2 * quality;
    }
    if memory
        .tags
        .iter()
        .any(|t| matches!(t.as_str(), "important" | "critical" | "urgent"))
    {
        relevance += 0.15;
    }
    if memory.content.contains("```") {
        relevance += 0.05;
    }
    // Records that matched nothing verbatim stay below a plain body hit.
    if !terms.is_empty() && candidate.body_hits == 0 && !candidate.title_hit {
        relevance = relevance.min(0.75);
    }

    let mut interaction =
        ((memory.access_count as f64 + 1.0).ln() / 50f64.ln()).min(1.0);
    if (now - memory.last_accessed).num_days() <= 7 {
        interaction += 0.2;
    }

    let priority_component = match memory.priority {
        crate::model::Priority::High => 0.9,
        crate::model::Priority::Medium => 0.6,
        crate::model::Priority::Low => 0.3,
    };
    let structure_component = f64::from(memory.complexity - 1) / 3.0;
    let length_component = (memory.content.len() as f64 / 4000.0).min(1.0);
    let importance =
        0.5 * priority_component + 0.3 * structure_component + 0.2 * length_component;

    clamp_unit(tuning.recency_weight) * clamp_unit(recency)
        + clamp_unit(tuning.relevance_weight) * clamp_unit(relevance)
        + clamp_unit(tuning.interaction_weight) * clamp_unit(interaction)
        + clamp_unit(tuning.importance_weight) * clamp_unit(importance)
}

/// NaN and infinities collapse into the unit interval.
fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Memory, MemoryStatus, Priority};

    fn memory(content: &str, project: &str, tags: &[&str]) -> Memory {
        Memory::new(
            content.to_string(),
            project.to_string(),
            Category::Code,
            tags.iter().map(|s| s.to_string()).collect(),
            Priority::Medium,
            MemoryStatus::Active,
        )
    }

    fn run<'a>(records: &[&'a Memory], query: &SearchQuery) -> Vec<(&'a Memory, f64)> {
        search(records, query, &SearchSettings::default(), Utc::now())
    }

    #[test]
    fn empty_query_returns_all_filtered() {
        let a = memory("first note", "p1", &[]);
        let b = memory("second note", "p2", &[]);
        let records = vec![&a, &b];

        let mut q = SearchQuery::new("");
        q.project = Some("p1".into());
        let hits = run(&records, &q);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, a.id);
    }

    #[test]
    fn term_matches_content_title_and_tags() {
        let by_body = memory("notes about tokio runtimes", "p", &[]);
        let by_tag = memory("unrelated text", "p", &["tokio"]);
        let miss = memory("nothing relevant here", "p", &[]);
        let records = vec![&by_body, &by_tag, &miss];

        let hits = run(&records, &SearchQuery::new("tokio"));
        let ids: Vec<&str> = hits.iter().map(|(m, _)| m.id.as_str()).collect();
        assert!(ids.contains(&by_body.id.as_str()));
        assert!(ids.contains(&by_tag.id.as_str()));
        assert!(!ids.contains(&miss.id.as_str()));
    }

    #[test]
    fn typo_is_found_by_fuzzy_but_ranked_below_exact() {
        let exact = memory("configuration loading order", "p", &[]);
        let typo = memory("configurtaion loading order", "p", &[]);
        let records = vec![&typo, &exact];

        let hits = run(&records, &SearchQuery::new("configuration"));
        assert_eq!(hits.len(), 2, "fuzzy pass should pull in the typo");
        assert_eq!(hits[0].0.id, exact.id, "exact match must rank first");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn fuzzy_pass_respects_the_toggle() {
        let typo = memory("configurtaion notes", "p", &[]);
        let records = vec![&typo];

        let mut q = SearchQuery::new("configuration");
        q.fuzzy = false;
        assert!(run(&records, &q).is_empty());
    }

    #[test]
    fn fuzzy_skipped_for_short_queries() {
        let m = memory("xyz content", "p", &[]);
        let records = vec![&m];
        let hits = run(&records, &SearchQuery::new("ab"));
        assert!(hits.is_empty());
    }

    #[test]
    fn filters_compose_with_terms() {
        let a = memory("shared term", "p1", &["keep"]);
        let b = memory("shared term", "p2", &["keep"]);
        let records = vec![&a, &b];

        let mut q = SearchQuery::new("shared");
        q.project = Some("p2".into());
        q.tags = vec!["keep".into()];
        let hits = run(&records, &q);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, b.id);
    }

    #[test]
    fn important_tag_boosts_relevance() {
        let plain = memory("deploy checklist item", "p", &[]);
        let boosted = memory("deploy checklist item", "p", &["important"]);
        let records = vec![&plain, &boosted];

        let hits = run(&records, &SearchQuery::new("deploy"));
        assert_eq!(hits[0].0.id, boosted.id);
    }

    #[test]
    fn scores_are_finite_and_bounded() {
        let m = memory("anything at all", "p", &[]);
        let records = vec![&m];
        let mut tuning = SearchSettings::default();
        tuning.recency_weight = f64::INFINITY;
        tuning.relevance_weight = f64::NAN;

        let hits = search(&records, &SearchQuery::new("anything"), &tuning, Utc::now());
        assert!(hits[0].1.is_finite());
        assert!(hits[0].1 <= 4.0);
    }

    #[test]
    fn ties_break_by_newer_timestamp_then_id() {
        let mut old = memory("same text", "p", &[]);
        let new = memory("same text", "p", &[]);
        old.timestamp -= chrono::Duration::days(3);
        old.last_accessed = new.last_accessed;
        let records = vec![&old, &new];

        let hits = run(&records, &SearchQuery::new(""));
        assert_eq!(hits[0].0.id, new.id);
    }
}
