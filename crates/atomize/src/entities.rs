//! Entity recognition heuristics.
//!
//! Entities are recognized without any model: capitalization patterns for
//! people, suffix lists and prepositions for places, a curated term set for
//! technical vocabulary, and regexes for dates. The output feeds atom
//! construction and the tag rules.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::MAX_TAG_BYTES;

/// Entity kinds recognized by the heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Place,
    Concept,
    Date,
    Technical,
}

/// A recognized entity mention with its normalized (lowercased) label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub kind: EntityKind,
}

/// Upper bound on entities emitted per span.
const MAX_ENTITIES: usize = 32;

static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        \b\d{4}-\d{2}-\d{2}\b
        | \b(?:january|february|march|april|may|june|july|august|september|october|november|december)
          \s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?\b
        ",
    )
    .expect("date regex")
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const PLACE_SUFFIXES: [&str; 9] = [
    "burg", "ville", "ton", "land", "shire", "stan", "port", "ford", "ham",
];

const PLACE_PREPOSITIONS: [&str; 4] = ["in", "at", "from", "near"];

/// Curated technical vocabulary. Membership is checked on the lowercased
/// token, so "Kubernetes" and "kubernetes" both match.
const TECH_TERMS: [&str; 48] = [
    "algorithm",
    "api",
    "async",
    "backend",
    "benchmark",
    "cache",
    "compiler",
    "container",
    "cpu",
    "database",
    "deadlock",
    "debugger",
    "docker",
    "embedding",
    "encryption",
    "endpoint",
    "frontend",
    "git",
    "grpc",
    "http",
    "https",
    "index",
    "javascript",
    "json",
    "kernel",
    "kubernetes",
    "latency",
    "linux",
    "middleware",
    "mutex",
    "neural",
    "orm",
    "parser",
    "postgres",
    "python",
    "queue",
    "refactor",
    "regex",
    "runtime",
    "rust",
    "schema",
    "server",
    "sql",
    "terraform",
    "thread",
    "throughput",
    "vector",
    "yaml",
];

/// Common sentence-leading words that should never become concepts or head
/// a name run.
const FUNCTION_WORDS: [&str; 21] = [
    "the", "this", "that", "these", "those", "there", "then", "when", "where", "what", "which",
    "while", "after", "before", "because", "however", "although", "meanwhile", "yesterday",
    "today", "tomorrow",
];

/// Recognize entities in `content`.
///
/// Output labels are lowercased, capped at [`MAX_TAG_BYTES`] bytes, and
/// deduplicated; at most [`MAX_ENTITIES`] entities are returned, in order of
/// first occurrence.
pub fn extract_entities(content: &str) -> Vec<Entity> {
    let mut out: Vec<Entity> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for m in DATE_RE.find_iter(content) {
        push_entity(&mut out, &mut seen, m.as_str(), EntityKind::Date);
    }

    // Token walk: consecutive capitalized words accumulate into a name run;
    // the run is resolved when a lowercase word, punctuation, or newline
    // interrupts it.
    let mut run: Vec<&str> = Vec::new();
    let mut run_at_sentence_start = false;
    let mut run_prev_word = String::new();
    let mut sentence_start = true;
    let mut prev_word = String::new();

    for piece in content.split_word_bounds() {
        if piece.trim().is_empty() {
            if piece.contains('\n') {
                flush_run(
                    &mut run,
                    &mut out,
                    &mut seen,
                    run_at_sentence_start,
                    &run_prev_word,
                );
                sentence_start = true;
            }
            continue;
        }
        let is_word = piece.chars().any(|c| c.is_alphanumeric());
        if !is_word {
            flush_run(
                &mut run,
                &mut out,
                &mut seen,
                run_at_sentence_start,
                &run_prev_word,
            );
            if piece.contains(['.', '!', '?']) {
                sentence_start = true;
            }
            continue;
        }

        let lower = piece.to_lowercase();
        if TECH_TERMS.contains(&lower.as_str()) {
            flush_run(
                &mut run,
                &mut out,
                &mut seen,
                run_at_sentence_start,
                &run_prev_word,
            );
            push_entity(&mut out, &mut seen, &lower, EntityKind::Technical);
            sentence_start = false;
            prev_word = lower;
            continue;
        }
        if MONTHS.contains(&lower.as_str()) {
            flush_run(
                &mut run,
                &mut out,
                &mut seen,
                run_at_sentence_start,
                &run_prev_word,
            );
            push_entity(&mut out, &mut seen, &lower, EntityKind::Date);
            sentence_start = false;
            prev_word = lower;
            continue;
        }

        let capitalized = piece.chars().next().is_some_and(|c| c.is_uppercase());
        if capitalized {
            if run.is_empty() {
                run_at_sentence_start = sentence_start;
                run_prev_word = prev_word.clone();
            }
            run.push(piece);
        } else {
            flush_run(
                &mut run,
                &mut out,
                &mut seen,
                run_at_sentence_start,
                &run_prev_word,
            );
        }
        sentence_start = false;
        prev_word = lower;
    }
    flush_run(
        &mut run,
        &mut out,
        &mut seen,
        run_at_sentence_start,
        &run_prev_word,
    );

    out
}

fn push_entity(out: &mut Vec<Entity>, seen: &mut HashSet<String>, label: &str, kind: EntityKind) {
    if out.len() >= MAX_ENTITIES {
        return;
    }
    let label = normalize_label(label);
    if label.is_empty() || !seen.insert(label.clone()) {
        return;
    }
    out.push(Entity { label, kind });
}

/// Resolve an accumulated capitalized-word run into an entity, if any.
fn flush_run(
    run: &mut Vec<&str>,
    out: &mut Vec<Entity>,
    seen: &mut HashSet<String>,
    at_sentence_start: bool,
    prev_word: &str,
) {
    let mut at_sentence_start = at_sentence_start;
    // A sentence-leading function word ("The Zeppelin…") is capitalization,
    // not a name part.
    while run.len() >= 2 && FUNCTION_WORDS.contains(&run[0].to_lowercase().as_str()) {
        run.remove(0);
        at_sentence_start = false;
    }
    if run.is_empty() {
        return;
    }
    let lower = run.join(" ").to_lowercase();
    if run.len() >= 2 {
        push_entity(out, seen, &lower, EntityKind::Person);
    } else if PLACE_SUFFIXES.iter().any(|s| lower.ends_with(s))
        || PLACE_PREPOSITIONS.contains(&prev_word)
    {
        push_entity(out, seen, &lower, EntityKind::Place);
    } else if !at_sentence_start && lower.chars().count() >= 2 {
        push_entity(out, seen, &lower, EntityKind::Person);
    } else if at_sentence_start
        && lower.chars().count() >= 4
        && !FUNCTION_WORDS.contains(&lower.as_str())
    {
        push_entity(out, seen, &lower, EntityKind::Concept);
    }
    run.clear();
}

/// Lowercase and cap a label at [`MAX_TAG_BYTES`] bytes on a char boundary.
fn normalize_label(label: &str) -> String {
    let mut lower = label.trim().to_lowercase();
    if lower.len() > MAX_TAG_BYTES {
        let mut cut = MAX_TAG_BYTES;
        while cut > 0 && !lower.is_char_boundary(cut) {
            cut -= 1;
        }
        lower.truncate(cut);
    }
    lower
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_of(content: &str, kind: EntityKind) -> Vec<String> {
        extract_entities(content)
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.label)
            .collect()
    }

    // ==================== Person ====================

    #[test]
    fn two_capitalized_words_form_a_person() {
        let persons = kinds_of("I met Ada Lovelace at the conference.", EntityKind::Person);
        assert!(persons.contains(&"ada lovelace".to_string()));
    }

    #[test]
    fn mid_sentence_capitalized_word_is_a_person() {
        let persons = kinds_of("Talked with Miriam about the plan.", EntityKind::Person);
        assert!(persons.contains(&"miriam".to_string()));
    }

    #[test]
    fn sentence_start_capital_is_not_a_person() {
        let persons = kinds_of("Tomorrow we leave early.", EntityKind::Person);
        assert!(persons.is_empty(), "got {persons:?}");
    }

    // ==================== Place ====================

    #[test]
    fn preposition_marks_places() {
        let places = kinds_of("We stayed in Lisbon for a week.", EntityKind::Place);
        assert!(places.contains(&"lisbon".to_string()));
    }

    #[test]
    fn suffix_marks_places() {
        let places = kinds_of("She grew up near Hamburg.", EntityKind::Place);
        assert!(places.contains(&"hamburg".to_string()));
    }

    // ==================== Technical / Date ====================

    #[test]
    fn technical_terms_match_case_insensitively() {
        let tech = kinds_of("The Database uses an index and a cache.", EntityKind::Technical);
        assert!(tech.contains(&"database".to_string()));
        assert!(tech.contains(&"index".to_string()));
        assert!(tech.contains(&"cache".to_string()));
    }

    #[test]
    fn iso_dates_recognized() {
        let dates = kinds_of("Deployed on 2025-03-14 without issues.", EntityKind::Date);
        assert!(dates.contains(&"2025-03-14".to_string()));
    }

    #[test]
    fn month_names_recognized() {
        let dates = kinds_of("We met again in march.", EntityKind::Date);
        assert!(dates.contains(&"march".to_string()));
    }

    #[test]
    fn month_day_year_recognized() {
        let dates = kinds_of("The launch happened January 5, 2024 at dawn.", EntityKind::Date);
        assert!(dates.iter().any(|d| d.starts_with("january 5")));
    }

    // ==================== Bounds and normalization ====================

    #[test]
    fn labels_are_lowercased_and_deduplicated() {
        let entities = extract_entities("Rust and rust and RUST.");
        let rust: Vec<_> = entities.iter().filter(|e| e.label == "rust").collect();
        assert_eq!(rust.len(), 1);
    }

    #[test]
    fn entity_count_is_bounded() {
        let mut content = String::new();
        for i in 0..200 {
            content.push_str(&format!("met Person{i} today. "));
        }
        assert!(extract_entities(&content).len() <= 32);
    }

    #[test]
    fn long_labels_truncate_on_char_boundary() {
        let label = "é".repeat(300);
        let normalized = normalize_label(&label);
        assert!(normalized.len() <= MAX_TAG_BYTES);
        assert!(normalized.is_char_boundary(normalized.len()));
    }

    #[test]
    fn empty_content_yields_nothing() {
        assert!(extract_entities("").is_empty());
    }

    #[test]
    fn function_words_do_not_become_concepts() {
        let concepts = kinds_of("However the plan failed.", EntityKind::Concept);
        assert!(!concepts.contains(&"however".to_string()));
    }
}
