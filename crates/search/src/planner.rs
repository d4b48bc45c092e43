//! Query planning: term extraction, synonym expansion, temporal intent,
//! budget split.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SearchConfig;
use crate::types::{Plan, SearchError, SearchRequest};

/// Characters that would break term matching; removed before tokenization.
const STRIP_CHARS: &[char] = &[
    '?', '*', ':', '|', '!', '<', '>', '(', ')', '{', '}', '[', ']', '^', '"', '~',
];

/// Fixed stopword set: articles, auxiliaries, pronouns, and the query filler
/// that never identifies content.
const STOPWORDS: [&str; 95] = [
    "a", "about", "after", "again", "all", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "being", "but", "by", "can", "could", "day", "days", "did", "do", "does",
    "doing", "down", "for", "from", "get", "give", "go", "had", "has", "have", "having", "he",
    "her", "here", "him", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just",
    "last", "like", "make", "me", "month", "months", "my", "next", "no", "not", "now", "of",
    "on", "or", "our", "out", "she", "show", "so", "some", "tell", "that", "the", "their",
    "them", "then", "there", "they", "this", "to", "up", "was", "we", "week", "weeks", "what",
    "when", "where", "which", "who", "will", "with", "would", "you", "your",
];

static SYNONYMS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for line in include_str!("../data/synonyms.tsv").lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((lemma, ring)) = line.split_once('\t') else {
            continue;
        };
        map.insert(lemma, ring.split(',').map(str::trim).collect::<Vec<_>>());
    }
    map
});

static RELATIVE_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\blast\s+(\d+)?\s*(day|week|month|year)s?\b").expect("relative range regex")
});

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex"));

static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\b(?:\s+(\d{4}))?",
    )
    .expect("month regex")
});

/// Parse a query into an execution plan.
///
/// The byte budget is split 70/30 between direct and related terms; the
/// deadline, when given, is anchored at planning time.
pub fn plan(request: &SearchRequest, cfg: &SearchConfig) -> Result<Plan, SearchError> {
    let max_chars = request.max_chars.unwrap_or(cfg.max_chars_default);
    if max_chars > cfg.max_chars_limit {
        return Err(SearchError::BudgetTooLarge {
            requested: max_chars,
            limit: cfg.max_chars_limit,
        });
    }

    let cleaned: String = request
        .query
        .chars()
        .map(|c| if STRIP_CHARS.contains(&c) { ' ' } else { c })
        .collect();

    let mut direct_terms: Vec<String> = Vec::new();
    for token in cleaned.split_whitespace() {
        let term = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if term.is_empty() || term.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if STOPWORDS.contains(&term.as_str()) {
            continue;
        }
        if !direct_terms.contains(&term) {
            direct_terms.push(term);
        }
    }
    // Explicit tags ride along as direct terms; they are indexed the same
    // way in the census.
    for tag in &request.tags {
        let tag = tag.to_lowercase();
        if !tag.is_empty() && !direct_terms.contains(&tag) {
            direct_terms.push(tag);
        }
    }

    if direct_terms.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let mut related_terms: Vec<String> = Vec::new();
    for term in &direct_terms {
        if let Some(ring) = SYNONYMS.get(term.as_str()) {
            for member in ring {
                let member = member.to_string();
                if !direct_terms.contains(&member) && !related_terms.contains(&member) {
                    related_terms.push(member);
                }
            }
        }
    }

    Ok(Plan {
        query: request.query.clone(),
        direct_terms,
        related_terms,
        temporal_window: temporal_window(&request.query, Utc::now()),
        code_weight: request.code_weight.unwrap_or(cfg.code_weight_default),
        max_chars,
        deadline: request
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms)),
    })
}

/// Extract temporal intent from natural-language patterns.
pub fn temporal_window(
    query: &str,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if let Some(caps) = RELATIVE_RANGE_RE.captures(query) {
        let n: i64 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(1);
        let days = match caps[2].to_lowercase().as_str() {
            "day" => n,
            "week" => n * 7,
            "month" => n * 30,
            _ => n * 365,
        };
        return Some((now - chrono::Duration::days(days), now));
    }

    let iso_dates: Vec<DateTime<Utc>> = ISO_DATE_RE
        .captures_iter(query)
        .filter_map(|caps| {
            let date = NaiveDate::from_ymd_opt(
                caps[1].parse().ok()?,
                caps[2].parse().ok()?,
                caps[3].parse().ok()?,
            )?;
            Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
        })
        .collect();
    match iso_dates.len() {
        0 => {}
        1 => return Some((iso_dates[0], iso_dates[0] + chrono::Duration::days(1))),
        _ => {
            let t0 = *iso_dates.iter().min()?;
            let t1 = *iso_dates.iter().max()? + chrono::Duration::days(1);
            return Some((t0, t1));
        }
    }

    if let Some(caps) = MONTH_RE.captures(query) {
        let month = match caps[1].to_lowercase().as_str() {
            "january" => 1,
            "february" => 2,
            "march" => 3,
            "april" => 4,
            "may" => 5,
            "june" => 6,
            "july" => 7,
            "august" => 8,
            "september" => 9,
            "october" => 10,
            "november" => 11,
            _ => 12,
        };
        let year = caps
            .get(2)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or(now.year());
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let end = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        return Some((
            Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0)?),
            Utc.from_utc_datetime(&end.and_hms_opt(0, 0, 0)?),
        ));
    }

    None
}
