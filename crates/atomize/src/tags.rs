//! Tag derivation: a declarative rule table plus a handful of compositional
//! rules over recognized entities.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::entities::{Entity, EntityKind};
use crate::types::Tag;

/// Maximum tags emitted per molecule.
const MAX_TAGS: usize = 8;

/// One derivation rule: every listed trigger substring is optional (any one
/// suffices), every required entity kind must be present, and no exclusion
/// substring may appear.
struct TagRule {
    triggers: &'static [&'static str],
    required: &'static [EntityKind],
    exclusions: &'static [&'static str],
    tag: Tag,
}

static RULES: &[TagRule] = &[
    TagRule {
        triggers: &[],
        required: &[EntityKind::Technical],
        exclusions: &[],
        tag: Tag::Technical,
    },
    TagRule {
        triggers: &["deploy", "compil", "refactor", "benchmark", "stack trace", "pull request"],
        required: &[],
        exclusions: &[],
        tag: Tag::Technical,
    },
    TagRule {
        triggers: &[
            "company", "startup", "market", "revenue", "customer", "investor", "quarterly",
            "hiring",
        ],
        required: &[],
        exclusions: &["farmers market", "flea market"],
        tag: Tag::Industry,
    },
    TagRule {
        triggers: &[],
        required: &[EntityKind::Place],
        exclusions: &[],
        tag: Tag::Location,
    },
    TagRule {
        triggers: &["travel", "visited", "flight", "drove to", "arrived in"],
        required: &[],
        exclusions: &[],
        tag: Tag::Location,
    },
    TagRule {
        triggers: &[
            "happy", "sad", "angry", "anxious", "excited", "love", "hate", "afraid", "grateful",
            "frustrat", "worried", "relieved",
        ],
        required: &[],
        exclusions: &["love handles"],
        tag: Tag::Emotional,
    },
    TagRule {
        triggers: &[],
        required: &[EntityKind::Date],
        exclusions: &[],
        tag: Tag::Temporal,
    },
    TagRule {
        triggers: &[
            "yesterday",
            "tomorrow",
            "last week",
            "last month",
            "next week",
            "next month",
            "this morning",
            "tonight",
            "years ago",
        ],
        required: &[],
        exclusions: &[],
        tag: Tag::Temporal,
    },
    TagRule {
        triggers: &[
            "because",
            "therefore",
            "as a result",
            "due to",
            "caused",
            "led to",
            "consequently",
        ],
        required: &[],
        exclusions: &[],
        tag: Tag::Causal,
    },
];

static CHAT_SPEAKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:[A-Z][a-z]{1,20}|user|assistant|me|them)\s*:\s+\S").expect("speaker regex")
});

static TIME_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:yesterday|today|tomorrow|last\s+(?:night|week|month|year)|next\s+(?:week|month|year)|this\s+(?:morning|afternoon|evening)|ago)\b")
        .expect("time reference regex")
});

static CODE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:fn|function|class|const|let|import|return|pub|def|struct|impl|var)\b")
        .expect("code token regex")
});

/// True when the span reads like source code rather than prose.
pub fn looks_like_code(content: &str) -> bool {
    if content.contains("```") {
        return true;
    }
    let specials = content
        .chars()
        .filter(|c| matches!(c, '{' | '}' | '(' | ')' | ';' | '=' | '<' | '>'))
        .count();
    let total = content.chars().count().max(1);
    CODE_TOKEN_RE.is_match(content) && specials * 100 / total >= 3
}

/// Derive a bounded, deduplicated tag set for a span.
///
/// Compositional rules run first (they encode relationships between
/// entities), then the declarative table, in order. Output is capped at 8.
pub fn derive_tags(content: &str, entities: &[Entity]) -> Vec<Tag> {
    let lower = content.to_lowercase();
    let mut tags: Vec<Tag> = Vec::new();
    let mut add = |tags: &mut Vec<Tag>, tag: Tag| {
        if tags.len() < MAX_TAGS && !tags.contains(&tag) {
            tags.push(tag);
        }
    };

    let persons = entities
        .iter()
        .filter(|e| e.kind == EntityKind::Person)
        .count();
    let has_time_reference = entities.iter().any(|e| e.kind == EntityKind::Date)
        || TIME_REFERENCE_RE.is_match(&lower);

    if persons >= 2 {
        add(&mut tags, Tag::Relationship);
    }
    if persons >= 1 && has_time_reference {
        add(&mut tags, Tag::Narrative);
    }
    if CHAT_SPEAKER_RE.is_match(content) {
        add(&mut tags, Tag::Narrative);
    }
    if looks_like_code(content) {
        add(&mut tags, Tag::Code);
    }

    for rule in RULES {
        let triggered =
            rule.triggers.is_empty() || rule.triggers.iter().any(|t| lower.contains(t));
        if !triggered {
            continue;
        }
        if !rule
            .required
            .iter()
            .all(|k| entities.iter().any(|e| e.kind == *k))
        {
            continue;
        }
        if rule.exclusions.iter().any(|x| lower.contains(x)) {
            continue;
        }
        add(&mut tags, rule.tag);
    }

    tags
}
