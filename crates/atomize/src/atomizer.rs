//! Document decomposition: canonicalize, split into byte-ranged molecules,
//! classify, and derive atoms.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use fingerprint::{simhash, FingerprintConfig};

use crate::entities::extract_entities;
use crate::error::AtomizeError;
use crate::sanitize::sanitize;
use crate::tags::{derive_tags, looks_like_code};
use crate::types::{
    atom_id, compound_id, molecule_id, Atom, ByteRange, Compound, Molecule, MoleculeKind,
    Provenance, Tag,
};

/// Configuration for the atomizer.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomizeConfig {
    /// Upper bound on a single span. Spans that still exceed this after
    /// sentence splitting (no usable boundary) are hard-wrapped at
    /// whitespace.
    pub max_paragraph_bytes: usize,
    /// Spans with fewer content bytes than this are dropped.
    pub min_molecule_bytes: usize,
    /// Fingerprint configuration for the compound signature.
    pub fingerprint: FingerprintConfig,
}

impl Default for AtomizeConfig {
    fn default() -> Self {
        Self {
            max_paragraph_bytes: 500,
            min_molecule_bytes: 10,
            fingerprint: FingerprintConfig::default(),
        }
    }
}

impl AtomizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_paragraph_bytes(mut self, bytes: usize) -> Self {
        self.max_paragraph_bytes = bytes.max(1);
        self
    }

    pub fn with_min_molecule_bytes(mut self, bytes: usize) -> Self {
        self.min_molecule_bytes = bytes;
        self
    }
}

/// Result of decomposing one document.
#[derive(Debug, Clone)]
pub struct Atomized {
    pub compound: Compound,
    pub molecules: Vec<Molecule>,
    pub atoms: Vec<Atom>,
}

/// Canonicalize raw text into the body every offset refers to: normalize
/// line endings, then sanitize. Already-canonical input passes through
/// unchanged.
pub fn canonical_body(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    sanitize(&unified)
}

/// Decompose a whole document in one pass.
///
/// All molecule offsets are byte positions into the returned compound's
/// body — the canonicalized text this function produces, not the raw input.
pub fn atomize(
    raw: &str,
    source: &str,
    provenance: Provenance,
    cfg: &AtomizeConfig,
) -> Result<Atomized, AtomizeError> {
    let body = canonical_body(raw);
    if body.trim().is_empty() {
        return Err(AtomizeError::EmptyBody);
    }

    let id = compound_id(source, &body);
    let signature = simhash(&body, &cfg.fingerprint);
    let whole = ByteRange::new(0, body.len())?;
    let (molecules, atoms) = atomize_segment(&body, whole, &id, 0, cfg)?;

    debug!(
        compound_id = %id,
        n_molecules = molecules.len(),
        n_atoms = atoms.len(),
        body_bytes = body.len(),
        "atomized"
    );

    Ok(Atomized {
        compound: Compound {
            id,
            body,
            source: source.to_string(),
            ingested_at: Utc::now(),
            provenance,
            signature,
            buckets: Vec::new(),
        },
        molecules,
        atoms,
    })
}

/// Decompose one segment of an already-canonicalized body.
///
/// The streaming ingest path calls this once per window; `segment` bounds the
/// region to scan and `sequence_base` keeps molecule sequence numbers (and
/// therefore ids) globally ordered across windows. Offsets in the returned
/// molecules are absolute positions in `body`.
pub fn atomize_segment(
    body: &str,
    segment: ByteRange,
    compound: &str,
    sequence_base: u32,
    cfg: &AtomizeConfig,
) -> Result<(Vec<Molecule>, Vec<Atom>), AtomizeError> {
    let segment = ByteRange::checked(body, segment.start, segment.end)?;
    let text = &body[segment.start..segment.end];

    // Paragraphs first, then sentences within each paragraph; anything left
    // over the span cap (a boundary-free run) is hard-wrapped at whitespace.
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for (p_start, p_end) in paragraph_spans(text) {
        let mut sentence_cuts = Vec::new();
        sentence_spans(&text[p_start..p_end], p_start, &mut sentence_cuts);
        for (s_start, s_end) in sentence_cuts {
            if s_end - s_start > cfg.max_paragraph_bytes {
                hard_wrap(text, s_start, s_end, cfg.max_paragraph_bytes, &mut spans);
            } else {
                spans.push((s_start, s_end));
            }
        }
    }

    let mut molecules = Vec::new();
    let mut atoms = Vec::new();
    let mut sequence = sequence_base;

    for (raw_start, raw_end) in spans {
        let Some((start, end)) = narrow_to_content(text, raw_start, raw_end) else {
            continue;
        };
        let content = &text[start..end];
        if content.len() < cfg.min_molecule_bytes {
            continue;
        }

        let range = ByteRange::checked(body, segment.start + start, segment.start + end)?;
        let (kind, numeric_value, numeric_unit) = classify(content);
        let entities = extract_entities(content);
        let mut tags = derive_tags(content, &entities);
        match kind {
            MoleculeKind::Code => {
                if !tags.contains(&Tag::Code) {
                    tags.insert(0, Tag::Code);
                    tags.truncate(8);
                }
            }
            MoleculeKind::Data => {
                if !tags.contains(&Tag::Data) {
                    tags.insert(0, Tag::Data);
                    tags.truncate(8);
                }
            }
            MoleculeKind::Prose => {}
        }

        let mol_id = molecule_id(compound, sequence);
        for entity in &entities {
            let id = atom_id(&mol_id, &entity.label);
            if atoms.iter().any(|a: &Atom| a.id == id) {
                continue;
            }
            atoms.push(Atom {
                id,
                molecule_id: mol_id.clone(),
                label: entity.label.clone(),
                tags: tags.clone(),
            });
        }

        molecules.push(Molecule {
            id: mol_id,
            compound_id: compound.to_string(),
            sequence,
            range,
            kind,
            content: content.to_string(),
            numeric_value,
            numeric_unit,
            tags,
            embedding: Vec::new(),
            vector_id: None,
        });
        sequence += 1;
    }

    Ok((molecules, atoms))
}

/// Paragraph boundaries: maximal runs of non-blank lines, found with a
/// running byte cursor over `text`.
fn paragraph_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut para_start: Option<usize> = None;
    let mut cursor = 0usize;
    for line in text.split_inclusive('\n') {
        let line_start = cursor;
        cursor += line.len();
        if line.trim().is_empty() {
            if let Some(start) = para_start.take() {
                spans.push((start, line_start));
            }
        } else if para_start.is_none() {
            para_start = Some(line_start);
        }
    }
    if let Some(start) = para_start {
        spans.push((start, text.len()));
    }
    spans
}

const ABBREVIATIONS: [&str; 16] = [
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "eg", "ie", "fig", "no",
    "inc", "approx",
];

/// Split an oversized paragraph on sentence boundaries: terminal punctuation
/// followed by whitespace, unless the preceding token is a known
/// abbreviation or a single-letter initial.
fn sentence_spans(paragraph: &str, base: usize, out: &mut Vec<(usize, usize)>) {
    let mut start = 0usize;
    let mut iter = paragraph.char_indices().peekable();
    while let Some((i, ch)) = iter.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let Some(&(next_idx, next_ch)) = iter.peek() else {
            continue;
        };
        if !next_ch.is_whitespace() {
            continue;
        }
        if ch == '.' && is_abbreviation(paragraph, i) {
            continue;
        }
        out.push((base + start, base + next_idx));
        start = next_idx;
    }
    if start < paragraph.len() {
        out.push((base + start, base + paragraph.len()));
    }
}

/// Is the token ending at `dot_idx` an abbreviation or initial?
fn is_abbreviation(text: &str, dot_idx: usize) -> bool {
    let head = &text[..dot_idx];
    let word_start = head
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let word: String = head[word_start..]
        .chars()
        .filter(|c| *c != '.')
        .collect::<String>()
        .to_lowercase();
    word.chars().count() == 1 || ABBREVIATIONS.contains(&word.as_str())
}

/// Hard-wrap a boundary-free span at the last whitespace within `max` bytes,
/// falling back to the nearest character boundary when a run has no
/// whitespace at all.
fn hard_wrap(text: &str, start: usize, end: usize, max: usize, out: &mut Vec<(usize, usize)>) {
    let mut cursor = start;
    while end - cursor > max {
        let window = &text[cursor..end];
        let mut cut = max;
        while cut > 0 && !window.is_char_boundary(cut) {
            cut -= 1;
        }
        let ws_cut = window[..cut]
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8());
        let split = match ws_cut {
            Some(p) if p > 0 => p,
            _ => cut.max(1),
        };
        out.push((cursor, cursor + split));
        cursor += split;
    }
    if cursor < end {
        out.push((cursor, end));
    }
}

/// Narrow a span to its non-whitespace extent, so the body slice over the
/// final range equals the molecule content byte-for-byte.
fn narrow_to_content(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed_end = slice.trim_end().len();
    if trimmed_end <= leading {
        return None;
    }
    Some((start + leading, start + trimmed_end))
}

static CODE_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:fn|function|class|const|let|import|return|pub|def|struct|impl|var)\b")
        .expect("code keyword regex")
});

static DATA_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:\|[^|\n]+(?:\|[^|\n]*)+\|?|[\w .\-/]{1,40}:\s*[^\n]+)\s*$")
        .expect("data row regex")
});

static NUMBER_UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-?\d+(?:[.,]\d+)?)\s*(%|°[CFcf]|[A-Za-zµ]{1,6})\b").expect("number unit regex")
});

/// Brace/operator density above this fraction (percent) counts as a code
/// signal.
const BRACE_DENSITY_PCT: usize = 3;

/// Classify a span as prose, code, or data; for data rows, return the first
/// `(number, unit)` capture.
fn classify(content: &str) -> (MoleculeKind, Option<f64>, Option<String>) {
    let mut signals = 0;
    if content.contains("```") {
        signals += 1;
    }
    if CODE_KEYWORD_RE.is_match(content) {
        signals += 1;
    }
    let specials = content
        .chars()
        .filter(|c| matches!(c, '{' | '}' | '(' | ')' | ';' | '='))
        .count();
    if specials * 100 / content.chars().count().max(1) >= BRACE_DENSITY_PCT {
        signals += 1;
    }
    if signals >= 2 || (signals >= 1 && looks_like_code(content)) {
        return (MoleculeKind::Code, None, None);
    }

    for row in DATA_ROW_RE.find_iter(content) {
        if let Some(caps) = NUMBER_UNIT_RE.captures(row.as_str()) {
            let value = caps[1].replace(',', ".").parse::<f64>().ok();
            let unit = caps[2].to_string();
            if let Some(value) = value {
                return (MoleculeKind::Data, Some(value), Some(unit));
            }
        }
    }

    (MoleculeKind::Prose, None, None)
}
