//! Streaming-window slicing.
//!
//! Windows target `chunk_bytes`, overlap by `overlap_bytes`, and end at the
//! best break point available: a paragraph break beats a sentence break
//! beats a line break beats a hard cut. Break points are searched from half
//! the nominal window up to `lookahead_bytes` past it; a window never closes
//! below 50% of nominal unless the body itself ends.

use atomize::ByteRange;

use crate::config::IngestConfig;

/// Slicing parameters extracted from the ingest config.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan {
    pub chunk_bytes: usize,
    pub overlap_bytes: usize,
    pub lookahead_bytes: usize,
}

impl From<&IngestConfig> for ChunkPlan {
    fn from(cfg: &IngestConfig) -> Self {
        Self {
            chunk_bytes: cfg.chunk_bytes,
            overlap_bytes: cfg.overlap_bytes.min(cfg.chunk_bytes / 4),
            lookahead_bytes: cfg.lookahead_bytes,
        }
    }
}

/// Compute the window ranges covering `body`.
///
/// Consecutive windows overlap so a span cut by one boundary reappears whole
/// in the next window; the pipeline deduplicates on emission. The union of
/// all windows always covers the body exactly once.
pub fn windows(body: &str, plan: ChunkPlan) -> Vec<ByteRange> {
    let len = body.len();
    if len == 0 {
        return Vec::new();
    }
    if len <= plan.chunk_bytes {
        return vec![ByteRange { start: 0, end: len }];
    }

    let mut out = Vec::new();
    let mut start = 0usize;
    loop {
        let nominal_end = start + plan.chunk_bytes;
        if nominal_end >= len {
            out.push(ByteRange { start, end: len });
            break;
        }
        let floor = start + plan.chunk_bytes / 2;
        let ceiling = (nominal_end + plan.lookahead_bytes).min(len);
        let end = pick_break(body, floor, nominal_end, ceiling);
        out.push(ByteRange { start, end });
        if end >= len {
            break;
        }
        let mut next = end.saturating_sub(plan.overlap_bytes).max(start + 1);
        while next < len && !body.is_char_boundary(next) {
            next += 1;
        }
        start = next;
    }
    out
}

/// Choose the best break position in `[floor, ceiling]`, preferring the one
/// closest to `nominal` within each break class.
fn pick_break(body: &str, floor: usize, nominal: usize, ceiling: usize) -> usize {
    let floor = snap_forward(body, floor);
    let ceiling = snap_backward(body, ceiling);
    if ceiling <= floor {
        return snap_backward(body, nominal.min(body.len())).max(floor);
    }
    let region = &body[floor..ceiling];

    for pattern in ["\n\n", ". ", "! ", "? ", "\n"] {
        if let Some(pos) = best_match(region, pattern, nominal - floor.min(nominal)) {
            return floor + pos + pattern.len();
        }
    }
    // No break at all in the region: hard cut at the nominal end.
    snap_backward(body, nominal).max(floor)
}

/// Occurrence of `pattern` closest to `target` (byte index into `region`).
fn best_match(region: &str, pattern: &str, target: usize) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut from = 0usize;
    while let Some(found) = region[from..].find(pattern) {
        let pos = from + found;
        match best {
            Some(b) if pos.abs_diff(target) >= b.abs_diff(target) => {}
            _ => best = Some(pos),
        }
        from = pos + pattern.len();
        if pos > target && from > target + pattern.len() {
            break;
        }
    }
    best
}

fn snap_forward(body: &str, mut pos: usize) -> usize {
    pos = pos.min(body.len());
    while pos < body.len() && !body.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

fn snap_backward(body: &str, mut pos: usize) -> usize {
    pos = pos.min(body.len());
    while pos > 0 && !body.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}
