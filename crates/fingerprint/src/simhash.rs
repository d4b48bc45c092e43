//! Simhash computation over token shingles.
//!
//! Tokens are whitespace-split and lowercased, folded into k-gram shingles,
//! and each shingle is hashed with a Jenkins one-at-a-time pass. A signed
//! 64-lane accumulator votes per bit; the sign of each lane becomes the
//! corresponding fingerprint bit.

use crate::config::FingerprintConfig;

/// Compute the 64-bit simhash of `text` under `cfg`.
///
/// Empty or whitespace-only input produces the zero fingerprint. Inputs with
/// fewer tokens than the shingle length wrap around so short fragments still
/// fingerprint deterministically.
pub fn simhash(text: &str, cfg: &FingerprintConfig) -> u64 {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return 0;
    }

    let k = cfg.shingle_len.max(1);
    let mut acc = [0i64; 64];
    let mut shingle = String::new();

    let fold = |acc: &mut [i64; 64], h: u32| {
        for (i, lane) in acc.iter_mut().enumerate() {
            if (h >> (i % 32)) & 1 == 1 {
                *lane += 1;
            } else {
                *lane -= 1;
            }
        }
    };

    if tokens.len() < k {
        // Wraparound path: treat the token list as circular so every token
        // anchors exactly one shingle.
        for start in 0..tokens.len() {
            shingle.clear();
            for j in 0..k {
                if j > 0 {
                    shingle.push('\u{1f}');
                }
                shingle.push_str(&tokens[(start + j) % tokens.len()]);
            }
            fold(&mut acc, oaat_hash(shingle.as_bytes(), cfg.seed));
        }
    } else {
        for window in tokens.windows(k) {
            shingle.clear();
            for (j, token) in window.iter().enumerate() {
                if j > 0 {
                    shingle.push('\u{1f}');
                }
                shingle.push_str(token);
            }
            fold(&mut acc, oaat_hash(shingle.as_bytes(), cfg.seed));
        }
    }

    let mut out = 0u64;
    for (i, &lane) in acc.iter().enumerate() {
        if lane > 0 {
            out |= 1 << i;
        }
    }
    out
}

/// Hamming distance between two fingerprints, in `[0, 64]`.
pub fn distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// Jenkins one-at-a-time hash, seeded.
fn oaat_hash(bytes: &[u8], seed: u32) -> u32 {
    let mut h = seed;
    for &b in bytes {
        h = h.wrapping_add(b as u32);
        h = h.wrapping_add(h << 10);
        h ^= h >> 6;
    }
    h = h.wrapping_add(h << 3);
    h ^= h >> 11;
    h.wrapping_add(h << 15)
}
