//! Edit-distance similarity on a 0-100 scale
//!
//! `ratio` is `100 * (len(a) + len(b) - d) / (len(a) + len(b))` where `d` is
//! the Levenshtein distance with substitutions weighted 2 (insertions and
//! deletions only), which reduces to `200 * lcs / (len(a) + len(b))`.
//! Lengths are counted in chars. Either string empty yields 0.

/// Lowercase, trim and collapse internal whitespace runs
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Similarity ratio in [0, 100]
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let lcs = lcs_len(&a, &b);
    let total = (a.len() + b.len()) as f64;
    ((200.0 * lcs as f64) / total).round() as u8
}

/// Ratio after `normalize_text` on both sides
pub fn normalized_ratio(a: &str, b: &str) -> u8 {
    ratio(&normalize_text(a), &normalize_text(b))
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
