//! Fuzzy string similarity on a 0-100 scale
//!
//! `ratio` is the normalized indel similarity (twice the longest common
//! subsequence over the combined length). `partial_ratio` slides the shorter
//! string across the longer one and keeps the best window, so a short trigger
//! phrase embedded in a long sentence still scores 100.

/// Length of the longest common subsequence of two char slices.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
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

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Whole-string similarity in [0, 100].
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best similarity between the shorter string and any same-length window of
/// the longer one, including windows clipped at either edge.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return 0.0;
    }

    let m = short.len();
    let n = long.len();
    let mut best: f64 = 0.0;

    for start in 0..=(n - m) {
        best = best.max(ratio_chars(&short, &long[start..start + m]));
        if best >= 100.0 {
            return 100.0;
        }
    }

    for len in 1..m.min(n + 1) {
        best = best.max(ratio_chars(&short, &long[..len]));
        best = best.max(ratio_chars(&short, &long[n - len..]));
    }

    best
}
