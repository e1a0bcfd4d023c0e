//! Ratcliff/Obershelp ("gestalt pattern matching") string similarity.

/// Similarity ratio in `[0, 1]`: twice the number of matching characters over
/// the total length of both strings.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

/// Characters in common: the longest common substring, plus whatever matches
/// recursively to its left and to its right.
fn matching_characters(a: &[char], b: &[char]) -> usize {
    let (a_start, b_start, len) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_characters(&a[..a_start], &b[..b_start])
        + matching_characters(&a[a_start + len..], &b[b_start + len..])
}

/// Leftmost longest common substring as `(start in a, start in b, length)`.
fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            current[j] = if a[i - 1] == b[j - 1] {
                previous[j - 1] + 1
            } else {
                0
            };
            if current[j] > best.2 {
                best = (i - current[j], j - current[j], current[j]);
            }
        }
        std::mem::swap(&mut previous, &mut current);
    }
    best
}
