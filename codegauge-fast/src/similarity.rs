//! Text similarity kernels.
//!
//! Two consumers in the analyzer: duplicate-block clustering (token
//! shingles over normalized source lines) and plan remap candidates
//! (word-set Jaccard over finding summaries). Both thresholds live in the
//! analyzer's policy module, not here.

use rayon::prelude::*;
use rustc_hash::FxHashSet;

/// Jaccard similarity of two word sets, case-insensitive.
///
/// Returns 0.0 for two empty inputs: no shared evidence is not a match.
pub fn word_set_jaccard(a: &str, b: &str) -> f64 {
    let set_a: FxHashSet<String> = words(a).collect();
    let set_b: FxHashSet<String> = words(b).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.len() + set_b.len() - intersection;
    intersection as f64 / union as f64
}

fn words(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Normalize a source line for shingling: collapse whitespace, drop blanks.
fn normalize_line(line: &str) -> Option<String> {
    let collapsed: String = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Build the set of `window`-line shingles for a block of source text.
pub fn line_shingles(text: &str, window: usize) -> FxHashSet<u64> {
    let lines: Vec<String> = text.lines().filter_map(normalize_line).collect();
    let mut shingles = FxHashSet::default();
    if lines.len() < window || window == 0 {
        return shingles;
    }
    for w in lines.windows(window) {
        shingles.insert(hash_shingle(w));
    }
    shingles
}

fn hash_shingle(lines: &[String]) -> u64 {
    // FNV-1a over the joined window; stable across runs and platforms.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for line in lines {
        for byte in line.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100_0000_01b3);
        }
        hash ^= u64::from(b'\n');
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    hash
}

/// Jaccard similarity between two shingle sets.
pub fn shingle_jaccard(a: &FxHashSet<u64>, b: &FxHashSet<u64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Pairwise shingle similarity for a batch of blocks.
///
/// Returns `(i, j, similarity)` for every pair at or above `threshold`,
/// with `i < j`. Pairs are computed in parallel per left index.
pub fn similar_pairs(
    shingle_sets: &[FxHashSet<u64>],
    threshold: f64,
) -> Vec<(usize, usize, f64)> {
    let mut pairs: Vec<(usize, usize, f64)> = (0..shingle_sets.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            let sets = shingle_sets;
            ((i + 1)..sets.len()).filter_map(move |j| {
                let sim = shingle_jaccard(&sets[i], &sets[j]);
                (sim >= threshold).then_some((i, j, sim))
            })
        })
        .collect();
    pairs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_set_jaccard_identical() {
        assert_eq!(word_set_jaccard("unused import foo", "unused import foo"), 1.0);
    }

    #[test]
    fn test_word_set_jaccard_case_insensitive() {
        assert_eq!(word_set_jaccard("Large File", "large file"), 1.0);
    }

    #[test]
    fn test_word_set_jaccard_disjoint() {
        assert_eq!(word_set_jaccard("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_word_set_jaccard_empty() {
        assert_eq!(word_set_jaccard("", "anything"), 0.0);
    }

    #[test]
    fn test_line_shingles_ignores_whitespace_variation() {
        let a = line_shingles("fn  main() {\n    body();\n}\n", 2);
        let b = line_shingles("fn main() {\nbody();\n}\n", 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_similar_pairs_threshold() {
        let block = "let a = 1;\nlet b = 2;\nlet c = 3;\nlet d = 4;\n";
        let other = "completely\ndifferent\ncontent\nhere\n";
        let sets = vec![
            line_shingles(block, 2),
            line_shingles(block, 2),
            line_shingles(other, 2),
        ];
        let pairs = similar_pairs(&sets, 0.8);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0, pairs[0].1), (0, 1));
        assert!(pairs[0].2 >= 0.999);
    }
}
