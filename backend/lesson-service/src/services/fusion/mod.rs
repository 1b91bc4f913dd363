//! Reciprocal Rank Fusion
//!
//! score(d) = Σ over lists containing d of 1 / (k + rank(d)), rank 1-based.
//! Only ranks matter, so lexical scores and cosine similarities never need
//! calibrating against each other.

use crate::models::{FusedCandidate, ScoredHit};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_RRF_K: usize = 60;
pub const DEFAULT_CANDIDATE_BUDGET: usize = 50;

#[derive(Debug, Clone)]
pub struct RrfFuser {
    k: usize,
    limit: usize,
}

impl Default for RrfFuser {
    fn default() -> Self {
        Self::new(DEFAULT_RRF_K, DEFAULT_CANDIDATE_BUDGET)
    }
}

impl RrfFuser {
    pub fn new(k: usize, limit: usize) -> Self {
        Self { k, limit }
    }

    pub fn fuse(&self, lists: &[&[ScoredHit]]) -> Vec<FusedCandidate> {
        let ids: Vec<Vec<&str>> = lists
            .iter()
            .map(|hits| hits.iter().map(|hit| hit.chunk_id.as_str()).collect())
            .collect();
        reciprocal_rank_fusion(&ids, self.k, self.limit)
    }
}

/// Fuse ranked id lists into one list, best first
///
/// Ties are broken by chunk id ascending. A chunk repeated inside one list
/// counts at its first position only.
pub fn reciprocal_rank_fusion<S: AsRef<str>>(
    lists: &[Vec<S>],
    k: usize,
    limit: usize,
) -> Vec<FusedCandidate> {
    let mut scores: HashMap<&str, f64> = HashMap::new();

    for list in lists {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut rank = 0usize;
        for id in list {
            let id = id.as_ref();
            if !seen.insert(id) {
                continue;
            }
            rank += 1;
            *scores.entry(id).or_insert(0.0) += 1.0 / (k + rank) as f64;
        }
    }

    let mut fused: Vec<FusedCandidate> = scores
        .into_iter()
        .map(|(chunk_id, score)| FusedCandidate {
            chunk_id: chunk_id.to_string(),
            score,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(fused: &[FusedCandidate]) -> Vec<&str> {
        fused.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_worked_example() {
        let lists = vec![vec!["A", "B", "C"], vec!["B", "A", "D"]];
        let fused = reciprocal_rank_fusion(&lists, 60, 50);

        assert_eq!(ids(&fused), vec!["A", "B", "C", "D"]);
        let expected_ab = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((fused[0].score - expected_ab).abs() < 1e-12);
        assert_eq!(fused[0].score, fused[1].score);
        assert!((fused[2].score - 1.0 / 63.0).abs() < 1e-12);
        assert_eq!(fused[2].score, fused[3].score);
    }

    #[test]
    fn test_absent_chunks_never_appear() {
        let lists = vec![vec!["x-0", "y-0"], vec!["z-0"]];
        let fused = reciprocal_rank_fusion(&lists, 60, 50);

        assert_eq!(fused.len(), 3);
        assert!(!ids(&fused).contains(&"w-0"));
    }

    #[test]
    fn test_first_everywhere_has_max_score() {
        let lists = vec![
            vec!["top", "a", "b"],
            vec!["top", "b", "c"],
            vec!["top", "c", "a"],
        ];
        let fused = reciprocal_rank_fusion(&lists, 60, 50);

        assert_eq!(fused[0].chunk_id, "top");
        assert!(fused.iter().skip(1).all(|c| c.score < fused[0].score));
    }

    #[test]
    fn test_score_non_increasing_with_rank() {
        let list: Vec<String> = (0..20).map(|i| format!("c-{:02}", i)).collect();
        let fused = reciprocal_rank_fusion(&[list.clone()], 60, 50);

        for window in fused.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        let order: Vec<&str> = ids(&fused);
        let expected: Vec<&str> = list.iter().map(|s| s.as_str()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_one_empty_list_is_tolerated() {
        let lists: Vec<Vec<&str>> = vec![vec![], vec!["d-0", "e-0"]];
        let fused = reciprocal_rank_fusion(&lists, 60, 50);
        assert_eq!(ids(&fused), vec!["d-0", "e-0"]);

        let none: Vec<Vec<&str>> = vec![vec![], vec![]];
        assert!(reciprocal_rank_fusion(&none, 60, 50).is_empty());
    }

    #[test]
    fn test_truncates_to_budget() {
        let list: Vec<String> = (0..80).map(|i| format!("c-{}", i)).collect();
        assert_eq!(reciprocal_rank_fusion(&[list], 60, 50).len(), 50);
    }

    #[test]
    fn test_duplicate_in_one_list_counts_once() {
        let lists = vec![vec!["a", "a", "b"]];
        let fused = reciprocal_rank_fusion(&lists, 60, 50);

        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[1].score - 1.0 / 62.0).abs() < 1e-12);
    }

    #[test]
    fn test_fuser_over_hits() {
        let lexical = vec![ScoredHit::new("a-0", 9.0), ScoredHit::new("b-0", 3.0)];
        let dense = vec![ScoredHit::new("b-0", 0.9)];
        let fused = RrfFuser::default().fuse(&[lexical.as_slice(), dense.as_slice()]);

        assert_eq!(ids(&fused), vec!["b-0", "a-0"]);
    }
}
