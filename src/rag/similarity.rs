//! Cosine similarity over dense embedding vectors.

use std::cmp::Ordering;

/// Cosine similarity clamped to [-1, 1]; 0.0 for empty, mismatched, or
/// zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denom = norm_a * norm_b;
    if denom <= f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Scores every candidate against the query and returns (index, score) pairs
/// in descending score order. The sort is stable, so ties keep the original
/// candidate order.
pub fn rank_descending_by_cosine(query: &[f32], candidates: &[Vec<f32>]) -> Vec<(usize, f32)> {
    let mut scores: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
        .collect();

    scores.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = [1.0, 2.0, 3.0, 4.0];
        assert!(approx_eq(cosine_similarity(&vec, &vec), 1.0));
    }

    #[test]
    fn cosine_is_zero_for_orthogonal_vectors() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
    }

    #[test]
    fn zero_norm_and_mismatched_inputs_score_zero() {
        assert!(approx_eq(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0));
        assert!(approx_eq(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0));
        assert!(approx_eq(cosine_similarity(&[], &[]), 0.0));
    }

    #[test]
    fn ranking_returns_highest_similarity_first() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![0.8, 0.2], vec![0.1, 0.9], vec![0.9, 0.0]];
        let ranked = rank_descending_by_cosine(&query, &candidates);

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[2].0, 1);
    }

    #[test]
    fn ties_keep_original_order() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![2.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]];
        let ranked = rank_descending_by_cosine(&query, &candidates);

        // all three are colinear with the query: score 1.0, input order kept
        assert_eq!(
            ranked.iter().map(|(idx, _)| *idx).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }
}
