//! Weighted Reciprocal Rank Fusion (RRF) over two rankings.

use std::collections::{HashMap, HashSet};
use ulid::Ulid;

use scribe_core::SearchHit;

/// RRF dampening constant. 60 keeps a rank-1 outlier in one list from
/// dominating the fused ranking.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Per-list RRF partial scores: every item at 1-indexed rank `r`
/// contributes `1 / (k + r)`. Items absent from the list contribute 0.
pub fn rrf_scores(hits: &[SearchHit], k: f32) -> HashMap<Ulid, f32> {
    let mut scores = HashMap::with_capacity(hits.len());

    for (rank, hit) in hits.iter().enumerate() {
        let partial = 1.0 / (k + rank as f32 + 1.0);
        // A list never legitimately repeats a chunk_id; keep the best
        // rank if one slips through.
        scores.entry(hit.chunk_id).or_insert(partial);
    }

    scores
}

/// Fuse a vector ranking and a lexical ranking.
///
/// `fused = vector_weight * rrf_vector + (1 - vector_weight) * rrf_lexical`,
/// sorted descending. The sort is stable over first-seen order (vector
/// list first), so ties and payload selection are deterministic: a chunk
/// present in both lists carries the vector list's payload.
pub fn fuse(
    vector: Vec<SearchHit>,
    lexical: Vec<SearchHit>,
    vector_weight: f32,
    k: f32,
) -> Vec<SearchHit> {
    let rrf_vector = rrf_scores(&vector, k);
    let rrf_lexical = rrf_scores(&lexical, k);

    let mut fused: Vec<SearchHit> = Vec::with_capacity(vector.len() + lexical.len());
    let mut seen: HashSet<Ulid> = HashSet::new();

    for mut hit in vector.into_iter().chain(lexical) {
        if !seen.insert(hit.chunk_id) {
            continue;
        }

        let v = rrf_vector.get(&hit.chunk_id).copied().unwrap_or(0.0);
        let l = rrf_lexical.get(&hit.chunk_id).copied().unwrap_or(0.0);
        hit.score = vector_weight * v + (1.0 - vector_weight) * l;
        hit.provenance = Some("hybrid".to_string());
        fused.push(hit);
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: Ulid, score: f32, text: &str) -> SearchHit {
        SearchHit {
            chunk_id: id,
            score,
            source_id: None,
            text: text.into(),
            start_time: 0.0,
            end_time: 1.0,
            speaker: None,
            topic_tags: vec![],
            entities: vec![],
            validation_confidence: None,
            provenance: None,
        }
    }

    fn ids(n: usize) -> Vec<Ulid> {
        (0..n).map(|i| Ulid::from(i as u128 + 1)).collect()
    }

    #[test]
    fn test_rrf_partial_scores() {
        let chunk_ids = ids(2);
        let list = vec![hit(chunk_ids[0], 0.9, "a"), hit(chunk_ids[1], 0.5, "b")];

        let scores = rrf_scores(&list, 60.0);

        assert!((scores[&chunk_ids[0]] - 1.0 / 61.0).abs() < 1e-9);
        assert!((scores[&chunk_ids[1]] - 1.0 / 62.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_exact_scores_and_order() {
        // Vector leg [A, B, C], lexical leg [B, A, D], weight 0.6.
        let chunk_ids = ids(4);
        let (a, b, c, d) = (chunk_ids[0], chunk_ids[1], chunk_ids[2], chunk_ids[3]);

        let vector = vec![hit(a, 0.9, "A"), hit(b, 0.8, "B"), hit(c, 0.7, "C")];
        let lexical = vec![hit(b, 9.0, "B"), hit(a, 8.0, "A"), hit(d, 7.0, "D")];

        let fused = fuse(vector, lexical, 0.6, 60.0);

        let expected_a = 0.6 * (1.0 / 61.0) + 0.4 * (1.0 / 62.0);
        let expected_b = 0.6 * (1.0 / 62.0) + 0.4 * (1.0 / 61.0);
        let expected_c = 0.6 * (1.0 / 63.0);
        let expected_d = 0.4 * (1.0 / 63.0);

        let order: Vec<Ulid> = fused.iter().map(|h| h.chunk_id).collect();
        assert_eq!(order, vec![a, b, c, d]);

        assert!((fused[0].score - expected_a).abs() < 1e-9);
        assert!((fused[1].score - expected_b).abs() < 1e-9);
        assert!((fused[2].score - expected_c).abs() < 1e-9);
        assert!((fused[3].score - expected_d).abs() < 1e-9);
    }

    #[test]
    fn test_payload_prefers_vector_list() {
        let chunk_ids = ids(1);
        let vector = vec![hit(chunk_ids[0], 0.9, "vector payload")];
        let lexical = vec![hit(chunk_ids[0], 5.0, "lexical payload")];

        let fused = fuse(vector, lexical, 0.5, 60.0);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].text, "vector payload");
        assert_eq!(fused[0].provenance.as_deref(), Some("hybrid"));
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        // Equal weight, both at rank 1 of their own list only: identical
        // fused score, so the vector-list item must stay first.
        let chunk_ids = ids(2);
        let vector = vec![hit(chunk_ids[0], 0.9, "v")];
        let lexical = vec![hit(chunk_ids[1], 5.0, "l")];

        let fused = fuse(vector, lexical, 0.5, 60.0);

        assert_eq!(fused[0].chunk_id, chunk_ids[0]);
        assert_eq!(fused[1].chunk_id, chunk_ids[1]);
        assert!((fused[0].score - fused[1].score).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_is_deterministic() {
        let chunk_ids = ids(3);
        let make = || {
            (
                vec![hit(chunk_ids[0], 0.9, "a"), hit(chunk_ids[1], 0.8, "b")],
                vec![hit(chunk_ids[2], 3.0, "c"), hit(chunk_ids[0], 2.0, "a")],
            )
        };

        let (v1, l1) = make();
        let (v2, l2) = make();

        let first: Vec<_> = fuse(v1, l1, 0.7, 60.0)
            .iter()
            .map(|h| (h.chunk_id, h.score))
            .collect();
        let second: Vec<_> = fuse(v2, l2, 0.7, 60.0)
            .iter()
            .map(|h| (h.chunk_id, h.score))
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_legs() {
        let chunk_ids = ids(1);
        let lexical = vec![hit(chunk_ids[0], 5.0, "l")];

        let fused = fuse(Vec::new(), lexical, 0.6, 60.0);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 0.4 * (1.0 / 61.0)).abs() < 1e-9);

        assert!(fuse(Vec::new(), Vec::new(), 0.6, 60.0).is_empty());
    }
}
