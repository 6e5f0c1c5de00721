//! Vector similarity and result merging for knowledge retrieval.

use std::collections::HashMap;

use rigchat_core::knowledge::KnowledgeEntry;

/// Cosine similarity in [-1, 1]. Returns 0.0 for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Entries whose embedding similarity to `query` is strictly above `threshold`,
/// best first, with `score` set to the similarity.
pub fn vector_search(
    entries: &[KnowledgeEntry],
    query: &[f32],
    limit: usize,
    threshold: f32,
) -> Vec<KnowledgeEntry> {
    let mut scored: Vec<KnowledgeEntry> = entries
        .iter()
        .filter_map(|entry| {
            let sim = cosine_similarity(entry.embedding.as_ref()?, query);
            (sim > threshold).then(|| {
                let mut e = entry.clone();
                e.score = sim;
                e
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// Merge lexical and semantic results, deduplicated by id.
///
/// Lexical scores are divided by the best lexical score so both lists share
/// the [0, 1] scale. When an entry appears twice the higher-scored copy wins.
pub fn merge_results(
    lexical: Vec<KnowledgeEntry>,
    semantic: Vec<KnowledgeEntry>,
    limit: usize,
) -> Vec<KnowledgeEntry> {
    let top = lexical.iter().map(|e| e.score).fold(0.0f32, f32::max);
    let normalised = lexical.into_iter().map(|mut e| {
        e.score = if top > 0.0 { e.score / top } else { 0.0 };
        e
    });

    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, KnowledgeEntry> = HashMap::new();
    for entry in normalised.chain(semantic) {
        match best.get(&entry.id) {
            Some(existing) if existing.score >= entry.score => {}
            Some(_) => {
                best.insert(entry.id.clone(), entry);
            }
            None => {
                order.push(entry.id.clone());
                best.insert(entry.id.clone(), entry);
            }
        }
    }

    let mut merged: Vec<KnowledgeEntry> = order.into_iter().filter_map(|id| best.remove(&id)).collect();
    // Stable sort keeps lexical order among equal scores
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigchat_core::knowledge::KnowledgeCategory;

    fn entry(id: &str, score: f32, embedding: Option<Vec<f32>>) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(id, "content", KnowledgeCategory::General);
        e.id = id.into();
        e.score = score;
        e.embedding = embedding;
        e
    }

    #[test]
    fn cosine_identical_orthogonal_and_degenerate() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn vector_search_threshold_is_strict() {
        let entries = vec![
            entry("same", 0.0, Some(vec![1.0, 0.0])),
            entry("far", 0.0, Some(vec![0.0, 1.0])),
            entry("none", 0.0, None),
        ];
        let hits = vector_search(&entries, &[1.0, 0.0], 10, 0.7);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "same");

        // similarity exactly 1.0 is not above a 1.0 threshold
        assert!(vector_search(&entries, &[1.0, 0.0], 10, 1.0).is_empty());
    }

    #[test]
    fn merge_dedupes_keeping_higher_score() {
        let lexical = vec![entry("a", 8.0, None), entry("b", 4.0, None)];
        let semantic = vec![entry("b", 0.9, None), entry("c", 0.75, None)];

        let merged = merge_results(lexical, semantic, 10);
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((merged[0].score - 1.0).abs() < 1e-6);
        // b: lexical 0.5 normalised, semantic 0.9 wins
        assert!((merged[1].score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn merge_truncates() {
        let lexical = vec![entry("a", 3.0, None), entry("b", 2.0, None), entry("c", 1.0, None)];
        let merged = merge_results(lexical, vec![], 2);
        assert_eq!(merged.len(), 2);
    }
}
