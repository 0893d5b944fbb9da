//! Specificity scoring: how uniquely a card belongs to its primary repo,
//! versus how well it could equally describe any other repo in the
//! workspace.

use std::collections::HashMap;

/// One card's body vector plus the repo it primarily belongs to.
pub struct CardVector<'a> {
    pub card_id: &'a str,
    pub repo: &'a str,
    pub vector: &'a [f32],
}

/// Mean of a repo's card body vectors — the point a card is compared
/// against to see whether it belongs, or merely resembles, that repo.
pub fn repo_centroids(cards: &[CardVector]) -> HashMap<String, Vec<f32>> {
    let mut sums: HashMap<String, (Vec<f32>, usize)> = HashMap::new();
    for card in cards {
        let entry = sums.entry(card.repo.to_string()).or_insert_with(|| (vec![0.0; card.vector.len()], 0));
        for (acc, v) in entry.0.iter_mut().zip(card.vector) {
            *acc += v;
        }
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(repo, (sum, count))| {
            let mean = sum.iter().map(|x| x / count as f32).collect();
            (repo, mean)
        })
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// `specificity(card) = cos(card, own_centroid) - max_other cos(card, other_centroid)`,
/// mapped from `[-2, 2]` into `[0, 1]`.
pub fn specificity(card: &CardVector, centroids: &HashMap<String, Vec<f32>>) -> Option<f64> {
    let own_centroid = centroids.get(card.repo)?;
    let own_sim = cosine(card.vector, own_centroid);

    let max_other = centroids
        .iter()
        .filter(|(repo, _)| repo.as_str() != card.repo)
        .map(|(_, centroid)| cosine(card.vector, centroid))
        .fold(f32::NEG_INFINITY, f32::max);

    let raw = if max_other.is_finite() { own_sim - max_other } else { own_sim };
    Some(((raw as f64 + 2.0) / 4.0).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_matching_own_centroid_scores_above_midpoint() {
        let mut centroids = HashMap::new();
        centroids.insert("payments".to_string(), vec![1.0, 0.0]);
        centroids.insert("clinic".to_string(), vec![0.0, 1.0]);

        let card = CardVector { card_id: "c1", repo: "payments", vector: &[1.0, 0.0] };
        let score = specificity(&card, &centroids).unwrap();
        assert!(score > 0.5);
    }

    #[test]
    fn card_resembling_another_repo_scores_lower() {
        let mut centroids = HashMap::new();
        centroids.insert("payments".to_string(), vec![1.0, 0.0]);
        centroids.insert("clinic".to_string(), vec![0.9, 0.1]);

        let distinct = CardVector { card_id: "distinct", repo: "payments", vector: &[1.0, 0.0] };
        let ambiguous = CardVector { card_id: "ambiguous", repo: "payments", vector: &[0.9, 0.1] };
        let distinct_score = specificity(&distinct, &centroids).unwrap();
        let ambiguous_score = specificity(&ambiguous, &centroids).unwrap();
        assert!(distinct_score > ambiguous_score);
    }

    #[test]
    fn single_repo_has_no_other_to_compare_against() {
        let mut centroids = HashMap::new();
        centroids.insert("solo".to_string(), vec![1.0, 0.0]);
        let card = CardVector { card_id: "c1", repo: "solo", vector: &[1.0, 0.0] };
        assert_eq!(specificity(&card, &centroids), Some(1.0));
    }
}
