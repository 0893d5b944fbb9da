//! End-to-end retrieval tests: cards go into the store, come back out
//! through `HybridRetriever::search`, in the order lexical + dense fusion
//! and card-type/usage boosts would produce.

use std::sync::Arc;

use flowcard_retrieval::embedder::{EmbeddingMode, EmbeddingProvider, HashingEmbedder};
use flowcard_retrieval::hybrid::{HybridRetriever, NoopReranker, SearchOptions};
use flowcard_store::types::{Card, CardEmbedding, CardType};
use flowcard_store::Store;

fn card(id: &str, flow: &str, title: &str, content: &str, card_type: CardType) -> Card {
    Card {
        id: id.to_string(),
        flow: flow.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        card_type,
        source_files: vec![format!("src/{flow}.rs")],
        source_repos: vec!["sample".to_string()],
        tags: vec![],
        identifiers: vec![],
        commit_sha: None,
        content_hash: "deadbeef".to_string(),
        valid_branches: None,
        specificity_score: Some(0.5),
        usage_count: 0,
        stale: false,
        expires_at: None,
    }
}

async fn seeded_retriever() -> (Arc<Store>, HybridRetriever) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());

    let checkout = card("c1", "checkout", "Checkout flow", "checkout charges the cart and emits a receipt", CardType::Flow);
    let refund = card("c2", "refund", "Refund flow", "refund reverses a charge and issues store credit", CardType::Flow);

    for c in [&checkout, &refund] {
        store.upsert_card(c).unwrap();
        let vector = embedder.embed(vec![c.content.clone()], EmbeddingMode::Document).await.unwrap().remove(0);
        let title_vector = embedder.embed(vec![c.title.clone()], EmbeddingMode::Document).await.unwrap().remove(0);
        store.upsert_embedding(&CardEmbedding { card_id: c.id.clone(), vector, title_vector }).unwrap();
    }
    store.rebuild_lexical_index().unwrap();

    let retriever = HybridRetriever::new(Arc::clone(&store), embedder, Arc::new(NoopReranker));
    (store, retriever)
}

#[tokio::test]
async fn search_returns_the_flow_matching_the_query() {
    let (_store, retriever) = seeded_retriever().await;

    let result = retriever.search("checkout charges cart", SearchOptions::default()).await.unwrap();

    assert!(!result.cards.is_empty());
    assert_eq!(result.cards[0].card.flow, "checkout");
    assert!(!result.reranked);
}

#[tokio::test]
async fn search_respects_the_limit() {
    let (_store, retriever) = seeded_retriever().await;

    let result = retriever.search("charge", SearchOptions { limit: 1, ..SearchOptions::default() }).await.unwrap();

    assert_eq!(result.cards.len(), 1);
}

#[tokio::test]
async fn repeated_identical_query_hits_the_semantic_cache() {
    let (_store, retriever) = seeded_retriever().await;

    let first = retriever.search("refund a charge", SearchOptions::default()).await.unwrap();
    assert!(!first.cache_hit);

    let second = retriever.search("refund a charge", SearchOptions::default()).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.cards[0].card.id, first.cards[0].card.id);
}

#[tokio::test]
async fn stale_cards_are_excluded_from_results() {
    let (store, retriever) = seeded_retriever().await;
    store.mark_cards_stale(&["c1".to_string()]).unwrap();

    let result = retriever.search("checkout charges cart", SearchOptions::default()).await.unwrap();

    assert!(result.cards.iter().all(|c| c.card.id != "c1"));
}
