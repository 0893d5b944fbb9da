//! Persisted entity shapes. Wire shape (serde) and storage shape (sqlite
//! row mapping) are kept on the same struct here since, unlike a graph
//! node's metadata, every field of these entities is a plain scalar or a
//! JSON-encodable collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Flow,
    Model,
    CrossService,
    Hub,
    AutoGenerated,
    ConvInsight,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Flow => "flow",
            CardType::Model => "model",
            CardType::CrossService => "cross_service",
            CardType::Hub => "hub",
            CardType::AutoGenerated => "auto_generated",
            CardType::ConvInsight => "conv_insight",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "flow" => Some(CardType::Flow),
            "model" => Some(CardType::Model),
            "cross_service" => Some(CardType::CrossService),
            "hub" => Some(CardType::Hub),
            "auto_generated" => Some(CardType::AutoGenerated),
            "conv_insight" => Some(CardType::ConvInsight),
            _ => None,
        }
    }

    /// Types regenerated wholesale by the card generator each indexing
    /// run; anything else (namely `conv_insight`, written by conversation
    /// capture outside the indexer) survives a run untouched.
    pub fn regenerated_types() -> &'static [CardType] {
        &[CardType::AutoGenerated, CardType::Flow, CardType::Model, CardType::CrossService, CardType::Hub]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub flow: String,
    pub title: String,
    pub content: String,
    pub card_type: CardType,
    pub source_files: Vec<String>,
    pub source_repos: Vec<String>,
    pub tags: Vec<String>,
    pub identifiers: Vec<String>,
    pub commit_sha: Option<String>,
    pub content_hash: String,
    pub valid_branches: Option<Vec<String>>,
    pub specificity_score: Option<f64>,
    pub usage_count: u64,
    pub stale: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Stable id: hash of flow + type + primary (first) source file.
    pub fn derive_id(flow: &str, card_type: CardType, primary_file: &str) -> String {
        let digest = xxhash_rust::xxh3::xxh3_64(format!("{flow}|{}|{primary_file}", card_type.as_str()).as_bytes());
        format!("{digest:016x}")
    }

    pub fn derive_content_hash(title: &str, content: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"\0");
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone)]
pub struct CardEmbedding {
    pub card_id: String,
    pub vector: Vec<f32>,
    pub title_vector: Vec<f32>,
}

pub fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Readme,
    About,
    Architecture,
    CodeStyle,
    Rules,
    Styles,
    Pages,
    BeOverview,
    Business,
    Product,
    CrossRepo,
    Specialist,
    Changelog,
    Memory,
    ApiContracts,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Readme => "readme",
            DocType::About => "about",
            DocType::Architecture => "architecture",
            DocType::CodeStyle => "code_style",
            DocType::Rules => "rules",
            DocType::Styles => "styles",
            DocType::Pages => "pages",
            DocType::BeOverview => "be_overview",
            DocType::Business => "business",
            DocType::Product => "product",
            DocType::CrossRepo => "cross_repo",
            DocType::Specialist => "specialist",
            DocType::Changelog => "changelog",
            DocType::Memory => "memory",
            DocType::ApiContracts => "api_contracts",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "readme" => DocType::Readme,
            "about" => DocType::About,
            "architecture" => DocType::Architecture,
            "code_style" => DocType::CodeStyle,
            "rules" => DocType::Rules,
            "styles" => DocType::Styles,
            "pages" => DocType::Pages,
            "be_overview" => DocType::BeOverview,
            "business" => DocType::Business,
            "product" => DocType::Product,
            "cross_repo" => DocType::CrossRepo,
            "specialist" => DocType::Specialist,
            "changelog" => DocType::Changelog,
            "memory" => DocType::Memory,
            "api_contracts" => DocType::ApiContracts,
            _ => return None,
        })
    }

    pub fn all() -> &'static [DocType] {
        &[
            DocType::Readme,
            DocType::About,
            DocType::Architecture,
            DocType::CodeStyle,
            DocType::Rules,
            DocType::Styles,
            DocType::Pages,
            DocType::BeOverview,
            DocType::Business,
            DocType::Product,
            DocType::CrossRepo,
            DocType::Specialist,
            DocType::Changelog,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDoc {
    pub repo: String,
    pub doc_type: DocType,
    pub content: String,
    pub source_file_paths: Vec<String>,
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Derived,
    Manual,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Derived => "derived",
            SignalSource::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s == "manual" { SignalSource::Manual } else { SignalSource::Derived }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSignals {
    pub repo: String,
    pub signals: Vec<String>,
    pub signal_source: SignalSource,
    pub locked: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIndexRow {
    pub path: String,
    pub repo: String,
    pub branch: Option<String>,
    pub file_role: String,
    pub parsed_data: serde_json::Value,
    pub heat_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoProfileRow {
    pub repo: String,
    pub primary_language: Option<String>,
    pub frameworks: Vec<String>,
    pub is_lambda: bool,
    pub package_manager: Option<String>,
    pub skill_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub query: String,
    pub query_embedding: Option<Vec<f32>>,
    pub response_cards: Vec<String>,
    pub response_tokens: usize,
    pub cache_hit: bool,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub branch: Option<String>,
    pub dev_id: Option<String>,
}

/// Well-known `SearchConfig` keys, per the external settings contract.
pub mod config_keys {
    pub const WORKSPACE_ROOT: &str = "workspace_root";
    pub const MAX_HUB_CARDS: &str = "max_hub_cards";
    pub const EXTRA_REPOS: &str = "extra_repos";
    pub const CURRENT_TICKET_ID: &str = "current_ticket_id";
    pub const CURRENT_TICKET_DESC: &str = "current_ticket_desc";
    pub const LAST_INDEXED_AT: &str = "last_indexed_at";
    pub const SIGNAL_CACHE_VERSION: &str = "signal_cache_version";
    pub const INDEXING_LOCK_OWNER: &str = "indexing_lock_owner";
    pub const INDEXING_LOCK_SINCE: &str = "indexing_lock_since";

    pub const RECOGNISED: &[&str] = &[
        WORKSPACE_ROOT,
        MAX_HUB_CARDS,
        EXTRA_REPOS,
        CURRENT_TICKET_ID,
        CURRENT_TICKET_DESC,
        LAST_INDEXED_AT,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_roundtrips_through_bytes() {
        let v = vec![0.1f32, -0.5, 3.25];
        let bytes = encode_vector(&v);
        let back = decode_vector(&bytes);
        assert_eq!(v, back);
    }

    #[test]
    fn card_type_roundtrips_through_str() {
        for t in [CardType::Flow, CardType::Model, CardType::CrossService, CardType::Hub, CardType::AutoGenerated, CardType::ConvInsight] {
            assert_eq!(CardType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn content_hash_is_stable_for_same_title_and_content() {
        let a = Card::derive_content_hash("t", "c");
        let b = Card::derive_content_hash("t", "c");
        assert_eq!(a, b);
        let c = Card::derive_content_hash("t", "different");
        assert_ne!(a, c);
    }
}
