//! SQLite schema for the embedded store.
//!
//! One file per workspace. `cards_fts` is an external-content FTS5 table
//! over `cards`; it is never updated by triggers, only by an explicit
//! `rebuild_lexical_index()` call, matching the store's external-content
//! refresh contract.

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const SCHEMA_CREATE_MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY NOT NULL,
    applied_at TEXT NOT NULL
)
"#;

pub const SCHEMA_CREATE_CARDS: &str = r#"
CREATE TABLE IF NOT EXISTS cards (
    id TEXT PRIMARY KEY NOT NULL,
    flow TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    card_type TEXT NOT NULL,
    source_files TEXT NOT NULL,
    source_repos TEXT NOT NULL,
    tags TEXT NOT NULL,
    identifiers TEXT NOT NULL,
    commit_sha TEXT,
    content_hash TEXT NOT NULL,
    valid_branches TEXT,
    specificity_score REAL,
    usage_count INTEGER NOT NULL DEFAULT 0,
    stale INTEGER NOT NULL DEFAULT 0,
    expires_at TEXT
)
"#;

pub const SCHEMA_CREATE_CARDS_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS cards_fts USING fts5(
    title, content, identifiers,
    content='cards', content_rowid='rowid'
)
"#;

pub const SCHEMA_CREATE_EMBEDDINGS: &str = r#"
CREATE TABLE IF NOT EXISTS card_embeddings (
    card_id TEXT PRIMARY KEY NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
    vector BLOB NOT NULL,
    title_vector BLOB NOT NULL,
    dimension INTEGER NOT NULL
)
"#;

pub const SCHEMA_CREATE_GRAPH_EDGES: &str = r#"
CREATE TABLE IF NOT EXISTS graph_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_file TEXT NOT NULL,
    target_file TEXT NOT NULL,
    relation TEXT NOT NULL,
    metadata TEXT NOT NULL,
    repo TEXT NOT NULL,
    UNIQUE(source_file, target_file, relation)
)
"#;

pub const SCHEMA_CREATE_FILE_INDEX: &str = r#"
CREATE TABLE IF NOT EXISTS file_index (
    path TEXT PRIMARY KEY NOT NULL,
    repo TEXT NOT NULL,
    branch TEXT,
    file_role TEXT NOT NULL,
    parsed_data TEXT NOT NULL,
    heat_score REAL NOT NULL DEFAULT 0
)
"#;

pub const SCHEMA_CREATE_PROJECT_DOCS: &str = r#"
CREATE TABLE IF NOT EXISTS project_docs (
    repo TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    content TEXT NOT NULL,
    source_file_paths TEXT NOT NULL,
    stale INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (repo, doc_type)
)
"#;

pub const SCHEMA_CREATE_REPO_PROFILES: &str = r#"
CREATE TABLE IF NOT EXISTS repo_profiles (
    repo TEXT PRIMARY KEY NOT NULL,
    primary_language TEXT,
    frameworks TEXT NOT NULL,
    is_lambda INTEGER NOT NULL DEFAULT 0,
    package_manager TEXT,
    skill_ids TEXT NOT NULL
)
"#;

pub const SCHEMA_CREATE_REPO_SIGNALS: &str = r#"
CREATE TABLE IF NOT EXISTS repo_signals (
    repo TEXT PRIMARY KEY NOT NULL,
    signals TEXT NOT NULL,
    signal_source TEXT NOT NULL,
    locked INTEGER NOT NULL DEFAULT 0,
    generated_at TEXT NOT NULL
)
"#;

pub const SCHEMA_CREATE_METRICS: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    query_embedding BLOB,
    response_cards TEXT NOT NULL,
    response_tokens INTEGER NOT NULL,
    cache_hit INTEGER NOT NULL,
    latency_ms INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    branch TEXT,
    dev_id TEXT
)
"#;

pub const SCHEMA_CREATE_SEARCH_CONFIG: &str = r#"
CREATE TABLE IF NOT EXISTS search_config (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)
"#;

pub const SCHEMA_CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_cards_card_type ON cards(card_type);
CREATE INDEX IF NOT EXISTS idx_cards_stale ON cards(stale);
CREATE INDEX IF NOT EXISTS idx_cards_content_hash ON cards(content_hash);
CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(source_file);
CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target_file);
CREATE INDEX IF NOT EXISTS idx_file_index_repo ON file_index(repo);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics(timestamp);
"#;

pub const ALL_TABLES: &[&str] = &[
    SCHEMA_CREATE_MIGRATIONS,
    SCHEMA_CREATE_CARDS,
    SCHEMA_CREATE_EMBEDDINGS,
    SCHEMA_CREATE_GRAPH_EDGES,
    SCHEMA_CREATE_FILE_INDEX,
    SCHEMA_CREATE_PROJECT_DOCS,
    SCHEMA_CREATE_REPO_PROFILES,
    SCHEMA_CREATE_REPO_SIGNALS,
    SCHEMA_CREATE_METRICS,
    SCHEMA_CREATE_SEARCH_CONFIG,
];

/// Forward-only, numbered migrations. Version 1 is the base schema created
/// by `ALL_TABLES` + `SCHEMA_CREATE_CARDS_FTS` + `SCHEMA_CREATE_INDEXES`;
/// entries here start at version 2 for anything applied to an existing
/// database. Each migration is idempotent (`IF NOT EXISTS` / guarded
/// `ALTER TABLE`).
pub const MIGRATIONS: &[(u32, &str)] = &[];

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn all_tables_and_fts_create_cleanly() {
        let conn = Connection::open_in_memory().unwrap();
        for ddl in ALL_TABLES {
            conn.execute(ddl, []).unwrap();
        }
        conn.execute(SCHEMA_CREATE_CARDS_FTS, []).unwrap();
        conn.execute_batch(SCHEMA_CREATE_INDEXES).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(tables.contains(&"cards".to_string()));
        assert!(tables.contains(&"card_embeddings".to_string()));
        assert!(tables.contains(&"search_config".to_string()));
    }
}
