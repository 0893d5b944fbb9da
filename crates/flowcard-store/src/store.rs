//! Embedded store: cards, embeddings, edges, files, docs, signals, metrics.
//!
//! One `rusqlite::Connection` behind a `parking_lot::Mutex`, matching the
//! single-writer requirement — every write, from either the indexer or the
//! retriever's usage-count/metric accounting, goes through this one guard
//! so WAL ordering is total.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::schema;
use crate::types::{
    config_keys, decode_vector, encode_vector, Card, CardEmbedding, CardType, DocType, FileIndexRow, Metric, ProjectDoc, RepoProfileRow,
    RepoSignals, SignalSource,
};
use flowcard_core::graph::{GraphEdge, Relation};

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let store = Store { conn: Mutex::new(conn) };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(schema::SCHEMA_CREATE_MIGRATIONS, [])?;
        let applied: u32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |r| r.get(0))
            .unwrap_or(0);

        if applied == 0 {
            let tx = conn.unchecked_transaction()?;
            for ddl in schema::ALL_TABLES {
                tx.execute(ddl, [])?;
            }
            tx.execute(schema::SCHEMA_CREATE_CARDS_FTS, [])?;
            tx.execute_batch(schema::SCHEMA_CREATE_INDEXES)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                params![schema::CURRENT_SCHEMA_VERSION, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            info!(version = schema::CURRENT_SCHEMA_VERSION, "initialised schema");
        }

        for (version, ddl) in schema::MIGRATIONS {
            if *version > applied {
                let tx = conn.unchecked_transaction()?;
                tx.execute_batch(ddl).map_err(|e| StoreError::migration(*version, e.to_string()))?;
                tx.execute(
                    "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, Utc::now().to_rfc3339()],
                )?;
                tx.commit()?;
                info!(version, "applied migration");
            }
        }
        Ok(())
    }

    // -- cards ------------------------------------------------------------

    pub fn upsert_card(&self, card: &Card) -> StoreResult<()> {
        let conn = self.conn.lock();
        insert_card(&conn, card)
    }

    /// Deletes every current card of `types`, inserts `new_cards`, and
    /// rebuilds the lexical index — a mandatory trailing step, never
    /// best-effort, per the external-content refresh contract.
    pub fn replace_cards_of_types(&self, types: &[CardType], new_cards: &[Card]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for t in types {
            tx.execute("DELETE FROM cards WHERE card_type = ?1", params![t.as_str()])?;
        }
        for card in new_cards {
            insert_card(&tx, card)?;
        }
        tx.commit()?;
        drop(conn);
        self.rebuild_lexical_index()?;
        Ok(())
    }

    pub fn rebuild_lexical_index(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO cards_fts(cards_fts) VALUES('rebuild')", [])?;
        debug!("rebuilt lexical index");
        Ok(())
    }

    pub fn delete_expired_cards(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM cards WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![now.to_rfc3339()],
        )?;
        Ok(deleted)
    }

    pub fn fetch_cards_by_ids(&self, ids: &[String]) -> StoreResult<Vec<Card>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE id IN ({placeholders})");
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_card)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn fetch_cards_by_type(&self, card_type: CardType) -> StoreResult<Vec<Card>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards WHERE card_type = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![card_type.as_str()], row_to_card)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn fetch_all_cards(&self) -> StoreResult<Vec<Card>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {CARD_COLUMNS} FROM cards");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_card)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn mark_cards_stale(&self, ids: &[String]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("UPDATE cards SET stale = 1 WHERE id IN ({placeholders}) AND stale = 0");
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
        Ok(conn.execute(&sql, params.as_slice())?)
    }

    /// Increments `usage_count` and logs the metric row in one transaction,
    /// matching the retriever's step-9 accounting contract.
    pub fn record_usage_and_metric(&self, returned_ids: &[String], metric: &Metric) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for id in returned_ids {
            tx.execute("UPDATE cards SET usage_count = usage_count + 1 WHERE id = ?1", params![id])?;
        }
        insert_metric(&tx, metric)?;
        tx.commit()?;
        Ok(())
    }

    pub fn log_metric(&self, metric: &Metric) -> StoreResult<()> {
        let conn = self.conn.lock();
        insert_metric(&conn, metric)
    }

    // -- lexical + vector search -------------------------------------------

    /// Ranked `(card_id, bm25_rank)` pairs, lower rank is better (FTS5
    /// `bm25()` convention), most relevant first.
    pub fn lexical_search(&self, query: &str, limit: usize) -> StoreResult<Vec<(String, f64)>> {
        let conn = self.conn.lock();
        let sanitized = sanitize_fts_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT cards.id, bm25(cards_fts) AS rank FROM cards_fts \
             JOIN cards ON cards.rowid = cards_fts.rowid \
             WHERE cards_fts MATCH ?1 AND cards.stale = 0 \
             ORDER BY rank LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![sanitized, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn upsert_embedding(&self, embedding: &CardEmbedding) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO card_embeddings (card_id, vector, title_vector, dimension) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(card_id) DO UPDATE SET vector = excluded.vector, title_vector = excluded.title_vector, dimension = excluded.dimension",
            params![embedding.card_id, encode_vector(&embedding.vector), encode_vector(&embedding.title_vector), embedding.vector.len() as i64],
        )?;
        Ok(())
    }

    pub fn fetch_embedding(&self, card_id: &str) -> StoreResult<Option<CardEmbedding>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT card_id, vector, title_vector FROM card_embeddings WHERE card_id = ?1",
            params![card_id],
            |row| {
                Ok(CardEmbedding {
                    card_id: row.get(0)?,
                    vector: decode_vector(&row.get::<_, Vec<u8>>(1)?),
                    title_vector: decode_vector(&row.get::<_, Vec<u8>>(2)?),
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Linear cosine scan over non-stale cards' body vectors, optionally
    /// restricted to `filter` card types. Acceptable at the scale this
    /// store targets (a handful of workspaces' worth of cards); a larger
    /// deployment would swap this for an ANN index behind the same
    /// signature.
    pub fn vector_scan(&self, filter: Option<&[CardType]>, query_vec: &[f32], k: usize) -> StoreResult<Vec<(String, f32)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT cards.id, cards.card_type, card_embeddings.vector FROM card_embeddings \
             JOIN cards ON cards.id = card_embeddings.card_id WHERE cards.stale = 0",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, card_type, bytes) = row?;
            if let Some(types) = filter {
                let matches = types.iter().any(|t| t.as_str() == card_type);
                if !matches {
                    continue;
                }
            }
            let vec = decode_vector(&bytes);
            if vec.len() != query_vec.len() {
                continue;
            }
            scored.push((id, cosine_similarity(&vec, query_vec)));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    // -- graph edges --------------------------------------------------------

    pub fn replace_graph_edges(&self, edges: &[GraphEdge]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM graph_edges", [])?;
        for edge in edges {
            tx.execute(
                "INSERT OR IGNORE INTO graph_edges (source_file, target_file, relation, metadata, repo) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    edge.source_file.to_string_lossy(),
                    edge.target_file.to_string_lossy(),
                    edge.relation.as_str(),
                    edge.metadata.to_string(),
                    edge.repo
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn fetch_graph_edges(&self) -> StoreResult<Vec<GraphEdge>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT source_file, target_file, relation, metadata, repo FROM graph_edges")?;
        let rows = stmt.query_map([], |row| {
            let relation: String = row.get(2)?;
            let metadata: String = row.get(3)?;
            Ok(GraphEdge {
                source_file: row.get::<_, String>(0)?.into(),
                target_file: row.get::<_, String>(1)?.into(),
                relation: parse_relation(&relation),
                metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
                repo: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // -- file index ---------------------------------------------------------

    pub fn upsert_file_index(&self, row: &FileIndexRow) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO file_index (path, repo, branch, file_role, parsed_data, heat_score) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(path) DO UPDATE SET repo=excluded.repo, branch=excluded.branch, file_role=excluded.file_role, \
             parsed_data=excluded.parsed_data, heat_score=excluded.heat_score",
            params![row.path, row.repo, row.branch, row.file_role, row.parsed_data.to_string(), row.heat_score],
        )?;
        Ok(())
    }

    // -- project docs ---------------------------------------------------------

    pub fn upsert_project_doc(&self, doc: &ProjectDoc) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO project_docs (repo, doc_type, content, source_file_paths, stale, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(repo, doc_type) DO UPDATE SET content=excluded.content, source_file_paths=excluded.source_file_paths, \
             stale=excluded.stale, updated_at=excluded.updated_at",
            params![
                doc.repo,
                doc.doc_type.as_str(),
                doc.content,
                serde_json::to_string(&doc.source_file_paths)?,
                doc.stale as i64,
                doc.updated_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn fetch_project_doc(&self, repo: &str, doc_type: DocType) -> StoreResult<Option<ProjectDoc>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT repo, doc_type, content, source_file_paths, stale, updated_at FROM project_docs WHERE repo = ?1 AND doc_type = ?2",
            params![repo, doc_type.as_str()],
            row_to_doc,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn fetch_docs_for_repo(&self, repo: &str) -> StoreResult<Vec<ProjectDoc>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT repo, doc_type, content, source_file_paths, stale, updated_at FROM project_docs WHERE repo = ?1")?;
        let rows = stmt.query_map(params![repo], row_to_doc)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn mark_docs_stale(&self, repo: &str, doc_types: &[DocType]) -> StoreResult<usize> {
        if doc_types.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        let placeholders = doc_types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("UPDATE project_docs SET stale = 1 WHERE repo = ? AND doc_type IN ({placeholders})");
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&repo];
        let type_strs: Vec<&str> = doc_types.iter().map(|t| t.as_str()).collect();
        for s in &type_strs {
            params_vec.push(s);
        }
        Ok(conn.execute(&sql, params_vec.as_slice())?)
    }

    // -- repo profiles / signals ---------------------------------------------

    pub fn upsert_repo_profile(&self, profile: &RepoProfileRow) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO repo_profiles (repo, primary_language, frameworks, is_lambda, package_manager, skill_ids) VALUES (?1,?2,?3,?4,?5,?6) \
             ON CONFLICT(repo) DO UPDATE SET primary_language=excluded.primary_language, frameworks=excluded.frameworks, \
             is_lambda=excluded.is_lambda, package_manager=excluded.package_manager, skill_ids=excluded.skill_ids",
            params![
                profile.repo,
                profile.primary_language,
                serde_json::to_string(&profile.frameworks)?,
                profile.is_lambda as i64,
                profile.package_manager,
                serde_json::to_string(&profile.skill_ids)?
            ],
        )?;
        Ok(())
    }

    /// Writes derived signals unless the existing row is locked, in which
    /// case it is left untouched (manual overrides always win).
    pub fn upsert_derived_repo_signals(&self, repo: &str, signals: Vec<String>) -> StoreResult<()> {
        let conn = self.conn.lock();
        let locked: bool = conn
            .query_row("SELECT locked FROM repo_signals WHERE repo = ?1", params![repo], |r| r.get::<_, i64>(0))
            .optional()?
            .map(|v| v != 0)
            .unwrap_or(false);
        if locked {
            warn!(repo, "repo_signals locked, skipping derived overwrite");
            return Ok(());
        }
        conn.execute(
            "INSERT INTO repo_signals (repo, signals, signal_source, locked, generated_at) VALUES (?1,?2,?3,0,?4) \
             ON CONFLICT(repo) DO UPDATE SET signals=excluded.signals, signal_source=excluded.signal_source, generated_at=excluded.generated_at \
             WHERE repo_signals.locked = 0",
            params![repo, serde_json::to_string(&signals)?, SignalSource::Derived.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn fetch_repo_signals(&self, repo: &str) -> StoreResult<Option<RepoSignals>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT repo, signals, signal_source, locked, generated_at FROM repo_signals WHERE repo = ?1",
            params![repo],
            row_to_signals,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn fetch_all_repo_signals(&self) -> StoreResult<Vec<RepoSignals>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT repo, signals, signal_source, locked, generated_at FROM repo_signals")?;
        let rows = stmt.query_map([], row_to_signals)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // -- config / advisory lock -----------------------------------------------

    pub fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM search_config WHERE key = ?1", params![key], |r| r.get(0))
            .optional()
            .map_err(StoreError::from)
    }

    pub fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO search_config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn all_config(&self) -> StoreResult<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key, value FROM search_config")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Acquires the single-writer advisory lock for an indexing run.
    /// Returns `Err(ConcurrentRun)` immediately rather than blocking, so
    /// callers can surface the "queued"/409 contract.
    pub fn acquire_lock(&self, owner: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        let existing: Option<String> = conn
            .query_row("SELECT value FROM search_config WHERE key = ?1", params![config_keys::INDEXING_LOCK_OWNER], |r| r.get(0))
            .optional()?;
        if let Some(current_owner) = existing {
            if !current_owner.is_empty() {
                return Err(StoreError::concurrent_run(current_owner));
            }
        }
        conn.execute(
            "INSERT INTO search_config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![config_keys::INDEXING_LOCK_OWNER, owner],
        )?;
        conn.execute(
            "INSERT INTO search_config (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![config_keys::INDEXING_LOCK_SINCE, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn release_lock(&self, owner: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        let current: Option<String> = conn
            .query_row("SELECT value FROM search_config WHERE key = ?1", params![config_keys::INDEXING_LOCK_OWNER], |r| r.get(0))
            .optional()?;
        if current.as_deref() == Some(owner) || current.is_none() {
            conn.execute(
                "INSERT INTO search_config (key, value) VALUES (?1, '') ON CONFLICT(key) DO UPDATE SET value = ''",
                params![config_keys::INDEXING_LOCK_OWNER],
            )?;
        }
        Ok(())
    }

    pub fn lock_holder(&self) -> StoreResult<Option<String>> {
        let value = self.get_config(config_keys::INDEXING_LOCK_OWNER)?;
        Ok(value.filter(|v| !v.is_empty()))
    }
}

const CARD_COLUMNS: &str = "id, flow, title, content, card_type, source_files, source_repos, tags, identifiers, \
    commit_sha, content_hash, valid_branches, specificity_score, usage_count, stale, expires_at";

fn insert_card(conn: &Connection, card: &Card) -> StoreResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO cards ({CARD_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16) \
             ON CONFLICT(id) DO UPDATE SET flow=excluded.flow, title=excluded.title, content=excluded.content, \
             card_type=excluded.card_type, source_files=excluded.source_files, source_repos=excluded.source_repos, \
             tags=excluded.tags, identifiers=excluded.identifiers, commit_sha=excluded.commit_sha, \
             content_hash=excluded.content_hash, valid_branches=excluded.valid_branches, \
             specificity_score=excluded.specificity_score, stale=excluded.stale, expires_at=excluded.expires_at"
        ),
        params![
            card.id,
            card.flow,
            card.title,
            card.content,
            card.card_type.as_str(),
            serde_json::to_string(&card.source_files)?,
            serde_json::to_string(&card.source_repos)?,
            serde_json::to_string(&card.tags)?,
            serde_json::to_string(&card.identifiers)?,
            card.commit_sha,
            card.content_hash,
            card.valid_branches.as_ref().map(serde_json::to_string).transpose()?,
            card.specificity_score,
            card.usage_count as i64,
            card.stale as i64,
            card.expires_at.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn row_to_card(row: &rusqlite::Row) -> rusqlite::Result<Card> {
    let source_files: String = row.get(5)?;
    let source_repos: String = row.get(6)?;
    let tags: String = row.get(7)?;
    let identifiers: String = row.get(8)?;
    let valid_branches: Option<String> = row.get(11)?;
    let expires_at: Option<String> = row.get(15)?;
    let card_type: String = row.get(4)?;

    Ok(Card {
        id: row.get(0)?,
        flow: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        card_type: CardType::from_str(&card_type).unwrap_or(CardType::AutoGenerated),
        source_files: serde_json::from_str(&source_files).unwrap_or_default(),
        source_repos: serde_json::from_str(&source_repos).unwrap_or_default(),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        identifiers: serde_json::from_str(&identifiers).unwrap_or_default(),
        commit_sha: row.get(9)?,
        content_hash: row.get(10)?,
        valid_branches: valid_branches.and_then(|s| serde_json::from_str(&s).ok()),
        specificity_score: row.get(12)?,
        usage_count: row.get::<_, i64>(13)? as u64,
        stale: row.get::<_, i64>(14)? != 0,
        expires_at: expires_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
    })
}

fn row_to_doc(row: &rusqlite::Row) -> rusqlite::Result<ProjectDoc> {
    let doc_type: String = row.get(1)?;
    let paths: String = row.get(3)?;
    let updated_at: String = row.get(5)?;
    Ok(ProjectDoc {
        repo: row.get(0)?,
        doc_type: DocType::from_str(&doc_type).unwrap_or(DocType::Readme),
        content: row.get(2)?,
        source_file_paths: serde_json::from_str(&paths).unwrap_or_default(),
        stale: row.get::<_, i64>(4)? != 0,
        updated_at: DateTime::parse_from_rfc3339(&updated_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_signals(row: &rusqlite::Row) -> rusqlite::Result<RepoSignals> {
    let signals: String = row.get(1)?;
    let source: String = row.get(2)?;
    let generated_at: String = row.get(4)?;
    Ok(RepoSignals {
        repo: row.get(0)?,
        signals: serde_json::from_str(&signals).unwrap_or_default(),
        signal_source: SignalSource::from_str(&source),
        locked: row.get::<_, i64>(3)? != 0,
        generated_at: DateTime::parse_from_rfc3339(&generated_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
    })
}

fn insert_metric(conn: &Connection, metric: &Metric) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO metrics (query, query_embedding, response_cards, response_tokens, cache_hit, latency_ms, timestamp, branch, dev_id) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            metric.query,
            metric.query_embedding.as_ref().map(|v| encode_vector(v)),
            serde_json::to_string(&metric.response_cards)?,
            metric.response_tokens as i64,
            metric.cache_hit as i64,
            metric.latency_ms as i64,
            metric.timestamp.to_rfc3339(),
            metric.branch,
            metric.dev_id,
        ],
    )?;
    Ok(())
}

fn parse_relation(s: &str) -> Relation {
    match s {
        "import" => Relation::Import,
        "call" => Relation::Call,
        "api_endpoint" => Relation::ApiEndpoint,
        "association" => Relation::Association,
        "inherits" => Relation::Inherits,
        _ => Relation::Import,
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// FTS5 treats bare punctuation in `MATCH` as syntax; queries are
/// tokenised to plain words and re-quoted so user input can never break
/// the query grammar.
fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardType;

    fn sample_card(id: &str) -> Card {
        Card {
            id: id.to_string(),
            flow: "billing".to_string(),
            title: "Billing flow".to_string(),
            content: "Handles refunds and charges".to_string(),
            card_type: CardType::Flow,
            source_files: vec!["api/billing.rb".to_string()],
            source_repos: vec!["payments".to_string()],
            tags: vec![],
            identifiers: vec!["Billing".to_string(), "refund".to_string()],
            commit_sha: Some("abc123".to_string()),
            content_hash: Card::derive_content_hash("Billing flow", "Handles refunds and charges"),
            valid_branches: None,
            specificity_score: Some(0.8),
            usage_count: 0,
            stale: false,
            expires_at: None,
        }
    }

    #[test]
    fn upsert_then_fetch_by_id_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_card(&sample_card("c1")).unwrap();
        let fetched = store.fetch_cards_by_ids(&["c1".to_string()]).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].title, "Billing flow");
    }

    #[test]
    fn lexical_search_requires_rebuild_after_replace() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_card(&sample_card("c1")).unwrap();
        store.rebuild_lexical_index().unwrap();
        let hits = store.lexical_search("refund", 10).unwrap();
        assert_eq!(hits.len(), 1);

        // replace_cards_of_types removes c1 and rebuilds automatically.
        store.replace_cards_of_types(&[CardType::Flow], &[]).unwrap();
        let hits_after = store.lexical_search("refund", 10).unwrap();
        assert!(hits_after.is_empty());
    }

    #[test]
    fn advisory_lock_rejects_second_owner() {
        let store = Store::open_in_memory().unwrap();
        store.acquire_lock("run-1").unwrap();
        let err = store.acquire_lock("run-2").unwrap_err();
        assert!(matches!(err, StoreError::ConcurrentRun { .. }));
        store.release_lock("run-1").unwrap();
        store.acquire_lock("run-2").unwrap();
    }

    #[test]
    fn vector_scan_ranks_by_cosine_similarity() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_card(&sample_card("near")).unwrap();
        store.upsert_card(&sample_card("far")).unwrap();
        store
            .upsert_embedding(&CardEmbedding { card_id: "near".to_string(), vector: vec![1.0, 0.0], title_vector: vec![1.0, 0.0] })
            .unwrap();
        store
            .upsert_embedding(&CardEmbedding { card_id: "far".to_string(), vector: vec![0.0, 1.0], title_vector: vec![0.0, 1.0] })
            .unwrap();
        let results = store.vector_scan(None, &[1.0, 0.0], 5).unwrap();
        assert_eq!(results[0].0, "near");
    }

    #[test]
    fn locked_repo_signals_are_not_overwritten() {
        let store = Store::open_in_memory().unwrap();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO repo_signals (repo, signals, signal_source, locked, generated_at) VALUES ('payments', '[\"manual-term\"]', 'manual', 1, ?1)",
                params![Utc::now().to_rfc3339()],
            )
            .unwrap();
        }
        store.upsert_derived_repo_signals("payments", vec!["derived-term".to_string()]).unwrap();
        let signals = store.fetch_repo_signals("payments").unwrap().unwrap();
        assert_eq!(signals.signals, vec!["manual-term".to_string()]);
    }
}
