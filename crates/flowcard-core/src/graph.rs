//! Typed edge set produced by the graph builder.
//!
//! Edges are always file-to-file; symbol-level detail (which class extends
//! which, which route maps to which handler) lives in the edge's
//! `metadata` payload rather than in separate edge kinds, so the store can
//! persist one edge table with one JSON column.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Import,
    Call,
    ApiEndpoint,
    Association,
    Inherits,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Import => "import",
            Relation::Call => "call",
            Relation::ApiEndpoint => "api_endpoint",
            Relation::Association => "association",
            Relation::Inherits => "inherits",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_file: PathBuf,
    pub target_file: PathBuf,
    pub relation: Relation,
    /// Variant payload, e.g. `{"method": "GET", "path": "/billing/:id"}` for
    /// an `api_endpoint` edge.
    pub metadata: serde_json::Value,
    pub repo: String,
}

impl GraphEdge {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>, relation: Relation, repo: impl Into<String>) -> Self {
        GraphEdge {
            source_file: source.into(),
            target_file: target.into(),
            relation,
            metadata: serde_json::Value::Null,
            repo: repo.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Rewrites both endpoints to be relative to `workspace_root`, matching
    /// the builder's contract that absolute paths never reach persistence.
    pub fn relativize(&mut self, workspace_root: &Path) {
        self.source_file = relativize_one(&self.source_file, workspace_root);
        self.target_file = relativize_one(&self.target_file, workspace_root);
    }
}

fn relativize_one(path: &Path, workspace_root: &Path) -> PathBuf {
    path.strip_prefix(workspace_root).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

/// Deduplicates by `(source, target, relation)`, keeping the first
/// occurrence's metadata. Graph builder invariant: no duplicate triples.
pub fn dedupe_edges(edges: Vec<GraphEdge>) -> Vec<GraphEdge> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(edges.len());
    for edge in edges {
        let key = (edge.source_file.clone(), edge.target_file.clone(), edge.relation);
        if seen.insert(key) {
            out.push(edge);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_and_drops_repeats() {
        let edges = vec![
            GraphEdge::new("a.rb", "b.rb", Relation::Import, "repo"),
            GraphEdge::new("a.rb", "b.rb", Relation::Import, "repo"),
            GraphEdge::new("a.rb", "b.rb", Relation::Call, "repo"),
        ];
        let deduped = dedupe_edges(edges);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn relativize_strips_workspace_root() {
        let mut edge = GraphEdge::new("/ws/repo/a.rb", "/ws/repo/b.rb", Relation::Import, "repo");
        edge.relativize(Path::new("/ws"));
        assert_eq!(edge.source_file, PathBuf::from("repo/a.rb"));
    }
}
