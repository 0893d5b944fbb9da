//! Pure transform from parsed files to the typed edge set.

use std::collections::HashMap;
use std::path::Path;

use serde_json::json;

use crate::graph::{dedupe_edges, GraphEdge, Relation};
use crate::parser::{Association, ParsedFile};

/// Builds the edge set for one workspace's worth of parsed files. Imports
/// are resolved against a module-name index built from every file's own
/// path (best-effort; unresolved imports are dropped rather than guessed
/// at, since a wrong edge is worse than a missing one). Routes from
/// backend files are paired with frontend files that reference the same
/// path text, forming `api_endpoint` edges.
pub fn build_edges(files: &[ParsedFile], workspace_root: &Path) -> Vec<GraphEdge> {
    let module_index = build_module_index(files);
    let mut edges = Vec::new();

    for file in files {
        for import in &file.imports {
            if let Some(target) = module_index.get(normalize_module(&import.module).as_str()) {
                if target != &file.path {
                    edges.push(GraphEdge::new(file.path.clone(), target.clone(), Relation::Import, file.repo.clone()));
                }
            }
        }

        for assoc in &file.associations {
            match assoc {
                Association::Inherits { class, superclass } => {
                    if let Some(target) = module_index.get(&normalize_module(superclass)) {
                        edges.push(
                            GraphEdge::new(file.path.clone(), target.clone(), Relation::Inherits, file.repo.clone())
                                .with_metadata(json!({"class": class, "superclass": superclass})),
                        );
                    }
                }
                Association::HasAssociation { class, target, kind } => {
                    if let Some(target_path) = module_index.get(&normalize_module(target)) {
                        edges.push(
                            GraphEdge::new(file.path.clone(), target_path.clone(), Relation::Association, file.repo.clone())
                                .with_metadata(json!({"class": class, "target": target, "kind": kind})),
                        );
                    }
                }
                Association::Route { .. } => {} // paired across repos below
            }
        }
    }

    edges.extend(build_api_endpoint_edges(files));

    let mut edges = dedupe_edges(edges);
    for edge in &mut edges {
        edge.relativize(workspace_root);
    }
    edges
}

fn build_module_index(files: &[ParsedFile]) -> HashMap<String, std::path::PathBuf> {
    let mut index = HashMap::new();
    for file in files {
        if let Some(stem) = file.path.file_stem().and_then(|s| s.to_str()) {
            index.entry(normalize_module(stem)).or_insert_with(|| file.path.clone());
        }
        for class in &file.classes {
            index.entry(normalize_module(&class.name)).or_insert_with(|| file.path.clone());
        }
    }
    index
}

fn normalize_module(name: &str) -> String {
    name.trim_start_matches("./")
        .trim_start_matches('.')
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .to_lowercase()
}

/// Pairs a backend route's path against any frontend file whose source
/// text mentions that same literal path, producing a directed
/// `api_endpoint` edge from the backend handler file to the frontend
/// caller. This is necessarily heuristic (no call-graph across the
/// network boundary exists); it is the same `source contains path text`
/// shape cross-repo propagation in the invalidator relies on.
fn build_api_endpoint_edges(files: &[ParsedFile]) -> Vec<GraphEdge> {
    let mut edges = Vec::new();
    let backend_routes: Vec<(&ParsedFile, &str, &str)> = files
        .iter()
        .flat_map(|f| {
            f.associations.iter().filter_map(move |a| match a {
                Association::Route { method, path, .. } => Some((f, method.as_str(), path.as_str())),
                _ => None,
            })
        })
        .collect();

    if backend_routes.is_empty() {
        return edges;
    }

    for file in files {
        for (backend_file, method, path) in &backend_routes {
            if backend_file.path == file.path {
                continue;
            }
            let route_stem = path.split(':').next().unwrap_or(path);
            if route_stem.len() > 1 && file.source.contains(route_stem) {
                edges.push(
                    GraphEdge::new(backend_file.path.clone(), file.path.clone(), Relation::ApiEndpoint, backend_file.repo.clone())
                        .with_metadata(json!({"method": method, "path": path})),
                );
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{FileRole, SupportedLanguage};
    use std::path::PathBuf;

    fn file(path: &str, repo: &str, imports: Vec<&str>) -> ParsedFile {
        ParsedFile {
            path: PathBuf::from(path),
            repo: repo.to_string(),
            language: SupportedLanguage::Ruby,
            file_role: FileRole::Other,
            classes: Vec::new(),
            functions: Vec::new(),
            associations: Vec::new(),
            imports: imports
                .into_iter()
                .map(|m| crate::parser::Import { module: m.to_string(), names: Vec::new() })
                .collect(),
            source: String::new(),
        }
    }

    #[test]
    fn resolves_import_to_matching_file_stem() {
        let files = vec![file("/ws/repo/a.rb", "repo", vec!["b"]), file("/ws/repo/b.rb", "repo", vec![])];
        let edges = build_edges(&files, Path::new("/ws"));
        assert!(edges.iter().any(|e| e.relation == Relation::Import && e.target_file == PathBuf::from("repo/b.rb")));
    }

    #[test]
    fn no_duplicate_triples() {
        let files = vec![file("/ws/repo/a.rb", "repo", vec!["b", "b"]), file("/ws/repo/b.rb", "repo", vec![])];
        let edges = build_edges(&files, Path::new("/ws"));
        let import_edges: Vec<_> = edges.iter().filter(|e| e.relation == Relation::Import).collect();
        assert_eq!(import_edges.len(), 1);
    }

    #[test]
    fn api_endpoint_edge_links_backend_route_to_frontend_caller() {
        let mut backend = file("/ws/api/billing_controller.rb", "api", vec![]);
        backend.associations.push(Association::Route {
            method: "GET".to_string(),
            path: "/billing/:id".to_string(),
            handler: None,
        });

        let mut frontend = file("/ws/web/billing_page.tsx", "web", vec![]);
        frontend.source = "fetch('/billing/' + id)".to_string();

        let edges = build_edges(&[backend, frontend], Path::new("/ws"));
        assert!(edges.iter().any(|e| {
            e.relation == Relation::ApiEndpoint
                && e.source_file == PathBuf::from("api/billing_controller.rb")
                && e.target_file == PathBuf::from("web/billing_page.tsx")
        }));
    }

    #[test]
    fn api_endpoint_edges_are_empty_without_any_routes() {
        let a = file("/ws/a.rb", "repo", vec![]);
        let b = file("/ws/b.rb", "repo", vec![]);
        let edges = build_api_endpoint_edges(&[a, b]);
        assert!(edges.is_empty());
    }
}
