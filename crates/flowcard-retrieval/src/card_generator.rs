//! Card synthesis: flows, parsed files, edges, thermal map in; flow/model/
//! cross-service/hub cards out. Pure and deterministic — same inputs
//! always produce the same cards (ids included), so `replace_cards_of_types`
//! can delete-then-reinsert without a diff step.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use flowcard_core::flow_detector::Flow;
use flowcard_core::git_signals::ThermalMap;
use flowcard_core::graph::{GraphEdge, Relation};
use flowcard_core::parser::{FileRole, ParsedFile};
use flowcard_store::types::{Card, CardType};

pub struct CardGenerationInput<'a> {
    pub flows: &'a [Flow],
    pub files: &'a [ParsedFile],
    pub edges: &'a [GraphEdge],
    pub commit_shas: &'a HashMap<String, String>,
    pub thermal_map: Option<&'a ThermalMap>,
}

pub fn generate_cards(input: &CardGenerationInput) -> Vec<Card> {
    let mut cards = Vec::new();
    cards.extend(generate_flow_and_hub_cards(input));
    cards.extend(generate_model_cards(input));
    cards.extend(generate_cross_service_cards(input));
    cards
}

fn reorder_by_heat(files: &[PathBuf], thermal: Option<&ThermalMap>) -> Vec<PathBuf> {
    let mut ordered = files.to_vec();
    if let Some(thermal) = thermal {
        ordered.sort_by(|a, b| thermal.score(b).partial_cmp(&thermal.score(a)).unwrap_or(std::cmp::Ordering::Equal));
    }
    ordered
}

fn primary_repo_commit(repos: &[String], commit_shas: &HashMap<String, String>) -> Option<String> {
    repos.first().and_then(|r| commit_shas.get(r)).cloned()
}

fn identifiers_for_files<'a>(files: &[PathBuf], by_path: &HashMap<&'a Path, &'a ParsedFile>) -> Vec<String> {
    let mut ids = Vec::new();
    for path in files {
        if let Some(parsed) = by_path.get(path.as_path()) {
            ids.extend(parsed.classes.iter().map(|c| c.name.clone()));
            ids.extend(parsed.functions.iter().map(|f| f.name.clone()));
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

fn file_index<'a>(files: &'a [ParsedFile]) -> HashMap<&'a Path, &'a ParsedFile> {
    files.iter().map(|f| (f.path.as_path(), f)).collect()
}

fn generate_flow_and_hub_cards(input: &CardGenerationInput) -> Vec<Card> {
    let by_path = file_index(input.files);
    let mut cards = Vec::new();

    for flow in input.flows {
        let ordered_files = reorder_by_heat(&flow.files, input.thermal_map);
        let card_type = if flow.is_hub { CardType::Hub } else { CardType::Flow };
        let source_files: Vec<String> = ordered_files.iter().map(|p| p.to_string_lossy().to_string()).collect();
        let primary_file = source_files.first().cloned().unwrap_or_default();

        let entry_points: Vec<String> = ordered_files
            .iter()
            .filter_map(|p| by_path.get(p.as_path()))
            .flat_map(|f| f.functions.iter().map(|fun| fun.name.clone()))
            .take(5)
            .collect();

        let content = if flow.is_hub {
            format!(
                "Hub touching {} files across {}. High fan-in/fan-out; capped in retrieval so it doesn't crowd out specific results.",
                source_files.len(),
                flow.repos.join(", ")
            )
        } else {
            format!(
                "Flow spanning {} file(s) in {}. Entry points: {}.",
                source_files.len(),
                flow.repos.join(", "),
                if entry_points.is_empty() { "none detected".to_string() } else { entry_points.join(", ") }
            )
        };

        cards.push(Card {
            id: Card::derive_id(&flow.name, card_type, &primary_file),
            flow: flow.name.clone(),
            title: flow.name.clone(),
            content: content.clone(),
            card_type,
            source_files: source_files.clone(),
            source_repos: flow.repos.clone(),
            tags: Vec::new(),
            identifiers: identifiers_for_files(&ordered_files, &by_path),
            commit_sha: primary_repo_commit(&flow.repos, input.commit_shas),
            content_hash: Card::derive_content_hash(&flow.name, &content),
            valid_branches: None,
            specificity_score: None,
            usage_count: 0,
            stale: false,
            expires_at: None,
        });
    }
    cards
}

fn generate_model_cards(input: &CardGenerationInput) -> Vec<Card> {
    let mut cards = Vec::new();
    for file in input.files {
        if file.file_role != FileRole::Model {
            continue;
        }
        for class in &file.classes {
            let associations: Vec<String> = file
                .associations
                .iter()
                .filter_map(|a| match a {
                    flowcard_core::parser::Association::HasAssociation { class: c, target, kind } if c == &class.name => {
                        Some(format!("{kind} {target}"))
                    }
                    flowcard_core::parser::Association::Inherits { class: c, superclass } if c == &class.name => {
                        Some(format!("inherits {superclass}"))
                    }
                    _ => None,
                })
                .collect();

            let content = if associations.is_empty() {
                format!("Data model `{}` in {}.", class.name, file.repo)
            } else {
                format!("Data model `{}` in {}. Associations: {}.", class.name, file.repo, associations.join(", "))
            };

            let source_files = vec![file.path.to_string_lossy().to_string()];
            let flow_name = format!("model:{}", class.name);
            cards.push(Card {
                id: Card::derive_id(&flow_name, CardType::Model, &source_files[0]),
                flow: flow_name.clone(),
                title: class.name.clone(),
                content: content.clone(),
                card_type: CardType::Model,
                source_files: source_files.clone(),
                source_repos: vec![file.repo.clone()],
                tags: Vec::new(),
                identifiers: std::iter::once(class.name.clone()).chain(class.methods.iter().cloned()).collect(),
                commit_sha: input.commit_shas.get(&file.repo).cloned(),
                content_hash: Card::derive_content_hash(&class.name, &content),
                valid_branches: None,
                specificity_score: None,
                usage_count: 0,
                stale: false,
                expires_at: None,
            });
        }
    }
    cards
}

fn generate_cross_service_cards(input: &CardGenerationInput) -> Vec<Card> {
    let by_path = file_index(input.files);
    let mut cards = Vec::new();

    for edge in input.edges {
        if edge.relation != Relation::ApiEndpoint {
            continue;
        }
        let source_repo = by_path.get(edge.source_file.as_path()).map(|f| f.repo.clone()).unwrap_or_default();
        let target_repo = by_path.get(edge.target_file.as_path()).map(|f| f.repo.clone()).unwrap_or_default();
        if source_repo.is_empty() || target_repo.is_empty() || source_repo == target_repo {
            continue;
        }

        let method = edge.metadata.get("method").and_then(|v| v.as_str()).unwrap_or("?");
        let path = edge.metadata.get("path").and_then(|v| v.as_str()).unwrap_or("?");
        let title = format!("{method} {path}: {source_repo} \u{2194} {target_repo}");
        let content = format!(
            "Cross-service route {method} {path}. Backend: {source_repo} ({}). Frontend: {target_repo} ({}).",
            edge.source_file.display(),
            edge.target_file.display()
        );
        let source_files = vec![edge.source_file.to_string_lossy().to_string(), edge.target_file.to_string_lossy().to_string()];
        let flow_name = format!("cross_service:{source_repo}:{target_repo}:{path}");

        cards.push(Card {
            id: Card::derive_id(&flow_name, CardType::CrossService, &source_files[0]),
            flow: flow_name.clone(),
            title,
            content: content.clone(),
            card_type: CardType::CrossService,
            source_files,
            source_repos: vec![source_repo.clone(), target_repo.clone()],
            tags: Vec::new(),
            identifiers: vec![method.to_string(), path.to_string()],
            commit_sha: input.commit_shas.get(&source_repo).cloned(),
            content_hash: Card::derive_content_hash(&flow_name, &content),
            valid_branches: None,
            specificity_score: None,
            usage_count: 0,
            stale: false,
            expires_at: None,
        });
    }
    cards
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcard_core::parser::SupportedLanguage;

    fn parsed_model_file(repo: &str, path: &str, class_name: &str) -> ParsedFile {
        ParsedFile {
            path: PathBuf::from(path),
            repo: repo.to_string(),
            language: SupportedLanguage::Ruby,
            file_role: FileRole::Model,
            classes: vec![flowcard_core::parser::ClassEntity {
                name: class_name.to_string(),
                superclass: Some("ApplicationRecord".to_string()),
                methods: vec!["refund".to_string()],
                line_start: 1,
                line_end: 10,
            }],
            functions: vec![],
            associations: vec![flowcard_core::parser::Association::HasAssociation {
                class: class_name.to_string(),
                target: "Customer".to_string(),
                kind: "belongs_to".to_string(),
            }],
            imports: vec![],
            source: String::new(),
        }
    }

    #[test]
    fn model_card_carries_associations_and_stable_id() {
        let files = vec![parsed_model_file("payments", "app/models/charge.rb", "Charge")];
        let input = CardGenerationInput { flows: &[], files: &files, edges: &[], commit_shas: &HashMap::new(), thermal_map: None };
        let cards = generate_model_cards(&input);
        assert_eq!(cards.len(), 1);
        assert!(cards[0].content.contains("belongs_to Customer"));

        let cards_again = generate_model_cards(&input);
        assert_eq!(cards[0].id, cards_again[0].id);
    }

    #[test]
    fn flow_card_reorders_files_by_heat() {
        let flow = Flow { name: "billing".to_string(), files: vec![PathBuf::from("cold.rb"), PathBuf::from("hot.rb")], repos: vec!["payments".to_string()], is_hub: false };
        let mut heat = HashMap::new();
        heat.insert(PathBuf::from("hot.rb"), 0.9);
        heat.insert(PathBuf::from("cold.rb"), 0.1);
        let thermal = ThermalMap { heat };

        let input = CardGenerationInput { flows: &[flow], files: &[], edges: &[], commit_shas: &HashMap::new(), thermal_map: Some(&thermal) };
        let cards = generate_flow_and_hub_cards(&input);
        assert_eq!(cards[0].source_files[0], "hot.rb");
    }

    #[test]
    fn hub_flow_generates_hub_card_type() {
        let flow = Flow { name: "core".to_string(), files: vec![PathBuf::from("a.rb")], repos: vec!["payments".to_string()], is_hub: true };
        let input = CardGenerationInput { flows: &[flow], files: &[], edges: &[], commit_shas: &HashMap::new(), thermal_map: None };
        let cards = generate_flow_and_hub_cards(&input);
        assert_eq!(cards[0].card_type, CardType::Hub);
    }

    #[test]
    fn cross_service_card_skips_same_repo_edges() {
        let files = vec![
            ParsedFile {
                path: PathBuf::from("be.rb"),
                repo: "payments".to_string(),
                language: SupportedLanguage::Ruby,
                file_role: FileRole::Route,
                classes: vec![],
                functions: vec![],
                associations: vec![],
                imports: vec![],
                source: String::new(),
            },
            ParsedFile {
                path: PathBuf::from("fe.tsx"),
                repo: "payments".to_string(),
                language: SupportedLanguage::Tsx,
                file_role: FileRole::Component,
                classes: vec![],
                functions: vec![],
                associations: vec![],
                imports: vec![],
                source: String::new(),
            },
        ];
        let edge = GraphEdge::new("be.rb", "fe.tsx", Relation::ApiEndpoint, "payments")
            .with_metadata(serde_json::json!({"method": "GET", "path": "/charges"}));
        let input = CardGenerationInput { flows: &[], files: &files, edges: &[edge], commit_shas: &HashMap::new(), thermal_map: None };
        assert!(generate_cross_service_cards(&input).is_empty());
    }
}
