//! Community detection over the file graph.
//!
//! Full multi-level Louvain has no equivalent crate in the dependency
//! stack, so flows are produced by deterministic synchronous label
//! propagation over an undirected projection of the edge set: every node
//! starts in its own community and repeatedly adopts the majority label of
//! its neighbours, ties broken by the smaller label id rather than by
//! insertion order or randomness. Seeded with a hash of the sorted edge
//! list so two runs over the same edges always converge to the same
//! partition (stable-partitioning testable property).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::graph::{NodeIndex, UnGraph};
use xxhash_rust::xxh3::xxh3_64;

use crate::graph::GraphEdge;
use crate::parser::ParsedFile;

const MAX_ITERATIONS: usize = 20;
const HUB_DOMINANCE_THRESHOLD: f64 = 0.25;
const HUB_FAN_IN_THRESHOLD: usize = 40;

#[derive(Debug, Clone)]
pub struct SeedFlow {
    pub name: String,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flow {
    pub name: String,
    pub files: Vec<PathBuf>,
    pub repos: Vec<String>,
    pub is_hub: bool,
}

pub fn detect_flows(edges: &[GraphEdge], files: &[ParsedFile], seeds: &[SeedFlow]) -> Vec<Flow> {
    if files.is_empty() {
        return Vec::new();
    }

    let repo_by_path: HashMap<&Path, &str> = files.iter().map(|f| (f.path.as_path(), f.repo.as_str())).collect();

    let mut graph = UnGraph::<PathBuf, ()>::new_undirected();
    let mut index_of: HashMap<PathBuf, NodeIndex> = HashMap::new();
    for f in files {
        let idx = graph.add_node(f.path.clone());
        index_of.insert(f.path.clone(), idx);
    }
    for edge in edges {
        if let (Some(&s), Some(&t)) = (index_of.get(&edge.source_file), index_of.get(&edge.target_file)) {
            if s != t {
                graph.update_edge(s, t, ());
            }
        }
    }

    let seed = deterministic_seed(edges);
    let mut label: HashMap<NodeIndex, u64> = index_of
        .iter()
        .map(|(path, &idx)| (idx, node_seed_label(path, seed)))
        .collect();

    for seed_flow in seeds {
        let flow_label = xxh3_64(seed_flow.name.as_bytes()) ^ seed;
        for path in &seed_flow.files {
            if let Some(&idx) = index_of.get(path) {
                label.insert(idx, flow_label);
            }
        }
    }

    let node_order: Vec<NodeIndex> = {
        let mut nodes: Vec<NodeIndex> = graph.node_indices().collect();
        nodes.sort_by_key(|&idx| graph[idx].clone());
        nodes
    };

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for &node in &node_order {
            let mut counts: HashMap<u64, usize> = HashMap::new();
            for neighbor in graph.neighbors(node) {
                *counts.entry(label[&neighbor]).or_insert(0) += 1;
            }
            if counts.is_empty() {
                continue;
            }
            let max_count = *counts.values().max().unwrap();
            let mut candidates: Vec<u64> = counts.into_iter().filter(|(_, c)| *c == max_count).map(|(l, _)| l).collect();
            candidates.sort_unstable();
            let winner = candidates[0];
            if label[&node] != winner {
                label.insert(node, winner);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut communities: HashMap<u64, Vec<PathBuf>> = HashMap::new();
    for (&idx, &lbl) in &label {
        communities.entry(lbl).or_default().push(graph[idx].clone());
    }

    let total_files = files.len();
    let fan_in: HashMap<&Path, usize> = {
        let mut counts: HashMap<&Path, usize> = HashMap::new();
        for edge in edges {
            *counts.entry(edge.target_file.as_path()).or_insert(0) += 1;
        }
        counts
    };

    let mut flows: Vec<Flow> = communities
        .into_iter()
        .map(|(lbl, mut member_files)| {
            member_files.sort();
            let repos: HashSet<String> = member_files
                .iter()
                .filter_map(|p| repo_by_path.get(p.as_path()).map(|r| r.to_string()))
                .collect();
            let max_fan_in = member_files.iter().filter_map(|p| fan_in.get(p.as_path())).copied().max().unwrap_or(0);
            let dominance = member_files.len() as f64 / total_files as f64;
            let is_hub = dominance > HUB_DOMINANCE_THRESHOLD || max_fan_in > HUB_FAN_IN_THRESHOLD;
            let mut repos: Vec<String> = repos.into_iter().collect();
            repos.sort();
            Flow {
                name: flow_name(&member_files, lbl),
                files: member_files,
                repos,
                is_hub,
            }
        })
        .collect();

    flows.sort_by(|a, b| a.name.cmp(&b.name));
    flows
}

fn deterministic_seed(edges: &[GraphEdge]) -> u64 {
    let mut keys: Vec<String> = edges
        .iter()
        .map(|e| format!("{}|{}|{}", e.source_file.display(), e.target_file.display(), e.relation))
        .collect();
    keys.sort();
    xxh3_64(keys.join("\n").as_bytes())
}

fn node_seed_label(path: &Path, seed: u64) -> u64 {
    xxh3_64(path.to_string_lossy().as_bytes()) ^ seed
}

fn flow_name(files: &[PathBuf], label: u64) -> String {
    // Name a flow after its shallowest shared directory component, falling
    // back to the label hash when files share no directory.
    let dirs: Vec<Vec<&std::ffi::OsStr>> = files
        .iter()
        .filter_map(|p| p.parent())
        .map(|d| d.components().map(|c| c.as_os_str()).collect())
        .collect();

    let common = dirs.split_first().map(|(first, rest)| {
        let mut prefix_len = first.len();
        for dir in rest {
            prefix_len = prefix_len.min(dir.len());
            for i in 0..prefix_len {
                if dir[i] != first[i] {
                    prefix_len = i;
                    break;
                }
            }
        }
        first[..prefix_len].iter().collect::<PathBuf>()
    });

    match common {
        Some(dir) if !dir.as_os_str().is_empty() => dir.display().to_string(),
        _ => format!("flow-{:x}", label & 0xffff),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Relation;
    use crate::parser::{FileRole, SupportedLanguage};

    fn file(path: &str, repo: &str) -> ParsedFile {
        ParsedFile {
            path: PathBuf::from(path),
            repo: repo.to_string(),
            language: SupportedLanguage::Ruby,
            file_role: FileRole::Other,
            classes: Vec::new(),
            functions: Vec::new(),
            associations: Vec::new(),
            imports: Vec::new(),
            source: String::new(),
        }
    }

    #[test]
    fn stable_partitioning_across_repeated_runs() {
        let files = vec![file("repo/a.rb", "repo"), file("repo/b.rb", "repo"), file("repo/c.rb", "repo")];
        let edges = vec![
            GraphEdge::new("repo/a.rb", "repo/b.rb", Relation::Call, "repo"),
            GraphEdge::new("repo/b.rb", "repo/c.rb", Relation::Call, "repo"),
        ];
        let first = detect_flows(&edges, &files, &[]);
        let second = detect_flows(&edges, &files, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn hub_flagged_above_dominance_threshold() {
        let mut files = Vec::new();
        let mut edges = Vec::new();
        for i in 0..10 {
            files.push(file(&format!("repo/f{i}.rb"), "repo"));
        }
        for i in 1..10 {
            edges.push(GraphEdge::new("repo/f0.rb", format!("repo/f{i}.rb"), Relation::Call, "repo"));
        }
        let flows = detect_flows(&edges, &files, &[]);
        assert!(flows.iter().any(|f| f.is_hub));
    }
}
