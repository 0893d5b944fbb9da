//! Parsing, graph building, flow detection, git signals and stack
//! profiling: the filesystem-facing half of the indexing pipeline.
//!
//! Every public function here is pure over its inputs (a filesystem
//! snapshot, a parsed-file slice, an edge slice) with the sole exception of
//! [`git_signals`], which shells out to `git` and degrades to empty output
//! on any failure.

pub mod discovery;
pub mod error;
pub mod flow_detector;
pub mod git_signals;
pub mod graph;
pub mod graph_builder;
pub mod parser;
pub mod stack_profiler;

pub use error::{CoreError, CoreResult, ParseStats};
pub use flow_detector::{detect_flows, Flow, SeedFlow};
pub use graph::{GraphEdge, Relation};
pub use graph_builder::build_edges;
pub use parser::{Association, ClassEntity, FileRole, FunctionEntity, Import, ParsedFile, SupportedLanguage};
pub use stack_profiler::{profile_repo, RepoProfile};
