//! Drives a full indexing run: parse, build edges, detect flows, profile
//! stacks, generate docs and cards, embed and score, then refresh the file
//! index. Also hosts the invalidator that stales cards and docs on change.

pub mod docs;
pub mod error;
pub mod invalidator;
pub mod orchestrator;

pub use docs::{DocGenerationContext, DocGenerator, StructuralDocGenerator};
pub use error::{OrchestratorError, OrchestratorResult};
pub use invalidator::{invalidate, ChangeStatus, ChangedFile, InvalidationRequest, InvalidationResult};
pub use orchestrator::{IndexerOrchestrator, OrchestratorConfig, RepoTarget, RunOutcome, RunSummary};
