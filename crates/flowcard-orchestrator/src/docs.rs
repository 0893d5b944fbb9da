//! Project documentation generation. A pluggable `DocGenerator` lets an
//! LLM-backed implementation be swapped in; `StructuralDocGenerator` is the
//! always-available default producing deterministic content from parsed
//! structure alone.

use async_trait::async_trait;
use flowcard_core::{Flow, GraphEdge, ParsedFile, Relation, RepoProfile};
use flowcard_store::types::DocType;

use crate::error::OrchestratorResult;

pub struct DocGenerationContext<'a> {
    pub repo: &'a str,
    pub profile: &'a RepoProfile,
    pub files: &'a [ParsedFile],
    pub edges: &'a [GraphEdge],
    pub flows: &'a [Flow],
}

/// Structural doc types a generator with no language model can still
/// produce faithfully. Anything else (`about`, `business`, `product`,
/// `specialist`) needs narrative judgement and is skipped when no LLM is
/// configured, per the `LlmUnavailable` fallback.
pub const STRUCTURAL_DOC_TYPES: &[DocType] =
    &[DocType::Readme, DocType::Architecture, DocType::CodeStyle, DocType::Rules, DocType::Styles, DocType::Pages, DocType::BeOverview, DocType::CrossRepo];

#[async_trait]
pub trait DocGenerator: Send + Sync {
    /// Returns `Ok(None)` when the doc type is skipped (e.g. needs an LLM
    /// that isn't configured), `Ok(Some(content))` when generated.
    async fn generate(&self, doc_type: DocType, ctx: &DocGenerationContext<'_>) -> OrchestratorResult<Option<String>>;
}

/// Default generator: every doc type in [`STRUCTURAL_DOC_TYPES`] is filled
/// in from parsed files, edges and flows; everything else is skipped.
pub struct StructuralDocGenerator;

#[async_trait]
impl DocGenerator for StructuralDocGenerator {
    async fn generate(&self, doc_type: DocType, ctx: &DocGenerationContext<'_>) -> OrchestratorResult<Option<String>> {
        let content = match doc_type {
            DocType::Readme => Some(readme(ctx)),
            DocType::Architecture => Some(architecture(ctx)),
            DocType::CodeStyle => Some(code_style(ctx)),
            DocType::Rules => Some(rules(ctx)),
            DocType::Styles => styles(ctx),
            DocType::Pages => pages(ctx),
            DocType::BeOverview => be_overview(ctx),
            DocType::CrossRepo => cross_repo(ctx),
            _ => None,
        };
        Ok(content)
    }
}

fn readme(ctx: &DocGenerationContext<'_>) -> String {
    let mut out = format!("# {}\n\n", ctx.repo);
    if let Some(lang) = &ctx.profile.primary_language {
        out.push_str(&format!("Primary language: {lang}\n"));
    }
    if !ctx.profile.frameworks.is_empty() {
        out.push_str(&format!("Frameworks: {}\n", ctx.profile.frameworks.join(", ")));
    }
    if let Some(pm) = &ctx.profile.package_manager {
        out.push_str(&format!("Package manager: {pm}\n"));
    }
    out.push_str(&format!("\n{} source files parsed.\n", ctx.files.len()));
    out
}

fn architecture(ctx: &DocGenerationContext<'_>) -> String {
    let mut out = format!("# Architecture: {}\n\n", ctx.repo);
    out.push_str("## Flows\n\n");
    for flow in ctx.flows {
        let label = if flow.is_hub { "hub" } else { "flow" };
        out.push_str(&format!("- **{}** ({label}): {} files\n", flow.name, flow.files.len()));
    }
    out.push_str("\n## Edges\n\n");
    for relation in [Relation::Import, Relation::Call, Relation::ApiEndpoint, Relation::Association, Relation::Inherits] {
        let count = ctx.edges.iter().filter(|e| e.repo == ctx.repo && e.relation == relation).count();
        if count > 0 {
            out.push_str(&format!("- {}: {count}\n", relation.as_str()));
        }
    }
    out
}

fn code_style(ctx: &DocGenerationContext<'_>) -> String {
    let mut roles: Vec<String> = ctx.files.iter().map(|f| format!("{:?}", f.file_role)).collect();
    roles.sort();
    roles.dedup();
    format!("# Code style: {}\n\nObserved file roles: {}\n", ctx.repo, roles.join(", "))
}

fn rules(ctx: &DocGenerationContext<'_>) -> String {
    let model_count = ctx.files.iter().filter(|f| matches!(f.file_role, flowcard_core::FileRole::Model)).count();
    format!("# Rules: {}\n\n{model_count} model files detected. Associations and inheritance are defined on those classes.\n", ctx.repo)
}

fn styles(ctx: &DocGenerationContext<'_>) -> Option<String> {
    let has_frontend = ctx.profile.frameworks.iter().any(|f| matches!(f.as_str(), "react" | "next.js" | "vue"));
    has_frontend.then(|| format!("# Styles: {}\n\nFrontend framework detected: {}.\n", ctx.repo, ctx.profile.frameworks.join(", ")))
}

fn pages(ctx: &DocGenerationContext<'_>) -> Option<String> {
    let routes: Vec<String> = ctx
        .files
        .iter()
        .flat_map(|f| &f.associations)
        .filter_map(|a| match a {
            flowcard_core::Association::Route { method, path, .. } => Some(format!("- {method} {path}")),
            _ => None,
        })
        .collect();
    (!routes.is_empty()).then(|| format!("# Pages: {}\n\n{}\n", ctx.repo, routes.join("\n")))
}

fn be_overview(ctx: &DocGenerationContext<'_>) -> Option<String> {
    let is_backend = ctx.profile.primary_language.as_deref().map(|l| matches!(l, "ruby" | "python" | "go" | "php" | "rust" | "java")).unwrap_or(false);
    is_backend.then(|| {
        let controllers = ctx.files.iter().filter(|f| matches!(f.file_role, flowcard_core::FileRole::Controller)).count();
        format!("# Backend overview: {}\n\n{controllers} controllers detected.\n", ctx.repo)
    })
}

fn cross_repo(ctx: &DocGenerationContext<'_>) -> Option<String> {
    let cross: Vec<&GraphEdge> = ctx.edges.iter().filter(|e| e.relation == Relation::ApiEndpoint && e.repo != *ctx.repo).collect();
    (!cross.is_empty()).then(|| {
        let mut out = format!("# Cross-repo calls: {}\n\n", ctx.repo);
        for edge in cross {
            out.push_str(&format!("- {} -> {}\n", edge.source_file.display(), edge.target_file.display()));
        }
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcard_core::RepoProfile;

    fn empty_ctx<'a>(repo: &'a str, profile: &'a RepoProfile, flows: &'a [Flow], edges: &'a [GraphEdge], files: &'a [ParsedFile]) -> DocGenerationContext<'a> {
        DocGenerationContext { repo, profile, files, edges, flows }
    }

    #[tokio::test]
    async fn readme_is_always_generated() {
        let profile = RepoProfile::default();
        let ctx = empty_ctx("payments", &profile, &[], &[], &[]);
        let gen = StructuralDocGenerator;
        let out = gen.generate(DocType::Readme, &ctx).await.unwrap();
        assert!(out.unwrap().contains("payments"));
    }

    #[tokio::test]
    async fn about_is_skipped_without_llm() {
        let profile = RepoProfile::default();
        let ctx = empty_ctx("payments", &profile, &[], &[], &[]);
        let gen = StructuralDocGenerator;
        let out = gen.generate(DocType::About, &ctx).await.unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn styles_skipped_without_frontend_framework() {
        let profile = RepoProfile::default();
        let ctx = empty_ctx("payments", &profile, &[], &[], &[]);
        let gen = StructuralDocGenerator;
        let out = gen.generate(DocType::Styles, &ctx).await.unwrap();
        assert!(out.is_none());
    }
}
