//! Manifest-only stack detection: language, frameworks, lambda shape,
//! package manager, skill ids. Never scans source files — a repo's
//! dependency surface is defined by its manifests alone.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoProfile {
    pub primary_language: Option<String>,
    pub frameworks: Vec<String>,
    pub is_lambda: bool,
    pub package_manager: Option<String>,
    pub skill_ids: Vec<String>,
}

struct Manifest {
    file_name: &'static str,
    language: &'static str,
    package_manager: &'static str,
}

const MANIFESTS: &[Manifest] = &[
    Manifest { file_name: "Gemfile", language: "ruby", package_manager: "bundler" },
    Manifest { file_name: "go.mod", language: "go", package_manager: "go modules" },
    Manifest { file_name: "pyproject.toml", language: "python", package_manager: "poetry/pip" },
    Manifest { file_name: "requirements.txt", language: "python", package_manager: "pip" },
    Manifest { file_name: "package.json", language: "javascript", package_manager: "npm" },
    Manifest { file_name: "Cargo.toml", language: "rust", package_manager: "cargo" },
    Manifest { file_name: "composer.json", language: "php", package_manager: "composer" },
    Manifest { file_name: "pom.xml", language: "java", package_manager: "maven" },
    Manifest { file_name: "build.gradle", language: "java", package_manager: "gradle" },
    Manifest { file_name: "build.gradle.kts", language: "java", package_manager: "gradle" },
];

/// (manifest substring match, framework name, language scope)
const FRAMEWORK_RULES: &[(&str, &str, &str)] = &[
    ("rails", "rails", "ruby"),
    ("sinatra", "sinatra", "ruby"),
    ("\"react\"", "react", "javascript"),
    ("\"next\"", "next.js", "javascript"),
    ("\"vue\"", "vue", "javascript"),
    ("\"express\"", "express", "javascript"),
    ("\"@nestjs/core\"", "nestjs", "javascript"),
    ("django", "django", "python"),
    ("flask", "flask", "python"),
    ("fastapi", "fastapi", "python"),
    ("gin-gonic", "gin", "go"),
    ("actix-web", "actix-web", "rust"),
    ("axum", "axum", "rust"),
    ("spring-boot", "spring boot", "java"),
];

pub fn profile_repo(repo_root: &Path) -> RepoProfile {
    let mut profile = RepoProfile::default();
    let mut manifest_texts: Vec<String> = Vec::new();

    for manifest in MANIFESTS {
        let path = repo_root.join(manifest.file_name);
        if let Ok(content) = std::fs::read_to_string(&path) {
            if profile.primary_language.is_none() {
                profile.primary_language = Some(manifest.language.to_string());
                profile.package_manager = Some(manifest.package_manager.to_string());
            }
            manifest_texts.push(content);
        }
    }

    let combined = manifest_texts.join("\n").to_lowercase();
    for (needle, framework, _lang) in FRAMEWORK_RULES {
        if combined.contains(needle) {
            profile.frameworks.push(framework.to_string());
        }
    }
    profile.frameworks.sort();
    profile.frameworks.dedup();

    profile.is_lambda = detect_lambda(repo_root, &combined);
    profile.skill_ids = derive_skill_ids(&profile);
    profile
}

fn detect_lambda(repo_root: &Path, combined_manifests: &str) -> bool {
    if combined_manifests.contains("serverless-framework") || combined_manifests.contains("aws-lambda") {
        return true;
    }
    if repo_root.join("serverless.yml").exists() || repo_root.join("serverless.yaml").exists() {
        return true;
    }
    if repo_root.join("template.yaml").exists() || repo_root.join("template.yml").exists() {
        return true;
    }
    if glob_exists(repo_root, "handler") {
        return true;
    }
    combined_manifests.contains("index.handler")
}

fn glob_exists(repo_root: &Path, stem: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(repo_root) else {
        return false;
    };
    entries.flatten().any(|e| {
        e.path()
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case(stem))
            .unwrap_or(false)
    })
}

/// Deterministic, rule-based: `{language}` plus one id per detected
/// framework, plus `lambda` when applicable.
fn derive_skill_ids(profile: &RepoProfile) -> Vec<String> {
    let mut ids = Vec::new();
    if let Some(lang) = &profile.primary_language {
        ids.push(lang.clone());
    }
    ids.extend(profile.frameworks.iter().cloned());
    if profile.is_lambda {
        ids.push("lambda".to_string());
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_rails_from_gemfile() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Gemfile"), "gem 'rails'\n").unwrap();
        let profile = profile_repo(dir.path());
        assert_eq!(profile.primary_language.as_deref(), Some("ruby"));
        assert!(profile.frameworks.contains(&"rails".to_string()));
    }

    #[test]
    fn detects_lambda_from_serverless_yml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("serverless.yml"), "service: x").unwrap();
        let profile = profile_repo(dir.path());
        assert!(profile.is_lambda);
        assert!(profile.skill_ids.contains(&"lambda".to_string()));
    }

    #[test]
    fn no_manifests_yields_empty_profile() {
        let dir = tempfile::tempdir().unwrap();
        let profile = profile_repo(dir.path());
        assert!(profile.primary_language.is_none());
        assert!(profile.frameworks.is_empty());
    }
}
