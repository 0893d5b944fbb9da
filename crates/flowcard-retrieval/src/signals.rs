//! Repo signal generation: language/framework/role/lambda signals plus
//! cross-corpus TF-IDF over each repo's project docs.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

/// Everything the signal generator needs about one repo; assembled by the
/// orchestrator from `RepoProfile`, parsed file role counts, and
/// already-generated project docs.
#[derive(Debug, Clone, Default)]
pub struct RepoSignalInputs {
    pub repo: String,
    pub primary_language: Option<String>,
    pub frameworks: Vec<String>,
    pub is_lambda: bool,
    /// Concatenated contents of the repo's about/architecture/pages/be_overview docs.
    pub docs_text: String,
    pub backend_leaning_classes: usize,
    pub frontend_leaning_classes: usize,
    pub total_classes: usize,
}

const DEFAULT_TOP_N: usize = 12;
const BACKEND_LANGUAGES: &[&str] = &["ruby", "python", "go", "php", "rust", "java"];
const FRONTEND_FRAMEWORKS: &[&str] = &["react", "next.js", "vue"];
const BACKEND_FRAMEWORKS: &[&str] =
    &["rails", "sinatra", "express", "nestjs", "django", "flask", "fastapi", "gin", "actix-web", "axum", "spring boot"];
const CLASS_DISTRIBUTION_THRESHOLD: f64 = 0.40;
const MIN_CLASSES_FOR_DISTRIBUTION_RULE: usize = 5;

static LANGUAGE_SIGNALS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ruby", "ruby"),
        ("python", "python"),
        ("javascript", "javascript"),
        ("typescript", "typescript"),
        ("go", "go"),
        ("php", "php"),
        ("rust", "rust"),
        ("java", "java"),
    ])
});

static REPO_NAME_STOPLIST: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from(["app", "api", "service", "services", "web", "server", "backend", "frontend", "repo", "project", "core"]));

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "this", "that", "with", "from", "your", "have", "will", "about", "which", "their", "there", "when", "where", "what", "they",
        "user", "users", "using", "used", "application", "system", "data", "page", "pages", "value", "values", "model", "models",
        "class", "function", "method", "module", "component", "service",
    ])
});

static HYPHEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+(-[a-z]+)+$").unwrap());
static SNAKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]+(_[a-z]+)+$").unwrap());
static CAMEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][a-zA-Z0-9]*[a-z][A-Z][a-zA-Z0-9]*$").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9_-]*").unwrap());

/// Tokenises doc text into weighted terms: plain lowercase words (weight
/// 1), hyphenated/snake_case compounds and CamelCase tokens (weight 2).
fn tokenize_weighted(text: &str) -> HashMap<String, u32> {
    let mut weights: HashMap<String, u32> = HashMap::new();
    for m in WORD_RE.find_iter(text) {
        let raw = m.as_str();
        let lower = raw.to_lowercase();

        if HYPHEN_RE.is_match(&lower) || SNAKE_RE.is_match(&lower) {
            if !STOPWORDS.contains(lower.as_str()) {
                *weights.entry(lower).or_insert(0) += 2;
            }
            continue;
        }
        if CAMEL_RE.is_match(raw) {
            *weights.entry(lower).or_insert(0) += 2;
            continue;
        }
        if lower.len() >= 4 && !STOPWORDS.contains(lower.as_str()) {
            *weights.entry(lower).or_insert(0) += 1;
        }
    }
    weights
}

/// Cross-corpus TF-IDF: `score = TF * log((N+1)/DF)`, hapax legomena
/// (`tf < 2`) dropped, top `top_n` kept per repo.
fn cross_corpus_terms(repo_term_freqs: &HashMap<String, HashMap<String, u32>>, top_n: usize) -> HashMap<String, Vec<String>> {
    let n = repo_term_freqs.len() as f64;
    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for freqs in repo_term_freqs.values() {
        for term in freqs.keys() {
            *document_frequency.entry(term.as_str()).or_insert(0) += 1;
        }
    }

    let mut out = HashMap::new();
    for (repo, freqs) in repo_term_freqs {
        let mut scored: Vec<(String, f64)> = freqs
            .iter()
            .filter(|(_, tf)| **tf >= 2)
            .map(|(term, tf)| {
                let df = *document_frequency.get(term.as_str()).unwrap_or(&1) as f64;
                let score = (*tf as f64) * ((n + 1.0) / df).ln();
                (term.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_n);
        out.insert(repo.clone(), scored.into_iter().map(|(term, _)| term).collect());
    }
    out
}

fn role_signals(input: &RepoSignalInputs) -> Vec<String> {
    let mut roles = Vec::new();

    let has_be_framework = input.frameworks.iter().any(|f| BACKEND_FRAMEWORKS.contains(&f.as_str()));
    let has_fe_framework = input.frameworks.iter().any(|f| FRONTEND_FRAMEWORKS.contains(&f.as_str()));
    let language_implies_backend =
        input.primary_language.as_deref().map(|l| BACKEND_LANGUAGES.contains(&l)).unwrap_or(false) && !has_fe_framework;

    let distribution_applies = input.total_classes > MIN_CLASSES_FOR_DISTRIBUTION_RULE;
    let be_fraction = if distribution_applies { input.backend_leaning_classes as f64 / input.total_classes as f64 } else { 0.0 };
    let fe_fraction = if distribution_applies { input.frontend_leaning_classes as f64 / input.total_classes as f64 } else { 0.0 };

    if has_be_framework || language_implies_backend || (distribution_applies && be_fraction >= CLASS_DISTRIBUTION_THRESHOLD) {
        roles.push("backend".to_string());
    }
    if has_fe_framework || (distribution_applies && fe_fraction >= CLASS_DISTRIBUTION_THRESHOLD) {
        roles.push("frontend".to_string());
    }
    roles
}

fn repo_name_tokens(repo: &str) -> Vec<String> {
    repo.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() >= 3 && !REPO_NAME_STOPLIST.contains(t.as_str()))
        .collect()
}

/// Produces the final `signals[]` per repo: language + framework + role +
/// lambda + repo-name tokens, plus the repo's top cross-corpus domain terms.
pub fn generate_repo_signals(inputs: &[RepoSignalInputs]) -> HashMap<String, Vec<String>> {
    let term_freqs: HashMap<String, HashMap<String, u32>> =
        inputs.iter().map(|i| (i.repo.clone(), tokenize_weighted(&i.docs_text))).collect();
    let domain_terms = cross_corpus_terms(&term_freqs, DEFAULT_TOP_N);

    let mut out = HashMap::new();
    for input in inputs {
        let mut signals: Vec<String> = Vec::new();

        if let Some(lang) = &input.primary_language {
            if let Some(sig) = LANGUAGE_SIGNALS.get(lang.as_str()) {
                signals.push((*sig).to_string());
            } else {
                signals.push(lang.clone());
            }
        }
        signals.extend(input.frameworks.iter().cloned());
        signals.extend(role_signals(input));
        if input.is_lambda {
            signals.push("lambda".to_string());
        }
        signals.extend(repo_name_tokens(&input.repo));
        if let Some(terms) = domain_terms.get(&input.repo) {
            signals.extend(terms.iter().cloned());
        }

        signals.sort();
        signals.dedup();
        out.insert(input.repo.clone(), signals);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_terms_survive_common_terms_are_dropped() {
        let inputs = vec![
            RepoSignalInputs {
                repo: "payments-svc".to_string(),
                docs_text: "pre_authorization pre_authorization handles user authentication for the app".to_string(),
                ..Default::default()
            },
            RepoSignalInputs {
                repo: "clinic-portal".to_string(),
                docs_text: "blood_pressure blood_pressure tracking handles user authentication for the app".to_string(),
                ..Default::default()
            },
        ];
        let signals = generate_repo_signals(&inputs);
        assert!(signals["payments-svc"].contains(&"pre_authorization".to_string()));
        assert!(signals["clinic-portal"].contains(&"blood_pressure".to_string()));
        // "authentication" appears in both repos' docs but only once each, so
        // it is dropped as a hapax legomenon within each repo's own count.
        assert!(!signals["payments-svc"].contains(&"authentication".to_string()));
    }

    #[test]
    fn backend_role_from_framework() {
        let input = RepoSignalInputs { repo: "x".to_string(), frameworks: vec!["rails".to_string()], ..Default::default() };
        assert!(role_signals(&input).contains(&"backend".to_string()));
    }

    #[test]
    fn backend_role_from_class_distribution() {
        let input = RepoSignalInputs {
            repo: "x".to_string(),
            total_classes: 10,
            backend_leaning_classes: 5,
            frontend_leaning_classes: 0,
            ..Default::default()
        };
        assert!(role_signals(&input).contains(&"backend".to_string()));
    }

    #[test]
    fn distribution_rule_requires_more_than_five_classes() {
        let input =
            RepoSignalInputs { repo: "x".to_string(), total_classes: 4, backend_leaning_classes: 4, ..Default::default() };
        assert!(role_signals(&input).is_empty());
    }

    #[test]
    fn repo_name_stopwords_are_filtered() {
        let tokens = repo_name_tokens("payments-service");
        assert!(tokens.contains(&"payments".to_string()));
        assert!(!tokens.contains(&"service".to_string()));
    }

    #[test]
    fn camel_case_token_gets_weight_two_not_three() {
        let weights = tokenize_weighted("PreAuthorization");
        assert_eq!(weights.get("preauthorization"), Some(&2));
    }

    #[test]
    fn snake_case_token_gets_weight_two_not_three() {
        let weights = tokenize_weighted("pre_authorization");
        assert_eq!(weights.get("pre_authorization"), Some(&2));
    }

    #[test]
    fn plain_word_gets_weight_one() {
        let weights = tokenize_weighted("authorization");
        assert_eq!(weights.get("authorization"), Some(&1));
    }
}
