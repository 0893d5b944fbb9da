//! Language-aware parsing of source files into typed symbols.
//!
//! Walks a tree-sitter parse tree directly (rather than compiled `.scm`
//! queries) to pull out class/function declarations, imports and a handful
//! of association shapes (inheritance, ORM-style associations, HTTP routes)
//! that the graph builder and card generator need. Parsing never writes
//! anything; unreadable or unparseable files are counted, not propagated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Node, Parser};

use crate::error::ParseStats;

/// Languages flowcard can parse natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedLanguage {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Rust,
    Go,
    Ruby,
}

impl SupportedLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportedLanguage::Python => "python",
            SupportedLanguage::JavaScript => "javascript",
            SupportedLanguage::TypeScript => "typescript",
            SupportedLanguage::Tsx => "typescript",
            SupportedLanguage::Rust => "rust",
            SupportedLanguage::Go => "go",
            SupportedLanguage::Ruby => "ruby",
        }
    }

    pub fn tree_sitter_language(&self) -> Language {
        match self {
            SupportedLanguage::Python => tree_sitter_python::LANGUAGE.into(),
            SupportedLanguage::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            SupportedLanguage::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            SupportedLanguage::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            SupportedLanguage::Rust => tree_sitter_rust::LANGUAGE.into(),
            SupportedLanguage::Go => tree_sitter_go::LANGUAGE.into(),
            SupportedLanguage::Ruby => tree_sitter_ruby::LANGUAGE.into(),
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        get_extension_map().get(ext.to_lowercase().as_str()).copied()
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }
}

impl std::fmt::Display for SupportedLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static EXTENSION_MAP: OnceLock<HashMap<&'static str, SupportedLanguage>> = OnceLock::new();

fn get_extension_map() -> &'static HashMap<&'static str, SupportedLanguage> {
    EXTENSION_MAP.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("py", SupportedLanguage::Python);
        map.insert("js", SupportedLanguage::JavaScript);
        map.insert("mjs", SupportedLanguage::JavaScript);
        map.insert("cjs", SupportedLanguage::JavaScript);
        map.insert("jsx", SupportedLanguage::JavaScript);
        map.insert("ts", SupportedLanguage::TypeScript);
        map.insert("tsx", SupportedLanguage::Tsx);
        map.insert("rs", SupportedLanguage::Rust);
        map.insert("go", SupportedLanguage::Go);
        map.insert("rb", SupportedLanguage::Ruby);
        map
    })
}

/// Coarse role a file plays, used by the repo signal generator's class-type
/// distribution rule and by card generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileRole {
    Model,
    Controller,
    Service,
    Job,
    Serializer,
    Concern,
    Middleware,
    Mailer,
    Component,
    Store,
    Route,
    Config,
    Test,
    Other,
}

impl FileRole {
    pub fn from_path(path: &Path) -> FileRole {
        let s = path.to_string_lossy().to_lowercase();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_lowercase();
        if s.contains("/test") || s.contains("_test") || s.contains("_spec") || s.contains("/spec") {
            FileRole::Test
        } else if s.contains("/models/") || stem.ends_with("_model") {
            FileRole::Model
        } else if s.contains("/controllers/") || stem.ends_with("_controller") {
            FileRole::Controller
        } else if s.contains("/services/") || stem.ends_with("_service") {
            FileRole::Service
        } else if s.contains("/jobs/") || s.contains("/workers/") || stem.ends_with("_job") {
            FileRole::Job
        } else if s.contains("/serializers/") || stem.ends_with("_serializer") {
            FileRole::Serializer
        } else if s.contains("/concerns/") {
            FileRole::Concern
        } else if s.contains("/middleware") {
            FileRole::Middleware
        } else if s.contains("/mailers/") || stem.ends_with("_mailer") {
            FileRole::Mailer
        } else if s.contains("/components/") {
            FileRole::Component
        } else if s.contains("/stores/") || stem.ends_with("store") {
            FileRole::Store
        } else if s.contains("/routes/") || stem == "routes" || stem == "urls" {
            FileRole::Route
        } else if stem.starts_with("config") || s.contains("/config/") {
            FileRole::Config
        } else {
            FileRole::Other
        }
    }

    /// `true` for the BE-leaning roles counted by the repo signal generator's
    /// class-distribution rule.
    pub fn is_backend_leaning(&self) -> bool {
        matches!(
            self,
            FileRole::Model
                | FileRole::Controller
                | FileRole::Service
                | FileRole::Job
                | FileRole::Serializer
                | FileRole::Concern
                | FileRole::Middleware
                | FileRole::Mailer
        )
    }

    pub fn is_frontend_leaning(&self) -> bool {
        matches!(self, FileRole::Component | FileRole::Store)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntity {
    pub name: String,
    pub superclass: Option<String>,
    pub methods: Vec<String>,
    pub line_start: usize,
    pub line_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEntity {
    pub name: String,
    pub owner_class: Option<String>,
    pub is_async: bool,
    pub line_start: usize,
    pub line_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Association {
    Inherits { class: String, superclass: String },
    HasAssociation { class: String, target: String, kind: String },
    Route { method: String, path: String, handler: Option<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub repo: String,
    pub language: SupportedLanguage,
    pub file_role: FileRole,
    pub classes: Vec<ClassEntity>,
    pub functions: Vec<FunctionEntity>,
    pub associations: Vec<Association>,
    pub imports: Vec<Import>,
    /// Raw file contents, kept around so downstream passes (the graph
    /// builder's route-mention heuristic) don't need to re-read the
    /// filesystem. Not persisted in the file index snapshot.
    #[serde(skip)]
    pub source: String,
}

/// Parses a single file already known to be a supported language, reading
/// its content from disk. Returns `None` (rather than an error) when the
/// file can't be read or tree-sitter can't produce a tree — callers fold
/// that into `ParseStats`.
pub fn parse_file(path: &Path, repo: &str, stats: &mut ParseStats) -> Option<ParsedFile> {
    let language = SupportedLanguage::from_path(path)?;
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            stats.unreadable += 1;
            return None;
        }
    };

    let mut parser = Parser::new();
    if parser.set_language(&language.tree_sitter_language()).is_err() {
        stats.unparseable += 1;
        return None;
    }
    let tree = match parser.parse(&source, None) {
        Some(t) => t,
        None => {
            stats.unparseable += 1;
            return None;
        }
    };

    let mut classes = Vec::new();
    let mut functions = Vec::new();
    let mut imports = Vec::new();
    let mut associations = Vec::new();

    walk(tree.root_node(), &source, language, None, &mut classes, &mut functions, &mut imports, &mut associations);
    associations.extend(detect_routes(&source, language));

    stats.parsed += 1;
    Some(ParsedFile {
        path: path.to_path_buf(),
        repo: repo.to_string(),
        language,
        file_role: FileRole::from_path(path),
        classes,
        functions,
        associations,
        imports,
        source,
    })
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

#[allow(clippy::too_many_arguments)]
fn walk(
    node: Node,
    source: &str,
    lang: SupportedLanguage,
    current_class: Option<&str>,
    classes: &mut Vec<ClassEntity>,
    functions: &mut Vec<FunctionEntity>,
    imports: &mut Vec<Import>,
    associations: &mut Vec<Association>,
) {
    let kind = node.kind();
    let mut next_class = current_class.map(|s| s.to_string());

    match (lang, kind) {
        (_, "class_declaration") | (_, "class_definition") | (SupportedLanguage::Ruby, "class") => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                let superclass = find_superclass(node, source, lang);
                if let Some(sup) = &superclass {
                    associations.push(Association::Inherits {
                        class: name.clone(),
                        superclass: sup.clone(),
                    });
                }
                classes.push(ClassEntity {
                    name: name.clone(),
                    superclass,
                    methods: Vec::new(),
                    line_start: node.start_position().row + 1,
                    line_end: node.end_position().row + 1,
                });
                next_class = Some(name);
            }
        }
        (SupportedLanguage::Rust, "struct_item") => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                classes.push(ClassEntity {
                    name,
                    superclass: None,
                    methods: Vec::new(),
                    line_start: node.start_position().row + 1,
                    line_end: node.end_position().row + 1,
                });
            }
        }
        (_, "function_declaration")
        | (_, "function_definition")
        | (_, "method_definition")
        | (SupportedLanguage::Rust, "function_item")
        | (SupportedLanguage::Ruby, "method") => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                let is_async = node_has_async_sibling(node);
                if let Some(class) = &next_class {
                    if let Some(last) = classes.last_mut() {
                        if &last.name == class {
                            last.methods.push(name.clone());
                        }
                    }
                }
                functions.push(FunctionEntity {
                    name,
                    owner_class: next_class.clone(),
                    is_async,
                    line_start: node.start_position().row + 1,
                    line_end: node.end_position().row + 1,
                });
            }
        }
        (_, "import_statement") | (_, "import_from_statement") | (SupportedLanguage::Rust, "use_declaration") => {
            imports.push(parse_import(node, source, lang));
        }
        (SupportedLanguage::Ruby, "call") => {
            if let Some(assoc) = parse_ruby_association(node, source, current_class) {
                associations.push(assoc);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, lang, next_class.as_deref(), classes, functions, imports, associations);
    }
}

fn find_superclass(node: Node, source: &str, lang: SupportedLanguage) -> Option<String> {
    match lang {
        SupportedLanguage::Python => node
            .child_by_field_name("superclasses")
            .and_then(|n| n.named_child(0))
            .map(|n| node_text(n, source).to_string()),
        SupportedLanguage::JavaScript | SupportedLanguage::TypeScript | SupportedLanguage::Tsx => node
            .child_by_field_name("superclass")
            .map(|n| node_text(n, source).trim_start_matches("extends").trim().to_string()),
        SupportedLanguage::Ruby => {
            let text = node_text(node, source);
            text.lines().next().and_then(|line| {
                line.split('<').nth(1).map(|s| s.trim().to_string())
            })
        }
        _ => None,
    }
}

fn node_has_async_sibling(node: Node) -> bool {
    if let Some(prev) = node.prev_sibling() {
        return prev.kind() == "async";
    }
    node.child(0).map(|c| c.kind() == "async").unwrap_or(false)
}

fn parse_import(node: Node, source: &str, lang: SupportedLanguage) -> Import {
    let text = node_text(node, source);
    match lang {
        SupportedLanguage::Python => {
            let module = text
                .trim_start_matches("from")
                .trim_start_matches("import")
                .split_whitespace()
                .next()
                .unwrap_or("")
                .trim_end_matches(':')
                .to_string();
            Import { module, names: Vec::new() }
        }
        SupportedLanguage::Rust => Import { module: text.trim_start_matches("use").trim_end_matches(';').trim().to_string(), names: Vec::new() },
        _ => {
            let module = text
                .rsplit("from")
                .next()
                .unwrap_or(text)
                .trim()
                .trim_matches(|c| c == '\'' || c == '"' || c == ';')
                .to_string();
            Import { module, names: Vec::new() }
        }
    }
}

/// ORM-style `belongs_to`/`has_many`/`has_one` calls (Rails-flavoured but
/// common enough across Ruby frameworks to treat as a general association).
fn parse_ruby_association(node: Node, source: &str, current_class: Option<&str>) -> Option<Association> {
    let class = current_class?;
    let text = node_text(node, source);
    for kind in ["belongs_to", "has_many", "has_one", "has_and_belongs_to_many"] {
        if let Some(rest) = text.strip_prefix(kind) {
            let target = rest
                .trim_start_matches(['(', ' '])
                .trim_start_matches(':')
                .split([',', ')', ' '])
                .next()
                .unwrap_or("")
                .to_string();
            if !target.is_empty() {
                return Some(Association::HasAssociation {
                    class: class.to_string(),
                    target,
                    kind: kind.to_string(),
                });
            }
        }
    }
    None
}

/// Lightweight regex-based route detection, run once per file in addition
/// to the tree walk. Deep per-framework route AST extraction is out of
/// scope; this covers the common Rails/Express/Flask/FastAPI/Go net-http
/// shapes closely enough to feed `api_endpoint` edges.
fn detect_routes(source: &str, lang: SupportedLanguage) -> Vec<Association> {
    use regex::Regex;
    static RAILS: OnceLock<Regex> = OnceLock::new();
    static JS: OnceLock<Regex> = OnceLock::new();
    static PY: OnceLock<Regex> = OnceLock::new();
    static GO: OnceLock<Regex> = OnceLock::new();

    let mut out = Vec::new();
    match lang {
        SupportedLanguage::Ruby => {
            let re = RAILS.get_or_init(|| {
                Regex::new(r#"(?i)\b(get|post|put|patch|delete)\s+['"]([^'"]+)['"]"#).unwrap()
            });
            for cap in re.captures_iter(source) {
                out.push(Association::Route {
                    method: cap[1].to_uppercase(),
                    path: cap[2].to_string(),
                    handler: None,
                });
            }
        }
        SupportedLanguage::JavaScript | SupportedLanguage::TypeScript | SupportedLanguage::Tsx => {
            let re = JS.get_or_init(|| {
                Regex::new(r#"(?:app|router)\.(get|post|put|patch|delete)\(\s*['"]([^'"]+)['"]"#).unwrap()
            });
            for cap in re.captures_iter(source) {
                out.push(Association::Route {
                    method: cap[1].to_uppercase(),
                    path: cap[2].to_string(),
                    handler: None,
                });
            }
        }
        SupportedLanguage::Python => {
            let re = PY.get_or_init(|| {
                Regex::new(r#"@\w*\.(?:route|get|post|put|patch|delete)\(\s*['"]([^'"]+)['"](?:.*?methods\s*=\s*\[([^\]]*)\])?"#).unwrap()
            });
            for cap in re.captures_iter(source) {
                let methods = cap.get(2).map(|m| m.as_str()).unwrap_or("GET");
                for m in methods.split(',') {
                    let method = m.trim().trim_matches('\'').trim_matches('"');
                    let method = if method.is_empty() { "GET" } else { method };
                    out.push(Association::Route {
                        method: method.to_uppercase(),
                        path: cap[1].to_string(),
                        handler: None,
                    });
                }
            }
        }
        SupportedLanguage::Go => {
            let re = GO.get_or_init(|| {
                Regex::new(r#"HandleFunc\(\s*"([^"]+)""#).unwrap()
            });
            for cap in re.captures_iter(source) {
                out.push(Association::Route {
                    method: "ANY".to_string(),
                    path: cap[1].to_string(),
                    handler: None,
                });
            }
        }
        SupportedLanguage::Rust => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_python_class_and_function() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.py");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "class Foo(Base):\n    def bar(self):\n        pass\n").unwrap();

        let mut stats = ParseStats::default();
        let parsed = parse_file(&path, "repo", &mut stats).expect("parses");
        assert_eq!(parsed.classes.len(), 1);
        assert_eq!(parsed.classes[0].name, "Foo");
        assert_eq!(parsed.classes[0].superclass.as_deref(), Some("Base"));
        assert!(parsed.functions.iter().any(|f| f.name == "bar"));
        assert_eq!(stats.parsed, 1);
        assert_eq!(stats.unparseable, 0);
    }

    #[test]
    fn unreadable_file_is_counted_not_fatal() {
        let mut stats = ParseStats::default();
        let result = parse_file(Path::new("/nonexistent/path/x.py"), "repo", &mut stats);
        assert!(result.is_none());
        assert_eq!(stats.unreadable, 1);
    }

    #[test]
    fn detects_rails_style_route() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.rb");
        fs::write(&path, "get '/billing/:id', to: 'billing#show'\n").unwrap();
        let mut stats = ParseStats::default();
        let parsed = parse_file(&path, "repo", &mut stats).expect("parses");
        assert!(parsed
            .associations
            .iter()
            .any(|a| matches!(a, Association::Route { method, path, .. } if method == "GET" && path == "/billing/:id")));
    }

    #[test]
    fn file_role_detection() {
        assert_eq!(FileRole::from_path(Path::new("app/models/user.rb")), FileRole::Model);
        assert_eq!(FileRole::from_path(Path::new("app/controllers/users_controller.rb")), FileRole::Controller);
        assert_eq!(FileRole::from_path(Path::new("src/components/Button.tsx")), FileRole::Component);
        assert!(FileRole::Model.is_backend_leaning());
        assert!(FileRole::Component.is_frontend_leaning());
    }
}
