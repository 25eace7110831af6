//! Grammar registrations binding languages to the chunker

use crate::error::{OracleError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tree_sitter::{Language, Query};

/// Primary capture names recognized by the chunker, most specific first.
pub(crate) const CAPTURE_METHOD: &str = "definition.method";
pub(crate) const CAPTURE_CLASS: &str = "definition.class";
pub(crate) const CAPTURE_FUNCTION: &str = "definition.function";

/// Identifier capture names, in the order they are consulted.
pub(crate) const NAME_CAPTURES: &[&str] = &["func_name", "class_name", "method_name"];

const PYTHON_QUERY: &str = r#"
(function_definition name: (identifier) @func_name) @definition.function
(class_definition name: (identifier) @class_name) @definition.class
(class_definition
  body: (block
    (function_definition name: (identifier) @method_name) @definition.method))
(class_definition
  body: (block
    (decorated_definition
      (function_definition name: (identifier) @method_name) @definition.method)))
"#;

const JAVASCRIPT_QUERY: &str = r#"
(function_declaration name: (identifier) @func_name) @definition.function
(class_declaration name: (identifier) @class_name) @definition.class
(method_definition name: (property_identifier) @method_name) @definition.method
(lexical_declaration
  (variable_declarator
    name: (identifier) @func_name
    value: (arrow_function)) @definition.function)
(lexical_declaration
  (variable_declarator
    name: (identifier) @func_name
    value: (function_expression)) @definition.function)
"#;

const RUST_QUERY: &str = r#"
(function_item name: (identifier) @func_name) @definition.function
(struct_item name: (type_identifier) @class_name) @definition.class
(enum_item name: (type_identifier) @class_name) @definition.class
(trait_item name: (type_identifier) @class_name) @definition.class
(impl_item
  body: (declaration_list
    (function_item name: (identifier) @method_name) @definition.method))
"#;

const GO_QUERY: &str = r#"
(function_declaration name: (identifier) @func_name) @definition.function
(method_declaration name: (field_identifier) @method_name) @definition.method
(type_declaration
  (type_spec
    name: (type_identifier) @class_name
    type: (struct_type))) @definition.class
"#;

/// One registered language: grammar, file extensions, and the compiled
/// definition query evaluated by the chunker.
pub struct GrammarRegistration {
    language_name: &'static str,
    extensions: &'static [&'static str],
    language: Language,
    query: Query,
    method_idx: Option<u32>,
    class_idx: Option<u32>,
    function_idx: Option<u32>,
}

impl GrammarRegistration {
    fn new(
        language_name: &'static str,
        extensions: &'static [&'static str],
        language: Language,
        query_source: &str,
    ) -> Result<Self> {
        let query = Query::new(&language, query_source).map_err(|e| {
            OracleError::Config(format!("Bad definition query for {language_name}: {e}"))
        })?;
        let method_idx = query.capture_index_for_name(CAPTURE_METHOD);
        let class_idx = query.capture_index_for_name(CAPTURE_CLASS);
        let function_idx = query.capture_index_for_name(CAPTURE_FUNCTION);
        Ok(Self {
            language_name,
            extensions,
            language,
            query,
            method_idx,
            class_idx,
            function_idx,
        })
    }

    pub fn language_name(&self) -> &'static str {
        self.language_name
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    pub(crate) fn language(&self) -> &Language {
        &self.language
    }

    pub(crate) fn query(&self) -> &Query {
        &self.query
    }

    pub(crate) fn capture_indices(&self) -> (Option<u32>, Option<u32>, Option<u32>) {
        (self.method_idx, self.class_idx, self.function_idx)
    }
}

/// All registered grammars plus an extension lookup table.
pub struct GrammarRegistry {
    registrations: Vec<Arc<GrammarRegistration>>,
    by_extension: HashMap<&'static str, Arc<GrammarRegistration>>,
}

impl GrammarRegistry {
    /// Compile every registered grammar. Query compilation failures are
    /// configuration errors, surfaced immediately.
    pub fn with_default_grammars() -> Result<Self> {
        let registrations = vec![
            GrammarRegistration::new(
                "python",
                &["py", "pyi"],
                tree_sitter_python::LANGUAGE.into(),
                PYTHON_QUERY,
            )?,
            GrammarRegistration::new(
                "javascript",
                &["js", "jsx", "mjs", "cjs"],
                tree_sitter_javascript::LANGUAGE.into(),
                JAVASCRIPT_QUERY,
            )?,
            GrammarRegistration::new(
                "typescript",
                &["ts", "mts", "cts"],
                tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                JAVASCRIPT_QUERY,
            )?,
            // JSX needs the dedicated grammar; the query set is shared.
            GrammarRegistration::new(
                "tsx",
                &["tsx"],
                tree_sitter_typescript::LANGUAGE_TSX.into(),
                JAVASCRIPT_QUERY,
            )?,
            GrammarRegistration::new(
                "rust",
                &["rs"],
                tree_sitter_rust::LANGUAGE.into(),
                RUST_QUERY,
            )?,
            GrammarRegistration::new("go", &["go"], tree_sitter_go::LANGUAGE.into(), GO_QUERY)?,
        ];

        let registrations: Vec<Arc<GrammarRegistration>> =
            registrations.into_iter().map(Arc::new).collect();

        let mut by_extension = HashMap::new();
        for registration in &registrations {
            for ext in registration.extensions() {
                by_extension.insert(*ext, Arc::clone(registration));
            }
        }

        Ok(Self {
            registrations,
            by_extension,
        })
    }

    /// Look up the registration for a file extension.
    pub fn for_extension(&self, ext: &str) -> Option<Arc<GrammarRegistration>> {
        self.by_extension.get(ext).cloned()
    }

    /// Look up the registration handling a path, by its extension.
    pub fn for_path(&self, path: &std::path::Path) -> Option<Arc<GrammarRegistration>> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.for_extension(ext))
    }

    pub fn registrations(&self) -> &[Arc<GrammarRegistration>] {
        &self.registrations
    }
}
