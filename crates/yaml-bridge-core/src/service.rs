//! Language service facade.
//!
//! The bridge never analyzes YAML itself. Everything that needs schema-aware
//! knowledge of a document goes through [`LanguageService`], which speaks the
//! LSP protocol types from `tower_lsp_server::ls_types`.

use crate::document::DocumentSnapshot;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tower_lsp_server::ls_types::{
    CompletionItem, CompletionList, Diagnostic, DocumentSymbolResponse, FormattingOptions, Hover,
    Position, TextEdit,
};

/// Associates a JSON schema with the documents it applies to.
///
/// `file_match` holds glob patterns matched against document URIs
/// (`"*"` matches every document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAssociation {
    pub uri: String,
    #[serde(default)]
    pub file_match: Vec<String>,
}

/// How prose is wrapped by the formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProseWrap {
    Always,
    Never,
    #[default]
    Preserve,
}

/// Formatter settings understood by the YAML language service.
///
/// # Defaults
///
/// - `single_quote`: `false`
/// - `bracket_spacing`: `true`
/// - `prose_wrap`: `preserve`
/// - `print_width`: `80`
/// - `enable`: `true`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatterOptions {
    #[serde(default)]
    pub single_quote: bool,
    #[serde(default = "default_true")]
    pub bracket_spacing: bool,
    #[serde(default)]
    pub prose_wrap: ProseWrap,
    #[serde(default = "default_print_width")]
    pub print_width: u32,
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            single_quote: false,
            bracket_spacing: true,
            prose_wrap: ProseWrap::Preserve,
            print_width: default_print_width(),
            enable: true,
        }
    }
}

/// Feature toggles and schema associations pushed to the language service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSettings {
    pub validate: bool,
    pub hover: bool,
    pub completion: bool,
    pub allow_comments: bool,
    pub schemas: Vec<SchemaAssociation>,
    pub custom_tags: Vec<String>,
    pub format: FormatterOptions,
}

impl Default for LanguageSettings {
    fn default() -> Self {
        Self {
            validate: true,
            hover: true,
            completion: true,
            allow_comments: false,
            schemas: Vec::new(),
            custom_tags: Vec::new(),
            format: FormatterOptions::default(),
        }
    }
}

impl LanguageSettings {
    /// Builds the `yaml` settings section in the shape `yaml-language-server`
    /// expects (schemas keyed by URI, each mapping to its glob patterns).
    ///
    /// # Examples
    ///
    /// ```
    /// use yaml_bridge_core::{LanguageSettings, SchemaAssociation};
    ///
    /// let settings = LanguageSettings {
    ///     schemas: vec![SchemaAssociation {
    ///         uri: "https://example.com/schema.json".into(),
    ///         file_match: vec!["*".into()],
    ///     }],
    ///     ..Default::default()
    /// };
    ///
    /// let section = settings.yaml_section();
    /// assert_eq!(section["schemas"]["https://example.com/schema.json"][0], "*");
    /// assert_eq!(section["validate"], true);
    /// ```
    pub fn yaml_section(&self) -> Value {
        let mut schemas = Map::new();
        for association in &self.schemas {
            let entry = schemas
                .entry(association.uri.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(patterns) = entry {
                patterns.extend(association.file_match.iter().cloned().map(Value::String));
            }
        }

        json!({
            "validate": self.validate,
            "hover": self.hover,
            "completion": self.completion,
            "allowComments": self.allow_comments,
            "customTags": self.custom_tags,
            "format": self.format,
            "schemas": schemas,
            "schemaStore": { "enable": false },
        })
    }

    /// Full settings object for `workspace/didChangeConfiguration`.
    pub fn to_settings_value(&self) -> Value {
        json!({ "yaml": self.yaml_section() })
    }
}

/// Request/response operations offered by the YAML/JSON language service.
///
/// Implementations must never panic; failures are reported as errors and
/// the callers degrade to an empty answer.
#[async_trait]
pub trait LanguageService: Send + Sync {
    /// Replaces the service configuration.
    async fn configure(&self, settings: LanguageSettings) -> Result<()>;

    async fn complete(
        &self,
        document: &DocumentSnapshot,
        position: Position,
    ) -> Result<CompletionList>;

    /// Fills in the lazily computed parts of a completion item.
    async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem>;

    async fn format(
        &self,
        document: &DocumentSnapshot,
        options: &FormattingOptions,
        formatter: &FormatterOptions,
    ) -> Result<Vec<TextEdit>>;

    async fn find_symbols(&self, document: &DocumentSnapshot) -> Result<DocumentSymbolResponse>;

    async fn hover(&self, document: &DocumentSnapshot, position: Position)
    -> Result<Option<Hover>>;

    /// Runs a full validation pass over the document.
    async fn validate(&self, document: &DocumentSnapshot) -> Result<Vec<Diagnostic>>;
}

const fn default_true() -> bool {
    true
}

const fn default_print_width() -> u32 {
    80
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Mutex;
    use tower_lsp_server::ls_types::Uri;

    #[derive(Default)]
    struct RecordingService {
        settings: Mutex<Option<LanguageSettings>>,
    }

    #[async_trait]
    impl LanguageService for RecordingService {
        async fn configure(&self, settings: LanguageSettings) -> Result<()> {
            *self.settings.lock().unwrap() = Some(settings);
            Ok(())
        }

        async fn complete(&self, _: &DocumentSnapshot, _: Position) -> Result<CompletionList> {
            Ok(CompletionList::default())
        }

        async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
            Ok(item)
        }

        async fn format(
            &self,
            _: &DocumentSnapshot,
            _: &FormattingOptions,
            _: &FormatterOptions,
        ) -> Result<Vec<TextEdit>> {
            Ok(vec![])
        }

        async fn find_symbols(&self, _: &DocumentSnapshot) -> Result<DocumentSymbolResponse> {
            Ok(DocumentSymbolResponse::Flat(vec![]))
        }

        async fn hover(&self, _: &DocumentSnapshot, _: Position) -> Result<Option<Hover>> {
            Ok(None)
        }

        async fn validate(&self, _: &DocumentSnapshot) -> Result<Vec<Diagnostic>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_language_settings_defaults() {
        let settings = LanguageSettings::default();
        assert!(settings.validate);
        assert!(settings.hover);
        assert!(settings.completion);
        assert!(!settings.allow_comments);
        assert!(settings.schemas.is_empty());
    }

    #[test]
    fn test_formatter_options_defaults() {
        let options = FormatterOptions::default();
        assert!(!options.single_quote);
        assert!(options.bracket_spacing);
        assert_eq!(options.prose_wrap, ProseWrap::Preserve);
        assert_eq!(options.print_width, 80);
        assert!(options.enable);
    }

    #[test]
    fn test_formatter_options_serialization() {
        let value = serde_json::to_value(FormatterOptions::default()).unwrap();
        assert_eq!(value["singleQuote"], false);
        assert_eq!(value["bracketSpacing"], true);
        assert_eq!(value["proseWrap"], "preserve");
        assert_eq!(value["printWidth"], 80);
    }

    #[test]
    fn test_formatter_options_partial_deserialization() {
        let options: FormatterOptions = serde_json::from_str(r#"{"singleQuote": true}"#).unwrap();
        assert!(options.single_quote);
        assert_eq!(options.print_width, 80);
        assert!(options.enable);
    }

    #[test]
    fn test_schema_association_deserialization() {
        let json = r#"{"uri": "https://example.com/s.json", "fileMatch": ["*.k8s.yaml"]}"#;
        let association: SchemaAssociation = serde_json::from_str(json).unwrap();
        assert_eq!(association.file_match, vec!["*.k8s.yaml".to_string()]);
    }

    #[test]
    fn test_yaml_section_merges_duplicate_schema_uris() {
        let settings = LanguageSettings {
            schemas: vec![
                SchemaAssociation {
                    uri: "https://example.com/s.json".into(),
                    file_match: vec!["a.yaml".into()],
                },
                SchemaAssociation {
                    uri: "https://example.com/s.json".into(),
                    file_match: vec!["b.yaml".into()],
                },
            ],
            ..Default::default()
        };

        let section = settings.yaml_section();
        let patterns = section["schemas"]["https://example.com/s.json"]
            .as_array()
            .unwrap();
        assert_eq!(patterns.len(), 2);
    }

    #[test]
    fn test_settings_value_wraps_yaml_section() {
        let value = LanguageSettings::default().to_settings_value();
        assert_eq!(value["yaml"]["hover"], true);
        assert_eq!(value["yaml"]["schemaStore"]["enable"], false);
    }

    #[test]
    fn test_trait_object_dispatch() {
        let service = RecordingService::default();
        let dyn_service: &dyn LanguageService = &service;
        let uri = Uri::from_str("inmemory://model.yaml").unwrap();
        let doc = DocumentSnapshot::new(uri, "yaml", 1, "a: 1");

        tokio_test::block_on(async {
            dyn_service
                .configure(LanguageSettings {
                    allow_comments: true,
                    ..Default::default()
                })
                .await
                .unwrap();
            assert!(dyn_service.validate(&doc).await.unwrap().is_empty());
        });

        let stored = service.settings.lock().unwrap().clone().unwrap();
        assert!(stored.allow_comments);
    }
}
