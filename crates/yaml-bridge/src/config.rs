use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tower_lsp_server::ls_types::Uri;
use yaml_bridge_core::{
    FormatterOptions, LanguageSettings, Result, SchemaAssociation, file_uri, resolve_relative_path,
};

/// Schema applied to every document unless the configuration says otherwise.
pub const DEFAULT_SCHEMA_URL: &str = "https://raw.githubusercontent.com/garethr/kubernetes-json-schema/master/v1.14.0-standalone-strict/all.json";

/// Root configuration for yaml-bridge.
///
/// Read from a JSON file passed with `--config`. Keys are camelCase, like the
/// language server's own settings. All fields use sensible defaults if not
/// specified.
///
/// # Examples
///
/// ```
/// use yaml_bridge::config::BridgeConfig;
///
/// let json = r#"{
///     "hover": false,
///     "schemas": [
///         { "uri": "https://example.com/schema.json", "fileMatch": ["*.k8s.yaml"] }
///     ],
///     "validation": { "debounceMs": 250 }
/// }"#;
///
/// let config: BridgeConfig = serde_json::from_str(json).unwrap();
/// assert!(!config.hover);
/// assert!(config.completion);
/// assert_eq!(config.schemas.len(), 1);
/// assert_eq!(config.validation.debounce_ms, 250);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default = "default_true")]
    pub hover: bool,
    #[serde(default = "default_true")]
    pub completion: bool,
    #[serde(default)]
    pub allow_comments: bool,
    #[serde(default)]
    pub custom_tags: Vec<String>,
    #[serde(default = "default_schemas")]
    pub schemas: Vec<SchemaAssociation>,
    #[serde(default)]
    pub format: FormatterOptions,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            validate: true,
            hover: true,
            completion: true,
            allow_comments: false,
            custom_tags: Vec::new(),
            schemas: default_schemas(),
            format: FormatterOptions::default(),
            validation: ValidationConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// Relative schema URIs are resolved against the file's location.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.resolve_schema_paths(&file_uri(path)?)?;
        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Rewrites schema URIs without a scheme relative to `base`.
    pub fn resolve_schema_paths(&mut self, base: &Uri) -> Result<()> {
        for schema in &mut self.schemas {
            if Uri::from_str(&schema.uri).is_ok() {
                continue;
            }
            let resolved = resolve_relative_path(&schema.uri, base.as_str())?;
            tracing::debug!("schema {} resolved to {}", schema.uri, resolved);
            schema.uri = resolved;
        }
        Ok(())
    }

    /// Settings pushed to the language service.
    pub fn to_language_settings(&self) -> LanguageSettings {
        LanguageSettings {
            validate: self.validate,
            hover: self.hover,
            completion: self.completion,
            allow_comments: self.allow_comments,
            schemas: self.schemas.clone(),
            custom_tags: self.custom_tags.clone(),
            format: self.format.clone(),
        }
    }
}

/// Configuration for debounced validation.
///
/// # Defaults
///
/// - `debounceMs`: `100`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Quiet period after the last edit before validating (default: 100).
    /// Maximum: 10000 (clamped with warning if exceeded)
    #[serde(
        default = "default_debounce_ms",
        deserialize_with = "deserialize_debounce_ms"
    )]
    pub debounce_ms: u64,
}

impl ValidationConfig {
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// How to launch the external YAML language server.
///
/// # Defaults
///
/// - `command`: `"yaml-language-server"`
/// - `args`: `["--stdio"]`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_server_command")]
    pub command: String,
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            args: default_server_args(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_schemas() -> Vec<SchemaAssociation> {
    vec![SchemaAssociation {
        uri: DEFAULT_SCHEMA_URL.to_string(),
        file_match: vec!["*".to_string()],
    }]
}

const fn default_debounce_ms() -> u64 {
    100
}

fn default_server_command() -> String {
    "yaml-language-server".to_string()
}

fn default_server_args() -> Vec<String> {
    vec!["--stdio".to_string()]
}

const MAX_DEBOUNCE_MS: u64 = 10_000;

fn deserialize_debounce_ms<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let debounce_ms = u64::deserialize(deserializer)?;
    if debounce_ms > MAX_DEBOUNCE_MS {
        tracing::warn!(
            "debounceMs exceeded max of {}, clamping from {}",
            MAX_DEBOUNCE_MS,
            debounce_ms
        );
        return Ok(MAX_DEBOUNCE_MS);
    }
    Ok(debounce_ms)
}
