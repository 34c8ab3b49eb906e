//! Editor host contract and the in-memory editor.
//!
//! Editor-side values use the conventions of browser code editors:
//! 1-based line numbers and columns, columns counted in UTF-16 code units,
//! markers owned by a named producer. Conversion to and from the protocol
//! types lives in [`crate::convert`].

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_lsp_server::ls_types::Uri;
use yaml_bridge_core::{BridgeError, Result};

/// Marker owner used for validation results.
pub const DEFAULT_MARKER_OWNER: &str = "default";

/// Capacity of the content-change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Cursor position in the editor (1-based line number and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorPosition {
    pub line_number: u32,
    pub column: u32,
}

impl EditorPosition {
    pub const fn new(line_number: u32, column: u32) -> Self {
        Self {
            line_number,
            column,
        }
    }
}

/// Range in the editor (1-based, end exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorRange {
    pub start_line_number: u32,
    pub start_column: u32,
    pub end_line_number: u32,
    pub end_column: u32,
}

impl EditorRange {
    pub const fn new(
        start_line_number: u32,
        start_column: u32,
        end_line_number: u32,
        end_column: u32,
    ) -> Self {
        Self {
            start_line_number,
            start_column,
            end_line_number,
            end_column,
        }
    }

    pub fn start(&self) -> EditorPosition {
        EditorPosition::new(self.start_line_number, self.start_column)
    }

    pub fn end(&self) -> EditorPosition {
        EditorPosition::new(self.end_line_number, self.end_column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerSeverity {
    Hint,
    Info,
    Warning,
    Error,
}

/// A diagnostic annotation shown in the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marker {
    pub severity: MarkerSeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub range: EditorRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditorCompletionKind {
    Method,
    Function,
    Constructor,
    Field,
    Variable,
    Class,
    Struct,
    Interface,
    Module,
    Property,
    Event,
    Operator,
    Unit,
    Value,
    Constant,
    Enum,
    EnumMember,
    Keyword,
    Text,
    Color,
    File,
    Reference,
    Folder,
    TypeParameter,
    Snippet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EditorDocumentation {
    Plain(String),
    Markdown(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorCompletionItem {
    pub label: String,
    pub kind: EditorCompletionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<EditorDocumentation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_text: Option<String>,
    pub insert_text: String,
    /// `insert_text` uses snippet syntax (`$1`, `${2:default}`).
    #[serde(default)]
    pub insert_as_snippet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<EditorRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_text_edits: Vec<EditorTextEdit>,
    #[serde(default)]
    pub preselect: bool,
    /// Opaque payload the language service needs to resolve the item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorCompletionList {
    pub suggestions: Vec<EditorCompletionItem>,
    #[serde(default)]
    pub incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorTextEdit {
    pub range: EditorRange,
    pub text: String,
}

/// Symbol kind numbered the way browser editors number it (0 = file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditorSymbolKind(pub u8);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSymbol {
    pub name: String,
    pub detail: String,
    pub kind: EditorSymbolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub range: EditorRange,
    pub selection_range: EditorRange,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EditorSymbol>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorHover {
    /// Markdown fragments, rendered in order.
    pub contents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<EditorRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorFormattingOptions {
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for EditorFormattingOptions {
    fn default() -> Self {
        Self {
            tab_size: 2,
            insert_spaces: true,
        }
    }
}

/// Language contributed to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageRegistration {
    pub id: String,
    pub extensions: Vec<String>,
    pub aliases: Vec<String>,
    pub mimetypes: Vec<String>,
}

/// Current state of a live buffer.
///
/// Reading a model never blocks writers: edits replace the stored state,
/// and the text is shared with any snapshot taken from it.
#[derive(Debug, Clone)]
pub struct TextModel {
    pub uri: Uri,
    pub language_id: String,
    pub version_id: i32,
    pub value: Arc<str>,
}

/// Emitted after every content change of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChanged {
    pub uri: Uri,
    pub version_id: i32,
}

/// What the bindings need from the editor that hosts them.
pub trait EditorHost: Send + Sync + 'static {
    /// Reads the buffer registered under `uri`.
    fn get_model(&self, uri: &Uri) -> Option<TextModel>;

    /// Replaces the full marker set `owner` holds for the buffer.
    fn set_model_markers(&self, uri: &Uri, owner: &str, markers: Vec<Marker>);
}

impl<H: EditorHost> EditorHost for Arc<H> {
    fn get_model(&self, uri: &Uri) -> Option<TextModel> {
        (**self).get_model(uri)
    }

    fn set_model_markers(&self, uri: &Uri, owner: &str, markers: Vec<Marker>) {
        (**self).set_model_markers(uri, owner, markers);
    }
}

#[async_trait]
pub trait CompletionItemProvider: Send + Sync {
    async fn provide_completion_items(
        &self,
        model: &TextModel,
        position: EditorPosition,
    ) -> Option<EditorCompletionList>;

    async fn resolve_completion_item(&self, item: EditorCompletionItem) -> EditorCompletionItem {
        item
    }
}

#[async_trait]
pub trait DocumentFormattingEditProvider: Send + Sync {
    async fn provide_document_formatting_edits(
        &self,
        model: &TextModel,
        options: &EditorFormattingOptions,
    ) -> Vec<EditorTextEdit>;
}

#[async_trait]
pub trait DocumentSymbolProvider: Send + Sync {
    async fn provide_document_symbols(&self, model: &TextModel) -> Vec<EditorSymbol>;
}

#[async_trait]
pub trait HoverProvider: Send + Sync {
    async fn provide_hover(&self, model: &TextModel, position: EditorPosition)
    -> Option<EditorHover>;
}

/// In-memory editor host.
///
/// Holds text models, per-owner marker sets, language registrations and
/// feature providers keyed by language id. Content changes are broadcast to
/// every receiver obtained from [`Editor::on_did_change_content`].
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use tower_lsp_server::ls_types::Uri;
/// use yaml_bridge::editor::{Editor, EditorHost};
///
/// let editor = Editor::new();
/// let uri = Uri::from_str("inmemory://model.yaml").unwrap();
/// editor.create_model(uri.clone(), "yaml", "apiVersion: v1");
///
/// let version = editor.set_value(&uri, "apiVersion: v2").unwrap();
/// assert_eq!(version, 2);
/// assert_eq!(&*editor.get_model(&uri).unwrap().value, "apiVersion: v2");
/// ```
pub struct Editor {
    models: DashMap<Uri, TextModel>,
    markers: DashMap<Uri, HashMap<String, Vec<Marker>>>,
    languages: DashMap<String, LanguageRegistration>,
    completion_providers: DashMap<String, Arc<dyn CompletionItemProvider>>,
    formatting_providers: DashMap<String, Arc<dyn DocumentFormattingEditProvider>>,
    symbol_providers: DashMap<String, Arc<dyn DocumentSymbolProvider>>,
    hover_providers: DashMap<String, Arc<dyn HoverProvider>>,
    changes: broadcast::Sender<ContentChanged>,
}

impl Editor {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            models: DashMap::new(),
            markers: DashMap::new(),
            languages: DashMap::new(),
            completion_providers: DashMap::new(),
            formatting_providers: DashMap::new(),
            symbol_providers: DashMap::new(),
            hover_providers: DashMap::new(),
            changes,
        }
    }

    pub fn register_language(&self, registration: LanguageRegistration) {
        tracing::debug!("registering language {}", registration.id);
        self.languages.insert(registration.id.clone(), registration);
    }

    pub fn is_language_registered(&self, language_id: &str) -> bool {
        self.languages.contains_key(language_id)
    }

    /// Finds the registered language whose extensions match `path`.
    pub fn language_for_path(&self, path: &Path) -> Option<String> {
        let extension = path.extension()?.to_str()?;
        self.languages
            .iter()
            .find(|entry| {
                entry
                    .extensions
                    .iter()
                    .any(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case(extension))
            })
            .map(|entry| entry.id.clone())
    }

    /// Creates (or replaces) a model. Creation does not emit a change event.
    pub fn create_model(
        &self,
        uri: Uri,
        language_id: impl Into<String>,
        value: impl Into<Arc<str>>,
    ) -> TextModel {
        let model = TextModel {
            uri: uri.clone(),
            language_id: language_id.into(),
            version_id: 1,
            value: value.into(),
        };
        self.models.insert(uri, model.clone());
        model
    }

    /// Replaces the full content of a model and returns its new version id.
    pub fn set_value(&self, uri: &Uri, value: impl Into<Arc<str>>) -> Result<i32> {
        let value = value.into();
        self.update_model(uri, move |_| Ok(value))
    }

    /// Applies a batch of edits as a single content change.
    ///
    /// Positions are clamped to the document; overlapping edits are rejected.
    pub fn apply_edits(&self, uri: &Uri, edits: &[EditorTextEdit]) -> Result<i32> {
        self.update_model(uri, |text| apply_text_edits(text, edits).map(Arc::from))
    }

    fn update_model(
        &self,
        uri: &Uri,
        change: impl FnOnce(&str) -> Result<Arc<str>>,
    ) -> Result<i32> {
        let version_id = {
            let mut model = self
                .models
                .get_mut(uri)
                .ok_or_else(|| BridgeError::ModelNotFound(uri.as_str().to_string()))?;
            model.value = change(&model.value)?;
            model.version_id += 1;
            model.version_id
        };

        // No receivers is fine: nothing is listening for changes yet.
        let _ = self.changes.send(ContentChanged {
            uri: uri.clone(),
            version_id,
        });

        Ok(version_id)
    }

    /// Removes a model together with its markers.
    pub fn dispose_model(&self, uri: &Uri) -> bool {
        self.markers.remove(uri);
        self.models.remove(uri).is_some()
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn get_model_markers(&self, uri: &Uri, owner: &str) -> Vec<Marker> {
        self.markers
            .get(uri)
            .and_then(|owners| owners.get(owner).cloned())
            .unwrap_or_default()
    }

    pub fn on_did_change_content(&self) -> broadcast::Receiver<ContentChanged> {
        self.changes.subscribe()
    }

    pub fn register_completion_item_provider(
        &self,
        language_id: &str,
        provider: Arc<dyn CompletionItemProvider>,
    ) {
        self.completion_providers
            .insert(language_id.to_string(), provider);
    }

    pub fn register_document_formatting_edit_provider(
        &self,
        language_id: &str,
        provider: Arc<dyn DocumentFormattingEditProvider>,
    ) {
        self.formatting_providers
            .insert(language_id.to_string(), provider);
    }

    pub fn register_document_symbol_provider(
        &self,
        language_id: &str,
        provider: Arc<dyn DocumentSymbolProvider>,
    ) {
        self.symbol_providers
            .insert(language_id.to_string(), provider);
    }

    pub fn register_hover_provider(&self, language_id: &str, provider: Arc<dyn HoverProvider>) {
        self.hover_providers
            .insert(language_id.to_string(), provider);
    }

    pub async fn provide_completion_items(
        &self,
        uri: &Uri,
        position: EditorPosition,
    ) -> Option<EditorCompletionList> {
        let model = self.get_model(uri)?;
        let provider = lookup(&self.completion_providers, &model.language_id)?;
        provider.provide_completion_items(&model, position).await
    }

    pub async fn resolve_completion_item(
        &self,
        uri: &Uri,
        item: EditorCompletionItem,
    ) -> Option<EditorCompletionItem> {
        let model = self.get_model(uri)?;
        let provider = lookup(&self.completion_providers, &model.language_id)?;
        Some(provider.resolve_completion_item(item).await)
    }

    pub async fn provide_document_formatting_edits(
        &self,
        uri: &Uri,
        options: &EditorFormattingOptions,
    ) -> Option<Vec<EditorTextEdit>> {
        let model = self.get_model(uri)?;
        let provider = lookup(&self.formatting_providers, &model.language_id)?;
        Some(
            provider
                .provide_document_formatting_edits(&model, options)
                .await,
        )
    }

    pub async fn provide_document_symbols(&self, uri: &Uri) -> Option<Vec<EditorSymbol>> {
        let model = self.get_model(uri)?;
        let provider = lookup(&self.symbol_providers, &model.language_id)?;
        Some(provider.provide_document_symbols(&model).await)
    }

    pub async fn provide_hover(&self, uri: &Uri, position: EditorPosition) -> Option<EditorHover> {
        let model = self.get_model(uri)?;
        let provider = lookup(&self.hover_providers, &model.language_id)?;
        provider.provide_hover(&model, position).await
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorHost for Editor {
    fn get_model(&self, uri: &Uri) -> Option<TextModel> {
        self.models.get(uri).map(|model| model.clone())
    }

    fn set_model_markers(&self, uri: &Uri, owner: &str, markers: Vec<Marker>) {
        tracing::debug!("setting {} markers for {:?}", markers.len(), uri);
        self.markers
            .entry(uri.clone())
            .or_default()
            .insert(owner.to_string(), markers);
    }
}

/// Clones the provider out so no map guard is held across an `.await`.
fn lookup<P: ?Sized>(providers: &DashMap<String, Arc<P>>, language_id: &str) -> Option<Arc<P>> {
    let provider = providers.get(language_id).map(|p| Arc::clone(p.value()));
    if provider.is_none() {
        tracing::debug!("no provider registered for language {}", language_id);
    }
    provider
}

/// Byte offset of an editor position, clamped to the document.
fn offset_at(text: &str, position: EditorPosition) -> usize {
    let target_line = position.line_number.saturating_sub(1) as usize;
    let mut line_start = 0;

    for _ in 0..target_line {
        match text[line_start..].find('\n') {
            Some(idx) => line_start += idx + 1,
            None => return text.len(),
        }
    }

    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |idx| line_start + idx);
    let line = text[line_start..line_end]
        .strip_suffix('\r')
        .unwrap_or(&text[line_start..line_end]);

    let target_units = position.column.saturating_sub(1);
    let mut units = 0u32;
    for (byte_idx, ch) in line.char_indices() {
        if units >= target_units {
            return line_start + byte_idx;
        }
        units += ch.len_utf16() as u32;
    }
    line_start + line.len()
}

fn apply_text_edits(text: &str, edits: &[EditorTextEdit]) -> Result<String> {
    let mut spans: Vec<(usize, usize, &str)> = edits
        .iter()
        .map(|edit| {
            let start = offset_at(text, edit.range.start());
            let end = offset_at(text, edit.range.end()).max(start);
            (start, end, edit.text.as_str())
        })
        .collect();

    // Apply back to front so earlier offsets stay valid.
    spans.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

    if spans.windows(2).any(|pair| pair[1].1 > pair[0].0) {
        return Err(BridgeError::Protocol("overlapping text edits".into()));
    }

    let mut result = text.to_string();
    for (start, end, replacement) in spans {
        result.replace_range(start..end, replacement);
    }
    Ok(result)
}
