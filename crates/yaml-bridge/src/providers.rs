//! YAML feature providers and their registration with the editor.
//!
//! Every provider follows the same path: snapshot the model, convert the
//! editor position, ask the language service, convert the answer back.
//! Service failures are logged and degrade to an empty answer.

use crate::config::BridgeConfig;
use crate::convert::{
    as_completion_item, as_completion_list, as_formatting_options, as_hover, as_position,
    as_protocol_completion_item, as_symbols, as_text_edits, word_range_at,
};
use crate::document::create_document;
use crate::editor::{
    CompletionItemProvider, DocumentFormattingEditProvider, DocumentSymbolProvider, Editor,
    EditorCompletionItem, EditorCompletionList, EditorFormattingOptions, EditorHover,
    EditorHost, EditorPosition, EditorRange, EditorSymbol, EditorTextEdit, HoverProvider,
    LanguageRegistration, TextModel,
};
use crate::scheduler::ValidationScheduler;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use yaml_bridge_core::{FormatterOptions, LanguageService};

pub const LANGUAGE_ID: &str = "yaml";

const ORIGIN: EditorRange = EditorRange::new(1, 1, 1, 1);

/// The YAML language contribution.
pub fn yaml_language() -> LanguageRegistration {
    LanguageRegistration {
        id: LANGUAGE_ID.to_string(),
        extensions: vec![".yaml".to_string(), ".yml".to_string()],
        aliases: vec!["YAML".to_string(), "yaml".to_string()],
        mimetypes: vec!["application/yaml".to_string()],
    }
}

/// Completion, formatting, symbol and hover providers backed by a
/// [`LanguageService`].
pub struct YamlProviders {
    service: Arc<dyn LanguageService>,
    completion: bool,
    hover: bool,
    formatter: FormatterOptions,
}

impl YamlProviders {
    pub fn new(service: Arc<dyn LanguageService>, config: &BridgeConfig) -> Self {
        Self {
            service,
            completion: config.completion,
            hover: config.hover,
            formatter: config.format.clone(),
        }
    }
}

#[async_trait]
impl CompletionItemProvider for YamlProviders {
    async fn provide_completion_items(
        &self,
        model: &TextModel,
        position: EditorPosition,
    ) -> Option<EditorCompletionList> {
        if !self.completion {
            return Some(EditorCompletionList::default());
        }

        let document = create_document(model);
        let line = document
            .line(position.line_number.saturating_sub(1) as usize)
            .unwrap_or_default();
        let default_range = word_range_at(line, position);

        match self.service.complete(&document, as_position(position)).await {
            Ok(list) => {
                tracing::debug!(
                    "{} completion items for {:?}",
                    list.items.len(),
                    model.uri
                );
                Some(as_completion_list(list, default_range))
            }
            Err(e) => {
                tracing::warn!("completion failed for {:?}: {}", model.uri, e);
                None
            }
        }
    }

    async fn resolve_completion_item(&self, item: EditorCompletionItem) -> EditorCompletionItem {
        let range = item.range;
        match self
            .service
            .resolve(as_protocol_completion_item(item.clone()))
            .await
        {
            Ok(resolved) => {
                let has_edit = resolved.text_edit.is_some();
                let mut resolved = as_completion_item(resolved, range.unwrap_or(ORIGIN));
                if !has_edit {
                    resolved.range = range;
                }
                resolved
            }
            Err(e) => {
                tracing::warn!("failed to resolve completion item '{}': {}", item.label, e);
                item
            }
        }
    }
}

#[async_trait]
impl DocumentFormattingEditProvider for YamlProviders {
    async fn provide_document_formatting_edits(
        &self,
        model: &TextModel,
        options: &EditorFormattingOptions,
    ) -> Vec<EditorTextEdit> {
        let document = create_document(model);
        match self
            .service
            .format(&document, &as_formatting_options(options), &self.formatter)
            .await
        {
            Ok(edits) => as_text_edits(edits),
            Err(e) => {
                tracing::warn!("formatting failed for {:?}: {}", model.uri, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DocumentSymbolProvider for YamlProviders {
    async fn provide_document_symbols(&self, model: &TextModel) -> Vec<EditorSymbol> {
        let document = create_document(model);
        match self.service.find_symbols(&document).await {
            Ok(symbols) => as_symbols(symbols),
            Err(e) => {
                tracing::warn!("symbol lookup failed for {:?}: {}", model.uri, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl HoverProvider for YamlProviders {
    async fn provide_hover(
        &self,
        model: &TextModel,
        position: EditorPosition,
    ) -> Option<EditorHover> {
        if !self.hover {
            return None;
        }

        let document = create_document(model);
        match self.service.hover(&document, as_position(position)).await {
            Ok(hover) => hover.map(as_hover),
            Err(e) => {
                tracing::warn!("hover failed for {:?}: {}", model.uri, e);
                None
            }
        }
    }
}

/// Handle returned by [`register_yaml_support`].
///
/// Dropping it stops forwarding content changes and cancels every pending
/// validation.
pub struct YamlSupport {
    scheduler: ValidationScheduler<Arc<Editor>>,
    listener: JoinHandle<()>,
}

impl YamlSupport {
    pub fn scheduler(&self) -> &ValidationScheduler<Arc<Editor>> {
        &self.scheduler
    }
}

impl Drop for YamlSupport {
    fn drop(&mut self) {
        self.listener.abort();
        self.scheduler.cancel_all();
    }
}

/// Wires YAML support into `editor`.
///
/// Registers the YAML language and the providers, then spawns a task that
/// schedules a debounced validation for every content change of a YAML
/// model. The service is not configured here; call
/// [`LanguageService::configure`] with [`BridgeConfig::to_language_settings`]
/// first.
///
/// Must be called from within a Tokio runtime.
pub fn register_yaml_support(
    editor: &Arc<Editor>,
    service: Arc<dyn LanguageService>,
    config: &BridgeConfig,
) -> YamlSupport {
    editor.register_language(yaml_language());

    let providers = Arc::new(YamlProviders::new(Arc::clone(&service), config));
    editor.register_completion_item_provider(LANGUAGE_ID, providers.clone());
    editor.register_document_formatting_edit_provider(LANGUAGE_ID, providers.clone());
    editor.register_document_symbol_provider(LANGUAGE_ID, providers.clone());
    editor.register_hover_provider(LANGUAGE_ID, providers);

    let scheduler =
        ValidationScheduler::new(Arc::clone(editor), service, config.validation.debounce());

    let mut changes = editor.on_did_change_content();
    let listener_editor = Arc::clone(editor);
    let listener_scheduler = scheduler.clone();
    let listener = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(event) => {
                    let is_yaml = listener_editor
                        .get_model(&event.uri)
                        .is_some_and(|model| model.language_id == LANGUAGE_ID);
                    if is_yaml {
                        listener_scheduler.schedule(&event.uri);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("content change listener lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tracing::info!(
        "YAML support registered (debounce {}ms)",
        config.validation.debounce_ms
    );

    YamlSupport {
        scheduler,
        listener,
    }
}
