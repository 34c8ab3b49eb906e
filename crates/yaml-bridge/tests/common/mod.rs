//! Common test utilities for integration tests.
//!
//! Provides a scripted in-process language service so the editor bindings
//! can be exercised without launching a YAML language server.

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower_lsp_server::ls_types::{
    CompletionItem, CompletionItemKind, CompletionList, Diagnostic, DiagnosticSeverity,
    DocumentSymbolResponse, FormattingOptions, Hover, Position, Range, TextEdit, Uri,
};
use yaml_bridge_core::{DocumentSnapshot, FormatterOptions, LanguageService, LanguageSettings, Result};

/// Top-level keys of a Kubernetes object, offered as completions.
const KUBERNETES_KEYS: &[&str] = &["apiVersion", "kind", "metadata", "spec", "status"];

/// Language service that flags every line containing `error` and offers
/// Kubernetes top-level keys as completions.
#[derive(Default)]
pub(crate) struct ScriptedService {
    validations: AtomicUsize,
    validated_versions: Mutex<Vec<i32>>,
}

#[allow(dead_code)] // Not every test binary uses every accessor
impl ScriptedService {
    pub(crate) fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub(crate) fn validated_versions(&self) -> Vec<i32> {
        self.validated_versions.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageService for ScriptedService {
    async fn configure(&self, _settings: LanguageSettings) -> Result<()> {
        Ok(())
    }

    async fn complete(
        &self,
        _document: &DocumentSnapshot,
        _position: Position,
    ) -> Result<CompletionList> {
        let items = KUBERNETES_KEYS
            .iter()
            .map(|key| CompletionItem {
                label: (*key).to_string(),
                kind: Some(CompletionItemKind::PROPERTY),
                insert_text: Some(format!("{key}: ")),
                ..Default::default()
            })
            .collect();
        Ok(CompletionList {
            is_incomplete: false,
            items,
        })
    }

    async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        Ok(item)
    }

    async fn format(
        &self,
        _document: &DocumentSnapshot,
        _options: &FormattingOptions,
        _formatter: &FormatterOptions,
    ) -> Result<Vec<TextEdit>> {
        Ok(Vec::new())
    }

    async fn find_symbols(&self, _document: &DocumentSnapshot) -> Result<DocumentSymbolResponse> {
        Ok(DocumentSymbolResponse::Nested(Vec::new()))
    }

    async fn hover(
        &self,
        _document: &DocumentSnapshot,
        _position: Position,
    ) -> Result<Option<Hover>> {
        Ok(None)
    }

    async fn validate(&self, document: &DocumentSnapshot) -> Result<Vec<Diagnostic>> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.validated_versions
            .lock()
            .unwrap()
            .push(document.version());

        let diagnostics = document
            .text()
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains("error"))
            .map(|(n, line)| Diagnostic {
                range: Range::new(
                    Position::new(n as u32, 0),
                    Position::new(n as u32, line.len() as u32),
                ),
                severity: Some(DiagnosticSeverity::ERROR),
                message: "invalid value".to_string(),
                ..Default::default()
            })
            .collect();
        Ok(diagnostics)
    }
}

pub(crate) fn model_uri() -> Uri {
    Uri::from_str("inmemory://model.yaml").unwrap()
}
