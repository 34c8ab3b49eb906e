//! Test utilities: an in-process language service with call recording.

#[cfg(test)]
pub(crate) mod test_helpers {
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tower_lsp_server::ls_types::{
        CompletionItem, CompletionItemKind, CompletionList, Diagnostic, DiagnosticSeverity,
        DocumentSymbol, DocumentSymbolResponse, FormattingOptions, Hover, HoverContents,
        MarkupContent, MarkupKind, Position, Range, SymbolKind, TextEdit,
    };
    use yaml_bridge_core::{
        BridgeError, DocumentSnapshot, FormatterOptions, LanguageService, LanguageSettings, Result,
    };

    /// Language service stub that records what it was asked.
    ///
    /// Every request succeeds unless `fail_validation` (validation only) or
    /// `fail_all` was switched on.
    #[derive(Default)]
    pub struct StubLanguageService {
        validated: Mutex<Vec<String>>,
        diagnostics: Mutex<Vec<Diagnostic>>,
        settings: Mutex<Option<LanguageSettings>>,
        formatter: Mutex<Option<FormatterOptions>>,
        fail_validation: AtomicBool,
        fail_all: AtomicBool,
        latency: Mutex<Option<Duration>>,
    }

    impl StubLanguageService {
        pub fn validate_calls(&self) -> usize {
            self.validated.lock().unwrap().len()
        }

        pub fn validated_texts(&self) -> Vec<String> {
            self.validated.lock().unwrap().clone()
        }

        pub fn set_diagnostics(&self, diagnostics: Vec<Diagnostic>) {
            *self.diagnostics.lock().unwrap() = diagnostics;
        }

        pub fn fail_validation(&self, fail: bool) {
            self.fail_validation.store(fail, Ordering::SeqCst);
        }

        /// Makes every validation take `latency` before answering.
        pub fn set_latency(&self, latency: Duration) {
            *self.latency.lock().unwrap() = Some(latency);
        }

        pub fn fail_all(&self, fail: bool) {
            self.fail_all.store(fail, Ordering::SeqCst);
        }

        pub fn settings(&self) -> Option<LanguageSettings> {
            self.settings.lock().unwrap().clone()
        }

        pub fn last_formatter(&self) -> Option<FormatterOptions> {
            self.formatter.lock().unwrap().clone()
        }

        fn check(&self) -> Result<()> {
            if self.fail_all.load(Ordering::SeqCst) {
                return Err(BridgeError::LanguageService("stub failure".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LanguageService for StubLanguageService {
        async fn configure(&self, settings: LanguageSettings) -> Result<()> {
            self.check()?;
            *self.settings.lock().unwrap() = Some(settings);
            Ok(())
        }

        async fn complete(
            &self,
            _document: &DocumentSnapshot,
            _position: Position,
        ) -> Result<CompletionList> {
            self.check()?;
            let items = ["apiVersion", "kind", "metadata"]
                .into_iter()
                .map(|label| CompletionItem {
                    label: label.to_string(),
                    kind: Some(CompletionItemKind::PROPERTY),
                    insert_text: Some(format!("{label}: ")),
                    ..Default::default()
                })
                .collect();
            Ok(CompletionList {
                is_incomplete: false,
                items,
            })
        }

        async fn resolve(&self, mut item: CompletionItem) -> Result<CompletionItem> {
            self.check()?;
            item.detail = Some(format!("resolved {}", item.label));
            Ok(item)
        }

        async fn format(
            &self,
            document: &DocumentSnapshot,
            _options: &FormattingOptions,
            formatter: &FormatterOptions,
        ) -> Result<Vec<TextEdit>> {
            self.check()?;
            *self.formatter.lock().unwrap() = Some(formatter.clone());
            let last = document.line_count().saturating_sub(1) as u32;
            let end = document.line(last as usize).map_or(0, |l| l.len() as u32);
            Ok(vec![TextEdit {
                range: Range::new(Position::new(0, 0), Position::new(last, end)),
                new_text: document.text().trim().to_string() + "\n",
            }])
        }

        #[allow(deprecated)]
        async fn find_symbols(&self, document: &DocumentSnapshot) -> Result<DocumentSymbolResponse> {
            self.check()?;
            let symbols = (0..document.line_count())
                .filter_map(|n| {
                    let line = document.line(n)?;
                    let key = line.split(':').next()?.trim();
                    if key.is_empty() || line.starts_with(' ') {
                        return None;
                    }
                    let range = Range::new(
                        Position::new(n as u32, 0),
                        Position::new(n as u32, line.len() as u32),
                    );
                    Some(DocumentSymbol {
                        name: key.to_string(),
                        detail: None,
                        kind: SymbolKind::PROPERTY,
                        tags: None,
                        deprecated: None,
                        range,
                        selection_range: range,
                        children: None,
                    })
                })
                .collect();
            Ok(DocumentSymbolResponse::Nested(symbols))
        }

        async fn hover(
            &self,
            _document: &DocumentSnapshot,
            position: Position,
        ) -> Result<Option<Hover>> {
            self.check()?;
            Ok(Some(Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: format!("line {}", position.line),
                }),
                range: None,
            }))
        }

        async fn validate(&self, document: &DocumentSnapshot) -> Result<Vec<Diagnostic>> {
            self.check()?;
            self.validated
                .lock()
                .unwrap()
                .push(document.text().to_string());
            let latency = *self.latency.lock().unwrap();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if self.fail_validation.load(Ordering::SeqCst) {
                return Err(BridgeError::LanguageService("validation crashed".into()));
            }
            Ok(self.diagnostics.lock().unwrap().clone())
        }
    }

    pub fn error_diagnostic(message: &str) -> Diagnostic {
        Diagnostic {
            range: Range::new(Position::new(0, 0), Position::new(0, 1)),
            severity: Some(DiagnosticSeverity::ERROR),
            message: message.to_string(),
            ..Default::default()
        }
    }
}
