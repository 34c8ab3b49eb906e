use super::transport::{
    self, INTERNAL_ERROR, INVALID_PARAMS, Incoming, METHOD_NOT_FOUND, failure, success,
};
use crate::config::ServerConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tower_lsp_server::ls_types::{
    CompletionItem, CompletionList, CompletionParams, CompletionResponse, Diagnostic,
    DidChangeTextDocumentParams, DidOpenTextDocumentParams, DocumentFormattingParams,
    DocumentSymbolParams, DocumentSymbolResponse, FormattingOptions, Hover, HoverParams, Position,
    PublishDiagnosticsParams, TextDocumentContentChangeEvent, TextDocumentPositionParams,
    TextEdit, Uri, VersionedTextDocumentIdentifier,
};
use yaml_bridge_core::{
    BridgeError, DocumentSnapshot, FormatterOptions, LanguageService, LanguageSettings, Result,
    SchemaRequestService,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct DiagnosticsWaiter {
    min_version: i32,
    sender: oneshot::Sender<Vec<Diagnostic>>,
}

/// State shared between the service and its reader task.
struct Connection {
    writer: Mutex<Writer>,
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Result<Value>>>,
    waiters: DashMap<Uri, Vec<DiagnosticsWaiter>>,
    /// Last published diagnostics per document, stamped with the version
    /// they belong to.
    published: DashMap<Uri, (i32, Vec<Diagnostic>)>,
    synced: DashMap<Uri, i32>,
    /// Versions sent to the server that have not been published yet, in
    /// sync order. Unversioned publishes are matched against the front.
    unpublished: DashMap<Uri, VecDeque<i32>>,
    settings: RwLock<LanguageSettings>,
    schemas: Arc<dyn SchemaRequestService>,
    exited: AtomicBool,
}

impl Connection {
    fn new(writer: Writer, schemas: Arc<dyn SchemaRequestService>) -> Self {
        Self {
            writer: Mutex::new(writer),
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            waiters: DashMap::new(),
            published: DashMap::new(),
            synced: DashMap::new(),
            unpublished: DashMap::new(),
            settings: RwLock::new(LanguageSettings::default()),
            schemas,
            exited: AtomicBool::new(false),
        }
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    async fn send(&self, message: Value) -> Result<()> {
        if self.has_exited() {
            return Err(BridgeError::ServiceExited);
        }
        let mut writer = self.writer.lock().await;
        transport::write_message(&mut *writer, &message).await
    }

    async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(id, sender);

        // Checked after registering so `fail_all` cannot miss this request.
        if self.has_exited() {
            self.pending.remove(&id);
            return Err(BridgeError::ServiceExited);
        }

        tracing::debug!("-> {} (id {})", method, id);
        if let Err(e) = self.send(transport::request(id, method, params)).await {
            self.pending.remove(&id);
            return Err(e);
        }

        let value = receiver.await.map_err(|_| BridgeError::ServiceExited)??;
        Ok(serde_json::from_value(value)?)
    }

    async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        tracing::debug!("-> {}", method);
        let params = serde_json::to_value(params)?;
        self.send(transport::notification(method, params)).await
    }

    fn settings(&self) -> LanguageSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_settings(&self, settings: LanguageSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    fn add_waiter(&self, uri: Uri, min_version: i32) -> Result<oneshot::Receiver<Vec<Diagnostic>>> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.entry(uri.clone()).or_default().push(DiagnosticsWaiter {
            min_version,
            sender,
        });

        if self.has_exited() {
            self.waiters.remove(&uri);
            return Err(BridgeError::ServiceExited);
        }
        Ok(receiver)
    }

    fn cached_diagnostics(&self, uri: &Uri, version: i32) -> Option<Vec<Diagnostic>> {
        self.published
            .get(uri)
            .filter(|entry| entry.0 >= version)
            .map(|entry| entry.1.clone())
    }

    fn dispatch(self: &Arc<Self>, message: Value) {
        let incoming = match Incoming::parse(message) {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!("ignoring message from language server: {}", e);
                return;
            }
        };

        match incoming {
            Incoming::Response { id, result } => match self.pending.remove(&id) {
                Some((_, sender)) => {
                    let _ = sender.send(result.map_err(BridgeError::from));
                }
                None => tracing::warn!("response for unknown request id {}", id),
            },
            Incoming::Request { id, method, params } => {
                // Answered off the reader task: schema requests may hit the network.
                let connection = Arc::clone(self);
                tokio::spawn(async move {
                    let reply = connection.answer(id, &method, params).await;
                    if let Err(e) = connection.send(reply).await {
                        tracing::warn!("failed to answer {}: {}", method, e);
                    }
                });
            }
            Incoming::Notification { method, params } => self.handle_notification(&method, params),
        }
    }

    async fn answer(&self, id: Value, method: &str, params: Value) -> Value {
        tracing::debug!("<- request {}", method);
        match method {
            "workspace/configuration" => success(id, self.configuration(&params)),
            "custom/schema/request" => {
                let url = match &params {
                    Value::String(url) => Some(url.clone()),
                    Value::Array(args) => args.first().and_then(Value::as_str).map(str::to_string),
                    _ => None,
                };
                let Some(url) = url else {
                    return failure(id, INVALID_PARAMS, "expected a schema URL");
                };
                match self.schemas.request_schema(&url).await {
                    Ok(body) => success(id, Value::String(body)),
                    Err(e) => {
                        tracing::warn!("schema request for {} failed: {}", url, e);
                        failure(id, INTERNAL_ERROR, &e.to_string())
                    }
                }
            }
            "client/registerCapability"
            | "client/unregisterCapability"
            | "window/workDoneProgress/create" => success(id, Value::Null),
            _ => failure(id, METHOD_NOT_FOUND, &format!("unhandled method {method}")),
        }
    }

    /// Answers `workspace/configuration` item by item.
    fn configuration(&self, params: &Value) -> Value {
        let settings = self.settings();
        let yaml = settings.yaml_section();

        let items = params
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        items
            .iter()
            .map(|item| match item.get("section").and_then(Value::as_str) {
                None => settings.to_settings_value(),
                Some("yaml") => yaml.clone(),
                Some(section) => section
                    .strip_prefix("yaml.")
                    .and_then(|key| yaml.get(key).cloned())
                    .unwrap_or_else(|| json!({})),
            })
            .collect()
    }

    fn handle_notification(&self, method: &str, params: Value) {
        match method {
            "textDocument/publishDiagnostics" => {
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(published) => self.publish(published),
                    Err(e) => tracing::warn!("malformed publishDiagnostics: {}", e),
                }
            }
            "window/logMessage" | "window/showMessage" => {
                let message = params
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                match params.get("type").and_then(Value::as_u64) {
                    Some(1) => tracing::error!(target: "yaml_language_server", "{}", message),
                    Some(2) => tracing::warn!(target: "yaml_language_server", "{}", message),
                    Some(3) => tracing::info!(target: "yaml_language_server", "{}", message),
                    _ => tracing::debug!(target: "yaml_language_server", "{}", message),
                }
            }
            _ => tracing::trace!("<- notification {}", method),
        }
    }

    fn publish(&self, published: PublishDiagnosticsParams) {
        let PublishDiagnosticsParams {
            uri,
            diagnostics,
            version,
        } = published;

        let stamp = self.match_publish(&uri, version);
        tracing::debug!(
            "<- {} diagnostics for {:?} (v{})",
            diagnostics.len(),
            uri,
            stamp
        );

        if let Some(mut waiters) = self.waiters.get_mut(&uri) {
            let (ready, waiting): (Vec<_>, Vec<_>) = waiters
                .drain(..)
                .filter(|waiter| !waiter.sender.is_closed())
                .partition(|waiter| waiter.min_version <= stamp);
            *waiters = waiting;
            for waiter in ready {
                let _ = waiter.sender.send(diagnostics.clone());
            }
        }

        let mut entry = self.published.entry(uri).or_insert((stamp, Vec::new()));
        if entry.0 <= stamp {
            *entry = (stamp, diagnostics);
        }
    }

    /// Records that `version` of `uri` was sent and awaits a publish.
    fn mark_sent(&self, uri: &Uri, version: i32) {
        self.unpublished
            .entry(uri.clone())
            .or_default()
            .push_back(version);
    }

    /// Picks the document version a publish belongs to.
    ///
    /// A versioned publish settles every sync up to its version. An
    /// unversioned one answers the oldest sync still waiting, because the
    /// server validates changes in the order it receives them. With nothing
    /// outstanding it is a republish of the latest synced text.
    fn match_publish(&self, uri: &Uri, version: Option<i32>) -> i32 {
        let mut queue = self.unpublished.entry(uri.clone()).or_default();
        if let Some(version) = version {
            while queue.front().is_some_and(|sent| *sent <= version) {
                queue.pop_front();
            }
            return version;
        }

        let oldest = queue.pop_front();
        drop(queue);
        oldest.unwrap_or_else(|| self.synced.get(uri).map(|v| *v).unwrap_or(0))
    }

    fn fail_all(&self) {
        self.exited.store(true, Ordering::SeqCst);
        // Dropping the senders wakes every receiver with an error.
        self.pending.clear();
        self.waiters.clear();
    }
}

async fn read_loop<R>(connection: Arc<Connection>, mut reader: R)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match transport::read_message(&mut reader).await {
            Ok(Some(message)) => connection.dispatch(message),
            Ok(None) => {
                tracing::info!("language server closed its output");
                break;
            }
            Err(BridgeError::Json(e)) => {
                tracing::error!("malformed message from language server: {}", e);
            }
            Err(e) => {
                tracing::error!("language server transport failed: {}", e);
                break;
            }
        }
    }
    connection.fail_all();
}

async fn forward_stderr<R: AsyncRead + Unpin>(stderr: R) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "yaml_language_server", "{}", line);
    }
}

/// [`LanguageService`] backed by an external YAML language server speaking
/// LSP over stdio (`yaml-language-server --stdio` by default).
///
/// Documents are synced lazily: the first request for a URI opens it, later
/// requests send the full text when the snapshot version has advanced.
pub struct ExternalLanguageService {
    connection: Arc<Connection>,
    sync_lock: Mutex<()>,
    reader: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl ExternalLanguageService {
    /// Launches the configured server and performs the initialize handshake.
    pub async fn spawn(
        config: &ServerConfig,
        schemas: Arc<dyn SchemaRequestService>,
    ) -> Result<Self> {
        tracing::info!("starting {} {}", config.command, config.args.join(" "));

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Protocol("language server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Protocol("language server stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let service = Self::connect(BufReader::new(stdout), stdin, schemas).await?;
        *service.child.lock().await = Some(child);
        Ok(service)
    }

    /// Runs the client over an already established stream pair.
    pub async fn connect<R, W>(
        reader: R,
        writer: W,
        schemas: Arc<dyn SchemaRequestService>,
    ) -> Result<Self>
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let connection = Arc::new(Connection::new(Box::new(writer), schemas));
        let reader = tokio::spawn(read_loop(Arc::clone(&connection), reader));

        let service = Self {
            connection,
            sync_lock: Mutex::new(()),
            reader,
            child: Mutex::new(None),
        };
        service.initialize().await?;
        Ok(service)
    }

    async fn initialize(&self) -> Result<()> {
        let params = json!({
            "processId": std::process::id(),
            "clientInfo": { "name": "yaml-bridge", "version": env!("CARGO_PKG_VERSION") },
            "rootUri": null,
            "capabilities": {
                "workspace": {
                    "configuration": true,
                    "didChangeConfiguration": { "dynamicRegistration": true }
                },
                "textDocument": {
                    "synchronization": { "dynamicRegistration": false },
                    "completion": {
                        "completionItem": {
                            "snippetSupport": true,
                            "documentationFormat": ["markdown", "plaintext"]
                        }
                    },
                    "hover": { "contentFormat": ["markdown", "plaintext"] },
                    "documentSymbol": { "hierarchicalDocumentSymbolSupport": true },
                    "formatting": { "dynamicRegistration": true },
                    "publishDiagnostics": { "versionSupport": true }
                }
            },
            "initializationOptions": {}
        });

        let result: Value = self.connection.request("initialize", params).await?;
        tracing::info!(
            "connected to {} {}",
            result["serverInfo"]["name"].as_str().unwrap_or("language server"),
            result["serverInfo"]["version"].as_str().unwrap_or_default()
        );

        self.connection.notify("initialized", json!({})).await
    }

    /// Sends `shutdown` / `exit` and waits for the child to terminate.
    pub async fn shutdown(&self) -> Result<()> {
        let _: Value = self.connection.request("shutdown", Value::Null).await?;
        self.connection.notify("exit", Value::Null).await?;

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(status) => tracing::debug!("language server exited with {}", status?),
                Err(_) => {
                    tracing::warn!("language server did not exit, killing it");
                    child.kill().await?;
                }
            }
        }
        Ok(())
    }

    /// Brings the server's copy of the document up to date.
    ///
    /// Returns `false` when the server already has this version.
    async fn sync(&self, document: &DocumentSnapshot) -> Result<bool> {
        let _guard = self.sync_lock.lock().await;
        let synced = self.connection.synced.get(document.uri()).map(|v| *v);

        match synced {
            None => {
                self.connection.mark_sent(document.uri(), document.version());
                self.connection
                    .notify(
                        "textDocument/didOpen",
                        DidOpenTextDocumentParams {
                            text_document: document.to_item(),
                        },
                    )
                    .await?;
            }
            Some(version) if document.version() > version => self.send_change(document).await?,
            Some(_) => return Ok(false),
        }

        self.connection
            .synced
            .insert(document.uri().clone(), document.version());
        Ok(true)
    }

    async fn send_change(&self, document: &DocumentSnapshot) -> Result<()> {
        // Marked before sending so the publish cannot outrun the record.
        self.connection.mark_sent(document.uri(), document.version());
        self.connection
            .notify(
                "textDocument/didChange",
                DidChangeTextDocumentParams {
                    text_document: VersionedTextDocumentIdentifier::new(
                        document.uri().clone(),
                        document.version(),
                    ),
                    content_changes: vec![TextDocumentContentChangeEvent {
                        range: None,
                        range_length: None,
                        text: document.text().to_string(),
                    }],
                },
            )
            .await
    }

    async fn push_settings(&self, settings: LanguageSettings) -> Result<()> {
        let value = settings.to_settings_value();
        self.connection.set_settings(settings);
        self.connection
            .notify(
                "workspace/didChangeConfiguration",
                json!({ "settings": value }),
            )
            .await
    }

    fn position_params(document: &DocumentSnapshot, position: Position) -> TextDocumentPositionParams {
        TextDocumentPositionParams::new(document.identifier(), position)
    }
}

impl Drop for ExternalLanguageService {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl LanguageService for ExternalLanguageService {
    async fn configure(&self, settings: LanguageSettings) -> Result<()> {
        tracing::debug!("configuring language server ({} schemas)", settings.schemas.len());
        self.push_settings(settings).await
    }

    async fn complete(
        &self,
        document: &DocumentSnapshot,
        position: Position,
    ) -> Result<CompletionList> {
        self.sync(document).await?;
        let response: Option<CompletionResponse> = self
            .connection
            .request(
                "textDocument/completion",
                CompletionParams {
                    text_document_position: Self::position_params(document, position),
                    work_done_progress_params: Default::default(),
                    partial_result_params: Default::default(),
                    context: None,
                },
            )
            .await?;

        Ok(match response {
            Some(CompletionResponse::Array(items)) => CompletionList {
                is_incomplete: false,
                items,
            },
            Some(CompletionResponse::List(list)) => list,
            None => CompletionList::default(),
        })
    }

    async fn resolve(&self, item: CompletionItem) -> Result<CompletionItem> {
        self.connection.request("completionItem/resolve", item).await
    }

    async fn format(
        &self,
        document: &DocumentSnapshot,
        options: &FormattingOptions,
        formatter: &FormatterOptions,
    ) -> Result<Vec<TextEdit>> {
        // The server reads formatter options from its settings, not the request.
        let settings = self.connection.settings();
        if settings.format != *formatter {
            self.push_settings(LanguageSettings {
                format: formatter.clone(),
                ..settings
            })
            .await?;
        }

        self.sync(document).await?;
        let edits: Option<Vec<TextEdit>> = self
            .connection
            .request(
                "textDocument/formatting",
                DocumentFormattingParams {
                    text_document: document.identifier(),
                    options: options.clone(),
                    work_done_progress_params: Default::default(),
                },
            )
            .await?;
        Ok(edits.unwrap_or_default())
    }

    async fn find_symbols(&self, document: &DocumentSnapshot) -> Result<DocumentSymbolResponse> {
        self.sync(document).await?;
        let symbols: Option<DocumentSymbolResponse> = self
            .connection
            .request(
                "textDocument/documentSymbol",
                DocumentSymbolParams {
                    text_document: document.identifier(),
                    work_done_progress_params: Default::default(),
                    partial_result_params: Default::default(),
                },
            )
            .await?;
        Ok(symbols.unwrap_or(DocumentSymbolResponse::Flat(Vec::new())))
    }

    async fn hover(
        &self,
        document: &DocumentSnapshot,
        position: Position,
    ) -> Result<Option<Hover>> {
        self.sync(document).await?;
        self.connection
            .request(
                "textDocument/hover",
                HoverParams {
                    text_document_position_params: Self::position_params(document, position),
                    work_done_progress_params: Default::default(),
                },
            )
            .await
    }

    async fn validate(&self, document: &DocumentSnapshot) -> Result<Vec<Diagnostic>> {
        // Registered before syncing so a fast publish cannot be missed.
        let receiver = self
            .connection
            .add_waiter(document.uri().clone(), document.version())?;

        if !self.sync(document).await? {
            if let Some(diagnostics) = self
                .connection
                .cached_diagnostics(document.uri(), document.version())
            {
                return Ok(diagnostics);
            }
            // Nothing new to publish for this version; ask for a fresh pass.
            self.send_change(document).await?;
        }

        receiver.await.map_err(|_| BridgeError::ServiceExited)
    }
}
