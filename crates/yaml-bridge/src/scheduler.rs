//! Debounced validation.
//!
//! Each content change calls [`ValidationScheduler::schedule`]. A pending
//! validation for the same document is aborted and replaced, so a burst of
//! edits collapses into a single validation once the buffer has been quiet
//! for the debounce delay. The deferred task re-reads the buffer when it
//! fires; it never validates the text that was current at schedule time.

use crate::convert::as_markers;
use crate::document;
use crate::editor::{DEFAULT_MARKER_OWNER, EditorHost};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_lsp_server::ls_types::Uri;
use yaml_bridge_core::{BridgeError, LanguageService, Result};

struct PendingValidation {
    generation: u64,
    handle: JoinHandle<()>,
}

struct SchedulerInner<H> {
    host: H,
    service: Arc<dyn LanguageService>,
    delay: Duration,
    owner: String,
    pending: Mutex<HashMap<Uri, PendingValidation>>,
    next_generation: AtomicU64,
}

/// Debounces validation requests per document.
///
/// Invariant: at most one pending validation per URI. A validation that has
/// already started is never cancelled; when two overlap, the one that
/// finishes last replaces the markers.
///
/// `schedule` spawns onto the current Tokio runtime and must be called from
/// within one.
pub struct ValidationScheduler<H: EditorHost> {
    inner: Arc<SchedulerInner<H>>,
}

impl<H: EditorHost> Clone for ValidationScheduler<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: EditorHost> ValidationScheduler<H> {
    pub fn new(host: H, service: Arc<dyn LanguageService>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                host,
                service,
                delay,
                owner: DEFAULT_MARKER_OWNER.to_string(),
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Schedules a validation of `uri` after the debounce delay.
    ///
    /// Any not-yet-fired validation for the same document is cancelled first.
    /// An empty buffer skips the delay entirely: markers are cleared right
    /// away and no timer is created.
    pub fn schedule(&self, uri: &Uri) {
        let Some(snapshot) = document::snapshot(&self.inner.host, uri) else {
            tracing::debug!("no model for {:?}, skipping validation", uri);
            return;
        };

        if snapshot.is_empty() {
            self.cancel(uri);
            self.inner.clear_markers(uri);
            return;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let task_uri = uri.clone();

        // Spawn under the lock so the task cannot look for its entry before
        // it has been inserted.
        let mut pending = lock(&self.inner.pending);

        if let Some(previous) = pending.remove(uri) {
            tracing::trace!("superseding pending validation for {:?}", uri);
            previous.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;

            if !inner.take_pending(&task_uri, generation) {
                return;
            }

            match inner.validate(&task_uri).await {
                Ok(()) => {}
                Err(BridgeError::ModelNotFound(_)) => {
                    tracing::debug!("model {:?} disposed before validation", task_uri);
                }
                // Markers stay as they were for this cycle.
                Err(e) => tracing::warn!("validation failed for {:?}: {}", task_uri, e),
            }
        });

        pending.insert(uri.clone(), PendingValidation { generation, handle });
    }

    /// Cancels the pending validation for `uri`.
    ///
    /// Returns `false` if nothing was pending.
    pub fn cancel(&self, uri: &Uri) -> bool {
        match lock(&self.inner.pending).remove(uri) {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let mut pending = lock(&self.inner.pending);
        for (_, previous) in pending.drain() {
            previous.handle.abort();
        }
    }

    /// Cancels any pending validation and validates `uri` immediately.
    ///
    /// Unlike the debounced path, a failed validation is returned to the
    /// caller. Markers are left untouched in that case.
    pub async fn validate_now(&self, uri: &Uri) -> Result<()> {
        self.cancel(uri);
        self.inner.validate(uri).await
    }

    pub fn is_pending(&self, uri: &Uri) -> bool {
        lock(&self.inner.pending).contains_key(uri)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }
}

impl<H: EditorHost> SchedulerInner<H> {
    /// Removes the pending entry if it still belongs to `generation`.
    ///
    /// A superseded task finds a newer generation (or nothing) and must not
    /// validate.
    fn take_pending(&self, uri: &Uri, generation: u64) -> bool {
        let mut pending = lock(&self.pending);
        match pending.get(uri) {
            Some(entry) if entry.generation == generation => {
                pending.remove(uri);
                true
            }
            _ => false,
        }
    }

    async fn validate(&self, uri: &Uri) -> Result<()> {
        // Fresh snapshot: the buffer may have changed since scheduling.
        let snapshot = document::snapshot(&self.host, uri)
            .ok_or_else(|| BridgeError::ModelNotFound(uri.as_str().to_string()))?;

        if snapshot.is_empty() {
            self.clear_markers(uri);
            return Ok(());
        }

        let diagnostics = self.service.validate(&snapshot).await?;

        // The buffer may have moved on while the service was working.
        let Some(current) = self.host.get_model(uri) else {
            tracing::debug!("model {:?} disposed during validation", uri);
            return Ok(());
        };
        if current.value.is_empty() {
            self.clear_markers(uri);
            return Ok(());
        }
        if current.version_id > snapshot.version() {
            // The change that produced the newer version schedules its own pass.
            tracing::debug!(
                "discarding diagnostics for {:?} v{}: buffer is at v{}",
                uri,
                snapshot.version(),
                current.version_id
            );
            return Ok(());
        }

        tracing::debug!(
            "validated {:?} v{}: {} diagnostics",
            uri,
            snapshot.version(),
            diagnostics.len()
        );
        self.host
            .set_model_markers(uri, &self.owner, as_markers(diagnostics));
        Ok(())
    }

    fn clear_markers(&self, uri: &Uri) {
        self.host.set_model_markers(uri, &self.owner, Vec::new());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
