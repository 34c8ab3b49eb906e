//! Document adapter: turns live editor buffers into immutable snapshots.

use crate::editor::{EditorHost, TextModel};
use tower_lsp_server::ls_types::Uri;
use yaml_bridge_core::DocumentSnapshot;

/// Snapshots a model as it is right now.
pub fn create_document(model: &TextModel) -> DocumentSnapshot {
    DocumentSnapshot::new(
        model.uri.clone(),
        model.language_id.clone(),
        model.version_id,
        model.value.clone(),
    )
}

/// Reads the buffer registered under `uri` and snapshots it.
///
/// Returns `None` when the editor has no such model (e.g. it was disposed).
pub fn snapshot<H: EditorHost + ?Sized>(host: &H, uri: &Uri) -> Option<DocumentSnapshot> {
    host.get_model(uri).map(|model| create_document(&model))
}
