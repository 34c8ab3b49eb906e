//! Immutable document snapshots handed to the language service.

use crate::error::{BridgeError, Result};
use reqwest::Url;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tower_lsp_server::ls_types::{TextDocumentIdentifier, TextDocumentItem, Uri};

/// Builds a `file://` URI for a path on disk, relative to the current
/// directory if needed.
pub fn file_uri(path: &Path) -> Result<Uri> {
    let absolute = std::path::absolute(path)?;
    let url = Url::from_file_path(&absolute)
        .map_err(|()| BridgeError::InvalidUri(absolute.display().to_string()))?;
    Uri::from_str(url.as_str()).map_err(|e| BridgeError::InvalidUri(format!("{url}: {e}")))
}

/// Immutable capture of a buffer at a point in time.
///
/// A fresh snapshot is taken for every request and dropped afterwards; it is
/// never updated in place. The text is shared with the buffer state it was
/// taken from, so snapshotting does not copy the document.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use tower_lsp_server::ls_types::Uri;
/// use yaml_bridge_core::DocumentSnapshot;
///
/// let uri = Uri::from_str("inmemory://model.yaml").unwrap();
/// let doc = DocumentSnapshot::new(uri, "yaml", 1, "apiVersion: v1");
///
/// assert_eq!(doc.version(), 1);
/// assert!(!doc.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    uri: Uri,
    language_id: String,
    version: i32,
    text: Arc<str>,
}

impl DocumentSnapshot {
    pub fn new(
        uri: Uri,
        language_id: impl Into<String>,
        version: i32,
        text: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version,
            text: text.into(),
        }
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns `true` when the document has no content at all.
    ///
    /// Empty documents are never sent to the language service for validation.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of lines, counting a trailing empty line after a final newline.
    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Text of a single line without its line terminator.
    pub fn line(&self, line: usize) -> Option<&str> {
        self.text
            .split('\n')
            .nth(line)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    pub fn identifier(&self) -> TextDocumentIdentifier {
        TextDocumentIdentifier {
            uri: self.uri.clone(),
        }
    }

    /// Protocol representation used for `textDocument/didOpen`.
    pub fn to_item(&self) -> TextDocumentItem {
        TextDocumentItem {
            uri: self.uri.clone(),
            language_id: self.language_id.clone(),
            version: self.version,
            text: self.text.to_string(),
        }
    }
}
