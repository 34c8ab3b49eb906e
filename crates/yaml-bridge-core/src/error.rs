use thiserror::Error;

/// Core error types for yaml-bridge.
///
/// Every fallible operation in the bridge (schema fetching, talking to the
/// external language service, editor model lookups) reports one of these
/// variants. Source errors are tracked via `thiserror`.
///
/// # Examples
///
/// ```
/// use yaml_bridge_core::error::{BridgeError, Result};
///
/// fn require_model(found: bool, uri: &str) -> Result<()> {
///     if !found {
///         return Err(BridgeError::ModelNotFound(uri.into()));
///     }
///     Ok(())
/// }
///
/// assert!(require_model(false, "inmemory://model.yaml").is_err());
/// ```
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("schema request failed for {url}: {source}")]
    SchemaRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("schema request for {url} rejected: {status}")]
    SchemaStatus { url: String, status: String },

    #[error("schema at {url} is not valid UTF-8")]
    InvalidSchema { url: String },

    #[error("unsupported schema URL: {0}")]
    UnsupportedSchemaUrl(String),

    #[error("language service error: {0}")]
    LanguageService(String),

    #[error("language service exited")]
    ServiceExited,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no model registered for {0}")]
    ModelNotFound(String),

    #[error("invalid URI: {0}")]
    InvalidUri(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for `Result<T, BridgeError>`.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_status_display() {
        let error = BridgeError::SchemaStatus {
            url: "https://example.com/schema.json".into(),
            status: "404 Not Found".into(),
        };
        assert_eq!(
            error.to_string(),
            "schema request for https://example.com/schema.json rejected: 404 Not Found"
        );
    }

    #[test]
    fn test_language_service_display() {
        let error = BridgeError::LanguageService("boom".into());
        assert_eq!(error.to_string(), "language service error: boom");
    }

    #[test]
    fn test_model_not_found() {
        let error = BridgeError::ModelNotFound("inmemory://model.yaml".into());
        assert_eq!(
            error.to_string(),
            "no model registered for inmemory://model.yaml"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let error: BridgeError = io_err.into();
        assert!(error.to_string().contains("I/O error"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: BridgeError = json_err.into();
        assert!(error.to_string().starts_with("JSON error"));
    }
}
