//! Core abstractions for yaml-bridge.
//!
//! This crate holds the pieces shared between the editor bindings and the
//! language service implementations:
//!
//! - **Snapshots**: [`DocumentSnapshot`], the immutable view of a buffer that
//!   every language service request operates on
//! - **Facade**: the [`LanguageService`] trait and its configuration types
//! - **Schemas**: [`SchemaRequestService`] and the caching HTTP fetcher
//! - **Errors**: [`BridgeError`] and the crate-wide [`Result`] alias
//!
//! Protocol values (positions, completion items, diagnostics) are the LSP
//! types re-exported by `tower_lsp_server::ls_types`.

pub mod document;
pub mod error;
pub mod schema;
pub mod service;

pub use document::{DocumentSnapshot, file_uri};
pub use error::{BridgeError, Result};
pub use schema::{HttpSchemaFetcher, SchemaRequestService, resolve_relative_path};
pub use service::{FormatterOptions, LanguageService, LanguageSettings, ProseWrap, SchemaAssociation};
