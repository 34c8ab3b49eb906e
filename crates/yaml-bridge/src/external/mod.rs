//! Language service backed by an external YAML language server process.

mod client;
pub mod transport;

pub use client::ExternalLanguageService;
