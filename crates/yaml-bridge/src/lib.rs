//! Editor bindings that route YAML editing features to a language service.
//!
//! [`register_yaml_support`] wires an [`Editor`](editor::Editor) to any
//! [`LanguageService`](yaml_bridge_core::LanguageService): completion,
//! formatting, document symbols and hover are answered on request, and every
//! content change schedules a debounced validation whose diagnostics replace
//! the model's markers. [`ExternalLanguageService`](external::ExternalLanguageService)
//! provides the service by driving `yaml-language-server` over stdio.

pub mod config;
pub mod convert;
pub mod document;
pub mod editor;
pub mod external;
pub mod providers;
pub mod scheduler;

#[cfg(test)]
mod test_utils;

pub use config::BridgeConfig;
pub use editor::{Editor, EditorHost};
pub use external::ExternalLanguageService;
pub use providers::{LANGUAGE_ID, YamlProviders, YamlSupport, register_yaml_support};
pub use scheduler::ValidationScheduler;
