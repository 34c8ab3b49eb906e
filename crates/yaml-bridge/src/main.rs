use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tower_lsp_server::ls_types::Uri;
use tracing_subscriber::EnvFilter;
use yaml_bridge::editor::{
    DEFAULT_MARKER_OWNER, Editor, EditorFormattingOptions, EditorHost, EditorPosition,
    MarkerSeverity,
};
use yaml_bridge::{BridgeConfig, ExternalLanguageService, LANGUAGE_ID, register_yaml_support};
use yaml_bridge_core::{HttpSchemaFetcher, LanguageService, file_uri};

#[derive(Parser)]
#[command(name = "yaml-bridge")]
#[command(version)]
#[command(about = "Schema-aware YAML checks, completion, hover and formatting", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a file and print its markers
    Check {
        file: PathBuf,
    },

    /// Print completion suggestions at a position
    Complete {
        file: PathBuf,

        /// Line number (1-based)
        #[arg(long)]
        line: u32,

        /// Column (1-based, UTF-16 code units)
        #[arg(long)]
        column: u32,
    },

    /// Print hover information at a position
    Hover {
        file: PathBuf,

        /// Line number (1-based)
        #[arg(long)]
        line: u32,

        /// Column (1-based, UTF-16 code units)
        #[arg(long)]
        column: u32,
    },

    /// Format a file
    Format {
        file: PathBuf,

        /// Write the result back instead of printing it
        #[arg(short, long)]
        write: bool,

        /// Spaces per indentation level
        #[arg(long, default_value_t = 2)]
        tab_size: u32,
    },

    /// Print the document outline
    Symbols {
        file: PathBuf,
    },
}

impl Commands {
    fn file(&self) -> &Path {
        match self {
            Self::Check { file }
            | Self::Complete { file, .. }
            | Self::Hover { file, .. }
            | Self::Format { file, .. }
            | Self::Symbols { file } => file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    let service = ExternalLanguageService::spawn(&config.server, Arc::new(HttpSchemaFetcher::new()))
        .await
        .with_context(|| format!("failed to start '{}'", config.server.command))?;
    let service = Arc::new(service);
    service.configure(config.to_language_settings()).await?;

    let editor = Arc::new(Editor::new());
    let support = register_yaml_support(&editor, service.clone(), &config);

    let path = cli.command.file().to_path_buf();
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let uri = file_uri(&path)?;
    let language = editor
        .language_for_path(&path)
        .unwrap_or_else(|| LANGUAGE_ID.to_string());
    editor.create_model(uri.clone(), language, text);

    let mut exit = ExitCode::SUCCESS;
    match cli.command {
        Commands::Check { .. } => {
            support
                .scheduler()
                .validate_now(&uri)
                .await
                .with_context(|| format!("failed to validate {}", path.display()))?;
            let markers = editor.get_model_markers(&uri, DEFAULT_MARKER_OWNER);
            if markers
                .iter()
                .any(|marker| marker.severity == MarkerSeverity::Error)
            {
                exit = ExitCode::FAILURE;
            }
            print_json(&markers)?;
        }
        Commands::Complete { line, column, .. } => {
            let list = editor
                .provide_completion_items(&uri, EditorPosition::new(line, column))
                .await;
            print_json(&list)?;
        }
        Commands::Hover { line, column, .. } => {
            let hover = editor
                .provide_hover(&uri, EditorPosition::new(line, column))
                .await;
            print_json(&hover)?;
        }
        Commands::Format {
            write, tab_size, ..
        } => {
            let options = EditorFormattingOptions {
                tab_size,
                ..Default::default()
            };
            let formatted = format_model(&editor, &uri, &options).await?;
            if write {
                tokio::fs::write(&path, formatted.as_bytes())
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
            } else {
                print!("{formatted}");
            }
        }
        Commands::Symbols { .. } => {
            let symbols = editor.provide_document_symbols(&uri).await;
            print_json(&symbols)?;
        }
    }

    drop(support);
    if let Err(e) = service.shutdown().await {
        tracing::warn!("language server shutdown failed: {}", e);
    }

    Ok(exit)
}

async fn format_model(
    editor: &Editor,
    uri: &Uri,
    options: &EditorFormattingOptions,
) -> Result<String> {
    let edits = editor
        .provide_document_formatting_edits(uri, options)
        .await
        .unwrap_or_default();
    editor.apply_edits(uri, &edits)?;

    let model = editor
        .get_model(uri)
        .context("model disappeared while formatting")?;
    Ok(model.value.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
