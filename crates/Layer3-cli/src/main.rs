//! Quill CLI - Main entry point

mod commands;

use clap::{Parser, Subcommand};
use quill_core::{DirectoryHost, PluginHost, PluginRuntime};
use quill_foundation::RuntimeConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Quill - plugin runtime for the note/todo app
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Plugin directory (defaults to the user data directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Program used to open plugin folders (e.g. xdg-open)
    #[arg(long, global = true)]
    open_with: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available, installed and development plugins
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show details and permissions of a plugin
    Info { id: String },
    /// Install a plugin
    Install {
        id: String,
        /// Accept the requested permissions without asking
        #[arg(short, long)]
        yes: bool,
    },
    /// Uninstall a plugin
    Uninstall { id: String },
    /// Enable an installed plugin
    Enable { id: String },
    /// Disable an installed plugin
    Disable { id: String },
    /// List invocable commands
    Commands {
        /// Only commands shown on this surface (toolbar, palette, ...)
        #[arg(long)]
        surface: Option<String>,
    },
    /// Execute a plugin command
    Exec {
        plugin: String,
        command: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
    },
    /// Print a plugin document as it would be loaded into a sandbox window
    Render { plugin: String, url: String },
    /// Open a plugin folder, or the plugin directory when no id is given
    Folder { id: Option<String> },
    /// Print the effective runtime configuration
    Config {
        /// Write it to the project config (.quill/runtime.json)
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = RuntimeConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load runtime config: {}", e);
        RuntimeConfig::default()
    });

    let root = args.root.clone().unwrap_or_else(default_root);
    let mut host = DirectoryHost::open(&root, config.event_channel_capacity).await?;
    if let Some(opener) = &args.open_with {
        host = host.with_opener(opener.clone());
    }
    let host: Arc<dyn PluginHost> = Arc::new(host);

    let runtime = PluginRuntime::headless(host, config)?;
    runtime.start().await;

    let outcome = commands::run(&runtime, args.command).await;

    runtime.shutdown().await;
    outcome
}

fn default_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join("plugins")
}
