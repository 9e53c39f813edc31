//! Trellis binary - template render service

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trellis_server::{ServerConfig, server};

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Template render service")]
struct Args {
    /// Engine configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template root directory (can be specified multiple times).
    /// Earlier roots take precedence: list the site first, the framework last.
    #[arg(short, long = "templates", value_name = "DIR")]
    templates: Vec<PathBuf>,

    /// Directory of <lang>.json message bundles
    #[arg(short, long)]
    locales: Option<PathBuf>,

    /// Port to listen on
    #[arg(short = 'P', long, default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Upper bound on a single render, in milliseconds
    #[arg(long, default_value = "5000")]
    render_timeout_ms: u64,

    /// Do not watch the config file and template roots for changes
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trellis=info,trellis_server=info,trellis_template=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Default to ./templates when no root is given
    let template_roots = if args.templates.is_empty() {
        vec![std::env::current_dir()?.join("templates")]
    } else {
        args.templates
    };

    info!(roots = ?template_roots, config = ?args.config, "Starting trellis");

    let config = ServerConfig {
        port: args.port,
        host: args.host,
        config_path: args.config,
        template_roots,
        locales: args.locales,
        render_timeout_ms: args.render_timeout_ms,
        watch_enabled: !args.no_watch,
        ..Default::default()
    };

    server::run_server(config).await?;

    Ok(())
}
