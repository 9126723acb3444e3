//! farview agent — entry point.
//!
//! ```text
//! farview-agent                    Run in the foreground
//! farview-agent --config <path>    Load a custom config JSON
//! farview-agent --gen-config      Write default config to stdout
//! farview-agent --port <port>     Override the configured port
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use farview_agent::config::AgentConfig;
use farview_agent::control_ws::ControlContext;
use farview_agent::server;
use farview_core::{InputInjector, StreamSupervisor};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "farview-agent", about = "farview remote desktop agent")]
struct Cli {
    /// Path to configuration JSON file.
    #[arg(short, long, default_value = "farview-agent.json")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override the configured HTTP port.
    #[arg(short, long)]
    port: Option<u16>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", AgentConfig::default_json());
        return Ok(());
    }

    let config = AgentConfig::load(&cli.config);
    let port = cli.port.unwrap_or(config.agent.http_port);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.agent.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("farview-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("http port: {port}");
    info!("capture method: {}", config.screen.capture_method);
    info!("codec: {} @ {} fps", config.encoder.default_codec, config.encoder.frame_rate);
    info!("reboot enabled: {}", config.system.reboot_enabled);

    let supervisor = Arc::new(StreamSupervisor::new(config.to_stream_config()));
    let control = ControlContext {
        supervisor: Arc::clone(&supervisor),
        injector: InputInjector::new(),
        reboot_enabled: config.system.reboot_enabled,
        reboot_delay: config.system.reboot_delay,
    };

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let shutdown = CancellationToken::new();

    // Ctrl-C handler.
    let shutdown_handle = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("ctrl-c received, shutting down");
        shutdown_handle.cancel();
    });

    server::serve(listener, Arc::clone(&supervisor), control, shutdown).await?;

    // Bring the pipeline down after the listener closes.
    tokio::task::spawn_blocking(move || supervisor.stop()).await??;

    Ok(())
}
