mod channel;
mod core;
mod diagnostics;
mod dispatch;
mod http;
mod render;
mod socket;
mod theme;
mod yts;

use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use maxx_proto::config::Config;
use maxx_proto::platform;
use maxx_proto::state::StateManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::channel::CommandChannel;
use crate::core::{Core, CoreEvent};
use crate::diagnostics::{Diagnostic, DiagnosticsLayer};
use crate::dispatch::ProcessActions;
use crate::yts::YtsCatalog;

/// Remote-controlled movie carousel.
#[derive(Parser, Debug)]
#[command(name = "streammaxx", version, about)]
struct Args {
    /// Run without the terminal UI; log to stderr as well as the log file.
    #[arg(long)]
    headless: bool,

    /// Config file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the remote-control TCP port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // ── Logging ──────────────────────────────────────────────────────────────
    let (diag_tx, diag_rx) = broadcast::channel::<Diagnostic>(64);

    let log_path = platform::log_path();
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = args
        .headless
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(stderr_layer)
        .with(DiagnosticsLayer::new(diag_tx))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,maxx_tui=debug,maxx_proto=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .init();

    if !args.headless {
        // The terminal belongs to the UI from here on.
        eprintln!("streammaxx log: {}", log_path.display());
    }
    info!("streammaxx starting, log file: {:?}", log_path);

    // ── Config ───────────────────────────────────────────────────────────────
    let config_path = args.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    info!("Config loaded from: {:?}", config_path);
    if let Some(port) = args.port {
        config.server.port = port;
    }

    for tool in [&config.playback.player_command, &config.keys.command] {
        if platform::find_on_path(tool).is_none() {
            warn!("{} not found on PATH; related actions will fail", tool);
        }
    }

    // ── Core ─────────────────────────────────────────────────────────────────
    let client = yts::build_client(&config.catalog)?;
    let catalog = YtsCatalog::new(client.clone(), &config.catalog)?;
    let actions = ProcessActions::new(client, config.playback.clone(), config.keys.clone());

    let state_manager = Arc::new(StateManager::new());
    let reader = state_manager.reader();
    let (channel, commands) = CommandChannel::new();
    let (event_tx, event_rx) = mpsc::channel::<CoreEvent>(8);

    let core = Core::new(&config, catalog, actions, state_manager.clone());

    // ── Remote socket ────────────────────────────────────────────────────────
    let listener = socket::bind(&config.server.bind_address, config.server.port).await?;
    let connected = Arc::new(AtomicUsize::new(0));
    let _socket_handle = socket::start_server(
        listener,
        channel.clone(),
        config.server.buffer_size,
        connected.clone(),
    );

    // ── HTTP API ─────────────────────────────────────────────────────────────
    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_manager.clone(),
            channel.clone(),
        );
    }

    let core_handle = tokio::spawn(core.run(commands, event_rx));

    // ── Front end ────────────────────────────────────────────────────────────
    if args.headless {
        info!("Running headless, Ctrl-C to quit");
        tokio::signal::ctrl_c().await?;
    } else if let Err(e) = render::run(reader, diag_rx, connected, config.render.fps).await {
        tracing::error!("render loop failed: {}", e);
    }

    info!("Shutting down");
    let _ = event_tx.send(CoreEvent::Shutdown).await;
    match core_handle.await {
        Ok(Err(e)) => tracing::error!("Core exited with error: {}", e),
        Err(e) => tracing::error!("Core task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}
