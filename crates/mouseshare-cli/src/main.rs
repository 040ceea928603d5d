//! mouseshare CLI: thin launcher for the peer daemon.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use mouseshare_clipboard::MockClipboard;
use mouseshare_daemon::daemon::DaemonEvent;
use mouseshare_daemon::{setup, Daemon};
use mouseshare_discovery::{Discovery, RETRY_BACKOFF};
use mouseshare_input::mock::{MockDisplays, MockInjector, MockTap};
use mouseshare_input::DisplayProvider;
use mouseshare_protocol::TcpTransport;
use mouseshare_types::combined_bounds;

#[derive(Parser)]
#[command(
    name = "mouseshare",
    about = "Share one mouse and keyboard across hosts on the local network",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the mouseshare peer daemon.
    Start {
        /// Path to the settings file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run with virtual (in-memory) input backends instead of the
        /// platform event tap. Useful for exercising discovery and the
        /// wire protocol between two terminals.
        #[arg(long)]
        virtual_input: bool,
    },

    /// Write default settings and a fresh peer identity.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            virtual_input,
        } => start(config, virtual_input).await,
        Commands::Init => init(),
    }
}

fn init() -> anyhow::Result<()> {
    let dir = setup::config_dir();
    let peer_id = setup::load_or_create_peer_id(&dir)?;
    let settings = mouseshare_daemon::Settings::default();
    let path = dir.join("settings.json");
    setup::save_settings(&settings, Some(&path))?;
    println!("Peer ID:  {peer_id}");
    println!("Settings: {}", path.display());
    Ok(())
}

async fn start(config: Option<PathBuf>, virtual_input: bool) -> anyhow::Result<()> {
    let settings = setup::load_settings(config.as_deref())?;
    let config_dir = setup::config_dir();
    let peer_id = setup::load_or_create_peer_id(&config_dir)?;
    let name = setup::local_host_name();
    let port = settings.port;

    if !virtual_input {
        // The global event tap, cursor warping, and clipboard hooks live in
        // platform backend crates that plug in here.
        bail!(
            "no platform input backend is built into this binary; \
             run with --virtual-input to use in-memory backends"
        );
    }

    let displays = MockDisplays::single(1920.0, 1080.0);
    let display_list = displays.displays();
    let bounds = combined_bounds(&display_list);
    let (tap, _feed) = MockTap::new(settings.edge_rules(bounds), bounds.center());
    let injector = MockInjector::new(bounds);
    let clipboard = MockClipboard::new();

    let transport = TcpTransport::bind(([0, 0, 0, 0], port).into())
        .await
        .context("failed to bind the listener port")?;
    let mut daemon = Daemon::new(
        settings,
        peer_id,
        &name,
        transport,
        Box::new(tap),
        Box::new(injector),
        Box::new(displays),
        Some(Box::new(clipboard)),
    )?;
    daemon.set_settings_path(config_dir.join("settings.json"));

    let screen_width = bounds.width as u32;
    let screen_height = bounds.height as u32;

    // Discovery: advertise and browse, recreating the daemon with a fixed
    // backoff when it fails.
    let discovery_events = daemon.event_sender();
    tokio::spawn(async move {
        loop {
            match Discovery::new(peer_id, &name) {
                Ok(mut discovery) => {
                    if let Err(e) = discovery.advertise(port, screen_width, screen_height) {
                        warn!(error = %e, "advertising failed");
                    }
                    match discovery.browse() {
                        Ok(mut rx) => {
                            while let Some(event) = rx.recv().await {
                                if discovery_events
                                    .send(DaemonEvent::Discovery(event))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!(error = %e, "browse failed"),
                    }
                    discovery.shutdown();
                }
                Err(e) => warn!(error = %e, "mDNS daemon failed"),
            }
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    });

    // Log status transitions.
    let mut status_rx = daemon.status_receiver();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow().clone();
            info!(status = %status.kind, sessions = status.session_count, "status");
        }
    });

    // Ctrl-C shuts the daemon down cleanly.
    let shutdown_tx = daemon.event_sender();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
    });

    daemon.run().await.context("daemon exited with an error")
}
