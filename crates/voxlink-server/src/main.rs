//! voxlink-server binary: CLI, logging and signal handling around
//! [`voxlink_server::GatewayServer`].

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use voxlink_server::transport;
use voxlink_server::{GatewayServer, Overrides, ServerConfig};

/// voxlink-server: voice gateway session manager
#[derive(Parser, Debug)]
#[command(name = "voxlink-server", version, about = "Voice gateway session manager")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.voxlink/config.toml")]
    config: String,

    /// Shared password expected in the `authorization` header
    #[arg(long)]
    password: Option<String>,

    /// Reject connections from this address (repeatable)
    #[arg(long = "block", value_name = "ADDR")]
    blocked: Vec<String>,

    /// Seconds between STATUS messages (0 disables them)
    #[arg(long)]
    status_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting voxlink-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = Overrides {
        bind: cli.bind,
        port: cli.port,
        password: cli.password,
        blocked: cli.blocked,
        status_interval_secs: cli.status_interval,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let (listener, incoming) = match transport::start_listener(&server_config.listen_addr()).await
    {
        Ok(started) => started,
        Err(e) => {
            error!(error = %e, "failed to start listener");
            std::process::exit(1);
        }
    };

    let gateway = Arc::new(GatewayServer::new(server_config, Some(Box::new(listener))));

    tokio::select! {
        _ = gateway.clone().run(incoming) => {
            warn!("listener stopped unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal");
        }
    }

    gateway.shutdown().await;
    // Let writer tasks flush their close frames.
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("voxlink-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
