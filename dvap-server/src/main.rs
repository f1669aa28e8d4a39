//! dvap-server: debugger-state push server

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info, warn};

use dvap_server::{forward_json_lines, ConfigLoader, Server, ServerConfig};
use dvap_utils::{init_logging_with_config, LogConfig, LogOutput, Result};

/// Push debugger thread and breakpoint state to WebSocket viewers
#[derive(Parser, Debug)]
#[command(name = "dvap-server")]
#[command(version)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/dvap/config.toml)
    #[arg(short, long, env = "DVAP_CONFIG")]
    config: Option<PathBuf>,

    /// WebSocket port, overrides the configuration file
    #[arg(short, long)]
    port: Option<u16>,

    /// Event stream port, overrides the configuration file
    #[arg(long)]
    events_port: Option<u16>,

    /// Do not serve the event stream
    #[arg(long)]
    no_events: bool,

    /// Read newline-delimited JSON debugger events from stdin
    #[arg(long)]
    stdin_events: bool,

    /// Log to stderr instead of the log file
    #[arg(long)]
    log_stderr: bool,
}

impl Cli {
    fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ConfigLoader::load_from_path(path)?,
            None => ConfigLoader::load()?,
        };

        if let Some(port) = self.port {
            config.websocket.port = port;
        }
        if let Some(port) = self.events_port {
            config.events.port = port;
        }
        if self.no_events {
            config.events.enabled = false;
        }

        ConfigLoader::validate(&config)?;
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    let handle = Server::new(config).start().await?;

    if cli.stdin_events {
        let sender = handle.event_sender();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            match forward_json_lines(stdin, &sender).await {
                Ok(count) => info!("stdin closed after {} events", count),
                Err(e) => warn!("Stopped reading events from stdin: {}", e),
            }
        });
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for ctrl-c: {}", e);
    }
    info!("Interrupted, shutting down");

    handle.shutdown();
    handle.wait().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = if cli.log_stderr {
        LogConfig::server().with_output(LogOutput::Stderr)
    } else {
        LogConfig::server()
    };
    if let Err(e) = init_logging_with_config(log_config) {
        eprintln!("dvap-server: failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!("dvap-server failed: {}", e);
        eprintln!("dvap-server: {}", e);
        std::process::exit(1);
    }
}
