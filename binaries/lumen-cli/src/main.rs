//! Lumen QI CLI
//!
//! Run the adaptive service, or send it a single request.

use clap::{Parser, Subcommand};
use lumen_qi::{AdaptiveService, ServiceConfig, ServiceLoop, SysinfoProbe};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Lumen QI - adaptive intelligence service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the service until interrupted
    Serve {
        /// YAML config file (default: <config dir>/lumen/config.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind, overrides config and LUMEN_BIND
        #[arg(short, long)]
        bind: Option<String>,

        /// Verbose logging
        #[arg(long)]
        debug: bool,
    },

    /// Send one JSON request and print the reply
    Send {
        #[arg(short, long, default_value = "127.0.0.1:5555")]
        addr: String,

        /// Request, e.g. '{"command":"status"}'
        json: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            debug,
        } => {
            init_logging(debug);
            serve(config, bind).await
        }
        Commands::Send { addr, json } => send(&addr, &json).await,
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("lumen_qi={level},lumen={level}"))
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config_path: Option<PathBuf>, bind: Option<String>) -> anyhow::Result<()> {
    let mut config = ServiceConfig::load(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.bind = bind;
    }

    tracing::info!(
        "Starting {} (optimize every {}s, retention {}s)",
        config.personality.name,
        config.optimize_interval_secs,
        config.memory.retention_secs
    );

    let probe = tokio::task::spawn_blocking(SysinfoProbe::new).await?;
    let service = Arc::new(AdaptiveService::new(&config, Box::new(probe)));

    ServiceLoop::new(service, &config)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for interrupt: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Lumen QI stopped");
    Ok(())
}

async fn send(addr: &str, json: &str) -> anyhow::Result<()> {
    // Re-encode so the request is guaranteed to fit on one line
    let request: serde_json::Value = serde_json::from_str(json)?;

    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();

    writer.write_all(request.to_string().as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    match lines.next_line().await? {
        Some(reply) => {
            let value: serde_json::Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => anyhow::bail!("connection closed before a reply arrived"),
    }
}
