use clap::Parser;
use tracing::info;

use dualrag_api::shutdown_signal;
use dualrag_bridge::BridgeServer;
use dualrag_cli::{build_embedder, events_scheduler, init_tracing, load_settings};

/// Serves the events index to the assistant over newline-delimited JSON.
#[derive(Parser)]
#[command(name = "dualrag-bridge")]
struct Args {
    /// Listen on TCP instead of stdio. Without a value, `bridge.listen` is used.
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    tcp: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = load_settings()?;
    // stdout carries protocol frames
    init_tracing(&settings.log, true);

    let embedder = build_embedder(&settings)?;
    let scheduler = events_scheduler(&settings, embedder.clone())?;
    let server = BridgeServer::start(scheduler.clone(), embedder).await;
    let periodic = scheduler.spawn_periodic(settings.refresh.interval());

    let result = match args.tcp {
        Some(addr) => {
            let addr = if addr.is_empty() { settings.bridge.listen.clone() } else { addr };
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            server.serve_tcp(listener, shutdown_signal()).await
        }
        None => {
            info!("serving bridge on stdio");
            server.serve(tokio::io::stdin(), tokio::io::stdout()).await
        }
    };
    periodic.abort();
    result?;
    Ok(())
}
