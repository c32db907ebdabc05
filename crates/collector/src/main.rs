#![forbid(unsafe_code)]

//! Score stream collector daemon.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use scorestream_collector::{serve, ProgressBoard, ScoreCollector};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "scorestream-collector", version, about = "Collects live player progress streams")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:56078
    #[arg(long, default_value = "127.0.0.1:56078")]
    listen: SocketAddr,

    /// Log every received message as JSON.
    #[arg(long, default_value_t = false)]
    dump_json: bool,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let board = Arc::new(ProgressBoard::new());
    let collector = ScoreCollector::new(Arc::clone(&board)).with_json_dump(args.dump_json);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("bind {}", args.listen))?;
    tracing::info!(listen = %args.listen, "collector starting");

    serve(listener, collector, shutdown_signal()).await?;

    for player_id in board.players() {
        if let Some(record) = board.get(&player_id) {
            tracing::info!(
                %player_id,
                updates = record.updates,
                finished = record.finished,
                score = record.latest.game_progress.score.current_score,
                "player summary"
            );
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}
