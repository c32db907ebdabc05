#![forbid(unsafe_code)]

//! Plays one simulated song and streams its progress to a collector.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use scorestream_core::config::StreamerConfig;
use scorestream_core::host::{LevelEnd, LevelInfo};
use scorestream_core::model::{Characteristic, Difficulty};
use scorestream_core::session::{StreamingSessions, SubmitterFactory};
use scorestream_core::submit::{GrpcConnector, ResilientSubmitter, ScoreSubmitter};
use scorestream_core::{Clock, SystemClock};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod simulate;

use simulate::{Monitors, PlayScript, SimulatedHost};

#[derive(Debug, Parser)]
#[command(name = "scorestream-agent", version, about = "Streams a simulated play to a score collector")]
struct Args {
    /// TOML config file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collector URL, e.g. http://127.0.0.1:56078
    #[arg(long)]
    collector: Option<String>,

    /// Player id. If omitted, the session id is used.
    #[arg(long)]
    player_id: Option<String>,

    #[arg(long)]
    poll_ms: Option<u64>,

    #[arg(long)]
    heartbeat_ms: Option<u64>,

    /// Length of the simulated song.
    #[arg(long, default_value_t = 30)]
    song_seconds: u64,

    /// Song time at which the player pauses.
    #[arg(long, requires = "pause_for")]
    pause_at: Option<f64>,

    /// How long the pause lasts, in seconds.
    #[arg(long, requires = "pause_at")]
    pause_for: Option<f64>,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    log: String,
}

impl Args {
    fn streamer_config(&self) -> anyhow::Result<StreamerConfig> {
        let mut config = match &self.config {
            Some(path) => StreamerConfig::load_from(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => StreamerConfig::default(),
        };
        if let Some(collector) = &self.collector {
            config.collector_address = collector.clone();
        }
        if let Some(player_id) = &self.player_id {
            config.player_id = Some(player_id.clone());
        }
        if let Some(ms) = self.poll_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = self.heartbeat_ms {
            config.heartbeat_interval_ms = ms;
        }
        Ok(config)
    }

    fn script(&self) -> PlayScript {
        let pause = match (self.pause_at, self.pause_for) {
            (Some(at), Some(hold)) if at >= 0.0 && hold >= 0.0 => {
                Some((Duration::from_secs_f64(at), Duration::from_secs_f64(hold)))
            }
            _ => None,
        };
        PlayScript {
            pause,
            ..Default::default()
        }
    }
}

fn demo_level() -> LevelInfo {
    LevelInfo {
        level_id: "custom_level_5AD1A2B3C4D5E6F708192A3B4C5D6E7F80912A3B".to_string(),
        song_name: "Simulated Song".to_string(),
        song_author: "scorestream".to_string(),
        level_author: "scorestream".to_string(),
        characteristic: Characteristic {
            serialized_name: "Standard".to_string(),
            name: "Standard".to_string(),
        },
        difficulty: Difficulty {
            name: "Expert".to_string(),
            rank: 7,
        },
        ..Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.streamer_config()?;
    let connector = GrpcConnector::new(&config)
        .with_context(|| format!("collector address {}", config.collector_address))?;

    match connector.version().await {
        Ok(version) => tracing::info!(collector = %config.collector_address, %version, "collector reachable"),
        Err(e) => tracing::warn!(collector = %config.collector_address, error = %e, "collector version probe failed"),
    }

    let submitters: SubmitterFactory = {
        let connector = connector.clone();
        Arc::new(move || -> Arc<dyn ScoreSubmitter> {
            Arc::new(ResilientSubmitter::new(connector.clone()))
        })
    };
    // Enough for a few poll ticks after a quit.
    let quit_grace = (config.poll_interval() * 4).max(Duration::from_secs(1));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = StreamingSessions::new(config, Arc::clone(&clock), submitters);

    let level = demo_level();
    let monitors = Monitors::new(clock, &level);
    let host = Arc::new(SimulatedHost::new(level, Duration::from_secs(args.song_seconds)));
    let session = sessions.on_session_start(monitors.sources(host.clone()))?;

    let cancel = CancellationToken::new();
    let driver = tokio::spawn(simulate::play(
        args.script(),
        Arc::clone(&host),
        monitors.clone(),
        cancel.clone(),
    ));

    tokio::select! {
        _ = session.finished() => {}
        _ = shutdown_signal() => {
            cancel.cancel();
            // Leave through the menu so the collector sees the quit.
            if !host.is_paused() {
                host.pause();
                monitors.pause.did_pause();
            }
            monitors.pause.did_return_to_menu();
            host.end_level(LevelEnd::Quit);
            if tokio::time::timeout(quit_grace, session.finished()).await.is_err() {
                tracing::warn!("streaming loop did not send the quit update in time");
            }
        }
    }
    cancel.cancel();
    if let Err(e) = driver.await {
        tracing::error!(error = %e, "simulated host task failed");
    }

    if let Some(last) = session.last_emitted().await {
        tracing::info!(
            player_id = %last.player_id,
            state = ?last.play_state,
            score = last.game_progress.score.current_score,
            "last update sent"
        );
    }
    sessions.on_session_end(session).await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}
