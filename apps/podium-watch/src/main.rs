//! Terminal watcher for one competition's live ranking feed.

mod config;
mod logging;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use podium_core::{RankingState, ReconnectPolicy, SyncEvent, classify};
use podium_sync::{
    ChannelRegistry, HttpSnapshotApi, SnapshotApi, WsConnector, spawn_reconciler,
};

use crate::config::WatchConfig;

#[tokio::main]
async fn main() {
    logging::init();

    let config = match WatchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            eprintln!("set PODIUM_COMPETITION (and optionally PODIUM_API_URL / PODIUM_WS_URL)");
            std::process::exit(2);
        }
    };

    info!(
        competition_id = config.competition_id,
        api = %config.api_base,
        stream = %config.stream_base,
        "starting live leaderboard watch"
    );

    let registry = Arc::new(ChannelRegistry::new(
        config.stream_base.clone(),
        Arc::new(WsConnector),
    ));
    let api: Arc<dyn SnapshotApi> = Arc::new(HttpSnapshotApi::new(config.api_base.clone()));
    let policy = if config.reconnect {
        ReconnectPolicy::new(config.reconnect_interval_ms)
    } else {
        ReconnectPolicy::disabled()
    };

    let handle = spawn_reconciler(
        Arc::clone(&registry),
        api,
        config.competition_id,
        policy,
    );
    let mut events = handle.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                let _ = handle.stop().await;
                break;
            }
            event = events.recv() => match event {
                Ok(SyncEvent::RankingChanged(state)) => render(&state),
                Ok(SyncEvent::Frame(frame)) => {
                    debug!(kind = %frame.kind, "ignoring unhandled frame kind");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dropped ranking updates while rendering");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    registry.close_all();
}

fn render(state: &RankingState) {
    if state.loading {
        println!("-- loading leaderboard...");
        return;
    }

    if let Some(err) = &state.error {
        println!("-- error: {err}");
        return;
    }

    let liveness = if state.connected { "LIVE" } else { "offline" };
    println!("-- leaderboard ({liveness}, {} entries)", state.entries.len());

    if state.entries.is_empty() {
        println!("   no submissions yet");
        return;
    }

    for entry in &state.entries {
        let tier = classify(entry.rating);
        println!(
            "   {:>4}  {:<24}  {:>12}  {}",
            entry.rank,
            entry.identity,
            format_score(entry.score),
            tier.name,
        );
    }
}

fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{value:.4}"),
        None => "N/A".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_scores_with_four_decimals_or_na() {
        assert_eq!(format_score(Some(0.98765432)), "0.9877");
        assert_eq!(format_score(Some(12.0)), "12.0000");
        assert_eq!(format_score(None), "N/A");
    }
}
