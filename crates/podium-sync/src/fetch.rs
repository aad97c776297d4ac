//! One-shot bulk read of current standings over request/response.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use podium_core::{LeaderboardEntry, SyncError, SyncErrorCategory, classify_http_status, normalize};

/// Request/response source of raw snapshot payloads.
#[async_trait]
pub trait SnapshotApi: Send + Sync {
    /// Fetch the raw snapshot body for one competition.
    async fn fetch_raw(&self, competition_id: u64) -> Result<Value, SyncError>;
}

/// reqwest-backed snapshot API client.
pub struct HttpSnapshotApi {
    client: reqwest::Client,
    api_base: Url,
}

impl HttpSnapshotApi {
    pub fn new(api_base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base,
        }
    }

    fn leaderboard_url(&self, competition_id: u64) -> String {
        format!(
            "{}/leaderboard/?competition={competition_id}",
            self.api_base.as_str().trim_end_matches('/')
        )
    }
}

#[async_trait]
impl SnapshotApi for HttpSnapshotApi {
    async fn fetch_raw(&self, competition_id: u64) -> Result<Value, SyncError> {
        let url = self.leaderboard_url(competition_id);
        let response = self.client.get(&url).send().await.map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Network,
                "snapshot_request_failed",
                err.to_string(),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::new(
                classify_http_status(status.as_u16()),
                "snapshot_http_error",
                format!("snapshot request returned status {status}"),
            ));
        }

        response.json::<Value>().await.map_err(|err| {
            SyncError::new(
                SyncErrorCategory::Protocol,
                "snapshot_decode_error",
                err.to_string(),
            )
        })
    }
}

/// Fetch and normalize the current standings for one competition.
///
/// Malformed-but-delivered payloads normalize to an empty list; only
/// transport and HTTP failures surface as errors.
pub async fn fetch_snapshot(
    api: &dyn SnapshotApi,
    competition_id: u64,
) -> Result<Vec<LeaderboardEntry>, SyncError> {
    let payload = api.fetch_raw(competition_id).await?;
    let entries = normalize::snapshot_entries(&payload);
    debug!(competition_id, entry_count = entries.len(), "snapshot fetched");
    Ok(entries)
}
