//! Broker management API poller.
//!
//! Every call re-polls the broker; nothing is cached. A telemetry outage is a
//! degraded display, not an error: failed queue lookups report zeroes and a
//! failed channel listing reports no channels. The cause is logged at `warn`.

use chrono::Utc;
use futures::future::join_all;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use crate::config::ManagementSettings;

use super::types::{AggregatedStats, ChannelStat, QueueStat, RawChannel, RawQueue};

/// The default virtual host, `/`.
const DEFAULT_VHOST: &str = "/";

#[derive(Debug, thiserror::Error)]
pub enum ManagementApiError {
    #[error("invalid management base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("management API request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("management API returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("management API response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct StatsAggregator {
    client: Client,
    base: Url,
    username: String,
    password: String,
    queues: Vec<String>,
}

impl StatsAggregator {
    /// Build an aggregator for a fixed set of queue names.
    ///
    /// Fails only when the base URL cannot carry a path or the HTTP client
    /// cannot be constructed; polling itself never fails.
    pub fn new(
        settings: ManagementSettings,
        queues: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ManagementApiError> {
        let base = Url::parse(&settings.base_url).map_err(|e| ManagementApiError::InvalidBaseUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ManagementApiError::InvalidBaseUrl {
                url: settings.base_url,
                reason: "URL cannot be a base".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ManagementApiError::Client)?;

        Ok(Self {
            client,
            base,
            username: settings.username,
            password: settings.password,
            queues: queues.into_iter().map(Into::into).collect(),
        })
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Stats for one queue on the default vhost; zeroed on any failure.
    pub async fn fetch_queue_stats(&self, queue: &str) -> QueueStat {
        match self.try_fetch_queue_stats(queue).await {
            Ok(stat) => stat,
            Err(err) => {
                warn!(queue, error = %err, "queue stats unavailable; reporting zeroes");
                QueueStat::zeroed(queue)
            }
        }
    }

    /// All channels known to the broker; empty on any failure.
    pub async fn fetch_channels(&self) -> Vec<ChannelStat> {
        match self.try_fetch_channels().await {
            Ok(channels) => channels,
            Err(err) => {
                warn!(error = %err, "channel list unavailable; reporting none");
                Vec::new()
            }
        }
    }

    /// Poll every configured queue and the channel list concurrently.
    #[instrument(skip(self), fields(queues = self.queues.len()))]
    pub async fn aggregate(&self) -> AggregatedStats {
        let queue_polls = join_all(self.queues.iter().map(|q| self.fetch_queue_stats(q)));
        let (queues, channels) = tokio::join!(queue_polls, self.fetch_channels());

        AggregatedStats {
            queues,
            channels,
            polled_at: Utc::now(),
        }
    }

    pub async fn try_fetch_queue_stats(&self, queue: &str) -> Result<QueueStat, ManagementApiError> {
        let raw: RawQueue = self.get_json(self.queue_url(queue)).await?;
        Ok(raw.into_stat(queue))
    }

    pub async fn try_fetch_channels(&self) -> Result<Vec<ChannelStat>, ManagementApiError> {
        let raw: Vec<RawChannel> = self.get_json(self.endpoint(&["api", "channels"])).await?;
        Ok(raw.into_iter().map(ChannelStat::from).collect())
    }

    /// `{base}/api/queues/%2F/{queue}`, with the queue name percent-encoded.
    fn queue_url(&self, queue: &str) -> Url {
        self.endpoint(&["api", "queues", DEFAULT_VHOST, queue])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejected cannot-be-a-base URLs, so segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ManagementApiError> {
        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(ManagementApiError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManagementApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.json::<T>().await.map_err(ManagementApiError::Decode)
    }
}
