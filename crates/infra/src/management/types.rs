//! Monitoring view of broker telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-queue counters. Every count is 0 when the broker could not report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStat {
    pub name: String,
    pub messages_ready: u64,
    pub messages_unacknowledged: u64,
    pub messages: u64,
    pub consumers: u64,
}

impl QueueStat {
    pub fn zeroed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages_ready: 0,
            messages_unacknowledged: 0,
            messages: 0,
            consumers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStat {
    pub name: String,
    pub consumer_count: u64,
    pub prefetch_count: u64,
    pub state: String,
}

/// Combined view returned by `StatsAggregator::aggregate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub queues: Vec<QueueStat>,
    pub channels: Vec<ChannelStat>,
    #[serde(rename = "polledAt")]
    pub polled_at: DateTime<Utc>,
}

/// `GET /api/queues/{vhost}/{name}` body; only the fields we report.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawQueue {
    #[serde(default)]
    pub messages_ready: Option<u64>,
    #[serde(default)]
    pub messages_unacknowledged: Option<u64>,
    #[serde(default)]
    pub messages: Option<u64>,
    #[serde(default)]
    pub consumers: Option<u64>,
}

impl RawQueue {
    pub(crate) fn into_stat(self, name: &str) -> QueueStat {
        QueueStat {
            name: name.to_string(),
            messages_ready: self.messages_ready.unwrap_or(0),
            messages_unacknowledged: self.messages_unacknowledged.unwrap_or(0),
            messages: self.messages.unwrap_or(0),
            consumers: self.consumers.unwrap_or(0),
        }
    }
}

/// One element of the `GET /api/channels` array.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawChannel {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub consumer_count: Option<u64>,
    #[serde(default)]
    pub prefetch_count: Option<u64>,
    #[serde(default)]
    pub state: Option<String>,
}

impl From<RawChannel> for ChannelStat {
    fn from(raw: RawChannel) -> Self {
        Self {
            name: raw.name.unwrap_or_else(|| "unknown".to_string()),
            consumer_count: raw.consumer_count.unwrap_or(0),
            prefetch_count: raw.prefetch_count.unwrap_or(0),
            state: raw.state.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}
