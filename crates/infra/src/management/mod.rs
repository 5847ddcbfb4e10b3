//! Broker telemetry via the RabbitMQ management HTTP API.

mod aggregator;
mod types;

pub use aggregator::{ManagementApiError, StatsAggregator};
pub use types::{AggregatedStats, ChannelStat, QueueStat};
