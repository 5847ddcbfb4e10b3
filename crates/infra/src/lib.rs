//! Infrastructure layer: AMQP transport, broker management API, config.

pub mod amqp;
pub mod config;
pub mod management;

pub use amqp::{AmqpChannel, AmqpConnector};
pub use config::{ConfigError, ManagementSettings, Settings};
pub use management::{AggregatedStats, ChannelStat, ManagementApiError, QueueStat, StatsAggregator};
