//! AMQP 0-9-1 transport.
//!
//! The channel abstraction lives in `jobwire-broker` as pure mechanics.
//! This module implements it over `lapin` for RabbitMQ.

mod channel;

pub use channel::{AmqpChannel, AmqpConnector, AmqpError};
