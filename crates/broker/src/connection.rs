//! Process-wide broker connection state.
//!
//! The manager is created once by the composition root (each binary's `main`)
//! and handed to `Publisher`, `Consumer` and the HTTP layer as an
//! `Arc<ConnectionManager>`. It owns the single channel; everyone else borrows
//! it per call.

use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::channel::{BrokerChannel, BrokerConnector};
use crate::error::{BrokerError, BrokerResult};
use crate::topology;

/// Lifecycle of the shared channel.
///
/// `Closed` is terminal. There is no `Reconnecting` state: a broker
/// disconnect is fatal to the process and the supervisor is expected to
/// restart it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Ready,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        }
    }
}

pub struct ConnectionManager {
    connector: Box<dyn BrokerConnector>,
    channel: OnceLock<Arc<dyn BrokerChannel>>,
    init_lock: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(connector: impl BrokerConnector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            channel: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Connect, open the channel and declare the `jobs` exchange.
    ///
    /// Any failure (unreachable broker, refused declaration) is returned as
    /// `BrokerError::Connection`; nothing is retried. Once a channel is set it
    /// is never replaced, so a second call fails with `AlreadyInitialized`.
    #[instrument(skip(self, url), err)]
    pub async fn initialize(&self, url: &str) -> BrokerResult<()> {
        let _guard = self.init_lock.lock().await;
        if self.channel.get().is_some() {
            return Err(BrokerError::AlreadyInitialized);
        }

        let channel = self
            .connector
            .open(url)
            .await
            .map_err(|e| BrokerError::connection(e.to_string()))?;

        let exchange = topology::jobs_exchange();
        channel
            .declare_exchange(&exchange)
            .await
            .map_err(|e| BrokerError::connection(e.to_string()))?;

        // Guarded by `init_lock`, so the cell is still empty here.
        let _ = self.channel.set(channel);
        info!(exchange = %exchange.name, kind = exchange.kind.as_str(), "broker connection ready");
        Ok(())
    }

    /// The shared channel. Fails with `NotInitialized` before `initialize`
    /// has completed.
    pub fn channel(&self) -> BrokerResult<Arc<dyn BrokerChannel>> {
        self.channel.get().cloned().ok_or(BrokerError::NotInitialized)
    }

    pub fn state(&self) -> ConnectionState {
        match self.channel.get() {
            None => ConnectionState::Uninitialized,
            Some(channel) if channel.is_open() => ConnectionState::Ready,
            Some(_) => ConnectionState::Closed,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish()
    }
}
