//! Network Module
//!
//! A NetSDR receiver is driven over two channels:
//!
//! - [`tcp`]: the control channel, an ordered byte stream carrying exactly one
//!   response per request.
//! - [`udp`]: the data channel, unidirectional datagrams each holding one
//!   self-contained data message.
//!
//! The session only depends on the [`TransportClient`] and [`DatagramListener`]
//! traits, so the socket implementations here can be swapped out in tests.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::errors::NetworkError;

pub mod tcp;
pub mod udp;

/// Callback invoked once per inbound unit (control frame or datagram).
///
/// Runs on the transport's own receive task and must not block it.
pub type MessageHandler = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Control channel capability.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Opens the channel. Every complete inbound message is handed to `on_message`.
    async fn connect(&self, on_message: MessageHandler) -> Result<(), NetworkError>;

    /// Closes the channel and waits for its receive task to finish.
    /// Calling this while disconnected does nothing.
    async fn disconnect(&self) -> Result<(), NetworkError>;

    fn is_connected(&self) -> bool;

    /// Writes one encoded message.
    async fn send(&self, bytes: &[u8]) -> Result<(), NetworkError>;
}

/// Data channel capability.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatagramListener: Send + Sync {
    /// Spawns the receive loop; every datagram is handed to `on_message`.
    async fn start_listening(&self, on_message: MessageHandler) -> Result<(), NetworkError>;

    /// Signals the receive loop to stop and returns once its socket is released.
    async fn stop_listening(&self) -> Result<(), NetworkError>;

    fn is_listening(&self) -> bool;
}
