//! TCP Control Channel
//! -------------------
//!
//! Asynchronous TCP transport for the receiver's control channel. Connecting
//! spawns a receive task that cuts the byte stream into messages and hands each
//! one to the registered [`MessageHandler`]. Disconnecting signals that task and
//! waits for it, so no reader outlives the connection.
//!
//! # Example
//! ```rust,ignore
//! use netsdr::network::tcp::client::TcpTransport;
//!
//! let transport = TcpTransport::new("127.0.0.1:50000".parse()?);
//! transport.connect(handler).await?;
//! transport.send(&msg).await?;
//! transport.disconnect().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::errors::NetworkError;
use crate::network::tcp::{self, CONNECTION_TIMEOUT, MAX_MESSAGE_LENGTH};
use crate::network::{MessageHandler, TransportClient};

/// Control channel transport to a single receiver.
pub struct TcpTransport {
    target_addr: SocketAddr,
    connect_timeout: Duration,
    connection: Mutex<Option<Connection>>,
    connected: Arc<AtomicBool>,
}

#[derive(Debug)]
struct Connection {
    write_stream: OwnedWriteHalf,
    shutdown_tx: watch::Sender<bool>,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn close(mut self) -> Result<(), NetworkError> {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.write_stream.shutdown().await {
            warn!("Failed to shutdown write stream: {e}");
        }
        self.reader.await.map_err(|e| NetworkError::Join(e.to_string()))
    }
}

impl TcpTransport {
    pub fn new(target_addr: SocketAddr) -> Self {
        Self::with_timeout(target_addr, CONNECTION_TIMEOUT)
    }

    pub fn with_timeout(target_addr: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            target_addr,
            connect_timeout,
            connection: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn target_addr(&self) -> SocketAddr {
        self.target_addr
    }

    async fn receive_loop(
        mut read_stream: OwnedReadHalf,
        mut shutdown_rx: watch::Receiver<bool>,
        on_message: MessageHandler,
        connected: Arc<AtomicBool>,
        peer: SocketAddr,
    ) {
        debug!("Starting listening for control messages from {peer}");
        let mut buffer = vec![0u8; MAX_MESSAGE_LENGTH];
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("Control listener for {peer} received shutdown signal");
                    break;
                }
                result = tcp::read_message(&mut read_stream, &mut buffer) => match result {
                    Ok(Some(length)) => {
                        debug!("Response received: {:02X?}", &buffer[..length]);
                        on_message(buffer[..length].to_vec());
                    }
                    Ok(None) => {
                        info!("Receiver {peer} closed the control connection.");
                        break;
                    }
                    Err(e) => {
                        error!("Error in control listening loop: {e}");
                        break;
                    }
                }
            }
        }
        connected.store(false, Ordering::SeqCst);
        info!("Control listener for {peer} stopped.");
    }
}

#[async_trait]
impl TransportClient for TcpTransport {
    async fn connect(&self, on_message: MessageHandler) -> Result<(), NetworkError> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() && self.connected.load(Ordering::SeqCst) {
            info!("Already connected to {}", self.target_addr);
            return Ok(());
        }
        if let Some(stale) = connection.take() {
            debug!("Releasing closed connection to {}", self.target_addr);
            if let Err(e) = stale.close().await {
                warn!("Failed to release closed connection: {e}");
            }
        }

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(self.target_addr)).await??;
        stream.set_nodelay(true)?;
        let (read_stream, write_stream) = stream.into_split();
        let src_addr = write_stream.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.connected.store(true, Ordering::SeqCst);
        let reader = tokio::spawn(Self::receive_loop(
            read_stream,
            shutdown_rx,
            on_message,
            Arc::clone(&self.connected),
            self.target_addr,
        ));

        *connection = Some(Connection {
            write_stream,
            shutdown_tx,
            reader,
        });
        info!("Connected to {} from {src_addr}", self.target_addr);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NetworkError> {
        let connection = self.connection.lock().await.take();
        let Some(connection) = connection else {
            info!("No active connection to disconnect.");
            return Ok(());
        };

        debug!("Closing control connection to {}", self.target_addr);
        let result = connection.close().await;
        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from {}.", self.target_addr);
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        let mut connection = self.connection.lock().await;
        let connection = connection
            .as_mut()
            .filter(|_| self.connected.load(Ordering::SeqCst))
            .ok_or(NetworkError::NotConnected)?;

        debug!("Message sent: {bytes:02X?}");
        match tcp::send_message(&mut connection.write_stream, bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("Failed to send message: {e}");
                Err(e)
            }
        }
    }
}
