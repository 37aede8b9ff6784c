//! UDP Data Channel
//! ----------------
//!
//! Receives IQ data datagrams from the receiver. Each datagram is handed to
//! the registered [`MessageHandler`] as-is; decoding is up to the session.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::errors::NetworkError;
use crate::network::{DatagramListener, MessageHandler};

/// Big enough for any UDP payload, so oversized datagrams are not silently cut.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Errors that only spoil one datagram. ICMP port unreachable replies show up
/// as `ConnectionReset` or `ConnectionRefused` on some platforms.
fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused | ErrorKind::Interrupted | ErrorKind::WouldBlock
    )
}

/// Endpoint the data channel binds to.
///
/// Two listeners are the same listener if they bind the same address and port.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpListenerConfig {
    pub bind_addr: SocketAddr,
}

pub struct UdpListener {
    config: UdpListenerConfig,
    task: Mutex<Option<ListenerTask>>,
    listening: Arc<AtomicBool>,
}

struct ListenerTask {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PartialEq for UdpListener {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
    }
}

impl Eq for UdpListener {}

impl UdpListener {
    pub fn new(config: UdpListenerConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &UdpListenerConfig {
        &self.config
    }

    /// Address the socket is actually bound to, while listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.task.lock().await.as_ref().map(|task| task.local_addr)
    }

    async fn receive_loop(
        socket: UdpSocket,
        mut shutdown_rx: watch::Receiver<bool>,
        on_message: MessageHandler,
        listening: Arc<AtomicBool>,
        name: String,
    ) {
        info!("{name}: listening for datagrams");
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("{name}: received shutdown signal");
                    break;
                }
                result = socket.recv_from(&mut buffer) => match result {
                    Ok((length, remote)) => {
                        trace!("{name}: received {length} bytes from {remote}");
                        on_message(buffer[..length].to_vec());
                    }
                    Err(e) if is_transient(e.kind()) => {
                        warn!("{name}: dropped datagram: {e}");
                    }
                    Err(e) => {
                        error!("{name}: error receiving datagram: {e}");
                        break;
                    }
                }
            }
        }
        listening.store(false, Ordering::SeqCst);
        drop(socket);
        info!("{name}: stopped listening");
    }
}

#[async_trait]
impl DatagramListener for UdpListener {
    async fn start_listening(&self, on_message: MessageHandler) -> Result<(), NetworkError> {
        let mut task = self.task.lock().await;
        match task.take() {
            Some(running) if !running.handle.is_finished() => {
                info!("Already listening on {}.", self.config.bind_addr);
                *task = Some(running);
                return Ok(());
            }
            Some(finished) => {
                debug!("Replacing exited listener on {}", finished.local_addr);
                if let Err(e) = finished.handle.await {
                    warn!("Previous listener task failed: {e}");
                }
            }
            None => {}
        }

        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        let local_addr = socket.local_addr()?;
        let name = format!("udp-listener-{local_addr}");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.listening.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(Self::receive_loop(
            socket,
            shutdown_rx,
            on_message,
            Arc::clone(&self.listening),
            name,
        ));

        *task = Some(ListenerTask {
            local_addr,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    async fn stop_listening(&self) -> Result<(), NetworkError> {
        let task = self.task.lock().await.take();
        let Some(task) = task else {
            debug!("Not listening on {}; nothing to stop.", self.config.bind_addr);
            return Ok(());
        };

        let _ = task.shutdown_tx.send(true);
        let result = task.handle.await.map_err(|e| NetworkError::Join(e.to_string()));
        self.listening.store(false, Ordering::SeqCst);
        info!("Stopped listening for UDP messages on {}.", task.local_addr);
        result
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    fn loopback_config() -> UdpListenerConfig {
        UdpListenerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_receives_datagrams_until_stopped() {
        let listener = UdpListener::new(loopback_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |bytes| {
            let _ = tx.send(bytes);
        });

        listener.start_listening(handler).await.unwrap();
        assert!(listener.is_listening());
        let target = listener.local_addr().await.unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1, 2, 3], target).await.unwrap();
        sender.send_to(&[4, 5], target).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![4, 5]);

        listener.stop_listening().await.unwrap();
        assert!(!listener.is_listening());
        assert!(listener.local_addr().await.is_none());
        // The socket is released once stop returns, so the port can be bound again.
        UdpSocket::bind(target).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let listener = UdpListener::new(loopback_config());
        let handler: MessageHandler = Arc::new(|_| {});

        listener.start_listening(Arc::clone(&handler)).await.unwrap();
        let first_addr = listener.local_addr().await;
        listener.start_listening(handler).await.unwrap();
        assert_eq!(listener.local_addr().await, first_addr);

        listener.stop_listening().await.unwrap();
    }

    #[tokio::test]
    async fn test_restarts_after_task_exited() {
        let listener = UdpListener::new(loopback_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |bytes| {
            let _ = tx.send(bytes);
        });

        listener.start_listening(Arc::clone(&handler)).await.unwrap();
        {
            let task = listener.task.lock().await;
            task.as_ref().unwrap().handle.abort();
        }
        for _ in 0..50 {
            if listener.task.lock().await.as_ref().unwrap().handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        listener.start_listening(handler).await.unwrap();
        let second_addr = listener.local_addr().await.unwrap();
        assert!(listener.is_listening());

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[9, 9], second_addr).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(received, vec![9, 9]);

        listener.stop_listening().await.unwrap();
    }

    #[test]
    fn test_transient_receive_errors() {
        assert!(is_transient(ErrorKind::ConnectionReset));
        assert!(is_transient(ErrorKind::ConnectionRefused));
        assert!(!is_transient(ErrorKind::PermissionDenied));
        assert!(!is_transient(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let listener = UdpListener::new(loopback_config());
        assert!(listener.stop_listening().await.is_ok());
        assert!(!listener.is_listening());
    }

    #[test]
    fn test_listeners_compare_by_endpoint() {
        let a = UdpListener::new(UdpListenerConfig {
            bind_addr: "0.0.0.0:60000".parse().unwrap(),
        });
        let b = UdpListener::new(UdpListenerConfig {
            bind_addr: "0.0.0.0:60000".parse().unwrap(),
        });
        let c = UdpListener::new(UdpListenerConfig {
            bind_addr: "0.0.0.0:60001".parse().unwrap(),
        });
        assert!(a == b);
        assert!(a != c);
    }
}
