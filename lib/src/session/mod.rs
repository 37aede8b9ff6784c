//! NetSDR Session
//! --------------
//!
//! [`NetSdrClient`] drives one receiver: it opens the control channel, runs the
//! setup sequence, issues control commands one at a time and manages the IQ
//! streaming lifecycle on the data channel.
//!
//! ```text
//! Disconnected --connect--> Connected --start_iq--> Streaming
//!      ^                        ^  <------stop_iq------  |
//!      +-------disconnect-------+----------disconnect----+
//! ```
//!
//! The control channel carries one response per request and no request ids,
//! so at most one request may be in flight. A second caller is rejected with
//! [`SessionError::ConcurrencyConflict`] instead of being queued.
//!
//! Commands issued while disconnected are logged and ignored.

pub mod commands;
pub mod pending;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::errors::SessionError;
use crate::messages::{decode, extract_samples};
use crate::network::{DatagramListener, MessageHandler, TransportClient};
use crate::session::pending::PendingSlot;
use crate::sinks::SampleSink;

pub const DEFAULT_SAMPLE_BITS: u16 = 16;
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connected,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Width of one sample in the IQ datagrams.
    pub sample_bits: u16,
    /// How long a command waits for its response.
    pub response_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_bits: DEFAULT_SAMPLE_BITS,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

/// State touched by the transports' receive tasks.
struct SessionShared {
    pending: PendingSlot,
    sink: Arc<dyn SampleSink>,
    sample_bits: u16,
}

impl SessionShared {
    fn on_control_message(&self, bytes: Vec<u8>) {
        if let Err(bytes) = self.pending.resolve(bytes) {
            warn!("Discarding unsolicited control message: {bytes:02X?}");
        }
    }

    fn on_datagram(&self, bytes: Vec<u8>) {
        let message = match decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding malformed datagram ({} bytes): {e}", bytes.len());
                return;
            }
        };
        let samples = match extract_samples(self.sample_bits, message.body) {
            Ok(samples) => samples,
            Err(e) => {
                error!("Cannot extract samples: {e}");
                return;
            }
        };
        trace!(
            "Datagram {} ({:?}) carries {} samples",
            message.sequence_number,
            message.message_type,
            samples.len()
        );
        if let Err(e) = self.sink.accept(samples) {
            error!("Sample sink failed: {e}");
        }
    }
}

pub struct NetSdrClient {
    transport: Arc<dyn TransportClient>,
    listener: Arc<dyn DatagramListener>,
    shared: Arc<SessionShared>,
    state: Mutex<SessionState>,
    config: SessionConfig,
}

impl NetSdrClient {
    pub fn new(
        transport: Arc<dyn TransportClient>,
        listener: Arc<dyn DatagramListener>,
        sink: Arc<dyn SampleSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            listener,
            shared: Arc::new(SessionShared {
                pending: PendingSlot::new(),
                sink,
                sample_bits: config.sample_bits,
            }),
            state: Mutex::new(SessionState::Disconnected),
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.state() != SessionState::Disconnected
    }

    /// Whether IQ streaming has been started and not yet stopped.
    pub fn is_streaming(&self) -> bool {
        self.state() == SessionState::Streaming
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            debug!("Session state {:?} -> {state:?}", *current);
            *current = state;
        }
    }

    /// Falls back to disconnected when the control channel closed underneath
    /// the session, stopping the data listener if it was running.
    async fn sync_with_transport(&self) {
        let state = self.state();
        if state == SessionState::Disconnected || self.transport.is_connected() {
            return;
        }
        warn!("Control channel was closed by the receiver.");
        if state == SessionState::Streaming {
            if let Err(e) = self.listener.stop_listening().await {
                warn!("Failed to stop the data listener: {e}");
            }
        }
        self.shared.pending.abort();
        self.set_state(SessionState::Disconnected);
    }

    /// Opens the control channel and configures the receiver.
    ///
    /// The setup commands are sent one after the other, each waiting for its
    /// response. Does nothing if the session is already connected.
    ///
    /// # Errors
    /// Returns [`SessionError::Transport`] if the channel cannot be opened and
    /// any error of the setup commands. The session stays connected when only
    /// the setup fails.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.sync_with_transport().await;
        if self.is_connected() {
            info!("Already connected.");
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handler: MessageHandler = Arc::new(move |bytes| shared.on_control_message(bytes));
        self.transport.connect(handler).await?;
        self.set_state(SessionState::Connected);

        for message in commands::setup_sequence()? {
            self.send_request(&message, self.config.response_timeout).await?;
        }
        info!("Receiver configured.");
        Ok(())
    }

    /// Stops streaming, closes the control channel and abandons any pending request.
    ///
    /// Failures while closing are logged. Calling this while disconnected does nothing.
    pub async fn disconnect(&self) {
        let state = self.state();
        if state == SessionState::Disconnected {
            debug!("Already disconnected.");
            return;
        }
        if state == SessionState::Streaming {
            if let Err(e) = self.listener.stop_listening().await {
                warn!("Failed to stop the data listener: {e}");
            }
        }
        if let Err(e) = self.transport.disconnect().await {
            error!("Failed to close the control channel: {e}");
        }
        self.shared.pending.abort();
        self.set_state(SessionState::Disconnected);
        info!("Disconnected.");
    }

    /// Tells the receiver to start streaming and starts listening for IQ datagrams.
    ///
    /// # Errors
    /// Returns the start command's error, in which case the state is unchanged.
    /// If the receiver accepted the command but the listener cannot start, the
    /// session is left streaming so that [`Self::stop_iq`] can stop the receiver.
    pub async fn start_iq(&self) -> Result<(), SessionError> {
        self.sync_with_transport().await;
        match self.state() {
            SessionState::Connected => {}
            SessionState::Streaming => {
                info!("IQ streaming already started.");
                return Ok(());
            }
            SessionState::Disconnected => {
                warn!("No active connection.");
                return Ok(());
            }
        }

        self.send_request(&commands::receiver_start()?, self.config.response_timeout)
            .await?;
        self.set_state(SessionState::Streaming);

        let shared = Arc::clone(&self.shared);
        let handler: MessageHandler = Arc::new(move |bytes| shared.on_datagram(bytes));
        if let Err(e) = self.listener.start_listening(handler).await {
            error!("Receiver is streaming but the data listener failed to start: {e}");
            return Err(e.into());
        }
        info!("IQ streaming started.");
        Ok(())
    }

    /// Tells the receiver to stop streaming and stops the data listener.
    ///
    /// The listener is stopped and the session returns to connected even when
    /// the stop command fails.
    ///
    /// # Errors
    /// Returns the stop command's error after the listener has been stopped.
    pub async fn stop_iq(&self) -> Result<(), SessionError> {
        self.sync_with_transport().await;
        if self.state() != SessionState::Streaming {
            warn!("IQ streaming is not running.");
            return Ok(());
        }

        let result = match commands::receiver_stop() {
            Ok(message) => self.send_request(&message, self.config.response_timeout).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = self.listener.stop_listening().await {
            warn!("Failed to stop the data listener: {e}");
        }
        self.set_state(SessionState::Connected);

        match result {
            Ok(_) => {
                info!("IQ streaming stopped.");
                Ok(())
            }
            Err(e) => {
                warn!("Receiver did not acknowledge the stop command: {e}");
                Err(e)
            }
        }
    }

    /// Tunes `channel` to `hz`. Only the low 40 bits of `hz` are sent.
    pub async fn change_frequency(&self, hz: u64, channel: u8) -> Result<(), SessionError> {
        self.command("change frequency", commands::frequency(hz, channel)?)
            .await
            .map(drop)
    }

    pub async fn set_gain(&self, channel: u8, gain: u8) -> Result<(), SessionError> {
        self.command("set gain", commands::gain(channel, gain)?).await.map(drop)
    }

    pub async fn set_bandwidth(&self, channel: u8, bandwidth_hz: u32) -> Result<(), SessionError> {
        self.command("set bandwidth", commands::bandwidth(channel, bandwidth_hz)?)
            .await
            .map(drop)
    }

    /// Queries the device status.
    ///
    /// Returns the raw response, or `None` when the session is disconnected.
    pub async fn request_device_status(&self) -> Result<Option<Vec<u8>>, SessionError> {
        self.command("request device status", commands::device_status()?).await
    }

    pub async fn calibrate(&self) -> Result<(), SessionError> {
        self.command("calibrate", commands::calibrate()?).await.map(drop)
    }

    pub async fn reset_device(&self) -> Result<(), SessionError> {
        self.command("reset device", commands::reset()?).await.map(drop)
    }

    async fn command(&self, name: &str, message: Vec<u8>) -> Result<Option<Vec<u8>>, SessionError> {
        self.sync_with_transport().await;
        if !self.is_connected() {
            warn!("No active connection, cannot {name}.");
            return Ok(None);
        }
        debug!("Sending command: {name}");
        self.send_request(&message, self.config.response_timeout)
            .await
            .map(Some)
    }

    /// Sends `message` and waits up to `timeout` for the next control message.
    ///
    /// # Errors
    /// - [`SessionError::ConcurrencyConflict`] if another request is in flight.
    ///   Nothing is sent in that case.
    /// - [`SessionError::Transport`] if the message cannot be written.
    /// - [`SessionError::Timeout`] if no response arrives in time. A response
    ///   arriving later is discarded as unsolicited.
    /// - [`SessionError::Aborted`] if the session disconnects while waiting.
    pub async fn send_request(&self, message: &[u8], timeout: Duration) -> Result<Vec<u8>, SessionError> {
        let Some(mut guard) = self.shared.pending.claim() else {
            warn!("Rejecting request, another request is still pending.");
            return Err(SessionError::ConcurrencyConflict);
        };
        let receiver = guard.take_receiver().ok_or(SessionError::Aborted)?;

        self.transport.send(message).await?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => {
                trace!("Request {} answered: {response:02X?}", guard.id());
                Ok(response)
            }
            Ok(Err(_)) => {
                debug!("Request {} aborted", guard.id());
                Err(SessionError::Aborted)
            }
            Err(_) => {
                warn!("No response within {timeout:?}.");
                Err(SessionError::Timeout)
            }
        }
    }

    /// Entry point for every message read from the control channel.
    pub fn on_control_message(&self, bytes: Vec<u8>) {
        self.shared.on_control_message(bytes);
    }

    /// Entry point for every datagram read from the data channel.
    pub fn on_datagram(&self, bytes: Vec<u8>) {
        self.shared.on_datagram(bytes);
    }
}
