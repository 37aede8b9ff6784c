use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{NetworkError, SinkError};
use crate::messages::{MessageType, Samples, decode, encode_control};
use crate::network::{MessageHandler, TransportClient};
use crate::sinks::SampleSink;

/// The Ack a receiver sends back for `request`: same item and parameters.
pub fn ack_for(request: &[u8]) -> Vec<u8> {
    let message = decode(request).unwrap();
    encode_control(MessageType::Ack, message.item_code, message.body).unwrap()
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// In-memory control channel that records every message sent and, unless
/// told otherwise, answers each one with its Ack.
pub struct FakeTransport {
    handler: Mutex<Option<MessageHandler>>,
    sent: Mutex<Vec<Vec<u8>>>,
    connected: AtomicBool,
    auto_ack: AtomicBool,
    fail_sends: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
            auto_ack: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_auto_ack(&self, enabled: bool) {
        self.auto_ack.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, enabled: bool) {
        self.fail_sends.store(enabled, Ordering::SeqCst);
    }

    /// Delivers `bytes` as if the receiver had sent them.
    pub fn respond(&self, bytes: Vec<u8>) {
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(bytes);
        }
    }
}

#[async_trait]
impl TransportClient for FakeTransport {
    async fn connect(&self, on_message: MessageHandler) -> Result<(), NetworkError> {
        *self.handler.lock().unwrap() = Some(on_message);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NetworkError> {
        self.handler.lock().unwrap().take();
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, bytes: &[u8]) -> Result<(), NetworkError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(NetworkError::Closed);
        }
        if !self.is_connected() {
            return Err(NetworkError::NotConnected);
        }
        self.sent.lock().unwrap().push(bytes.to_vec());
        if self.auto_ack.load(Ordering::SeqCst) {
            self.respond(ack_for(bytes));
        }
        Ok(())
    }
}

/// Sink that keeps every sample it is given.
#[derive(Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<i32>>,
    batches: Mutex<usize>,
}

impl RecordingSink {
    pub fn samples(&self) -> Vec<i32> {
        self.samples.lock().unwrap().clone()
    }

    /// Number of datagrams delivered.
    pub fn batches(&self) -> usize {
        *self.batches.lock().unwrap()
    }
}

impl SampleSink for RecordingSink {
    fn accept(&self, samples: Samples<'_>) -> Result<(), SinkError> {
        self.samples.lock().unwrap().extend(samples);
        *self.batches.lock().unwrap() += 1;
        Ok(())
    }
}

