//! Sample Sinks
//! ------------
//!
//! Sinks consume the samples decoded from each IQ datagram. They are called
//! synchronously from the data channel's receive task, once per datagram, and
//! must return promptly.

pub mod file;

use std::sync::Arc;

use crate::errors::SinkError;
use crate::messages::Samples;

pub use file::{FileSink, FileSinkConfig};

pub trait SampleSink: Send + Sync {
    /// Consumes the samples of one datagram.
    fn accept(&self, samples: Samples<'_>) -> Result<(), SinkError>;
}

/// Sink configs that can be created from file.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SinkConfig {
    File(FileSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::File(FileSinkConfig::default())
    }
}

impl SinkConfig {
    /// Builds the configured sink.
    ///
    /// # Errors
    /// Returns a [`SinkError`] if the sink's backing resource cannot be opened.
    pub fn build(&self) -> Result<Arc<dyn SampleSink>, SinkError> {
        let sink: Arc<dyn SampleSink> = match self {
            SinkConfig::File(config) => Arc::new(FileSink::new(config.clone())?),
        };
        Ok(sink)
    }
}
