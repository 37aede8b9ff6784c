use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use log::trace;

use crate::errors::SinkError;
use crate::messages::Samples;
use crate::sinks::SampleSink;

const DEFAULT_SAMPLES_PATH: &str = "samples.bin";

/// Configuration for the binary file sink.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct FileSinkConfig {
    /// Path to the output file. Existing contents are kept; samples are appended.
    pub path: PathBuf,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_SAMPLES_PATH),
        }
    }
}

/// Appends every sample as a 16 bit little-endian integer.
///
/// Samples wider than 16 bits are truncated to their low 16 bits.
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Opens (or creates) the output file in append mode.
    ///
    /// # Errors
    /// Returns `SinkError::Io` if the file cannot be opened.
    pub fn new(config: FileSinkConfig) -> Result<Self, SinkError> {
        trace!("Creating sample file sink (file: {})", config.path.display());
        let file = OpenOptions::new().create(true).append(true).open(&config.path)?;
        Ok(FileSink {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl SampleSink for FileSink {
    fn accept(&self, samples: Samples<'_>) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        for sample in samples {
            writer.write_all(&(sample as i16).to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::messages::extract_samples;
    use crate::sinks::SinkConfig;

    #[test]
    fn test_appends_samples_as_i16() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.bin");
        let sink = FileSink::new(FileSinkConfig { path: path.clone() }).unwrap();

        sink.accept(extract_samples(16, &[0x10, 0x00, 0x20, 0x00]).unwrap()).unwrap();
        sink.accept(extract_samples(24, &[0x34, 0x12, 0x7F]).unwrap()).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0x10, 0x00, 0x20, 0x00, 0x34, 0x12]);
    }

    #[test]
    fn test_keeps_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.bin");
        std::fs::write(&path, [0xAA, 0xBB]).unwrap();

        let sink = SinkConfig::File(FileSinkConfig { path: path.clone() }).build().unwrap();
        sink.accept(extract_samples(8, &[0x01]).unwrap()).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0xAA, 0xBB, 0x01, 0x00]);
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempdir().unwrap();
        let result = FileSink::new(FileSinkConfig {
            path: dir.path().join("missing").join("samples.bin"),
        });
        assert!(matches!(result, Err(SinkError::Io(_))));
    }
}
