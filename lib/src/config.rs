//! Client configuration, loaded from YAML.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::AppError;
use crate::network::udp::UdpListenerConfig;
use crate::session::{DEFAULT_RESPONSE_TIMEOUT, DEFAULT_SAMPLE_BITS, SessionConfig};
use crate::sinks::SinkConfig;

pub const DEFAULT_CONTROL_PORT: u16 = 50000;
pub const DEFAULT_DATA_PORT: u16 = 60000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// A trait for parsing a YAML file into a struct using Serde.
///
/// # Errors
/// Returns an [`AppError`] if the file cannot be read or if deserialization fails.
///
/// # Example
/// ```rust,ignore
/// let config = ClientConfig::from_yaml("netsdr.yaml")?;
/// ```
pub trait FromYaml: Sized + for<'de> Deserialize<'de> {
    fn from_yaml(file: impl AsRef<Path>) -> Result<Self, AppError> {
        let yaml = std::fs::read_to_string(file.as_ref())?;
        Ok(serde_yaml::from_str(&yaml)?)
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Receiver address.
    pub host: IpAddr,
    /// TCP port of the control channel.
    pub control_port: u16,
    /// Local UDP port the data channel listens on.
    pub data_port: u16,
    /// Width of one IQ sample on the data channel, agreed out of band.
    pub sample_bits: u16,
    pub response_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub sink: SinkConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            control_port: DEFAULT_CONTROL_PORT,
            data_port: DEFAULT_DATA_PORT,
            sample_bits: DEFAULT_SAMPLE_BITS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            sink: SinkConfig::default(),
        }
    }
}

impl FromYaml for ClientConfig {}

impl ClientConfig {
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.control_port)
    }

    pub fn data_listener(&self) -> UdpListenerConfig {
        UdpListenerConfig {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.data_port),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            sample_bits: self.sample_bits,
            response_timeout: Duration::from_millis(self.response_timeout_ms),
        }
    }

    /// Rejects values the session could never work with.
    ///
    /// # Errors
    /// Returns [`AppError::ConfigError`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), AppError> {
        if !(8..=39).contains(&self.sample_bits) {
            return Err(AppError::ConfigError(format!(
                "sample_bits must describe 1 to 4 bytes, got {}",
                self.sample_bits
            )));
        }
        if self.response_timeout_ms == 0 {
            return Err(AppError::ConfigError("response_timeout_ms must be positive".to_string()));
        }
        if self.control_port == 0 {
            return Err(AppError::ConfigError("control_port must be set".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;
    use crate::sinks::FileSinkConfig;

    #[test]
    fn test_from_yaml_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("netsdr.yaml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            r#"
host: 192.168.1.20
control_port: 50001
sample_bits: 24
sink:
  type: File
  path: capture.bin
"#
        )
        .unwrap();

        let config = ClientConfig::from_yaml(&file_path).unwrap();
        assert_eq!(config.control_addr(), "192.168.1.20:50001".parse().unwrap());
        assert_eq!(config.sample_bits, 24);
        assert_eq!(config.data_port, DEFAULT_DATA_PORT);
        assert_eq!(
            config.sink,
            SinkConfig::File(FileSinkConfig {
                path: PathBuf::from("capture.bin")
            })
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("empty.yaml");
        std::fs::write(&file_path, "{}").unwrap();

        let config = ClientConfig::from_yaml(&file_path).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.session(), SessionConfig::default());
    }

    #[test]
    fn test_from_yaml_file_not_found() {
        let result = ClientConfig::from_yaml("non_existent_file.yaml");
        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[test]
    fn test_from_yaml_malformed_content() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("malformed.yaml");
        std::fs::write(&file_path, "control_port: not_a_port").unwrap();

        assert!(matches!(ClientConfig::from_yaml(&file_path), Err(AppError::YamlError(_))));
    }

    #[test]
    fn test_validate_rejects_wide_samples() {
        let config = ClientConfig {
            sample_bits: 64,
            ..ClientConfig::default()
        };
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }
}
