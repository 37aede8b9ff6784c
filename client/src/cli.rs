use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;
use netsdr::config::{ClientConfig, FromYaml};
use netsdr::errors::AppError;
use simplelog::LevelFilter;

/// Connects to a NetSDR receiver, streams IQ samples for a while and writes them to the configured sink
#[derive(FromArgs)]
pub struct Args {
    /// path to a YAML client config (defaults are used when omitted)
    #[argh(option)]
    pub config: Option<PathBuf>,

    /// receiver address, overrides the config file
    #[argh(option)]
    pub addr: Option<IpAddr>,

    /// receiver control port, overrides the config file
    #[argh(option)]
    pub port: Option<u16>,

    /// local port for IQ datagrams, overrides the config file
    #[argh(option)]
    pub data_port: Option<u16>,

    /// log level to use for terminal logging
    #[argh(option, default = "LevelFilter::Info")]
    pub level: LevelFilter,

    /// frequency in Hz to tune channel 0 to before streaming
    #[argh(option)]
    pub frequency: Option<u64>,

    /// seconds to stream before stopping (default: 5)
    #[argh(option, default = "5")]
    pub duration: u64,
}

impl Args {
    /// Loads the config file, if any, and applies the command line overrides on top.
    pub fn client_config(&self) -> Result<ClientConfig, AppError> {
        let config = match &self.config {
            Some(path) => ClientConfig::from_yaml(path)?,
            None => ClientConfig::default(),
        };
        let config = self.overlay(config);
        config.validate()?;
        Ok(config)
    }

    pub fn overlay(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(addr) = self.addr {
            config.host = addr;
        }
        if let Some(port) = self.port {
            config.control_port = port;
        }
        if let Some(data_port) = self.data_port {
            config.data_port = data_port;
        }
        config
    }

    pub fn stream_duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }
}
