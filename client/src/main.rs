//! # NetSDR Client Entry Point
//!
//! Parses the command line, initializes logging and runs one scripted receiver
//! session: connect, optionally tune, stream IQ samples into the configured
//! sink for `--duration` seconds (or until Ctrl-C), then shut down cleanly.

mod cli;

use std::fs::File;
use std::sync::Arc;

use cli::Args;
use log::*;
use netsdr::config::ClientConfig;
use netsdr::errors::AppError;
use netsdr::network::tcp::client::TcpTransport;
use netsdr::network::udp::UdpListener;
use netsdr::session::NetSdrClient;
use simplelog::{ColorChoice, CombinedLogger, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use tokio::runtime::Builder;

const LOG_FILE: &str = "netsdr-client.log";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = argh::from_env();

    CombinedLogger::init(vec![
        TermLogger::new(
            args.level,
            simplelog::ConfigBuilder::new().build(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Error,
            simplelog::ConfigBuilder::new()
                .set_location_level(LevelFilter::Error)
                .build(),
            File::create(LOG_FILE)?,
        ),
    ])?;
    debug!("Parsed args and initialized CombinedLogger");

    let config = args.client_config()?;
    let runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(run(config, &args))?;
    Ok(())
}

async fn run(config: ClientConfig, args: &Args) -> Result<(), AppError> {
    let transport = Arc::new(TcpTransport::with_timeout(config.control_addr(), config.connect_timeout()));
    let listener = Arc::new(UdpListener::new(config.data_listener()));
    info!(
        "Connecting to receiver at {}, IQ data on {}",
        transport.target_addr(),
        listener.config().bind_addr
    );
    let sink = config.sink.build()?;
    let client = NetSdrClient::new(transport, listener, sink, config.session());

    let result = stream(&client, args).await;
    client.disconnect().await;
    result
}

async fn stream(client: &NetSdrClient, args: &Args) -> Result<(), AppError> {
    client.connect().await?;
    if let Some(hz) = args.frequency {
        client.change_frequency(hz, 0).await?;
        info!("Tuned to {hz} Hz");
    }

    client.start_iq().await?;
    tokio::select! {
        _ = tokio::time::sleep(args.stream_duration()) => {
            debug!("Streaming duration elapsed");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Interrupted, stopping");
        }
    }
    client.stop_iq().await?;
    Ok(())
}
