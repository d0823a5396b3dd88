use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use clap::Parser;
use log::{error, info};
use presence_relay::{init_logging, run, RunOptions};
use presence_relay::error::{AppRunError, ConfigError};

/// Relays presence and gesture events from a serial sensor and turns the display off while
/// nobody is around.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device to open, skips device discovery
    #[arg(long)]
    device: Option<String>,

    /// How long nobody has to be present before the display is turned off (e.g. "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    debounce: Option<Duration>,

    /// Address to relay events to subscribers on (e.g. "127.0.0.1:8765")
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    info!(concat!("presence-relay ", env!("CARGO_PKG_VERSION")));

    let options = RunOptions {
        config_path: args.config,
        device: args.device,
        debounce: args.debounce,
        listen: args.listen,
    };

    match run(options).await {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("This application has already been started");
            ExitCode::FAILURE
        },
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        },
        Ok(()) => ExitCode::SUCCESS,
    }
}
