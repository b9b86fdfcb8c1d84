use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use netplay_server::settings::SERVER_CONFIG_FILE;
use netplay_server::{start_server, ServerConfig};
use netplay_shared::config::default_config_path;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "netplay-server")]
#[command(about = "Netplay server - relays controller input between emulators")]
struct Args {
    /// Port to listen on [default: 10001]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Allow remote shutdown and limit the number of consoles
    #[arg(long)]
    test_mode: bool,

    /// Server configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More output per occurrence (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match self
            .config
            .clone()
            .or_else(|| default_config_path(SERVER_CONFIG_FILE))
        {
            Some(path) => ServerConfig::load(&path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        config.test_mode |= self.test_mode;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    netplay_shared::logging::init(args.verbose.max(1));

    let config = args.server_config()?;
    let handle = start_server(config).await?;
    info!("listening on {}, press Ctrl+C to stop", handle.local_addr());

    let mut stopped = handle.stopped();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted, shutting down");
            handle.shutdown();
        }
        _ = stopped.wait_for(|stop| *stop) => info!("shutdown requested by client"),
    }

    // Graceful shutdown waits for open streams; don't hang on them.
    match tokio::time::timeout(SHUTDOWN_GRACE, handle.wait()).await {
        Ok(result) => result?,
        Err(_) => warn!("server did not stop within {:?}", SHUTDOWN_GRACE),
    }
    Ok(())
}
