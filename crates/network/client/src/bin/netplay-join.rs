//! Tritt einer Konsole gemäß `client.toml` bei und spielt eine Anzahl Frames
//! mit leeren Eingaben. Useful to fill a seat while testing a host.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use netplay::config::CLIENT_CONFIG_FILE;
use netplay::proto::start_game_response_pb;
use netplay::{ClientNetworkRuntime, N64ButtonCoder, N64Buttons, Session};
use netplay_shared::config::default_config_path;

#[derive(Parser)]
#[command(name = "netplay-join")]
#[command(about = "Join a netplay console from a client config file")]
struct Args {
    /// Config file, defaults to the platform config dir
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to play after the game started
    #[arg(long, default_value_t = 600)]
    frames: i32,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    netplay_shared::logging::init(args.verbose);

    let path = match args.config {
        Some(path) => path,
        None => default_config_path(CLIENT_CONFIG_FILE).context("no config directory")?,
    };
    let runtime = ClientNetworkRuntime::multi_thread()?;
    let mut session = Session::<N64Buttons>::join_from_file(runtime, &path, Arc::new(N64ButtonCoder))
        .with_context(|| format!("joining with {}", path.display()))?;
    println!(
        "console {} ports {:?}",
        session.console_id(),
        session.local_ports()
    );

    if session.created_console() {
        print!("Press enter to start the console...");
        io::stdout().flush()?;
        io::stdin().lock().read_line(&mut String::new())?;
        let status = session.start_game()?;
        if status != start_game_response_pb::Status::Success {
            bail!("failed to start console: {}", status.as_str_name());
        }
    }
    session.wait_for_console_start()?;

    let handler = session.handler_mut();
    let local = handler.local_ports();
    let connected: Vec<_> = local.iter().chain(handler.remote_ports().iter()).copied().collect();
    for frame in 0..args.frames {
        let updates: Vec<_> = local
            .iter()
            .map(|port| (*port, frame, N64Buttons::default()))
            .collect();
        handler.put_buttons(&updates)?;
        for port in &connected {
            handler.get_buttons(*port, frame)?;
        }
    }
    println!("played {} frames", args.frames);
    Ok(())
}
