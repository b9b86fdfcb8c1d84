//! Startet das Spiel auf einer Konsole.

use anyhow::{bail, Result};
use clap::Parser;
use netplay::proto::start_game_response_pb;
use netplay::{connect, host, ClientNetworkRuntime, ConsoleId};

#[derive(Parser)]
#[command(name = "start-game")]
#[command(about = "Start the game on a netplay console")]
struct Args {
    /// Server hostname
    host: String,
    /// Server port
    port: u16,
    /// Console to start
    console_id: i64,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    netplay_shared::logging::init(args.verbose);

    let runtime = ClientNetworkRuntime::multi_thread()?;
    let stub = connect(&runtime, &args.host, args.port)?;
    let status = host::start_game(&runtime, &stub, ConsoleId::new(args.console_id))?;
    if status != start_game_response_pb::Status::Success {
        bail!(
            "failed to start console {}: {}",
            args.console_id,
            status.as_str_name()
        );
    }
    println!("started console {}", args.console_id);
    Ok(())
}
