//! Legt eine Konsole auf dem Server an und gibt ihre ID aus.

use anyhow::{bail, Result};
use clap::Parser;
use netplay::proto::make_console_response_pb;
use netplay::{connect, host, ClientNetworkRuntime};

#[derive(Parser)]
#[command(name = "mkconsole")]
#[command(about = "Create a netplay console and print its id")]
struct Args {
    /// Server hostname
    host: String,
    /// Server port
    port: u16,

    #[arg(long, default_value = "Netplay")]
    title: String,

    #[arg(long, default_value = "")]
    rom_name: String,

    /// Clients must present the same ROM hash when set
    #[arg(long, default_value = "")]
    rom_md5: String,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    netplay_shared::logging::init(args.verbose);

    let runtime = ClientNetworkRuntime::multi_thread()?;
    let stub = connect(&runtime, &args.host, args.port)?;
    let (status, console_id) =
        host::make_console(&runtime, &stub, &args.title, &args.rom_name, &args.rom_md5)?;

    match (status, console_id) {
        (make_console_response_pb::Status::Success, Some(console_id)) => {
            println!("{console_id}");
            Ok(())
        }
        (status, _) => bail!("failed to create console: {}", status.as_str_name()),
    }
}
