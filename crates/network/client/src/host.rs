//! Hilfsfunktionen für den Host: Konsole anlegen und Spiel starten.

use netplay_shared::proto::{
    make_console_response_pb, start_game_response_pb, MakeConsoleRequestPb, PingPb,
    ShutDownServerRequestPb, StartGameRequestPb,
};
use netplay_shared::ConsoleId;
use tracing::{debug, error};

use crate::client::{call_with_deadline, request_with_deadline, NetplayStub};
use crate::error::ClientResult;
use crate::runtime::ClientNetworkRuntime;

/// Asks the server for a new console. The id is only set on `SUCCESS`.
pub fn make_console(
    runtime: &ClientNetworkRuntime,
    stub: &NetplayStub,
    console_title: &str,
    rom_name: &str,
    rom_file_md5: &str,
) -> ClientResult<(make_console_response_pb::Status, Option<ConsoleId>)> {
    let request = MakeConsoleRequestPb {
        console_title: console_title.to_owned(),
        rom_name: rom_name.to_owned(),
        rom_file_md5: rom_file_md5.to_owned(),
    };
    debug!(?request, "creating console");
    let mut stub = stub.clone();
    let response = runtime
        .block_on(call_with_deadline(stub.make_console(request_with_deadline(request))))
        .inspect_err(|status| error!(%status, "make console rpc failed"))?;
    debug!(?response, "console creation response");

    let status = response.status();
    let console_id =
        (status == make_console_response_pb::Status::Success).then(|| ConsoleId::new(response.console_id));
    Ok((status, console_id))
}

/// Starts the game on `console_id`. Fails on the server unless every client is ready.
pub fn start_game(
    runtime: &ClientNetworkRuntime,
    stub: &NetplayStub,
    console_id: ConsoleId,
) -> ClientResult<start_game_response_pb::Status> {
    let request = StartGameRequestPb {
        console_id: console_id.get(),
    };
    debug!(?request, "starting game");
    let mut stub = stub.clone();
    let response = runtime
        .block_on(call_with_deadline(stub.start_game(request_with_deadline(request))))
        .inspect_err(|status| error!(%status, "start game rpc failed"))?;
    debug!(?response, "start game response");
    Ok(response.status())
}

pub fn ping(runtime: &ClientNetworkRuntime, stub: &NetplayStub) -> ClientResult<()> {
    let mut stub = stub.clone();
    runtime.block_on(call_with_deadline(stub.ping(request_with_deadline(PingPb {}))))?;
    Ok(())
}

/// Returns whether the server agreed to shut down (test mode only).
pub fn shut_down_server(runtime: &ClientNetworkRuntime, stub: &NetplayStub) -> ClientResult<bool> {
    let mut stub = stub.clone();
    let response = runtime.block_on(call_with_deadline(
        stub.shut_down_server(request_with_deadline(ShutDownServerRequestPb {})),
    ))?;
    Ok(response.server_will_die)
}
