//! Beitritt zu einer Konsole anhand der Client-Konfiguration.
//!
//! A session runs the bootstrap an emulator front end performs once per game:
//! connect, create a console when none is configured, plug the configured
//! ports and announce the client as ready. The client that created the
//! console is the host and starts the game once everybody joined.

use std::path::Path;
use std::sync::Arc;

use netplay_shared::proto::{
    make_console_response_pb, plug_controller_response_pb, start_game_response_pb, Port,
};
use netplay_shared::ConsoleId;
use tracing::{error, info};

use crate::client::{connect, NetplayClient};
use crate::coder::ButtonCoder;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::event_stream::EventStreamHandler;
use crate::host;
use crate::runtime::ClientNetworkRuntime;

/// Title used for consoles created by [`Session::join`].
pub const SESSION_CONSOLE_TITLE: &str = "netplay-session";

pub struct Session<B> {
    client: NetplayClient<B>,
    handler: EventStreamHandler<B>,
    created_console: bool,
}

impl<B> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client", &self.client)
            .field("created_console", &self.created_console)
            .finish()
    }
}

impl<B: Default + Clone + Send + 'static> Session<B> {
    /// Loads the config file at `path` and joins with it.
    pub fn join_from_file(
        runtime: ClientNetworkRuntime,
        path: &Path,
        coder: Arc<dyn ButtonCoder<B>>,
    ) -> ClientResult<Self> {
        let config = ClientConfig::load(path)?;
        Self::join(runtime, &config, coder)
    }

    /// Connects, plugs the configured ports and sends `ClientReady`.
    ///
    /// Does not wait for the game to start; hosts call
    /// [`Session::start_game`] first, then everybody calls
    /// [`Session::wait_for_console_start`].
    pub fn join(
        runtime: ClientNetworkRuntime,
        config: &ClientConfig,
        coder: Arc<dyn ButtonCoder<B>>,
    ) -> ClientResult<Self> {
        if !config.enabled {
            info!("netplay disabled in config");
            return Err(ClientError::Disabled);
        }
        let requested = config.requested_ports();
        if requested.is_empty() || requested.len() > netplay_shared::MAX_PORTS {
            return Err(ClientError::InvalidPortCount(requested.len()));
        }

        let stub = connect(&runtime, &config.server_hostname, config.server_port)?;
        let (console_id, created_console) = match config.console_id {
            Some(id) if id > 0 => (ConsoleId::new(id), false),
            Some(id) => return Err(ClientError::InvalidConsoleId(id)),
            None => {
                let (status, console_id) = host::make_console(
                    &runtime,
                    &stub,
                    SESSION_CONSOLE_TITLE,
                    "",
                    &config.rom_file_md5,
                )?;
                let console_id = console_id.ok_or(ClientError::MakeConsoleFailed(status))?;
                info!(console = %console_id, "created console");
                (console_id, true)
            }
        };

        let mut client = NetplayClient::new(runtime, stub, coder, config.delay_frames, console_id)
            .with_rom_file_md5(config.rom_file_md5.clone());
        let status = client.plug_controllers(&requested)?;
        if status != plug_controller_response_pb::Status::Success {
            error!(?status, console = %console_id, "controllers were not plugged");
            return Err(ClientError::PlugRejected(status));
        }

        let mut handler = client.make_event_stream_handler()?;
        handler.client_ready()?;
        Ok(Self {
            client,
            handler,
            created_console,
        })
    }

    /// Starts the game. Only meaningful for the host; fails on the server
    /// while some client is not ready yet.
    pub fn start_game(&self) -> ClientResult<start_game_response_pb::Status> {
        host::start_game(self.client.runtime(), self.client.stub(), self.console_id())
    }

    pub fn wait_for_console_start(&mut self) -> ClientResult<()> {
        self.handler.wait_for_console_start()
    }

    pub fn created_console(&self) -> bool {
        self.created_console
    }

    pub fn console_id(&self) -> ConsoleId {
        self.client.console_id()
    }

    pub fn local_ports(&self) -> &[Port] {
        self.client.local_ports()
    }

    pub fn client(&self) -> &NetplayClient<B> {
        &self.client
    }

    pub fn handler(&self) -> &EventStreamHandler<B> {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut EventStreamHandler<B> {
        &mut self.handler
    }

    pub fn into_parts(self) -> (NetplayClient<B>, EventStreamHandler<B>) {
        (self.client, self.handler)
    }
}
