//! Verbindung zum Server und Anmeldung der lokalen Controller.

use std::future::Future;
use std::sync::Arc;

use netplay_shared::ports::PortExt;
use netplay_shared::proto::net_play_server_service_client::NetPlayServerServiceClient;
use netplay_shared::proto::{plug_controller_response_pb, PlugControllerRequestPb, Port};
use netplay_shared::{ClientId, ConsoleId, DEFAULT_RPC_DEADLINE};
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

use crate::coder::ButtonCoder;
use crate::error::{ClientError, ClientResult};
use crate::event_stream::EventStreamHandler;
use crate::runtime::ClientNetworkRuntime;
use crate::timings::{TimingEvent, Timings, TimingsRecorder};

/// Generated gRPC stub over a tonic channel.
pub type NetplayStub = NetPlayServerServiceClient<Channel>;

/// Connects to `http://<host>:<port>` on the client runtime.
pub fn connect(runtime: &ClientNetworkRuntime, host: &str, port: u16) -> ClientResult<NetplayStub> {
    let endpoint = format!("http://{host}:{port}");
    let channel = Endpoint::from_shared(endpoint.clone())
        .map_err(|source| ClientError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            source,
        })?
        .connect_timeout(DEFAULT_RPC_DEADLINE);
    let channel = runtime
        .block_on(channel.connect())
        .map_err(|source| ClientError::Connect { endpoint, source })?;
    debug!(host, port, "connected to netplay server");
    Ok(NetPlayServerServiceClient::new(channel))
}

/// Wraps a message into a request carrying the default deadline.
pub(crate) fn request_with_deadline<T>(message: T) -> Request<T> {
    let mut request = Request::new(message);
    request.set_timeout(DEFAULT_RPC_DEADLINE);
    request
}

/// Awaits a unary call, failing with `DEADLINE_EXCEEDED` after the default deadline.
pub(crate) async fn call_with_deadline<T>(
    call: impl Future<Output = Result<Response<T>, Status>>,
) -> Result<T, Status> {
    match tokio::time::timeout(DEFAULT_RPC_DEADLINE, call).await {
        Ok(result) => result.map(Response::into_inner),
        Err(_) => Err(Status::deadline_exceeded("netplay rpc deadline exceeded")),
    }
}

/// One emulator instance talking to the server.
pub struct NetplayClient<B> {
    runtime: ClientNetworkRuntime,
    stub: NetplayStub,
    coder: Arc<dyn ButtonCoder<B>>,
    delay_frames: i32,
    console_id: ConsoleId,
    client_id: ClientId,
    local_ports: Vec<Port>,
    rom_file_md5: String,
    timings: TimingsRecorder,
}

impl<B> std::fmt::Debug for NetplayClient<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetplayClient")
            .field("console_id", &self.console_id)
            .field("client_id", &self.client_id)
            .field("delay_frames", &self.delay_frames)
            .field("local_ports", &self.local_ports)
            .finish()
    }
}

impl<B: Default + Clone + Send + 'static> NetplayClient<B> {
    pub fn new(
        runtime: ClientNetworkRuntime,
        stub: NetplayStub,
        coder: Arc<dyn ButtonCoder<B>>,
        delay_frames: i32,
        console_id: ConsoleId,
    ) -> Self {
        Self {
            runtime,
            stub,
            coder,
            delay_frames,
            console_id,
            client_id: ClientId::default(),
            local_ports: Vec::new(),
            rom_file_md5: String::new(),
            timings: TimingsRecorder::default(),
        }
    }

    /// Sends this hash along with the plug request so the server can compare ROMs.
    pub fn with_rom_file_md5(mut self, rom_file_md5: impl Into<String>) -> Self {
        self.rom_file_md5 = rom_file_md5.into();
        self
    }

    /// Requests 1 to 4 ports on the console and returns the server's verdict.
    ///
    /// The RPC succeeding does not mean the ports were granted; check the
    /// returned status. On success the assigned ports become the local ports.
    pub fn plug_controllers(
        &mut self,
        ports: &[Port],
    ) -> ClientResult<plug_controller_response_pb::Status> {
        if ports.is_empty() || ports.len() > netplay_shared::MAX_PORTS {
            error!(count = ports.len(), "invalid number of requested ports");
            return Err(ClientError::InvalidPortCount(ports.len()));
        }

        let mut request = PlugControllerRequestPb {
            console_id: self.console_id.get(),
            delay_frames: self.delay_frames,
            rom_file_md5: self.rom_file_md5.clone(),
            ..Default::default()
        };
        let mut requested = ports.iter().copied();
        let mut next = || requested.next().unwrap_or(Port::Unknown);
        request.set_requested_port_1(next());
        request.set_requested_port_2(next());
        request.set_requested_port_3(next());
        request.set_requested_port_4(next());
        debug!(?request, "requesting controllers");

        let mut stub = self.stub.clone();
        self.timings.record(TimingEvent::PlugControllerRequest);
        let response = self.runtime.block_on(call_with_deadline(
            stub.plug_controller(request_with_deadline(request)),
        ));
        self.timings.record(TimingEvent::PlugControllerResponse);
        let response = response.inspect_err(|status| error!(%status, "plug controller rpc failed"))?;
        debug!(?response, "plug controller response");

        if response.console_id != self.console_id.get() {
            return Err(ClientError::ConsoleMismatch {
                expected: self.console_id.get(),
                actual: response.console_id,
            });
        }

        self.client_id = ClientId::new(response.client_id);
        self.local_ports = response
            .port
            .iter()
            .map(|raw| Port::from_wire(*raw))
            .collect();
        let status = response.status();
        info!(
            console = %self.console_id,
            client = %self.client_id,
            ports = ?self.local_ports,
            ?status,
            "plug controllers finished"
        );
        Ok(status)
    }

    /// Creates the handler for this client's event stream.
    pub fn make_event_stream_handler(&self) -> ClientResult<EventStreamHandler<B>> {
        if !self.console_id.is_valid() || !self.client_id.is_valid() {
            return Err(ClientError::NotPlugged);
        }
        EventStreamHandler::new(
            self.console_id,
            self.client_id,
            &self.local_ports,
            self.timings.clone(),
            Arc::clone(&self.coder),
            self.stub.clone(),
            self.runtime.clone(),
        )
    }

    pub fn delay_frames(&self) -> i32 {
        self.delay_frames
    }

    pub fn console_id(&self) -> ConsoleId {
        self.console_id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn local_ports(&self) -> &[Port] {
        &self.local_ports
    }

    /// Timings recorded by this client and every handler it created.
    pub fn timings(&self) -> Timings {
        self.timings.snapshot()
    }

    pub fn stub(&self) -> &NetplayStub {
        &self.stub
    }

    pub fn runtime(&self) -> &ClientNetworkRuntime {
        &self.runtime
    }
}
