//! gRPC-Implementierung von `NetPlayServerService`.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use netplay_shared::proto::net_play_server_service_server::NetPlayServerService;
use netplay_shared::proto::{
    invalid_data_pb, make_console_response_pb, plug_controller_response_pb,
    start_game_response_pb, ClientReadyPb, IncomingEventPb, MakeConsoleRequestPb,
    MakeConsoleResponsePb, OutgoingEventPb, PingPb, PlugControllerRequestPb,
    PlugControllerResponsePb, Port, ShutDownServerRequestPb, ShutDownServerResponsePb,
    StartGameRequestPb, StartGameResponsePb,
};
use netplay_shared::{ClientId, ConsoleId};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};

use crate::client::{invalid_data, EventSink, EVENT_BUFFER};
use crate::console::{invalid_event, ConsoleStatus, PlugError};
use crate::registry::{lock, ConsoleRegistry, SharedConsole};

/// Trigger shared between the service and the [`crate::ServerHandle`].
pub type ShutdownTrigger = Arc<watch::Sender<bool>>;

#[derive(Debug, Clone)]
pub struct NetplayService {
    registry: Arc<ConsoleRegistry>,
    test_mode: bool,
    shutdown: ShutdownTrigger,
}

impl NetplayService {
    pub fn new(registry: Arc<ConsoleRegistry>, test_mode: bool, shutdown: ShutdownTrigger) -> Self {
        Self {
            registry,
            test_mode,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<ConsoleRegistry> {
        &self.registry
    }
}

fn requested_ports(request: &PlugControllerRequestPb) -> [Port; 4] {
    [
        request.requested_port_1(),
        request.requested_port_2(),
        request.requested_port_3(),
        request.requested_port_4(),
    ]
}

#[tonic::async_trait]
impl NetPlayServerService for NetplayService {
    async fn ping(&self, request: Request<PingPb>) -> Result<Response<PingPb>, Status> {
        Ok(Response::new(request.into_inner()))
    }

    async fn make_console(
        &self,
        request: Request<MakeConsoleRequestPb>,
    ) -> Result<Response<MakeConsoleResponsePb>, Status> {
        let request = request.into_inner();
        let mut response = MakeConsoleResponsePb::default();
        match self.registry.create_console(
            &request.console_title,
            &request.rom_name,
            &request.rom_file_md5,
        ) {
            Some(id) => {
                response.set_status(make_console_response_pb::Status::Success);
                response.console_id = id.get();
            }
            None => {
                warn!(title = %request.console_title, "console limit reached");
                response.set_status(make_console_response_pb::Status::UnspecifiedFailure);
            }
        }
        Ok(Response::new(response))
    }

    async fn plug_controller(
        &self,
        request: Request<PlugControllerRequestPb>,
    ) -> Result<Response<PlugControllerResponsePb>, Status> {
        use plug_controller_response_pb::Status as PlugStatus;

        let request = request.into_inner();
        let mut response = PlugControllerResponsePb {
            console_id: request.console_id,
            ..Default::default()
        };

        let Some(console) = self.registry.get(ConsoleId::new(request.console_id)) else {
            debug!(console = request.console_id, "plug request for unknown console");
            response.set_status(PlugStatus::UnspecifiedFailure);
            return Ok(Response::new(response));
        };

        let result = lock(&console).try_add_players(
            request.delay_frames,
            &requested_ports(&request),
            &request.rom_file_md5,
        );
        match result {
            Ok(plugged) => {
                response.set_status(PlugStatus::Success);
                response.client_id = plugged.client_id.get();
                for port in plugged.ports {
                    response.push_port(port);
                }
            }
            Err(PlugError::RomMismatch { .. }) => response.set_status(PlugStatus::RomMd5Mismatch),
            Err(PlugError::NoPortsRequested) => response.set_status(PlugStatus::NoPortsRequested),
            Err(PlugError::Rejected(entries)) => {
                response.set_status(PlugStatus::PortRequestRejected);
                response.port_rejections = entries;
            }
            Err(err @ PlugError::ConsoleStarted(_)) => {
                debug!(%err, "plug request refused");
                response.set_status(PlugStatus::UnspecifiedFailure);
            }
        }
        Ok(Response::new(response))
    }

    async fn start_game(
        &self,
        request: Request<StartGameRequestPb>,
    ) -> Result<Response<StartGameResponsePb>, Status> {
        let request = request.into_inner();
        let mut response = StartGameResponsePb {
            console_id: request.console_id,
            ..Default::default()
        };
        let started = match self.registry.get(ConsoleId::new(request.console_id)) {
            Some(console) => lock(&console)
                .start_game()
                .map_err(|err| debug!(%err, "start game refused"))
                .is_ok(),
            None => false,
        };
        response.set_status(if started {
            start_game_response_pb::Status::Success
        } else {
            start_game_response_pb::Status::UnspecifiedFailure
        });
        Ok(Response::new(response))
    }

    type SendEventStream = Pin<Box<dyn Stream<Item = Result<IncomingEventPb, Status>> + Send>>;

    async fn send_event(
        &self,
        request: Request<Streaming<OutgoingEventPb>>,
    ) -> Result<Response<Self::SendEventStream>, Status> {
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(pump_event_stream(Arc::clone(&self.registry), inbound, tx));
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn shut_down_server(
        &self,
        _request: Request<ShutDownServerRequestPb>,
    ) -> Result<Response<ShutDownServerResponsePb>, Status> {
        if !self.test_mode {
            warn!("shutdown requested outside of test mode, ignoring");
            return Ok(Response::new(ShutDownServerResponsePb {
                server_will_die: false,
            }));
        }
        info!("shutdown requested");
        self.registry.stop_all("server shutting down");
        self.shutdown.send_replace(true);
        Ok(Response::new(ShutDownServerResponsePb {
            server_will_die: true,
        }))
    }
}

struct Binding {
    console: SharedConsole,
    client_id: ClientId,
}

/// Reads one `SendEvent` stream until it ends.
///
/// The stream stays anonymous until a valid `ClientReadyPB` arrives; from then
/// on the outbound sink lives in the client and every event goes to the console.
async fn pump_event_stream(
    registry: Arc<ConsoleRegistry>,
    mut inbound: Streaming<OutgoingEventPb>,
    sink: EventSink,
) {
    let mut sink = Some(sink);
    let mut binding: Option<Binding> = None;

    loop {
        let event = match inbound.message().await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(status) => {
                warn!(%status, "event stream failed");
                break;
            }
        };

        if let Some(bound) = &binding {
            lock(&bound.console).handle_event(bound.client_id, event);
            continue;
        }

        let Some(ready) = event.client_ready.clone() else {
            reply_anonymous(&sink, 0, invalid_data_pb::Status::ClientNotReady);
            continue;
        };
        match try_bind(&registry, &ready, &mut sink) {
            Ok(bound) => {
                lock(&bound.console).handle_event(bound.client_id, event);
                binding = Some(bound);
            }
            Err(status) => reply_anonymous(&sink, ready.console_id, status),
        }
    }

    if let Some(bound) = binding {
        debug!(client = %bound.client_id, "event stream closed");
        let finished = {
            let mut console = lock(&bound.console);
            console.on_stream_closed(bound.client_id);
            console.status() == ConsoleStatus::Done
        };
        if finished {
            registry.remove_finished();
        }
    }
}

fn try_bind(
    registry: &ConsoleRegistry,
    ready: &ClientReadyPb,
    sink: &mut Option<EventSink>,
) -> Result<Binding, invalid_data_pb::Status> {
    let console = registry
        .get(ConsoleId::new(ready.console_id))
        .ok_or(invalid_data_pb::Status::InvalidConsole)?;
    let client_id = ClientId::new(ready.client_id);
    let Some(tx) = sink.take() else {
        return Err(invalid_data_pb::Status::InvalidClient);
    };
    if let Err(tx) = lock(&console).bind_stream(client_id, tx) {
        *sink = Some(tx);
        return Err(invalid_data_pb::Status::InvalidClient);
    }
    info!(console = ready.console_id, client = %client_id, "client ready");
    Ok(Binding { console, client_id })
}

fn reply_anonymous(sink: &Option<EventSink>, console_id: i64, status: invalid_data_pb::Status) {
    debug!(console = console_id, ?status, "rejecting event on anonymous stream");
    if let Some(sink) = sink {
        let _ = sink.try_send(Ok(invalid_event(invalid_data(console_id, Port::Unknown, status))));
    }
}
