//! Synchroner Treiber für den bidirektionalen `SendEvent`-Stream.
//!
//! The handler owns one input queue per connected port. Local input goes into
//! the local queues and, shifted by the port's delay, to the server. Remote
//! input is pulled from the stream whenever the emulator asks for a frame the
//! remote queue does not have yet.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use netplay_shared::ports::PortExt;
use netplay_shared::proto::start_game_pb::ConnectedPortPb;
use netplay_shared::proto::{ClientReadyPb, IncomingEventPb, KeyStatePb, OutgoingEventPb, Port};
use netplay_shared::{ClientId, ConsoleId, MAX_PORTS};
use prost::Message;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Status, Streaming};
use tracing::{debug, error, trace};

use crate::client::NetplayStub;
use crate::coder::ButtonCoder;
use crate::error::{ClientError, ClientResult, GetButtonsError, PutButtonsError};
use crate::input_queue::{InputQueue, QueueError, Timeout};
use crate::runtime::ClientNetworkRuntime;
use crate::timings::{TimingEvent, Timings, TimingsRecorder};

/// How long a remote read waits after the frame was seen on the stream.
const REMOTE_READ_TIMEOUT: Duration = Duration::from_secs(5);

const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    NotYetStarted,
    ConsoleRunning,
    ConsoleTerminated,
}

struct OpenStream {
    outbound: mpsc::Sender<OutgoingEventPb>,
    inbound: Streaming<IncomingEventPb>,
}

pub struct EventStreamHandler<B> {
    console_id: ConsoleId,
    client_id: ClientId,
    local_ports: BTreeSet<Port>,
    timings: TimingsRecorder,
    coder: Arc<dyn ButtonCoder<B>>,
    stub: NetplayStub,
    runtime: ClientNetworkRuntime,
    stream: Option<OpenStream>,
    queues: BTreeMap<Port, InputQueue<B>>,
    status: HandlerStatus,
}

impl<B> std::fmt::Debug for EventStreamHandler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamHandler")
            .field("console_id", &self.console_id)
            .field("client_id", &self.client_id)
            .field("local_ports", &self.local_ports)
            .field("connected_ports", &self.queues.keys().collect::<Vec<_>>())
            .field("status", &self.status)
            .finish()
    }
}

impl<B: Default + Clone + Send + 'static> EventStreamHandler<B> {
    pub fn new(
        console_id: ConsoleId,
        client_id: ClientId,
        local_ports: &[Port],
        timings: TimingsRecorder,
        coder: Arc<dyn ButtonCoder<B>>,
        stub: NetplayStub,
        runtime: ClientNetworkRuntime,
    ) -> ClientResult<Self> {
        if !console_id.is_valid() {
            return Err(ClientError::InvalidHandler(format!("invalid console id {console_id}")));
        }
        if !client_id.is_valid() {
            return Err(ClientError::InvalidHandler(format!("invalid client id {client_id}")));
        }
        if local_ports.len() > MAX_PORTS {
            return Err(ClientError::InvalidHandler(format!(
                "too many local ports: {}",
                local_ports.len()
            )));
        }
        let unique: BTreeSet<Port> = local_ports.iter().copied().collect();
        if unique.len() != local_ports.len() {
            return Err(ClientError::InvalidHandler("duplicate local ports".into()));
        }
        if unique.contains(&Port::PortAny) {
            return Err(ClientError::InvalidHandler("local ports contain PORT_ANY".into()));
        }

        Ok(Self {
            console_id,
            client_id,
            local_ports: unique,
            timings,
            coder,
            stub,
            runtime,
            stream: None,
            queues: BTreeMap::new(),
            status: HandlerStatus::NotYetStarted,
        })
    }

    pub fn status(&self) -> HandlerStatus {
        self.status
    }

    /// Opens the stream and announces this client as ready.
    ///
    /// Hosts call this before `StartGame` so the server sees every client
    /// ready, then block in [`EventStreamHandler::wait_for_console_start`].
    pub fn client_ready(&mut self) -> ClientResult<()> {
        let (outbound, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let mut stub = self.stub.clone();
        let inbound = self
            .runtime
            .block_on(stub.send_event(ReceiverStream::new(rx)))?
            .into_inner();
        self.stream = Some(OpenStream { outbound, inbound });

        let event = OutgoingEventPb {
            client_ready: Some(ClientReadyPb {
                console_id: self.console_id.get(),
                client_id: self.client_id.get(),
            }),
            ..Default::default()
        };
        debug!(?event, "writing client ready");
        self.timings.record(TimingEvent::ClientReadyWriteStart);
        let written = self.write(event);
        self.timings.record(TimingEvent::ClientReadyWriteFinish);
        written.map_err(|reason| {
            error!(%reason, "failed to write client ready");
            ClientError::Rpc(Status::unavailable(reason))
        })
    }

    /// Reads the start event and sets up one queue per connected port.
    pub fn wait_for_console_start(&mut self) -> ClientResult<()> {
        if self.stream.is_none() {
            return Err(ClientError::StreamNotOpen);
        }
        debug!("expecting start game notification");
        self.timings.record(TimingEvent::StartGameReadStart);
        let event = self.read();
        self.timings.record(TimingEvent::StartGameReadFinish);
        let event = event?;
        debug!(?event, "received start game notification");

        if event.stop_console.is_some() {
            self.status = HandlerStatus::ConsoleTerminated;
            return Err(ClientError::ConsoleStopped);
        }
        let Some(start_game) = event.start_game else {
            return Err(ClientError::UnexpectedStartEvent(format!("{event:?}")));
        };
        if start_game.console_id <= 0 || start_game.console_id != self.console_id.get() {
            return Err(ClientError::UnexpectedStartEvent(format!(
                "server returned console id {}",
                start_game.console_id
            )));
        }

        if let Err(err) = self.initialize_queues(&start_game.connected_ports) {
            self.queues.clear();
            return Err(err);
        }
        self.status = HandlerStatus::ConsoleRunning;
        Ok(())
    }

    pub fn ready_and_wait_for_console_start(&mut self) -> ClientResult<()> {
        self.client_ready()?;
        self.wait_for_console_start()
    }

    fn initialize_queues(&mut self, ports: &[ConnectedPortPb]) -> ClientResult<()> {
        if ports.len() > MAX_PORTS {
            return Err(ClientError::UnexpectedStartEvent(format!(
                "too many connected ports: {}",
                ports.len()
            )));
        }
        for connected in ports {
            let port = Port::from_wire(connected.port);
            if !port.is_controller_port() {
                return Err(ClientError::UnexpectedStartEvent(format!(
                    "unexpected connected port {port:?}"
                )));
            }
            if self.queues.contains_key(&port) {
                return Err(ClientError::UnexpectedStartEvent(format!(
                    "duplicate connected port {port:?}"
                )));
            }
            let queue = if self.local_ports.contains(&port) {
                trace!(?port, delay = connected.delay_frames, "local queue");
                InputQueue::local(connected.delay_frames)
            } else {
                trace!(?port, delay = connected.delay_frames, "remote queue");
                InputQueue::remote(connected.delay_frames)
            };
            self.queues.insert(port, queue);
        }

        let missing: Vec<Port> = self
            .local_ports
            .iter()
            .filter(|port| !self.queues.contains_key(port))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ClientError::UnexpectedStartEvent(format!(
                "local ports not connected: {missing:?}"
            )));
        }
        Ok(())
    }

    /// Queues one frame per `(port, frame, buttons)` and sends the local ones
    /// to the server in a single event.
    pub fn put_buttons(&mut self, updates: &[(Port, i32, B)]) -> Result<(), PutButtonsError> {
        let mut event = OutgoingEventPb::default();

        for (port, frame, buttons) in updates {
            let (port, frame) = (*port, *frame);
            let queue = self
                .queues
                .get(&port)
                .ok_or(PutButtonsError::NoSuchPort(port))?;
            queue
                .put_buttons(frame, buttons.clone())
                .map_err(|source| PutButtonsError::RejectedByQueue { port, source })?;

            if !self.local_ports.contains(&port) {
                continue;
            }
            let delay = queue.delay_frames();
            let frame_number = match frame.checked_add(delay) {
                Some(frame_number) if delay >= 0 => frame_number,
                _ => return Err(PutButtonsError::InternalError { port, delay }),
            };
            let mut key = KeyStatePb {
                console_id: self.console_id.get(),
                frame_number,
                ..Default::default()
            };
            key.set_port(port);
            self.coder.encode(buttons, &mut key)?;
            event.key_press.push(key);
        }

        if event.key_press.is_empty() {
            return Ok(());
        }
        trace!(
            keys = event.key_press.len(),
            bytes = event.encoded_len(),
            "sending key presses"
        );
        self.timings.record(TimingEvent::KeyStateWriteStart);
        let written = self.write(event);
        self.timings.record(TimingEvent::KeyStateWriteFinish);
        written.map_err(PutButtonsError::FailedToTransmit)
    }

    /// Buttons for `port` at the delay-adjusted `frame`.
    pub fn get_buttons(&mut self, port: Port, frame: i32) -> Result<B, GetButtonsError> {
        if self.local_ports.contains(&port) {
            let queue = self.queues.get(&port).ok_or(GetButtonsError::NoSuchPort(port))?;
            return queue
                .get_buttons(frame, Timeout::Immediate)
                .map_err(|source| GetButtonsError::Queue { port, source });
        }

        self.timings.record(TimingEvent::RemoteKeyStateRequested);
        let buttons = self.get_remote_buttons(port, frame);
        self.timings.record(TimingEvent::RemoteKeyStateReturned);
        buttons
    }

    fn get_remote_buttons(&mut self, port: Port, frame: i32) -> Result<B, GetButtonsError> {
        let queue = self.queues.get(&port).ok_or(GetButtonsError::NoSuchPort(port))?;
        match queue.get_buttons(frame, Timeout::Immediate) {
            Ok(buttons) => return Ok(buttons),
            Err(QueueError::Timeout(_)) => {}
            Err(source) => return Err(GetButtonsError::Queue { port, source }),
        }

        self.read_until_buttons(port, frame)?;

        let queue = self.queues.get(&port).ok_or(GetButtonsError::NoSuchPort(port))?;
        queue
            .get_buttons(frame, Timeout::After(REMOTE_READ_TIMEOUT))
            .map_err(|source| GetButtonsError::Queue { port, source })
    }

    /// Pumps the stream into the queues until `frame` for `port` arrived.
    fn read_until_buttons(&mut self, port: Port, frame: i32) -> Result<(), GetButtonsError> {
        let mut found = false;
        while !found {
            trace!(?port, frame, "waiting for remote buttons");
            self.timings.record(TimingEvent::KeyStateReadStart);
            let event = self.read();
            self.timings.record(TimingEvent::KeyStateReadFinish);
            let event = event?;

            if event.stop_console.is_some() {
                debug!("console stopped");
                self.status = HandlerStatus::ConsoleTerminated;
                return Err(GetButtonsError::ConsoleTerminated);
            }
            if event.start_game.is_some() || !event.invalid_data.is_empty() {
                error!(?event, "non-button event while waiting for buttons");
                return Err(GetButtonsError::UnexpectedMessage(format!("{event:?}")));
            }

            for key in &event.key_press {
                let key_port = Port::from_wire(key.port);
                let queue = self.queues.get(&key_port).ok_or_else(|| {
                    GetButtonsError::InvalidButtons(format!("unconnected port {key_port:?}"))
                })?;
                let buttons = self
                    .coder
                    .decode(key)
                    .map_err(|err| GetButtonsError::InvalidButtons(err.to_string()))?;
                queue
                    .put_buttons(key.frame_number, buttons)
                    .map_err(|source| GetButtonsError::RejectedByQueue {
                        port: key_port,
                        source,
                    })?;
                if key_port == port && key.frame_number == frame {
                    found = true;
                }
            }
        }
        Ok(())
    }

    fn write(&self, event: OutgoingEventPb) -> Result<(), String> {
        let stream = self.stream.as_ref().ok_or_else(|| "event stream not open".to_owned())?;
        self.runtime
            .block_on(stream.outbound.send(event))
            .map_err(|_| "event stream closed".to_owned())
    }

    fn read(&mut self) -> Result<IncomingEventPb, Status> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Status::failed_precondition("event stream not open"))?;
        match self.runtime.block_on(stream.inbound.message())? {
            Some(event) => Ok(event),
            None => Err(Status::unavailable("event stream closed by server")),
        }
    }

    /// Cancels the stream; later reads and writes fail.
    pub fn try_cancel(&mut self) {
        if self.stream.take().is_some() {
            debug!(console = %self.console_id, client = %self.client_id, "event stream cancelled");
        }
    }

    pub fn local_ports(&self) -> BTreeSet<Port> {
        self.local_ports.clone()
    }

    /// Connected ports owned by other clients.
    pub fn remote_ports(&self) -> BTreeSet<Port> {
        self.queues
            .keys()
            .filter(|port| !self.local_ports.contains(port))
            .copied()
            .collect()
    }

    /// The queue delay for a connected port: the client's delay for local
    /// ports, 0 for remote ports.
    pub fn delay_frames_for_port(&self, port: Port) -> Option<i32> {
        self.queues.get(&port).map(InputQueue::delay_frames)
    }

    pub fn timings(&self) -> Timings {
        self.timings.snapshot()
    }
}
