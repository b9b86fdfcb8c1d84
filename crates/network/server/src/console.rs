//! Virtuelle Konsole: Port-Belegung, Clients und Event-Verteilung.

use std::collections::{BTreeMap, BTreeSet};

use netplay_shared::ports::PortExt;
use netplay_shared::proto::plug_controller_response_pb::port_rejection_pb::Reason;
use netplay_shared::proto::plug_controller_response_pb::PortRejectionPb;
use netplay_shared::proto::start_game_pb::ConnectedPortPb;
use netplay_shared::proto::{
    IncomingEventPb, InvalidDataPb, KeyStatePb, OutgoingEventPb, Port, StartGamePb, StopConsolePb,
};
use netplay_shared::{ClientId, ConsoleId, IdGenerator};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientStatus, EventSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStatus {
    /// Accepting controllers.
    Created,
    /// Game started, port layout frozen.
    Powered,
    Done,
}

#[derive(Debug, Error, PartialEq)]
pub enum PlugError {
    #[error("rom md5 mismatch: console has {expected}, client sent {actual}")]
    RomMismatch { expected: String, actual: String },
    #[error("no ports requested")]
    NoPortsRequested,
    #[error("port request rejected")]
    Rejected(Vec<PortRejectionPb>),
    #[error("console {0} already started")]
    ConsoleStarted(ConsoleId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    #[error("console {0} already started")]
    AlreadyStarted(ConsoleId),
    #[error("not all clients of console {0} are ready")]
    ClientsNotReady(ConsoleId),
}

/// Result of a successful plug request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugged {
    pub client_id: ClientId,
    /// Assigned ports, ascending.
    pub ports: Vec<Port>,
}

#[derive(Debug)]
pub struct Console {
    id: ConsoleId,
    title: String,
    rom_name: String,
    rom_file_md5: String,
    status: ConsoleStatus,
    clients: BTreeMap<ClientId, Client>,
    client_ids: IdGenerator,
}

impl Console {
    pub fn new(
        id: ConsoleId,
        title: impl Into<String>,
        rom_name: impl Into<String>,
        rom_file_md5: impl Into<String>,
        client_ids: IdGenerator,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            rom_name: rom_name.into(),
            rom_file_md5: rom_file_md5.into(),
            status: ConsoleStatus::Created,
            clients: BTreeMap::new(),
            client_ids,
        }
    }

    pub fn id(&self) -> ConsoleId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn rom_name(&self) -> &str {
        &self.rom_name
    }

    pub fn status(&self) -> ConsoleStatus {
        self.status
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    fn occupied_ports(&self) -> BTreeSet<Port> {
        self.clients.values().flat_map(Client::ports).collect()
    }

    /// Allocates the requested ports to a new client.
    ///
    /// Named ports are handled before `PORT_ANY`, which takes the lowest free
    /// port. Every processed request yields one rejection entry; if any entry
    /// is not `ACCEPTABLE` nothing is allocated.
    pub fn try_add_players(
        &mut self,
        delay_frames: i32,
        requested: &[Port],
        rom_file_md5: &str,
    ) -> Result<Plugged, PlugError> {
        if self.status != ConsoleStatus::Created {
            return Err(PlugError::ConsoleStarted(self.id));
        }
        if !self.rom_file_md5.is_empty()
            && !rom_file_md5.is_empty()
            && self.rom_file_md5 != rom_file_md5
        {
            return Err(PlugError::RomMismatch {
                expected: self.rom_file_md5.clone(),
                actual: rom_file_md5.to_owned(),
            });
        }

        let mut requests: Vec<Port> = requested
            .iter()
            .copied()
            .filter(|port| port.is_port_request())
            .collect();
        if requests.is_empty() {
            return Err(PlugError::NoPortsRequested);
        }
        // PORT_ANY has the highest discriminant and sorts last.
        requests.sort();

        let occupied = self.occupied_ports();
        let mut accepted = BTreeSet::new();
        let mut entries = Vec::with_capacity(requests.len());
        let mut rejected = false;

        for request in requests {
            let (port, reason) = if request == Port::PortAny {
                match Port::CONTROLLER_PORTS
                    .into_iter()
                    .find(|port| !occupied.contains(port) && !accepted.contains(port))
                {
                    Some(port) => (port, Reason::Acceptable),
                    None => (Port::PortAny, Reason::AllPortsOccupied),
                }
            } else if occupied.contains(&request) || accepted.contains(&request) {
                (request, Reason::PortAlreadyOccupied)
            } else {
                (request, Reason::Acceptable)
            };

            if reason == Reason::Acceptable {
                accepted.insert(port);
            } else {
                rejected = true;
            }
            let mut entry = PortRejectionPb::default();
            entry.set_port(port);
            entry.set_reason(reason);
            entries.push(entry);
        }

        if rejected {
            debug!(console = %self.id, ?entries, "port request rejected");
            return Err(PlugError::Rejected(entries));
        }

        let client_id = ClientId::new(self.client_ids.next());
        let ports: Vec<Port> = accepted.into_iter().collect();
        info!(console = %self.id, client = %client_id, ?ports, delay_frames, "controllers plugged");
        self.clients
            .insert(client_id, Client::new(client_id, delay_frames, ports.iter().copied()));
        Ok(Plugged { client_id, ports })
    }

    /// Every connected port with the delay of the client owning it.
    pub fn port_delay_map(&self) -> BTreeMap<Port, i32> {
        self.clients
            .values()
            .flat_map(|client| client.ports().map(|port| (port, client.delay_frames())))
            .collect()
    }

    pub fn verify_clients_ready(&self) -> bool {
        !self.clients.is_empty()
            && self
                .clients
                .values()
                .all(|client| client.status() == ClientStatus::Ready)
    }

    /// Relays key presses to every other client that has a stream.
    pub fn broadcast_key_presses(&mut self, keys: &[KeyStatePb], sender: ClientId) {
        let event = IncomingEventPb {
            key_press: keys.to_vec(),
            ..Default::default()
        };
        for client in self.clients.values_mut().filter(|client| client.id() != sender) {
            client.send(event.clone());
        }
    }

    pub fn start_game(&mut self) -> Result<(), StartError> {
        if self.status != ConsoleStatus::Created {
            return Err(StartError::AlreadyStarted(self.id));
        }
        if !self.verify_clients_ready() {
            return Err(StartError::ClientsNotReady(self.id));
        }
        self.broadcast_start_game();
        Ok(())
    }

    /// Sends the port layout to every client and powers the console on.
    pub fn broadcast_start_game(&mut self) {
        let connected_ports = self
            .port_delay_map()
            .into_iter()
            .map(|(port, delay_frames)| {
                let mut connected = ConnectedPortPb {
                    delay_frames,
                    ..Default::default()
                };
                connected.set_port(port);
                connected
            })
            .collect();
        let event = IncomingEventPb {
            start_game: Some(StartGamePb {
                console_id: self.id.get(),
                connected_ports,
            }),
            ..Default::default()
        };
        for client in self.clients.values_mut() {
            client.send(event.clone());
            if client.status() != ClientStatus::Done {
                client.set_status(ClientStatus::Playing);
            }
        }
        self.status = ConsoleStatus::Powered;
        info!(console = %self.id, title = %self.title, "game started");
    }

    /// Tells every client the console is gone and closes their streams.
    pub fn stop(&mut self, reason: &str) {
        let event = IncomingEventPb {
            stop_console: Some(StopConsolePb {
                console_id: self.id.get(),
            }),
            ..Default::default()
        };
        for client in self.clients.values_mut() {
            client.send(event.clone());
            client.close_stream();
            client.set_status(ClientStatus::Done);
        }
        self.status = ConsoleStatus::Done;
        info!(console = %self.id, reason, "console stopped");
    }

    /// Attaches a `SendEvent` stream to one of this console's clients.
    pub fn bind_stream(&mut self, client_id: ClientId, sink: EventSink) -> Result<(), EventSink> {
        match self.clients.get_mut(&client_id) {
            Some(client) => client.bind_stream(sink),
            None => Err(sink),
        }
    }

    /// Processes one event from a client whose stream is bound.
    pub fn handle_event(&mut self, client_id: ClientId, event: OutgoingEventPb) {
        let console_id = self.id;
        let Some(client) = self.clients.get_mut(&client_id) else {
            warn!(console = %console_id, client = %client_id, "event for unknown client");
            return;
        };

        if event.client_ready.is_some() {
            client.mark_ready();
        }
        if event.key_press.is_empty() {
            return;
        }
        if let Err(invalid) = client.validate_key_presses(console_id, &event.key_press) {
            warn!(console = %console_id, client = %client_id, ?invalid, "dropping invalid key presses");
            client.send(invalid_event(invalid));
            return;
        }
        self.broadcast_key_presses(&event.key_press, client_id);
    }

    /// Marks the client done. A running console whose clients are all done
    /// is done as well.
    pub fn on_stream_closed(&mut self, client_id: ClientId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.on_stream_closed();
        }
        if self.status == ConsoleStatus::Powered
            && self
                .clients
                .values()
                .all(|client| client.status() == ClientStatus::Done)
        {
            self.status = ConsoleStatus::Done;
            info!(console = %self.id, "all clients left, console done");
        }
    }
}

pub(crate) fn invalid_event(invalid: InvalidDataPb) -> IncomingEventPb {
    IncomingEventPb {
        invalid_data: vec![invalid],
        ..Default::default()
    }
}
