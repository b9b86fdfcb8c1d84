//! Serverseitiger Zustand eines verbundenen Emulators.
//!
//! A client owns one or more controller ports on exactly one console and, once
//! it opened its `SendEvent` stream, the sending half of that stream.

use std::collections::BTreeSet;

use netplay_shared::ports::PortExt;
use netplay_shared::proto::{invalid_data_pb, IncomingEventPb, InvalidDataPb, KeyStatePb, Port};
use netplay_shared::{ClientId, ConsoleId};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tonic::Status;
use tracing::{debug, warn};

/// Outbound half of a `SendEvent` stream.
pub type EventSink = Sender<Result<IncomingEventPb, Status>>;

/// Events a client may have queued but not read before it counts as lagging.
pub const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    /// Plugged in, stream not announced yet.
    Created,
    /// Sent `ClientReadyPB`, waiting for the game to start.
    Ready,
    Playing,
    /// Stream closed or console stopped.
    Done,
}

#[derive(Debug)]
pub struct Client {
    id: ClientId,
    ports: BTreeSet<Port>,
    delay_frames: i32,
    status: ClientStatus,
    sink: Option<EventSink>,
}

impl Client {
    pub fn new(id: ClientId, delay_frames: i32, ports: impl IntoIterator<Item = Port>) -> Self {
        Self {
            id,
            ports: ports.into_iter().collect(),
            delay_frames,
            status: ClientStatus::Created,
            sink: None,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn ports(&self) -> impl Iterator<Item = Port> + '_ {
        self.ports.iter().copied()
    }

    pub fn owns_port(&self, port: Port) -> bool {
        self.ports.contains(&port)
    }

    pub fn delay_frames(&self) -> i32 {
        self.delay_frames
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ClientStatus) {
        debug!(client = %self.id, from = ?self.status, to = ?status, "client status change");
        self.status = status;
    }

    pub fn has_stream(&self) -> bool {
        self.sink.is_some()
    }

    /// Attaches the outbound stream. The first binding wins.
    ///
    /// Returns the sink back when the client already has a stream.
    pub fn bind_stream(&mut self, sink: EventSink) -> Result<(), EventSink> {
        if self.sink.is_some() {
            warn!(client = %self.id, "client already has an event stream, ignoring new one");
            return Err(sink);
        }
        debug!(client = %self.id, "event stream bound");
        self.sink = Some(sink);
        Ok(())
    }

    /// `Created` becomes `Ready`; any other state is left alone.
    pub fn mark_ready(&mut self) {
        if self.status == ClientStatus::Created {
            self.set_status(ClientStatus::Ready);
        } else {
            debug!(client = %self.id, status = ?self.status, "duplicate client ready ignored");
        }
    }

    /// Checks that every key names `console_id` and one of this client's ports.
    ///
    /// The first offending key is reported; later keys are not looked at.
    pub fn validate_key_presses(
        &self,
        console_id: ConsoleId,
        keys: &[KeyStatePb],
    ) -> Result<(), InvalidDataPb> {
        for key in keys {
            let port = Port::from_wire(key.port);
            if key.console_id != console_id.get() {
                return Err(invalid_data(key.console_id, port, invalid_data_pb::Status::InvalidConsole));
            }
            if !self.owns_port(port) {
                return Err(invalid_data(key.console_id, port, invalid_data_pb::Status::InvalidPort));
            }
        }
        Ok(())
    }

    /// Pushes an event down the stream. Clients without a stream are skipped.
    ///
    /// A client whose stream buffer is full is lagging: its stream is dropped
    /// and the client is done.
    pub fn send(&mut self, event: IncomingEventPb) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };
        match sink.try_send(Ok(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client = %self.id, "client does not read its event stream, disconnecting");
                self.on_stream_closed();
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(client = %self.id, "event stream receiver gone");
                false
            }
        }
    }

    /// Drops the outbound stream so the remote side sees it end.
    pub fn close_stream(&mut self) {
        self.sink = None;
    }

    pub fn on_stream_closed(&mut self) {
        self.close_stream();
        self.set_status(ClientStatus::Done);
    }
}

pub(crate) fn invalid_data(
    console_id: i64,
    port: Port,
    status: invalid_data_pb::Status,
) -> InvalidDataPb {
    let mut invalid = InvalidDataPb {
        console_id,
        ..Default::default()
    };
    invalid.set_port(port);
    invalid.set_status(status);
    invalid
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn key(console_id: i64, port: Port) -> KeyStatePb {
        let mut key = KeyStatePb {
            console_id,
            ..Default::default()
        };
        key.set_port(port);
        key
    }

    #[test]
    fn test_ready_only_from_created() {
        let mut client = Client::new(ClientId::new(1), 2, [Port::Port1]);
        client.mark_ready();
        assert_eq!(client.status(), ClientStatus::Ready);
        client.set_status(ClientStatus::Playing);
        client.mark_ready();
        assert_eq!(client.status(), ClientStatus::Playing);
    }

    #[test]
    fn test_first_stream_binding_wins() {
        let mut client = Client::new(ClientId::new(1), 0, [Port::Port1]);
        let (first, mut first_rx) = mpsc::channel(EVENT_BUFFER);
        let (second, _second_rx) = mpsc::channel(EVENT_BUFFER);
        assert!(client.bind_stream(first).is_ok());
        assert!(client.bind_stream(second).is_err());

        assert!(client.send(IncomingEventPb::default()));
        assert!(first_rx.try_recv().is_ok());
    }

    #[test]
    fn test_send_without_stream_is_skipped() {
        let mut client = Client::new(ClientId::new(1), 0, [Port::Port1]);
        assert!(!client.send(IncomingEventPb::default()));
    }

    #[test]
    fn test_validate_key_presses() {
        let client = Client::new(ClientId::new(3), 0, [Port::Port2, Port::Port3]);
        let console = ConsoleId::new(7);

        assert!(client
            .validate_key_presses(console, &[key(7, Port::Port2), key(7, Port::Port3)])
            .is_ok());

        let err = client
            .validate_key_presses(console, &[key(7, Port::Port2), key(8, Port::Port2)])
            .unwrap_err();
        assert_eq!(err.status(), invalid_data_pb::Status::InvalidConsole);
        assert_eq!(err.console_id, 8);

        let err = client
            .validate_key_presses(console, &[key(7, Port::Port1), key(9, Port::Port1)])
            .unwrap_err();
        assert_eq!(err.status(), invalid_data_pb::Status::InvalidPort);
        assert_eq!(err.port(), Port::Port1);
    }

    #[test]
    fn test_stream_closed_marks_done() {
        let mut client = Client::new(ClientId::new(1), 0, [Port::Port4]);
        let (tx, _rx) = mpsc::channel(EVENT_BUFFER);
        client.bind_stream(tx).unwrap();
        client.on_stream_closed();
        assert!(!client.has_stream());
        assert_eq!(client.status(), ClientStatus::Done);
    }

    #[test]
    fn test_lagging_client_is_disconnected() {
        let mut client = Client::new(ClientId::new(1), 0, [Port::Port1]);
        client.set_status(ClientStatus::Playing);
        let (tx, mut rx) = mpsc::channel(2);
        client.bind_stream(tx).unwrap();

        assert!(client.send(IncomingEventPb::default()));
        assert!(client.send(IncomingEventPb::default()));
        assert!(!client.send(IncomingEventPb::default()));
        assert!(!client.has_stream());
        assert_eq!(client.status(), ClientStatus::Done);

        // Buffered events still drain, then the stream ends.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
