//! Fehler- und Ergebnis-Typen für clientseitige Netzwerkoperationen.

use netplay_shared::config::ConfigError;
use netplay_shared::proto::{make_console_response_pb, plug_controller_response_pb, Port};
use thiserror::Error;

use crate::coder::CoderError;
use crate::input_queue::QueueError;
use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("invalid server endpoint {endpoint}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
    #[error("between 1 and 4 ports must be requested, got {0}")]
    InvalidPortCount(usize),
    #[error("console id mismatch: expected {expected}, server returned {actual}")]
    ConsoleMismatch { expected: i64, actual: i64 },
    #[error("controllers are not plugged in")]
    NotPlugged,
    #[error("invalid event stream handler: {0}")]
    InvalidHandler(String),
    #[error("event stream not open")]
    StreamNotOpen,
    #[error("console stopped before the game started")]
    ConsoleStopped,
    #[error("unexpected start event: {0}")]
    UnexpectedStartEvent(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("netplay is disabled")]
    Disabled,
    #[error("invalid console id {0}")]
    InvalidConsoleId(i64),
    #[error("failed to create console: {}", .0.as_str_name())]
    MakeConsoleFailed(make_console_response_pb::Status),
    #[error("controllers were not plugged: {}", .0.as_str_name())]
    PlugRejected(plug_controller_response_pb::Status),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum PutButtonsError {
    #[error("no queue for port {0:?}")]
    NoSuchPort(Port),
    #[error("queue for port {port:?} rejected frame: {source}")]
    RejectedByQueue {
        port: Port,
        #[source]
        source: QueueError,
    },
    #[error("failed to encode buttons: {0}")]
    FailedToEncode(#[from] CoderError),
    #[error("invalid delay {delay} for port {port:?}")]
    InternalError { port: Port, delay: i32 },
    #[error("failed to transmit key presses: {0}")]
    FailedToTransmit(String),
}

#[derive(Debug, Error)]
pub enum GetButtonsError {
    #[error("no queue for port {0:?}")]
    NoSuchPort(Port),
    #[error("failed to read buttons for port {port:?}: {source}")]
    Queue {
        port: Port,
        #[source]
        source: QueueError,
    },
    #[error("console terminated")]
    ConsoleTerminated,
    #[error("unexpected non-button event: {0}")]
    UnexpectedMessage(String),
    #[error("invalid buttons: {0}")]
    InvalidButtons(String),
    #[error("queue for port {port:?} rejected remote frame: {source}")]
    RejectedByQueue {
        port: Port,
        #[source]
        source: QueueError,
    },
    #[error("failed to read event stream: {0}")]
    Rpc(#[from] tonic::Status),
}
