//! Netplay client library.
//!
//! An emulator uses this crate to join a console on a netplay server and to
//! exchange controller state with the other players, frame by frame:
//!
//! 1. [`client::connect`] to the server, create a [`NetplayClient`].
//! 2. [`NetplayClient::plug_controllers`] to claim ports on a console.
//! 3. [`NetplayClient::make_event_stream_handler`], then
//!    [`EventStreamHandler::ready_and_wait_for_console_start`].
//! 4. Per frame: [`EventStreamHandler::put_buttons`] for local input and
//!    [`EventStreamHandler::get_buttons`] for every connected port.
//!
//! [`Session::join`] runs steps 1 to 3 from a [`ClientConfig`], creating the
//! console first when none is configured.
//!
//! The API is synchronous; network I/O runs on a [`ClientNetworkRuntime`].

pub mod client;
pub mod coder;
pub mod config;
pub mod controllers;
pub mod error;
pub mod event_stream;
pub mod host;
pub mod input_queue;
pub mod runtime;
pub mod session;
pub mod timings;

pub use client::{connect, NetplayClient, NetplayStub};
pub use coder::{AxisCoder, ButtonCoder, N64ButtonCoder, N64Buttons};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, GetButtonsError, PutButtonsError};
pub use event_stream::{EventStreamHandler, HandlerStatus};
pub use input_queue::{InputQueue, Timeout};
pub use runtime::ClientNetworkRuntime;
pub use session::Session;
pub use timings::{TimingEvent, Timings};

pub use netplay_shared::{proto, ClientId, ConsoleId, Port};
