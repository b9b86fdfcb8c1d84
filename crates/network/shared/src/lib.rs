//! Shared networking types for Netplay.
//!
//! This crate hosts the primitives shared between client & server:
//! - proto: generated Protobuf messages and gRPC stubs (`NetPlayServerService`)
//! - ports: helpers around the controller `Port` enum
//! - ids: typed console/client identifiers and their generator
//! - config: TOML loading helpers used by both binaries
//! - logging: tracing subscriber bootstrap
//!
//! Keep this crate lean: no runtime, no transport logic.

pub mod config;
pub mod ids;
pub mod logging;
pub mod ports;

/// Generated Protobuf messages and gRPC client/server stubs.
#[allow(clippy::pedantic, clippy::large_enum_variant)]
pub mod proto {
    tonic::include_proto!("netplay");
}

/// Default TCP port the server listens on.
pub const DEFAULT_SERVER_PORT: u16 = 10001;

/// Number of controller ports on a console.
pub const MAX_PORTS: usize = 4;

/// Deadline applied to every unary RPC issued by the client tools.
pub const DEFAULT_RPC_DEADLINE: std::time::Duration = std::time::Duration::from_millis(5000);

pub use ids::{ClientId, ConsoleId, IdGenerator};
pub use proto::Port;
