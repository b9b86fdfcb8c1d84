//! Helpers around the controller [`Port`] enum.
//!
//! The generated enum is shared by requests (where `PORT_ANY` is allowed) and
//! by allocations (where only `PORT_1..PORT_4` make sense). These helpers keep
//! that distinction in one place.

use crate::proto::Port;

/// Extension methods for the generated [`Port`] enum.
pub trait PortExt: Sized {
    /// The four physical controller ports, in order.
    const CONTROLLER_PORTS: [Port; 4] = [Port::Port1, Port::Port2, Port::Port3, Port::Port4];

    /// `PORT_1..PORT_4` or `PORT_ANY`.
    fn is_port_request(self) -> bool;

    /// `PORT_1..PORT_4`.
    fn is_controller_port(self) -> bool;

    /// Zero-based index of a controller port (`PORT_1` is 0).
    fn controller_index(self) -> Option<usize>;

    /// Inverse of [`PortExt::controller_index`].
    fn from_controller_index(index: usize) -> Option<Self>;

    /// Decodes a raw wire value, mapping unknown values to `UNKNOWN`.
    fn from_wire(value: i32) -> Self;
}

impl PortExt for Port {
    fn is_port_request(self) -> bool {
        self.is_controller_port() || self == Port::PortAny
    }

    fn is_controller_port(self) -> bool {
        matches!(self, Port::Port1 | Port::Port2 | Port::Port3 | Port::Port4)
    }

    fn controller_index(self) -> Option<usize> {
        match self {
            Port::Port1 => Some(0),
            Port::Port2 => Some(1),
            Port::Port3 => Some(2),
            Port::Port4 => Some(3),
            _ => None,
        }
    }

    fn from_controller_index(index: usize) -> Option<Self> {
        Self::CONTROLLER_PORTS.get(index).copied()
    }

    fn from_wire(value: i32) -> Self {
        Port::try_from(value).unwrap_or(Port::Unknown)
    }
}
