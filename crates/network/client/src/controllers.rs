//! Zuordnung der Netplay-Ports zu den Eingabekanälen des Emulators.
//!
//! The emulator reads local controllers from its own input channels. Once the
//! game started, each local port is fed from one present channel (lowest port
//! from lowest channel) and every remote port is fed from the network.

use std::collections::BTreeSet;

use netplay_shared::ports::PortExt;
use netplay_shared::proto::Port;
use thiserror::Error;
use tracing::{error, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerSlot {
    pub present: bool,
    pub remote: bool,
    pub delay: i32,
    /// Emulator input channel feeding a local port.
    pub channel: Option<usize>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("server assigned {ports} local port(s) but {channels} input channel(s) are present")]
    ChannelCountMismatch { ports: usize, channels: usize },
    #[error("port {0:?} is not a controller port")]
    InvalidPort(Port),
}

/// Builds the four slots, indexed by controller port.
///
/// `present_channels` are the emulator channels with a controller attached,
/// `delay_for_port` yields the delay of a connected port.
pub fn permute_controllers(
    present_channels: &[usize],
    local_ports: &BTreeSet<Port>,
    remote_ports: &BTreeSet<Port>,
    delay_for_port: impl Fn(Port) -> Option<i32>,
) -> Result<[ControllerSlot; 4], ControllerError> {
    if present_channels.len() != local_ports.len() {
        error!(
            ports = local_ports.len(),
            channels = present_channels.len(),
            "local port count does not match input channels"
        );
        return Err(ControllerError::ChannelCountMismatch {
            ports: local_ports.len(),
            channels: present_channels.len(),
        });
    }

    let mut channels: Vec<usize> = present_channels.to_vec();
    channels.sort_unstable();

    let mut slots = [ControllerSlot::default(); 4];
    for (port, channel) in local_ports.iter().zip(channels) {
        let index = port
            .controller_index()
            .ok_or(ControllerError::InvalidPort(*port))?;
        trace!(?port, channel, "local port fed from input channel");
        slots[index] = ControllerSlot {
            present: true,
            remote: false,
            delay: delay_for_port(*port).unwrap_or_default(),
            channel: Some(channel),
        };
    }
    for port in remote_ports {
        let index = port
            .controller_index()
            .ok_or(ControllerError::InvalidPort(*port))?;
        slots[index] = ControllerSlot {
            present: true,
            remote: true,
            delay: delay_for_port(*port).unwrap_or_default(),
            channel: None,
        };
    }
    Ok(slots)
}

impl<B: Default + Clone + Send + 'static> crate::event_stream::EventStreamHandler<B> {
    /// [`permute_controllers`] for the ports of a started handler.
    pub fn controller_slots(
        &self,
        present_channels: &[usize],
    ) -> Result<[ControllerSlot; 4], ControllerError> {
        permute_controllers(
            present_channels,
            &self.local_ports(),
            &self.remote_ports(),
            |port| self.delay_frames_for_port(port),
        )
    }
}
