//! Umwandlung zwischen Emulator-Buttons und `KeyStatePB`.

use netplay_shared::proto::KeyStatePb;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoderError {
    #[error("{axis} axis value {value} out of range")]
    AxisOutOfRange { axis: &'static str, value: i32 },
}

/// Maps one frame of controller state onto the wire format and back.
pub trait ButtonCoder<B>: Send + Sync {
    /// Writes the button fields of `key`; routing fields are left alone.
    fn encode(&self, buttons: &B, key: &mut KeyStatePb) -> Result<(), CoderError>;

    fn decode(&self, key: &KeyStatePb) -> Result<B, CoderError>;
}

/// State of an N64 controller for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct N64Buttons {
    pub right_d_pad: bool,
    pub left_d_pad: bool,
    pub down_d_pad: bool,
    pub up_d_pad: bool,
    pub start: bool,
    pub z_trigger: bool,
    pub b: bool,
    pub a: bool,
    pub right_c: bool,
    pub left_c: bool,
    pub down_c: bool,
    pub up_c: bool,
    pub right_trigger: bool,
    pub left_trigger: bool,
    pub reserved_1: bool,
    pub reserved_2: bool,
    pub x_axis: i8,
    pub y_axis: i8,
}

impl N64Buttons {
    fn flags(&self) -> [bool; 16] {
        [
            self.right_d_pad,
            self.left_d_pad,
            self.down_d_pad,
            self.up_d_pad,
            self.start,
            self.z_trigger,
            self.b,
            self.a,
            self.right_c,
            self.left_c,
            self.down_c,
            self.up_c,
            self.right_trigger,
            self.left_trigger,
            self.reserved_1,
            self.reserved_2,
        ]
    }

    /// Packs the state into the 32-bit layout emulator input plugins use:
    /// one bit per button from bit 0, then the x and y axis bytes.
    pub fn to_raw(&self) -> u32 {
        let buttons = self
            .flags()
            .iter()
            .enumerate()
            .fold(0u32, |raw, (bit, pressed)| raw | (u32::from(*pressed) << bit));
        buttons | (u32::from(self.x_axis as u8) << 16) | (u32::from(self.y_axis as u8) << 24)
    }

    pub fn from_raw(raw: u32) -> Self {
        let bit = |n: u32| raw & (1 << n) != 0;
        Self {
            right_d_pad: bit(0),
            left_d_pad: bit(1),
            down_d_pad: bit(2),
            up_d_pad: bit(3),
            start: bit(4),
            z_trigger: bit(5),
            b: bit(6),
            a: bit(7),
            right_c: bit(8),
            left_c: bit(9),
            down_c: bit(10),
            up_c: bit(11),
            right_trigger: bit(12),
            left_trigger: bit(13),
            reserved_1: bit(14),
            reserved_2: bit(15),
            x_axis: (raw >> 16) as u8 as i8,
            y_axis: (raw >> 24) as u8 as i8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct N64ButtonCoder;

impl ButtonCoder<N64Buttons> for N64ButtonCoder {
    fn encode(&self, buttons: &N64Buttons, key: &mut KeyStatePb) -> Result<(), CoderError> {
        key.right_d_pad = buttons.right_d_pad;
        key.left_d_pad = buttons.left_d_pad;
        key.down_d_pad = buttons.down_d_pad;
        key.up_d_pad = buttons.up_d_pad;
        key.start_button = buttons.start;
        key.z_trigger = buttons.z_trigger;
        key.b_button = buttons.b;
        key.a_button = buttons.a;
        key.right_c_button = buttons.right_c;
        key.left_c_button = buttons.left_c;
        key.down_c_button = buttons.down_c;
        key.up_c_button = buttons.up_c;
        key.right_trigger = buttons.right_trigger;
        key.left_trigger = buttons.left_trigger;
        key.reserved_1 = buttons.reserved_1;
        key.reserved_2 = buttons.reserved_2;
        key.x_axis = i32::from(buttons.x_axis);
        key.y_axis = i32::from(buttons.y_axis);
        Ok(())
    }

    fn decode(&self, key: &KeyStatePb) -> Result<N64Buttons, CoderError> {
        let axis = |axis: &'static str, value: i32| {
            i8::try_from(value).map_err(|_| CoderError::AxisOutOfRange { axis, value })
        };
        Ok(N64Buttons {
            right_d_pad: key.right_d_pad,
            left_d_pad: key.left_d_pad,
            down_d_pad: key.down_d_pad,
            up_d_pad: key.up_d_pad,
            start: key.start_button,
            z_trigger: key.z_trigger,
            b: key.b_button,
            a: key.a_button,
            right_c: key.right_c_button,
            left_c: key.left_c_button,
            down_c: key.down_c_button,
            up_c: key.up_c_button,
            right_trigger: key.right_trigger,
            left_trigger: key.left_trigger,
            reserved_1: key.reserved_1,
            reserved_2: key.reserved_2,
            x_axis: axis("x", key.x_axis)?,
            y_axis: axis("y", key.y_axis)?,
        })
    }
}

/// Carries an arbitrary `u32` in `x_axis`. Handy for tests and tools that
/// want to see exactly which frame a value came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisCoder;

impl ButtonCoder<u32> for AxisCoder {
    fn encode(&self, buttons: &u32, key: &mut KeyStatePb) -> Result<(), CoderError> {
        key.x_axis = *buttons as i32;
        Ok(())
    }

    fn decode(&self, key: &KeyStatePb) -> Result<u32, CoderError> {
        Ok(key.x_axis as u32)
    }
}
