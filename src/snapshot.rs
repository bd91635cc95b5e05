//! Per-poll joystick state snapshot.
//!
//! [`JoystickState`] is an **owned**, immutable view of one device at the moment a
//! [`DeviceSession::poll`](crate::session::DeviceSession::poll) call read it. It has no
//! identity beyond that moment: two snapshots are compared by value, never by origin.
//!
//! # Semantics
//! - Axes are reported in the range negotiated during object enumeration
//!   (`PollConfig::axis_min..=axis_max`), or the driver default if the device rejected it.
//! - POV values are hundredths of a degree clockwise from north; `None` means centered.
//! - `buttons` holds exactly as many entries as the device layout reported buttons.
//!
//! # Example
//! ```no_run
//! use stickprobe::snapshot::{Axis, JoystickState};
//!
//! fn print(state: &JoystickState) {
//!     println!("X={} Y={} pressed={:?}",
//!              state.axis(Axis::X), state.axis(Axis::Y),
//!              state.pressed().collect::<Vec<_>>());
//! }
//! ```

use serde::Serialize;

use crate::device::RawJoyState;

/// Maximum number of buttons the canonical report carries.
pub const MAX_BUTTONS: usize = 32;

/// Axis channels of the canonical report, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
    Rx = 3,
    Ry = 4,
    Rz = 5,
}

impl Axis {
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::Rx, Axis::Ry, Axis::Rz];
}

/// Immutable snapshot of one device's state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JoystickState {
    /// X, Y, Z, Rx, Ry, Rz.
    pub axes: [i32; 6],
    pub sliders: [i32; 2],
    pub pov: [Option<u32>; 4],
    pub buttons: Vec<bool>,
}

impl JoystickState {
    /// Build a snapshot from a raw report, keeping the first `button_count` buttons.
    pub fn from_raw(raw: &RawJoyState, button_count: usize) -> Self {
        let buttons = raw
            .buttons
            .iter()
            .take(button_count.min(MAX_BUTTONS))
            .map(|b| b & 0x80 != 0)
            .collect();
        // Centered is reported with the low word set to 0xFFFF.
        let pov = raw.pov.map(|p| if p & 0xFFFF == 0xFFFF { None } else { Some(p) });
        Self {
            axes: raw.axes,
            sliders: raw.sliders,
            pov,
            buttons,
        }
    }

    #[inline]
    pub fn axis(&self, axis: Axis) -> i32 {
        self.axes[axis as usize]
    }

    /// `false` for indices past the device's button count.
    #[inline]
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }

    /// Indices of pressed buttons, ascending.
    pub fn pressed(&self) -> impl Iterator<Item = usize> + '_ {
        self.buttons
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
    }

    pub fn any_pressed(&self) -> bool {
        self.buttons.iter().any(|&b| b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_truncates_buttons_and_decodes_pov() {
        let mut raw = RawJoyState::default();
        raw.axes = [1, -2, 3, 4, 5, 6];
        raw.buttons[1] = 0x80;
        raw.buttons[20] = 0x80;
        raw.pov = [9000, u32::MAX, 0xFFFF, 0];

        let state = JoystickState::from_raw(&raw, 4);
        assert_eq!(state.buttons, vec![false, true, false, false]);
        assert_eq!(state.axis(Axis::Y), -2);
        assert_eq!(state.pov, [Some(9000), None, None, Some(0)]);
        assert_eq!(state.pressed().collect::<Vec<_>>(), vec![1]);
        assert!(state.any_pressed());
        assert!(!state.button(20));
    }

    #[test]
    fn low_bits_do_not_count_as_pressed() {
        let mut raw = RawJoyState::default();
        raw.buttons[0] = 0x7F;
        let state = JoystickState::from_raw(&raw, 64);
        assert_eq!(state.buttons.len(), MAX_BUTTONS);
        assert!(!state.any_pressed());
    }
}
