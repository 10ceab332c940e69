//! Directional control state for one player.
//!
//! A plain value, owned by whoever drives the player: the local input sampler
//! on a peer, or the host's per-player control book for remote humans.

use crate::math::Vector2;
use crate::protocol::ControlKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl ControlState {
    pub const ALL_KEYS: [ControlKey; 4] = [ControlKey::Up, ControlKey::Down, ControlKey::Left, ControlKey::Right];

    pub fn set(&mut self, key: ControlKey, pressed: bool) {
        match key {
            ControlKey::Up => self.up = pressed,
            ControlKey::Down => self.down = pressed,
            ControlKey::Left => self.left = pressed,
            ControlKey::Right => self.right = pressed,
        }
    }

    pub fn is_pressed(&self, key: ControlKey) -> bool {
        match key {
            ControlKey::Up => self.up,
            ControlKey::Down => self.down,
            ControlKey::Left => self.left,
            ControlKey::Right => self.right,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Acceleration for these keys, `max_acc` per axis and clamped to `max_acc` overall.
    ///
    /// Screen coordinates: up is negative y.
    pub fn acceleration(&self, max_acc: f32) -> Vector2 {
        let mut acc = Vector2::ZERO;
        if self.left {
            acc.x -= max_acc;
        }
        if self.right {
            acc.x += max_acc;
        }
        if self.up {
            acc.y -= max_acc;
        }
        if self.down {
            acc.y += max_acc;
        }
        acc.limit(max_acc)
    }
}
