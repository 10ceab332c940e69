//! Local input sampling with change detection

use shared::{ControlKey, ControlState, Intent};

/// Turns sampled control states into KeyDown/KeyUp intents.
///
/// Only edges are sent: a key held across many samples produces one KeyDown
/// and, when released, one KeyUp.
#[derive(Debug, Default)]
pub struct InputSampler {
    // last state the host was told about
    sent: ControlState,
}

impl InputSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `now` with what was last sent and returns the intents for every change.
    pub fn update(&mut self, now: ControlState) -> Vec<Intent> {
        let mut intents = Vec::new();
        for key in ControlState::ALL_KEYS {
            let pressed = now.is_pressed(key);
            if pressed != self.sent.is_pressed(key) {
                intents.push(edge(key, pressed));
            }
        }
        self.sent = now;
        intents
    }

    /// Releases every held key.
    pub fn release_all(&mut self) -> Vec<Intent> {
        self.update(ControlState::default())
    }

    /// Forgets what was sent so the next update repeats every held key.
    pub fn resync(&mut self) {
        self.sent.clear();
    }
}

fn edge(control: ControlKey, pressed: bool) -> Intent {
    if pressed {
        Intent::KeyDown { control }
    } else {
        Intent::KeyUp { control }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_edges_are_sent() {
        let mut sampler = InputSampler::new();
        let held = ControlState {
            up: true,
            ..ControlState::default()
        };

        assert_eq!(sampler.update(held), vec![Intent::KeyDown { control: ControlKey::Up }]);
        assert!(sampler.update(held).is_empty());
        assert_eq!(
            sampler.update(ControlState::default()),
            vec![Intent::KeyUp { control: ControlKey::Up }]
        );
    }

    #[test]
    fn test_several_keys_change_at_once() {
        let mut sampler = InputSampler::new();
        sampler.update(ControlState {
            left: true,
            ..ControlState::default()
        });
        let intents = sampler.update(ControlState {
            right: true,
            down: true,
            ..ControlState::default()
        });
        assert_eq!(
            intents,
            vec![
                Intent::KeyDown { control: ControlKey::Down },
                Intent::KeyUp { control: ControlKey::Left },
                Intent::KeyDown { control: ControlKey::Right },
            ]
        );
    }

    #[test]
    fn test_release_all_lets_go_of_held_keys() {
        let mut sampler = InputSampler::new();
        sampler.update(ControlState {
            up: true,
            left: true,
            ..ControlState::default()
        });
        assert_eq!(
            sampler.release_all(),
            vec![
                Intent::KeyUp { control: ControlKey::Up },
                Intent::KeyUp { control: ControlKey::Left },
            ]
        );
        assert!(sampler.release_all().is_empty());
    }

    #[test]
    fn test_resync_repeats_held_keys() {
        let mut sampler = InputSampler::new();
        let held = ControlState {
            right: true,
            ..ControlState::default()
        };
        sampler.update(held);
        sampler.resync();
        assert_eq!(sampler.update(held), vec![Intent::KeyDown { control: ControlKey::Right }]);
    }
}
