//! Static level description: map bounds, castle sites, colliders, neutrals.

use crate::error::ConfigError;
use crate::math::Vector2;
use serde::{Deserialize, Serialize};

/// Axis-aligned box. An inverted collider keeps movers inside instead of out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub min: Vector2,
    pub max: Vector2,
    #[serde(default)]
    pub inverted: bool,
}

impl Collider {
    pub fn contains(&self, point: Vector2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeutralKind {
    RovingSwarm,
    GoldMine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutralSpawn {
    pub id: String,
    pub kind: NeutralKind,
    pub pos: Vector2,
    #[serde(default)]
    pub waypoints: Vec<Vector2>,
    /// Drones the neutral starts with.
    #[serde(default)]
    pub units: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub width: f32,
    pub height: f32,
    pub castle_positions: Vec<Vector2>,
    #[serde(default)]
    pub colliders: Vec<Collider>,
    #[serde(default)]
    pub neutrals: Vec<NeutralSpawn>,
    /// Levels without a navigation mesh make every path query come back empty.
    #[serde(default = "default_true")]
    pub has_nav_mesh: bool,
}

fn default_true() -> bool {
    true
}

impl Level {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The built-in two-to-four player map.
    pub fn arena() -> Self {
        let width = 1600.0;
        let height = 1000.0;
        Self {
            width,
            height,
            castle_positions: vec![
                Vector2::new(200.0, 500.0),
                Vector2::new(1400.0, 500.0),
                Vector2::new(800.0, 150.0),
                Vector2::new(800.0, 850.0),
            ],
            colliders: vec![
                Collider {
                    min: Vector2::ZERO,
                    max: Vector2::new(width, height),
                    inverted: true,
                },
                Collider {
                    min: Vector2::new(720.0, 380.0),
                    max: Vector2::new(880.0, 620.0),
                    inverted: false,
                },
            ],
            neutrals: vec![
                NeutralSpawn {
                    id: "swarm-north".to_string(),
                    kind: NeutralKind::RovingSwarm,
                    pos: Vector2::new(500.0, 300.0),
                    waypoints: vec![
                        Vector2::new(500.0, 300.0),
                        Vector2::new(1100.0, 300.0),
                        Vector2::new(1100.0, 700.0),
                        Vector2::new(500.0, 700.0),
                    ],
                    units: 4,
                },
                NeutralSpawn {
                    id: "mine-west".to_string(),
                    kind: NeutralKind::GoldMine,
                    pos: Vector2::new(400.0, 850.0),
                    waypoints: Vec::new(),
                    units: 0,
                },
                NeutralSpawn {
                    id: "mine-east".to_string(),
                    kind: NeutralKind::GoldMine,
                    pos: Vector2::new(1200.0, 150.0),
                    waypoints: Vec::new(),
                    units: 0,
                },
            ],
            has_nav_mesh: true,
        }
    }

    /// Checks the level can seat `players` players.
    pub fn validate(&self, players: usize) -> Result<(), ConfigError> {
        if self.castle_positions.len() < players {
            return Err(ConfigError::NotEnoughCastles {
                needed: players,
                available: self.castle_positions.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_seats_four() {
        let level = Level::arena();
        assert!(level.validate(4).is_ok());
        assert!(level.validate(5).is_err());
    }

    #[test]
    fn test_level_from_json() {
        let text = r#"{
            "width": 320.0,
            "height": 320.0,
            "castle_positions": [{"x": 32.0, "y": 32.0}, {"x": 288.0, "y": 288.0}],
            "colliders": [{"min": {"x": 100.0, "y": 0.0}, "max": {"x": 120.0, "y": 200.0}}]
        }"#;
        let level = Level::from_json(text).expect("level should parse");
        assert_eq!(level.castle_positions.len(), 2);
        assert!(!level.colliders[0].inverted);
        assert!(level.has_nav_mesh);
        assert!(level.neutrals.is_empty());
    }

    #[test]
    fn test_collider_contains() {
        let collider = Collider {
            min: Vector2::new(0.0, 0.0),
            max: Vector2::new(10.0, 10.0),
            inverted: false,
        };
        assert!(collider.contains(Vector2::new(5.0, 5.0)));
        assert!(!collider.contains(Vector2::new(11.0, 5.0)));
    }
}
