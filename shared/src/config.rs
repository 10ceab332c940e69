//! Game constants, unit/spell catalogues and character stat conversion.
//!
//! `GameConfig::default()` carries the tuned values every peer agrees on.
//! A config can also be read from JSON so a session can be run with
//! different balance numbers without rebuilding.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub n_player_game: usize,
    pub n_team_game: usize,

    pub castle_health: f32,
    pub castle_income: u32,
    /// Compared against squared distance after squaring.
    pub castle_activation_dist: f32,

    pub player_start_offset: (f32, f32),
    pub player_max_vel: f32,
    pub player_max_acc: f32,
    pub player_self_income: u32,
    pub player_friction: f32,
    pub sq_player_vel_cutoff: f32,

    pub roving_swarm_vel: f32,
    pub swarm_yield_check_sq_dist: f32,
    pub swarm_yield_limit: f32,
    pub mine_yield_check_sq_dist: f32,
    pub mine_yield_limit: f32,
    pub mine_income: u32,

    /// Seconds per economy day.
    pub day_length: f32,
    pub latency_timeout_ms: u32,
    pub bootstrap_timeout_ms: u64,

    pub health_levels: Vec<f32>,
    pub speed_levels: Vec<f32>,
    pub power_levels: Vec<f32>,
    pub mana_levels: Vec<f32>,
    pub faction_start_gold: u32,

    pub castle_spells: Vec<SpellId>,
    pub unit: UnitStats,
    pub flocking: FlockingParams,
    pub nav_scale: f32,
    pub ai: AiCadence,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            n_player_game: 2,
            n_team_game: 2,
            castle_health: 5000.0,
            castle_income: 1000,
            castle_activation_dist: 70.0,
            player_start_offset: (50.0, 0.0),
            player_max_vel: 2.0,
            player_max_acc: 0.2,
            player_self_income: 0,
            player_friction: 0.08,
            sq_player_vel_cutoff: 0.075 * 0.075,
            roving_swarm_vel: 0.5,
            swarm_yield_check_sq_dist: 200.0 * 200.0,
            swarm_yield_limit: 2.0,
            mine_yield_check_sq_dist: 50.0 * 50.0,
            mine_yield_limit: 100.0,
            mine_income: 1000,
            day_length: 30.0,
            latency_timeout_ms: 2000,
            bootstrap_timeout_ms: 10_000,
            health_levels: vec![500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0],
            speed_levels: vec![0.9, 0.95, 1.0, 1.05, 1.1, 1.2],
            power_levels: vec![1.0, 1.1, 1.2, 1.3, 1.4, 1.5],
            mana_levels: vec![50.0, 100.0, 150.0, 200.0, 350.0, 500.0],
            faction_start_gold: 1500,
            castle_spells: vec![
                SpellId::Explosion,
                SpellId::SpeedUp,
                SpellId::SpeedDown,
                SpellId::Teleport,
            ],
            unit: UnitStats::default(),
            flocking: FlockingParams::default(),
            nav_scale: 32.0,
            ai: AiCadence::default(),
        }
    }
}

impl GameConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn sq_castle_activation_dist(&self) -> f32 {
        self.castle_activation_dist * self.castle_activation_dist
    }

    /// Resolves stat levels into concrete player attributes.
    ///
    /// Levels past the end of a table clamp to the last entry.
    pub fn character_attributes(&self, stats: &CharacterStats) -> CharacterAttributes {
        CharacterAttributes {
            max_health: level_lookup(&self.health_levels, stats.health),
            speed: level_lookup(&self.speed_levels, stats.speed),
            power: level_lookup(&self.power_levels, stats.magic_power),
            max_mana: level_lookup(&self.mana_levels, stats.magic_stamina),
        }
    }
}

fn level_lookup(table: &[f32], level: u8) -> f32 {
    match table.get(level as usize) {
        Some(value) => *value,
        None => table.last().copied().unwrap_or(0.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitStats {
    pub buy_cost: u32,
    pub max_health: f32,
    pub mass: f32,
    pub max_vel: f32,
    pub max_acc: f32,
    pub desired_speed: f32,
    pub desired_leader_dist: (f32, f32),
    pub sq_fire_radius: f32,
    pub sq_engage_radius: f32,
    pub max_targets: usize,
    /// Added to firing intensity each tick while in range.
    pub intensity_ramp: f32,
    pub income: u32,
    pub spawn_jitter: f32,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self {
            buy_cost: 100,
            max_health: 100.0,
            mass: 10.0,
            max_vel: 1.0,
            max_acc: 0.05,
            desired_speed: 0.75,
            desired_leader_dist: (50.0, 60.0),
            sq_fire_radius: 50.0 * 50.0,
            sq_engage_radius: 100.0 * 100.0,
            max_targets: 1,
            intensity_ramp: 0.01,
            income: 0,
            spawn_jitter: 15.0,
        }
    }
}

impl UnitStats {
    pub fn radius(&self) -> f32 {
        self.mass.cbrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockingParams {
    pub sq_cohesion_dist: f32,
    pub sq_separation_dist: f32,
    pub cohesion_factor: f32,
    pub separation_factor: f32,
    pub align_factor: f32,
    pub separation_strength: f32,
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self {
            sq_cohesion_dist: 250.0 * 250.0,
            sq_separation_dist: 75.0 * 75.0,
            cohesion_factor: 0.1,
            separation_factor: 2.0,
            align_factor: 40.0,
            separation_strength: 0.03,
        }
    }
}

/// Tick intervals for the AI state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiCadence {
    pub state_every: u64,
    pub behaviour_every: u64,
    pub replan_every: u64,
}

impl Default for AiCadence {
    fn default() -> Self {
        Self {
            state_every: 40,
            behaviour_every: 10,
            replan_every: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitClass {
    LaserDrone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpellId {
    Explosion,
    SpeedUp,
    SpeedDown,
    Teleport,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpellEffect {
    Damage,
    Speed,
    Teleport,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpellStats {
    pub cast_cost: f32,
    pub buy_cost: u32,
    pub cast_range: f32,
    pub effect_range: f32,
    pub effect: SpellEffect,
    pub amount: f32,
    /// Seconds; zero for instant effects.
    pub duration: f32,
}

impl SpellId {
    pub fn stats(self) -> SpellStats {
        match self {
            SpellId::Explosion => SpellStats {
                cast_cost: 50.0,
                buy_cost: 1000,
                cast_range: 400.0,
                effect_range: 100.0,
                effect: SpellEffect::Damage,
                amount: 100.0,
                duration: 0.0,
            },
            SpellId::SpeedUp => SpellStats {
                cast_cost: 15.0,
                buy_cost: 1000,
                cast_range: 400.0,
                effect_range: 100.0,
                effect: SpellEffect::Speed,
                amount: 0.5,
                duration: 10.0,
            },
            SpellId::SpeedDown => SpellStats {
                cast_cost: 15.0,
                buy_cost: 1000,
                cast_range: 400.0,
                effect_range: 100.0,
                effect: SpellEffect::Speed,
                amount: -0.5,
                duration: 10.0,
            },
            SpellId::Teleport => SpellStats {
                cast_cost: 20.0,
                buy_cost: 1000,
                cast_range: 800.0,
                effect_range: 100.0,
                effect: SpellEffect::Teleport,
                amount: 0.0,
                duration: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Faction {
    Mech,
    Wild,
    Mage,
    Spirit,
}

/// Stat levels chosen at character creation, each indexing a level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStats {
    pub health: u8,
    pub speed: u8,
    pub magic_power: u8,
    pub magic_stamina: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub faction: Faction,
    pub stats: CharacterStats,
}

impl Character {
    /// Stand-in for seats nobody joined to fill.
    pub fn ai_default() -> Self {
        Self {
            name: "Kitty".to_string(),
            faction: Faction::Wild,
            stats: CharacterStats {
                health: 3,
                speed: 3,
                magic_power: 3,
                magic_stamina: 3,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterAttributes {
    pub max_health: f32,
    pub speed: f32,
    pub power: f32,
    pub max_mana: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_character_attributes_from_levels() {
        let config = GameConfig::default();
        let attrs = config.character_attributes(&CharacterStats {
            health: 0,
            speed: 2,
            magic_power: 5,
            magic_stamina: 1,
        });
        assert_approx_eq!(attrs.max_health, 500.0);
        assert_approx_eq!(attrs.speed, 1.0);
        assert_approx_eq!(attrs.power, 1.5);
        assert_approx_eq!(attrs.max_mana, 100.0);
    }

    #[test]
    fn test_out_of_range_level_clamps() {
        let config = GameConfig::default();
        let attrs = config.character_attributes(&CharacterStats {
            health: 42,
            speed: 0,
            magic_power: 0,
            magic_stamina: 0,
        });
        assert_approx_eq!(attrs.max_health, 3000.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = GameConfig::from_json(r#"{ "castle_income": 250, "day_length": 5.0 }"#)
            .expect("config should parse");
        assert_eq!(config.castle_income, 250);
        assert_approx_eq!(config.day_length, 5.0);
        assert_eq!(config.n_player_game, 2);
        assert_eq!(config.unit.buy_cost, 100);
    }

    #[test]
    fn test_unit_radius_from_mass() {
        let stats = UnitStats {
            mass: 27.0,
            ..UnitStats::default()
        };
        assert_approx_eq!(stats.radius(), 3.0, 1e-5);
    }
}
