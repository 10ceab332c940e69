//! Day cycle and income distribution.

use crate::registry::EntityRegistry;
use log::debug;
use shared::{ClientId, Combatant, GameConfig};

/// Tracks time into the current economy day.
#[derive(Debug, Clone)]
pub struct DayClock {
    length: f32,
    elapsed: f32,
    day: u64,
}

impl DayClock {
    pub fn new(length: f32) -> Self {
        Self {
            length: length.max(f32::EPSILON),
            elapsed: 0.0,
            day: 0,
        }
    }

    /// Resumes a clock partway through a day, e.g. on a newly promoted host.
    pub fn resume(length: f32, elapsed: f32) -> Self {
        let mut clock = Self::new(length);
        clock.elapsed = elapsed.clamp(0.0, clock.length);
        clock
    }

    /// Advances by `dt` seconds, returning how many days rolled over.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.elapsed += dt.max(0.0);
        let mut rollovers = 0;
        while self.elapsed >= self.length {
            self.elapsed -= self.length;
            self.day += 1;
            rollovers += 1;
        }
        rollovers
    }

    /// Seconds elapsed in the current day.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Fraction of the current day that has passed, in `[0, 1)`.
    pub fn phase(&self) -> f32 {
        self.elapsed / self.length
    }

    pub fn day(&self) -> u64 {
        self.day
    }
}

/// Gold a player earns at the start of a day.
pub fn daily_income(registry: &EntityRegistry, player: &ClientId, config: &GameConfig) -> u32 {
    let Some(me) = registry.players.get(player) else {
        return 0;
    };
    let castles: u32 = me
        .castle_ids
        .iter()
        .filter_map(|id| registry.castles.get(id))
        .filter(|castle| castle.is_alive() && castle.owner == *player)
        .map(|castle| castle.income)
        .sum();
    let neutrals: u32 = registry
        .neutrals
        .values()
        .filter(|neutral| neutral.owner.as_ref() == Some(player))
        .map(|neutral| neutral.income)
        .sum();
    let units = registry.ledger().count_for(&player.entity()) as u32 * config.unit.income;
    me.income + castles + neutrals + units
}

/// Pays every living player and refills their mana.
pub fn distribute_income(registry: &mut EntityRegistry, config: &GameConfig) {
    let payouts: Vec<(ClientId, u32)> = registry
        .players
        .values()
        .filter(|player| player.is_alive())
        .map(|player| (player.id.clone(), daily_income(registry, &player.id, config)))
        .collect();

    for (id, amount) in payouts {
        if let Some(player) = registry.players.get_mut(&id) {
            player.gold = player.gold.saturating_add(amount);
            player.mana = player.max_mana;
            debug!("{} earned {} gold, now {}", id, amount, player.gold);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::two_player_registry;
    use assert_approx_eq::assert_approx_eq;
    use shared::{Neutral, NeutralKind, NeutralSpawn, Vector2};

    #[test]
    fn test_clock_rollover() {
        let mut clock = DayClock::new(30.0);
        assert_eq!(clock.advance(29.0), 0);
        assert_eq!(clock.advance(2.0), 1);
        assert_approx_eq!(clock.elapsed(), 1.0, 1e-4);
        assert_eq!(clock.day(), 1);
        assert_eq!(clock.advance(65.0), 2);
        assert!(clock.phase() < 1.0);
    }

    #[test]
    fn test_income_counts_castles_and_mines() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        let mut mine = Neutral::from_spawn(
            &NeutralSpawn {
                id: "mine".to_string(),
                kind: NeutralKind::GoldMine,
                pos: Vector2::ZERO,
                waypoints: Vec::new(),
                units: 0,
            },
            &config,
        );
        mine.owner = Some(ClientId::from("p1"));
        mine.team = Some(0);
        registry.add_neutral(mine);

        let p1 = ClientId::from("p1");
        assert_eq!(
            daily_income(&registry, &p1, &config),
            config.castle_income + config.mine_income + config.player_self_income
        );
        assert_eq!(daily_income(&registry, &ClientId::from("p2"), &config), config.castle_income);
    }

    #[test]
    fn test_distribution_skips_dead_and_refills_mana() {
        let config = GameConfig::default();
        let mut registry = two_player_registry();
        let p1 = ClientId::from("p1");
        let p2 = ClientId::from("p2");
        registry.players.get_mut(&p1).unwrap().mana = 0.0;
        registry.handle_death(&p2.entity());
        let gold_before = registry.players[&p2].gold;

        distribute_income(&mut registry, &config);

        let player = &registry.players[&p1];
        assert_eq!(player.gold, config.faction_start_gold + config.castle_income);
        assert_approx_eq!(player.mana, player.max_mana);
        assert_eq!(registry.players[&p2].gold, gold_before);
    }
}
