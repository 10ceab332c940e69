//! Owner-indexed secondary index over units
//!
//! The ledger answers "which units does X own" without scanning the whole
//! unit map. It backs:
//! - income (units may pay their owner each day)
//! - AI strength estimates (unit count ratios)
//! - flocking (neighbours are same-owner units only)
//! - garrison transfers between a player and a castle
//!
//! Every live unit sits in exactly one `(owner, class)` bucket. Empty buckets
//! are pruned so an owner with no units has no entry at all.

use shared::{EntityId, UnitClass, UnitId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOwnershipLedger {
    /// owner -> class -> units
    buckets: BTreeMap<EntityId, BTreeMap<UnitClass, BTreeSet<UnitId>>>,
    /// Reverse lookup so removal and transfer need only the unit id
    locations: HashMap<UnitId, (EntityId, UnitClass)>,
}

impl UnitOwnershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files a unit under its owner
    ///
    /// Returns false if the unit is already indexed; a unit is never in two
    /// buckets at once.
    pub fn add(&mut self, unit: UnitId, owner: EntityId, class: UnitClass) -> bool {
        if self.locations.contains_key(&unit) {
            return false;
        }
        self.buckets
            .entry(owner.clone())
            .or_default()
            .entry(class)
            .or_default()
            .insert(unit.clone());
        self.locations.insert(unit, (owner, class));
        true
    }

    /// Drops a unit from the index, returning where it was filed
    pub fn remove(&mut self, unit: &UnitId) -> Option<(EntityId, UnitClass)> {
        let (owner, class) = self.locations.remove(unit)?;
        self.detach(unit, &owner, class);
        Some((owner, class))
    }

    fn detach(&mut self, unit: &UnitId, owner: &EntityId, class: UnitClass) {
        if let Some(classes) = self.buckets.get_mut(owner) {
            if let Some(units) = classes.get_mut(&class) {
                units.remove(unit);
                if units.is_empty() {
                    classes.remove(&class);
                }
            }
            if classes.is_empty() {
                self.buckets.remove(owner);
            }
        }
    }

    /// Moves a unit to a new owner's bucket of the same class
    ///
    /// Runs under a single `&mut self`, so no caller can observe the unit
    /// outside the index. Returns false for unknown units.
    pub fn switch_owner(&mut self, unit: &UnitId, new_owner: EntityId) -> bool {
        let Some((old_owner, class)) = self.locations.get(unit).cloned() else {
            return false;
        };
        if old_owner == new_owner {
            return true;
        }
        self.buckets
            .entry(new_owner.clone())
            .or_default()
            .entry(class)
            .or_default()
            .insert(unit.clone());
        self.detach(unit, &old_owner, class);
        self.locations.insert(unit.clone(), (new_owner, class));
        true
    }

    /// Total units of every class held by `owner`
    pub fn count_for(&self, owner: &EntityId) -> usize {
        self.buckets
            .get(owner)
            .map_or(0, |classes| classes.values().map(BTreeSet::len).sum())
    }

    pub fn count_of(&self, owner: &EntityId, class: UnitClass) -> usize {
        self.buckets
            .get(owner)
            .and_then(|classes| classes.get(&class))
            .map_or(0, BTreeSet::len)
    }

    pub fn owner_of(&self, unit: &UnitId) -> Option<&EntityId> {
        self.locations.get(unit).map(|(owner, _)| owner)
    }

    pub fn contains(&self, unit: &UnitId) -> bool {
        self.locations.contains_key(unit)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Units of one owner, all classes, in id order
    pub fn units_of(&self, owner: &EntityId) -> impl Iterator<Item = &UnitId> + '_ {
        self.buckets
            .get(owner)
            .into_iter()
            .flat_map(|classes| classes.values().flatten())
    }

    pub fn units_of_class(&self, owner: &EntityId, class: UnitClass) -> impl Iterator<Item = &UnitId> + '_ {
        self.buckets
            .get(owner)
            .and_then(|classes| classes.get(&class))
            .into_iter()
            .flatten()
    }

    pub fn for_each_of_owner(&self, owner: &EntityId, mut f: impl FnMut(&UnitId)) {
        for unit in self.units_of(owner) {
            f(unit);
        }
    }

    pub fn for_each_all(&self, mut f: impl FnMut(&EntityId, UnitClass, &UnitId)) {
        for (owner, classes) in &self.buckets {
            for (class, units) in classes {
                for unit in units {
                    f(owner, *class, unit);
                }
            }
        }
    }

    /// Owners that currently hold at least one unit
    pub fn owners(&self) -> impl Iterator<Item = &EntityId> + '_ {
        self.buckets.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: &str) -> EntityId {
        EntityId::from(id)
    }

    #[test]
    fn test_add_then_remove_restores_state() {
        let mut ledger = UnitOwnershipLedger::new();
        ledger.add(UnitId::from("u1"), owner("p1"), UnitClass::LaserDrone);
        let before = ledger.clone();

        assert!(ledger.add(UnitId::from("u2"), owner("p2"), UnitClass::LaserDrone));
        assert_eq!(ledger.count_for(&owner("p2")), 1);
        ledger.remove(&UnitId::from("u2"));

        assert_eq!(ledger, before);
        assert!(ledger.owners().all(|o| o != &owner("p2")));
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut ledger = UnitOwnershipLedger::new();
        assert!(ledger.add(UnitId::from("u1"), owner("p1"), UnitClass::LaserDrone));
        assert!(!ledger.add(UnitId::from("u1"), owner("p2"), UnitClass::LaserDrone));
        assert_eq!(ledger.owner_of(&UnitId::from("u1")), Some(&owner("p1")));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_switch_owner_moves_bucket() {
        let mut ledger = UnitOwnershipLedger::new();
        for i in 0..3 {
            ledger.add(UnitId::new(format!("u{}", i)), owner("p1"), UnitClass::LaserDrone);
        }

        assert!(ledger.switch_owner(&UnitId::from("u1"), owner("castle")));

        assert_eq!(ledger.count_for(&owner("p1")), 2);
        assert_eq!(ledger.count_of(&owner("castle"), UnitClass::LaserDrone), 1);
        assert_eq!(ledger.owner_of(&UnitId::from("u1")), Some(&owner("castle")));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_switch_last_unit_prunes_bucket() {
        let mut ledger = UnitOwnershipLedger::new();
        ledger.add(UnitId::from("u1"), owner("p1"), UnitClass::LaserDrone);
        ledger.switch_owner(&UnitId::from("u1"), owner("p2"));

        assert_eq!(ledger.owners().count(), 1);
        assert_eq!(ledger.units_of(&owner("p1")).count(), 0);
    }

    #[test]
    fn test_switch_unknown_unit() {
        let mut ledger = UnitOwnershipLedger::new();
        assert!(!ledger.switch_owner(&UnitId::from("ghost"), owner("p1")));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_iteration_helpers() {
        let mut ledger = UnitOwnershipLedger::new();
        ledger.add(UnitId::from("a"), owner("p1"), UnitClass::LaserDrone);
        ledger.add(UnitId::from("b"), owner("p1"), UnitClass::LaserDrone);
        ledger.add(UnitId::from("c"), owner("p2"), UnitClass::LaserDrone);

        let mut seen = Vec::new();
        ledger.for_each_of_owner(&owner("p1"), |unit| seen.push(unit.clone()));
        assert_eq!(seen, vec![UnitId::from("a"), UnitId::from("b")]);

        let mut total = 0;
        ledger.for_each_all(|_, _, _| total += 1);
        assert_eq!(total, 3);
        assert_eq!(ledger.units_of_class(&owner("p2"), UnitClass::LaserDrone).count(), 1);
    }
}
