use bevy::prelude::*;

use crate::balance::{EliteBalance, EnemyStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnemyKind {
    Normal,
    Fast,
    Tank,
    Ranged,
}

impl EnemyKind {
    pub fn is_ranged(self) -> bool {
        self == EnemyKind::Ranged
    }
}

/// Stable handle into the `EnemyStore`.
///
/// A handle outlives the enemy it points at: once the slot is reused the
/// generation no longer matches and every lookup returns `None`. Chain
/// lightning keys its visited set on these, never on positions or values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnemyId {
    index: u32,
    generation: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Enemy {
    pub pos: Vec2,
    pub hp: f32,
    pub max_hp: f32,
    pub speed: f32,
    pub contact_damage: f32,
    pub radius: f32,
    pub xp: u32,
    pub gold: u32,
    pub kind: EnemyKind,
    pub elite: bool,
    pub boss: bool,
    /// Seconds until a ranged enemy may shoot again. Unused by other kinds.
    pub shoot_cooldown: f32,
}

impl Enemy {
    pub fn new(kind: EnemyKind, stats: &EnemyStats, pos: Vec2, hp_mul: f32) -> Self {
        let hp = (stats.hp * hp_mul.max(0.01)).max(1.0);
        Self {
            pos,
            hp,
            max_hp: hp,
            speed: stats.speed.max(0.0),
            contact_damage: stats.contact_damage.max(0.0),
            radius: stats.radius.max(1.0),
            xp: stats.xp,
            gold: stats.gold,
            kind,
            elite: false,
            boss: false,
            shoot_cooldown: 0.0,
        }
    }

    /// Scales this enemy into its elite variant.
    pub fn into_elite(mut self, elite: &EliteBalance) -> Self {
        self.elite = true;
        self.hp *= elite.hp_mul.max(1.0);
        self.max_hp = self.hp;
        self.contact_damage *= elite.damage_mul.max(1.0);
        self.radius *= elite.radius_mul.max(1.0);
        self.xp = self.xp.saturating_mul(elite.reward_mul.max(1));
        self.gold = self.gold.saturating_mul(elite.reward_mul.max(1));
        self
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0.0
    }

    /// Take damage. Returns true if this hit killed the enemy.
    pub fn take_damage(&mut self, damage: f32) -> bool {
        if !self.is_alive() || damage <= 0.0 {
            return false;
        }
        self.hp = (self.hp - damage).max(0.0);
        self.hp <= 0.0
    }
}

/// What a single `EnemyField::damage` call did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DamageDealt {
    pub pos: Vec2,
    pub amount: f32,
    pub killed: bool,
}

/// "Positioned, damageable enemies" as seen by combat, targeting and items.
///
/// Those systems are generic over this trait so they never depend on how
/// enemies are stored. Stale handles are a normal outcome: every lookup
/// returns `None`/`false` for them.
pub trait EnemyField {
    /// Every handle currently stored, in iteration order. May include
    /// enemies that died this tick and have not been reaped yet.
    fn enemy_ids(&self) -> Vec<EnemyId>;

    fn is_alive(&self, id: EnemyId) -> bool;

    fn position(&self, id: EnemyId) -> Option<Vec2>;

    fn radius(&self, id: EnemyId) -> Option<f32>;

    /// Applies damage to a live enemy. `None` if the handle is stale or the
    /// enemy is already dead.
    fn damage(&mut self, id: EnemyId, amount: f32) -> Option<DamageDealt>;

    /// Nearest live enemy within `max_range` of `from`, skipping any handle
    /// for which `exclude` returns true.
    fn nearest_alive(
        &self,
        from: Vec2,
        max_range: f32,
        exclude: impl Fn(EnemyId) -> bool,
    ) -> Option<EnemyId> {
        let max_d2 = max_range.max(0.0).powi(2);
        let mut best: Option<(EnemyId, f32)> = None;
        for id in self.enemy_ids() {
            if exclude(id) || !self.is_alive(id) {
                continue;
            }
            let Some(pos) = self.position(id) else {
                continue;
            };
            let d2 = pos.distance_squared(from);
            if d2 > max_d2 {
                continue;
            }
            if best.map_or(true, |(_, best_d2)| d2 < best_d2) {
                best = Some((id, d2));
            }
        }
        best.map(|(id, _)| id)
    }
}

struct Slot {
    generation: u32,
    enemy: Option<Enemy>,
}

/// Generational slot map owning every live enemy of the run.
#[derive(Resource, Default)]
pub struct EnemyStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl EnemyStore {
    pub fn insert(&mut self, enemy: Enemy) -> EnemyId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.enemy = Some(enemy);
            return EnemyId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            enemy: Some(enemy),
        });
        EnemyId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: EnemyId) -> Option<&Enemy> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.enemy.as_ref())
    }

    pub fn get_mut(&mut self, id: EnemyId) -> Option<&mut Enemy> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.enemy.as_mut())
    }

    /// Number of stored enemies (alive or awaiting reaping).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn alive_count(&self) -> usize {
        self.iter().filter(|(_, e)| e.is_alive()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EnemyId, &Enemy)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.enemy.as_ref().map(|enemy| {
                (
                    EnemyId {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    enemy,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EnemyId, &mut Enemy)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.enemy.as_mut().map(|enemy| {
                (
                    EnemyId {
                        index: i as u32,
                        generation,
                    },
                    enemy,
                )
            })
        })
    }

    /// Removes every enemy with hp <= 0 and hands them back so the caller
    /// can emit kill events and drop loot.
    pub fn remove_dead(&mut self) -> Vec<(EnemyId, Enemy)> {
        let mut removed = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let dead = slot.enemy.as_ref().is_some_and(|e| !e.is_alive());
            if !dead {
                continue;
            }
            let id = EnemyId {
                index: i as u32,
                generation: slot.generation,
            };
            if let Some(enemy) = slot.enemy.take() {
                removed.push((id, enemy));
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(i as u32);
            self.len -= 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}

impl EnemyField for EnemyStore {
    fn enemy_ids(&self) -> Vec<EnemyId> {
        self.iter().map(|(id, _)| id).collect()
    }

    fn is_alive(&self, id: EnemyId) -> bool {
        self.get(id).is_some_and(Enemy::is_alive)
    }

    fn position(&self, id: EnemyId) -> Option<Vec2> {
        self.get(id).map(|e| e.pos)
    }

    fn radius(&self, id: EnemyId) -> Option<f32> {
        self.get(id).map(|e| e.radius)
    }

    fn damage(&mut self, id: EnemyId, amount: f32) -> Option<DamageDealt> {
        let enemy = self.get_mut(id)?;
        if !enemy.is_alive() {
            return None;
        }
        let before = enemy.hp;
        let killed = enemy.take_damage(amount);
        Some(DamageDealt {
            pos: enemy.pos,
            amount: before - enemy.hp,
            killed,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn dummy(pos: Vec2, hp: f32) -> Enemy {
        let mut enemy = Enemy::new(EnemyKind::Normal, &EnemyStats::default(), pos, 1.0);
        enemy.hp = hp;
        enemy.max_hp = hp;
        enemy.radius = 10.0;
        enemy
    }

    #[test]
    fn damage_clamps_at_zero_and_reports_kill_once() {
        let mut store = EnemyStore::default();
        let id = store.insert(dummy(Vec2::ZERO, 10.0));

        let hit = store.damage(id, 25.0).expect("alive");
        assert!(hit.killed);
        assert_eq!(hit.amount, 10.0);
        assert_eq!(store.get(id).map(|e| e.hp), Some(0.0));
        assert!(store.damage(id, 5.0).is_none());
    }

    #[test]
    fn stale_handles_do_not_resolve_after_reuse() {
        let mut store = EnemyStore::default();
        let first = store.insert(dummy(Vec2::ZERO, 1.0));
        store.damage(first, 1.0);
        let removed = store.remove_dead();
        assert_eq!(removed.len(), 1);
        assert!(store.is_empty());

        let second = store.insert(dummy(Vec2::X, 5.0));
        assert_ne!(first, second);
        assert!(store.get(first).is_none());
        assert!(!store.is_alive(first));
        assert_eq!(store.position(second), Some(Vec2::X));
    }

    #[test]
    fn nearest_alive_skips_excluded_dead_and_far() {
        let mut store = EnemyStore::default();
        let near = store.insert(dummy(Vec2::new(5.0, 0.0), 5.0));
        let dead = store.insert(dummy(Vec2::new(1.0, 0.0), 5.0));
        let mid = store.insert(dummy(Vec2::new(20.0, 0.0), 5.0));
        let _far = store.insert(dummy(Vec2::new(500.0, 0.0), 5.0));
        store.damage(dead, 100.0);

        assert_eq!(store.nearest_alive(Vec2::ZERO, 100.0, |_| false), Some(near));
        assert_eq!(store.nearest_alive(Vec2::ZERO, 100.0, |id| id == near), Some(mid));
        assert_eq!(store.nearest_alive(Vec2::ZERO, 2.0, |_| false), None);
    }

    #[test]
    fn elite_scaling_multiplies_rewards() {
        let base = Enemy::new(EnemyKind::Tank, &EnemyStats::default(), Vec2::ZERO, 1.0);
        let elite = base.clone().into_elite(&EliteBalance::default());
        assert!(elite.elite);
        assert_eq!(elite.hp, base.hp * 4.0);
        assert_eq!(elite.xp, base.xp * 3);
    }
}
