use bevy::prelude::*;

use crate::{
    balance::{Balance, TargetingBalance},
    enemies::{EnemyField, EnemyId, EnemyStore},
    player::Player,
    RunTick,
};

pub struct TargetingPlugin;

impl Plugin for TargetingPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TargetingSystem>()
            .add_systems(Update, update_target_system.in_set(RunTick::Targeting));
    }
}

/// Holds the player's auto-attack target.
///
/// A target that dies is dropped on the next update, so between updates the
/// handle may point at an enemy killed this tick. Readers should go through
/// `target()`, which re-checks liveness.
#[derive(Resource, Default, Debug)]
pub struct TargetingSystem {
    target: Option<EnemyId>,
    retarget_cooldown: f32,
}

impl TargetingSystem {
    pub fn update(
        &mut self,
        dt: f32,
        player_pos: Vec2,
        field: &impl EnemyField,
        cfg: &TargetingBalance,
    ) {
        let range = cfg.range.max(0.0);
        let lose_d2 = (range * cfg.lose_margin.max(1.0)).powi(2);

        // Drop a target that died or wandered out past the hysteresis margin.
        if let Some(current) = self.target {
            let keep = field.is_alive(current)
                && field
                    .position(current)
                    .is_some_and(|pos| pos.distance_squared(player_pos) <= lose_d2);
            if !keep {
                self.target = None;
            }
        }

        self.retarget_cooldown -= dt.max(0.0);
        if self.retarget_cooldown > 0.0 && self.target.is_some() {
            return;
        }
        self.retarget_cooldown = cfg.retarget_interval.max(0.0);

        let Some(candidate) = field.nearest_alive(player_pos, range, |_| false) else {
            return;
        };
        let Some(candidate_pos) = field.position(candidate) else {
            return;
        };
        let candidate_d2 = candidate_pos.distance_squared(player_pos);

        let current_d2 = self
            .target
            .and_then(|current| field.position(current))
            .map(|pos| pos.distance_squared(player_pos));

        match current_d2 {
            None => self.target = Some(candidate),
            Some(current_d2) if candidate_d2 < cfg.hysteresis_mul.max(0.0) * current_d2 => {
                self.target = Some(candidate);
            }
            Some(_) => {}
        }
    }

    /// The current target if it is still alive.
    pub fn target(&self, field: &impl EnemyField) -> Option<EnemyId> {
        self.target.filter(|id| field.is_alive(*id))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn update_target_system(
    time: Res<Time>,
    balance: Res<Balance>,
    player: Res<Player>,
    enemies: Res<EnemyStore>,
    mut targeting: ResMut<TargetingSystem>,
) {
    targeting.update(time.delta_secs(), player.pos, &*enemies, &balance.targeting);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemies::tests::dummy;

    fn cfg() -> TargetingBalance {
        TargetingBalance::default()
    }

    #[test]
    fn acquires_nearest_in_range() {
        let mut store = EnemyStore::default();
        let _far = store.insert(dummy(Vec2::new(300.0, 0.0), 5.0));
        let near = store.insert(dummy(Vec2::new(100.0, 0.0), 5.0));
        let _out = store.insert(dummy(Vec2::new(900.0, 0.0), 5.0));

        let mut targeting = TargetingSystem::default();
        targeting.update(0.016, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), Some(near));
    }

    #[test]
    fn holds_target_until_candidate_is_clearly_closer() {
        let mut store = EnemyStore::default();
        let first = store.insert(dummy(Vec2::new(100.0, 0.0), 5.0));
        let mut targeting = TargetingSystem::default();
        targeting.update(0.016, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), Some(first));

        // 95^2 is not below 0.8 * 100^2, so no switch.
        let slightly_closer = store.insert(dummy(Vec2::new(0.0, 95.0), 5.0));
        targeting.update(1.0, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), Some(first));

        // 50^2 is well below it.
        let clearly_closer = store.insert(dummy(Vec2::new(-50.0, 0.0), 5.0));
        targeting.update(1.0, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), Some(clearly_closer));
        assert_ne!(targeting.target(&store), Some(slightly_closer));
    }

    #[test]
    fn cooldown_suppresses_rescans_while_target_held() {
        let mut store = EnemyStore::default();
        let first = store.insert(dummy(Vec2::new(200.0, 0.0), 5.0));
        let mut targeting = TargetingSystem::default();
        targeting.update(0.0, Vec2::ZERO, &store, &cfg());

        store.insert(dummy(Vec2::new(10.0, 0.0), 5.0));
        targeting.update(0.05, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), Some(first));
    }

    #[test]
    fn dead_or_distant_targets_are_dropped() {
        let mut store = EnemyStore::default();
        let only = store.insert(dummy(Vec2::new(100.0, 0.0), 5.0));
        let mut targeting = TargetingSystem::default();
        targeting.update(0.0, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), Some(only));

        // Beyond 420 * 1.1 = 462.
        if let Some(enemy) = store.get_mut(only) {
            enemy.pos = Vec2::new(470.0, 0.0);
        }
        targeting.update(0.0, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), None);

        if let Some(enemy) = store.get_mut(only) {
            enemy.pos = Vec2::new(50.0, 0.0);
        }
        targeting.update(1.0, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), Some(only));
        store.damage(only, 100.0);
        targeting.update(0.0, Vec2::ZERO, &store, &cfg());
        assert_eq!(targeting.target(&store), None);
    }
}
