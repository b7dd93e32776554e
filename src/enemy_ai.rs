use bevy::prelude::*;
use rand::Rng;

use crate::{
    arena::Arena,
    balance::{Balance, RangedBalance},
    combat::CombatSystem,
    enemies::{EnemyKind, EnemyStore},
    player::Player,
    run_state::RunClock,
    RunRng, RunTick,
};

pub struct EnemyAiPlugin;

impl Plugin for EnemyAiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<EnemyStore>()
            .add_systems(Update, enemy_ai_system.in_set(RunTick::Enemies));
    }
}

/// A shot requested by a ranged enemy. The combat system turns it into a
/// projectile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnemyShot {
    pub pos: Vec2,
    pub dir: Vec2,
    pub damage: f32,
    pub speed: f32,
    pub radius: f32,
}

/// Ranged enemies fire faster as the run goes on, up to `rate_cap`.
pub fn ranged_rate_multiplier(cfg: &RangedBalance, run_time: f32) -> f32 {
    let cap = cfg.rate_cap.max(1.0);
    let k = if cfg.rate_ramp_seconds > 0.0 {
        (run_time.max(0.0) / cfg.rate_ramp_seconds).clamp(0.0, 1.0)
    } else {
        1.0
    };
    1.0 + (cap - 1.0) * k
}

/// Moves every live enemy and runs ranged cooldowns.
///
/// Melee kinds walk straight at the player. Ranged kinds keep to the
/// `[desired_min, desired_max]` band (back off when too close, close in when
/// too far, stand still inside it) and fire through `shoot` whenever their
/// cooldown is up and the player is within `shoot_range`.
pub fn update_enemies(
    enemies: &mut EnemyStore,
    player_pos: Vec2,
    dt: f32,
    run_time: f32,
    cfg: &RangedBalance,
    rng: &mut impl Rng,
    mut shoot: impl FnMut(EnemyShot),
) {
    let dt = dt.max(0.0);
    let rate_mul = ranged_rate_multiplier(cfg, run_time);

    for (_, enemy) in enemies.iter_mut() {
        if !enemy.is_alive() {
            continue;
        }
        let to_player = player_pos - enemy.pos;
        let dist = to_player.length();
        let Some(dir) = to_player.try_normalize() else {
            continue;
        };

        if enemy.kind != EnemyKind::Ranged {
            enemy.pos += dir * enemy.speed * dt;
            continue;
        }

        if dist < cfg.desired_min {
            enemy.pos -= dir * enemy.speed * dt;
        } else if dist > cfg.desired_max {
            enemy.pos += dir * enemy.speed * dt;
        }

        enemy.shoot_cooldown -= dt;
        if enemy.shoot_cooldown <= 0.0 && dist <= cfg.shoot_range {
            shoot(EnemyShot {
                pos: enemy.pos,
                dir,
                damage: cfg.projectile_damage.max(0.0),
                speed: cfg.projectile_speed.max(0.0),
                radius: cfg.projectile_radius.max(0.0),
            });
            let mut next = cfg.base_cooldown.max(0.05) / rate_mul;
            if enemy.elite && rng.gen_bool(cfg.elite_jitter_chance.clamp(0.0, 1.0) as f64) {
                next *= cfg.elite_jitter_mul.clamp(0.0, 1.0);
            }
            enemy.shoot_cooldown = next;
        }
    }
}

fn enemy_ai_system(
    time: Res<Time>,
    balance: Res<Balance>,
    arena: Res<Arena>,
    clock: Res<RunClock>,
    player: Res<Player>,
    mut enemies: ResMut<EnemyStore>,
    mut combat: ResMut<CombatSystem>,
    mut rng: ResMut<RunRng>,
) {
    update_enemies(
        &mut enemies,
        player.pos,
        time.delta_secs(),
        clock.elapsed,
        &balance.spawning.ranged,
        &mut rng.0,
        |shot| combat.spawn_enemy_projectile(shot),
    );

    // Kiting ranged enemies stay inside the arena.
    for (_, enemy) in enemies.iter_mut() {
        enemy.pos = arena.clamp(enemy.pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{balance::EnemiesBalance, enemies::Enemy};
    use rand::{rngs::StdRng, SeedableRng};

    fn ranged_at(pos: Vec2) -> Enemy {
        Enemy::new(
            EnemyKind::Ranged,
            &EnemiesBalance::default().ranged,
            pos,
            1.0,
        )
    }

    #[test]
    fn melee_enemies_close_in() {
        let mut store = EnemyStore::default();
        let id = store.insert(Enemy::new(
            EnemyKind::Normal,
            &EnemiesBalance::default().normal,
            Vec2::new(100.0, 0.0),
            1.0,
        ));
        let cfg = RangedBalance::default();
        let mut rng = StdRng::seed_from_u64(1);
        update_enemies(&mut store, Vec2::ZERO, 0.5, 0.0, &cfg, &mut rng, |_| {});
        let x = store.get(id).map(|e| e.pos.x).unwrap_or_default();
        assert!((x - 65.0).abs() < 1e-3);
    }

    #[test]
    fn ranged_enemies_kite_inside_band() {
        let cfg = RangedBalance::default();
        let mut store = EnemyStore::default();
        let close = store.insert(ranged_at(Vec2::new(100.0, 0.0)));
        let held = store.insert(ranged_at(Vec2::new(200.0, 0.0)));
        let far = store.insert(ranged_at(Vec2::new(400.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(1);
        update_enemies(&mut store, Vec2::ZERO, 0.1, 0.0, &cfg, &mut rng, |_| {});

        assert!(store.get(close).map(|e| e.pos.x).unwrap_or_default() > 100.0);
        assert_eq!(store.get(held).map(|e| e.pos.x), Some(200.0));
        assert!(store.get(far).map(|e| e.pos.x).unwrap_or(1000.0) < 400.0);
    }

    #[test]
    fn ranged_fire_resets_cooldown_by_rate() {
        let cfg = RangedBalance::default();
        let mut store = EnemyStore::default();
        let id = store.insert(ranged_at(Vec2::new(200.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(1);
        let mut shots = Vec::new();

        update_enemies(&mut store, Vec2::ZERO, 0.1, 0.0, &cfg, &mut rng, |s| shots.push(s));
        assert_eq!(shots.len(), 1);
        assert!((shots[0].dir - Vec2::new(-1.0, 0.0)).length() < 1e-5);
        let cooldown = store.get(id).map(|e| e.shoot_cooldown).unwrap_or_default();
        assert!((cooldown - cfg.base_cooldown).abs() < 1e-5);

        // Late in the run the cooldown shrinks by the rate cap.
        if let Some(enemy) = store.get_mut(id) {
            enemy.shoot_cooldown = 0.0;
        }
        let late = 10_000.0;
        update_enemies(&mut store, Vec2::ZERO, 0.1, late, &cfg, &mut rng, |s| shots.push(s));
        let cooldown = store.get(id).map(|e| e.shoot_cooldown).unwrap_or_default();
        assert!((cooldown - cfg.base_cooldown / cfg.rate_cap).abs() < 1e-5);
    }

    #[test]
    fn out_of_range_ranged_enemies_hold_fire() {
        let cfg = RangedBalance::default();
        let mut store = EnemyStore::default();
        store.insert(ranged_at(Vec2::new(1000.0, 0.0)));
        let mut rng = StdRng::seed_from_u64(1);
        let mut fired = 0;
        update_enemies(&mut store, Vec2::ZERO, 0.1, 0.0, &cfg, &mut rng, |_| fired += 1);
        assert_eq!(fired, 0);
    }

    #[test]
    fn only_elites_get_the_cooldown_jitter() {
        let cfg = RangedBalance {
            elite_jitter_chance: 1.0,
            ..Default::default()
        };
        let mut store = EnemyStore::default();
        let mut elite = ranged_at(Vec2::new(200.0, 0.0));
        elite.elite = true;
        let elite = store.insert(elite);
        let plain = store.insert(ranged_at(Vec2::new(0.0, 200.0)));
        let mut rng = StdRng::seed_from_u64(9);
        let mut fired = 0;
        update_enemies(&mut store, Vec2::ZERO, 0.1, 0.0, &cfg, &mut rng, |_| fired += 1);
        assert_eq!(fired, 2);

        let cooldown = |id| store.get(id).map(|e| e.shoot_cooldown).unwrap_or_default();
        let jittered = cfg.base_cooldown * cfg.elite_jitter_mul;
        assert!((cooldown(elite) - jittered).abs() < 1e-5);
        assert!((cooldown(plain) - cfg.base_cooldown).abs() < 1e-5);
    }
}
