use bevy::prelude::*;
use rand::Rng;

use crate::{
    arena::{point_on_ring, Arena},
    balance::{Balance, BossBalance, DirectorBalance, SpawningBalance},
    enemies::{Enemy, EnemyKind, EnemyStore},
    player::Player,
    run_state::RunClock,
    RunRng, RunTick,
};

pub struct SpawnDirectorPlugin;

impl Plugin for SpawnDirectorPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SpawnDirector>()
            .add_systems(Update, spawn_enemies_system.in_set(RunTick::Spawn));
    }
}

/// Turns run time and crowd size into "spawn N enemies this tick".
///
/// Only the countdown is stateful; the interval itself is a pure function
/// of its inputs (see `interval`). Creating the enemies is the caller's job.
#[derive(Resource, Default, Debug)]
pub struct SpawnDirector {
    timer: f32,
}

impl SpawnDirector {
    /// Primes the countdown so the first spawn waits `initial_delay` seconds.
    pub fn reset(&mut self, initial_delay: f32) {
        self.timer = initial_delay.max(0.0);
    }

    pub fn timer(&self) -> f32 {
        self.timer
    }

    /// Seconds between spawns at this moment of the run.
    pub fn interval(cfg: &DirectorBalance, run_time: f32, alive: usize, external_mul: f32) -> f32 {
        let run_time = run_time.max(0.0);

        let t0 = if cfg.ramp_seconds > 0.0 {
            (run_time / cfg.ramp_seconds).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let t = t0.powf(cfg.ramp_pow.max(0.01));
        let base = cfg.max_interval + (cfg.min_interval - cfg.max_interval) * t;

        // Crowding only ever slows spawning down.
        let crowd_cap = cfg.crowd_mul_cap.max(1.0);
        let crowd = (1.0 + alive as f32 / cfg.crowd_div.max(1.0)).min(crowd_cap);

        let soft = if cfg.start_soft_seconds > 0.0 && run_time < cfg.start_soft_seconds {
            let k = run_time / cfg.start_soft_seconds;
            cfg.start_soft_mul + (1.0 - cfg.start_soft_mul) * k
        } else {
            1.0
        };

        let spike = if run_time < cfg.end_spike_start_sec {
            1.0
        } else {
            let k = if cfg.end_spike_ramp_seconds > 0.0 {
                ((run_time - cfg.end_spike_start_sec) / cfg.end_spike_ramp_seconds).clamp(0.0, 1.0)
            } else {
                1.0
            };
            1.0 + (cfg.end_spike_mul - 1.0) * k
        };

        let external = external_mul.clamp(0.5, 3.0);

        (base * crowd * soft * spike * external).max(0.01)
    }

    /// Advances the countdown and returns how many enemies to spawn now.
    pub fn update(
        &mut self,
        dt: f32,
        cfg: &DirectorBalance,
        run_time: f32,
        alive: usize,
        external_mul: f32,
    ) -> u32 {
        let interval = Self::interval(cfg, run_time, alive, external_mul);
        self.timer -= dt.max(0.0);

        let mut count = 0;
        while self.timer <= 0.0 && count < cfg.max_spawns_per_frame {
            self.timer += interval;
            count += 1;
        }
        count
    }
}

// ── Enemy instantiation ─────────────────────────────────────────────────────

/// Picks a kind among those unlocked at `run_time`, weighted by the balance.
pub fn roll_enemy_kind(cfg: &SpawningBalance, run_time: f32, rng: &mut impl Rng) -> EnemyKind {
    let e = &cfg.enemies;
    let mut pool = vec![(EnemyKind::Normal, e.normal_weight.max(0.0))];
    if run_time >= e.fast_unlock_seconds {
        pool.push((EnemyKind::Fast, e.fast_weight.max(0.0)));
    }
    if run_time >= e.ranged_unlock_seconds {
        pool.push((EnemyKind::Ranged, e.ranged_weight.max(0.0)));
    }
    if run_time >= e.tank_unlock_seconds {
        pool.push((EnemyKind::Tank, e.tank_weight.max(0.0)));
    }

    let total: f32 = pool.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return EnemyKind::Normal;
    }
    let mut roll = rng.gen::<f32>() * total;
    for (kind, weight) in &pool {
        if roll < *weight {
            return *kind;
        }
        roll -= weight;
    }
    EnemyKind::Normal
}

pub fn elite_chance(cfg: &SpawningBalance, run_time: f32) -> f32 {
    let minutes = run_time.max(0.0) / 60.0;
    (cfg.elite.base_chance + cfg.elite.chance_per_minute * minutes)
        .min(cfg.elite.max_chance)
        .clamp(0.0, 1.0)
}

/// Builds one regular enemy on the spawn ring around the player.
pub fn roll_enemy(
    cfg: &SpawningBalance,
    run_time: f32,
    difficulty_hp_mul: f32,
    player_pos: Vec2,
    arena: &Arena,
    rng: &mut impl Rng,
) -> Enemy {
    let kind = roll_enemy_kind(cfg, run_time, rng);
    let stats = match kind {
        EnemyKind::Normal => &cfg.enemies.normal,
        EnemyKind::Fast => &cfg.enemies.fast,
        EnemyKind::Tank => &cfg.enemies.tank,
        EnemyKind::Ranged => &cfg.enemies.ranged,
    };

    let minutes = run_time.max(0.0) / 60.0;
    let hp_mul = (1.0 + cfg.enemies.hp_growth_per_minute.max(0.0) * minutes) * difficulty_hp_mul;
    let pos = arena.clamp(point_on_ring(
        player_pos,
        cfg.enemies.spawn_min_distance,
        cfg.enemies.spawn_max_distance,
        rng,
    ));

    let mut enemy = Enemy::new(kind, stats, pos, hp_mul);
    if rng.gen_bool(elite_chance(cfg, run_time) as f64) {
        enemy = enemy.into_elite(&cfg.elite);
    }
    if kind.is_ranged() {
        // Stagger the first volley so a wave does not fire in lockstep.
        enemy.shoot_cooldown = cfg.ranged.base_cooldown.max(0.0) * rng.gen_range(0.5..1.0);
    }
    enemy
}

pub fn make_boss(
    cfg: &BossBalance,
    difficulty_hp_mul: f32,
    player_pos: Vec2,
    min_distance: f32,
    arena: &Arena,
    rng: &mut impl Rng,
) -> Enemy {
    let pos = arena.clamp(point_on_ring(player_pos, min_distance, min_distance, rng));
    let mut boss = Enemy::new(EnemyKind::Tank, &cfg.stats, pos, difficulty_hp_mul);
    boss.boss = true;
    boss
}

fn spawn_enemies_system(
    time: Res<Time>,
    balance: Res<Balance>,
    arena: Res<Arena>,
    player: Res<Player>,
    mut clock: ResMut<RunClock>,
    mut director: ResMut<SpawnDirector>,
    mut enemies: ResMut<EnemyStore>,
    mut rng: ResMut<RunRng>,
) {
    let spawning = &balance.spawning;
    let run_time = clock.elapsed;
    let difficulty = clock.difficulty;

    let count = director.update(
        time.delta_secs(),
        &spawning.director,
        run_time,
        enemies.alive_count(),
        difficulty.spawn_interval_mul(),
    );
    for _ in 0..count {
        if enemies.len() >= spawning.director.max_alive {
            break;
        }
        let enemy = roll_enemy(
            spawning,
            run_time,
            difficulty.enemy_hp_mul(),
            player.pos,
            &arena,
            &mut rng.0,
        );
        enemies.insert(enemy);
        clock.spawned += 1;
    }

    if !clock.boss_spawned && run_time >= spawning.boss.spawn_at_seconds {
        let boss = make_boss(
            &spawning.boss,
            difficulty.enemy_hp_mul(),
            player.pos,
            spawning.enemies.spawn_min_distance,
            &arena,
            &mut rng.0,
        );
        info!("Boss spawned at {:.0}s ({:.0} hp)", run_time, boss.hp);
        enemies.insert(boss);
        clock.boss_spawned = true;
        clock.spawned += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn never_exceeds_frame_cap_and_is_idempotent_at_zero_dt() {
        let cfg = DirectorBalance::default();
        let mut director = SpawnDirector::default();
        director.reset(0.0);

        // A huge step would owe hundreds of spawns.
        let n = director.update(1000.0, &cfg, 600.0, 0, 1.0);
        assert_eq!(n, cfg.max_spawns_per_frame);

        let mut director = SpawnDirector::default();
        director.reset(0.5);
        assert_eq!(director.update(0.0, &cfg, 0.0, 0, 1.0), 0);
        assert_eq!(director.update(0.0, &cfg, 0.0, 0, 1.0), 0);
    }

    #[test]
    fn initial_delay_holds_back_the_first_spawn() {
        let cfg = DirectorBalance::default();
        let mut director = SpawnDirector::default();
        director.reset(cfg.initial_delay);

        let mut spawned = 0;
        for _ in 0..9 {
            spawned += director.update(0.1, &cfg, 0.0, 0, 1.0);
        }
        assert_eq!(spawned, 0);

        spawned += director.update(0.15, &cfg, 0.0, 0, 1.0);
        assert_eq!(spawned, 1);
        // The next one is a full interval away.
        assert!(director.timer() > 1.0);
    }

    #[test]
    fn interval_starts_at_max_pace_and_ramps_down() {
        let mut cfg = DirectorBalance::default();
        cfg.start_soft_mul = 1.0;
        let start = SpawnDirector::interval(&cfg, 0.0, 0, 1.0);
        assert!((start - cfg.max_interval).abs() < 1e-5);

        let ramped = SpawnDirector::interval(&cfg, cfg.ramp_seconds, 0, 1.0);
        assert!((ramped - cfg.min_interval).abs() < 1e-5);

        let spiked = SpawnDirector::interval(&cfg, 10_000.0, 0, 1.0);
        assert!((spiked - cfg.min_interval * cfg.end_spike_mul).abs() < 1e-5);
    }

    #[test]
    fn soft_start_and_crowding_only_slow_spawns() {
        let cfg = DirectorBalance::default();
        let base = SpawnDirector::interval(&cfg, 200.0, 0, 1.0);
        let crowded = SpawnDirector::interval(&cfg, 200.0, 1000, 1.0);
        assert!((crowded / base - cfg.crowd_mul_cap).abs() < 1e-4);

        let soft = SpawnDirector::interval(&cfg, 0.0, 0, 1.0);
        assert!((soft - cfg.max_interval * cfg.start_soft_mul).abs() < 1e-5);

        let clamped = SpawnDirector::interval(&cfg, 200.0, 0, 100.0);
        assert!((clamped / base - 3.0).abs() < 1e-4);
    }

    #[test]
    fn kinds_unlock_over_time() {
        let cfg = SpawningBalance::default();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            assert_eq!(roll_enemy_kind(&cfg, 10.0, &mut rng), EnemyKind::Normal);
        }
        let late: Vec<EnemyKind> = (0..400)
            .map(|_| roll_enemy_kind(&cfg, 300.0, &mut rng))
            .collect();
        assert!(late.contains(&EnemyKind::Tank));
        assert!(late.contains(&EnemyKind::Ranged));
        assert!(late.contains(&EnemyKind::Fast));
    }

    #[test]
    fn rolled_enemies_land_inside_the_arena() {
        let cfg = SpawningBalance::default();
        let arena = Arena::new(600.0, 600.0);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            let enemy = roll_enemy(&cfg, 120.0, 1.0, Vec2::new(500.0, 0.0), &arena, &mut rng);
            assert!(arena.contains(enemy.pos, 0.0));
            assert!(enemy.hp > 0.0);
        }
    }
}
