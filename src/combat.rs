use bevy::prelude::*;
use rand::Rng;

use crate::{
    arena::Arena,
    balance::{Balance, CombatBalance},
    enemies::{EnemyField, EnemyId, EnemyStore},
    enemy_ai::EnemyShot,
    events::{EnemyHit, HitSource},
    health::PlayerHealth,
    items::ItemTriggerSystem,
    player::Player,
    progression::WeaponKind,
    RunRng, RunTick,
};

pub struct CombatPlugin;

impl Plugin for CombatPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CombatSystem>()
            .add_systems(Update, projectile_system.in_set(RunTick::Combat));
    }
}

// ── Data types ──────────────────────────────────────────────────────────────

/// A player-owned projectile.
#[derive(Clone, Debug, PartialEq)]
pub struct Projectile {
    pub pos: Vec2,
    pub vel: Vec2,
    pub damage: f32,
    pub radius: f32,
    pub weapon: WeaponKind,
    pub pierce_left: u32,
    pub ricochet_left: u32,
    pub crit: bool,
    /// Enemies this projectile already damaged. A piercing shot overlaps its
    /// victim for several ticks and must not hit it again.
    pub hits: Vec<EnemyId>,
}

impl Projectile {
    pub fn new(pos: Vec2, vel: Vec2, damage: f32, radius: f32, weapon: WeaponKind) -> Self {
        Self {
            pos,
            vel,
            damage,
            radius,
            weapon,
            pierce_left: 0,
            ricochet_left: 0,
            crit: false,
            hits: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnemyProjectile {
    pub pos: Vec2,
    pub vel: Vec2,
    pub damage: f32,
    pub radius: f32,
}

/// One enemy damaged by a player weapon, ranged or melee.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeaponHit {
    pub enemy: EnemyId,
    pub pos: Vec2,
    pub damage: f32,
    pub killed: bool,
    pub crit: bool,
    pub weapon: WeaponKind,
}

/// Owns every projectile in flight.
#[derive(Resource, Default, Debug)]
pub struct CombatSystem {
    pub player_projectiles: Vec<Projectile>,
    pub enemy_projectiles: Vec<EnemyProjectile>,
}

impl CombatSystem {
    pub fn spawn_player_projectile(&mut self, projectile: Projectile) {
        self.player_projectiles.push(projectile);
    }

    pub fn spawn_enemy_projectile(&mut self, shot: EnemyShot) {
        self.enemy_projectiles.push(EnemyProjectile {
            pos: shot.pos,
            vel: shot.dir * shot.speed,
            damage: shot.damage,
            radius: shot.radius,
        });
    }

    /// Moves player projectiles and resolves at most one enemy hit per
    /// projectile.
    ///
    /// On a hit, pierce is spent first and the projectile flies on unchanged.
    /// Without pierce, a ricochet charge redirects it at the nearest other
    /// live enemy, never slower than `min_ricochet_speed`. A projectile with
    /// nothing left to spend, or with no ricochet candidate, is removed.
    pub fn update_player_projectiles(
        &mut self,
        dt: f32,
        field: &mut impl EnemyField,
        arena: &Arena,
        cfg: &CombatBalance,
    ) -> Vec<WeaponHit> {
        let dt = dt.max(0.0);
        let margin = cfg.projectile_margin.max(0.0);
        let acquire_range = cfg.ricochet_acquire_range.max(0.0);
        let min_speed = cfg.min_ricochet_speed.max(0.0);
        let ids = field.enemy_ids();
        let mut hits = Vec::new();

        self.player_projectiles.retain_mut(|projectile| {
            projectile.pos += projectile.vel * dt;
            if !arena.contains(projectile.pos, margin) {
                return false;
            }

            let struck = ids.iter().copied().find(|id| {
                if projectile.hits.contains(id) || !field.is_alive(*id) {
                    return false;
                }
                match (field.position(*id), field.radius(*id)) {
                    (Some(pos), Some(radius)) => {
                        let reach = radius + projectile.radius;
                        pos.distance_squared(projectile.pos) <= reach * reach
                    }
                    _ => false,
                }
            });
            let Some(enemy) = struck else {
                return true;
            };
            let Some(dealt) = field.damage(enemy, projectile.damage) else {
                return true;
            };

            projectile.hits.push(enemy);
            hits.push(WeaponHit {
                enemy,
                pos: dealt.pos,
                damage: dealt.amount,
                killed: dealt.killed,
                crit: projectile.crit,
                weapon: projectile.weapon,
            });

            if projectile.pierce_left > 0 {
                projectile.pierce_left -= 1;
                return true;
            }
            if projectile.ricochet_left > 0 {
                projectile.ricochet_left -= 1;
                let already_hit = &projectile.hits;
                let next = field.nearest_alive(projectile.pos, acquire_range, |id| {
                    already_hit.contains(&id)
                });
                let Some(next_pos) = next.and_then(|id| field.position(id)) else {
                    return false;
                };
                let Some(dir) = (next_pos - projectile.pos).try_normalize() else {
                    return false;
                };
                let speed = projectile.vel.length().max(min_speed);
                projectile.vel = dir * speed;
                return true;
            }
            false
        });

        hits
    }

    /// Moves enemy projectiles. Each one that overlaps the player is removed;
    /// `on_hit_player` sees its damage only while `can_damage_player` holds.
    pub fn update_enemy_projectiles(
        &mut self,
        dt: f32,
        player_pos: Vec2,
        player_radius: f32,
        arena: &Arena,
        margin: f32,
        can_damage_player: bool,
        mut on_hit_player: impl FnMut(f32),
    ) {
        let dt = dt.max(0.0);
        let margin = margin.max(0.0);
        self.enemy_projectiles.retain_mut(|shot| {
            shot.pos += shot.vel * dt;
            if !arena.contains(shot.pos, margin) {
                return false;
            }
            let reach = shot.radius + player_radius.max(0.0);
            if shot.pos.distance_squared(player_pos) <= reach * reach {
                if can_damage_player {
                    on_hit_player(shot.damage);
                }
                return false;
            }
            true
        });
    }

    pub fn reset(&mut self) {
        self.player_projectiles.clear();
        self.enemy_projectiles.clear();
    }
}

// ── Systems ─────────────────────────────────────────────────────────────────

/// Player projectiles first (with chain-lightning procs on every hit), then
/// enemy projectiles, whose damage is queued for the player damage step.
fn projectile_system(
    time: Res<Time>,
    balance: Res<Balance>,
    arena: Res<Arena>,
    player: Res<Player>,
    mut combat: ResMut<CombatSystem>,
    mut enemies: ResMut<EnemyStore>,
    mut items: ResMut<ItemTriggerSystem>,
    mut health: ResMut<PlayerHealth>,
    mut rng: ResMut<RunRng>,
    mut enemy_hits: MessageWriter<EnemyHit>,
) {
    let dt = time.delta_secs();
    let hits = combat.update_player_projectiles(dt, &mut *enemies, &arena, &balance.combat);
    report_hits(hits, &mut enemies, &mut items, &mut rng.0, &mut enemy_hits);

    let can_damage = !health.invulnerable_after(dt);
    combat.update_enemy_projectiles(
        dt,
        player.pos,
        player.radius,
        &arena,
        balance.combat.projectile_margin,
        can_damage,
        |damage| health.queue_hit(damage),
    );
}

/// Writes an `EnemyHit` per weapon hit and runs the on-hit lightning proc.
/// Shared by projectile and melee hits.
pub(crate) fn report_hits(
    hits: impl IntoIterator<Item = WeaponHit>,
    enemies: &mut EnemyStore,
    items: &mut ItemTriggerSystem,
    rng: &mut impl Rng,
    writer: &mut MessageWriter<EnemyHit>,
) {
    for hit in hits {
        writer.write(EnemyHit {
            enemy: hit.enemy,
            pos: hit.pos,
            amount: hit.damage,
            crit: hit.crit,
            killed: hit.killed,
            source: HitSource::Weapon(hit.weapon),
        });
        for hop in items.on_enemy_hit(hit.enemy, hit.pos, enemies, rng) {
            writer.write(EnemyHit {
                enemy: hop.enemy,
                pos: hop.to,
                amount: hop.damage,
                crit: false,
                killed: hop.killed,
                source: HitSource::Lightning,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemies::tests::dummy;

    fn arena() -> Arena {
        Arena::new(1000.0, 1000.0)
    }

    fn bolt(pos: Vec2, vel: Vec2) -> Projectile {
        Projectile::new(pos, vel, 5.0, 4.0, WeaponKind::Crossbow)
    }

    #[test]
    fn pierce_is_spent_once_per_hit_before_removal() {
        let mut store = EnemyStore::default();
        let ids: Vec<EnemyId> = (0..3)
            .map(|i| store.insert(dummy(Vec2::new(100.0 + 100.0 * i as f32, 0.0), 50.0)))
            .collect();
        let mut combat = CombatSystem::default();
        let mut projectile = bolt(Vec2::new(50.0, 0.0), Vec2::new(1000.0, 0.0));
        projectile.pierce_left = 2;
        combat.spawn_player_projectile(projectile);

        let cfg = CombatBalance::default();
        let mut struck = Vec::new();
        for _ in 0..40 {
            for hit in combat.update_player_projectiles(0.01, &mut store, &arena(), &cfg) {
                struck.push(hit.enemy);
                if hit.enemy != ids[2] {
                    assert_eq!(combat.player_projectiles.len(), 1);
                }
            }
        }
        assert_eq!(struck, ids);
        assert!(combat.player_projectiles.is_empty());
    }

    #[test]
    fn ricochet_redirects_toward_next_enemy_at_min_speed() {
        let mut store = EnemyStore::default();
        let first = store.insert(dummy(Vec2::new(10.0, 0.0), 50.0));
        let second = store.insert(dummy(Vec2::new(10.0, 200.0), 50.0));
        let mut combat = CombatSystem::default();
        let mut projectile = bolt(Vec2::ZERO, Vec2::new(100.0, 0.0));
        projectile.ricochet_left = 1;
        combat.spawn_player_projectile(projectile);

        let cfg = CombatBalance::default();
        let hits = combat.update_player_projectiles(0.01, &mut store, &arena(), &cfg);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].enemy, first);

        let p = &combat.player_projectiles[0];
        assert!(p.vel.length() >= cfg.min_ricochet_speed - 1e-3);
        let to_second = (store.position(second).unwrap_or_default() - p.pos).normalize();
        assert!(p.vel.normalize().dot(to_second) > 0.999);
        assert_eq!(p.ricochet_left, 0);
    }

    #[test]
    fn ricochet_without_candidate_removes_projectile() {
        let mut store = EnemyStore::default();
        store.insert(dummy(Vec2::new(10.0, 0.0), 50.0));
        let mut combat = CombatSystem::default();
        let mut projectile = bolt(Vec2::ZERO, Vec2::new(100.0, 0.0));
        projectile.ricochet_left = 3;
        combat.spawn_player_projectile(projectile);

        let cfg = CombatBalance::default();
        let hits = combat.update_player_projectiles(0.01, &mut store, &arena(), &cfg);
        assert_eq!(hits.len(), 1);
        assert!(combat.player_projectiles.is_empty());
    }

    #[test]
    fn one_hit_per_projectile_per_tick_and_dead_enemies_ignored() {
        let mut store = EnemyStore::default();
        let dead = store.insert(dummy(Vec2::new(5.0, 0.0), 1.0));
        store.damage(dead, 5.0);
        let a = store.insert(dummy(Vec2::new(5.0, 0.0), 50.0));
        let _b = store.insert(dummy(Vec2::new(6.0, 0.0), 50.0));
        let mut combat = CombatSystem::default();
        let mut projectile = bolt(Vec2::ZERO, Vec2::ZERO);
        projectile.pierce_left = 5;
        combat.spawn_player_projectile(projectile);

        let cfg = CombatBalance::default();
        let hits = combat.update_player_projectiles(0.01, &mut store, &arena(), &cfg);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].enemy, a);
    }

    #[test]
    fn projectiles_leaving_the_arena_are_culled() {
        let mut store = EnemyStore::default();
        let mut combat = CombatSystem::default();
        combat.spawn_player_projectile(bolt(Vec2::new(990.0, 0.0), Vec2::new(1000.0, 0.0)));
        combat.spawn_enemy_projectile(EnemyShot {
            pos: Vec2::new(0.0, -990.0),
            dir: Vec2::NEG_Y,
            damage: 5.0,
            speed: 1000.0,
            radius: 4.0,
        });
        combat.update_player_projectiles(0.1, &mut store, &arena(), &CombatBalance::default());
        combat.update_enemy_projectiles(0.1, Vec2::ZERO, 10.0, &arena(), 64.0, true, |_| {});
        assert!(combat.player_projectiles.is_empty());
        assert!(combat.enemy_projectiles.is_empty());
    }

    #[test]
    fn enemy_projectiles_are_removed_even_when_damage_is_gated() {
        let mut combat = CombatSystem::default();
        for _ in 0..2 {
            combat.spawn_enemy_projectile(EnemyShot {
                pos: Vec2::new(20.0, 0.0),
                dir: Vec2::NEG_X,
                damage: 7.0,
                speed: 100.0,
                radius: 4.0,
            });
        }
        let mut taken = Vec::new();
        let can_damage = false;
        combat.update_enemy_projectiles(0.1, Vec2::ZERO, 14.0, &arena(), 64.0, can_damage, |d| {
            taken.push(d)
        });
        assert!(taken.is_empty());
        assert!(combat.enemy_projectiles.is_empty());

        combat.spawn_enemy_projectile(EnemyShot {
            pos: Vec2::new(20.0, 0.0),
            dir: Vec2::NEG_X,
            damage: 7.0,
            speed: 100.0,
            radius: 4.0,
        });
        let can_damage = true;
        combat.update_enemy_projectiles(0.1, Vec2::ZERO, 14.0, &arena(), 64.0, can_damage, |d| {
            taken.push(d)
        });
        assert_eq!(taken, vec![7.0]);
    }
}
