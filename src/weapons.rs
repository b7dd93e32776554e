use std::collections::HashMap;

use bevy::prelude::*;
use rand::Rng;

use crate::{
    balance::{Balance, MeleeWeaponStats, ProjectileWeaponStats, WeaponsBalance},
    combat::{report_hits, CombatSystem, Projectile, WeaponHit},
    enemies::{EnemyField, EnemyStore},
    events::EnemyHit,
    items::ItemTriggerSystem,
    player::Player,
    progression::{RunProgression, StatSheet, WeaponAxis, WeaponInstance, WeaponKind},
    shrines::GlobalBonuses,
    targeting::TargetingSystem,
    RunRng, RunTick,
};

pub struct WeaponsPlugin;

impl Plugin for WeaponsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WeaponSystem>()
            .add_systems(Update, fire_weapons_system.in_set(RunTick::Weapons));
    }
}

/// Base numbers for one weapon kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeaponProfile {
    Projectile(ProjectileWeaponStats),
    Melee(MeleeWeaponStats),
}

impl WeaponProfile {
    pub fn of(kind: WeaponKind, cfg: &WeaponsBalance) -> Self {
        match kind {
            WeaponKind::FrostStaff => WeaponProfile::Projectile(cfg.frost_staff),
            WeaponKind::Dagger => WeaponProfile::Projectile(cfg.dagger),
            WeaponKind::Crossbow => WeaponProfile::Projectile(cfg.crossbow),
            WeaponKind::FireWand => WeaponProfile::Projectile(cfg.fire_wand),
            WeaponKind::Katana => WeaponProfile::Melee(cfg.katana),
        }
    }

    fn damage(&self) -> f32 {
        match self {
            WeaponProfile::Projectile(stats) => stats.damage,
            WeaponProfile::Melee(stats) => stats.damage,
        }
    }

    fn cooldown(&self) -> f32 {
        match self {
            WeaponProfile::Projectile(stats) => stats.cooldown,
            WeaponProfile::Melee(stats) => stats.cooldown,
        }
    }

    fn range(&self) -> f32 {
        match self {
            WeaponProfile::Projectile(stats) => stats.range,
            WeaponProfile::Melee(stats) => stats.range,
        }
    }
}

/// The value an axis shows at `level`, before any ring or shrine multiplier.
/// Fire rate is reported as shots per second, accuracy as spread in degrees.
/// Axes a melee weapon ignores report 0.
pub fn axis_value(cfg: &WeaponsBalance, kind: WeaponKind, axis: WeaponAxis, level: u32) -> f32 {
    let profile = WeaponProfile::of(kind, cfg);
    let level = level as f32;
    match axis {
        WeaponAxis::Damage => profile.damage() * (1.0 + level * cfg.damage_per_level),
        WeaponAxis::FireRate => {
            let cooldown = profile.cooldown().max(cfg.min_cooldown.max(0.01));
            (1.0 + level * cfg.fire_rate_per_level) / cooldown
        }
        WeaponAxis::Range => profile.range() * (1.0 + level * cfg.range_per_level),
        WeaponAxis::ProjectileSpeed => match profile {
            WeaponProfile::Projectile(stats) => {
                stats.speed * (1.0 + level * cfg.projectile_speed_per_level)
            }
            WeaponProfile::Melee(_) => 0.0,
        },
        WeaponAxis::Accuracy => match profile {
            WeaponProfile::Projectile(stats) => {
                stats.spread_deg * (1.0 - cfg.accuracy_per_level.clamp(0.0, 1.0)).powf(level)
            }
            WeaponProfile::Melee(_) => 0.0,
        },
    }
}

/// A held weapon with every level and multiplier folded in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedWeapon {
    pub kind: WeaponKind,
    pub damage: f32,
    pub cooldown: f32,
    pub range: f32,
    pub speed: f32,
    pub spread_deg: f32,
    pub radius: f32,
    pub projectiles: u32,
    pub pierce: u32,
    pub ricochet: u32,
    /// `Some` for melee swings.
    pub arc_cos: Option<f32>,
}

pub fn resolve(cfg: &WeaponsBalance, weapon: &WeaponInstance, stats: &StatSheet) -> ResolvedWeapon {
    let kind = weapon.kind;
    let profile = WeaponProfile::of(kind, cfg);
    let fire_rate_mul = (1.0 + weapon.fire_rate as f32 * cfg.fire_rate_per_level)
        * stats.fire_rate_mul.max(0.01);
    let cooldown = (profile.cooldown() / fire_rate_mul).max(cfg.min_cooldown.max(0.01));
    let damage =
        axis_value(cfg, kind, WeaponAxis::Damage, weapon.damage) * stats.damage_mul.max(0.0);
    let range = axis_value(cfg, kind, WeaponAxis::Range, weapon.range);

    match profile {
        WeaponProfile::Projectile(base) => ResolvedWeapon {
            kind,
            damage,
            cooldown,
            range,
            speed: axis_value(cfg, kind, WeaponAxis::ProjectileSpeed, weapon.projectile_speed),
            spread_deg: axis_value(cfg, kind, WeaponAxis::Accuracy, weapon.accuracy),
            radius: base.radius.max(1.0),
            projectiles: 1 + weapon.extra_shot,
            pierce: base.pierce + weapon.pierce,
            ricochet: base.ricochet + weapon.ricochet,
            arc_cos: None,
        },
        WeaponProfile::Melee(base) => ResolvedWeapon {
            kind,
            damage,
            cooldown,
            range,
            speed: 0.0,
            spread_deg: 0.0,
            radius: 0.0,
            projectiles: 0,
            pierce: 0,
            ricochet: 0,
            arc_cos: Some(base.arc_cos.clamp(-1.0, 1.0)),
        },
    }
}

/// Projectiles and melee hits produced by one fire step.
#[derive(Default, Debug)]
pub struct Volley {
    pub projectiles: Vec<Projectile>,
    pub melee_hits: Vec<WeaponHit>,
}

/// Per-weapon fire cooldowns. A weapon whose cooldown has run out stays
/// ready until a target comes into its range.
#[derive(Resource, Default, Debug)]
pub struct WeaponSystem {
    cooldowns: HashMap<WeaponKind, f32>,
}

impl WeaponSystem {
    pub fn cooldown(&self, kind: WeaponKind) -> f32 {
        self.cooldowns.get(&kind).copied().unwrap_or(0.0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        dt: f32,
        weapons: &[WeaponInstance],
        stats: &StatSheet,
        cfg: &WeaponsBalance,
        player_pos: Vec2,
        target_pos: Option<Vec2>,
        field: &mut impl EnemyField,
        rng: &mut impl Rng,
    ) -> Volley {
        let mut volley = Volley::default();
        for weapon in weapons {
            let cooldown = self.cooldowns.entry(weapon.kind).or_insert(0.0);
            *cooldown = (*cooldown - dt.max(0.0)).max(0.0);
            if *cooldown > 0.0 {
                continue;
            }
            let Some(target) = target_pos else {
                continue;
            };
            let resolved = resolve(cfg, weapon, stats);
            let to_target = target - player_pos;
            if to_target.length_squared() > resolved.range * resolved.range {
                continue;
            }
            let aim = to_target.try_normalize().unwrap_or(Vec2::X);

            match resolved.arc_cos {
                Some(arc_cos) => {
                    let crit = rng.gen_bool(stats.crit_chance.clamp(0.0, 1.0) as f64);
                    let damage = if crit {
                        resolved.damage * stats.crit_mul
                    } else {
                        resolved.damage
                    };
                    volley.melee_hits.extend(swing(
                        weapon.kind,
                        player_pos,
                        aim,
                        resolved.range,
                        arc_cos,
                        damage,
                        crit,
                        field,
                    ));
                }
                None => {
                    let fan = cfg.extra_shot_fan_deg.to_radians();
                    let half_spread = (resolved.spread_deg * 0.5).to_radians();
                    let count = resolved.projectiles.max(1);
                    let middle = (count - 1) as f32 * 0.5;
                    for i in 0..count {
                        let jitter = if half_spread > 0.0 {
                            rng.gen_range(-half_spread..=half_spread)
                        } else {
                            0.0
                        };
                        let angle = (i as f32 - middle) * fan + jitter;
                        let dir = Vec2::from_angle(angle).rotate(aim);
                        let crit = rng.gen_bool(stats.crit_chance.clamp(0.0, 1.0) as f64);
                        let damage = if crit {
                            resolved.damage * stats.crit_mul
                        } else {
                            resolved.damage
                        };
                        let mut projectile = Projectile::new(
                            player_pos,
                            dir * resolved.speed,
                            damage,
                            resolved.radius,
                            weapon.kind,
                        );
                        projectile.pierce_left = resolved.pierce;
                        projectile.ricochet_left = resolved.ricochet;
                        projectile.crit = crit;
                        volley.projectiles.push(projectile);
                    }
                }
            }
            *cooldown = resolved.cooldown;
        }
        volley
    }

    pub fn reset(&mut self) {
        self.cooldowns.clear();
    }
}

/// Damages every live enemy within `range` (edge to center) whose direction
/// from the player is inside the arc around `aim`.
#[allow(clippy::too_many_arguments)]
fn swing(
    weapon: WeaponKind,
    origin: Vec2,
    aim: Vec2,
    range: f32,
    arc_cos: f32,
    damage: f32,
    crit: bool,
    field: &mut impl EnemyField,
) -> Vec<WeaponHit> {
    let mut hits = Vec::new();
    for id in field.enemy_ids() {
        if !field.is_alive(id) {
            continue;
        }
        let (Some(pos), Some(radius)) = (field.position(id), field.radius(id)) else {
            continue;
        };
        let offset = pos - origin;
        let reach = range + radius;
        if offset.length_squared() > reach * reach {
            continue;
        }
        let inside_arc = match offset.try_normalize() {
            Some(dir) => dir.dot(aim) >= arc_cos,
            None => true,
        };
        if !inside_arc {
            continue;
        }
        if let Some(dealt) = field.damage(id, damage) {
            hits.push(WeaponHit {
                enemy: id,
                pos: dealt.pos,
                damage: dealt.amount,
                killed: dealt.killed,
                crit,
                weapon,
            });
        }
    }
    hits
}

#[allow(clippy::too_many_arguments)]
fn fire_weapons_system(
    time: Res<Time>,
    balance: Res<Balance>,
    player: Res<Player>,
    progression: Res<RunProgression>,
    bonuses: Res<GlobalBonuses>,
    targeting: Res<TargetingSystem>,
    mut weapons: ResMut<WeaponSystem>,
    mut combat: ResMut<CombatSystem>,
    mut enemies: ResMut<EnemyStore>,
    mut items: ResMut<ItemTriggerSystem>,
    mut rng: ResMut<RunRng>,
    mut enemy_hits: MessageWriter<EnemyHit>,
) {
    let stats = progression.stats(&balance, &bonuses);
    let target_pos = targeting
        .target(&*enemies)
        .and_then(|id| enemies.position(id));

    let volley = weapons.update(
        time.delta_secs(),
        progression.weapons(),
        &stats,
        &balance.weapons,
        player.pos,
        target_pos,
        &mut *enemies,
        &mut rng.0,
    );
    for projectile in volley.projectiles {
        combat.spawn_player_projectile(projectile);
    }
    report_hits(
        volley.melee_hits,
        &mut enemies,
        &mut items,
        &mut rng.0,
        &mut enemy_hits,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemies::tests::dummy;
    use rand::{rngs::StdRng, SeedableRng};

    fn no_crit() -> StatSheet {
        StatSheet::default()
    }

    #[test]
    fn fires_only_with_a_target_in_range_then_waits_for_cooldown() {
        let cfg = WeaponsBalance::default();
        let mut store = EnemyStore::default();
        let mut system = WeaponSystem::default();
        let mut rng = StdRng::seed_from_u64(1);
        let staff = [WeaponInstance::new(WeaponKind::FrostStaff)];
        let stats = no_crit();
        let origin = Vec2::ZERO;

        let idle = system.update(0.1, &staff, &stats, &cfg, origin, None, &mut store, &mut rng);
        assert!(idle.projectiles.is_empty());
        assert_eq!(system.cooldown(WeaponKind::FrostStaff), 0.0);

        let far = Some(Vec2::new(5000.0, 0.0));
        let missed = system.update(0.1, &staff, &stats, &cfg, origin, far, &mut store, &mut rng);
        assert!(missed.projectiles.is_empty());

        let near = Some(Vec2::new(200.0, 0.0));
        let shot = system.update(0.1, &staff, &stats, &cfg, origin, near, &mut store, &mut rng);
        assert_eq!(shot.projectiles.len(), 1);
        let vel = shot.projectiles[0].vel;
        assert!(vel.x > 0.0 && vel.y.abs() < vel.x * 0.1);
        assert!((system.cooldown(WeaponKind::FrostStaff) - cfg.frost_staff.cooldown).abs() < 1e-5);

        let again = system.update(0.1, &staff, &stats, &cfg, origin, near, &mut store, &mut rng);
        assert!(again.projectiles.is_empty());
    }

    #[test]
    fn extra_shots_fan_and_mods_carry_over() {
        let cfg = WeaponsBalance::default();
        let mut store = EnemyStore::default();
        let mut system = WeaponSystem::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut dagger = WeaponInstance::new(WeaponKind::Dagger);
        dagger.extra_shot = 2;
        dagger.pierce = 1;
        dagger.ricochet = 2;

        let volley = system.update(
            0.0,
            &[dagger],
            &no_crit(),
            &cfg,
            Vec2::ZERO,
            Some(Vec2::new(0.0, 100.0)),
            &mut store,
            &mut rng,
        );
        assert_eq!(volley.projectiles.len(), 3);
        for projectile in &volley.projectiles {
            assert_eq!(projectile.pierce_left, cfg.dagger.pierce + 1);
            assert_eq!(projectile.ricochet_left, 2);
            assert!((projectile.vel.length() - cfg.dagger.speed).abs() < 1e-2);
        }
    }

    #[test]
    fn fire_rate_levels_and_multipliers_shorten_cooldown_to_a_floor() {
        let cfg = WeaponsBalance::default();
        let mut staff = WeaponInstance::new(WeaponKind::FrostStaff);
        let base = resolve(&cfg, &staff, &no_crit()).cooldown;

        staff.fire_rate = 5;
        let leveled = resolve(&cfg, &staff, &no_crit()).cooldown;
        assert!((leveled - base / 1.4).abs() < 1e-4);

        let hasted = StatSheet {
            fire_rate_mul: 1000.0,
            ..StatSheet::default()
        };
        assert_eq!(resolve(&cfg, &staff, &hasted).cooldown, cfg.min_cooldown);
    }

    #[test]
    fn katana_hits_only_inside_the_frontal_arc() {
        let cfg = WeaponsBalance::default();
        let mut store = EnemyStore::default();
        let front = store.insert(dummy(Vec2::new(60.0, 0.0), 100.0));
        let behind = store.insert(dummy(Vec2::new(-60.0, 0.0), 100.0));
        let too_far = store.insert(dummy(Vec2::new(300.0, 0.0), 100.0));
        let mut system = WeaponSystem::default();
        let mut rng = StdRng::seed_from_u64(3);

        let volley = system.update(
            0.0,
            &[WeaponInstance::new(WeaponKind::Katana)],
            &no_crit(),
            &cfg,
            Vec2::ZERO,
            Some(Vec2::new(60.0, 0.0)),
            &mut store,
            &mut rng,
        );
        assert!(volley.projectiles.is_empty());
        assert_eq!(volley.melee_hits.len(), 1);
        assert_eq!(volley.melee_hits[0].enemy, front);
        assert!(store.get(front).is_some_and(|e| e.hp < 100.0));
        assert!(store.get(behind).is_some_and(|e| e.hp == 100.0));
        assert!(store.get(too_far).is_some_and(|e| e.hp == 100.0));
    }

    #[test]
    fn melee_ignores_projectile_axes() {
        let cfg = WeaponsBalance::default();
        assert_eq!(axis_value(&cfg, WeaponKind::Katana, WeaponAxis::Accuracy, 3), 0.0);
        let spread = axis_value(&cfg, WeaponKind::Crossbow, WeaponAxis::Accuracy, 2);
        assert!((spread - cfg.crossbow.spread_deg * 0.81).abs() < 1e-4);
    }
}
