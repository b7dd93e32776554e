use bevy::prelude::*;
use rand::{seq::SliceRandom, Rng};

use crate::{
    arena::{point_on_ring, Arena},
    balance::ShrinesBalance,
    events::ShrineCompleted,
    player::Player,
    rarity::Rarity,
    run_state::{PendingChoice, RunClock, RunFlow},
    RunRng, RunTick,
};

pub struct ShrinesPlugin;

impl Plugin for ShrinesPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ShrineSystem>()
            .init_resource::<GlobalBonuses>()
            .add_systems(Update, shrine_system.in_set(RunTick::Shrines));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShrineBonusKind {
    Damage,
    FireRate,
    MoveSpeed,
    MaxHealth,
    Magnet,
    XpGain,
    Area,
}

impl ShrineBonusKind {
    pub const ALL: [ShrineBonusKind; 7] = [
        ShrineBonusKind::Damage,
        ShrineBonusKind::FireRate,
        ShrineBonusKind::MoveSpeed,
        ShrineBonusKind::MaxHealth,
        ShrineBonusKind::Magnet,
        ShrineBonusKind::XpGain,
        ShrineBonusKind::Area,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShrineBonusKind::Damage => "Damage",
            ShrineBonusKind::FireRate => "Fire Rate",
            ShrineBonusKind::MoveSpeed => "Move Speed",
            ShrineBonusKind::MaxHealth => "Max Health",
            ShrineBonusKind::Magnet => "Magnet",
            ShrineBonusKind::XpGain => "XP Gain",
            ShrineBonusKind::Area => "Area",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShrineBonus {
    pub kind: ShrineBonusKind,
    pub rarity: Rarity,
    /// A fraction (0.1 = +10%) for every kind except `MaxHealth`, which is
    /// flat hp.
    pub magnitude: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shrine {
    pub pos: Vec2,
    pub radius: f32,
    pub channel_required: f32,
    pub progress: f32,
    pub consumed: bool,
}

impl Shrine {
    pub fn fraction(&self) -> f32 {
        if self.channel_required <= 0.0 {
            return 1.0;
        }
        (self.progress / self.channel_required).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletedShrine {
    pub pos: Vec2,
    pub bonuses: Vec<ShrineBonus>,
}

/// Run-wide bonuses granted by shrines, summed per kind.
#[derive(Resource, Default, Debug, Clone, PartialEq)]
pub struct GlobalBonuses {
    pub damage: f32,
    pub fire_rate: f32,
    pub move_speed: f32,
    pub max_health: f32,
    pub magnet: f32,
    pub xp_gain: f32,
    pub area: f32,
}

impl GlobalBonuses {
    pub fn apply(&mut self, bonus: &ShrineBonus) {
        let slot = match bonus.kind {
            ShrineBonusKind::Damage => &mut self.damage,
            ShrineBonusKind::FireRate => &mut self.fire_rate,
            ShrineBonusKind::MoveSpeed => &mut self.move_speed,
            ShrineBonusKind::MaxHealth => &mut self.max_health,
            ShrineBonusKind::Magnet => &mut self.magnet,
            ShrineBonusKind::XpGain => &mut self.xp_gain,
            ShrineBonusKind::Area => &mut self.area,
        };
        *slot += bonus.magnitude.max(0.0);
    }
}

#[derive(Resource, Debug, Clone)]
pub struct ShrineSystem {
    cfg: ShrinesBalance,
    pub shrines: Vec<Shrine>,
    next_spawn_at: f32,
}

impl Default for ShrineSystem {
    fn default() -> Self {
        Self::new(ShrinesBalance::default())
    }
}

impl ShrineSystem {
    pub fn new(cfg: ShrinesBalance) -> Self {
        Self {
            next_spawn_at: cfg.first_spawn_seconds.max(0.0),
            cfg,
            shrines: Vec::new(),
        }
    }

    pub fn next_spawn_at(&self) -> f32 {
        self.next_spawn_at
    }

    /// Spawns on schedule, channels or decays each shrine, and returns the
    /// shrines completed this tick with their rolled bonus choices.
    pub fn update(
        &mut self,
        dt: f32,
        run_time: f32,
        player_pos: Vec2,
        arena: &Arena,
        rng: &mut impl Rng,
    ) -> Vec<CompletedShrine> {
        let dt = dt.max(0.0);

        if run_time >= self.next_spawn_at && self.shrines.len() < self.cfg.max_active {
            let pos = arena.clamp(point_on_ring(
                player_pos,
                self.cfg.spawn_min_distance,
                self.cfg.spawn_max_distance,
                rng,
            ));
            self.shrines.push(Shrine {
                pos,
                radius: self.cfg.radius.max(1.0),
                channel_required: self.cfg.channel_seconds.max(0.0),
                progress: 0.0,
                consumed: false,
            });
            let jitter = self.cfg.interval_jitter.abs();
            let offset = if jitter > 0.0 {
                rng.gen_range(-jitter..=jitter)
            } else {
                0.0
            };
            self.next_spawn_at = run_time + (self.cfg.interval_seconds + offset).max(1.0);
            debug!("Shrine spawned at ({:.0}, {:.0})", pos.x, pos.y);
        }

        let decay = self.cfg.decay_mul.max(0.0);
        let mut completed = Vec::new();
        for i in 0..self.shrines.len() {
            let shrine = &mut self.shrines[i];
            if shrine.consumed {
                continue;
            }
            let inside = shrine.pos.distance_squared(player_pos) <= shrine.radius * shrine.radius;
            if inside {
                shrine.progress += dt;
                if shrine.fraction() >= 1.0 {
                    shrine.consumed = true;
                    let pos = shrine.pos;
                    completed.push(CompletedShrine {
                        pos,
                        bonuses: self.roll_bonuses(rng),
                    });
                }
            } else {
                shrine.progress = (shrine.progress - dt * decay).max(0.0);
            }
        }

        self.shrines.retain(|shrine| !shrine.consumed);
        completed
    }

    /// Distinct bonus kinds, each with its own rarity roll.
    pub fn roll_bonuses(&self, rng: &mut impl Rng) -> Vec<ShrineBonus> {
        let mut kinds = ShrineBonusKind::ALL.to_vec();
        kinds.shuffle(rng);
        kinds.truncate(self.cfg.choices.min(ShrineBonusKind::ALL.len()));

        let magnitudes = &self.cfg.magnitudes;
        kinds
            .into_iter()
            .map(|kind| {
                let rarity = Rarity::roll(&self.cfg.rarity_table, rng);
                let table = match kind {
                    ShrineBonusKind::Damage => &magnitudes.damage,
                    ShrineBonusKind::FireRate => &magnitudes.fire_rate,
                    ShrineBonusKind::MoveSpeed => &magnitudes.move_speed,
                    ShrineBonusKind::MaxHealth => &magnitudes.max_health,
                    ShrineBonusKind::Magnet => &magnitudes.magnet,
                    ShrineBonusKind::XpGain => &magnitudes.xp_gain,
                    ShrineBonusKind::Area => &magnitudes.area,
                };
                ShrineBonus {
                    kind,
                    rarity,
                    magnitude: table.get(rarity).max(0.0),
                }
            })
            .collect()
    }

    pub fn reset(&mut self, cfg: &ShrinesBalance) {
        *self = Self::new(cfg.clone());
    }
}

fn shrine_system(
    time: Res<Time>,
    arena: Res<Arena>,
    clock: Res<RunClock>,
    player: Res<Player>,
    mut shrines: ResMut<ShrineSystem>,
    mut flow: ResMut<RunFlow>,
    mut rng: ResMut<RunRng>,
    mut completions: MessageWriter<ShrineCompleted>,
) {
    let completed = shrines.update(
        time.delta_secs(),
        clock.elapsed,
        player.pos,
        &arena,
        &mut rng.0,
    );
    for shrine in completed {
        info!("Shrine completed at {:.0}s", clock.elapsed);
        completions.write(ShrineCompleted {
            pos: shrine.pos,
            bonuses: shrine.bonuses.clone(),
        });
        flow.push(PendingChoice::Shrine(shrine.bonuses));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use std::collections::HashSet;

    fn system_with_shrine_at(pos: Vec2) -> ShrineSystem {
        let mut system = ShrineSystem::default();
        system.shrines.push(Shrine {
            pos,
            radius: 60.0,
            channel_required: 3.0,
            progress: 0.0,
            consumed: false,
        });
        system
    }

    #[test]
    fn spawns_on_schedule_up_to_the_cap() {
        let mut system = ShrineSystem::default();
        let arena = Arena::default();
        let mut rng = StdRng::seed_from_u64(3);
        let far = Vec2::new(-1000.0, -1000.0);

        assert!(system.update(0.1, 59.0, far, &arena, &mut rng).is_empty());
        assert!(system.shrines.is_empty());

        system.update(0.1, 60.0, far, &arena, &mut rng);
        assert_eq!(system.shrines.len(), 1);
        let next = system.next_spawn_at();
        assert!((60.0 + 55.0..=60.0 + 95.0).contains(&next));

        system.update(0.1, next, Vec2::ZERO, &arena, &mut rng);
        system.update(0.1, 10_000.0, Vec2::ZERO, &arena, &mut rng);
        assert_eq!(system.shrines.len(), 2);
    }

    #[test]
    fn channel_completes_with_distinct_bonuses() {
        let mut system = system_with_shrine_at(Vec2::new(20.0, 0.0));
        let arena = Arena::default();
        let mut rng = StdRng::seed_from_u64(3);

        let mut completed = Vec::new();
        for _ in 0..31 {
            completed.extend(system.update(0.1, 1.0, Vec2::ZERO, &arena, &mut rng));
        }
        assert_eq!(completed.len(), 1);
        assert!(system.shrines.is_empty());

        let bonuses = &completed[0].bonuses;
        assert_eq!(bonuses.len(), 3);
        let kinds: HashSet<_> = bonuses.iter().map(|b| b.kind).collect();
        assert_eq!(kinds.len(), 3);
        for bonus in bonuses {
            assert!(bonus.magnitude > 0.0);
        }
    }

    #[test]
    fn leaving_decays_faster_than_channeling_but_not_below_zero() {
        let mut system = system_with_shrine_at(Vec2::new(20.0, 0.0));
        let arena = Arena::default();
        let mut rng = StdRng::seed_from_u64(3);

        system.update(1.0, 1.0, Vec2::ZERO, &arena, &mut rng);
        assert!((system.shrines[0].progress - 1.0).abs() < 1e-5);
        assert!((system.shrines[0].fraction() - 1.0 / 3.0).abs() < 1e-5);

        let outside = Vec2::new(500.0, 0.0);
        system.update(0.5, 1.0, outside, &arena, &mut rng);
        assert!((system.shrines[0].progress - 0.4).abs() < 1e-5);

        system.update(5.0, 1.0, outside, &arena, &mut rng);
        assert_eq!(system.shrines[0].progress, 0.0);
    }

    #[test]
    fn bonuses_accumulate_per_kind() {
        let mut bonuses = GlobalBonuses::default();
        let bonus = ShrineBonus {
            kind: ShrineBonusKind::Damage,
            rarity: Rarity::Rare,
            magnitude: 0.1,
        };
        bonuses.apply(&bonus);
        bonuses.apply(&bonus);
        assert!((bonuses.damage - 0.2).abs() < 1e-6);
        assert_eq!(bonuses.fire_rate, 0.0);
    }
}
