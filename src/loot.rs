use bevy::prelude::*;
use rand::Rng;

use crate::{
    arena::Arena,
    balance::{Balance, ItemsBalance, LootBalance, OrbBalance},
    enemies::EnemyStore,
    events::{ChestOpened, EnemyKilled, LevelUp},
    health::PlayerHealth,
    items::{roll_chest_items, ItemInstance, ItemTriggerSystem},
    player::Player,
    progression::RunProgression,
    run_state::{PendingChoice, RunClock, RunFlow, RunState},
    shrines::GlobalBonuses,
    RunRng, RunTick,
};

pub struct LootPlugin;

impl Plugin for LootPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LootSystem>()
            .add_systems(Update, reap_dead_system.in_set(RunTick::Reap))
            .add_systems(Update, loot_system.in_set(RunTick::Loot));
    }
}

// ── Data types ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chest {
    pub pos: Vec2,
    /// Gold needed to open it.
    pub cost: u32,
    /// Drives the reward tier. Elite chests are free but roll as if
    /// expensive.
    pub rarity_cost: u32,
    pub radius: f32,
    pub elite: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Orb {
    pub pos: Vec2,
    pub vel: Vec2,
    pub value: u32,
    pub ttl: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OpenedChest {
    pub pos: Vec2,
    pub cost: u32,
    pub elite: bool,
    pub items: Vec<ItemInstance>,
}

/// What the player picked up during one `LootSystem::update`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LootReport {
    pub xp: u32,
    pub gold: u32,
    pub opened: Option<OpenedChest>,
}

/// Chests, xp and gold orbs, and the run's gold.
#[derive(Resource, Debug, Clone)]
pub struct LootSystem {
    cfg: LootBalance,
    pub chests: Vec<Chest>,
    pub xp_orbs: Vec<Orb>,
    pub gold_orbs: Vec<Orb>,
    gold: u32,
    next_chest_cost: u32,
    chest_timer: f32,
    /// Fractional xp left over after the gain multiplier.
    xp_carry: f32,
}

impl Default for LootSystem {
    fn default() -> Self {
        Self::new(LootBalance::default())
    }
}

impl LootSystem {
    pub fn new(cfg: LootBalance) -> Self {
        Self {
            next_chest_cost: cfg.chest_base_cost,
            chest_timer: cfg.chest_interval.max(0.0),
            cfg,
            chests: Vec::new(),
            xp_orbs: Vec::new(),
            gold_orbs: Vec::new(),
            gold: 0,
            xp_carry: 0.0,
        }
    }

    pub fn gold(&self) -> u32 {
        self.gold
    }

    pub fn add_gold(&mut self, amount: u32) {
        self.gold = self.gold.saturating_add(amount);
    }

    pub fn next_chest_cost(&self) -> u32 {
        self.next_chest_cost
    }

    /// Scales picked-up xp by the gain multiplier. The fraction is carried
    /// into the next pickup, so small orbs still benefit from the bonus.
    pub fn scaled_xp(&mut self, raw: u32, gain_mul: f32) -> i32 {
        let total = raw as f32 * gain_mul.max(0.0) + self.xp_carry;
        let whole = total.floor();
        self.xp_carry = total - whole;
        whole as i32
    }

    /// Drops rewards for one dead enemy: an xp orb and a gold orb always, and
    /// a free chest for elites.
    pub fn on_enemy_killed(
        &mut self,
        pos: Vec2,
        xp: u32,
        gold: u32,
        elite: bool,
        rng: &mut impl Rng,
    ) {
        if elite {
            self.chests.push(Chest {
                pos,
                cost: 0,
                rarity_cost: self.cfg.elite_rarity_cost,
                radius: self.cfg.chest_radius,
                elite: true,
            });
        }
        let ttl = self.cfg.orb_ttl.max(0.0);
        let xp_orb = Orb {
            pos,
            vel: scatter(self.cfg.scatter_speed, rng),
            value: xp,
            ttl,
        };
        let gold_orb = Orb {
            pos,
            vel: scatter(self.cfg.scatter_speed, rng),
            value: gold,
            ttl,
        };
        self.xp_orbs.push(xp_orb);
        self.gold_orbs.push(gold_orb);
    }

    /// Places a world chest at the current escalating cost, if a spot far
    /// enough from the player turns up within the attempt budget.
    pub fn try_spawn_chest(&mut self, player_pos: Vec2, arena: &Arena, rng: &mut impl Rng) -> bool {
        let world_chests = self.chests.iter().filter(|c| !c.elite).count();
        if world_chests >= self.cfg.max_world_chests {
            return false;
        }
        let min_d2 = self.cfg.chest_min_player_distance.max(0.0).powi(2);
        for _ in 0..self.cfg.chest_spawn_attempts {
            let pos = arena.random_point(rng);
            if pos.distance_squared(player_pos) < min_d2 {
                continue;
            }
            self.chests.push(Chest {
                pos,
                cost: self.next_chest_cost,
                rarity_cost: self.next_chest_cost,
                radius: self.cfg.chest_radius,
                elite: false,
            });
            return true;
        }
        false
    }

    /// Opens the first chest in reach that the player can afford.
    pub fn try_open_chest(
        &mut self,
        player_pos: Vec2,
        items_cfg: &ItemsBalance,
        rng: &mut impl Rng,
    ) -> Option<OpenedChest> {
        let open_radius = self.cfg.chest_open_radius.max(0.0);
        let index = self.chests.iter().position(|chest| {
            let reach = open_radius + chest.radius.max(0.0);
            chest.pos.distance_squared(player_pos) <= reach * reach && self.gold >= chest.cost
        })?;
        let chest = self.chests.remove(index);

        self.gold -= chest.cost;
        if !chest.elite {
            let cap = self.cfg.chest_cost_cap.max(self.cfg.chest_base_cost);
            self.next_chest_cost = self.next_chest_cost.saturating_mul(2).min(cap);
        }
        let items = roll_chest_items(items_cfg, chest.rarity_cost, self.cfg.chest_base_cost, rng);
        Some(OpenedChest {
            pos: chest.pos,
            cost: chest.cost,
            elite: chest.elite,
            items,
        })
    }

    pub fn update(
        &mut self,
        dt: f32,
        player_pos: Vec2,
        magnet_radius: f32,
        arena: &Arena,
        items_cfg: &ItemsBalance,
        rng: &mut impl Rng,
    ) -> LootReport {
        let dt = dt.max(0.0);
        let damping = self.cfg.damping.clamp(0.0, 1.0);
        let xp = update_orbs(
            &mut self.xp_orbs,
            &self.cfg.xp,
            dt,
            player_pos,
            magnet_radius,
            damping,
        );
        let gold = update_orbs(
            &mut self.gold_orbs,
            &self.cfg.gold,
            dt,
            player_pos,
            magnet_radius,
            damping,
        );
        self.add_gold(gold);

        self.chest_timer -= dt;
        if self.chest_timer <= 0.0 {
            self.chest_timer += self.cfg.chest_interval.max(1.0);
            self.try_spawn_chest(player_pos, arena, rng);
        }

        let opened = self.try_open_chest(player_pos, items_cfg, rng);
        LootReport { xp, gold, opened }
    }

    pub fn reset(&mut self, cfg: &LootBalance) {
        *self = Self::new(cfg.clone());
    }
}

fn scatter(speed: f32, rng: &mut impl Rng) -> Vec2 {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    Vec2::new(angle.cos(), angle.sin()) * speed.max(0.0) * rng.gen_range(0.5..=1.0)
}

/// Shared orb step. Returns the total value picked up.
fn update_orbs(
    orbs: &mut Vec<Orb>,
    cfg: &OrbBalance,
    dt: f32,
    player_pos: Vec2,
    magnet_radius: f32,
    damping: f32,
) -> u32 {
    let pickup = cfg.pickup_radius.max(0.0);
    let magnet = (magnet_radius * cfg.magnet_mul).max(pickup);
    let min_speed = cfg.min_speed.max(0.0);
    let max_speed = cfg.max_speed.max(min_speed);
    let mut collected = 0u32;

    orbs.retain_mut(|orb| {
        orb.ttl -= dt;
        if orb.ttl <= 0.0 {
            return false;
        }
        let to_player = player_pos - orb.pos;
        let dist = to_player.length();
        if dist <= pickup {
            collected = collected.saturating_add(orb.value);
            return false;
        }
        if dist <= magnet {
            // Closer orbs fly faster.
            let closeness = 1.0 - dist / magnet;
            let speed = min_speed + (max_speed - min_speed) * closeness;
            orb.vel = to_player / dist * speed;
        } else {
            orb.vel *= damping;
        }
        orb.pos += orb.vel * dt;
        true
    });
    collected
}

// ── Systems ─────────────────────────────────────────────────────────────────

/// Purges dead enemies once per tick, after every damage source has run.
fn reap_dead_system(
    player: Res<Player>,
    mut enemies: ResMut<EnemyStore>,
    mut loot: ResMut<LootSystem>,
    items: Res<ItemTriggerSystem>,
    mut health: ResMut<PlayerHealth>,
    mut clock: ResMut<RunClock>,
    mut flow: ResMut<RunFlow>,
    mut rng: ResMut<RunRng>,
    mut kills: MessageWriter<EnemyKilled>,
) {
    for (_, enemy) in enemies.remove_dead() {
        kills.write(EnemyKilled {
            pos: enemy.pos,
            kind: enemy.kind,
            elite: enemy.elite,
            boss: enemy.boss,
            xp: enemy.xp,
            gold: enemy.gold,
        });
        loot.on_enemy_killed(enemy.pos, enemy.xp, enemy.gold, enemy.elite, &mut rng.0);
        health.heal(items.roll_on_kill_heal(&mut rng.0));
        clock.kills += 1;

        if enemy.boss {
            info!(
                "Boss defeated at {:.0}s near ({:.0}, {:.0})",
                clock.elapsed, player.pos.x, player.pos.y
            );
            flow.end(RunState::Victory);
        }
    }
}

fn loot_system(
    time: Res<Time>,
    balance: Res<Balance>,
    arena: Res<Arena>,
    player: Res<Player>,
    bonuses: Res<GlobalBonuses>,
    mut loot: ResMut<LootSystem>,
    mut progression: ResMut<RunProgression>,
    mut flow: ResMut<RunFlow>,
    mut rng: ResMut<RunRng>,
    mut level_ups: MessageWriter<LevelUp>,
    mut chests: MessageWriter<ChestOpened>,
) {
    let stats = progression.stats(&balance, &bonuses);
    let magnet_radius = balance.player.base_magnet_radius * stats.magnet_mul;
    let report = loot.update(
        time.delta_secs(),
        player.pos,
        magnet_radius,
        &arena,
        &balance.items,
        &mut rng.0,
    );

    if report.xp > 0 {
        let gained = loot.scaled_xp(report.xp, stats.xp_gain_mul);
        let levels = progression.add_xp(gained);
        let top = progression.level();
        for level in (top + 1 - levels)..=top {
            level_ups.write(LevelUp { level });
            flow.push(PendingChoice::LevelUp);
        }
    }

    if let Some(opened) = report.opened {
        info!(
            "Opened {} chest for {} gold",
            if opened.elite { "elite" } else { "world" },
            opened.cost
        );
        chests.write(ChestOpened {
            pos: opened.pos,
            cost: opened.cost,
            elite: opened.elite,
            choices: opened.items.clone(),
        });
        flow.push(PendingChoice::Chest(opened.items));
    }
}
