use std::collections::HashSet;

use bevy::prelude::*;
use rand::{seq::SliceRandom, Rng};

use crate::{
    balance::{Balance, ItemsBalance},
    enemies::{EnemyField, EnemyId, EnemyStore},
    health::HitBlocker,
    player::Player,
    progression::RunProgression,
    rarity::Rarity,
    shrines::GlobalBonuses,
    RunTick,
};

pub struct ItemsPlugin;

impl Plugin for ItemsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ItemTriggerSystem>()
            .add_systems(Update, item_tick_system.in_set(RunTick::Items));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Blocks one hit, then recharges.
    ShieldCharm,
    /// Taking a hit releases a poison cloud around the player.
    ToxicFlask,
    /// Weapon hits may arc lightning between enemies.
    StormCharm,
    /// Kills may heal.
    VampireFang,
}

impl ItemKind {
    pub const ALL: [ItemKind; 4] = [
        ItemKind::ShieldCharm,
        ItemKind::ToxicFlask,
        ItemKind::StormCharm,
        ItemKind::VampireFang,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ItemKind::ShieldCharm => "Shield Charm",
            ItemKind::ToxicFlask => "Toxic Flask",
            ItemKind::StormCharm => "Storm Charm",
            ItemKind::VampireFang => "Vampire Fang",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ItemInstance {
    pub kind: ItemKind,
    pub rarity: Rarity,
}

/// A short-lived lightning arc, kept only so renderers can draw it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightningLink {
    pub from: Vec2,
    pub to: Vec2,
    pub ttl: f32,
}

/// One enemy struck by a lightning chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChainHop {
    pub enemy: EnemyId,
    pub from: Vec2,
    pub to: Vec2,
    pub damage: f32,
    pub killed: bool,
}

/// Collected proc items and their reactive effects.
///
/// Copies of a kind stack only in the sense that the best rarity held sets
/// the magnitude.
#[derive(Resource, Debug, Clone)]
pub struct ItemTriggerSystem {
    cfg: ItemsBalance,
    items: Vec<ItemInstance>,
    shield_ready: bool,
    shield_cooldown: f32,
    toxic_timer: f32,
    links: Vec<LightningLink>,
}

impl Default for ItemTriggerSystem {
    fn default() -> Self {
        Self::new(ItemsBalance::default())
    }
}

impl ItemTriggerSystem {
    pub fn new(cfg: ItemsBalance) -> Self {
        Self {
            cfg,
            items: Vec::new(),
            shield_ready: false,
            shield_cooldown: 0.0,
            toxic_timer: 0.0,
            links: Vec::new(),
        }
    }

    pub fn add(&mut self, item: ItemInstance) {
        if item.kind == ItemKind::ShieldCharm && self.best_rarity(ItemKind::ShieldCharm).is_none() {
            self.shield_ready = true;
        }
        info!("Collected {} {}", item.rarity.name(), item.kind.name());
        self.items.push(item);
    }

    pub fn items(&self) -> &[ItemInstance] {
        &self.items
    }

    pub fn best_rarity(&self, kind: ItemKind) -> Option<Rarity> {
        self.items
            .iter()
            .filter(|item| item.kind == kind)
            .map(|item| item.rarity)
            .max()
    }

    pub fn shield_ready(&self) -> bool {
        self.shield_ready
    }

    pub fn toxic_active(&self) -> bool {
        self.toxic_timer > 0.0
    }

    pub fn links(&self) -> &[LightningLink] {
        &self.links
    }

    /// Ticks the shield recharge, the toxic cloud and lightning links.
    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);

        if self.best_rarity(ItemKind::ShieldCharm).is_some() && !self.shield_ready {
            self.shield_cooldown -= dt;
            if self.shield_cooldown <= 0.0 {
                self.shield_cooldown = 0.0;
                self.shield_ready = true;
            }
        }

        self.toxic_timer = (self.toxic_timer - dt).max(0.0);

        self.links.retain_mut(|link| {
            link.ttl -= dt;
            link.ttl > 0.0
        });
    }

    /// Reacts to a hit that got past invulnerability. Returns true if a
    /// ready shield consumed it; otherwise a held toxic flask (re)starts.
    pub fn on_player_hit(&mut self) -> bool {
        if let Some(rarity) = self.best_rarity(ItemKind::ShieldCharm) {
            if self.shield_ready {
                self.shield_ready = false;
                self.shield_cooldown = self.cfg.shield_cooldown.get(rarity).max(0.0);
                return true;
            }
        }
        if let Some(rarity) = self.best_rarity(ItemKind::ToxicFlask) {
            self.toxic_timer = self.cfg.toxic_duration.get(rarity).max(0.0);
        }
        false
    }

    /// Damages every live enemy inside the toxic cloud. Returns how many
    /// enemies were touched.
    pub fn apply_toxic(
        &mut self,
        dt: f32,
        player_pos: Vec2,
        field: &mut impl EnemyField,
        radius_mul: f32,
        damage_mul: f32,
    ) -> usize {
        if !self.toxic_active() {
            return 0;
        }
        let Some(rarity) = self.best_rarity(ItemKind::ToxicFlask) else {
            return 0;
        };
        let radius = self.cfg.toxic_radius.get(rarity).max(0.0) * radius_mul.clamp(0.4, 3.0);
        let damage = self.cfg.toxic_dps.get(rarity).max(0.0)
            * dt.max(0.0)
            * damage_mul.clamp(0.2, 3.0);
        if damage <= 0.0 {
            return 0;
        }

        let r2 = radius * radius;
        let mut touched = 0;
        for id in field.enemy_ids() {
            let inside = field
                .position(id)
                .is_some_and(|pos| pos.distance_squared(player_pos) <= r2);
            if inside && field.damage(id, damage).is_some() {
                touched += 1;
            }
        }
        touched
    }

    /// Chain-lightning proc for a weapon hit on `struck` at `struck_pos`.
    ///
    /// The first entry, if any, is the struck enemy itself taking the base
    /// damage (skipped when the weapon hit already killed it). Each further
    /// hop jumps to the nearest live enemy not yet in the chain, for 0.8x the
    /// previous damage.
    pub fn on_enemy_hit(
        &mut self,
        struck: EnemyId,
        struck_pos: Vec2,
        field: &mut impl EnemyField,
        rng: &mut impl Rng,
    ) -> Vec<ChainHop> {
        let Some(rarity) = self.best_rarity(ItemKind::StormCharm) else {
            return Vec::new();
        };
        let chance = self.cfg.chain_chance.get(rarity).clamp(0.0, 1.0);
        if !rng.gen_bool(chance as f64) {
            return Vec::new();
        }

        let mut hops = Vec::new();
        let mut damage = self.cfg.chain_damage.get(rarity).max(0.0);
        if let Some(dealt) = field.damage(struck, damage) {
            hops.push(ChainHop {
                enemy: struck,
                from: struck_pos,
                to: dealt.pos,
                damage: dealt.amount,
                killed: dealt.killed,
            });
        }

        let mut visited = HashSet::from([struck]);
        let mut from = struck_pos;
        let falloff = self.cfg.chain_falloff.clamp(0.0, 1.0);
        let range = self.cfg.chain_range.max(0.0);
        for _ in 0..self.cfg.chain_count.get(rarity) {
            damage *= falloff;
            let Some(next) = field.nearest_alive(from, range, |id| visited.contains(&id)) else {
                break;
            };
            visited.insert(next);
            let Some(dealt) = field.damage(next, damage) else {
                break;
            };
            self.links.push(LightningLink {
                from,
                to: dealt.pos,
                ttl: self.cfg.link_ttl.max(0.0),
            });
            hops.push(ChainHop {
                enemy: next,
                from,
                to: dealt.pos,
                damage: dealt.amount,
                killed: dealt.killed,
            });
            from = dealt.pos;
        }
        hops
    }

    /// Heal granted for one kill; 0.0 without a fang or on a failed roll.
    pub fn roll_on_kill_heal(&self, rng: &mut impl Rng) -> f32 {
        let Some(rarity) = self.best_rarity(ItemKind::VampireFang) else {
            return 0.0;
        };
        let chance = self.cfg.heal_chance.get(rarity).clamp(0.0, 1.0);
        if rng.gen_bool(chance as f64) {
            self.cfg.heal_amount.get(rarity).max(0.0)
        } else {
            0.0
        }
    }

    pub fn reset(&mut self, cfg: &ItemsBalance) {
        *self = Self::new(cfg.clone());
    }
}

impl HitBlocker for ItemTriggerSystem {
    fn on_player_hit(&mut self) -> bool {
        ItemTriggerSystem::on_player_hit(self)
    }
}

/// Number of luck bumps a chest's rarity cost buys.
pub fn luck_bumps(cfg: &ItemsBalance, rarity_cost: u32, base_cost: u32) -> u32 {
    if base_cost == 0 || rarity_cost <= base_cost {
        return 0;
    }
    let ratio = rarity_cost as f32 / base_cost as f32;
    (ratio.log2().floor() as u32).min(cfg.max_luck_bumps)
}

/// Rolls chest rewards: distinct kinds, each with its own rarity roll
/// improved by the chest's luck.
pub fn roll_chest_items(
    cfg: &ItemsBalance,
    rarity_cost: u32,
    base_cost: u32,
    rng: &mut impl Rng,
) -> Vec<ItemInstance> {
    let bumps = luck_bumps(cfg, rarity_cost, base_cost);
    let bump_chance = cfg.luck_bump_chance.clamp(0.0, 1.0) as f64;

    let mut kinds = ItemKind::ALL.to_vec();
    kinds.shuffle(rng);
    kinds.truncate(cfg.chest_choices.min(ItemKind::ALL.len()));

    kinds
        .into_iter()
        .map(|kind| {
            let mut rarity = Rarity::roll(&cfg.rarity_table, rng);
            for _ in 0..bumps {
                if rng.gen_bool(bump_chance) {
                    rarity = rarity.bumped();
                }
            }
            ItemInstance { kind, rarity }
        })
        .collect()
}

fn item_tick_system(
    time: Res<Time>,
    balance: Res<Balance>,
    player: Res<Player>,
    progression: Res<RunProgression>,
    bonuses: Res<GlobalBonuses>,
    mut enemies: ResMut<EnemyStore>,
    mut items: ResMut<ItemTriggerSystem>,
) {
    let dt = time.delta_secs();
    items.update(dt);

    let stats = progression.stats(&balance, &bonuses);
    items.apply_toxic(dt, player.pos, &mut *enemies, stats.area_mul, stats.damage_mul);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enemies::tests::dummy;
    use rand::{rngs::StdRng, SeedableRng};

    fn with(items: &[(ItemKind, Rarity)]) -> ItemTriggerSystem {
        let mut system = ItemTriggerSystem::default();
        for (kind, rarity) in items {
            system.add(ItemInstance {
                kind: *kind,
                rarity: *rarity,
            });
        }
        system
    }

    #[test]
    fn shield_blocks_then_recharges_by_best_rarity() {
        let mut items = with(&[
            (ItemKind::ShieldCharm, Rarity::Common),
            (ItemKind::ShieldCharm, Rarity::Epic),
        ]);
        assert!(items.on_player_hit());
        assert!(!items.on_player_hit());

        // Epic recharge is 6.5s.
        items.update(6.0);
        assert!(!items.shield_ready());
        items.update(0.5);
        assert!(items.shield_ready());
    }

    #[test]
    fn unblocked_hit_starts_toxic_cloud() {
        let mut items = with(&[(ItemKind::ToxicFlask, Rarity::Rare)]);
        assert!(!items.on_player_hit());
        assert!(items.toxic_active());

        let mut store = EnemyStore::default();
        let near = store.insert(dummy(Vec2::new(50.0, 0.0), 100.0));
        let far = store.insert(dummy(Vec2::new(200.0, 0.0), 100.0));
        let touched = items.apply_toxic(0.5, Vec2::ZERO, &mut store, 1.0, 1.0);
        assert_eq!(touched, 1);
        // Rare: 10 dps for half a second.
        assert_eq!(store.get(near).map(|e| e.hp), Some(95.0));
        assert_eq!(store.get(far).map(|e| e.hp), Some(100.0));

        items.update(3.5);
        assert!(!items.toxic_active());
        assert_eq!(items.apply_toxic(0.5, Vec2::ZERO, &mut store, 1.0, 1.0), 0);
    }

    #[test]
    fn toxic_multipliers_are_clamped() {
        let mut items = with(&[(ItemKind::ToxicFlask, Rarity::Common)]);
        items.on_player_hit();
        let mut store = EnemyStore::default();
        // Common radius 70; a 10x multiplier clamps to 3x = 210.
        let id = store.insert(dummy(Vec2::new(250.0, 0.0), 100.0));
        items.apply_toxic(1.0, Vec2::ZERO, &mut store, 10.0, 1.0);
        assert_eq!(store.get(id).map(|e| e.hp), Some(100.0));
        let id = store.insert(dummy(Vec2::new(200.0, 0.0), 100.0));
        items.apply_toxic(1.0, Vec2::ZERO, &mut store, 10.0, 10.0);
        assert_eq!(store.get(id).map(|e| e.hp), Some(82.0));
    }

    #[test]
    fn chain_visits_each_enemy_once_with_falloff() {
        let mut cfg = ItemsBalance::default();
        cfg.chain_chance.legendary = 1.0;
        let mut items = ItemTriggerSystem::new(cfg);
        items.add(ItemInstance {
            kind: ItemKind::StormCharm,
            rarity: Rarity::Legendary,
        });

        let mut store = EnemyStore::default();
        let struck = store.insert(dummy(Vec2::ZERO, 1000.0));
        let a = store.insert(dummy(Vec2::new(100.0, 0.0), 1000.0));
        let b = store.insert(dummy(Vec2::new(200.0, 0.0), 1000.0));
        let mut rng = StdRng::seed_from_u64(4);

        let hops = items.on_enemy_hit(struck, Vec2::ZERO, &mut store, &mut rng);
        let ids: Vec<EnemyId> = hops.iter().map(|h| h.enemy).collect();
        assert_eq!(ids, vec![struck, a, b]);
        assert!((hops[1].damage - 36.0 * 0.8).abs() < 1e-4);
        assert!((hops[2].damage - 36.0 * 0.64).abs() < 1e-4);
        assert_eq!(items.links().len(), 2);

        items.update(0.2);
        assert!(items.links().is_empty());
    }

    #[test]
    fn chain_from_a_dead_enemy_still_hops() {
        let mut cfg = ItemsBalance::default();
        cfg.chain_chance.common = 1.0;
        let mut items = ItemTriggerSystem::new(cfg);
        items.add(ItemInstance {
            kind: ItemKind::StormCharm,
            rarity: Rarity::Common,
        });
        let mut store = EnemyStore::default();
        let struck = store.insert(dummy(Vec2::ZERO, 1.0));
        store.damage(struck, 5.0);
        let next = store.insert(dummy(Vec2::new(50.0, 0.0), 100.0));
        let mut rng = StdRng::seed_from_u64(4);

        let hops = items.on_enemy_hit(struck, Vec2::ZERO, &mut store, &mut rng);
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].enemy, next);
    }

    #[test]
    fn heal_roll_needs_a_fang() {
        let mut rng = StdRng::seed_from_u64(8);
        assert_eq!(ItemTriggerSystem::default().roll_on_kill_heal(&mut rng), 0.0);

        let mut cfg = ItemsBalance::default();
        cfg.heal_chance.epic = 1.0;
        let mut items = ItemTriggerSystem::new(cfg);
        items.add(ItemInstance {
            kind: ItemKind::VampireFang,
            rarity: Rarity::Epic,
        });
        assert_eq!(items.roll_on_kill_heal(&mut rng), 3.0);
    }

    #[test]
    fn chest_rolls_distinct_kinds_with_luck() {
        let cfg = ItemsBalance::default();
        assert_eq!(luck_bumps(&cfg, 10, 10), 0);
        assert_eq!(luck_bumps(&cfg, 40, 10), 2);
        assert_eq!(luck_bumps(&cfg, 80, 10), 3);
        assert_eq!(luck_bumps(&cfg, 640, 10), 3);

        let mut rng = StdRng::seed_from_u64(12);
        for _ in 0..50 {
            let items = roll_chest_items(&cfg, 80, 10, &mut rng);
            assert_eq!(items.len(), 3);
            let kinds: HashSet<ItemKind> = items.iter().map(|i| i.kind).collect();
            assert_eq!(kinds.len(), 3);
        }
    }
}
