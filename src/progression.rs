use bevy::prelude::*;

use crate::{
    balance::{Balance, ProgressionBalance, RingsBalance},
    shrines::GlobalBonuses,
    upgrades::{UpgradeCard, UpgradeOption},
};

pub struct ProgressionPlugin;

impl Plugin for ProgressionPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RunProgression>();
    }
}

// ── Vocabulary ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeaponKind {
    FrostStaff,
    Katana,
    Dagger,
    Crossbow,
    FireWand,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 5] = [
        WeaponKind::FrostStaff,
        WeaponKind::Katana,
        WeaponKind::Dagger,
        WeaponKind::Crossbow,
        WeaponKind::FireWand,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WeaponKind::FrostStaff => "Frost Staff",
            WeaponKind::Katana => "Katana",
            WeaponKind::Dagger => "Dagger",
            WeaponKind::Crossbow => "Crossbow",
            WeaponKind::FireWand => "Fire Wand",
        }
    }

    pub fn is_melee(self) -> bool {
        self == WeaponKind::Katana
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeaponAxis {
    Damage,
    FireRate,
    ProjectileSpeed,
    Accuracy,
    Range,
}

impl WeaponAxis {
    pub const ALL: [WeaponAxis; 5] = [
        WeaponAxis::Damage,
        WeaponAxis::FireRate,
        WeaponAxis::ProjectileSpeed,
        WeaponAxis::Accuracy,
        WeaponAxis::Range,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WeaponAxis::Damage => "damage",
            WeaponAxis::FireRate => "fire rate",
            WeaponAxis::ProjectileSpeed => "projectile speed",
            WeaponAxis::Accuracy => "accuracy",
            WeaponAxis::Range => "range",
        }
    }

    /// Whether leveling this axis changes anything for `weapon`. A melee
    /// swing has no projectile to speed up or steady.
    pub fn affects(self, weapon: WeaponKind) -> bool {
        !(weapon.is_melee()
            && matches!(self, WeaponAxis::ProjectileSpeed | WeaponAxis::Accuracy))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeaponMod {
    ExtraShot,
    Ricochet,
    Pierce,
}

impl WeaponMod {
    pub const ALL: [WeaponMod; 3] = [WeaponMod::ExtraShot, WeaponMod::Ricochet, WeaponMod::Pierce];

    pub fn name(self) -> &'static str {
        match self {
            WeaponMod::ExtraShot => "extra shot",
            WeaponMod::Ricochet => "ricochet",
            WeaponMod::Pierce => "pierce",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RingKind {
    Swiftness,
    Might,
    Haste,
    Precision,
    Ferocity,
    Attraction,
}

impl RingKind {
    pub const ALL: [RingKind; 6] = [
        RingKind::Swiftness,
        RingKind::Might,
        RingKind::Haste,
        RingKind::Precision,
        RingKind::Ferocity,
        RingKind::Attraction,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RingKind::Swiftness => "Ring of Swiftness",
            RingKind::Might => "Ring of Might",
            RingKind::Haste => "Ring of Haste",
            RingKind::Precision => "Ring of Precision",
            RingKind::Ferocity => "Ring of Ferocity",
            RingKind::Attraction => "Ring of Attraction",
        }
    }

    /// What one level of this ring adds, as a fraction.
    pub fn per_level(self, cfg: &RingsBalance) -> f32 {
        match self {
            RingKind::Swiftness => cfg.move_speed_per_level,
            RingKind::Might => cfg.damage_per_level,
            RingKind::Haste => cfg.fire_rate_per_level,
            RingKind::Precision => cfg.crit_chance_per_level,
            RingKind::Ferocity => cfg.crit_damage_per_level,
            RingKind::Attraction => cfg.magnet_per_level,
        }
    }

    pub fn stat_name(self) -> &'static str {
        match self {
            RingKind::Swiftness => "move speed",
            RingKind::Might => "damage",
            RingKind::Haste => "fire rate",
            RingKind::Precision => "crit chance",
            RingKind::Ferocity => "crit damage",
            RingKind::Attraction => "pickup radius",
        }
    }
}

// ── Build state ─────────────────────────────────────────────────────────────

/// A held weapon and its independently leveled axes and mods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeaponInstance {
    pub kind: WeaponKind,
    pub damage: u32,
    pub fire_rate: u32,
    pub projectile_speed: u32,
    pub accuracy: u32,
    pub range: u32,
    pub extra_shot: u32,
    pub ricochet: u32,
    pub pierce: u32,
}

impl WeaponInstance {
    pub fn new(kind: WeaponKind) -> Self {
        Self {
            kind,
            damage: 0,
            fire_rate: 0,
            projectile_speed: 0,
            accuracy: 0,
            range: 0,
            extra_shot: 0,
            ricochet: 0,
            pierce: 0,
        }
    }

    pub fn axis_level(&self, axis: WeaponAxis) -> u32 {
        match axis {
            WeaponAxis::Damage => self.damage,
            WeaponAxis::FireRate => self.fire_rate,
            WeaponAxis::ProjectileSpeed => self.projectile_speed,
            WeaponAxis::Accuracy => self.accuracy,
            WeaponAxis::Range => self.range,
        }
    }

    fn axis_level_mut(&mut self, axis: WeaponAxis) -> &mut u32 {
        match axis {
            WeaponAxis::Damage => &mut self.damage,
            WeaponAxis::FireRate => &mut self.fire_rate,
            WeaponAxis::ProjectileSpeed => &mut self.projectile_speed,
            WeaponAxis::Accuracy => &mut self.accuracy,
            WeaponAxis::Range => &mut self.range,
        }
    }

    pub fn mod_level(&self, weapon_mod: WeaponMod) -> u32 {
        match weapon_mod {
            WeaponMod::ExtraShot => self.extra_shot,
            WeaponMod::Ricochet => self.ricochet,
            WeaponMod::Pierce => self.pierce,
        }
    }

    fn mod_level_mut(&mut self, weapon_mod: WeaponMod) -> &mut u32 {
        match weapon_mod {
            WeaponMod::ExtraShot => &mut self.extra_shot,
            WeaponMod::Ricochet => &mut self.ricochet,
            WeaponMod::Pierce => &mut self.pierce,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingInstance {
    pub kind: RingKind,
    pub level: u32,
}

/// Every multiplier the run systems read, rings and shrine bonuses folded
/// together.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatSheet {
    pub move_speed_mul: f32,
    pub damage_mul: f32,
    pub fire_rate_mul: f32,
    pub crit_chance: f32,
    pub crit_mul: f32,
    pub magnet_mul: f32,
    pub xp_gain_mul: f32,
    pub area_mul: f32,
}

impl Default for StatSheet {
    fn default() -> Self {
        Self {
            move_speed_mul: 1.0,
            damage_mul: 1.0,
            fire_rate_mul: 1.0,
            crit_chance: 0.0,
            crit_mul: 1.0,
            magnet_mul: 1.0,
            xp_gain_mul: 1.0,
            area_mul: 1.0,
        }
    }
}

/// Level, xp curve and the player's build.
#[derive(Resource, Debug, Clone)]
pub struct RunProgression {
    cfg: ProgressionBalance,
    level: u32,
    xp: u32,
    xp_to_next: u32,
    weapons: Vec<WeaponInstance>,
    rings: Vec<RingInstance>,
}

impl Default for RunProgression {
    fn default() -> Self {
        Self::new(ProgressionBalance::default())
    }
}

impl RunProgression {
    pub fn new(cfg: ProgressionBalance) -> Self {
        let mut progression = Self {
            cfg,
            level: 1,
            xp: 0,
            xp_to_next: 0,
            weapons: Vec::new(),
            rings: Vec::new(),
        };
        progression.xp_to_next = progression.threshold(1);
        progression
    }

    fn threshold(&self, level: u32) -> u32 {
        self.cfg
            .xp_base
            .saturating_add(level.saturating_mul(self.cfg.xp_per_level))
            .max(1)
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn xp(&self) -> u32 {
        self.xp
    }

    pub fn xp_to_next(&self) -> u32 {
        self.xp_to_next
    }

    pub fn limits(&self) -> &ProgressionBalance {
        &self.cfg
    }

    pub fn weapons(&self) -> &[WeaponInstance] {
        &self.weapons
    }

    pub fn rings(&self) -> &[RingInstance] {
        &self.rings
    }

    pub fn weapon(&self, kind: WeaponKind) -> Option<&WeaponInstance> {
        self.weapons.iter().find(|w| w.kind == kind)
    }

    pub fn ring_level(&self, kind: RingKind) -> u32 {
        self.rings
            .iter()
            .find(|r| r.kind == kind)
            .map_or(0, |r| r.level)
    }

    /// Adds xp and levels up as many times as it pays for. Returns the
    /// number of levels gained. Zero and negative amounts change nothing.
    pub fn add_xp(&mut self, amount: i32) -> u32 {
        if amount <= 0 {
            return 0;
        }
        self.xp = self.xp.saturating_add(amount as u32);
        let mut gained = 0;
        while self.xp >= self.xp_to_next {
            self.xp -= self.xp_to_next;
            self.level += 1;
            self.xp_to_next = self.threshold(self.level);
            gained += 1;
        }
        gained
    }

    /// Applies a picked card. Adding something already held, adding past the
    /// slot limit, or upgrading something not held does nothing and returns
    /// false.
    pub fn apply_upgrade(&mut self, card: &UpgradeCard) -> bool {
        let steps = card.steps.max(1);
        match card.option {
            UpgradeOption::AddWeapon(kind) => self.add_weapon(kind),
            UpgradeOption::AddRing(kind) => {
                if self.ring_level(kind) > 0 || self.rings.len() >= self.cfg.max_rings {
                    return false;
                }
                self.rings.push(RingInstance { kind, level: 1 });
                true
            }
            UpgradeOption::UpgradeWeapon { weapon, axis } => {
                let cap = self.cfg.axis_cap;
                let Some(held) = self.weapons.iter_mut().find(|w| w.kind == weapon) else {
                    return false;
                };
                let level = held.axis_level_mut(axis);
                *level = level.saturating_add(steps).min(cap);
                true
            }
            UpgradeOption::WeaponMod { weapon, kind } => {
                let cap = self.cfg.mod_cap;
                let Some(held) = self.weapons.iter_mut().find(|w| w.kind == weapon) else {
                    return false;
                };
                let level = held.mod_level_mut(kind);
                *level = level.saturating_add(1).min(cap);
                true
            }
            UpgradeOption::UpgradeRing(kind) => {
                let cap = self.cfg.ring_cap;
                let Some(ring) = self.rings.iter_mut().find(|r| r.kind == kind) else {
                    return false;
                };
                ring.level = ring.level.saturating_add(steps).min(cap);
                true
            }
        }
    }

    pub fn add_weapon(&mut self, kind: WeaponKind) -> bool {
        if self.weapon(kind).is_some() || self.weapons.len() >= self.cfg.max_weapons {
            return false;
        }
        self.weapons.push(WeaponInstance::new(kind));
        true
    }

    fn ring_bonus(&self, kind: RingKind, cfg: &RingsBalance) -> f32 {
        self.ring_level(kind) as f32 * kind.per_level(cfg)
    }

    pub fn move_speed_multiplier(&self, cfg: &RingsBalance) -> f32 {
        1.0 + self.ring_bonus(RingKind::Swiftness, cfg)
    }

    pub fn damage_multiplier(&self, cfg: &RingsBalance) -> f32 {
        1.0 + self.ring_bonus(RingKind::Might, cfg)
    }

    pub fn fire_rate_multiplier(&self, cfg: &RingsBalance) -> f32 {
        1.0 + self.ring_bonus(RingKind::Haste, cfg)
    }

    pub fn crit_chance(&self, cfg: &RingsBalance) -> f32 {
        (cfg.base_crit_chance + self.ring_bonus(RingKind::Precision, cfg)).clamp(0.0, 1.0)
    }

    pub fn crit_multiplier(&self, cfg: &RingsBalance) -> f32 {
        (cfg.base_crit_mul + self.ring_bonus(RingKind::Ferocity, cfg)).max(1.0)
    }

    pub fn magnet_multiplier(&self, cfg: &RingsBalance) -> f32 {
        1.0 + self.ring_bonus(RingKind::Attraction, cfg)
    }

    pub fn stats(&self, balance: &Balance, bonuses: &GlobalBonuses) -> StatSheet {
        let rings = &balance.rings;
        StatSheet {
            move_speed_mul: self.move_speed_multiplier(rings) * (1.0 + bonuses.move_speed),
            damage_mul: self.damage_multiplier(rings) * (1.0 + bonuses.damage),
            fire_rate_mul: self.fire_rate_multiplier(rings) * (1.0 + bonuses.fire_rate),
            crit_chance: self.crit_chance(rings),
            crit_mul: self.crit_multiplier(rings),
            magnet_mul: self.magnet_multiplier(rings) * (1.0 + bonuses.magnet),
            xp_gain_mul: 1.0 + bonuses.xp_gain,
            area_mul: 1.0 + bonuses.area,
        }
    }

    pub fn reset(&mut self, cfg: &ProgressionBalance) {
        *self = Self::new(cfg.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rarity::Rarity;

    fn card(option: UpgradeOption, steps: u32) -> UpgradeCard {
        UpgradeCard {
            option,
            rarity: Rarity::Common,
            steps,
            weight: 1.0,
            relevant: true,
        }
    }

    #[test]
    fn zero_and_negative_xp_change_nothing() {
        let mut p = RunProgression::default();
        assert_eq!(p.add_xp(0), 0);
        assert_eq!(p.add_xp(-20), 0);
        assert_eq!((p.level(), p.xp(), p.xp_to_next()), (1, 0, 13));
    }

    #[test]
    fn multi_level_xp_gain() {
        let mut p = RunProgression::default();
        // 13 to reach level 2, 16 to reach 3, then 5 left over.
        assert_eq!(p.add_xp(34), 2);
        assert_eq!(p.level(), 3);
        assert_eq!(p.xp(), 5);
        assert!(p.xp() < p.xp_to_next());
        assert_eq!(p.xp_to_next(), 19);

        assert_eq!(p.add_xp(14), 1);
        assert_eq!(p.xp(), 0);
    }

    #[test]
    fn adds_respect_uniqueness_and_slots() {
        let mut p = RunProgression::default();
        assert!(p.apply_upgrade(&card(UpgradeOption::AddWeapon(WeaponKind::Dagger), 1)));
        assert!(!p.apply_upgrade(&card(UpgradeOption::AddWeapon(WeaponKind::Dagger), 1)));
        for kind in WeaponKind::ALL {
            p.add_weapon(kind);
        }
        assert_eq!(p.weapons().len(), p.limits().max_weapons);

        for kind in RingKind::ALL {
            p.apply_upgrade(&card(UpgradeOption::AddRing(kind), 1));
        }
        assert_eq!(p.rings().len(), p.limits().max_rings);
    }

    #[test]
    fn upgrades_step_and_cap() {
        let mut p = RunProgression::default();
        p.add_weapon(WeaponKind::FrostStaff);
        let up = |axis| UpgradeOption::UpgradeWeapon {
            weapon: WeaponKind::FrostStaff,
            axis,
        };
        p.apply_upgrade(&card(up(WeaponAxis::Damage), 7));
        p.apply_upgrade(&card(up(WeaponAxis::Damage), 7));
        assert_eq!(p.weapon(WeaponKind::FrostStaff).map(|w| w.damage), Some(12));

        let pierce = UpgradeOption::WeaponMod {
            weapon: WeaponKind::FrostStaff,
            kind: WeaponMod::Pierce,
        };
        for _ in 0..4 {
            p.apply_upgrade(&card(pierce, 4));
        }
        assert_eq!(p.weapon(WeaponKind::FrostStaff).map(|w| w.pierce), Some(2));

        // Not held: silent no-op.
        assert!(!p.apply_upgrade(&card(
            UpgradeOption::UpgradeWeapon {
                weapon: WeaponKind::Katana,
                axis: WeaponAxis::Damage,
            },
            1
        )));
    }

    #[test]
    fn ring_levels_drive_multipliers() {
        let balance = Balance::default();
        let mut p = RunProgression::default();
        assert_eq!(p.damage_multiplier(&balance.rings), 1.0);

        p.apply_upgrade(&card(UpgradeOption::AddRing(RingKind::Might), 1));
        p.apply_upgrade(&card(UpgradeOption::UpgradeRing(RingKind::Might), 2));
        assert!((p.damage_multiplier(&balance.rings) - 1.24).abs() < 1e-5);

        let bonuses = GlobalBonuses {
            damage: 0.5,
            ..Default::default()
        };
        let stats = p.stats(&balance, &bonuses);
        assert!((stats.damage_mul - 1.24 * 1.5).abs() < 1e-5);
        assert!((stats.crit_chance - balance.rings.base_crit_chance).abs() < 1e-6);
    }
}
