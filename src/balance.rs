use std::path::{Path, PathBuf};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rarity::PerRarity;

/// Installs the `Balance` resource. Runs before every other run plugin so
/// they can size their own resources from it.
pub struct BalancePlugin {
    /// Explicit document to load. `None` searches the default locations.
    pub path: Option<PathBuf>,
    /// Pre-built balance (tests, tools). Skips the file system entirely.
    pub preset: Option<Balance>,
}

impl Plugin for BalancePlugin {
    fn build(&self, app: &mut App) {
        let balance = match &self.preset {
            Some(balance) => balance.clone(),
            None => load_balance(self.path.as_deref()),
        };
        app.insert_resource(balance);
    }
}

/// The whole tuning document.
///
/// Every numeric knob of the run lives here, and every struct is
/// `#[serde(default)]`: a `balance.ron` that only overrides
/// `spawning.director.min_interval` is valid and keeps every other baseline.
///
/// Values are not validated on load. Systems clamp what they read at the
/// point of use, so a bad number skews balance instead of crashing a run.
#[derive(Resource, Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Balance {
    pub targeting: TargetingBalance,
    pub weapons: WeaponsBalance,
    pub rings: RingsBalance,
    pub progression: ProgressionBalance,
    pub cards: CardsBalance,
    pub spawning: SpawningBalance,
    pub combat: CombatBalance,
    pub shrines: ShrinesBalance,
    pub player: PlayerBalance,
    pub items: ItemsBalance,
    pub loot: LootBalance,
}

// ── Targeting ───────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TargetingBalance {
    /// Acquisition range for the auto-attack target.
    pub range: f32,
    /// A candidate must be closer than this fraction of the current target's
    /// squared distance to steal the target.
    pub hysteresis_mul: f32,
    /// A held target is dropped once it is farther than `range * lose_margin`.
    pub lose_margin: f32,
    /// Seconds between full rescans.
    pub retarget_interval: f32,
}

impl Default for TargetingBalance {
    fn default() -> Self {
        Self {
            range: 420.0,
            hysteresis_mul: 0.8,
            lose_margin: 1.1,
            retarget_interval: 0.12,
        }
    }
}

// ── Weapons ─────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ProjectileWeaponStats {
    pub damage: f32,
    pub cooldown: f32,
    pub speed: f32,
    pub spread_deg: f32,
    pub range: f32,
    pub radius: f32,
    pub pierce: u32,
    pub ricochet: u32,
}

impl Default for ProjectileWeaponStats {
    fn default() -> Self {
        Self {
            damage: 8.0,
            cooldown: 1.0,
            speed: 420.0,
            spread_deg: 4.0,
            range: 400.0,
            radius: 6.0,
            pierce: 0,
            ricochet: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MeleeWeaponStats {
    pub damage: f32,
    pub cooldown: f32,
    pub range: f32,
    /// Minimum cosine between the swing direction and an enemy to be hit.
    pub arc_cos: f32,
}

impl Default for MeleeWeaponStats {
    fn default() -> Self {
        Self {
            damage: 16.0,
            cooldown: 1.0,
            range: 90.0,
            arc_cos: 0.2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WeaponsBalance {
    pub frost_staff: ProjectileWeaponStats,
    pub dagger: ProjectileWeaponStats,
    pub crossbow: ProjectileWeaponStats,
    pub fire_wand: ProjectileWeaponStats,
    pub katana: MeleeWeaponStats,
    /// Per upgrade level, as a fraction of the base value.
    pub damage_per_level: f32,
    pub fire_rate_per_level: f32,
    pub projectile_speed_per_level: f32,
    pub range_per_level: f32,
    /// Each accuracy level multiplies spread by `1 - accuracy_per_level`.
    pub accuracy_per_level: f32,
    /// Angle between fanned projectiles from extra-shot levels.
    pub extra_shot_fan_deg: f32,
    /// Floor for any resolved fire cooldown.
    pub min_cooldown: f32,
}

impl Default for WeaponsBalance {
    fn default() -> Self {
        Self {
            frost_staff: ProjectileWeaponStats {
                damage: 9.0,
                cooldown: 0.9,
                speed: 420.0,
                spread_deg: 4.0,
                range: 420.0,
                radius: 7.0,
                pierce: 0,
                ricochet: 0,
            },
            dagger: ProjectileWeaponStats {
                damage: 6.0,
                cooldown: 0.45,
                speed: 560.0,
                spread_deg: 6.0,
                range: 360.0,
                radius: 5.0,
                pierce: 1,
                ricochet: 0,
            },
            crossbow: ProjectileWeaponStats {
                damage: 14.0,
                cooldown: 1.2,
                speed: 640.0,
                spread_deg: 2.0,
                range: 520.0,
                radius: 6.0,
                pierce: 2,
                ricochet: 0,
            },
            fire_wand: ProjectileWeaponStats {
                damage: 11.0,
                cooldown: 0.8,
                speed: 380.0,
                spread_deg: 8.0,
                range: 400.0,
                radius: 8.0,
                pierce: 0,
                ricochet: 1,
            },
            katana: MeleeWeaponStats::default(),
            damage_per_level: 0.12,
            fire_rate_per_level: 0.08,
            projectile_speed_per_level: 0.07,
            range_per_level: 0.06,
            accuracy_per_level: 0.1,
            extra_shot_fan_deg: 8.0,
            min_cooldown: 0.05,
        }
    }
}

// ── Rings ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RingsBalance {
    pub move_speed_per_level: f32,
    pub damage_per_level: f32,
    pub fire_rate_per_level: f32,
    pub crit_chance_per_level: f32,
    pub crit_damage_per_level: f32,
    pub magnet_per_level: f32,
    pub base_crit_chance: f32,
    pub base_crit_mul: f32,
}

impl Default for RingsBalance {
    fn default() -> Self {
        Self {
            move_speed_per_level: 0.06,
            damage_per_level: 0.08,
            fire_rate_per_level: 0.07,
            crit_chance_per_level: 0.04,
            crit_damage_per_level: 0.15,
            magnet_per_level: 0.15,
            base_crit_chance: 0.05,
            base_crit_mul: 1.5,
        }
    }
}

// ── Progression ─────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ProgressionBalance {
    /// xp_to_next = xp_base + level * xp_per_level
    pub xp_base: u32,
    pub xp_per_level: u32,
    pub max_weapons: usize,
    pub max_rings: usize,
    /// Highest level any weapon axis can reach.
    pub axis_cap: u32,
    /// Highest level of extra-shot / ricochet / pierce mods.
    pub mod_cap: u32,
    pub ring_cap: u32,
}

impl Default for ProgressionBalance {
    fn default() -> Self {
        Self {
            xp_base: 10,
            xp_per_level: 3,
            max_weapons: 4,
            max_rings: 4,
            axis_cap: 12,
            mod_cap: 2,
            ring_cap: 10,
        }
    }
}

// ── Cards ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CardsBalance {
    pub choices: usize,
    pub weight_add_weapon: f32,
    pub weight_add_ring: f32,
    pub weight_upgrade_weapon: f32,
    pub weight_weapon_mod: f32,
    pub weight_upgrade_ring: f32,
    pub rarity_table: PerRarity<f32>,
    /// Internal levels granted by one pick of a card of that rarity.
    pub rarity_steps: PerRarity<u32>,
}

impl Default for CardsBalance {
    fn default() -> Self {
        Self {
            choices: 3,
            weight_add_weapon: 1.0,
            weight_add_ring: 0.9,
            weight_upgrade_weapon: 1.2,
            weight_weapon_mod: 0.6,
            weight_upgrade_ring: 1.0,
            rarity_table: PerRarity::new(0.72, 0.23, 0.045, 0.005),
            rarity_steps: PerRarity::new(1, 2, 4, 7),
        }
    }
}

// ── Spawning ────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SpawningBalance {
    pub director: DirectorBalance,
    pub enemies: EnemiesBalance,
    pub ranged: RangedBalance,
    pub elite: EliteBalance,
    pub boss: BossBalance,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DirectorBalance {
    pub ramp_seconds: f32,
    /// < 1 ramps faster early in the run.
    pub ramp_pow: f32,
    pub max_interval: f32,
    pub min_interval: f32,
    pub crowd_div: f32,
    pub crowd_mul_cap: f32,
    pub start_soft_mul: f32,
    pub start_soft_seconds: f32,
    pub end_spike_start_sec: f32,
    pub end_spike_ramp_seconds: f32,
    /// < 1 means denser spawning during the end-game spike.
    pub end_spike_mul: f32,
    pub max_spawns_per_frame: u32,
    pub initial_delay: f32,
    /// Hard ceiling on live enemies; spawns past it are dropped.
    pub max_alive: usize,
}

impl Default for DirectorBalance {
    fn default() -> Self {
        Self {
            ramp_seconds: 480.0,
            ramp_pow: 0.7,
            max_interval: 1.1,
            min_interval: 0.18,
            crowd_div: 60.0,
            crowd_mul_cap: 2.2,
            start_soft_mul: 1.6,
            start_soft_seconds: 30.0,
            end_spike_start_sec: 540.0,
            end_spike_ramp_seconds: 45.0,
            end_spike_mul: 0.7,
            max_spawns_per_frame: 6,
            initial_delay: 1.0,
            max_alive: 350,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct EnemyStats {
    pub hp: f32,
    pub speed: f32,
    pub contact_damage: f32,
    pub radius: f32,
    pub xp: u32,
    pub gold: u32,
}

impl Default for EnemyStats {
    fn default() -> Self {
        Self {
            hp: 14.0,
            speed: 70.0,
            contact_damage: 8.0,
            radius: 14.0,
            xp: 1,
            gold: 1,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EnemiesBalance {
    pub normal: EnemyStats,
    pub fast: EnemyStats,
    pub tank: EnemyStats,
    pub ranged: EnemyStats,
    pub fast_unlock_seconds: f32,
    pub ranged_unlock_seconds: f32,
    pub tank_unlock_seconds: f32,
    pub normal_weight: f32,
    pub fast_weight: f32,
    pub ranged_weight: f32,
    pub tank_weight: f32,
    /// Fractional hp gain per minute of run time.
    pub hp_growth_per_minute: f32,
    /// Spawn ring around the player.
    pub spawn_min_distance: f32,
    pub spawn_max_distance: f32,
}

impl Default for EnemiesBalance {
    fn default() -> Self {
        Self {
            normal: EnemyStats::default(),
            fast: EnemyStats {
                hp: 8.0,
                speed: 120.0,
                contact_damage: 6.0,
                radius: 11.0,
                xp: 1,
                gold: 1,
            },
            tank: EnemyStats {
                hp: 60.0,
                speed: 45.0,
                contact_damage: 16.0,
                radius: 22.0,
                xp: 4,
                gold: 3,
            },
            ranged: EnemyStats {
                hp: 18.0,
                speed: 60.0,
                contact_damage: 6.0,
                radius: 13.0,
                xp: 2,
                gold: 2,
            },
            fast_unlock_seconds: 45.0,
            ranged_unlock_seconds: 90.0,
            tank_unlock_seconds: 120.0,
            normal_weight: 1.0,
            fast_weight: 0.45,
            ranged_weight: 0.3,
            tank_weight: 0.2,
            hp_growth_per_minute: 0.12,
            spawn_min_distance: 520.0,
            spawn_max_distance: 680.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RangedBalance {
    pub desired_min: f32,
    pub desired_max: f32,
    pub shoot_range: f32,
    pub base_cooldown: f32,
    pub projectile_damage: f32,
    pub projectile_speed: f32,
    pub projectile_radius: f32,
    /// Fire-rate multiplier ramps from 1.0 to `rate_cap` over this many seconds.
    pub rate_ramp_seconds: f32,
    pub rate_cap: f32,
    pub elite_jitter_chance: f32,
    pub elite_jitter_mul: f32,
}

impl Default for RangedBalance {
    fn default() -> Self {
        Self {
            desired_min: 160.0,
            desired_max: 260.0,
            shoot_range: 340.0,
            base_cooldown: 2.2,
            projectile_damage: 7.0,
            projectile_speed: 220.0,
            projectile_radius: 6.0,
            rate_ramp_seconds: 420.0,
            rate_cap: 1.8,
            elite_jitter_chance: 0.12,
            elite_jitter_mul: 0.85,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EliteBalance {
    pub base_chance: f32,
    pub chance_per_minute: f32,
    pub max_chance: f32,
    pub hp_mul: f32,
    pub damage_mul: f32,
    pub radius_mul: f32,
    pub reward_mul: u32,
}

impl Default for EliteBalance {
    fn default() -> Self {
        Self {
            base_chance: 0.02,
            chance_per_minute: 0.005,
            max_chance: 0.08,
            hp_mul: 4.0,
            damage_mul: 1.5,
            radius_mul: 1.3,
            reward_mul: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BossBalance {
    pub spawn_at_seconds: f32,
    pub stats: EnemyStats,
}

impl Default for BossBalance {
    fn default() -> Self {
        Self {
            spawn_at_seconds: 600.0,
            stats: EnemyStats {
                hp: 2500.0,
                speed: 55.0,
                contact_damage: 30.0,
                radius: 40.0,
                xp: 50,
                gold: 50,
            },
        }
    }
}

// ── Combat ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CombatBalance {
    pub arena_half_width: f32,
    pub arena_half_height: f32,
    /// Projectiles are culled once this far outside the arena.
    pub projectile_margin: f32,
    pub ricochet_acquire_range: f32,
    pub min_ricochet_speed: f32,
}

impl Default for CombatBalance {
    fn default() -> Self {
        Self {
            arena_half_width: 1200.0,
            arena_half_height: 1200.0,
            projectile_margin: 64.0,
            ricochet_acquire_range: 360.0,
            min_ricochet_speed: 260.0,
        }
    }
}

// ── Shrines ─────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ShrineMagnitudes {
    pub damage: PerRarity<f32>,
    pub fire_rate: PerRarity<f32>,
    pub move_speed: PerRarity<f32>,
    pub max_health: PerRarity<f32>,
    pub magnet: PerRarity<f32>,
    pub xp_gain: PerRarity<f32>,
    pub area: PerRarity<f32>,
}

impl Default for ShrineMagnitudes {
    fn default() -> Self {
        Self {
            damage: PerRarity::new(0.06, 0.10, 0.16, 0.25),
            fire_rate: PerRarity::new(0.05, 0.09, 0.14, 0.22),
            move_speed: PerRarity::new(0.04, 0.07, 0.11, 0.18),
            max_health: PerRarity::new(10.0, 18.0, 30.0, 50.0),
            magnet: PerRarity::new(0.10, 0.18, 0.30, 0.50),
            xp_gain: PerRarity::new(0.08, 0.14, 0.22, 0.35),
            area: PerRarity::new(0.08, 0.14, 0.22, 0.35),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ShrinesBalance {
    pub max_active: usize,
    pub first_spawn_seconds: f32,
    pub interval_seconds: f32,
    pub interval_jitter: f32,
    pub spawn_min_distance: f32,
    pub spawn_max_distance: f32,
    pub radius: f32,
    pub channel_seconds: f32,
    /// Progress lost per second outside, relative to the accrual rate.
    pub decay_mul: f32,
    pub choices: usize,
    pub rarity_table: PerRarity<f32>,
    pub magnitudes: ShrineMagnitudes,
}

impl Default for ShrinesBalance {
    fn default() -> Self {
        Self {
            max_active: 2,
            first_spawn_seconds: 60.0,
            interval_seconds: 75.0,
            interval_jitter: 20.0,
            spawn_min_distance: 280.0,
            spawn_max_distance: 520.0,
            radius: 60.0,
            channel_seconds: 3.0,
            decay_mul: 1.2,
            choices: 3,
            rarity_table: PerRarity::new(0.60, 0.28, 0.10, 0.02),
            magnitudes: ShrineMagnitudes::default(),
        }
    }
}

// ── Player ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PlayerBalance {
    pub max_hp: f32,
    pub invuln_seconds: f32,
    pub move_speed: f32,
    pub radius: f32,
    pub base_magnet_radius: f32,
}

impl Default for PlayerBalance {
    fn default() -> Self {
        Self {
            max_hp: 100.0,
            invuln_seconds: 0.6,
            move_speed: 180.0,
            radius: 14.0,
            base_magnet_radius: 90.0,
        }
    }
}

// ── Items ───────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ItemsBalance {
    pub shield_cooldown: PerRarity<f32>,
    pub toxic_duration: PerRarity<f32>,
    pub toxic_dps: PerRarity<f32>,
    pub toxic_radius: PerRarity<f32>,
    pub chain_chance: PerRarity<f32>,
    pub chain_damage: PerRarity<f32>,
    pub chain_count: PerRarity<u32>,
    pub chain_range: f32,
    pub chain_falloff: f32,
    pub link_ttl: f32,
    pub heal_chance: PerRarity<f32>,
    pub heal_amount: PerRarity<f32>,
    /// Base rarity odds for chest rewards.
    pub rarity_table: PerRarity<f32>,
    /// Chance per luck bump to raise a chest reward one tier.
    pub luck_bump_chance: f32,
    pub max_luck_bumps: u32,
    pub chest_choices: usize,
}

impl Default for ItemsBalance {
    fn default() -> Self {
        Self {
            shield_cooldown: PerRarity::new(12.0, 9.0, 6.5, 4.5),
            toxic_duration: PerRarity::new(2.5, 3.5, 4.5, 6.0),
            toxic_dps: PerRarity::new(6.0, 10.0, 16.0, 26.0),
            toxic_radius: PerRarity::new(70.0, 85.0, 100.0, 125.0),
            chain_chance: PerRarity::new(0.10, 0.15, 0.22, 0.32),
            chain_damage: PerRarity::new(8.0, 14.0, 22.0, 36.0),
            chain_count: PerRarity::new(2, 3, 4, 6),
            chain_range: 180.0,
            chain_falloff: 0.8,
            link_ttl: 0.12,
            heal_chance: PerRarity::new(0.05, 0.08, 0.12, 0.18),
            heal_amount: PerRarity::new(1.0, 2.0, 3.0, 5.0),
            rarity_table: PerRarity::new(0.70, 0.22, 0.07, 0.01),
            luck_bump_chance: 0.35,
            max_luck_bumps: 3,
            chest_choices: 3,
        }
    }
}

// ── Loot ────────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct OrbBalance {
    pub pickup_radius: f32,
    /// Scales the player's magnet radius for this orb type.
    pub magnet_mul: f32,
    pub min_speed: f32,
    pub max_speed: f32,
}

impl Default for OrbBalance {
    fn default() -> Self {
        Self {
            pickup_radius: 18.0,
            magnet_mul: 1.0,
            min_speed: 160.0,
            max_speed: 520.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LootBalance {
    pub orb_ttl: f32,
    pub scatter_speed: f32,
    /// Per-tick velocity multiplier for orbs outside the magnet.
    pub damping: f32,
    pub xp: OrbBalance,
    pub gold: OrbBalance,
    pub chest_base_cost: u32,
    pub chest_cost_cap: u32,
    pub elite_rarity_cost: u32,
    pub chest_interval: f32,
    pub chest_spawn_attempts: u32,
    pub chest_min_player_distance: f32,
    pub chest_open_radius: f32,
    pub chest_radius: f32,
    pub max_world_chests: usize,
}

impl Default for LootBalance {
    fn default() -> Self {
        Self {
            orb_ttl: 45.0,
            scatter_speed: 40.0,
            damping: 0.88,
            xp: OrbBalance::default(),
            gold: OrbBalance {
                pickup_radius: 18.0,
                magnet_mul: 0.8,
                min_speed: 140.0,
                max_speed: 460.0,
            },
            chest_base_cost: 10,
            chest_cost_cap: 640,
            elite_rarity_cost: 80,
            chest_interval: 45.0,
            chest_spawn_attempts: 12,
            chest_min_player_distance: 300.0,
            chest_open_radius: 40.0,
            chest_radius: 18.0,
            max_world_chests: 3,
        }
    }
}

// =============================================================================
// Loading
//
// Lookup order: an explicit path, then ./balance.ron, then the per-user config
// directory. The first file that exists wins. A missing or broken document is
// never fatal: it is logged and the built-in defaults are used.
// =============================================================================

const BALANCE_FILE: &str = "balance.ron";

fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    paths.push(PathBuf::from(BALANCE_FILE));
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("horde-run").join(BALANCE_FILE));
    }
    paths
}

/// Loads the tuning document, falling back to `Balance::default()`.
pub fn load_balance(explicit: Option<&Path>) -> Balance {
    if let Some(path) = explicit {
        if !path.exists() {
            warn!("Balance file {:?} does not exist. Searching defaults.", path);
        }
    }

    for path in candidate_paths(explicit) {
        if !path.exists() {
            continue;
        }
        return match std::fs::read_to_string(&path) {
            Ok(contents) => match parse_balance(&contents) {
                Ok(balance) => {
                    info!("Loaded balance from {:?}", path);
                    balance
                }
                Err(e) => {
                    error!("Failed to parse {:?}: {}. Using defaults.", path, e);
                    Balance::default()
                }
            },
            Err(e) => {
                error!("Failed to read {:?}: {}. Using defaults.", path, e);
                Balance::default()
            }
        };
    }

    info!("No balance document found. Using built-in defaults.");
    Balance::default()
}

pub fn parse_balance(contents: &str) -> Result<Balance, ron::error::SpannedError> {
    ron::from_str::<Balance>(contents)
}
