use bevy::prelude::*;

use crate::{
    balance::PlayerBalance,
    enemies::EnemyStore,
    events::{PlayerDied, PlayerHit, ShieldBlocked},
    items::ItemTriggerSystem,
    player::Player,
    run_state::{RunFlow, RunState},
    RunTick,
};

pub struct HealthPlugin;

impl Plugin for HealthPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PlayerHealth>()
            .add_systems(Update, player_damage_system.in_set(RunTick::PlayerDamage));
    }
}

/// Something that may swallow a hit before it lands (a shield charm).
pub trait HitBlocker {
    /// Called once per hit that got past invulnerability. Returns true if
    /// the hit was consumed.
    fn on_player_hit(&mut self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HitOutcome {
    /// Zero or negative damage, or the player is already dead.
    Ignored,
    /// Landed inside the invulnerability window.
    Invulnerable,
    /// Consumed by a blocker.
    Shielded,
    Damaged { amount: f32, died: bool },
}

impl HitOutcome {
    pub fn blocked(&self) -> bool {
        matches!(self, HitOutcome::Invulnerable | HitOutcome::Shielded)
    }
}

/// Player hp and the invulnerability window after each landed hit.
#[derive(Resource, Debug, Clone)]
pub struct PlayerHealth {
    max_hp: f32,
    hp: f32,
    invuln: f32,
    invuln_duration: f32,
    /// Hits raised earlier in the tick (enemy projectiles), resolved in the
    /// player damage step.
    queued: Vec<f32>,
}

impl Default for PlayerHealth {
    fn default() -> Self {
        Self::from_balance(&PlayerBalance::default())
    }
}

impl PlayerHealth {
    pub fn new(max_hp: f32, invuln_duration: f32) -> Self {
        let max_hp = max_hp.max(1.0);
        Self {
            max_hp,
            hp: max_hp,
            invuln: 0.0,
            invuln_duration: invuln_duration.max(0.0),
            queued: Vec::new(),
        }
    }

    pub fn from_balance(cfg: &PlayerBalance) -> Self {
        Self::new(cfg.max_hp, cfg.invuln_seconds)
    }

    pub fn hp(&self) -> f32 {
        self.hp
    }

    pub fn max_hp(&self) -> f32 {
        self.max_hp
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0.0
    }

    pub fn is_invulnerable(&self) -> bool {
        self.invuln > 0.0
    }

    /// Whether the window is still open once `dt` more seconds have passed.
    /// Hits raised before the player damage step counts the window down use
    /// this instead of `is_invulnerable`.
    pub fn invulnerable_after(&self, dt: f32) -> bool {
        self.invuln - dt.max(0.0) > 0.0
    }

    pub fn update(&mut self, dt: f32) {
        self.invuln = (self.invuln - dt.max(0.0)).max(0.0);
    }

    pub fn apply_hit(&mut self, damage: f32, blocker: &mut impl HitBlocker) -> HitOutcome {
        if damage <= 0.0 || self.is_dead() {
            return HitOutcome::Ignored;
        }
        if self.is_invulnerable() {
            return HitOutcome::Invulnerable;
        }
        if blocker.on_player_hit() {
            return HitOutcome::Shielded;
        }

        let before = self.hp;
        self.hp = (self.hp - damage).max(0.0);
        self.invuln = self.invuln_duration;
        HitOutcome::Damaged {
            amount: before - self.hp,
            died: self.hp <= 0.0,
        }
    }

    /// Restores hp up to the max. Returns the amount actually healed.
    pub fn heal(&mut self, amount: f32) -> f32 {
        if amount <= 0.0 || self.is_dead() {
            return 0.0;
        }
        let before = self.hp;
        self.hp = (self.hp + amount).min(self.max_hp);
        self.hp - before
    }

    /// Grows max hp and grants the same amount of current hp.
    pub fn raise_max(&mut self, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        self.max_hp += amount;
        self.hp = (self.hp + amount).min(self.max_hp);
    }

    pub fn queue_hit(&mut self, damage: f32) {
        self.queued.push(damage);
    }

    pub fn reset(&mut self, cfg: &PlayerBalance) {
        *self = Self::from_balance(cfg);
    }
}

/// Contact damage from every overlapping enemy, then the queued projectile
/// hits, all through the same gate.
fn player_damage_system(
    time: Res<Time>,
    player: Res<Player>,
    enemies: Res<EnemyStore>,
    mut health: ResMut<PlayerHealth>,
    mut items: ResMut<ItemTriggerSystem>,
    mut flow: ResMut<RunFlow>,
    mut player_hits: MessageWriter<PlayerHit>,
    mut shield_blocks: MessageWriter<ShieldBlocked>,
    mut deaths: MessageWriter<PlayerDied>,
) {
    health.update(time.delta_secs());

    let mut incoming = std::mem::take(&mut health.queued);
    for (_, enemy) in enemies.iter() {
        if !enemy.is_alive() {
            continue;
        }
        let reach = enemy.radius + player.radius;
        if enemy.pos.distance_squared(player.pos) <= reach * reach {
            incoming.push(enemy.contact_damage);
        }
    }

    for damage in incoming {
        match health.apply_hit(damage, &mut *items) {
            HitOutcome::Shielded => {
                shield_blocks.write(ShieldBlocked { pos: player.pos });
            }
            HitOutcome::Damaged { amount, died } => {
                player_hits.write(PlayerHit {
                    amount,
                    hp: health.hp(),
                    max_hp: health.max_hp(),
                });
                if died {
                    info!("Player died");
                    deaths.write(PlayerDied { pos: player.pos });
                    flow.end(RunState::GameOver);
                    break;
                }
            }
            HitOutcome::Ignored | HitOutcome::Invulnerable => {}
        }
    }
}
