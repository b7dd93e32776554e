//! Run simulation core for a top-down survival action game.
//!
//! Every subsystem is a plain struct that doubles as a Bevy `Resource`. The
//! structs hold the rules and are tested directly. The Bevy systems in each
//! module only move data between resources, once per frame, in the order of
//! [`RunTick`].

use std::path::PathBuf;

use bevy::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

pub mod arena;
pub mod balance;
pub mod combat;
pub mod enemies;
pub mod enemy_ai;
pub mod events;
pub mod health;
pub mod items;
pub mod loot;
pub mod player;
pub mod progression;
pub mod rarity;
pub mod run_state;
pub mod shrines;
pub mod spawn_director;
pub mod targeting;
pub mod upgrades;
pub mod weapons;

use crate::{
    arena::Arena,
    balance::{Balance, BalancePlugin},
    combat::CombatPlugin,
    enemy_ai::EnemyAiPlugin,
    events::RunEventsPlugin,
    health::HealthPlugin,
    items::ItemsPlugin,
    loot::LootPlugin,
    player::PlayerPlugin,
    progression::ProgressionPlugin,
    run_state::{run_active, RunStatePlugin},
    shrines::ShrinesPlugin,
    spawn_director::SpawnDirectorPlugin,
    targeting::TargetingPlugin,
    weapons::WeaponsPlugin,
};

/// One simulation tick, in order. Every step up to `Shrines` only runs while
/// the run is live and is re-checked before each step, so a death or a boss
/// kill halfway through a tick stops the rest of it. Choices only queue and
/// are presented in `Flow`, which always runs.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunTick {
    Clock,
    Targeting,
    Spawn,
    Enemies,
    Weapons,
    Combat,
    PlayerDamage,
    Items,
    Reap,
    Loot,
    Shrines,
    Flow,
}

/// The run's single random source.
#[derive(Resource)]
pub struct RunRng(pub StdRng);

impl RunRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(StdRng::seed_from_u64(seed)),
            None => Self(StdRng::from_entropy()),
        }
    }
}

/// Installs the whole run simulation. Needs `Time`, `StatesPlugin` and a
/// schedule runner from the host app.
#[derive(Default)]
pub struct RunSimPlugin {
    pub balance_path: Option<PathBuf>,
    pub balance: Option<Balance>,
    pub seed: Option<u64>,
}

impl Plugin for RunSimPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(BalancePlugin {
            path: self.balance_path.clone(),
            preset: self.balance.clone(),
        });
        let arena = Arena::from_balance(&app.world().resource::<Balance>().combat);

        app.insert_resource(arena)
            .insert_resource(RunRng::new(self.seed))
            .configure_sets(
                Update,
                (
                    RunTick::Clock,
                    RunTick::Targeting,
                    RunTick::Spawn,
                    RunTick::Enemies,
                    RunTick::Weapons,
                    RunTick::Combat,
                    RunTick::PlayerDamage,
                    RunTick::Items,
                    RunTick::Reap,
                    RunTick::Loot,
                    RunTick::Shrines,
                )
                    .chain()
                    .distributive_run_if(run_active),
            )
            .configure_sets(Update, RunTick::Flow.after(RunTick::Shrines))
            .add_plugins((
                RunEventsPlugin,
                RunStatePlugin,
                ProgressionPlugin,
                PlayerPlugin,
                TargetingPlugin,
                SpawnDirectorPlugin,
                EnemyAiPlugin,
                WeaponsPlugin,
                CombatPlugin,
                HealthPlugin,
                ItemsPlugin,
                LootPlugin,
                ShrinesPlugin,
            ));
    }
}
