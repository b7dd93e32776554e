use std::{path::PathBuf, time::Duration};

use bevy::{log::LogPlugin, prelude::*, state::app::StatesPlugin, time::TimeUpdateStrategy};
use clap::{Parser, ValueEnum};

use horde_run::{
    health::PlayerHealth,
    loot::LootSystem,
    player::Player,
    progression::RunProgression,
    run_state::{CharacterKind, ChoiceInput, Difficulty, RunClock, RunFlow, RunState},
    RunSimPlugin, RunTick,
};

#[derive(Parser)]
#[command(name = "horde-run")]
#[command(about = "Headless autopilot run of the survival simulation")]
struct Cli {
    /// Seed for the run's random source. Omit for a fresh seed.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Tuning document to load instead of the default lookup.
    #[arg(short, long)]
    balance: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = CharacterArg::Frostbinder)]
    character: CharacterArg,

    #[arg(short, long, value_enum, default_value_t = DifficultyArg::Normal)]
    difficulty: DifficultyArg,

    /// Stop after this much run time even if the run is still going.
    #[arg(long, default_value_t = 720.0)]
    max_seconds: f32,

    /// Fixed simulation step in seconds.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,
}

#[derive(Clone, Copy, ValueEnum)]
enum CharacterArg {
    Frostbinder,
    Ronin,
    Rogue,
}

impl From<CharacterArg> for CharacterKind {
    fn from(arg: CharacterArg) -> Self {
        match arg {
            CharacterArg::Frostbinder => CharacterKind::Frostbinder,
            CharacterArg::Ronin => CharacterKind::Ronin,
            CharacterArg::Rogue => CharacterKind::Rogue,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DifficultyArg {
    Easy,
    Normal,
    Hard,
}

impl From<DifficultyArg> for Difficulty {
    fn from(arg: DifficultyArg) -> Self {
        match arg {
            DifficultyArg::Easy => Difficulty::Easy,
            DifficultyArg::Normal => Difficulty::Normal,
            DifficultyArg::Hard => Difficulty::Hard,
        }
    }
}

/// Stands in for a player: walks a slow circle and always takes the first
/// option.
#[derive(Resource)]
struct Autopilot {
    character: CharacterKind,
    difficulty: Difficulty,
    max_seconds: f32,
    frames: u64,
    max_frames: u64,
}

fn main() {
    let cli = Cli::parse();
    let dt = cli.dt.clamp(0.001, 0.1);
    let max_seconds = cli.max_seconds.max(1.0);

    App::new()
        .add_plugins((MinimalPlugins, StatesPlugin, LogPlugin::default()))
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f32(dt)))
        .add_plugins(RunSimPlugin {
            balance_path: cli.balance,
            balance: None,
            seed: cli.seed,
        })
        .insert_resource(Autopilot {
            character: cli.character.into(),
            difficulty: cli.difficulty.into(),
            max_seconds,
            frames: 0,
            // Time spent on overlays does not advance the run clock.
            max_frames: (max_seconds / dt) as u64 * 2 + 600,
        })
        .add_systems(Update, autopilot_system.before(RunTick::Clock))
        .add_systems(Update, finish_system.after(RunTick::Flow))
        .run();
}

fn autopilot_system(
    mut autopilot: ResMut<Autopilot>,
    clock: Res<RunClock>,
    flow: Res<RunFlow>,
    mut player: ResMut<Player>,
    mut inputs: MessageWriter<ChoiceInput>,
) {
    autopilot.frames += 1;

    let angle = clock.elapsed * 0.35;
    player.move_input = Vec2::new(angle.cos(), angle.sin());

    let pick = match flow.state() {
        RunState::CharacterSelect => CharacterKind::ALL
            .iter()
            .position(|c| *c == autopilot.character),
        RunState::DifficultySelect => Difficulty::ALL
            .iter()
            .position(|d| *d == autopilot.difficulty),
        RunState::LevelUp | RunState::ChestOpen | RunState::ShrineOpen => Some(0),
        RunState::Running | RunState::Victory | RunState::GameOver => None,
    };
    if let Some(index) = pick {
        inputs.write(ChoiceInput::Pick(index));
    }
}

fn finish_system(
    autopilot: Res<Autopilot>,
    clock: Res<RunClock>,
    flow: Res<RunFlow>,
    health: Res<PlayerHealth>,
    loot: Res<LootSystem>,
    progression: Res<RunProgression>,
    mut exit: MessageWriter<AppExit>,
) {
    let outcome = match flow.state() {
        RunState::Victory => "victory",
        RunState::GameOver => "defeat",
        _ if clock.elapsed >= autopilot.max_seconds => "time limit",
        _ if autopilot.frames >= autopilot.max_frames => "frame limit",
        _ => return,
    };

    info!(
        "Run over ({}): {:.0}s, level {}, {} kills of {} spawned, {:.0}/{:.0} hp, {} gold",
        outcome,
        clock.elapsed,
        progression.level(),
        clock.kills,
        clock.spawned,
        health.hp(),
        health.max_hp(),
        loot.gold()
    );
    for weapon in progression.weapons() {
        info!(
            "  {}: dmg {} rate {} speed {} acc {} range {} | shot {} rico {} pierce {}",
            weapon.kind.name(),
            weapon.damage,
            weapon.fire_rate,
            weapon.projectile_speed,
            weapon.accuracy,
            weapon.range,
            weapon.extra_shot,
            weapon.ricochet,
            weapon.pierce
        );
    }
    for ring in progression.rings() {
        info!("  {} lv {}", ring.kind.name(), ring.level);
    }
    exit.write(AppExit::Success);
}
