use std::collections::VecDeque;

use bevy::{ecs::system::SystemParam, prelude::*};

use crate::{
    balance::Balance,
    combat::CombatSystem,
    enemies::EnemyStore,
    health::PlayerHealth,
    items::{ItemInstance, ItemTriggerSystem},
    loot::LootSystem,
    player::Player,
    progression::{RunProgression, WeaponKind},
    shrines::{GlobalBonuses, ShrineBonus, ShrineBonusKind, ShrineSystem},
    spawn_director::SpawnDirector,
    targeting::TargetingSystem,
    upgrades::{UpgradeCard, UpgradeDirector},
    weapons::WeaponSystem,
    RunRng, RunTick,
};

pub struct RunStatePlugin;

impl Plugin for RunStatePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<RunState>()
            .init_resource::<RunFlow>()
            .init_resource::<RunClock>()
            .add_message::<ChoiceInput>()
            .add_systems(Update, tick_clock_system.in_set(RunTick::Clock))
            .add_systems(
                Update,
                (choice_input_system, sync_run_state_system)
                    .chain()
                    .in_set(RunTick::Flow),
            );
    }
}

/// Which overlay is up, mirrored from `RunFlow` for presentation layers.
#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    #[default]
    CharacterSelect,
    DifficultySelect,
    Running,
    LevelUp,
    ChestOpen,
    ShrineOpen,
    Victory,
    GameOver,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Victory | RunState::GameOver)
    }

    fn is_pending_choice(self) -> bool {
        matches!(self, RunState::LevelUp | RunState::ChestOpen | RunState::ShrineOpen)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CharacterKind {
    #[default]
    Frostbinder,
    Ronin,
    Rogue,
}

impl CharacterKind {
    pub const ALL: [CharacterKind; 3] = [
        CharacterKind::Frostbinder,
        CharacterKind::Ronin,
        CharacterKind::Rogue,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CharacterKind::Frostbinder => "Frostbinder",
            CharacterKind::Ronin => "Ronin",
            CharacterKind::Rogue => "Rogue",
        }
    }

    pub fn starting_weapon(self) -> WeaponKind {
        match self {
            CharacterKind::Frostbinder => WeaponKind::FrostStaff,
            CharacterKind::Ronin => WeaponKind::Katana,
            CharacterKind::Rogue => WeaponKind::Dagger,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
        }
    }

    /// Scales the spawn interval. Above 1 spawns slower.
    pub fn spawn_interval_mul(self) -> f32 {
        match self {
            Difficulty::Easy => 1.3,
            Difficulty::Normal => 1.0,
            Difficulty::Hard => 0.8,
        }
    }

    pub fn enemy_hp_mul(self) -> f32 {
        match self {
            Difficulty::Easy => 0.85,
            Difficulty::Normal => 1.0,
            Difficulty::Hard => 1.25,
        }
    }
}

/// Run time and tallies. Time only advances while the run is live.
#[derive(Resource, Debug, Clone, Default)]
pub struct RunClock {
    pub elapsed: f32,
    pub character: CharacterKind,
    pub difficulty: Difficulty,
    pub spawned: u32,
    pub kills: u32,
    pub boss_spawned: bool,
}

/// A choice raised mid-run, waiting for its turn on screen.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingChoice {
    LevelUp,
    Chest(Vec<ItemInstance>),
    Shrine(Vec<ShrineBonus>),
}

/// One option on the current overlay.
#[derive(Clone, Debug, PartialEq)]
pub enum Choice {
    Character(CharacterKind),
    Difficulty(Difficulty),
    Upgrade(UpgradeCard),
    Item(ItemInstance),
    Bonus(ShrineBonus),
}

/// Input from whatever presents the overlays.
#[derive(Message, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChoiceInput {
    Pick(usize),
    Skip,
    Restart,
}

/// The run's phase machine and its queue of pending choices.
///
/// Mid-run events only push onto the queue. The queue is presented one
/// entry at a time, and only while the run is live, so a level-up and a
/// chest opened on the same tick are shown one after the other.
#[derive(Resource, Debug, Clone)]
pub struct RunFlow {
    state: RunState,
    options: Vec<Choice>,
    queue: VecDeque<PendingChoice>,
    character: CharacterKind,
}

impl Default for RunFlow {
    fn default() -> Self {
        Self {
            state: RunState::CharacterSelect,
            options: CharacterKind::ALL.map(Choice::Character).to_vec(),
            queue: VecDeque::new(),
            character: CharacterKind::default(),
        }
    }
}

impl RunFlow {
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn options(&self) -> &[Choice] {
        &self.options
    }

    pub fn character(&self) -> CharacterKind {
        self.character
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn push(&mut self, pending: PendingChoice) {
        if self.state.is_terminal() {
            return;
        }
        self.queue.push_back(pending);
    }

    /// Ends the run. The first outcome sticks.
    pub fn end(&mut self, outcome: RunState) {
        if self.state.is_terminal() || !outcome.is_terminal() {
            return;
        }
        self.state = outcome;
        self.options.clear();
        self.queue.clear();
    }

    /// Puts the next queued choice on screen. `roll_cards` is only called for
    /// level-ups, so cards reflect the build at the moment they are shown.
    /// A pending choice with nothing to offer is dropped.
    pub fn present_next(&mut self, mut roll_cards: impl FnMut() -> Vec<UpgradeCard>) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        while let Some(pending) = self.queue.pop_front() {
            let (state, options): (RunState, Vec<Choice>) = match pending {
                PendingChoice::LevelUp => (
                    RunState::LevelUp,
                    roll_cards().into_iter().map(Choice::Upgrade).collect(),
                ),
                PendingChoice::Chest(items) => (
                    RunState::ChestOpen,
                    items.into_iter().map(Choice::Item).collect(),
                ),
                PendingChoice::Shrine(bonuses) => (
                    RunState::ShrineOpen,
                    bonuses.into_iter().map(Choice::Bonus).collect(),
                ),
            };
            if options.is_empty() {
                continue;
            }
            self.state = state;
            self.options = options;
            return true;
        }
        false
    }

    /// Resolves the overlay with option `index` and returns it for the
    /// caller to apply. Out-of-range picks and picks with no overlay up
    /// return `None` and change nothing.
    pub fn choose(&mut self, index: usize) -> Option<Choice> {
        let choice = self.options.get(index)?.clone();
        match self.state {
            RunState::CharacterSelect => {
                if let Choice::Character(character) = choice {
                    self.character = character;
                }
                self.state = RunState::DifficultySelect;
                self.options = Difficulty::ALL.map(Choice::Difficulty).to_vec();
            }
            RunState::DifficultySelect
            | RunState::LevelUp
            | RunState::ChestOpen
            | RunState::ShrineOpen => {
                self.state = RunState::Running;
                self.options.clear();
            }
            RunState::Running | RunState::Victory | RunState::GameOver => return None,
        }
        Some(choice)
    }

    /// Dismisses a mid-run overlay without taking anything.
    pub fn skip(&mut self) -> bool {
        if !self.state.is_pending_choice() {
            return false;
        }
        self.state = RunState::Running;
        self.options.clear();
        true
    }

    /// Back to character select after the run ended.
    pub fn restart(&mut self) -> bool {
        if !self.state.is_terminal() {
            return false;
        }
        *self = Self::default();
        true
    }
}

/// Run condition for the simulation sets.
pub fn run_active(flow: Res<RunFlow>) -> bool {
    flow.state() == RunState::Running
}

/// Every piece of per-run state, for the systems that start a run or apply
/// a choice to it.
#[derive(SystemParam)]
pub struct RunResources<'w> {
    balance: Res<'w, Balance>,
    clock: ResMut<'w, RunClock>,
    player: ResMut<'w, Player>,
    enemies: ResMut<'w, EnemyStore>,
    targeting: ResMut<'w, TargetingSystem>,
    director: ResMut<'w, SpawnDirector>,
    combat: ResMut<'w, CombatSystem>,
    weapons: ResMut<'w, WeaponSystem>,
    health: ResMut<'w, PlayerHealth>,
    items: ResMut<'w, ItemTriggerSystem>,
    loot: ResMut<'w, LootSystem>,
    shrines: ResMut<'w, ShrineSystem>,
    bonuses: ResMut<'w, GlobalBonuses>,
    progression: ResMut<'w, RunProgression>,
}

impl RunResources<'_> {
    /// Puts every system back to its initial state and hands out the
    /// character's starting weapon.
    pub fn start_run(&mut self, character: CharacterKind, difficulty: Difficulty) {
        let balance = &*self.balance;
        *self.clock = RunClock {
            character,
            difficulty,
            ..Default::default()
        };
        self.player.reset(&balance.player);
        self.enemies.clear();
        self.targeting.reset();
        self.director.reset(balance.spawning.director.initial_delay);
        self.combat.reset();
        self.weapons.reset();
        self.health.reset(&balance.player);
        self.items.reset(&balance.items);
        self.loot.reset(&balance.loot);
        self.shrines.reset(&balance.shrines);
        *self.bonuses = GlobalBonuses::default();
        self.progression.reset(&balance.progression);
        self.progression.add_weapon(character.starting_weapon());
        info!(
            "Run started: {} ({}) on {}",
            character.name(),
            character.starting_weapon().name(),
            difficulty.name()
        );
    }

    pub fn apply(&mut self, choice: &Choice) {
        match choice {
            Choice::Character(_) | Choice::Difficulty(_) => {}
            Choice::Upgrade(card) => {
                if !self.progression.apply_upgrade(card) {
                    warn!("Upgrade {:?} no longer applies", card.option);
                }
            }
            Choice::Item(item) => self.items.add(*item),
            Choice::Bonus(bonus) => {
                self.bonuses.apply(bonus);
                if bonus.kind == ShrineBonusKind::MaxHealth {
                    self.health.raise_max(bonus.magnitude);
                }
            }
        }
    }
}

fn tick_clock_system(time: Res<Time>, mut clock: ResMut<RunClock>) {
    clock.elapsed += time.delta_secs();
}

fn choice_input_system(
    mut inputs: MessageReader<ChoiceInput>,
    mut flow: ResMut<RunFlow>,
    mut run: RunResources,
    mut rng: ResMut<RunRng>,
) {
    for input in inputs.read() {
        match *input {
            ChoiceInput::Pick(index) => {
                let Some(choice) = flow.choose(index) else {
                    continue;
                };
                match choice {
                    Choice::Difficulty(difficulty) => run.start_run(flow.character(), difficulty),
                    other => run.apply(&other),
                }
            }
            ChoiceInput::Skip => {
                flow.skip();
            }
            ChoiceInput::Restart => {
                if flow.restart() {
                    info!("Back to character select");
                }
            }
        }
    }

    let director = UpgradeDirector::new(&run.balance);
    let progression = &*run.progression;
    flow.present_next(|| director.make_choices(progression, &mut rng.0));
}

fn sync_run_state_system(
    flow: Res<RunFlow>,
    state: Res<State<RunState>>,
    mut next: ResMut<NextState<RunState>>,
) {
    if flow.state() != *state.get() {
        next.set(flow.state());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{items::ItemKind, rarity::Rarity};

    fn running_flow() -> RunFlow {
        let mut flow = RunFlow::default();
        assert_eq!(flow.choose(1), Some(Choice::Character(CharacterKind::Ronin)));
        assert_eq!(flow.state(), RunState::DifficultySelect);
        assert_eq!(flow.choose(2), Some(Choice::Difficulty(Difficulty::Hard)));
        assert_eq!(flow.state(), RunState::Running);
        assert_eq!(flow.character(), CharacterKind::Ronin);
        flow
    }

    fn item(kind: ItemKind) -> ItemInstance {
        ItemInstance {
            kind,
            rarity: Rarity::Common,
        }
    }

    #[test]
    fn select_screens_lead_into_the_run() {
        let mut flow = RunFlow::default();
        assert_eq!(flow.options().len(), 3);
        assert_eq!(flow.choose(7), None);
        assert_eq!(flow.state(), RunState::CharacterSelect);
        assert!(!flow.skip());
        running_flow();
    }

    #[test]
    fn queued_choices_are_presented_in_order() {
        let mut flow = running_flow();
        flow.push(PendingChoice::LevelUp);
        flow.push(PendingChoice::Chest(vec![item(ItemKind::ShieldCharm)]));

        let mut rolls = 0;
        assert!(flow.present_next(|| {
            rolls += 1;
            Vec::new()
        }));
        // The empty card set was dropped and the chest came up instead.
        assert_eq!(rolls, 1);
        assert_eq!(flow.state(), RunState::ChestOpen);
        assert!(!flow.present_next(Vec::new));

        assert_eq!(flow.choose(0), Some(Choice::Item(item(ItemKind::ShieldCharm))));
        assert_eq!(flow.state(), RunState::Running);
        assert!(!flow.present_next(Vec::new));
    }

    #[test]
    fn skip_discards_and_resumes() {
        let mut flow = running_flow();
        flow.push(PendingChoice::Chest(vec![item(ItemKind::ToxicFlask)]));
        flow.present_next(Vec::new);
        assert!(flow.skip());
        assert_eq!(flow.state(), RunState::Running);
        assert_eq!(flow.choose(0), None);
    }

    #[test]
    fn first_outcome_sticks_and_restart_needs_an_ending() {
        let mut flow = running_flow();
        assert!(!flow.restart());
        flow.push(PendingChoice::LevelUp);
        flow.end(RunState::GameOver);
        flow.end(RunState::Victory);
        assert_eq!(flow.state(), RunState::GameOver);
        assert_eq!(flow.queued(), 0);

        flow.push(PendingChoice::LevelUp);
        assert_eq!(flow.queued(), 0);

        assert!(flow.restart());
        assert_eq!(flow.state(), RunState::CharacterSelect);
    }

    #[test]
    fn difficulty_scales() {
        assert!(Difficulty::Easy.spawn_interval_mul() > Difficulty::Hard.spawn_interval_mul());
        assert!(Difficulty::Easy.enemy_hp_mul() < Difficulty::Hard.enemy_hp_mul());
    }
}
