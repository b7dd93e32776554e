use bevy::prelude::*;

use crate::{
    arena::Arena,
    balance::{Balance, PlayerBalance},
    progression::RunProgression,
    shrines::GlobalBonuses,
    RunTick,
};

pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Player>()
            .add_systems(Update, move_player_system.in_set(RunTick::Clock));
    }
}

/// The player's body. Input capture lives outside the simulation: whatever
/// drives the run writes `move_input` and the movement step reads it.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct Player {
    pub pos: Vec2,
    pub radius: f32,
    /// Desired direction. Longer vectors are clamped to unit length.
    pub move_input: Vec2,
}

impl Default for Player {
    fn default() -> Self {
        Self::new(&PlayerBalance::default())
    }
}

impl Player {
    pub fn new(cfg: &PlayerBalance) -> Self {
        Self {
            pos: Vec2::ZERO,
            radius: cfg.radius.max(1.0),
            move_input: Vec2::ZERO,
        }
    }

    pub fn step(&mut self, dt: f32, speed: f32, arena: &Arena) {
        let input = self.move_input.clamp_length_max(1.0);
        self.pos = arena.clamp(self.pos + input * speed.max(0.0) * dt.max(0.0));
    }

    pub fn reset(&mut self, cfg: &PlayerBalance) {
        *self = Self::new(cfg);
    }
}

fn move_player_system(
    time: Res<Time>,
    balance: Res<Balance>,
    arena: Res<Arena>,
    progression: Res<RunProgression>,
    bonuses: Res<GlobalBonuses>,
    mut player: ResMut<Player>,
) {
    let speed = balance.player.move_speed * progression.stats(&balance, &bonuses).move_speed_mul;
    player.step(time.delta_secs(), speed, &arena);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_at_speed_and_stays_in_the_arena() {
        let arena = Arena::new(100.0, 100.0);
        let mut player = Player::default();
        player.move_input = Vec2::new(3.0, 0.0);
        player.step(0.5, 100.0, &arena);
        assert_eq!(player.pos, Vec2::new(50.0, 0.0));

        player.step(10.0, 100.0, &arena);
        assert_eq!(player.pos, Vec2::new(100.0, 0.0));
    }
}
