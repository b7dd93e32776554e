use bevy::prelude::*;

use crate::{
    enemies::{EnemyId, EnemyKind},
    items::ItemInstance,
    progression::WeaponKind,
    shrines::ShrineBonus,
};

/// Presentation hooks. The run core writes these; renderers, audio and UI
/// read them. Nothing in the core reads them back.
pub struct RunEventsPlugin;

impl Plugin for RunEventsPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<EnemyHit>()
            .add_message::<EnemyKilled>()
            .add_message::<PlayerHit>()
            .add_message::<PlayerDied>()
            .add_message::<ChestOpened>()
            .add_message::<LevelUp>()
            .add_message::<ShrineCompleted>()
            .add_message::<ShieldBlocked>();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HitSource {
    Weapon(WeaponKind),
    Lightning,
}

#[derive(Message, Clone, Debug)]
pub struct EnemyHit {
    pub enemy: EnemyId,
    pub pos: Vec2,
    pub amount: f32,
    pub crit: bool,
    pub killed: bool,
    pub source: HitSource,
}

/// Written when a dead enemy is reaped, right before it leaves the store.
#[derive(Message, Clone, Debug)]
pub struct EnemyKilled {
    pub pos: Vec2,
    pub kind: EnemyKind,
    pub elite: bool,
    pub boss: bool,
    pub xp: u32,
    pub gold: u32,
}

#[derive(Message, Clone, Debug)]
pub struct PlayerHit {
    pub amount: f32,
    pub hp: f32,
    pub max_hp: f32,
}

#[derive(Message, Clone, Debug)]
pub struct PlayerDied {
    pub pos: Vec2,
}

#[derive(Message, Clone, Debug)]
pub struct ChestOpened {
    pub pos: Vec2,
    pub cost: u32,
    pub elite: bool,
    pub choices: Vec<ItemInstance>,
}

#[derive(Message, Clone, Debug)]
pub struct LevelUp {
    pub level: u32,
}

#[derive(Message, Clone, Debug)]
pub struct ShrineCompleted {
    pub pos: Vec2,
    pub bonuses: Vec<ShrineBonus>,
}

#[derive(Message, Clone, Debug)]
pub struct ShieldBlocked {
    pub pos: Vec2,
}
