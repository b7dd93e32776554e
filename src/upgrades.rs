use std::collections::HashSet;

use rand::Rng;

use crate::{
    balance::{Balance, CardsBalance, ProgressionBalance},
    progression::{RingKind, RunProgression, WeaponAxis, WeaponKind, WeaponMod},
    rarity::Rarity,
    weapons::axis_value,
};

/// What a level-up card does. Doubles as the card's dedup key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpgradeOption {
    AddWeapon(WeaponKind),
    UpgradeWeapon { weapon: WeaponKind, axis: WeaponAxis },
    WeaponMod { weapon: WeaponKind, kind: WeaponMod },
    AddRing(RingKind),
    UpgradeRing(RingKind),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpgradeCard {
    pub option: UpgradeOption,
    pub rarity: Rarity,
    /// Levels granted by one pick.
    pub steps: u32,
    pub weight: f32,
    /// False for cards that change nothing for the weapon they name.
    pub relevant: bool,
}

/// Builds and samples level-up cards from the current build.
pub struct UpgradeDirector<'a> {
    cards: &'a CardsBalance,
    limits: &'a ProgressionBalance,
}

impl<'a> UpgradeDirector<'a> {
    pub fn new(balance: &'a Balance) -> Self {
        Self {
            cards: &balance.cards,
            limits: &balance.progression,
        }
    }

    fn card(
        &self,
        option: UpgradeOption,
        weight: f32,
        rarity: Rarity,
        relevant: bool,
    ) -> UpgradeCard {
        UpgradeCard {
            option,
            rarity,
            steps: self.cards.rarity_steps.get(rarity).max(1),
            weight: weight.max(0.0),
            relevant,
        }
    }

    /// Every card the build can take right now, in a stable order with no
    /// repeated option.
    pub fn build_candidates(
        &self,
        progression: &RunProgression,
        rng: &mut impl Rng,
    ) -> Vec<UpgradeCard> {
        let cards = self.cards;
        let limits = self.limits;
        let mut out = Vec::new();

        if progression.weapons().len() < limits.max_weapons {
            for kind in WeaponKind::ALL {
                if progression.weapon(kind).is_none() {
                    out.push(self.card(
                        UpgradeOption::AddWeapon(kind),
                        cards.weight_add_weapon,
                        Rarity::Common,
                        true,
                    ));
                }
            }
        }
        if progression.rings().len() < limits.max_rings {
            for kind in RingKind::ALL {
                if progression.ring_level(kind) == 0 {
                    out.push(self.card(
                        UpgradeOption::AddRing(kind),
                        cards.weight_add_ring,
                        Rarity::Common,
                        true,
                    ));
                }
            }
        }

        for weapon in progression.weapons() {
            for axis in WeaponAxis::ALL {
                if weapon.axis_level(axis) >= limits.axis_cap {
                    continue;
                }
                let rarity = Rarity::roll(&cards.rarity_table, rng);
                out.push(self.card(
                    UpgradeOption::UpgradeWeapon {
                        weapon: weapon.kind,
                        axis,
                    },
                    cards.weight_upgrade_weapon,
                    rarity,
                    axis.affects(weapon.kind),
                ));
            }
            if weapon.kind.is_melee() {
                continue;
            }
            for kind in WeaponMod::ALL {
                if weapon.mod_level(kind) >= limits.mod_cap {
                    continue;
                }
                out.push(self.card(
                    UpgradeOption::WeaponMod {
                        weapon: weapon.kind,
                        kind,
                    },
                    cards.weight_weapon_mod,
                    Rarity::Common,
                    true,
                ));
            }
        }

        for ring in progression.rings() {
            if ring.level < limits.ring_cap {
                out.push(self.card(
                    UpgradeOption::UpgradeRing(ring.kind),
                    cards.weight_upgrade_ring,
                    Rarity::Common,
                    true,
                ));
            }
        }

        let mut seen = HashSet::new();
        out.retain(|card| seen.insert(card.option));
        out
    }

    /// Draws the cards shown on a level-up.
    pub fn make_choices(
        &self,
        progression: &RunProgression,
        rng: &mut impl Rng,
    ) -> Vec<UpgradeCard> {
        let candidates = self.build_candidates(progression, rng);
        let mut chosen =
            sample_without_replacement(candidates.clone(), self.cards.choices, rng);

        if !chosen.is_empty() && !chosen.iter().any(|card| card.relevant) {
            let replacement = candidates
                .iter()
                .find(|card| card.relevant && !chosen.iter().any(|c| c.option == card.option));
            if let (Some(card), Some(last)) = (replacement, chosen.last_mut()) {
                *last = *card;
            }
        }
        chosen
    }
}

/// Weighted roulette draws, each removing the drawn card from the pool. Once
/// only zero-weight cards remain the rest are taken in pool order.
pub fn sample_without_replacement(
    mut pool: Vec<UpgradeCard>,
    count: usize,
    rng: &mut impl Rng,
) -> Vec<UpgradeCard> {
    let mut out = Vec::with_capacity(count.min(pool.len()));
    while out.len() < count && !pool.is_empty() {
        let total: f32 = pool.iter().map(|card| card.weight).sum();
        if total <= 0.0 {
            break;
        }
        let mut roll = rng.gen::<f32>() * total;
        let mut picked = None;
        for (i, card) in pool.iter().enumerate() {
            if card.weight <= 0.0 {
                continue;
            }
            if roll < card.weight {
                picked = Some(i);
                break;
            }
            roll -= card.weight;
        }
        // Float drift can leave the roll past the last bucket.
        let index = picked.or_else(|| pool.iter().rposition(|card| card.weight > 0.0));
        match index {
            Some(i) => out.push(pool.remove(i)),
            None => break,
        }
    }
    while out.len() < count && !pool.is_empty() {
        out.push(pool.remove(0));
    }
    out
}

/// One line for the card, showing the value before and after picking it.
pub fn describe(card: &UpgradeCard, progression: &RunProgression, balance: &Balance) -> String {
    let limits = &balance.progression;
    match card.option {
        UpgradeOption::AddWeapon(kind) => format!("New weapon: {}", kind.name()),
        UpgradeOption::AddRing(kind) => format!(
            "New ring: {} (+{:.0}% {})",
            kind.name(),
            kind.per_level(&balance.rings) * 100.0,
            kind.stat_name()
        ),
        UpgradeOption::UpgradeWeapon { weapon, axis } => {
            let before = progression.weapon(weapon).map_or(0, |w| w.axis_level(axis));
            let after = before.saturating_add(card.steps).min(limits.axis_cap);
            let value = |level| axis_value(&balance.weapons, weapon, axis, level);
            let unit = match axis {
                WeaponAxis::FireRate => "/s",
                WeaponAxis::Accuracy => " deg spread",
                _ => "",
            };
            format!(
                "[{}] {} {}: {:.1}{unit} -> {:.1}{unit}",
                card.rarity.name(),
                weapon.name(),
                axis.name(),
                value(before),
                value(after)
            )
        }
        UpgradeOption::WeaponMod { weapon, kind } => {
            let before = progression.weapon(weapon).map_or(0, |w| w.mod_level(kind));
            format!(
                "{} {}: {} -> {}",
                weapon.name(),
                kind.name(),
                before,
                before.saturating_add(1).min(limits.mod_cap)
            )
        }
        UpgradeOption::UpgradeRing(kind) => {
            let before = progression.ring_level(kind);
            let after = before.saturating_add(card.steps).min(limits.ring_cap);
            let per_level = kind.per_level(&balance.rings) * 100.0;
            format!(
                "{} Lv {} -> {} (+{:.0}% -> +{:.0}% {})",
                kind.name(),
                before,
                after,
                before as f32 * per_level,
                after as f32 * per_level,
                kind.stat_name()
            )
        }
    }
}
