use rand::Rng;
use serde::{Deserialize, Serialize};

/// Ordered quality tiers shared by items, upgrade cards and shrine bonuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 4] = [
        Rarity::Common,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    /// Rolls a tier from a probability table.
    ///
    /// The table does not need to sum to 1.0: the roll is taken against the
    /// table's total, so a document with slightly-off numbers still works.
    /// Negative entries count as 0, and an all-zero table always yields Common.
    pub fn roll(table: &PerRarity<f32>, rng: &mut impl Rng) -> Rarity {
        let weights = Rarity::ALL.map(|r| table.get(r).max(0.0));
        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return Rarity::Common;
        }

        let mut roll = rng.gen::<f32>() * total;
        for (rarity, weight) in Rarity::ALL.iter().zip(weights) {
            if roll < weight {
                return *rarity;
            }
            roll -= weight;
        }
        // Float rounding can leave a sliver past the last bucket.
        Rarity::ALL
            .iter()
            .zip(weights)
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(r, _)| *r)
            .unwrap_or(Rarity::Common)
    }

    /// One tier up, saturating at Legendary.
    pub fn bumped(self) -> Rarity {
        match self {
            Rarity::Common => Rarity::Rare,
            Rarity::Rare => Rarity::Epic,
            Rarity::Epic | Rarity::Legendary => Rarity::Legendary,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Rarity::Common => "Common",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
        }
    }
}

/// One value per rarity tier. Used for every "magnitude by rarity" table in
/// the balance document, so a tier can never be forgotten.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerRarity<T> {
    pub common: T,
    pub rare: T,
    pub epic: T,
    pub legendary: T,
}

impl<T: Copy> PerRarity<T> {
    pub const fn new(common: T, rare: T, epic: T, legendary: T) -> Self {
        Self {
            common,
            rare,
            epic,
            legendary,
        }
    }

    pub fn get(&self, rarity: Rarity) -> T {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
        }
    }
}
