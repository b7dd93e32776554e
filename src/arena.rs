use bevy::prelude::*;
use rand::Rng;

use crate::balance::CombatBalance;

/// Axis-aligned play field centred on the origin.
#[derive(Resource, Clone, Copy, Debug, PartialEq)]
pub struct Arena {
    pub half_extents: Vec2,
}

impl Arena {
    pub fn new(half_width: f32, half_height: f32) -> Self {
        // Non-positive sizes collapse to a 1x1 field instead of inverting.
        Self {
            half_extents: Vec2::new(half_width.max(1.0), half_height.max(1.0)),
        }
    }

    pub fn from_balance(combat: &CombatBalance) -> Self {
        Self::new(combat.arena_half_width, combat.arena_half_height)
    }

    /// True if `pos` is inside the arena grown by `margin` on every side.
    pub fn contains(&self, pos: Vec2, margin: f32) -> bool {
        let limit = self.half_extents + Vec2::splat(margin.max(0.0));
        pos.x.abs() <= limit.x && pos.y.abs() <= limit.y
    }

    pub fn clamp(&self, pos: Vec2) -> Vec2 {
        pos.clamp(-self.half_extents, self.half_extents)
    }

    pub fn random_point(&self, rng: &mut impl Rng) -> Vec2 {
        Vec2::new(
            rng.gen_range(-self.half_extents.x..=self.half_extents.x),
            rng.gen_range(-self.half_extents.y..=self.half_extents.y),
        )
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::from_balance(&CombatBalance::default())
    }
}

/// A point at a random angle and a random distance in `[min, max]` from `center`.
pub fn point_on_ring(center: Vec2, min: f32, max: f32, rng: &mut impl Rng) -> Vec2 {
    let min = min.max(0.0);
    let max = max.max(min);
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let distance = if max > min {
        rng.gen_range(min..max)
    } else {
        min
    };
    center + Vec2::new(angle.cos(), angle.sin()) * distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn margin_extends_bounds() {
        let arena = Arena::new(100.0, 50.0);
        assert!(arena.contains(Vec2::new(100.0, 50.0), 0.0));
        assert!(!arena.contains(Vec2::new(110.0, 0.0), 0.0));
        assert!(arena.contains(Vec2::new(110.0, 0.0), 16.0));
    }

    #[test]
    fn ring_points_respect_band() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            let p = point_on_ring(Vec2::new(10.0, -4.0), 50.0, 80.0, &mut rng);
            let d = p.distance(Vec2::new(10.0, -4.0));
            assert!((49.9..=80.1).contains(&d));
        }
    }
}
