//! Spawn point pool and placement policy

use super::geometry::{Rotation, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPoint {
    pub position: Vec3,
    pub rotation: Rotation,
}

impl SpawnPoint {
    const fn new(x: f32, z: f32, yaw: f32) -> Self {
        Self {
            position: Vec3::new(x, 0.0, z),
            rotation: Rotation::new(yaw, 0.0),
        }
    }
}

/// Arena corners, each facing the center
pub const SPAWN_POINTS: [SpawnPoint; 4] = [
    SpawnPoint::new(-15.0, -15.0, std::f32::consts::FRAC_PI_4),
    SpawnPoint::new(15.0, 15.0, -3.0 * std::f32::consts::FRAC_PI_4),
    SpawnPoint::new(-15.0, 15.0, 3.0 * std::f32::consts::FRAC_PI_4),
    SpawnPoint::new(15.0, -15.0, -std::f32::consts::FRAC_PI_4),
];

/// Spawn for the n-th participant (join order) at session start
pub fn initial_spawn(join_index: usize) -> SpawnPoint {
    SPAWN_POINTS[join_index % SPAWN_POINTS.len()]
}

/// Spawn farthest from `opponent` by squared distance; the first maximal
/// entry wins ties. Falls back to the first point when there is no opponent.
pub fn farthest_spawn(opponent: Option<Vec3>) -> SpawnPoint {
    let Some(opponent) = opponent else {
        return SPAWN_POINTS[0];
    };

    let mut best = SPAWN_POINTS[0];
    let mut best_dist = f32::NEG_INFINITY;
    for point in SPAWN_POINTS {
        let dist = point.position.distance_squared(opponent);
        if dist > best_dist {
            best = point;
            best_dist = dist;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_spawns_cycle_in_join_order() {
        assert_eq!(initial_spawn(0), SPAWN_POINTS[0]);
        assert_eq!(initial_spawn(1), SPAWN_POINTS[1]);
        assert_eq!(initial_spawn(4), SPAWN_POINTS[0]);
    }

    #[test]
    fn farthest_spawn_is_opposite_corner() {
        assert_eq!(farthest_spawn(Some(Vec3::new(14.0, 0.0, 14.0))), SPAWN_POINTS[0]);
        assert_eq!(farthest_spawn(Some(Vec3::new(-14.0, 0.0, 14.0))), SPAWN_POINTS[3]);
    }

    #[test]
    fn equidistant_opponent_picks_first_pool_entry() {
        assert_eq!(farthest_spawn(Some(Vec3::ZERO)), SPAWN_POINTS[0]);
        // Equidistant from points 0 and 2 (x = 15 line), both maximal
        assert_eq!(farthest_spawn(Some(Vec3::new(15.0, 0.0, 0.0))), SPAWN_POINTS[0]);
    }

    #[test]
    fn no_opponent_uses_first_point() {
        assert_eq!(farthest_spawn(None), SPAWN_POINTS[0]);
    }
}
