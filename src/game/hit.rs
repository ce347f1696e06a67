//! Hit detection - ray versus axis-aligned hitbox

use super::geometry::Vec3;

/// Direction components smaller than this are treated as parallel to a slab
const PARALLEL_EPSILON: f32 = 1e-8;

/// Top fraction of the hitbox height that counts as the head
pub const HEADSHOT_FRACTION: f32 = 0.3;

/// Verdict of a single ray test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub hit: bool,
    pub headshot: bool,
    /// Ray parameter of the entry point (world units for a unit direction)
    pub distance: f32,
}

impl HitResult {
    pub const MISS: HitResult = HitResult {
        hit: false,
        headshot: false,
        distance: 0.0,
    };
}

/// Stateless ray/box intersection
pub struct HitDetector;

impl HitDetector {
    /// Slab-method intersection of a ray with the box `center ± half_extents`.
    ///
    /// `direction` must already be normalized by the caller. When the origin
    /// lies inside the box the exit point is reported instead of the entry.
    pub fn test(origin: Vec3, direction: Vec3, center: Vec3, half_extents: Vec3) -> HitResult {
        let min = center - half_extents;
        let max = center + half_extents;

        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let o = origin.axis(axis);
            let d = direction.axis(axis);
            let lo = min.axis(axis);
            let hi = max.axis(axis);

            if d.abs() < PARALLEL_EPSILON {
                if o < lo || o > hi {
                    return HitResult::MISS;
                }
                continue;
            }

            let inv = 1.0 / d;
            let mut t1 = (lo - o) * inv;
            let mut t2 = (hi - o) * inv;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }

            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return HitResult::MISS;
            }
        }

        // Box entirely behind the origin
        if t_max < 0.0 {
            return HitResult::MISS;
        }

        let distance = if t_min >= 0.0 { t_min } else { t_max };
        let hit_point = origin + direction * distance;

        let height = max.y - min.y;
        let head_floor = max.y - height * HEADSHOT_FRACTION;

        HitResult {
            hit: true,
            headshot: hit_point.y >= head_floor,
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALF: Vec3 = Vec3::new(0.4, 0.9, 0.4);

    fn forward() -> Vec3 {
        Vec3::new(0.0, 0.0, 1.0)
    }

    #[test]
    fn straight_shot_hits_body() {
        let result = HitDetector::test(
            Vec3::new(0.0, 1.0, -10.0),
            forward(),
            Vec3::new(0.0, 1.0, 0.0),
            HALF,
        );
        assert!(result.hit);
        assert!(!result.headshot);
        assert!((result.distance - 9.6).abs() < 1e-4);
    }

    #[test]
    fn low_hit_on_raised_box_is_body_shot() {
        // Box spans y 0.9..2.7; the head band starts at 2.16
        let result = HitDetector::test(
            Vec3::new(0.0, 1.0, -10.0),
            forward(),
            Vec3::new(0.0, 1.8, 0.0),
            HALF,
        );
        assert!(result.hit);
        assert!(!result.headshot);
    }

    #[test]
    fn shot_near_top_of_box_is_headshot() {
        let result = HitDetector::test(
            Vec3::new(0.0, 2.6, -10.0),
            forward(),
            Vec3::new(0.0, 1.8, 0.0),
            HALF,
        );
        assert!(result.hit);
        assert!(result.headshot);
    }

    #[test]
    fn box_raised_so_ray_meets_its_upper_band_is_headshot() {
        // Box spans y 0.3..2.1 with the ray at y=1.8: inside the top 30% band.
        let result = HitDetector::test(
            Vec3::new(0.0, 1.8, -10.0),
            forward(),
            Vec3::new(0.0, 1.2, 0.0),
            HALF,
        );
        assert!(result.hit);
        assert!(result.headshot);
    }

    #[test]
    fn ray_pointing_away_misses() {
        let result = HitDetector::test(
            Vec3::new(0.0, 1.0, -10.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(0.0, 1.0, 0.0),
            HALF,
        );
        assert!(!result.hit);
    }

    #[test]
    fn parallel_ray_outside_slab_misses() {
        let result = HitDetector::test(
            Vec3::new(1.0, 1.0, -10.0),
            forward(),
            Vec3::new(0.0, 1.0, 0.0),
            HALF,
        );
        assert!(!result.hit);
    }

    #[test]
    fn origin_inside_box_reports_exit_point() {
        let result = HitDetector::test(
            Vec3::new(0.0, 1.0, 0.0),
            forward(),
            Vec3::new(0.0, 1.0, 0.0),
            HALF,
        );
        assert!(result.hit);
        assert!((result.distance - 0.4).abs() < 1e-5);
    }

    #[test]
    fn diagonal_ray_clips_corner() {
        let dir = Vec3::new(1.0, 0.0, 1.0).try_normalize().unwrap();
        let result = HitDetector::test(
            Vec3::new(-5.0, 1.0, -5.0),
            dir,
            Vec3::new(0.0, 1.0, 0.0),
            HALF,
        );
        assert!(result.hit);

        let miss_dir = Vec3::new(1.0, 0.0, 0.7).try_normalize().unwrap();
        let result = HitDetector::test(
            Vec3::new(-5.0, 1.0, -5.0),
            miss_dir,
            Vec3::new(0.0, 1.0, 0.0),
            HALF,
        );
        assert!(!result.hit);
    }

    #[test]
    fn verdict_is_stable_under_direction_scaling() {
        // Box spans y 0.1..1.9; the ray climbs 0.38 before entering at z=-0.4
        let center = Vec3::new(0.0, 1.0, 0.0);
        let unit = Vec3::new(0.35, 0.05, 1.0).try_normalize().unwrap();
        let cases = [
            (0.6_f32, true, false),
            (1.2, true, true),
            (1.7, false, false),
        ];

        for (origin_y, hit, headshot) in cases {
            let origin = Vec3::new(-3.0, origin_y, -8.0);
            let base = HitDetector::test(origin, unit, center, HALF);
            assert_eq!(base.hit, hit, "origin y {origin_y}");
            assert_eq!(base.headshot, headshot, "origin y {origin_y}");

            for scale in [0.25_f32, 2.0, 17.5] {
                let scaled = HitDetector::test(origin, unit * scale, center, HALF);
                assert_eq!(scaled.hit, base.hit);
                assert_eq!(scaled.headshot, base.headshot);
                assert!((scaled.distance * scale - base.distance).abs() < 1e-3);
            }
        }
    }
}
