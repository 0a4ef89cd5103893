//! Ray-based hit detection against live enemies, and the running score.

use glam::Vec3;

use crate::camera::Ray;
use crate::components::Transform;
use crate::scene::SceneWorld;

/// Running combat score. Never negative by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreState(u32);

impl ScoreState {
    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn award(&mut self, points: u32) {
        self.0 = self.0.saturating_add(points);
    }

    /// Subtract a penalty, clamping at zero.
    pub fn penalize(&mut self, points: u32) {
        self.0 = self.0.saturating_sub(points);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub entity: hecs::Entity,
    pub distance: f32,
    pub point: Vec3,
}

// Slab-method ray–AABB intersection, returns Some(t) or None
pub fn ray_aabb_hit_t(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<f32> {
    let inv = Vec3::new(
        if direction.x != 0.0 { 1.0 / direction.x } else { f32::INFINITY },
        if direction.y != 0.0 { 1.0 / direction.y } else { f32::INFINITY },
        if direction.z != 0.0 { 1.0 / direction.z } else { f32::INFINITY },
    );

    let t1 = (min - origin) * inv;
    let t2 = (max - origin) * inv;
    let lo = t1.min(t2);
    let hi = t1.max(t2);
    let t_near = lo.x.max(lo.y).max(lo.z);
    let t_far = hi.x.min(hi.y).min(hi.z);

    if t_near > t_far || t_far < 0.0 {
        return None;
    }
    Some(if t_near >= 0.0 { t_near } else { t_far })
}

/// Ray against a cube of `half_extent` centered on `transform`, tested in the
/// cube's local frame.
pub fn ray_hits_box(ray: &Ray, transform: &Transform, half_extent: f32) -> Option<f32> {
    let inv = transform.matrix().inverse();
    let o_local = inv.transform_point3(ray.origin);
    let d_local = inv.transform_vector3(ray.direction);
    let he = Vec3::splat(half_extent);
    ray_aabb_hit_t(o_local, d_local, -he, he)
}

/// Nearest enemy intersected by `ray`. World geometry is never considered.
pub fn nearest_enemy_hit(scene: &SceneWorld, ray: &Ray, half_extent: f32) -> Option<HitResult> {
    scene
        .enemy_transforms()
        .into_iter()
        .filter_map(|(entity, transform)| {
            ray_hits_box(ray, &transform, half_extent).map(|t| HitResult {
                entity,
                distance: t,
                point: ray.origin + ray.direction * t,
            })
        })
        .min_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Resolve one shot: remove the nearest intersected enemy and award points.
/// A miss changes nothing.
pub fn resolve_shot(
    scene: &mut SceneWorld,
    score: &mut ScoreState,
    ray: &Ray,
    half_extent: f32,
    reward: u32,
) -> Option<HitResult> {
    let hit = nearest_enemy_hit(scene, ray, half_extent)?;
    if scene.despawn_enemy(hit.entity) {
        score.award(reward);
        Some(hit)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Enemy;
    use glam::Quat;

    fn enemy_at(scene: &mut SceneWorld, position: Vec3) -> hecs::Entity {
        scene.spawn_enemy(
            Transform::from_position_rotation(position, Quat::from_rotation_z(0.7)),
            Enemy {
                spawned_at_ms: 0.0,
                spin: 0.0,
            },
        )
    }

    fn forward_ray() -> Ray {
        Ray {
            origin: Vec3::ZERO,
            direction: Vec3::NEG_Z,
        }
    }

    #[test]
    fn test_score_clamps_at_zero() {
        let mut score = ScoreState::default();
        score.penalize(5);
        assert_eq!(score.value(), 0);
        score.award(3);
        score.penalize(5);
        assert_eq!(score.value(), 0);
        score.award(10);
        score.penalize(5);
        assert_eq!(score.value(), 5);
    }

    #[test]
    fn test_score_never_negative_over_sequences() {
        let mut score = ScoreState::default();
        let mut shadow: i64 = 0;
        for i in 0..500u32 {
            if (i * 7919) % 3 == 0 {
                score.award(10);
                shadow += 10;
            } else {
                score.penalize(5);
                shadow = (shadow - 5).max(0);
            }
            assert_eq!(score.value() as i64, shadow);
        }
    }

    #[test]
    fn test_ray_aabb_front_and_behind() {
        let min = Vec3::splat(-1.0);
        let max = Vec3::splat(1.0);
        let t = ray_aabb_hit_t(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, min, max).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert!(ray_aabb_hit_t(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, min, max).is_none());
        assert!(ray_aabb_hit_t(Vec3::new(3.0, 0.0, 5.0), Vec3::NEG_Z, min, max).is_none());
    }

    #[test]
    fn test_ray_from_inside_box() {
        let t = ray_aabb_hit_t(Vec3::ZERO, Vec3::X, Vec3::splat(-1.0), Vec3::splat(1.0)).unwrap();
        assert!((t - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_nearest_enemy_removed_and_scored() {
        let mut scene = SceneWorld::new();
        let far = enemy_at(&mut scene, Vec3::new(0.0, 0.0, -2.0));
        let near = enemy_at(&mut scene, Vec3::new(0.0, 0.0, -1.0));
        let off_axis = enemy_at(&mut scene, Vec3::new(1.0, 0.0, -0.5));
        let mut score = ScoreState::default();

        let hit = resolve_shot(&mut scene, &mut score, &forward_ray(), 0.05, 10).unwrap();
        assert_eq!(hit.entity, near);
        assert_eq!(score.value(), 10);
        assert_eq!(scene.enemy_count(), 2);
        assert!(scene.world.contains(far));
        assert!(scene.world.contains(off_axis));
        assert!(!scene.world.contains(near));
    }

    #[test]
    fn test_miss_changes_nothing() {
        let mut scene = SceneWorld::new();
        enemy_at(&mut scene, Vec3::new(0.5, 0.0, -1.0));
        enemy_at(&mut scene, Vec3::new(0.0, 0.0, 1.0));
        let mut score = ScoreState::default();
        score.award(7);

        assert!(resolve_shot(&mut scene, &mut score, &forward_ray(), 0.05, 10).is_none());
        assert_eq!(score.value(), 7);
        assert_eq!(scene.enemy_count(), 2);
    }
}
