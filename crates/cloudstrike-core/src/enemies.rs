//! Enemy lifecycle: timed spawning on a ring around the camera, homing
//! movement, and breach detection.
//!
//! Per entity: Spawned -> Active -> (Eliminated | Breached). Elimination is
//! resolved by [`crate::combat`]; breaches are resolved here.

use std::f32::consts::TAU;

use glam::{Quat, Vec3};

use crate::camera::CameraState;
use crate::components::{Enemy, RenderKind, Transform};
use crate::config::EnemyConfig;
use crate::scene::SceneWorld;

/// Small LCG so spawn placement is reproducible from a seed.
#[derive(Debug, Clone)]
pub struct SpawnRng {
    seed: u32,
}

impl SpawnRng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Uniform in [0, 1].
    pub fn next_f32(&mut self) -> f32 {
        self.seed = self.seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((self.seed >> 16) & 0x7FFF) as f32 / 32767.0
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }
}

/// Outcome of advancing all enemies by one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub moved: usize,
    pub breached: Vec<hecs::Entity>,
}

pub struct EnemyManager {
    last_spawn_ms: f64,
    rng: SpawnRng,
}

impl EnemyManager {
    pub fn new(seed: u32) -> Self {
        Self {
            last_spawn_ms: 0.0,
            rng: SpawnRng::new(seed),
        }
    }

    pub fn last_spawn_ms(&self) -> f64 {
        self.last_spawn_ms
    }

    /// Spawn one enemy if more than `spawn_interval_ms` elapsed since the last
    /// spawn. `now_ms` is the frame's timestamp snapshot.
    pub fn maybe_spawn(
        &mut self,
        scene: &mut SceneWorld,
        camera: &CameraState,
        now_ms: f64,
        config: &EnemyConfig,
    ) -> Option<hecs::Entity> {
        if now_ms - self.last_spawn_ms <= config.spawn_interval_ms {
            return None;
        }
        self.last_spawn_ms = now_ms;

        let azimuth = self.rng.next_f32() * TAU;
        let height = self.rng.range(config.spawn_height_min, config.spawn_height_max);
        let position = Vec3::new(
            camera.position.x + azimuth.cos() * config.spawn_radius,
            height,
            camera.position.z + azimuth.sin() * config.spawn_radius,
        );
        let rotation = Quat::from_euler(
            glam::EulerRot::XYZ,
            self.rng.next_f32() * TAU,
            self.rng.next_f32() * TAU,
            self.rng.next_f32() * TAU,
        );

        let entity = scene.spawn_enemy(
            Transform::from_position_rotation(position, rotation),
            Enemy {
                spawned_at_ms: now_ms,
                spin: 0.0,
            },
        );
        tracing::debug!("Enemy spawned at {:?}", position);
        Some(entity)
    }

    /// Turn every enemy toward the camera, step it along its own forward
    /// axis, spin it, and despawn those that came within breach distance.
    pub fn advance(
        &mut self,
        scene: &mut SceneWorld,
        camera: &CameraState,
        config: &EnemyConfig,
    ) -> AdvanceReport {
        let mut report = AdvanceReport::default();

        for (entity, (kind, transform, enemy)) in scene
            .world
            .query_mut::<(&RenderKind, &mut Transform, &mut Enemy)>()
        {
            if !kind.is_enemy() {
                continue;
            }
            let facing = face_towards(transform.position, camera.position);
            enemy.spin += config.spin;
            transform.rotation = facing * Quat::from_rotation_z(enemy.spin);
            let step = transform.forward() * config.speed;
            transform.position += step;
            report.moved += 1;

            if transform.position.distance(camera.position) < config.breach_distance {
                report.breached.push(entity);
            }
        }

        for entity in &report.breached {
            scene.despawn_enemy(*entity);
            tracing::debug!("Enemy {:?} breached", entity);
        }
        report
    }
}

/// Rotation whose local -Z points from `from` to `target`.
fn face_towards(from: Vec3, target: Vec3) -> Quat {
    let direction = (target - from).normalize_or_zero();
    if direction == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(Vec3::NEG_Z, direction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EnemyConfig {
        EnemyConfig::default()
    }

    #[test]
    fn test_rng_in_unit_range() {
        let mut rng = SpawnRng::new(7);
        for _ in 0..1000 {
            let v = rng.next_f32();
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_spawn_interval() {
        let mut scene = SceneWorld::new();
        let camera = CameraState::default();
        let mut manager = EnemyManager::new(1);
        let cfg = config();

        assert!(manager.maybe_spawn(&mut scene, &camera, 1000.0, &cfg).is_none());
        assert!(manager.maybe_spawn(&mut scene, &camera, 1200.0, &cfg).is_none());
        assert!(manager.maybe_spawn(&mut scene, &camera, 1200.5, &cfg).is_some());
        assert!(manager.maybe_spawn(&mut scene, &camera, 2000.0, &cfg).is_none());
        assert!(manager.maybe_spawn(&mut scene, &camera, 2401.0, &cfg).is_some());
        assert_eq!(scene.enemy_count(), 2);
        assert_eq!(manager.last_spawn_ms(), 2401.0);
    }

    #[test]
    fn test_spawn_on_ring_around_camera() {
        let mut scene = SceneWorld::new();
        let mut camera = CameraState::default();
        camera.position = Vec3::new(1.0, 0.3, -2.0);
        let mut manager = EnemyManager::new(99);
        let cfg = config();

        for i in 0..20 {
            let now = 1300.0 * (i + 1) as f64;
            manager.maybe_spawn(&mut scene, &camera, now, &cfg).unwrap();
        }
        for (_, transform) in scene.enemy_transforms() {
            let horizontal = Vec3::new(
                transform.position.x - camera.position.x,
                0.0,
                transform.position.z - camera.position.z,
            );
            assert!((horizontal.length() - cfg.spawn_radius).abs() < 1e-4);
            assert!(transform.position.y >= cfg.spawn_height_min);
            assert!(transform.position.y <= cfg.spawn_height_max);
        }
    }

    #[test]
    fn test_enemy_homes_in_and_breaches() {
        let mut scene = SceneWorld::new();
        let camera = CameraState::default();
        let mut manager = EnemyManager::new(3);
        let cfg = config();
        scene.spawn_enemy(
            Transform::from_position_rotation(Vec3::new(2.0, 0.0, 0.0), Quat::IDENTITY),
            Enemy {
                spawned_at_ms: 0.0,
                spin: 0.0,
            },
        );

        let mut frames = 0;
        loop {
            frames += 1;
            let report = manager.advance(&mut scene, &camera, &cfg);
            if !report.breached.is_empty() {
                break;
            }
            let (_, t) = scene.enemy_transforms()[0];
            let travelled = 2.0 - t.position.length();
            assert!(travelled < 1.9 + 1e-4);
            assert!(frames < 1000);
        }
        // 0.015 per frame from 2.0 to below 0.1.
        assert_eq!(frames, 127);
        assert_eq!(scene.enemy_count(), 0);
    }

    #[test]
    fn test_spin_does_not_deflect_course() {
        let mut scene = SceneWorld::new();
        let camera = CameraState::default();
        let mut manager = EnemyManager::new(3);
        let cfg = config();
        let e = scene.spawn_enemy(
            Transform::from_position_rotation(Vec3::new(0.0, 0.0, -1.0), Quat::IDENTITY),
            Enemy {
                spawned_at_ms: 0.0,
                spin: 0.0,
            },
        );
        for _ in 0..10 {
            manager.advance(&mut scene, &camera, &cfg);
        }
        let t = *scene.world.get::<&Transform>(e).unwrap();
        assert!(t.position.x.abs() < 1e-5);
        assert!(t.position.y.abs() < 1e-5);
        assert!((t.position.z + 0.85).abs() < 1e-4);
        let enemy = scene.world.get::<&Enemy>(e).unwrap();
        assert!((enemy.spin - 1.0).abs() < 1e-5);
    }
}
