//! Engine state and the per-frame game tick.
//!
//! One owned [`EngineState`] is threaded through every input handler and the
//! frame callback. Nothing here touches the GPU directly; buffer lifetimes
//! go through [`RenderResources`].

use glam::Vec2;
use serde_json::json;

use crate::camera::CameraState;
use crate::combat::{resolve_shot, HitResult, ScoreState};
use crate::config::ViewerConfig;
use crate::enemies::EnemyManager;
use crate::events::{self, EventBus};
use crate::phase::{PhaseEvent, PhaseMachine, TransitionError, ViewerPhase};
use crate::pointcloud::PointCloudAsset;
use crate::scene::{RenderResources, SceneWorld};

const EVENT_LOG_CAPACITY: usize = 1024;

/// Input sampled for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    /// x: strafe right(+)/left(-), y: forward(+)/back(-).
    pub movement: Vec2,
    pub yaw: f32,
    pub pitch: f32,
}

/// What one tick did. All zero when the phase was not Active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub simulated: bool,
    pub moved: bool,
    pub spawned: bool,
    pub breaches: usize,
}

pub struct EngineState {
    pub config: ViewerConfig,
    pub phase: PhaseMachine,
    pub scene: SceneWorld,
    pub camera: CameraState,
    pub score: ScoreState,
    pub enemies: EnemyManager,
    pub events: EventBus,
    frame: u64,
}

impl EngineState {
    pub fn new(config: ViewerConfig) -> Self {
        let mut events = EventBus::new(EVENT_LOG_CAPACITY);
        if let Some(path) = &config.event_log {
            events.enable_file_logging(path.into());
        }
        let enemies = EnemyManager::new(config.enemies.seed);
        Self {
            config,
            phase: PhaseMachine::new(),
            scene: SceneWorld::new(),
            camera: CameraState::default(),
            score: ScoreState::default(),
            enemies,
            events,
            frame: 0,
        }
    }

    pub fn current_phase(&self) -> ViewerPhase {
        self.phase.phase()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Apply a lifecycle event and record the change.
    pub fn transition(&mut self, event: PhaseEvent) -> Result<ViewerPhase, TransitionError> {
        let from = self.phase.phase();
        let to = self.phase.apply(event)?;
        self.events.emit_with(
            events::PHASE_CHANGED,
            [("from", json!(from.as_str())), ("to", json!(to.as_str()))],
        );
        self.events.flush();
        Ok(to)
    }

    /// One frame of game logic. Mutates nothing unless the phase is Active.
    ///
    /// Order: look, movement, spawn, advance. `now_ms` is the timestamp
    /// snapshot for this frame.
    pub fn tick(&mut self, input: FrameInput, now_ms: f64) -> FrameReport {
        self.frame += 1;
        self.events.set_time(now_ms);
        if !self.phase.is_active() {
            return FrameReport::default();
        }

        let mut report = FrameReport {
            simulated: true,
            ..Default::default()
        };

        self.camera.apply_look(input.yaw, input.pitch);
        report.moved = self.camera.navigate(
            input.movement,
            self.config.camera.move_speed,
            self.config.camera.max_distance,
        );

        if let Some(entity) =
            self.enemies
                .maybe_spawn(&mut self.scene, &self.camera, now_ms, &self.config.enemies)
        {
            report.spawned = true;
            self.events
                .emit_with(events::ENEMY_SPAWNED, [("entity", json!(entity.to_bits().get()))]);
        }

        let advance = self
            .enemies
            .advance(&mut self.scene, &self.camera, &self.config.enemies);
        report.breaches = advance.breached.len();
        for entity in &advance.breached {
            let before = self.score.value();
            self.score.penalize(self.config.score.breach_penalty);
            self.events
                .emit_with(events::ENEMY_BREACHED, [("entity", json!(entity.to_bits().get()))]);
            self.emit_score_change(before);
        }

        self.events.flush();
        report
    }

    /// Fire through the viewport center. Ignored unless Active.
    pub fn fire(&mut self) -> Option<HitResult> {
        if !self.phase.is_active() {
            return None;
        }
        let ray = self.camera.center_ray();
        let before = self.score.value();
        let hit = resolve_shot(
            &mut self.scene,
            &mut self.score,
            &ray,
            self.config.enemies.half_extent,
            self.config.score.hit_reward,
        );
        if let Some(hit) = &hit {
            tracing::debug!("Hit enemy {:?} at {:.3}", hit.entity, hit.distance);
            self.events.emit_with(
                events::ENEMY_ELIMINATED,
                [
                    ("entity", json!(hit.entity.to_bits().get())),
                    ("distance", json!(hit.distance)),
                ],
            );
            self.emit_score_change(before);
            self.events.flush();
        }
        hit
    }

    fn emit_score_change(&mut self, before: u32) {
        let after = self.score.value();
        if after != before {
            self.events.emit_with(
                events::SCORE_CHANGED,
                [
                    ("score", json!(after)),
                    ("delta", json!(after as i64 - before as i64)),
                ],
            );
        }
    }

    /// Attach a fully decoded batch as the new world and move to Paused.
    ///
    /// Rejected (scene untouched) unless a load is in progress.
    pub fn finish_load(
        &mut self,
        assets: Vec<PointCloudAsset>,
        resources: &mut dyn RenderResources,
    ) -> Result<u64, TransitionError> {
        if self.phase.phase() != ViewerPhase::Loading {
            return Err(TransitionError {
                from: self.phase.phase(),
                event: "LoadFinished",
            });
        }
        let points: usize = assets.iter().map(|a| a.point_count()).sum();
        let parts = assets.len();
        let generation = self.scene.replace_world_geometry(assets, resources);
        self.transition(PhaseEvent::LoadFinished)?;
        self.events.emit_with(
            events::WORLD_LOADED,
            [
                ("generation", json!(generation)),
                ("parts", json!(parts)),
                ("points", json!(points)),
            ],
        );
        self.events.flush();
        Ok(generation)
    }

    /// Abandon the in-flight load. The attached world (if any) is kept.
    pub fn fail_load(&mut self, message: &str) -> Result<ViewerPhase, TransitionError> {
        tracing::error!("World load failed: {}", message);
        self.transition(PhaseEvent::LoadFailed(message.to_string()))
    }

    /// Release everything the scene owns. Called once on shutdown.
    pub fn teardown(&mut self, resources: &mut dyn RenderResources) {
        let clouds = self.scene.clear_world_geometry(resources);
        let enemies = self.scene.clear_enemies();
        self.events.flush();
        tracing::info!(
            "Engine torn down: {} clouds released, {} enemies removed, final score {}",
            clouds,
            enemies,
            self.score.value()
        );
    }
}
