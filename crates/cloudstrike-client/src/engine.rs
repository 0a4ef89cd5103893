use std::path::PathBuf;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::window::{CursorGrabMode, Window, WindowId};

use cloudstrike_core::config::ConfigError;
use cloudstrike_core::game::{EngineState, FrameInput};
use cloudstrike_core::phase::{PhaseEvent, ViewerPhase};

use crate::browser::{CatalogState, WorldBrowser};
use crate::catalog_client::CatalogClient;
use crate::cli::StartMode;
use crate::draco::ExternalDracoDecoder;
use crate::hud::{self, HudView};
use crate::input::{self, InputState};
use crate::loader::{AssetLoader, AssetSource, HttpFetcher, LoadSettings, LoadStatus};
use crate::project_config::ResolvedConfig;
use crate::renderer::{FrameScene, Renderer, VIEWPORT_HEIGHT, VIEWPORT_WIDTH};

/// The viewer application: owns the engine state and everything that feeds it.
pub struct Engine {
    pub state: EngineState,
    pub input: InputState,
    loader: AssetLoader,
    load_settings: LoadSettings,
    load_progress: Option<(usize, usize)>,
    browser: WorldBrowser,
    catalog: CatalogClient,
    renderer: Option<Renderer>,
    pending_files: Vec<PathBuf>,
    start_mode: Option<StartMode>,
    started: instant::Instant,
    title: String,
    shutting_down: bool,
}

impl Engine {
    pub fn new(resolved: ResolvedConfig, start_mode: StartMode) -> Result<Self, ConfigError> {
        let ResolvedConfig { config, root } = resolved;
        let load_settings = LoadSettings {
            stride: config.assets.stride()?,
            point_size: config.assets.point_size,
        };
        let decoder = ExternalDracoDecoder::from_config(&config.assets);
        let loader = AssetLoader::new(Arc::new(HttpFetcher::new()), Arc::new(decoder));
        let catalog = CatalogClient::new(&config.catalog_url);
        let bindings = input::load_bindings(&root);

        Ok(Self {
            state: EngineState::new(config),
            input: InputState::new(bindings),
            loader,
            load_settings,
            load_progress: None,
            browser: WorldBrowser::new(),
            catalog,
            renderer: None,
            pending_files: Vec::new(),
            start_mode: Some(start_mode),
            started: instant::Instant::now(),
            title: String::new(),
            shutting_down: false,
        })
    }

    fn window(&self) -> Option<&Window> {
        self.renderer.as_ref().map(|r| r.window.as_ref())
    }

    fn now_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn apply_start_mode(&mut self) {
        match self.start_mode.take() {
            None | Some(StartMode::SourceSelect) => {}
            Some(StartMode::Upload(files)) => {
                self.choose_upload();
                self.pending_files.extend(files.into_iter().map(PathBuf::from));
                self.confirm_upload();
            }
            Some(StartMode::Browse) => self.choose_browse(),
        }
    }

    fn transition(&mut self, event: PhaseEvent) -> bool {
        match self.state.transition(event) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    fn choose_upload(&mut self) {
        if self.transition(PhaseEvent::ChooseUpload) {
            self.state.phase.clear_message();
            self.pending_files.clear();
        }
    }

    fn choose_browse(&mut self) {
        if self.transition(PhaseEvent::ChooseBrowse) {
            self.state.phase.clear_message();
            self.browser.refresh(&self.catalog);
        }
    }

    fn go_back(&mut self) {
        self.loader.cancel();
        self.pending_files.clear();
        self.transition(PhaseEvent::Back);
    }

    /// Queue a file dropped onto the window. Only accepted while uploading.
    pub fn queue_file(&mut self, path: PathBuf) {
        if self.state.current_phase() != ViewerPhase::Uploading {
            tracing::warn!("Ignoring dropped file {} (press U first)", path.display());
            return;
        }
        tracing::info!("Queued {}", path.display());
        self.pending_files.push(path);
    }

    fn confirm_upload(&mut self) {
        if self.pending_files.is_empty() {
            self.state.phase.set_message("no files chosen");
            return;
        }
        let sources = self
            .pending_files
            .drain(..)
            .map(AssetSource::Local)
            .collect();
        self.begin_load(sources);
    }

    fn confirm_world(&mut self) {
        match self.browser.chosen_sources() {
            Ok(sources) => self.begin_load(sources),
            Err(msg) => self.state.phase.set_message(msg),
        }
    }

    /// Start an async load and move to Loading. Rejected sources leave the
    /// phase where it was.
    fn begin_load(&mut self, sources: Vec<AssetSource>) {
        match self.loader.start(sources, self.load_settings) {
            Ok(_) => {
                if self.transition(PhaseEvent::SourcesChosen) {
                    self.load_progress = None;
                } else {
                    self.loader.cancel();
                }
            }
            Err(e) => {
                tracing::error!("Load rejected: {}", e);
                self.state.phase.set_message(e.to_string());
            }
        }
    }

    fn poll_loader(&mut self) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match self.loader.poll() {
            LoadStatus::Idle => {}
            LoadStatus::Pending { received, total } => {
                self.load_progress = Some((received, total));
            }
            LoadStatus::Finished { ticket, assets } => {
                self.load_progress = None;
                match self.state.finish_load(assets, &mut renderer.uploader()) {
                    Ok(generation) => {
                        tracing::info!("Load {} attached as generation {}", ticket, generation)
                    }
                    Err(e) => tracing::warn!("Load {} discarded: {}", ticket, e),
                }
            }
            LoadStatus::Failed { ticket, error } => {
                self.load_progress = None;
                tracing::debug!("Load {} failed", ticket);
                if let Err(e) = self.state.fail_load(&error.to_string()) {
                    tracing::warn!("{}", e);
                }
            }
        }
    }

    fn poll_browser(&mut self) {
        self.browser.poll();
        if self.state.current_phase() != ViewerPhase::WorldBrowsing {
            return;
        }
        self.browser.request_preview(&self.catalog);
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match (self.browser.selected_world(), self.browser.selected_preview()) {
            (Some(world), Some(preview)) => renderer.set_preview(&world.id, preview),
            _ => renderer.clear_preview(),
        }
    }

    fn capture_cursor(&mut self) {
        let grabbed = match self.window() {
            Some(window) => {
                let result = window
                    .set_cursor_grab(CursorGrabMode::Locked)
                    .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
                match result {
                    Ok(()) => {
                        window.set_cursor_visible(false);
                        true
                    }
                    Err(e) => {
                        tracing::warn!("Cursor capture refused: {}", e);
                        false
                    }
                }
            }
            None => false,
        };
        if !grabbed {
            self.state.phase.set_message("pointer capture unavailable");
            return;
        }
        tracing::info!("Capturing cursor");
        self.input.set_captured();
        self.transition(PhaseEvent::CaptureAcquired);
    }

    fn on_capture_lost(&mut self) {
        if let Some(window) = self.window() {
            let _ = window.set_cursor_grab(CursorGrabMode::None);
            window.set_cursor_visible(true);
        }
        if self.state.phase.is_active() {
            self.transition(PhaseEvent::CaptureLost);
        }
    }

    /// Phase-specific key and click handling for this frame.
    fn handle_phase_input(&mut self) {
        match self.state.current_phase() {
            ViewerPhase::SourceSelect => {
                if self.input.just_pressed(input::CHOOSE_UPLOAD) {
                    self.choose_upload();
                } else if self.input.just_pressed(input::CHOOSE_BROWSE) {
                    self.choose_browse();
                }
            }
            ViewerPhase::Uploading => {
                if self.input.just_pressed(input::BACK) {
                    self.go_back();
                } else if self.input.just_pressed(input::CONFIRM) {
                    self.confirm_upload();
                }
            }
            ViewerPhase::WorldBrowsing => {
                if self.input.just_pressed(input::BACK) {
                    self.go_back();
                    return;
                }
                if self.input.just_pressed(input::REFRESH) {
                    self.browser.refresh(&self.catalog);
                }
                if self.input.just_pressed(input::SELECT_NEXT) {
                    self.browser.select_next();
                }
                if self.input.just_pressed(input::SELECT_PREV) {
                    self.browser.select_prev();
                }
                if let Some(index) = self.input.digit_pressed() {
                    if !self.browser.select(index) {
                        tracing::warn!("No world at index {}", index);
                    }
                }
                if self.input.just_pressed(input::CONFIRM) {
                    self.confirm_world();
                }
            }
            ViewerPhase::Loading => {}
            ViewerPhase::Paused => {
                if self.input.just_pressed(input::BACK) {
                    self.go_back();
                } else if self.input.clicked_uncaptured() {
                    self.capture_cursor();
                }
            }
            ViewerPhase::Active => {}
        }
    }

    fn hud_view(&self) -> HudView<'_> {
        let phase = self.state.current_phase();
        let browsing = phase == ViewerPhase::WorldBrowsing;
        let catalog_error = match self.browser.state() {
            CatalogState::Failed(msg) if browsing => Some(msg.as_str()),
            _ => None,
        };
        HudView {
            phase: Some(phase),
            score: self.state.score.value(),
            message: self.state.phase.message().or(catalog_error),
            catalog: browsing.then(|| self.browser.state()),
            selected_world: self
                .browser
                .selected_world()
                .map(|w| (self.browser.selected_index(), w.title())),
            load_progress: self.load_progress,
            pending_files: self.pending_files.len(),
        }
    }

    fn update_title(&mut self) {
        let title = hud::window_title(&self.hud_view());
        if title != self.title {
            if let Some(window) = self.window() {
                window.set_title(&title);
            }
            tracing::debug!("{}", title);
            self.title = title;
        }
    }

    fn draw(&mut self) {
        let phase = self.state.current_phase();
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        let (clouds, enemies) = if phase.in_game() {
            let enemies = self
                .state
                .scene
                .enemy_transforms()
                .into_iter()
                .map(|(_, t)| t)
                .collect();
            (self.state.scene.point_clouds(), enemies)
        } else {
            (Vec::new(), Vec::new())
        };
        renderer.render(&FrameScene {
            camera: &self.state.camera,
            clouds: &clouds,
            enemies: &enemies,
            show_preview: phase == ViewerPhase::WorldBrowsing,
        });
    }

    /// One frame: background results, input, game tick, title, draw.
    pub fn frame(&mut self) {
        self.input.begin_frame();
        // Sampled before phase input so the resume click is not also a shot.
        let fire = self.input.fire_pressed();

        self.poll_loader();
        self.poll_browser();

        if self.input.take_capture_lost() {
            self.on_capture_lost();
        }
        self.handle_phase_input();

        // Resolved against the pose and enemies drawn last frame.
        if fire {
            self.state.fire();
        }

        let (yaw, pitch) = self.input.look(self.state.config.camera.look_sensitivity);
        let frame_input = FrameInput {
            movement: self.input.movement_axis(),
            yaw,
            pitch,
        };
        let now_ms = self.now_ms();
        let report = self.state.tick(frame_input, now_ms);
        if report.breaches > 0 {
            tracing::debug!("{} breach(es), score {}", report.breaches, self.state.score.value());
        }

        self.update_title();
        self.draw();
        self.input.end_frame();
    }

    /// Release everything the viewer holds. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        self.loader.cancel();
        match self.renderer.as_mut() {
            Some(renderer) => {
                self.state.teardown(&mut renderer.uploader());
                renderer.release_all();
            }
            None => tracing::debug!("Shutdown before GPU init"),
        }
        self.renderer = None;
    }
}

impl ApplicationHandler for Engine {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        tracing::info!("Application resumed, initializing GPU");

        let window_attrs = Window::default_attributes()
            .with_title(hud::APP_NAME)
            .with_inner_size(winit::dpi::PhysicalSize::new(VIEWPORT_WIDTH, VIEWPORT_HEIGHT))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let camera = self.state.config.camera.clone();
        let half_extent = self.state.config.enemies.half_extent;
        match pollster::block_on(crate::renderer::init_gpu(Arc::clone(&window), camera, half_extent))
        {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                tracing::error!("{}", e);
                event_loop.exit();
                return;
            }
        }
        tracing::info!("GPU initialized successfully");

        self.apply_start_mode();
        window.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        self.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested, exiting");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::DroppedFile(path) => self.queue_file(path),
            WindowEvent::RedrawRequested => {
                if self.shutting_down {
                    return;
                }
                self.frame();
                if let Some(window) = self.window() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        self.input.handle_device_event(&event);
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudstrike_core::components::{Enemy, PointCloudHandle, Transform};
    use cloudstrike_core::config::ViewerConfig;
    use cloudstrike_core::pointcloud::{
        corrective_rotation, PointAttributes, PointCloudAsset, PointCloudFormat,
    };
    use cloudstrike_core::scene::RenderResources;
    use glam::{Quat, Vec3};
    use std::num::NonZeroUsize;
    use winit::event::MouseButton;

    #[derive(Default)]
    struct CountingResources {
        uploaded: usize,
    }

    impl RenderResources for CountingResources {
        fn upload(&mut self, _asset: &PointCloudAsset) -> PointCloudHandle {
            self.uploaded += 1;
            PointCloudHandle(self.uploaded - 1)
        }

        fn release(&mut self, _handle: PointCloudHandle) {}
    }

    fn engine() -> Engine {
        let resolved = ResolvedConfig {
            config: ViewerConfig::default(),
            root: std::env::temp_dir(),
        };
        Engine::new(resolved, StartMode::SourceSelect).unwrap()
    }

    fn press(engine: &mut Engine, key: &str) {
        engine.input.inject_key_press(key);
        engine.frame();
        engine.input.inject_key_release(key);
        engine.frame();
    }

    /// Engine with a one-part world attached and the cursor captured.
    fn active_engine() -> Engine {
        let mut engine = engine();
        engine.state.transition(PhaseEvent::ChooseUpload).unwrap();
        engine.state.transition(PhaseEvent::SourcesChosen).unwrap();
        let asset = PointCloudAsset {
            source: "world.ply".into(),
            format: PointCloudFormat::Ply,
            stride: NonZeroUsize::new(1).unwrap(),
            attributes: PointAttributes {
                positions: vec![[0.0, 0.0, 0.0]],
                colors: None,
            },
            rotation: corrective_rotation(),
            point_size: 0.01,
        };
        let mut resources = CountingResources::default();
        engine.state.finish_load(vec![asset], &mut resources).unwrap();
        assert_eq!(resources.uploaded, 1);

        engine.input.set_captured();
        engine.state.transition(PhaseEvent::CaptureAcquired).unwrap();
        engine
    }

    #[test]
    fn test_escape_while_active_pauses() {
        let mut engine = active_engine();
        engine.input.inject_key_press("Escape");
        engine.frame();
        assert_eq!(engine.state.current_phase(), ViewerPhase::Paused);
        assert!(!engine.input.is_captured());

        engine.input.inject_key_release("Escape");
        engine.input.inject_key_press("W");
        engine.frame();
        assert_eq!(engine.state.camera.position, Vec3::ZERO);
        assert_eq!(engine.state.current_phase(), ViewerPhase::Paused);
    }

    #[test]
    fn test_shot_uses_pose_before_this_frames_look() {
        let mut engine = active_engine();
        engine.state.scene.spawn_enemy(
            Transform::from_position_rotation(Vec3::new(0.0, 0.0, -1.0), Quat::IDENTITY),
            Enemy {
                spawned_at_ms: 0.0,
                spin: 0.0,
            },
        );
        // A large yaw that would swing the aim off the enemy if applied first.
        engine.input.inject_mouse_motion(1000.0, 0.0);
        engine.input.inject_mouse_press(MouseButton::Left);
        engine.frame();

        assert_eq!(engine.state.score.value(), 10);
        assert_eq!(engine.state.scene.enemy_count(), 0);
        assert!(engine.state.camera.forward().z > -0.5);
    }

    #[test]
    fn test_keys_choose_source() {
        let mut engine = engine();
        press(&mut engine, "U");
        assert_eq!(engine.state.current_phase(), ViewerPhase::Uploading);
        press(&mut engine, "Backspace");
        assert_eq!(engine.state.current_phase(), ViewerPhase::SourceSelect);
    }

    #[test]
    fn test_dropped_file_ignored_outside_upload() {
        let mut engine = engine();
        engine.queue_file(PathBuf::from("world.ply"));
        assert!(engine.pending_files.is_empty());

        press(&mut engine, "U");
        engine.queue_file(PathBuf::from("world.ply"));
        assert_eq!(engine.pending_files.len(), 1);
    }

    #[test]
    fn test_confirm_without_files_sets_message() {
        let mut engine = engine();
        press(&mut engine, "U");
        press(&mut engine, "Enter");
        assert_eq!(engine.state.current_phase(), ViewerPhase::Uploading);
        assert_eq!(engine.state.phase.message(), Some("no files chosen"));
    }

    #[test]
    fn test_unknown_extension_stays_uploading() {
        let mut engine = engine();
        press(&mut engine, "U");
        engine.queue_file(PathBuf::from("notes.txt"));
        press(&mut engine, "Enter");
        assert_eq!(engine.state.current_phase(), ViewerPhase::Uploading);
        assert!(engine.state.phase.message().is_some());
        assert!(!engine.loader.is_loading());
    }

    #[test]
    fn test_upload_confirm_starts_loading() {
        let mut engine = engine();
        press(&mut engine, "U");
        engine.queue_file(std::env::temp_dir().join("cloudstrike-missing.ply"));
        press(&mut engine, "Enter");
        assert_eq!(engine.state.current_phase(), ViewerPhase::Loading);
        assert!(engine.pending_files.is_empty());
        assert!(engine.hud_view().load_progress.is_none());
    }

    #[test]
    fn test_no_game_progress_outside_active() {
        let mut engine = engine();
        for _ in 0..5 {
            engine.input.inject_key_press("W");
            engine.frame();
        }
        assert_eq!(engine.state.camera.position, glam::Vec3::ZERO);
        assert_eq!(engine.state.scene.enemy_count(), 0);
        assert_eq!(engine.state.frame_count(), 5);
    }

    #[test]
    fn test_shutdown_without_gpu() {
        let mut engine = engine();
        engine.shutdown();
        engine.shutdown();
        assert!(engine.shutting_down);
    }
}
