use std::collections::{HashMap, HashSet};
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Semantic action names mapped from physical inputs via bindings.yaml.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputBindings {
    #[serde(default)]
    pub actions: HashMap<String, Vec<InputTrigger>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputTrigger {
    Key(String),
    Mouse(String),
}

pub const MOVE_FORWARD: &str = "move_forward";
pub const MOVE_BACKWARD: &str = "move_backward";
pub const MOVE_LEFT: &str = "move_left";
pub const MOVE_RIGHT: &str = "move_right";
pub const FIRE: &str = "fire";
pub const RELEASE_CAPTURE: &str = "release_capture";
pub const CHOOSE_UPLOAD: &str = "choose_upload";
pub const CHOOSE_BROWSE: &str = "choose_browse";
pub const BACK: &str = "back";
pub const CONFIRM: &str = "confirm";
pub const REFRESH: &str = "refresh";
pub const SELECT_NEXT: &str = "select_next";
pub const SELECT_PREV: &str = "select_prev";

impl Default for InputBindings {
    fn default() -> Self {
        let key = |name: &str| vec![InputTrigger::Key(name.into())];
        let mut actions = HashMap::new();
        actions.insert(MOVE_FORWARD.into(), key("W"));
        actions.insert(MOVE_BACKWARD.into(), key("S"));
        actions.insert(MOVE_LEFT.into(), key("A"));
        actions.insert(MOVE_RIGHT.into(), key("D"));
        actions.insert(FIRE.into(), vec![InputTrigger::Mouse("Left".into())]);
        actions.insert(RELEASE_CAPTURE.into(), key("Escape"));
        actions.insert(CHOOSE_UPLOAD.into(), key("U"));
        actions.insert(CHOOSE_BROWSE.into(), key("B"));
        actions.insert(BACK.into(), key("Backspace"));
        actions.insert(CONFIRM.into(), key("Enter"));
        actions.insert(REFRESH.into(), key("R"));
        actions.insert(SELECT_NEXT.into(), key("ArrowDown"));
        actions.insert(SELECT_PREV.into(), key("ArrowUp"));

        Self { actions }
    }
}

/// Load input bindings from `input/bindings.yaml` under `root`, with defaults
/// as fallback. Actions missing from the file keep their default triggers.
pub fn load_bindings(root: &Path) -> InputBindings {
    let path = root.join("input/bindings.yaml");
    let mut bindings = InputBindings::default();
    if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str::<InputBindings>(&contents) {
                Ok(overrides) => {
                    tracing::info!("Loaded input bindings from {:?}", path);
                    bindings.actions.extend(overrides.actions);
                    return bindings;
                }
                Err(e) => tracing::warn!("Failed to parse bindings.yaml: {}", e),
            },
            Err(e) => tracing::warn!("Failed to read bindings.yaml: {}", e),
        }
    }
    tracing::info!("Using default input bindings");
    bindings
}

/// Maps key name strings to winit KeyCode.
fn key_name_to_code(name: &str) -> Option<KeyCode> {
    let code = match name {
        "A" => KeyCode::KeyA,
        "B" => KeyCode::KeyB,
        "C" => KeyCode::KeyC,
        "D" => KeyCode::KeyD,
        "E" => KeyCode::KeyE,
        "F" => KeyCode::KeyF,
        "Q" => KeyCode::KeyQ,
        "R" => KeyCode::KeyR,
        "S" => KeyCode::KeyS,
        "U" => KeyCode::KeyU,
        "W" => KeyCode::KeyW,
        "Z" => KeyCode::KeyZ,
        "Space" => KeyCode::Space,
        "ShiftLeft" => KeyCode::ShiftLeft,
        "Escape" => KeyCode::Escape,
        "Enter" => KeyCode::Enter,
        "Backspace" => KeyCode::Backspace,
        "Tab" => KeyCode::Tab,
        "ArrowUp" => KeyCode::ArrowUp,
        "ArrowDown" => KeyCode::ArrowDown,
        "ArrowLeft" => KeyCode::ArrowLeft,
        "ArrowRight" => KeyCode::ArrowRight,
        _ => return None,
    };
    Some(code)
}

fn mouse_name_to_button(name: &str) -> Option<MouseButton> {
    match name {
        "Left" => Some(MouseButton::Left),
        "Right" => Some(MouseButton::Right),
        "Middle" => Some(MouseButton::Middle),
        _ => None,
    }
}

const DIGIT_KEYS: [KeyCode; 10] = [
    KeyCode::Digit0,
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
    KeyCode::Digit6,
    KeyCode::Digit7,
    KeyCode::Digit8,
    KeyCode::Digit9,
];

/// Central input state, updated each frame.
///
/// Mouse motion only accumulates while the cursor is captured, and fire is
/// only reported while captured. Losing capture (Escape or focus loss) is
/// latched until the engine takes it.
pub struct InputState {
    bindings: InputBindings,
    keys_held: HashSet<KeyCode>,
    keys_just_pressed: HashSet<KeyCode>,
    mouse_buttons_held: HashSet<MouseButton>,
    mouse_buttons_just_pressed: HashSet<MouseButton>,
    mouse_delta: Vec2,
    cursor_captured: bool,
    capture_lost: bool,
    // Synthetic input queue (for tests)
    synthetic_keys_pressed: HashSet<KeyCode>,
    synthetic_keys_released: HashSet<KeyCode>,
    synthetic_mouse_pressed: HashSet<MouseButton>,
}

impl InputState {
    pub fn new(bindings: InputBindings) -> Self {
        Self {
            bindings,
            keys_held: HashSet::new(),
            keys_just_pressed: HashSet::new(),
            mouse_buttons_held: HashSet::new(),
            mouse_buttons_just_pressed: HashSet::new(),
            mouse_delta: Vec2::ZERO,
            cursor_captured: false,
            capture_lost: false,
            synthetic_keys_pressed: HashSet::new(),
            synthetic_keys_released: HashSet::new(),
            synthetic_mouse_pressed: HashSet::new(),
        }
    }

    /// Clear per-frame state. Call after the frame consumed its input.
    pub fn end_frame(&mut self) {
        self.keys_just_pressed.clear();
        self.mouse_buttons_just_pressed.clear();
        self.mouse_delta = Vec2::ZERO;
    }

    /// Start of frame: apply queued synthetic input, then release capture if
    /// the release action was pressed by either input path.
    pub fn begin_frame(&mut self) {
        self.apply_synthetic();
        if self.just_pressed(RELEASE_CAPTURE) {
            self.lose_capture();
        }
    }

    /// Apply queued synthetic input.
    pub fn apply_synthetic(&mut self) {
        for key in self.synthetic_keys_pressed.drain() {
            self.keys_held.insert(key);
            self.keys_just_pressed.insert(key);
        }
        for key in self.synthetic_keys_released.drain() {
            self.keys_held.remove(&key);
        }
        for btn in self.synthetic_mouse_pressed.drain() {
            self.mouse_buttons_just_pressed.insert(btn);
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if !self.keys_held.contains(&key_code) {
                                self.keys_just_pressed.insert(key_code);
                            }
                            self.keys_held.insert(key_code);
                        }
                        ElementState::Released => {
                            self.keys_held.remove(&key_code);
                        }
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => {
                    if !self.mouse_buttons_held.contains(button) {
                        self.mouse_buttons_just_pressed.insert(*button);
                    }
                    self.mouse_buttons_held.insert(*button);
                }
                ElementState::Released => {
                    self.mouse_buttons_held.remove(button);
                }
            },
            WindowEvent::Focused(false) => {
                self.keys_held.clear();
                self.mouse_buttons_held.clear();
                self.lose_capture();
            }
            _ => {}
        }
    }

    /// Raw mouse motion. Ignored unless captured.
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.accumulate_motion(delta.0 as f32, delta.1 as f32);
        }
    }

    fn accumulate_motion(&mut self, dx: f32, dy: f32) {
        if self.cursor_captured {
            self.mouse_delta.x += dx;
            self.mouse_delta.y += dy;
        }
    }

    pub fn is_captured(&self) -> bool {
        self.cursor_captured
    }

    pub fn set_captured(&mut self) {
        self.cursor_captured = true;
        self.capture_lost = false;
        self.mouse_delta = Vec2::ZERO;
    }

    fn lose_capture(&mut self) {
        if self.cursor_captured {
            self.cursor_captured = false;
            self.capture_lost = true;
            self.mouse_delta = Vec2::ZERO;
        }
    }

    /// Returns true once after capture was lost.
    pub fn take_capture_lost(&mut self) -> bool {
        std::mem::take(&mut self.capture_lost)
    }

    fn trigger_hit(
        &self,
        action: &str,
        keys: &HashSet<KeyCode>,
        buttons: &HashSet<MouseButton>,
    ) -> bool {
        let Some(triggers) = self.bindings.actions.get(action) else {
            return false;
        };
        // Untagged YAML strings always land in `Key`, so both names are tried.
        triggers.iter().any(|trigger| match trigger {
            InputTrigger::Key(name) | InputTrigger::Mouse(name) => {
                key_name_to_code(name).is_some_and(|c| keys.contains(&c))
                    || mouse_name_to_button(name).is_some_and(|b| buttons.contains(&b))
            }
        })
    }

    /// Check if a semantic action is currently held.
    pub fn pressed(&self, action: &str) -> bool {
        self.trigger_hit(action, &self.keys_held, &self.mouse_buttons_held)
    }

    /// Check if a semantic action was just pressed this frame.
    pub fn just_pressed(&self, action: &str) -> bool {
        self.trigger_hit(action, &self.keys_just_pressed, &self.mouse_buttons_just_pressed)
    }

    /// A primary click that is not a fire (cursor free).
    pub fn clicked_uncaptured(&self) -> bool {
        !self.cursor_captured && self.mouse_buttons_just_pressed.contains(&MouseButton::Left)
    }

    /// Fire gesture this frame. Only honoured while captured.
    pub fn fire_pressed(&self) -> bool {
        self.cursor_captured && self.just_pressed(FIRE)
    }

    /// Digit key pressed this frame, if any.
    pub fn digit_pressed(&self) -> Option<usize> {
        DIGIT_KEYS
            .iter()
            .position(|code| self.keys_just_pressed.contains(code))
    }

    /// Movement axis: x right(+)/left(-), y forward(+)/back(-).
    pub fn movement_axis(&self) -> Vec2 {
        let mut axis = Vec2::ZERO;
        if self.pressed(MOVE_FORWARD) {
            axis.y += 1.0;
        }
        if self.pressed(MOVE_BACKWARD) {
            axis.y -= 1.0;
        }
        if self.pressed(MOVE_LEFT) {
            axis.x -= 1.0;
        }
        if self.pressed(MOVE_RIGHT) {
            axis.x += 1.0;
        }
        axis
    }

    /// Accumulated look for this frame as (yaw, pitch) radians.
    pub fn look(&self, sensitivity: f32) -> (f32, f32) {
        (
            -self.mouse_delta.x * sensitivity,
            -self.mouse_delta.y * sensitivity,
        )
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Inject synthetic key press. Cancels a pending release for the same key.
    pub fn inject_key_press(&mut self, key_name: &str) {
        if let Some(code) = key_name_to_code(key_name) {
            self.synthetic_keys_pressed.insert(code);
            self.synthetic_keys_released.remove(&code);
        }
    }

    pub fn inject_key_release(&mut self, key_name: &str) {
        if let Some(code) = key_name_to_code(key_name) {
            self.synthetic_keys_released.insert(code);
            self.synthetic_keys_pressed.remove(&code);
        }
    }

    pub fn inject_mouse_press(&mut self, button: MouseButton) {
        self.synthetic_mouse_pressed.insert(button);
    }

    pub fn inject_mouse_motion(&mut self, dx: f32, dy: f32) {
        self.accumulate_motion(dx, dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> InputState {
        InputState::new(InputBindings::default())
    }

    #[test]
    fn test_default_bindings() {
        let bindings = InputBindings::default();
        for action in [MOVE_FORWARD, MOVE_BACKWARD, MOVE_LEFT, MOVE_RIGHT, FIRE] {
            assert!(bindings.actions.contains_key(action), "{}", action);
        }
    }

    #[test]
    fn test_key_name_mapping() {
        assert_eq!(key_name_to_code("W"), Some(KeyCode::KeyW));
        assert_eq!(key_name_to_code("Backspace"), Some(KeyCode::Backspace));
        assert_eq!(key_name_to_code("Invalid"), None);
    }

    #[test]
    fn test_movement_axis() {
        let mut state = state();
        state.inject_key_press("W");
        state.inject_key_press("D");
        state.apply_synthetic();
        assert_eq!(state.movement_axis(), Vec2::new(1.0, 1.0));

        state.inject_key_release("W");
        state.inject_key_press("S");
        state.apply_synthetic();
        assert_eq!(state.movement_axis(), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn test_motion_ignored_until_captured() {
        let mut state = state();
        state.inject_mouse_motion(10.0, 5.0);
        assert_eq!(state.mouse_delta(), Vec2::ZERO);

        state.set_captured();
        state.inject_mouse_motion(10.0, 5.0);
        state.inject_mouse_motion(2.0, -1.0);
        let (yaw, pitch) = state.look(0.002);
        assert!((yaw + 0.024).abs() < 1e-6);
        assert!((pitch + 0.008).abs() < 1e-6);

        state.end_frame();
        assert_eq!(state.look(0.002), (0.0, 0.0));
    }

    #[test]
    fn test_fire_only_while_captured() {
        let mut state = state();
        state.inject_mouse_press(MouseButton::Left);
        state.apply_synthetic();
        assert!(!state.fire_pressed());
        assert!(state.clicked_uncaptured());
        state.end_frame();

        state.set_captured();
        state.inject_mouse_press(MouseButton::Left);
        state.apply_synthetic();
        assert!(state.fire_pressed());
        assert!(!state.clicked_uncaptured());
    }

    #[test]
    fn test_focus_loss_latches_capture_lost() {
        let mut state = state();
        state.handle_window_event(&WindowEvent::Focused(false));
        assert!(!state.take_capture_lost());

        state.set_captured();
        state.inject_mouse_motion(3.0, 3.0);
        state.handle_window_event(&WindowEvent::Focused(false));
        assert!(!state.is_captured());
        assert_eq!(state.mouse_delta(), Vec2::ZERO);
        assert!(state.take_capture_lost());
        assert!(!state.take_capture_lost());
    }

    #[test]
    fn test_escape_releases_capture_at_frame_start() {
        let mut state = state();
        state.set_captured();
        state.inject_key_press("Escape");
        assert!(state.is_captured());

        state.begin_frame();
        assert!(!state.is_captured());
        assert!(state.take_capture_lost());
    }

    #[test]
    fn test_escape_while_free_is_not_a_capture_loss() {
        let mut state = state();
        state.inject_key_press("Escape");
        state.begin_frame();
        assert!(!state.take_capture_lost());
    }

    #[test]
    fn test_digit_selection() {
        let mut state = state();
        assert_eq!(state.digit_pressed(), None);
        state.keys_just_pressed.insert(KeyCode::Digit3);
        assert_eq!(state.digit_pressed(), Some(3));
    }

    #[test]
    fn test_bindings_yaml_overrides_merge() {
        let dir = std::env::temp_dir().join(format!("cloudstrike_bindings_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("input")).unwrap();
        std::fs::write(
            dir.join("input/bindings.yaml"),
            "actions:\n  move_forward: [\"Z\"]\n  move_left: [\"Q\"]\n",
        )
        .unwrap();

        let bindings = load_bindings(&dir);
        let mut state = InputState::new(bindings);
        state.inject_key_press("Z");
        state.apply_synthetic();
        assert!(state.pressed(MOVE_FORWARD));
        assert!(state.just_pressed(MOVE_FORWARD));
        // Unlisted actions keep their defaults.
        assert!(state.trigger_hit(FIRE, &HashSet::new(), &[MouseButton::Left].into()));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
