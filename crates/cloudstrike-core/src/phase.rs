//! Viewer lifecycle state machine.
//!
//! ```text
//! SourceSelect -> {Uploading, WorldBrowsing} -> Loading -> Paused <-> Active
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViewerPhase {
    SourceSelect,
    Uploading,
    WorldBrowsing,
    Loading,
    Paused,
    Active,
}

impl ViewerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerPhase::SourceSelect => "source_select",
            ViewerPhase::Uploading => "uploading",
            ViewerPhase::WorldBrowsing => "world_browsing",
            ViewerPhase::Loading => "loading",
            ViewerPhase::Paused => "paused",
            ViewerPhase::Active => "active",
        }
    }

    /// Whether a world is attached and the game view is showing.
    pub fn in_game(&self) -> bool {
        matches!(self, ViewerPhase::Paused | ViewerPhase::Active)
    }
}

impl std::fmt::Display for ViewerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    ChooseUpload,
    ChooseBrowse,
    SourcesChosen,
    LoadFinished,
    LoadFailed(String),
    CaptureAcquired,
    CaptureLost,
    Back,
}

impl PhaseEvent {
    fn name(&self) -> &'static str {
        match self {
            PhaseEvent::ChooseUpload => "ChooseUpload",
            PhaseEvent::ChooseBrowse => "ChooseBrowse",
            PhaseEvent::SourcesChosen => "SourcesChosen",
            PhaseEvent::LoadFinished => "LoadFinished",
            PhaseEvent::LoadFailed(_) => "LoadFailed",
            PhaseEvent::CaptureAcquired => "CaptureAcquired",
            PhaseEvent::CaptureLost => "CaptureLost",
            PhaseEvent::Back => "Back",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ViewerPhase,
    pub event: &'static str,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event {} is not valid in phase {}", self.event, self.from)
    }
}

impl std::error::Error for TransitionError {}

/// Current phase plus the view state shown alongside it.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: ViewerPhase,
    /// Source phase that started the in-flight (or last) load.
    load_origin: Option<ViewerPhase>,
    message: Option<String>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: ViewerPhase::SourceSelect,
            load_origin: None,
            message: None,
        }
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == ViewerPhase::Active
    }

    /// Last error shown to the user, cleared when a new source is chosen.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    /// Apply `event`. On success returns the new phase; on failure the phase
    /// is left unchanged.
    pub fn apply(&mut self, event: PhaseEvent) -> Result<ViewerPhase, TransitionError> {
        use ViewerPhase::*;

        let next = match (self.phase, &event) {
            (SourceSelect, PhaseEvent::ChooseUpload) => Uploading,
            (SourceSelect, PhaseEvent::ChooseBrowse) => WorldBrowsing,
            (Uploading | WorldBrowsing, PhaseEvent::SourcesChosen) => {
                self.load_origin = Some(self.phase);
                self.message = None;
                Loading
            }
            (Loading, PhaseEvent::LoadFinished) => Paused,
            (Loading, PhaseEvent::LoadFailed(msg)) => {
                self.message = Some(msg.clone());
                self.load_origin.unwrap_or(SourceSelect)
            }
            (Paused, PhaseEvent::CaptureAcquired) => Active,
            (Active, PhaseEvent::CaptureLost) => Paused,
            (Uploading | WorldBrowsing | Paused, PhaseEvent::Back) => SourceSelect,
            (from, event) => {
                return Err(TransitionError {
                    from,
                    event: event.name(),
                })
            }
        };

        tracing::info!("Phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(next)
    }
}
