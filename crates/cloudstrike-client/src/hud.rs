//! Window-title status line.
//!
//! The viewer has no text rendering; phase, score, prompts and errors are
//! shown in the title bar and mirrored to the log.

use cloudstrike_core::phase::ViewerPhase;

use crate::browser::CatalogState;

pub const APP_NAME: &str = "CloudStrike";

/// Everything the status line can show for one frame.
#[derive(Debug, Clone, Default)]
pub struct HudView<'a> {
    pub phase: Option<ViewerPhase>,
    pub score: u32,
    pub message: Option<&'a str>,
    pub catalog: Option<&'a CatalogState>,
    pub selected_world: Option<(usize, &'a str)>,
    pub load_progress: Option<(usize, usize)>,
    pub pending_files: usize,
}

fn prompt(view: &HudView<'_>) -> String {
    match view.phase {
        None | Some(ViewerPhase::SourceSelect) => "U: open files  B: browse worlds".to_string(),
        Some(ViewerPhase::Uploading) => {
            if view.pending_files == 0 {
                "Drop .ply/.drc files on the window  Backspace: back".to_string()
            } else {
                format!("{} file(s) queued  Backspace: back", view.pending_files)
            }
        }
        Some(ViewerPhase::WorldBrowsing) => match view.catalog {
            Some(CatalogState::Fetching) => "Fetching worlds...".to_string(),
            Some(CatalogState::Failed(_)) => "Catalog unavailable  R: retry".to_string(),
            _ => match view.selected_world {
                Some((index, title)) => format!("[{}] {}  Enter: load  0-9/arrows: select", index, title),
                None => "No worlds  R: refresh".to_string(),
            },
        },
        Some(ViewerPhase::Loading) => match view.load_progress {
            Some((done, total)) => format!("Loading {}/{}", done, total),
            None => "Loading".to_string(),
        },
        Some(ViewerPhase::Paused) => "Paused  Click to play  Backspace: change world".to_string(),
        Some(ViewerPhase::Active) => "WASD move  Mouse look  Click fire  Esc pause".to_string(),
    }
}

pub fn window_title(view: &HudView<'_>) -> String {
    let mut title = format!("{} | {}", APP_NAME, prompt(view));
    if view.phase.is_some_and(|p| p.in_game()) {
        title.push_str(&format!(" | Score {}", view.score));
    }
    if let Some(message) = view.message {
        title.push_str(&format!(" | Error: {}", message));
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_only_in_game() {
        let select = HudView {
            phase: Some(ViewerPhase::SourceSelect),
            score: 30,
            ..Default::default()
        };
        assert!(!window_title(&select).contains("Score"));

        let active = HudView {
            phase: Some(ViewerPhase::Active),
            score: 30,
            ..Default::default()
        };
        assert!(window_title(&active).ends_with("Score 30"));
    }

    #[test]
    fn test_error_and_retry_shown() {
        let failed = CatalogState::Failed("HTTP 500".into());
        let view = HudView {
            phase: Some(ViewerPhase::WorldBrowsing),
            catalog: Some(&failed),
            message: Some("HTTP 500"),
            ..Default::default()
        };
        let title = window_title(&view);
        assert!(title.contains("R: retry"));
        assert!(title.contains("Error: HTTP 500"));
    }

    #[test]
    fn test_loading_progress() {
        let view = HudView {
            phase: Some(ViewerPhase::Loading),
            load_progress: Some((1, 4)),
            ..Default::default()
        };
        assert_eq!(window_title(&view), "CloudStrike | Loading 1/4");
    }

    #[test]
    fn test_selected_world_line() {
        let ready = CatalogState::Ready;
        let view = HudView {
            phase: Some(ViewerPhase::WorldBrowsing),
            catalog: Some(&ready),
            selected_world: Some((2, "forest")),
            ..Default::default()
        };
        assert!(window_title(&view).contains("[2] forest"));
    }
}
