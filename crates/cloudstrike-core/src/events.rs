use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const ENEMY_SPAWNED: &str = "enemy.spawned";
pub const ENEMY_ELIMINATED: &str = "enemy.eliminated";
pub const ENEMY_BREACHED: &str = "enemy.breached";
pub const SCORE_CHANGED: &str = "score.changed";
pub const PHASE_CHANGED: &str = "phase.changed";
pub const WORLD_LOADED: &str = "world.loaded";

/// A game event with a type name and arbitrary payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameEvent {
    pub event_type: String,
    pub data: HashMap<String, serde_json::Value>,
    /// Milliseconds on the frame clock when the event was emitted.
    pub timestamp: f64,
}

impl GameEvent {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }
}

/// Event bus with ring buffer logging.
pub struct EventBus {
    /// Ring buffer log of recent events.
    log: VecDeque<GameEvent>,
    log_capacity: usize,
    /// JSONL file logger path (if enabled).
    log_file: Option<PathBuf>,
    now_ms: f64,
    pending: Vec<GameEvent>,
}

impl EventBus {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            log: VecDeque::with_capacity(log_capacity),
            log_capacity,
            log_file: None,
            now_ms: 0.0,
            pending: Vec::new(),
        }
    }

    pub fn enable_file_logging(&mut self, path: PathBuf) {
        tracing::info!("Event log: {}", path.display());
        self.log_file = Some(path);
    }

    /// Set the timestamp stamped on subsequently emitted events.
    pub fn set_time(&mut self, now_ms: f64) {
        self.now_ms = now_ms;
    }

    /// Queue an event. It reaches the log on the next [`EventBus::flush`].
    pub fn emit(&mut self, event_type: &str, data: HashMap<String, serde_json::Value>) {
        self.pending.push(GameEvent {
            event_type: event_type.to_string(),
            data,
            timestamp: self.now_ms,
        });
    }

    /// Emit an event from `(key, value)` pairs.
    pub fn emit_with<const N: usize>(&mut self, event_type: &str, fields: [(&str, serde_json::Value); N]) {
        let data = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.emit(event_type, data);
    }

    #[cfg(test)]
    pub fn emit_simple(&mut self, event_type: &str) {
        self.emit(event_type, HashMap::new());
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Move pending events into the ring buffer and the file log.
    /// Returns the flushed events.
    pub fn flush(&mut self) -> Vec<GameEvent> {
        let events: Vec<GameEvent> = self.pending.drain(..).collect();

        for event in &events {
            if self.log_capacity > 0 {
                if self.log.len() >= self.log_capacity {
                    self.log.pop_front();
                }
                self.log.push_back(event.clone());
            }

            if let Some(log_path) = &self.log_file {
                if let Ok(json) = serde_json::to_string(event) {
                    let result = std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(log_path)
                        .and_then(|mut f| {
                            use std::io::Write;
                            writeln!(f, "{}", json)
                        });
                    if let Err(e) = result {
                        tracing::warn!("Failed to append to event log: {}", e);
                    }
                }
            }
        }

        events
    }

    /// Recent events, oldest first.
    #[cfg(test)]
    pub fn get_log(&self) -> &VecDeque<GameEvent> {
        &self.log
    }

    /// Number of logged events of `event_type`.
    pub fn count(&self, event_type: &str) -> usize {
        self.log.iter().filter(|e| e.event_type == event_type).count()
    }
}
