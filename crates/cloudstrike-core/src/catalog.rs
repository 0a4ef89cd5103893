//! Wire types for the world catalog and generation endpoints.
//!
//! The HTTP side lives in the client crate; everything here is plain data
//! so it can be parsed and validated without a network.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Upper bound on the generation prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 500;

/// One generated world as listed by `GET /worlds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDescriptor {
    pub id: String,
    #[serde(default)]
    pub theme: Option<String>,
    /// Preview image. Empty when the backend could not sign it.
    #[serde(default)]
    pub png_url: String,
    /// Point-cloud parts, in load order.
    #[serde(default)]
    pub ply_urls: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl WorldDescriptor {
    pub fn title(&self) -> &str {
        self.theme.as_deref().filter(|t| !t.is_empty()).unwrap_or(self.id.as_str())
    }

    pub fn has_preview(&self) -> bool {
        !self.png_url.is_empty()
    }

    /// Worlds without parts cannot be loaded.
    pub fn is_loadable(&self) -> bool {
        self.ply_urls.iter().any(|u| !u.is_empty())
    }

    pub fn created(&self) -> Option<DateTime<FixedOffset>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    /// `created_at` as `YYYY-MM-DD HH:MM`, or `unknown`.
    pub fn created_label(&self) -> String {
        self.created()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Accepts RFC 3339 and offset-less ISO 8601 timestamps (treated as UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldList {
    #[serde(default)]
    pub worlds: Vec<WorldDescriptor>,
}

impl WorldList {
    /// Newest first; undated entries last, in listing order.
    pub fn sort_newest_first(&mut self) {
        self.worlds.sort_by(|a, b| match (a.created(), b.created()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt_ja: String,
    pub seed: i64,
    pub classes: String,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt_ja: prompt.into(),
            seed: 42,
            classes: "outdoor".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.prompt_ja.trim().is_empty() {
            return Err(CatalogError::InvalidRequest("prompt must not be empty".into()));
        }
        let chars = self.prompt_ja.chars().count();
        if chars > MAX_PROMPT_CHARS {
            return Err(CatalogError::InvalidRequest(format!(
                "prompt is {} characters, limit is {}",
                chars, MAX_PROMPT_CHARS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub execution_arn: String,
    pub execution_id: String,
    pub theme: String,
    pub prompt_en: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
    #[serde(other)]
    Unknown,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationStatus::Running | GenerationStatus::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub execution_arn: String,
    pub status: GenerationStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug)]
pub enum CatalogError {
    /// Transport failure or non-2xx status.
    Http(String),
    Parse(serde_json::Error),
    InvalidRequest(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Http(msg) => write!(f, "Catalog request failed: {}", msg),
            CatalogError::Parse(e) => write!(f, "Malformed catalog response: {}", e),
            CatalogError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

pub fn parse_world_list(body: &str) -> Result<WorldList, CatalogError> {
    serde_json::from_str(body).map_err(CatalogError::Parse)
}

pub fn parse_generate_response(body: &str) -> Result<GenerateResponse, CatalogError> {
    serde_json::from_str(body).map_err(CatalogError::Parse)
}

pub fn parse_status_response(body: &str) -> Result<StatusResponse, CatalogError> {
    serde_json::from_str(body).map_err(CatalogError::Parse)
}
