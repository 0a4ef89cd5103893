//! Blocking HTTP client for the world catalog and generation endpoints.
//!
//! The viewer never calls this on the event-loop thread; see
//! [`crate::browser`] for the background wrapper.

use std::io::Read;
use std::time::Duration;

use cloudstrike_core::catalog::{
    parse_generate_response, parse_status_response, parse_world_list, CatalogError,
    GenerateRequest, GenerateResponse, StatusResponse, WorldList,
};

/// Decoded preview image, RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub fn decode_preview(bytes: &[u8]) -> Result<PreviewImage, CatalogError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| CatalogError::Http(format!("preview is not a readable image: {}", e)))?;
    let rgba = image.to_rgba8();
    Ok(PreviewImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

#[derive(Clone)]
pub struct CatalogClient {
    base_url: String,
    agent: ureq::Agent,
}

impl CatalogClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(10))
                .timeout_read(Duration::from_secs(30))
                .build(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn read_body(result: Result<ureq::Response, ureq::Error>) -> Result<String, CatalogError> {
        match result {
            Ok(response) => response
                .into_string()
                .map_err(|e| CatalogError::Http(e.to_string())),
            Err(ureq::Error::Status(status, response)) => {
                let detail = response.into_string().unwrap_or_default();
                Err(CatalogError::Http(format!("HTTP {} {}", status, detail.trim())))
            }
            Err(ureq::Error::Transport(t)) => Err(CatalogError::Http(t.to_string())),
        }
    }

    /// `GET /worlds`, newest first.
    pub fn fetch_worlds(&self) -> Result<WorldList, CatalogError> {
        let url = self.endpoint("worlds");
        tracing::info!("Fetching world catalog from {}", url);
        let body = Self::read_body(self.agent.get(&url).call())?;
        let mut list = parse_world_list(&body)?;
        list.sort_newest_first();
        tracing::info!("Catalog lists {} worlds", list.worlds.len());
        Ok(list)
    }

    /// Download and decode a world preview image.
    pub fn fetch_preview(&self, png_url: &str) -> Result<PreviewImage, CatalogError> {
        let response = self.agent.get(png_url).call().map_err(|e| match e {
            ureq::Error::Status(status, _) => CatalogError::Http(format!("HTTP {}", status)),
            ureq::Error::Transport(t) => CatalogError::Http(t.to_string()),
        })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        decode_preview(&bytes)
    }

    /// `POST /generate`. The request is validated before anything is sent.
    pub fn trigger_generation(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, CatalogError> {
        request.validate()?;
        let url = self.endpoint("generate");
        tracing::info!("Requesting generation at {}", url);
        let body = Self::read_body(self.agent.post(&url).send_json(request))?;
        let response = parse_generate_response(&body)?;
        tracing::info!(
            "Generation {} started (theme {})",
            response.execution_id,
            response.theme
        );
        Ok(response)
    }

    /// `GET /status/{execution_id}`.
    pub fn generation_status(&self, execution_id: &str) -> Result<StatusResponse, CatalogError> {
        if execution_id.is_empty() || execution_id.contains('/') {
            return Err(CatalogError::InvalidRequest(format!(
                "bad execution id '{}'",
                execution_id
            )));
        }
        let url = self.endpoint(&format!("status/{}", execution_id));
        let body = Self::read_body(self.agent.get(&url).call())?;
        parse_status_response(&body)
    }
}
