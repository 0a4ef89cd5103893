//! World catalog browsing: the fetched list, the highlighted entry, and
//! preview images, all filled in from background requests.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};

use cloudstrike_core::catalog::{CatalogError, WorldDescriptor, WorldList};

use crate::catalog_client::{CatalogClient, PreviewImage};
use crate::loader::AssetSource;

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogState {
    Idle,
    Fetching,
    Ready,
    Failed(String),
}

pub enum BrowserReply {
    Worlds(Result<WorldList, CatalogError>),
    Preview {
        id: String,
        result: Result<PreviewImage, CatalogError>,
    },
}

pub struct WorldBrowser {
    worlds: Vec<WorldDescriptor>,
    selected: usize,
    state: CatalogState,
    previews: HashMap<String, PreviewImage>,
    previews_requested: HashSet<String>,
    tx: Sender<BrowserReply>,
    rx: Receiver<BrowserReply>,
}

impl Default for WorldBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldBrowser {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            worlds: Vec::new(),
            selected: 0,
            state: CatalogState::Idle,
            previews: HashMap::new(),
            previews_requested: HashSet::new(),
            tx,
            rx,
        }
    }

    pub fn state(&self) -> &CatalogState {
        &self.state
    }

    pub fn worlds(&self) -> &[WorldDescriptor] {
        &self.worlds
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_world(&self) -> Option<&WorldDescriptor> {
        self.worlds.get(self.selected)
    }

    /// Fetch the catalog in the background. Ignored while a fetch is running.
    pub fn refresh(&mut self, client: &CatalogClient) {
        if self.state == CatalogState::Fetching {
            return;
        }
        self.state = CatalogState::Fetching;
        let tx = self.tx.clone();
        let client = client.clone();
        std::thread::spawn(move || {
            let _ = tx.send(BrowserReply::Worlds(client.fetch_worlds()));
        });
    }

    /// Apply every reply that has arrived. Returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(reply) = self.rx.try_recv() {
            self.apply(reply);
            changed = true;
        }
        changed
    }

    pub fn apply(&mut self, reply: BrowserReply) {
        match reply {
            BrowserReply::Worlds(Ok(list)) => {
                self.worlds = list.worlds;
                self.selected = 0;
                self.state = CatalogState::Ready;
                self.log_listing();
            }
            BrowserReply::Worlds(Err(e)) => {
                tracing::error!("World catalog unavailable: {}", e);
                self.state = CatalogState::Failed(e.to_string());
            }
            BrowserReply::Preview { id, result } => match result {
                Ok(image) => {
                    tracing::debug!("Preview for {} ready ({}x{})", id, image.width, image.height);
                    self.previews.insert(id, image);
                }
                Err(e) => {
                    tracing::warn!("Preview for {} unavailable: {}", id, e);
                    self.previews_requested.remove(&id);
                }
            },
        }
    }

    fn log_listing(&self) {
        if self.worlds.is_empty() {
            tracing::info!("The catalog has no worlds yet");
            return;
        }
        for (i, world) in self.worlds.iter().enumerate() {
            tracing::info!(
                "[{}] {} ({}, {} parts)",
                i,
                world.title(),
                world.created_label(),
                world.ply_urls.len()
            );
        }
    }

    pub fn select(&mut self, index: usize) -> bool {
        if index < self.worlds.len() {
            self.selected = index;
            true
        } else {
            false
        }
    }

    pub fn select_next(&mut self) {
        if !self.worlds.is_empty() {
            self.selected = (self.selected + 1) % self.worlds.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.worlds.is_empty() {
            self.selected = (self.selected + self.worlds.len() - 1) % self.worlds.len();
        }
    }

    /// Request the highlighted world's preview if it is neither cached nor
    /// already in flight.
    pub fn request_preview(&mut self, client: &CatalogClient) {
        let Some(world) = self.selected_world() else {
            return;
        };
        if !world.has_preview() || self.previews_requested.contains(&world.id) {
            return;
        }
        let id = world.id.clone();
        let url = world.png_url.clone();
        self.previews_requested.insert(id.clone());
        let tx = self.tx.clone();
        let client = client.clone();
        std::thread::spawn(move || {
            let result = client.fetch_preview(&url);
            let _ = tx.send(BrowserReply::Preview { id, result });
        });
    }

    pub fn selected_preview(&self) -> Option<&PreviewImage> {
        self.selected_world().and_then(|w| self.previews.get(&w.id))
    }

    /// Asset sources of the highlighted world, in catalog order.
    pub fn chosen_sources(&self) -> Result<Vec<AssetSource>, String> {
        let world = self
            .selected_world()
            .ok_or_else(|| "no world selected".to_string())?;
        if !world.is_loadable() {
            return Err(format!("world {} has no point-cloud parts", world.title()));
        }
        Ok(world
            .ply_urls
            .iter()
            .filter(|u| !u.is_empty())
            .map(|u| AssetSource::Remote(u.clone()))
            .collect())
    }
}
