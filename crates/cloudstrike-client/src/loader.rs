//! Background loading of point-cloud batches.
//!
//! Every source of a batch is fetched and decoded on its own worker thread.
//! Results come back over an mpsc channel tagged with the batch ticket; the
//! frame loop polls without blocking. A batch either completes with every
//! part, ordered by source index, or fails as a whole on the first error.
//! Dropping the receiver (new batch, cancel, or teardown) turns any late
//! completion into a no-op.

use std::io::Read;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use cloudstrike_core::pointcloud::{
    ingest, CompressedDecoder, DecodeError, PointCloudAsset, PointCloudFormat,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Local(PathBuf),
    Remote(String),
}

impl AssetSource {
    /// `http(s)://` strings are remote, anything else is a local path.
    #[cfg(test)]
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            AssetSource::Remote(raw.to_string())
        } else {
            AssetSource::Local(PathBuf::from(raw))
        }
    }

    /// Short human-readable name (file name, or URL path without query).
    pub fn label(&self) -> String {
        match self {
            AssetSource::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            AssetSource::Remote(url) => {
                let no_query = url.split(['?', '#']).next().unwrap_or(url);
                no_query.rsplit('/').next().unwrap_or(no_query).to_string()
            }
        }
    }

    pub fn format(&self) -> Option<PointCloudFormat> {
        match self {
            AssetSource::Local(path) => PointCloudFormat::from_path(&path.to_string_lossy()),
            AssetSource::Remote(url) => PointCloudFormat::from_path(url),
        }
    }
}

#[derive(Debug)]
pub enum FetchError {
    Io { path: PathBuf, error: std::io::Error },
    Status { url: String, status: u16 },
    Transport { url: String, message: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Io { path, error } => write!(f, "cannot read {}: {}", path.display(), error),
            FetchError::Status { url, status } => write!(f, "{} returned HTTP {}", url, status),
            FetchError::Transport { url, message } => write!(f, "request to {} failed: {}", url, message),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug)]
pub enum LoadError {
    NoSources,
    UnknownFormat(String),
    Fetch { part: usize, error: FetchError },
    Decode { part: usize, label: String, error: DecodeError },
    /// A worker went away without reporting.
    WorkerLost,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NoSources => write!(f, "no point-cloud sources selected"),
            LoadError::UnknownFormat(label) => {
                write!(f, "{}: unsupported file type (expected .ply or .drc)", label)
            }
            LoadError::Fetch { part, error } => write!(f, "part {}: {}", part + 1, error),
            LoadError::Decode { part, label, error } => {
                write!(f, "part {} ({}): {}", part + 1, label, error)
            }
            LoadError::WorkerLost => write!(f, "a loader worker stopped unexpectedly"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Byte source for local paths and URLs.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, source: &AssetSource) -> Result<Vec<u8>, FetchError>;
}

/// Reads local files from disk and remote ones over HTTP.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(Duration::from_secs(10))
                .build(),
        }
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(&self, source: &AssetSource) -> Result<Vec<u8>, FetchError> {
        match source {
            AssetSource::Local(path) => std::fs::read(path).map_err(|error| FetchError::Io {
                path: path.clone(),
                error,
            }),
            AssetSource::Remote(url) => {
                let response = self.agent.get(url).call().map_err(|e| match e {
                    ureq::Error::Status(status, _) => FetchError::Status {
                        url: url.clone(),
                        status,
                    },
                    ureq::Error::Transport(t) => FetchError::Transport {
                        url: url.clone(),
                        message: t.to_string(),
                    },
                })?;
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|e| FetchError::Transport {
                        url: url.clone(),
                        message: e.to_string(),
                    })?;
                Ok(bytes)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadSettings {
    pub stride: NonZeroUsize,
    pub point_size: f32,
}

struct PartReport {
    ticket: u64,
    part: usize,
    result: Result<PointCloudAsset, LoadError>,
}

struct PendingBatch {
    ticket: u64,
    rx: Receiver<PartReport>,
    parts: Vec<Option<PointCloudAsset>>,
    received: usize,
}

#[derive(Debug)]
pub enum LoadStatus {
    Idle,
    Pending { received: usize, total: usize },
    Finished { ticket: u64, assets: Vec<PointCloudAsset> },
    Failed { ticket: u64, error: LoadError },
}

pub struct AssetLoader {
    fetcher: Arc<dyn SourceFetcher>,
    decoder: Arc<dyn CompressedDecoder>,
    next_ticket: u64,
    pending: Option<PendingBatch>,
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, decoder: Arc<dyn CompressedDecoder>) -> Self {
        Self {
            fetcher,
            decoder,
            next_ticket: 1,
            pending: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Start loading `sources` as one batch, superseding any batch in flight.
    /// Unsupported extensions are rejected before any worker starts.
    pub fn start(
        &mut self,
        sources: Vec<AssetSource>,
        settings: LoadSettings,
    ) -> Result<u64, LoadError> {
        if sources.is_empty() {
            return Err(LoadError::NoSources);
        }
        let formats = sources
            .iter()
            .map(|s| s.format().ok_or_else(|| LoadError::UnknownFormat(s.label())))
            .collect::<Result<Vec<_>, _>>()?;

        self.cancel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let (tx, rx) = mpsc::channel();
        let total = sources.len();
        for (part, (source, format)) in sources.into_iter().zip(formats).enumerate() {
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let decoder = Arc::clone(&self.decoder);
            std::thread::spawn(move || {
                let label = source.label();
                let result = fetcher
                    .fetch(&source)
                    .map_err(|error| LoadError::Fetch { part, error })
                    .and_then(|bytes| {
                        ingest(
                            &label,
                            &bytes,
                            format,
                            settings.stride,
                            settings.point_size,
                            decoder.as_ref(),
                        )
                        .map_err(|error| LoadError::Decode {
                            part,
                            label: label.clone(),
                            error,
                        })
                    });
                // The receiver may be gone after cancel; that is fine.
                let _ = tx.send(PartReport {
                    ticket,
                    part,
                    result,
                });
            });
        }

        tracing::info!("Load {} started: {} sources", ticket, total);
        self.pending = Some(PendingBatch {
            ticket,
            rx,
            parts: (0..total).map(|_| None).collect(),
            received: 0,
        });
        Ok(ticket)
    }

    /// Drop the batch in flight, if any.
    pub fn cancel(&mut self) {
        if let Some(batch) = self.pending.take() {
            tracing::info!("Load {} cancelled", batch.ticket);
        }
    }

    /// Drain whatever has arrived without blocking.
    pub fn poll(&mut self) -> LoadStatus {
        loop {
            let Some(batch) = self.pending.as_mut() else {
                return LoadStatus::Idle;
            };
            match batch.rx.try_recv() {
                Ok(report) => {
                    if let Some(status) = self.accept(report) {
                        return status;
                    }
                }
                Err(TryRecvError::Empty) => {
                    return LoadStatus::Pending {
                        received: batch.received,
                        total: batch.parts.len(),
                    }
                }
                Err(TryRecvError::Disconnected) => {
                    let ticket = batch.ticket;
                    self.pending = None;
                    return LoadStatus::Failed {
                        ticket,
                        error: LoadError::WorkerLost,
                    };
                }
            }
        }
    }

    /// Block until the batch in flight settles or `timeout` elapses.
    #[cfg(test)]
    pub fn wait(&mut self, timeout: Duration) -> LoadStatus {
        let deadline = instant::Instant::now() + timeout;
        loop {
            match self.poll() {
                LoadStatus::Pending { .. } if instant::Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(2));
                }
                status => return status,
            }
        }
    }

    fn accept(&mut self, report: PartReport) -> Option<LoadStatus> {
        let batch = self.pending.as_mut()?;
        if report.ticket != batch.ticket {
            tracing::debug!("Ignoring result from stale load {}", report.ticket);
            return None;
        }
        match report.result {
            Err(error) => {
                let ticket = batch.ticket;
                self.pending = None;
                Some(LoadStatus::Failed { ticket, error })
            }
            Ok(asset) => {
                if batch.parts[report.part].replace(asset).is_none() {
                    batch.received += 1;
                }
                if batch.received < batch.parts.len() {
                    return None;
                }
                let batch = self.pending.take()?;
                let assets: Vec<PointCloudAsset> = batch.parts.into_iter().flatten().collect();
                tracing::info!("Load {} finished: {} parts", batch.ticket, assets.len());
                Some(LoadStatus::Finished {
                    ticket: batch.ticket,
                    assets,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudstrike_core::pointcloud::PointAttributes;
    use std::collections::HashMap;

    struct MapFetcher {
        files: HashMap<String, (Vec<u8>, u64)>,
    }

    impl SourceFetcher for MapFetcher {
        fn fetch(&self, source: &AssetSource) -> Result<Vec<u8>, FetchError> {
            let key = source.label();
            match self.files.get(&key) {
                Some((bytes, delay_ms)) => {
                    std::thread::sleep(Duration::from_millis(*delay_ms));
                    Ok(bytes.clone())
                }
                None => Err(FetchError::Status {
                    url: key,
                    status: 404,
                }),
            }
        }
    }

    struct NoDraco;

    impl CompressedDecoder for NoDraco {
        fn decode(&self, _bytes: &[u8]) -> Result<PointAttributes, DecodeError> {
            Err(DecodeError::Compressed("unavailable".into()))
        }
    }

    fn ply(vertices: usize) -> Vec<u8> {
        let mut text = format!(
            "ply\nformat ascii 1.0\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
            vertices
        );
        for i in 0..vertices {
            text.push_str(&format!("{} 0 0\n", i));
        }
        text.into_bytes()
    }

    fn loader(files: &[(&str, Vec<u8>, u64)]) -> AssetLoader {
        let files = files
            .iter()
            .map(|(name, bytes, delay)| (name.to_string(), (bytes.clone(), *delay)))
            .collect();
        AssetLoader::new(Arc::new(MapFetcher { files }), Arc::new(NoDraco))
    }

    fn settings() -> LoadSettings {
        LoadSettings {
            stride: NonZeroUsize::new(10).unwrap(),
            point_size: 0.01,
        }
    }

    fn sources(names: &[&str]) -> Vec<AssetSource> {
        names
            .iter()
            .map(|n| AssetSource::Remote(format!("https://cdn.example/{}?sig=abc", n)))
            .collect()
    }

    #[test]
    fn test_source_parsing_and_labels() {
        let remote = AssetSource::parse("https://cdn/w/part_1.PLY?X-Amz=1");
        assert_eq!(remote.label(), "part_1.PLY");
        assert_eq!(remote.format(), Some(PointCloudFormat::Ply));

        let local = AssetSource::parse("/data/world.drc");
        assert_eq!(local, AssetSource::Local(PathBuf::from("/data/world.drc")));
        assert_eq!(local.format(), Some(PointCloudFormat::Draco));
    }

    #[test]
    fn test_batch_completes_in_source_order() {
        // First part finishes last.
        let mut loader = loader(&[
            ("a.ply", ply(95), 60),
            ("b.ply", ply(20), 0),
            ("c.ply", ply(1), 10),
        ]);
        loader.start(sources(&["a.ply", "b.ply", "c.ply"]), settings()).unwrap();

        match loader.wait(Duration::from_secs(5)) {
            LoadStatus::Finished { assets, .. } => {
                let labels: Vec<&str> = assets.iter().map(|a| a.source.as_str()).collect();
                assert_eq!(labels, vec!["a.ply", "b.ply", "c.ply"]);
                let counts: Vec<usize> = assets.iter().map(|a| a.point_count()).collect();
                assert_eq!(counts, vec![10, 2, 1]);
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(!loader.is_loading());
        assert!(matches!(loader.poll(), LoadStatus::Idle));
    }

    #[test]
    fn test_one_failure_fails_whole_batch() {
        let mut loader = loader(&[("a.ply", ply(10), 30)]);
        loader.start(sources(&["a.ply", "missing.ply"]), settings()).unwrap();

        match loader.wait(Duration::from_secs(5)) {
            LoadStatus::Failed { error, .. } => {
                assert!(matches!(error, LoadError::Fetch { part: 1, .. }));
                assert!(error.to_string().contains("404"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        // The slower successful part arrives into a dropped receiver.
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(loader.poll(), LoadStatus::Idle));
    }

    #[test]
    fn test_decode_failure_fails_batch() {
        let mut loader = loader(&[("a.ply", ply(10), 0), ("b.drc", b"DRACO".to_vec(), 0)]);
        loader.start(sources(&["a.ply", "b.drc"]), settings()).unwrap();
        match loader.wait(Duration::from_secs(5)) {
            LoadStatus::Failed { error, .. } => {
                assert!(matches!(error, LoadError::Decode { part: 1, .. }))
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_new_batch_supersedes_old() {
        let mut loader = loader(&[("slow.ply", ply(10), 80), ("fast.ply", ply(30), 0)]);
        let first = loader.start(sources(&["slow.ply"]), settings()).unwrap();
        let second = loader.start(sources(&["fast.ply"]), settings()).unwrap();
        assert!(second > first);

        match loader.wait(Duration::from_secs(5)) {
            LoadStatus::Finished { ticket, assets } => {
                assert_eq!(ticket, second);
                assert_eq!(assets.len(), 1);
                assert_eq!(assets[0].source, "fast.ply");
            }
            other => panic!("unexpected status {:?}", other),
        }
        std::thread::sleep(Duration::from_millis(120));
        assert!(matches!(loader.poll(), LoadStatus::Idle));
    }

    #[test]
    fn test_rejects_unknown_extension_up_front() {
        let mut loader = loader(&[]);
        let err = loader
            .start(vec![AssetSource::parse("scene.obj")], settings())
            .unwrap_err();
        assert!(matches!(err, LoadError::UnknownFormat(_)));
        assert!(!loader.is_loading());
        assert!(matches!(
            loader.start(Vec::new(), settings()),
            Err(LoadError::NoSources)
        ));
    }

    #[test]
    fn test_cancel_makes_completion_a_no_op() {
        let mut loader = loader(&[("a.ply", ply(10), 30)]);
        loader.start(sources(&["a.ply"]), settings()).unwrap();
        loader.cancel();
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(loader.poll(), LoadStatus::Idle));
    }
}
