//! Draco decoding through the reference `draco_decoder` tool.
//!
//! The payload is written to a scratch file, converted to PLY by the tool,
//! and the PLY goes through the regular in-process parser.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use cloudstrike_core::config::AssetConfig;
use cloudstrike_core::pointcloud::{decode_ply, CompressedDecoder, DecodeError, PointAttributes};

pub const DRACO_RELEASES_URL: &str = "https://github.com/google/draco/releases/tag";

const DRACO_MAGIC: &[u8] = b"DRACO";

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct ExternalDracoDecoder {
    tool: PathBuf,
    version: String,
}

impl ExternalDracoDecoder {
    pub fn new(tool: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            version: version.into(),
        }
    }

    pub fn from_config(assets: &AssetConfig) -> Self {
        Self::new(&assets.draco_decoder, &assets.draco_version)
    }

    /// Where the pinned decoder release can be downloaded.
    pub fn download_url(&self) -> String {
        format!("{}/{}", DRACO_RELEASES_URL, self.version)
    }

    fn scratch_paths(&self) -> (PathBuf, PathBuf) {
        let id = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let stem = format!("cloudstrike_draco_{}_{}", std::process::id(), id);
        let dir = std::env::temp_dir();
        (dir.join(format!("{}.drc", stem)), dir.join(format!("{}.ply", stem)))
    }

    fn run_tool(&self, input: &Path, output: &Path) -> Result<Vec<u8>, DecodeError> {
        let result = Command::new(&self.tool)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .output();
        match result {
            Ok(out) if out.status.success() => std::fs::read(output)
                .map_err(|e| DecodeError::Compressed(format!("decoder produced no output: {}", e))),
            Ok(out) => Err(DecodeError::Compressed(format!(
                "{} exited with {}: {}",
                self.tool.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
            Err(e) => Err(DecodeError::Compressed(format!(
                "could not run {} ({}); install draco {} from {}",
                self.tool.display(),
                e,
                self.version,
                self.download_url()
            ))),
        }
    }
}

impl CompressedDecoder for ExternalDracoDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<PointAttributes, DecodeError> {
        if !bytes.starts_with(DRACO_MAGIC) {
            return Err(DecodeError::Compressed("missing DRACO header".into()));
        }
        let (input, output) = self.scratch_paths();
        std::fs::write(&input, bytes)
            .map_err(|e| DecodeError::Compressed(format!("scratch write failed: {}", e)))?;

        let ply = self.run_tool(&input, &output);
        let _ = std::fs::remove_file(&input);
        let _ = std::fs::remove_file(&output);

        let attributes = decode_ply(&ply?)?;
        tracing::debug!(
            "Draco payload ({} bytes) decoded to {} vertices",
            bytes.len(),
            attributes.len()
        );
        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url_tracks_version() {
        let decoder = ExternalDracoDecoder::from_config(&AssetConfig::default());
        assert_eq!(
            decoder.download_url(),
            "https://github.com/google/draco/releases/tag/1.5.7"
        );
    }

    #[test]
    fn test_rejects_non_draco_payload() {
        let decoder = ExternalDracoDecoder::new("draco_decoder", "1.5.7");
        assert!(matches!(
            decoder.decode(b"ply\nformat ascii 1.0\n"),
            Err(DecodeError::Compressed(_))
        ));
    }

    #[test]
    fn test_missing_tool_is_a_decode_error() {
        let decoder = ExternalDracoDecoder::new("/nonexistent/draco_decoder", "1.5.7");
        let err = decoder.decode(b"DRACO\x02\x02\x01\x01").unwrap_err();
        assert!(err.to_string().contains("1.5.7"));
    }

    #[test]
    fn test_scratch_paths_are_unique() {
        let decoder = ExternalDracoDecoder::new("draco_decoder", "1.5.7");
        let (a, _) = decoder.scratch_paths();
        let (b, _) = decoder.scratch_paths();
        assert_ne!(a, b);
    }
}
