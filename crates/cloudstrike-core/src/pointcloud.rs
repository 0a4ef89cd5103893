//! Point-cloud ingestion: decoding, decimation, and upright correction.
//!
//! Two wire formats are accepted. Uncompressed `.ply` vertex lists (ASCII or
//! binary) are parsed in-process; compressed `.drc` payloads go through a
//! [`CompressedDecoder`] supplied by the caller. Both produce the same
//! [`PointAttributes`] shape before entering the decimation step.

use std::f32::consts::FRAC_PI_2;
use std::num::NonZeroUsize;

use glam::{EulerRot, Quat};
use linked_hash_map::LinkedHashMap;

/// Default sampling stride: every 10th vertex is kept.
pub const DEFAULT_DECIMATION_STRIDE: usize = 10;

/// Default rendered point size in world units.
pub const DEFAULT_POINT_SIZE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointCloudFormat {
    /// Uncompressed vertex list.
    Ply,
    /// Draco-compressed geometry.
    Draco,
}

impl PointCloudFormat {
    /// Detect the format from a file path or URL. Query strings and fragments
    /// (presigned URLs carry both) are ignored.
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.split(['?', '#']).next().unwrap_or(path);
        let ext = trimmed.rsplit_once('.').map(|(_, ext)| ext)?;
        if ext.contains('/') {
            return None;
        }
        match ext.to_ascii_lowercase().as_str() {
            "ply" => Some(Self::Ply),
            "drc" => Some(Self::Draco),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum DecodeError {
    PlyError(String),
    NoVertices,
    MissingProperty(String),
    ColorCountMismatch { positions: usize, colors: usize },
    Compressed(String),
    UnsupportedFormat(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlyError(msg) => write!(f, "PLY parse error: {}", msg),
            Self::NoVertices => write!(f, "point cloud contains no vertices"),
            Self::MissingProperty(name) => write!(f, "PLY missing property: {}", name),
            Self::ColorCountMismatch { positions, colors } => write!(
                f,
                "point cloud has {} positions but {} colors",
                positions, colors
            ),
            Self::Compressed(msg) => write!(f, "compressed geometry decode failed: {}", msg),
            Self::UnsupportedFormat(name) => write!(f, "unsupported point-cloud format: {}", name),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Flat decoded attribute set: position triples and optional color triples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointAttributes {
    pub positions: Vec<[f32; 3]>,
    pub colors: Option<Vec<[f32; 3]>>,
}

impl PointAttributes {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Reject empty clouds and color arrays that do not line up with positions.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.positions.is_empty() {
            return Err(DecodeError::NoVertices);
        }
        if let Some(colors) = &self.colors {
            if colors.len() != self.positions.len() {
                return Err(DecodeError::ColorCountMismatch {
                    positions: self.positions.len(),
                    colors: colors.len(),
                });
            }
        }
        Ok(())
    }
}

/// Decoder for the compressed geometry codec.
///
/// Implementations may rely on an external decoder resource; the core only
/// requires that the result has the same attribute shape as a PLY decode.
pub trait CompressedDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<PointAttributes, DecodeError>;
}

/// A decoded, decimated point set ready to be attached to the scene.
#[derive(Debug, Clone)]
pub struct PointCloudAsset {
    pub source: String,
    pub format: PointCloudFormat,
    pub stride: NonZeroUsize,
    /// Attributes after decimation.
    pub attributes: PointAttributes,
    pub rotation: Quat,
    pub point_size: f32,
}

impl PointCloudAsset {
    pub fn point_count(&self) -> usize {
        self.attributes.len()
    }
}

/// Coordinate-system alignment applied to every attached cloud:
/// -90° about X, then -90° about Z (XYZ Euler order).
pub fn corrective_rotation() -> Quat {
    Quat::from_euler(EulerRot::XYZ, -FRAC_PI_2, 0.0, -FRAC_PI_2)
}

/// Keep vertices `0, N, 2N, …`. Colors follow their positions.
pub fn decimate(attributes: &PointAttributes, stride: NonZeroUsize) -> PointAttributes {
    let n = stride.get();
    let positions: Vec<[f32; 3]> = attributes.positions.iter().step_by(n).copied().collect();
    let colors = attributes
        .colors
        .as_ref()
        .map(|colors| colors.iter().step_by(n).copied().collect());
    PointAttributes { positions, colors }
}

/// Decode a raw buffer in the declared format.
pub fn decode(
    bytes: &[u8],
    format: PointCloudFormat,
    compressed: &dyn CompressedDecoder,
) -> Result<PointAttributes, DecodeError> {
    let attributes = match format {
        PointCloudFormat::Ply => decode_ply(bytes)?,
        PointCloudFormat::Draco => compressed.decode(bytes)?,
    };
    attributes.validate()?;
    Ok(attributes)
}

/// Decode, decimate, and orient one source buffer.
pub fn ingest(
    source: &str,
    bytes: &[u8],
    format: PointCloudFormat,
    stride: NonZeroUsize,
    point_size: f32,
    compressed: &dyn CompressedDecoder,
) -> Result<PointCloudAsset, DecodeError> {
    let decoded = decode(bytes, format, compressed)?;
    let attributes = decimate(&decoded, stride);
    tracing::info!(
        "Decoded {}: {} vertices -> {} points (stride {})",
        source,
        decoded.len(),
        attributes.len(),
        stride
    );
    Ok(PointCloudAsset {
        source: source.to_string(),
        format,
        stride,
        attributes,
        rotation: corrective_rotation(),
        point_size,
    })
}

/// SH DC coefficient to linear color: c * C0 + 0.5
fn sh_dc_to_color(c: f32) -> f32 {
    (c * 0.282_094_8 + 0.5).clamp(0.0, 1.0)
}

/// Parse an uncompressed PLY vertex list (ASCII or binary).
///
/// Colors are taken from `red/green/blue` (8-bit or float) or, for splat
/// exports, from the `f_dc_*` spherical-harmonic DC terms.
pub fn decode_ply(bytes: &[u8]) -> Result<PointAttributes, DecodeError> {
    let mut reader = std::io::Cursor::new(bytes);
    let parser = ply_rs::parser::Parser::<ply_rs::ply::DefaultElement>::new();
    let ply = parser
        .read_ply(&mut reader)
        .map_err(|e| DecodeError::PlyError(e.to_string()))?;

    let vertices = ply.payload.get("vertex").ok_or(DecodeError::NoVertices)?;
    if vertices.is_empty() {
        return Err(DecodeError::NoVertices);
    }

    let color_source = vertices.first().and_then(|v| ColorSource::detect(v));

    let mut positions = Vec::with_capacity(vertices.len());
    let mut colors = color_source.map(|_| Vec::with_capacity(vertices.len()));

    for vertex in vertices {
        let x = get_float_property(vertex, "x")?;
        let y = get_float_property(vertex, "y")?;
        let z = get_float_property(vertex, "z")?;
        positions.push([x, y, z]);

        if let (Some(source), Some(colors)) = (color_source, colors.as_mut()) {
            colors.push(source.read(vertex)?);
        }
    }

    Ok(PointAttributes { positions, colors })
}

#[derive(Debug, Clone, Copy)]
enum ColorSource {
    Rgb,
    ShDc,
}

impl ColorSource {
    fn detect(vertex: &LinkedHashMap<String, ply_rs::ply::Property>) -> Option<Self> {
        if ["red", "green", "blue"].iter().all(|k| vertex.contains_key(*k)) {
            Some(Self::Rgb)
        } else if ["f_dc_0", "f_dc_1", "f_dc_2"].iter().all(|k| vertex.contains_key(*k)) {
            Some(Self::ShDc)
        } else {
            None
        }
    }

    fn read(
        self,
        vertex: &LinkedHashMap<String, ply_rs::ply::Property>,
    ) -> Result<[f32; 3], DecodeError> {
        match self {
            Self::Rgb => Ok([
                get_color_channel(vertex, "red")?,
                get_color_channel(vertex, "green")?,
                get_color_channel(vertex, "blue")?,
            ]),
            Self::ShDc => Ok([
                sh_dc_to_color(get_float_property(vertex, "f_dc_0")?),
                sh_dc_to_color(get_float_property(vertex, "f_dc_1")?),
                sh_dc_to_color(get_float_property(vertex, "f_dc_2")?),
            ]),
        }
    }
}

/// Extract a float property, handling both Float and Double types.
fn get_float_property(
    element: &LinkedHashMap<String, ply_rs::ply::Property>,
    name: &str,
) -> Result<f32, DecodeError> {
    match element.get(name) {
        Some(ply_rs::ply::Property::Float(v)) => Ok(*v),
        Some(ply_rs::ply::Property::Double(v)) => Ok(*v as f32),
        Some(_) => Err(DecodeError::MissingProperty(format!("{} has wrong type", name))),
        None => Err(DecodeError::MissingProperty(name.to_string())),
    }
}

/// Color channels are 8-bit in most exports, normalized floats in some.
fn get_color_channel(
    element: &LinkedHashMap<String, ply_rs::ply::Property>,
    name: &str,
) -> Result<f32, DecodeError> {
    use ply_rs::ply::Property;
    match element.get(name) {
        Some(Property::UChar(v)) => Ok(*v as f32 / 255.0),
        Some(Property::UShort(v)) => Ok(*v as f32 / 65535.0),
        Some(Property::Float(v)) => Ok(v.clamp(0.0, 1.0)),
        Some(Property::Double(v)) => Ok((*v as f32).clamp(0.0, 1.0)),
        Some(_) => Err(DecodeError::MissingProperty(format!("{} has wrong type", name))),
        None => Err(DecodeError::MissingProperty(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCompressed;

    impl CompressedDecoder for NoCompressed {
        fn decode(&self, _bytes: &[u8]) -> Result<PointAttributes, DecodeError> {
            Err(DecodeError::Compressed("not available".into()))
        }
    }

    struct FixedCompressed(PointAttributes);

    impl CompressedDecoder for FixedCompressed {
        fn decode(&self, _bytes: &[u8]) -> Result<PointAttributes, DecodeError> {
            Ok(self.0.clone())
        }
    }

    fn stride(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn line_cloud(count: usize, with_colors: bool) -> PointAttributes {
        let positions = (0..count).map(|i| [i as f32, 0.0, 0.0]).collect();
        let colors = with_colors.then(|| (0..count).map(|i| [i as f32, 1.0, 0.5]).collect());
        PointAttributes { positions, colors }
    }

    const ASCII_PLY: &str = "ply
format ascii 1.0
element vertex 3
property float x
property float y
property float z
property uchar red
property uchar green
property uchar blue
end_header
0 0 0 255 0 0
1 2 3 0 255 0
4 5 6 0 0 255
";

    #[test]
    fn test_format_detection() {
        assert_eq!(PointCloudFormat::from_path("world.ply"), Some(PointCloudFormat::Ply));
        assert_eq!(PointCloudFormat::from_path("WORLD.PLY"), Some(PointCloudFormat::Ply));
        assert_eq!(PointCloudFormat::from_path("mesh.drc"), Some(PointCloudFormat::Draco));
        assert_eq!(
            PointCloudFormat::from_path("https://bucket.s3.amazonaws.com/w/part_1.ply?X-Amz-Signature=abc.def"),
            Some(PointCloudFormat::Ply)
        );
        assert_eq!(PointCloudFormat::from_path("notes.txt"), None);
        assert_eq!(PointCloudFormat::from_path("https://host.example/dir.v2/file"), None);
    }

    #[test]
    fn test_decimation_count_and_correspondence() {
        for n in [1usize, 2, 3, 7, 10] {
            for v in [0usize, 1, 9, 10, 11, 99, 100, 101] {
                let input = line_cloud(v, true);
                let out = decimate(&input, stride(n));
                assert_eq!(out.len(), v.div_ceil(n), "V={} N={}", v, n);
                for (k, p) in out.positions.iter().enumerate() {
                    assert_eq!(*p, input.positions[k * n]);
                }
                let colors = out.colors.unwrap();
                assert_eq!(colors.len(), out.positions.len());
                for (k, c) in colors.iter().enumerate() {
                    assert_eq!(c[0], (k * n) as f32);
                }
            }
        }
    }

    #[test]
    fn test_decimation_without_colors() {
        let out = decimate(&line_cloud(25, false), stride(10));
        assert_eq!(out.len(), 3);
        assert!(out.colors.is_none());
    }

    #[test]
    fn test_decode_ascii_ply_with_colors() {
        let attrs = decode_ply(ASCII_PLY.as_bytes()).unwrap();
        assert_eq!(attrs.positions, vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let colors = attrs.colors.unwrap();
        assert_eq!(colors[0], [1.0, 0.0, 0.0]);
        assert_eq!(colors[2], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_decode_ply_without_colors() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nend_header\n1 1 1\n2 2 2\n";
        let attrs = decode_ply(ply.as_bytes()).unwrap();
        assert_eq!(attrs.len(), 2);
        assert!(attrs.colors.is_none());
    }

    #[test]
    fn test_decode_ply_sh_colors() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nproperty float f_dc_0\nproperty float f_dc_1\nproperty float f_dc_2\nend_header\n0 0 0 0 -100 100\n";
        let attrs = decode_ply(ply.as_bytes()).unwrap();
        let c = attrs.colors.unwrap()[0];
        assert!((c[0] - 0.5).abs() < 1e-4);
        assert_eq!(c[1], 0.0);
        assert_eq!(c[2], 1.0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(b"definitely not a point cloud", PointCloudFormat::Ply, &NoCompressed);
        assert!(err.is_err());
    }

    #[test]
    fn test_decode_rejects_empty_cloud() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 0\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        assert!(decode(ply.as_bytes(), PointCloudFormat::Ply, &NoCompressed).is_err());
    }

    #[test]
    fn test_compressed_path_uses_decoder() {
        let decoder = FixedCompressed(line_cloud(30, false));
        let asset = ingest("part.drc", b"DRACO", PointCloudFormat::Draco, stride(10), 0.01, &decoder).unwrap();
        assert_eq!(asset.point_count(), 3);
        assert_eq!(asset.format, PointCloudFormat::Draco);
    }

    #[test]
    fn test_compressed_color_mismatch_rejected() {
        let mut attrs = line_cloud(4, false);
        attrs.colors = Some(vec![[1.0; 3]; 3]);
        let decoder = FixedCompressed(attrs);
        assert!(matches!(
            decode(b"", PointCloudFormat::Draco, &decoder),
            Err(DecodeError::ColorCountMismatch { positions: 4, colors: 3 })
        ));
    }

    #[test]
    fn test_corrective_rotation_maps_axes() {
        let q = corrective_rotation();
        // Source Z-up data ends up Y-up.
        let x = q * glam::Vec3::X;
        let y = q * glam::Vec3::Y;
        let z = q * glam::Vec3::Z;
        assert!((x - glam::Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5);
        assert!((y - glam::Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((z - glam::Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_large_scenario_point_counts() {
        let decoder = FixedCompressed(line_cloud(1_000_000, false));
        let big = ingest("a.drc", b"", PointCloudFormat::Draco, stride(10), 0.01, &decoder).unwrap();
        let decoder = FixedCompressed(line_cloud(500_000, false));
        let small = ingest("b.drc", b"", PointCloudFormat::Draco, stride(10), 0.01, &decoder).unwrap();
        assert_eq!(big.point_count(), 100_000);
        assert_eq!(small.point_count(), 50_000);
        assert_eq!(big.rotation, corrective_rotation());
        assert_eq!(small.rotation, corrective_rotation());
    }
}
