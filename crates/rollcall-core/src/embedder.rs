//! ArcFace face embedder via ONNX Runtime.
//!
//! Works from a square crop around the detected box rather than a
//! landmark-aligned warp: the reference images are enrolled through the
//! same crop path, so probe and gallery embeddings stay comparable.

use crate::imageops;
use crate::types::{BoundingBox, Embedding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBEDDER_INPUT_SIZE: usize = 112;
const EMBEDDER_MEAN: f32 = 127.5;
const EMBEDDER_STD: f32 = 127.5;
pub const EMBEDDING_DIM: usize = 512;
/// Extra context kept around the tight detection box.
const CROP_MARGIN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedder model not found: {0} — download w600k_r50.onnx from insightface")]
    ModelNotFound(String),
    #[error("embedder inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box is degenerate: {width}x{height}")]
    DegenerateBox { width: f32, height: f32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based embedding extractor.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the embedding model from `model_path`.
    pub fn load(model_path: &Path) -> Result<FaceEmbedder, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "face embedder loaded");
        Ok(FaceEmbedder { session })
    }

    /// Extract an L2-normalized embedding for one detected face in a
    /// packed RGB frame.
    pub fn embed(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, EmbedderError> {
        let tensor = crop_tensor(rgb, width, height, face)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding { values: l2_normalize(raw) })
    }
}

/// Cut a margin-expanded square around the face and resample it to the
/// model input as a normalized NCHW tensor. Sampling clamps at the frame
/// edges, so partially out-of-frame boxes are still usable.
fn crop_tensor(
    rgb: &[u8],
    width: u32,
    height: u32,
    face: &BoundingBox,
) -> Result<Array4<f32>, EmbedderError> {
    if face.width <= 1.0 || face.height <= 1.0 {
        return Err(EmbedderError::DegenerateBox {
            width: face.width,
            height: face.height,
        });
    }

    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;
    let side = face.width.max(face.height) * (1.0 + CROP_MARGIN);
    let half = side / 2.0;

    let size = EMBEDDER_INPUT_SIZE;
    let step = side / size as f32;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        let src_y = cy - half + (y as f32 + 0.5) * step;
        for x in 0..size {
            let src_x = cx - half + (x as f32 + 0.5) * step;
            for c in 0..3 {
                let v = imageops::sample_bilinear(rgb, width, height, src_x, src_y, c);
                tensor[[0, c, y, x]] = (v - EMBEDDER_MEAN) / EMBEDDER_STD;
            }
        }
    }

    Ok(tensor)
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_crop_tensor_shape_and_normalization() {
        // Uniform mid-gray frame: every tensor value sits at the mean.
        let rgb = vec![128u8; 200 * 200 * 3];
        let tensor = crop_tensor(&rgb, 200, 200, &face(50.0, 50.0, 100.0, 100.0)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
        let expected = (128.0 - EMBEDDER_MEAN) / EMBEDDER_STD;
        assert!((tensor[[0, 0, 56, 56]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_crop_tensor_channels_follow_source() {
        // Pure red frame: channel 0 high, channels 1/2 low.
        let mut rgb = vec![0u8; 100 * 100 * 3];
        for px in rgb.chunks_exact_mut(3) {
            px[0] = 255;
        }
        let tensor = crop_tensor(&rgb, 100, 100, &face(20.0, 20.0, 60.0, 60.0)).unwrap();
        assert!(tensor[[0, 0, 56, 56]] > 0.9);
        assert!(tensor[[0, 1, 56, 56]] < -0.9);
        assert!(tensor[[0, 2, 56, 56]] < -0.9);
    }

    #[test]
    fn test_crop_tensor_rejects_degenerate_box() {
        let rgb = vec![0u8; 100 * 100 * 3];
        assert!(matches!(
            crop_tensor(&rgb, 100, 100, &face(10.0, 10.0, 0.5, 40.0)),
            Err(EmbedderError::DegenerateBox { .. })
        ));
    }

    #[test]
    fn test_crop_tensor_handles_edge_overhang() {
        // Box partially outside the frame must clamp, not panic.
        let rgb = vec![90u8; 50 * 50 * 3];
        let tensor = crop_tensor(&rgb, 50, 50, &face(-10.0, -10.0, 40.0, 40.0)).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let out = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((out[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
