//! SCRFD face detector via ONNX Runtime, on packed RGB frames.
//!
//! The det_10g model is anchor-free over strides 8/16/32, two anchors per
//! cell, with the standard nine-output export ordering (scores, then box
//! offsets, then landmark offsets, per stride). Frames are resized to the
//! 640x640 input with the aspect ratio preserved and the remainder padded
//! at the right/bottom edge, so mapping back to frame coordinates is a
//! single division by the scale.

use crate::imageops;
use crate::types::BoundingBox;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_SIZE: usize = 640;
const DETECTOR_MEAN: f32 = 127.5;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DETECTOR_NMS_IOU: f32 = 0.4;
const DETECTOR_STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
/// scores[0..3], boxes[3..6], landmarks[6..9] in the standard export.
const OUTPUTS_PER_KIND: usize = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0} — download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("detector inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    /// Load the detection model from `model_path`.
    pub fn load(model_path: &Path) -> Result<FaceDetector, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        if num_outputs < DETECTOR_STRIDES.len() * OUTPUTS_PER_KIND {
            return Err(DetectorError::InferenceFailed(format!(
                "detection model must expose 9 outputs, got {num_outputs}"
            )));
        }

        tracing::info!(path = %model_path.display(), outputs = num_outputs, "face detector loaded");
        Ok(FaceDetector { session })
    }

    /// Detect faces in a packed RGB frame; results are sorted by
    /// confidence, highest first, in frame coordinates.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, DetectorError> {
        if rgb.len() < (width * height * 3) as usize || width == 0 || height == 0 {
            return Err(DetectorError::InferenceFailed(format!(
                "frame buffer too short for {width}x{height}"
            )));
        }

        let (tensor, scale) = preprocess(rgb, width, height);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

        let mut detections = Vec::new();
        for (level, &stride) in DETECTOR_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[level]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[level + OUTPUTS_PER_KIND]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;
            let (_, landmarks) = outputs[level + 2 * OUTPUTS_PER_KIND]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    DetectorError::InferenceFailed(format!("landmarks stride {stride}: {e}"))
                })?;

            decode_stride(scores, boxes, landmarks, stride, scale, &mut detections);
        }

        let mut kept = nms(detections, DETECTOR_NMS_IOU);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }
}

/// Resize into the square model input, padding right/bottom with the
/// mean value. Returns the tensor and the frame-to-input scale.
fn preprocess(rgb: &[u8], width: u32, height: u32) -> (Array4<f32>, f32) {
    let input = DETECTOR_INPUT_SIZE as f32;
    let scale = (input / width as f32).min(input / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, DETECTOR_INPUT_SIZE as u32);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, DETECTOR_INPUT_SIZE as u32);

    let resized = imageops::resize_rgb(rgb, width, height, new_w, new_h);

    let mut tensor = Array4::<f32>::from_elem(
        (1, 3, DETECTOR_INPUT_SIZE, DETECTOR_INPUT_SIZE),
        0.0, // padded area stays at the normalized mean
    );
    for y in 0..new_h as usize {
        for x in 0..new_w as usize {
            let off = (y * new_w as usize + x) * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (resized[off + c] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
            }
        }
    }

    (tensor, scale)
}

/// Decode one stride level into frame-coordinate detections.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    landmarks: &[f32],
    stride: usize,
    scale: f32,
    out: &mut Vec<BoundingBox>,
) {
    let grid = DETECTOR_INPUT_SIZE / stride;
    let anchors = grid * grid * ANCHORS_PER_CELL;

    for idx in 0..anchors {
        let Some(&score) = scores.get(idx) else { break };
        if score <= DETECTOR_CONFIDENCE_THRESHOLD {
            continue;
        }

        let cell = idx / ANCHORS_PER_CELL;
        let (cx, cy) = anchor_center(cell, grid, stride);

        let b = idx * 4;
        if b + 3 >= boxes.len() {
            break;
        }
        // Distance offsets (left, top, right, bottom) in stride units.
        let x1 = cx - boxes[b] * stride as f32;
        let y1 = cy - boxes[b + 1] * stride as f32;
        let x2 = cx + boxes[b + 2] * stride as f32;
        let y2 = cy + boxes[b + 3] * stride as f32;

        let k = idx * 10;
        let lms = if k + 9 < landmarks.len() {
            let mut pts = [(0.0f32, 0.0f32); 5];
            for (p, pt) in pts.iter_mut().enumerate() {
                *pt = (
                    (cx + landmarks[k + p * 2] * stride as f32) / scale,
                    (cy + landmarks[k + p * 2 + 1] * stride as f32) / scale,
                );
            }
            Some(pts)
        } else {
            None
        };

        out.push(BoundingBox {
            x: x1 / scale,
            y: y1 / scale,
            width: (x2 - x1) / scale,
            height: (y2 - y1) / scale,
            confidence: score,
            landmarks: lms,
        });
    }
}

/// Center of an anchor cell in model-input pixels.
fn anchor_center(cell: usize, grid: usize, stride: usize) -> (f32, f32) {
    let cx = (cell % grid) * stride;
    let cy = (cell / grid) * stride;
    (cx as f32, cy as f32)
}

/// Greedy NMS: walk detections by descending confidence, keep a box only
/// if it does not overlap an already-kept box past the IoU threshold.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in detections {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
