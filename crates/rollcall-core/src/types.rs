use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Scale all coordinates (and landmarks) by a uniform factor.
    ///
    /// Used to map detections made on a downsampled frame back to
    /// full-resolution coordinates.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }
}

/// Face embedding vector (512-dimensional ArcFace, L2-normalized).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Euclidean distance between two embeddings.
    ///
    /// This is the match metric: for L2-normalized vectors it is a
    /// monotone transform of cosine similarity.
    pub fn euclidean_distance(&self, other: &[f32]) -> f32 {
        self.values
            .iter()
            .zip(other.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &[f32]) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding { values: vec![1.0, 0.0, 0.0] };
        assert!(a.euclidean_distance(&[1.0, 0.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_unit_apart() {
        let a = Embedding { values: vec![0.0, 0.0] };
        assert!((a.euclidean_distance(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_orthogonal() {
        let a = Embedding { values: vec![1.0, 0.0] };
        assert!(a.similarity(&[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0] };
        assert_eq!(a.similarity(&[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_bbox_scaled_doubles_coords() {
        let b = BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
            confidence: 0.9,
            landmarks: Some([(1.0, 2.0); 5]),
        };
        let s = b.scaled(2.0);
        assert_eq!(s.x, 20.0);
        assert_eq!(s.y, 40.0);
        assert_eq!(s.width, 60.0);
        assert_eq!(s.height, 80.0);
        assert_eq!(s.confidence, 0.9);
        assert_eq!(s.landmarks.unwrap()[0], (2.0, 4.0));
    }
}
