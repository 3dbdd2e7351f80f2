//! Dataset enrollment: rebuild the encoding store from reference images.
//!
//! Each person folder contributes one encoding per usable image, taken
//! from the highest-confidence face in that image. Unreadable images and
//! images without a detectable face are logged and skipped so one bad
//! photo never sinks a whole re-encode.

use crate::dataset::{Dataset, DatasetError};
use crate::encodings::{EncodingData, EncodingStoreError};
use crate::pipeline::{FaceEncoder, FaceFinder};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Store(#[from] EncodingStoreError),
}

/// Per-run counters reported after an enrollment pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnrollReport {
    pub people: usize,
    pub encoded: usize,
    pub skipped: usize,
}

/// Walk every person folder and compute one encoding per usable image.
pub fn encode_dataset(
    dataset: &Dataset,
    finder: &mut dyn FaceFinder,
    encoder: &mut dyn FaceEncoder,
) -> Result<(EncodingData, EnrollReport), EnrollError> {
    let mut data = EncodingData::default();
    let mut report = EnrollReport::default();

    for person in dataset.list_people()? {
        report.people += 1;
        for image_path in dataset.person_images(&person)? {
            match encode_image(&image_path, finder, encoder) {
                Some(embedding) => {
                    data.encodings.push(embedding);
                    data.names.push(person.clone());
                    report.encoded += 1;
                }
                None => report.skipped += 1,
            }
        }
    }

    tracing::info!(
        people = report.people,
        encoded = report.encoded,
        skipped = report.skipped,
        "dataset enrollment finished"
    );
    Ok((data, report))
}

/// `encode_dataset` followed by an atomic rewrite of the store file.
pub fn rebuild_store(
    dataset: &Dataset,
    store_path: &Path,
    finder: &mut dyn FaceFinder,
    encoder: &mut dyn FaceEncoder,
) -> Result<EnrollReport, EnrollError> {
    let (data, report) = encode_dataset(dataset, finder, encoder)?;
    data.save(store_path)?;
    Ok(report)
}

/// Best-face encoding for one reference image, or `None` when the image
/// cannot contribute.
fn encode_image(
    path: &Path,
    finder: &mut dyn FaceFinder,
    encoder: &mut dyn FaceEncoder,
) -> Option<Vec<f32>> {
    let decoded = match image::open(path) {
        Ok(img) => img.to_rgb8(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "unreadable reference image");
            return None;
        }
    };
    let (width, height) = decoded.dimensions();
    let rgb = decoded.into_raw();

    let faces = match finder.find_faces(&rgb, width, height) {
        Ok(faces) => faces,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "detection failed on reference image");
            return None;
        }
    };

    let best = faces.into_iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let Some(face) = best else {
        tracing::warn!(path = %path.display(), "no face found in reference image");
        return None;
    };

    match encoder.encode_face(&rgb, width, height, &face) {
        Ok(embedding) => Some(embedding.values),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "encoding failed on reference image");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};

    type BoxedError = Box<dyn std::error::Error + Send + Sync>;

    /// Finder that reports faces only for frames brighter than a cutoff,
    /// so tests can stage images with and without a "face".
    struct BrightnessFinder;

    impl FaceFinder for BrightnessFinder {
        fn find_faces(
            &mut self,
            rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<BoundingBox>, BoxedError> {
            let mean = rgb.iter().map(|&p| p as u32).sum::<u32>() / rgb.len().max(1) as u32;
            if mean < 16 {
                return Ok(Vec::new());
            }
            Ok(vec![
                BoundingBox { x: 0.0, y: 0.0, width: 2.0, height: 2.0, confidence: 0.3, landmarks: None },
                BoundingBox { x: 1.0, y: 1.0, width: 2.0, height: 2.0, confidence: 0.9, landmarks: None },
            ])
        }
    }

    /// Encoder whose output embeds the face confidence, proving the
    /// highest-confidence detection was picked.
    struct ConfidenceEncoder;

    impl FaceEncoder for ConfidenceEncoder {
        fn encode_face(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
            face: &BoundingBox,
        ) -> Result<Embedding, BoxedError> {
            Ok(Embedding { values: vec![face.confidence] })
        }
    }

    fn write_image(dataset: &Dataset, person: &str, luma: u8) {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([luma, luma, luma]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        dataset.save_image(&buf.into_inner(), person).unwrap();
    }

    #[test]
    fn test_encode_dataset_one_encoding_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::new(dir.path());
        write_image(&dataset, "Alice", 200);
        write_image(&dataset, "Alice", 200);
        write_image(&dataset, "Bob", 200);

        let (data, report) =
            encode_dataset(&dataset, &mut BrightnessFinder, &mut ConfidenceEncoder).unwrap();

        assert_eq!(report.people, 2);
        assert_eq!(report.encoded, 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(data.names, vec!["Alice", "Alice", "Bob"]);
        assert_eq!(data.encodings.len(), 3);
    }

    #[test]
    fn test_highest_confidence_face_wins() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::new(dir.path());
        write_image(&dataset, "Alice", 200);

        let (data, _) =
            encode_dataset(&dataset, &mut BrightnessFinder, &mut ConfidenceEncoder).unwrap();
        assert_eq!(data.encodings[0], vec![0.9]);
    }

    #[test]
    fn test_faceless_image_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::new(dir.path());
        write_image(&dataset, "Alice", 200);
        write_image(&dataset, "Alice", 0); // too dark, no face

        let (data, report) =
            encode_dataset(&dataset, &mut BrightnessFinder, &mut ConfidenceEncoder).unwrap();
        assert_eq!(report.encoded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_corrupt_image_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::new(dir.path());
        write_image(&dataset, "Alice", 200);
        std::fs::create_dir_all(dir.path().join("Bob")).unwrap();
        std::fs::write(dir.path().join("Bob/broken.jpg"), b"not a jpeg").unwrap();

        let (data, report) =
            encode_dataset(&dataset, &mut BrightnessFinder, &mut ConfidenceEncoder).unwrap();
        assert_eq!(report.encoded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(data.names, vec!["Alice"]);
    }

    #[test]
    fn test_rebuild_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::new(dir.path().join("dataset"));
        write_image(&dataset, "Alice", 200);

        let store_path = dir.path().join("encodings.json");
        let report = rebuild_store(
            &dataset,
            &store_path,
            &mut BrightnessFinder,
            &mut ConfidenceEncoder,
        )
        .unwrap();

        assert_eq!(report.encoded, 1);
        let loaded = EncodingData::load(&store_path).unwrap();
        assert_eq!(loaded.names, vec!["Alice"]);
    }

    #[test]
    fn test_empty_dataset_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::new(dir.path().join("dataset"));
        let (data, report) =
            encode_dataset(&dataset, &mut BrightnessFinder, &mut ConfidenceEncoder).unwrap();
        assert!(data.is_empty());
        assert_eq!(report.people, 0);
    }
}
