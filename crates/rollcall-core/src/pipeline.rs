//! Per-frame recognition pipeline.
//!
//! The processor owns the sampling cadence, downsampling, size filter,
//! matching, the optional liveness gate, and the per-person marking
//! cooldown. Detection and embedding sit behind trait objects so the
//! pipeline logic is testable without ONNX models or a camera.

use crate::encodings::EncodingStore;
use crate::imageops;
use crate::ledger::{AttendanceLog, PunchStatus};
use crate::liveness::LivenessGate;
use crate::matcher::{identify, MatchStrategy};
use crate::types::{BoundingBox, Embedding};
use std::collections::HashMap;
use std::time::{Duration, Instant};

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Face detection stage. Returns boxes in the coordinates of the frame
/// it was given.
pub trait FaceFinder: Send {
    fn find_faces(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, BoxedError>;
}

/// Embedding extraction stage for one detected face.
pub trait FaceEncoder: Send {
    fn encode_face(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, BoxedError>;
}

impl FaceFinder for crate::detector::FaceDetector {
    fn find_faces(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<BoundingBox>, BoxedError> {
        Ok(self.detect(rgb, width, height)?)
    }
}

impl FaceEncoder for crate::embedder::FaceEmbedder {
    fn encode_face(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, BoxedError> {
        Ok(self.embed(rgb, width, height, face)?)
    }
}

/// Tunables for the frame processor. Defaults follow the values the
/// system was calibrated with on a 640x480 feed.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Run recognition on every Nth frame; others reuse the last labels.
    pub every_nth: u32,
    /// Integer downsampling factor applied before detection.
    pub downsample: u32,
    /// Minimum face width and height, in full-resolution pixels.
    pub min_face_size: u32,
    /// Minimum gap between two ledger marks for the same person.
    pub cooldown: Duration,
    /// Match distance tolerance.
    pub tolerance: f32,
    pub strategy: MatchStrategy,
    /// Liveness displacement threshold; `None` disables the gate.
    pub liveness: Option<f32>,
}

impl Default for ProcessorSettings {
    fn default() -> ProcessorSettings {
        ProcessorSettings {
            every_nth: 5,
            downsample: 2,
            min_face_size: 100,
            cooldown: Duration::from_secs(60),
            tolerance: 1.1,
            strategy: MatchStrategy::default(),
            liveness: None,
        }
    }
}

/// One annotated face in full-resolution frame coordinates.
#[derive(Debug, Clone)]
pub struct FaceLabel {
    pub bbox: BoundingBox,
    /// Recognized name, `None` for an unknown face.
    pub name: Option<String>,
    /// Status just written to the ledger, if this frame marked one.
    pub marked: Option<PunchStatus>,
}

/// Stateful recognition loop driver. One instance per camera session.
pub struct FrameProcessor {
    settings: ProcessorSettings,
    finder: Box<dyn FaceFinder>,
    encoder: Box<dyn FaceEncoder>,
    store: EncodingStore,
    log: AttendanceLog,
    frame_count: u64,
    last_marked: HashMap<String, Instant>,
    gates: HashMap<String, LivenessGate>,
    last_labels: Vec<FaceLabel>,
}

impl FrameProcessor {
    pub fn new(
        settings: ProcessorSettings,
        finder: Box<dyn FaceFinder>,
        encoder: Box<dyn FaceEncoder>,
        store: EncodingStore,
        log: AttendanceLog,
    ) -> FrameProcessor {
        FrameProcessor {
            settings,
            finder,
            encoder,
            store,
            log,
            frame_count: 0,
            last_marked: HashMap::new(),
            gates: HashMap::new(),
            last_labels: Vec::new(),
        }
    }

    /// Process one full-resolution RGB frame.
    ///
    /// Frames off the sampling cadence return the previous labels so the
    /// caller can keep annotating the preview without recognition cost.
    /// Stage failures are logged and degrade to fewer labels, never a
    /// crashed session.
    pub fn process(&mut self, rgb: &[u8], width: u32, height: u32, now: Instant) -> Vec<FaceLabel> {
        self.frame_count += 1;
        if (self.frame_count - 1) % self.settings.every_nth as u64 != 0 {
            return self.last_labels.clone();
        }

        let factor = self.settings.downsample.max(1);
        let (small, small_w, small_h) = imageops::downsample_rgb(rgb, width, height, factor);

        let detections = match self.finder.find_faces(&small, small_w, small_h) {
            Ok(faces) => faces,
            Err(err) => {
                tracing::warn!(error = %err, "face detection failed, skipping frame");
                return self.last_labels.clone();
            }
        };

        let snapshot = self.store.snapshot();
        let mut labels = Vec::new();

        for detection in &detections {
            let face = detection.scaled(factor as f32);
            if (face.width as u32) < self.settings.min_face_size
                || (face.height as u32) < self.settings.min_face_size
            {
                continue;
            }

            let embedding = match self.encoder.encode_face(rgb, width, height, &face) {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(error = %err, "face encoding failed, skipping face");
                    continue;
                }
            };

            let id = identify(&embedding, &snapshot, self.settings.tolerance, self.settings.strategy);
            let mut label = FaceLabel { bbox: face.clone(), name: id.name.clone(), marked: None };

            if let Some(name) = id.name {
                tracing::debug!(
                    name = %name,
                    distance = id.distance,
                    votes = id.votes,
                    "face recognized"
                );
                if self.passes_liveness(&name, &face) && self.cooldown_elapsed(&name, now) {
                    match self.log.mark(&name) {
                        Ok(status) => {
                            self.last_marked.insert(name, now);
                            label.marked = Some(status);
                        }
                        Err(err) => {
                            tracing::warn!(name = %name, error = %err, "ledger mark failed");
                        }
                    }
                }
            }

            labels.push(label);
        }

        self.last_labels = labels.clone();
        labels
    }

    fn cooldown_elapsed(&self, name: &str, now: Instant) -> bool {
        match self.last_marked.get(name) {
            Some(last) => now.duration_since(*last) >= self.settings.cooldown,
            None => true,
        }
    }

    fn passes_liveness(&mut self, name: &str, face: &BoundingBox) -> bool {
        let Some(threshold) = self.settings.liveness else {
            return true;
        };
        let gate = self
            .gates
            .entry(name.to_string())
            .or_insert_with(|| LivenessGate::new(threshold));
        let live = match &face.landmarks {
            Some(lms) => gate.observe(lms),
            None => gate.observe_without_landmarks(),
        };
        if !live {
            tracing::warn!(
                name = %name,
                displacement = gate.mean_displacement(),
                "liveness gate held back a static-looking face"
            );
        }
        live
    }

    pub fn frames_seen(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodings::EncodingData;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeFinder {
        faces: Vec<BoundingBox>,
        calls: Arc<AtomicUsize>,
    }

    impl FaceFinder for FakeFinder {
        fn find_faces(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<BoundingBox>, BoxedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.faces.clone())
        }
    }

    struct FailingFinder;

    impl FaceFinder for FailingFinder {
        fn find_faces(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
        ) -> Result<Vec<BoundingBox>, BoxedError> {
            Err("camera gremlins".into())
        }
    }

    struct FakeEncoder {
        embedding: Vec<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl FaceEncoder for FakeEncoder {
        fn encode_face(
            &mut self,
            _rgb: &[u8],
            _width: u32,
            _height: u32,
            _face: &BoundingBox,
        ) -> Result<Embedding, BoxedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Embedding { values: self.embedding.clone() })
        }
    }

    fn face(size: f32) -> BoundingBox {
        face_with_landmarks(size, None)
    }

    fn face_with_landmarks(size: f32, landmarks: Option<[(f32, f32); 5]>) -> BoundingBox {
        // Detection-space box; the processor scales it by the
        // downsample factor before filtering.
        BoundingBox { x: 10.0, y: 10.0, width: size, height: size, confidence: 0.9, landmarks }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        finder_calls: Arc<AtomicUsize>,
        encoder_calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn processor(
            &self,
            settings: ProcessorSettings,
            faces: Vec<BoundingBox>,
            embedding: Vec<f32>,
            known: &[(&str, Vec<f32>)],
        ) -> FrameProcessor {
            let enc_path = self.dir.path().join("encodings.json");
            EncodingData {
                encodings: known.iter().map(|(_, e)| e.clone()).collect(),
                names: known.iter().map(|(n, _)| n.to_string()).collect(),
            }
            .save(&enc_path)
            .unwrap();

            FrameProcessor::new(
                settings,
                Box::new(FakeFinder { faces, calls: Arc::clone(&self.finder_calls) }),
                Box::new(FakeEncoder { embedding, calls: Arc::clone(&self.encoder_calls) }),
                EncodingStore::open(enc_path).unwrap(),
                AttendanceLog::new(self.dir.path().join("attendance_log.csv")),
            )
        }

        fn ledger_rows(&self) -> Vec<crate::ledger::AttendanceRecord> {
            AttendanceLog::new(self.dir.path().join("attendance_log.csv"))
                .read_all()
                .unwrap()
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            finder_calls: Arc::new(AtomicUsize::new(0)),
            encoder_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn frame() -> Vec<u8> {
        vec![0u8; 640 * 480 * 3]
    }

    fn settings() -> ProcessorSettings {
        ProcessorSettings { downsample: 1, ..ProcessorSettings::default() }
    }

    #[test]
    fn test_detection_runs_on_every_nth_frame() {
        let fx = fixture();
        let mut proc = fx.processor(settings(), vec![], vec![1.0, 0.0], &[]);

        let now = Instant::now();
        for _ in 0..10 {
            proc.process(&frame(), 640, 480, now);
        }
        // Frames 1 and 6 with every_nth = 5.
        assert_eq!(fx.finder_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_skipped_frames_reuse_last_labels() {
        let fx = fixture();
        let mut proc = fx.processor(settings(), vec![face(200.0)], vec![1.0, 0.0], &[]);

        let now = Instant::now();
        let first = proc.process(&frame(), 640, 480, now);
        let skipped = proc.process(&frame(), 640, 480, now);
        assert_eq!(first.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(fx.finder_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_small_faces_are_not_encoded() {
        let fx = fixture();
        let mut proc = fx.processor(settings(), vec![face(50.0)], vec![1.0, 0.0], &[]);

        let labels = proc.process(&frame(), 640, 480, Instant::now());
        assert!(labels.is_empty());
        assert_eq!(fx.encoder_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_downsampled_detection_scales_back_before_filter() {
        let fx = fixture();
        let settings = ProcessorSettings { downsample: 2, ..ProcessorSettings::default() };
        // 60 px in detection space is 120 px full-res: passes the filter.
        let mut proc = fx.processor(settings, vec![face(60.0)], vec![1.0, 0.0], &[]);

        let labels = proc.process(&frame(), 640, 480, Instant::now());
        assert_eq!(labels.len(), 1);
        assert!((labels[0].bbox.width - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_unknown_face_is_labeled_but_never_marked() {
        let fx = fixture();
        let mut proc = fx.processor(
            settings(),
            vec![face(200.0)],
            vec![1.0, 0.0],
            &[("alice", vec![-1.0, 0.0])],
        );

        let labels = proc.process(&frame(), 640, 480, Instant::now());
        assert_eq!(labels.len(), 1);
        assert!(labels[0].name.is_none());
        assert!(fx.ledger_rows().is_empty());
    }

    #[test]
    fn test_recognized_face_marks_once_within_cooldown() {
        let fx = fixture();
        let mut proc = fx.processor(
            settings(),
            vec![face(200.0)],
            vec![1.0, 0.0],
            &[("alice", vec![1.0, 0.0])],
        );

        let now = Instant::now();
        let first = proc.process(&frame(), 640, 480, now);
        assert_eq!(first[0].name.as_deref(), Some("alice"));
        assert_eq!(first[0].marked, Some(PunchStatus::PunchIn));

        // Advance to the next sampled frame, still inside the cooldown.
        for _ in 0..5 {
            proc.process(&frame(), 640, 480, now + Duration::from_secs(5));
        }

        let rows = fx.ledger_rows();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_mark_resumes_after_cooldown() {
        let fx = fixture();
        let mut proc = fx.processor(
            settings(),
            vec![face(200.0)],
            vec![1.0, 0.0],
            &[("alice", vec![1.0, 0.0])],
        );

        let now = Instant::now();
        proc.process(&frame(), 640, 480, now);
        for _ in 0..5 {
            proc.process(&frame(), 640, 480, now + Duration::from_secs(61));
        }

        let rows = fx.ledger_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, PunchStatus::PunchIn);
        assert_eq!(rows[1].status, PunchStatus::PunchOut);
    }

    #[test]
    fn test_detector_failure_degrades_to_cached_labels() {
        let fx = fixture();
        let enc_path = fx.dir.path().join("encodings.json");
        EncodingData::default().save(&enc_path).unwrap();
        let mut proc = FrameProcessor::new(
            settings(),
            Box::new(FailingFinder),
            Box::new(FakeEncoder { embedding: vec![1.0], calls: Arc::clone(&fx.encoder_calls) }),
            EncodingStore::open(enc_path).unwrap(),
            AttendanceLog::new(fx.dir.path().join("attendance_log.csv")),
        );

        let labels = proc.process(&frame(), 640, 480, Instant::now());
        assert!(labels.is_empty());
        assert_eq!(proc.frames_seen(), 1);
    }

    #[test]
    fn test_static_landmarks_block_marking_when_liveness_enabled() {
        let fx = fixture();
        let settings = ProcessorSettings {
            downsample: 1,
            every_nth: 1,
            liveness: Some(0.8),
            ..ProcessorSettings::default()
        };
        let lm = Some([(20.0, 20.0), (60.0, 20.0), (40.0, 40.0), (25.0, 60.0), (55.0, 60.0)]);
        let mut proc = fx.processor(
            settings,
            vec![face_with_landmarks(200.0, lm)],
            vec![1.0, 0.0],
            &[("alice", vec![1.0, 0.0])],
        );

        let now = Instant::now();
        // First frame has no history yet and may mark; identical
        // landmarks afterwards must not produce further marks.
        for i in 0..6 {
            proc.process(&frame(), 640, 480, now + Duration::from_secs(i * 120));
        }
        assert!(fx.ledger_rows().len() <= 1);
    }

    #[test]
    fn test_moving_landmarks_pass_liveness() {
        let fx = fixture();
        let settings = ProcessorSettings {
            downsample: 1,
            every_nth: 1,
            liveness: Some(0.8),
            ..ProcessorSettings::default()
        };
        let enc_path = fx.dir.path().join("encodings.json");
        EncodingData {
            encodings: vec![vec![1.0, 0.0]],
            names: vec!["alice".into()],
        }
        .save(&enc_path)
        .unwrap();

        struct JitterFinder {
            tick: f32,
        }
        impl FaceFinder for JitterFinder {
            fn find_faces(
                &mut self,
                _rgb: &[u8],
                _w: u32,
                _h: u32,
            ) -> Result<Vec<BoundingBox>, BoxedError> {
                self.tick += 2.0;
                let t = self.tick;
                Ok(vec![BoundingBox {
                    x: 10.0,
                    y: 10.0,
                    width: 200.0,
                    height: 200.0,
                    confidence: 0.9,
                    landmarks: Some([
                        (20.0 + t, 20.0),
                        (60.0 + t, 20.0),
                        (40.0, 40.0),
                        (25.0, 60.0),
                        (55.0, 60.0),
                    ]),
                }])
            }
        }

        let mut proc = FrameProcessor::new(
            settings,
            Box::new(JitterFinder { tick: 0.0 }),
            Box::new(FakeEncoder { embedding: vec![1.0, 0.0], calls: Arc::clone(&fx.encoder_calls) }),
            EncodingStore::open(enc_path).unwrap(),
            AttendanceLog::new(fx.dir.path().join("attendance_log.csv")),
        );

        let now = Instant::now();
        proc.process(&frame(), 640, 480, now);
        proc.process(&frame(), 640, 480, now + Duration::from_secs(120));
        assert_eq!(fx.ledger_rows().len(), 2);
    }
}
