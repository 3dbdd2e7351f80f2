//! Recognition engine thread.
//!
//! Camera capture and ONNX inference are blocking, so they live on a
//! dedicated OS thread. D-Bus handlers talk to it through a small
//! request channel: start and stop a recognition session, or ask for a
//! status snapshot. While a session runs, the thread alternates between
//! draining requests and pumping frames through the processor.

use crate::config::Config;
use rollcall_core::detector::FaceDetector;
use rollcall_core::embedder::FaceEmbedder;
use rollcall_core::pipeline::FaceLabel;
use rollcall_core::{AttendanceLog, EncodingStore, FrameProcessor};
use rollcall_hw::{draw, Camera};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] rollcall_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] rollcall_core::detector::DetectorError),
    #[error("embedder error: {0}")]
    Embedder(#[from] rollcall_core::embedder::EmbedderError),
    #[error("a recognition session is already running")]
    AlreadyRunning,
    #[error("no recognition session is running")]
    NotRunning,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Snapshot of the engine state for the Status call.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub running: bool,
    pub frames_seen: u64,
    pub marks: u64,
    pub known_encodings: usize,
}

enum EngineRequest {
    Start { reply: oneshot::Sender<Result<(), EngineError>> },
    Stop { reply: oneshot::Sender<Result<(), EngineError>> },
    Status { reply: oneshot::Sender<SessionStatus> },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub async fn start_session(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Start { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn stop_session(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Stop { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<SessionStatus, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

struct Engine {
    camera: Camera,
    processor: FrameProcessor,
    store: EncodingStore,
    preview_path: Option<PathBuf>,
    running: bool,
    marks: u64,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera and loads both ONNX models up front so a broken
/// setup fails at startup, not at the first punch of the day.
pub fn spawn_engine(
    config: &Config,
    store: EncodingStore,
    log: AttendanceLog,
) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );

    let detector = FaceDetector::load(&config.paths.detector_model())?;
    let embedder = FaceEmbedder::load(&config.paths.embedder_model())?;

    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        for _ in 0..config.warmup_frames {
            let _ = camera.capture_frame();
        }
    }

    let processor = FrameProcessor::new(
        config.processor_settings(),
        Box::new(detector),
        Box::new(embedder),
        store.clone(),
        log,
    );

    let mut engine = Engine {
        camera,
        processor,
        store,
        preview_path: config.preview_path.clone(),
        running: false,
        marks: 0,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            loop {
                if engine.running {
                    // Drain any pending control messages, then pump one frame.
                    loop {
                        match rx.try_recv() {
                            Ok(req) => engine.handle(req),
                            Err(mpsc::error::TryRecvError::Empty) => break,
                            Err(mpsc::error::TryRecvError::Disconnected) => {
                                tracing::info!("engine thread exiting");
                                return;
                            }
                        }
                    }
                    if engine.running {
                        engine.pump_frame();
                    }
                } else {
                    match rx.blocking_recv() {
                        Some(req) => engine.handle(req),
                        None => {
                            tracing::info!("engine thread exiting");
                            return;
                        }
                    }
                }
            }
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

impl Engine {
    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Start { reply } => {
                let result = if self.running {
                    Err(EngineError::AlreadyRunning)
                } else {
                    tracing::info!("recognition session started");
                    self.running = true;
                    Ok(())
                };
                let _ = reply.send(result);
            }
            EngineRequest::Stop { reply } => {
                let result = if self.running {
                    tracing::info!(marks = self.marks, "recognition session stopped");
                    self.running = false;
                    Ok(())
                } else {
                    Err(EngineError::NotRunning)
                };
                let _ = reply.send(result);
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(SessionStatus {
                    running: self.running,
                    frames_seen: self.processor.frames_seen(),
                    marks: self.marks,
                    known_encodings: self.store.len(),
                });
            }
        }
    }

    fn pump_frame(&mut self) {
        let mut frame = match self.camera.capture_frame() {
            Ok(f) => f,
            Err(err) => {
                tracing::warn!(error = %err, "frame capture failed, backing off");
                std::thread::sleep(std::time::Duration::from_millis(200));
                return;
            }
        };

        let labels =
            self.processor
                .process(&frame.data, frame.width, frame.height, Instant::now());
        self.marks += labels.iter().filter(|l| l.marked.is_some()).count() as u64;

        if let Some(path) = self.preview_path.clone() {
            annotate(&mut frame.data, frame.width, frame.height, &labels);
            if let Err(err) = write_preview(&path, &frame.data, frame.width, frame.height) {
                tracing::warn!(error = %err, path = %path.display(), "preview write failed");
            }
        }
    }
}

/// Draw recognition results into the frame: green boxes and names for
/// known faces, red boxes for unknowns.
fn annotate(rgb: &mut [u8], width: u32, height: u32, labels: &[FaceLabel]) {
    for label in labels {
        let b = &label.bbox;
        let color = if label.name.is_some() { draw::GREEN } else { draw::RED };
        draw_boxed_label(rgb, width, height, b.x as i32, b.y as i32, b.width as u32, b.height as u32, label, color);
    }
}

fn draw_boxed_label(
    rgb: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    w: u32,
    h: u32,
    label: &FaceLabel,
    color: [u8; 3],
) {
    draw::draw_box(rgb, width, height, x, y, w, h, color);

    let text = match (&label.name, &label.marked) {
        (Some(name), Some(status)) => format!("{name}: {status}"),
        (Some(name), None) => name.clone(),
        (None, _) => "UNKNOWN".to_string(),
    };
    let text_y = y - draw::label_height() as i32 - 4;
    draw::draw_label(rgb, width, height, x, text_y.max(0), &text, color);
}

/// Write the preview JPEG through a temp file so readers never see a
/// half-written image.
fn write_preview(path: &Path, rgb: &[u8], width: u32, height: u32) -> anyhow::Result<()> {
    let img = image::RgbImage::from_raw(width, height, rgb.to_vec())
        .ok_or_else(|| anyhow::anyhow!("frame buffer does not match dimensions"))?;
    let tmp = path.with_extension("jpg.tmp");
    img.save_with_format(&tmp, image::ImageFormat::Jpeg)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::types::BoundingBox;

    fn label(name: Option<&str>) -> FaceLabel {
        FaceLabel {
            bbox: BoundingBox {
                x: 20.0,
                y: 30.0,
                width: 40.0,
                height: 40.0,
                confidence: 0.9,
                landmarks: None,
            },
            name: name.map(str::to_string),
            marked: None,
        }
    }

    #[test]
    fn test_annotate_known_face_paints_green() {
        let mut rgb = vec![0u8; 128 * 128 * 3];
        annotate(&mut rgb, 128, 128, &[label(Some("Alice"))]);
        let off = ((30 * 128 + 20) * 3) as usize;
        assert_eq!(&rgb[off..off + 3], &draw::GREEN);
    }

    #[test]
    fn test_annotate_unknown_face_paints_red() {
        let mut rgb = vec![0u8; 128 * 128 * 3];
        annotate(&mut rgb, 128, 128, &[label(None)]);
        let off = ((30 * 128 + 20) * 3) as usize;
        assert_eq!(&rgb[off..off + 3], &draw::RED);
    }

    #[test]
    fn test_write_preview_creates_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let rgb = vec![90u8; 32 * 24 * 3];

        write_preview(&path, &rgb, 32, 24).unwrap();
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
        // No temp file left behind.
        assert!(!path.with_extension("jpg.tmp").exists());
    }

    #[test]
    fn test_write_preview_rejects_bad_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        assert!(write_preview(&path, &[0u8; 10], 32, 24).is_err());
    }
}
