//! rollcall-core — face-recognition attendance engine.
//!
//! Detection (SCRFD) and embedding extraction (ArcFace) run via ONNX
//! Runtime; recognized identities are toggled through a Punch In /
//! Punch Out ledger with per-person cooldown, and the ledger feeds the
//! working-hours analytics.

pub mod analytics;
pub mod credentials;
pub mod dataset;
pub mod detector;
pub mod embedder;
pub mod encodings;
pub mod enroll;
pub mod imageops;
pub mod ledger;
pub mod liveness;
pub mod matcher;
pub mod paths;
pub mod pipeline;
pub mod types;

pub use encodings::{EncodingData, EncodingStore};
pub use ledger::{AttendanceLog, AttendanceRecord, PunchStatus};
pub use matcher::{identify, Identification, MatchStrategy};
pub use pipeline::{FaceLabel, FrameProcessor, ProcessorSettings};
pub use types::{BoundingBox, Embedding};
