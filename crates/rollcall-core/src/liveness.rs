//! Passive liveness gate based on eye-landmark stability.
//!
//! A printed photo held to the camera yields near-identical landmark
//! positions frame after frame; a live face drifts by a pixel or more
//! even when the subject holds still. The gate watches the eye points
//! the detector already produces, so it costs no extra inference.
//!
//! It does not defend against video replay or 3D masks.

use std::collections::VecDeque;

/// Default mean eye displacement (pixels per frame pair) below which a
/// face is treated as a static image. Steady live gaze measures above
/// 1 px on a 640x480 sensor; a photo stays under 0.3 px.
pub const DEFAULT_MIN_EYE_DISPLACEMENT: f32 = 0.8;

const HISTORY_LEN: usize = 8;

/// Rolling stability check over one face's recent eye landmarks.
#[derive(Debug)]
pub struct LivenessGate {
    min_displacement: f32,
    history: VecDeque<[(f32, f32); 2]>,
}

impl LivenessGate {
    pub fn new(min_displacement: f32) -> LivenessGate {
        LivenessGate {
            min_displacement,
            history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Record the eye landmarks from the current frame and report
    /// whether the face looks live so far.
    ///
    /// Landmarks follow the detector convention: index 0 is the left
    /// eye, index 1 the right. With fewer than two observed frames the
    /// gate cannot judge and passes the face through.
    pub fn observe(&mut self, landmarks: &[(f32, f32); 5]) -> bool {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back([landmarks[0], landmarks[1]]);
        self.is_live()
    }

    /// Faces without landmark data cannot be judged and pass through,
    /// but observing one resets the history so a later landmark streak
    /// starts fresh.
    pub fn observe_without_landmarks(&mut self) -> bool {
        self.history.clear();
        true
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn is_live(&self) -> bool {
        if self.history.len() < 2 {
            return true;
        }
        self.mean_displacement() >= self.min_displacement
    }

    /// Mean per-pair eye displacement across the history window.
    pub fn mean_displacement(&self) -> f32 {
        let pairs = self.history.len().saturating_sub(1);
        if pairs == 0 {
            return 0.0;
        }

        let mut total = 0.0f32;
        for window in self.history.iter().collect::<Vec<_>>().windows(2) {
            let (prev, curr) = (window[0], window[1]);
            let mut frame = 0.0f32;
            for eye in 0..2 {
                let dx = curr[eye].0 - prev[eye].0;
                let dy = curr[eye].1 - prev[eye].1;
                frame += (dx * dx + dy * dy).sqrt();
            }
            total += frame / 2.0;
        }
        total / pairs as f32
    }
}

impl Default for LivenessGate {
    fn default() -> LivenessGate {
        LivenessGate::new(DEFAULT_MIN_EYE_DISPLACEMENT)
    }
}
