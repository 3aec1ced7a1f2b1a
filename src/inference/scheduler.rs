//! Frame-skipping inference: classify every Nth decoded frame and keep the
//! latest result around for the frames in between

use std::fmt;
use std::num::NonZeroU32;

use image::{Rgb, RgbImage};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::inference::classifier::{Classifier, ClassifierError, ModelInput};
use crate::SchedulerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Label {
    #[default]
    Normal,
    Anomaly,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "NORMAL",
            Label::Anomaly => "POTHOLE",
        }
    }

    /// Overlay color hint: red for potholes, green otherwise.
    pub fn color(&self) -> Rgb<u8> {
        match self {
            Label::Normal => Rgb([0, 255, 0]),
            Label::Anomaly => Rgb([255, 0, 0]),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recent classification, shown on every frame until replaced.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionResult {
    pub label: Label,
    pub confidence: f32,
    /// Set when a later classification attempt failed and the session was
    /// configured to say so.
    pub stale: bool,
}

impl DetectionResult {
    pub fn classify(confidence: f32, threshold: f32) -> Self {
        let label = if confidence > threshold {
            Label::Anomaly
        } else {
            Label::Normal
        };
        Self {
            label,
            confidence,
            stale: false,
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        if self.stale {
            Rgb([160, 160, 160])
        } else {
            self.label.color()
        }
    }

    /// `"<LABEL> (Score: 0.00)"`, suffixed with `STALE` when flagged.
    pub fn caption(&self) -> String {
        let caption = format!("{} (Score: {:.2})", self.label, self.confidence);
        if self.stale {
            format!("{caption} STALE")
        } else {
            caption
        }
    }
}

/// Outcome of feeding one decoded frame to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Not an inference frame; the previous result still stands.
    Skipped,
    /// The classifier ran and produced a new result.
    Inferred(DetectionResult),
}

#[derive(Debug, Error)]
#[error("classification failed on frame {frame}: {source}")]
pub struct InferenceError {
    pub frame: u64,
    #[source]
    pub source: ClassifierError,
}

pub struct InferenceScheduler {
    frame_counter: u64,
    skip_interval: NonZeroU32,
    confidence_threshold: f32,
    current: DetectionResult,
}

impl InferenceScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            frame_counter: 0,
            skip_interval: NonZeroU32::new(config.skip_interval).unwrap_or(NonZeroU32::MIN),
            confidence_threshold: config.confidence_threshold,
            current: DetectionResult::default(),
        }
    }

    /// Count a decoded frame and classify it if it lands on the interval.
    ///
    /// Must only be called for frames that decoded. On failure the stored
    /// result is left exactly as it was.
    #[instrument(skip_all, fields(frame = self.frame_counter + 1))]
    pub fn on_frame_decoded<C: Classifier + ?Sized>(
        &mut self,
        frame: &RgbImage,
        classifier: &mut C,
    ) -> Result<Tick, InferenceError> {
        self.frame_counter += 1;

        if self.frame_counter % u64::from(self.skip_interval.get()) != 0 {
            return Ok(Tick::Skipped);
        }

        let input = ModelInput::from_frame(
            frame,
            classifier.input_geometry(),
            classifier.layout(),
            classifier.channel_order(),
        );
        let confidence = classifier.classify(&input).map_err(|source| InferenceError {
            frame: self.frame_counter,
            source,
        })?;

        let result = DetectionResult::classify(confidence, self.confidence_threshold);
        debug!(label = %result.label, confidence, "Inference complete");
        metrics::counter!("inferences").increment(1);

        self.current = result;
        Ok(Tick::Inferred(result))
    }

    pub fn current(&self) -> DetectionResult {
        self.current
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn skip_interval(&self) -> u32 {
        self.skip_interval.get()
    }

    /// Flag the current result as out of date after a failed classification.
    pub fn mark_stale(&mut self) {
        self.current.stale = true;
    }
}
