//! The stream session: pull a decoded frame, maybe classify it, draw the
//! current result on it, present it. Strictly sequential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::capture::{CaptureError, FrameSource};
use crate::display::{annotate, Display, DisplayError, OverlayStyle};
use crate::inference::{Classifier, DetectionResult, InferenceScheduler, Tick};
use crate::{ClassifierFallback, SchedulerConfig};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Cooperative stop flag shared with signal handlers.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Quit key, window close or interrupt
    Stopped,
    /// The transport closed the stream
    EndOfStream,
}

/// Counters collected over one session
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_displayed: u64,
    pub decode_failures: u64,
    pub degenerate_matches: u64,
    pub inferences: u64,
    pub classifier_failures: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub stats: SessionStats,
    pub last_result: DetectionResult,
}

pub struct Session<S, C, D> {
    source: S,
    classifier: C,
    display: D,
    scheduler: InferenceScheduler,
    fallback: ClassifierFallback,
    overlay: OverlayStyle,
    stats: SessionStats,
}

impl<S, C, D> Session<S, C, D>
where
    S: FrameSource,
    C: Classifier,
    D: Display,
{
    pub fn new(config: &SchedulerConfig, source: S, classifier: C, display: D) -> Self {
        Self {
            source,
            classifier,
            display,
            scheduler: InferenceScheduler::new(config),
            fallback: config.on_classifier_error,
            overlay: OverlayStyle::default(),
            stats: SessionStats::default(),
        }
    }

    /// Run until stopped, the stream ends, or a fatal error. The display is
    /// closed on every path.
    #[instrument(skip_all)]
    pub fn run(&mut self, stop: &StopSignal) -> Result<SessionSummary, SessionError> {
        info!(
            skip_interval = self.scheduler.skip_interval(),
            "Stream session started"
        );
        self.source.watch(stop);
        let outcome = self.run_loop(stop);
        self.display.close();

        self.stats.decode_failures = self.source.decode_failures();
        self.stats.degenerate_matches = self.source.degenerate_matches();
        info!(stats = ?self.stats, "Stream session ended");

        outcome.map(|reason| SessionSummary {
            reason,
            stats: self.stats,
            last_result: self.scheduler.current(),
        })
    }

    fn run_loop(&mut self, stop: &StopSignal) -> Result<StopReason, SessionError> {
        loop {
            if stop.is_triggered() {
                info!("Stop requested");
                return Ok(StopReason::Stopped);
            }

            let mut frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                // An interrupted read is the stop, not a transport failure
                Ok(None) | Err(_) if stop.is_triggered() => {
                    info!("Stop requested while waiting for a frame");
                    return Ok(StopReason::Stopped);
                }
                Ok(None) => {
                    info!("Stream ended");
                    return Ok(StopReason::EndOfStream);
                }
                Err(e) => return Err(e.into()),
            };

            match self
                .scheduler
                .on_frame_decoded(&frame.image, &mut self.classifier)
            {
                Ok(Tick::Inferred(result)) => {
                    self.stats.inferences += 1;
                    debug!(sequence = frame.meta.sequence, ?result, "Result updated");
                }
                Ok(Tick::Skipped) => {}
                Err(e) => {
                    self.stats.classifier_failures += 1;
                    metrics::counter!("classifier_failures").increment(1);
                    warn!("{}", e);
                    if self.fallback == ClassifierFallback::MarkStale {
                        self.scheduler.mark_stale();
                    }
                }
            }

            annotate(&mut frame.image, &self.scheduler.current(), self.overlay);
            self.display.present(&frame.image)?;
            self.stats.frames_displayed += 1;
            metrics::histogram!("frame_latency_ms")
                .record(frame.meta.timestamp.elapsed().as_secs_f64() * 1000.0);

            if self.display.quit_requested() {
                return Ok(StopReason::Stopped);
            }
        }
    }

    /// Hand back the collaborators, e.g. to inspect them after a run.
    pub fn into_parts(self) -> (S, C, D) {
        (self.source, self.classifier, self.display)
    }
}
