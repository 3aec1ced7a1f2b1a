use std::collections::VecDeque;

use image::RgbImage;

use pothole_watch::inference::{
    Classifier, ClassifierError, DetectionResult, InferenceScheduler, InputGeometry, Label,
    ModelInput, Tick,
};
use pothole_watch::SchedulerConfig;

/// Replays scripted confidences and remembers how often it was called.
struct Scripted {
    confidences: VecDeque<f32>,
    calls: usize,
}

impl Scripted {
    fn new(confidences: &[f32]) -> Self {
        Self {
            confidences: confidences.iter().copied().collect(),
            calls: 0,
        }
    }
}

impl Classifier for Scripted {
    fn input_geometry(&self) -> InputGeometry {
        InputGeometry::new(16, 16)
    }

    fn classify(&mut self, input: &ModelInput) -> Result<f32, ClassifierError> {
        assert_eq!(input.shape, [1, 16, 16, 3]);
        assert!(input.data.iter().all(|v| (0.0..=1.0).contains(v)));
        self.calls += 1;
        self.confidences
            .pop_front()
            .ok_or_else(|| ClassifierError::Invoke("script exhausted".into()))
    }
}

fn scheduler(skip_interval: u32, confidence_threshold: f32) -> InferenceScheduler {
    InferenceScheduler::new(&SchedulerConfig {
        skip_interval,
        confidence_threshold,
        ..SchedulerConfig::default()
    })
}

#[test]
fn classifier_runs_floor_m_over_n_times() {
    let frame = RgbImage::new(40, 30);
    for n in 1..=6u32 {
        for m in 0..=20u64 {
            let mut sched = scheduler(n, 0.8);
            let mut classifier = Scripted::new(&vec![0.5; 32]);
            let mut fired_on = Vec::new();
            for i in 1..=m {
                if let Tick::Inferred(_) = sched.on_frame_decoded(&frame, &mut classifier).unwrap() {
                    fired_on.push(i);
                }
            }
            assert_eq!(classifier.calls as u64, m / u64::from(n), "n={n} m={m}");
            assert!(fired_on.iter().all(|i| i % u64::from(n) == 0));
        }
    }
}

#[test]
fn result_is_frozen_between_inference_frames() {
    let frame = RgbImage::new(8, 8);
    let mut sched = scheduler(4, 0.8);
    let mut classifier = Scripted::new(&[0.9, 0.2, 0.85]);

    let mut shown = Vec::new();
    for _ in 0..12 {
        sched.on_frame_decoded(&frame, &mut classifier).unwrap();
        shown.push(sched.current());
    }

    for window in shown[3..11].chunks(4) {
        assert!(window.iter().all(|r| *r == window[0]));
    }
    assert_eq!(shown[3].label, Label::Anomaly);
    assert_eq!(shown[7].label, Label::Normal);
    assert_eq!(shown[11].label, Label::Anomaly);
}

#[test]
fn scenario_skip_five_twelve_frames() {
    let frame = RgbImage::new(64, 48);
    let mut sched = scheduler(5, 0.8);
    let mut classifier = Scripted::new(&[0.3, 0.95]);

    let shown: Vec<DetectionResult> = (0..12)
        .map(|_| {
            sched.on_frame_decoded(&frame, &mut classifier).unwrap();
            sched.current()
        })
        .collect();

    for (i, result) in shown.iter().enumerate() {
        let frame_no = i + 1;
        let (label, confidence) = match frame_no {
            1..=4 => (Label::Normal, 0.0),
            5..=9 => (Label::Normal, 0.3),
            _ => (Label::Anomaly, 0.95),
        };
        assert_eq!(result.label, label, "frame {frame_no}");
        assert_eq!(result.confidence, confidence, "frame {frame_no}");
    }
    assert_eq!(classifier.calls, 2);
}

#[test]
fn confidence_equal_to_threshold_is_normal() {
    let frame = RgbImage::new(8, 8);
    let mut sched = scheduler(1, 0.8);
    let mut classifier = Scripted::new(&[0.8, 0.81]);

    assert!(matches!(
        sched.on_frame_decoded(&frame, &mut classifier).unwrap(),
        Tick::Inferred(DetectionResult {
            label: Label::Normal,
            ..
        })
    ));
    assert!(matches!(
        sched.on_frame_decoded(&frame, &mut classifier).unwrap(),
        Tick::Inferred(DetectionResult {
            label: Label::Anomaly,
            ..
        })
    ));
}

#[test]
fn classifier_failure_leaves_result_untouched() {
    let frame = RgbImage::new(8, 8);
    let mut sched = scheduler(2, 0.8);
    let mut classifier = Scripted::new(&[0.99]);

    for _ in 0..2 {
        sched.on_frame_decoded(&frame, &mut classifier).unwrap();
    }
    let before = sched.current();
    assert_eq!(before.label, Label::Anomaly);

    sched.on_frame_decoded(&frame, &mut classifier).unwrap();
    let err = sched.on_frame_decoded(&frame, &mut classifier).unwrap_err();
    assert_eq!(err.frame, 4);
    assert_eq!(sched.current(), before);
    assert_eq!(sched.frame_counter(), 4);
}
