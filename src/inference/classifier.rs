use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to load model {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("model invocation failed: {0}")]
    Invoke(String),
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

/// Spatial input size the model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputGeometry {
    pub height: u32,
    pub width: u32,
}

impl InputGeometry {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl Default for InputGeometry {
    fn default() -> Self {
        Self::new(128, 128)
    }
}

/// Axis order of the model's input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, as exported from Keras / TFLite
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`
    Nchw,
}

pub const CHANNELS: usize = 3;

/// Channel order the model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    /// OpenCV's native order
    #[default]
    Bgr,
    Rgb,
}

impl ChannelOrder {
    /// Source RGB channel for each model channel.
    fn source_channels(self) -> [usize; CHANNELS] {
        match self {
            ChannelOrder::Bgr => [2, 1, 0],
            ChannelOrder::Rgb => [0, 1, 2],
        }
    }
}

/// A batch of one normalized image.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub data: Vec<f32>,
    pub shape: [usize; 4],
}

impl ModelInput {
    /// Resize `frame` to `geometry`, reorder channels and scale samples from
    /// `0..=255` to `0.0..=1.0`.
    pub fn from_frame(
        frame: &RgbImage,
        geometry: InputGeometry,
        layout: TensorLayout,
        order: ChannelOrder,
    ) -> Self {
        let resized = imageops::resize(frame, geometry.width, geometry.height, FilterType::Triangle);
        let (h, w) = (geometry.height as usize, geometry.width as usize);
        let channels = order.source_channels();

        let mut data = vec![0.0; CHANNELS * h * w];
        for (x, y, px) in resized.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for (c, &src) in channels.iter().enumerate() {
                let index = match layout {
                    TensorLayout::Nhwc => offset * CHANNELS + c,
                    TensorLayout::Nchw => c * h * w + offset,
                };
                data[index] = f32::from(px[src]) / 255.0;
            }
        }

        let shape = match layout {
            TensorLayout::Nhwc => [1, h, w, CHANNELS],
            TensorLayout::Nchw => [1, CHANNELS, h, w],
        };

        Self { data, shape }
    }
}

/// Binary image classifier producing one confidence scalar per image.
pub trait Classifier {
    fn input_geometry(&self) -> InputGeometry;

    fn layout(&self) -> TensorLayout {
        TensorLayout::Nhwc
    }

    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::default()
    }

    /// Confidence in `[0, 1]` that the image shows an anomaly.
    fn classify(&mut self, input: &ModelInput) -> Result<f32, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn input_geometry(&self) -> InputGeometry {
        (**self).input_geometry()
    }

    fn layout(&self) -> TensorLayout {
        (**self).layout()
    }

    fn channel_order(&self) -> ChannelOrder {
        (**self).channel_order()
    }

    fn classify(&mut self, input: &ModelInput) -> Result<f32, ClassifierError> {
        (**self).classify(input)
    }
}

/// Check that the model produced exactly one usable confidence.
pub fn read_confidence(output: &[f32]) -> Result<f32, ClassifierError> {
    match output {
        [conf] if conf.is_finite() && (0.0..=1.0).contains(conf) => Ok(*conf),
        [conf] => Err(ClassifierError::MalformedOutput(format!(
            "confidence {conf} outside [0, 1]"
        ))),
        other => Err(ClassifierError::MalformedOutput(format!(
            "expected a single scalar, got {} values",
            other.len()
        ))),
    }
}
