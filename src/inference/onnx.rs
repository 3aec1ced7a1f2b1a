use std::path::Path;
use std::time::Instant;

use tract_onnx::prelude::*;
use tract_onnx::tract_hir::internal::DimLike;
use tracing::{debug, info, instrument, warn};

use crate::inference::classifier::{
    read_confidence, ChannelOrder, Classifier, ClassifierError, InputGeometry, ModelInput, TensorLayout, CHANNELS,
};
use crate::ModelConfig;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Single-output binary classifier backed by tract.
pub struct OnnxClassifier {
    model: Plan,
    geometry: InputGeometry,
    layout: TensorLayout,
    channel_order: ChannelOrder,
}

impl OnnxClassifier {
    /// Load and optimize the model. Any failure here is fatal at startup.
    #[instrument(skip(config), fields(path = %config.path.display()))]
    pub fn load(config: &ModelConfig) -> Result<Self, ClassifierError> {
        let path = &config.path;
        info!("Loading model from: {}", path.display());

        let load_error = |e: TractError| ClassifierError::Load {
            path: path.display().to_string(),
            reason: format!("{e:#}"),
        };

        if !Path::new(path).is_file() {
            return Err(ClassifierError::Load {
                path: path.display().to_string(),
                reason: "model file not found".into(),
            });
        }

        let model = tract_onnx::onnx().model_for_path(path).map_err(load_error)?;

        let (geometry, layout) = match probe_input(&model) {
            Some(probed) => probed,
            None => {
                warn!(
                    "Model input shape is not concrete, using fallback {}x{}",
                    config.fallback_geometry.height, config.fallback_geometry.width
                );
                (config.fallback_geometry, TensorLayout::Nhwc)
            }
        };

        let (h, w) = (geometry.height as usize, geometry.width as usize);
        let shape = match layout {
            TensorLayout::Nhwc => [1, h, w, CHANNELS],
            TensorLayout::Nchw => [1, CHANNELS, h, w],
        };

        let model = model
            .with_input_fact(0, f32::fact(shape).into())
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(load_error)?;

        info!(
            "Model loaded successfully. Input shape: {}x{} ({:?}, {:?})",
            geometry.height, geometry.width, layout, config.channel_order
        );

        Ok(Self {
            model,
            geometry,
            layout,
            channel_order: config.channel_order,
        })
    }
}

/// Read `(H, W)` and axis order off the model's first input, if it declares them.
fn probe_input(model: &InferenceModel) -> Option<(InputGeometry, TensorLayout)> {
    let typed = match model.clone().into_typed() {
        Ok(typed) => typed,
        Err(e) => {
            debug!("Could not type model for shape probing: {:#}", e);
            return None;
        }
    };
    let fact = typed.input_fact(0).ok()?;
    let dims: Vec<Option<usize>> = fact.shape.iter().map(|d| d.to_usize().ok()).collect();
    debug!(?dims, "Probed model input");

    let channels = Some(CHANNELS);
    let (h, w, layout) = match dims.as_slice() {
        [_, Some(h), Some(w), c] if *c == channels => (*h, *w, TensorLayout::Nhwc),
        [_, c, Some(h), Some(w)] if *c == channels => (*h, *w, TensorLayout::Nchw),
        _ => return None,
    };

    Some((InputGeometry::new(h as u32, w as u32), layout))
}

impl Classifier for OnnxClassifier {
    fn input_geometry(&self) -> InputGeometry {
        self.geometry
    }

    fn layout(&self) -> TensorLayout {
        self.layout
    }

    fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    fn classify(&mut self, input: &ModelInput) -> Result<f32, ClassifierError> {
        let start = Instant::now();

        let tensor = Tensor::from_shape(&input.shape[..], &input.data[..])
            .map_err(|e| ClassifierError::Invoke(format!("{e:#}")))?;
        let outputs = self
            .model
            .run(tvec!(tensor.into_tvalue()))
            .map_err(|e| ClassifierError::Invoke(format!("{e:#}")))?;

        let output = outputs
            .first()
            .ok_or_else(|| ClassifierError::MalformedOutput("model returned no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::MalformedOutput(format!("{e:#}")))?;
        let values: Vec<f32> = view.iter().copied().collect();

        metrics::histogram!("inference_time_us").record(start.elapsed().as_micros() as f64);
        read_confidence(&values)
    }
}
