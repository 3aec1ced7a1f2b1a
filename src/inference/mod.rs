pub mod classifier;
pub mod onnx;
pub mod scheduler;

pub use classifier::{
    ChannelOrder, Classifier, ClassifierError, InputGeometry, ModelInput, TensorLayout,
};
pub use onnx::OnnxClassifier;
pub use scheduler::{DetectionResult, InferenceError, InferenceScheduler, Label, Tick};
