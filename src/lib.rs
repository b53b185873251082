//! Classify images with pretrained ONNX networks and rank the class scores
//! into labelled percentages.

pub mod classifier;
pub mod error;
pub mod inference;
pub mod labels;
pub mod preprocess;
pub mod ranking;
pub mod report;

pub use classifier::{Classification, Classifier};
pub use error::{Error, Result};
pub use inference::{describe_model, ExecutionMode, InferenceProvider, TractProvider};
pub use labels::LabelCatalog;
pub use preprocess::{Layout, PreprocessConfig};
pub use ranking::{rank, softmax_percent, top1, RankedPrediction};
