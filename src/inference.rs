//! Forward pass through a pretrained network.
//!
//! The ranking side only needs a flat score vector per image, so the model
//! sits behind [`InferenceProvider`]. [`TractProvider`] runs ONNX exports with
//! tract; tests substitute canned scores.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::preprocess::PreprocessConfig;

/// How the network should be executed.
///
/// Passed explicitly to every provider; there is no process-wide mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ExecutionMode {
    /// Inference: dropout disabled, batch norm uses running statistics.
    #[default]
    Eval,
    Train,
}

/// Produces one raw score per class for a preprocessed image tensor.
pub trait InferenceProvider: Send + Sync {
    fn scores(&self, input: tract_ndarray::Array4<f32>) -> Result<Vec<f32>>;
}

impl<P: InferenceProvider + ?Sized> InferenceProvider for Box<P> {
    fn scores(&self, input: tract_ndarray::Array4<f32>) -> Result<Vec<f32>> {
        (**self).scores(input)
    }
}

type Plan = TypedRunnableModel<TypedModel>;

/// ONNX model optimized and made runnable by tract.
pub struct TractProvider {
    plan: Plan,
    input_shape: [usize; 4],
}

fn optimized_model(path: &Path, config: &PreprocessConfig) -> Result<TypedModel> {
    config.validate()?;
    let model = tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("loading {}", path.display()))?
        .with_input_fact(0, f32::fact(config.input_shape()).into())?
        .into_optimized()?;
    Ok(model)
}

impl TractProvider {
    pub fn load(
        path: impl AsRef<Path>,
        config: &PreprocessConfig,
        mode: ExecutionMode,
    ) -> Result<Self> {
        // an optimized tract plan has no training behaviour to switch to
        if mode != ExecutionMode::Eval {
            return Err(Error::UnsupportedMode(mode));
        }
        let path = path.as_ref();
        let start = Instant::now();
        let plan = optimized_model(path, config)?.into_runnable()?;
        info!(
            model = %path.display(),
            input = ?config.input_shape(),
            elapsed = ?start.elapsed(),
            "model ready"
        );
        Ok(Self {
            plan,
            input_shape: config.input_shape(),
        })
    }

    pub fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }
}

impl InferenceProvider for TractProvider {
    fn scores(&self, input: tract_ndarray::Array4<f32>) -> Result<Vec<f32>> {
        if input.shape() != &self.input_shape[..] {
            return Err(Error::invalid(format!(
                "input shape {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            )));
        }
        let start = Instant::now();
        let input: Tensor = input.into();
        let result = self.plan.run(tvec!(input.into()))?;
        let output = result
            .first()
            .ok_or_else(|| Error::invalid("model produced no outputs"))?;
        let scores: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();
        debug!(classes = scores.len(), elapsed = ?start.elapsed(), "forward pass");
        Ok(scores)
    }
}

/// One line per node of a model's optimized graph.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub id: usize,
    pub name: String,
    pub op: String,
}

/// Lists the layers of the model at `path` as tract optimizes them for
/// `config`'s input shape.
pub fn describe_model(path: impl AsRef<Path>, config: &PreprocessConfig) -> Result<Vec<LayerInfo>> {
    let model = optimized_model(path.as_ref(), config)?;
    Ok(model
        .nodes()
        .iter()
        .map(|node| LayerInfo {
            id: node.id,
            name: node.name.clone(),
            op: format!("{:?}", node.op),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_mode_is_rejected() {
        let err = TractProvider::load(
            "/no/such/model.onnx",
            &PreprocessConfig::default(),
            ExecutionMode::Train,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::UnsupportedMode(ExecutionMode::Train)));
    }

    #[test]
    fn missing_model_is_reported() {
        let err = TractProvider::load(
            "/no/such/model.onnx",
            &PreprocessConfig::default(),
            ExecutionMode::Eval,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Model(_)));
        assert!(err.to_string().contains("/no/such/model.onnx"));
    }

    // single Flatten node: [1, 3, 2, 2] -> [1, 12]
    const FLATTEN: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/flatten.onnx");

    fn tiny_config() -> PreprocessConfig {
        PreprocessConfig {
            resize: 2,
            crop: 2,
            ..Default::default()
        }
    }

    #[test]
    fn scores_are_flattened_model_output() {
        let provider = TractProvider::load(FLATTEN, &tiny_config(), ExecutionMode::Eval).unwrap();
        assert_eq!(provider.input_shape(), [1, 3, 2, 2]);

        let input = tract_ndarray::Array4::from_shape_fn((1, 3, 2, 2), |(_, c, y, x)| {
            (c * 4 + y * 2 + x) as f32
        });
        let scores = provider.scores(input).unwrap();
        assert_eq!(scores, (0..12).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn wrong_input_shape_is_invalid() {
        let provider = TractProvider::load(FLATTEN, &tiny_config(), ExecutionMode::Eval).unwrap();
        let input = tract_ndarray::Array4::zeros((1, 2, 2, 3));
        assert!(matches!(
            provider.scores(input),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn layers_are_listed() {
        let layers = describe_model(FLATTEN, &tiny_config()).unwrap();
        assert!(!layers.is_empty());
        assert!(layers.iter().any(|l| l.name == "input"));
    }

    #[test]
    fn boxed_providers_delegate() {
        struct Fixed;
        impl InferenceProvider for Fixed {
            fn scores(&self, _: tract_ndarray::Array4<f32>) -> Result<Vec<f32>> {
                Ok(vec![1.0, 2.0])
            }
        }
        let boxed: Box<dyn InferenceProvider> = Box::new(Fixed);
        let input = tract_ndarray::Array4::zeros((1, 3, 2, 2));
        assert_eq!(boxed.scores(input).unwrap(), vec![1.0, 2.0]);
    }
}
