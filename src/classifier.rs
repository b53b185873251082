use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::error::Result;
use crate::inference::InferenceProvider;
use crate::labels::LabelCatalog;
use crate::preprocess::{load_image, preprocess, PreprocessConfig};
use crate::ranking::{rank, RankedPrediction};

/// Result of classifying one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub top1: RankedPrediction,
    /// Best `top_k` classes, most probable first; `ranked[0] == top1`.
    pub ranked: Vec<RankedPrediction>,
}

/// Image in, ranked labels out.
pub struct Classifier<P> {
    provider: P,
    labels: LabelCatalog,
    config: PreprocessConfig,
}

impl<P: InferenceProvider> Classifier<P> {
    pub fn new(provider: P, labels: LabelCatalog, config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            labels,
            config,
        })
    }

    pub fn labels(&self) -> &LabelCatalog {
        &self.labels
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn classify(&self, image: &RgbImage, top_k: usize) -> Result<Classification> {
        let input = preprocess(image, &self.config)?;
        let scores = self.provider.scores(input)?;
        let ranked = rank(&scores, self.labels.as_slice(), top_k)?;
        Ok(Classification {
            top1: ranked[0].clone(),
            ranked,
        })
    }

    pub fn classify_path(&self, path: impl AsRef<Path>, top_k: usize) -> Result<Classification> {
        let path = path.as_ref();
        let image = load_image(path)?;
        debug!(image = %path.display(), width = image.width(), height = image.height(), "decoded");
        self.classify(&image, top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use image::Rgb;
    use tract_onnx::prelude::tract_ndarray::{Array4, Axis};

    /// Scores each class by the mean of one input channel.
    struct ChannelMeans;

    impl InferenceProvider for ChannelMeans {
        fn scores(&self, input: Array4<f32>) -> Result<Vec<f32>> {
            let n = input.shape()[2] * input.shape()[3];
            Ok((0..3)
                .map(|c| input.index_axis(Axis(1), c).sum() / n as f32)
                .collect())
        }
    }

    fn catalog(names: &str) -> LabelCatalog {
        LabelCatalog::parse(names).unwrap()
    }

    #[test]
    fn red_image_ranks_red_first() {
        let classifier =
            Classifier::new(ChannelMeans, catalog("red\ngreen\nblue"), PreprocessConfig::default())
                .unwrap();
        let image = RgbImage::from_pixel(300, 260, Rgb([250, 10, 10]));
        let result = classifier.classify(&image, 3).unwrap();
        assert_eq!(result.top1.label, "red");
        assert_eq!(result.ranked[0], result.top1);
        assert_eq!(result.ranked.len(), 3);
    }

    #[test]
    fn catalog_size_mismatch_is_invalid() {
        let classifier =
            Classifier::new(ChannelMeans, catalog("red\ngreen"), PreprocessConfig::default())
                .unwrap();
        let image = RgbImage::from_pixel(256, 256, Rgb([0, 0, 0]));
        assert!(matches!(
            classifier.classify(&image, 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn bad_config_is_rejected_up_front() {
        let config = PreprocessConfig {
            crop: 512,
            ..Default::default()
        };
        assert!(Classifier::new(ChannelMeans, catalog("a\nb\nc"), config).is_err());
    }

    #[test]
    fn unreadable_image_is_reported() {
        let classifier =
            Classifier::new(ChannelMeans, catalog("a\nb\nc"), PreprocessConfig::default())
                .unwrap();
        assert!(matches!(
            classifier.classify_path("/no/such/image.jpg", 1),
            Err(Error::Image(_))
        ));
    }
}
