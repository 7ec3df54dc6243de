use sift_core::{DescriptorLength, SiftConfig, SiftResult};

use crate::config::DetectorConfig;
use crate::detector::SiftDetector;

/// Builder for creating a `SiftDetector`
#[derive(Debug, Clone, Default)]
pub struct DetectorBuilder {
    config: SiftConfig,
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
}

impl DetectorBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the N strongest keypoints (0 = unlimited)
    pub fn max_features(mut self, n: usize) -> Self {
        self.config.max_features = n;
        self
    }

    /// Set the number of sampled layers per octave
    pub fn octave_layers(mut self, n: usize) -> Self {
        self.config.n_octave_layers = n;
        self
    }

    /// Set the DoG contrast threshold
    pub fn contrast_threshold(mut self, threshold: f32) -> Self {
        self.config.contrast_threshold = threshold;
        self
    }

    /// Set the principal curvature ratio limit
    pub fn edge_threshold(mut self, threshold: f32) -> Self {
        self.config.edge_threshold = threshold;
        self
    }

    /// Set the base blur of each octave
    pub fn sigma(mut self, sigma: f32) -> Self {
        self.config.sigma = sigma;
        self
    }

    /// Enable or disable 2x input upsampling
    pub fn upsample(mut self, enable: bool) -> Self {
        self.config.upsample = enable;
        self
    }

    /// Fix the octave count instead of deriving it from the image size
    pub fn octaves(mut self, n: usize) -> Self {
        self.config.n_octaves = Some(n);
        self
    }

    pub fn descriptor_length(mut self, length: DescriptorLength) -> Self {
        self.config.descriptor_length = length;
        self
    }

    /// Set the number of threads for parallel processing
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.config.n_threads = n_threads;
        self
    }

    /// Name and describe the configuration this builder produces
    pub fn metadata(mut self, name: &str, description: &str) -> Self {
        self.name = Some(name.to_string());
        self.description = Some(description.to_string());
        self.version = Some("1.0".to_string());
        self
    }

    /// Apply the fast preset
    pub fn preset_fast(mut self) -> Self {
        self.config = Self::merge_preset(self.config, DetectorConfig::fast_preset().core);
        self
    }

    /// Apply the dense preset
    pub fn preset_dense(mut self) -> Self {
        self.config = Self::merge_preset(self.config, DetectorConfig::dense_preset().core);
        self
    }

    /// Apply the robust preset
    pub fn preset_robust(mut self) -> Self {
        self.config = Self::merge_preset(self.config, DetectorConfig::robust_preset().core);
        self
    }

    /// Presets tune detection only; the thread count already chosen is kept
    fn merge_preset(current: SiftConfig, preset: SiftConfig) -> SiftConfig {
        SiftConfig {
            n_threads: current.n_threads,
            ..preset
        }
    }

    /// Build the `SiftDetector`
    pub fn build(self) -> SiftResult<SiftDetector> {
        SiftDetector::new(self.config)
    }

    /// Generate a summary of the builder's configuration
    pub fn summary(&self) -> String {
        self.clone().to_config().summary()
    }

    /// Create a builder from an existing `DetectorConfig`
    pub fn from_config(config: DetectorConfig) -> Self {
        Self {
            config: config.core,
            name: config.name,
            description: config.description,
            version: config.version,
        }
    }

    /// Convert the builder into a `DetectorConfig`
    pub fn to_config(self) -> DetectorConfig {
        DetectorConfig {
            name: self.name,
            description: self.description,
            version: self.version,
            core: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::{ErrorKind, Image};

    #[test]
    fn test_fluent_setters() {
        let cfg = DetectorBuilder::new()
            .max_features(200)
            .octave_layers(4)
            .contrast_threshold(0.03)
            .edge_threshold(12.0)
            .sigma(1.8)
            .upsample(false)
            .octaves(3)
            .descriptor_length(DescriptorLength::Compact)
            .threads(2)
            .to_config();
        let c = cfg.core;
        assert_eq!(c.max_features, 200);
        assert_eq!(c.n_octave_layers, 4);
        assert_eq!(c.contrast_threshold, 0.03);
        assert_eq!(c.edge_threshold, 12.0);
        assert_eq!(c.sigma, 1.8);
        assert!(!c.upsample);
        assert_eq!(c.n_octaves, Some(3));
        assert_eq!(c.descriptor_length, DescriptorLength::Compact);
        assert_eq!(c.n_threads, 2);
    }

    #[test]
    fn test_presets_keep_thread_count() {
        let b = DetectorBuilder::new().threads(3).preset_robust();
        let c = b.to_config().core;
        assert_eq!(c.n_threads, 3);
        assert_eq!(c.contrast_threshold, 0.06);

        let c = DetectorBuilder::new().threads(1).preset_fast().to_config().core;
        assert!(!c.upsample);
        assert_eq!(c.n_threads, 1);

        let c = DetectorBuilder::new().preset_dense().to_config().core;
        assert_eq!(c.contrast_threshold, 0.02);
    }

    #[test]
    fn test_build_validates() {
        let err = DetectorBuilder::new().octave_layers(0).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

        let detector = DetectorBuilder::new().threads(1).build().unwrap();
        let kps = detector.detect(&Image::filled(32, 32, 0.5), None).unwrap();
        assert!(kps.is_empty());
    }

    #[test]
    fn test_config_round_trip() {
        let original = DetectorConfig::dense_preset();
        let back = DetectorBuilder::from_config(original.clone()).to_config();
        assert_eq!(back, original);
        assert!(DetectorBuilder::new().summary().starts_with("DetectorConfig"));
    }

    #[test]
    fn test_metadata_survives_builder() {
        let original = DetectorConfig::robust_preset().with_metadata("Aerial", "Tuned for aerial imagery");
        let back = original.clone().to_builder().threads(2).to_config();
        assert_eq!(back.name.as_deref(), Some("Aerial"));
        assert_eq!(back.description, original.description);
        assert_eq!(back.version, original.version);
        assert_eq!(back.core.n_threads, 2);

        let cfg = DetectorBuilder::new().metadata("Custom", "Hand tuned").to_config();
        assert!(cfg.summary().contains("'Custom'"));
        assert!(DetectorBuilder::new().to_config().name.is_none());
    }
}
