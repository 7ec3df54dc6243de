use sift_core::{DescriptorLength, SiftConfig, SiftResult};

use crate::builder::DetectorBuilder;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Complete detector configuration with optional metadata
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorConfig {
    /// Metadata
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub description: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub version: Option<String>,
    /// Core SIFT configuration
    pub core: SiftConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorConfig {
    /// Create new configuration with default settings
    pub fn new() -> Self {
        Self {
            name: None,
            description: None,
            version: None,
            core: SiftConfig::default(),
        }
    }

    /// Fast preset: no upsampling and a capped feature count
    pub fn fast_preset() -> Self {
        Self {
            name: Some("Fast".to_string()),
            description: Some("Skips input upsampling and keeps the 500 strongest features".to_string()),
            version: Some("1.0".to_string()),
            core: SiftConfig {
                upsample: false,
                max_features: 500,
                ..SiftConfig::default()
            },
        }
    }

    /// Dense preset: lower contrast threshold for texture-poor images
    pub fn dense_preset() -> Self {
        Self {
            name: Some("Dense".to_string()),
            description: Some("Lower contrast threshold for more, weaker features".to_string()),
            version: Some("1.0".to_string()),
            core: SiftConfig {
                contrast_threshold: 0.02,
                ..SiftConfig::default()
            },
        }
    }

    /// Robust preset: stricter contrast and edge tests
    pub fn robust_preset() -> Self {
        Self {
            name: Some("Robust".to_string()),
            description: Some("Stricter contrast and edge rejection for stable matches".to_string()),
            version: Some("1.0".to_string()),
            core: SiftConfig {
                contrast_threshold: 0.06,
                edge_threshold: 8.0,
                max_features: 1000,
                ..SiftConfig::default()
            },
        }
    }

    /// Look up a preset by name (`default`, `fast`, `dense`, `robust`)
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "default" => Some(Self::new()),
            "fast" => Some(Self::fast_preset()),
            "dense" => Some(Self::dense_preset()),
            "robust" => Some(Self::robust_preset()),
            _ => None,
        }
    }

    /// Add metadata to configuration
    pub fn with_metadata(mut self, name: &str, description: &str) -> Self {
        self.name = Some(name.to_string());
        self.description = Some(description.to_string());
        self.version = Some("1.0".to_string());
        self
    }

    /// Convert to DetectorBuilder for further customization
    pub fn to_builder(self) -> DetectorBuilder {
        DetectorBuilder::from_config(self)
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        let c = &self.core;
        let octaves = c.n_octaves.map_or_else(|| "auto".to_string(), |n| n.to_string());
        let descriptor = match c.descriptor_length {
            DescriptorLength::Full => "full",
            DescriptorLength::Compact => "compact",
        };
        format!(
            "DetectorConfig{}: layers={}, octaves={}, contrast={}, edge={}, sigma={}, upsample={}, max_features={}, descriptor={}({}), threads={}",
            self.name.as_deref().map(|n| format!(" '{}'", n)).unwrap_or_default(),
            c.n_octave_layers,
            octaves,
            c.contrast_threshold,
            c.edge_threshold,
            c.sigma,
            c.upsample,
            c.max_features,
            descriptor,
            c.descriptor_length.len(),
            c.n_threads
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> SiftResult<()> {
        self.core.validate()
    }

    /// Save configuration to JSON file
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON file
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save configuration to TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Load configuration from TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserialize from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }
}
