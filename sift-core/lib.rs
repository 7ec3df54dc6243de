mod error;
mod image;
mod scale_space;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use error::{ErrorKind, SiftError, SiftResult};
pub use image::{Image, Mask};
pub use scale_space::{DogPyramid, GaussianPyramid, Octave, ScaleSpaceGeometry};

/// Key-point ≙ scale-space extremum + dominant orientation, in input image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Keypoint {
    pub x: f32, // Subpixel x coordinate
    pub y: f32, // Subpixel y coordinate
    /// Gaussian sigma of the detection scale, in input pixels
    pub scale: f32,
    /// Dominant gradient orientation in degrees, [0, 360)
    pub angle: f32,
    /// Interpolated |DoG| contrast
    pub response: f32,
    pub octave: usize,
    pub layer: usize,
}

impl Keypoint {
    /// Keypoint supplied by a caller. Pyramid indices are resolved from `scale`
    /// when descriptors are computed.
    pub fn new(x: f32, y: f32, scale: f32, angle: f32) -> Self {
        Self {
            x,
            y,
            scale,
            angle,
            response: 0.0,
            octave: 0,
            layer: 0,
        }
    }
}

/// Normalized gradient-histogram descriptor
pub type Descriptor = Vec<f32>;

/// Descriptor layout: 4×4 spatial cells × orientation bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DescriptorLength {
    /// 4×4×8 = 128 values
    #[default]
    Full,
    /// 4×4×4 = 64 values
    Compact,
}

impl DescriptorLength {
    pub const fn orientation_bins(self) -> usize {
        match self {
            DescriptorLength::Full => 8,
            DescriptorLength::Compact => 4,
        }
    }

    pub const fn len(self) -> usize {
        4 * 4 * self.orientation_bins()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SiftConfig {
    /// Keep only the N strongest responses (0 = unlimited)
    pub max_features: usize,
    pub n_octave_layers: usize,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    /// Blur of the base layer of each octave
    pub sigma: f32,
    /// Double the input before building the pyramid
    pub upsample: bool,
    /// Octave count; derived from the image size when absent
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub n_octaves: Option<usize>,
    pub descriptor_length: DescriptorLength,
    pub n_threads: usize,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            max_features: 0,
            n_octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
            upsample: true,
            n_octaves: None,
            descriptor_length: DescriptorLength::Full,
            n_threads: num_cpus::get().max(1),
        }
    }
}

impl SiftConfig {
    pub fn validate(&self) -> SiftResult<()> {
        if self.n_octave_layers == 0 {
            return Err(SiftError::config("n_octave_layers must be > 0"));
        }
        if !(self.contrast_threshold > 0.0) || !self.contrast_threshold.is_finite() {
            return Err(SiftError::config(format!(
                "contrast_threshold must be > 0 (got {})",
                self.contrast_threshold
            )));
        }
        if !(self.edge_threshold > 0.0) || !self.edge_threshold.is_finite() {
            return Err(SiftError::config(format!(
                "edge_threshold must be > 0 (got {})",
                self.edge_threshold
            )));
        }
        if !(self.sigma > 0.0) || !self.sigma.is_finite() {
            return Err(SiftError::config(format!("sigma must be > 0 (got {})", self.sigma)));
        }
        if self.n_octaves == Some(0) {
            return Err(SiftError::config("n_octaves must be > 0"));
        }
        if self.n_threads == 0 {
            return Err(SiftError::config("n_threads must be > 0"));
        }
        Ok(())
    }

    /// Pyramid geometry implied by this configuration
    pub fn geometry(&self) -> ScaleSpaceGeometry {
        ScaleSpaceGeometry {
            n_octave_layers: self.n_octave_layers,
            sigma: self.sigma,
            base_scale: if self.upsample { 0.5 } else { 1.0 },
        }
    }
}

/// Shared flag polled between octaves to abandon a detection early
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Build a Rayon thread pool with the specified number of threads
pub fn build_thread_pool(n_threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .thread_name(|i| format!("sift-worker-{}", i))
        .build()
}
