//! Scale-space construction and SIFT keypoint detection.
//!
//! The pipeline is: base image → Gaussian pyramid → DoG pyramid → 26-neighbour
//! extrema → sub-pixel localization with contrast / edge rejection → orientation
//! assignment → duplicate removal and optional top-N selection.

pub mod blur;
pub mod builder;
pub mod config;
pub mod detector;
pub mod extrema;
pub mod orientation;
pub mod pyramid;
pub mod refinement;
pub mod types;
pub mod utils;

pub use blur::{gaussian_blur, GaussianKernel};
pub use builder::DetectorBuilder;
pub use config::DetectorConfig;
pub use detector::SiftDetector;
pub use extrema::ExtremaDetector;
pub use orientation::OrientationAssigner;
pub use pyramid::ImagePyramid;
pub use refinement::{SubpixelLocalizer, IMAGE_BORDER, MAX_INTERP_STEPS};
pub use types::{Candidate, CandidateState, LocalizedExtremum, RejectReason};
