use sift_core::{CancelFlag, DogPyramid, GaussianPyramid, Image, Keypoint, Mask, SiftConfig, SiftError, build_thread_pool};
use sift_descriptor::DescriptorComputer;
use sift_detect::SiftDetector;
use thiserror::Error;
use tracing::debug;

pub use sift_core::{
    self, Descriptor as SiftDescriptor, DescriptorLength, Image as SiftImage, Keypoint as SiftKeypoint,
    SiftConfig as Config,
};
pub use sift_detect::{DetectorBuilder, DetectorConfig};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("SIFT error: {0}")]
    Sift(#[from] SiftError),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// High-level SIFT engine: scale-space detection plus gradient-histogram descriptors.
///
/// Every call runs on the engine's own worker pool, sized by `SiftConfig::n_threads`.
#[derive(Debug)]
pub struct Sift {
    detector: SiftDetector,
    descriptor: DescriptorComputer,
    pool: rayon::ThreadPool,
}

impl Sift {
    /// Create a new engine with the given configuration
    pub fn new(cfg: SiftConfig) -> EngineResult<Self> {
        let detector = SiftDetector::new(cfg)?;
        let pool = build_thread_pool(detector.config().n_threads)?;
        let descriptor = DescriptorComputer::new(detector.config().descriptor_length);
        Ok(Self {
            detector,
            descriptor,
            pool,
        })
    }

    /// Get engine configuration
    pub fn config(&self) -> &SiftConfig {
        self.detector.config()
    }

    /// Length of every descriptor: 128, or 64 for the compact layout
    pub fn descriptor_size(&self) -> usize {
        self.descriptor.descriptor_size()
    }

    /// Detect oriented keypoints; zero mask pixels suppress detections
    pub fn detect(&self, img: &Image, mask: Option<&Mask>) -> EngineResult<Vec<Keypoint>> {
        Ok(self.pool.install(|| self.detector.detect(img, mask))?)
    }

    /// As [`Sift::detect`], abandoning the run at the next octave boundary once `cancel` is set
    pub fn detect_with_cancel(&self, img: &Image, mask: Option<&Mask>, cancel: &CancelFlag) -> EngineResult<Vec<Keypoint>> {
        let (kps, _) = self
            .pool
            .install(|| self.detector.detect_with_pyramid(img, mask, Some(cancel)))?;
        Ok(kps)
    }

    /// Descriptors for caller-supplied keypoints
    pub fn compute(&self, img: &Image, keypoints: &[Keypoint]) -> EngineResult<(Vec<Keypoint>, Vec<SiftDescriptor>)> {
        self.detect_and_compute(img, None, Some(keypoints), true)
    }

    /// Detect keypoints and describe them in one pass.
    ///
    /// With `use_provided`, detection is skipped and `provided` is described as-is;
    /// only each keypoint's pyramid indices are re-resolved from its scale.
    pub fn detect_and_compute(
        &self,
        img: &Image,
        mask: Option<&Mask>,
        provided: Option<&[Keypoint]>,
        use_provided: bool,
    ) -> EngineResult<(Vec<Keypoint>, Vec<SiftDescriptor>)> {
        if !use_provided {
            return self.pool.install(|| -> EngineResult<_> {
                let (kps, gauss) = self.detector.detect_with_pyramid(img, mask, None)?;
                let desc = self.descriptor.compute(&gauss, &kps);
                Ok((kps, desc))
            });
        }

        img.ensure_not_empty()?;
        if let Some(m) = mask {
            m.check_matches(img)?;
        }
        let Some(provided) = provided.filter(|kps| !kps.is_empty()) else {
            return Ok((Vec::new(), Vec::new()));
        };

        self.pool.install(|| -> EngineResult<_> {
            let gauss = self.detector.build_gaussian_pyramid(img, None)?;
            let geometry = gauss.geometry();
            let kps: Vec<Keypoint> = provided
                .iter()
                .map(|kp| {
                    let (octave, layer) = geometry.locate(kp.scale, gauss.n_octaves());
                    Keypoint { octave, layer, ..*kp }
                })
                .collect();
            let desc = self.descriptor.compute(&gauss, &kps);
            debug!(count = kps.len(), "described provided keypoints");
            Ok((kps, desc))
        })
    }

    /// Gaussian scale space of `img`; `n_octaves` overrides the configured count
    pub fn build_gaussian_pyramid(&self, img: &Image, n_octaves: Option<usize>) -> EngineResult<GaussianPyramid> {
        Ok(self
            .pool
            .install(|| self.detector.build_gaussian_pyramid(img, n_octaves))?)
    }

    pub fn build_dog_pyramid(&self, gauss: &GaussianPyramid) -> EngineResult<DogPyramid> {
        Ok(self.pool.install(|| self.detector.build_dog_pyramid(gauss))?)
    }

    /// Oriented extrema of `dog`, without duplicate removal or top-N selection
    pub fn find_scale_space_extrema(&self, gauss: &GaussianPyramid, dog: &DogPyramid) -> EngineResult<Vec<Keypoint>> {
        Ok(self
            .pool
            .install(|| self.detector.find_scale_space_extrema(gauss, dog))?)
    }
}
