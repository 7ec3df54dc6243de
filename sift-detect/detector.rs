use sift_core::{
    CancelFlag, DogPyramid, GaussianPyramid, Image, Keypoint, Mask, ScaleSpaceGeometry, SiftConfig,
    SiftError, SiftResult,
};
use tracing::{debug, warn};

use crate::extrema::ExtremaDetector;
use crate::pyramid::ImagePyramid;
use crate::utils::{remove_duplicates, retain_best};

/// Multi-octave SIFT keypoint detector
#[derive(Debug, Clone)]
pub struct SiftDetector {
    cfg: SiftConfig,
    extrema: ExtremaDetector,
}

impl SiftDetector {
    /// Creates a new detector with validation
    pub fn new(cfg: SiftConfig) -> SiftResult<Self> {
        cfg.validate()?;
        let extrema = ExtremaDetector::new(cfg.geometry(), cfg.contrast_threshold, cfg.edge_threshold);
        Ok(Self { cfg, extrema })
    }

    /// Get detector configuration
    pub fn config(&self) -> &SiftConfig {
        &self.cfg
    }

    pub fn geometry(&self) -> ScaleSpaceGeometry {
        self.cfg.geometry()
    }

    /// Gaussian pyramid of `img`; `n_octaves` overrides the configured / derived count
    pub fn build_gaussian_pyramid(&self, img: &Image, n_octaves: Option<usize>) -> SiftResult<GaussianPyramid> {
        let base = ImagePyramid::create_base_image(img, self.cfg.sigma, self.cfg.upsample)?;
        let (bw, bh) = base.dimensions();
        debug!(width = bw, height = bh, upsample = self.cfg.upsample, "prepared base image");
        ImagePyramid::build_gaussian_pyramid(&base, self.geometry(), n_octaves.or(self.cfg.n_octaves))
    }

    pub fn build_dog_pyramid(&self, gauss: &GaussianPyramid) -> SiftResult<DogPyramid> {
        ImagePyramid::build_dog_pyramid(gauss)
    }

    /// Oriented keypoints for every accepted extremum, before post-filtering
    pub fn find_scale_space_extrema(&self, gauss: &GaussianPyramid, dog: &DogPyramid) -> SiftResult<Vec<Keypoint>> {
        self.extrema.find_keypoints(gauss, dog, None, None)
    }

    /// Detect keypoints, honouring an optional detection mask
    pub fn detect(&self, img: &Image, mask: Option<&Mask>) -> SiftResult<Vec<Keypoint>> {
        self.detect_with_pyramid(img, mask, None).map(|(kps, _)| kps)
    }

    /// Detect keypoints and hand back the Gaussian pyramid they were found in.
    ///
    /// An all-zero mask skips the extremum search but still builds the pyramid.
    pub fn detect_with_pyramid(
        &self,
        img: &Image,
        mask: Option<&Mask>,
        cancel: Option<&CancelFlag>,
    ) -> SiftResult<(Vec<Keypoint>, GaussianPyramid)> {
        img.ensure_not_empty()?;
        if let Some(m) = mask {
            m.check_matches(img)?;
        }
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(SiftError::Cancelled);
        }

        let gauss = self.build_gaussian_pyramid(img, None)?;
        if mask.is_some_and(Mask::is_all_zero) {
            warn!("detection mask is all zero, no keypoints can be found");
            return Ok((Vec::new(), gauss));
        }

        let dog = self.build_dog_pyramid(&gauss)?;
        let mut keypoints = self.extrema.find_keypoints(&gauss, &dog, mask, cancel)?;
        let found = keypoints.len();

        remove_duplicates(&mut keypoints);
        if self.cfg.max_features > 0 {
            retain_best(&mut keypoints, self.cfg.max_features);
        }
        debug!(found, kept = keypoints.len(), octaves = gauss.n_octaves(), "detection finished");

        Ok((keypoints, gauss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::ErrorKind;

    fn create_test_config() -> SiftConfig {
        SiftConfig {
            n_threads: 1,
            ..Default::default()
        }
    }

    fn create_blob_image(width: usize, height: usize, blobs: &[(f32, f32, f32)]) -> Image {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x as f32, y as f32)))
            .map(|(x, y)| {
                blobs
                    .iter()
                    .map(|&(cx, cy, s)| (-((x - cx).powi(2) + (y - cy).powi(2)) / (2.0 * s * s)).exp())
                    .sum::<f32>()
                    .min(1.0)
            })
            .collect();
        Image::new(width, height, data).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let cfg = SiftConfig {
            contrast_threshold: -1.0,
            ..create_test_config()
        };
        let err = SiftDetector::new(cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn test_empty_image() {
        let detector = SiftDetector::new(create_test_config()).unwrap();
        let err = detector.detect(&Image::filled(0, 0, 0.0), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_mask_size_mismatch() {
        let detector = SiftDetector::new(create_test_config()).unwrap();
        let img = Image::filled(32, 32, 0.5);
        let mask = Mask::filled(16, 32, 1);
        assert!(matches!(
            detector.detect(&img, Some(&mask)),
            Err(SiftError::MaskSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_stage_layer_counts() {
        let detector = SiftDetector::new(create_test_config()).unwrap();
        let img = Image::filled(40, 40, 0.5);
        let gauss = detector.build_gaussian_pyramid(&img, None).unwrap();
        // 80x80 base after upsampling: 80, 40, 20, 10
        assert_eq!(gauss.n_octaves(), 4);
        assert_eq!(gauss.octave(0).dimensions(), (80, 80));
        let dog = detector.build_dog_pyramid(&gauss).unwrap();
        for (g, d) in gauss.octaves().iter().zip(dog.octaves()) {
            assert_eq!(g.len(), 6);
            assert_eq!(d.len(), 5);
        }
        let explicit = detector.build_gaussian_pyramid(&img, Some(2)).unwrap();
        assert_eq!(explicit.n_octaves(), 2);
    }

    #[test]
    fn test_max_features_keeps_strongest() {
        let img = create_blob_image(96, 96, &[(24.0, 24.0, 3.0), (70.0, 30.0, 4.0), (40.0, 70.0, 5.0)]);
        let all = SiftDetector::new(create_test_config()).unwrap().detect(&img, None).unwrap();
        assert!(all.len() >= 2);

        let limited = SiftDetector::new(SiftConfig {
            max_features: 1,
            ..create_test_config()
        })
        .unwrap()
        .detect(&img, None)
        .unwrap();
        assert_eq!(limited.len(), 1);
        let best = all.iter().map(|kp| kp.response).fold(0.0f32, f32::max);
        assert_eq!(limited[0].response, best);
    }

    #[test]
    fn test_no_duplicates() {
        let img = create_blob_image(64, 64, &[(20.0, 20.0, 3.0), (44.0, 40.0, 3.5)]);
        let kps = SiftDetector::new(create_test_config()).unwrap().detect(&img, None).unwrap();
        for (i, a) in kps.iter().enumerate() {
            for b in &kps[i + 1..] {
                assert!(a != b);
            }
        }
    }

    #[test]
    fn test_all_zero_mask_returns_pyramid() {
        let detector = SiftDetector::new(create_test_config()).unwrap();
        let img = create_blob_image(64, 64, &[(32.0, 32.0, 4.0)]);
        let mask = Mask::filled(64, 64, 0);
        let (kps, gauss) = detector.detect_with_pyramid(&img, Some(&mask), None).unwrap();
        assert!(kps.is_empty());
        assert!(gauss.n_octaves() > 0);
    }

    #[test]
    fn test_cancel_before_start() {
        let detector = SiftDetector::new(create_test_config()).unwrap();
        let flag = CancelFlag::new();
        flag.cancel();
        let img = Image::filled(32, 32, 0.5);
        assert!(matches!(
            detector.detect_with_pyramid(&img, None, Some(&flag)),
            Err(SiftError::Cancelled)
        ));
    }
}
