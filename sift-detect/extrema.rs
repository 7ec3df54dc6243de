use rayon::prelude::*;
use sift_core::{
    CancelFlag, DogPyramid, GaussianPyramid, Keypoint, Mask, Octave, ScaleSpaceGeometry, SiftError,
    SiftResult,
};
use tracing::{debug, trace};

use crate::orientation::OrientationAssigner;
use crate::refinement::{SubpixelLocalizer, IMAGE_BORDER};
use crate::types::{Candidate, CandidateState, RejectReason};

/// Scale-space extremum search over a DoG pyramid
#[derive(Debug, Clone, Copy)]
pub struct ExtremaDetector {
    geometry: ScaleSpaceGeometry,
    contrast_threshold: f32,
    localizer: SubpixelLocalizer,
}

/// Per-octave tally, reported through tracing
#[derive(Debug, Default, Clone, Copy)]
struct RejectCounts {
    masked: usize,
    out_of_bounds: usize,
    not_converged: usize,
    singular: usize,
    low_contrast: usize,
    edge_like: usize,
    no_orientation: usize,
}

impl RejectCounts {
    fn record(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::OutOfBounds => self.out_of_bounds += 1,
            RejectReason::NotConverged => self.not_converged += 1,
            RejectReason::Singular => self.singular += 1,
            RejectReason::LowContrast => self.low_contrast += 1,
            RejectReason::EdgeLike => self.edge_like += 1,
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.masked += other.masked;
        self.out_of_bounds += other.out_of_bounds;
        self.not_converged += other.not_converged;
        self.singular += other.singular;
        self.low_contrast += other.low_contrast;
        self.edge_like += other.edge_like;
        self.no_orientation += other.no_orientation;
        self
    }
}

impl ExtremaDetector {
    pub fn new(geometry: ScaleSpaceGeometry, contrast_threshold: f32, edge_threshold: f32) -> Self {
        Self {
            geometry,
            contrast_threshold,
            localizer: SubpixelLocalizer::new(geometry.n_octave_layers, contrast_threshold, edge_threshold),
        }
    }

    /// DoG magnitude a sample must exceed before the neighbour comparison
    pub fn prefilter_threshold(&self) -> f32 {
        0.5 * self.contrast_threshold / self.geometry.n_octave_layers as f32
    }

    /// Samples of DoG `layer` that are strictly greater (or strictly smaller) than
    /// all 26 neighbours across the adjacent layers, excluding a border of
    /// `IMAGE_BORDER` pixels. Returned in row-major order.
    pub fn find_candidates(&self, dog: &Octave, octave: usize, layer: usize) -> Vec<Candidate> {
        let (w, h) = dog.dimensions();
        if layer == 0 || layer + 1 >= dog.len() || w <= 2 * IMAGE_BORDER || h <= 2 * IMAGE_BORDER {
            return Vec::new();
        }
        let threshold = self.prefilter_threshold();
        let prev = dog.layer(layer - 1);
        let cur = dog.layer(layer);
        let next = dog.layer(layer + 1);

        let mut candidates = Vec::new();
        for y in IMAGE_BORDER..h - IMAGE_BORDER {
            for x in IMAGE_BORDER..w - IMAGE_BORDER {
                let val = cur.at(x, y);
                if val.abs() <= threshold {
                    continue;
                }
                let mut is_max = true;
                let mut is_min = true;
                'neighbours: for img in [prev, cur, next] {
                    for yy in y - 1..=y + 1 {
                        for xx in x - 1..=x + 1 {
                            if std::ptr::eq(img, cur) && xx == x && yy == y {
                                continue;
                            }
                            let v = img.at(xx, yy);
                            is_max &= val > v;
                            is_min &= val < v;
                            if !is_max && !is_min {
                                break 'neighbours;
                            }
                        }
                    }
                }
                if is_max || is_min {
                    candidates.push(Candidate { octave, layer, x, y });
                }
            }
        }
        candidates
    }

    /// Detect, localize and orient extrema in every octave.
    ///
    /// Octaves and layers are processed in parallel; the result keeps octave,
    /// layer, then row-major order so repeated runs are identical.
    pub fn find_keypoints(
        &self,
        gauss: &GaussianPyramid,
        dog: &DogPyramid,
        mask: Option<&Mask>,
        cancel: Option<&CancelFlag>,
    ) -> SiftResult<Vec<Keypoint>> {
        if gauss.n_octaves() != dog.n_octaves() {
            return Err(SiftError::PyramidMismatch(format!(
                "{} gaussian octaves but {} DoG octaves",
                gauss.n_octaves(),
                dog.n_octaves()
            )));
        }
        let n = self.geometry.n_octave_layers;
        for (o, (g, d)) in gauss.octaves().iter().zip(dog.octaves()).enumerate() {
            if g.len() != n + 3 || d.len() != n + 2 || g.dimensions() != d.dimensions() {
                return Err(SiftError::PyramidMismatch(format!(
                    "octave {} has {} gaussian and {} DoG layers, expected {} and {}",
                    o,
                    g.len(),
                    d.len(),
                    n + 3,
                    n + 2
                )));
            }
        }

        let per_octave = (0..dog.n_octaves())
            .into_par_iter()
            .map(|o| {
                if cancel.is_some_and(CancelFlag::is_cancelled) {
                    return Err(SiftError::Cancelled);
                }
                let results: Vec<(Vec<Keypoint>, RejectCounts, usize)> = (1..=n)
                    .into_par_iter()
                    .map(|layer| self.keypoints_in_layer(gauss, dog.octave(o), o, layer, mask))
                    .collect();

                let mut keypoints = Vec::new();
                let mut counts = RejectCounts::default();
                let mut n_candidates = 0;
                for (kps, c, found) in results {
                    keypoints.extend(kps);
                    counts = counts.merge(c);
                    n_candidates += found;
                }
                debug!(
                    octave = o,
                    candidates = n_candidates,
                    keypoints = keypoints.len(),
                    "octave extrema"
                );
                trace!(octave = o, ?counts, "rejected candidates");
                Ok(keypoints)
            })
            .collect::<SiftResult<Vec<_>>>()?;

        Ok(per_octave.into_iter().flatten().collect())
    }

    fn keypoints_in_layer(
        &self,
        gauss: &GaussianPyramid,
        dog: &Octave,
        octave: usize,
        layer: usize,
        mask: Option<&Mask>,
    ) -> (Vec<Keypoint>, RejectCounts, usize) {
        let candidates = self.find_candidates(dog, octave, layer);
        let geometry = &self.geometry;
        let mut counts = RejectCounts::default();
        let mut keypoints = Vec::new();

        for cand in &candidates {
            if let Some(m) = mask {
                let (mx, my) = (geometry.to_input(octave, cand.x as f32), geometry.to_input(octave, cand.y as f32));
                if !m.allows(mx, my) {
                    counts.masked += 1;
                    continue;
                }
            }

            let ext = match self.localizer.localize(dog, *cand) {
                CandidateState::Accepted(ext) => ext,
                CandidateState::Rejected(reason) => {
                    counts.record(reason);
                    continue;
                }
            };

            let x = geometry.to_input(octave, ext.octave_x());
            let y = geometry.to_input(octave, ext.octave_y());
            if let Some(m) = mask {
                if !m.allows(x, y) {
                    counts.masked += 1;
                    continue;
                }
            }

            let fractional_layer = ext.fractional_layer();
            let sigma_oct = self.geometry.layer_sigma(fractional_layer);
            let Some(img) = gauss.layer(octave, ext.layer) else {
                continue;
            };
            let angles = OrientationAssigner::assign(img, ext.octave_x(), ext.octave_y(), sigma_oct);
            if angles.is_empty() {
                counts.no_orientation += 1;
                continue;
            }

            let scale = self.geometry.keypoint_scale(octave, fractional_layer);
            keypoints.extend(angles.into_iter().map(|angle| Keypoint {
                x,
                y,
                scale,
                angle,
                response: ext.contrast.abs(),
                octave,
                layer: ext.layer,
            }));
        }

        (keypoints, counts, candidates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::ImagePyramid;
    use sift_core::Image;

    const SIZE: usize = 16;

    fn geometry() -> ScaleSpaceGeometry {
        ScaleSpaceGeometry {
            n_octave_layers: 3,
            sigma: 1.6,
            base_scale: 1.0,
        }
    }

    fn detector() -> ExtremaDetector {
        ExtremaDetector::new(geometry(), 0.04, 10.0)
    }

    /// Five flat DoG layers with a single spike
    fn spike_octave(x: usize, y: usize, layer: usize, value: f32) -> Octave {
        let mut layers = vec![Image::filled(SIZE, SIZE, 0.0); 5];
        layers[layer].set(x, y, value);
        Octave::new(layers)
    }

    fn create_blob_image(size: usize, sigma: f32) -> Image {
        let c = size as f32 / 2.0;
        let data = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .map(|(x, y)| {
                let d2 = (x as f32 - c).powi(2) + (y as f32 - c).powi(2);
                (-d2 / (2.0 * sigma * sigma)).exp()
            })
            .collect();
        Image::new(size, size, data).unwrap()
    }

    #[test]
    fn test_spike_maximum_and_minimum() {
        let det = detector();
        let octave = spike_octave(8, 7, 2, 0.1);
        assert_eq!(
            det.find_candidates(&octave, 0, 2),
            vec![Candidate { octave: 0, layer: 2, x: 8, y: 7 }]
        );
        let octave = spike_octave(8, 7, 1, -0.1);
        assert_eq!(det.find_candidates(&octave, 1, 1).len(), 1);
        // Neighbouring layers see the spike as a neighbour, never as an extremum
        assert!(det.find_candidates(&octave, 1, 2).is_empty());
    }

    #[test]
    fn test_ties_are_not_extrema() {
        let det = detector();
        let mut octave_layers = vec![Image::filled(SIZE, SIZE, 0.0); 5];
        octave_layers[2].set(8, 8, 0.1);
        octave_layers[3].set(9, 9, 0.1);
        let octave = Octave::new(octave_layers);
        assert!(det.find_candidates(&octave, 0, 2).is_empty());
    }

    #[test]
    fn test_prefilter_and_border() {
        let det = detector();
        // |v| must exceed 0.5 * 0.04 / 3
        let weak = spike_octave(8, 8, 2, 0.006);
        assert!(det.find_candidates(&weak, 0, 2).is_empty());
        let at_border = spike_octave(4, 8, 2, 0.1);
        assert!(det.find_candidates(&at_border, 0, 2).is_empty());
        let inside = spike_octave(5, 8, 2, 0.1);
        assert_eq!(det.find_candidates(&inside, 0, 2).len(), 1);
        // Outermost DoG layers are never scanned
        let outer = spike_octave(8, 8, 4, 0.1);
        assert!(det.find_candidates(&outer, 0, 4).is_empty());
    }

    #[test]
    fn test_tiny_octave_has_no_candidates() {
        let octave = Octave::new(vec![Image::filled(8, 8, 0.0); 5]);
        assert!(detector().find_candidates(&octave, 0, 2).is_empty());
    }

    #[test]
    fn test_blob_yields_centered_keypoints() {
        let img = create_blob_image(64, 4.0);
        let base = ImagePyramid::create_base_image(&img, 1.6, false).unwrap();
        let gauss = ImagePyramid::build_gaussian_pyramid(&base, geometry(), None).unwrap();
        let dog = ImagePyramid::build_dog_pyramid(&gauss).unwrap();
        let kps = detector().find_keypoints(&gauss, &dog, None, None).unwrap();
        assert!(!kps.is_empty());
        let best = kps
            .iter()
            .max_by(|a, b| a.response.total_cmp(&b.response))
            .unwrap();
        assert!((best.x - 32.0).abs() < 1.5 && (best.y - 32.0).abs() < 1.5, "{:?}", best);
        for kp in &kps {
            assert!(kp.angle >= 0.0 && kp.angle < 360.0);
            assert!(kp.scale > 0.0);
            assert!(kp.response > 0.0);
        }
    }

    #[test]
    fn test_mask_excludes_region() {
        let img = create_blob_image(64, 4.0);
        let base = ImagePyramid::create_base_image(&img, 1.6, false).unwrap();
        let gauss = ImagePyramid::build_gaussian_pyramid(&base, geometry(), None).unwrap();
        let dog = ImagePyramid::build_dog_pyramid(&gauss).unwrap();

        let mut mask = Mask::filled(64, 64, 1);
        for y in 20..44 {
            for x in 20..44 {
                mask.set(x, y, 0);
            }
        }
        let kps = detector().find_keypoints(&gauss, &dog, Some(&mask), None).unwrap();
        assert!(kps.iter().all(|kp| mask.allows(kp.x, kp.y)));
    }

    #[test]
    fn test_cancelled_search() {
        let img = create_blob_image(32, 3.0);
        let base = ImagePyramid::create_base_image(&img, 1.6, false).unwrap();
        let gauss = ImagePyramid::build_gaussian_pyramid(&base, geometry(), None).unwrap();
        let dog = ImagePyramid::build_dog_pyramid(&gauss).unwrap();
        let flag = CancelFlag::new();
        flag.cancel();
        assert!(matches!(
            detector().find_keypoints(&gauss, &dog, None, Some(&flag)),
            Err(SiftError::Cancelled)
        ));
    }

    #[test]
    fn test_mismatched_pyramids() {
        let img = create_blob_image(32, 3.0);
        let gauss = ImagePyramid::build_gaussian_pyramid(&img, geometry(), Some(2)).unwrap();
        let other = ImagePyramid::build_gaussian_pyramid(&img, geometry(), Some(1)).unwrap();
        let dog = ImagePyramid::build_dog_pyramid(&other).unwrap();
        assert!(matches!(
            detector().find_keypoints(&gauss, &dog, None, None),
            Err(SiftError::PyramidMismatch(_))
        ));
    }
}
