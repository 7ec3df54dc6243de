use sift_core::Image;

/// Orientation histogram resolution (10° per bin)
pub const ORI_HIST_BINS: usize = 36;
/// Gaussian weighting window, relative to the keypoint's octave sigma
pub const ORI_SIG_FCTR: f32 = 1.5;
/// Sampling radius, in units of the weighting sigma
pub const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
/// Secondary peaks within this fraction of the maximum spawn extra keypoints
pub const ORI_PEAK_RATIO: f32 = 0.8;
/// Circular box-filter passes applied before peak picking
pub const ORI_SMOOTH_PASSES: usize = 6;

pub type OrientationHistogram = [f32; ORI_HIST_BINS];

/// Dominant gradient orientation(s) around a keypoint
pub struct OrientationAssigner;

impl OrientationAssigner {
    /// Orientations in degrees, `[0, 360)`, for a keypoint at octave coordinates
    /// `(x, y)` with octave sigma `sigma_oct`, measured on its Gaussian layer `img`.
    ///
    /// Empty when the histogram has no peak.
    pub fn assign(img: &Image, x: f32, y: f32, sigma_oct: f32) -> Vec<f32> {
        let radius = (ORI_RADIUS * sigma_oct).round() as i64;
        let mut hist = Self::histogram(img, x.round() as i64, y.round() as i64, radius, ORI_SIG_FCTR * sigma_oct);
        Self::smooth(&mut hist);
        Self::peaks(&hist)
    }

    /// Gaussian-weighted gradient magnitude histogram over a disc of `radius`
    pub fn histogram(img: &Image, cx: i64, cy: i64, radius: i64, sigma: f32) -> OrientationHistogram {
        let (w, h) = (img.width() as i64, img.height() as i64);
        let expf_scale = -1.0 / (2.0 * sigma * sigma);
        let mut hist = [0.0f32; ORI_HIST_BINS];

        for i in -radius..=radius {
            let y = cy + i;
            if y <= 0 || y >= h - 1 {
                continue;
            }
            for j in -radius..=radius {
                let x = cx + j;
                if x <= 0 || x >= w - 1 || i * i + j * j > radius * radius {
                    continue;
                }
                let (dx, dy) = img.gradient(x as usize, y as usize);
                let mag = (dx * dx + dy * dy).sqrt();
                if mag == 0.0 {
                    continue;
                }
                let weight = (((i * i + j * j) as f32) * expf_scale).exp();
                let angle = dy.atan2(dx).to_degrees().rem_euclid(360.0);
                let bin = (angle * ORI_HIST_BINS as f32 / 360.0).round() as usize % ORI_HIST_BINS;
                hist[bin] += weight * mag;
            }
        }
        hist
    }

    /// Repeated circular 3-tap box filter
    pub fn smooth(hist: &mut OrientationHistogram) {
        let n = ORI_HIST_BINS;
        for _ in 0..ORI_SMOOTH_PASSES {
            let prev = *hist;
            for i in 0..n {
                hist[i] = (prev[(i + n - 1) % n] + prev[i] + prev[(i + 1) % n]) / 3.0;
            }
        }
    }

    /// Strict local maxima within `ORI_PEAK_RATIO` of the global maximum,
    /// parabolically interpolated and converted to degrees
    pub fn peaks(hist: &OrientationHistogram) -> Vec<f32> {
        let n = ORI_HIST_BINS;
        let max = hist.iter().copied().fold(0.0f32, f32::max);
        if !(max > 0.0) {
            return Vec::new();
        }
        let threshold = max * ORI_PEAK_RATIO;

        (0..n)
            .filter_map(|i| {
                let l = hist[(i + n - 1) % n];
                let c = hist[i];
                let r = hist[(i + 1) % n];
                if !(c > l && c > r && c >= threshold) {
                    return None;
                }
                let mut bin = i as f32 + 0.5 * (l - r) / (l - 2.0 * c + r);
                if bin < 0.0 {
                    bin += n as f32;
                } else if bin >= n as f32 {
                    bin -= n as f32;
                }
                let angle = bin * 360.0 / n as f32;
                Some(if angle >= 360.0 { angle - 360.0 } else { angle })
            })
            .collect()
    }
}
