use rayon::prelude::*;
use sift_core::{Descriptor, DescriptorLength, GaussianPyramid, Image, Keypoint};
use std::f32::consts::SQRT_2;
use tracing::debug;

/// Spatial cells per side of the descriptor grid
pub const DESCR_WIDTH: usize = 4;
/// Cell width in units of the keypoint's octave sigma
pub const DESCR_SCL_FCTR: f32 = 3.0;
/// Largest component allowed after normalization
pub const DESCR_MAG_THR: f32 = 0.2;

/// Rotated 4×4 gradient-histogram descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorComputer {
    length: DescriptorLength,
}

impl DescriptorComputer {
    pub fn new(length: DescriptorLength) -> Self {
        Self { length }
    }

    /// Number of values in every descriptor this computer produces
    pub fn descriptor_size(&self) -> usize {
        self.length.len()
    }

    /// One descriptor per keypoint, in keypoint order.
    ///
    /// Each keypoint is sampled on its own Gaussian layer; indices that do not
    /// exist in `gauss` are re-resolved from the keypoint scale.
    pub fn compute(&self, gauss: &GaussianPyramid, keypoints: &[Keypoint]) -> Vec<Descriptor> {
        let geometry = gauss.geometry();
        let descriptors: Vec<Descriptor> = keypoints
            .par_iter()
            .map(|kp| {
                let (octave, layer) = match gauss.layer(kp.octave, kp.layer) {
                    Some(_) => (kp.octave, kp.layer),
                    None => geometry.locate(kp.scale, gauss.n_octaves()),
                };
                let Some(img) = gauss.layer(octave, layer) else {
                    return vec![0.0; self.descriptor_size()];
                };
                let x = geometry.to_octave(octave, kp.x);
                let y = geometry.to_octave(octave, kp.y);
                self.compute_one(img, x, y, kp.angle, kp.scale / geometry.octave_scale(octave))
            })
            .collect();
        debug!(count = descriptors.len(), size = self.descriptor_size(), "computed descriptors");
        descriptors
    }

    /// Descriptor of the patch around octave coordinates `(x, y)`, rotated by `angle`
    /// degrees, for a keypoint of octave sigma `sigma_oct`.
    ///
    /// Centres outside the layer, or a non-positive or non-finite sigma, give a zero vector.
    pub fn compute_one(&self, img: &Image, x: f32, y: f32, angle: f32, sigma_oct: f32) -> Descriptor {
        let d = DESCR_WIDTH;
        let n = self.length.orientation_bins();
        let (w, h) = (img.width() as i64, img.height() as i64);
        let inside = x >= 0.0 && y >= 0.0 && x <= (w - 1) as f32 && y <= (h - 1) as f32;
        if !inside || !(sigma_oct > 0.0) || !sigma_oct.is_finite() {
            return vec![0.0; self.descriptor_size()];
        }
        let (px, py) = (x.round() as i64, y.round() as i64);

        let (sin_t, cos_t) = angle.to_radians().sin_cos();
        let bins_per_deg = n as f32 / 360.0;
        let exp_scale = -1.0 / (0.5 * (d * d) as f32);
        let hist_width = DESCR_SCL_FCTR * sigma_oct;
        let diagonal = ((w * w + h * h) as f32).sqrt();
        let radius = (hist_width * SQRT_2 * (d as f32 + 1.0) * 0.5).round().min(diagonal) as i64;
        // Rotation folded together with the cell width
        let cos_t = cos_t / hist_width;
        let sin_t = sin_t / hist_width;

        let half = d as f32 / 2.0 - 0.5;
        let row_stride = (d + 2) * (n + 2);
        let cell_stride = n + 2;
        let mut hist = vec![0.0f32; (d + 2) * (d + 2) * (n + 2)];

        for i in -radius..=radius {
            for j in -radius..=radius {
                let (jf, i_f) = (j as f32, i as f32);
                let c_rot = jf * cos_t + i_f * sin_t;
                let r_rot = -jf * sin_t + i_f * cos_t;
                let rbin = r_rot + half;
                let cbin = c_rot + half;
                let (r, c) = (py + i, px + j);

                if !(rbin > -1.0 && rbin < d as f32 && cbin > -1.0 && cbin < d as f32) {
                    continue;
                }
                if r <= 0 || r >= h - 1 || c <= 0 || c >= w - 1 {
                    continue;
                }

                let (dx, dy) = img.gradient(c as usize, r as usize);
                let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
                let mag = (dx * dx + dy * dy).sqrt() * weight;
                let ori = (dy.atan2(dx).to_degrees() - angle).rem_euclid(360.0);
                let obin = ori * bins_per_deg;

                let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
                let (rf, cf, of) = (rbin - r0, cbin - c0, obin - o0);
                let o0 = (o0 as usize) % n;

                // Trilinear split across (row, col, orientation)
                let v_r1 = mag * rf;
                let v_r0 = mag - v_r1;
                let v_rc11 = v_r1 * cf;
                let v_rc10 = v_r1 - v_rc11;
                let v_rc01 = v_r0 * cf;
                let v_rc00 = v_r0 - v_rc01;
                let v_rco111 = v_rc11 * of;
                let v_rco110 = v_rc11 - v_rco111;
                let v_rco101 = v_rc10 * of;
                let v_rco100 = v_rc10 - v_rco101;
                let v_rco011 = v_rc01 * of;
                let v_rco010 = v_rc01 - v_rco011;
                let v_rco001 = v_rc00 * of;
                let v_rco000 = v_rc00 - v_rco001;

                let idx = (r0 + 1.0) as usize * row_stride + (c0 + 1.0) as usize * cell_stride + o0;
                hist[idx] += v_rco000;
                hist[idx + 1] += v_rco001;
                hist[idx + cell_stride] += v_rco010;
                hist[idx + cell_stride + 1] += v_rco011;
                hist[idx + row_stride] += v_rco100;
                hist[idx + row_stride + 1] += v_rco101;
                hist[idx + row_stride + cell_stride] += v_rco110;
                hist[idx + row_stride + cell_stride + 1] += v_rco111;
            }
        }

        // Fold the wrapped orientation bin and drop the padding cells
        let mut descriptor = vec![0.0f32; d * d * n];
        for i in 0..d {
            for j in 0..d {
                let idx = (i + 1) * row_stride + (j + 1) * cell_stride;
                hist[idx] += hist[idx + n];
                descriptor[(i * d + j) * n..(i * d + j + 1) * n].copy_from_slice(&hist[idx..idx + n]);
            }
        }

        normalize_and_clip(&mut descriptor);
        descriptor
    }
}

/// L2-normalize, clip at `DESCR_MAG_THR`, renormalize.
///
/// The clip level is chosen so that after renormalization every component is at
/// most `DESCR_MAG_THR` and the norm is exactly 1. That level exists only when more
/// than `1 / DESCR_MAG_THR²` components are non-zero; otherwise a single
/// clip-and-renormalize pass is applied. A zero vector stays zero.
pub fn normalize_and_clip(v: &mut [f32]) {
    let norm = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if !(norm > 0.0) || !norm.is_finite() {
        v.iter_mut().for_each(|x| *x = 0.0);
        return;
    }
    let a: Vec<f64> = v.iter().map(|&x| x as f64 / norm).collect();
    let thr = DESCR_MAG_THR as f64;

    if a.iter().all(|&x| x <= thr) {
        v.iter_mut().zip(&a).for_each(|(dst, &x)| *dst = x as f32);
        return;
    }

    let mut sorted = a.clone();
    sorted.sort_by(|p, q| q.total_cmp(p));
    let nonzero = sorted.iter().take_while(|&&x| x > 0.0).count();
    // Largest clipped count k must satisfy k < 1 / thr²
    let k_max = (1.0 / (thr * thr)).ceil() as usize - 1;

    let level = if nonzero > k_max + 1 {
        // tail[k] = sum of squares of sorted[k..]
        let mut tail = vec![0.0f64; sorted.len() + 1];
        for k in (0..sorted.len()).rev() {
            tail[k] = tail[k + 1] + sorted[k] * sorted[k];
        }
        (1..=k_max).find_map(|k| {
            let c = (thr * thr * tail[k] / (1.0 - thr * thr * k as f64)).sqrt();
            (c <= sorted[k - 1] && c >= sorted[k]).then_some(c)
        })
    } else {
        None
    };

    let clip = level.unwrap_or(thr);
    let clipped_norm = a.iter().map(|&x| x.min(clip).powi(2)).sum::<f64>().sqrt();
    v.iter_mut()
        .zip(&a)
        .for_each(|(dst, &x)| *dst = (x.min(clip) / clipped_norm) as f32);
}
