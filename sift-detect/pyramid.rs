use rayon::prelude::*;
use sift_core::{DogPyramid, GaussianPyramid, Image, Octave, ScaleSpaceGeometry, SiftError, SiftResult};
use tracing::debug;

use crate::blur::gaussian_blur;

/// Blur assumed to be already present in the input image (input pixels)
pub const INPUT_BLUR: f32 = 0.5;

/// Smallest side length an octave may shrink to when the count is derived
pub const MIN_OCTAVE_SIZE: usize = 8;

/// Gaussian and Difference-of-Gaussian scale-space construction
pub struct ImagePyramid;

impl ImagePyramid {
    /// Prepare the octave-0 base image: optional 2× upsampling, then blur up to `sigma`
    pub fn create_base_image(img: &Image, sigma: f32, upsample: bool) -> SiftResult<Image> {
        img.ensure_not_empty()?;
        if upsample {
            let assumed = 2.0 * INPUT_BLUR;
            let sig_diff = (sigma * sigma - assumed * assumed).max(0.01).sqrt();
            Ok(gaussian_blur(&Self::upsample_2x(img), sig_diff))
        } else {
            let sig_diff = (sigma * sigma - INPUT_BLUR * INPUT_BLUR).max(0.01).sqrt();
            Ok(gaussian_blur(img, sig_diff))
        }
    }

    /// Number of octaves for a base image, keeping the smallest at least `MIN_OCTAVE_SIZE`
    pub fn octave_count(width: usize, height: usize) -> usize {
        let mut dim = width.min(height);
        let mut count = 0;
        while dim >= MIN_OCTAVE_SIZE {
            count += 1;
            dim /= 2;
        }
        count
    }

    /// Incremental blur between consecutive layers of an octave.
    ///
    /// Entry 0 is the absolute base blur; entry `i` takes layer `i - 1` (blur `σ k^(i-1)`)
    /// to layer `i` (blur `σ k^i`), with `k = 2^(1/n_octave_layers)`.
    pub fn sigma_schedule(sigma: f32, n_octave_layers: usize) -> Vec<f32> {
        let k = 2f64.powf(1.0 / n_octave_layers as f64);
        let sigma = sigma as f64;
        let mut sig = Vec::with_capacity(n_octave_layers + 3);
        sig.push(sigma as f32);
        for i in 1..n_octave_layers + 3 {
            let sig_prev = k.powi(i as i32 - 1) * sigma;
            let sig_total = sig_prev * k;
            sig.push((sig_total * sig_total - sig_prev * sig_prev).sqrt() as f32);
        }
        sig
    }

    /// Build the Gaussian pyramid from a prepared base image.
    ///
    /// `n_octaves = None` derives the count from the base resolution.
    pub fn build_gaussian_pyramid(
        base: &Image,
        geometry: ScaleSpaceGeometry,
        n_octaves: Option<usize>,
    ) -> SiftResult<GaussianPyramid> {
        base.ensure_not_empty()?;
        if geometry.n_octave_layers == 0 {
            return Err(SiftError::InvalidConfiguration(
                "n_octave_layers must be > 0".to_string(),
            ));
        }

        let (w, h) = base.dimensions();
        let n_octaves = match n_octaves {
            Some(0) => {
                return Err(SiftError::InvalidConfiguration(
                    "n_octaves must be > 0".to_string(),
                ))
            }
            Some(n) => {
                // Every octave must keep at least one pixel per side
                if n > usize::BITS as usize || (w.min(h) >> (n - 1)) == 0 {
                    return Err(SiftError::InvalidConfiguration(format!(
                        "{} octaves requested but a {}x{} base supports at most {}",
                        n,
                        w,
                        h,
                        usize::BITS - w.min(h).leading_zeros()
                    )));
                }
                n
            }
            None => {
                let derived = Self::octave_count(w, h);
                if derived == 0 {
                    return Err(SiftError::InvalidConfiguration(format!(
                        "base image {}x{} is smaller than the minimum octave size {}",
                        w, h, MIN_OCTAVE_SIZE
                    )));
                }
                derived
            }
        };

        let n_layers = geometry.n_octave_layers;
        let sig = Self::sigma_schedule(geometry.sigma, n_layers);
        let mut octaves: Vec<Octave> = Vec::with_capacity(n_octaves);

        for o in 0..n_octaves {
            let first = match octaves.last() {
                None => base.clone(),
                Some(prev) => Self::downsample_2x(prev.layer(n_layers)),
            };
            let mut layers = Vec::with_capacity(n_layers + 3);
            layers.push(first);
            for s in sig.iter().skip(1) {
                let next = gaussian_blur(&layers[layers.len() - 1], *s);
                layers.push(next);
            }
            let octave = Octave::new(layers);
            let (ow, oh) = octave.dimensions();
            debug!(octave = o, width = ow, height = oh, "built gaussian octave");
            octaves.push(octave);
        }

        Ok(GaussianPyramid::new(octaves, geometry))
    }

    /// DoG layer `i` = Gaussian layer `i + 1` − Gaussian layer `i`, octaves in parallel
    pub fn build_dog_pyramid(gauss: &GaussianPyramid) -> SiftResult<DogPyramid> {
        let octaves = gauss
            .octaves()
            .par_iter()
            .map(|octave| {
                let layers = octave
                    .layers()
                    .windows(2)
                    .map(|pair| pair[1].difference(&pair[0]))
                    .collect::<SiftResult<Vec<_>>>()?;
                Ok(Octave::new(layers))
            })
            .collect::<SiftResult<Vec<_>>>()?;
        Ok(DogPyramid::new(octaves, *gauss.geometry()))
    }

    /// Double the resolution with bilinear interpolation (half-pixel centred sampling)
    pub fn upsample_2x(img: &Image) -> Image {
        let (w, h) = img.dimensions();
        let (tw, th) = (w * 2, h * 2);
        let mut out = Image::filled(tw, th, 0.0);
        out.data_mut()
            .par_chunks_mut(tw)
            .enumerate()
            .for_each(|(y, row)| {
                let sy = ((y as f32 + 0.5) * 0.5 - 0.5).max(0.0);
                for (x, dst) in row.iter_mut().enumerate() {
                    let sx = ((x as f32 + 0.5) * 0.5 - 0.5).max(0.0);
                    *dst = Self::bilinear_sample(img, sx, sy);
                }
            });
        out
    }

    /// Halve the resolution keeping every second pixel
    pub fn downsample_2x(img: &Image) -> Image {
        let (w, h) = img.dimensions();
        let (tw, th) = (w / 2, h / 2);
        let mut out = Image::filled(tw, th, 0.0);
        for y in 0..th {
            for x in 0..tw {
                out.set(x, y, img.at(x * 2, y * 2));
            }
        }
        out
    }

    /// Sample image at fractional coordinates using bilinear interpolation
    fn bilinear_sample(img: &Image, x: f32, y: f32) -> f32 {
        let (width, height) = img.dimensions();
        let x1 = (x.floor() as usize).min(width - 1);
        let y1 = (y.floor() as usize).min(height - 1);
        let x2 = (x1 + 1).min(width - 1);
        let y2 = (y1 + 1).min(height - 1);

        let fx = x - x1 as f32;
        let fy = y - y1 as f32;

        let p11 = img.at(x1, y1);
        let p12 = img.at(x2, y1);
        let p21 = img.at(x1, y2);
        let p22 = img.at(x2, y2);

        let interpolated_top = p11 * (1.0 - fx) + p12 * fx;
        let interpolated_bottom = p21 * (1.0 - fx) + p22 * fx;

        interpolated_top * (1.0 - fy) + interpolated_bottom * fy
    }
}
