use rayon::prelude::*;
use sift_core::Image;

/// Normalized 1-D Gaussian kernel
#[derive(Debug, Clone)]
pub struct GaussianKernel {
    radius: usize,
    weights: Vec<f32>,
}

impl GaussianKernel {
    /// Kernel covering ±4σ
    pub fn new(sigma: f32) -> Self {
        let radius = ((sigma * 4.0).round() as usize).max(1);
        let denom = -1.0 / (2.0 * sigma * sigma);
        let mut weights: Vec<f32> = (0..=2 * radius)
            .map(|i| {
                let d = i as f32 - radius as f32;
                (d * d * denom).exp()
            })
            .collect();
        let sum: f32 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= sum);
        Self { radius, weights }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

/// Reflect-101 border: `gfedcb|abcdefgh|gfedcba`
#[inline]
fn reflect_101(mut i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let last = n as isize - 1;
    loop {
        if i < 0 {
            i = -i;
        } else if i > last {
            i = 2 * last - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable Gaussian blur with reflect-101 borders; `sigma <= 0` returns a copy
pub fn gaussian_blur(img: &Image, sigma: f32) -> Image {
    if !(sigma > 0.0) || img.is_empty() {
        return img.clone();
    }
    let kernel = GaussianKernel::new(sigma);
    let (w, h) = img.dimensions();
    let r = kernel.radius() as isize;
    let weights = kernel.weights();

    // Horizontal pass
    let mut tmp = Image::filled(w, h, 0.0);
    tmp.data_mut()
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, out_row)| {
            let src = img.row(y);
            for (x, out) in out_row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, &wt) in weights.iter().enumerate() {
                    let xx = reflect_101(x as isize + k as isize - r, w);
                    acc += wt * src[xx];
                }
                *out = acc;
            }
        });

    // Vertical pass, accumulating whole rows for cache-friendly access
    let mut out = Image::filled(w, h, 0.0);
    out.data_mut()
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, out_row)| {
            for (k, &wt) in weights.iter().enumerate() {
                let yy = reflect_101(y as isize + k as isize - r, h);
                let src = tmp.row(yy);
                for (o, &s) in out_row.iter_mut().zip(src) {
                    *o += wt * s;
                }
            }
        });

    out
}
