use sift_core::{Image, Octave};

use crate::types::{Candidate, CandidateState, LocalizedExtremum, RejectReason};

/// Maximum quadratic-fit iterations per candidate
pub const MAX_INTERP_STEPS: usize = 5;

/// Pixels at the octave border never hold an extremum
pub const IMAGE_BORDER: usize = 5;

/// Gradient and Hessian of the DoG function at one sample, `[x, y, layer]` order
#[derive(Debug, Clone, Copy)]
struct Derivatives {
    gradient: [f64; 3],
    hessian: [[f64; 3]; 3],
}

/// Sub-pixel / sub-layer refinement of DoG extrema with contrast and edge rejection
#[derive(Debug, Clone, Copy)]
pub struct SubpixelLocalizer {
    n_octave_layers: usize,
    contrast_threshold: f32,
    edge_threshold: f32,
}

impl SubpixelLocalizer {
    pub fn new(n_octave_layers: usize, contrast_threshold: f32, edge_threshold: f32) -> Self {
        Self {
            n_octave_layers,
            contrast_threshold,
            edge_threshold,
        }
    }

    /// Iteratively fit a 3-D quadratic around `candidate` in the DoG octave `dog`.
    ///
    /// The sample moves by the rounded offset until every component is below 0.5;
    /// the converged extremum must then pass the contrast and edge tests.
    pub fn localize(&self, dog: &Octave, candidate: Candidate) -> CandidateState {
        let (w, h) = dog.dimensions();
        let n = self.n_octave_layers as i64;
        let (mut x, mut y, mut layer) = (candidate.x as i64, candidate.y as i64, candidate.layer as i64);
        let mut offset = [0.0f64; 3];
        let mut converged = false;

        for _ in 0..MAX_INTERP_STEPS {
            let d = Self::derivatives(dog, x as usize, y as usize, layer as usize);
            offset = match Self::solve(&d.hessian, &d.gradient) {
                Some(step) => [-step[0], -step[1], -step[2]],
                None => return CandidateState::Rejected(RejectReason::Singular),
            };

            if offset.iter().all(|o| o.abs() < 0.5) {
                converged = true;
                break;
            }
            // Steps this large can never land back inside the octave
            if offset.iter().any(|o| o.abs() > (i32::MAX / 3) as f64) {
                return CandidateState::Rejected(RejectReason::OutOfBounds);
            }

            x += offset[0].round() as i64;
            y += offset[1].round() as i64;
            layer += offset[2].round() as i64;

            let border = IMAGE_BORDER as i64;
            if layer < 1
                || layer > n
                || x < border
                || x >= w as i64 - border
                || y < border
                || y >= h as i64 - border
            {
                return CandidateState::Rejected(RejectReason::OutOfBounds);
            }
        }

        if !converged {
            return CandidateState::Rejected(RejectReason::NotConverged);
        }

        let (x, y, layer) = (x as usize, y as usize, layer as usize);
        let d = Self::derivatives(dog, x, y, layer);
        let value = dog.layer(layer).at(x, y) as f64;
        let t: f64 = d.gradient.iter().zip(&offset).map(|(g, o)| g * o).sum();
        let contrast = value + 0.5 * t;

        if contrast.abs() * (self.n_octave_layers as f64) < self.contrast_threshold as f64 {
            return CandidateState::Rejected(RejectReason::LowContrast);
        }

        // Ratio of principal curvatures from the 2x2 spatial Hessian
        let (dxx, dyy, dxy) = (d.hessian[0][0], d.hessian[1][1], d.hessian[0][1]);
        let tr = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let edge = self.edge_threshold as f64;
        if det <= 0.0 || tr * tr * edge >= (edge + 1.0) * (edge + 1.0) * det {
            return CandidateState::Rejected(RejectReason::EdgeLike);
        }

        CandidateState::Accepted(LocalizedExtremum {
            octave: candidate.octave,
            layer,
            x,
            y,
            offset: [offset[0] as f32, offset[1] as f32, offset[2] as f32],
            contrast: contrast as f32,
        })
    }

    /// Central-difference derivatives at an interior DoG sample
    fn derivatives(dog: &Octave, x: usize, y: usize, layer: usize) -> Derivatives {
        let prev = dog.layer(layer - 1);
        let cur = dog.layer(layer);
        let next = dog.layer(layer + 1);
        let at = |img: &Image, xx: usize, yy: usize| img.at(xx, yy) as f64;

        let v2 = 2.0 * at(cur, x, y);
        let dx = (at(cur, x + 1, y) - at(cur, x - 1, y)) * 0.5;
        let dy = (at(cur, x, y + 1) - at(cur, x, y - 1)) * 0.5;
        let ds = (at(next, x, y) - at(prev, x, y)) * 0.5;

        let dxx = at(cur, x + 1, y) + at(cur, x - 1, y) - v2;
        let dyy = at(cur, x, y + 1) + at(cur, x, y - 1) - v2;
        let dss = at(next, x, y) + at(prev, x, y) - v2;
        let dxy = (at(cur, x + 1, y + 1) - at(cur, x - 1, y + 1) - at(cur, x + 1, y - 1)
            + at(cur, x - 1, y - 1))
            * 0.25;
        let dxs = (at(next, x + 1, y) - at(next, x - 1, y) - at(prev, x + 1, y) + at(prev, x - 1, y))
            * 0.25;
        let dys = (at(next, x, y + 1) - at(next, x, y - 1) - at(prev, x, y + 1) + at(prev, x, y - 1))
            * 0.25;

        Derivatives {
            gradient: [dx, dy, ds],
            hessian: [[dxx, dxy, dxs], [dxy, dyy, dys], [dxs, dys, dss]],
        }
    }

    /// Solve `m * v = b` by Cramer's rule; `None` when `m` is singular
    fn solve(m: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
        let det3 = |c0: [f64; 3], c1: [f64; 3], c2: [f64; 3]| {
            c0[0] * (c1[1] * c2[2] - c1[2] * c2[1]) - c1[0] * (c0[1] * c2[2] - c0[2] * c2[1])
                + c2[0] * (c0[1] * c1[2] - c0[2] * c1[1])
        };
        let col = |j: usize| [m[0][j], m[1][j], m[2][j]];
        let (c0, c1, c2) = (col(0), col(1), col(2));

        let det = det3(c0, c1, c2);
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let v = [
            det3(*b, c1, c2) / det,
            det3(c0, *b, c2) / det,
            det3(c0, c1, *b) / det,
        ];
        v.iter().all(|x| x.is_finite()).then_some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 21;

    /// Five DoG layers sampling `f(x, y, s)`
    fn dog_octave(f: impl Fn(f32, f32, f32) -> f32) -> Octave {
        let layers = (0..5)
            .map(|s| {
                let data = (0..SIZE)
                    .flat_map(|y| (0..SIZE).map(move |x| (x, y)))
                    .map(|(x, y)| f(x as f32, y as f32, s as f32))
                    .collect();
                Image::new(SIZE, SIZE, data).unwrap()
            })
            .collect();
        Octave::new(layers)
    }

    fn peak(amplitude: f32, x0: f32, y0: f32, s0: f32) -> Octave {
        dog_octave(move |x, y, s| {
            amplitude - 0.01 * ((x - x0).powi(2) + (y - y0).powi(2)) - 0.02 * (s - s0).powi(2)
        })
    }

    fn candidate(x: usize, y: usize, layer: usize) -> Candidate {
        Candidate { octave: 0, layer, x, y }
    }

    fn localizer() -> SubpixelLocalizer {
        SubpixelLocalizer::new(3, 0.04, 10.0)
    }

    #[test]
    fn test_quadratic_peak_is_recovered() {
        let dog = peak(0.1, 10.3, 9.8, 2.2);
        let ext = localizer()
            .localize(&dog, candidate(10, 10, 2))
            .accepted()
            .expect("peak should be accepted");
        assert_eq!((ext.x, ext.y, ext.layer), (10, 10, 2));
        assert!((ext.octave_x() - 10.3).abs() < 1e-3);
        assert!((ext.octave_y() - 9.8).abs() < 1e-3);
        assert!((ext.fractional_layer() - 2.2).abs() < 1e-3);
        assert!((ext.contrast - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_candidate_moves_to_nearest_sample() {
        let dog = peak(0.1, 12.1, 8.4, 2.0);
        let ext = localizer().localize(&dog, candidate(10, 10, 2)).accepted().unwrap();
        assert_eq!((ext.x, ext.y), (12, 8));
        assert!(ext.offset.iter().all(|o| o.abs() < 0.5));
    }

    #[test]
    fn test_low_contrast_rejected() {
        let dog = peak(0.005, 10.0, 10.0, 2.0);
        assert_eq!(
            localizer().localize(&dog, candidate(10, 10, 2)),
            CandidateState::Rejected(RejectReason::LowContrast)
        );
    }

    #[test]
    fn test_edge_like_rejected() {
        let dog = dog_octave(|x, y, s| {
            0.1 - 0.01 * (x - 10.3).powi(2) - 0.0001 * (y - 10.0).powi(2) - 0.02 * (s - 2.0).powi(2)
        });
        assert_eq!(
            localizer().localize(&dog, candidate(10, 10, 2)),
            CandidateState::Rejected(RejectReason::EdgeLike)
        );
    }

    #[test]
    fn test_drifting_out_of_octave_rejected() {
        let dog = peak(0.1, 18.0, 10.0, 2.0);
        assert_eq!(
            localizer().localize(&dog, candidate(10, 10, 2)),
            CandidateState::Rejected(RejectReason::OutOfBounds)
        );
    }

    #[test]
    fn test_flat_region_is_singular() {
        let dog = dog_octave(|_, _, _| 0.2);
        assert_eq!(
            localizer().localize(&dog, candidate(10, 10, 2)),
            CandidateState::Rejected(RejectReason::Singular)
        );
    }

    #[test]
    fn test_solve() {
        let m = [[2.0, 0.0, 0.0], [0.0, 4.0, 1.0], [0.0, 1.0, 3.0]];
        let b = [2.0, 5.0, 4.0];
        let v = SubpixelLocalizer::solve(&m, &b).unwrap();
        assert!((v[0] - 1.0).abs() < 1e-12);
        assert!((v[1] - 1.0).abs() < 1e-12);
        assert!((v[2] - 1.0).abs() < 1e-12);
        assert!(SubpixelLocalizer::solve(&[[0.0; 3]; 3], &b).is_none());
    }
}
