use crate::image::Image;

/// Layers of one octave; all share the octave's resolution
#[derive(Debug, Clone)]
pub struct Octave {
    layers: Vec<Image>,
}

impl Octave {
    pub fn new(layers: Vec<Image>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Image] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> &Image {
        &self.layers[index]
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// (width, height) of the octave, (0, 0) when it holds no layers
    pub fn dimensions(&self) -> (usize, usize) {
        self.layers.first().map(Image::dimensions).unwrap_or((0, 0))
    }
}

/// Mapping between pyramid coordinates and input image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleSpaceGeometry {
    pub n_octave_layers: usize,
    /// Blur of layer 0 in every octave, in octave pixels
    pub sigma: f32,
    /// Input pixels per base-image pixel: 0.5 when the input was upsampled, else 1
    pub base_scale: f32,
}

impl ScaleSpaceGeometry {
    /// Input pixels per pixel of `octave`
    pub fn octave_scale(&self, octave: usize) -> f32 {
        self.base_scale * (1u64 << octave) as f32
    }

    /// Input-image position of octave coordinate `v`.
    ///
    /// Upsampling samples at pixel centres, so base pixel `u` lies at input
    /// `u / 2 - 0.25`; nearest downsampling keeps that origin in every octave.
    pub fn to_input(&self, octave: usize, v: f32) -> f32 {
        v * self.octave_scale(octave) + self.origin()
    }

    /// Inverse of [`ScaleSpaceGeometry::to_input`]
    pub fn to_octave(&self, octave: usize, x: f32) -> f32 {
        (x - self.origin()) / self.octave_scale(octave)
    }

    fn origin(&self) -> f32 {
        0.5 * (self.base_scale - 1.0)
    }

    /// Blur (octave pixels) of the possibly fractional `layer`
    pub fn layer_sigma(&self, layer: f32) -> f32 {
        self.sigma * 2f32.powf(layer / self.n_octave_layers as f32)
    }

    /// Keypoint scale in input pixels for an extremum at (`octave`, `layer`)
    pub fn keypoint_scale(&self, octave: usize, layer: f32) -> f32 {
        self.layer_sigma(layer) * self.octave_scale(octave)
    }

    /// Resolve the (octave, Gaussian layer) whose blur best matches `scale` (input pixels)
    pub fn locate(&self, scale: f32, n_octaves: usize) -> (usize, usize) {
        if n_octaves == 0 {
            return (0, 0);
        }
        let n = self.n_octave_layers as f32;
        let log = (scale / self.base_scale / self.sigma).log2();
        if !log.is_finite() || log <= 0.0 {
            return (0, 0);
        }
        let octave = (log.floor() as usize).min(n_octaves - 1);
        let layer = ((log - octave as f32) * n).round().max(0.0) as usize;
        (octave, layer.min(self.n_octave_layers + 2))
    }
}

/// Gaussian scale space: `n_octave_layers + 3` layers per octave
#[derive(Debug, Clone)]
pub struct GaussianPyramid {
    octaves: Vec<Octave>,
    geometry: ScaleSpaceGeometry,
}

impl GaussianPyramid {
    pub fn new(octaves: Vec<Octave>, geometry: ScaleSpaceGeometry) -> Self {
        Self { octaves, geometry }
    }

    pub fn octaves(&self) -> &[Octave] {
        &self.octaves
    }

    pub fn octave(&self, index: usize) -> &Octave {
        &self.octaves[index]
    }

    pub fn n_octaves(&self) -> usize {
        self.octaves.len()
    }

    pub fn geometry(&self) -> &ScaleSpaceGeometry {
        &self.geometry
    }

    /// Layer lookup that tolerates out-of-range indices
    pub fn layer(&self, octave: usize, layer: usize) -> Option<&Image> {
        self.octaves.get(octave).and_then(|o| o.layers().get(layer))
    }
}

/// Difference-of-Gaussian scale space: `n_octave_layers + 2` layers per octave
#[derive(Debug, Clone)]
pub struct DogPyramid {
    octaves: Vec<Octave>,
    geometry: ScaleSpaceGeometry,
}

impl DogPyramid {
    pub fn new(octaves: Vec<Octave>, geometry: ScaleSpaceGeometry) -> Self {
        Self { octaves, geometry }
    }

    pub fn octaves(&self) -> &[Octave] {
        &self.octaves
    }

    pub fn octave(&self, index: usize) -> &Octave {
        &self.octaves[index]
    }

    pub fn n_octaves(&self) -> usize {
        self.octaves.len()
    }

    pub fn geometry(&self) -> &ScaleSpaceGeometry {
        &self.geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(base_scale: f32) -> ScaleSpaceGeometry {
        ScaleSpaceGeometry {
            n_octave_layers: 3,
            sigma: 1.6,
            base_scale,
        }
    }

    #[test]
    fn test_octave_scale() {
        let g = geometry(0.5);
        assert_eq!(g.octave_scale(0), 0.5);
        assert_eq!(g.octave_scale(3), 4.0);
        assert_eq!(geometry(1.0).octave_scale(2), 4.0);
    }

    #[test]
    fn test_coordinate_mapping() {
        let up = geometry(0.5);
        assert_eq!(up.to_input(0, 64.5), 32.0);
        assert_eq!(up.to_input(1, 32.25), 32.0);
        assert_eq!(up.to_input(2, 0.0), -0.25);
        let plain = geometry(1.0);
        assert_eq!(plain.to_input(0, 10.0), 10.0);
        assert_eq!(plain.to_input(2, 10.0), 40.0);
        for g in [up, plain] {
            for octave in 0..4 {
                let x = 20.3f32;
                assert!((g.to_input(octave, g.to_octave(octave, x)) - x).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_keypoint_scale_formula() {
        let g = geometry(1.0);
        let s = g.keypoint_scale(2, 1.5);
        let expected = 1.6 * 2f32.powf(0.5) * 4.0;
        assert!((s - expected).abs() < 1e-5);
    }

    #[test]
    fn test_locate_inverts_keypoint_scale() {
        let g = geometry(0.5);
        for octave in 0..4 {
            for layer in 1..=3 {
                for offset in [-0.4f32, 0.0, 0.3] {
                    let scale = g.keypoint_scale(octave, layer as f32 + offset);
                    let (o, l) = g.locate(scale, 5);
                    // Same blur level, possibly expressed as layer 0 of the next octave
                    let located = g.keypoint_scale(o, l as f32);
                    let nominal = g.keypoint_scale(octave, layer as f32);
                    assert!((located / nominal - 1.0).abs() < 1e-4, "o={} l={} off={}", octave, layer, offset);
                }
            }
        }
    }

    #[test]
    fn test_locate_clamps() {
        let g = geometry(1.0);
        assert_eq!(g.locate(0.1, 4), (0, 0));
        assert_eq!(g.locate(f32::NAN, 4), (0, 0));
        let (o, l) = g.locate(10_000.0, 4);
        assert_eq!(o, 3);
        assert_eq!(l, 5);
        assert_eq!(g.locate(3.0, 0), (0, 0));
    }

    #[test]
    fn test_pyramid_layer_lookup() {
        let octave = Octave::new(vec![Image::filled(4, 4, 0.0); 6]);
        let pyr = GaussianPyramid::new(vec![octave], geometry(1.0));
        assert_eq!(pyr.n_octaves(), 1);
        assert_eq!(pyr.octave(0).dimensions(), (4, 4));
        assert!(pyr.layer(0, 5).is_some());
        assert!(pyr.layer(0, 6).is_none());
        assert!(pyr.layer(1, 0).is_none());
    }
}
