use crate::error::{SiftError, SiftResult};

/// Row-major single-channel `f32` image, intensities normalized to `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Image {
    /// Wrap existing samples; the buffer length must equal `width * height`.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> SiftResult<Self> {
        let expected_len = width * height;
        if data.len() != expected_len {
            return Err(SiftError::InvalidImageData {
                expected_len,
                actual_len: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    /// Convert an 8-bit grayscale buffer, mapping 0..=255 onto 0.0..=1.0
    pub fn from_luma8(width: usize, height: usize, pixels: &[u8]) -> SiftResult<Self> {
        let data = pixels.iter().map(|&p| p as f32 / 255.0).collect();
        Self::new(width, height, data)
    }

    /// Image with every sample set to `value`
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// True when the image has zero area
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Central-difference gradient `(dx, dy)` in image coordinates (y grows downward).
    /// Caller guarantees `1 <= x < width - 1` and `1 <= y < height - 1`.
    #[inline]
    pub fn gradient(&self, x: usize, y: usize) -> (f32, f32) {
        let dx = self.at(x + 1, y) - self.at(x - 1, y);
        let dy = self.at(x, y + 1) - self.at(x, y - 1);
        (dx, dy)
    }

    /// Pixelwise `self - other`
    pub fn difference(&self, other: &Image) -> SiftResult<Image> {
        if self.dimensions() != other.dimensions() {
            return Err(SiftError::PyramidMismatch(format!(
                "cannot subtract {}x{} from {}x{}",
                other.width, other.height, self.width, self.height
            )));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Ok(Image {
            width: self.width,
            height: self.height,
            data,
        })
    }

    /// Fail with an input error when the image has zero area
    pub fn ensure_not_empty(&self) -> SiftResult<()> {
        if self.is_empty() {
            return Err(SiftError::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Row-major 8-bit detection mask; non-zero pixels allow keypoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Mask {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> SiftResult<Self> {
        let expected_len = width * height;
        if data.len() != expected_len {
            return Err(SiftError::InvalidImageData {
                expected_len,
                actual_len: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// True when no pixel allows detection
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Mask lookup at fractional input coordinates, rounded and clamped to the mask
    pub fn allows(&self, x: f32, y: f32) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        let xi = (x.round().max(0.0) as usize).min(self.width - 1);
        let yi = (y.round().max(0.0) as usize).min(self.height - 1);
        self.data[yi * self.width + xi] != 0
    }

    /// Check that the mask covers exactly `image`
    pub fn check_matches(&self, image: &Image) -> SiftResult<()> {
        if self.dimensions() != image.dimensions() {
            return Err(SiftError::MaskSizeMismatch {
                width: image.width(),
                height: image.height(),
                mask_width: self.width,
                mask_height: self.height,
            });
        }
        Ok(())
    }
}
