/// Raw DoG extremum found by the 26-neighbour scan, in octave pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub octave: usize,
    /// DoG layer index, `1..=n_octave_layers`
    pub layer: usize,
    pub x: usize,
    pub y: usize,
}

/// Extremum after quadratic refinement.
///
/// `(x, y, layer)` is the integer sample the fit converged on; `offset` holds the
/// remaining sub-sample displacement `[x, y, layer]`, each component in `(-0.5, 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalizedExtremum {
    pub octave: usize,
    pub layer: usize,
    pub x: usize,
    pub y: usize,
    pub offset: [f32; 3],
    /// Interpolated DoG value at the refined location
    pub contrast: f32,
}

impl LocalizedExtremum {
    /// Refined x in octave pixels
    pub fn octave_x(&self) -> f32 {
        self.x as f32 + self.offset[0]
    }

    /// Refined y in octave pixels
    pub fn octave_y(&self) -> f32 {
        self.y as f32 + self.offset[1]
    }

    /// Refined fractional layer
    pub fn fractional_layer(&self) -> f32 {
        self.layer as f32 + self.offset[2]
    }
}

/// Why a candidate did not survive localization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Iteration stepped outside the border or the scanned layers
    OutOfBounds,
    /// Offsets never settled within the iteration limit
    NotConverged,
    /// Hessian could not be inverted
    Singular,
    LowContrast,
    /// Principal curvature ratio too large
    EdgeLike,
}

/// Outcome of localizing one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandidateState {
    Accepted(LocalizedExtremum),
    Rejected(RejectReason),
}

impl CandidateState {
    pub fn accepted(self) -> Option<LocalizedExtremum> {
        match self {
            CandidateState::Accepted(ext) => Some(ext),
            CandidateState::Rejected(_) => None,
        }
    }
}
