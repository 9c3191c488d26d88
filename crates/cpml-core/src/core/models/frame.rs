use nalgebra::Point3;

/// Positions of one trajectory snapshot. Species and cell are constant for a run and
/// travel once in the run manifest, so only coordinates move per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    pub index: usize,
    pub positions: Vec<Point3<f64>>,
}

impl FrameData {
    pub fn new(index: usize, positions: Vec<Point3<f64>>) -> Self {
        Self { index, positions }
    }
}

/// Unit of work handed to a rank for one round.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Real(FrameData),
    /// Placeholder for ranks that have no real frame in a partial round.
    Padding,
}

