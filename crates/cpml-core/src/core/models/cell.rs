use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CellError {
    #[error("Cell vectors are linearly dependent (determinant {determinant:.3e})")]
    Singular { determinant: f64 },
}

/// Periodic simulation cell spanned by three lattice vectors.
///
/// The vectors are stored column-wise, so `vectors * f` maps fractional coordinates `f`
/// to Cartesian coordinates. Triclinic cells are supported.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCell {
    vectors: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl UnitCell {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Result<Self, CellError> {
        let vectors = Matrix3::from_columns(&[a, b, c]);
        let determinant = vectors.determinant();
        if determinant.abs() < 1e-12 {
            return Err(CellError::Singular { determinant });
        }
        let inverse = vectors
            .try_inverse()
            .ok_or(CellError::Singular { determinant })?;
        Ok(Self { vectors, inverse })
    }

    /// Builds a cell from nine numbers in `ax ay az bx by bz cx cy cz` order.
    pub fn from_flat(values: [f64; 9]) -> Result<Self, CellError> {
        Self::new(
            Vector3::new(values[0], values[1], values[2]),
            Vector3::new(values[3], values[4], values[5]),
            Vector3::new(values[6], values[7], values[8]),
        )
    }

    pub fn cubic(length: f64) -> Result<Self, CellError> {
        Self::new(
            Vector3::new(length, 0.0, 0.0),
            Vector3::new(0.0, length, 0.0),
            Vector3::new(0.0, 0.0, length),
        )
    }

    pub fn volume(&self) -> f64 {
        self.vectors.determinant().abs()
    }

    /// Shortest periodic image of a displacement.
    pub fn minimum_image(&self, displacement: &Vector3<f64>) -> Vector3<f64> {
        let fractional = self.inverse * displacement;
        let wrapped = fractional.map(|f| f - f.round());
        self.vectors * wrapped
    }
}
