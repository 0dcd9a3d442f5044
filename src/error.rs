use thiserror::Error;

// Two error channels: programming mistakes (bad shapes, aliased regions,
// querying an empty factorization) panic with the message constants below,
// while data-dependent outcomes (ill-conditioned systems, malformed byte
// streams) are returned as `Error` values.

/// Errors returned, rather than panicked, by engine operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The operation completed and the answer was delivered, but the
    /// estimated condition number of the system exceeds
    /// [`CONDITION_TOLERANCE`], so the result may be numerically
    /// unreliable. An infinite estimate means the matrix is exactly
    /// singular and no meaningful answer exists.
    #[error("matrix singular or near-singular with condition number {0}")]
    Condition(f64),
    #[error("resulting data buffer too big")]
    TooBig,
    #[error("input buffer too small")]
    TooSmall,
    #[error("data buffer size mismatch")]
    BadBuffer,
    #[error("invalid dimension")]
    BadSize,
}

impl Error {
    /// Whether the error is a condition diagnostic, i.e. an answer was
    /// computed but flagged as numerically suspect.
    pub fn is_condition(&self) -> bool {
        matches!(self, Error::Condition(_))
    }
}

/// Condition-number threshold above which solve operations return an
/// [`Error::Condition`] diagnostic alongside the computed answer.
pub const CONDITION_TOLERANCE: f64 = 1e16;

// Shape and usage violations. These abort: no retry can make a 3x4 plus a
// 2x2 meaningful, and catching them would only mask the caller's bug.
pub const ERR_SHAPE: &str = "densolve: dimension mismatch";
pub const ERR_SQUARE: &str = "densolve: expected square matrix";
pub const ERR_ROW_ACCESS: &str = "densolve: row index out of range";
pub const ERR_COL_ACCESS: &str = "densolve: column index out of range";
pub const ERR_INDEX_OUT_OF_RANGE: &str = "densolve: index out of range";
pub const ERR_TRIANGLE_SET: &str = "densolve: triangular set out of bounds";
pub const ERR_SLICE_LENGTH_MISMATCH: &str = "densolve: improper slice length";
pub const ERR_ZERO_LENGTH: &str = "densolve: zero length in matrix dimension";

// Region violations raised by the aliasing guard.
pub const REGION_OVERLAP: &str = "densolve: bad region: overlap";
pub const REGION_IDENTITY: &str = "densolve: bad region: identical";
pub const MISMATCHED_STRIDES: &str = "densolve: bad region: different strides";

// Derived-quantity methods called on empty or failed factorizations.
pub const BAD_CHOLESKY: &str = "densolve: invalid Cholesky factorization";
pub const BAD_LU: &str = "densolve: invalid LU factorization";
pub const BAD_QR: &str = "densolve: invalid QR factorization";
pub const BAD_LQ: &str = "densolve: invalid LQ factorization";
pub const BAD_SVD: &str = "densolve: invalid SVD factorization";
pub const BAD_GSVD: &str = "densolve: invalid GSVD factorization";
pub const BAD_HOGSVD: &str = "densolve: invalid HOGSVD factorization";
pub const BAD_EIGEN: &str = "densolve: invalid eigendecomposition";
pub const BAD_TRIANGLE: &str = "densolve: invalid triangle";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_is_returned_not_fatal() {
        let err = Error::Condition(1.5e17);
        assert!(err.is_condition());
        assert!(!Error::BadSize.is_condition());
        assert!(err.to_string().contains("condition number"));
    }
}
