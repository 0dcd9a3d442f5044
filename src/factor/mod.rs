//! Factorization objects.
//!
//! Each type wraps a one-time decomposition of an input matrix and exposes
//! derived quantities without re-running the decomposition. All of them
//! share the same state machine: the default value is empty, a successful
//! `factorize` makes it valid, and a failed one resets it so stale state
//! can never be queried. Calling a derived-quantity method on an empty
//! object is a usage error and panics.

pub mod cholesky;
pub mod eigen;
pub mod gsvd;
pub mod hogsvd;
pub mod lq;
pub mod lu;
pub mod qr;
pub mod svd;

pub use cholesky::Cholesky;
pub use eigen::{Eigen, EigenSym};
pub use gsvd::{Gsvd, GsvdKind};
pub use hogsvd::HogSvd;
pub use lq::Lq;
pub use lu::Lu;
pub use qr::Qr;
pub use svd::{Svd, SvdKind};
