use thiserror::Error;

/// Errors surfaced by fallible constructors. Everything else in the library
/// either cannot fail or treats failure as a caller bug.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrellisError {
    /// A runtime rank of zero was requested; containers need at least one
    /// axis (boxes need at least one user dimension).
    #[error("container rank must be at least 1")]
    InvalidRank,

    /// A neighbor bound query was handed a distance below zero.
    #[error("distance bound must not be negative")]
    NegativeDistance,
}
