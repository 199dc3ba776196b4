//! Error types for the solver engine.
//!
//! Every non-fatal error kind named in SPEC_FULL §7 is a variant here;
//! propagation is the caller's job (decorators never swallow an error,
//! they only record it alongside a cached result). Invariant violations
//! (the big-query/small-query disagreement, a missing model for a
//! synthesis constant) are not represented as a `SolverError` variant at
//! all — per §7 they abort the process, which this crate realizes as a
//! `panic!` rather than softening the contract into a `Result`.

use thiserror::Error;

/// Primary error type for the solver engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// The oracle returned an error, or timed out in a way the caller must see.
    #[error("oracle failure: {0}")]
    OracleFailure(String),

    /// Serialization produced an empty query string, or an LHS exceeded a
    /// cache's admission size.
    #[error("value too large")]
    ValueTooLarge,

    /// A cached result failed to parse back into a valid RHS.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// `constant_range`'s constant-synthesis bound was exceeded in strict
    /// (`range-max-precise`) mode.
    #[error("range imprecise: exhausted {tries} tries without a definite answer")]
    RangeImprecise { tries: u32 },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(SolverError::ValueTooLarge.to_string(), "value too large");
        assert_eq!(
            SolverError::RangeImprecise { tries: 30 }.to_string(),
            "range imprecise: exhausted 30 tries without a definite answer"
        );
    }
}
