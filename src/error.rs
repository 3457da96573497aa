//! Errors of the validating construction boundary.
//!
//! Preprocessing itself is infallible over a well-formed graph; only the
//! builder surface reports errors.

use thiserror::Error;

/// Rejections raised while building a Boolean graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A vote gate was requested with a vote number below two.
    /// A 1-of-N vote is an OR gate and an 0-of-N vote is a constant,
    /// neither of which is a vote gate.
    #[error("vote number {0} is below the minimum of 2 for a vote gate")]
    VoteNumberTooSmall(i32),

    /// A vote gate ended up with no more arguments than its vote number;
    /// such a gate is an AND gate (or a contradiction) in disguise.
    #[error("vote gate G{index} has vote number {vote_number} but only {num_args} argument(s)")]
    VoteNumberExceedsArity {
        index: i32,
        vote_number: i32,
        num_args: usize,
    },
}
