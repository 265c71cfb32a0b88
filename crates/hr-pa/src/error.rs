use thiserror::Error;

/// Errors produced by prefix-assignment operations.
///
/// None of these are fatal: every mutator that returns `PaError` leaves the
/// store unchanged, and the next scheduled pass will retry with whatever the
/// world looks like by then.
#[derive(Debug, Error)]
pub enum PaError {
    #[error("allocation failed")]
    Allocation,

    #[error("interface name too long")]
    NameTooLong,

    #[error("bad argument: {0}")]
    BadArgument(&'static str),

    #[error("random prefix search exhausted after {rounds} rounds")]
    SearchExhausted { rounds: u32 },

    #[error("excluded range covers the whole delegated prefix")]
    ExcludedContainsDp,
}

pub type PaResult<T> = Result<T, PaError>;
