use std::net::Ipv4Addr;

use thiserror::Error as ThisError;

use crate::range::InvalidRangeError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error(transparent)]
    InvalidRange(#[from] InvalidRangeError),
    #[error("scan aborted before any probe was issued")]
    Aborted,
    #[error("scan cancelled")]
    Cancelled,
    #[error("duplicate outcome for {0} during aggregation")]
    DuplicateOutcome(Ipv4Addr),
    #[error("aggregation finished with {actual} outcomes for {expected} targets")]
    IncompleteAggregation { expected: u64, actual: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
