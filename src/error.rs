use thiserror::Error;

/// Errors surfaced by handle construction and the drawing operations.
///
/// Construction of a [`SecureRng`](crate::SecureRng) can fail with
/// [`InvalidOption`](Error::InvalidOption),
/// [`NoEntropySource`](Error::NoEntropySource) or
/// [`EntropyReadError`](Error::EntropyReadError). After construction the
/// engine never fails; only the sampling operations can, and a failed call
/// leaves the engine usable.
#[derive(Debug, Error)]
pub enum Error {
    /// The `bits` option is not a power of two in `64..=8192`.
    #[error("bits must be a power of two between 64 and 8192, got {0}")]
    InvalidOption(u32),

    /// No entropy source candidate survived probing under the requested
    /// blocking policy.
    #[error("no usable entropy source was found")]
    NoEntropySource,

    /// The selected entropy source failed mid-read or returned fewer bytes
    /// than requested.
    #[error("failed to read entropy from {device}")]
    EntropyReadError {
        /// The source the read was attempted from.
        device: &'static str,
        /// The underlying I/O failure.
        #[source]
        cause: std::io::Error,
    },

    /// `string_from` was called with a zero-length bag.
    #[error("the bag must contain at least one character")]
    EmptyBag,

    /// A sampling range wider than the 2^32 output space was requested.
    #[error("range {0} exceeds the 2^32 output range of the engine")]
    RangeTooLarge(u64),

    /// An engine seed longer than 256 words was supplied.
    #[error("seed of {0} words exceeds the 256 word engine state")]
    InvalidSeed(usize),
}
