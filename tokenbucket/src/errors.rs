use thiserror::Error;

/// Errors returned when constructing bandwidths and configurations.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BuildError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("capacity must fit within a signed 64bit token count")]
    CapacityTooLarge,
    #[error("refill tokens must be greater than zero")]
    ZeroRefillTokens,
    #[error("refill tokens must not exceed the capacity")]
    RefillExceedsCapacity,
    #[error("refill period must be greater than zero")]
    ZeroRefillPeriod,
    #[error("refill period must fit within 64 bits of nanoseconds")]
    RefillPeriodTooLong,
    #[error("initial tokens must not exceed the capacity")]
    InitialTokensExceedCapacity,
    #[error("a configuration requires at least one bandwidth")]
    NoBandwidths,
}

/// Errors returned for bucket operations.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("tokens must be greater than zero")]
    ZeroTokens,
    #[error("requested tokens exceed the smallest bandwidth capacity")]
    TokensMoreThanCapacity,
}
