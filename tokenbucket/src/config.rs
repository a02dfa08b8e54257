//! The configuration of a bucket: an ordered collection of bandwidths which
//! must all admit a consume.

use crate::{Bandwidth, BuildError};

/// An ordered, non-empty collection of bandwidths.
///
/// The bandwidths form a conjunction: a consume succeeds only if every
/// bandwidth can admit it, so the tightest bandwidth governs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    bandwidths: Box<[Bandwidth]>,
}

impl Configuration {
    /// Create a configuration from an ordered collection of bandwidths.
    pub fn new(bandwidths: Vec<Bandwidth>) -> Result<Self, BuildError> {
        if bandwidths.is_empty() {
            return Err(BuildError::NoBandwidths);
        }

        Ok(Self {
            bandwidths: bandwidths.into(),
        })
    }

    /// Get a reference to the bandwidths, in configuration order.
    pub fn bandwidths(&self) -> &[Bandwidth] {
        &self.bandwidths
    }

    /// The smallest capacity across all bandwidths. No consume larger than
    /// this can ever succeed.
    pub fn min_capacity(&self) -> u64 {
        self.bandwidths
            .iter()
            .map(|bandwidth| bandwidth.capacity())
            .min()
            .unwrap_or(0)
    }
}

impl From<Bandwidth> for Configuration {
    fn from(bandwidth: Bandwidth) -> Self {
        Self {
            bandwidths: Box::new([bandwidth]),
        }
    }
}
