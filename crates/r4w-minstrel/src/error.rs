//! Rate-control error types
//!
//! Transmission failures are not errors here: they are folded into the
//! per-rate statistics. The variants below cover caller mistakes that can be
//! recovered from (bad station ids, bad configuration, a control frame with no
//! usable rate). Broken collaborator contracts panic instead.

use thiserror::Error;

use crate::config::ConfigError;
use crate::station::StationId;

/// Result type for rate-control operations
pub type RateControlResult<T> = Result<T, RateControlError>;

/// Errors surfaced by the rate manager
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateControlError {
    /// No station registered under this id
    #[error("unknown station {0}")]
    UnknownStation(StationId),

    /// A station with this id is already registered
    #[error("station {0} is already registered")]
    DuplicateStation(StationId),

    /// The peer fell back to the legacy path, so it has no HT rate
    #[error("station {0} is not HT capable")]
    NotHtStation(StationId),

    /// Neither the basic rate set nor the PHY modes hold a rate at or below
    /// the non-HT reference rate of the last data frame
    #[error("no control rate at or below {reference_bps} bps for station {station}")]
    NoControlRate { station: StationId, reference_bps: u64 },

    /// Configuration could not be loaded or failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RateControlError {
    /// Check whether the error came from the configuration layer
    pub fn is_config(&self) -> bool {
        matches!(self, RateControlError::Config(_))
    }
}
