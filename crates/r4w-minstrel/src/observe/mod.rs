//! # Observability
//!
//! - **Logging**: structured events via `tracing`, installed with
//!   [`init_logging`]
//! - **Rate changes**: an observer seam the manager calls whenever the
//!   selector settles on a rate for the next frame
//!
//! ```rust,ignore
//! use r4w_minstrel::observe::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development());
//! manager.subscribe(|change: &RateChange| {
//!     tracing::info!(station = %change.station, bps = change.data_rate_bps, "rate change");
//! });
//! ```

pub mod logging;
pub mod rate_change;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use rate_change::{RateChange, RateChangeObserver};
