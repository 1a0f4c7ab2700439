//! R4W Minstrel-HT Rate Control
//!
//! This crate picks transmission rates for an 802.11n-style MAC. For every
//! associated peer it keeps per-rate delivery statistics, smooths them with an
//! exponentially weighted moving average and steers traffic towards the rate
//! with the best expected throughput, while a small share of frames probes
//! other rates so the statistics never go stale.
//!
//! - **Rate groups**: every (streams, guard interval, channel width) triple
//!   with eight coding indices each, see [`GroupTable`]
//! - **Statistics**: fixed-point delivery probabilities on a 0..18000 scale
//! - **Selection**: best throughput most of the time, look-around samples
//!   drawn from a shuffled per-group schedule
//! - **Retry chain**: best throughput, second best, then most reliable rate
//! - **Simulation**: [`LinkSimulator`] drives one link under a seeded loss
//!   model with a virtual clock
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use r4w_minstrel::{
//!     ChannelWidth, HtPhy, MinstrelHtConfig, MinstrelHtManager, PeerCapabilities,
//!     RadioCapabilities, StationId,
//! };
//!
//! let mut mgr = MinstrelHtManager::new(
//!     HtPhy::new(),
//!     RadioCapabilities::default(),
//!     MinstrelHtConfig::default(),
//! )
//! .unwrap();
//! mgr.subscribe(|change: &r4w_minstrel::RateChange| println!("{:?}", change));
//!
//! let sta = StationId(1);
//! mgr.add_station(sta, PeerCapabilities::ht(2, ChannelWidth::Mhz40, true)).unwrap();
//! let now = Duration::from_millis(1);
//! let tx = mgr.data_tx_vector(sta, now).unwrap();
//! println!("sending with {:?}", tx);
//! mgr.report_data_ok(sta, now).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod group;
pub mod manager;
pub mod observe;
pub mod phy;
pub mod sample_table;
pub mod sim;
pub mod station;

// Re-export main types
pub use config::{ConfigError, MinstrelHtConfig};
pub use error::{RateControlError, RateControlResult};
pub use group::{GroupTable, RateId};
pub use manager::{MinstrelHtManager, StationSnapshot};
pub use observe::{init_logging, LogConfig, RateChange, RateChangeObserver};
pub use phy::{
    ChannelWidth, ControlTxVector, GroupParams, HtPhy, PeerCapabilities, PhyTiming,
    RadioCapabilities, TxVector,
};
pub use sim::{LinkSimulator, LinkStats, LossProfile};
pub use station::{HtStation, LegacyStation, RateStats, Selection, Station, StationId};
