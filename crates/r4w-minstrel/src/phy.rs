//! PHY Collaborator Interface
//!
//! The rate controller never models the radio itself. It asks a
//! [`PhyTiming`] implementation for ideal frame durations, MAC timing
//! constants and nominal data rates, and it learns what each side of the link
//! can do from [`RadioCapabilities`] and [`PeerCapabilities`].
//!
//! [`HtPhy`] is a reference 802.11n (HT-mixed format) timing model used by the
//! simulator, the benchmarks and the tests.
//!
//! ```text
//! HT-MF PPDU:  L-STF | L-LTF | L-SIG | HT-SIG | HT-STF | HT-LTF x N | DATA
//!               8µs    8µs     4µs     8µs      4µs      4µs each    N_sym x T_sym
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Channel bandwidth of an HT transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelWidth {
    /// 20 MHz channel
    #[serde(rename = "20")]
    Mhz20,
    /// 40 MHz channel
    #[serde(rename = "40")]
    Mhz40,
}

impl ChannelWidth {
    /// Width in MHz
    pub fn mhz(self) -> u32 {
        match self {
            ChannelWidth::Mhz20 => 20,
            ChannelWidth::Mhz40 => 40,
        }
    }
}

impl fmt::Display for ChannelWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}MHz", self.mhz())
    }
}

/// PHY parameters shared by every coding index of one rate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupParams {
    /// Number of spatial streams (1-based)
    pub streams: u8,
    /// Short (400 ns) guard interval
    pub short_guard_interval: bool,
    /// Channel width
    pub channel_width: ChannelWidth,
}

impl GroupParams {
    /// Whether a device with the given limits can use this group.
    pub fn fits(&self, max_streams: u8, channel_width: ChannelWidth, short_gi: bool) -> bool {
        (short_gi || !self.short_guard_interval)
            && channel_width >= self.channel_width
            && max_streams >= self.streams
    }
}

impl fmt::Display for GroupParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{})",
            self.streams,
            if self.short_guard_interval { "sgi" } else { "lgi" },
            self.channel_width
        )
    }
}

/// What the local radio can transmit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioCapabilities {
    /// Number of transmit chains
    pub max_streams: u8,
    /// Widest channel the radio operates on
    pub channel_width: ChannelWidth,
    /// Short guard interval support
    pub short_guard_interval: bool,
    /// BSS basic rate set in bits per second, ascending
    pub basic_rates_bps: Vec<u64>,
}

impl Default for RadioCapabilities {
    fn default() -> Self {
        Self {
            max_streams: 2,
            channel_width: ChannelWidth::Mhz40,
            short_guard_interval: true,
            basic_rates_bps: vec![6_000_000, 12_000_000, 24_000_000],
        }
    }
}

/// What a peer station advertised when it associated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerCapabilities {
    /// Peer advertises HT support
    pub ht_supported: bool,
    /// Number of receive chains
    pub max_streams: u8,
    /// Widest channel the peer accepts
    pub channel_width: ChannelWidth,
    /// Short guard interval support
    pub short_guard_interval: bool,
    /// Number of coding indices the peer supports per group
    pub supported_mcs: usize,
}

impl PeerCapabilities {
    /// HT peer with the given stream count and width
    pub fn ht(max_streams: u8, channel_width: ChannelWidth, short_guard_interval: bool) -> Self {
        Self {
            ht_supported: true,
            max_streams,
            channel_width,
            short_guard_interval,
            supported_mcs: 8,
        }
    }

    /// Peer without HT support (legacy OFDM/DSSS only)
    pub fn legacy() -> Self {
        Self {
            ht_supported: false,
            max_streams: 1,
            channel_width: ChannelWidth::Mhz20,
            short_guard_interval: false,
            supported_mcs: 0,
        }
    }
}

/// Timing and rate queries answered by the PHY/MAC layers.
pub trait PhyTiming {
    /// Air time of a `frame_length`-byte frame, or `None` if the PHY cannot
    /// send this coding index with these parameters.
    fn ideal_duration(&self, params: &GroupParams, mcs: u8, frame_length: u32) -> Option<Duration>;

    /// Time the MAC waits for an ACK before declaring the attempt lost
    fn ack_timeout(&self) -> Duration;

    /// Backoff slot time
    fn slot_time(&self) -> Duration;

    /// Nominal data rate in bits per second
    fn data_rate(&self, params: &GroupParams, mcs: u8) -> u64;

    /// Non-HT reference rate (bps) of an HT coding index, used to bound the
    /// rate of control frames
    fn non_ht_reference_rate(&self, mcs: u8) -> u64;

    /// Legacy (non-HT) modes of the PHY in bits per second, ascending
    fn legacy_rates(&self) -> Vec<u64>;
}

/// Parameters for the next data frame to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxVector {
    /// HT transmission chosen by the adaptive path
    Ht {
        /// Flat rate identifier
        rate: crate::group::RateId,
        /// Group parameters of `rate`
        params: GroupParams,
        /// Long retries already spent on the current frame
        retry_count: u32,
    },
    /// Fixed legacy transmission for non-HT peers
    Legacy {
        /// Data rate in bits per second
        data_rate_bps: u64,
        /// Long retries already spent on the current frame
        retry_count: u32,
    },
}

/// Parameters for an RTS (control) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlTxVector {
    /// Legacy data rate in bits per second
    pub data_rate_bps: u64,
    /// Always 20 MHz for non-HT control frames
    pub channel_width: ChannelWidth,
    /// Short retries already spent
    pub retry_count: u32,
}

// ---------------------------------------------------------------------------
// Reference 802.11n timing model
// ---------------------------------------------------------------------------

/// Data bits per OFDM symbol for one stream at 20 MHz, MCS 0-7.
const NDBPS_20: [u64; 8] = [26, 52, 78, 104, 156, 208, 234, 260];
/// Data bits per OFDM symbol for one stream at 40 MHz, MCS 0-7.
const NDBPS_40: [u64; 8] = [54, 108, 162, 216, 324, 432, 486, 540];
/// Non-HT reference rates for MCS 0-7 (Mb/s).
const NON_HT_REFERENCE_MBPS: [u64; 8] = [6, 12, 18, 24, 36, 48, 54, 54];
/// 802.11a/g OFDM rates (Mb/s).
const OFDM_RATES_MBPS: [u64; 8] = [6, 9, 12, 18, 24, 36, 48, 54];

const SYMBOL_LGI_NS: u64 = 4_000;
const SYMBOL_SGI_NS: u64 = 3_600;
/// SERVICE field plus convolutional tail bits
const SERVICE_TAIL_BITS: u64 = 16 + 6;

/// 802.11n HT-mixed-format timing model (5 GHz band).
#[derive(Debug, Clone, PartialEq)]
pub struct HtPhy {
    /// Short interframe space
    pub sifs: Duration,
    /// Backoff slot
    pub slot: Duration,
    /// Air time of an ACK at the lowest OFDM rate
    pub ack_duration: Duration,
}

impl Default for HtPhy {
    fn default() -> Self {
        Self {
            sifs: Duration::from_micros(16),
            slot: Duration::from_micros(9),
            ack_duration: Duration::from_micros(44),
        }
    }
}

impl HtPhy {
    /// Create the default 5 GHz model
    pub fn new() -> Self {
        Self::default()
    }

    fn ndbps(params: &GroupParams, mcs: u8) -> Option<u64> {
        let table = match params.channel_width {
            ChannelWidth::Mhz20 => &NDBPS_20,
            ChannelWidth::Mhz40 => &NDBPS_40,
        };
        table
            .get(mcs as usize)
            .map(|bits| bits * params.streams as u64)
    }

    fn preamble_us(streams: u8) -> u64 {
        let ht_ltfs = match streams {
            1 => 1,
            2 => 2,
            _ => 4,
        };
        8 + 8 + 4 + 8 + 4 + 4 * ht_ltfs
    }
}

impl PhyTiming for HtPhy {
    fn ideal_duration(&self, params: &GroupParams, mcs: u8, frame_length: u32) -> Option<Duration> {
        if params.streams == 0 || params.streams > 4 {
            return None;
        }
        let ndbps = Self::ndbps(params, mcs)?;
        let bits = SERVICE_TAIL_BITS + 8 * frame_length as u64;
        let symbols = (bits + ndbps - 1) / ndbps;

        // Short-GI payloads are padded to a whole number of 4 µs symbols.
        let payload_us = if params.short_guard_interval {
            let ns = symbols * SYMBOL_SGI_NS;
            4 * ((ns + SYMBOL_LGI_NS - 1) / SYMBOL_LGI_NS)
        } else {
            symbols * 4
        };

        Some(Duration::from_micros(
            Self::preamble_us(params.streams) + payload_us,
        ))
    }

    fn ack_timeout(&self) -> Duration {
        self.sifs + self.slot + self.ack_duration
    }

    fn slot_time(&self) -> Duration {
        self.slot
    }

    fn data_rate(&self, params: &GroupParams, mcs: u8) -> u64 {
        let symbol_ns = if params.short_guard_interval {
            SYMBOL_SGI_NS
        } else {
            SYMBOL_LGI_NS
        };
        Self::ndbps(params, mcs)
            .map(|bits| bits * 1_000_000_000 / symbol_ns)
            .unwrap_or(0)
    }

    fn non_ht_reference_rate(&self, mcs: u8) -> u64 {
        let idx = (mcs as usize).min(NON_HT_REFERENCE_MBPS.len() - 1);
        NON_HT_REFERENCE_MBPS[idx] * 1_000_000
    }

    fn legacy_rates(&self) -> Vec<u64> {
        OFDM_RATES_MBPS.iter().map(|r| r * 1_000_000).collect()
    }
}
