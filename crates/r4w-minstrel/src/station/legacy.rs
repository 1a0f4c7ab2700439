//! Fixed-rate path for peers without HT support.

use super::StationId;
use crate::phy::{PhyTiming, RadioCapabilities, TxVector};

/// Rate used when neither the BSS nor the PHY lists a legacy rate
pub const FALLBACK_RATE_BPS: u64 = 6_000_000;

/// Non-adaptive state of a legacy peer.
///
/// The station always transmits at the lowest basic rate and only keeps
/// the retry and error counters the manager reports against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyStation {
    id: StationId,
    data_rate_bps: u64,
    short_retry: u32,
    long_retry: u32,
    err: u32,
    delivered: u64,
}

impl LegacyStation {
    /// Create the station on the lowest basic rate of the radio.
    pub fn new(id: StationId, radio: &RadioCapabilities, phy: &dyn PhyTiming) -> Self {
        let data_rate_bps = radio
            .basic_rates_bps
            .iter()
            .copied()
            .min()
            .or_else(|| phy.legacy_rates().into_iter().min())
            .unwrap_or(FALLBACK_RATE_BPS);
        tracing::debug!("{}: legacy rate {} bps", id, data_rate_bps);
        Self {
            id,
            data_rate_bps,
            short_retry: 0,
            long_retry: 0,
            err: 0,
            delivered: 0,
        }
    }

    pub fn id(&self) -> StationId {
        self.id
    }

    pub fn data_rate_bps(&self) -> u64 {
        self.data_rate_bps
    }

    pub fn tx_vector(&self) -> TxVector {
        TxVector::Legacy {
            data_rate_bps: self.data_rate_bps,
            retry_count: self.long_retry,
        }
    }

    pub fn report_data_ok(&mut self) {
        self.delivered += 1;
        self.reset_retries();
    }

    pub fn report_data_failed(&mut self) {
        self.long_retry += 1;
    }

    pub fn report_final_data_failed(&mut self) {
        self.reset_retries();
        self.err += 1;
    }

    pub fn report_rts_failed(&mut self) {
        self.short_retry += 1;
    }

    pub fn report_final_rts_failed(&mut self) {
        self.reset_retries();
        self.err += 1;
    }

    /// Legacy peers leave the retransmission decision to the caller.
    pub fn need_retransmission(&self, normally: bool) -> bool {
        normally
    }

    pub fn long_retries(&self) -> u32 {
        self.long_retry
    }

    pub fn short_retries(&self) -> u32 {
        self.short_retry
    }

    pub fn errors(&self) -> u32 {
        self.err
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn reset_retries(&mut self) {
        self.short_retry = 0;
        self.long_retry = 0;
    }
}
