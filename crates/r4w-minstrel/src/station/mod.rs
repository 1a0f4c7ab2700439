//! Per-peer rate-control state
//!
//! A [`Station`] starts out `Pending` until its first operation, at which
//! point the peer's capabilities decide once and for all whether it takes the
//! adaptive HT path ([`HtStation`]) or the fixed legacy path
//! ([`LegacyStation`]).
//!
//! ```text
//!            add_station            first operation
//!   (none) ─────────────► Pending ─────────────────┬──► Ht      (HT peer, ≥1 MCS)
//!                                                  └──► Legacy  (everything else)
//! ```

pub mod legacy;
pub mod retry;
pub mod selector;
pub mod stats;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::MinstrelHtConfig;
use crate::group::{GroupTable, RateId, MAX_GROUP_RATES, N_GROUPS, N_RATES};
use crate::phy::{PeerCapabilities, PhyTiming};
use crate::sample_table::SampleTable;

pub use legacy::LegacyStation;
pub use selector::Selection;

/// Identifier of a peer station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StationId(pub u32);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sta-{}", self.0)
    }
}

/// Read-only collaborators every station operation needs.
#[derive(Clone, Copy)]
pub struct RateContext<'a> {
    /// Radio-wide group table
    pub groups: &'a GroupTable,
    /// Tuning parameters
    pub config: &'a MinstrelHtConfig,
    /// PHY timing model
    pub phy: &'a dyn PhyTiming,
}

/// Statistics for one (group, coding index) pair of one station.
///
/// Probabilities are fixed-point fractions of [`stats::P_MAX`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateStats {
    /// Attempts in the current update interval
    pub attempts: u32,
    /// Successes in the current update interval
    pub successes: u32,
    /// Success probability of the last interval with attempts
    pub prob: u32,
    /// Smoothed success probability
    pub ewma_prob: u32,
    /// Throughput estimate
    pub throughput: u64,
    /// Retries this rate may use in the retry chain, from the air-time search
    pub retry_count: u32,
    /// `retry_count` after capping for very good or very bad rates
    pub adjusted_retry_count: u32,
    /// Consecutive update intervals without a single attempt
    pub samples_skipped: u32,
    /// Ideal duration of the reference frame
    pub ideal_duration: Duration,
}

/// Per-group state of one station.
#[derive(Debug, Clone, Default)]
pub struct GroupState {
    /// Both ends of the link can use the group
    pub supported: bool,
    /// Best throughput rate inside the group
    pub max_tp_rate: RateId,
    /// Second best throughput rate inside the group
    pub max_tp_rate2: RateId,
    /// Highest probability rate inside the group
    pub max_prob_rate: RateId,
    /// Sample schedule, present for supported groups
    pub sample_table: Option<SampleTable>,
}

/// Adaptive state of an HT peer.
#[derive(Debug, Clone)]
pub struct HtStation {
    pub(crate) id: StationId,
    pub(crate) peer: PeerCapabilities,
    /// Flat arena addressed by [`RateId::index`]
    pub(crate) rates: Vec<RateStats>,
    pub(crate) groups: Vec<GroupState>,
    pub(crate) n_supported_mcs: usize,

    pub(crate) tx_rate: RateId,
    pub(crate) max_tp_rate: RateId,
    pub(crate) max_tp_rate2: RateId,
    pub(crate) max_prob_rate: RateId,

    pub(crate) is_sampling: bool,
    pub(crate) sample_rate: RateId,
    pub(crate) sample_group: usize,
    pub(crate) num_samples_slow: u32,

    pub(crate) frame_count: u32,
    pub(crate) sample_count: u32,

    pub(crate) short_retry: u32,
    pub(crate) long_retry: u32,
    pub(crate) err: u32,

    pub(crate) next_stats_update: Duration,
}

impl HtStation {
    /// Initialise the adaptive state for a peer.
    ///
    /// Marks the groups both ends support, sizes the retry budget of every
    /// rate, builds the sample tables, then runs one statistics pass and one
    /// rate selection so the station starts on a usable rate.
    pub fn new<R: Rng + ?Sized>(
        id: StationId,
        ctx: &RateContext<'_>,
        peer: PeerCapabilities,
        now: Duration,
        rng: &mut R,
    ) -> Self {
        let n_supported_mcs = peer.supported_mcs.min(MAX_GROUP_RATES);
        assert!(n_supported_mcs > 0, "{}: HT peer without coding indices", id);

        let mut station = Self {
            id,
            peer,
            rates: vec![RateStats::default(); N_RATES],
            groups: vec![GroupState::default(); N_GROUPS],
            n_supported_mcs,
            tx_rate: RateId::default(),
            max_tp_rate: RateId::default(),
            max_tp_rate2: RateId::default(),
            max_prob_rate: RateId::default(),
            is_sampling: false,
            sample_rate: RateId::default(),
            sample_group: 0,
            num_samples_slow: 0,
            frame_count: 0,
            sample_count: 0,
            short_retry: 0,
            long_retry: 0,
            err: 0,
            next_stats_update: now,
        };

        for group in ctx.groups.iter() {
            let fits = group.params.fits(
                station.peer.max_streams,
                station.peer.channel_width,
                station.peer.short_guard_interval,
            );
            if !fits {
                continue;
            }
            tracing::debug!("{}: group {} {} supported", id, group.id, group.params);

            let state = &mut station.groups[group.id];
            state.supported = true;
            state.sample_table = Some(SampleTable::generate(
                n_supported_mcs,
                ctx.config.sample_columns,
                rng,
            ));

            for mcs in 0..n_supported_mcs {
                let ideal = group.ideal_durations[mcs];
                let retries =
                    retry::retry_budget(ctx.phy, ideal, ctx.config.max_retry_time());
                station.rates[RateId::new(group.id, mcs).index()] = RateStats {
                    retry_count: retries,
                    adjusted_retry_count: retries,
                    ideal_duration: ideal,
                    ..Default::default()
                };
            }
        }

        assert!(
            station.groups.iter().any(|g| g.supported),
            "{}: no rate group is supported by both radio and peer",
            id
        );

        station.advance_sample_cursor();
        station.update_stats(ctx, now);
        station.tx_rate = station.find_rate(ctx, rng).rate;

        tracing::info!(
            "{}: initialised with {} groups, {} MCS each, starting at rate {}",
            id,
            station.supported_groups().count(),
            n_supported_mcs,
            station.tx_rate
        );
        station
    }

    /// Station id
    pub fn id(&self) -> StationId {
        self.id
    }

    /// Capabilities the peer advertised
    pub fn peer(&self) -> &PeerCapabilities {
        &self.peer
    }

    /// Rate for the next transmission attempt
    pub fn tx_rate(&self) -> RateId {
        self.tx_rate
    }

    /// Best throughput rate across all groups
    pub fn max_tp_rate(&self) -> RateId {
        self.max_tp_rate
    }

    /// Second best throughput rate across all groups
    pub fn max_tp_rate2(&self) -> RateId {
        self.max_tp_rate2
    }

    /// Highest probability rate across all groups
    pub fn max_prob_rate(&self) -> RateId {
        self.max_prob_rate
    }

    /// Rate being sampled, meaningful while [`is_sampling`](Self::is_sampling)
    pub fn sample_rate(&self) -> RateId {
        self.sample_rate
    }

    /// The current frame is a sample
    pub fn is_sampling(&self) -> bool {
        self.is_sampling
    }

    /// Statistics of one rate
    pub fn rate_stats(&self, rate: RateId) -> &RateStats {
        &self.rates[rate.index()]
    }

    /// Per-group state
    pub fn group_state(&self, group: usize) -> &GroupState {
        &self.groups[group]
    }

    /// Ids of the groups both ends support
    pub fn supported_groups(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.supported)
            .map(|(id, _)| id)
    }

    /// Every rate the station may use
    pub fn supported_rates(&self) -> impl Iterator<Item = RateId> + '_ {
        let n = self.n_supported_mcs;
        self.supported_groups()
            .flat_map(move |g| (0..n).map(move |mcs| RateId::new(g, mcs)))
    }

    /// Coding indices per supported group
    pub fn n_supported_mcs(&self) -> usize {
        self.n_supported_mcs
    }

    /// Frames completed since the last renormalisation
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Samples taken since the last renormalisation
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Sample candidates rejected as too slow in this update interval
    pub fn num_samples_slow(&self) -> u32 {
        self.num_samples_slow
    }

    /// Failed data attempts of the current frame
    pub fn long_retries(&self) -> u32 {
        self.long_retry
    }

    /// Failed RTS attempts of the current frame
    pub fn short_retries(&self) -> u32 {
        self.short_retry
    }

    /// Frames abandoned after exhausting their retries
    pub fn errors(&self) -> u32 {
        self.err
    }

    /// Earliest time of the next statistics pass
    pub fn next_stats_update(&self) -> Duration {
        self.next_stats_update
    }

    /// Render the per-rate table of every supported group
    pub fn rate_table_report(&self) -> String {
        let mut out = String::new();
        out.push_str("rate\tideal_us\tprob\tewma\tthroughput\tretry\tadj\tskipped\n");
        for rate in self.supported_rates() {
            let s = self.rate_stats(rate);
            let marker = if rate == self.max_tp_rate {
                " A"
            } else if rate == self.max_tp_rate2 {
                " B"
            } else if rate == self.max_prob_rate {
                " P"
            } else {
                ""
            };
            out.push_str(&format!(
                "{}{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                rate,
                marker,
                s.ideal_duration.as_micros(),
                s.prob,
                s.ewma_prob,
                s.throughput,
                s.retry_count,
                s.adjusted_retry_count,
                s.samples_skipped
            ));
        }
        out
    }

    /// Render the sample table of every supported group
    pub fn sample_table_report(&self) -> String {
        let mut out = String::new();
        for group in self.supported_groups() {
            if let Some(table) = &self.groups[group].sample_table {
                let (row, col) = table.cursor();
                out.push_str(&format!("group {} cursor ({}, {})\n", group, row, col));
                out.push_str(&table.report());
            }
        }
        out
    }
}

/// A peer tracked by the manager.
#[derive(Debug, Clone)]
pub enum Station {
    /// Registered; waiting for the first operation to pick a path
    Pending(PeerCapabilities),
    /// Adaptive HT path
    Ht(HtStation),
    /// Fixed legacy path
    Legacy(LegacyStation),
}

impl Station {
    /// Resolve a pending station into its HT or legacy form.
    pub fn ensure_init<R: Rng + ?Sized>(
        &mut self,
        id: StationId,
        ctx: &RateContext<'_>,
        now: Duration,
        rng: &mut R,
    ) {
        if let Station::Pending(peer) = self {
            let peer = peer.clone();
            *self = if peer.ht_supported && peer.supported_mcs > 0 {
                Station::Ht(HtStation::new(id, ctx, peer, now, rng))
            } else {
                tracing::info!("{}: peer is not HT capable, using the legacy path", id);
                Station::Legacy(LegacyStation::new(id, ctx.groups.radio(), ctx.phy))
            };
        }
    }

    /// Whether the station took the adaptive path
    pub fn is_ht(&self) -> bool {
        matches!(self, Station::Ht(_))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::phy::{ChannelWidth, GroupParams, RadioCapabilities};

    /// PHY with fixed per-MCS durations: 1000 µs at MCS 0 down to 300 µs at
    /// MCS 7, halved for the second stream.
    pub struct FixedPhy;

    impl PhyTiming for FixedPhy {
        fn ideal_duration(&self, p: &GroupParams, mcs: u8, _len: u32) -> Option<Duration> {
            let base = 1000 - 100 * mcs as u64;
            Some(Duration::from_micros(base / p.streams as u64))
        }
        fn ack_timeout(&self) -> Duration {
            Duration::from_micros(50)
        }
        fn slot_time(&self) -> Duration {
            Duration::from_micros(9)
        }
        fn data_rate(&self, p: &GroupParams, mcs: u8) -> u64 {
            (mcs as u64 + 1) * 6_500_000 * p.streams as u64
        }
        fn non_ht_reference_rate(&self, mcs: u8) -> u64 {
            [6, 12, 18, 24, 36, 48, 54, 54][mcs as usize % 8] * 1_000_000
        }
        fn legacy_rates(&self) -> Vec<u64> {
            vec![6_000_000, 12_000_000, 24_000_000, 54_000_000]
        }
    }

    /// One 20 MHz long-GI stream
    pub fn single_group_radio() -> RadioCapabilities {
        RadioCapabilities {
            max_streams: 1,
            channel_width: ChannelWidth::Mhz20,
            short_guard_interval: false,
            basic_rates_bps: vec![6_000_000, 12_000_000],
        }
    }

    pub fn peer(mcs: usize) -> PeerCapabilities {
        PeerCapabilities {
            supported_mcs: mcs,
            ..PeerCapabilities::ht(1, ChannelWidth::Mhz20, false)
        }
    }

    /// Owned collaborators for building a [`RateContext`] in tests.
    pub struct Fixture {
        pub phy: FixedPhy,
        pub groups: GroupTable,
        pub config: MinstrelHtConfig,
    }

    impl Fixture {
        pub fn new(radio: RadioCapabilities, config: MinstrelHtConfig) -> Self {
            let phy = FixedPhy;
            let groups = GroupTable::build(&phy, &radio, config.frame_length);
            Self {
                phy,
                groups,
                config,
            }
        }

        pub fn single_group() -> Self {
            Self::new(single_group_radio(), MinstrelHtConfig::default())
        }

        pub fn ctx(&self) -> RateContext<'_> {
            RateContext {
                groups: &self.groups,
                config: &self.config,
                phy: &self.phy,
            }
        }
    }
}
