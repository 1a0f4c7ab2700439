//! Seeded link simulator
//!
//! Drives a [`MinstrelHtManager`] over one HT link with a virtual clock and a
//! Bernoulli loss model: each attempt at a rate succeeds with a fixed
//! probability taken from a [`LossProfile`]. A frame is retried down the
//! retry chain until it is acknowledged or the manager says to stop.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::RateControlResult;
use crate::group::{RateId, MAX_GROUP_RATES};
use crate::manager::MinstrelHtManager;
use crate::phy::{GroupParams, PeerCapabilities, TxVector};
use crate::station::StationId;

/// Per-attempt success probability of every rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossProfile {
    /// Success probability of one stream at each coding index
    pub per_mcs: [f64; MAX_GROUP_RATES],
    /// Factor applied once per extra spatial stream
    pub stream_factor: f64,
}

impl LossProfile {
    /// Every rate succeeds with the same probability.
    pub fn uniform(p: f64) -> Self {
        Self {
            per_mcs: [p; MAX_GROUP_RATES],
            stream_factor: 1.0,
        }
    }

    /// Reliable up to `last_good`, almost always lost above it.
    pub fn cliff(last_good: usize) -> Self {
        let mut per_mcs = [0.02; MAX_GROUP_RATES];
        per_mcs
            .iter_mut()
            .take(last_good + 1)
            .for_each(|p| *p = 0.95);
        Self {
            per_mcs,
            stream_factor: 1.0,
        }
    }

    /// Success probability of one attempt
    pub fn success_probability(&self, params: &GroupParams, mcs: u8) -> f64 {
        let extra_streams = params.streams.saturating_sub(1) as i32;
        let p = self.per_mcs[mcs as usize] * self.stream_factor.powi(extra_streams);
        p.clamp(0.0, 1.0)
    }
}

/// Outcome counters of a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    pub frames: u64,
    pub delivered: u64,
    pub dropped: u64,
    /// Data attempts including retries
    pub attempts: u64,
    /// Virtual air time spent
    pub airtime: Duration,
    /// Attempts per rate
    pub rate_usage: BTreeMap<RateId, u64>,
}

impl LinkStats {
    /// Share of frames that were acknowledged
    pub fn delivery_ratio(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.frames as f64
    }

    /// Rate with the most attempts
    pub fn most_used_rate(&self) -> Option<RateId> {
        self.rate_usage
            .iter()
            .max_by_key(|(rate, count)| (**count, std::cmp::Reverse(**rate)))
            .map(|(rate, _)| *rate)
    }

    /// Delivered payload bits per second of air time
    pub fn goodput_bps(&self, frame_length: u32) -> f64 {
        let secs = self.airtime.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.delivered * frame_length as u64 * 8) as f64 / secs
    }
}

/// One HT link driven by a seeded loss model.
pub struct LinkSimulator {
    manager: MinstrelHtManager,
    station: StationId,
    loss: LossProfile,
    rng: StdRng,
    clock: Duration,
    stats: LinkStats,
}

impl LinkSimulator {
    /// Register `peer` with the manager and start the clock at zero.
    pub fn new(
        mut manager: MinstrelHtManager,
        station: StationId,
        peer: PeerCapabilities,
        loss: LossProfile,
        seed: u64,
    ) -> RateControlResult<Self> {
        manager.add_station(station, peer)?;
        Ok(Self {
            manager,
            station,
            loss,
            rng: StdRng::seed_from_u64(seed),
            clock: Duration::ZERO,
            stats: LinkStats::default(),
        })
    }

    pub fn manager(&self) -> &MinstrelHtManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut MinstrelHtManager {
        &mut self.manager
    }

    pub fn station(&self) -> StationId {
        self.station
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.clock
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Change the channel mid-run.
    pub fn set_loss(&mut self, loss: LossProfile) {
        tracing::debug!("channel changed at {:?}", self.clock);
        self.loss = loss;
    }

    /// Send one frame through the retry chain. Returns whether it was
    /// acknowledged.
    pub fn send_frame(&mut self) -> RateControlResult<bool> {
        let id = self.station;
        self.stats.frames += 1;

        loop {
            let (rate, params) = match self.manager.data_tx_vector(id, self.clock)? {
                TxVector::Ht { rate, params, .. } => (rate, params),
                TxVector::Legacy { .. } => {
                    return Err(crate::error::RateControlError::NotHtStation(id))
                }
            };

            let airtime = self.manager.group_table().ideal_duration(rate)
                + self.manager.phy().ack_timeout();
            self.clock += airtime;
            self.stats.airtime += airtime;
            self.stats.attempts += 1;
            *self.stats.rate_usage.entry(rate).or_insert(0) += 1;

            let p = self.loss.success_probability(&params, rate.mcs);
            if self.rng.gen_bool(p) {
                self.manager.report_data_ok(id, self.clock)?;
                self.stats.delivered += 1;
                return Ok(true);
            }

            self.manager.report_data_failed(id, self.clock)?;
            if !self.manager.may_retransmit(id, self.clock, true)? {
                self.manager.report_final_data_failed(id, self.clock)?;
                self.stats.dropped += 1;
                return Ok(false);
            }
        }
    }

    /// Send `frames` frames back to back.
    pub fn run(&mut self, frames: u64) -> RateControlResult<&LinkStats> {
        for _ in 0..frames {
            self.send_frame()?;
        }
        tracing::info!(
            "{}: {} frames, {} delivered, {} dropped, {:?} air time",
            self.station,
            self.stats.frames,
            self.stats.delivered,
            self.stats.dropped,
            self.stats.airtime
        );
        Ok(&self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinstrelHtConfig;
    use crate::phy::{ChannelWidth, HtPhy, RadioCapabilities};
    use crate::station::test_support::*;

    fn simulator(loss: LossProfile, seed: u64) -> LinkSimulator {
        let manager =
            MinstrelHtManager::new(FixedPhy, single_group_radio(), MinstrelHtConfig::default())
                .unwrap();
        LinkSimulator::new(manager, StationId(1), peer(8), loss, seed).unwrap()
    }

    #[test]
    fn test_loss_profile_probabilities() {
        let cliff = LossProfile::cliff(3);
        let one = GroupParams {
            streams: 1,
            short_guard_interval: false,
            channel_width: ChannelWidth::Mhz20,
        };
        assert_eq!(cliff.success_probability(&one, 3), 0.95);
        assert_eq!(cliff.success_probability(&one, 4), 0.02);

        let profile = LossProfile {
            stream_factor: 0.5,
            ..LossProfile::uniform(0.8)
        };
        let two = GroupParams { streams: 2, ..one };
        assert!((profile.success_probability(&two, 0) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_clean_channel_converges_on_fastest_rate() {
        let mut sim = simulator(LossProfile::uniform(1.0), 1);
        let stats = sim.run(3000).unwrap().clone();
        assert_eq!(stats.delivered, 3000);
        assert_eq!(stats.dropped, 0);
        assert_eq!(stats.attempts, 3000);

        let now = sim.now();
        let snap = sim.manager_mut().station_snapshot(StationId(1), now).unwrap();
        assert_eq!(snap.max_tp_rate, RateId::new(0, 7));
        assert_eq!(stats.most_used_rate(), Some(RateId::new(0, 7)));
    }

    #[test]
    fn test_settles_below_loss_cliff() {
        let mut sim = simulator(LossProfile::cliff(3), 2);
        let stats = sim.run(3000).unwrap().clone();
        assert!(stats.delivery_ratio() > 0.9, "ratio {}", stats.delivery_ratio());

        let now = sim.now();
        let snap = sim.manager_mut().station_snapshot(StationId(1), now).unwrap();
        assert_eq!(snap.max_tp_rate, RateId::new(0, 3));
        for (_, s) in &snap.rates {
            assert!(s.adjusted_retry_count >= 1);
            assert!(s.ewma_prob <= crate::station::stats::P_MAX);
        }
    }

    #[test]
    fn test_dead_channel_drops_every_frame() {
        let mut sim = simulator(LossProfile::uniform(0.0), 3);
        let stats = sim.run(200).unwrap().clone();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 200);

        let now = sim.now();
        let snap = sim.manager_mut().station_snapshot(StationId(1), now).unwrap();
        assert_eq!(snap.errors, 200);
        assert_eq!(snap.long_retries, 0);
    }

    #[test]
    fn test_runs_are_reproducible() {
        let a = simulator(LossProfile::cliff(5), 9).run(1000).unwrap().clone();
        let b = simulator(LossProfile::cliff(5), 9).run(1000).unwrap().clone();
        assert_eq!(a, b);
    }

    #[test]
    fn test_recovers_after_channel_change() {
        let mut sim = simulator(LossProfile::uniform(1.0), 4);
        sim.run(2000).unwrap();
        sim.set_loss(LossProfile::cliff(2));
        let before = sim.stats().clone();
        sim.run(3000).unwrap();

        let now = sim.now();
        let snap = sim.manager_mut().station_snapshot(StationId(1), now).unwrap();
        // Only MCS 0-2 still work
        assert!(snap.max_tp_rate.mcs <= 2, "settled on {}", snap.max_tp_rate);
        assert!(sim.stats().delivered > before.delivered);
    }

    #[test]
    fn test_two_stream_peer_on_default_radio() {
        let manager = MinstrelHtManager::new(
            HtPhy::new(),
            RadioCapabilities::default(),
            MinstrelHtConfig::default(),
        )
        .unwrap();
        let peer = PeerCapabilities::ht(2, ChannelWidth::Mhz40, true);
        let mut sim =
            LinkSimulator::new(manager, StationId(2), peer, LossProfile::uniform(1.0), 5).unwrap();
        let stats = sim.run(5000).unwrap().clone();
        assert_eq!(stats.dropped, 0);
        let used = stats.most_used_rate().unwrap();
        assert_eq!(sim.manager().group_table().params(used).streams, 2);
    }
}
