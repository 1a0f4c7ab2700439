//! Statistics updater
//!
//! Runs at most once per update interval. For every supported rate it turns
//! the interval's attempt/success counters into a success probability,
//! folds that into the EWMA, derives a throughput estimate and resizes the
//! rate's retry budget. It then picks the best, second best and most reliable
//! rate, first per group and then across groups.
//!
//! All probabilities are fixed point: `P_MAX` (18000) stands for 100 %, so one
//! percent is 180.

use std::time::Duration;

use super::{HtStation, RateContext};
use crate::group::{group_params, RateId, N_GROUPS};

/// Fixed-point value of a 100 % success probability
pub const P_MAX: u32 = 18_000;
/// Below this EWMA a rate earns no throughput credit (10 %)
pub const MIN_THROUGHPUT_PROB: u32 = 10 * 180;
/// Probability ceiling used in throughput estimates (90 %)
pub const THROUGHPUT_PROB_CAP: u32 = 90 * 180;
/// Above this EWMA a rate is not worth sampling or long retry chains (95 %)
pub const HIGH_PROB: u32 = 95 * 180;
/// Retry budget for rates outside [`MIN_THROUGHPUT_PROB`, `HIGH_PROB`]
pub const CAPPED_RETRY_COUNT: u32 = 2;

/// Throughput credit for a smoothed probability at a given ideal duration.
pub fn throughput(ewma_prob: u32, ideal_duration: Duration) -> u64 {
    if ewma_prob < MIN_THROUGHPUT_PROB {
        return 0;
    }
    let mut micros = ideal_duration.as_micros() as u64;
    if micros == 0 {
        micros = 1_000_000;
    }
    ewma_prob.min(THROUGHPUT_PROB_CAP) as u64 * (1_000_000 / micros)
}

/// Fold one interval's probability into the running average.
pub fn ewma(prob: u32, previous: u32, weight: f64) -> u32 {
    ((prob as f64 * (100.0 - weight) + previous as f64 * weight) / 100.0) as u32
}

impl HtStation {
    /// Recompute the statistics table if the update deadline has passed.
    ///
    /// Returns `true` when a pass ran.
    pub fn update_stats(&mut self, ctx: &RateContext<'_>, now: Duration) -> bool {
        if now < self.next_stats_update {
            return false;
        }
        tracing::trace!("{}: updating stats at {:?}", self.id, now);

        self.next_stats_update = now + ctx.config.update_interval();
        self.num_samples_slow = 0;

        let rates: Vec<RateId> = self.supported_rates().collect();
        for rate in &rates {
            self.update_rate(*rate, ctx.config.ewma_level);
        }

        for group in 0..N_GROUPS {
            if self.groups[group].supported {
                self.update_group_best(group);
            }
        }
        self.update_global_best();
        self.promote_best();

        tracing::debug!(
            "{}: max tp={} max tp2={} max prob={}",
            self.id,
            self.max_tp_rate,
            self.max_tp_rate2,
            self.max_prob_rate
        );
        true
    }

    fn update_rate(&mut self, rate: RateId, ewma_level: f64) {
        let stats = &mut self.rates[rate.index()];

        if stats.attempts > 0 {
            stats.samples_skipped = 0;
            let prob = (stats.successes.min(stats.attempts) as u64 * P_MAX as u64
                / stats.attempts as u64) as u32;
            stats.prob = prob;
            stats.ewma_prob = ewma(prob, stats.ewma_prob, ewma_level);
            stats.throughput = throughput(stats.ewma_prob, stats.ideal_duration);
        } else {
            stats.samples_skipped += 1;
        }

        stats.successes = 0;
        stats.attempts = 0;

        // Very good and very bad rates get a short retry budget.
        stats.adjusted_retry_count = if stats.ewma_prob > HIGH_PROB
            || stats.ewma_prob < MIN_THROUGHPUT_PROB
        {
            stats.retry_count.min(CAPPED_RETRY_COUNT)
        } else {
            stats.retry_count
        };
        if stats.adjusted_retry_count == 0 {
            stats.adjusted_retry_count = 1;
        }
    }

    fn update_group_best(&mut self, group: usize) {
        let n = self.n_supported_mcs;
        let first = RateId::new(group, 0);

        let mut max_tp = 0u64;
        let mut max_prob = 0u32;
        let mut index_max_tp = first;
        let mut index_max_prob = first;
        for mcs in 0..n {
            let rate = RateId::new(group, mcs);
            let stats = &self.rates[rate.index()];
            if max_tp < stats.throughput {
                index_max_tp = rate;
                max_tp = stats.throughput;
            }
            if max_prob < stats.ewma_prob {
                index_max_prob = rate;
                max_prob = stats.ewma_prob;
            }
        }

        let mut max_tp2 = 0u64;
        let mut index_max_tp2 = first;
        for mcs in 0..n {
            let rate = RateId::new(group, mcs);
            let tp = self.rates[rate.index()].throughput;
            if rate != index_max_tp && max_tp2 < tp {
                index_max_tp2 = rate;
                max_tp2 = tp;
            }
        }

        let state = &mut self.groups[group];
        state.max_tp_rate = index_max_tp;
        state.max_tp_rate2 = index_max_tp2;
        state.max_prob_rate = index_max_prob;
    }

    fn update_global_best(&mut self) {
        let lowest = match self.groups.iter().position(|g| g.supported) {
            Some(group) => group,
            None => panic!("{}: statistics pass without a supported group", self.id),
        };
        let first = RateId::new(lowest, 0);

        let mut max_tp = 0u64;
        let mut max_prob = 0u32;
        let mut index_max_tp = first;
        let mut index_max_prob = first;
        for group in self.groups.iter().filter(|g| g.supported) {
            let tp = self.rates[group.max_tp_rate.index()].throughput;
            if max_tp < tp {
                index_max_tp = group.max_tp_rate;
                max_tp = tp;
            }
            let prob = self.rates[group.max_prob_rate.index()].ewma_prob;
            if max_prob < prob {
                index_max_prob = group.max_prob_rate;
                max_prob = prob;
            }
        }

        // Second best may be another group's best or any group's runner-up.
        let mut max_tp2 = 0u64;
        let mut index_max_tp2 = first;
        for group in self.groups.iter().filter(|g| g.supported) {
            let best_tp = self.rates[group.max_tp_rate.index()].throughput;
            if group.max_tp_rate != index_max_tp && max_tp2 < best_tp {
                index_max_tp2 = group.max_tp_rate;
                max_tp2 = best_tp;
            }
            let second_tp = self.rates[group.max_tp_rate2.index()].throughput;
            if max_tp2 < second_tp {
                index_max_tp2 = group.max_tp_rate2;
                max_tp2 = second_tp;
            }
        }

        self.max_tp_rate = index_max_tp;
        self.max_tp_rate2 = index_max_tp2;
        self.max_prob_rate = index_max_prob;
    }

    /// Adopt the new best rate right away when it sorts above the current
    /// one and does not drop spatial streams.
    fn promote_best(&mut self) {
        let best_streams = group_params(self.max_tp_rate.group_id()).streams;
        let current_streams = group_params(self.tx_rate.group_id()).streams;
        if self.max_tp_rate > self.tx_rate && best_streams >= current_streams {
            tracing::debug!(
                "{}: promoting tx rate {} -> {}",
                self.id,
                self.tx_rate,
                self.max_tp_rate
            );
            self.tx_rate = self.max_tp_rate;
        }
    }
}
