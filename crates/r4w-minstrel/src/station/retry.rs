//! Retry chain
//!
//! Within one frame, failed attempts walk down a three-tier ladder of rates.
//! Each tier owns as many attempts as its rate's adjusted retry budget:
//!
//! | Tier | Normal frame       | Sample frame       |
//! |------|--------------------|--------------------|
//! | 1    | best throughput    | sample rate        |
//! | 2    | second best        | best throughput    |
//! | 3    | best probability   | best probability   |
//!
//! The retransmission check sums the same three budgets, so the caller
//! stops retrying exactly when the ladder runs out.

use rand::Rng;
use std::time::Duration;

use super::{HtStation, RateContext, Selection};
use crate::group::RateId;
use crate::phy::PhyTiming;

/// Contention window before the first retry
const CW_MIN: u32 = 31;
/// Contention window ceiling
const CW_MAX: u32 = 1023;
/// Largest retry count tried by [`retry_budget`]
const MAX_RETRY_SEARCH: u32 = 10;

/// Air time of a unicast frame sent once and then retried `long_retries`
/// times, with the average backoff before each retry.
pub fn unicast_time(phy: &dyn PhyTiming, data_time: Duration, long_retries: u32) -> Duration {
    let attempt = data_time + phy.ack_timeout();
    let mut total = attempt;
    let mut cw = CW_MIN;
    for _ in 0..long_retries {
        total += attempt + phy.slot_time() * (cw / 2);
        cw = ((cw + 1) * 2).min(CW_MAX);
    }
    total
}

/// Largest retry count, between 1 and 10, whose worst case air time stays
/// within `ceiling`.
pub fn retry_budget(phy: &dyn PhyTiming, ideal: Duration, ceiling: Duration) -> u32 {
    let mut budget = 1;
    for retries in 2..=MAX_RETRY_SEARCH {
        if unicast_time(phy, ideal, retries) > ceiling {
            break;
        }
        budget = retries;
    }
    budget
}

impl HtStation {
    /// The active ladder as (rate, adjusted budget) per tier.
    fn retry_ladder(&self) -> [(RateId, u32); 3] {
        let budget = |rate: RateId| (rate, self.rates[rate.index()].adjusted_retry_count);
        if self.is_sampling {
            [
                budget(self.sample_rate),
                budget(self.max_tp_rate),
                budget(self.max_prob_rate),
            ]
        } else {
            [
                budget(self.max_tp_rate),
                budget(self.max_tp_rate2),
                budget(self.max_prob_rate),
            ]
        }
    }

    /// Attempts the current frame may use in total
    pub fn retry_limit(&self) -> u32 {
        self.retry_ladder().iter().map(|(_, b)| b).sum()
    }

    /// Whether another attempt of the current frame is allowed.
    pub fn need_retransmission(&self) -> bool {
        let limit = self.retry_limit();
        let allowed = self.long_retry < limit;
        tracing::trace!(
            "{}: retries {} of {}, retransmit={}",
            self.id,
            self.long_retry,
            limit,
            allowed
        );
        allowed
    }

    /// Record a failed data attempt and move to the next rate of the ladder.
    ///
    /// # Panics
    ///
    /// If called after [`need_retransmission`](Self::need_retransmission)
    /// said to stop.
    pub fn report_data_failed(&mut self) -> RateId {
        self.long_retry += 1;
        self.rates[self.tx_rate.index()].attempts += 1;

        let [(first, b1), (second, b2), (third, b3)] = self.retry_ladder();
        let lr = self.long_retry;
        self.tx_rate = if lr < b1 {
            first
        } else if lr < b1 + b2 {
            second
        } else if lr <= b1 + b2 + b3 {
            third
        } else {
            panic!(
                "{}: Max retries reached and long retry not cleared properly ({} > {})",
                self.id,
                lr,
                b1 + b2 + b3
            );
        };

        tracing::debug!(
            "{}: data failed, long retry {}, sampling={}, next rate {}",
            self.id,
            lr,
            self.is_sampling,
            self.tx_rate
        );
        self.tx_rate
    }

    /// Record a delivered frame and pick the rate for the next one.
    pub fn report_data_ok<R: Rng + ?Sized>(
        &mut self,
        ctx: &RateContext<'_>,
        now: Duration,
        rng: &mut R,
    ) -> Selection {
        self.is_sampling = false;
        let stats = &mut self.rates[self.tx_rate.index()];
        stats.successes += 1;
        stats.attempts += 1;
        self.reset_retries();
        self.frame_count = self.frame_count.wrapping_add(1);

        self.update_stats(ctx, now);
        let selection = self.find_rate(ctx, rng);
        self.tx_rate = selection.rate;
        tracing::trace!("{}: data ok, next rate {}", self.id, self.tx_rate);
        selection
    }

    /// Record a frame abandoned after its last attempt and pick the rate
    /// for the next one.
    pub fn report_final_data_failed<R: Rng + ?Sized>(
        &mut self,
        ctx: &RateContext<'_>,
        now: Duration,
        rng: &mut R,
    ) -> Selection {
        self.is_sampling = false;
        self.reset_retries();
        self.err += 1;

        self.update_stats(ctx, now);
        let selection = self.find_rate(ctx, rng);
        self.tx_rate = selection.rate;
        tracing::debug!("{}: frame dropped, next rate {}", self.id, self.tx_rate);
        selection
    }

    /// Record a failed RTS attempt.
    pub fn report_rts_failed(&mut self) {
        self.short_retry += 1;
    }

    /// Record an RTS exchange abandoned after its last attempt.
    pub fn report_final_rts_failed(&mut self) {
        self.reset_retries();
        self.err += 1;
    }

    fn reset_retries(&mut self) {
        self.short_retry = 0;
        self.long_retry = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::test_support::*;
    use crate::station::StationId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn station(fx: &Fixture, mcs: usize) -> HtStation {
        let mut rng = StdRng::seed_from_u64(5);
        HtStation::new(StationId(1), &fx.ctx(), peer(mcs), Duration::ZERO, &mut rng)
    }

    fn set_budget(sta: &mut HtStation, rate: RateId, budget: u32) {
        sta.rates[rate.index()].adjusted_retry_count = budget;
    }

    #[test]
    fn test_unicast_time_adds_backoff() {
        let d = Duration::from_micros(1000);
        assert_eq!(unicast_time(&FixedPhy, d, 0), Duration::from_micros(1050));
        // 2 x 1050 + 15 slots of 9 µs
        assert_eq!(unicast_time(&FixedPhy, d, 1), Duration::from_micros(2235));
        // third attempt adds 31 slots
        assert_eq!(unicast_time(&FixedPhy, d, 2), Duration::from_micros(3564));
    }

    #[test]
    fn test_retry_budget_search() {
        let ceiling = Duration::from_millis(6);
        assert_eq!(retry_budget(&FixedPhy, Duration::from_micros(1000), ceiling), 3);
        assert_eq!(retry_budget(&FixedPhy, Duration::from_micros(300), ceiling), 4);
        // Even one retry overshoots: the floor of one still applies
        assert_eq!(retry_budget(&FixedPhy, Duration::from_millis(5), ceiling), 1);
        // Tiny frames stop at the search limit
        assert_eq!(retry_budget(&FixedPhy, Duration::ZERO, Duration::from_secs(1)), 10);
    }

    #[test]
    fn test_ladder_walks_tiers_in_order() {
        let fx = Fixture::single_group();
        let mut sta = station(&fx, 4);
        let (best, second, prob) = (RateId::new(0, 3), RateId::new(0, 2), RateId::new(0, 1));
        sta.max_tp_rate = best;
        sta.max_tp_rate2 = second;
        sta.max_prob_rate = prob;
        sta.tx_rate = best;
        set_budget(&mut sta, best, 2);
        set_budget(&mut sta, second, 1);
        set_budget(&mut sta, prob, 3);
        assert_eq!(sta.retry_limit(), 6);

        let mut chain = Vec::new();
        while sta.need_retransmission() {
            chain.push(sta.report_data_failed());
        }
        assert_eq!(chain, vec![best, second, prob, prob, prob, prob]);
        assert_eq!(sta.long_retries(), 6);
        // Attempts land on the rate that was just tried
        assert_eq!(sta.rate_stats(best).attempts, 2);
        assert_eq!(sta.rate_stats(second).attempts, 1);
        assert_eq!(sta.rate_stats(prob).attempts, 3);
    }

    #[test]
    fn test_sampling_ladder_starts_on_sample_rate() {
        let fx = Fixture::single_group();
        let mut sta = station(&fx, 4);
        let (best, prob, sample) = (RateId::new(0, 3), RateId::new(0, 1), RateId::new(0, 0));
        sta.max_tp_rate = best;
        sta.max_tp_rate2 = RateId::new(0, 2);
        sta.max_prob_rate = prob;
        sta.is_sampling = true;
        sta.sample_rate = sample;
        sta.tx_rate = sample;
        set_budget(&mut sta, sample, 2);
        set_budget(&mut sta, best, 1);
        set_budget(&mut sta, prob, 1);

        let mut chain = Vec::new();
        while sta.need_retransmission() {
            chain.push(sta.report_data_failed());
        }
        assert_eq!(chain, vec![sample, best, prob, prob]);
    }

    #[test]
    fn test_retransmission_check_matches_ladder() {
        let fx = Fixture::single_group();
        let mut sta = station(&fx, 8);
        for sampling in [false, true] {
            sta.is_sampling = sampling;
            sta.sample_rate = RateId::new(0, 5);
            sta.long_retry = 0;
            let limit = sta.retry_limit();
            for lr in 0..limit + 2 {
                sta.long_retry = lr;
                assert_eq!(sta.need_retransmission(), lr < limit);
            }
        }
    }

    #[test]
    #[should_panic(expected = "Max retries reached")]
    fn test_retry_past_limit_panics() {
        let fx = Fixture::single_group();
        let mut sta = station(&fx, 4);
        let limit = sta.retry_limit();
        for _ in 0..=limit + 1 {
            sta.report_data_failed();
        }
    }

    #[test]
    fn test_data_ok_resets_frame_state() {
        let fx = Fixture::single_group();
        let mut sta = station(&fx, 4);
        let mut rng = StdRng::seed_from_u64(1);
        let rate = sta.tx_rate();
        sta.report_rts_failed();
        sta.report_data_failed();
        sta.is_sampling = true;

        sta.report_data_ok(&fx.ctx(), Duration::from_millis(10), &mut rng);
        assert!(!sta.is_sampling() || sta.sample_rate() == sta.tx_rate());
        assert_eq!(sta.long_retries(), 0);
        assert_eq!(sta.short_retries(), 0);
        assert_eq!(sta.frame_count(), 1);
        // No statistics pass before the deadline
        assert_eq!(sta.rate_stats(rate).attempts, 2);
        assert_eq!(sta.rate_stats(rate).successes, 1);
    }

    #[test]
    fn test_frame_counter_wraps_without_samples() {
        let fx = Fixture::single_group();
        // One coding index: every sample candidate is the best rate itself
        let mut sta = station(&fx, 1);
        let mut rng = StdRng::seed_from_u64(1);
        for i in 0..500u64 {
            sta.report_data_ok(&fx.ctx(), Duration::from_millis(i), &mut rng);
        }
        assert_eq!(sta.frame_count(), 500);
        assert_eq!(sta.sample_count(), 0);

        sta.frame_count = u32::MAX;
        let sel = sta.report_data_ok(&fx.ctx(), Duration::from_millis(600), &mut rng);
        assert_eq!(sta.frame_count(), 0);
        assert_eq!(sel.rate, RateId::new(0, 0));
        assert!(!sel.announce);
    }

    #[test]
    fn test_final_failures_count_errors() {
        let fx = Fixture::single_group();
        let mut sta = station(&fx, 4);
        let mut rng = StdRng::seed_from_u64(1);

        sta.report_data_failed();
        sta.report_final_data_failed(&fx.ctx(), Duration::from_millis(10), &mut rng);
        assert_eq!(sta.errors(), 1);
        assert_eq!(sta.long_retries(), 0);
        assert_eq!(sta.frame_count(), 0);

        sta.report_rts_failed();
        sta.report_rts_failed();
        assert_eq!(sta.short_retries(), 2);
        sta.report_final_rts_failed();
        assert_eq!(sta.short_retries(), 0);
        assert_eq!(sta.errors(), 2);
    }
}
