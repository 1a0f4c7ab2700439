//! Rate selector
//!
//! Picks the rate for the next frame. Most frames go out at the best
//! throughput rate; a coin flip, bounded by the look-around percentage,
//! occasionally diverts one to a rate drawn from the sample schedule so the
//! statistics of other rates stay fresh.

use rand::Rng;

use super::stats::HIGH_PROB;
use super::{HtStation, RateContext};
use crate::group::{group_params, RateId, N_GROUPS};

/// Frames after which frame and sample counters start over
pub const FRAME_COUNT_RESET: u32 = 10_000;
/// Intervals without attempts after which a slow rate may still be sampled
pub const SKIPPED_SAMPLE_THRESHOLD: u32 = 20;
/// Slow samples allowed per update interval
pub const MAX_SLOW_SAMPLES: u32 = 2;

/// Outcome of one selector run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Rate for the next frame
    pub rate: RateId,
    /// The rate is a look-around sample
    pub sampled: bool,
    /// A rate-change notification should be emitted
    pub announce: bool,
}

impl HtStation {
    /// Choose the rate for the next frame.
    pub fn find_rate<R: Rng + ?Sized>(&mut self, ctx: &RateContext<'_>, rng: &mut R) -> Selection {
        let total = self.sample_count as u64 + self.frame_count as u64;
        if total == 0 {
            return Selection {
                rate: self.max_tp_rate,
                sampled: false,
                announce: false,
            };
        }

        let coin = rng.gen_range(0..=100) % 2;
        let ratio = 100 * self.sample_count as u64 / total;

        if (ratio as f64) < ctx.config.look_around_rate && coin == 1 {
            let candidate = self.next_sample();
            tracing::trace!("{}: sample candidate {}", self.id, candidate);
            if self.evaluate_sample(candidate) {
                return self.start_sample(candidate);
            }
        }

        Selection {
            rate: self.max_tp_rate,
            sampled: false,
            announce: true,
        }
    }

    /// Decide whether a drawn sample is worth the air time.
    ///
    /// Counts a slow sample when the candidate fails the duration test.
    pub(crate) fn evaluate_sample(&mut self, candidate: RateId) -> bool {
        let stats = &self.rates[candidate.index()];
        if candidate == self.max_tp_rate
            || candidate == self.max_tp_rate2
            || candidate == self.max_prob_rate
            || stats.ewma_prob > HIGH_PROB
        {
            return false;
        }

        let duration = stats.ideal_duration;
        let samples_skipped = stats.samples_skipped;
        let tp2_duration = self.rates[self.max_tp_rate2.index()].ideal_duration;
        let prob_duration = self.rates[self.max_prob_rate.index()].ideal_duration;
        let sample_streams = group_params(candidate.group_id()).streams;
        let max_tp_streams = group_params(self.max_tp_rate.group_id()).streams;

        if duration < tp2_duration
            || (sample_streams + 1 <= max_tp_streams && duration < prob_duration)
        {
            return true;
        }

        self.num_samples_slow += 1;
        samples_skipped >= SKIPPED_SAMPLE_THRESHOLD && self.num_samples_slow <= MAX_SLOW_SAMPLES
    }

    fn start_sample(&mut self, rate: RateId) -> Selection {
        self.sample_count = self.sample_count.wrapping_add(1);
        self.is_sampling = true;
        if self.frame_count >= FRAME_COUNT_RESET {
            self.sample_count = 0;
            self.frame_count = 0;
        }
        self.sample_rate = rate;
        tracing::debug!("{}: sampling rate {}", self.id, rate);
        Selection {
            rate,
            sampled: true,
            announce: true,
        }
    }

    /// Read the rate under the sample cursor, then move the cursor on.
    pub(crate) fn next_sample(&mut self) -> RateId {
        let group = self.sample_group;
        let mcs = match &self.groups[group].sample_table {
            Some(table) => table.current(),
            None => panic!("{}: sample group {} has no sample table", self.id, group),
        };
        self.advance_sample_cursor();
        RateId::new(group, mcs as usize)
    }

    /// Move to the next supported group and step its table cursor.
    pub(crate) fn advance_sample_cursor(&mut self) {
        loop {
            self.sample_group = (self.sample_group + 1) % N_GROUPS;
            if self.groups[self.sample_group].supported {
                break;
            }
        }
        if let Some(table) = self.groups[self.sample_group].sample_table.as_mut() {
            table.advance();
        }
    }
}
