//! Rate-change notifications
//!
//! The manager calls every subscribed observer each time the selector hands
//! out a rate for the next frame, with the nominal data rate of that rate.

use serde::{Deserialize, Serialize};

use crate::group::RateId;
use crate::station::StationId;

/// One rate decision for one station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateChange {
    pub station: StationId,
    pub rate: RateId,
    /// Nominal data rate of `rate` in bits per second
    pub data_rate_bps: u64,
    /// The rate is a look-around sample
    pub sampled: bool,
}

/// Receiver of rate-change notifications.
pub trait RateChangeObserver: Send {
    fn on_rate_change(&mut self, change: &RateChange);
}

impl<F> RateChangeObserver for F
where
    F: FnMut(&RateChange) + Send,
{
    fn on_rate_change(&mut self, change: &RateChange) {
        self(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_closure_forwards_to_channel() {
        let (tx, rx) = mpsc::channel();
        let mut observer = move |c: &RateChange| {
            let _ = tx.send(*c);
        };
        let change = RateChange {
            station: StationId(4),
            rate: RateId::new(1, 3),
            data_rate_bps: 52_000_000,
            sampled: false,
        };
        observer.on_rate_change(&change);
        assert_eq!(rx.try_recv().unwrap(), change);
    }
}
