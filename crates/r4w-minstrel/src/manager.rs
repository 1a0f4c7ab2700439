//! Minstrel-HT rate manager
//!
//! [`MinstrelHtManager`] is the surface the MAC talks to. It owns everything
//! one radio shares between its peers (PHY model, group table, tuning, the
//! random stream and the rate-change observers) plus one [`Station`] per
//! associated peer.
//!
//! Every call carries the current virtual time. Stations are registered with
//! [`add_station`](MinstrelHtManager::add_station) and initialised lazily by
//! their first operation.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use r4w_minstrel::{MinstrelHtManager, MinstrelHtConfig, HtPhy, PeerCapabilities, RadioCapabilities, StationId, ChannelWidth};
//!
//! let mut mgr = MinstrelHtManager::new(HtPhy::new(), RadioCapabilities::default(), MinstrelHtConfig::default())?;
//! let sta = StationId(1);
//! mgr.add_station(sta, PeerCapabilities::ht(2, ChannelWidth::Mhz40, true))?;
//!
//! let now = Duration::from_millis(5);
//! let tx = mgr.data_tx_vector(sta, now)?;
//! // ... send, then on ACK:
//! mgr.report_data_ok(sta, now)?;
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::MinstrelHtConfig;
use crate::error::{RateControlError, RateControlResult};
use crate::group::{GroupTable, RateId};
use crate::observe::{RateChange, RateChangeObserver};
use crate::phy::{
    ChannelWidth, ControlTxVector, PeerCapabilities, PhyTiming, RadioCapabilities, TxVector,
};
use crate::station::{HtStation, RateContext, RateStats, Selection, Station, StationId};

/// Radio-wide read-only state shared by all stations.
struct Radio {
    phy: Box<dyn PhyTiming + Send + Sync>,
    groups: GroupTable,
    config: MinstrelHtConfig,
}

impl Radio {
    fn ctx(&self) -> RateContext<'_> {
        RateContext {
            groups: &self.groups,
            config: &self.config,
            phy: self.phy.as_ref(),
        }
    }
}

/// Read-only view of an HT station's rate-control state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSnapshot {
    pub station: StationId,
    pub tx_rate: RateId,
    pub max_tp_rate: RateId,
    pub max_tp_rate2: RateId,
    pub max_prob_rate: RateId,
    pub is_sampling: bool,
    pub sample_rate: RateId,
    pub frame_count: u32,
    pub sample_count: u32,
    pub short_retries: u32,
    pub long_retries: u32,
    pub errors: u32,
    /// Statistics of every supported rate, in flat-index order
    pub rates: Vec<(RateId, RateStats)>,
}

impl StationSnapshot {
    fn capture(ht: &HtStation) -> Self {
        Self {
            station: ht.id(),
            tx_rate: ht.tx_rate(),
            max_tp_rate: ht.max_tp_rate(),
            max_tp_rate2: ht.max_tp_rate2(),
            max_prob_rate: ht.max_prob_rate(),
            is_sampling: ht.is_sampling(),
            sample_rate: ht.sample_rate(),
            frame_count: ht.frame_count(),
            sample_count: ht.sample_count(),
            short_retries: ht.short_retries(),
            long_retries: ht.long_retries(),
            errors: ht.errors(),
            rates: ht
                .supported_rates()
                .map(|rate| (rate, ht.rate_stats(rate).clone()))
                .collect(),
        }
    }

    /// Statistics of one rate, if the station supports it
    pub fn stats(&self, rate: RateId) -> Option<&RateStats> {
        self.rates.iter().find(|(r, _)| *r == rate).map(|(_, s)| s)
    }
}

/// Minstrel-HT rate control for one radio.
pub struct MinstrelHtManager {
    radio: Radio,
    rng: StdRng,
    stations: HashMap<StationId, Station>,
    observers: Vec<(u64, Box<dyn RateChangeObserver>)>,
    next_observer_id: u64,
}

impl MinstrelHtManager {
    /// Build the group table for `radio` and start with no stations.
    pub fn new<P>(
        phy: P,
        radio: RadioCapabilities,
        config: MinstrelHtConfig,
    ) -> RateControlResult<Self>
    where
        P: PhyTiming + Send + Sync + 'static,
    {
        config.validate()?;
        let groups = GroupTable::build(&phy, &radio, config.frame_length);
        tracing::info!(
            "Minstrel-HT manager: {} groups for {} stream(s) at {}, seed {}",
            groups.len(),
            radio.max_streams,
            radio.channel_width,
            config.seed
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            radio: Radio {
                phy: Box::new(phy),
                groups,
                config,
            },
            stations: HashMap::new(),
            observers: Vec::new(),
            next_observer_id: 0,
        })
    }

    /// Tuning parameters in use
    pub fn config(&self) -> &MinstrelHtConfig {
        &self.radio.config
    }

    /// PHY timing model
    pub fn phy(&self) -> &dyn PhyTiming {
        self.radio.phy.as_ref()
    }

    /// Radio-wide group table
    pub fn group_table(&self) -> &GroupTable {
        &self.radio.groups
    }

    /// Number of registered stations
    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    /// Register a peer. It is initialised on its first operation.
    pub fn add_station(&mut self, id: StationId, peer: PeerCapabilities) -> RateControlResult<()> {
        if self.stations.contains_key(&id) {
            return Err(RateControlError::DuplicateStation(id));
        }
        tracing::debug!("{}: registered", id);
        self.stations.insert(id, Station::Pending(peer));
        Ok(())
    }

    /// Forget a peer and all of its statistics.
    pub fn remove_station(&mut self, id: StationId) -> RateControlResult<()> {
        self.stations
            .remove(&id)
            .map(|_| tracing::info!("{}: removed", id))
            .ok_or(RateControlError::UnknownStation(id))
    }

    /// Register a rate-change observer and return its handle.
    pub fn subscribe<O>(&mut self, observer: O) -> u64
    where
        O: RateChangeObserver + 'static,
    {
        let handle = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.push((handle, Box::new(observer)));
        handle
    }

    /// Drop an observer. Returns `false` for an unknown handle.
    pub fn unsubscribe(&mut self, handle: u64) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        self.observers.len() != before
    }

    /// Rate for the next data frame of an HT station.
    pub fn select_rate(&mut self, id: StationId, now: Duration) -> RateControlResult<RateId> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => Ok(ht.tx_rate()),
            _ => Err(RateControlError::NotHtStation(id)),
        }
    }

    /// Full transmit parameters for the next data frame.
    ///
    /// # Panics
    ///
    /// If the chosen group needs a capability the peer does not have.
    pub fn data_tx_vector(&mut self, id: StationId, now: Duration) -> RateControlResult<TxVector> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => {
                let rate = ht.tx_rate();
                let params = ctx.groups.params(rate);
                let peer = ht.peer();
                let fits = params.fits(peer.max_streams, peer.channel_width, peer.short_guard_interval);
                if !fits {
                    panic!(
                        "{}: inconsistent group selected: {} for peer ({} streams, {}, sgi={})",
                        id, params, peer.max_streams, peer.channel_width, peer.short_guard_interval
                    );
                }
                Ok(TxVector::Ht {
                    rate,
                    params,
                    retry_count: ht.long_retries(),
                })
            }
            Station::Legacy(legacy) => Ok(legacy.tx_vector()),
            Station::Pending(_) => unreachable!("station resolved above"),
        }
    }

    /// Transmit parameters for an RTS ahead of the next data frame.
    ///
    /// The rate is the highest basic rate not above the non-HT reference
    /// rate of the current data rate, or failing that the highest PHY legacy
    /// mode not above it.
    pub fn rts_tx_vector(
        &mut self,
        id: StationId,
        now: Duration,
    ) -> RateControlResult<ControlTxVector> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => {
                let reference_bps = ctx.phy.non_ht_reference_rate(ht.tx_rate().mcs);
                let below = |rate: &u64| *rate <= reference_bps;
                let chosen = ctx
                    .groups
                    .radio()
                    .basic_rates_bps
                    .iter()
                    .copied()
                    .filter(below)
                    .max()
                    .or_else(|| ctx.phy.legacy_rates().into_iter().filter(below).max());

                match chosen {
                    Some(data_rate_bps) => Ok(ControlTxVector {
                        data_rate_bps,
                        channel_width: ChannelWidth::Mhz20,
                        retry_count: ht.short_retries(),
                    }),
                    None => {
                        tracing::warn!(
                            "{}: no control rate at or below {} bps",
                            id,
                            reference_bps
                        );
                        Err(RateControlError::NoControlRate {
                            station: id,
                            reference_bps,
                        })
                    }
                }
            }
            Station::Legacy(legacy) => Ok(ControlTxVector {
                data_rate_bps: legacy.data_rate_bps(),
                channel_width: ChannelWidth::Mhz20,
                retry_count: legacy.short_retries(),
            }),
            Station::Pending(_) => unreachable!("station resolved above"),
        }
    }

    /// A data frame was acknowledged.
    pub fn report_data_ok(&mut self, id: StationId, now: Duration) -> RateControlResult<()> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => {
                let selection = ht.report_data_ok(&ctx, now, &mut self.rng);
                announce(&mut self.observers, &ctx, id, selection);
            }
            Station::Legacy(legacy) => legacy.report_data_ok(),
            Station::Pending(_) => unreachable!("station resolved above"),
        }
        Ok(())
    }

    /// One data attempt went unacknowledged; the frame may be retried.
    ///
    /// # Panics
    ///
    /// If the frame already used its whole retry chain, i.e. the caller
    /// retried after [`may_retransmit`](Self::may_retransmit) said no.
    pub fn report_data_failed(&mut self, id: StationId, now: Duration) -> RateControlResult<()> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => {
                ht.report_data_failed();
            }
            Station::Legacy(legacy) => legacy.report_data_failed(),
            Station::Pending(_) => unreachable!("station resolved above"),
        }
        Ok(())
    }

    /// Record a failed attempt and return the rate for the retry.
    ///
    /// Legacy peers get [`RateControlError::NotHtStation`] and nothing is
    /// recorded; report their failures with
    /// [`report_data_failed`](Self::report_data_failed).
    pub fn next_retry_rate(&mut self, id: StationId, now: Duration) -> RateControlResult<RateId> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => Ok(ht.report_data_failed()),
            _ => Err(RateControlError::NotHtStation(id)),
        }
    }

    /// A data frame was dropped after its last attempt.
    pub fn report_final_data_failed(
        &mut self,
        id: StationId,
        now: Duration,
    ) -> RateControlResult<()> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => {
                let selection = ht.report_final_data_failed(&ctx, now, &mut self.rng);
                announce(&mut self.observers, &ctx, id, selection);
            }
            Station::Legacy(legacy) => legacy.report_final_data_failed(),
            Station::Pending(_) => unreachable!("station resolved above"),
        }
        Ok(())
    }

    /// An RTS went unanswered.
    pub fn report_rts_failed(&mut self, id: StationId, now: Duration) -> RateControlResult<()> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => ht.report_rts_failed(),
            Station::Legacy(legacy) => legacy.report_rts_failed(),
            Station::Pending(_) => unreachable!("station resolved above"),
        }
        Ok(())
    }

    /// An RTS exchange was abandoned after its last attempt.
    pub fn report_final_rts_failed(
        &mut self,
        id: StationId,
        now: Duration,
    ) -> RateControlResult<()> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => ht.report_final_rts_failed(),
            Station::Legacy(legacy) => legacy.report_final_rts_failed(),
            Station::Pending(_) => unreachable!("station resolved above"),
        }
        Ok(())
    }

    /// A frame was received from the peer. Only logged.
    pub fn report_rx_ok(&mut self, id: StationId, snr_db: f64) -> RateControlResult<()> {
        if !self.stations.contains_key(&id) {
            return Err(RateControlError::UnknownStation(id));
        }
        tracing::trace!("{}: rx ok, snr {:.1} dB", id, snr_db);
        Ok(())
    }

    /// Whether the current frame may be sent again.
    ///
    /// Legacy peers answer with `normally`, the caller's own decision.
    pub fn may_retransmit(
        &mut self,
        id: StationId,
        now: Duration,
        normally: bool,
    ) -> RateControlResult<bool> {
        let ctx = self.radio.ctx();
        Ok(match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => ht.need_retransmission(),
            Station::Legacy(legacy) => legacy.need_retransmission(normally),
            Station::Pending(_) => unreachable!("station resolved above"),
        })
    }

    /// Read-only view of an HT station.
    pub fn station_snapshot(
        &mut self,
        id: StationId,
        now: Duration,
    ) -> RateControlResult<StationSnapshot> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => Ok(StationSnapshot::capture(ht)),
            _ => Err(RateControlError::NotHtStation(id)),
        }
    }

    /// Per-rate statistics table of an HT station as text.
    pub fn rate_table_report(&mut self, id: StationId, now: Duration) -> RateControlResult<String> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => Ok(ht.rate_table_report()),
            _ => Err(RateControlError::NotHtStation(id)),
        }
    }

    /// Sample schedule of every supported group of an HT station as text.
    pub fn sample_table_report(
        &mut self,
        id: StationId,
        now: Duration,
    ) -> RateControlResult<String> {
        let ctx = self.radio.ctx();
        match resolve(&mut self.stations, id, &ctx, now, &mut self.rng)? {
            Station::Ht(ht) => Ok(ht.sample_table_report()),
            _ => Err(RateControlError::NotHtStation(id)),
        }
    }
}

/// Look a station up and make sure it left the pending state.
fn resolve<'a>(
    stations: &'a mut HashMap<StationId, Station>,
    id: StationId,
    ctx: &RateContext<'_>,
    now: Duration,
    rng: &mut StdRng,
) -> RateControlResult<&'a mut Station> {
    let station = stations
        .get_mut(&id)
        .ok_or(RateControlError::UnknownStation(id))?;
    station.ensure_init(id, ctx, now, rng);
    Ok(station)
}

fn announce(
    observers: &mut [(u64, Box<dyn RateChangeObserver>)],
    ctx: &RateContext<'_>,
    station: StationId,
    selection: Selection,
) {
    if !selection.announce {
        return;
    }
    let rate = selection.rate;
    let params = ctx.groups.params(rate);
    let change = RateChange {
        station,
        rate,
        data_rate_bps: ctx.phy.data_rate(&params, rate.mcs),
        sampled: selection.sampled,
    };
    for (_, observer) in observers.iter_mut() {
        observer.on_rate_change(&change);
    }
}
