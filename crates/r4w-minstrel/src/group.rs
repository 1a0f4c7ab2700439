//! Rate groups
//!
//! A group bundles the PHY parameters (spatial streams, guard interval,
//! channel width) under which every coding index of the group is sent. The
//! [`GroupTable`] is built once per radio and shared read-only by all of its
//! stations; per-station support is decided later, at station initialisation.
//!
//! Rates are addressed by a flat index `group * MAX_GROUP_RATES + mcs`, so a
//! station's per-rate statistics live in one contiguous arena.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::phy::{ChannelWidth, GroupParams, PhyTiming, RadioCapabilities};

/// Highest spatial-stream count with a reserved group id
pub const MAX_SUPPORTED_STREAMS: u8 = 4;
/// Coding indices per group
pub const MAX_GROUP_RATES: usize = 8;
/// streams x guard interval x channel width
pub const N_GROUPS: usize = MAX_SUPPORTED_STREAMS as usize * 2 * 2;
/// Size of a flat per-rate arena
pub const N_RATES: usize = N_GROUPS * MAX_GROUP_RATES;

/// One transmission configuration: a group and a coding index within it.
///
/// Ordering follows the flat index, which is what the best-rate promotion
/// rule compares.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct RateId {
    /// Group id
    pub group: u8,
    /// Coding index within the group
    pub mcs: u8,
}

impl RateId {
    /// Create a rate id
    pub fn new(group: usize, mcs: usize) -> Self {
        assert!(group < N_GROUPS, "group id {} outside the group table", group);
        assert!(mcs < MAX_GROUP_RATES, "coding index {} outside its group", mcs);
        Self {
            group: group as u8,
            mcs: mcs as u8,
        }
    }

    /// Flat index into a per-rate arena
    pub fn index(self) -> usize {
        self.group as usize * MAX_GROUP_RATES + self.mcs as usize
    }

    /// Group id as an index
    pub fn group_id(self) -> usize {
        self.group as usize
    }
}

impl fmt::Display for RateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Group id for a parameter combination.
pub fn group_id(params: &GroupParams) -> usize {
    let streams = MAX_SUPPORTED_STREAMS as usize;
    let ht40 = match params.channel_width {
        ChannelWidth::Mhz20 => 0,
        ChannelWidth::Mhz40 => 1,
    };
    let sgi = params.short_guard_interval as usize;
    streams * 2 * ht40 + streams * sgi + params.streams as usize - 1
}

/// Inverse of [`group_id`].
pub fn group_params(id: usize) -> GroupParams {
    assert!(id < N_GROUPS, "group id {} outside the group table", id);
    let streams = MAX_SUPPORTED_STREAMS as usize;
    GroupParams {
        streams: (id % streams) as u8 + 1,
        short_guard_interval: (id / streams) % 2 == 1,
        channel_width: if id / (streams * 2) == 1 {
            ChannelWidth::Mhz40
        } else {
            ChannelWidth::Mhz20
        },
    }
}

/// A group the radio can use, with the ideal reference-frame duration of
/// each coding index.
#[derive(Debug, Clone, PartialEq)]
pub struct McsGroup {
    /// Group id
    pub id: usize,
    /// Shared PHY parameters
    pub params: GroupParams,
    /// Ideal duration of the reference frame, per coding index
    pub ideal_durations: [Duration; MAX_GROUP_RATES],
}

/// Every group the local radio can transmit, indexed by group id.
#[derive(Debug, Clone)]
pub struct GroupTable {
    groups: Vec<Option<McsGroup>>,
    radio: RadioCapabilities,
}

impl GroupTable {
    /// Build the table for a radio.
    ///
    /// A group is left out when it exceeds the radio's capabilities or when
    /// the PHY cannot give a duration for one of its coding indices.
    pub fn build(phy: &dyn PhyTiming, radio: &RadioCapabilities, frame_length: u32) -> Self {
        let groups = (0..N_GROUPS)
            .map(|id| {
                let params = group_params(id);
                if !params.fits(radio.max_streams, radio.channel_width, radio.short_guard_interval)
                {
                    return None;
                }

                let mut ideal_durations = [Duration::ZERO; MAX_GROUP_RATES];
                for (mcs, slot) in ideal_durations.iter_mut().enumerate() {
                    *slot = phy.ideal_duration(&params, mcs as u8, frame_length)?;
                }

                tracing::debug!("Initialized group {}: {}", id, params);
                Some(McsGroup {
                    id,
                    params,
                    ideal_durations,
                })
            })
            .collect();

        Self {
            groups,
            radio: radio.clone(),
        }
    }

    /// Group by id, if the radio supports it
    pub fn get(&self, id: usize) -> Option<&McsGroup> {
        self.groups.get(id).and_then(|g| g.as_ref())
    }

    /// Group by id; a miss is a broken caller contract.
    pub fn group(&self, id: usize) -> &McsGroup {
        match self.get(id) {
            Some(group) => group,
            None => panic!("group {} is not in the group table", id),
        }
    }

    /// Parameters of the group a rate belongs to
    pub fn params(&self, rate: RateId) -> GroupParams {
        self.group(rate.group_id()).params
    }

    /// Ideal duration of one rate
    pub fn ideal_duration(&self, rate: RateId) -> Duration {
        self.group(rate.group_id()).ideal_durations[rate.mcs as usize]
    }

    /// Iterate over the groups the radio supports
    pub fn iter(&self) -> impl Iterator<Item = &McsGroup> {
        self.groups.iter().flatten()
    }

    /// Number of groups the radio supports
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether the radio supports no group at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capabilities the table was built from
    pub fn radio(&self) -> &RadioCapabilities {
        &self.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::HtPhy;

    #[test]
    fn test_group_id_round_trip_covers_table() {
        let mut seen = [false; N_GROUPS];
        for id in 0..N_GROUPS {
            let params = group_params(id);
            assert_eq!(group_id(&params), id);
            seen[id] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_group_id_layout() {
        let p = GroupParams {
            streams: 1,
            short_guard_interval: false,
            channel_width: ChannelWidth::Mhz20,
        };
        assert_eq!(group_id(&p), 0);
        let p = GroupParams {
            streams: 2,
            short_guard_interval: true,
            channel_width: ChannelWidth::Mhz40,
        };
        assert_eq!(group_id(&p), 4 * 2 + 4 + 1);
    }

    #[test]
    fn test_rate_id_ordering_is_flat_index() {
        let a = RateId::new(0, 7);
        let b = RateId::new(1, 0);
        assert!(a < b);
        assert_eq!(b.index(), MAX_GROUP_RATES);
        assert_eq!(RateId::new(1, 5).index(), 13);
    }

    #[test]
    #[should_panic(expected = "outside its group")]
    fn test_rate_id_rejects_large_mcs() {
        RateId::new(0, MAX_GROUP_RATES);
    }

    #[test]
    fn test_build_respects_radio() {
        let radio = RadioCapabilities {
            max_streams: 2,
            channel_width: ChannelWidth::Mhz20,
            short_guard_interval: false,
            basic_rates_bps: vec![6_000_000],
        };
        let table = GroupTable::build(&HtPhy::new(), &radio, 1200);
        assert_eq!(table.len(), 2);
        assert!(table.get(0).is_some());
        assert!(table.get(1).is_some());
        assert!(table.get(2).is_none());
        assert!(table.iter().all(|g| !g.params.short_guard_interval));
    }

    #[test]
    fn test_build_excludes_groups_without_duration() {
        struct NoTwoStreams;
        impl PhyTiming for NoTwoStreams {
            fn ideal_duration(&self, p: &GroupParams, mcs: u8, _len: u32) -> Option<Duration> {
                (p.streams == 1).then(|| Duration::from_micros(100 + mcs as u64))
            }
            fn ack_timeout(&self) -> Duration {
                Duration::from_micros(50)
            }
            fn slot_time(&self) -> Duration {
                Duration::from_micros(9)
            }
            fn data_rate(&self, _p: &GroupParams, _mcs: u8) -> u64 {
                1
            }
            fn non_ht_reference_rate(&self, _mcs: u8) -> u64 {
                6_000_000
            }
            fn legacy_rates(&self) -> Vec<u64> {
                vec![6_000_000]
            }
        }

        let table = GroupTable::build(&NoTwoStreams, &RadioCapabilities::default(), 1200);
        assert!(table.iter().all(|g| g.params.streams == 1));
        assert_eq!(table.len(), 4);
        assert_eq!(
            table.ideal_duration(RateId::new(0, 3)),
            Duration::from_micros(103)
        );
    }

    #[test]
    #[should_panic(expected = "not in the group table")]
    fn test_lookup_miss_panics() {
        let table = GroupTable::build(&HtPhy::new(), &RadioCapabilities::default(), 1200);
        table.group(3);
    }
}
