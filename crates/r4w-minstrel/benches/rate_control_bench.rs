//! Rate-Control Benchmarks
//!
//! Run with:
//!
//! ```bash
//! cargo bench -p r4w-minstrel --bench rate_control_bench
//! ```
//!
//! Measures the per-frame cost of the manager (select, report, periodic
//! statistics pass) and whole simulated links.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

use r4w_minstrel::{
    ChannelWidth, HtPhy, LinkSimulator, LossProfile, MinstrelHtConfig, MinstrelHtManager,
    PeerCapabilities, RadioCapabilities, StationId,
};

fn manager() -> MinstrelHtManager {
    MinstrelHtManager::new(
        HtPhy::new(),
        RadioCapabilities::default(),
        MinstrelHtConfig::default(),
    )
    .unwrap()
}

// ============================================================================
// Per-frame path
// ============================================================================

fn bench_frame_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_control/frame");

    for streams in [1u8, 2, 4] {
        let mut mgr = manager();
        let sta = StationId(1);
        mgr.add_station(sta, PeerCapabilities::ht(streams, ChannelWidth::Mhz40, true))
            .unwrap();
        let mut now = Duration::ZERO;

        group.bench_with_input(BenchmarkId::new("ok", streams), &streams, |b, _| {
            b.iter(|| {
                // 1 ms per frame crosses a statistics deadline every 100 frames
                now += Duration::from_millis(1);
                let tx = mgr.data_tx_vector(sta, now).unwrap();
                mgr.report_data_ok(sta, now).unwrap();
                black_box(tx)
            })
        });
    }

    group.finish();
}

// ============================================================================
// Simulated links
// ============================================================================

fn bench_link_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_control/link");
    group.sample_size(20);

    let profiles = [
        ("clean", LossProfile::uniform(1.0)),
        ("cliff4", LossProfile::cliff(4)),
    ];
    for (name, loss) in profiles {
        group.bench_function(BenchmarkId::new("1000_frames", name), |b| {
            b.iter(|| {
                let peer = PeerCapabilities::ht(2, ChannelWidth::Mhz20, false);
                let mut sim =
                    LinkSimulator::new(manager(), StationId(1), peer, loss.clone(), 42).unwrap();
                black_box(sim.run(1000).unwrap().delivered)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frame_path, bench_link_simulation);
criterion_main!(benches);
