//! Simulate one 802.11n link and print where Minstrel-HT settles.
//!
//! ```bash
//! cargo run -p r4w-minstrel --example link_sim
//! ```

use r4w_minstrel::{
    init_logging, ChannelWidth, HtPhy, LinkSimulator, LogConfig, LossProfile, MinstrelHtConfig,
    MinstrelHtManager, PeerCapabilities, RadioCapabilities, RateChange, RateControlResult,
    StationId,
};

fn main() -> RateControlResult<()> {
    init_logging(&LogConfig::development());

    let mut manager = MinstrelHtManager::new(
        HtPhy::new(),
        RadioCapabilities::default(),
        MinstrelHtConfig::default(),
    )?;
    let mut changes = 0u64;
    manager.subscribe(move |change: &RateChange| {
        changes += 1;
        if changes % 500 == 0 {
            println!("rate change #{}: {:?}", changes, change);
        }
    });

    let station = StationId(1);
    let peer = PeerCapabilities::ht(2, ChannelWidth::Mhz40, true);
    let mut sim = LinkSimulator::new(manager, station, peer, LossProfile::uniform(1.0), 7)?;
    print_stats("clean channel", &mut sim, 5000)?;

    // Everything above MCS 3 starts failing
    sim.set_loss(LossProfile::cliff(3));
    print_stats("after the cliff", &mut sim, 5000)?;

    let now = sim.now();
    let report = sim.manager_mut().rate_table_report(station, now)?;
    println!("{}", report);
    Ok(())
}

fn print_stats(label: &str, sim: &mut LinkSimulator, frames: u64) -> RateControlResult<()> {
    let frame_length = sim.manager().config().frame_length;
    let stats = sim.run(frames)?.clone();
    println!("== {} ==", label);
    println!(
        "frames {}  delivered {}  dropped {}  attempts {}",
        stats.frames, stats.delivered, stats.dropped, stats.attempts
    );
    println!(
        "delivery {:.1}%  goodput {:.1} Mb/s  most used {:?}",
        stats.delivery_ratio() * 100.0,
        stats.goodput_bps(frame_length) / 1e6,
        stats.most_used_rate()
    );
    Ok(())
}
