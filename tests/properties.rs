//! Protocol properties over a sweep of pool sizes, kernel sizes, timings
//! and seeds.

use std::collections::HashSet;

use dispatch_sim::*;

mod common;

fn randomized(cores: u32, blocks: u32, seed: u32, sampling: DoneSampling) -> Scenario {
    Scenario::builder()
        .cores(cores)
        .blocks(blocks)
        .done_sampling(sampling)
        .run_ticks(Latency::Uniform { min: 1, max: 7 })
        .reset_ticks(Latency::Uniform { min: 1, max: 4 })
        .seed(seed)
        .build()
        .unwrap()
}

#[test]
fn test_sweep_every_block_exactly_once() {
    common::setup_test();
    for sampling in [DoneSampling::Pulse, DoneSampling::Level] {
        for cores in [1, 2, 3, 4, 7] {
            for blocks in [0, 1, 2, 5, 8, 13, 32] {
                for seed in 0..4 {
                    let scenario = randomized(cores, blocks, seed, sampling);
                    let trace = common::run_checked(Simulator::new(scenario));

                    assert_eq!(
                        trace.exit_kind(),
                        &ExitKind::Normal,
                        "cores={cores} blocks={blocks} seed={seed} {sampling}"
                    );
                    let ids: HashSet<BlockId> = trace.assigned_blocks().into_iter().collect();
                    let expected: HashSet<BlockId> = (0..blocks).map(BlockId).collect();
                    assert_eq!(ids, expected);
                }
            }
        }
    }
}

/// Every core gets work as long as there are at least as many blocks as
/// cores.
#[test]
fn test_no_core_starves() {
    common::setup_test();
    for seed in 0..8 {
        let trace = common::run_checked(Simulator::new(randomized(4, 40, seed, DoneSampling::Pulse)));
        for core in 0..4 {
            assert!(
                trace.start_count(CoreId(core)) > 0,
                "seed={seed}: core {core} never started"
            );
        }
        let stats = TraceStats::from_trace(&trace);
        let blocks: usize = stats.cores.iter().map(|c| c.blocks).sum();
        assert_eq!(blocks, 40);
    }
}

/// `done` rises once and is the last thing the dispatcher reports.
#[test]
fn test_done_rises_once() {
    common::setup_test();
    let mut rises = 0;
    let mut done_seen_at = None;
    let trace = Simulator::new(randomized(3, 12, 9, DoneSampling::Pulse))
        .monitor(move |ctx: &ProbeContext| {
            if ctx.report.became_done {
                rises += 1;
                assert_eq!(rises, 1, "done rose twice");
                assert_eq!(
                    ctx.dispatcher.completed_blocks(),
                    ctx.dispatcher.total_blocks()
                );
                done_seen_at = Some(ctx.tick);
            }
            if let Some(at) = done_seen_at {
                assert!(ctx.report.done, "done fell at tick {} after rising at {at}", ctx.tick);
            } else {
                assert!(!ctx.report.done);
            }
        })
        .run();
    common::check_protocol(&trace);
    assert!(trace.is_done());
}

/// Same scenario and seed: identical trace.
#[test]
fn test_determinism() {
    common::setup_test();
    let trace1 = Simulator::new(randomized(4, 20, 11, DoneSampling::Pulse)).run();
    let trace2 = Simulator::new(randomized(4, 20, 11, DoneSampling::Pulse)).run();

    assert_eq!(
        trace1.events().len(),
        trace2.events().len(),
        "traces have different lengths"
    );
    for (i, (e1, e2)) in trace1.events().iter().zip(trace2.events()).enumerate() {
        assert_eq!(e1, e2, "event {i} differs");
    }
    assert_eq!(trace1.ticks(), trace2.ticks());
}

/// The start pulse lasts exactly one tick and `block_id` stays valid while
/// the core runs.
#[test]
fn test_start_pulse_width() {
    common::setup_test();
    let trace = Simulator::new(
        Scenario::builder()
            .cores(2)
            .blocks(4)
            .run_ticks(Latency::Fixed(4))
            .build()
            .unwrap(),
    )
    .monitor(|ctx: &ProbeContext| {
        let started: Vec<CoreId> = ctx.report.assignments().map(|(c, _)| c).collect();
        for slot in ctx.dispatcher.slots() {
            let out = slot.outputs();
            assert_eq!(out.start, started.contains(&slot.id));
            assert_eq!(out.block_id, slot.assigned_block_id());
            assert_eq!(out.reset_request, slot.status().is_resetting());
        }
    })
    .run();
    assert_eq!(trace.exit_kind(), &ExitKind::Normal);
}
