#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::Level;

use dispatch_sim::{BlockId, CoreId, ProbeContext, Simulator, Tick, Trace, TraceKind};

/// Initialize tracing from `RUST_LOG` with the simulator formatter.
///
/// Idempotent: the first call in the process installs the subscriber,
/// later calls are ignored.
pub fn setup_test() {
    dispatch_sim::init_tracing(Level::WARN);
}

/// Where a core stands in its handshake, reconstructed from the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running(BlockId),
    Done(BlockId),
    Resetting,
}

/// Check every trace-level protocol property of a run:
///
/// - block ids are handed out as 0, 1, 2, ... with no gap or repeat;
/// - each core follows start -> done -> reset -> ack -> start, and only
///   reports done for the block it was given;
/// - `KernelDone` is recorded at most once, and only once every block
///   has been retired;
/// - a normal exit means every block was assigned and retired.
pub fn check_protocol(trace: &Trace) {
    let total = trace.total_blocks();

    let assigned = trace.assigned_blocks();
    for (i, block) in assigned.iter().enumerate() {
        assert_eq!(
            block.0, i as u32,
            "block ids must be issued in order without gaps: {assigned:?}"
        );
    }
    assert!(
        assigned.len() <= total as usize,
        "{} blocks assigned for a kernel of {total}",
        assigned.len()
    );

    let mut phases: HashMap<CoreId, Phase> = HashMap::new();
    let mut retired = 0u32;
    let mut done_events = 0;

    for event in trace.events() {
        if let TraceKind::KernelDone { completed } = event.kind {
            done_events += 1;
            assert_eq!(completed, total, "done with {completed}/{total} retired");
            assert_eq!(retired, total, "done before every block was retired");
            continue;
        }
        let Some(core) = event.core else {
            continue;
        };
        let phase = phases.entry(core).or_insert(Phase::Idle);
        *phase = match (*phase, event.kind) {
            (Phase::Idle, TraceKind::BlockStarted { block, .. }) => Phase::Running(block),
            (Phase::Running(b), TraceKind::CoreDone { block }) => {
                assert_eq!(b, block, "{core} reported done for the wrong block");
                Phase::Done(block)
            }
            (Phase::Done(b), TraceKind::ResetRequested { block }) => {
                assert_eq!(b, block, "{core} retired the wrong block");
                retired += 1;
                Phase::Resetting
            }
            (Phase::Resetting, TraceKind::ResetAcked) => Phase::Idle,
            (p, k) => panic!("{core}: {k:?} at tick {} while {p:?}", event.tick),
        };
    }

    assert!(done_events <= 1, "KernelDone recorded {done_events} times");
    if !trace.has_error() {
        assert_eq!(assigned.len(), total as usize, "not every block was assigned");
        assert_eq!(retired, total, "not every block was retired");
        assert!(trace.is_done(), "normal exit without KernelDone");
    }
}

/// Per-tick checks that need dispatcher state:
///
/// - no running slot without a block, no block on two slots;
/// - no start pulse once every block has been issued;
/// - an idle slot left over while work remains is started on the very
///   next tick, unless the remaining work went to other slots first.
#[derive(Default)]
pub struct TickChecks {
    waiting: Vec<CoreId>,
    pub ticks_sampled: Tick,
}

impl TickChecks {
    pub fn sample(&mut self, ctx: &ProbeContext) {
        let d = ctx.dispatcher;
        self.ticks_sampled += 1;

        d.check_invariants().expect("dispatcher invariants");

        let started: Vec<CoreId> = ctx.report.assignments().map(|(c, _)| c).collect();
        for core in self.waiting.drain(..) {
            assert!(
                started.contains(&core) || d.remaining_blocks() == 0,
                "tick {}: idle {core} starved with {} blocks left",
                ctx.tick,
                d.remaining_blocks()
            );
        }

        for slot in d.slots() {
            let out = slot.outputs();
            if slot.status().is_running() {
                assert!(out.block_id.is_some(), "{} running without a block", slot.id);
            }
            if out.start {
                assert!(
                    started.contains(&slot.id),
                    "{} pulsed start without an assignment",
                    slot.id
                );
            }
            if slot.status().is_idle() && d.remaining_blocks() > 0 {
                self.waiting.push(slot.id);
            }
        }
    }
}

/// Run `sim` with `TickChecks` attached, then check the trace.
pub fn run_checked(sim: Simulator) -> Trace {
    let checks = Rc::new(RefCell::new(TickChecks::default()));
    let probe = Rc::clone(&checks);
    let trace = sim
        .monitor(move |ctx: &ProbeContext| probe.borrow_mut().sample(ctx))
        .run();
    check_protocol(&trace);
    assert!(
        checks.borrow().ticks_sampled > 0 || trace.has_error(),
        "monitor never ran"
    );
    trace
}
