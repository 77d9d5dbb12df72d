//! Tick-driven simulation engine.
//!
//! The engine closes the loop between the dispatcher and its simulated
//! cores. On every tick:
//!
//! 1. each core drives its inputs, based on the outputs it latched on
//!    the previous tick;
//! 2. the dispatcher steps against those inputs;
//! 3. each core latches the dispatcher's new outputs.
//!
//! The run ends when the dispatcher reports done, when the dispatcher
//! fails, or when the watchdog bound is reached. A dispatcher that is
//! already done still gets its step, so an empty kernel always completes.

use std::fmt;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use crate::dispatcher::{Dispatcher, StepReport, Transition};
use crate::error::DispatchError;
use crate::fmt::set_sim_tick;
use crate::harness::SimCore;
use crate::monitor::{Monitor, ProbeContext};
use crate::scenario::Scenario;
use crate::slot::CoreInputs;
use crate::trace::{Trace, TraceKind};
use crate::types::{CoreId, Tick};

/// How a simulation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    /// Every block was dispatched and retired.
    Normal,
    /// A core drove an input outside its handshake.
    ProtocolViolation(DispatchError),
    /// The dispatcher's bookkeeping went inconsistent.
    InvariantViolation(DispatchError),
    /// The watchdog bound elapsed before completion.
    Stalled { ticks: Tick },
}

impl ExitKind {
    pub fn is_error(&self) -> bool {
        !matches!(self, ExitKind::Normal)
    }

    fn from_error(err: DispatchError) -> Self {
        match err {
            DispatchError::InvariantViolation(_) => ExitKind::InvariantViolation(err),
            _ => ExitKind::ProtocolViolation(err),
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Normal => f.write_str("normal"),
            ExitKind::ProtocolViolation(e) => write!(f, "protocol violation: {e}"),
            ExitKind::InvariantViolation(e) => write!(f, "{e}"),
            ExitKind::Stalled { ticks } => write!(f, "stalled after {ticks} ticks"),
        }
    }
}

/// The main simulator.
pub struct Simulator {
    scenario: Scenario,
    monitors: Vec<Box<dyn Monitor>>,
}

impl Simulator {
    pub fn new(scenario: Scenario) -> Self {
        Simulator {
            scenario,
            monitors: Vec::new(),
        }
    }

    /// Register a monitor called after every step.
    pub fn monitor(mut self, monitor: impl Monitor + 'static) -> Self {
        self.monitors.push(Box::new(monitor));
        self
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Run the scenario to completion and return the trace.
    pub fn run(mut self) -> Trace {
        let scenario = &self.scenario;
        let mut rng = SmallRng::seed_from_u64(u64::from(scenario.seed));
        let mut dispatcher =
            Dispatcher::new(scenario.kernel, scenario.nr_cores, scenario.done_sampling);
        let mut cores: Vec<SimCore> = scenario
            .behaviors
            .iter()
            .enumerate()
            .map(|(i, &behavior)| {
                let id = CoreId(i as u32);
                SimCore::new(
                    id,
                    behavior,
                    scenario.done_sampling,
                    scenario.faults_for(id),
                )
            })
            .collect();
        let mut trace = Trace::new(scenario.nr_cores, scenario.total_blocks());

        set_sim_tick(Some(0));
        dispatcher.launch();
        trace.record(0, None, TraceKind::Launched);

        let mut tick: Tick = 0;
        let exit_kind = loop {
            if let Some(max) = scenario.max_ticks {
                if tick >= max && !dispatcher.is_done() {
                    warn!(
                        ticks = tick,
                        completed = dispatcher.completed_blocks(),
                        total = dispatcher.total_blocks(),
                        "watchdog: kernel did not complete"
                    );
                    break ExitKind::Stalled { ticks: tick };
                }
            }
            set_sim_tick(Some(tick));

            let inputs: Vec<CoreInputs> = cores.iter_mut().map(|c| c.inputs(tick)).collect();

            let report = match dispatcher
                .step(&inputs)
                .and_then(|report| dispatcher.check_invariants().map(|()| report))
            {
                Ok(report) => report,
                Err(err) => {
                    error!(%err, "dispatcher failed");
                    break ExitKind::from_error(err);
                }
            };

            record_step(&mut trace, tick, &report, &dispatcher);

            for core in &mut cores {
                core.latch(dispatcher.outputs(core.id), tick, &mut rng);
            }

            let ctx = ProbeContext {
                tick,
                inputs: &inputs,
                report: &report,
                dispatcher: &dispatcher,
                trace: &trace,
            };
            for monitor in &mut self.monitors {
                monitor.sample(&ctx);
            }

            tick += 1;
            if report.done {
                break ExitKind::Normal;
            }
        };

        if exit_kind == ExitKind::Normal {
            info!(ticks = tick, blocks = dispatcher.total_blocks(), "run complete");
        }
        set_sim_tick(None);
        trace.finish(tick, exit_kind);
        trace
    }
}

fn record_step(trace: &mut Trace, tick: Tick, report: &StepReport, dispatcher: &Dispatcher) {
    for transition in &report.transitions {
        let kind = match *transition {
            Transition::Completed { block, .. } => TraceKind::CoreDone { block },
            Transition::Reclaimed { block, .. } => TraceKind::ResetRequested { block },
            Transition::Released { .. } => TraceKind::ResetAcked,
            Transition::Assigned { block, warps, .. } => {
                TraceKind::BlockStarted { block, warps }
            }
        };
        trace.record(tick, Some(transition.core()), kind);
    }
    if report.became_done || (report.done && !trace.is_done()) {
        trace.record(
            tick,
            None,
            TraceKind::KernelDone {
                completed: dispatcher.completed_blocks(),
            },
        );
    }
}
