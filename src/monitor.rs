//! Monitor trait for per-tick state sampling.
//!
//! Monitors are called by the engine after every dispatcher step, so tests
//! can assert on dispatcher state that never reaches the trace.

use crate::dispatcher::{Dispatcher, StepReport};
use crate::slot::CoreInputs;
use crate::trace::Trace;
use crate::types::Tick;

/// Context passed to monitors after each step.
pub struct ProbeContext<'a> {
    pub tick: Tick,
    /// Inputs the cores drove on this tick.
    pub inputs: &'a [CoreInputs],
    /// Transitions the step took.
    pub report: &'a StepReport,
    /// Dispatcher state after the step.
    pub dispatcher: &'a Dispatcher,
    /// The trace accumulated so far, including this tick.
    pub trace: &'a Trace,
}

pub trait Monitor {
    fn sample(&mut self, ctx: &ProbeContext);
}

/// Any closure taking a `ProbeContext` is a monitor.
impl<F> Monitor for F
where
    F: FnMut(&ProbeContext),
{
    fn sample(&mut self, ctx: &ProbeContext) {
        self(ctx)
    }
}
