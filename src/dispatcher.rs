//! Block dispatcher.
//!
//! The dispatcher owns the global counters and, once per tick, drives
//! every core slot through its handshake:
//!
//! 1. Running slots whose core raised `done` become Done.
//! 2. Done slots are reclaimed: `completed_blocks` is bumped and a reset
//!    is requested (Done -> Resetting).
//! 3. Resetting slots whose core acknowledged the reset become Idle.
//! 4. Idle slots receive the next unissued block id with a one-tick start
//!    pulse, in ascending core order, while blocks remain.
//! 5. `done` is recomputed.
//!
//! All decisions are taken against a snapshot of the slot statuses and
//! inputs at the start of the tick and applied afterwards, so a slot
//! reclaimed or released on tick `t` is not handed a new block before
//! tick `t + 1`.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::DispatchError;
use crate::kernel::KernelConfig;
use crate::slot::{CoreInputs, CoreOutputs, CoreSlot, DoneSampling, SlotStatus};
use crate::types::{BlockId, CoreId};

/// A single slot transition decided during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Running -> Done: the core signalled completion of `block`.
    Completed { core: CoreId, block: BlockId },
    /// Done -> Resetting: `block` retired, reset requested.
    Reclaimed { core: CoreId, block: BlockId },
    /// Resetting -> Idle: the core acknowledged the reset.
    Released { core: CoreId, block: BlockId },
    /// Idle -> Running: `block` handed to the core with a start pulse.
    Assigned {
        core: CoreId,
        block: BlockId,
        warps: u32,
    },
}

impl Transition {
    pub fn core(&self) -> CoreId {
        match *self {
            Transition::Completed { core, .. }
            | Transition::Reclaimed { core, .. }
            | Transition::Released { core, .. }
            | Transition::Assigned { core, .. } => core,
        }
    }
}

/// What happened during one call to [`Dispatcher::step`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Transitions in the order they were applied.
    pub transitions: Vec<Transition>,
    /// Value of the global `done` flag after the step.
    pub done: bool,
    /// True on the single step where `done` went from false to true.
    pub became_done: bool,
}

impl StepReport {
    pub fn assignments(&self) -> impl Iterator<Item = (CoreId, BlockId)> + '_ {
        self.transitions.iter().filter_map(|t| match *t {
            Transition::Assigned { core, block, .. } => Some((core, block)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    kernel: KernelConfig,
    sampling: DoneSampling,
    slots: Vec<CoreSlot>,
    next_block_id: u32,
    completed_blocks: u32,
    done: bool,
    launched: bool,
}

impl Dispatcher {
    pub fn new(kernel: KernelConfig, nr_cores: u32, sampling: DoneSampling) -> Self {
        let mut dispatcher = Dispatcher {
            kernel,
            sampling,
            slots: (0..nr_cores).map(|i| CoreSlot::new(CoreId(i))).collect(),
            next_block_id: 0,
            completed_blocks: 0,
            done: false,
            launched: false,
        };
        dispatcher.done = dispatcher.completion_reached();
        dispatcher
    }

    /// Open the launch gate. Slots are only driven after launch.
    pub fn launch(&mut self) {
        if !self.launched {
            info!(
                blocks = self.total_blocks(),
                cores = self.slots.len(),
                warps_per_block = self.kernel.warps_per_block(),
                "kernel launched"
            );
        }
        self.launched = true;
    }

    /// Return to the pre-launch state: counters zeroed, every slot idle.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
        self.next_block_id = 0;
        self.completed_blocks = 0;
        self.launched = false;
        self.done = self.completion_reached();
    }

    pub fn kernel(&self) -> &KernelConfig {
        &self.kernel
    }

    pub fn sampling(&self) -> DoneSampling {
        self.sampling
    }

    pub fn total_blocks(&self) -> u32 {
        self.kernel.total_blocks()
    }

    pub fn next_block_id(&self) -> u32 {
        self.next_block_id
    }

    pub fn completed_blocks(&self) -> u32 {
        self.completed_blocks
    }

    pub fn remaining_blocks(&self) -> u32 {
        self.total_blocks() - self.next_block_id
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_launched(&self) -> bool {
        self.launched
    }

    pub fn nr_cores(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[CoreSlot] {
        &self.slots
    }

    pub fn slot(&self, core: CoreId) -> Option<&CoreSlot> {
        self.slots.get(core.index())
    }

    /// Outbound signals for `core`, valid until the next step.
    pub fn outputs(&self, core: CoreId) -> CoreOutputs {
        self.slot(core).map(CoreSlot::outputs).unwrap_or_default()
    }

    fn completion_reached(&self) -> bool {
        self.completed_blocks == self.total_blocks()
    }

    /// Check `done` and the core inputs against the snapshot, returning the
    /// statuses with observed completions folded in.
    fn observe(&self, inputs: &[CoreInputs]) -> Result<Vec<SlotStatus>, DispatchError> {
        let strict = self.sampling == DoneSampling::Pulse;
        let mut observed = Vec::with_capacity(self.slots.len());

        for (slot, input) in self.slots.iter().zip(inputs) {
            let status = slot.status();
            if strict && input.done && !status.is_running() {
                return Err(DispatchError::DoneWhileNotRunning {
                    core: slot.id,
                    status,
                });
            }
            if strict && input.reset_acknowledged && !status.is_resetting() {
                return Err(DispatchError::UnexpectedResetAck {
                    core: slot.id,
                    status,
                });
            }
            observed.push(match status {
                SlotStatus::Running { block } if input.done => SlotStatus::Done { block },
                other => other,
            });
        }

        Ok(observed)
    }

    /// Decide every transition for this tick from the observed snapshot.
    fn plan(
        &self,
        snapshot: &[SlotStatus],
        observed: &[SlotStatus],
        inputs: &[CoreInputs],
    ) -> Vec<Transition> {
        let mut plan = Vec::new();

        for (i, (&before, &after)) in snapshot.iter().zip(observed).enumerate() {
            if let (SlotStatus::Running { block }, SlotStatus::Done { .. }) = (before, after) {
                plan.push(Transition::Completed {
                    core: CoreId(i as u32),
                    block,
                });
            }
        }

        for (i, status) in observed.iter().enumerate() {
            if let SlotStatus::Done { block } = *status {
                plan.push(Transition::Reclaimed {
                    core: CoreId(i as u32),
                    block,
                });
            }
        }

        for (i, (status, input)) in observed.iter().zip(inputs).enumerate() {
            if let SlotStatus::Resetting { block } = *status {
                if input.reset_acknowledged {
                    plan.push(Transition::Released {
                        core: CoreId(i as u32),
                        block,
                    });
                }
            }
        }

        let total = self.total_blocks();
        let mut next = self.next_block_id;
        for (i, status) in observed.iter().enumerate() {
            if next >= total {
                break;
            }
            if status.is_idle() {
                let block = BlockId(next);
                plan.push(Transition::Assigned {
                    core: CoreId(i as u32),
                    block,
                    warps: self.kernel.warps_per_block(),
                });
                next += 1;
            }
        }

        plan
    }

    fn apply(&mut self, transition: Transition) {
        let slot = &mut self.slots[transition.core().index()];
        match transition {
            Transition::Completed { core, block } => {
                debug!(core = %core, block = %block, "core reported done");
                slot.complete();
            }
            Transition::Reclaimed { core, block } => {
                slot.reclaim();
                self.completed_blocks += 1;
                debug!(
                    core = %core,
                    block = %block,
                    completed = self.completed_blocks,
                    "reset requested"
                );
            }
            Transition::Released { core, .. } => {
                debug!(core = %core, "reset acknowledged");
                slot.release();
            }
            Transition::Assigned {
                core,
                block,
                warps,
            } => {
                slot.assign(block, warps);
                self.next_block_id = block.0 + 1;
                debug!(core = %core, block = %block, warps, "block dispatched");
            }
        }
    }

    /// Advance the dispatcher by one tick, given every core's inputs.
    ///
    /// Before launch no transition is taken. Errors leave the dispatcher
    /// untouched apart from the ended start pulses.
    pub fn step(&mut self, inputs: &[CoreInputs]) -> Result<StepReport, DispatchError> {
        if inputs.len() != self.slots.len() {
            return Err(DispatchError::InputWidth {
                expected: self.slots.len(),
                got: inputs.len(),
            });
        }

        for slot in &mut self.slots {
            slot.end_pulse();
        }

        let was_done = self.done;
        let mut report = StepReport::default();

        if self.launched {
            let snapshot: Vec<SlotStatus> = self.slots.iter().map(CoreSlot::status).collect();
            let observed = self.observe(inputs)?;
            report.transitions = self.plan(&snapshot, &observed, inputs);
            for &transition in &report.transitions {
                self.apply(transition);
            }
        }

        self.done = self.completion_reached();
        if was_done && !self.done {
            return Err(DispatchError::InvariantViolation(format!(
                "done reverted to false with {}/{} blocks completed",
                self.completed_blocks,
                self.total_blocks()
            )));
        }
        report.done = self.done;
        report.became_done = self.done && !was_done;
        if report.became_done {
            info!(completed = self.completed_blocks, "kernel done");
        }

        Ok(report)
    }

    /// Verify the counter and slot invariants.
    pub fn check_invariants(&self) -> Result<(), DispatchError> {
        let total = self.total_blocks();
        if self.completed_blocks > self.next_block_id || self.next_block_id > total {
            return Err(DispatchError::InvariantViolation(format!(
                "counters out of order: completed={} next={} total={}",
                self.completed_blocks, self.next_block_id, total
            )));
        }
        if self.done != (self.completed_blocks == total) {
            return Err(DispatchError::InvariantViolation(format!(
                "done={} with {}/{} blocks completed",
                self.done, self.completed_blocks, total
            )));
        }

        let mut running = HashSet::new();
        for slot in &self.slots {
            let SlotStatus::Running { block } = slot.status() else {
                continue;
            };
            if block.0 >= self.next_block_id {
                return Err(DispatchError::InvariantViolation(format!(
                    "{} runs {block} which was never issued",
                    slot.id
                )));
            }
            if !running.insert(block) {
                return Err(DispatchError::InvariantViolation(format!(
                    "{block} bound to more than one core"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(blocks: u32, cores: u32) -> Dispatcher {
        let kernel = KernelConfig::new(blocks, 4).unwrap();
        let mut d = Dispatcher::new(kernel, cores, DoneSampling::Pulse);
        d.launch();
        d
    }

    fn quiet(n: usize) -> Vec<CoreInputs> {
        vec![CoreInputs::QUIET; n]
    }

    fn done_on(n: usize, cores: &[u32]) -> Vec<CoreInputs> {
        let mut inputs = quiet(n);
        for &c in cores {
            inputs[c as usize].done = true;
        }
        inputs
    }

    fn ack_on(n: usize, cores: &[u32]) -> Vec<CoreInputs> {
        let mut inputs = quiet(n);
        for &c in cores {
            inputs[c as usize].reset_acknowledged = true;
        }
        inputs
    }

    #[test]
    fn test_first_step_assigns_in_core_order() {
        let mut d = dispatcher(8, 4);
        let report = d.step(&quiet(4)).unwrap();
        let assigned: Vec<_> = report.assignments().collect();
        assert_eq!(
            assigned,
            (0..4).map(|i| (CoreId(i), BlockId(i))).collect::<Vec<_>>()
        );
        assert_eq!(d.next_block_id(), 4);
        for i in 0..4 {
            let out = d.outputs(CoreId(i));
            assert!(out.start);
            assert_eq!(out.block_id, Some(BlockId(i)));
            assert_eq!(out.warps_per_block, 4);
        }
        d.check_invariants().unwrap();
    }

    #[test]
    fn test_start_is_a_single_tick_pulse() {
        let mut d = dispatcher(2, 1);
        d.step(&quiet(1)).unwrap();
        assert!(d.outputs(CoreId(0)).start);
        d.step(&quiet(1)).unwrap();
        let out = d.outputs(CoreId(0));
        assert!(!out.start);
        assert_eq!(out.block_id, Some(BlockId(0)), "block id stays valid while running");
    }

    #[test]
    fn test_not_launched_does_nothing() {
        let kernel = KernelConfig::new(4, 1).unwrap();
        let mut d = Dispatcher::new(kernel, 2, DoneSampling::Pulse);
        let report = d.step(&quiet(2)).unwrap();
        assert!(report.transitions.is_empty());
        assert!(!d.is_done());
        assert!(d.slots().iter().all(|s| s.status().is_idle()));
    }

    #[test]
    fn test_reclaim_then_release_then_reassign() {
        let mut d = dispatcher(3, 1);
        d.step(&quiet(1)).unwrap();

        let report = d.step(&done_on(1, &[0])).unwrap();
        assert_eq!(
            report.transitions,
            vec![
                Transition::Completed {
                    core: CoreId(0),
                    block: BlockId(0)
                },
                Transition::Reclaimed {
                    core: CoreId(0),
                    block: BlockId(0)
                },
            ]
        );
        assert_eq!(d.completed_blocks(), 1);
        assert!(d.outputs(CoreId(0)).reset_request);
        assert!(!d.outputs(CoreId(0)).start);

        // Released on this tick, not reassigned until the next one.
        let report = d.step(&ack_on(1, &[0])).unwrap();
        assert_eq!(report.assignments().count(), 0);
        assert!(d.slot(CoreId(0)).unwrap().status().is_idle());

        let report = d.step(&quiet(1)).unwrap();
        assert_eq!(
            report.assignments().collect::<Vec<_>>(),
            vec![(CoreId(0), BlockId(1))]
        );
    }

    #[test]
    fn test_assignment_deferred_until_ack() {
        let mut d = dispatcher(2, 1);
        d.step(&quiet(1)).unwrap();
        d.step(&done_on(1, &[0])).unwrap();

        for _ in 0..5 {
            let report = d.step(&quiet(1)).unwrap();
            assert!(report.transitions.is_empty());
            assert!(d.outputs(CoreId(0)).reset_request);
        }
        assert_eq!(d.remaining_blocks(), 1, "pending block must not be dropped");

        d.step(&ack_on(1, &[0])).unwrap();
        let report = d.step(&quiet(1)).unwrap();
        assert_eq!(
            report.assignments().collect::<Vec<_>>(),
            vec![(CoreId(0), BlockId(1))]
        );
    }

    #[test]
    fn test_no_start_when_exhausted() {
        let mut d = dispatcher(1, 4);
        d.step(&quiet(4)).unwrap();
        for i in 1..4 {
            assert!(!d.outputs(CoreId(i)).start);
            assert!(d.slot(CoreId(i)).unwrap().status().is_idle());
        }
        d.step(&done_on(4, &[0])).unwrap();
        d.step(&ack_on(4, &[0])).unwrap();
        let report = d.step(&quiet(4)).unwrap();
        assert!(report.transitions.is_empty());
        assert!(d.is_done());
    }

    #[test]
    fn test_done_exactly_once() {
        let mut d = dispatcher(2, 2);
        d.step(&quiet(2)).unwrap();

        let report = d.step(&done_on(2, &[1])).unwrap();
        assert!(!report.done);

        let report = d.step(&done_on(2, &[0])).unwrap();
        assert!(report.done);
        assert!(report.became_done);

        let report = d.step(&ack_on(2, &[0, 1])).unwrap();
        assert!(report.done);
        assert!(!report.became_done);
    }

    #[test]
    fn test_empty_kernel_done_before_launch() {
        let kernel = KernelConfig::new(0, 4).unwrap();
        let d = Dispatcher::new(kernel, 4, DoneSampling::Pulse);
        assert!(d.is_done());
        d.check_invariants().unwrap();
    }

    #[test]
    fn test_pulse_rejects_done_while_idle() {
        let mut d = dispatcher(0, 2);
        let err = d.step(&done_on(2, &[1])).unwrap_err();
        assert_eq!(
            err,
            DispatchError::DoneWhileNotRunning {
                core: CoreId(1),
                status: SlotStatus::Idle
            }
        );
    }

    #[test]
    fn test_pulse_rejects_unrequested_ack() {
        let mut d = dispatcher(4, 2);
        d.step(&quiet(2)).unwrap();
        let err = d.step(&ack_on(2, &[0])).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnexpectedResetAck { core: CoreId(0), status: SlotStatus::Running { .. } }
        ));
    }

    #[test]
    fn test_level_ignores_held_signals() {
        let kernel = KernelConfig::new(2, 1).unwrap();
        let mut d = Dispatcher::new(kernel, 1, DoneSampling::Level);
        d.launch();
        d.step(&quiet(1)).unwrap();

        let held = vec![CoreInputs {
            done: true,
            reset_acknowledged: false,
        }];
        let report = d.step(&held).unwrap();
        assert_eq!(d.completed_blocks(), 1);
        assert_eq!(report.assignments().count(), 0);
        // Still high while resetting: not counted again, nothing assigned.
        for _ in 0..3 {
            let report = d.step(&held).unwrap();
            assert_eq!(d.completed_blocks(), 1);
            assert_eq!(report.assignments().count(), 0);
            assert!(d.slot(CoreId(0)).unwrap().status().is_resetting());
        }

        let acked = vec![CoreInputs {
            done: true,
            reset_acknowledged: true,
        }];
        let report = d.step(&acked).unwrap();
        assert_eq!(report.assignments().count(), 0);
        assert!(d.slot(CoreId(0)).unwrap().status().is_idle());
        // Idle and ack still held: ignored, block 1 goes out.
        let report = d.step(&acked).unwrap();
        assert_eq!(report.assignments().count(), 1);
    }

    #[test]
    fn test_input_width_checked() {
        let mut d = dispatcher(4, 2);
        assert_eq!(
            d.step(&quiet(3)).unwrap_err(),
            DispatchError::InputWidth {
                expected: 2,
                got: 3
            }
        );
    }

    #[test]
    fn test_reset_restarts_run() {
        let mut d = dispatcher(2, 2);
        d.step(&quiet(2)).unwrap();
        d.step(&done_on(2, &[0, 1])).unwrap();
        assert!(d.is_done());

        d.reset();
        assert!(!d.is_done());
        assert!(!d.is_launched());
        assert_eq!(d.next_block_id(), 0);
        assert_eq!(d.completed_blocks(), 0);
        assert!(d.slots().iter().all(|s| s.status().is_idle()));
    }

    #[test]
    fn test_warps_per_block_forwarded_to_every_core() {
        let kernel = KernelConfig::new(3, 6).unwrap();
        let mut d = Dispatcher::new(kernel, 4, DoneSampling::Pulse);
        d.launch();
        let report = d.step(&quiet(4)).unwrap();
        for t in &report.transitions {
            assert!(matches!(t, Transition::Assigned { warps: 6, .. }));
        }
        for i in 0..3 {
            assert_eq!(d.outputs(CoreId(i)).warps_per_block, 6);
        }
        assert!(!d.outputs(CoreId(3)).start);
        assert_eq!(d.outputs(CoreId(3)).warps_per_block, 0);
    }
}
