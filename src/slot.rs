//! Per-core slot state as seen by the dispatcher.
//!
//! Each slot cycles Idle -> Running -> Done -> Resetting -> Idle. The
//! status is a single tagged enum so that impossible combinations (e.g.
//! running with no block, resetting while started) cannot be expressed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{BlockId, CoreId};

/// Phase of a core slot.
///
/// `Done` and `Resetting` remember the block being retired so it can be
/// reported, but only `Running` counts as holding an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    /// Reclaimed and eligible for a new block.
    Idle,
    /// Executing `block`.
    Running { block: BlockId },
    /// The core reported completion of `block`; not yet reclaimed.
    Done { block: BlockId },
    /// Reset requested after `block`; waiting for the core to acknowledge.
    Resetting { block: BlockId },
}

impl SlotStatus {
    pub fn is_idle(self) -> bool {
        matches!(self, SlotStatus::Idle)
    }

    pub fn is_running(self) -> bool {
        matches!(self, SlotStatus::Running { .. })
    }

    pub fn is_resetting(self) -> bool {
        matches!(self, SlotStatus::Resetting { .. })
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Idle => f.write_str("idle"),
            SlotStatus::Running { block } => write!(f, "running {block}"),
            SlotStatus::Done { block } => write!(f, "done with {block}"),
            SlotStatus::Resetting { block } => write!(f, "resetting after {block}"),
        }
    }
}

/// How the dispatcher interprets the core's `done` and `reset_acknowledged`
/// inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoneSampling {
    /// Inputs are one-tick pulses. A pulse outside its handshake is a
    /// protocol violation.
    #[default]
    Pulse,
    /// Inputs may be held high. They only count while the slot is in the
    /// matching phase and are ignored otherwise.
    Level,
}

impl FromStr for DoneSampling {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pulse" => Ok(DoneSampling::Pulse),
            "level" => Ok(DoneSampling::Level),
            _ => Err(ConfigError::InvalidSampling(s.to_string())),
        }
    }
}

impl fmt::Display for DoneSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoneSampling::Pulse => f.write_str("pulse"),
            DoneSampling::Level => f.write_str("level"),
        }
    }
}

/// Signals a core drives towards the dispatcher on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreInputs {
    pub done: bool,
    pub reset_acknowledged: bool,
}

impl CoreInputs {
    pub const QUIET: CoreInputs = CoreInputs {
        done: false,
        reset_acknowledged: false,
    };
}

/// Signals the dispatcher drives towards a core after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreOutputs {
    /// High while the slot is reclaiming the core.
    pub reset_request: bool,
    /// High for exactly the tick on which a block was assigned.
    pub start: bool,
    /// The block being executed; present while the slot is running.
    pub block_id: Option<BlockId>,
    /// Warps per block of the running kernel; zero when no block is assigned.
    pub warps_per_block: u32,
}

/// Dispatcher-side state for one core of the pool.
#[derive(Debug, Clone)]
pub struct CoreSlot {
    pub id: CoreId,
    status: SlotStatus,
    warps_per_block: u32,
    start_pulse: bool,
}

impl CoreSlot {
    pub fn new(id: CoreId) -> Self {
        CoreSlot {
            id,
            status: SlotStatus::Idle,
            warps_per_block: 0,
            start_pulse: false,
        }
    }

    pub fn status(&self) -> SlotStatus {
        self.status
    }

    /// The block bound to this core. Only set while running.
    pub fn assigned_block_id(&self) -> Option<BlockId> {
        match self.status {
            SlotStatus::Running { block } => Some(block),
            _ => None,
        }
    }

    pub fn outputs(&self) -> CoreOutputs {
        let block_id = self.assigned_block_id();
        CoreOutputs {
            reset_request: self.status.is_resetting(),
            start: self.start_pulse,
            block_id,
            warps_per_block: if block_id.is_some() {
                self.warps_per_block
            } else {
                0
            },
        }
    }

    /// Idle -> Running, raising the start pulse.
    pub(crate) fn assign(&mut self, block: BlockId, warps_per_block: u32) {
        debug_assert!(self.status.is_idle(), "{} assigned while {}", self.id, self.status);
        self.status = SlotStatus::Running { block };
        self.warps_per_block = warps_per_block;
        self.start_pulse = true;
    }

    /// Running -> Done, on the core's completion signal.
    pub(crate) fn complete(&mut self) {
        if let SlotStatus::Running { block } = self.status {
            self.status = SlotStatus::Done { block };
        }
    }

    /// Done -> Resetting.
    pub(crate) fn reclaim(&mut self) {
        if let SlotStatus::Done { block } = self.status {
            self.status = SlotStatus::Resetting { block };
        }
    }

    /// Resetting -> Idle, once the core acknowledged the reset.
    pub(crate) fn release(&mut self) {
        if self.status.is_resetting() {
            self.status = SlotStatus::Idle;
            self.warps_per_block = 0;
        }
    }

    /// The start pulse lasts one tick.
    pub(crate) fn end_pulse(&mut self) {
        self.start_pulse = false;
    }

    pub(crate) fn clear(&mut self) {
        *self = CoreSlot::new(self.id);
    }
}
