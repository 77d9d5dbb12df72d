//! Simulated cores.
//!
//! A `SimCore` stands in for a real execution core: it has no notion of
//! what a block computes, only of how long it takes to raise `done` after
//! a start pulse and to acknowledge a reset request. Latencies are drawn
//! from the run's seeded PRNG so every scenario replays identically.

use std::fmt;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ConfigError;
use crate::slot::{CoreInputs, CoreOutputs, DoneSampling};
use crate::types::{BlockId, CoreId, Tick};

/// Delay, in ticks, between a request latched by a core and its response.
///
/// A response is never visible before the tick after the request, so
/// `Fixed(0)` and `Fixed(1)` behave the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Latency {
    Fixed(Tick),
    /// Uniformly drawn from `min..=max` for every request.
    Uniform { min: Tick, max: Tick },
    /// The core never responds.
    Never,
}

impl Latency {
    fn draw(self, rng: &mut SmallRng) -> Option<Tick> {
        match self {
            Latency::Fixed(n) => Some(n),
            Latency::Uniform { min, max } => Some(rng.gen_range(min..=max)),
            Latency::Never => None,
        }
    }
}

impl Default for Latency {
    fn default() -> Self {
        Latency::Fixed(1)
    }
}

/// Parses `"3"`, `"2..5"` (inclusive) or `"never"`.
impl FromStr for Latency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ConfigError::InvalidLatency(s.to_string());

        if s.eq_ignore_ascii_case("never") {
            return Ok(Latency::Never);
        }
        if let Some((lo, hi)) = s.split_once("..") {
            let hi = hi.strip_prefix('=').unwrap_or(hi);
            let min: Tick = lo.trim().parse().map_err(|_| invalid())?;
            let max: Tick = hi.trim().parse().map_err(|_| invalid())?;
            if min > max {
                return Err(invalid());
            }
            return Ok(if min == max {
                Latency::Fixed(min)
            } else {
                Latency::Uniform { min, max }
            });
        }
        s.parse().map(Latency::Fixed).map_err(|_| invalid())
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Latency::Fixed(n) => write!(f, "{n}"),
            Latency::Uniform { min, max } => write!(f, "{min}..{max}"),
            Latency::Never => f.write_str("never"),
        }
    }
}

/// Handshake timing of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreBehavior {
    /// Ticks from start pulse to `done`.
    pub run: Latency,
    /// Ticks from reset request to acknowledgement.
    pub reset: Latency,
}

/// An input raised outside the handshake, for exercising the error path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    SpuriousDone { tick: Tick },
    SpuriousResetAck { tick: Tick },
}

impl Fault {
    fn tick(self) -> Tick {
        match self {
            Fault::SpuriousDone { tick } | Fault::SpuriousResetAck { tick } => tick,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CorePhase {
    /// Waiting for a start pulse.
    Quiet,
    /// Executing; raises `done` at `done_at` (never if `None`).
    Busy {
        block: BlockId,
        done_at: Option<Tick>,
    },
    /// `done` raised, waiting for the reset request.
    Finished,
    /// Reset requested; acknowledges at `ack_at` (never if `None`).
    Resetting { ack_at: Option<Tick> },
    /// Reset acknowledged, waiting for the next start pulse.
    Acked,
}

/// One simulated core.
#[derive(Debug, Clone)]
pub struct SimCore {
    pub id: CoreId,
    behavior: CoreBehavior,
    sampling: DoneSampling,
    faults: Vec<Fault>,
    phase: CorePhase,
}

impl SimCore {
    pub fn new(
        id: CoreId,
        behavior: CoreBehavior,
        sampling: DoneSampling,
        faults: Vec<Fault>,
    ) -> Self {
        SimCore {
            id,
            behavior,
            sampling,
            faults,
            phase: CorePhase::Quiet,
        }
    }

    pub fn behavior(&self) -> CoreBehavior {
        self.behavior
    }

    /// The block this core is executing, if any.
    pub fn current_block(&self) -> Option<BlockId> {
        match self.phase {
            CorePhase::Busy { block, .. } => Some(block),
            _ => None,
        }
    }

    /// Drive this tick's inputs towards the dispatcher.
    pub fn inputs(&mut self, tick: Tick) -> CoreInputs {
        let held = self.sampling == DoneSampling::Level;
        let mut inputs = CoreInputs::QUIET;

        match self.phase {
            CorePhase::Busy {
                done_at: Some(at), ..
            } if tick >= at => {
                self.phase = CorePhase::Finished;
                inputs.done = true;
            }
            CorePhase::Finished => inputs.done = held,
            CorePhase::Resetting { ack_at: Some(at) } if tick >= at => {
                self.phase = CorePhase::Acked;
                inputs.reset_acknowledged = true;
            }
            // Level-driven `done` only drops once the reset has taken effect.
            CorePhase::Resetting { .. } => inputs.done = held,
            CorePhase::Acked => inputs.reset_acknowledged = held,
            _ => {}
        }

        for fault in self.faults.iter().filter(|f| f.tick() == tick) {
            match fault {
                Fault::SpuriousDone { .. } => inputs.done = true,
                Fault::SpuriousResetAck { .. } => inputs.reset_acknowledged = true,
            }
        }

        inputs
    }

    /// Latch the dispatcher's outputs at the end of `tick`.
    pub fn latch(&mut self, outputs: CoreOutputs, tick: Tick, rng: &mut SmallRng) {
        if outputs.start {
            let Some(block) = outputs.block_id else {
                return;
            };
            let done_at = self.behavior.run.draw(rng).map(|n| tick + n.max(1));
            trace!(core = %self.id, block = %block, ?done_at, "core started");
            self.phase = CorePhase::Busy { block, done_at };
        } else if outputs.reset_request
            && !matches!(self.phase, CorePhase::Resetting { .. } | CorePhase::Acked)
        {
            let ack_at = self.behavior.reset.draw(rng).map(|n| tick + n.max(1));
            trace!(core = %self.id, ?ack_at, "core resetting");
            self.phase = CorePhase::Resetting { ack_at };
        }
    }
}
