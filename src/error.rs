//! Error types for the dispatcher and scenario configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::slot::SlotStatus;
use crate::types::CoreId;

/// Fatal dispatcher failures.
///
/// None of these are recoverable: a run that produces one is broken and
/// the engine terminates it with the error recorded as its exit kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A core raised `done` while its slot was not running a block.
    #[error("{core} raised done while {status}")]
    DoneWhileNotRunning { core: CoreId, status: SlotStatus },

    /// A core acknowledged a reset that was never requested.
    #[error("{core} acknowledged reset while {status}")]
    UnexpectedResetAck { core: CoreId, status: SlotStatus },

    /// `step` was handed a different number of core inputs than there are slots.
    #[error("expected inputs for {expected} cores, got {got}")]
    InputWidth { expected: usize, got: usize },

    /// A bookkeeping invariant no longer holds.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// Invalid kernel or scenario configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("warps_per_block must be non-zero")]
    ZeroWarpsPerBlock,

    #[error("scenario must have at least one core")]
    NoCores,

    #[error("{core} is outside a pool of {nr_cores} cores")]
    CoreOutOfRange { core: CoreId, nr_cores: u32 },

    #[error("kernel size missing: set `blocks` in the [kernel] table")]
    MissingKernelSize,

    #[error("invalid latency {0:?}: expected N, MIN..MAX or \"never\"")]
    InvalidLatency(String),

    #[error("invalid done sampling {0:?}: expected \"pulse\" or \"level\"")]
    InvalidSampling(String),

    #[error("invalid seed {0:?}: expected a u32 integer")]
    InvalidSeed(String),

    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
