//! Newtype wrappers and type aliases for domain concepts.
//!
//! Newtypes for identifiers (core slots, blocks) prevent silently passing
//! a block id where a core index is expected. Ticks are a plain alias,
//! since they are only ever counted and compared.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a core in the execution pool (`0..nr_cores`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CoreId(pub u32);

/// Identifier of a kernel block. Issued sequentially from 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockId(pub u32);

/// One discrete evaluation step of the scheduling loop.
pub type Tick = u64;

impl CoreId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    /// The id issued after this one.
    pub fn next(self) -> BlockId {
        BlockId(self.0 + 1)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk{}", self.0)
    }
}
