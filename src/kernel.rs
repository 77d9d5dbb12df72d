//! Kernel launch configuration.
//!
//! A kernel is launched as `num_blocks` blocks of `warps_per_block` warps
//! each. The dispatcher hands out block ids and forwards the warp count
//! unchanged to every core it starts.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    num_blocks: u32,
    warps_per_block: u32,
}

impl KernelConfig {
    pub fn new(num_blocks: u32, warps_per_block: u32) -> Result<Self, ConfigError> {
        if warps_per_block == 0 {
            return Err(ConfigError::ZeroWarpsPerBlock);
        }
        Ok(KernelConfig {
            num_blocks,
            warps_per_block,
        })
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    pub fn warps_per_block(&self) -> u32 {
        self.warps_per_block
    }

    pub fn total_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// Warps launched over the whole kernel.
    pub fn total_warps(&self) -> u64 {
        u64::from(self.num_blocks) * u64::from(self.warps_per_block)
    }
}
