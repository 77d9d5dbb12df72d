//! Post-run statistics over a trace.
//!
//! - **Blocks per core**: how evenly the pool was used
//! - **Busy ticks**: ticks each core spent between start and done
//! - **Block latency**: start-to-done distribution across all blocks
//! - **Reclaim latency**: reset-request-to-acknowledge distribution

use std::fmt;

use crate::trace::{Trace, TraceKind};
use crate::types::{CoreId, Tick};

/// Summary statistics for a distribution of tick counts.
#[derive(Debug, Clone, Default)]
pub struct DistributionStats {
    pub count: usize,
    /// Minimum value (or 0 if empty).
    pub min: Tick,
    /// Maximum value (or 0 if empty).
    pub max: Tick,
    pub sum: Tick,
    sum_sq: u128,
}

impl DistributionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: Tick) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += (value as u128) * (value as u128);
    }

    /// Mean value (or 0 if empty).
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Standard deviation (or 0 with fewer than two samples).
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            let mean = self.mean();
            let variance = (self.sum_sq as f64 / self.count as f64) - (mean * mean);
            variance.max(0.0).sqrt()
        }
    }
}

impl fmt::Display for DistributionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} min={} max={} mean={:.2} stddev={:.2}",
            self.count,
            self.min,
            self.max,
            self.mean(),
            self.stddev()
        )
    }
}

/// Per-core usage.
#[derive(Debug, Clone, Default)]
pub struct CoreStats {
    pub blocks: usize,
    pub busy_ticks: Tick,
}

#[derive(Debug, Clone, Default)]
pub struct TraceStats {
    pub ticks: Tick,
    pub cores: Vec<CoreStats>,
    pub block_latency: DistributionStats,
    pub reclaim_latency: DistributionStats,
}

impl TraceStats {
    pub fn from_trace(trace: &Trace) -> Self {
        let nr_cores = trace.nr_cores() as usize;
        let mut cores = vec![CoreStats::default(); nr_cores];
        let mut started_at: Vec<Option<Tick>> = vec![None; nr_cores];
        let mut reset_at: Vec<Option<Tick>> = vec![None; nr_cores];
        let mut block_latency = DistributionStats::new();
        let mut reclaim_latency = DistributionStats::new();

        for event in trace.events() {
            let Some(core) = event.core.map(CoreId::index) else {
                continue;
            };
            if core >= nr_cores {
                continue;
            }
            match event.kind {
                TraceKind::BlockStarted { .. } => {
                    cores[core].blocks += 1;
                    started_at[core] = Some(event.tick);
                }
                TraceKind::CoreDone { .. } => {
                    if let Some(start) = started_at[core].take() {
                        let ticks = event.tick - start;
                        cores[core].busy_ticks += ticks;
                        block_latency.add(ticks);
                    }
                }
                TraceKind::ResetRequested { .. } => reset_at[core] = Some(event.tick),
                TraceKind::ResetAcked => {
                    if let Some(at) = reset_at[core].take() {
                        reclaim_latency.add(event.tick - at);
                    }
                }
                TraceKind::Launched | TraceKind::KernelDone { .. } => {}
            }
        }

        TraceStats {
            ticks: trace.ticks(),
            cores,
            block_latency,
            reclaim_latency,
        }
    }

    /// Fraction of the run each core spent executing blocks.
    pub fn utilization(&self, core: CoreId) -> f64 {
        match self.cores.get(core.index()) {
            Some(c) if self.ticks > 0 => c.busy_ticks as f64 / self.ticks as f64,
            _ => 0.0,
        }
    }
}
