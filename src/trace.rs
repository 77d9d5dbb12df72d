//! Trace event recording for the simulator.
//!
//! Every handshake step (block started, core done, reset requested, reset
//! acknowledged) is recorded as a `TraceEvent` with its tick and core.

use serde::Serialize;
use serde_json::json;

use crate::engine::ExitKind;
use crate::fmt::FmtTick;
use crate::types::{BlockId, CoreId, Tick};

/// A single trace event produced by the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub tick: Tick,
    /// The core involved, or `None` for kernel-wide events.
    pub core: Option<CoreId>,
    pub kind: TraceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceKind {
    /// The launch gate opened.
    Launched,
    /// A block was assigned with a start pulse.
    BlockStarted { block: BlockId, warps: u32 },
    /// The core signalled completion of its block.
    CoreDone { block: BlockId },
    /// The block was retired and the core asked to reset.
    ResetRequested { block: BlockId },
    /// The core acknowledged the reset and went idle.
    ResetAcked,
    /// Every block has been dispatched and retired.
    KernelDone { completed: u32 },
}

/// A complete simulation trace, with events in tick order.
#[derive(Debug, Clone)]
pub struct Trace {
    events: Vec<TraceEvent>,
    nr_cores: u32,
    total_blocks: u32,
    ticks: Tick,
    exit_kind: ExitKind,
}

impl Trace {
    pub(crate) fn new(nr_cores: u32, total_blocks: u32) -> Self {
        Self {
            events: Vec::new(),
            nr_cores,
            total_blocks,
            ticks: 0,
            exit_kind: ExitKind::Normal,
        }
    }

    pub(crate) fn record(&mut self, tick: Tick, core: Option<CoreId>, kind: TraceKind) {
        self.events.push(TraceEvent { tick, core, kind });
    }

    pub(crate) fn finish(&mut self, ticks: Tick, exit_kind: ExitKind) {
        self.ticks = ticks;
        self.exit_kind = exit_kind;
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn nr_cores(&self) -> u32 {
        self.nr_cores
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// Number of ticks the run lasted.
    pub fn ticks(&self) -> Tick {
        self.ticks
    }

    pub fn exit_kind(&self) -> &ExitKind {
        &self.exit_kind
    }

    pub fn has_error(&self) -> bool {
        self.exit_kind.is_error()
    }

    /// Block ids in the order they were handed out.
    pub fn assigned_blocks(&self) -> Vec<BlockId> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                TraceKind::BlockStarted { block, .. } => Some(block),
                _ => None,
            })
            .collect()
    }

    /// Blocks started on `core`, in order.
    pub fn blocks_on(&self, core: CoreId) -> Vec<BlockId> {
        self.events
            .iter()
            .filter(|e| e.core == Some(core))
            .filter_map(|e| match e.kind {
                TraceKind::BlockStarted { block, .. } => Some(block),
                _ => None,
            })
            .collect()
    }

    /// Number of start pulses `core` received.
    pub fn start_count(&self, core: CoreId) -> usize {
        self.events
            .iter()
            .filter(|e| e.core == Some(core) && matches!(e.kind, TraceKind::BlockStarted { .. }))
            .count()
    }

    /// Number of blocks retired.
    pub fn retired_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::ResetRequested { .. }))
            .count()
    }

    /// Tick on which the kernel was reported done.
    pub fn done_tick(&self) -> Option<Tick> {
        self.events.iter().find_map(|e| match e.kind {
            TraceKind::KernelDone { .. } => Some(e.tick),
            _ => None,
        })
    }

    pub fn is_done(&self) -> bool {
        self.done_tick().is_some()
    }

    /// Pretty-print the trace for debugging.
    pub fn dump(&self) {
        for event in &self.events {
            let desc = match event.kind {
                TraceKind::Launched => "LAUNCH".to_string(),
                TraceKind::BlockStarted { block, warps } => {
                    format!("START    block={} warps={warps}", block.0)
                }
                TraceKind::CoreDone { block } => format!("DONE     block={}", block.0),
                TraceKind::ResetRequested { block } => format!("RESET    block={}", block.0),
                TraceKind::ResetAcked => "ACK".to_string(),
                TraceKind::KernelDone { completed } => format!("KDONE    completed={completed}"),
            };
            let core = event
                .core
                .map(|c| format!("core={:<3}", c.0))
                .unwrap_or_else(|| " ".repeat(8));
            eprintln!("[{}] {core} {desc}", FmtTick(event.tick));
        }
        eprintln!(
            "[{}] exit={} ticks={}",
            FmtTick(self.ticks),
            self.exit_kind,
            self.ticks
        );
    }

    /// The whole trace as a JSON document.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "cores": self.nr_cores,
            "total_blocks": self.total_blocks,
            "ticks": self.ticks,
            "exit": self.exit_kind.to_string(),
            "events": self.events,
        })
    }
}
