//! dispatch_sim - Deterministic tick-driven model of a GPU block dispatcher.
//!
//! A kernel launch is split into fixed-size blocks. The dispatcher hands
//! one block at a time to each core of a pool through a reset/start/done
//! handshake, and raises `done` once every block has been dispatched and
//! retired.
//!
//! # Architecture
//!
//! - **Dispatcher**: global counters and the per-tick transition rules
//! - **Slots**: per-core state as the dispatcher sees it
//! - **Harness**: simulated cores that answer the handshake with scripted latencies
//! - **Engine**: closed-loop tick driver with a watchdog
//! - **Trace**: recorded handshake events and queries over them
//!
//! # Usage
//!
//! ```rust,no_run
//! use dispatch_sim::*;
//!
//! let scenario = Scenario::builder()
//!     .cores(4)
//!     .blocks(8)
//!     .run_ticks(Latency::Uniform { min: 1, max: 4 })
//!     .build()
//!     .unwrap();
//!
//! let trace = Simulator::new(scenario).run();
//! trace.dump();
//! ```

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod fmt;
pub mod harness;
pub mod kernel;
pub mod monitor;
pub mod scenario;
pub mod slot;
pub mod stats;
pub mod trace;
pub mod types;

// Re-export the main public types for convenience.
pub use dispatcher::{Dispatcher, StepReport, Transition};
pub use engine::{ExitKind, Simulator};
pub use error::{ConfigError, DispatchError};
pub use fmt::{init_tracing, sim_tick, FmtTick, SimFormat};
pub use harness::{CoreBehavior, Fault, Latency, SimCore};
pub use kernel::KernelConfig;
pub use monitor::{Monitor, ProbeContext};
pub use scenario::{Scenario, ScenarioBuilder, ScenarioFile};
pub use slot::{CoreInputs, CoreOutputs, CoreSlot, DoneSampling, SlotStatus};
pub use stats::{CoreStats, DistributionStats, TraceStats};
pub use trace::{Trace, TraceEvent, TraceKind};
pub use types::{BlockId, CoreId, Tick};
