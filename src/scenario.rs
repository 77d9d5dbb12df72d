//! Scenario definition, builder API and TOML scenario files.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::harness::{CoreBehavior, Fault, Latency};
use crate::kernel::KernelConfig;
use crate::slot::DoneSampling;
use crate::types::{CoreId, Tick};

/// Default PRNG seed used when no seed is specified.
pub const DEFAULT_SEED: u32 = 42;

/// Default watchdog bound on the length of a run.
pub const DEFAULT_MAX_TICKS: Tick = 100_000;

/// Parse a seed string. Returns `DEFAULT_SEED` for `None` or empty strings.
pub fn parse_seed(s: Option<&str>) -> Result<u32, ConfigError> {
    match s.map(str::trim) {
        None | Some("") => Ok(DEFAULT_SEED),
        Some(s) => s
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidSeed(s.to_string())),
    }
}

/// Resolve the PRNG seed from the `DISPATCH_SIM_SEED` environment variable.
pub fn seed_from_env() -> Result<u32, ConfigError> {
    parse_seed(std::env::var("DISPATCH_SIM_SEED").ok().as_deref())
}

/// A complete simulation scenario: core pool, kernel and core timing.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub nr_cores: u32,
    pub kernel: KernelConfig,
    pub done_sampling: DoneSampling,
    /// Timing of each core, indexed by `CoreId`.
    pub behaviors: Vec<CoreBehavior>,
    pub faults: Vec<(CoreId, Fault)>,
    pub seed: u32,
    /// Watchdog bound. `None` disables the watchdog.
    pub max_ticks: Option<Tick>,
}

impl Scenario {
    pub fn builder() -> ScenarioBuilder {
        ScenarioBuilder {
            nr_cores: 1,
            blocks: 1,
            warps_per_block: 1,
            done_sampling: DoneSampling::default(),
            behavior: CoreBehavior::default(),
            overrides: Vec::new(),
            faults: Vec::new(),
            seed: DEFAULT_SEED,
            max_ticks: Some(DEFAULT_MAX_TICKS),
        }
    }

    pub fn total_blocks(&self) -> u32 {
        self.kernel.total_blocks()
    }

    /// Faults injected on `core`.
    pub fn faults_for(&self, core: CoreId) -> Vec<Fault> {
        self.faults
            .iter()
            .filter(|(c, _)| *c == core)
            .map(|(_, f)| *f)
            .collect()
    }
}

/// Builder for constructing scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    nr_cores: u32,
    blocks: u32,
    warps_per_block: u32,
    done_sampling: DoneSampling,
    behavior: CoreBehavior,
    overrides: Vec<(CoreId, CoreBehavior)>,
    faults: Vec<(CoreId, Fault)>,
    seed: u32,
    max_ticks: Option<Tick>,
}

impl ScenarioBuilder {
    /// Set the size of the core pool.
    pub fn cores(mut self, n: u32) -> Self {
        self.nr_cores = n;
        self
    }

    /// Launch a kernel of `n` blocks.
    pub fn blocks(mut self, n: u32) -> Self {
        self.blocks = n;
        self
    }

    /// Warps forwarded to a core with every block it is started on.
    pub fn warps_per_block(mut self, n: u32) -> Self {
        self.warps_per_block = n;
        self
    }

    /// Take block count and block size from an existing configuration.
    pub fn kernel(mut self, kernel: KernelConfig) -> Self {
        self.blocks = kernel.num_blocks();
        self.warps_per_block = kernel.warps_per_block();
        self
    }

    pub fn done_sampling(mut self, sampling: DoneSampling) -> Self {
        self.done_sampling = sampling;
        self
    }

    /// Start-to-done latency of every core without an override.
    pub fn run_ticks(mut self, latency: Latency) -> Self {
        self.behavior.run = latency;
        self
    }

    /// Reset-request-to-acknowledge latency of every core without an override.
    pub fn reset_ticks(mut self, latency: Latency) -> Self {
        self.behavior.reset = latency;
        self
    }

    /// Give one core its own timing.
    pub fn core_behavior(mut self, core: CoreId, behavior: CoreBehavior) -> Self {
        self.overrides.retain(|(c, _)| *c != core);
        self.overrides.push((core, behavior));
        self
    }

    pub fn fault(mut self, core: CoreId, fault: Fault) -> Self {
        self.faults.push((core, fault));
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Set the watchdog bound. `None` disables the watchdog.
    pub fn max_ticks(mut self, max: Option<Tick>) -> Self {
        self.max_ticks = max;
        self
    }

    /// Shorthand for `.max_ticks(None)`.
    pub fn no_watchdog(self) -> Self {
        self.max_ticks(None)
    }

    /// Build the scenario.
    pub fn build(self) -> Result<Scenario, ConfigError> {
        if self.nr_cores == 0 {
            return Err(ConfigError::NoCores);
        }
        let kernel = KernelConfig::new(self.blocks, self.warps_per_block)?;

        let in_range = |core: CoreId| {
            if core.0 < self.nr_cores {
                Ok(())
            } else {
                Err(ConfigError::CoreOutOfRange {
                    core,
                    nr_cores: self.nr_cores,
                })
            }
        };

        let mut behaviors = vec![self.behavior; self.nr_cores as usize];
        for &(core, behavior) in &self.overrides {
            in_range(core)?;
            behaviors[core.index()] = behavior;
        }
        for &(core, _) in &self.faults {
            in_range(core)?;
        }

        Ok(Scenario {
            nr_cores: self.nr_cores,
            kernel,
            done_sampling: self.done_sampling,
            behaviors,
            faults: self.faults,
            seed: self.seed,
            max_ticks: self.max_ticks,
        })
    }
}

/// A latency as written in a scenario file: a bare tick count or a string
/// accepted by `Latency::from_str`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LatencyValue {
    Ticks(Tick),
    Text(String),
}

impl LatencyValue {
    pub fn to_latency(&self) -> Result<Latency, ConfigError> {
        match self {
            LatencyValue::Ticks(n) => Ok(Latency::Fixed(*n)),
            LatencyValue::Text(s) => s.parse(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelSection {
    pub blocks: Option<u32>,
    pub warps_per_block: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingSection {
    pub run_ticks: Option<LatencyValue>,
    pub reset_ticks: Option<LatencyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreSection {
    pub id: u32,
    pub run_ticks: Option<LatencyValue>,
    pub reset_ticks: Option<LatencyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSection {
    pub core: u32,
    #[serde(flatten)]
    pub fault: Fault,
}

/// On-disk scenario description.
///
/// ```toml
/// cores = 4
/// seed = 7
/// done_sampling = "level"
///
/// [kernel]
/// blocks = 8
/// warps_per_block = 4
///
/// [timing]
/// run_ticks = "2..5"
/// reset_ticks = 1
///
/// [[core]]
/// id = 0
/// reset_ticks = 6
///
/// [[fault]]
/// core = 1
/// kind = "spurious_done"
/// tick = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioFile {
    pub cores: Option<u32>,
    pub seed: Option<u32>,
    pub max_ticks: Option<Tick>,
    /// `false` disables the watchdog regardless of `max_ticks`. A
    /// `max_ticks` of 0 disables it too.
    pub watchdog: Option<bool>,
    pub done_sampling: Option<DoneSampling>,
    pub kernel: KernelSection,
    pub timing: TimingSection,
    #[serde(rename = "core")]
    pub core_overrides: Vec<CoreSection>,
    #[serde(rename = "fault")]
    pub faults: Vec<FaultSection>,
}

impl ScenarioFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply the file on top of `builder`. Fields the file leaves out keep
    /// the builder's values.
    pub fn apply(&self, mut builder: ScenarioBuilder) -> Result<ScenarioBuilder, ConfigError> {
        if let Some(n) = self.cores {
            builder = builder.cores(n);
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        match self.max_ticks {
            Some(0) => builder = builder.no_watchdog(),
            Some(max) => builder = builder.max_ticks(Some(max)),
            None => {}
        }
        if self.watchdog == Some(false) {
            builder = builder.no_watchdog();
        }
        if let Some(sampling) = self.done_sampling {
            builder = builder.done_sampling(sampling);
        }

        if let Some(n) = self.kernel.blocks {
            builder = builder.blocks(n);
        }
        if let Some(n) = self.kernel.warps_per_block {
            builder = builder.warps_per_block(n);
        }

        if let Some(run) = &self.timing.run_ticks {
            builder = builder.run_ticks(run.to_latency()?);
        }
        if let Some(reset) = &self.timing.reset_ticks {
            builder = builder.reset_ticks(reset.to_latency()?);
        }

        for section in &self.core_overrides {
            let mut behavior = builder.behavior;
            if let Some(run) = &section.run_ticks {
                behavior.run = run.to_latency()?;
            }
            if let Some(reset) = &section.reset_ticks {
                behavior.reset = reset.to_latency()?;
            }
            builder = builder.core_behavior(CoreId(section.id), behavior);
        }

        for section in &self.faults {
            builder = builder.fault(CoreId(section.core), section.fault);
        }

        Ok(builder)
    }

    /// Build a scenario from this file alone. The kernel size is required.
    pub fn into_scenario(self) -> Result<Scenario, ConfigError> {
        if self.kernel.blocks.is_none() {
            return Err(ConfigError::MissingKernelSize);
        }
        self.apply(Scenario::builder())?.build()
    }
}
