//! Scenario files: the regions a run monitors and the control events a
//! guest program would issue.
//!
//! ```json
//! {
//!   "fault_rate": 2.5,
//!   "seed": 7,
//!   "model": "poisson",
//!   "ticks": 10000,
//!   "memory": { "base": 0, "size": 65536 },
//!   "regions": [
//!     { "start": 4096, "rows": 10, "cols": 10, "element": "double",
//!       "layout": "row", "description": "matrix", "fill": 1.0 }
//!   ],
//!   "events": [
//!     { "tick": 500, "action": "off" },
//!     { "tick": 800, "action": "on" },
//!     { "tick": 900, "action": { "release": { "start": 4096 } } }
//!   ]
//! }
//! ```
//!
//! Every top-level setting is optional; command-line flags win over the
//! file, and the file wins over built-in defaults.

use bitflips_fault::engine::{ConfigError, EngineConfig, FaultCountModel, RequestError};
use bitflips_fault::memory::MemoryError;
use bitflips_protocol::{ElementType, Layout, LAYOUT_COL_MAJOR, LAYOUT_ROW_MAJOR};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, Snafu};
use std::fs;
use std::path::Path;

/// Ticks run when neither the command line nor the scenario says.
pub const DEFAULT_TICKS: u64 = 100_000;

/// Guest memory mapped when neither the command line nor the scenario says.
pub const DEFAULT_MEMORY_SIZE: usize = 1 << 20;

/// Errors from loading or running a scenario.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ScenarioError {
    #[snafu(display("I/O error"), context(false))]
    Io { source: std::io::Error },

    #[snafu(display("JSON error"), context(false))]
    Json { source: serde_json::Error },

    #[snafu(display("invalid configuration"), context(false))]
    Config { source: ConfigError },

    #[snafu(display("guest memory error"), context(false))]
    Memory { source: MemoryError },

    #[snafu(display("client request rejected"), context(false))]
    Request { source: RequestError },

    #[snafu(display("unknown element type {name:?}"))]
    UnknownElement { name: String },
}

/// Fault-count model as spelled in scenario files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelName {
    Carry,
    Poisson,
}

impl From<ModelName> for FaultCountModel {
    fn from(name: ModelName) -> Self {
        match name {
            ModelName::Carry => FaultCountModel::Carry,
            ModelName::Poisson => FaultCountModel::Poisson,
        }
    }
}

/// Matrix layout as spelled in scenario files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutName {
    #[default]
    Row,
    Col,
}

impl From<LayoutName> for Layout {
    fn from(name: LayoutName) -> Self {
        match name {
            LayoutName::Row => Layout::RowMajor,
            LayoutName::Col => Layout::ColMajor,
        }
    }
}

/// Guest memory mapping for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySpec {
    #[serde(default)]
    pub base: u64,
    pub size: Option<usize>,
}

/// One region registered before the first tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub start: u64,
    pub rows: u64,
    pub cols: u64,
    /// Element type name: `char`, `uchar`, `short`, `ushort`, `int`,
    /// `uint`, `long`, `ulong`, `float` or `double`.
    pub element: String,
    #[serde(default)]
    pub layout: LayoutName,
    #[serde(default)]
    pub description: String,
    /// Value written to every element before the run.
    #[serde(default)]
    pub fill: Option<f64>,
}

impl RegionSpec {
    pub fn element_type(&self) -> Result<ElementType, ScenarioError> {
        ElementType::from_name(&self.element).context(UnknownElementSnafu {
            name: self.element.clone(),
        })
    }

    /// Flag word for the region: element type code plus layout bit.
    pub fn flags(&self) -> Result<u32, ScenarioError> {
        let layout = match self.layout {
            LayoutName::Row => LAYOUT_ROW_MAJOR,
            LayoutName::Col => LAYOUT_COL_MAJOR,
        };
        Ok(self.element_type()?.code() | layout)
    }
}

/// What a control event does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Release { start: u64 },
}

/// A control event applied just before the given tick runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub tick: u64,
    pub action: Action,
}

/// A parsed scenario file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub fault_rate: Option<f64>,
    pub inject_faults: Option<bool>,
    pub seed: Option<u32>,
    pub verbose: Option<bool>,
    pub model: Option<ModelName>,
    pub ticks: Option<u64>,
    pub memory: MemorySpec,
    pub regions: Vec<RegionSpec>,
    pub events: Vec<Event>,
}

/// Settings given on the command line.  `None` and `false` defer to the
/// scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub fault_rate: Option<f64>,
    pub inject_faults: Option<bool>,
    pub seed: Option<u32>,
    pub verbose: bool,
    pub poisson: bool,
    pub ticks: Option<u64>,
    pub memory_size: Option<usize>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub config: EngineConfig,
    pub ticks: u64,
    pub memory_base: u64,
    pub memory_size: usize,
}

impl Scenario {
    /// Parse a scenario from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Merge command-line overrides over this scenario over the defaults.
    pub fn resolve(&self, cli: &Overrides) -> RunOptions {
        let defaults = EngineConfig::default();
        let model = if cli.poisson {
            FaultCountModel::Poisson
        } else {
            self.model.map(Into::into).unwrap_or(defaults.model)
        };

        RunOptions {
            config: EngineConfig {
                fault_rate: cli
                    .fault_rate
                    .or(self.fault_rate)
                    .unwrap_or(defaults.fault_rate),
                inject_faults: cli
                    .inject_faults
                    .or(self.inject_faults)
                    .unwrap_or(defaults.inject_faults),
                seed: cli.seed.or(self.seed).unwrap_or(defaults.seed),
                verbose: cli.verbose || self.verbose.unwrap_or(defaults.verbose),
                model,
            },
            ticks: cli.ticks.or(self.ticks).unwrap_or(DEFAULT_TICKS),
            memory_base: self.memory.base,
            memory_size: cli
                .memory_size
                .or(self.memory.size)
                .unwrap_or(DEFAULT_MEMORY_SIZE),
        }
    }
}

/// Load a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let text = fs::read_to_string(path)?;
    Scenario::from_json(&text)
}

/// Encode a fill value as an element word.
///
/// Integer types take the value truncated toward zero and wrapped to the
/// element width; float types take its IEEE-754 bits.
pub fn fill_word(element: ElementType, value: f64) -> u64 {
    match element {
        ElementType::Float => u64::from((value as f32).to_bits()),
        ElementType::Double => value.to_bits(),
        _ => (value as i64) as u64,
    }
}
