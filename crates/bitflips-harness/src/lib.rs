//! Scenario driver for the bitflips SEU engine.
//!
//! Runs [`bitflips_fault::SeuEngine`] over an mmap-backed guest memory for a
//! fixed number of ticks, with regions and control events taken from a
//! JSON scenario file:
//!
//! 1. **[`scenario`]**: scenario files and option resolution
//! 2. **[`driver`]**: the tick loop and the startup echo
//! 3. **[`decode`]**: float rendering of diagnostic lines
//!
//! # Example Usage
//!
//! ```no_run
//! use bitflips_fault::report::LogSink;
//! use bitflips_harness::driver::run_scenario;
//! use bitflips_harness::scenario::{load_scenario, Overrides};
//! use std::path::Path;
//!
//! let scenario = load_scenario(Path::new("matrix.json")).unwrap();
//! let options = scenario.resolve(&Overrides::default());
//! let outcome = run_scenario(&scenario, &options, &mut LogSink).unwrap();
//! println!("{}", outcome.summary);
//! ```

pub mod decode;
pub mod driver;
pub mod scenario;
