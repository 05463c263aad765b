//! Single Event Upset injection engine.
//!
//! Simulates radiation-induced bit flips in registered regions of guest
//! memory.  Faults accrue per region at a configured rate (faults per
//! kilobyte per tick), and each upset flips 1 to 7 bits of one element
//! according to an empirical multi-bit density.
//!
//! The crate is split into:
//!
//! 1. **[`engine`]**: the per-tick scheduler, control surface and request
//!    dispatch
//! 2. **[`region`]**: the registry of monitored regions
//! 3. **[`density`]** and **[`mask`]**: how many bits an upset flips, and
//!    which ones
//! 4. **[`report`]**: per-flip records, sinks and end-of-run totals
//!
//! # Architecture
//!
//! ```text
//! Guest program          Host run loop            SEU engine
//! ─────────────          ─────────────            ──────────
//! BITFLIPS_MEM_ON  ──→ client request     ──→ engine.handle_request()
//! BITFLIPS_ON/OFF  ──→ client request     ──→ engine.enable()/disable()
//!                      per instruction    ──→ engine.tick(memory, sink)
//!                      exit               ──→ engine.summary()
//! ```
//!
//! Guest memory is reached only through [`memory::FlipMemory`], implemented
//! for `vm-memory`'s `GuestMemoryMmap`.

pub mod density;
pub mod engine;
pub mod mask;
pub mod memory;
pub mod poisson;
pub mod region;
pub mod report;
pub mod shared;

pub use engine::{EngineConfig, EngineStats, FaultCountModel, SeuEngine};
pub use region::{MemoryRegion, Provenance, RegionId, RegionRegistry};
pub use report::{FlipRecord, FlipSink, RunSummary};
pub use shared::SharedEngine;
