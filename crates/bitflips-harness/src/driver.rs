//! Run loop: drive an engine against mmap-backed guest memory.
//!
//! ```text
//! resolve options ──→ map memory ──→ register + fill regions
//!                 ──→ for t in 1..=ticks:
//!                       apply events due at t (as client requests)
//!                       engine.tick()
//!                 ──→ summary
//! ```

use crate::scenario::{fill_word, Action, RunOptions, Scenario, ScenarioError};
use bitflips_fault::engine::{EngineConfig, FaultCountModel, SeuEngine};
use bitflips_fault::memory::{anonymous_guest_memory, FlipMemory};
use bitflips_fault::region::Provenance;
use bitflips_fault::report::{FlipSink, RunSummary};
use bitflips_protocol::Request;
use log::{debug, info};
use std::fmt::Write as _;
use vm_memory::GuestMemoryMmap;

/// Thread id reported for requests issued by the driver.
const DRIVER_THREAD: u32 = 1;

/// Result of a finished run.
pub struct RunOutcome {
    pub summary: RunSummary,
    /// Guest memory as the run left it.
    pub memory: GuestMemoryMmap,
}

/// Run `scenario` with resolved `options`, feeding flip records to `sink`.
pub fn run_scenario<S>(
    scenario: &Scenario,
    options: &RunOptions,
    sink: &mut S,
) -> Result<RunOutcome, ScenarioError>
where
    S: FlipSink + ?Sized,
{
    options.config.validate()?;
    let mut memory = anonymous_guest_memory(options.memory_base, options.memory_size)?;
    let mut engine = SeuEngine::new(options.config.clone());

    for spec in &scenario.regions {
        let element = spec.element_type()?;
        let id = engine.register_region(
            spec.start,
            spec.rows,
            spec.cols,
            spec.flags()?,
            spec.description.clone(),
            Provenance {
                thread: DRIVER_THREAD,
                tick: 0,
            },
        );
        if let (Some(value), Some(region)) = (spec.fill, engine.registry().get(id)) {
            let word = fill_word(element, value);
            for n in 0..region.num_elems {
                memory.write_word(region.element_address(n), region.element_width(), word)?;
            }
        }
    }

    let mut events = scenario.events.clone();
    events.sort_by_key(|e| e.tick);
    let mut pending = events.iter().peekable();

    info!(
        "running {} ticks over {} regions ({:.3} KB)",
        options.ticks,
        engine.registry().len(),
        engine.registry().total_kilobytes()
    );

    for t in 1..=options.ticks {
        while let Some(event) = pending.next_if(|e| e.tick <= t) {
            let request = match event.action {
                Action::On => Request::On,
                Action::Off => Request::Off,
                Action::Release { start } => Request::MemOff { start, desc_ptr: 0 },
            };
            debug!("tick {t}: {:?}", event.action);
            engine.handle_request(&request.encode(), &memory, DRIVER_THREAD)?;
        }
        engine.tick(&mut memory, sink);
    }

    Ok(RunOutcome {
        summary: engine.shutdown(),
        memory,
    })
}

/// Startup echo of the effective configuration.
pub fn format_config(config: &EngineConfig) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let model = match config.model {
        FaultCountModel::Carry => "carry",
        FaultCountModel::Poisson => "poisson",
    };

    let mut out = String::new();
    let _ = writeln!(out, "fault-rate: {}", config.fault_rate);
    let _ = writeln!(out, "inject-faults: {}", yes_no(config.inject_faults));
    let _ = writeln!(out, "seed: {}", config.seed);
    let _ = writeln!(out, "verbose: {}", yes_no(config.verbose));
    let _ = write!(out, "model: {model}");
    out
}
