//! SEU engine: the per-tick fault scheduler.
//!
//! [`SeuEngine`] owns the region registry, the seeded RNG and the run
//! counters.  The host calls [`SeuEngine::tick`] once per guest instruction
//! and forwards client requests to [`SeuEngine::handle_request`] (or calls
//! the control methods directly).
//!
//! # Tick
//!
//! ```text
//! tick ──→ total_ticks += 1
//!      ──→ disarmed? stop
//!      ──→ for each region (newest first):
//!            whole, carry = accrue(rate × KB + carry)
//!            flux += KB
//!            repeat whole: pick element → density roll → mask → XOR
//! ```
//!
//! The fractional remainder of each region's expected faults is carried to
//! the next tick, so the long-run flip count tracks `rate × KB × ticks`
//! without truncation drift.

use crate::density::draw_bit_count;
use crate::mask::build_mask;
use crate::memory::{FlipMemory, MemoryError};
use crate::poisson::poisson;
use crate::region::{MemoryRegion, Provenance, RegionId, RegionRegistry};
use crate::report::{FlipRecord, FlipSink, RunSummary};
use bitflips_protocol::{
    decode_description, is_tool_request, Request, DESCRIPTION_MAX, REQUEST_WORDS, STATUS_OK,
};
use log::{log, warn, Level};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

/// Errors from engine configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("fault rate must be finite and non-negative, got {0}")]
    InvalidRate(f64),
}

/// Errors from client-request dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request {0:#x} belongs to another tool")]
    NotOurs(u64),

    #[error("unknown bitflips request {0:#x}")]
    Unknown(u64),
}

/// How a region's per-tick fault expectation becomes a whole flip count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultCountModel {
    /// Floor of `rate × KB + carry`; the remainder carries to the next tick.
    #[default]
    Carry,
    /// A Poisson draw with mean `rate × KB`; nothing carries.
    Poisson,
}

/// Configuration for the engine.  Immutable once the engine is built.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Faults per kilobyte per tick.
    pub fault_rate: f64,
    /// Initial armed state.
    pub inject_faults: bool,
    /// RNG seed.
    pub seed: u32,
    /// Emit a record per flip and log control requests at info level.
    pub verbose: bool,
    pub model: FaultCountModel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fault_rate: 0.0,
            inject_faults: true,
            seed: 42,
            verbose: false,
            model: FaultCountModel::Carry,
        }
    }
}

impl EngineConfig {
    /// Check the configuration before an engine is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fault_rate.is_finite() || self.fault_rate < 0.0 {
            return Err(ConfigError::InvalidRate(self.fault_rate));
        }
        Ok(())
    }
}

/// Run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStats {
    pub total_flips: u64,
    pub total_ticks: u64,
    /// Flip events whose memory access failed.
    pub failed_flips: u64,
    /// Sum over armed ticks of every region's kilobytes.
    pub kilobyte_flux: f64,
}

/// Split `rate × kilobytes + carry` into whole events and the new carry.
///
/// The carry is always in `[0, 1)`.  A non-positive or non-finite total
/// yields no events and a zero carry.
pub fn accrue_faults(rate: f64, kilobytes: f64, carry: f64) -> (u64, f64) {
    let total = rate * kilobytes + carry;
    if !total.is_finite() || total <= 0.0 {
        return (0, 0.0);
    }
    let whole = total.floor();
    let remainder = total - whole;
    let remainder = if (0.0..1.0).contains(&remainder) {
        remainder
    } else {
        0.0
    };
    (whole as u64, remainder)
}

/// The Single Event Upset injection engine.
///
/// # Example
///
/// ```
/// use bitflips_fault::engine::{EngineConfig, SeuEngine};
/// use bitflips_fault::memory::anonymous_guest_memory;
/// use bitflips_fault::region::Provenance;
/// use bitflips_fault::report::CollectSink;
/// use bitflips_protocol::{LAYOUT_ROW_MAJOR, TYPE_INT};
///
/// let mut memory = anonymous_guest_memory(0x1000, 0x1000).unwrap();
/// let mut engine = SeuEngine::new(EngineConfig {
///     fault_rate: 1.0,
///     verbose: true,
///     ..Default::default()
/// });
/// engine.register_region(0x1000, 10, 10, TYPE_INT | LAYOUT_ROW_MAJOR, "grid", Provenance::default());
///
/// let mut sink = CollectSink::new();
/// for _ in 0..3 {
///     engine.tick(&mut memory, &mut sink);
/// }
/// // 0.4 KB at 1 fault/KB/tick: the first whole fault lands on tick 3.
/// assert_eq!(engine.stats().total_flips, 1);
/// assert_eq!(sink.records[0].tick, 3);
/// ```
pub struct SeuEngine {
    config: EngineConfig,
    rng: ChaCha20Rng,
    registry: RegionRegistry,
    enabled: bool,
    stats: EngineStats,
}

impl SeuEngine {
    /// Create an engine.  The configuration should already have passed
    /// [`EngineConfig::validate`]; an invalid rate simply injects nothing.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            rng: Self::rng_from_seed(config.seed),
            enabled: config.inject_faults,
            registry: RegionRegistry::new(),
            stats: EngineStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &RegionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Whether injection is armed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ── Control surface ─────────────────────────────────────────

    /// Arm injection from the next tick on.
    pub fn enable(&mut self) {
        log!(self.control_level(), "bitflips on");
        self.enabled = true;
    }

    /// Disarm injection from the next tick on.  Ticks are still counted.
    pub fn disable(&mut self) {
        log!(self.control_level(), "bitflips off");
        self.enabled = false;
    }

    /// Register a region; see [`RegionRegistry::register`].
    pub fn register_region(
        &mut self,
        start: u64,
        rows: u64,
        cols: u64,
        flags: u32,
        description: impl Into<String>,
        provenance: Provenance,
    ) -> RegionId {
        let description = description.into();
        log!(
            self.control_level(),
            "bitflips mem on: {description} at {start:#x} ({rows}x{cols}, flags {flags:#x}) from {provenance}"
        );
        self.registry
            .register(start, rows, cols, flags, description, provenance)
    }

    /// Unregister the newest region starting at `start`.  Returns whether
    /// one was removed; unknown addresses are accepted silently.
    pub fn unregister_region(&mut self, start: u64) -> bool {
        let removed = self.registry.unregister(start);
        match &removed {
            Some(region) => log!(
                self.control_level(),
                "bitflips mem off: {} at {start:#x}",
                region.description
            ),
            None => log!(self.control_level(), "bitflips mem off: nothing at {start:#x}"),
        }
        removed.is_some()
    }

    /// Dispatch a six-word client request.
    ///
    /// The description for `MEM_ON` is read from guest memory at the
    /// pointer in word 4; an unreadable pointer gives an empty description.
    /// Codes owned by other tools return [`RequestError::NotOurs`] so hosts
    /// can chain handlers.
    pub fn handle_request<M: FlipMemory + ?Sized>(
        &mut self,
        args: &[u64; REQUEST_WORDS],
        memory: &M,
        thread: u32,
    ) -> Result<u64, RequestError> {
        if !is_tool_request(b'B', b'F', args[0]) {
            return Err(RequestError::NotOurs(args[0]));
        }
        let request = Request::decode(args).ok_or(RequestError::Unknown(args[0]))?;

        match request {
            Request::On => self.enable(),
            Request::Off => self.disable(),
            Request::MemOn {
                start,
                rows,
                cols,
                desc_ptr,
                flags,
            } => {
                let description = read_description(memory, desc_ptr);
                let provenance = Provenance {
                    thread,
                    tick: self.stats.total_ticks,
                };
                self.register_region(start, rows, cols, flags, description, provenance);
            }
            Request::MemOff { start, .. } => {
                self.unregister_region(start);
            }
        }
        Ok(STATUS_OK)
    }

    // ── Per-instruction hook ────────────────────────────────────

    /// Advance one tick, injecting whatever faults are due.
    ///
    /// Returns the number of flips applied on this tick.  Memory failures
    /// on individual flips are logged and counted in
    /// [`EngineStats::failed_flips`]; the remaining events still run.
    pub fn tick<M, S>(&mut self, memory: &mut M, sink: &mut S) -> u64
    where
        M: FlipMemory + ?Sized,
        S: FlipSink + ?Sized,
    {
        self.stats.total_ticks += 1;
        if !self.enabled {
            return 0;
        }

        let tick = self.stats.total_ticks;
        let rate = self.config.fault_rate;
        let mut applied = 0;

        for region in self.registry.iter_mut() {
            let whole = match self.config.model {
                FaultCountModel::Carry => {
                    let (whole, carry) = accrue_faults(rate, region.kilobytes, region.fault_carry);
                    region.fault_carry = carry;
                    whole
                }
                FaultCountModel::Poisson => {
                    let rng = &mut self.rng;
                    poisson(rate * region.kilobytes, || rng.gen::<f64>())
                }
            };
            self.stats.kilobyte_flux += region.kilobytes;

            if region.num_elems == 0 || region.element_width() == 0 {
                continue;
            }

            for _ in 0..whole {
                match inject_flip(&mut self.rng, region, memory, tick) {
                    Ok(record) => {
                        self.stats.total_flips += 1;
                        applied += 1;
                        if self.config.verbose {
                            sink.record(&record);
                        }
                    }
                    Err(err) => {
                        self.stats.failed_flips += 1;
                        warn!("flip in {} ({}) failed: {err}", region.description, region.id);
                    }
                }
            }
        }

        applied
    }

    /// End-of-run totals.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total_flips: self.stats.total_flips,
            total_ticks: self.stats.total_ticks,
            failed_flips: self.stats.failed_flips,
            kilobyte_flux: self.stats.kilobyte_flux,
        }
    }

    /// Drop every region and return the final totals.
    pub fn shutdown(&mut self) -> RunSummary {
        self.registry.clear();
        self.summary()
    }

    // ── Internal ────────────────────────────────────────────────

    fn rng_from_seed(seed: u32) -> ChaCha20Rng {
        let mut key = [0u8; 32];
        key[..4].copy_from_slice(&seed.to_le_bytes());
        ChaCha20Rng::from_seed(key)
    }

    fn control_level(&self) -> Level {
        if self.config.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }
}

/// Apply one upset to a random element of `region`.
///
/// Element index, bit count and mask come from independent draws.
fn inject_flip<R, M>(
    rng: &mut R,
    region: &MemoryRegion,
    memory: &mut M,
    tick: u64,
) -> Result<FlipRecord, MemoryError>
where
    R: Rng + ?Sized,
    M: FlipMemory + ?Sized,
{
    let width = region.element_width();
    let n = rng.gen_range(0..region.num_elems);
    let address = region.element_address(n);
    let bits = draw_bit_count(rng);
    let mask = build_mask(rng, width * 8, bits);

    let original = memory.read_word(address, width)?;
    let flipped = original ^ mask;
    memory.write_word(address, width, flipped)?;

    Ok(FlipRecord {
        tick,
        region: region.id,
        description: region.description.clone(),
        type_code: region.type_code,
        element_type: region.element_type,
        address,
        row: region.row_of(address),
        col: region.col_of(address),
        width,
        original,
        mask,
        flipped,
    })
}

fn read_description<M: FlipMemory + ?Sized>(memory: &M, ptr: u64) -> String {
    if ptr == 0 {
        return String::new();
    }
    let mut buf = [0u8; DESCRIPTION_MAX];
    match memory.read_bytes(ptr, &mut buf) {
        Ok(n) => decode_description(&buf[..n]),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::anonymous_guest_memory;
    use crate::report::{CollectSink, NullSink};
    use bitflips_protocol::{
        mem_on, tool_base, ElementType, Layout, BITFLIPS_BASE, LAYOUT_ROW_MAJOR, REQ_MEM_OFF,
        REQ_OFF, REQ_ON, TYPE_CHAR, TYPE_DOUBLE, TYPE_INT,
    };
    use vm_memory::{Bytes, GuestAddress, GuestMemoryMmap};

    const BASE: u64 = 0x1000;

    fn memory() -> GuestMemoryMmap {
        anonymous_guest_memory(BASE, 0x10000).unwrap()
    }

    fn engine(rate: f64) -> SeuEngine {
        SeuEngine::new(EngineConfig {
            fault_rate: rate,
            verbose: true,
            ..Default::default()
        })
    }

    fn int_grid(engine: &mut SeuEngine, start: u64, desc: &str) -> RegionId {
        engine.register_region(
            start,
            10,
            10,
            TYPE_INT | LAYOUT_ROW_MAJOR,
            desc,
            Provenance::default(),
        )
    }

    fn carry(engine: &SeuEngine, id: RegionId) -> f64 {
        engine.registry().get(id).unwrap().fault_carry
    }

    // ─── Carry arithmetic ───────────────────────────────────────────

    #[test]
    fn accrue_splits_whole_and_fraction() {
        assert_eq!(accrue_faults(1.0, 0.4, 0.0), (0, 0.4));
        let (whole, carry) = accrue_faults(2.5, 1.0, 0.75);
        assert_eq!(whole, 3);
        assert!((carry - 0.25).abs() < 1e-12);
    }

    #[test]
    fn accrue_exact_integer_has_zero_carry() {
        assert_eq!(accrue_faults(2.0, 1.5, 0.0), (3, 0.0));
        assert_eq!(accrue_faults(0.5, 1.0, 0.5), (1, 0.0));
    }

    #[test]
    fn accrue_guards_degenerate_totals() {
        assert_eq!(accrue_faults(0.0, 10.0, 0.0), (0, 0.0));
        assert_eq!(accrue_faults(f64::NAN, 1.0, 0.0), (0, 0.0));
        assert_eq!(accrue_faults(f64::INFINITY, 1.0, 0.0), (0, 0.0));
        assert_eq!(accrue_faults(-1.0, 1.0, 0.5), (0, 0.0));
    }

    #[test]
    fn accrued_sum_tracks_expectation() {
        for &(rate, kb) in &[(0.37, 1.0), (1.0, 0.4), (3.3, 0.123), (0.001, 7.0), (12.5, 0.08)] {
            let mut carry = 0.0;
            let mut sum = 0u64;
            for t in 1..=10_000u64 {
                let (whole, c) = accrue_faults(rate, kb, carry);
                assert!((0.0..1.0).contains(&c), "carry {c} out of range");
                carry = c;
                sum += whole;
                let expected = rate * kb * t as f64;
                assert!(
                    (sum as f64 - expected).abs() <= 1.0,
                    "rate={rate} kb={kb} t={t}: {sum} vs {expected}"
                );
            }
        }
    }

    // ─── Ticks ──────────────────────────────────────────────────────

    #[test]
    fn first_flip_lands_on_third_tick() {
        let mut mem = memory();
        let mut engine = engine(1.0);
        let id = int_grid(&mut engine, BASE, "grid");
        let mut sink = CollectSink::new();

        assert_eq!(engine.tick(&mut mem, &mut sink), 0);
        assert!((carry(&engine, id) - 0.4).abs() < 1e-12);

        assert_eq!(engine.tick(&mut mem, &mut sink), 0);
        assert!((carry(&engine, id) - 0.8).abs() < 1e-12);

        assert_eq!(engine.tick(&mut mem, &mut sink), 1);
        assert!((carry(&engine, id) - 0.2).abs() < 1e-9);

        assert_eq!(sink.records.len(), 1);
        assert_eq!(sink.records[0].tick, 3);
        assert_eq!(engine.stats().total_flips, 1);
        assert_eq!(engine.stats().total_ticks, 3);
        assert!((engine.stats().kilobyte_flux - 1.2).abs() < 1e-9);
    }

    #[test]
    fn disarmed_ticks_count_but_do_nothing() {
        let mut mem = memory();
        let mut engine = engine(5.0);
        let id = int_grid(&mut engine, BASE, "grid");
        engine.tick(&mut mem, &mut NullSink);
        let carry_before = carry(&engine, id);
        let flips_before = engine.stats().total_flips;

        engine.disable();
        for _ in 0..100 {
            assert_eq!(engine.tick(&mut mem, &mut NullSink), 0);
        }

        assert_eq!(carry(&engine, id), carry_before);
        assert_eq!(engine.stats().total_flips, flips_before);
        assert_eq!(engine.stats().total_ticks, 101);
        assert!((engine.stats().kilobyte_flux - 0.4).abs() < 1e-12);

        engine.enable();
        assert!(engine.tick(&mut mem, &mut NullSink) > 0);
    }

    #[test]
    fn inject_faults_false_starts_disarmed() {
        let mut mem = memory();
        let mut engine = SeuEngine::new(EngineConfig {
            fault_rate: 100.0,
            inject_faults: false,
            ..Default::default()
        });
        int_grid(&mut engine, BASE, "grid");
        assert!(!engine.is_enabled());
        assert_eq!(engine.tick(&mut mem, &mut NullSink), 0);
        assert_eq!(engine.stats().total_ticks, 1);
    }

    #[test]
    fn flips_stay_in_region_and_match_mask() {
        let mut mem = memory();
        let mut engine = engine(50.0);
        let id = int_grid(&mut engine, BASE + 0x100, "grid");
        let region = engine.registry().get(id).unwrap().clone();
        let mut sink = CollectSink::new();

        for _ in 0..20 {
            engine.tick(&mut mem, &mut sink);
        }
        assert_eq!(sink.records.len() as u64, engine.stats().total_flips);
        assert_eq!(engine.stats().total_flips, 20 * 20);

        for record in &sink.records {
            assert!(region.contains(record.address));
            assert_eq!((record.address - region.start) % 4, 0);
            assert_eq!(record.width, 4);
            assert_eq!(record.original ^ record.flipped, record.mask);
            let bits = record.bits_flipped();
            assert!((1..=7).contains(&bits) && bits != 5, "bits {bits}");
            assert!(record.mask <= u64::from(u32::MAX));
            assert!(record.row < 10 && record.col < 10);
        }
    }

    #[test]
    fn flip_is_applied_to_memory() {
        let mut mem = memory();
        let mut engine = engine(1000.0);
        // A single byte: every flip hits it.
        engine.register_region(BASE, 1, 1, TYPE_CHAR, "byte", Provenance::default());
        let mut sink = CollectSink::new();
        engine.tick(&mut mem, &mut sink);

        let mut value = 0u64;
        for record in &sink.records {
            assert_eq!(record.address, BASE);
            assert_eq!(record.original, value);
            value = record.flipped;
        }
        assert_eq!(mem.read_word(BASE, 1).unwrap(), value);
    }

    #[test]
    fn zero_element_region_never_flips() {
        let mut mem = memory();
        let mut engine = engine(1e6);
        let id = engine.register_region(BASE, 0, 10, TYPE_INT, "empty", Provenance::default());
        engine.register_region(BASE, 4, 4, 3, "untyped", Provenance::default());
        for _ in 0..10 {
            assert_eq!(engine.tick(&mut mem, &mut NullSink), 0);
        }
        assert_eq!(carry(&engine, id), 0.0);
        assert_eq!(engine.stats().failed_flips, 0);
    }

    #[test]
    fn overlapping_regions_accrue_independently() {
        let mut mem = memory();
        let mut engine = engine(1.0);
        let a = int_grid(&mut engine, BASE, "a");
        let b = int_grid(&mut engine, BASE, "b");
        let mut sink = CollectSink::new();
        for _ in 0..5 {
            engine.tick(&mut mem, &mut sink);
        }
        // 2.0 expected per region over 5 ticks.
        assert_eq!(engine.stats().total_flips, 4);
        assert_eq!(sink.records.iter().filter(|r| r.region == a).count(), 2);
        assert_eq!(sink.records.iter().filter(|r| r.region == b).count(), 2);
    }

    #[test]
    fn unmapped_region_counts_failures() {
        let mut mem = memory();
        let mut engine = engine(10.0);
        engine.register_region(0x10_0000, 10, 10, TYPE_DOUBLE, "far", Provenance::default());
        let mut sink = CollectSink::new();
        assert_eq!(engine.tick(&mut mem, &mut sink), 0);
        assert_eq!(engine.stats().failed_flips, 8);
        assert_eq!(engine.stats().total_flips, 0);
        assert!(sink.records.is_empty());
    }

    #[test]
    fn quiet_engine_counts_without_emitting() {
        let mut mem = memory();
        let mut engine = SeuEngine::new(EngineConfig {
            fault_rate: 10.0,
            ..Default::default()
        });
        int_grid(&mut engine, BASE, "grid");
        let mut sink = CollectSink::new();
        engine.tick(&mut mem, &mut sink);
        assert_eq!(engine.stats().total_flips, 4);
        assert!(sink.records.is_empty());
    }

    #[test]
    fn same_seed_same_flips() {
        let run = |seed: u32| {
            let mut mem = memory();
            let mut engine = SeuEngine::new(EngineConfig {
                fault_rate: 3.0,
                seed,
                verbose: true,
                ..Default::default()
            });
            int_grid(&mut engine, BASE, "grid");
            let mut sink = CollectSink::new();
            for _ in 0..10 {
                engine.tick(&mut mem, &mut sink);
            }
            sink.records
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn empirical_rate_matches_configured_rate() {
        let mut mem = memory();
        let mut engine = engine(0.25);
        int_grid(&mut engine, BASE, "a");
        engine.register_region(BASE + 0x1000, 16, 16, TYPE_DOUBLE, "b", Provenance::default());
        for _ in 0..1000 {
            engine.tick(&mut mem, &mut NullSink);
        }
        let rate = engine.summary().empirical_rate();
        assert!((rate - 0.25).abs() < 0.01, "rate {rate}");
    }

    #[test]
    fn poisson_model_matches_mean() {
        let mut mem = memory();
        let mut engine = SeuEngine::new(EngineConfig {
            fault_rate: 2.0,
            model: FaultCountModel::Poisson,
            ..Default::default()
        });
        let id = int_grid(&mut engine, BASE, "grid");
        let ticks = 20_000;
        for _ in 0..ticks {
            engine.tick(&mut mem, &mut NullSink);
        }
        let expected = 2.0 * 0.4 * f64::from(ticks);
        let got = engine.stats().total_flips as f64;
        assert!((got - expected).abs() / expected < 0.03, "{got} vs {expected}");
        assert_eq!(carry(&engine, id), 0.0);
    }

    // ─── Control surface ────────────────────────────────────────────

    #[test]
    fn unregister_duplicates_then_noop() {
        let mut engine = engine(1.0);
        int_grid(&mut engine, BASE, "old");
        let newer = int_grid(&mut engine, BASE, "new");

        assert!(engine.unregister_region(BASE));
        assert!(engine.registry().get(newer).is_none());
        assert_eq!(engine.registry().len(), 1);
        assert!(engine.unregister_region(BASE));
        assert!(!engine.unregister_region(BASE));
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn requests_drive_the_engine() {
        let mem = memory();
        let mut engine = engine(1.0);
        let desc_ptr = BASE + 0x8000;
        mem.write_slice(b"velocity\0", GuestAddress(desc_ptr)).unwrap();

        let args = mem_on(BASE, 4, 8, desc_ptr, ElementType::Float, Layout::RowMajor).encode();
        assert_eq!(engine.handle_request(&args, &mem, 3), Ok(STATUS_OK));
        let region = engine.registry().iter().next().unwrap();
        assert_eq!(region.description, "velocity");
        assert_eq!(region.num_bytes, 128);
        assert_eq!(region.provenance.thread, 3);

        assert_eq!(engine.handle_request(&[REQ_OFF, 0, 0, 0, 0, 0], &mem, 3), Ok(STATUS_OK));
        assert!(!engine.is_enabled());
        assert_eq!(engine.handle_request(&[REQ_ON, 0, 0, 0, 0, 0], &mem, 3), Ok(STATUS_OK));
        assert!(engine.is_enabled());

        let off = [REQ_MEM_OFF, BASE, 0, 0, desc_ptr, 0];
        assert_eq!(engine.handle_request(&off, &mem, 3), Ok(STATUS_OK));
        assert!(engine.registry().is_empty());
        // Second off is silently accepted.
        assert_eq!(engine.handle_request(&off, &mem, 3), Ok(STATUS_OK));
    }

    #[test]
    fn bad_description_pointer_gives_empty_description() {
        let mem = memory();
        let mut engine = engine(1.0);
        let args = mem_on(BASE, 1, 1, 0xdead_0000, ElementType::Int, Layout::RowMajor).encode();
        engine.handle_request(&args, &mem, 0).unwrap();
        assert_eq!(engine.registry().iter().next().unwrap().description, "");
    }

    #[test]
    fn foreign_and_unknown_requests_are_rejected() {
        let mem = memory();
        let mut engine = engine(1.0);
        let foreign = [tool_base(b'M', b'C'), 0, 0, 0, 0, 0];
        assert_eq!(
            engine.handle_request(&foreign, &mem, 0),
            Err(RequestError::NotOurs(foreign[0]))
        );
        let unknown = [BITFLIPS_BASE + 7, 0, 0, 0, 0, 0];
        assert_eq!(
            engine.handle_request(&unknown, &mem, 0),
            Err(RequestError::Unknown(unknown[0]))
        );
    }

    #[test]
    fn shutdown_clears_regions_and_keeps_totals() {
        let mut mem = memory();
        let mut engine = engine(10.0);
        int_grid(&mut engine, BASE, "grid");
        engine.tick(&mut mem, &mut NullSink);
        let summary = engine.shutdown();
        assert_eq!(summary.total_flips, 4);
        assert_eq!(summary.total_ticks, 1);
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        let bad = EngineConfig {
            fault_rate: -0.5,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::InvalidRate(-0.5)));
        let nan = EngineConfig {
            fault_rate: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }
}
