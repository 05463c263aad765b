//! Thread-shared engine handle.
//!
//! Hosts that execute guest threads in parallel tick a single
//! [`SharedEngine`] from every thread.  All state lives behind one
//! `parking_lot::Mutex`, so ticks, control requests and region updates are
//! serialized and the RNG stream stays a single sequence.

use crate::engine::{EngineConfig, EngineStats, RequestError, SeuEngine};
use crate::memory::FlipMemory;
use crate::region::{Provenance, RegionId};
use crate::report::{FlipSink, RunSummary};
use bitflips_protocol::REQUEST_WORDS;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to one [`SeuEngine`].
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<SeuEngine>>,
}

impl SharedEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_engine(SeuEngine::new(config))
    }

    pub fn from_engine(engine: SeuEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Run `f` with exclusive access to the engine.
    pub fn with<T>(&self, f: impl FnOnce(&mut SeuEngine) -> T) -> T {
        f(&mut self.inner.lock())
    }

    pub fn tick<M, S>(&self, memory: &mut M, sink: &mut S) -> u64
    where
        M: FlipMemory + ?Sized,
        S: FlipSink + ?Sized,
    {
        self.inner.lock().tick(memory, sink)
    }

    pub fn enable(&self) {
        self.inner.lock().enable();
    }

    pub fn disable(&self) {
        self.inner.lock().disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().is_enabled()
    }

    pub fn register_region(
        &self,
        start: u64,
        rows: u64,
        cols: u64,
        flags: u32,
        description: impl Into<String>,
        provenance: Provenance,
    ) -> RegionId {
        self.inner
            .lock()
            .register_region(start, rows, cols, flags, description, provenance)
    }

    pub fn unregister_region(&self, start: u64) -> bool {
        self.inner.lock().unregister_region(start)
    }

    pub fn handle_request<M: FlipMemory + ?Sized>(
        &self,
        args: &[u64; REQUEST_WORDS],
        memory: &M,
        thread: u32,
    ) -> Result<u64, RequestError> {
        self.inner.lock().handle_request(args, memory, thread)
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.lock().stats()
    }

    pub fn summary(&self) -> RunSummary {
        self.inner.lock().summary()
    }
}
