//! Capture-and-resolve batching.
//!
//! Evaluation runs in two passes. During the capture pass every call made
//! through a [`Parallelized`] calculation is recorded by the
//! [`BatchScheduler`] and answered with a mock. [`BatchScheduler::resolve`]
//! then groups the recorded calls by their mapping key (by default the
//! process), computes the union of the columns each group needs, and hands
//! the groups to a [`ParallelBackend`]. During the second pass the same
//! calls return the stored results.
//!
//! Each batch owns its own [`TransientCache`], so a process' data is read
//! once per batch no matter how many calculations use it.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tally_core::{Error, Fingerprint, FingerprintBuilder, Fingerprinted, Result, Value};
use tally_data::{TransientCache, TransientCacheConfig};
use tally_model::{Process, Region};

use crate::backend::{ParallelBackend, RayonBackend};
use crate::calculation::{Calculation, Parallelizable};
use crate::context::CallContext;

/// Identity of a call: calculation, process and region fingerprints.
pub fn call_key(calculation: &dyn Parallelizable, process: &Process, region: &Region) -> Fingerprint {
    let mut fp = FingerprintBuilder::new("call");
    fp.nested(calculation).nested(process).nested(region);
    fp.finish()
}

/// One recorded call.
#[derive(Clone)]
pub struct BatchCall {
    /// Call identity.
    pub key: Fingerprint,
    /// The calculation to run.
    pub calculation: Arc<dyn Parallelizable>,
    /// Process argument.
    pub process: Process,
    /// Region argument.
    pub region: Region,
}

/// Result of one call within a batch.
pub struct CallOutcome {
    /// Call identity.
    pub key: Fingerprint,
    /// The value, or the error that call alone produced.
    pub result: Result<Value>,
}

/// Calls sharing a mapping key, executed together.
#[derive(Clone)]
pub struct Batch {
    /// Shared mapping key.
    pub map_key: Fingerprint,
    /// Union of the columns read by every call.
    pub load_hint: BTreeSet<String>,
    /// Calls in capture order.
    pub calls: Vec<BatchCall>,
    /// Configuration of the batch's transient cache.
    pub transient: TransientCacheConfig,
}

impl Batch {
    /// Run every call with the load hint and a fresh transient cache.
    /// A failing call does not stop the others.
    pub fn run(&self) -> Vec<CallOutcome> {
        let cache = TransientCache::new(self.transient);
        let ctx = CallContext::new().with_load_hint(&self.load_hint).with_transient(&cache);
        let outcomes = self
            .calls
            .iter()
            .map(|call| CallOutcome {
                key: call.key,
                result: call.calculation.call_with(&call.process, &call.region, &ctx),
            })
            .collect();
        let stats = cache.stats();
        tracing::debug!(
            map_key = ?self.map_key,
            calls = self.calls.len(),
            hits = stats.hits,
            misses = stats.misses,
            "batch executed"
        );
        outcomes
    }
}

enum Outcome {
    Value(Value),
    Failed(String),
}

#[derive(Default)]
struct State {
    capturing: bool,
    pending: Vec<BatchCall>,
    pending_keys: HashSet<Fingerprint>,
    outcomes: HashMap<Fingerprint, Outcome>,
}

/// Records, groups and executes parallelizable calls.
pub struct BatchScheduler {
    backend: Arc<dyn ParallelBackend>,
    transient: TransientCacheConfig,
    state: Mutex<State>,
}

impl BatchScheduler {
    /// Scheduler executing batches on `backend`.
    pub fn new(backend: Arc<dyn ParallelBackend>) -> Self {
        Self { backend, transient: TransientCacheConfig::default(), state: Mutex::default() }
    }

    /// Set the per-batch transient cache configuration.
    pub fn with_transient(mut self, config: TransientCacheConfig) -> Self {
        self.transient = config;
        self
    }

    /// Name of the execution backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Start recording calls.
    pub fn begin_capture(&self) {
        self.state.lock().expect("batch scheduler mutex poisoned").capturing = true;
    }

    /// Whether calls are currently being recorded.
    pub fn is_capturing(&self) -> bool {
        self.state.lock().expect("batch scheduler mutex poisoned").capturing
    }

    /// Number of recorded, unresolved calls.
    pub fn pending(&self) -> usize {
        self.state.lock().expect("batch scheduler mutex poisoned").pending.len()
    }

    /// Number of stored outcomes. Outcomes of [`resolve`](Self::resolve)
    /// are kept until [`clear`](Self::clear) or the end of
    /// [`evaluate`](Self::evaluate).
    pub fn stored(&self) -> usize {
        self.state.lock().expect("batch scheduler mutex poisoned").outcomes.len()
    }

    /// Forget recorded calls and stored outcomes, and stop capturing.
    pub fn clear(&self) {
        *self.state.lock().expect("batch scheduler mutex poisoned") = State::default();
    }

    /// Stop capturing and execute every recorded call. Individual call
    /// failures are stored and reported when that call is made again; the
    /// returned error only covers failures of the backend itself.
    pub fn resolve(&self) -> Result<()> {
        let pending = {
            let mut state = self.state.lock().expect("batch scheduler mutex poisoned");
            state.capturing = false;
            state.pending_keys.clear();
            std::mem::take(&mut state.pending)
        };
        if pending.is_empty() {
            return Ok(());
        }

        let batches = self.group(pending);
        let n_calls: usize = batches.iter().map(|b| b.calls.len()).sum();
        let start = Instant::now();
        let results = self.backend.execute(&batches)?;
        if results.len() != batches.len() {
            return Err(Error::Batch(format!(
                "backend '{}' returned {} outcome lists for {} batches",
                self.backend.name(),
                results.len(),
                batches.len()
            )));
        }

        let mut failed = 0usize;
        let mut state = self.state.lock().expect("batch scheduler mutex poisoned");
        for outcome in results.into_iter().flatten() {
            let stored = match outcome.result {
                Ok(v) => Outcome::Value(v),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(key = ?outcome.key, error = %e, "batched call failed");
                    Outcome::Failed(e.to_string())
                }
            };
            state.outcomes.insert(outcome.key, stored);
        }
        tracing::info!(
            backend = self.backend.name(),
            batches = batches.len(),
            calls = n_calls,
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batches resolved"
        );
        Ok(())
    }

    /// Run `f` twice: once capturing calls against mocks, then, after
    /// [`resolve`](Self::resolve), for real. Errors of the capture pass are
    /// not reported, since mocks can trip checks real values pass.
    ///
    /// Outcomes stored for this evaluation are dropped before returning.
    pub fn evaluate<T>(&self, f: impl Fn() -> Result<T>) -> Result<T> {
        self.begin_capture();
        if let Err(e) = f() {
            tracing::debug!(error = %e, "capture pass failed");
        }
        let result = self.resolve().and_then(|()| f());
        self.clear();
        result
    }

    fn group(&self, pending: Vec<BatchCall>) -> Vec<Batch> {
        let mut index: HashMap<Fingerprint, usize> = HashMap::new();
        let mut batches: Vec<Batch> = Vec::new();
        for call in pending {
            let map_key = call.calculation.map_key(&call.process, &call.region);
            let properties = call.calculation.properties(&call.process, &call.region);
            let i = *index.entry(map_key).or_insert_with(|| {
                batches.push(Batch {
                    map_key,
                    load_hint: BTreeSet::new(),
                    calls: Vec::new(),
                    transient: self.transient,
                });
                batches.len() - 1
            });
            batches[i].load_hint.extend(properties);
            batches[i].calls.push(call);
        }
        batches
    }

    fn dispatch(
        &self,
        calculation: &Arc<dyn Parallelizable>,
        process: &Process,
        region: &Region,
        ctx: &CallContext<'_>,
    ) -> Result<Value> {
        let key = call_key(calculation.as_ref(), process, region);
        {
            let mut state = self.state.lock().expect("batch scheduler mutex poisoned");
            match state.outcomes.get(&key) {
                Some(Outcome::Value(v)) => return Ok(v.clone()),
                Some(Outcome::Failed(msg)) => return Err(Error::Batch(msg.clone())),
                None => {}
            }
            if state.capturing {
                if state.pending_keys.insert(key) {
                    state.pending.push(BatchCall {
                        key,
                        calculation: Arc::clone(calculation),
                        process: process.clone(),
                        region: region.clone(),
                    });
                }
                drop(state);
                return calculation.mock(process, region);
            }
        }
        calculation.call_with(process, region, ctx)
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(Arc::new(RayonBackend::new()))
    }
}

/// Routes a calculation's calls through a [`BatchScheduler`].
pub struct Parallelized<C> {
    inner: Arc<C>,
    erased: Arc<dyn Parallelizable>,
    scheduler: Arc<BatchScheduler>,
}

impl<C: Parallelizable + 'static> Parallelized<C> {
    /// Schedule `inner` on `scheduler`.
    pub fn new(inner: C, scheduler: Arc<BatchScheduler>) -> Self {
        let inner = Arc::new(inner);
        let erased: Arc<dyn Parallelizable> = inner.clone();
        Self { inner, erased, scheduler }
    }

    /// The wrapped calculation.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// The scheduler calls go through.
    pub fn scheduler(&self) -> &Arc<BatchScheduler> {
        &self.scheduler
    }
}

impl<C: Parallelizable> Fingerprinted for Parallelized<C> {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        self.inner.write_fingerprint(fp);
    }
}

impl<C: Parallelizable> Calculation for Parallelized<C> {
    fn call_with(&self, process: &Process, region: &Region, ctx: &CallContext<'_>) -> Result<Value> {
        self.scheduler.dispatch(&self.erased, process, region, ctx)
    }
}
