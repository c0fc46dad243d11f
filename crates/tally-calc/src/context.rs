//! Per-call execution context.

use std::collections::BTreeSet;

use tally_data::TransientCache;

/// Extra inputs a call may receive from the batch scheduler.
///
/// Neither field affects the result of a call, so neither is part of any
/// cache key.
#[derive(Clone, Copy, Default)]
pub struct CallContext<'a> {
    /// Union of the properties needed by every call in the current batch.
    pub load_hint: Option<&'a BTreeSet<String>>,
    /// Table cache owned by the current batch job.
    pub transient: Option<&'a TransientCache>,
}

impl<'a> CallContext<'a> {
    /// A context with neither hint nor cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a load hint.
    pub fn with_load_hint(mut self, hint: &'a BTreeSet<String>) -> Self {
        self.load_hint = Some(hint);
        self
    }

    /// Attach a transient cache.
    pub fn with_transient(mut self, cache: &'a TransientCache) -> Self {
        self.transient = Some(cache);
        self
    }

    /// Properties to load for a call needing `own`: the hint if present
    /// (extended by `own`), else `own`.
    pub fn properties_to_load(&self, own: BTreeSet<String>) -> BTreeSet<String> {
        match self.load_hint {
            Some(hint) => {
                let mut all = hint.clone();
                all.extend(own);
                all
            }
            None => own,
        }
    }
}
