//! Process-wide cache of compiled routine sets.
//!
//! Entries are keyed by [`ModelFingerprint`], so repeated runs of the same
//! model with different constants reuse one compilation. Insertion happens
//! on first compilation; removal only through [`RoutineCache::invalidate`]
//! or [`RoutineCache::clear`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use cx_model::{EquationModel, ModelFingerprint};
use tracing::debug;

use crate::error::CompileResult;
use crate::routine::{CompiledRoutineSet, compile};

static GLOBAL: OnceLock<RoutineCache> = OnceLock::new();

#[derive(Debug, Default)]
pub struct RoutineCache {
    entries: Mutex<HashMap<ModelFingerprint, Arc<CompiledRoutineSet>>>,
}

impl RoutineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared cache for this process.
    pub fn global() -> &'static RoutineCache {
        GLOBAL.get_or_init(RoutineCache::new)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ModelFingerprint, Arc<CompiledRoutineSet>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached routines for `model`, compiling them on a miss.
    ///
    /// Compilation runs outside the lock; if two callers race on the same
    /// model, the first inserted entry wins and both get it.
    pub fn get_or_compile(&self, model: &EquationModel) -> CompileResult<Arc<CompiledRoutineSet>> {
        let key = model.fingerprint();
        if let Some(hit) = self.lock().get(&key) {
            debug!(fingerprint = %key.short(), "Routine cache hit");
            return Ok(Arc::clone(hit));
        }

        debug!(fingerprint = %key.short(), "Routine cache miss");
        let compiled = Arc::new(compile(model)?);
        let mut entries = self.lock();
        let entry = entries.entry(key).or_insert(compiled);
        Ok(Arc::clone(entry))
    }

    pub fn get(&self, fingerprint: &ModelFingerprint) -> Option<Arc<CompiledRoutineSet>> {
        self.lock().get(fingerprint).cloned()
    }

    /// Drop the entry for a model whose defining expressions changed.
    /// Runs already holding the routines keep their `Arc`.
    pub fn invalidate(&self, fingerprint: &ModelFingerprint) -> bool {
        let removed = self.lock().remove(fingerprint).is_some();
        if removed {
            debug!(fingerprint = %fingerprint.short(), "Routine cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cx_model::{Expr, ModelBuilder};

    fn decay(k: f64) -> EquationModel {
        let mut b = ModelBuilder::new("decay");
        b.add_constant("k", k);
        b.add_state("y", 1.0, -Expr::var("k") * Expr::var("y"));
        b.build().unwrap()
    }

    #[test]
    fn same_structure_shares_routines() {
        let cache = RoutineCache::new();
        let a = cache.get_or_compile(&decay(1.0)).unwrap();
        let b = cache.get_or_compile(&decay(5.0)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_forces_recompile() {
        let cache = RoutineCache::new();
        let model = decay(1.0);
        let a = cache.get_or_compile(&model).unwrap();
        assert!(cache.invalidate(&model.fingerprint()));
        assert!(!cache.invalidate(&model.fingerprint()));
        let b = cache.get_or_compile(&model).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
