//! Countdown deduplication registry
//!
//! Maps a caller-supplied token to the cancellation handle of the
//! countdown currently running under it. The registry is an explicitly
//! owned service: engines receive one at construction, clones share the
//! same mapping, and independent registries stay fully isolated.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;

use crate::backend::TimerHandle;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Fallback token for engines constructed without one.
pub(crate) fn generate_token() -> String {
    let n = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    format!("countdown-{n}")
}

/// Shared token-to-handle mapping. Cloning is cheap; clones observe the
/// same entries.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    inner: Rc<RefCell<HashMap<String, TimerHandle>>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the handle for `token`, replacing any prior entry. The
    /// replaced handle is dropped without being cancelled: countdowns
    /// sharing a token don't interfere unless eviction is requested.
    pub fn register(&self, token: &str, handle: TimerHandle) {
        self.inner.borrow_mut().insert(token.to_string(), handle);
    }

    /// Delete the mapping for `token` without cancelling it. Used on the
    /// cleanup paths where cancellation already happened.
    pub fn remove(&self, token: &str) {
        self.inner.borrow_mut().remove(token);
    }

    /// Cancel and remove whatever countdown is registered under `token`.
    /// Unique-mode engines call this before registering their own run, so
    /// at most one countdown per token stays live.
    pub fn evict(&self, token: &str) {
        let handle = self.inner.borrow_mut().remove(token);
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    /// Whether `token` currently has a registered countdown.
    pub fn contains(&self, token: &str) -> bool {
        self.inner.borrow().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_handle(count: &Rc<Cell<u32>>) -> TimerHandle {
        let counter = Rc::clone(count);
        TimerHandle::new(Rc::new(Cell::new(false)), move || {
            counter.set(counter.get() + 1)
        })
    }

    #[test]
    fn register_replaces_without_cancelling() {
        let registry = TokenRegistry::new();
        let cancels = Rc::new(Cell::new(0));

        registry.register("a", counting_handle(&cancels));
        registry.register("a", counting_handle(&cancels));
        assert_eq!(registry.len(), 1);
        assert_eq!(cancels.get(), 0);
    }

    #[test]
    fn remove_does_not_cancel() {
        let registry = TokenRegistry::new();
        let cancels = Rc::new(Cell::new(0));

        registry.register("a", counting_handle(&cancels));
        registry.remove("a");
        assert!(registry.is_empty());
        assert_eq!(cancels.get(), 0);
    }

    #[test]
    fn evict_cancels_and_removes() {
        let registry = TokenRegistry::new();
        let cancels = Rc::new(Cell::new(0));

        registry.register("a", counting_handle(&cancels));
        registry.evict("a");
        assert!(!registry.contains("a"));
        assert_eq!(cancels.get(), 1);

        // Evicting an absent token is a no-op.
        registry.evict("a");
        assert_eq!(cancels.get(), 1);
    }

    #[test]
    fn clones_share_entries() {
        let registry = TokenRegistry::new();
        let clone = registry.clone();
        let cancels = Rc::new(Cell::new(0));

        registry.register("a", counting_handle(&cancels));
        assert!(clone.contains("a"));
        clone.remove("a");
        assert!(registry.is_empty());
    }

    #[test]
    fn generated_tokens_are_distinct() {
        assert_ne!(generate_token(), generate_token());
    }
}
