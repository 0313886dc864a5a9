use parking_lot::ReentrantMutex;
use std::sync::OnceLock;

/// Write-once slot with double-checked initialization.
///
/// Concurrent first reads are serialized so `init` runs once and late readers observe the first value.
/// The init lock is reentrant: a same-thread read during `init` recurses instead of deadlocking.
pub(crate) struct MemoCell<T> {
    value: OnceLock<T>,
    init: ReentrantMutex<()>,
}

impl<T> Default for MemoCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoCell<T> {
    #[inline]
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init: ReentrantMutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_set(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: Clone> MemoCell<T> {
    #[inline]
    #[must_use]
    pub(crate) fn get(&self) -> Option<T> {
        self.value.get().cloned()
    }

    pub(crate) fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let _guard = self.init.lock();
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let value = init()?;
        match self.value.set(value.clone()) {
            Ok(()) => Ok(value),
            // Set by a reentrant read of the same slot, the first write wins
            Err(value) => Ok(self.value.get().cloned().unwrap_or(value)),
        }
    }
}
