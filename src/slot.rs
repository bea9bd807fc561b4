//! A guarded single-slot container for a shared service reference.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Holds at most one `Arc<T>`, replaceable atomically from any thread.
///
/// Readers either observe the value before or after a concurrent [`ServiceSlot::set`], never
/// anything in between. Writers are serialized with respect to each other and to readers; the
/// last writer wins.
///
/// Replaced values are dropped after the lock is released, so a destructor that takes a while
/// (for example, one that joins a thread) does not stall readers.
pub struct ServiceSlot<T: ?Sized> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> ServiceSlot<T> {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    /// Returns the current value, or `None` if the slot is empty.
    pub fn get(&self) -> Option<Arc<T>> {
        self.read().clone()
    }

    /// Installs `value`, dropping the previous contents.
    pub fn set(&self, value: Option<Arc<T>>) {
        drop(self.swap(value));
    }

    /// Installs `value` and returns the previous contents.
    pub fn swap(&self, value: Option<Arc<T>>) -> Option<Arc<T>> {
        std::mem::replace(&mut *self.write(), value)
    }

    /// Empties the slot and returns the previous contents.
    pub fn take(&self) -> Option<Arc<T>> {
        self.write().take()
    }

    /// Returns whether the slot is currently empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_none()
    }

    // The payload is a single reference that is never left half-written, so poisoning carries no
    // information here.
    fn read(&self) -> RwLockReadGuard<'_, Option<Arc<T>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Arc<T>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: ?Sized> Default for ServiceSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ServiceSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_empty() { "empty" } else { "occupied" };
        write!(f, "ServiceSlot({state})")
    }
}
