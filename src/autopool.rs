//! Object pool whose handles return to the pool when dropped.
//!
//! # Example
//!
//! ```
//! use graphd_client::AutoPool;
//!
//! let pool: AutoPool<Vec<u8>> = AutoPool::new().with_reset(|buf: &mut Vec<u8>| buf.clear());
//!
//! {
//!     let mut buf = pool.acquire();
//!     buf.extend_from_slice(b"scratch");
//! } // returned here
//!
//! assert_eq!(pool.idle(), 1);
//! assert!(pool.acquire().is_empty());
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;
type Reset<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// Pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Values built by the factory.
    pub created: u64,
    /// Handles handed out.
    pub acquired: u64,
    /// Values returned to the pool.
    pub released: u64,
    /// Values currently resident.
    pub idle: usize,
}

/// Shared pool state.
struct PoolInner<T> {
    /// Resident values ready for reuse.
    idle: Mutex<Vec<T>>,
    created: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl<T> PoolInner<T> {
    fn put(&self, value: T) {
        let mut idle = self.idle.lock();
        idle.push(value);
        self.released.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(idle = idle.len(), "value returned to pool");
    }
}

/// A thread-safe pool of reusable values.
///
/// [`acquire`](Self::acquire) hands out a [`Pooled`] handle that owns one
/// value. The value goes back to the pool when the handle is released or
/// dropped. Cloning the pool yields another handle to the same reuse set.
///
/// The pool is unbounded: `acquire` builds a new value whenever none is
/// resident.
pub struct AutoPool<T> {
    inner: Arc<PoolInner<T>>,
    factory: Factory<T>,
    reset: Option<Reset<T>>,
}

impl<T: Default + 'static> AutoPool<T> {
    /// Create a pool that builds values with `T::default()`.
    pub fn new() -> Self {
        Self::with_factory(T::default)
    }
}

impl<T: Default + 'static> Default for AutoPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AutoPool<T> {
    /// Create a pool that builds values with `factory`.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(Vec::new()),
                created: AtomicU64::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
            factory: Arc::new(factory),
            reset: None,
        }
    }

    /// Run `reset` on every value as it is acquired.
    pub fn with_reset<F>(mut self, reset: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.reset = Some(Arc::new(reset));
        self
    }

    /// Take a value from the pool, building one if none is resident.
    pub fn acquire(&self) -> Pooled<T> {
        let resident = self.inner.idle.lock().pop();
        let mut value = match resident {
            Some(value) => value,
            None => {
                self.inner.created.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("building new pooled value");
                (self.factory)()
            }
        };

        if let Some(reset) = &self.reset {
            reset(&mut value);
        }
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);

        Pooled {
            value: Some(value),
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Return a handle's value to the pool.
    ///
    /// Equivalent to dropping the handle.
    pub fn release(&self, handle: Pooled<T>) {
        drop(handle);
    }

    /// Number of resident values.
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Get pool counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.inner.created.load(Ordering::Relaxed),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            idle: self.idle(),
        }
    }
}

impl<T> Clone for AutoPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            factory: self.factory.clone(),
            reset: self.reset.clone(),
        }
    }
}

impl<T> fmt::Debug for AutoPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoPool")
            .field("stats", &self.stats())
            .field("reset", &self.reset.is_some())
            .finish()
    }
}

/// A value checked out of an [`AutoPool`].
///
/// Dereferences to the value. Dropping the handle returns the value to the
/// pool; if the pool is gone the value is dropped instead. A handle passed
/// to [`std::mem::forget`] is never returned.
pub struct Pooled<T> {
    value: Option<T>,
    pool: Weak<PoolInner<T>>,
}

impl<T> Pooled<T> {
    /// Return the value to its pool.
    pub fn release(self) {
        drop(self);
    }

    /// Take the value out of pool management.
    pub fn detach(mut self) -> T {
        self.value
            .take()
            .expect("pooled value is present until the handle is consumed")
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
            .as_ref()
            .expect("pooled value is present until the handle is consumed")
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_mut()
            .expect("pooled value is present until the handle is consumed")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            match self.pool.upgrade() {
                Some(pool) => pool.put(value),
                None => tracing::trace!("pool dropped, discarding value"),
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}
