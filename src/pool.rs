//! # Reusable object pool.
//!
//! [`Pool`] caches objects that are expensive to allocate (buffers, parsers)
//! so stages can reuse them across items. Objects are reset before they go
//! back to the idle list, so a borrower always gets a clean value.
//!
//! ```text
//! pool.get() ──► idle.pop() or factory() ──► Pooled<T> (Deref/DerefMut)
//!                                                │ drop
//!                                                ▼
//!                                   reset() ──► idle.push()   (if idle < max_idle)
//! ```
//!
//! The pool is not part of the pipeline's correctness contract; dropping a
//! pool with objects on loan is fine, they are simply freed when returned.
//!
//! ## Example
//! ```rust
//! use stagevisor::pool::Pool;
//!
//! let pool = Pool::new(4, || Vec::<u8>::with_capacity(1024));
//! {
//!     let mut buf = pool.get();
//!     buf.extend_from_slice(b"hello");
//! }
//! let buf = pool.get();
//! assert!(buf.is_empty());
//! assert!(buf.capacity() >= 1024);
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Puts an object back into its initial state before reuse.
pub trait Reset {
    /// Clears all per-use state; allocations may be kept.
    fn reset(&mut self);
}

impl<T> Reset for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}

impl<K, V, S> Reset for std::collections::HashMap<K, V, S> {
    fn reset(&mut self) {
        self.clear();
    }
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

struct Shared<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
    factory: Factory<T>,
}

impl<T> Shared<T> {
    fn idle(&self) -> MutexGuard<'_, Vec<T>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe object pool. Cheap to clone; clones share the idle list.
pub struct Pool<T: Reset> {
    shared: Arc<Shared<T>>,
}

impl<T: Reset> Pool<T> {
    /// Creates a pool keeping at most `max_idle` idle objects, built by `factory` on demand.
    pub fn new<F>(max_idle: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(Vec::with_capacity(max_idle)),
                max_idle,
                factory: Box::new(factory),
            }),
        }
    }

    /// Borrows an object; it returns to the pool when the guard is dropped.
    pub fn get(&self) -> Pooled<T> {
        let cached = self.shared.idle().pop();
        let value = cached.unwrap_or_else(|| (self.shared.factory)());
        Pooled {
            value: Some(value),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of idle objects ready for reuse.
    pub fn idle(&self) -> usize {
        self.shared.idle().len()
    }
}

impl<T: Reset> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Reset> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("max_idle", &self.shared.max_idle)
            .finish()
    }
}

/// An object on loan from a [`Pool`].
pub struct Pooled<T: Reset> {
    value: Option<T>,
    shared: Arc<Shared<T>>,
}

impl<T: Reset> Pooled<T> {
    /// Keeps the object instead of returning it to the pool.
    pub fn detach(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("value is present until drop or detach"),
        }
    }
}

impl<T: Reset> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("value is present until drop or detach"),
        }
    }
}

impl<T: Reset> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("value is present until drop or detach"),
        }
    }
}

impl<T: Reset> Drop for Pooled<T> {
    fn drop(&mut self) {
        let Some(mut value) = self.value.take() else {
            return;
        };
        value.reset();
        let mut idle = self.shared.idle();
        if idle.len() < self.shared.max_idle {
            idle.push(value);
        }
    }
}
