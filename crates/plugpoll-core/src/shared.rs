//! Reference-counted process-wide resources.
//!
//! A [`SharedResource`] lives in a `static` and holds at most one value. The
//! first [`acquire`](SharedResource::acquire) initializes it, every
//! [`Lease`] (and clone of one) counts as a reference, and dropping the last
//! lease tears the value down. Initialization and teardown both happen under
//! the same mutex, so leases can be taken and dropped from any thread.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Slot<T> {
    leases: usize,
    value: Option<Arc<T>>,
}

pub struct SharedResource<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> SharedResource<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                leases: 0,
                value: None,
            }),
        }
    }

    /// Take a lease on the shared value, initializing it with `init` if no
    /// lease is currently held.
    ///
    /// An `init` error leaves the resource uninitialized.
    pub fn acquire<E>(&'static self, init: impl FnOnce() -> Result<T, E>) -> Result<Lease<T>, E> {
        let mut slot = self.lock();
        let value = match &slot.value {
            Some(value) => Arc::clone(value),
            None => {
                let value = Arc::new(init()?);
                slot.value = Some(Arc::clone(&value));
                value
            }
        };
        slot.leases += 1;

        Ok(Lease {
            owner: self,
            value: Some(value),
        })
    }

    /// Number of live leases.
    pub fn lease_count(&self) -> usize {
        self.lock().leases
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().value.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for SharedResource<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A counted reference to the value of a [`SharedResource`].
pub struct Lease<T: 'static> {
    owner: &'static SharedResource<T>,
    /// Only `None` while the lease is being dropped.
    value: Option<Arc<T>>,
}

impl<T> Lease<T> {
    /// True when both leases refer to the same initialization of the resource.
    pub fn same_instance(&self, other: &Lease<T>) -> bool {
        Arc::ptr_eq(self.value(), other.value())
    }

    fn value(&self) -> &Arc<T> {
        self.value
            .as_ref()
            .expect("lease holds its value until dropped")
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value()
    }
}

impl<T> Clone for Lease<T> {
    fn clone(&self) -> Self {
        let mut slot = self.owner.lock();
        slot.leases += 1;
        Self {
            owner: self.owner,
            value: Some(Arc::clone(self.value())),
        }
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        let mut slot = self.owner.lock();
        drop(self.value.take());

        slot.leases -= 1;
        if slot.leases == 0 {
            // Last lease: tear the value down while still holding the lock.
            drop(slot.value.take());
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Lease").field(&**self).finish()
    }
}
