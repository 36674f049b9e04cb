use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted value behind a read-write lock.
///
/// Chunk voxel data lives in an `MtResource` so that mesh workers can read a chunk and its
/// neighbours under shared guards while the main thread keeps exclusive write access for
/// block edits. Cloning is cheap and yields another handle to the same value.
///
/// A panic while a guard is held poisons the lock. The data behind it is plain voxel storage
/// that is never left half-updated by a single `set`, so guards recover the value instead of
/// propagating the poison.
///
/// # Type Parameters
/// - `T`: The contained value, must be `Send + Sync`
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Wraps `resource` in a new shared handle.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a shared guard. Blocks while a writer holds the lock.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns an exclusive guard. Blocks until every reader has released the lock.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live handles to the value, including this one.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.resource)
    }

    /// Whether both handles point at the same value.
    pub fn same_resource(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}

impl<T: Send + Sync + std::fmt::Debug> std::fmt::Debug for MtResource<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MtResource")
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::MtResource;
    use std::thread;

    #[test]
    fn clones_share_the_value() {
        let counter = MtResource::new(0u32);
        let other = counter.clone();

        *other.get_mut() += 1;

        assert_eq!(*counter.get(), 1);
        assert!(counter.same_resource(&other));
        assert_eq!(counter.handle_count(), 2);
    }

    #[test]
    fn readers_on_other_threads_see_writes() {
        let counter = MtResource::new(41u32);
        *counter.get_mut() += 1;

        let reader = counter.clone();
        let seen = thread::spawn(move || *reader.get()).join().unwrap();

        assert_eq!(seen, 42);
        assert_eq!(counter.handle_count(), 1);
    }

    #[test]
    fn poisoned_lock_still_yields_the_value() {
        let value = MtResource::new(7u32);
        let poisoner = value.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.get_mut();
            panic!("poison");
        })
        .join();

        assert_eq!(*value.get(), 7);
    }
}
