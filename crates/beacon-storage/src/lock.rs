//! Injectable mutual exclusion for the event storage
//!
//! Storage operations run synchronously in the caller's context, which may
//! include interrupt handlers on a device. The integrator supplies a
//! [`StorageLock`] that masks whatever can preempt a storage call; the
//! default [`NoopLock`] assumes a single calling context.

/// Lock/unlock pair wrapped around every state-mutating storage sequence
///
/// Implementations must not block for long: callers expect every storage
/// operation to return immediately.
pub trait StorageLock {
    fn lock(&self);
    fn unlock(&self);
}

/// Lock that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLock;

impl StorageLock for NoopLock {
    fn lock(&self) {}
    fn unlock(&self) {}
}

/// RAII guard holding a [`StorageLock`] until dropped
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, L: StorageLock + ?Sized> {
    lock: &'a L,
}

impl<'a, L: StorageLock + ?Sized> LockGuard<'a, L> {
    pub fn new(lock: &'a L) -> Self {
        lock.lock();
        Self { lock }
    }
}

impl<L: StorageLock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct DepthLock {
        depth: Cell<i32>,
        acquisitions: Cell<u32>,
    }

    impl StorageLock for DepthLock {
        fn lock(&self) {
            self.depth.set(self.depth.get() + 1);
            self.acquisitions.set(self.acquisitions.get() + 1);
        }

        fn unlock(&self) {
            self.depth.set(self.depth.get() - 1);
        }
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = DepthLock::default();
        {
            let _guard = LockGuard::new(&lock);
            assert_eq!(lock.depth.get(), 1);
        }
        assert_eq!(lock.depth.get(), 0);
        assert_eq!(lock.acquisitions.get(), 1);
    }

    #[test]
    fn test_guard_over_trait_object() {
        let lock = DepthLock::default();
        let dyn_lock: &dyn StorageLock = &lock;
        drop(LockGuard::new(dyn_lock));
        assert_eq!(lock.depth.get(), 0);
    }
}
