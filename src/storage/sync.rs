//! Lock helpers with poison recovery.
//!
//! A panic while a lock is held poisons it. Every value guarded here is
//! replaced wholesale (never left half-written), so the guarded data is
//! still consistent and the lock is recovered rather than propagating the
//! panic to every later caller.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquires a mutex, recovering from poisoning.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Template store mutex was poisoned, recovering");
            metrics::counter!("dishmatch_lock_poison_recovery_total", "lock" => "mutex")
                .increment(1);
            poisoned.into_inner()
        },
    }
}

/// Acquires a read lock, recovering from poisoning.
pub fn acquire_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Template snapshot lock was poisoned, recovering");
            metrics::counter!("dishmatch_lock_poison_recovery_total", "lock" => "read")
                .increment(1);
            poisoned.into_inner()
        },
    }
}

/// Acquires a write lock, recovering from poisoning.
pub fn acquire_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Template snapshot lock was poisoned, recovering");
            metrics::counter!("dishmatch_lock_poison_recovery_total", "lock" => "write")
                .increment(1);
            poisoned.into_inner()
        },
    }
}
