use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Acquire a registry mutex, recovering the guard if a previous holder panicked.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                hint = "registration state may be stale after panic in another thread",
                "Recovered from poisoned purge lock"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn recovers_poisoned_mutex() {
        let lock = Mutex::new(vec![1_u8]);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("lock should be acquired");
            panic!("poison lock");
        }));

        let mut guard = mutex_lock(&lock, "cache::lock::tests", "push");
        guard.push(2);
        assert_eq!(guard.as_slice(), &[1, 2]);
    }
}
