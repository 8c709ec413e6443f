//! `flock` emulation: advisory locks tracked per file, visible only inside this process.

use crate::backend::emulated::channel::LockKind;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Default)]
struct Holders {
    shared: HashSet<u64>,
    exclusive: Option<u64>,
}

impl Holders {
    fn conflicts(&self, owner: u64, kind: LockKind) -> bool {
        match kind {
            LockKind::Shared => self.exclusive.is_some_and(|o| o != owner),
            LockKind::Exclusive => {
                self.exclusive.is_some_and(|o| o != owner) || self.shared.iter().any(|o| *o != owner)
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

/// Lock holders keyed by file; owners are channel wrapper ids.
#[derive(Default)]
pub(crate) struct FileLocks {
    holders: Mutex<HashMap<PathBuf, Holders>>,
    released: Condvar,
}

impl FileLocks {
    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Holders>> {
        self.holders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire (or convert to) `kind`. Returns `false` instead of waiting when
    /// `nonblocking` is set and another owner holds a conflicting lock.
    pub fn acquire(&self, file: &Path, owner: u64, kind: LockKind, nonblocking: bool) -> bool {
        let mut holders = self.lock();
        loop {
            let entry = holders.entry(file.to_path_buf()).or_default();
            if !entry.conflicts(owner, kind) {
                entry.shared.remove(&owner);
                if entry.exclusive == Some(owner) {
                    entry.exclusive = None;
                }
                match kind {
                    LockKind::Shared => {
                        entry.shared.insert(owner);
                    }
                    LockKind::Exclusive => entry.exclusive = Some(owner),
                }
                return true;
            }
            if nonblocking {
                return false;
            }
            holders = self
                .released
                .wait(holders)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    pub fn release(&self, file: &Path, owner: u64) {
        let mut holders = self.lock();
        if let Some(entry) = holders.get_mut(file) {
            entry.shared.remove(&owner);
            if entry.exclusive == Some(owner) {
                entry.exclusive = None;
            }
            if entry.is_empty() {
                holders.remove(file);
            }
        }
        self.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_shared_locks_coexist_exclusive_conflicts() {
        let locks = FileLocks::default();
        let file = Path::new("/tmp/f");
        assert!(locks.acquire(file, 1, LockKind::Shared, true));
        assert!(locks.acquire(file, 2, LockKind::Shared, true));
        assert!(!locks.acquire(file, 3, LockKind::Exclusive, true));
        locks.release(file, 1);
        locks.release(file, 2);
        assert!(locks.acquire(file, 3, LockKind::Exclusive, true));
        assert!(!locks.acquire(file, 1, LockKind::Shared, true));
    }

    #[test]
    fn test_owner_can_convert_its_own_lock() {
        let locks = FileLocks::default();
        let file = Path::new("/tmp/g");
        assert!(locks.acquire(file, 1, LockKind::Shared, true));
        assert!(locks.acquire(file, 1, LockKind::Exclusive, true));
        assert!(locks.acquire(file, 1, LockKind::Shared, true));
        assert!(locks.acquire(file, 2, LockKind::Shared, true));
    }

    #[test]
    fn test_blocking_acquire_waits_for_release() {
        let locks = Arc::new(FileLocks::default());
        let file = PathBuf::from("/tmp/h");
        assert!(locks.acquire(&file, 1, LockKind::Exclusive, false));
        let waiter = {
            let locks = Arc::clone(&locks);
            let file = file.clone();
            std::thread::spawn(move || locks.acquire(&file, 2, LockKind::Exclusive, false))
        };
        std::thread::sleep(Duration::from_millis(20));
        locks.release(&file, 1);
        assert!(waiter.join().unwrap());
    }
}
