use std::fmt;
use std::sync::{Arc, Mutex};

pub type ReleaseFn = Box<dyn FnOnce(usize) + Send>;

struct PointerState {
    address: usize,
    release: Option<ReleaseFn>,
    released: bool,
}

/// Raw native address with an at-most-once release callback.
///
/// Release runs while holding the pointer's own lock, so an explicit close racing the
/// finalizer frees the memory exactly once.
pub struct NativePointer {
    state: Mutex<PointerState>,
}

impl NativePointer {
    pub fn new(address: usize, release: ReleaseFn) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PointerState {
                address,
                release: Some(release),
                released: false,
            }),
        })
    }

    /// Current address, `0` once released.
    pub fn address(&self) -> usize {
        let state = self.lock();
        if state.released {
            0
        } else {
            state.address
        }
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    /// Run the release callback unless it already ran. Returns whether this call released.
    pub fn release(&self) -> bool {
        let mut state = self.lock();
        if state.released {
            return false;
        }
        state.released = true;
        if let Some(callback) = state.release.take() {
            callback(state.address);
        }
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PointerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for NativePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        write!(f, "NativePointer(0x{:x}, released={})", state.address, state.released)
    }
}

/// Owning handle: releases its pointer when dropped.
#[derive(Debug)]
pub struct NativeAllocation {
    pointer: Arc<NativePointer>,
    size: usize,
}

impl NativeAllocation {
    pub fn new(pointer: Arc<NativePointer>, size: usize) -> Self {
        Self { pointer, size }
    }

    pub fn address(&self) -> usize {
        self.pointer.address()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pointer(&self) -> &Arc<NativePointer> {
        &self.pointer
    }

    /// Release now rather than on drop.
    pub fn free(self) {
        self.pointer.release();
    }
}

impl Drop for NativeAllocation {
    fn drop(&mut self) {
        self.pointer.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> ReleaseFn {
        let counter = Arc::clone(counter);
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_release_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ptr = NativePointer::new(0xdead, counting(&counter));
        assert_eq!(ptr.address(), 0xdead);
        assert!(ptr.release());
        assert!(!ptr.release());
        assert!(ptr.is_released());
        assert_eq!(ptr.address(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_allocation_releases_on_drop_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ptr = NativePointer::new(0x10, counting(&counter));
        {
            let alloc = NativeAllocation::new(Arc::clone(&ptr), 16);
            assert_eq!(alloc.size(), 16);
        }
        ptr.release();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_release_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let ptr = NativePointer::new(0x20, counting(&counter));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ptr = Arc::clone(&ptr);
                std::thread::spawn(move || ptr.release())
            })
            .collect();
        let released = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| *r)
            .count();
        assert_eq!(released, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
