//! Deferred release of native pointers whose owners were dropped without closing them.
//!
//! Explicit release (`NativeAllocation` drop, `NativePointer::release`) is the primary
//! mechanism. `SharedFinalizer` is the safety net: it watches registered owners through
//! `Weak` references and posts a `PointerReleaseAction` to the action queue once the owner
//! is gone.

use crate::ffi::pointer::NativePointer;
use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::any::Any;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Work item run by a [`DeferredActionQueue`].
pub trait AsyncAction: Send {
    fn execute(self: Box<Self>);
    fn describe(&self) -> String {
        "async action".to_string()
    }
}

/// Collaborator that runs posted actions on its own schedule.
pub trait DeferredActionQueue: Send + Sync {
    fn post(&self, action: Box<dyn AsyncAction>);
}

/// Releases one pointer; a no-op if it was already released.
pub struct PointerReleaseAction {
    pointer: Arc<NativePointer>,
}

impl PointerReleaseAction {
    pub fn new(pointer: Arc<NativePointer>) -> Self {
        Self { pointer }
    }
}

impl AsyncAction for PointerReleaseAction {
    fn execute(self: Box<Self>) {
        if self.pointer.release() {
            debug!("Finalizer released {:?}", self.pointer);
        }
    }

    fn describe(&self) -> String {
        format!("release {:?}", self.pointer)
    }
}

/// Queue that runs actions on a background thread, polling at a fixed delay.
pub struct ThreadedActionQueue {
    sender: Sender<Box<dyn AsyncAction>>,
    shutdown: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedActionQueue {
    pub fn start(poll_interval: Duration) -> Arc<Self> {
        let (sender, receiver) = unbounded::<Box<dyn AsyncAction>>();
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let worker = thread::Builder::new()
            .name("posix-deferred-actions".to_string())
            .spawn(move || Self::run(receiver, shutdown_rx, poll_interval))
            .map_err(|e| warn!("Failed to start deferred action worker: {}", e))
            .ok();
        Arc::new(Self {
            sender,
            shutdown,
            worker: Mutex::new(worker),
        })
    }

    fn run(receiver: Receiver<Box<dyn AsyncAction>>, shutdown: Receiver<()>, poll_interval: Duration) {
        loop {
            select! {
                recv(receiver) -> msg => match msg {
                    Ok(action) => action.execute(),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
                default(poll_interval) => {}
            }
        }
        // Whatever is still queued must not leak.
        for action in receiver.try_iter() {
            action.execute();
        }
        debug!("Deferred action worker stopped");
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.try_send(());
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Deferred action worker panicked");
            }
        }
    }
}

impl DeferredActionQueue for ThreadedActionQueue {
    fn post(&self, action: Box<dyn AsyncAction>) {
        if let Err(e) = self.sender.send(action) {
            // Worker gone: run inline rather than leak.
            e.into_inner().execute();
        }
    }
}

impl Drop for ThreadedActionQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Registration {
    owner: Weak<dyn Any + Send + Sync>,
    pointer: Arc<NativePointer>,
}

/// Background sweeper turning unreachable owners into release actions.
pub struct SharedFinalizer {
    registrations: Arc<Mutex<Vec<Registration>>>,
    shutdown: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SharedFinalizer {
    pub fn start(queue: Arc<dyn DeferredActionQueue>, poll_interval: Duration) -> Arc<Self> {
        let registrations: Arc<Mutex<Vec<Registration>>> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let sweep_registrations = Arc::clone(&registrations);

        let worker = thread::Builder::new()
            .name("posix-finalizer".to_string())
            .spawn(move || {
                info!("Started native pointer finalizer");
                loop {
                    match shutdown_rx.recv_timeout(poll_interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    Self::sweep(&sweep_registrations, queue.as_ref());
                }
                Self::sweep(&sweep_registrations, queue.as_ref());
                info!("Native pointer finalizer stopped");
            })
            .map_err(|e| warn!("Failed to start finalizer thread: {}", e))
            .ok();

        Arc::new(Self {
            registrations,
            shutdown,
            worker: Mutex::new(worker),
        })
    }

    /// Watch `owner`; once it is dropped, `pointer` is released through the queue.
    pub fn register(&self, owner: &Arc<dyn Any + Send + Sync>, pointer: Arc<NativePointer>) {
        let mut regs = self
            .registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        regs.push(Registration {
            owner: Arc::downgrade(owner),
            pointer,
        });
    }

    pub fn pending(&self) -> usize {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn sweep(registrations: &Mutex<Vec<Registration>>, queue: &dyn DeferredActionQueue) {
        let collected: Vec<Arc<NativePointer>> = {
            let mut regs = registrations
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let mut collected = Vec::new();
            regs.retain(|reg| {
                if reg.pointer.is_released() {
                    false
                } else if reg.owner.strong_count() == 0 {
                    collected.push(Arc::clone(&reg.pointer));
                    false
                } else {
                    true
                }
            });
            collected
        };
        for pointer in collected {
            queue.post(Box::new(PointerReleaseAction::new(pointer)));
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.try_send(());
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Finalizer thread panicked");
            }
        }
    }
}

impl Drop for SharedFinalizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    fn counting_pointer(counter: &Arc<AtomicUsize>) -> Arc<NativePointer> {
        let counter = Arc::clone(counter);
        NativePointer::new(
            0x100,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_dropped_owner_gets_released() {
        let queue = ThreadedActionQueue::start(Duration::from_millis(5));
        let finalizer = SharedFinalizer::start(queue.clone(), Duration::from_millis(5));
        let counter = Arc::new(AtomicUsize::new(0));
        let pointer = counting_pointer(&counter);

        let owner: Arc<dyn Any + Send + Sync> = Arc::new(String::from("owner"));
        finalizer.register(&owner, Arc::clone(&pointer));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        drop(owner);
        assert!(wait_until(|| counter.load(Ordering::SeqCst) == 1));
        assert!(pointer.is_released());
        assert!(wait_until(|| finalizer.pending() == 0));
    }

    #[test]
    fn test_explicit_release_not_repeated_by_finalizer() {
        let queue = ThreadedActionQueue::start(Duration::from_millis(5));
        let finalizer = SharedFinalizer::start(queue.clone(), Duration::from_millis(5));
        let counter = Arc::new(AtomicUsize::new(0));
        let pointer = counting_pointer(&counter);

        let owner: Arc<dyn Any + Send + Sync> = Arc::new(1u8);
        finalizer.register(&owner, Arc::clone(&pointer));
        pointer.release();
        drop(owner);

        assert!(wait_until(|| finalizer.pending() == 0));
        finalizer.shutdown();
        queue.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_queue_drains_on_shutdown() {
        struct Count(Arc<AtomicUsize>);
        impl AsyncAction for Count {
            fn execute(self: Box<Self>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let queue = ThreadedActionQueue::start(Duration::from_secs(60));
        for _ in 0..3 {
            queue.post(Box::new(Count(Arc::clone(&counter))));
        }
        queue.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
