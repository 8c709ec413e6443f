//! Integration tests for native library dispatch
//!
//! Load policy and caching are checked with a scripted invoker; the ctypes helpers run
//! against the real libc through `dlopen`.

use posix_support::ffi::finalizer::{SharedFinalizer, ThreadedActionQueue};
use posix_support::ffi::functions::ZlibNativeFunction;
use posix_support::ffi::invoker::LibraryFlavor;
use posix_support::ffi::modules::{CtypesSupport, ZlibSupport};
use posix_support::ffi::signature::Signature;
use posix_support::ffi::{
    DlopenInvoker, LibraryContext, LoadPolicy, NativeArg, NativeInvoker, NativeLibrary, NativeValue,
};
use posix_support::ffi::invoker::{LoadedLibrary, NativeSymbol};
use posix_support::NativeLibraryError;
use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Invoker that records loads and lookups and returns canned values.
#[derive(Default)]
struct ScriptedInvoker {
    loadable: bool,
    loads: AtomicUsize,
    lookups: AtomicUsize,
}

impl ScriptedInvoker {
    fn new(loadable: bool) -> Arc<Self> {
        Arc::new(Self {
            loadable,
            ..Default::default()
        })
    }
}

impl NativeInvoker for ScriptedInvoker {
    fn load_library(
        &self,
        name: &str,
        _candidates: &[&str],
        _search_paths: &[PathBuf],
        _flavor: LibraryFlavor,
    ) -> Result<LoadedLibrary, NativeLibraryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.loadable {
            Ok(LoadedLibrary::new(name, "scripted", Box::new(()) as Box<dyn Any + Send + Sync>))
        } else {
            Err(NativeLibraryError::CannotLoad {
                library: name.to_string(),
                reason: "not installed".to_string(),
                hint: None,
            })
        }
    }

    fn lookup(&self, _library: &LoadedLibrary, _symbol: &str) -> Result<NativeSymbol, NativeLibraryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(NativeSymbol { address: 0x1000 })
    }

    unsafe fn invoke(
        &self,
        _symbol: NativeSymbol,
        _signature: &Signature,
        args: &mut [NativeArg<'_>],
    ) -> Result<NativeValue, NativeLibraryError> {
        Ok(NativeValue::Int(args.len() as i64))
    }
}

fn context(invoker: Arc<ScriptedInvoker>, native_access: bool) -> LibraryContext {
    LibraryContext::new(invoker, native_access, Vec::new())
}

#[test]
fn test_library_loaded_once_and_functions_cached() {
    let invoker = ScriptedInvoker::new(true);
    let lib: NativeLibrary<ZlibNativeFunction> =
        NativeLibrary::new(context(Arc::clone(&invoker), true), LoadPolicy::Optional);

    for _ in 0..3 {
        let mut args = [NativeArg::Int(0), NativeArg::Bytes(b"abc"), NativeArg::Int(3)];
        let value = unsafe { lib.invoke(ZlibNativeFunction::Crc32, &mut args) }.unwrap();
        assert_eq!(value, NativeValue::Int(3));
    }
    assert_eq!(invoker.loads.load(Ordering::SeqCst), 1);
    assert_eq!(invoker.lookups.load(Ordering::SeqCst), 1);

    lib.resolve_all().unwrap();
    assert_eq!(invoker.lookups.load(Ordering::SeqCst), 3);
    assert_eq!(lib.location().as_deref(), Some("scripted"));
}

#[test]
fn test_concurrent_first_use_loads_once() {
    let invoker = ScriptedInvoker::new(true);
    let lib: Arc<NativeLibrary<ZlibNativeFunction>> =
        Arc::new(NativeLibrary::new(context(Arc::clone(&invoker), true), LoadPolicy::Required));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lib = Arc::clone(&lib);
            std::thread::spawn(move || lib.is_available())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(invoker.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_optional_library_degrades_to_unavailable() {
    let invoker = ScriptedInvoker::new(false);
    let zlib = ZlibSupport::new(context(Arc::clone(&invoker), true));
    assert!(!zlib.is_available());
    assert_eq!(zlib.version(), Err(NativeLibraryError::Unavailable("libz".to_string())));
    assert_eq!(invoker.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_required_library_failure_is_reported() {
    let invoker = ScriptedInvoker::new(false);
    let lib: NativeLibrary<ZlibNativeFunction> =
        NativeLibrary::new(context(invoker, true), LoadPolicy::Required);
    assert!(matches!(
        lib.ensure_loaded(),
        Err(NativeLibraryError::CannotLoad { .. })
    ));
}

#[test]
fn test_native_access_disabled_skips_loading() {
    let invoker = ScriptedInvoker::new(true);
    let lib: NativeLibrary<ZlibNativeFunction> =
        NativeLibrary::new(context(Arc::clone(&invoker), false), LoadPolicy::Required);
    assert!(matches!(lib.ensure_loaded(), Err(NativeLibraryError::NativeAccessDisabled)));
    assert_eq!(invoker.loads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_ctypes_allocation_released_once() {
    let ctypes = CtypesSupport::new(
        LibraryContext::new(Arc::new(DlopenInvoker::new()), true, Vec::new()),
        None,
    );
    assert!(ctypes.is_available());

    let allocation = ctypes.calloc(4, 16).unwrap();
    assert_ne!(allocation.address(), 0);
    assert_eq!(allocation.size(), 64);
    ctypes.memset(&allocation, 0x41).unwrap();

    let pointer = Arc::clone(allocation.pointer());
    allocation.free();
    assert!(pointer.is_released());
    assert!(!pointer.release());
    assert_eq!(pointer.address(), 0);
}

#[test]
fn test_finalizer_releases_after_owner_dropped() {
    let queue = ThreadedActionQueue::start(Duration::from_millis(5));
    let finalizer = SharedFinalizer::start(queue.clone(), Duration::from_millis(5));
    let ctypes = CtypesSupport::new(
        LibraryContext::new(Arc::new(DlopenInvoker::new()), true, Vec::new()),
        Some(Arc::clone(&finalizer)),
    );

    let owner: Arc<dyn Any + Send + Sync> = Arc::new(());
    let pointer = ctypes.malloc_owned(&owner, 32).unwrap();
    assert_eq!(finalizer.pending(), 1);
    drop(owner);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !pointer.is_released() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(pointer.is_released());
    finalizer.shutdown();
    queue.shutdown();
}
