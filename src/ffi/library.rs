use crate::config::types::NativeLibraryError;
use crate::ffi::functions::NativeFunction;
use crate::ffi::invoker::{LibraryFlavor, LoadedLibrary, NativeArg, NativeInvoker, NativeSymbol, NativeValue};
use crate::ffi::signature::Signature;
use log::{info, warn};
use once_cell::sync::OnceCell;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Whether a failed load is fatal for the owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPolicy {
    Required,
    Optional,
}

/// Loading parameters shared by every library of a context.
#[derive(Clone)]
pub struct LibraryContext {
    pub invoker: Arc<dyn NativeInvoker>,
    pub native_access: bool,
    pub search_paths: Vec<PathBuf>,
    pub flavor: LibraryFlavor,
}

impl LibraryContext {
    pub fn new(invoker: Arc<dyn NativeInvoker>, native_access: bool, search_paths: Vec<PathBuf>) -> Self {
        Self {
            invoker,
            native_access,
            search_paths,
            flavor: LibraryFlavor::Native,
        }
    }
}

enum LibraryState {
    Loaded(LoadedLibrary),
    Unavailable(NativeLibraryError),
}

struct CachedFunction {
    symbol: NativeSymbol,
    signature: Signature,
}

/// Per-context cache of one library and the functions resolved from it.
///
/// The first load runs under `load_lock` and is published through a write-once cell;
/// after that every lookup is lock-free. Functions are resolved lazily on first use.
pub struct NativeLibrary<F: NativeFunction> {
    context: LibraryContext,
    policy: LoadPolicy,
    state: OnceCell<LibraryState>,
    load_lock: Mutex<()>,
    functions: Vec<OnceCell<CachedFunction>>,
    _marker: PhantomData<F>,
}

impl<F: NativeFunction> NativeLibrary<F> {
    pub fn new(context: LibraryContext, policy: LoadPolicy) -> Self {
        let functions = F::all().iter().map(|_| OnceCell::new()).collect();
        Self {
            context,
            policy,
            state: OnceCell::new(),
            load_lock: Mutex::new(()),
            functions,
            _marker: PhantomData,
        }
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }

    pub fn name(&self) -> &'static str {
        F::LIBRARY
    }

    /// Load the library if not done yet.
    ///
    /// With native access disabled this fails with `NativeAccessDisabled` without
    /// attempting a load. A required library carries its remediation hint in the error.
    pub fn ensure_loaded(&self) -> Result<&LoadedLibrary, NativeLibraryError> {
        if !self.context.native_access {
            return Err(NativeLibraryError::NativeAccessDisabled);
        }
        let state = match self.state.get() {
            Some(state) => state,
            None => {
                let _guard = self
                    .load_lock
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                match self.state.get() {
                    Some(state) => state,
                    None => {
                        let loaded = self.load();
                        // Only this thread holds load_lock, so the cell is still empty.
                        let _ = self.state.set(loaded);
                        self.state
                            .get()
                            .ok_or_else(|| NativeLibraryError::Unavailable(F::LIBRARY.to_string()))?
                    }
                }
            }
        };
        match state {
            LibraryState::Loaded(lib) => Ok(lib),
            LibraryState::Unavailable(err) => Err(err.clone()),
        }
    }

    fn load(&self) -> LibraryState {
        let result = self.context.invoker.load_library(
            F::LIBRARY,
            F::CANDIDATES,
            &self.context.search_paths,
            self.context.flavor,
        );
        match result {
            Ok(lib) => {
                info!("Loaded {} from {}", F::LIBRARY, lib.location());
                LibraryState::Loaded(lib)
            }
            Err(err) => match self.policy {
                LoadPolicy::Required => {
                    let err = match err {
                        NativeLibraryError::CannotLoad { library, reason, .. } => {
                            NativeLibraryError::CannotLoad {
                                library,
                                reason,
                                hint: F::HINT.map(str::to_string),
                            }
                        }
                        other => other,
                    };
                    warn!("Required native library {} failed to load: {}", F::LIBRARY, err);
                    LibraryState::Unavailable(err)
                }
                LoadPolicy::Optional => {
                    info!("Optional native library {} unavailable: {}", F::LIBRARY, err);
                    LibraryState::Unavailable(NativeLibraryError::Unavailable(F::LIBRARY.to_string()))
                }
            },
        }
    }

    /// `true` once the library is loaded; triggers the load.
    pub fn is_available(&self) -> bool {
        self.ensure_loaded().is_ok()
    }

    fn function(&self, function: F) -> Result<&CachedFunction, NativeLibraryError> {
        let lib = self.ensure_loaded()?;
        let cell = self
            .functions
            .get(function.index())
            .ok_or_else(|| NativeLibraryError::SymbolNotFound {
                library: F::LIBRARY.to_string(),
                symbol: function.symbol().to_string(),
            })?;
        cell.get_or_try_init(|| {
            let invoker = &self.context.invoker;
            let signature = invoker.parse_signature(function.signature())?;
            let symbol = invoker.lookup(lib, function.symbol())?;
            Ok(CachedFunction { symbol, signature })
        })
    }

    /// Call `function` with `args`.
    ///
    /// # Safety
    /// Pointer arguments must satisfy the callee's contract.
    pub unsafe fn invoke(&self, function: F, args: &mut [NativeArg<'_>]) -> Result<NativeValue, NativeLibraryError> {
        let cached = self.function(function)?;
        self.context
            .invoker
            .invoke(cached.symbol, &cached.signature, args)
    }

    /// Resolve every function eagerly, reporting the first missing symbol.
    pub fn resolve_all(&self) -> Result<(), NativeLibraryError> {
        for f in F::all() {
            self.function(*f)?;
        }
        Ok(())
    }

    pub fn location(&self) -> Option<String> {
        match self.state.get() {
            Some(LibraryState::Loaded(lib)) => Some(lib.location().to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::functions::ZlibNativeFunction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingInvoker {
        loads: AtomicUsize,
        fail: bool,
    }

    impl NativeInvoker for CountingInvoker {
        fn load_library(
            &self,
            name: &str,
            _candidates: &[&str],
            _search_paths: &[PathBuf],
            _flavor: LibraryFlavor,
        ) -> Result<LoadedLibrary, NativeLibraryError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NativeLibraryError::CannotLoad {
                    library: name.to_string(),
                    reason: "missing".to_string(),
                    hint: None,
                })
            } else {
                Ok(LoadedLibrary::new(name, "memory", Box::new(())))
            }
        }

        fn lookup(&self, _library: &LoadedLibrary, _symbol: &str) -> Result<NativeSymbol, NativeLibraryError> {
            Ok(NativeSymbol { address: 0x1000 })
        }

        unsafe fn invoke(
            &self,
            _symbol: NativeSymbol,
            _signature: &Signature,
            _args: &mut [NativeArg<'_>],
        ) -> Result<NativeValue, NativeLibraryError> {
            Ok(NativeValue::Int(42))
        }
    }

    fn library(invoker: Arc<CountingInvoker>, native_access: bool, policy: LoadPolicy) -> NativeLibrary<ZlibNativeFunction> {
        NativeLibrary::new(LibraryContext::new(invoker, native_access, Vec::new()), policy)
    }

    #[test]
    fn test_load_happens_once() {
        let invoker = Arc::new(CountingInvoker::default());
        let lib = library(invoker.clone(), true, LoadPolicy::Optional);
        assert!(lib.is_available());
        assert!(lib.is_available());
        let v = unsafe { lib.invoke(ZlibNativeFunction::ZlibVersion, &mut []) }.unwrap();
        assert_eq!(v, NativeValue::Int(42));
        assert_eq!(invoker.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let invoker = Arc::new(CountingInvoker::default());
        let lib = Arc::new(library(invoker.clone(), true, LoadPolicy::Required));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lib = Arc::clone(&lib);
                std::thread::spawn(move || lib.ensure_loaded().is_ok())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(invoker.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_native_access_disabled_never_loads() {
        let invoker = Arc::new(CountingInvoker::default());
        let lib = library(invoker.clone(), false, LoadPolicy::Required);
        assert_eq!(
            lib.ensure_loaded().unwrap_err(),
            NativeLibraryError::NativeAccessDisabled
        );
        assert_eq!(invoker.loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_optional_failure_degrades_to_unavailable() {
        let invoker = Arc::new(CountingInvoker {
            fail: true,
            ..Default::default()
        });
        let lib = library(invoker.clone(), true, LoadPolicy::Optional);
        assert!(!lib.is_available());
        assert_eq!(
            lib.ensure_loaded().unwrap_err(),
            NativeLibraryError::Unavailable("libz".to_string())
        );
        assert_eq!(invoker.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_required_failure_carries_hint() {
        use crate::ffi::functions::PosixNativeFunction;
        let invoker = Arc::new(CountingInvoker {
            fail: true,
            ..Default::default()
        });
        let lib: NativeLibrary<PosixNativeFunction> = NativeLibrary::new(
            LibraryContext::new(invoker, true, Vec::new()),
            LoadPolicy::Required,
        );
        match lib.ensure_loaded().unwrap_err() {
            NativeLibraryError::CannotLoad { hint, .. } => assert!(hint.is_some()),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
