//! Supporting native modules built on [`NativeLibrary`].

use crate::config::types::NativeLibraryError;
use crate::ffi::finalizer::SharedFinalizer;
use crate::ffi::functions::{Bz2NativeFunction, CtypesNativeFunction, LzmaNativeFunction, ZlibNativeFunction};
use crate::ffi::invoker::NativeArg;
use crate::ffi::library::{LibraryContext, LoadPolicy, NativeLibrary};
use crate::ffi::pointer::{NativeAllocation, NativePointer};
use log::warn;
use std::any::Any;
use std::sync::Arc;

/// zlib version and checksum probes.
pub struct ZlibSupport {
    lib: NativeLibrary<ZlibNativeFunction>,
}

impl ZlibSupport {
    pub fn new(context: LibraryContext) -> Self {
        Self {
            lib: NativeLibrary::new(context, LoadPolicy::Optional),
        }
    }

    pub fn is_available(&self) -> bool {
        self.lib.is_available()
    }

    pub fn version(&self) -> Result<String, NativeLibraryError> {
        // SAFETY: zlibVersion takes no arguments and returns a static string.
        let value = unsafe { self.lib.invoke(ZlibNativeFunction::ZlibVersion, &mut []) }?;
        value
            .into_string()
            .ok_or_else(|| NativeLibraryError::Unavailable("libz".to_string()))
    }

    pub fn crc32(&self, initial: u32, data: &[u8]) -> Result<u32, NativeLibraryError> {
        self.checksum(ZlibNativeFunction::Crc32, initial, data)
    }

    pub fn adler32(&self, initial: u32, data: &[u8]) -> Result<u32, NativeLibraryError> {
        self.checksum(ZlibNativeFunction::Adler32, initial, data)
    }

    fn checksum(&self, function: ZlibNativeFunction, initial: u32, data: &[u8]) -> Result<u32, NativeLibraryError> {
        let mut value = initial as u64;
        // The length parameter is a uInt, so feed large inputs in chunks.
        for chunk in data.chunks(u32::MAX as usize) {
            let mut args = [
                NativeArg::Int(value as i64),
                NativeArg::Bytes(chunk),
                NativeArg::Int(chunk.len() as i64),
            ];
            // SAFETY: the slice outlives the call and its length is passed alongside.
            value = unsafe { self.lib.invoke(function, &mut args) }?.as_i64() as u64;
        }
        Ok(value as u32)
    }
}

pub struct Bz2Support {
    lib: NativeLibrary<Bz2NativeFunction>,
}

impl Bz2Support {
    pub fn new(context: LibraryContext) -> Self {
        Self {
            lib: NativeLibrary::new(context, LoadPolicy::Optional),
        }
    }

    pub fn is_available(&self) -> bool {
        self.lib.is_available()
    }

    pub fn version(&self) -> Result<String, NativeLibraryError> {
        // SAFETY: no arguments, static string result.
        let value = unsafe { self.lib.invoke(Bz2NativeFunction::Version, &mut []) }?;
        value
            .into_string()
            .ok_or_else(|| NativeLibraryError::Unavailable("libbz2".to_string()))
    }
}

pub struct LzmaSupport {
    lib: NativeLibrary<LzmaNativeFunction>,
}

impl LzmaSupport {
    pub fn new(context: LibraryContext) -> Self {
        Self {
            lib: NativeLibrary::new(context, LoadPolicy::Optional),
        }
    }

    pub fn is_available(&self) -> bool {
        self.lib.is_available()
    }

    pub fn version_string(&self) -> Result<String, NativeLibraryError> {
        // SAFETY: no arguments, static string result.
        let value = unsafe { self.lib.invoke(LzmaNativeFunction::VersionString, &mut []) }?;
        value
            .into_string()
            .ok_or_else(|| NativeLibraryError::Unavailable("liblzma".to_string()))
    }

    pub fn version_number(&self) -> Result<u32, NativeLibraryError> {
        // SAFETY: no arguments.
        let value = unsafe { self.lib.invoke(LzmaNativeFunction::VersionNumber, &mut []) }?;
        Ok(value.as_i64() as u32)
    }
}

/// Raw heap allocations handed out to ctypes-style callers.
pub struct CtypesSupport {
    lib: Arc<NativeLibrary<CtypesNativeFunction>>,
    finalizer: Option<Arc<SharedFinalizer>>,
}

impl CtypesSupport {
    pub fn new(context: LibraryContext, finalizer: Option<Arc<SharedFinalizer>>) -> Self {
        Self {
            lib: Arc::new(NativeLibrary::new(context, LoadPolicy::Optional)),
            finalizer,
        }
    }

    pub fn is_available(&self) -> bool {
        self.lib.is_available()
    }

    fn wrap(&self, address: usize) -> Result<Arc<NativePointer>, NativeLibraryError> {
        if address == 0 {
            return Err(NativeLibraryError::Unavailable("out of memory".to_string()));
        }
        let lib = Arc::clone(&self.lib);
        Ok(NativePointer::new(
            address,
            Box::new(move |addr| {
                let mut args = [NativeArg::Pointer(addr)];
                // SAFETY: addr came from malloc/calloc of this library and is freed once.
                if let Err(e) = unsafe { lib.invoke(CtypesNativeFunction::Free, &mut args) } {
                    warn!("free(0x{:x}) failed: {}", addr, e);
                }
            }),
        ))
    }

    pub fn malloc(&self, size: usize) -> Result<NativeAllocation, NativeLibraryError> {
        let mut args = [NativeArg::Int(size as i64)];
        // SAFETY: malloc has no pointer preconditions.
        let address = unsafe { self.lib.invoke(CtypesNativeFunction::Malloc, &mut args) }?.as_pointer();
        Ok(NativeAllocation::new(self.wrap(address)?, size))
    }

    pub fn calloc(&self, count: usize, size: usize) -> Result<NativeAllocation, NativeLibraryError> {
        let mut args = [NativeArg::Int(count as i64), NativeArg::Int(size as i64)];
        // SAFETY: calloc has no pointer preconditions.
        let address = unsafe { self.lib.invoke(CtypesNativeFunction::Calloc, &mut args) }?.as_pointer();
        Ok(NativeAllocation::new(self.wrap(address)?, count.saturating_mul(size)))
    }

    /// Allocation whose lifetime follows `owner`: released by the shared finalizer once
    /// `owner` is dropped, unless released explicitly before.
    pub fn malloc_owned(
        &self,
        owner: &Arc<dyn Any + Send + Sync>,
        size: usize,
    ) -> Result<Arc<NativePointer>, NativeLibraryError> {
        let mut args = [NativeArg::Int(size as i64)];
        // SAFETY: malloc has no pointer preconditions.
        let address = unsafe { self.lib.invoke(CtypesNativeFunction::Malloc, &mut args) }?.as_pointer();
        let pointer = self.wrap(address)?;
        match &self.finalizer {
            Some(finalizer) => finalizer.register(owner, Arc::clone(&pointer)),
            None => warn!("No finalizer registered; allocation 0x{:x} must be released explicitly", address),
        }
        Ok(pointer)
    }

    pub fn memset(&self, allocation: &NativeAllocation, value: u8) -> Result<(), NativeLibraryError> {
        let address = allocation.address();
        if address == 0 {
            return Err(NativeLibraryError::Unavailable("allocation released".to_string()));
        }
        let mut args = [
            NativeArg::Pointer(address),
            NativeArg::Int(value as i64),
            NativeArg::Int(allocation.size() as i64),
        ];
        // SAFETY: the allocation is live and `size` bytes long.
        unsafe { self.lib.invoke(CtypesNativeFunction::Memset, &mut args) }?;
        Ok(())
    }

    /// `strlen` of a NUL-terminated native string.
    ///
    /// # Safety
    /// `address` must point to a NUL-terminated string.
    pub unsafe fn strlen(&self, address: usize) -> Result<usize, NativeLibraryError> {
        let mut args = [NativeArg::Pointer(address)];
        Ok(self.lib.invoke(CtypesNativeFunction::Strlen, &mut args)?.as_i64() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::invoker::DlopenInvoker;

    fn context() -> LibraryContext {
        LibraryContext::new(Arc::new(DlopenInvoker::new()), true, Vec::new())
    }

    #[test]
    fn test_zlib_crc32_matches_reference_when_available() {
        let zlib = ZlibSupport::new(context());
        if !zlib.is_available() {
            return;
        }
        assert_eq!(zlib.crc32(0, b"123456789").unwrap(), 0xCBF4_3926);
        assert_eq!(zlib.adler32(1, b"Wikipedia").unwrap(), 0x11E6_0398);
        assert!(!zlib.version().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_native_access_reports_error() {
        let ctx = LibraryContext::new(Arc::new(DlopenInvoker::new()), false, Vec::new());
        let zlib = ZlibSupport::new(ctx);
        assert_eq!(zlib.version().unwrap_err(), NativeLibraryError::NativeAccessDisabled);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_ctypes_allocation_roundtrip() {
        let ctypes = CtypesSupport::new(context(), None);
        let alloc = ctypes.malloc(8).unwrap();
        assert_ne!(alloc.address(), 0);
        ctypes.memset(&alloc, b'a').unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(alloc.address() as *const u8, 8) };
        assert_eq!(bytes, b"aaaaaaaa");
        let pointer = Arc::clone(alloc.pointer());
        drop(alloc);
        assert!(pointer.is_released());
    }
}
