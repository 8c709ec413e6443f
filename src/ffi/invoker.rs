//! Native function invoker: library loading, symbol lookup and calls.

use crate::config::types::NativeLibraryError;
use crate::ffi::signature::{NativeType, ParamType, Signature};
use log::{debug, warn};
use std::any::Any;
use std::ffi::{CStr, CString};
use std::fmt;
use std::path::PathBuf;

/// How a library is provided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryFlavor {
    Native,
    /// LLVM bitcode, loadable only by a bitcode-capable invoker.
    Bitcode,
}

/// Library handle produced by a [`NativeInvoker`].
pub struct LoadedLibrary {
    name: String,
    location: String,
    handle: Box<dyn Any + Send + Sync>,
}

impl LoadedLibrary {
    pub fn new(name: impl Into<String>, location: impl Into<String>, handle: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the library was loaded from.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn handle<T: Any>(&self) -> Option<&T> {
        self.handle.downcast_ref::<T>()
    }
}

impl fmt::Debug for LoadedLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedLibrary")
            .field("name", &self.name)
            .field("location", &self.location)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeSymbol {
    pub address: usize,
}

/// One call argument.
#[derive(Debug)]
pub enum NativeArg<'a> {
    Int(i64),
    Pointer(usize),
    String(&'a CStr),
    Bytes(&'a [u8]),
    BytesMut(&'a mut [u8]),
}

impl NativeArg<'_> {
    fn as_word(&self) -> usize {
        match self {
            NativeArg::Int(v) => *v as usize,
            NativeArg::Pointer(p) => *p,
            NativeArg::String(s) => s.as_ptr() as usize,
            NativeArg::Bytes(b) => b.as_ptr() as usize,
            NativeArg::BytesMut(b) => b.as_ptr() as usize,
        }
    }
}

/// Result of a call, already narrowed to the declared return type.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeValue {
    Void,
    Int(i64),
    Pointer(usize),
    Double(f64),
    String(Option<String>),
}

impl NativeValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            NativeValue::Int(v) => *v,
            NativeValue::Pointer(p) => *p as i64,
            NativeValue::Double(d) => *d as i64,
            NativeValue::Void | NativeValue::String(_) => 0,
        }
    }

    pub fn as_pointer(&self) -> usize {
        match self {
            NativeValue::Pointer(p) => *p,
            NativeValue::Int(v) => *v as usize,
            _ => 0,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            NativeValue::String(s) => s,
            _ => None,
        }
    }
}

/// Collaborator that loads libraries and calls into them.
pub trait NativeInvoker: Send + Sync {
    fn parse_signature(&self, text: &str) -> Result<Signature, NativeLibraryError> {
        Signature::parse(text)
    }

    /// Load the first loadable candidate file name, trying `search_paths` before the
    /// system loader path.
    fn load_library(
        &self,
        name: &str,
        candidates: &[&str],
        search_paths: &[PathBuf],
        flavor: LibraryFlavor,
    ) -> Result<LoadedLibrary, NativeLibraryError>;

    fn lookup(&self, library: &LoadedLibrary, symbol: &str) -> Result<NativeSymbol, NativeLibraryError>;

    /// # Safety
    /// `symbol` must have the C type described by `signature`, and pointer arguments must
    /// be valid for whatever the callee does with them.
    unsafe fn invoke(
        &self,
        symbol: NativeSymbol,
        signature: &Signature,
        args: &mut [NativeArg<'_>],
    ) -> Result<NativeValue, NativeLibraryError>;
}

/// `dlopen`-based invoker for integer/pointer signatures of up to six arguments.
#[derive(Debug, Default)]
pub struct DlopenInvoker;

pub const MAX_ARITY: usize = 6;

impl DlopenInvoker {
    pub fn new() -> Self {
        Self
    }

    fn candidate_paths(candidates: &[&str], search_paths: &[PathBuf]) -> Vec<std::ffi::OsString> {
        let mut paths = Vec::new();
        for dir in search_paths {
            for file in candidates {
                paths.push(dir.join(file).into_os_string());
            }
        }
        paths.extend(candidates.iter().map(std::ffi::OsString::from));
        paths
    }
}

type Word = usize;

impl NativeInvoker for DlopenInvoker {
    fn load_library(
        &self,
        name: &str,
        candidates: &[&str],
        search_paths: &[PathBuf],
        flavor: LibraryFlavor,
    ) -> Result<LoadedLibrary, NativeLibraryError> {
        if flavor == LibraryFlavor::Bitcode {
            return Err(NativeLibraryError::CannotLoad {
                library: name.to_string(),
                reason: "bitcode libraries need a bitcode-capable invoker".to_string(),
                hint: None,
            });
        }

        let mut last_error = String::from("no candidate file names");
        for path in Self::candidate_paths(candidates, search_paths) {
            // SAFETY: loading runs the library's initializers; the candidates are well-known
            // system libraries.
            match unsafe { libloading::Library::new(&path) } {
                Ok(lib) => {
                    debug!("Loaded native library {} from {:?}", name, path);
                    return Ok(LoadedLibrary::new(
                        name,
                        path.to_string_lossy().into_owned(),
                        Box::new(lib),
                    ));
                }
                Err(e) => {
                    debug!("Candidate {:?} for {} failed: {}", path, name, e);
                    last_error = e.to_string();
                }
            }
        }
        warn!("Native library {} not found: {}", name, last_error);
        Err(NativeLibraryError::CannotLoad {
            library: name.to_string(),
            reason: last_error,
            hint: None,
        })
    }

    fn lookup(&self, library: &LoadedLibrary, symbol: &str) -> Result<NativeSymbol, NativeLibraryError> {
        let not_found = || NativeLibraryError::SymbolNotFound {
            library: library.name().to_string(),
            symbol: symbol.to_string(),
        };
        let lib = library
            .handle::<libloading::Library>()
            .ok_or_else(not_found)?;
        // SAFETY: the symbol is only read as an address here; its type is asserted by the
        // signature at call time.
        let sym: libloading::Symbol<'_, *const ()> =
            unsafe { lib.get(symbol.as_bytes()) }.map_err(|_| not_found())?;
        let address = *sym as usize;
        if address == 0 {
            return Err(not_found());
        }
        Ok(NativeSymbol { address })
    }

    unsafe fn invoke(
        &self,
        symbol: NativeSymbol,
        signature: &Signature,
        args: &mut [NativeArg<'_>],
    ) -> Result<NativeValue, NativeLibraryError> {
        let unsupported = || NativeLibraryError::UnsupportedSignature(signature.to_string());
        if args.len() != signature.arity() {
            return Err(NativeLibraryError::BadSignature {
                signature: signature.to_string(),
                reason: format!("expected {} arguments, got {}", signature.arity(), args.len()),
            });
        }
        if signature.arity() > MAX_ARITY
            || !signature.params().iter().all(|p| p.is_integer_class())
            || matches!(signature.ret(), NativeType::Float)
        {
            return Err(unsupported());
        }

        let mut words: [Word; MAX_ARITY] = [0; MAX_ARITY];
        for (slot, (arg, param)) in words.iter_mut().zip(args.iter().zip(signature.params())) {
            *slot = match (arg, param) {
                (NativeArg::Int(v), ParamType::Scalar(t)) => narrow_arg(*v, *t),
                (arg, _) => arg.as_word(),
            };
        }

        let addr = symbol.address;
        if signature.ret() == NativeType::Double {
            let raw = call_double(addr, signature.arity(), &words);
            return Ok(NativeValue::Double(raw));
        }

        let raw = call_word(addr, signature.arity(), &words);
        Ok(match signature.ret() {
            NativeType::Void => NativeValue::Void,
            NativeType::Sint8 => NativeValue::Int(raw as u8 as i8 as i64),
            NativeType::Uint8 => NativeValue::Int(raw as u8 as i64),
            NativeType::Sint16 => NativeValue::Int(raw as u16 as i16 as i64),
            NativeType::Uint16 => NativeValue::Int(raw as u16 as i64),
            NativeType::Sint32 => NativeValue::Int(raw as u32 as i32 as i64),
            NativeType::Uint32 => NativeValue::Int(raw as u32 as i64),
            NativeType::Sint64 | NativeType::Uint64 => NativeValue::Int(raw as i64),
            NativeType::Pointer => NativeValue::Pointer(raw),
            NativeType::String => {
                if raw == 0 {
                    NativeValue::String(None)
                } else {
                    let s = CStr::from_ptr(raw as *const libc::c_char);
                    NativeValue::String(Some(s.to_string_lossy().into_owned()))
                }
            }
            NativeType::Float | NativeType::Double => return Err(unsupported()),
        })
    }
}

/// Sign- or zero-extend an integer argument the way the C ABI expects its register.
fn narrow_arg(value: i64, ty: NativeType) -> Word {
    match ty {
        NativeType::Sint8 => value as i8 as isize as Word,
        NativeType::Uint8 => value as u8 as Word,
        NativeType::Sint16 => value as i16 as isize as Word,
        NativeType::Uint16 => value as u16 as Word,
        NativeType::Sint32 => value as i32 as isize as Word,
        NativeType::Uint32 => value as u32 as Word,
        _ => value as Word,
    }
}

unsafe fn call_word(addr: usize, arity: usize, w: &[Word; MAX_ARITY]) -> Word {
    match arity {
        0 => std::mem::transmute::<usize, extern "C" fn() -> Word>(addr)(),
        1 => std::mem::transmute::<usize, extern "C" fn(Word) -> Word>(addr)(w[0]),
        2 => std::mem::transmute::<usize, extern "C" fn(Word, Word) -> Word>(addr)(w[0], w[1]),
        3 => std::mem::transmute::<usize, extern "C" fn(Word, Word, Word) -> Word>(addr)(
            w[0], w[1], w[2],
        ),
        4 => std::mem::transmute::<usize, extern "C" fn(Word, Word, Word, Word) -> Word>(addr)(
            w[0], w[1], w[2], w[3],
        ),
        5 => std::mem::transmute::<usize, extern "C" fn(Word, Word, Word, Word, Word) -> Word>(
            addr,
        )(w[0], w[1], w[2], w[3], w[4]),
        _ => std::mem::transmute::<
            usize,
            extern "C" fn(Word, Word, Word, Word, Word, Word) -> Word,
        >(addr)(w[0], w[1], w[2], w[3], w[4], w[5]),
    }
}

unsafe fn call_double(addr: usize, arity: usize, w: &[Word; MAX_ARITY]) -> f64 {
    match arity {
        0 => std::mem::transmute::<usize, extern "C" fn() -> f64>(addr)(),
        1 => std::mem::transmute::<usize, extern "C" fn(Word) -> f64>(addr)(w[0]),
        2 => std::mem::transmute::<usize, extern "C" fn(Word, Word) -> f64>(addr)(w[0], w[1]),
        _ => std::mem::transmute::<usize, extern "C" fn(Word, Word, Word, Word, Word, Word) -> f64>(
            addr,
        )(w[0], w[1], w[2], w[3], w[4], w[5]),
    }
}

/// Owned C string argument.
pub fn c_string(bytes: &[u8]) -> Result<CString, NativeLibraryError> {
    CString::new(bytes).map_err(|_| NativeLibraryError::BadSignature {
        signature: "STRING".to_string(),
        reason: "embedded NUL in string argument".to_string(),
    })
}
