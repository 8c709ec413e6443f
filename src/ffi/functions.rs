//! Enumerated native entry points, one enum per supporting library.

use std::fmt;
use std::hash::Hash;

/// A fixed native entry point: symbol name plus call signature.
pub trait NativeFunction: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Display name of the library, used in errors and logs.
    const LIBRARY: &'static str;
    /// File names tried in order.
    const CANDIDATES: &'static [&'static str];
    /// Remediation shown when a required library fails to load.
    const HINT: Option<&'static str>;

    fn all() -> &'static [Self];
    fn symbol(self) -> &'static str;
    fn signature(self) -> &'static str;
    fn index(self) -> usize;
}

macro_rules! native_functions {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            library: $library:expr,
            candidates: [$($candidate:expr),* $(,)?],
            hint: $hint:expr,
            functions: {
                $($variant:ident => ($symbol:expr, $signature:expr)),* $(,)?
            }
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),*
        }

        impl NativeFunction for $name {
            const LIBRARY: &'static str = $library;
            const CANDIDATES: &'static [&'static str] = &[$($candidate),*];
            const HINT: Option<&'static str> = $hint;

            fn all() -> &'static [Self] {
                &[$($name::$variant),*]
            }

            fn symbol(self) -> &'static str {
                match self {
                    $($name::$variant => $symbol),*
                }
            }

            fn signature(self) -> &'static str {
                match self {
                    $($name::$variant => $signature),*
                }
            }

            fn index(self) -> usize {
                self as usize
            }
        }
    };
}

native_functions! {
    /// Core POSIX calls dispatched through the invoker by the native backend.
    pub enum PosixNativeFunction {
        library: "libc",
        candidates: ["libc.so.6", "libc.so", "libc.dylib", "/usr/lib/libSystem.B.dylib"],
        hint: Some("set \"backend\": \"emulated\" to run without native access"),
        functions: {
            Getpid => ("getpid", "(): SINT32"),
            Getppid => ("getppid", "(): SINT32"),
            Getuid => ("getuid", "(): UINT32"),
            Geteuid => ("geteuid", "(): UINT32"),
            Getgid => ("getgid", "(): UINT32"),
            Getegid => ("getegid", "(): UINT32"),
            Umask => ("umask", "(UINT32): UINT32"),
            Isatty => ("isatty", "(SINT32): SINT32"),
            Sysconf => ("sysconf", "(SINT32): SINT64"),
            Strerror => ("strerror", "(SINT32): STRING"),
        }
    }
}

native_functions! {
    pub enum CryptNativeFunction {
        library: "libcrypt",
        candidates: ["libcrypt.so.1", "libcrypt.so.2", "libcrypt.so", "libc.dylib"],
        hint: None,
        functions: {
            Crypt => ("crypt", "(STRING, STRING): STRING"),
        }
    }
}

native_functions! {
    pub enum ZlibNativeFunction {
        library: "libz",
        candidates: ["libz.so.1", "libz.so", "libz.1.dylib", "libz.dylib"],
        hint: None,
        functions: {
            ZlibVersion => ("zlibVersion", "(): STRING"),
            Crc32 => ("crc32", "(UINT64, [UINT8], UINT32): UINT64"),
            Adler32 => ("adler32", "(UINT64, [UINT8], UINT32): UINT64"),
        }
    }
}

native_functions! {
    pub enum Bz2NativeFunction {
        library: "libbz2",
        candidates: ["libbz2.so.1.0", "libbz2.so.1", "libbz2.so", "libbz2.dylib"],
        hint: None,
        functions: {
            Version => ("BZ2_bzlibVersion", "(): STRING"),
        }
    }
}

native_functions! {
    pub enum LzmaNativeFunction {
        library: "liblzma",
        candidates: ["liblzma.so.5", "liblzma.so", "liblzma.5.dylib", "liblzma.dylib"],
        hint: None,
        functions: {
            VersionString => ("lzma_version_string", "(): STRING"),
            VersionNumber => ("lzma_version_number", "(): UINT32"),
        }
    }
}

native_functions! {
    /// Heap helpers backing ctypes-style raw allocations.
    pub enum CtypesNativeFunction {
        library: "libc",
        candidates: ["libc.so.6", "libc.so", "libc.dylib", "/usr/lib/libSystem.B.dylib"],
        hint: None,
        functions: {
            Malloc => ("malloc", "(UINT64): POINTER"),
            Calloc => ("calloc", "(UINT64, UINT64): POINTER"),
            Free => ("free", "(POINTER): VOID"),
            Strlen => ("strlen", "(POINTER): UINT64"),
            Memset => ("memset", "(POINTER, SINT32, UINT64): POINTER"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::signature::Signature;

    fn check_all<F: NativeFunction>() {
        for (i, f) in F::all().iter().enumerate() {
            assert_eq!(f.index(), i, "{:?}", f);
            assert!(
                Signature::parse(f.signature()).is_ok(),
                "bad signature for {:?}: {}",
                f,
                f.signature()
            );
        }
        assert!(!F::CANDIDATES.is_empty());
    }

    #[test]
    fn test_all_signatures_parse() {
        check_all::<PosixNativeFunction>();
        check_all::<CryptNativeFunction>();
        check_all::<ZlibNativeFunction>();
        check_all::<Bz2NativeFunction>();
        check_all::<LzmaNativeFunction>();
        check_all::<CtypesNativeFunction>();
    }

    #[test]
    fn test_symbol_names() {
        assert_eq!(ZlibNativeFunction::Crc32.symbol(), "crc32");
        assert_eq!(Bz2NativeFunction::Version.symbol(), "BZ2_bzlibVersion");
        assert_eq!(PosixNativeFunction::LIBRARY, "libc");
        assert!(PosixNativeFunction::HINT.is_some());
    }
}
