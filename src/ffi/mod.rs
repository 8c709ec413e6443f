//! Native library and function dispatch
//!
//! - [`signature`]: textual call signatures (`"(SINT32, [UINT8]): SINT64"`)
//! - [`invoker`]: the invoker collaborator and its `dlopen` implementation
//! - [`functions`]: one enum of entry points per supporting library
//! - [`library`]: per-context library/function cache with load policy
//! - [`pointer`], [`finalizer`]: native pointer release, explicit and deferred
//! - [`modules`]: zlib, bz2, lzma and ctypes helpers

pub mod finalizer;
pub mod functions;
pub mod invoker;
pub mod library;
pub mod modules;
pub mod pointer;
pub mod signature;

pub use functions::NativeFunction;
pub use invoker::{DlopenInvoker, NativeArg, NativeInvoker, NativeValue};
pub use library::{LibraryContext, LoadPolicy, NativeLibrary};
pub use pointer::{NativeAllocation, NativePointer};
