//! Backend-independent core: the capability interface and the values that cross it.
//!
//! Built-ins only ever see `Arc<dyn PosixSupport>`, which lets the logging decorator
//! and the image-build-time composer be inserted without the caller noticing.

pub mod path;
pub mod support;
pub mod types;

pub use path::PosixPath;
pub use support::{AddrInfoCursor, PosixSupport, UniversalSockAddr};
