//! posix-support: backend-agnostic access to operating-system facilities
//!
//! File I/O, directories, processes, sockets, memory maps, the user database and named
//! semaphores behind one capability interface, with interchangeable backends.
//!
//! # Architecture
//!
//! ## Capability interface ([`core`])
//! - [`core::support`]: the [`PosixSupport`] trait, universal socket addresses and
//!   name-resolution cursors
//! - [`core::types`], [`core::path`]: values crossing the interface
//!
//! ## Backends ([`backend`])
//! - [`backend::native`]: libc, with hot entry points dispatched through [`ffi`]
//! - [`backend::emulated`]: std-only emulation with an in-process descriptor table
//! - [`backend::hybrid`]: emulated while an image is built, native afterwards
//! - [`backend::logging`]: decorator recording every call
//!
//! ## Native dispatch ([`ffi`])
//! - Library loading, signature parsing, per-context function caches
//! - Native pointers with explicit release and a background finalizer
//!
//! ## Configuration & errors ([`config`])
//! - [`config::types`]: [`SupportConfig`], [`PosixSupportError`], [`NativeLibraryError`]
//! - [`config::constants`]: per-platform constant tables
//!
//! ## Observability ([`observability`])
//! - `env_logger` setup and log targets
//!
//! # Example
//!
//! ```no_run
//! use posix_support::{create_backend, SupportConfig, PosixPath, DEFAULT_DIR_FD};
//!
//! let posix = create_backend(&SupportConfig::default())?;
//! let path = posix.create_path_from_string("/etc/hostname").unwrap();
//! let st = posix.fstatat(DEFAULT_DIR_FD, &path, true)?;
//! println!("{} bytes", st.size);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Capability interface
pub mod core;

// Backends
pub mod backend;

// Native library dispatch
pub mod ffi;

// Configuration, errors, constants
pub mod config;

// Observability
pub mod observability;

// CLI entrypoint for the posix-probe binary.
pub mod cli;

pub use backend::{create_backend, create_image_buildtime_backend, BuildPhase};
pub use config::constants::{Platform, PosixConstants};
pub use config::types::{
    BackendKind, ConfigError, NativeLibraryError, PosixSupportError, Result, SupportConfig,
};
pub use core::path::PosixPath;
pub use core::support::{AddrInfoCursor, PosixSupport, UniversalSockAddr};
pub use core::types::DEFAULT_DIR_FD;
