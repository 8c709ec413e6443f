use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which concrete backend a context is built on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Native,
    Emulated,
    ImageBuildtime,
}

impl BackendKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "native" => Some(BackendKind::Native),
            "java" | "emulated" => Some(BackendKind::Emulated),
            "image_buildtime" | "image-buildtime" | "hybrid" => Some(BackendKind::ImageBuildtime),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Emulated => write!(f, "emulated"),
            BackendKind::ImageBuildtime => write!(f, "image_buildtime"),
        }
    }
}

/// Support layer configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupportConfig {
    pub backend: BackendKind,
    /// Wrap the backend in the logging decorator.
    pub logging: bool,
    /// Host policy switch for loading native libraries at all.
    pub native_access: bool,
    /// Extra directories searched before the system loader path.
    pub library_search_paths: Vec<PathBuf>,
    pub finalizer_poll_interval_ms: u64,
    /// Initial umask of the emulated backend.
    pub emulated_umask: u32,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Native,
            logging: false,
            native_access: true,
            library_search_paths: Vec::new(),
            finalizer_poll_interval_ms: 100,
            emulated_umask: 0o022,
        }
    }
}

/// Errors surfaced by every capability-interface operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PosixSupportError {
    #[error("[Errno {code}] {message}{}", format_filenames(.filename1, .filename2))]
    Posix {
        code: i32,
        message: String,
        filename1: Option<String>,
        filename2: Option<String>,
    },

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Invalid UNIX socket path")]
    InvalidUnixSocketPath,

    #[error("getaddrinfo error {code}: {message}")]
    GetAddrInfo { code: i32, message: String },

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Native library error: {0}")]
    NativeLibrary(#[from] NativeLibraryError),

    #[error("Emulated resources leaked into the image: fds={fds:?}, dir_streams={dir_streams}")]
    LeakedResources { fds: Vec<i32>, dir_streams: usize },
}

fn format_filenames(filename1: &Option<String>, filename2: &Option<String>) -> String {
    match (filename1, filename2) {
        (Some(a), Some(b)) => format!(": '{}' -> '{}'", a, b),
        (Some(a), None) => format!(": '{}'", a),
        _ => String::new(),
    }
}

impl PosixSupportError {
    pub fn posix(code: i32, message: impl Into<String>) -> Self {
        PosixSupportError::Posix {
            code,
            message: message.into(),
            filename1: None,
            filename2: None,
        }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        PosixSupportError::UnsupportedFeature(feature.into())
    }

    /// Attach the path(s) an operation failed on; no-op for non-errno errors.
    pub fn with_filenames(self, first: Option<String>, second: Option<String>) -> Self {
        match self {
            PosixSupportError::Posix {
                code,
                message,
                filename1,
                filename2,
            } => PosixSupportError::Posix {
                code,
                message,
                filename1: first.or(filename1),
                filename2: second.or(filename2),
            },
            other => other,
        }
    }

    pub fn with_filename(self, filename: impl Into<String>) -> Self {
        self.with_filenames(Some(filename.into()), None)
    }

    /// errno carried by a POSIX-style error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            PosixSupportError::Posix { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<nix::errno::Errno> for PosixSupportError {
    fn from(err: nix::errno::Errno) -> Self {
        PosixSupportError::posix(err as i32, err.desc())
    }
}

impl From<std::io::Error> for PosixSupportError {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => PosixSupportError::posix(code, nix::errno::Errno::from_raw(code).desc()),
            None => PosixSupportError::posix(libc::EIO, err.to_string()),
        }
    }
}

/// Failures of the native library / function dispatch layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeLibraryError {
    #[error("Cannot load native library '{library}': {reason}{}", hint.as_ref().map(|h| format!(" ({})", h)).unwrap_or_default())]
    CannotLoad {
        library: String,
        reason: String,
        hint: Option<String>,
    },

    #[error("Cannot load native library: native access is disabled by host policy")]
    NativeAccessDisabled,

    #[error("Symbol '{symbol}' not found in '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    #[error("Malformed signature '{signature}': {reason}")]
    BadSignature { signature: String, reason: String },

    #[error("Signature '{0}' cannot be invoked by this invoker")]
    UnsupportedSignature(String),

    #[error("Native library '{0}' is not available")]
    Unavailable(String),
}

/// Errors raised while loading or validating [`SupportConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Configuration error: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Constants(#[from] crate::config::constants::ConstantsError),
}

/// Result type alias for capability-interface operations
pub type Result<T> = std::result::Result<T, PosixSupportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_error_display_with_filenames() {
        let err = PosixSupportError::posix(2, "No such file or directory")
            .with_filenames(Some("a".into()), Some("b".into()));
        assert_eq!(
            err.to_string(),
            "[Errno 2] No such file or directory: 'a' -> 'b'"
        );
        assert_eq!(err.errno(), Some(2));
    }

    #[test]
    fn test_with_filename_ignores_non_errno() {
        let err = PosixSupportError::InvalidAddress.with_filename("x");
        assert_eq!(err, PosixSupportError::InvalidAddress);
        assert_eq!(err.errno(), None);
    }

    #[test]
    fn test_from_errno_and_io() {
        let err: PosixSupportError = nix::errno::Errno::EBADF.into();
        assert_eq!(err.errno(), Some(libc::EBADF));

        let io = std::io::Error::from_raw_os_error(libc::ENOENT);
        let err: PosixSupportError = io.into();
        assert_eq!(err.errno(), Some(libc::ENOENT));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("Native"), Some(BackendKind::Native));
        assert_eq!(BackendKind::parse("java"), Some(BackendKind::Emulated));
        assert_eq!(BackendKind::parse("hybrid"), Some(BackendKind::ImageBuildtime));
        assert_eq!(BackendKind::parse("llvm"), None);
    }

    #[test]
    fn test_cannot_load_display_includes_hint() {
        let err = NativeLibraryError::CannotLoad {
            library: "libz".into(),
            reason: "not found".into(),
            hint: Some("use the emulated backend".into()),
        };
        assert!(err.to_string().contains("(use the emulated backend)"));
    }
}
