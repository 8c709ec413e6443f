//! Platform constant registry
//!
//! Maps symbolic POSIX constant names (`O_RDONLY`, `AF_INET`, `EAGAIN`, ...) to the values
//! used by one target platform. Every table is immutable and static; the host table is
//! chosen by `cfg(target_os)` and validated against [`REQUIRED_CONSTANTS`] before the first
//! capability call is made.

mod darwin;
mod linux;
mod windows;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Target platforms with a constant table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

impl Platform {
    /// Platform this crate was compiled for, if it has a table.
    pub fn host() -> Option<Self> {
        if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Platform::Darwin)
        } else if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::Windows => "windows",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "linux" => Some(Platform::Linux),
            "darwin" | "macos" => Some(Platform::Darwin),
            "windows" | "win32" => Some(Platform::Windows),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a single constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstantValue {
    Int(i64),
    Bool(bool),
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

pub(crate) type ConstantTable = &'static [(&'static str, ConstantValue)];

/// Errors raised while selecting or validating a constant table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstantsError {
    #[error("No POSIX constant table for target platform '{0}'")]
    UnknownPlatform(String),

    #[error("Constant table for {platform} is missing required constants: {missing:?}")]
    Incomplete {
        platform: Platform,
        missing: Vec<&'static str>,
    },
}

/// Constants every capability-interface caller may rely on, on every platform.
pub const REQUIRED_CONSTANTS: &[&str] = &[
    "O_RDONLY",
    "O_WRONLY",
    "O_RDWR",
    "O_CREAT",
    "O_EXCL",
    "O_TRUNC",
    "O_APPEND",
    "SEEK_SET",
    "SEEK_CUR",
    "SEEK_END",
    "F_OK",
    "R_OK",
    "W_OK",
    "X_OK",
    "S_IFMT",
    "S_IFDIR",
    "S_IFREG",
    "S_IFCHR",
    "AF_UNSPEC",
    "AF_INET",
    "AF_INET6",
    "AF_UNIX",
    "SOCK_STREAM",
    "SOCK_DGRAM",
    "SOL_SOCKET",
    "SO_REUSEADDR",
    "IPPROTO_TCP",
    "IPPROTO_UDP",
    "SHUT_RD",
    "SHUT_WR",
    "SHUT_RDWR",
    "AI_PASSIVE",
    "AI_CANONNAME",
    "AI_NUMERICHOST",
    "NI_NUMERICHOST",
    "NI_NUMERICSERV",
    "NI_MAXHOST",
    "NI_MAXSERV",
    "EAI_NONAME",
    "EAI_FAMILY",
    "EAI_SERVICE",
    "EPERM",
    "ENOENT",
    "EINTR",
    "EIO",
    "EBADF",
    "EAGAIN",
    "ENOMEM",
    "EACCES",
    "EEXIST",
    "ENOTDIR",
    "EISDIR",
    "EINVAL",
    "ENOSPC",
    "ESPIPE",
    "EPIPE",
    "ENOSYS",
    "ENOTEMPTY",
    "HAVE_FUTIMENS",
    "HAVE_UTIMENSAT",
];

/// Resolved constant table for one platform.
pub struct PosixConstants {
    platform: Platform,
    table: ConstantTable,
    index: HashMap<&'static str, ConstantValue>,
}

static LINUX: Lazy<PosixConstants> = Lazy::new(|| PosixConstants::build(Platform::Linux, linux::TABLE));
static DARWIN: Lazy<PosixConstants> = Lazy::new(|| PosixConstants::build(Platform::Darwin, darwin::TABLE));
static WINDOWS: Lazy<PosixConstants> =
    Lazy::new(|| PosixConstants::build(Platform::Windows, windows::TABLE));

impl PosixConstants {
    fn build(platform: Platform, table: ConstantTable) -> Self {
        let index = table.iter().copied().collect();
        Self {
            platform,
            table,
            index,
        }
    }

    /// Table for an explicit platform.
    pub fn for_platform(platform: Platform) -> &'static PosixConstants {
        match platform {
            Platform::Linux => &LINUX,
            Platform::Darwin => &DARWIN,
            Platform::Windows => &WINDOWS,
        }
    }

    /// Table for the compilation target, validated for completeness.
    pub fn host() -> Result<&'static PosixConstants, ConstantsError> {
        let platform = Platform::host()
            .ok_or_else(|| ConstantsError::UnknownPlatform(std::env::consts::OS.to_string()))?;
        let constants = Self::for_platform(platform);
        constants.assert_complete()?;
        Ok(constants)
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn get(&self, name: &str) -> Option<ConstantValue> {
        self.index.get(name).copied()
    }

    /// Integer value of `name`, `None` when absent or boolean.
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(ConstantValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    /// Integer value of a constant listed in [`REQUIRED_CONSTANTS`].
    ///
    /// Panics if the constant is missing, which `assert_complete` rules out for required names.
    pub fn require(&self, name: &str) -> i32 {
        match self.int(name) {
            Some(v) => v as i32,
            None => panic!("constant {} is not defined for {}", name, self.platform),
        }
    }

    /// Boolean capability flag, `false` when absent.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(ConstantValue::Bool(true)))
    }

    /// Reverse lookup: first constant whose name starts with `prefix` and has `value`.
    pub fn name_of(&self, prefix: &str, value: i64) -> Option<&'static str> {
        self.table
            .iter()
            .find(|(name, v)| name.starts_with(prefix) && *v == ConstantValue::Int(value))
            .map(|(name, _)| *name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, ConstantValue)> + '_ {
        self.table.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Verify that every name in [`REQUIRED_CONSTANTS`] is defined.
    pub fn assert_complete(&self) -> Result<(), ConstantsError> {
        let missing: Vec<&'static str> = REQUIRED_CONSTANTS
            .iter()
            .copied()
            .filter(|name| !self.index.contains_key(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConstantsError::Incomplete {
                platform: self.platform,
                missing,
            })
        }
    }
}

impl fmt::Debug for PosixConstants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosixConstants")
            .field("platform", &self.platform)
            .field("len", &self.table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tables_complete() {
        for platform in [Platform::Linux, Platform::Darwin, Platform::Windows] {
            let table = PosixConstants::for_platform(platform);
            assert!(
                table.assert_complete().is_ok(),
                "{} table incomplete: {:?}",
                platform,
                table.assert_complete()
            );
        }
    }

    #[test]
    fn test_platform_differences() {
        let linux = PosixConstants::for_platform(Platform::Linux);
        let darwin = PosixConstants::for_platform(Platform::Darwin);
        assert_eq!(linux.require("O_CREAT"), 0o100);
        assert_eq!(darwin.require("O_CREAT"), 0x200);
        assert_eq!(linux.int("SEEK_DATA"), Some(3));
        assert_eq!(darwin.int("SEEK_DATA"), Some(4));
        assert_eq!(linux.require("EAGAIN"), 11);
        assert_eq!(darwin.require("EAGAIN"), 35);
    }

    #[test]
    fn test_no_duplicate_names() {
        for platform in [Platform::Linux, Platform::Darwin, Platform::Windows] {
            let table = PosixConstants::for_platform(platform);
            assert_eq!(table.index.len(), table.len(), "duplicates in {}", platform);
        }
    }

    #[test]
    fn test_flags_and_reverse_lookup() {
        let linux = PosixConstants::for_platform(Platform::Linux);
        assert!(linux.flag("HAVE_UTIMENSAT"));
        assert!(!PosixConstants::for_platform(Platform::Windows).flag("HAVE_UTIMENSAT"));
        assert_eq!(linux.name_of("E", 2), Some("ENOENT"));
        assert_eq!(linux.int("HAVE_FUTIMENS"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_host_table_matches_libc() {
        let host = PosixConstants::host().unwrap();
        assert_eq!(host.platform(), Platform::Linux);
        assert_eq!(host.require("O_CREAT"), libc::O_CREAT);
        assert_eq!(host.require("O_APPEND"), libc::O_APPEND);
        assert_eq!(host.require("AF_INET6"), libc::AF_INET6);
        assert_eq!(host.require("SOL_SOCKET"), libc::SOL_SOCKET);
        assert_eq!(host.require("EAI_NONAME"), libc::EAI_NONAME);
        assert_eq!(host.require("ENOTEMPTY"), libc::ENOTEMPTY);
        assert_eq!(host.int("O_CLOEXEC"), Some(libc::O_CLOEXEC as i64));
        assert_eq!(host.int("AT_FDCWD"), Some(libc::AT_FDCWD as i64));
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("macOS"), Some(Platform::Darwin));
        assert_eq!(Platform::parse("linux"), Some(Platform::Linux));
        assert_eq!(Platform::parse("plan9"), None);
    }
}
