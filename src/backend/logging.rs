//! Logging decorator
//!
//! Wraps any backend and records every call on the `posix_support::backend::logging`
//! target: `name(args)` on entry, then `name -> return value` or `name -> throw error`.
//! Ordinary operations log at `Debug`. Supporting calls (backend name, `strerror`, path
//! conversions) log at `Trace`, which also adds the top frames of the caller's stack.
//! Results and errors are passed through untouched.

use crate::config::types::{PosixSupportError, Result};
use crate::core::path::PosixPath;
use crate::core::support::{AddrInfoCursor, PosixSupport, UniversalSockAddr};
use crate::core::types::{
    AcceptResult, Buffer, DirEntry, DirStream, ForkExecRequest, HostEnv, Inet4SockAddr,
    Inet6SockAddr, MmapHandle, OpenPtyResult, PwdResult, RecvfromResult, SelectResult,
    SemHandle, StatResult, StatvfsResult, Timespec, Timeval, UnameResult, UnixSockAddr,
};
use log::{log, log_enabled, Level};
use std::backtrace::Backtrace;
use std::sync::Arc;

const BYTES_PREVIEW: usize = 32;
const STACK_FRAMES: usize = 3;

/// Rendering of a value in a log record.
pub trait LogValue {
    fn log_value(&self) -> String;
}

impl<T: LogValue + ?Sized> LogValue for &T {
    fn log_value(&self) -> String {
        (**self).log_value()
    }
}

impl<T: LogValue + ?Sized> LogValue for &mut T {
    fn log_value(&self) -> String {
        (**self).log_value()
    }
}

impl<T: LogValue + ?Sized> LogValue for Box<T> {
    fn log_value(&self) -> String {
        (**self).log_value()
    }
}

impl<T: LogValue> LogValue for Option<T> {
    fn log_value(&self) -> String {
        match self {
            Some(value) => value.log_value(),
            None => "None".to_string(),
        }
    }
}

impl<A: LogValue, B: LogValue> LogValue for (A, B) {
    fn log_value(&self) -> String {
        format!("({}, {})", self.0.log_value(), self.1.log_value())
    }
}

impl<T: LogValue> LogValue for [T; 2] {
    fn log_value(&self) -> String {
        list(self)
    }
}

fn list<T: LogValue>(items: &[T]) -> String {
    let rendered: Vec<String> = items.iter().map(LogValue::log_value).collect();
    format!("[{}]", rendered.join(", "))
}

fn bytes_preview(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(BYTES_PREVIEW)];
    let text: String = shown.iter().flat_map(|b| std::ascii::escape_default(*b)).map(char::from).collect();
    if bytes.len() > BYTES_PREVIEW {
        format!("b'{}'... ({} bytes)", text, bytes.len())
    } else {
        format!("b'{}'", text)
    }
}

macro_rules! log_value_display {
    ($($ty:ty),*) => {
        $(impl LogValue for $ty {
            fn log_value(&self) -> String {
                self.to_string()
            }
        })*
    };
}

macro_rules! log_value_debug {
    ($($ty:ty),*) => {
        $(impl LogValue for $ty {
            fn log_value(&self) -> String {
                format!("{:?}", self)
            }
        })*
    };
}

macro_rules! log_value_list {
    ($($ty:ty),*) => {
        $(impl LogValue for $ty {
            fn log_value(&self) -> String {
                list(self)
            }
        })*
    };
}

log_value_display!(i32, i64, u8, u32, u64, usize, bool);
log_value_list!([i32], Vec<i64>, [PosixPath], Vec<PwdResult>);
log_value_debug!(
    (),
    StatResult,
    StatvfsResult,
    UnameResult,
    SelectResult,
    DirStream,
    DirEntry,
    OpenPtyResult,
    MmapHandle,
    PwdResult,
    AcceptResult,
    RecvfromResult,
    SemHandle,
    Inet4SockAddr,
    Inet6SockAddr,
    UnixSockAddr,
    ForkExecRequest,
    Timeval,
    Timespec,
    dyn UniversalSockAddr + '_,
    dyn AddrInfoCursor + '_
);

impl LogValue for str {
    fn log_value(&self) -> String {
        format!("'{}'", self)
    }
}

impl LogValue for String {
    fn log_value(&self) -> String {
        self.as_str().log_value()
    }
}

impl LogValue for PosixPath {
    fn log_value(&self) -> String {
        format!("'{}'", self)
    }
}

impl LogValue for [u8] {
    fn log_value(&self) -> String {
        bytes_preview(self)
    }
}

impl LogValue for Vec<u8> {
    fn log_value(&self) -> String {
        bytes_preview(self)
    }
}

impl LogValue for Buffer {
    fn log_value(&self) -> String {
        format!("Buffer{{{}}}", bytes_preview(self.as_slice()))
    }
}

fn error_value(err: &PosixSupportError) -> String {
    match err {
        PosixSupportError::Posix {
            code,
            message,
            filename1,
            filename2,
        } => format!(
            "errno={}, msg={}, filename1={}, filename2={}",
            code,
            message,
            filename1.log_value(),
            filename2.log_value()
        ),
        other => other.to_string(),
    }
}

/// Up to `STACK_FRAMES` caller frames, skipping this module and the backtrace machinery.
fn caller_frames() -> Vec<String> {
    let trace = Backtrace::force_capture().to_string();
    trace
        .lines()
        .map(str::trim)
        .filter(|line| line.split_once(": ").map_or(false, |(n, _)| n.parse::<usize>().is_ok()))
        .filter_map(|line| line.split_once(": ").map(|(_, symbol)| symbol))
        .filter(|symbol| !symbol.contains("backend::logging") && !symbol.starts_with("std::backtrace"))
        .take(STACK_FRAMES)
        .map(|symbol| format!("    .{}", symbol))
        .collect()
}

fn enter(level: Level, name: &str, args: impl FnOnce() -> Vec<String>) {
    if !log_enabled!(level) {
        return;
    }
    log!(level, "{}({})", name, args().join(", "));
    if log_enabled!(Level::Trace) {
        for frame in caller_frames() {
            log!(Level::Trace, "{}", frame);
        }
    }
}

fn exit<T: LogValue + ?Sized>(level: Level, name: &str, value: &T) {
    if log_enabled!(level) {
        log!(level, "{} -> return {}", name, value.log_value());
    }
}

fn throw(level: Level, name: &str, err: &PosixSupportError) {
    if log_enabled!(level) {
        log!(level, "{} -> throw {}", name, error_value(err));
    }
}

pub struct LoggingPosixSupport {
    delegate: Arc<dyn PosixSupport>,
}

impl LoggingPosixSupport {
    pub fn new(delegate: Arc<dyn PosixSupport>) -> Self {
        Self { delegate }
    }

    /// Whether entry/exit records are currently emitted.
    pub fn is_enabled() -> bool {
        log_enabled!(Level::Debug)
    }

    pub fn delegate(&self) -> &Arc<dyn PosixSupport> {
        &self.delegate
    }
}

/// Forward fallible operations, logging arguments and the outcome.
macro_rules! logged {
    ($level:ident; $(fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> Result<$ret:ty>;)*) => {
        $(
            fn $name(&self $(, $arg: $ty)*) -> Result<$ret> {
                enter(Level::$level, stringify!($name), || vec![$($arg.log_value()),*]);
                let result = self.delegate.$name($($arg),*);
                match &result {
                    Ok(value) => exit(Level::$level, stringify!($name), value),
                    Err(err) => throw(Level::$level, stringify!($name), err),
                }
                result
            }
        )*
    };
}

/// Forward operations without an error channel.
macro_rules! logged_plain {
    ($level:ident; $(fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)*) => {
        $(
            fn $name(&self $(, $arg: $ty)*) -> $ret {
                enter(Level::$level, stringify!($name), || vec![$($arg.log_value()),*]);
                let value = self.delegate.$name($($arg),*);
                exit(Level::$level, stringify!($name), &value);
                value
            }
        )*
    };
}

impl PosixSupport for LoggingPosixSupport {
    fn set_env(&self, env: HostEnv) {
        enter(Level::Debug, "set_env", || vec![format!("{:?}", env)]);
        self.delegate.set_env(env)
    }

    fn abort(&self) -> ! {
        enter(Level::Debug, "abort", Vec::new);
        self.delegate.abort()
    }

    logged_plain! { Trace;
        fn get_backend(&self) -> &'static str;
        fn strerror(&self, code: i32) -> String;
        fn create_path_from_string(&self, path: &str) -> Option<PosixPath>;
        fn create_path_from_bytes(&self, path: &[u8]) -> Option<PosixPath>;
        fn get_path_as_string(&self, path: &PosixPath) -> String;
        fn get_path_as_bytes(&self, path: &PosixPath) -> Vec<u8>;
    }

    logged_plain! { Debug;
        fn getpid(&self) -> i64;
        fn getppid(&self) -> i64;
        fn getuid(&self) -> i64;
        fn geteuid(&self) -> i64;
        fn getgid(&self) -> i64;
        fn getegid(&self) -> i64;
        fn isatty(&self, fd: i32) -> bool;
        fn faccessat(&self, dir_fd: i32, path: &PosixPath, mode: i32, effective_ids: bool, follow_symlinks: bool) -> bool;
        fn rewinddir(&self, stream: &DirStream) -> ();
        fn dir_entry_get_name(&self, entry: &DirEntry) -> PosixPath;
        fn dir_entry_get_path(&self, entry: &DirEntry, scandir_path: &PosixPath) -> PosixPath;
        fn dir_entry_get_type(&self, entry: &DirEntry) -> i32;
        fn wcoredump(&self, status: i32) -> bool;
        fn wifcontinued(&self, status: i32) -> bool;
        fn wifstopped(&self, status: i32) -> bool;
        fn wifsignaled(&self, status: i32) -> bool;
        fn wifexited(&self, status: i32) -> bool;
        fn wexitstatus(&self, status: i32) -> i32;
        fn wtermsig(&self, status: i32) -> i32;
        fn wstopsig(&self, status: i32) -> i32;
        fn has_getpwentries(&self) -> bool;
        fn inet_addr(&self, src: &str) -> i32;
        fn inet_ntoa(&self, address: i32) -> String;
        fn create_universal_sock_addr_inet4(&self, src: &Inet4SockAddr) -> Box<dyn UniversalSockAddr>;
        fn create_universal_sock_addr_inet6(&self, src: &Inet6SockAddr) -> Box<dyn UniversalSockAddr>;
    }

    logged! { Debug;
        fn sysconf(&self, name: i32) -> Result<i64>;
        fn getpgid(&self, pid: i64) -> Result<i64>;
        fn setpgid(&self, pid: i64, pgid: i64) -> Result<()>;
        fn getpgrp(&self) -> Result<i64>;
        fn getsid(&self, pid: i64) -> Result<i64>;
        fn setsid(&self) -> Result<i64>;
        fn getgroups(&self) -> Result<Vec<i64>>;
        fn umask(&self, mask: i32) -> Result<i32>;
        fn openat(&self, dir_fd: i32, path: &PosixPath, flags: i32, mode: i32) -> Result<i32>;
        fn close(&self, fd: i32) -> Result<()>;
        fn read(&self, fd: i32, length: usize) -> Result<Buffer>;
        fn write(&self, fd: i32, data: &Buffer) -> Result<usize>;
        fn dup(&self, fd: i32) -> Result<i32>;
        fn dup2(&self, fd: i32, fd2: i32, inheritable: bool) -> Result<i32>;
        fn get_inheritable(&self, fd: i32) -> Result<bool>;
        fn set_inheritable(&self, fd: i32, inheritable: bool) -> Result<()>;
        fn pipe(&self) -> Result<[i32; 2]>;
        fn select(&self, readfds: &[i32], writefds: &[i32], errorfds: &[i32], timeout: Option<Timeval>) -> Result<SelectResult>;
        fn lseek(&self, fd: i32, offset: i64, how: i32) -> Result<i64>;
        fn ftruncate(&self, fd: i32, length: i64) -> Result<()>;
        fn truncate(&self, path: &PosixPath, length: i64) -> Result<()>;
        fn fsync(&self, fd: i32) -> Result<()>;
        fn flock(&self, fd: i32, operation: i32) -> Result<()>;
        fn fcntl_lock(&self, fd: i32, blocking: bool, lock_type: i32, whence: i32, start: i64, length: i64) -> Result<()>;
        fn get_blocking(&self, fd: i32) -> Result<bool>;
        fn set_blocking(&self, fd: i32, blocking: bool) -> Result<()>;
        fn get_terminal_size(&self, fd: i32) -> Result<(i32, i32)>;
        fn fstatat(&self, dir_fd: i32, path: &PosixPath, follow_symlinks: bool) -> Result<StatResult>;
        fn fstat(&self, fd: i32) -> Result<StatResult>;
        fn statvfs(&self, path: &PosixPath) -> Result<StatvfsResult>;
        fn fstatvfs(&self, fd: i32) -> Result<StatvfsResult>;
        fn uname(&self) -> Result<UnameResult>;
        fn unlinkat(&self, dir_fd: i32, path: &PosixPath, rmdir: bool) -> Result<()>;
        fn linkat(&self, old_dir_fd: i32, old_path: &PosixPath, new_dir_fd: i32, new_path: &PosixPath, flags: i32) -> Result<()>;
        fn symlinkat(&self, target: &PosixPath, link_dir_fd: i32, link_path: &PosixPath) -> Result<()>;
        fn mkdirat(&self, dir_fd: i32, path: &PosixPath, mode: i32) -> Result<()>;
        fn getcwd(&self) -> Result<PosixPath>;
        fn chdir(&self, path: &PosixPath) -> Result<()>;
        fn fchdir(&self, fd: i32) -> Result<()>;
        fn renameat(&self, old_dir_fd: i32, old_path: &PosixPath, new_dir_fd: i32, new_path: &PosixPath) -> Result<()>;
        fn fchmodat(&self, dir_fd: i32, path: &PosixPath, mode: i32, follow_symlinks: bool) -> Result<()>;
        fn fchmod(&self, fd: i32, mode: i32) -> Result<()>;
        fn fchownat(&self, dir_fd: i32, path: &PosixPath, owner: i64, group: i64, follow_symlinks: bool) -> Result<()>;
        fn fchown(&self, fd: i32, owner: i64, group: i64) -> Result<()>;
        fn readlinkat(&self, dir_fd: i32, path: &PosixPath) -> Result<PosixPath>;
        fn utimensat(&self, dir_fd: i32, path: &PosixPath, times: Option<[Timespec; 2]>, follow_symlinks: bool) -> Result<()>;
        fn futimens(&self, fd: i32, times: Option<[Timespec; 2]>) -> Result<()>;
        fn futimes(&self, fd: i32, times: Option<[Timeval; 2]>) -> Result<()>;
        fn lutimes(&self, path: &PosixPath, times: Option<[Timeval; 2]>) -> Result<()>;
        fn utimes(&self, path: &PosixPath, times: Option<[Timeval; 2]>) -> Result<()>;
        fn opendir(&self, path: &PosixPath) -> Result<DirStream>;
        fn fdopendir(&self, fd: i32) -> Result<DirStream>;
        fn closedir(&self, stream: &DirStream) -> Result<()>;
        fn readdir(&self, stream: &DirStream) -> Result<Option<DirEntry>>;
        fn dir_entry_get_inode(&self, entry: &DirEntry) -> Result<u64>;
        fn kill(&self, pid: i64, signal: i32) -> Result<()>;
        fn killpg(&self, pgid: i64, signal: i32) -> Result<()>;
        fn waitpid(&self, pid: i64, options: i32) -> Result<(i64, i32)>;
        fn fork_exec(&self, request: &ForkExecRequest) -> Result<i64>;
        fn execv(&self, path: &PosixPath, args: &[PosixPath]) -> Result<()>;
        fn system(&self, command: &[u8]) -> Result<i32>;
        fn openpty(&self) -> Result<OpenPtyResult>;
        fn ctermid(&self) -> Result<String>;
        fn setenv(&self, name: &PosixPath, value: &PosixPath, overwrite: bool) -> Result<()>;
        fn unsetenv(&self, name: &PosixPath) -> Result<()>;
        fn mmap(&self, length: usize, prot: i32, flags: i32, fd: i32, offset: i64) -> Result<MmapHandle>;
        fn mmap_read_byte(&self, mmap: &MmapHandle, index: usize) -> Result<u8>;
        fn mmap_write_byte(&self, mmap: &MmapHandle, index: usize, value: u8) -> Result<()>;
        fn mmap_read_bytes(&self, mmap: &MmapHandle, index: usize, out: &mut [u8]) -> Result<usize>;
        fn mmap_write_bytes(&self, mmap: &MmapHandle, index: usize, data: &[u8]) -> Result<()>;
        fn mmap_flush(&self, mmap: &MmapHandle, offset: usize, length: usize) -> Result<()>;
        fn mmap_unmap(&self, mmap: &MmapHandle, length: usize) -> Result<()>;
        fn mmap_get_pointer(&self, mmap: &MmapHandle) -> Result<usize>;
        fn getpwuid(&self, uid: i64) -> Result<Option<PwdResult>>;
        fn getpwnam(&self, name: &PosixPath) -> Result<Option<PwdResult>>;
        fn getpwentries(&self) -> Result<Vec<PwdResult>>;
        fn ioctl_bytes(&self, fd: i32, request: u64, arg: &mut [u8]) -> Result<i32>;
        fn ioctl_int(&self, fd: i32, request: u64, arg: i64) -> Result<i32>;
        fn socket(&self, domain: i32, sock_type: i32, protocol: i32) -> Result<i32>;
        fn accept(&self, sockfd: i32) -> Result<AcceptResult>;
        fn bind(&self, sockfd: i32, addr: &dyn UniversalSockAddr) -> Result<()>;
        fn connect(&self, sockfd: i32, addr: &dyn UniversalSockAddr) -> Result<()>;
        fn listen(&self, sockfd: i32, backlog: i32) -> Result<()>;
        fn getpeername(&self, sockfd: i32) -> Result<Box<dyn UniversalSockAddr>>;
        fn getsockname(&self, sockfd: i32) -> Result<Box<dyn UniversalSockAddr>>;
        fn send(&self, sockfd: i32, data: &[u8], flags: i32) -> Result<usize>;
        fn sendto(&self, sockfd: i32, data: &[u8], flags: i32, dest: &dyn UniversalSockAddr) -> Result<usize>;
        fn recv(&self, sockfd: i32, length: usize, flags: i32) -> Result<Buffer>;
        fn recvfrom(&self, sockfd: i32, length: usize, flags: i32) -> Result<RecvfromResult>;
        fn shutdown(&self, sockfd: i32, how: i32) -> Result<()>;
        fn getsockopt(&self, sockfd: i32, level: i32, optname: i32, optlen: usize) -> Result<Vec<u8>>;
        fn setsockopt(&self, sockfd: i32, level: i32, optname: i32, optval: &[u8]) -> Result<()>;
        fn inet_aton(&self, src: &str) -> Result<i32>;
        fn inet_pton(&self, family: i32, src: &str) -> Result<Vec<u8>>;
        fn inet_ntop(&self, family: i32, src: &[u8]) -> Result<String>;
        fn gethostname(&self) -> Result<String>;
        fn getnameinfo(&self, addr: &dyn UniversalSockAddr, flags: i32) -> Result<(String, String)>;
        fn getaddrinfo(&self, node: Option<&str>, service: Option<&str>, family: i32, sock_type: i32, protocol: i32, flags: i32) -> Result<Box<dyn AddrInfoCursor>>;
        fn crypt(&self, word: &[u8], salt: &[u8]) -> Result<Vec<u8>>;
        fn sem_open(&self, name: &PosixPath, open_flags: i32, mode: i32, value: u32) -> Result<SemHandle>;
        fn sem_close(&self, handle: SemHandle) -> Result<()>;
        fn sem_unlink(&self, name: &PosixPath) -> Result<()>;
        fn sem_get_value(&self, handle: SemHandle) -> Result<i32>;
        fn sem_post(&self, handle: SemHandle) -> Result<()>;
        fn sem_wait(&self, handle: SemHandle) -> Result<()>;
        fn sem_try_wait(&self, handle: SemHandle) -> Result<()>;
        fn sem_timed_wait(&self, handle: SemHandle, deadline_ns: i64) -> Result<()>;
        fn create_universal_sock_addr_unix(&self, src: &UnixSockAddr) -> Result<Box<dyn UniversalSockAddr>>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_preview_is_bounded() {
        assert_eq!(b"ab\n".as_slice().log_value(), "b'ab\\n'");
        let long = vec![b'x'; 40];
        let rendered = long.log_value();
        assert!(rendered.starts_with("b'xxxx"));
        assert!(rendered.ends_with("... (40 bytes)"));
    }

    #[test]
    fn test_composite_values() {
        assert_eq!([3, 4].log_value(), "[3, 4]");
        assert_eq!((7i64, 0i32).log_value(), "(7, 0)");
        assert_eq!(Some("x").log_value(), "'x'");
        assert_eq!(None::<i32>.log_value(), "None");
        let path = PosixPath::from_string("/tmp").unwrap();
        assert_eq!((&path).log_value(), "'/tmp'");
    }

    #[test]
    fn test_error_rendering_names_files() {
        let err = PosixSupportError::posix(2, "No such file or directory").with_filename("/x");
        assert_eq!(
            error_value(&err),
            "errno=2, msg=No such file or directory, filename1='/x', filename2=None"
        );
    }

    #[test]
    fn test_borrowed_socket_address_arguments() {
        let inner: Arc<dyn PosixSupport> = Arc::new(crate::backend::EmulatedPosixSupport::new(
            crate::config::constants::PosixConstants::host().unwrap(),
            0o022,
        ));
        let posix = LoggingPosixSupport::new(Arc::clone(&inner));
        let addr = posix.create_universal_sock_addr_inet4(&Inet4SockAddr::new(80, 0x7f00_0001));
        assert!(addr.as_ref().log_value().contains("Inet4"));
        assert_eq!(posix.bind(3, addr.as_ref()), inner.bind(3, addr.as_ref()));
        assert_eq!(posix.inet_aton("127.1"), Ok(0x7f00_0001));
    }
}
