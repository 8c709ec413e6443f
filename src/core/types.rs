use crate::core::path::PosixPath;
use crate::core::support::UniversalSockAddr;
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// `dir_fd` value meaning "relative to the current working directory".
pub const DEFAULT_DIR_FD: i32 = -100;

/// Byte array plus logical length; `length <= data.len()` always holds.
#[derive(Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    length: usize,
}

impl Buffer {
    /// Zeroed buffer of `capacity` bytes with logical length equal to the capacity.
    pub fn allocate(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            length: capacity,
        }
    }

    pub fn wrap(data: Vec<u8>) -> Self {
        let length = data.len();
        Self { data, length }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::wrap(data.to_vec())
    }

    /// Shrink the logical length; values above the capacity are clamped.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length.min(self.data.len());
        self
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Whole backing array, including bytes past the logical length.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.length);
        self.data
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("length", &self.length)
            .field("capacity", &self.data.len())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Timeval {
    pub seconds: i64,
    pub microseconds: i64,
}

impl Timeval {
    pub fn new(seconds: i64, microseconds: i64) -> Self {
        Self {
            seconds,
            microseconds,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.microseconds == 0
    }

    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.seconds.max(0) as u64)
            + std::time::Duration::from_micros(self.microseconds.max(0) as u64)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Timespec {
    pub seconds: i64,
    pub nanoseconds: i64,
}

impl Timespec {
    pub fn new(seconds: i64, nanoseconds: i64) -> Self {
        Self {
            seconds,
            nanoseconds,
        }
    }
}

/// Readiness per input descriptor, in the order the descriptors were passed.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SelectResult {
    pub readfds: Vec<bool>,
    pub writefds: Vec<bool>,
    pub errorfds: Vec<bool>,
}

#[derive(Debug)]
pub struct AcceptResult {
    pub socket_fd: i32,
    pub sock_addr: Box<dyn UniversalSockAddr>,
}

#[derive(Debug)]
pub struct RecvfromResult {
    pub data: Buffer,
    pub sock_addr: Box<dyn UniversalSockAddr>,
}

/// One row of the password database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PwdResult {
    pub name: String,
    pub uid: i64,
    pub gid: i64,
    pub dir: String,
    pub shell: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenPtyResult {
    pub master_fd: i32,
    pub slave_fd: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StatResult {
    pub mode: i64,
    pub ino: i64,
    pub dev: i64,
    pub nlink: i64,
    pub uid: i64,
    pub gid: i64,
    pub size: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub atime_nsec: i64,
    pub mtime_nsec: i64,
    pub ctime_nsec: i64,
}

impl StatResult {
    /// Flat layout used at the built-ins boundary.
    pub fn to_array(&self) -> [i64; 13] {
        [
            self.mode,
            self.ino,
            self.dev,
            self.nlink,
            self.uid,
            self.gid,
            self.size,
            self.atime,
            self.mtime,
            self.ctime,
            self.atime_nsec,
            self.mtime_nsec,
            self.ctime_nsec,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct StatvfsResult {
    pub bsize: i64,
    pub frsize: i64,
    pub blocks: i64,
    pub bfree: i64,
    pub bavail: i64,
    pub files: i64,
    pub ffree: i64,
    pub favail: i64,
    pub flag: i64,
    pub namemax: i64,
    pub fsid: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnameResult {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

/// IPv4 address in host byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Inet4SockAddr {
    pub port: u16,
    pub address: u32,
}

impl Inet4SockAddr {
    pub fn new(port: u16, address: u32) -> Self {
        Self { port, address }
    }

    pub fn to_std(&self) -> std::net::SocketAddrV4 {
        std::net::SocketAddrV4::new(std::net::Ipv4Addr::from(self.address), self.port)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Inet6SockAddr {
    pub port: u16,
    pub address: [u8; 16],
    pub flow_info: u32,
    pub scope_id: u32,
}

impl Inet6SockAddr {
    pub fn new(port: u16, address: [u8; 16], flow_info: u32, scope_id: u32) -> Self {
        Self {
            port,
            address,
            flow_info,
            scope_id,
        }
    }

    pub fn to_std(&self) -> std::net::SocketAddrV6 {
        std::net::SocketAddrV6::new(
            std::net::Ipv6Addr::from(self.address),
            self.port,
            self.flow_info,
            self.scope_id,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UnixSockAddr {
    pub path: Vec<u8>,
}

impl UnixSockAddr {
    pub fn new(path: impl Into<Vec<u8>>) -> Self {
        Self { path: path.into() }
    }
}

/// Family-specific address of any supported family.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FamilySockAddr {
    Inet4(Inet4SockAddr),
    Inet6(Inet6SockAddr),
    Unix(UnixSockAddr),
}

impl From<std::net::SocketAddr> for FamilySockAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        match addr {
            std::net::SocketAddr::V4(v4) => {
                FamilySockAddr::Inet4(Inet4SockAddr::new(v4.port(), u32::from(*v4.ip())))
            }
            std::net::SocketAddr::V6(v6) => FamilySockAddr::Inet6(Inet6SockAddr::new(
                v6.port(),
                v6.ip().octets(),
                v6.flowinfo(),
                v6.scope_id(),
            )),
        }
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_handle_id() -> u64 {
    NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Opaque backend-owned handle; clones share identity.
#[derive(Clone, Debug)]
pub struct OpaqueHandle {
    id: u64,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueHandle {
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self {
            id: next_handle_id(),
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Backend-side view of the handle, `None` if another backend created it.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl PartialEq for OpaqueHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OpaqueHandle {}

impl std::hash::Hash for OpaqueHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Directory stream returned by `opendir`/`fdopendir`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DirStream(pub OpaqueHandle);

impl fmt::Debug for DirStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DirStream#{}", self.0.id())
    }
}

/// Memory map returned by `mmap`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MmapHandle(pub OpaqueHandle);

impl fmt::Debug for MmapHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MmapHandle#{}", self.0.id())
    }
}

/// Named semaphore handle returned by `sem_open`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SemHandle(pub usize);

/// Entry produced by `readdir`; owns a copy of its data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub inode: u64,
    /// `DT_*` value of the backend's platform.
    pub d_type: i32,
}

/// Arguments of `fork_exec`. Descriptor fields use `-1` for "not redirected".
#[derive(Clone, Debug, Default)]
pub struct ForkExecRequest {
    pub executables: Vec<PosixPath>,
    pub args: Vec<Vec<u8>>,
    pub cwd: Option<PosixPath>,
    /// `KEY=VALUE` entries; `None` inherits the parent environment.
    pub env: Option<Vec<Vec<u8>>>,
    pub stdin_read_fd: i32,
    pub stdin_write_fd: i32,
    pub stdout_read_fd: i32,
    pub stdout_write_fd: i32,
    pub stderr_read_fd: i32,
    pub stderr_write_fd: i32,
    pub errpipe_read_fd: i32,
    pub errpipe_write_fd: i32,
    pub close_fds: bool,
    pub restore_signals: bool,
    pub call_setsid: bool,
    pub fds_to_keep: Vec<i32>,
}

impl ForkExecRequest {
    pub fn new(executables: Vec<PosixPath>, args: Vec<Vec<u8>>) -> Self {
        Self {
            executables,
            args,
            cwd: None,
            env: None,
            stdin_read_fd: -1,
            stdin_write_fd: -1,
            stdout_read_fd: -1,
            stdout_write_fd: -1,
            stderr_read_fd: -1,
            stderr_write_fd: -1,
            errpipe_read_fd: -1,
            errpipe_write_fd: -1,
            close_fds: false,
            restore_signals: false,
            call_setsid: false,
            fds_to_keep: Vec::new(),
        }
    }
}

/// Host streams bound to descriptors 0/1/2 by `set_env`.
pub struct HostEnv {
    pub stdin: Box<dyn Read + Send>,
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
}

impl HostEnv {
    /// The process's own standard streams.
    pub fn inherit() -> Self {
        Self {
            stdin: Box::new(std::io::stdin()),
            stdout: Box::new(std::io::stdout()),
            stderr: Box::new(std::io::stderr()),
        }
    }
}

impl fmt::Debug for HostEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostEnv")
    }
}

/// One number of a BSD `inet_aton` address: decimal, octal (`0` prefix) or hex (`0x`).
fn parse_part(part: &str) -> Option<u32> {
    if part.is_empty() {
        return None;
    }
    let (digits, radix) = if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        (hex, 16)
    } else if part.len() > 1 && part.starts_with('0') {
        (&part[1..], 8)
    } else {
        (part, 10)
    };
    if digits.is_empty() {
        // "0x" alone is zero
        return (radix == 16).then_some(0);
    }
    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

/// `inet_aton` accepting the `a`, `a.b`, `a.b.c` and `a.b.c.d` forms.
pub fn parse_inet_aton(src: &str) -> Option<u32> {
    let parts: Vec<u32> = src.split('.').map(parse_part).collect::<Option<_>>()?;
    let (last, head) = parts.split_last()?;
    if head.len() > 3 || head.iter().any(|p| *p > 0xff) {
        return None;
    }
    let last_bits = 8 * (4 - head.len() as u32);
    if last_bits < 32 && *last >= (1u32 << last_bits) {
        return None;
    }
    let prefix = head
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, p)| acc | (p << (24 - 8 * i as u32)));
    Some(prefix | last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_length_clamped() {
        let buf = Buffer::allocate(8).with_length(20);
        assert_eq!(buf.len(), 8);
        let buf = Buffer::wrap(b"hello world".to_vec()).with_length(5);
        assert_eq!(buf.as_slice(), b"hello");
        assert_eq!(buf.capacity(), 11);
        assert_eq!(buf.into_vec(), b"hello".to_vec());
    }

    #[test]
    fn test_handle_identity() {
        let a = OpaqueHandle::new(5u32);
        let b = a.clone();
        let c = OpaqueHandle::new(5u32);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast::<u32>(), Some(&5));
        assert!(a.downcast::<String>().is_none());
    }

    #[test]
    fn test_family_from_std() {
        let addr: std::net::SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(
            FamilySockAddr::from(addr),
            FamilySockAddr::Inet4(Inet4SockAddr::new(8080, 0x7f00_0001))
        );
    }

    #[test]
    fn test_stat_array_layout() {
        let st = StatResult {
            mode: 1,
            size: 7,
            ctime_nsec: 13,
            ..Default::default()
        };
        let arr = st.to_array();
        assert_eq!(arr[0], 1);
        assert_eq!(arr[6], 7);
        assert_eq!(arr[12], 13);
    }

    #[test]
    fn test_inet_aton_forms() {
        assert_eq!(parse_inet_aton("127.0.0.1"), Some(0x7f00_0001));
        assert_eq!(parse_inet_aton("127.1"), Some(0x7f00_0001));
        assert_eq!(parse_inet_aton("10.1.258"), Some(0x0a01_0102));
        assert_eq!(parse_inet_aton("0x7f.0.0.01"), Some(0x7f00_0001));
        assert_eq!(parse_inet_aton("4294967295"), Some(u32::MAX));
        assert_eq!(parse_inet_aton("256.0.0.1"), None);
        assert_eq!(parse_inet_aton("1.2.3.4.5"), None);
        assert_eq!(parse_inet_aton("1.2.3.256"), None);
        assert_eq!(parse_inet_aton("08"), None);
        assert_eq!(parse_inet_aton(""), None);
        assert_eq!(parse_inet_aton("a.b.c.d"), None);
    }
}
