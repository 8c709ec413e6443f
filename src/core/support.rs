//! The capability interface every backend implements.

use crate::config::types::Result;
use crate::core::path::PosixPath;
use crate::core::types::{
    AcceptResult, Buffer, DirEntry, DirStream, ForkExecRequest, HostEnv, Inet4SockAddr,
    Inet6SockAddr, MmapHandle, OpenPtyResult, PwdResult, RecvfromResult, SelectResult,
    SemHandle, StatResult, StatvfsResult, Timespec, Timeval, UnameResult, UnixSockAddr,
};
use std::any::Any;
use std::fmt;

/// Backend-owned socket address able to hold any supported family.
pub trait UniversalSockAddr: Send + Sync + fmt::Debug {
    /// `AF_*` value of the backend's platform.
    fn family(&self) -> i32;

    /// Fails with `EINVAL` when the stored family is not IPv4.
    fn as_inet4(&self) -> Result<Inet4SockAddr>;

    /// Fails with `EINVAL` when the stored family is not IPv6.
    fn as_inet6(&self) -> Result<Inet6SockAddr>;

    /// Fails with `EINVAL` when the stored family is not AF_UNIX.
    fn as_unix(&self) -> Result<UnixSockAddr>;

    fn as_any(&self) -> &dyn Any;
}

/// Forward-only cursor over name resolution results.
///
/// The cursor starts on the first result. `release` is idempotent and also runs on drop;
/// accessors must not be called after release.
pub trait AddrInfoCursor: Send + fmt::Debug {
    /// Advance; returns `false` and stays on the last element when exhausted.
    fn next(&mut self) -> bool;
    fn release(&mut self);
    fn flags(&self) -> i32;
    fn family(&self) -> i32;
    fn sock_type(&self) -> i32;
    fn protocol(&self) -> i32;
    fn canon_name(&self) -> Option<String>;
    fn sock_addr(&self) -> Box<dyn UniversalSockAddr>;
}

/// Uniform access to OS facilities.
///
/// Descriptor arguments named `dir_fd` accept [`DEFAULT_DIR_FD`](crate::core::types::DEFAULT_DIR_FD)
/// for "relative to the working directory". Flag and errno values are those of the
/// backend's platform constant table.
pub trait PosixSupport: Send + Sync {
    // meta
    fn set_env(&self, env: HostEnv);
    fn get_backend(&self) -> &'static str;
    fn strerror(&self, code: i32) -> String;
    fn sysconf(&self, name: i32) -> Result<i64>;

    // process ids
    fn getpid(&self) -> i64;
    fn getppid(&self) -> i64;
    fn getuid(&self) -> i64;
    fn geteuid(&self) -> i64;
    fn getgid(&self) -> i64;
    fn getegid(&self) -> i64;
    fn getpgid(&self, pid: i64) -> Result<i64>;
    fn setpgid(&self, pid: i64, pgid: i64) -> Result<()>;
    fn getpgrp(&self) -> Result<i64>;
    fn getsid(&self, pid: i64) -> Result<i64>;
    fn setsid(&self) -> Result<i64>;
    fn getgroups(&self) -> Result<Vec<i64>>;
    /// Sets the mask and returns the previous one.
    fn umask(&self, mask: i32) -> Result<i32>;

    // descriptors
    fn openat(&self, dir_fd: i32, path: &PosixPath, flags: i32, mode: i32) -> Result<i32>;
    fn close(&self, fd: i32) -> Result<()>;
    /// Read at most `length` bytes; an empty buffer means end of file.
    fn read(&self, fd: i32, length: usize) -> Result<Buffer>;
    fn write(&self, fd: i32, data: &Buffer) -> Result<usize>;
    fn dup(&self, fd: i32) -> Result<i32>;
    fn dup2(&self, fd: i32, fd2: i32, inheritable: bool) -> Result<i32>;
    fn get_inheritable(&self, fd: i32) -> Result<bool>;
    fn set_inheritable(&self, fd: i32, inheritable: bool) -> Result<()>;
    /// `[read_end, write_end]`
    fn pipe(&self) -> Result<[i32; 2]>;
    /// `None` blocks indefinitely, a zero timeout polls.
    fn select(
        &self,
        readfds: &[i32],
        writefds: &[i32],
        errorfds: &[i32],
        timeout: Option<Timeval>,
    ) -> Result<SelectResult>;
    fn lseek(&self, fd: i32, offset: i64, how: i32) -> Result<i64>;
    fn ftruncate(&self, fd: i32, length: i64) -> Result<()>;
    fn truncate(&self, path: &PosixPath, length: i64) -> Result<()>;
    fn fsync(&self, fd: i32) -> Result<()>;
    fn flock(&self, fd: i32, operation: i32) -> Result<()>;
    fn fcntl_lock(
        &self,
        fd: i32,
        blocking: bool,
        lock_type: i32,
        whence: i32,
        start: i64,
        length: i64,
    ) -> Result<()>;
    fn get_blocking(&self, fd: i32) -> Result<bool>;
    fn set_blocking(&self, fd: i32, blocking: bool) -> Result<()>;
    /// `(columns, lines)`
    fn get_terminal_size(&self, fd: i32) -> Result<(i32, i32)>;
    fn isatty(&self, fd: i32) -> bool;

    // stat
    fn fstatat(&self, dir_fd: i32, path: &PosixPath, follow_symlinks: bool) -> Result<StatResult>;
    fn fstat(&self, fd: i32) -> Result<StatResult>;
    fn statvfs(&self, path: &PosixPath) -> Result<StatvfsResult>;
    fn fstatvfs(&self, fd: i32) -> Result<StatvfsResult>;
    fn uname(&self) -> Result<UnameResult>;

    // filesystem
    fn unlinkat(&self, dir_fd: i32, path: &PosixPath, rmdir: bool) -> Result<()>;
    fn linkat(
        &self,
        old_dir_fd: i32,
        old_path: &PosixPath,
        new_dir_fd: i32,
        new_path: &PosixPath,
        flags: i32,
    ) -> Result<()>;
    fn symlinkat(&self, target: &PosixPath, link_dir_fd: i32, link_path: &PosixPath) -> Result<()>;
    fn mkdirat(&self, dir_fd: i32, path: &PosixPath, mode: i32) -> Result<()>;
    fn getcwd(&self) -> Result<PosixPath>;
    fn chdir(&self, path: &PosixPath) -> Result<()>;
    fn fchdir(&self, fd: i32) -> Result<()>;
    fn renameat(
        &self,
        old_dir_fd: i32,
        old_path: &PosixPath,
        new_dir_fd: i32,
        new_path: &PosixPath,
    ) -> Result<()>;
    /// `false` on any failure, never an error.
    fn faccessat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        mode: i32,
        effective_ids: bool,
        follow_symlinks: bool,
    ) -> bool;
    fn fchmodat(&self, dir_fd: i32, path: &PosixPath, mode: i32, follow_symlinks: bool) -> Result<()>;
    fn fchmod(&self, fd: i32, mode: i32) -> Result<()>;
    fn fchownat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        owner: i64,
        group: i64,
        follow_symlinks: bool,
    ) -> Result<()>;
    fn fchown(&self, fd: i32, owner: i64, group: i64) -> Result<()>;
    fn readlinkat(&self, dir_fd: i32, path: &PosixPath) -> Result<PosixPath>;
    /// `None` sets both times to now.
    fn utimensat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        times: Option<[Timespec; 2]>,
        follow_symlinks: bool,
    ) -> Result<()>;
    fn futimens(&self, fd: i32, times: Option<[Timespec; 2]>) -> Result<()>;
    fn futimes(&self, fd: i32, times: Option<[Timeval; 2]>) -> Result<()>;
    fn lutimes(&self, path: &PosixPath, times: Option<[Timeval; 2]>) -> Result<()>;
    fn utimes(&self, path: &PosixPath, times: Option<[Timeval; 2]>) -> Result<()>;

    // directories
    fn opendir(&self, path: &PosixPath) -> Result<DirStream>;
    fn fdopendir(&self, fd: i32) -> Result<DirStream>;
    /// Safe to call more than once on the same stream.
    fn closedir(&self, stream: &DirStream) -> Result<()>;
    /// `None` at end of stream; `.` and `..` are skipped.
    fn readdir(&self, stream: &DirStream) -> Result<Option<DirEntry>>;
    fn rewinddir(&self, stream: &DirStream);
    fn dir_entry_get_name(&self, entry: &DirEntry) -> PosixPath;
    fn dir_entry_get_path(&self, entry: &DirEntry, scandir_path: &PosixPath) -> PosixPath;
    fn dir_entry_get_inode(&self, entry: &DirEntry) -> Result<u64>;
    fn dir_entry_get_type(&self, entry: &DirEntry) -> i32;

    // processes
    fn kill(&self, pid: i64, signal: i32) -> Result<()>;
    fn killpg(&self, pgid: i64, signal: i32) -> Result<()>;
    /// `(pid, status)`; pid is 0 when `WNOHANG` found nothing to reap.
    fn waitpid(&self, pid: i64, options: i32) -> Result<(i64, i32)>;
    fn abort(&self) -> !;
    fn wcoredump(&self, status: i32) -> bool;
    fn wifcontinued(&self, status: i32) -> bool;
    fn wifstopped(&self, status: i32) -> bool;
    fn wifsignaled(&self, status: i32) -> bool;
    fn wifexited(&self, status: i32) -> bool;
    fn wexitstatus(&self, status: i32) -> i32;
    fn wtermsig(&self, status: i32) -> i32;
    fn wstopsig(&self, status: i32) -> i32;
    fn fork_exec(&self, request: &ForkExecRequest) -> Result<i64>;
    /// Only returns on failure.
    fn execv(&self, path: &PosixPath, args: &[PosixPath]) -> Result<()>;
    /// Raw wait status of the shell.
    fn system(&self, command: &[u8]) -> Result<i32>;
    fn openpty(&self) -> Result<OpenPtyResult>;
    fn ctermid(&self) -> Result<String>;
    fn setenv(&self, name: &PosixPath, value: &PosixPath, overwrite: bool) -> Result<()>;
    fn unsetenv(&self, name: &PosixPath) -> Result<()>;

    // memory maps
    fn mmap(&self, length: usize, prot: i32, flags: i32, fd: i32, offset: i64) -> Result<MmapHandle>;
    fn mmap_read_byte(&self, mmap: &MmapHandle, index: usize) -> Result<u8>;
    fn mmap_write_byte(&self, mmap: &MmapHandle, index: usize, value: u8) -> Result<()>;
    /// Copies into `out`, returns the number of bytes copied.
    fn mmap_read_bytes(&self, mmap: &MmapHandle, index: usize, out: &mut [u8]) -> Result<usize>;
    fn mmap_write_bytes(&self, mmap: &MmapHandle, index: usize, data: &[u8]) -> Result<()>;
    fn mmap_flush(&self, mmap: &MmapHandle, offset: usize, length: usize) -> Result<()>;
    fn mmap_unmap(&self, mmap: &MmapHandle, length: usize) -> Result<()>;
    fn mmap_get_pointer(&self, mmap: &MmapHandle) -> Result<usize>;

    // user database
    fn getpwuid(&self, uid: i64) -> Result<Option<PwdResult>>;
    fn getpwnam(&self, name: &PosixPath) -> Result<Option<PwdResult>>;
    fn has_getpwentries(&self) -> bool;
    fn getpwentries(&self) -> Result<Vec<PwdResult>>;

    // ioctl
    fn ioctl_bytes(&self, fd: i32, request: u64, arg: &mut [u8]) -> Result<i32>;
    fn ioctl_int(&self, fd: i32, request: u64, arg: i64) -> Result<i32>;

    // sockets
    fn socket(&self, domain: i32, sock_type: i32, protocol: i32) -> Result<i32>;
    fn accept(&self, sockfd: i32) -> Result<AcceptResult>;
    fn bind(&self, sockfd: i32, addr: &dyn UniversalSockAddr) -> Result<()>;
    fn connect(&self, sockfd: i32, addr: &dyn UniversalSockAddr) -> Result<()>;
    fn listen(&self, sockfd: i32, backlog: i32) -> Result<()>;
    fn getpeername(&self, sockfd: i32) -> Result<Box<dyn UniversalSockAddr>>;
    fn getsockname(&self, sockfd: i32) -> Result<Box<dyn UniversalSockAddr>>;
    fn send(&self, sockfd: i32, data: &[u8], flags: i32) -> Result<usize>;
    fn sendto(
        &self,
        sockfd: i32,
        data: &[u8],
        flags: i32,
        dest: &dyn UniversalSockAddr,
    ) -> Result<usize>;
    fn recv(&self, sockfd: i32, length: usize, flags: i32) -> Result<Buffer>;
    fn recvfrom(&self, sockfd: i32, length: usize, flags: i32) -> Result<RecvfromResult>;
    fn shutdown(&self, sockfd: i32, how: i32) -> Result<()>;
    fn getsockopt(&self, sockfd: i32, level: i32, optname: i32, optlen: usize) -> Result<Vec<u8>>;
    fn setsockopt(&self, sockfd: i32, level: i32, optname: i32, optval: &[u8]) -> Result<()>;

    // addresses and name resolution
    /// Host-order address, or `INADDR_NONE` (`-1`) for invalid input. Never fails, so
    /// `"255.255.255.255"` and garbage are indistinguishable.
    fn inet_addr(&self, src: &str) -> i32;
    fn inet_aton(&self, src: &str) -> Result<i32>;
    fn inet_ntoa(&self, address: i32) -> String;
    /// Network-order bytes (4 or 16).
    fn inet_pton(&self, family: i32, src: &str) -> Result<Vec<u8>>;
    fn inet_ntop(&self, family: i32, src: &[u8]) -> Result<String>;
    fn gethostname(&self) -> Result<String>;
    /// `(host, service)`
    fn getnameinfo(&self, addr: &dyn UniversalSockAddr, flags: i32) -> Result<(String, String)>;
    fn getaddrinfo(
        &self,
        node: Option<&str>,
        service: Option<&str>,
        family: i32,
        sock_type: i32,
        protocol: i32,
        flags: i32,
    ) -> Result<Box<dyn AddrInfoCursor>>;
    fn crypt(&self, word: &[u8], salt: &[u8]) -> Result<Vec<u8>>;

    // semaphores
    fn sem_open(&self, name: &PosixPath, open_flags: i32, mode: i32, value: u32) -> Result<SemHandle>;
    fn sem_close(&self, handle: SemHandle) -> Result<()>;
    fn sem_unlink(&self, name: &PosixPath) -> Result<()>;
    fn sem_get_value(&self, handle: SemHandle) -> Result<i32>;
    fn sem_post(&self, handle: SemHandle) -> Result<()>;
    fn sem_wait(&self, handle: SemHandle) -> Result<()>;
    fn sem_try_wait(&self, handle: SemHandle) -> Result<()>;
    /// Absolute deadline in nanoseconds since the epoch.
    fn sem_timed_wait(&self, handle: SemHandle, deadline_ns: i64) -> Result<()>;

    // address construction
    fn create_universal_sock_addr_inet4(&self, src: &Inet4SockAddr) -> Box<dyn UniversalSockAddr>;
    fn create_universal_sock_addr_inet6(&self, src: &Inet6SockAddr) -> Box<dyn UniversalSockAddr>;
    /// Fails with `InvalidUnixSocketPath` when the path does not fit `sun_path`.
    fn create_universal_sock_addr_unix(&self, src: &UnixSockAddr) -> Result<Box<dyn UniversalSockAddr>>;

    // path conversion
    /// `None` if the string contains a NUL byte.
    fn create_path_from_string(&self, path: &str) -> Option<PosixPath>;
    /// `None` if the bytes contain a NUL byte.
    fn create_path_from_bytes(&self, path: &[u8]) -> Option<PosixPath>;
    fn get_path_as_string(&self, path: &PosixPath) -> String;
    fn get_path_as_bytes(&self, path: &PosixPath) -> Vec<u8>;
}
