//! Image-build-time composer
//!
//! While an image is being built, live OS resources must not end up in the persisted
//! snapshot. During [`BuildPhase::BuildTime`] a small set of read-only file and directory
//! operations is served by the emulated backend, with every descriptor and directory
//! stream tracked until it is closed. Anything else is a defect and panics. Once
//! [`ImageBuildtimePosixSupport::finish_build_time`] succeeds, every call goes to the
//! native backend.

use crate::config::types::{PosixSupportError, Result};
use crate::core::path::PosixPath;
use crate::core::support::{AddrInfoCursor, PosixSupport, UniversalSockAddr};
use crate::core::types::{
    AcceptResult, Buffer, DirEntry, DirStream, ForkExecRequest, HostEnv, Inet4SockAddr,
    Inet6SockAddr, MmapHandle, OpenPtyResult, PwdResult, RecvfromResult, SelectResult,
    SemHandle, StatResult, StatvfsResult, Timespec, Timeval, UnameResult, UnixSockAddr,
};
use log::{debug, info};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildPhase {
    BuildTime,
    RunTime,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::BuildTime => write!(f, "build-time"),
            BuildPhase::RunTime => write!(f, "run-time"),
        }
    }
}

/// Emulated backend plus the resources it handed out during the build.
struct BuildState {
    emulated: Arc<dyn PosixSupport>,
    fds: HashSet<i32>,
    dir_streams: HashSet<DirStream>,
}

impl BuildState {
    fn add_fd(&mut self, fd: i32) -> i32 {
        if !self.fds.insert(fd) {
            panic!("should not reach here: duplicate fd {}", fd);
        }
        fd
    }

    fn remove_fd(&mut self, fd: i32) -> i32 {
        if !self.fds.remove(&fd) {
            panic!("should not reach here: Closing fd that has not been open ({})", fd);
        }
        fd
    }

    fn add_dir_stream(&mut self, stream: DirStream) -> DirStream {
        if !self.dir_streams.insert(stream.clone()) {
            panic!("should not reach here: duplicate dir stream {:?}", stream);
        }
        stream
    }
}

pub struct ImageBuildtimePosixSupport {
    native: Arc<dyn PosixSupport>,
    build: Mutex<Option<BuildState>>,
}

impl ImageBuildtimePosixSupport {
    /// `emulated` serves the build-time subset; it is dropped right away for `RunTime`.
    pub fn new(native: Arc<dyn PosixSupport>, emulated: Arc<dyn PosixSupport>, phase: BuildPhase) -> Self {
        let build = match phase {
            BuildPhase::BuildTime => Some(BuildState {
                emulated,
                fds: HashSet::new(),
                dir_streams: HashSet::new(),
            }),
            BuildPhase::RunTime => None,
        };
        debug!("Hybrid backend starting in {} phase", phase);
        Self {
            native,
            build: Mutex::new(build),
        }
    }

    fn state(&self) -> MutexGuard<'_, Option<BuildState>> {
        self.build.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> BuildPhase {
        if self.state().is_some() {
            BuildPhase::BuildTime
        } else {
            BuildPhase::RunTime
        }
    }

    /// Descriptors handed out during the build and not closed yet.
    pub fn open_build_fds(&self) -> Vec<i32> {
        let mut fds: Vec<i32> = self
            .state()
            .as_ref()
            .map(|b| b.fds.iter().copied().collect())
            .unwrap_or_default();
        fds.sort_unstable();
        fds
    }

    /// Fails with `LeakedResources` if any build-time descriptor or directory stream is
    /// still open. A no-op at run time.
    pub fn check_leaking_resources(&self) -> Result<()> {
        let state = self.state();
        let Some(build) = state.as_ref() else {
            return Ok(());
        };
        if build.fds.is_empty() && build.dir_streams.is_empty() {
            return Ok(());
        }
        let mut fds: Vec<i32> = build.fds.iter().copied().collect();
        fds.sort_unstable();
        Err(PosixSupportError::LeakedResources {
            fds,
            dir_streams: build.dir_streams.len(),
        })
    }

    /// Verify nothing leaked, then drop the emulated backend and switch to run time for
    /// good. On error the phase is unchanged.
    pub fn finish_build_time(&self) -> Result<()> {
        self.check_leaking_resources()?;
        if self.state().take().is_some() {
            info!("Image build finished, switching to the native backend");
        }
        Ok(())
    }

    /// Runs `f` on the build state, or returns `None` at run time.
    fn at_build_time<R>(&self, f: impl FnOnce(&mut BuildState) -> R) -> Option<R> {
        self.state().as_mut().map(f)
    }

    fn expect_run_time(&self, operation: &str) {
        if self.state().is_some() {
            panic!(
                "should not reach here: posix call '{}' not expected during image build time",
                operation
            );
        }
    }
}

/// Operations that only ever run natively; during the build they are a defect.
macro_rules! native_only {
    ($(fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty;)*) => {
        $(
            fn $name(&self $(, $arg: $ty)*) -> $ret {
                self.expect_run_time(stringify!($name));
                self.native.$name($($arg),*)
            }
        )*
    };
}

impl PosixSupport for ImageBuildtimePosixSupport {
    fn set_env(&self, env: HostEnv) {
        self.expect_run_time("set_env");
        self.native.set_env(env)
    }

    fn openat(&self, dir_fd: i32, path: &PosixPath, flags: i32, mode: i32) -> Result<i32> {
        if let Some(result) = self.at_build_time(|b| {
            let fd = b.emulated.openat(dir_fd, path, flags, mode)?;
            Ok(b.add_fd(fd))
        }) {
            return result;
        }
        self.native.openat(dir_fd, path, flags, mode)
    }

    fn close(&self, fd: i32) -> Result<()> {
        if let Some(result) = self.at_build_time(|b| {
            let fd = b.remove_fd(fd);
            b.emulated.close(fd)
        }) {
            return result;
        }
        self.native.close(fd)
    }

    fn read(&self, fd: i32, length: usize) -> Result<Buffer> {
        if let Some(result) = self.at_build_time(|b| b.emulated.read(fd, length)) {
            return result;
        }
        self.native.read(fd, length)
    }

    fn set_inheritable(&self, fd: i32, inheritable: bool) -> Result<()> {
        if let Some(result) = self.at_build_time(|b| b.emulated.set_inheritable(fd, inheritable)) {
            return result;
        }
        self.native.set_inheritable(fd, inheritable)
    }

    fn lseek(&self, fd: i32, offset: i64, how: i32) -> Result<i64> {
        if let Some(result) = self.at_build_time(|b| b.emulated.lseek(fd, offset, how)) {
            return result;
        }
        self.native.lseek(fd, offset, how)
    }

    fn fstatat(&self, dir_fd: i32, path: &PosixPath, follow_symlinks: bool) -> Result<StatResult> {
        if let Some(result) = self.at_build_time(|b| b.emulated.fstatat(dir_fd, path, follow_symlinks)) {
            return result;
        }
        self.native.fstatat(dir_fd, path, follow_symlinks)
    }

    fn fstat(&self, fd: i32) -> Result<StatResult> {
        if let Some(result) = self.at_build_time(|b| b.emulated.fstat(fd)) {
            return result;
        }
        self.native.fstat(fd)
    }

    fn statvfs(&self, path: &PosixPath) -> Result<StatvfsResult> {
        if let Some(result) = self.at_build_time(|b| b.emulated.statvfs(path)) {
            return result;
        }
        self.native.statvfs(path)
    }

    fn fstatvfs(&self, fd: i32) -> Result<StatvfsResult> {
        if let Some(result) = self.at_build_time(|b| b.emulated.fstatvfs(fd)) {
            return result;
        }
        self.native.fstatvfs(fd)
    }

    fn opendir(&self, path: &PosixPath) -> Result<DirStream> {
        if let Some(result) = self.at_build_time(|b| {
            let stream = b.emulated.opendir(path)?;
            Ok(b.add_dir_stream(stream))
        }) {
            return result;
        }
        self.native.opendir(path)
    }

    /// Closing an untracked stream is forwarded as is, so a second close stays harmless.
    fn closedir(&self, stream: &DirStream) -> Result<()> {
        if let Some(result) = self.at_build_time(|b| {
            b.dir_streams.remove(stream);
            b.emulated.closedir(stream)
        }) {
            return result;
        }
        self.native.closedir(stream)
    }

    fn readdir(&self, stream: &DirStream) -> Result<Option<DirEntry>> {
        if let Some(result) = self.at_build_time(|b| b.emulated.readdir(stream)) {
            return result;
        }
        self.native.readdir(stream)
    }

    fn rewinddir(&self, stream: &DirStream) {
        if self.at_build_time(|b| b.emulated.rewinddir(stream)).is_none() {
            self.native.rewinddir(stream)
        }
    }

    fn dir_entry_get_name(&self, entry: &DirEntry) -> PosixPath {
        if let Some(name) = self.at_build_time(|b| b.emulated.dir_entry_get_name(entry)) {
            return name;
        }
        self.native.dir_entry_get_name(entry)
    }

    fn create_path_from_string(&self, path: &str) -> Option<PosixPath> {
        if let Some(result) = self.at_build_time(|b| b.emulated.create_path_from_string(path)) {
            return result;
        }
        self.native.create_path_from_string(path)
    }

    fn create_path_from_bytes(&self, path: &[u8]) -> Option<PosixPath> {
        if let Some(result) = self.at_build_time(|b| b.emulated.create_path_from_bytes(path)) {
            return result;
        }
        self.native.create_path_from_bytes(path)
    }

    fn get_path_as_string(&self, path: &PosixPath) -> String {
        if let Some(result) = self.at_build_time(|b| b.emulated.get_path_as_string(path)) {
            return result;
        }
        self.native.get_path_as_string(path)
    }

    fn get_path_as_bytes(&self, path: &PosixPath) -> Vec<u8> {
        if let Some(result) = self.at_build_time(|b| b.emulated.get_path_as_bytes(path)) {
            return result;
        }
        self.native.get_path_as_bytes(path)
    }

    fn abort(&self) -> ! {
        self.expect_run_time("abort");
        self.native.abort()
    }

    native_only! {
        fn get_backend(&self) -> &'static str;
        fn strerror(&self, code: i32) -> String;
        fn sysconf(&self, name: i32) -> Result<i64>;
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
        fn umask(&self, mask: i32) -> Result<i32>;
        fn write(&self, fd: i32, data: &Buffer) -> Result<usize>;
        fn dup(&self, fd: i32) -> Result<i32>;
        fn dup2(&self, fd: i32, fd2: i32, inheritable: bool) -> Result<i32>;
        fn get_inheritable(&self, fd: i32) -> Result<bool>;
        fn pipe(&self) -> Result<[i32; 2]>;
        fn select(&self, readfds: &[i32], writefds: &[i32], errorfds: &[i32], timeout: Option<Timeval>) -> Result<SelectResult>;
        fn ftruncate(&self, fd: i32, length: i64) -> Result<()>;
        fn truncate(&self, path: &PosixPath, length: i64) -> Result<()>;
        fn fsync(&self, fd: i32) -> Result<()>;
        fn flock(&self, fd: i32, operation: i32) -> Result<()>;
        fn fcntl_lock(&self, fd: i32, blocking: bool, lock_type: i32, whence: i32, start: i64, length: i64) -> Result<()>;
        fn get_blocking(&self, fd: i32) -> Result<bool>;
        fn set_blocking(&self, fd: i32, blocking: bool) -> Result<()>;
        fn get_terminal_size(&self, fd: i32) -> Result<(i32, i32)>;
        fn isatty(&self, fd: i32) -> bool;
        fn uname(&self) -> Result<UnameResult>;
        fn unlinkat(&self, dir_fd: i32, path: &PosixPath, rmdir: bool) -> Result<()>;
        fn linkat(&self, old_dir_fd: i32, old_path: &PosixPath, new_dir_fd: i32, new_path: &PosixPath, flags: i32) -> Result<()>;
        fn symlinkat(&self, target: &PosixPath, link_dir_fd: i32, link_path: &PosixPath) -> Result<()>;
        fn mkdirat(&self, dir_fd: i32, path: &PosixPath, mode: i32) -> Result<()>;
        fn getcwd(&self) -> Result<PosixPath>;
        fn chdir(&self, path: &PosixPath) -> Result<()>;
        fn fchdir(&self, fd: i32) -> Result<()>;
        fn renameat(&self, old_dir_fd: i32, old_path: &PosixPath, new_dir_fd: i32, new_path: &PosixPath) -> Result<()>;
        fn faccessat(&self, dir_fd: i32, path: &PosixPath, mode: i32, effective_ids: bool, follow_symlinks: bool) -> bool;
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
        fn fdopendir(&self, fd: i32) -> Result<DirStream>;
        fn dir_entry_get_path(&self, entry: &DirEntry, scandir_path: &PosixPath) -> PosixPath;
        fn dir_entry_get_inode(&self, entry: &DirEntry) -> Result<u64>;
        fn dir_entry_get_type(&self, entry: &DirEntry) -> i32;
        fn kill(&self, pid: i64, signal: i32) -> Result<()>;
        fn killpg(&self, pgid: i64, signal: i32) -> Result<()>;
        fn waitpid(&self, pid: i64, options: i32) -> Result<(i64, i32)>;
        fn wcoredump(&self, status: i32) -> bool;
        fn wifcontinued(&self, status: i32) -> bool;
        fn wifstopped(&self, status: i32) -> bool;
        fn wifsignaled(&self, status: i32) -> bool;
        fn wifexited(&self, status: i32) -> bool;
        fn wexitstatus(&self, status: i32) -> i32;
        fn wtermsig(&self, status: i32) -> i32;
        fn wstopsig(&self, status: i32) -> i32;
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
        fn has_getpwentries(&self) -> bool;
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
        fn inet_addr(&self, src: &str) -> i32;
        fn inet_aton(&self, src: &str) -> Result<i32>;
        fn inet_ntoa(&self, address: i32) -> String;
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
        fn create_universal_sock_addr_inet4(&self, src: &Inet4SockAddr) -> Box<dyn UniversalSockAddr>;
        fn create_universal_sock_addr_inet6(&self, src: &Inet6SockAddr) -> Box<dyn UniversalSockAddr>;
        fn create_universal_sock_addr_unix(&self, src: &UnixSockAddr) -> Result<Box<dyn UniversalSockAddr>>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::emulated::EmulatedPosixSupport;
    use crate::config::constants::PosixConstants;
    use crate::core::types::DEFAULT_DIR_FD;

    fn emulated() -> Arc<dyn PosixSupport> {
        Arc::new(EmulatedPosixSupport::new(PosixConstants::host().unwrap(), 0o022))
    }

    fn hybrid(phase: BuildPhase) -> ImageBuildtimePosixSupport {
        ImageBuildtimePosixSupport::new(emulated(), emulated(), phase)
    }

    #[test]
    fn test_run_time_forwards_everything() {
        let posix = hybrid(BuildPhase::RunTime);
        assert_eq!(posix.phase(), BuildPhase::RunTime);
        assert_eq!(posix.get_backend(), "emulated");
        assert!(posix.finish_build_time().is_ok());
    }

    #[test]
    fn test_build_time_fd_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"data").unwrap();
        let path = PosixPath::from_string(file.to_str().unwrap()).unwrap();
        let o_rdonly = PosixConstants::host().unwrap().require("O_RDONLY");

        let posix = hybrid(BuildPhase::BuildTime);
        let fd = posix.openat(DEFAULT_DIR_FD, &path, o_rdonly, 0).unwrap();
        assert_eq!(posix.open_build_fds(), vec![fd]);
        assert!(matches!(
            posix.finish_build_time(),
            Err(PosixSupportError::LeakedResources { ref fds, dir_streams: 0 }) if fds == &vec![fd]
        ));
        assert_eq!(posix.phase(), BuildPhase::BuildTime);

        posix.close(fd).unwrap();
        posix.finish_build_time().unwrap();
        assert_eq!(posix.phase(), BuildPhase::RunTime);
    }

    #[test]
    #[should_panic(expected = "should not reach here")]
    fn test_native_only_call_panics_at_build_time() {
        hybrid(BuildPhase::BuildTime).getpid();
    }

    #[test]
    #[should_panic(expected = "Closing fd that has not been open")]
    fn test_closing_untracked_fd_panics() {
        let _ = hybrid(BuildPhase::BuildTime).close(42);
    }
}
