//! Backend built only on std facilities
//!
//! Descriptors map to in-process channels ([`channel`]) kept in a refcounted table
//! ([`resources`]); children run through `std::process`; name resolution goes through
//! `std::net`. Flag and errno values come from the platform constant table, never from
//! literals. Facilities that cannot be emulated fail with `UnsupportedFeature`; facilities
//! that are silently approximated are reported on the `posix_support::compat` log target.

mod channel;
mod dir;
mod errors;
mod host;
mod locks;
mod mmap;
mod net;
mod process;
mod resources;

use crate::config::constants::PosixConstants;
use crate::config::types::{ConfigError, PosixSupportError, Result, SupportConfig};
use crate::core::path::PosixPath;
use crate::core::support::{AddrInfoCursor, PosixSupport, UniversalSockAddr};
use crate::core::types::{
    AcceptResult, Buffer, DirEntry, DirStream, FamilySockAddr, ForkExecRequest, HostEnv,
    Inet4SockAddr, Inet6SockAddr, MmapHandle, OpaqueHandle, OpenPtyResult, PwdResult,
    RecvfromResult, SelectResult, SemHandle, StatResult, StatvfsResult, Timespec, Timeval,
    UnameResult, UnixSockAddr, parse_inet_aton, DEFAULT_DIR_FD,
};
use channel::{Channel, ChannelWrapper, LockKind, Pipe};
use dir::EmulatedDir;
use errors::ErrorTable;
use locks::FileLocks;
use log::{debug, info};
use mmap::EmulatedMmap;
use net::{AddrInfoQuery, EmulatedSockAddr};
use resources::{PosixResources, WaitOutcome, PROCESS_GROUP};
use std::fs::{self, DirBuilder, File, FileTimes, OpenOptions, Permissions};
use std::io::{IsTerminal, SeekFrom};
use std::net::Ipv4Addr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Log target for emulation compatibility notes.
pub(crate) const COMPAT_TARGET: &str = crate::observability::COMPAT_LOG_TARGET;


const SELECT_POLL: Duration = Duration::from_millis(5);
const WAIT_POLL: Duration = Duration::from_millis(10);

static NEXT_TMPFILE: AtomicU64 = AtomicU64::new(0);

const NANOS_PER_SEC: i64 = 1_000_000_000;
const MICROS_PER_SEC: i64 = 1_000_000;

/// `None` when the nanoseconds are outside `0..1e9` or the instant is not representable.
fn system_time(seconds: i64, nanoseconds: i64) -> Option<SystemTime> {
    if !(0..NANOS_PER_SEC).contains(&nanoseconds) {
        return None;
    }
    let base = if seconds >= 0 {
        UNIX_EPOCH.checked_add(Duration::from_secs(seconds as u64))?
    } else {
        UNIX_EPOCH.checked_sub(Duration::from_secs(seconds.unsigned_abs()))?
    };
    base.checked_add(Duration::from_nanos(nanoseconds as u64))
}

/// `None` in `times` means "now" for both timestamps; `None` returned means invalid input.
fn file_times(times: Option<[Timespec; 2]>) -> Option<FileTimes> {
    let (accessed, modified) = match times {
        Some([a, m]) => (
            system_time(a.seconds, a.nanoseconds)?,
            system_time(m.seconds, m.nanoseconds)?,
        ),
        None => {
            let now = SystemTime::now();
            (now, now)
        }
    };
    Some(FileTimes::new().set_accessed(accessed).set_modified(modified))
}

/// `None` when a microsecond field is outside `0..1e6`.
fn timevals_to_timespecs(times: Option<[Timeval; 2]>) -> Option<Option<[Timespec; 2]>> {
    let Some(pair) = times else {
        return Some(None);
    };
    let convert = |t: Timeval| {
        (0..MICROS_PER_SEC)
            .contains(&t.microseconds)
            .then(|| Timespec::new(t.seconds, t.microseconds * 1000))
    };
    Some(Some([convert(pair[0])?, convert(pair[1])?]))
}

/// `-1` means "leave unchanged".
fn id_arg(id: i64) -> Option<u32> {
    u32::try_from(id).ok()
}

pub struct EmulatedPosixSupport {
    constants: &'static PosixConstants,
    errors: ErrorTable,
    resources: PosixResources,
    cwd: Mutex<PathBuf>,
    umask: AtomicU32,
    umask_notice: Once,
    locks: FileLocks,
}

impl EmulatedPosixSupport {
    pub fn new(constants: &'static PosixConstants, umask: u32) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self {
            constants,
            errors: ErrorTable::new(constants),
            resources: PosixResources::new(),
            cwd: Mutex::new(cwd),
            umask: AtomicU32::new(umask & 0o777),
            umask_notice: Once::new(),
            locks: FileLocks::default(),
        }
    }

    /// Backend over the host platform's constant table.
    pub fn from_config(config: &SupportConfig) -> std::result::Result<Self, ConfigError> {
        let constants = PosixConstants::host()?;
        Ok(Self::new(constants, config.emulated_umask))
    }

    pub fn constants(&self) -> &'static PosixConstants {
        self.constants
    }

    /// Descriptors currently open, standard streams included.
    pub fn open_fds(&self) -> Vec<i32> {
        self.resources.open_fds()
    }

    fn c(&self, name: &str) -> i32 {
        self.constants.require(name)
    }

    /// Optional constant, `0` where the platform lacks it.
    fn c_opt(&self, name: &str) -> i32 {
        self.constants.int(name).unwrap_or(0) as i32
    }

    /// `flags` carries every bit of the optional constant `name`.
    fn has_flag(&self, flags: i32, name: &str) -> bool {
        match self.constants.int(name) {
            Some(bits) if bits != 0 => flags as i64 & bits == bits,
            _ => false,
        }
    }

    /// Drop the advisory lock held through `fd` when `fd` is its wrapper's last descriptor.
    fn release_lock_if_last(&self, fd: i32) {
        let Some(wrapper) = self.resources.get(fd) else {
            return;
        };
        if wrapper.refcount() == 1 && wrapper.held_lock().is_some() {
            if let Some(path) = self.resources.path(fd) {
                self.locks.release(&path, wrapper.id());
            }
        }
    }

    fn compat_ignored(&self, message: String) {
        info!(target: COMPAT_TARGET, "Ignored: {}", message);
    }

    fn unsupported(&self, operation: &str) -> PosixSupportError {
        PosixSupportError::unsupported(format!("{} in POSIX emulation layer", operation))
    }

    fn wrapper(&self, fd: i32) -> Result<Arc<ChannelWrapper>> {
        self.resources.get(fd).ok_or_else(|| self.errors.err("EBADF"))
    }

    fn cwd(&self) -> PathBuf {
        self.cwd
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn is_default_dir_fd(&self, dir_fd: i32) -> bool {
        dir_fd == DEFAULT_DIR_FD || self.constants.int("AT_FDCWD") == Some(dir_fd as i64)
    }

    /// Absolute host path of `path` relative to `dir_fd`.
    fn resolve(&self, dir_fd: i32, path: &PosixPath) -> Result<PathBuf> {
        if path.is_empty() {
            return Err(self.errors.err("ENOENT").with_filename(""));
        }
        if path.is_absolute() {
            return Ok(path.as_path().to_path_buf());
        }
        let base = if self.is_default_dir_fd(dir_fd) {
            self.cwd()
        } else {
            self.resources
                .path(dir_fd)
                .ok_or_else(|| self.errors.err("EBADF"))?
        };
        Ok(base.join(path.as_path()))
    }

    fn path_err(&self, err: &std::io::Error, path: &PosixPath) -> PosixSupportError {
        self.errors.io_path(err, &path.to_string_lossy())
    }

    fn dir<'a>(&self, stream: &'a DirStream) -> Result<&'a EmulatedDir> {
        stream
            .0
            .downcast::<EmulatedDir>()
            .ok_or_else(|| self.errors.err("EBADF"))
    }

    fn map<'a>(&self, handle: &'a MmapHandle) -> Result<&'a EmulatedMmap> {
        handle
            .0
            .downcast::<EmulatedMmap>()
            .ok_or_else(|| self.errors.err("EINVAL"))
    }

    fn stat_result(&self, meta: &fs::Metadata, path: &Path) -> StatResult {
        StatResult {
            mode: meta.mode() as i64,
            ino: self.resources.inode_of(path) as i64,
            dev: meta.dev() as i64,
            nlink: meta.nlink() as i64,
            uid: meta.uid() as i64,
            gid: meta.gid() as i64,
            size: meta.size() as i64,
            atime: meta.atime(),
            mtime: meta.mtime(),
            ctime: meta.ctime(),
            atime_nsec: meta.atime_nsec(),
            mtime_nsec: meta.mtime_nsec(),
            ctime_nsec: meta.ctime_nsec(),
        }
    }

    fn synthetic_stat(&self, file_type: &str) -> StatResult {
        StatResult {
            mode: (self.c_opt(file_type) | 0o600) as i64,
            nlink: 1,
            uid: self.getuid(),
            gid: self.getgid(),
            ..Default::default()
        }
    }

    fn open_channel(&self, target: &Path, flags: i32, mode: i32) -> Result<Channel> {
        let accmode = flags & self.constants.int("O_ACCMODE").unwrap_or(3) as i32;
        let write = accmode == self.c("O_WRONLY") || accmode == self.c("O_RDWR");
        let read = accmode != self.c("O_WRONLY");
        let create = flags & self.c("O_CREAT") != 0;
        let exclusive = create && flags & self.c("O_EXCL") != 0;

        if self.has_flag(flags, "O_NOFOLLOW") {
            if let Ok(meta) = fs::symlink_metadata(target) {
                if meta.file_type().is_symlink() {
                    return Err(self.errors.err("ELOOP"));
                }
            }
        }
        match fs::metadata(target) {
            Ok(meta) if meta.is_dir() => {
                if exclusive {
                    return Err(self.errors.err("EEXIST"));
                }
                if write {
                    return Err(self.errors.err("EISDIR"));
                }
                return Ok(Channel::Directory {
                    path: target.to_path_buf(),
                });
            }
            Ok(_) if self.has_flag(flags, "O_DIRECTORY") => return Err(self.errors.err("ENOTDIR")),
            _ => {}
        }

        let perm = (mode as u32) & !self.umask.load(Ordering::Acquire) & 0o7777;
        if create && !write {
            // std only creates through a writable handle
            let created = OpenOptions::new()
                .write(true)
                .create(true)
                .create_new(exclusive)
                .mode(perm)
                .open(target);
            drop(created.map_err(|e| self.errors.io(&e))?);
        }
        let mut options = OpenOptions::new();
        options
            .read(read)
            .write(write)
            .append(flags & self.c("O_APPEND") != 0)
            .truncate(write && flags & self.c("O_TRUNC") != 0)
            .mode(perm);
        if create && write {
            if exclusive {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }
        let file = options.open(target).map_err(|e| self.errors.io(&e))?;
        Ok(Channel::File {
            file,
            path: target.to_path_buf(),
        })
    }

    /// Anonymous file in directory `dir`: created under a unique name and unlinked at once.
    fn open_tmpfile(&self, dir: &Path, mode: i32) -> Result<i32> {
        let name = format!(
            ".posix-tmp-{}-{}",
            std::process::id(),
            NEXT_TMPFILE.fetch_add(1, Ordering::Relaxed)
        );
        let path = dir.join(name);
        let perm = (mode as u32) & !self.umask.load(Ordering::Acquire) & 0o7777;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(perm)
            .open(&path)
            .map_err(|e| self.errors.io(&e))?;
        fs::remove_file(&path).map_err(|e| self.errors.io(&e))?;
        Ok(self.resources.open(Channel::File { file, path }, None))
    }

    fn read_ready(&self, fd: i32) -> Result<bool> {
        let wrapper = self.wrapper(fd)?;
        if let Some(pipe) = wrapper.pipe_reader() {
            return Ok(pipe.readable());
        }
        let ready = match &*wrapper.channel() {
            Channel::File { .. } | Channel::Directory { .. } | Channel::Input(_) => true,
            Channel::Closed => return Err(self.errors.err("EBADF")),
            _ => false,
        };
        Ok(ready)
    }

    fn write_ready(&self, fd: i32) -> Result<bool> {
        let wrapper = self.wrapper(fd)?;
        if let Some(pipe) = wrapper.pipe_writer() {
            return Ok(pipe.writable());
        }
        let ready = match &*wrapper.channel() {
            Channel::File { .. } | Channel::Output(_) => true,
            Channel::Closed => return Err(self.errors.err("EBADF")),
            _ => false,
        };
        Ok(ready)
    }

    fn set_times_at(&self, target: &Path, times: FileTimes) -> std::io::Result<()> {
        File::open(target)?.set_times(times)
    }

    fn file_times(&self, times: Option<[Timespec; 2]>) -> Result<FileTimes> {
        file_times(times).ok_or_else(|| self.errors.err("EINVAL"))
    }

    fn timespecs(&self, times: Option<[Timeval; 2]>) -> Result<Option<[Timespec; 2]>> {
        timevals_to_timespecs(times).ok_or_else(|| self.errors.err("EINVAL"))
    }

    fn user_ids(&self, key: &str) -> (i64, i64) {
        host::ids(key).unwrap_or_else(|| {
            info!(
                target: COMPAT_TARGET,
                "Returning 0 for {} (process status is not readable in POSIX emulation layer)",
                key.trim_end_matches(':')
            );
            (0, 0)
        })
    }

    fn unix_path_limit(&self, path: &[u8]) -> usize {
        let max = self.constants.int("UNIX_PATH_MAX").unwrap_or(108) as usize;
        // abstract socket names need no terminating NUL
        if path.first() == Some(&0) {
            max
        } else {
            max.saturating_sub(1)
        }
    }
}

impl PosixSupport for EmulatedPosixSupport {
    fn set_env(&self, env: HostEnv) {
        self.resources.bind_std_streams(env);
    }

    fn get_backend(&self) -> &'static str {
        "emulated"
    }

    fn strerror(&self, code: i32) -> String {
        self.errors.strerror(code)
    }

    fn sysconf(&self, name: i32) -> Result<i64> {
        let is = |constant: &str| self.constants.int(constant) == Some(name as i64);
        if is("_SC_PAGESIZE") || is("_SC_PAGE_SIZE") {
            Ok(4096)
        } else if is("_SC_CLK_TCK") {
            Ok(100)
        } else if is("_SC_NPROCESSORS_ONLN") || is("_SC_NPROCESSORS_CONF") {
            Ok(std::thread::available_parallelism().map_or(1, |n| n.get() as i64))
        } else {
            Err(self.errors.err("EINVAL"))
        }
    }

    fn getpid(&self) -> i64 {
        std::process::id() as i64
    }

    fn getppid(&self) -> i64 {
        std::os::unix::process::parent_id() as i64
    }

    fn getuid(&self) -> i64 {
        self.user_ids("Uid:").0
    }

    fn geteuid(&self) -> i64 {
        self.user_ids("Uid:").1
    }

    fn getgid(&self) -> i64 {
        self.user_ids("Gid:").0
    }

    fn getegid(&self) -> i64 {
        self.user_ids("Gid:").1
    }

    fn getpgid(&self, _pid: i64) -> Result<i64> {
        Err(self.unsupported("getpgid"))
    }

    fn setpgid(&self, _pid: i64, _pgid: i64) -> Result<()> {
        Err(self.unsupported("setpgid"))
    }

    fn getpgrp(&self) -> Result<i64> {
        Err(self.unsupported("getpgrp"))
    }

    fn getsid(&self, _pid: i64) -> Result<i64> {
        Err(self.unsupported("getsid"))
    }

    fn setsid(&self) -> Result<i64> {
        Err(self.unsupported("setsid"))
    }

    fn getgroups(&self) -> Result<Vec<i64>> {
        host::groups().ok_or_else(|| self.unsupported("getgroups"))
    }

    fn umask(&self, mask: i32) -> Result<i32> {
        let previous = self.umask.swap((mask as u32) & 0o777, Ordering::AcqRel);
        self.umask_notice.call_once(|| {
            info!(
                target: COMPAT_TARGET,
                "Returning default umask '{:o}' (ignoring the real umask value set in the OS)", previous
            );
        });
        Ok(previous as i32)
    }

    fn openat(&self, dir_fd: i32, path: &PosixPath, flags: i32, mode: i32) -> Result<i32> {
        let target = self.resolve(dir_fd, path)?;
        if self.has_flag(flags, "O_TMPFILE") {
            return self
                .open_tmpfile(&target, mode)
                .map_err(|e| e.with_filename(path.to_string_lossy()));
        }
        let channel = self
            .open_channel(&target, flags, mode)
            .map_err(|e| e.with_filename(path.to_string_lossy()))?;
        debug!("Emulated open of {:?} as {}", target, channel.kind());
        Ok(self.resources.open(channel, Some(target)))
    }

    fn close(&self, fd: i32) -> Result<()> {
        self.wrapper(fd)?;
        self.release_lock_if_last(fd);
        if !self.resources.close(fd) {
            return Err(self.errors.err("EBADF"));
        }
        Ok(())
    }

    fn read(&self, fd: i32, length: usize) -> Result<Buffer> {
        let data = self.wrapper(fd)?.read(length, &self.errors)?;
        Ok(Buffer::wrap(data))
    }

    fn write(&self, fd: i32, data: &Buffer) -> Result<usize> {
        self.wrapper(fd)?.write(data.as_slice(), &self.errors)
    }

    fn dup(&self, fd: i32) -> Result<i32> {
        self.resources.dup(fd).ok_or_else(|| self.errors.err("EBADF"))
    }

    fn dup2(&self, fd: i32, fd2: i32, _inheritable: bool) -> Result<i32> {
        if fd2 < 0 {
            return Err(self.errors.err("EBADF"));
        }
        self.wrapper(fd)?;
        if fd != fd2 {
            self.release_lock_if_last(fd2);
        }
        self.resources
            .dup2(fd, fd2)
            .ok_or_else(|| self.errors.err("EBADF"))
    }

    fn get_inheritable(&self, fd: i32) -> Result<bool> {
        self.wrapper(fd)?;
        self.compat_ignored(format!(
            "getting inheritable for file descriptor {} in POSIX emulation layer (not supported, always returns false)",
            fd
        ));
        Ok(false)
    }

    fn set_inheritable(&self, fd: i32, inheritable: bool) -> Result<()> {
        self.wrapper(fd)?;
        self.compat_ignored(format!(
            "setting inheritable '{}' for file descriptor {} in POSIX emulation layer (not supported)",
            inheritable, fd
        ));
        Ok(())
    }

    fn pipe(&self) -> Result<[i32; 2]> {
        let pipe = Pipe::new();
        let read_end = self.resources.open(Channel::PipeReader(Arc::clone(&pipe)), None);
        let write_end = self.resources.open(Channel::PipeWriter(pipe), None);
        Ok([read_end, write_end])
    }

    fn select(
        &self,
        readfds: &[i32],
        writefds: &[i32],
        errorfds: &[i32],
        timeout: Option<Timeval>,
    ) -> Result<SelectResult> {
        let deadline = timeout.map(|t| Instant::now() + t.as_duration());
        loop {
            let result = SelectResult {
                readfds: readfds.iter().map(|fd| self.read_ready(*fd)).collect::<Result<_>>()?,
                writefds: writefds.iter().map(|fd| self.write_ready(*fd)).collect::<Result<_>>()?,
                errorfds: errorfds
                    .iter()
                    .map(|fd| self.wrapper(*fd).map(|_| false))
                    .collect::<Result<_>>()?,
            };
            let any = result.readfds.iter().chain(&result.writefds).any(|r| *r);
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => SELECT_POLL,
            };
            if any || remaining.is_zero() {
                return Ok(result);
            }
            std::thread::sleep(remaining.min(SELECT_POLL));
        }
    }

    fn lseek(&self, fd: i32, offset: i64, how: i32) -> Result<i64> {
        let pos = if how == self.c("SEEK_SET") {
            if offset < 0 {
                return Err(self.errors.err("EINVAL"));
            }
            SeekFrom::Start(offset as u64)
        } else if how == self.c("SEEK_CUR") {
            SeekFrom::Current(offset)
        } else if how == self.c("SEEK_END") {
            SeekFrom::End(offset)
        } else {
            return Err(self.errors.err("EINVAL"));
        };
        Ok(self.wrapper(fd)?.seek(pos, &self.errors)? as i64)
    }

    fn ftruncate(&self, fd: i32, length: i64) -> Result<()> {
        let length = u64::try_from(length).map_err(|_| self.errors.err("EINVAL"))?;
        self.wrapper(fd)?.with_file(&self.errors, |f| f.set_len(length))
    }

    fn truncate(&self, path: &PosixPath, length: i64) -> Result<()> {
        let length = u64::try_from(length).map_err(|_| self.errors.err("EINVAL"))?;
        let target = self.resolve(DEFAULT_DIR_FD, path)?;
        OpenOptions::new()
            .write(true)
            .open(&target)
            .and_then(|f| f.set_len(length))
            .map_err(|e| self.path_err(&e, path))
    }

    fn fsync(&self, fd: i32) -> Result<()> {
        self.wrapper(fd)?.with_file(&self.errors, |f| f.sync_all())
    }

    fn flock(&self, fd: i32, operation: i32) -> Result<()> {
        let wrapper = self.wrapper(fd)?;
        let path = self
            .resources
            .path(fd)
            .ok_or_else(|| self.errors.err("EINVAL"))?;
        let nonblocking = operation & self.c_opt("LOCK_NB") != 0;
        let op = operation & !self.c_opt("LOCK_NB");
        if op == self.c_opt("LOCK_UN") {
            self.locks.release(&path, wrapper.id());
            wrapper.set_held_lock(None);
            return Ok(());
        }
        let kind = if op == self.c_opt("LOCK_SH") {
            LockKind::Shared
        } else if op == self.c_opt("LOCK_EX") {
            LockKind::Exclusive
        } else {
            return Err(self.errors.err("EINVAL"));
        };
        if !self.locks.acquire(&path, wrapper.id(), kind, nonblocking) {
            return Err(self.errors.err("EAGAIN"));
        }
        wrapper.set_held_lock(Some(kind));
        Ok(())
    }

    fn fcntl_lock(
        &self,
        _fd: i32,
        _blocking: bool,
        _lock_type: i32,
        _whence: i32,
        _start: i64,
        _length: i64,
    ) -> Result<()> {
        Err(self.unsupported("fcntl record locks"))
    }

    fn get_blocking(&self, fd: i32) -> Result<bool> {
        Ok(!self.wrapper(fd)?.nonblocking())
    }

    fn set_blocking(&self, fd: i32, blocking: bool) -> Result<()> {
        self.wrapper(fd)?.set_nonblocking(!blocking);
        Ok(())
    }

    fn get_terminal_size(&self, fd: i32) -> Result<(i32, i32)> {
        if !self.isatty(fd) {
            return Err(self.errors.err("ENOTTY"));
        }
        let env_size = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<i32>().ok());
        let size = (env_size("COLUMNS").unwrap_or(80), env_size("LINES").unwrap_or(24));
        info!(
            target: COMPAT_TARGET,
            "Returning terminal size {}x{} from the environment (no terminal query in POSIX emulation layer)",
            size.0,
            size.1
        );
        Ok(size)
    }

    fn isatty(&self, fd: i32) -> bool {
        let Some(wrapper) = self.resources.get(fd) else {
            return false;
        };
        let channel = wrapper.channel();
        match &*channel {
            Channel::File { file, .. } => file.is_terminal(),
            Channel::Input(_) => std::io::stdin().is_terminal(),
            Channel::Output(_) if fd == 2 => std::io::stderr().is_terminal(),
            Channel::Output(_) => std::io::stdout().is_terminal(),
            _ => false,
        }
    }

    fn fstatat(&self, dir_fd: i32, path: &PosixPath, follow_symlinks: bool) -> Result<StatResult> {
        let target = self.resolve(dir_fd, path)?;
        let meta = if follow_symlinks {
            fs::metadata(&target)
        } else {
            fs::symlink_metadata(&target)
        };
        let meta = meta.map_err(|e| self.path_err(&e, path))?;
        Ok(self.stat_result(&meta, &target))
    }

    fn fstat(&self, fd: i32) -> Result<StatResult> {
        let wrapper = self.wrapper(fd)?;
        let channel = wrapper.channel();
        match &*channel {
            Channel::File { file, path } => {
                let meta = file.metadata().map_err(|e| self.errors.io(&e))?;
                Ok(self.stat_result(&meta, path))
            }
            Channel::Directory { path } => {
                let meta = fs::metadata(path).map_err(|e| self.errors.io(&e))?;
                Ok(self.stat_result(&meta, path))
            }
            Channel::PipeReader(_) | Channel::PipeWriter(_) => Ok(self.synthetic_stat("S_IFIFO")),
            Channel::Input(_) | Channel::Output(_) => Ok(self.synthetic_stat("S_IFCHR")),
            Channel::Closed => Err(self.errors.err("EBADF")),
        }
    }

    fn statvfs(&self, _path: &PosixPath) -> Result<StatvfsResult> {
        Err(self.unsupported("statvfs"))
    }

    fn fstatvfs(&self, _fd: i32) -> Result<StatvfsResult> {
        Err(self.unsupported("fstatvfs"))
    }

    fn uname(&self) -> Result<UnameResult> {
        Ok(host::uname())
    }

    fn unlinkat(&self, dir_fd: i32, path: &PosixPath, rmdir: bool) -> Result<()> {
        let target = self.resolve(dir_fd, path)?;
        let result = if rmdir {
            fs::remove_dir(&target)
        } else {
            fs::remove_file(&target)
        };
        result.map_err(|e| self.path_err(&e, path))
    }

    fn linkat(
        &self,
        old_dir_fd: i32,
        old_path: &PosixPath,
        new_dir_fd: i32,
        new_path: &PosixPath,
        _flags: i32,
    ) -> Result<()> {
        let old = self.resolve(old_dir_fd, old_path)?;
        let new = self.resolve(new_dir_fd, new_path)?;
        fs::hard_link(&old, &new).map_err(|e| {
            self.errors.io(&e).with_filenames(
                Some(old_path.to_string_lossy()),
                Some(new_path.to_string_lossy()),
            )
        })
    }

    fn symlinkat(&self, target: &PosixPath, link_dir_fd: i32, link_path: &PosixPath) -> Result<()> {
        let link = self.resolve(link_dir_fd, link_path)?;
        std::os::unix::fs::symlink(target.as_path(), &link).map_err(|e| {
            self.errors.io(&e).with_filenames(
                Some(target.to_string_lossy()),
                Some(link_path.to_string_lossy()),
            )
        })
    }

    fn mkdirat(&self, dir_fd: i32, path: &PosixPath, mode: i32) -> Result<()> {
        let target = self.resolve(dir_fd, path)?;
        let perm = (mode as u32) & !self.umask.load(Ordering::Acquire) & 0o7777;
        DirBuilder::new()
            .mode(perm)
            .create(&target)
            .map_err(|e| self.path_err(&e, path))
    }

    fn getcwd(&self) -> Result<PosixPath> {
        PosixPath::from_os_str(self.cwd().as_os_str()).ok_or_else(|| self.errors.err("ENOENT"))
    }

    fn chdir(&self, path: &PosixPath) -> Result<()> {
        let target = self.resolve(DEFAULT_DIR_FD, path)?;
        let meta = fs::metadata(&target).map_err(|e| self.path_err(&e, path))?;
        if !meta.is_dir() {
            return Err(self.errors.err("ENOTDIR").with_filename(path.to_string_lossy()));
        }
        let target = fs::canonicalize(&target).unwrap_or(target);
        *self.cwd.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = target;
        Ok(())
    }

    fn fchdir(&self, fd: i32) -> Result<()> {
        let wrapper = self.wrapper(fd)?;
        let target = match &*wrapper.channel() {
            Channel::Directory { path } => path.clone(),
            _ => return Err(self.errors.err("ENOTDIR")),
        };
        *self.cwd.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = target;
        Ok(())
    }

    fn renameat(
        &self,
        old_dir_fd: i32,
        old_path: &PosixPath,
        new_dir_fd: i32,
        new_path: &PosixPath,
    ) -> Result<()> {
        let old = self.resolve(old_dir_fd, old_path)?;
        let new = self.resolve(new_dir_fd, new_path)?;
        fs::rename(&old, &new).map_err(|e| {
            self.errors.io(&e).with_filenames(
                Some(old_path.to_string_lossy()),
                Some(new_path.to_string_lossy()),
            )
        })
    }

    fn faccessat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        mode: i32,
        effective_ids: bool,
        follow_symlinks: bool,
    ) -> bool {
        let Ok(target) = self.resolve(dir_fd, path) else {
            return false;
        };
        let meta = if follow_symlinks {
            fs::metadata(&target)
        } else {
            fs::symlink_metadata(&target)
        };
        let Ok(meta) = meta else {
            return false;
        };
        if mode == self.c("F_OK") {
            return true;
        }
        let (uid, gid) = if effective_ids {
            (self.geteuid(), self.getegid())
        } else {
            (self.getuid(), self.getgid())
        };
        let perm = meta.mode();
        let wants = |bit: &str| mode & self.c(bit) != 0;
        if uid == 0 {
            // root passes read/write checks; execute needs some x bit
            return !wants("X_OK") || perm & 0o111 != 0;
        }
        let bits = if meta.uid() as i64 == uid {
            perm >> 6
        } else if meta.gid() as i64 == gid {
            perm >> 3
        } else {
            perm
        };
        (!wants("R_OK") || bits & 0o4 != 0)
            && (!wants("W_OK") || bits & 0o2 != 0)
            && (!wants("X_OK") || bits & 0o1 != 0)
    }

    fn fchmodat(&self, dir_fd: i32, path: &PosixPath, mode: i32, follow_symlinks: bool) -> Result<()> {
        let target = self.resolve(dir_fd, path)?;
        if !follow_symlinks {
            let is_link = fs::symlink_metadata(&target)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                return Err(self.errors.err("EOPNOTSUPP").with_filename(path.to_string_lossy()));
            }
        }
        fs::set_permissions(&target, Permissions::from_mode(mode as u32))
            .map_err(|e| self.path_err(&e, path))
    }

    fn fchmod(&self, fd: i32, mode: i32) -> Result<()> {
        let wrapper = self.wrapper(fd)?;
        let perm = Permissions::from_mode(mode as u32);
        if let Channel::Directory { path } = &*wrapper.channel() {
            return fs::set_permissions(path, perm).map_err(|e| self.errors.io(&e));
        }
        wrapper.with_file(&self.errors, |f| f.set_permissions(perm))
    }

    fn fchownat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        owner: i64,
        group: i64,
        follow_symlinks: bool,
    ) -> Result<()> {
        let target = self.resolve(dir_fd, path)?;
        let result = if follow_symlinks {
            std::os::unix::fs::chown(&target, id_arg(owner), id_arg(group))
        } else {
            std::os::unix::fs::lchown(&target, id_arg(owner), id_arg(group))
        };
        result.map_err(|e| self.path_err(&e, path))
    }

    fn fchown(&self, fd: i32, owner: i64, group: i64) -> Result<()> {
        self.wrapper(fd)?.with_file(&self.errors, |f| {
            std::os::unix::fs::fchown(&*f, id_arg(owner), id_arg(group))
        })
    }

    fn readlinkat(&self, dir_fd: i32, path: &PosixPath) -> Result<PosixPath> {
        let target = self.resolve(dir_fd, path)?;
        let link = fs::read_link(&target).map_err(|e| self.path_err(&e, path))?;
        Ok(PosixPath::from_c_bytes(link.as_os_str().as_bytes()))
    }

    fn utimensat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        times: Option<[Timespec; 2]>,
        follow_symlinks: bool,
    ) -> Result<()> {
        if !follow_symlinks {
            return Err(self.unsupported("setting symlink timestamps"));
        }
        let times = self.file_times(times)?;
        let target = self.resolve(dir_fd, path)?;
        self.set_times_at(&target, times)
            .map_err(|e| self.path_err(&e, path))
    }

    fn futimens(&self, fd: i32, times: Option<[Timespec; 2]>) -> Result<()> {
        let wrapper = self.wrapper(fd)?;
        let times = self.file_times(times)?;
        if let Channel::Directory { path } = &*wrapper.channel() {
            return self.set_times_at(path, times).map_err(|e| self.errors.io(&e));
        }
        wrapper.with_file(&self.errors, |f| f.set_times(times))
    }

    fn futimes(&self, fd: i32, times: Option<[Timeval; 2]>) -> Result<()> {
        self.futimens(fd, self.timespecs(times)?)
    }

    fn lutimes(&self, _path: &PosixPath, _times: Option<[Timeval; 2]>) -> Result<()> {
        Err(self.unsupported("lutimes"))
    }

    fn utimes(&self, path: &PosixPath, times: Option<[Timeval; 2]>) -> Result<()> {
        self.utimensat(DEFAULT_DIR_FD, path, self.timespecs(times)?, true)
    }

    fn opendir(&self, path: &PosixPath) -> Result<DirStream> {
        let target = self.resolve(DEFAULT_DIR_FD, path)?;
        let dir = EmulatedDir::open(target, None, &self.errors)
            .map_err(|e| e.with_filename(path.to_string_lossy()))?;
        Ok(DirStream(OpaqueHandle::new(dir)))
    }

    fn fdopendir(&self, fd: i32) -> Result<DirStream> {
        let wrapper = self.wrapper(fd)?;
        let path = match &*wrapper.channel() {
            Channel::Directory { path } => path.clone(),
            _ => return Err(self.errors.err("ENOTDIR")),
        };
        let dir = EmulatedDir::open(path, Some(fd), &self.errors)?;
        Ok(DirStream(OpaqueHandle::new(dir)))
    }

    fn closedir(&self, stream: &DirStream) -> Result<()> {
        let dir = self.dir(stream)?;
        if let Some(Some(fd)) = dir.close() {
            self.close(fd)?;
        }
        Ok(())
    }

    fn readdir(&self, stream: &DirStream) -> Result<Option<DirEntry>> {
        let dir = self.dir(stream)?;
        Ok(dir.next(&self.errors)?.map(|raw| DirEntry {
            inode: self.resources.inode_of(&raw.path),
            d_type: dir::d_type(self.constants, raw.file_type),
            name: raw.name,
        }))
    }

    fn rewinddir(&self, stream: &DirStream) {
        if let Ok(dir) = self.dir(stream) {
            dir.rewind();
        }
    }

    fn dir_entry_get_name(&self, entry: &DirEntry) -> PosixPath {
        PosixPath::from_c_bytes(&entry.name)
    }

    fn dir_entry_get_path(&self, entry: &DirEntry, scandir_path: &PosixPath) -> PosixPath {
        scandir_path.join(&entry.name)
    }

    fn dir_entry_get_inode(&self, entry: &DirEntry) -> Result<u64> {
        Ok(entry.inode)
    }

    fn dir_entry_get_type(&self, entry: &DirEntry) -> i32 {
        entry.d_type
    }

    fn kill(&self, pid: i64, signal: i32) -> Result<()> {
        if signal == 0 {
            let exists = if pid == PROCESS_GROUP {
                self.resources.has_children()
            } else {
                pid > 0 && self.resources.child_id(pid).is_some()
            };
            return if exists { Ok(()) } else { Err(self.errors.err("ESRCH")) };
        }
        if self.constants.int("SIGKILL") != Some(signal as i64) {
            info!(
                target: COMPAT_TARGET,
                "Delivering signal {} as SIGKILL (POSIX emulation layer can only terminate children)", signal
            );
        }
        match self.resources.kill(pid) {
            Some(result) => result.map_err(|e| self.errors.io(&e)),
            None => Err(self.errors.err("ESRCH")),
        }
    }

    fn killpg(&self, _pgid: i64, _signal: i32) -> Result<()> {
        Err(self.unsupported("killpg"))
    }

    fn waitpid(&self, pid: i64, options: i32) -> Result<(i64, i32)> {
        let nohang = self
            .constants
            .int("WNOHANG")
            .is_some_and(|flag| options as i64 & flag != 0);
        loop {
            match self.resources.try_wait(pid).map_err(|e| self.errors.io(&e))? {
                WaitOutcome::Exited(reaped, status) => return Ok((reaped, process::encode_status(status))),
                WaitOutcome::Running if nohang => return Ok((0, 0)),
                WaitOutcome::Running => std::thread::sleep(WAIT_POLL),
                WaitOutcome::NoChild => return Err(self.errors.err("ECHILD")),
            }
        }
    }

    fn abort(&self) -> ! {
        std::process::abort()
    }

    fn wcoredump(&self, status: i32) -> bool {
        process::wcoredump(status)
    }

    fn wifcontinued(&self, status: i32) -> bool {
        process::wifcontinued(status)
    }

    fn wifstopped(&self, status: i32) -> bool {
        process::wifstopped(status)
    }

    fn wifsignaled(&self, status: i32) -> bool {
        process::wifsignaled(status)
    }

    fn wifexited(&self, status: i32) -> bool {
        process::wifexited(status)
    }

    fn wexitstatus(&self, status: i32) -> i32 {
        process::wexitstatus(status)
    }

    fn wtermsig(&self, status: i32) -> i32 {
        process::wtermsig(status)
    }

    fn wstopsig(&self, status: i32) -> i32 {
        process::wstopsig(status)
    }

    fn fork_exec(&self, request: &ForkExecRequest) -> Result<i64> {
        let child = process::spawn(&self.resources, &self.errors, &self.cwd(), request)?;
        Ok(self.resources.add_child(child))
    }

    fn execv(&self, _path: &PosixPath, _args: &[PosixPath]) -> Result<()> {
        Err(self.unsupported("execv"))
    }

    fn system(&self, command: &[u8]) -> Result<i32> {
        process::system(command, &self.cwd(), &self.errors)
    }

    fn openpty(&self) -> Result<OpenPtyResult> {
        Err(self.unsupported("openpty"))
    }

    fn ctermid(&self) -> Result<String> {
        Ok("/dev/tty".to_string())
    }

    fn setenv(&self, name: &PosixPath, value: &PosixPath, overwrite: bool) -> Result<()> {
        if name.is_empty() || name.as_bytes().contains(&b'=') {
            return Err(self.errors.err("EINVAL"));
        }
        let key = name.as_path().as_os_str();
        if overwrite || std::env::var_os(key).is_none() {
            std::env::set_var(key, value.as_path().as_os_str());
        }
        Ok(())
    }

    fn unsetenv(&self, name: &PosixPath) -> Result<()> {
        if name.is_empty() || name.as_bytes().contains(&b'=') {
            return Err(self.errors.err("EINVAL"));
        }
        std::env::remove_var(name.as_path().as_os_str());
        Ok(())
    }

    fn mmap(&self, length: usize, prot: i32, flags: i32, fd: i32, offset: i64) -> Result<MmapHandle> {
        let offset = u64::try_from(offset).map_err(|_| self.errors.err("EINVAL"))?;
        let writable = prot & self.constants.int("PROT_WRITE").unwrap_or(2) as i32 != 0;
        let map = if fd < 0 || self.has_flag(flags, "MAP_ANONYMOUS") {
            if length == 0 {
                return Err(self.errors.err("EINVAL"));
            }
            EmulatedMmap::anonymous(length, writable)
        } else {
            let shared = self.has_flag(flags, "MAP_SHARED");
            let file = self
                .wrapper(fd)?
                .with_file(&self.errors, |f| f.try_clone())?;
            EmulatedMmap::from_file(file, length, offset, writable, shared, &self.errors)?
        };
        Ok(MmapHandle(OpaqueHandle::new(map)))
    }

    fn mmap_read_byte(&self, mmap: &MmapHandle, index: usize) -> Result<u8> {
        self.map(mmap)?.read_byte(index, &self.errors)
    }

    fn mmap_write_byte(&self, mmap: &MmapHandle, index: usize, value: u8) -> Result<()> {
        self.map(mmap)?.write_byte(index, value, &self.errors)
    }

    fn mmap_read_bytes(&self, mmap: &MmapHandle, index: usize, out: &mut [u8]) -> Result<usize> {
        self.map(mmap)?.read_bytes(index, out, &self.errors)
    }

    fn mmap_write_bytes(&self, mmap: &MmapHandle, index: usize, data: &[u8]) -> Result<()> {
        self.map(mmap)?.write_bytes(index, data, &self.errors)
    }

    fn mmap_flush(&self, mmap: &MmapHandle, offset: usize, length: usize) -> Result<()> {
        self.map(mmap)?.flush(offset, length, &self.errors)
    }

    fn mmap_unmap(&self, mmap: &MmapHandle, _length: usize) -> Result<()> {
        self.map(mmap)?.unmap(&self.errors)
    }

    fn mmap_get_pointer(&self, _mmap: &MmapHandle) -> Result<usize> {
        Err(self.unsupported("raw mmap pointers"))
    }

    fn getpwuid(&self, uid: i64) -> Result<Option<PwdResult>> {
        Ok(host::passwd_entries().into_iter().find(|p| p.uid == uid))
    }

    fn getpwnam(&self, name: &PosixPath) -> Result<Option<PwdResult>> {
        let name = name.to_string_lossy();
        Ok(host::passwd_entries().into_iter().find(|p| p.name == name))
    }

    fn has_getpwentries(&self) -> bool {
        false
    }

    fn getpwentries(&self) -> Result<Vec<PwdResult>> {
        Err(self.unsupported("password database enumeration"))
    }

    fn ioctl_bytes(&self, _fd: i32, _request: u64, _arg: &mut [u8]) -> Result<i32> {
        Err(self.unsupported("ioctl"))
    }

    fn ioctl_int(&self, _fd: i32, _request: u64, _arg: i64) -> Result<i32> {
        Err(self.unsupported("ioctl"))
    }

    fn socket(&self, _domain: i32, _sock_type: i32, _protocol: i32) -> Result<i32> {
        Err(self.unsupported("sockets"))
    }

    fn accept(&self, _sockfd: i32) -> Result<AcceptResult> {
        Err(self.unsupported("sockets"))
    }

    fn bind(&self, _sockfd: i32, _addr: &dyn UniversalSockAddr) -> Result<()> {
        Err(self.unsupported("sockets"))
    }

    fn connect(&self, _sockfd: i32, _addr: &dyn UniversalSockAddr) -> Result<()> {
        Err(self.unsupported("sockets"))
    }

    fn listen(&self, _sockfd: i32, _backlog: i32) -> Result<()> {
        Err(self.unsupported("sockets"))
    }

    fn getpeername(&self, _sockfd: i32) -> Result<Box<dyn UniversalSockAddr>> {
        Err(self.unsupported("sockets"))
    }

    fn getsockname(&self, _sockfd: i32) -> Result<Box<dyn UniversalSockAddr>> {
        Err(self.unsupported("sockets"))
    }

    fn send(&self, _sockfd: i32, _data: &[u8], _flags: i32) -> Result<usize> {
        Err(self.unsupported("sockets"))
    }

    fn sendto(
        &self,
        _sockfd: i32,
        _data: &[u8],
        _flags: i32,
        _dest: &dyn UniversalSockAddr,
    ) -> Result<usize> {
        Err(self.unsupported("sockets"))
    }

    fn recv(&self, _sockfd: i32, _length: usize, _flags: i32) -> Result<Buffer> {
        Err(self.unsupported("sockets"))
    }

    fn recvfrom(&self, _sockfd: i32, _length: usize, _flags: i32) -> Result<RecvfromResult> {
        Err(self.unsupported("sockets"))
    }

    fn shutdown(&self, _sockfd: i32, _how: i32) -> Result<()> {
        Err(self.unsupported("sockets"))
    }

    fn getsockopt(&self, _sockfd: i32, _level: i32, _optname: i32, _optlen: usize) -> Result<Vec<u8>> {
        Err(self.unsupported("sockets"))
    }

    fn setsockopt(&self, _sockfd: i32, _level: i32, _optname: i32, _optval: &[u8]) -> Result<()> {
        Err(self.unsupported("sockets"))
    }

    fn inet_addr(&self, src: &str) -> i32 {
        parse_inet_aton(src).map_or(-1, |a| a as i32)
    }

    fn inet_aton(&self, src: &str) -> Result<i32> {
        parse_inet_aton(src)
            .map(|a| a as i32)
            .ok_or(PosixSupportError::InvalidAddress)
    }

    fn inet_ntoa(&self, address: i32) -> String {
        Ipv4Addr::from(address as u32).to_string()
    }

    fn inet_pton(&self, family: i32, src: &str) -> Result<Vec<u8>> {
        net::inet_pton(self.constants, family, src)
    }

    fn inet_ntop(&self, family: i32, src: &[u8]) -> Result<String> {
        net::inet_ntop(self.constants, family, src)
    }

    fn gethostname(&self) -> Result<String> {
        Ok(host::hostname())
    }

    fn getnameinfo(&self, addr: &dyn UniversalSockAddr, flags: i32) -> Result<(String, String)> {
        net::getnameinfo(self.constants, addr, flags)
    }

    fn getaddrinfo(
        &self,
        node: Option<&str>,
        service: Option<&str>,
        family: i32,
        sock_type: i32,
        protocol: i32,
        flags: i32,
    ) -> Result<Box<dyn AddrInfoCursor>> {
        let query = AddrInfoQuery {
            node,
            service,
            family,
            sock_type,
            protocol,
            flags,
        };
        Ok(Box::new(net::getaddrinfo(self.constants, &query)?))
    }

    fn crypt(&self, _word: &[u8], _salt: &[u8]) -> Result<Vec<u8>> {
        Err(self.unsupported("crypt"))
    }

    fn sem_open(&self, _name: &PosixPath, _open_flags: i32, _mode: i32, _value: u32) -> Result<SemHandle> {
        Err(self.unsupported("named semaphores"))
    }

    fn sem_close(&self, _handle: SemHandle) -> Result<()> {
        Err(self.unsupported("named semaphores"))
    }

    fn sem_unlink(&self, _name: &PosixPath) -> Result<()> {
        Err(self.unsupported("named semaphores"))
    }

    fn sem_get_value(&self, _handle: SemHandle) -> Result<i32> {
        Err(self.unsupported("named semaphores"))
    }

    fn sem_post(&self, _handle: SemHandle) -> Result<()> {
        Err(self.unsupported("named semaphores"))
    }

    fn sem_wait(&self, _handle: SemHandle) -> Result<()> {
        Err(self.unsupported("named semaphores"))
    }

    fn sem_try_wait(&self, _handle: SemHandle) -> Result<()> {
        Err(self.unsupported("named semaphores"))
    }

    fn sem_timed_wait(&self, _handle: SemHandle, _deadline_ns: i64) -> Result<()> {
        Err(self.unsupported("named semaphores"))
    }

    fn create_universal_sock_addr_inet4(&self, src: &Inet4SockAddr) -> Box<dyn UniversalSockAddr> {
        Box::new(EmulatedSockAddr::new(self.constants, FamilySockAddr::Inet4(*src)))
    }

    fn create_universal_sock_addr_inet6(&self, src: &Inet6SockAddr) -> Box<dyn UniversalSockAddr> {
        Box::new(EmulatedSockAddr::new(self.constants, FamilySockAddr::Inet6(*src)))
    }

    fn create_universal_sock_addr_unix(&self, src: &UnixSockAddr) -> Result<Box<dyn UniversalSockAddr>> {
        if src.path.len() > self.unix_path_limit(&src.path) {
            return Err(PosixSupportError::InvalidUnixSocketPath);
        }
        Ok(Box::new(EmulatedSockAddr::new(
            self.constants,
            FamilySockAddr::Unix(src.clone()),
        )))
    }

    fn create_path_from_string(&self, path: &str) -> Option<PosixPath> {
        PosixPath::from_string(path)
    }

    fn create_path_from_bytes(&self, path: &[u8]) -> Option<PosixPath> {
        PosixPath::from_bytes(path)
    }

    fn get_path_as_string(&self, path: &PosixPath) -> String {
        path.to_string_lossy()
    }

    fn get_path_as_bytes(&self, path: &PosixPath) -> Vec<u8> {
        path.as_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::Platform;

    fn backend() -> EmulatedPosixSupport {
        EmulatedPosixSupport::new(PosixConstants::for_platform(Platform::Linux), 0o022)
    }

    fn path(s: &str) -> PosixPath {
        PosixPath::from_string(s).unwrap()
    }

    #[test]
    fn test_umask_returns_previous_value() {
        let posix = backend();
        assert_eq!(posix.umask(0o077).unwrap(), 0o022);
        assert_eq!(posix.umask(0o022).unwrap(), 0o077);
    }

    #[test]
    fn test_unknown_dir_fd_is_ebadf() {
        let posix = backend();
        let err = posix.openat(42, &path("relative"), 0, 0).unwrap_err();
        assert_eq!(err.errno(), Some(9));
    }

    #[test]
    fn test_lseek_on_pipe_is_espipe() {
        let posix = backend();
        let [r, w] = posix.pipe().unwrap();
        assert_eq!(posix.lseek(r, 0, 0).unwrap_err().errno(), Some(29));
        posix.close(r).unwrap();
        posix.close(w).unwrap();
    }

    #[test]
    fn test_open_relative_to_dir_fd() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("inner"), b"content").unwrap();
        let dir_fd = posix
            .openat(DEFAULT_DIR_FD, &path(dir.path().to_str().unwrap()), 0, 0)
            .unwrap();
        let fd = posix.openat(dir_fd, &path("inner"), 0, 0).unwrap();
        assert_eq!(posix.read(fd, 100).unwrap().as_slice(), b"content");
        assert_eq!(posix.write(dir_fd, &Buffer::from_slice(b"x")).unwrap_err().errno(), Some(21));
        posix.close(fd).unwrap();
        posix.close(dir_fd).unwrap();
    }

    #[test]
    fn test_exclusive_create_and_error_filename() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        let p = path(file.to_str().unwrap());
        let flags = 0o1 | 0o100 | 0o200;
        let fd = posix.openat(DEFAULT_DIR_FD, &p, flags, 0o644).unwrap();
        posix.close(fd).unwrap();
        let err = posix.openat(DEFAULT_DIR_FD, &p, flags, 0o644).unwrap_err();
        assert_eq!(err.errno(), Some(17));
        assert!(err.to_string().contains(file.to_str().unwrap()));
        assert_eq!(fs::metadata(&file).unwrap().mode() & 0o777, 0o644);
    }

    #[test]
    fn test_tmpfile_leaves_no_name_behind() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        let o_tmpfile = 0o20200000 | 0o2;
        let fd = posix
            .openat(DEFAULT_DIR_FD, &path(dir.path().to_str().unwrap()), o_tmpfile, 0o600)
            .unwrap();
        assert_eq!(posix.write(fd, &Buffer::from_slice(b"abc")).unwrap(), 3);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        posix.close(fd).unwrap();
    }

    #[test]
    fn test_flock_between_descriptors() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lock");
        fs::write(&file, b"").unwrap();
        let p = path(file.to_str().unwrap());
        let a = posix.openat(DEFAULT_DIR_FD, &p, 0, 0).unwrap();
        let b = posix.openat(DEFAULT_DIR_FD, &p, 0, 0).unwrap();
        let (sh, ex, nb, un) = (1, 2, 4, 8);
        posix.flock(a, ex).unwrap();
        assert_eq!(posix.flock(b, sh | nb).unwrap_err().errno(), Some(11));
        posix.flock(a, un).unwrap();
        posix.flock(b, sh | nb).unwrap();
        posix.close(b).unwrap();
        posix.flock(a, ex | nb).unwrap();
        posix.close(a).unwrap();
    }

    #[test]
    fn test_dup2_over_locked_descriptor_releases_lock() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lock");
        fs::write(&file, b"").unwrap();
        let p = path(file.to_str().unwrap());
        let a = posix.openat(DEFAULT_DIR_FD, &p, 0, 0).unwrap();
        let b = posix.openat(DEFAULT_DIR_FD, &p, 0, 0).unwrap();
        let [r, w] = posix.pipe().unwrap();
        let (ex, nb) = (2, 4);
        posix.flock(a, ex).unwrap();
        assert_eq!(posix.flock(b, ex | nb).unwrap_err().errno(), Some(11));
        assert_eq!(posix.dup2(r, a, true).unwrap(), a);
        posix.flock(b, ex | nb).unwrap();
        for fd in [a, b, r, w] {
            posix.close(fd).unwrap();
        }
    }

    #[test]
    fn test_dup2_onto_itself_keeps_lock() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lock");
        fs::write(&file, b"").unwrap();
        let p = path(file.to_str().unwrap());
        let a = posix.openat(DEFAULT_DIR_FD, &p, 0, 0).unwrap();
        let b = posix.openat(DEFAULT_DIR_FD, &p, 0, 0).unwrap();
        let (ex, nb) = (2, 4);
        posix.flock(a, ex).unwrap();
        assert_eq!(posix.dup2(a, a, true).unwrap(), a);
        assert_eq!(posix.flock(b, ex | nb).unwrap_err().errno(), Some(11));
        posix.close(a).unwrap();
        posix.close(b).unwrap();
    }

    #[test]
    fn test_kill_signal_zero_checks_existence() {
        let posix = backend();
        assert_eq!(posix.kill(0, 0).unwrap_err().errno(), Some(3));
        let request = ForkExecRequest::new(
            vec![path("/bin/sleep")],
            vec![b"sleep".to_vec(), b"2".to_vec()],
        );
        let pid = posix.fork_exec(&request).unwrap();
        posix.kill(pid, 0).unwrap();
        posix.kill(0, 0).unwrap();
        assert_eq!(posix.kill(-5, 0).unwrap_err().errno(), Some(3));
        assert_eq!(posix.kill(pid + 100, 0).unwrap_err().errno(), Some(3));

        posix.kill(pid, 9).unwrap();
        let (reaped, status) = posix.waitpid(pid, 0).unwrap();
        assert_eq!(reaped, pid);
        assert!(posix.wifsignaled(status));
        assert_eq!(posix.kill(pid, 0).unwrap_err().errno(), Some(3));
    }

    #[test]
    fn test_out_of_range_times_are_einval() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("stamp");
        fs::write(&file, b"").unwrap();
        let p = path(file.to_str().unwrap());
        let fd = posix.openat(DEFAULT_DIR_FD, &p, 0, 0).unwrap();
        let ok = Timespec::new(1_000, 0);
        let einval = Some(22);

        let huge = Timeval::new(0, i64::MAX / 100);
        assert_eq!(posix.futimes(fd, Some([huge, Timeval::new(0, 0)])).unwrap_err().errno(), einval);
        let negative = Timeval::new(0, -1);
        assert_eq!(posix.utimes(&p, Some([negative, negative])).unwrap_err().errno(), einval);
        for nanos in [1_000_000_000, -1] {
            let bad = Timespec::new(1_000, nanos);
            assert_eq!(posix.futimens(fd, Some([ok, bad])).unwrap_err().errno(), einval);
            assert_eq!(
                posix.utimensat(DEFAULT_DIR_FD, &p, Some([bad, ok]), true).unwrap_err().errno(),
                einval
            );
        }

        posix.futimes(fd, Some([Timeval::new(1_000, 999_999), Timeval::new(2_000, 500_000)])).unwrap();
        let modified = fs::metadata(&file).unwrap().modified().unwrap();
        assert_eq!(modified, UNIX_EPOCH + Duration::new(2_000, 500_000_000));
        posix.close(fd).unwrap();
    }

    #[test]
    fn test_fdopendir_closes_its_descriptor() {
        let posix = backend();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x"), b"").unwrap();
        let fd = posix
            .openat(DEFAULT_DIR_FD, &path(dir.path().to_str().unwrap()), 0, 0)
            .unwrap();
        let stream = posix.fdopendir(fd).unwrap();
        let entry = posix.readdir(&stream).unwrap().unwrap();
        assert_eq!(posix.dir_entry_get_name(&entry).as_bytes(), b"x");
        assert_eq!(posix.dir_entry_get_type(&entry), 8);
        posix.closedir(&stream).unwrap();
        posix.closedir(&stream).unwrap();
        assert!(!posix.open_fds().contains(&fd));
    }

    #[test]
    fn test_select_reports_readable_pipe() {
        let posix = backend();
        let [r, w] = posix.pipe().unwrap();
        let poll = Some(Timeval::new(0, 0));
        let result = posix.select(&[r], &[w], &[], poll).unwrap();
        assert_eq!(result.readfds, vec![false]);
        assert_eq!(result.writefds, vec![true]);
        posix.write(w, &Buffer::from_slice(b"!")).unwrap();
        let result = posix.select(&[r], &[], &[], Some(Timeval::new(1, 0))).unwrap();
        assert_eq!(result.readfds, vec![true]);
        assert_eq!(posix.select(&[77], &[], &[], poll).unwrap_err().errno(), Some(9));
    }

    #[test]
    fn test_nonblocking_pipe_read() {
        let posix = backend();
        let [r, _w] = posix.pipe().unwrap();
        assert!(posix.get_blocking(r).unwrap());
        posix.set_blocking(r, false).unwrap();
        assert_eq!(posix.read(r, 1).unwrap_err().errno(), Some(11));
    }

    #[test]
    fn test_fork_exec_into_pipe_and_waitpid() {
        let posix = backend();
        let [r, w] = posix.pipe().unwrap();
        let mut request = ForkExecRequest::new(
            vec![path("/no/such/echo"), path("/bin/echo")],
            vec![b"echo".to_vec(), b"hello".to_vec()],
        );
        request.stdout_write_fd = w;
        let pid = posix.fork_exec(&request).unwrap();
        posix.close(w).unwrap();

        let mut output = Vec::new();
        loop {
            let chunk = posix.read(r, 64).unwrap();
            if chunk.is_empty() {
                break;
            }
            output.extend_from_slice(chunk.as_slice());
        }
        assert_eq!(output, b"hello\n");

        let (reaped, status) = posix.waitpid(pid, 0).unwrap();
        assert_eq!(reaped, pid);
        assert!(posix.wifexited(status));
        assert_eq!(posix.wexitstatus(status), 0);
        assert_eq!(posix.waitpid(pid, 0).unwrap_err().errno(), Some(10));
    }

    #[test]
    fn test_unsupported_features() {
        let posix = backend();
        assert!(matches!(
            posix.socket(2, 1, 0),
            Err(PosixSupportError::UnsupportedFeature(_))
        ));
        assert!(!posix.has_getpwentries());
        assert!(matches!(
            posix.getpwentries(),
            Err(PosixSupportError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn test_unix_socket_path_limit() {
        let posix = backend();
        let ok = UnixSockAddr::new(vec![b'a'; 107]);
        assert!(posix.create_universal_sock_addr_unix(&ok).is_ok());
        let too_long = UnixSockAddr::new(vec![b'a'; 108]);
        assert_eq!(
            posix.create_universal_sock_addr_unix(&too_long).unwrap_err(),
            PosixSupportError::InvalidUnixSocketPath
        );
    }

    #[test]
    fn test_inet_addr_is_non_throwing() {
        let posix = backend();
        assert_eq!(posix.inet_addr("255.255.255.255"), -1);
        assert_eq!(posix.inet_addr("garbage"), -1);
        assert_eq!(posix.inet_addr("127.0.0.1"), 0x7f00_0001);
        assert_eq!(posix.inet_aton("nope"), Err(PosixSupportError::InvalidAddress));
        assert_eq!(posix.inet_ntoa(0x7f00_0001), "127.0.0.1");
    }
}
