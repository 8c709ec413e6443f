//! Backend calling the host C library
//!
//! Most operations call libc directly. The entries of [`PosixNativeFunction`] go through
//! the [`NativeLibrary`] dispatch layer, whose load doubles as the host policy check: with
//! native access disabled every operation fails with `NativeAccessDisabled` before any
//! native code runs. `crypt` lives in an optional library and degrades to
//! `UnsupportedFeature` when it is missing.

mod dir;
mod mmap;
mod process;
mod sockaddr;

use crate::config::constants::PosixConstants;
use crate::config::types::{ConfigError, NativeLibraryError, PosixSupportError, Result, SupportConfig};
use crate::core::path::PosixPath;
use crate::core::support::{AddrInfoCursor, PosixSupport, UniversalSockAddr};
use crate::core::types::{
    AcceptResult, Buffer, DirEntry, DirStream, FamilySockAddr, ForkExecRequest, HostEnv,
    Inet4SockAddr, Inet6SockAddr, MmapHandle, OpaqueHandle, OpenPtyResult, PwdResult,
    RecvfromResult, SelectResult, SemHandle, StatResult, StatvfsResult, Timespec, Timeval,
    UnameResult, UnixSockAddr, parse_inet_aton, DEFAULT_DIR_FD,
};
use crate::ffi::functions::{CryptNativeFunction, PosixNativeFunction};
use crate::ffi::invoker::{DlopenInvoker, NativeArg, NativeValue};
use crate::ffi::library::{LibraryContext, LoadPolicy, NativeLibrary};
use dir::NativeDir;
use log::debug;
use mmap::NativeMmap;
use nix::errno::Errno;
use sockaddr::{NativeAddrInfo, NativeSockAddr};
use std::ffi::{CStr, CString};
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::IntoRawFd;
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::{Arc, Mutex};

/// `getpwent` walks process-global state.
static PASSWD_ENUMERATION: Mutex<()> = Mutex::new(());

fn last_error() -> PosixSupportError {
    Errno::last().into()
}

fn cvt(rc: c_int) -> Result<c_int> {
    if rc == -1 {
        Err(last_error())
    } else {
        Ok(rc)
    }
}

fn cvt_len(rc: isize) -> Result<usize> {
    if rc < 0 {
        Err(last_error())
    } else {
        Ok(rc as usize)
    }
}

fn at_fd(dir_fd: i32) -> c_int {
    if dir_fd == DEFAULT_DIR_FD {
        libc::AT_FDCWD
    } else {
        dir_fd
    }
}

fn with_path<T>(result: Result<T>, path: &PosixPath) -> Result<T> {
    result.map_err(|e| e.with_filename(path.to_string_lossy()))
}

fn with_paths<T>(result: Result<T>, first: &PosixPath, second: &PosixPath) -> Result<T> {
    result.map_err(|e| {
        e.with_filenames(Some(first.to_string_lossy()), Some(second.to_string_lossy()))
    })
}

fn set_cloexec(fd: c_int, cloexec: bool) -> Result<()> {
    // SAFETY: fcntl on an arbitrary integer is safe; bad descriptors fail with EBADF.
    let flags = cvt(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    let flags = if cloexec {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    // SAFETY: as above.
    cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, flags) })?;
    Ok(())
}

fn stat_result(st: &libc::stat) -> StatResult {
    StatResult {
        mode: st.st_mode as i64,
        ino: st.st_ino as i64,
        dev: st.st_dev as i64,
        nlink: st.st_nlink as i64,
        uid: st.st_uid as i64,
        gid: st.st_gid as i64,
        size: st.st_size as i64,
        atime: st.st_atime as i64,
        mtime: st.st_mtime as i64,
        ctime: st.st_ctime as i64,
        atime_nsec: st.st_atime_nsec as i64,
        mtime_nsec: st.st_mtime_nsec as i64,
        ctime_nsec: st.st_ctime_nsec as i64,
    }
}

fn statvfs_result(st: &libc::statvfs) -> StatvfsResult {
    StatvfsResult {
        bsize: st.f_bsize as i64,
        frsize: st.f_frsize as i64,
        blocks: st.f_blocks as i64,
        bfree: st.f_bfree as i64,
        bavail: st.f_bavail as i64,
        files: st.f_files as i64,
        ffree: st.f_ffree as i64,
        favail: st.f_favail as i64,
        flag: st.f_flag as i64,
        namemax: st.f_namemax as i64,
        fsid: st.f_fsid as i64,
    }
}

fn c_text(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: callers pass NUL-terminated strings owned by libc structures.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn c_field(field: &[c_char]) -> String {
    let bytes: Vec<u8> = field.iter().take_while(|c| **c != 0).map(|c| *c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn pwd_result(pwd: &libc::passwd) -> PwdResult {
    PwdResult {
        name: c_text(pwd.pw_name),
        uid: pwd.pw_uid as i64,
        gid: pwd.pw_gid as i64,
        dir: c_text(pwd.pw_dir),
        shell: c_text(pwd.pw_shell),
    }
}

fn timespecs(times: Option<[Timespec; 2]>) -> Option<[libc::timespec; 2]> {
    times.map(|ts| {
        ts.map(|t| libc::timespec {
            tv_sec: t.seconds as libc::time_t,
            tv_nsec: t.nanoseconds as _,
        })
    })
}

fn timevals(times: Option<[Timeval; 2]>) -> Option<[libc::timespec; 2]> {
    timespecs(times.map(|tv| tv.map(|t| Timespec::new(t.seconds, t.microseconds * 1000))))
}

fn array_ptr<T>(values: &Option<[T; 2]>) -> *const T {
    values.as_ref().map_or(ptr::null(), |v| v.as_ptr())
}

fn gai_error(code: c_int) -> PosixSupportError {
    if code == libc::EAI_SYSTEM {
        return last_error();
    }
    // SAFETY: gai_strerror returns a static string for any code.
    let message = c_text(unsafe { libc::gai_strerror(code) });
    PosixSupportError::GetAddrInfo { code, message }
}

fn sem_ptr(handle: SemHandle) -> *mut libc::sem_t {
    handle.0 as *mut libc::sem_t
}

fn optional_cstring(value: Option<&str>) -> Result<Option<CString>> {
    value
        .map(|v| CString::new(v).map_err(|_| PosixSupportError::from(Errno::EINVAL)))
        .transpose()
}

pub struct NativePosixSupport {
    constants: &'static PosixConstants,
    libc: NativeLibrary<PosixNativeFunction>,
    crypt: NativeLibrary<CryptNativeFunction>,
}

impl NativePosixSupport {
    pub fn new(context: LibraryContext) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            constants: PosixConstants::host()?,
            libc: NativeLibrary::new(context.clone(), LoadPolicy::Required),
            crypt: NativeLibrary::new(context, LoadPolicy::Optional),
        })
    }

    pub fn from_config(config: &SupportConfig) -> std::result::Result<Self, ConfigError> {
        let context = LibraryContext::new(
            Arc::new(DlopenInvoker::new()),
            config.native_access,
            config.library_search_paths.clone(),
        );
        Self::new(context)
    }

    pub fn constants(&self) -> &'static PosixConstants {
        self.constants
    }

    /// Load libc on first use; every native operation starts here.
    fn ensure(&self) -> Result<()> {
        self.libc.ensure_loaded()?;
        Ok(())
    }

    /// Entry point for operations without an error channel.
    fn ensure_or_panic(&self) {
        if let Err(err) = self.libc.ensure_loaded() {
            panic!("{}", err);
        }
    }

    fn call(&self, function: PosixNativeFunction, args: &mut [NativeArg<'_>]) -> Result<NativeValue> {
        // SAFETY: every PosixNativeFunction takes integer arguments only, matching args.
        Ok(unsafe { self.libc.invoke(function, args) }?)
    }

    fn call_infallible(&self, function: PosixNativeFunction, args: &mut [NativeArg<'_>]) -> NativeValue {
        match self.call(function, args) {
            Ok(value) => value,
            Err(err) => panic!("{}", err),
        }
    }

    fn path_at(&self, dir_fd: i32, path: &PosixPath, f: impl FnOnce(c_int, &CStr) -> c_int) -> Result<()> {
        self.ensure()?;
        let cpath = path.to_cstring();
        with_path(cvt(f(at_fd(dir_fd), &cpath)).map(|_| ()), path)
    }

    fn fd_call(&self, f: impl FnOnce() -> c_int) -> Result<c_int> {
        self.ensure()?;
        cvt(f())
    }

    fn dir<'a>(&self, stream: &'a DirStream) -> Result<&'a NativeDir> {
        stream.0.downcast::<NativeDir>().ok_or_else(|| Errno::EBADF.into())
    }

    fn map<'a>(&self, handle: &'a MmapHandle) -> Result<&'a NativeMmap> {
        handle.0.downcast::<NativeMmap>().ok_or_else(|| Errno::EINVAL.into())
    }

    fn fetch_pwd(
        &self,
        lookup: impl Fn(&mut libc::passwd, &mut [c_char], &mut *mut libc::passwd) -> c_int,
    ) -> Result<Option<PwdResult>> {
        self.ensure()?;
        let mut size = 1024usize;
        loop {
            // SAFETY: passwd is plain old data filled in by the lookup.
            let mut pwd: libc::passwd = unsafe { mem::zeroed() };
            let mut buf = vec![0 as c_char; size];
            let mut result: *mut libc::passwd = ptr::null_mut();
            match lookup(&mut pwd, buf.as_mut_slice(), &mut result) {
                0 if result.is_null() => return Ok(None),
                0 => return Ok(Some(pwd_result(&pwd))),
                libc::ERANGE if size < 1 << 20 => size *= 4,
                code => return Err(Errno::from_raw(code).into()),
            }
        }
    }

    fn sock_addr_query(
        &self,
        sockfd: i32,
        query: unsafe extern "C" fn(c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> c_int,
    ) -> Result<Box<dyn UniversalSockAddr>> {
        self.ensure()?;
        let mut addr = NativeSockAddr::empty();
        // SAFETY: addr provides sockaddr_storage sized space and its length.
        cvt(unsafe { query(sockfd, addr.as_mut_ptr(), addr.len_mut()) })?;
        Ok(Box::new(addr))
    }
}

impl PosixSupport for NativePosixSupport {
    fn set_env(&self, _env: HostEnv) {
        debug!("Native backend keeps the process's own descriptors 0, 1 and 2");
    }

    fn get_backend(&self) -> &'static str {
        "native"
    }

    fn strerror(&self, code: i32) -> String {
        self.call_infallible(PosixNativeFunction::Strerror, &mut [NativeArg::Int(code as i64)])
            .into_string()
            .unwrap_or_else(|| format!("Unknown error {}", code))
    }

    fn sysconf(&self, name: i32) -> Result<i64> {
        self.ensure()?;
        Errno::clear();
        let value = self
            .call(PosixNativeFunction::Sysconf, &mut [NativeArg::Int(name as i64)])?
            .as_i64();
        if value == -1 {
            return match Errno::last_raw() {
                0 => Err(Errno::EINVAL.into()),
                code => Err(Errno::from_raw(code).into()),
            };
        }
        Ok(value)
    }

    fn getpid(&self) -> i64 {
        self.call_infallible(PosixNativeFunction::Getpid, &mut []).as_i64()
    }

    fn getppid(&self) -> i64 {
        self.call_infallible(PosixNativeFunction::Getppid, &mut []).as_i64()
    }

    fn getuid(&self) -> i64 {
        self.call_infallible(PosixNativeFunction::Getuid, &mut []).as_i64()
    }

    fn geteuid(&self) -> i64 {
        self.call_infallible(PosixNativeFunction::Geteuid, &mut []).as_i64()
    }

    fn getgid(&self) -> i64 {
        self.call_infallible(PosixNativeFunction::Getgid, &mut []).as_i64()
    }

    fn getegid(&self) -> i64 {
        self.call_infallible(PosixNativeFunction::Getegid, &mut []).as_i64()
    }

    fn getpgid(&self, pid: i64) -> Result<i64> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::getpgid(pid as libc::pid_t) }).map(i64::from)
    }

    fn setpgid(&self, pid: i64, pgid: i64) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::setpgid(pid as libc::pid_t, pgid as libc::pid_t) })
            .map(|_| ())
    }

    fn getpgrp(&self) -> Result<i64> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::getpgrp() }).map(i64::from)
    }

    fn getsid(&self, pid: i64) -> Result<i64> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::getsid(pid as libc::pid_t) }).map(i64::from)
    }

    fn setsid(&self) -> Result<i64> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::setsid() }).map(i64::from)
    }

    fn getgroups(&self) -> Result<Vec<i64>> {
        self.ensure()?;
        // SAFETY: a zero count only queries the number of groups.
        let count = cvt(unsafe { libc::getgroups(0, ptr::null_mut()) })?;
        let mut groups = vec![0 as libc::gid_t; count as usize];
        // SAFETY: the buffer holds `count` entries.
        let count = cvt(unsafe { libc::getgroups(count, groups.as_mut_ptr()) })?;
        groups.truncate(count as usize);
        Ok(groups.into_iter().map(i64::from).collect())
    }

    fn umask(&self, mask: i32) -> Result<i32> {
        self.ensure()?;
        let previous = self.call(PosixNativeFunction::Umask, &mut [NativeArg::Int(mask as i64)])?;
        Ok(previous.as_i64() as i32)
    }

    fn openat(&self, dir_fd: i32, path: &PosixPath, flags: i32, mode: i32) -> Result<i32> {
        self.ensure()?;
        let cpath = path.to_cstring();
        loop {
            // SAFETY: cpath is a valid C string.
            let fd = unsafe {
                libc::openat(at_fd(dir_fd), cpath.as_ptr(), flags | libc::O_CLOEXEC, mode as libc::c_uint)
            };
            if fd != -1 {
                return Ok(fd);
            }
            if Errno::last() != Errno::EINTR {
                return with_path(Err(last_error()), path);
            }
        }
    }

    fn close(&self, fd: i32) -> Result<()> {
        // SAFETY: closing an arbitrary integer is safe; bad descriptors fail with EBADF.
        self.fd_call(|| unsafe { libc::close(fd) }).map(|_| ())
    }

    fn read(&self, fd: i32, length: usize) -> Result<Buffer> {
        self.ensure()?;
        let mut buf = Buffer::allocate(length);
        let raw = buf.raw_mut();
        // SAFETY: raw has `length` writable bytes.
        let n = cvt_len(unsafe { libc::read(fd, raw.as_mut_ptr() as *mut libc::c_void, raw.len()) })?;
        Ok(buf.with_length(n))
    }

    fn write(&self, fd: i32, data: &Buffer) -> Result<usize> {
        self.ensure()?;
        let bytes = data.as_slice();
        // SAFETY: bytes is a valid slice for the duration of the call.
        cvt_len(unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) })
    }

    fn dup(&self, fd: i32) -> Result<i32> {
        // SAFETY: fcntl validates the descriptor.
        self.fd_call(|| unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) })
    }

    fn dup2(&self, fd: i32, fd2: i32, inheritable: bool) -> Result<i32> {
        // SAFETY: dup2 validates both descriptors.
        let new_fd = self.fd_call(|| unsafe { libc::dup2(fd, fd2) })?;
        if !inheritable && fd != fd2 {
            set_cloexec(new_fd, true)?;
        }
        Ok(new_fd)
    }

    fn get_inheritable(&self, fd: i32) -> Result<bool> {
        // SAFETY: fcntl validates the descriptor.
        let flags = self.fd_call(|| unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
        Ok(flags & libc::FD_CLOEXEC == 0)
    }

    fn set_inheritable(&self, fd: i32, inheritable: bool) -> Result<()> {
        self.ensure()?;
        set_cloexec(fd, !inheritable)
    }

    fn pipe(&self) -> Result<[i32; 2]> {
        self.ensure()?;
        let mut fds = [0 as c_int; 2];
        // SAFETY: fds has room for two descriptors.
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        for fd in fds {
            set_cloexec(fd, true)?;
        }
        Ok(fds)
    }

    fn select(
        &self,
        readfds: &[i32],
        writefds: &[i32],
        errorfds: &[i32],
        timeout: Option<Timeval>,
    ) -> Result<SelectResult> {
        self.ensure()?;
        let all = readfds.iter().chain(writefds).chain(errorfds);
        if all.clone().any(|fd| *fd < 0 || *fd >= libc::FD_SETSIZE as i32) {
            return Err(Errno::EINVAL.into());
        }
        let nfds = all.max().map_or(0, |fd| fd + 1);
        let fill = |fds: &[i32]| {
            // SAFETY: fd_set is plain old data; FD_ZERO/FD_SET only touch it.
            unsafe {
                let mut set: libc::fd_set = mem::zeroed();
                libc::FD_ZERO(&mut set);
                for fd in fds {
                    libc::FD_SET(*fd, &mut set);
                }
                set
            }
        };
        let (mut read_set, mut write_set, mut error_set) = (fill(readfds), fill(writefds), fill(errorfds));
        let mut tv = timeout.map(|t| libc::timeval {
            tv_sec: t.seconds as libc::time_t,
            tv_usec: t.microseconds as _,
        });
        let tv_ptr = tv.as_mut().map_or(ptr::null_mut(), |t| t as *mut libc::timeval);
        // SAFETY: all sets are initialized and every fd is below FD_SETSIZE.
        cvt(unsafe { libc::select(nfds, &mut read_set, &mut write_set, &mut error_set, tv_ptr) })?;
        let ready = |fds: &[i32], set: &libc::fd_set| -> Vec<bool> {
            // SAFETY: fds were validated against FD_SETSIZE.
            fds.iter().map(|fd| unsafe { libc::FD_ISSET(*fd, set) }).collect()
        };
        Ok(SelectResult {
            readfds: ready(readfds, &read_set),
            writefds: ready(writefds, &write_set),
            errorfds: ready(errorfds, &error_set),
        })
    }

    fn lseek(&self, fd: i32, offset: i64, how: i32) -> Result<i64> {
        self.ensure()?;
        // SAFETY: plain syscall wrapper.
        let pos = unsafe { libc::lseek(fd, offset as libc::off_t, how) };
        if pos == -1 {
            return Err(last_error());
        }
        Ok(pos as i64)
    }

    fn ftruncate(&self, fd: i32, length: i64) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::ftruncate(fd, length as libc::off_t) }).map(|_| ())
    }

    fn truncate(&self, path: &PosixPath, length: i64) -> Result<()> {
        self.ensure()?;
        let cpath = path.to_cstring();
        // SAFETY: cpath is a valid C string.
        with_path(cvt(unsafe { libc::truncate(cpath.as_ptr(), length as libc::off_t) }), path).map(|_| ())
    }

    fn fsync(&self, fd: i32) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::fsync(fd) }).map(|_| ())
    }

    fn flock(&self, fd: i32, operation: i32) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::flock(fd, operation) }).map(|_| ())
    }

    fn fcntl_lock(
        &self,
        fd: i32,
        blocking: bool,
        lock_type: i32,
        whence: i32,
        start: i64,
        length: i64,
    ) -> Result<()> {
        self.ensure()?;
        // SAFETY: flock is plain old data.
        let mut lock: libc::flock = unsafe { mem::zeroed() };
        lock.l_type = lock_type as _;
        lock.l_whence = whence as _;
        lock.l_start = start as libc::off_t;
        lock.l_len = length as libc::off_t;
        let cmd = if blocking { libc::F_SETLKW } else { libc::F_SETLK };
        // SAFETY: lock is a valid flock structure.
        cvt(unsafe { libc::fcntl(fd, cmd, &lock as *const libc::flock) })?;
        Ok(())
    }

    fn get_blocking(&self, fd: i32) -> Result<bool> {
        // SAFETY: fcntl validates the descriptor.
        let flags = self.fd_call(|| unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        Ok(flags & libc::O_NONBLOCK == 0)
    }

    fn set_blocking(&self, fd: i32, blocking: bool) -> Result<()> {
        // SAFETY: fcntl validates the descriptor.
        let flags = self.fd_call(|| unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        let flags = if blocking {
            flags & !libc::O_NONBLOCK
        } else {
            flags | libc::O_NONBLOCK
        };
        // SAFETY: as above.
        cvt(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) })?;
        Ok(())
    }

    fn get_terminal_size(&self, fd: i32) -> Result<(i32, i32)> {
        self.ensure()?;
        // SAFETY: winsize is plain old data filled in by the ioctl.
        let mut size: libc::winsize = unsafe { mem::zeroed() };
        // SAFETY: TIOCGWINSZ writes a winsize.
        cvt(unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size as *mut libc::winsize) })?;
        Ok((size.ws_col as i32, size.ws_row as i32))
    }

    fn isatty(&self, fd: i32) -> bool {
        self.call_infallible(PosixNativeFunction::Isatty, &mut [NativeArg::Int(fd as i64)])
            .as_i64()
            == 1
    }

    fn fstatat(&self, dir_fd: i32, path: &PosixPath, follow_symlinks: bool) -> Result<StatResult> {
        self.ensure()?;
        let cpath = path.to_cstring();
        let flags = if follow_symlinks { 0 } else { libc::AT_SYMLINK_NOFOLLOW };
        // SAFETY: stat is plain old data filled in by the call.
        let mut st: libc::stat = unsafe { mem::zeroed() };
        // SAFETY: cpath is a valid C string and st is writable.
        with_path(
            cvt(unsafe { libc::fstatat(at_fd(dir_fd), cpath.as_ptr(), &mut st, flags) }),
            path,
        )?;
        Ok(stat_result(&st))
    }

    fn fstat(&self, fd: i32) -> Result<StatResult> {
        self.ensure()?;
        // SAFETY: stat is plain old data filled in by the call.
        let mut st: libc::stat = unsafe { mem::zeroed() };
        // SAFETY: st is writable.
        cvt(unsafe { libc::fstat(fd, &mut st) })?;
        Ok(stat_result(&st))
    }

    fn statvfs(&self, path: &PosixPath) -> Result<StatvfsResult> {
        self.ensure()?;
        let cpath = path.to_cstring();
        // SAFETY: statvfs is plain old data filled in by the call.
        let mut st: libc::statvfs = unsafe { mem::zeroed() };
        // SAFETY: cpath is a valid C string and st is writable.
        with_path(cvt(unsafe { libc::statvfs(cpath.as_ptr(), &mut st) }), path)?;
        Ok(statvfs_result(&st))
    }

    fn fstatvfs(&self, fd: i32) -> Result<StatvfsResult> {
        self.ensure()?;
        // SAFETY: statvfs is plain old data filled in by the call.
        let mut st: libc::statvfs = unsafe { mem::zeroed() };
        // SAFETY: st is writable.
        cvt(unsafe { libc::fstatvfs(fd, &mut st) })?;
        Ok(statvfs_result(&st))
    }

    fn uname(&self) -> Result<UnameResult> {
        self.ensure()?;
        // SAFETY: utsname is plain old data filled in by the call.
        let mut info: libc::utsname = unsafe { mem::zeroed() };
        // SAFETY: info is writable.
        cvt(unsafe { libc::uname(&mut info) })?;
        Ok(UnameResult {
            sysname: c_field(&info.sysname),
            nodename: c_field(&info.nodename),
            release: c_field(&info.release),
            version: c_field(&info.version),
            machine: c_field(&info.machine),
        })
    }

    fn unlinkat(&self, dir_fd: i32, path: &PosixPath, rmdir: bool) -> Result<()> {
        let flags = if rmdir { libc::AT_REMOVEDIR } else { 0 };
        // SAFETY: the C string stays alive for the call.
        self.path_at(dir_fd, path, |fd, p| unsafe { libc::unlinkat(fd, p.as_ptr(), flags) })
    }

    fn linkat(
        &self,
        old_dir_fd: i32,
        old_path: &PosixPath,
        new_dir_fd: i32,
        new_path: &PosixPath,
        flags: i32,
    ) -> Result<()> {
        self.ensure()?;
        let (old, new) = (old_path.to_cstring(), new_path.to_cstring());
        // SAFETY: both C strings stay alive for the call.
        let rc = unsafe {
            libc::linkat(at_fd(old_dir_fd), old.as_ptr(), at_fd(new_dir_fd), new.as_ptr(), flags)
        };
        with_paths(cvt(rc), old_path, new_path).map(|_| ())
    }

    fn symlinkat(&self, target: &PosixPath, link_dir_fd: i32, link_path: &PosixPath) -> Result<()> {
        self.ensure()?;
        let (ctarget, clink) = (target.to_cstring(), link_path.to_cstring());
        // SAFETY: both C strings stay alive for the call.
        let rc = unsafe { libc::symlinkat(ctarget.as_ptr(), at_fd(link_dir_fd), clink.as_ptr()) };
        with_paths(cvt(rc), target, link_path).map(|_| ())
    }

    fn mkdirat(&self, dir_fd: i32, path: &PosixPath, mode: i32) -> Result<()> {
        // SAFETY: the C string stays alive for the call.
        self.path_at(dir_fd, path, |fd, p| unsafe {
            libc::mkdirat(fd, p.as_ptr(), mode as libc::mode_t)
        })
    }

    fn getcwd(&self) -> Result<PosixPath> {
        self.ensure()?;
        let cwd = nix::unistd::getcwd()?;
        PosixPath::from_os_str(cwd.as_os_str()).ok_or_else(|| Errno::ENOENT.into())
    }

    fn chdir(&self, path: &PosixPath) -> Result<()> {
        self.ensure()?;
        let cpath = path.to_cstring();
        // SAFETY: cpath is a valid C string.
        with_path(cvt(unsafe { libc::chdir(cpath.as_ptr()) }), path).map(|_| ())
    }

    fn fchdir(&self, fd: i32) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::fchdir(fd) }).map(|_| ())
    }

    fn renameat(
        &self,
        old_dir_fd: i32,
        old_path: &PosixPath,
        new_dir_fd: i32,
        new_path: &PosixPath,
    ) -> Result<()> {
        self.ensure()?;
        let (old, new) = (old_path.to_cstring(), new_path.to_cstring());
        // SAFETY: both C strings stay alive for the call.
        let rc = unsafe { libc::renameat(at_fd(old_dir_fd), old.as_ptr(), at_fd(new_dir_fd), new.as_ptr()) };
        with_paths(cvt(rc), old_path, new_path).map(|_| ())
    }

    fn faccessat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        mode: i32,
        effective_ids: bool,
        follow_symlinks: bool,
    ) -> bool {
        self.ensure_or_panic();
        let cpath = path.to_cstring();
        let mut flags = 0;
        if effective_ids {
            flags |= libc::AT_EACCESS;
        }
        if !follow_symlinks {
            flags |= libc::AT_SYMLINK_NOFOLLOW;
        }
        // SAFETY: cpath is a valid C string.
        unsafe { libc::faccessat(at_fd(dir_fd), cpath.as_ptr(), mode, flags) == 0 }
    }

    fn fchmodat(&self, dir_fd: i32, path: &PosixPath, mode: i32, follow_symlinks: bool) -> Result<()> {
        let flags = if follow_symlinks { 0 } else { libc::AT_SYMLINK_NOFOLLOW };
        // SAFETY: the C string stays alive for the call.
        self.path_at(dir_fd, path, |fd, p| unsafe {
            libc::fchmodat(fd, p.as_ptr(), mode as libc::mode_t, flags)
        })
    }

    fn fchmod(&self, fd: i32, mode: i32) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::fchmod(fd, mode as libc::mode_t) }).map(|_| ())
    }

    fn fchownat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        owner: i64,
        group: i64,
        follow_symlinks: bool,
    ) -> Result<()> {
        let flags = if follow_symlinks { 0 } else { libc::AT_SYMLINK_NOFOLLOW };
        // SAFETY: the C string stays alive for the call.
        self.path_at(dir_fd, path, |fd, p| unsafe {
            libc::fchownat(fd, p.as_ptr(), owner as libc::uid_t, group as libc::gid_t, flags)
        })
    }

    fn fchown(&self, fd: i32, owner: i64, group: i64) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::fchown(fd, owner as libc::uid_t, group as libc::gid_t) })
            .map(|_| ())
    }

    fn readlinkat(&self, dir_fd: i32, path: &PosixPath) -> Result<PosixPath> {
        self.ensure()?;
        let cpath = path.to_cstring();
        let mut size = 256usize;
        loop {
            let mut buf = vec![0u8; size];
            // SAFETY: buf has `size` writable bytes.
            let n = unsafe {
                libc::readlinkat(at_fd(dir_fd), cpath.as_ptr(), buf.as_mut_ptr() as *mut c_char, size)
            };
            let n = with_path(cvt_len(n), path)?;
            if n < size {
                buf.truncate(n);
                return Ok(PosixPath::from_c_bytes(&buf));
            }
            size *= 2;
        }
    }

    fn utimensat(
        &self,
        dir_fd: i32,
        path: &PosixPath,
        times: Option<[Timespec; 2]>,
        follow_symlinks: bool,
    ) -> Result<()> {
        let flags = if follow_symlinks { 0 } else { libc::AT_SYMLINK_NOFOLLOW };
        let times = timespecs(times);
        // SAFETY: times is either null or two timespecs alive for the call.
        self.path_at(dir_fd, path, |fd, p| unsafe {
            libc::utimensat(fd, p.as_ptr(), array_ptr(&times), flags)
        })
    }

    fn futimens(&self, fd: i32, times: Option<[Timespec; 2]>) -> Result<()> {
        let times = timespecs(times);
        // SAFETY: times is either null or two timespecs alive for the call.
        self.fd_call(|| unsafe { libc::futimens(fd, array_ptr(&times)) }).map(|_| ())
    }

    fn futimes(&self, fd: i32, times: Option<[Timeval; 2]>) -> Result<()> {
        let times = timevals(times);
        // SAFETY: times is either null or two timespecs alive for the call.
        self.fd_call(|| unsafe { libc::futimens(fd, array_ptr(&times)) }).map(|_| ())
    }

    fn lutimes(&self, path: &PosixPath, times: Option<[Timeval; 2]>) -> Result<()> {
        let times = timevals(times);
        // SAFETY: path and times stay alive for the call.
        self.path_at(DEFAULT_DIR_FD, path, |fd, p| unsafe {
            libc::utimensat(fd, p.as_ptr(), array_ptr(&times), libc::AT_SYMLINK_NOFOLLOW)
        })
    }

    fn utimes(&self, path: &PosixPath, times: Option<[Timeval; 2]>) -> Result<()> {
        let times = timevals(times);
        // SAFETY: path and times stay alive for the call.
        self.path_at(DEFAULT_DIR_FD, path, |fd, p| unsafe { libc::utimensat(fd, p.as_ptr(), array_ptr(&times), 0) })
    }

    fn opendir(&self, path: &PosixPath) -> Result<DirStream> {
        self.ensure()?;
        let dir = with_path(NativeDir::open(&path.to_cstring()).map_err(Into::into), path)?;
        Ok(DirStream(OpaqueHandle::new(dir)))
    }

    fn fdopendir(&self, fd: i32) -> Result<DirStream> {
        self.ensure()?;
        let dir = NativeDir::from_fd(fd)?;
        Ok(DirStream(OpaqueHandle::new(dir)))
    }

    fn closedir(&self, stream: &DirStream) -> Result<()> {
        self.ensure()?;
        Ok(self.dir(stream)?.close()?)
    }

    fn readdir(&self, stream: &DirStream) -> Result<Option<DirEntry>> {
        self.ensure()?;
        Ok(self.dir(stream)?.next()?.map(|raw| DirEntry {
            name: raw.name,
            inode: raw.inode,
            d_type: raw.d_type,
        }))
    }

    fn rewinddir(&self, stream: &DirStream) {
        self.ensure_or_panic();
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
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::kill(pid as libc::pid_t, signal) }).map(|_| ())
    }

    fn killpg(&self, pgid: i64, signal: i32) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::killpg(pgid as libc::pid_t, signal) }).map(|_| ())
    }

    fn waitpid(&self, pid: i64, options: i32) -> Result<(i64, i32)> {
        self.ensure()?;
        let mut status: c_int = 0;
        loop {
            // SAFETY: status is writable.
            let reaped = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, options) };
            if reaped != -1 {
                return Ok((reaped as i64, status));
            }
            if Errno::last() != Errno::EINTR {
                return Err(last_error());
            }
        }
    }

    fn abort(&self) -> ! {
        std::process::abort()
    }

    fn wcoredump(&self, status: i32) -> bool {
        libc::WCOREDUMP(status)
    }

    fn wifcontinued(&self, status: i32) -> bool {
        libc::WIFCONTINUED(status)
    }

    fn wifstopped(&self, status: i32) -> bool {
        libc::WIFSTOPPED(status)
    }

    fn wifsignaled(&self, status: i32) -> bool {
        libc::WIFSIGNALED(status)
    }

    fn wifexited(&self, status: i32) -> bool {
        libc::WIFEXITED(status)
    }

    fn wexitstatus(&self, status: i32) -> i32 {
        libc::WEXITSTATUS(status)
    }

    fn wtermsig(&self, status: i32) -> i32 {
        libc::WTERMSIG(status)
    }

    fn wstopsig(&self, status: i32) -> i32 {
        libc::WSTOPSIG(status)
    }

    fn fork_exec(&self, request: &ForkExecRequest) -> Result<i64> {
        self.ensure()?;
        let pid = process::fork_exec(request)?;
        debug!("Forked child {} for {:?}", pid, request.executables.first());
        Ok(pid)
    }

    fn execv(&self, path: &PosixPath, args: &[PosixPath]) -> Result<()> {
        self.ensure()?;
        let cpath = path.to_cstring();
        let cargs: Vec<CString> = args.iter().map(|a| a.to_cstring()).collect();
        let mut argv: Vec<*const c_char> = cargs.iter().map(|a| a.as_ptr()).collect();
        argv.push(ptr::null());
        // SAFETY: argv is a null-terminated array of C strings kept alive by cargs.
        unsafe { libc::execv(cpath.as_ptr(), argv.as_ptr()) };
        with_path(Err(last_error()), path)
    }

    fn system(&self, command: &[u8]) -> Result<i32> {
        self.ensure()?;
        let ccommand = CString::new(command).map_err(|_| PosixSupportError::from(Errno::EINVAL))?;
        // SAFETY: ccommand is a valid C string.
        cvt(unsafe { libc::system(ccommand.as_ptr()) })
    }

    fn openpty(&self) -> Result<OpenPtyResult> {
        self.ensure()?;
        let pty = nix::pty::openpty(None, None)?;
        let master_fd = pty.master.into_raw_fd();
        let slave_fd = pty.slave.into_raw_fd();
        set_cloexec(master_fd, true)?;
        set_cloexec(slave_fd, true)?;
        Ok(OpenPtyResult { master_fd, slave_fd })
    }

    fn ctermid(&self) -> Result<String> {
        self.ensure()?;
        Ok("/dev/tty".to_string())
    }

    fn setenv(&self, name: &PosixPath, value: &PosixPath, overwrite: bool) -> Result<()> {
        self.ensure()?;
        let (cname, cvalue) = (name.to_cstring(), value.to_cstring());
        // SAFETY: both C strings are valid.
        cvt(unsafe { libc::setenv(cname.as_ptr(), cvalue.as_ptr(), overwrite as c_int) })?;
        Ok(())
    }

    fn unsetenv(&self, name: &PosixPath) -> Result<()> {
        self.ensure()?;
        let cname = name.to_cstring();
        // SAFETY: cname is a valid C string.
        cvt(unsafe { libc::unsetenv(cname.as_ptr()) })?;
        Ok(())
    }

    fn mmap(&self, length: usize, prot: i32, flags: i32, fd: i32, offset: i64) -> Result<MmapHandle> {
        self.ensure()?;
        let map = NativeMmap::map(length, prot, flags, fd, offset)?;
        Ok(MmapHandle(OpaqueHandle::new(map)))
    }

    fn mmap_read_byte(&self, mmap: &MmapHandle, index: usize) -> Result<u8> {
        Ok(self.map(mmap)?.read_byte(index)?)
    }

    fn mmap_write_byte(&self, mmap: &MmapHandle, index: usize, value: u8) -> Result<()> {
        Ok(self.map(mmap)?.write_bytes(index, &[value])?)
    }

    fn mmap_read_bytes(&self, mmap: &MmapHandle, index: usize, out: &mut [u8]) -> Result<usize> {
        Ok(self.map(mmap)?.read_bytes(index, out)?)
    }

    fn mmap_write_bytes(&self, mmap: &MmapHandle, index: usize, data: &[u8]) -> Result<()> {
        Ok(self.map(mmap)?.write_bytes(index, data)?)
    }

    fn mmap_flush(&self, mmap: &MmapHandle, offset: usize, length: usize) -> Result<()> {
        self.ensure()?;
        Ok(self.map(mmap)?.flush(offset, length)?)
    }

    fn mmap_unmap(&self, mmap: &MmapHandle, _length: usize) -> Result<()> {
        self.ensure()?;
        Ok(self.map(mmap)?.unmap()?)
    }

    fn mmap_get_pointer(&self, mmap: &MmapHandle) -> Result<usize> {
        Ok(self.map(mmap)?.address())
    }

    fn getpwuid(&self, uid: i64) -> Result<Option<PwdResult>> {
        self.fetch_pwd(|pwd, buf, result| {
            // SAFETY: every pointer refers to live, correctly sized storage.
            unsafe { libc::getpwuid_r(uid as libc::uid_t, pwd, buf.as_mut_ptr(), buf.len(), result) }
        })
    }

    fn getpwnam(&self, name: &PosixPath) -> Result<Option<PwdResult>> {
        let cname = name.to_cstring();
        self.fetch_pwd(|pwd, buf, result| {
            // SAFETY: every pointer refers to live, correctly sized storage.
            unsafe { libc::getpwnam_r(cname.as_ptr(), pwd, buf.as_mut_ptr(), buf.len(), result) }
        })
    }

    fn has_getpwentries(&self) -> bool {
        true
    }

    fn getpwentries(&self) -> Result<Vec<PwdResult>> {
        self.ensure()?;
        let _guard = PASSWD_ENUMERATION
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries = Vec::new();
        // SAFETY: the enumeration state is only touched under PASSWD_ENUMERATION and
        // each entry is copied before the next call.
        unsafe {
            libc::setpwent();
            loop {
                let pwd = libc::getpwent();
                if pwd.is_null() {
                    break;
                }
                entries.push(pwd_result(&*pwd));
            }
            libc::endpwent();
        }
        Ok(entries)
    }

    fn ioctl_bytes(&self, fd: i32, request: u64, arg: &mut [u8]) -> Result<i32> {
        self.ensure()?;
        // SAFETY: the caller's request must fit within arg, which outlives the call.
        cvt(unsafe { libc::ioctl(fd, request as _, arg.as_mut_ptr()) })
    }

    fn ioctl_int(&self, fd: i32, request: u64, arg: i64) -> Result<i32> {
        self.ensure()?;
        // SAFETY: integer-argument ioctls do not dereference arg.
        cvt(unsafe { libc::ioctl(fd, request as _, arg as libc::c_long) })
    }

    fn socket(&self, domain: i32, sock_type: i32, protocol: i32) -> Result<i32> {
        // SAFETY: plain syscall wrapper.
        let fd = self.fd_call(|| unsafe { libc::socket(domain, sock_type, protocol) })?;
        set_cloexec(fd, true)?;
        Ok(fd)
    }

    fn accept(&self, sockfd: i32) -> Result<AcceptResult> {
        self.ensure()?;
        let mut addr = NativeSockAddr::empty();
        // SAFETY: addr provides sockaddr_storage sized space and its length.
        let fd = cvt(unsafe { libc::accept(sockfd, addr.as_mut_ptr(), addr.len_mut()) })?;
        set_cloexec(fd, true)?;
        Ok(AcceptResult {
            socket_fd: fd,
            sock_addr: Box::new(addr),
        })
    }

    fn bind(&self, sockfd: i32, addr: &dyn UniversalSockAddr) -> Result<()> {
        let addr = NativeSockAddr::from_universal(addr)?;
        // SAFETY: addr holds len valid bytes.
        self.fd_call(|| unsafe { libc::bind(sockfd, addr.as_ptr(), addr.len()) }).map(|_| ())
    }

    fn connect(&self, sockfd: i32, addr: &dyn UniversalSockAddr) -> Result<()> {
        let addr = NativeSockAddr::from_universal(addr)?;
        // SAFETY: addr holds len valid bytes.
        self.fd_call(|| unsafe { libc::connect(sockfd, addr.as_ptr(), addr.len()) }).map(|_| ())
    }

    fn listen(&self, sockfd: i32, backlog: i32) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::listen(sockfd, backlog) }).map(|_| ())
    }

    fn getpeername(&self, sockfd: i32) -> Result<Box<dyn UniversalSockAddr>> {
        self.sock_addr_query(sockfd, libc::getpeername)
    }

    fn getsockname(&self, sockfd: i32) -> Result<Box<dyn UniversalSockAddr>> {
        self.sock_addr_query(sockfd, libc::getsockname)
    }

    fn send(&self, sockfd: i32, data: &[u8], flags: i32) -> Result<usize> {
        self.ensure()?;
        // SAFETY: data is valid for the call.
        cvt_len(unsafe { libc::send(sockfd, data.as_ptr() as *const libc::c_void, data.len(), flags) })
    }

    fn sendto(
        &self,
        sockfd: i32,
        data: &[u8],
        flags: i32,
        dest: &dyn UniversalSockAddr,
    ) -> Result<usize> {
        self.ensure()?;
        let dest = NativeSockAddr::from_universal(dest)?;
        // SAFETY: data and dest are valid for the call.
        cvt_len(unsafe {
            libc::sendto(
                sockfd,
                data.as_ptr() as *const libc::c_void,
                data.len(),
                flags,
                dest.as_ptr(),
                dest.len(),
            )
        })
    }

    fn recv(&self, sockfd: i32, length: usize, flags: i32) -> Result<Buffer> {
        self.ensure()?;
        let mut buf = Buffer::allocate(length);
        let raw = buf.raw_mut();
        // SAFETY: raw has `length` writable bytes.
        let n = cvt_len(unsafe { libc::recv(sockfd, raw.as_mut_ptr() as *mut libc::c_void, raw.len(), flags) })?;
        Ok(buf.with_length(n))
    }

    fn recvfrom(&self, sockfd: i32, length: usize, flags: i32) -> Result<RecvfromResult> {
        self.ensure()?;
        let mut buf = Buffer::allocate(length);
        let mut addr = NativeSockAddr::empty();
        let raw = buf.raw_mut();
        // SAFETY: raw and addr provide writable storage of the advertised sizes.
        let n = cvt_len(unsafe {
            libc::recvfrom(
                sockfd,
                raw.as_mut_ptr() as *mut libc::c_void,
                raw.len(),
                flags,
                addr.as_mut_ptr(),
                addr.len_mut(),
            )
        })?;
        Ok(RecvfromResult {
            data: buf.with_length(n),
            sock_addr: Box::new(addr),
        })
    }

    fn shutdown(&self, sockfd: i32, how: i32) -> Result<()> {
        // SAFETY: plain syscall wrapper.
        self.fd_call(|| unsafe { libc::shutdown(sockfd, how) }).map(|_| ())
    }

    fn getsockopt(&self, sockfd: i32, level: i32, optname: i32, optlen: usize) -> Result<Vec<u8>> {
        self.ensure()?;
        let mut value = vec![0u8; optlen];
        let mut len = optlen as libc::socklen_t;
        // SAFETY: value has optlen writable bytes.
        cvt(unsafe {
            libc::getsockopt(sockfd, level, optname, value.as_mut_ptr() as *mut libc::c_void, &mut len)
        })?;
        value.truncate(len as usize);
        Ok(value)
    }

    fn setsockopt(&self, sockfd: i32, level: i32, optname: i32, optval: &[u8]) -> Result<()> {
        self.ensure()?;
        // SAFETY: optval is valid for the call.
        cvt(unsafe {
            libc::setsockopt(
                sockfd,
                level,
                optname,
                optval.as_ptr() as *const libc::c_void,
                optval.len() as libc::socklen_t,
            )
        })?;
        Ok(())
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
        match family {
            libc::AF_INET => src
                .parse::<Ipv4Addr>()
                .map(|a| a.octets().to_vec())
                .map_err(|_| PosixSupportError::InvalidAddress),
            libc::AF_INET6 => src
                .parse::<Ipv6Addr>()
                .map(|a| a.octets().to_vec())
                .map_err(|_| PosixSupportError::InvalidAddress),
            _ => Err(Errno::EAFNOSUPPORT.into()),
        }
    }

    fn inet_ntop(&self, family: i32, src: &[u8]) -> Result<String> {
        match family {
            libc::AF_INET => <[u8; 4]>::try_from(src)
                .map(|b| Ipv4Addr::from(b).to_string())
                .map_err(|_| Errno::EINVAL.into()),
            libc::AF_INET6 => <[u8; 16]>::try_from(src)
                .map(|b| Ipv6Addr::from(b).to_string())
                .map_err(|_| Errno::EINVAL.into()),
            _ => Err(Errno::EAFNOSUPPORT.into()),
        }
    }

    fn gethostname(&self) -> Result<String> {
        self.ensure()?;
        Ok(nix::unistd::gethostname()?.to_string_lossy().into_owned())
    }

    fn getnameinfo(&self, addr: &dyn UniversalSockAddr, flags: i32) -> Result<(String, String)> {
        self.ensure()?;
        let addr = NativeSockAddr::from_universal(addr)?;
        let mut host = vec![0 as c_char; libc::NI_MAXHOST as usize];
        let mut serv = vec![0 as c_char; 32];
        // SAFETY: both buffers are writable with the advertised lengths.
        let rc = unsafe {
            libc::getnameinfo(
                addr.as_ptr(),
                addr.len(),
                host.as_mut_ptr(),
                host.len() as libc::socklen_t,
                serv.as_mut_ptr(),
                serv.len() as libc::socklen_t,
                flags,
            )
        };
        if rc != 0 {
            return Err(gai_error(rc));
        }
        Ok((c_field(&host), c_field(&serv)))
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
        self.ensure()?;
        let (cnode, cservice) = (optional_cstring(node)?, optional_cstring(service)?);
        // SAFETY: addrinfo is plain old data; zero means "no preference" for hints.
        let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
        hints.ai_family = family;
        hints.ai_socktype = sock_type;
        hints.ai_protocol = protocol;
        hints.ai_flags = flags;
        let mut result: *mut libc::addrinfo = ptr::null_mut();
        // SAFETY: the strings and hints outlive the call; result receives the list.
        let rc = unsafe {
            libc::getaddrinfo(
                cnode.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                cservice.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
                &hints,
                &mut result,
            )
        };
        if rc != 0 {
            return Err(gai_error(rc));
        }
        if result.is_null() {
            return Err(gai_error(libc::EAI_NONAME));
        }
        // SAFETY: result is a fresh list owned by the cursor from here on.
        Ok(Box::new(unsafe { NativeAddrInfo::new(result) }))
    }

    fn crypt(&self, word: &[u8], salt: &[u8]) -> Result<Vec<u8>> {
        self.ensure()?;
        let to_c = |b: &[u8]| CString::new(b).map_err(|_| PosixSupportError::from(Errno::EINVAL));
        let (cword, csalt) = (to_c(word)?, to_c(salt)?);
        let mut args = [NativeArg::String(&cword), NativeArg::String(&csalt)];
        // SAFETY: crypt takes two C strings that outlive the call.
        let value = match unsafe { self.crypt.invoke(CryptNativeFunction::Crypt, &mut args) } {
            Ok(value) => value,
            Err(NativeLibraryError::Unavailable(_)) => {
                return Err(PosixSupportError::unsupported("crypt (libcrypt is not available)"))
            }
            Err(err) => return Err(err.into()),
        };
        value.into_string().map(String::into_bytes).ok_or_else(last_error)
    }

    #[cfg(target_os = "linux")]
    fn sem_open(&self, name: &PosixPath, open_flags: i32, mode: i32, value: u32) -> Result<SemHandle> {
        self.ensure()?;
        let cname = name.to_cstring();
        // SAFETY: cname is a valid C string; mode and value match the O_CREAT variadics.
        let sem = unsafe { libc::sem_open(cname.as_ptr(), open_flags, mode as libc::mode_t, value) };
        if sem == libc::SEM_FAILED {
            return with_path(Err(last_error()), name);
        }
        Ok(SemHandle(sem as usize))
    }

    #[cfg(not(target_os = "linux"))]
    fn sem_open(&self, _name: &PosixPath, _open_flags: i32, _mode: i32, _value: u32) -> Result<SemHandle> {
        Err(PosixSupportError::unsupported("named semaphores on this platform"))
    }

    fn sem_close(&self, handle: SemHandle) -> Result<()> {
        // SAFETY: handle came from sem_open.
        self.fd_call(|| unsafe { libc::sem_close(sem_ptr(handle)) }).map(|_| ())
    }

    fn sem_unlink(&self, name: &PosixPath) -> Result<()> {
        self.ensure()?;
        let cname = name.to_cstring();
        // SAFETY: cname is a valid C string.
        with_path(cvt(unsafe { libc::sem_unlink(cname.as_ptr()) }), name).map(|_| ())
    }

    #[cfg(target_os = "linux")]
    fn sem_get_value(&self, handle: SemHandle) -> Result<i32> {
        self.ensure()?;
        let mut value: c_int = 0;
        // SAFETY: handle came from sem_open and value is writable.
        cvt(unsafe { libc::sem_getvalue(sem_ptr(handle), &mut value) })?;
        Ok(value)
    }

    #[cfg(not(target_os = "linux"))]
    fn sem_get_value(&self, _handle: SemHandle) -> Result<i32> {
        Err(PosixSupportError::unsupported("sem_getvalue on this platform"))
    }

    fn sem_post(&self, handle: SemHandle) -> Result<()> {
        // SAFETY: handle came from sem_open.
        self.fd_call(|| unsafe { libc::sem_post(sem_ptr(handle)) }).map(|_| ())
    }

    fn sem_wait(&self, handle: SemHandle) -> Result<()> {
        self.ensure()?;
        loop {
            // SAFETY: handle came from sem_open.
            if unsafe { libc::sem_wait(sem_ptr(handle)) } == 0 {
                return Ok(());
            }
            if Errno::last() != Errno::EINTR {
                return Err(last_error());
            }
        }
    }

    fn sem_try_wait(&self, handle: SemHandle) -> Result<()> {
        // SAFETY: handle came from sem_open.
        self.fd_call(|| unsafe { libc::sem_trywait(sem_ptr(handle)) }).map(|_| ())
    }

    #[cfg(target_os = "linux")]
    fn sem_timed_wait(&self, handle: SemHandle, deadline_ns: i64) -> Result<()> {
        self.ensure()?;
        let deadline = libc::timespec {
            tv_sec: (deadline_ns / 1_000_000_000) as libc::time_t,
            tv_nsec: (deadline_ns % 1_000_000_000) as _,
        };
        // SAFETY: handle came from sem_open and deadline is a valid timespec.
        cvt(unsafe { libc::sem_timedwait(sem_ptr(handle), &deadline) })?;
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn sem_timed_wait(&self, _handle: SemHandle, _deadline_ns: i64) -> Result<()> {
        Err(PosixSupportError::unsupported("sem_timedwait on this platform"))
    }

    fn create_universal_sock_addr_inet4(&self, src: &Inet4SockAddr) -> Box<dyn UniversalSockAddr> {
        match NativeSockAddr::from_family(&FamilySockAddr::Inet4(*src)) {
            Ok(addr) => Box::new(addr),
            Err(err) => unreachable!("IPv4 addresses always fit: {}", err),
        }
    }

    fn create_universal_sock_addr_inet6(&self, src: &Inet6SockAddr) -> Box<dyn UniversalSockAddr> {
        match NativeSockAddr::from_family(&FamilySockAddr::Inet6(*src)) {
            Ok(addr) => Box::new(addr),
            Err(err) => unreachable!("IPv6 addresses always fit: {}", err),
        }
    }

    fn create_universal_sock_addr_unix(&self, src: &UnixSockAddr) -> Result<Box<dyn UniversalSockAddr>> {
        Ok(Box::new(NativeSockAddr::from_family(&FamilySockAddr::Unix(src.clone()))?))
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
    use std::os::unix::fs::MetadataExt;

    fn backend() -> NativePosixSupport {
        NativePosixSupport::from_config(&SupportConfig::default()).unwrap()
    }

    fn path(s: &str) -> PosixPath {
        PosixPath::from_string(s).unwrap()
    }

    #[test]
    fn test_dispatched_ids_match_std() {
        let posix = backend();
        assert_eq!(posix.getpid(), std::process::id() as i64);
        assert!(posix.sysconf(libc::_SC_PAGESIZE).unwrap() > 0);
        assert_eq!(posix.strerror(libc::ENOENT), "No such file or directory");
    }

    #[test]
    fn test_default_dir_fd_is_cwd() {
        let posix = backend();
        let cwd = std::env::current_dir().unwrap();
        let st = posix.fstatat(DEFAULT_DIR_FD, &path("."), true).unwrap();
        assert_eq!(st.ino as u64, std::fs::metadata(cwd).unwrap().ino());
    }

    #[test]
    fn test_missing_file_carries_filename() {
        let posix = backend();
        let err = posix
            .openat(DEFAULT_DIR_FD, &path("/no/such/file"), libc::O_RDONLY, 0)
            .unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENOENT));
        assert!(err.to_string().contains("/no/such/file"));
    }

    #[test]
    fn test_pipe_select_and_inheritable() {
        let posix = backend();
        let [r, w] = posix.pipe().unwrap();
        assert!(!posix.get_inheritable(r).unwrap());
        posix.set_inheritable(r, true).unwrap();
        assert!(posix.get_inheritable(r).unwrap());

        let poll = Some(Timeval::new(0, 0));
        assert_eq!(posix.select(&[r], &[], &[], poll).unwrap().readfds, vec![false]);
        posix.write(w, &Buffer::from_slice(b"hi")).unwrap();
        assert_eq!(posix.select(&[r], &[w], &[], poll).unwrap().readfds, vec![true]);
        assert_eq!(posix.read(r, 10).unwrap().as_slice(), b"hi");
        posix.close(r).unwrap();
        posix.close(w).unwrap();
        assert_eq!(posix.close(w).unwrap_err().errno(), Some(libc::EBADF));
    }

    #[test]
    fn test_native_access_disabled() {
        let config = SupportConfig {
            native_access: false,
            ..Default::default()
        };
        let posix = NativePosixSupport::from_config(&config).unwrap();
        assert_eq!(
            posix.fstat(0).unwrap_err(),
            PosixSupportError::NativeLibrary(NativeLibraryError::NativeAccessDisabled)
        );
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| posix.getpid()));
        assert!(result.is_err());
    }

    #[test]
    fn test_inet_conversions() {
        let posix = backend();
        assert_eq!(posix.inet_pton(libc::AF_INET, "10.0.0.1").unwrap(), vec![10, 0, 0, 1]);
        assert_eq!(posix.inet_pton(libc::AF_INET, "10.1"), Err(PosixSupportError::InvalidAddress));
        assert_eq!(posix.inet_ntop(libc::AF_INET6, &[0; 16]).unwrap(), "::");
        assert_eq!(posix.inet_ntop(libc::AF_INET, &[1, 2]).unwrap_err().errno(), Some(libc::EINVAL));
        assert_eq!(posix.inet_aton("10.1").unwrap(), 0x0a00_0001);
    }
}
