//! `fork` + `exec` with descriptor remapping and errpipe failure reporting.
//!
//! Everything the child needs is allocated before `fork`; between `fork` and `exec` the
//! child only makes async-signal-safe calls.

use crate::config::types::{PosixSupportError, Result};
use crate::core::types::ForkExecRequest;
use nix::errno::Errno;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// `OSError:<errno in hex>:` plus `noexec` when the failure came from `exec` itself.
pub(crate) fn format_child_error(errno: i32, noexec: bool) -> ([u8; 32], usize) {
    let mut buf = [0u8; 32];
    let mut n = 0;
    let mut push = |bytes: &[u8], buf: &mut [u8; 32]| {
        for b in bytes {
            buf[n] = *b;
            n += 1;
        }
    };
    push(b"OSError:", &mut buf);
    let mut digits = [0u8; 8];
    let mut count = 0;
    let mut value = errno as u32;
    loop {
        digits[count] = HEX[(value & 0xf) as usize];
        count += 1;
        value >>= 4;
        if value == 0 {
            break;
        }
    }
    digits[..count].reverse();
    push(&digits[..count], &mut buf);
    push(b":", &mut buf);
    if noexec {
        push(b"noexec", &mut buf);
    }
    (buf, n)
}

fn to_cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| Errno::EINVAL.into())
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

struct PreparedExec {
    executables: Vec<CString>,
    _argv: Vec<CString>,
    argv: Vec<*const c_char>,
    _envp: Vec<CString>,
    envp: Option<Vec<*const c_char>>,
    cwd: Option<CString>,
    keep: Vec<i32>,
    max_fd: i32,
}

impl PreparedExec {
    fn new(request: &ForkExecRequest) -> Result<Self> {
        let executables = request
            .executables
            .iter()
            .map(|p| p.to_cstring())
            .collect::<Vec<_>>();
        let args = request
            .args
            .iter()
            .map(|a| to_cstring(a))
            .collect::<Result<Vec<_>>>()?;
        let argv = null_terminated(&args);
        let env = match &request.env {
            Some(entries) => entries.iter().map(|e| to_cstring(e)).collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let envp = request.env.as_ref().map(|_| null_terminated(&env));
        let mut keep = request.fds_to_keep.clone();
        keep.push(request.errpipe_write_fd);
        keep.sort_unstable();
        // SAFETY: sysconf has no preconditions.
        let open_max = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
        Ok(Self {
            executables,
            _argv: args,
            argv,
            _envp: env,
            envp,
            cwd: request.cwd.as_ref().map(|p| p.to_cstring()),
            keep,
            max_fd: if open_max > 0 { open_max.min(65536) as i32 } else { 1024 },
        })
    }
}

/// Make `fd` the child's descriptor `target`.
///
/// # Safety
/// Only called in the forked child.
unsafe fn install(fd: i32, target: i32) -> bool {
    if fd < 0 {
        return true;
    }
    if fd == target {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        return flags != -1 && libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) != -1;
    }
    libc::dup2(fd, target) != -1
}

/// # Safety
/// Only called in the forked child.
unsafe fn fail(errpipe: i32, errno: i32, noexec: bool) -> ! {
    if errpipe >= 0 {
        let (buf, n) = format_child_error(errno, noexec);
        libc::write(errpipe, buf.as_ptr() as *const libc::c_void, n);
    }
    libc::_exit(255)
}

/// # Safety
/// Only called in the forked child; never returns.
unsafe fn child(prepared: &PreparedExec, request: &ForkExecRequest) -> ! {
    let errpipe = request.errpipe_write_fd;

    for fd in [
        request.stdin_write_fd,
        request.stdout_read_fd,
        request.stderr_read_fd,
        request.errpipe_read_fd,
    ] {
        if fd >= 0 {
            libc::close(fd);
        }
    }
    let mut streams = [
        (request.stdin_read_fd, 0, false),
        (request.stdout_write_fd, 1, false),
        (request.stderr_write_fd, 2, false),
    ];
    // a source in 0..=2 would be overwritten by an earlier install
    for (fd, target, lifted) in streams.iter_mut() {
        if (0..=2).contains(fd) && *fd != *target {
            *fd = libc::fcntl(*fd, libc::F_DUPFD, 3);
            if *fd == -1 {
                fail(errpipe, Errno::last_raw(), false);
            }
            *lifted = true;
        }
    }
    for (fd, target, _) in streams {
        if !install(fd, target) {
            fail(errpipe, Errno::last_raw(), false);
        }
    }
    for (fd, _, lifted) in streams {
        if lifted {
            libc::close(fd);
        }
    }
    if let Some(cwd) = &prepared.cwd {
        if libc::chdir(cwd.as_ptr()) == -1 {
            fail(errpipe, Errno::last_raw(), false);
        }
    }
    if request.restore_signals {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        libc::signal(libc::SIGXFSZ, libc::SIG_DFL);
    }
    if request.call_setsid && libc::setsid() == -1 {
        fail(errpipe, Errno::last_raw(), false);
    }
    if request.close_fds {
        for fd in 3..prepared.max_fd {
            if prepared.keep.binary_search(&fd).is_err() {
                libc::close(fd);
            }
        }
    }

    let mut errno = libc::ENOENT;
    for exe in &prepared.executables {
        match &prepared.envp {
            Some(envp) => libc::execve(exe.as_ptr(), prepared.argv.as_ptr(), envp.as_ptr()),
            None => libc::execv(exe.as_ptr(), prepared.argv.as_ptr()),
        };
        errno = Errno::last_raw();
        if errno != libc::ENOENT && errno != libc::ENOTDIR {
            break;
        }
    }
    fail(errpipe, errno, true)
}

/// Fork and exec the first runnable entry of `request.executables`; returns the child pid.
/// Failures in the child are reported through `errpipe_write_fd`.
pub(crate) fn fork_exec(request: &ForkExecRequest) -> Result<i64> {
    if request.executables.is_empty() {
        return Err(PosixSupportError::from(Errno::ENOENT));
    }
    let prepared = PreparedExec::new(request)?;
    // SAFETY: the child branch only performs async-signal-safe calls on data prepared
    // above and ends in exec or _exit.
    match unsafe { libc::fork() } {
        -1 => Err(Errno::last().into()),
        0 => unsafe { child(&prepared, request) },
        pid => Ok(pid as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_error_format() {
        let (buf, n) = format_child_error(2, true);
        assert_eq!(&buf[..n], b"OSError:2:noexec");
        let (buf, n) = format_child_error(0x1d, false);
        assert_eq!(&buf[..n], b"OSError:1d:");
        let (buf, n) = format_child_error(0, false);
        assert_eq!(&buf[..n], b"OSError:0:");
    }
}
