//! Child processes through `std::process`, with descriptor redirection onto emulated channels.

use crate::backend::emulated::channel::{Channel, Pipe};
use crate::backend::emulated::errors::ErrorTable;
use crate::backend::emulated::resources::PosixResources;
use crate::config::types::Result;
use crate::core::types::ForkExecRequest;
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;

use super::COMPAT_TARGET;

const PUMP_CHUNK: usize = 8192;

/// Raw wait status in the classic `<exit code> << 8 | <signal>` layout.
pub(crate) fn encode_status(status: ExitStatus) -> i32 {
    status.into_raw()
}

pub(crate) fn wifexited(status: i32) -> bool {
    status & 0x7f == 0
}

pub(crate) fn wexitstatus(status: i32) -> i32 {
    (status >> 8) & 0xff
}

pub(crate) fn wifsignaled(status: i32) -> bool {
    ((((status & 0x7f) + 1) as i8) >> 1) > 0
}

pub(crate) fn wtermsig(status: i32) -> i32 {
    status & 0x7f
}

pub(crate) fn wifstopped(status: i32) -> bool {
    status & 0xff == 0x7f
}

/// Stop signal of a `wifstopped` status.
pub(crate) fn wstopsig(status: i32) -> i32 {
    (status >> 8) & 0xff
}

pub(crate) fn wifcontinued(status: i32) -> bool {
    status == 0xffff
}

pub(crate) fn wcoredump(status: i32) -> bool {
    status & 0x80 != 0
}

enum Redirect {
    Inherit,
    Direct(Stdio),
    FeedFrom(Arc<Pipe>),
    DrainTo(Arc<Pipe>),
}

impl Redirect {
    fn stdio(&mut self) -> Stdio {
        match std::mem::replace(self, Redirect::Inherit) {
            Redirect::Inherit => Stdio::inherit(),
            Redirect::Direct(stdio) => stdio,
            pump @ (Redirect::FeedFrom(_) | Redirect::DrainTo(_)) => {
                *self = pump;
                Stdio::piped()
            }
        }
    }
}

fn redirect(resources: &PosixResources, fd: i32, errors: &ErrorTable) -> Result<Redirect> {
    if fd < 0 {
        return Ok(Redirect::Inherit);
    }
    let wrapper = resources.get(fd).ok_or_else(|| errors.err("EBADF"))?;
    let channel = wrapper.channel();
    Ok(match &*channel {
        Channel::File { file, .. } => Redirect::Direct(Stdio::from(file.try_clone().map_err(|e| errors.io(&e))?)),
        Channel::PipeReader(pipe) => Redirect::FeedFrom(Arc::clone(pipe)),
        Channel::PipeWriter(pipe) => Redirect::DrainTo(Arc::clone(pipe)),
        Channel::Input(_) => Redirect::Direct(Stdio::inherit()),
        Channel::Output(_) if fd == 2 => Redirect::Direct(Stdio::from(io::stderr())),
        Channel::Output(_) => Redirect::Direct(Stdio::from(io::stdout())),
        Channel::Directory { .. } => return Err(errors.err("EISDIR")),
        Channel::Closed => return Err(errors.err("EBADF")),
    })
}

fn feed(pipe: Arc<Pipe>, mut sink: impl Write + Send + 'static, errors: ErrorTable) {
    let spawned = thread::Builder::new()
        .name("posix-emulated-stdin".to_string())
        .spawn(move || loop {
            match pipe.read(PUMP_CHUNK, false, &errors) {
                Ok(chunk) if chunk.is_empty() => break,
                Ok(chunk) => {
                    if sink.write_all(&chunk).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start stdin pump: {}", e);
    }
}

fn drain(pipe: Arc<Pipe>, mut source: impl Read + Send + 'static, errors: ErrorTable) {
    pipe.add_writer();
    let worker_pipe = Arc::clone(&pipe);
    let spawned = thread::Builder::new()
        .name("posix-emulated-output".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; PUMP_CHUNK];
            loop {
                match source.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if worker_pipe.write(&buf[..n], &errors).is_err() {
                            break;
                        }
                    }
                }
            }
            worker_pipe.close_writer();
        });
    if let Err(e) = spawned {
        warn!("Failed to start output pump: {}", e);
        pipe.close_writer();
    }
}

fn split_env_entry(entry: &[u8]) -> Option<(&OsStr, &OsStr)> {
    let eq = entry.iter().position(|b| *b == b'=')?;
    Some((OsStr::from_bytes(&entry[..eq]), OsStr::from_bytes(&entry[eq + 1..])))
}

/// Spawn the first of `request.executables` that exists, with stdio redirected onto the
/// emulated descriptors named in the request.
pub(crate) fn spawn(
    resources: &PosixResources,
    errors: &ErrorTable,
    cwd: &Path,
    request: &ForkExecRequest,
) -> Result<Child> {
    if request.call_setsid || request.restore_signals || !request.fds_to_keep.is_empty() {
        info!(
            target: COMPAT_TARGET,
            "Ignored: setsid/restore_signals/fds_to_keep in POSIX emulation layer (not supported)"
        );
    }
    let workdir: PathBuf = request
        .cwd
        .as_ref()
        .map(|p| cwd.join(p.as_path()))
        .unwrap_or_else(|| cwd.to_path_buf());

    let mut last_error = io::Error::from(io::ErrorKind::NotFound);
    let mut failed_on = None;
    for executable in &request.executables {
        let mut stdin = redirect(resources, request.stdin_read_fd, errors)?;
        let mut stdout = redirect(resources, request.stdout_write_fd, errors)?;
        let mut stderr = redirect(resources, request.stderr_write_fd, errors)?;

        let mut command = Command::new(executable.as_path());
        if let Some((argv0, rest)) = request.args.split_first() {
            command.arg0(OsStr::from_bytes(argv0));
            command.args(rest.iter().map(|a| OsStr::from_bytes(a)));
        }
        if let Some(env) = &request.env {
            command.env_clear();
            for (key, value) in env.iter().filter_map(|e| split_env_entry(e)) {
                command.env(key, value);
            }
        }
        command
            .current_dir(&workdir)
            .stdin(stdin.stdio())
            .stdout(stdout.stdio())
            .stderr(stderr.stdio());

        match command.spawn() {
            Ok(mut child) => {
                if let (Redirect::FeedFrom(pipe), Some(sink)) = (stdin, child.stdin.take()) {
                    feed(pipe, sink, *errors);
                }
                if let (Redirect::DrainTo(pipe), Some(source)) = (stdout, child.stdout.take()) {
                    drain(pipe, source, *errors);
                }
                if let (Redirect::DrainTo(pipe), Some(source)) = (stderr, child.stderr.take()) {
                    drain(pipe, source, *errors);
                }
                debug!("Spawned {} as host pid {}", executable, child.id());
                return Ok(child);
            }
            Err(e) => {
                let not_found = e.kind() == io::ErrorKind::NotFound;
                last_error = e;
                failed_on = Some(executable.to_string_lossy());
                if !not_found {
                    break;
                }
            }
        }
    }

    let err = errors.io(&last_error);
    if request.errpipe_write_fd >= 0 {
        if let Some(wrapper) = resources.get(request.errpipe_write_fd) {
            let code = err.errno().unwrap_or(0);
            let _ = wrapper.write(format!("OSError:{:x}:", code).as_bytes(), errors);
        }
    }
    Err(match failed_on {
        Some(path) => err.with_filename(path),
        None => err,
    })
}

/// Run `command` with `/bin/sh -c` and return its raw wait status.
pub(crate) fn system(command: &[u8], cwd: &Path, errors: &ErrorTable) -> Result<i32> {
    Command::new("/bin/sh")
        .arg("-c")
        .arg(OsStr::from_bytes(command))
        .current_dir(cwd)
        .status()
        .map(encode_status)
        .map_err(|e| errors.io(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::{Platform, PosixConstants};

    #[test]
    fn test_status_macros() {
        let exited = 3 << 8;
        assert!(wifexited(exited));
        assert_eq!(wexitstatus(exited), 3);
        assert!(!wifsignaled(exited));

        let killed = 9;
        assert!(wifsignaled(killed));
        assert_eq!(wtermsig(killed), 9);
        assert!(!wifexited(killed));
        assert!(wcoredump(killed | 0x80));

        let stopped = (19 << 8) | 0x7f;
        assert!(wifstopped(stopped));
        assert!(!wifsignaled(stopped));
        assert_eq!(wstopsig(stopped), 19);
        assert!(wifcontinued(0xffff));
    }

    #[test]
    fn test_system_exit_status() {
        let errors = ErrorTable::new(PosixConstants::for_platform(Platform::Linux));
        let status = system(b"exit 7", Path::new("/"), &errors).unwrap();
        assert!(wifexited(status));
        assert_eq!(wexitstatus(status), 7);
    }

    #[test]
    fn test_split_env_entry() {
        let (k, v) = split_env_entry(b"A=b=c").unwrap();
        assert_eq!(k, "A");
        assert_eq!(v, "b=c");
        assert!(split_env_entry(b"novalue").is_none());
    }
}
