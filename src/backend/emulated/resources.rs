//! Descriptor table, child processes and synthetic inodes of the emulated backend.
//!
//! Each table sits behind its own mutex. Compound operations (allocate then insert,
//! look up then replace) hold the table lock for their whole duration.

use crate::backend::emulated::channel::{Channel, ChannelWrapper};
use crate::core::types::HostEnv;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard};

/// First descriptor handed out by ordinary opens; 0..=2 belong to the standard streams.
pub(crate) const FIRST_FREE_FD: i32 = 3;

/// Virtual pid standing for every tracked child at once.
pub(crate) const PROCESS_GROUP: i64 = 0;

/// Outcome of a non-blocking wait.
#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Exited(i64, ExitStatus),
    Running,
    NoChild,
}

pub(crate) struct PosixResources {
    files: Mutex<BTreeMap<i32, Arc<ChannelWrapper>>>,
    paths: Mutex<HashMap<i32, PathBuf>>,
    children: Mutex<Vec<Option<Child>>>,
    inodes: Mutex<HashMap<PathBuf, u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PosixResources {
    pub fn new() -> Self {
        let resources = Self {
            files: Mutex::new(BTreeMap::new()),
            paths: Mutex::new(HashMap::new()),
            // slot 0 is the process group aggregate and never holds a child
            children: Mutex::new(vec![None]),
            inodes: Mutex::new(HashMap::new()),
        };
        resources.bind_std_streams(HostEnv::inherit());
        resources
    }

    /// Rebind descriptors 0, 1 and 2 to `env`'s streams.
    pub fn bind_std_streams(&self, env: HostEnv) {
        let mut files = lock(&self.files);
        let streams = [
            ChannelWrapper::std_stream(Channel::Input(env.stdin)),
            ChannelWrapper::std_stream(Channel::Output(env.stdout)),
            ChannelWrapper::std_stream(Channel::Output(env.stderr)),
        ];
        for (fd, wrapper) in streams.into_iter().enumerate() {
            files.insert(fd as i32, wrapper);
        }
    }

    /// Smallest descriptor `>= FIRST_FREE_FD` absent from `files`.
    fn next_free_fd(files: &BTreeMap<i32, Arc<ChannelWrapper>>) -> i32 {
        let mut candidate = FIRST_FREE_FD;
        for &fd in files.range(FIRST_FREE_FD..).map(|(fd, _)| fd) {
            if fd != candidate {
                break;
            }
            candidate += 1;
        }
        candidate
    }

    /// Install `channel` under a fresh descriptor.
    pub fn open(&self, channel: Channel, path: Option<PathBuf>) -> i32 {
        let wrapper = ChannelWrapper::new(channel);
        let fd = {
            let mut files = lock(&self.files);
            let fd = Self::next_free_fd(&files);
            files.insert(fd, wrapper);
            fd
        };
        if let Some(path) = path {
            lock(&self.paths).insert(fd, path);
        }
        fd
    }

    pub fn get(&self, fd: i32) -> Option<Arc<ChannelWrapper>> {
        lock(&self.files).get(&fd).cloned()
    }

    pub fn path(&self, fd: i32) -> Option<PathBuf> {
        lock(&self.paths).get(&fd).cloned()
    }

    pub fn is_open(&self, fd: i32) -> bool {
        lock(&self.files).contains_key(&fd)
    }

    pub fn open_fds(&self) -> Vec<i32> {
        lock(&self.files).keys().copied().collect()
    }

    /// Remove `fd`; the channel is closed once no descriptor refers to it.
    /// Returns `false` if `fd` was not open.
    pub fn close(&self, fd: i32) -> bool {
        let removed = lock(&self.files).remove(&fd);
        lock(&self.paths).remove(&fd);
        match removed {
            Some(wrapper) => {
                if wrapper.release() {
                    debug!("Emulated fd {} was the last reference, channel closed", fd);
                }
                true
            }
            None => false,
        }
    }

    pub fn dup(&self, fd: i32) -> Option<i32> {
        let new_fd = {
            let mut files = lock(&self.files);
            let wrapper = Arc::clone(files.get(&fd)?);
            wrapper.retain();
            let new_fd = Self::next_free_fd(&files);
            files.insert(new_fd, wrapper);
            new_fd
        };
        self.copy_path(fd, new_fd);
        Some(new_fd)
    }

    /// Make `fd2` refer to `fd`'s channel, closing whatever `fd2` referred to before.
    pub fn dup2(&self, fd: i32, fd2: i32) -> Option<i32> {
        let replaced = {
            let mut files = lock(&self.files);
            let wrapper = Arc::clone(files.get(&fd)?);
            if fd == fd2 {
                return Some(fd2);
            }
            wrapper.retain();
            files.insert(fd2, wrapper)
        };
        if let Some(old) = replaced {
            old.release();
        }
        lock(&self.paths).remove(&fd2);
        self.copy_path(fd, fd2);
        Some(fd2)
    }

    fn copy_path(&self, from: i32, to: i32) {
        let mut paths = lock(&self.paths);
        if let Some(path) = paths.get(&from).cloned() {
            paths.insert(to, path);
        }
    }

    /// Track `child` in the first free slot `>= 1`; the slot index is its virtual pid.
    pub fn add_child(&self, child: Child) -> i64 {
        let mut children = lock(&self.children);
        match children.iter().skip(1).position(Option::is_none) {
            Some(index) => {
                children[index + 1] = Some(child);
                (index + 1) as i64
            }
            None => {
                children.push(Some(child));
                (children.len() - 1) as i64
            }
        }
    }

    /// Host pid of virtual pid `pid`.
    pub fn child_id(&self, pid: i64) -> Option<u32> {
        let children = lock(&self.children);
        children.get(usize::try_from(pid).ok()?)?.as_ref().map(Child::id)
    }

    pub fn has_children(&self) -> bool {
        lock(&self.children).iter().any(Option::is_some)
    }

    /// Poll `pid` (or every child for [`PROCESS_GROUP`]); a reaped child leaves a tombstone.
    pub fn try_wait(&self, pid: i64) -> io::Result<WaitOutcome> {
        let mut children = lock(&self.children);
        let slots: Vec<usize> = if pid == PROCESS_GROUP || pid == -1 {
            (1..children.len()).collect()
        } else {
            match usize::try_from(pid) {
                Ok(slot) if slot > 0 && slot < children.len() => vec![slot],
                _ => return Ok(WaitOutcome::NoChild),
            }
        };
        let mut any = false;
        for slot in slots {
            let Some(child) = children[slot].as_mut() else {
                continue;
            };
            any = true;
            if let Some(status) = child.try_wait()? {
                children[slot] = None;
                return Ok(WaitOutcome::Exited(slot as i64, status));
            }
        }
        Ok(if any {
            WaitOutcome::Running
        } else {
            WaitOutcome::NoChild
        })
    }

    /// Kill `pid`, or every tracked child for [`PROCESS_GROUP`]. `None` if no such child.
    pub fn kill(&self, pid: i64) -> Option<io::Result<()>> {
        let mut children = lock(&self.children);
        if pid == PROCESS_GROUP {
            let mut result = Ok(());
            let mut any = false;
            for child in children.iter_mut().skip(1).flatten() {
                any = true;
                if let Err(e) = child.kill() {
                    result = Err(e);
                }
            }
            return any.then_some(result);
        }
        let slot = usize::try_from(pid).ok().filter(|slot| *slot > 0)?;
        children.get_mut(slot)?.as_mut().map(Child::kill)
    }

    /// Synthetic inode for `path`, stable for the lifetime of this table.
    pub fn inode_of(&self, path: &Path) -> u64 {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let mut inodes = lock(&self.inodes);
        let next = inodes.len() as u64 + 1;
        *inodes.entry(key).or_insert(next)
    }
}

impl Drop for PosixResources {
    fn drop(&mut self) {
        let files = std::mem::take(&mut *lock(&self.files));
        for (_, wrapper) in files {
            wrapper.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::emulated::channel::Pipe;

    fn pipe_channel() -> Channel {
        Channel::PipeReader(Pipe::new())
    }

    #[test]
    fn test_fd_allocation_fills_gaps() {
        let resources = PosixResources::new();
        let a = resources.open(pipe_channel(), None);
        let b = resources.open(pipe_channel(), None);
        let c = resources.open(pipe_channel(), None);
        assert_eq!((a, b, c), (3, 4, 5));
        assert!(resources.close(b));
        assert_eq!(resources.open(pipe_channel(), None), 4);
        assert_eq!(resources.open(pipe_channel(), None), 6);
    }

    #[test]
    fn test_std_slots_never_reallocated() {
        let resources = PosixResources::new();
        assert!(resources.close(0));
        assert_eq!(resources.open(pipe_channel(), None), 3);
    }

    #[test]
    fn test_dup_shares_wrapper_until_last_close() {
        let resources = PosixResources::new();
        let fd = resources.open(pipe_channel(), Some(PathBuf::from("/p")));
        let copy = resources.dup(fd).unwrap();
        let wrapper = resources.get(fd).unwrap();
        assert_eq!(wrapper.refcount(), 2);
        assert_eq!(resources.path(copy), Some(PathBuf::from("/p")));

        assert!(resources.close(fd));
        assert!(!wrapper.is_closed());
        assert!(resources.path(fd).is_none());
        assert!(resources.close(copy));
        assert!(wrapper.is_closed());
    }

    #[test]
    fn test_dup2_closes_previous_target() {
        let resources = PosixResources::new();
        let a = resources.open(pipe_channel(), None);
        let b = resources.open(pipe_channel(), None);
        let old_b = resources.get(b).unwrap();
        assert_eq!(resources.dup2(a, b), Some(b));
        assert!(old_b.is_closed());
        assert_eq!(resources.get(b).unwrap().id(), resources.get(a).unwrap().id());
        assert_eq!(resources.dup2(a, a), Some(a));
        assert_eq!(resources.get(a).unwrap().refcount(), 2);
        assert!(resources.dup2(99, a).is_none());
    }

    #[test]
    fn test_inode_memoized() {
        let resources = PosixResources::new();
        let first = resources.inode_of(Path::new("/definitely/missing/a"));
        let second = resources.inode_of(Path::new("/definitely/missing/b"));
        assert_ne!(first, second);
        assert_eq!(resources.inode_of(Path::new("/definitely/missing/a")), first);
    }

    #[test]
    fn test_child_slots_reused_after_reap() {
        let resources = PosixResources::new();
        let child = std::process::Command::new("true").spawn().unwrap();
        let pid = resources.add_child(child);
        assert_eq!(pid, 1);
        loop {
            match resources.try_wait(pid).unwrap() {
                WaitOutcome::Exited(reaped, status) => {
                    assert_eq!(reaped, pid);
                    assert!(status.success());
                    break;
                }
                WaitOutcome::Running => std::thread::sleep(std::time::Duration::from_millis(5)),
                WaitOutcome::NoChild => panic!("child vanished"),
            }
        }
        assert!(matches!(resources.try_wait(pid).unwrap(), WaitOutcome::NoChild));
        let child = std::process::Command::new("true").spawn().unwrap();
        assert_eq!(resources.add_child(child), 1);
        assert!(resources.kill(PROCESS_GROUP).is_some());
    }
}
