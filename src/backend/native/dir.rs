use nix::errno::Errno;
use std::ffi::{CStr, CString};
use std::io;
use std::ptr;
use std::sync::{Mutex, MutexGuard};

struct DirPtr(*mut libc::DIR);

// SAFETY: the DIR* is only used while holding the owning mutex.
unsafe impl Send for DirPtr {}

/// One entry as read from the stream; `.` and `..` never appear.
#[derive(Debug)]
pub(crate) struct RawEntry {
    pub name: Vec<u8>,
    pub inode: u64,
    pub d_type: i32,
}

/// `DIR*` stream; closing is idempotent and also happens on drop.
pub(crate) struct NativeDir {
    dir: Mutex<DirPtr>,
}

impl NativeDir {
    pub fn open(path: &CString) -> io::Result<Self> {
        // SAFETY: path is a valid C string.
        let dir = unsafe { libc::opendir(path.as_ptr()) };
        Self::wrap(dir)
    }

    /// The stream takes ownership of `fd`.
    pub fn from_fd(fd: i32) -> io::Result<Self> {
        // SAFETY: fdopendir validates the descriptor itself.
        let dir = unsafe { libc::fdopendir(fd) };
        Self::wrap(dir)
    }

    fn wrap(dir: *mut libc::DIR) -> io::Result<Self> {
        if dir.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            dir: Mutex::new(DirPtr(dir)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DirPtr> {
        self.dir.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().0.is_null()
    }

    pub fn close(&self) -> io::Result<()> {
        let mut dir = self.lock();
        if dir.0.is_null() {
            return Ok(());
        }
        // SAFETY: non-null DIR* from opendir/fdopendir, closed exactly once.
        let rc = unsafe { libc::closedir(dir.0) };
        dir.0 = ptr::null_mut();
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn next(&self) -> io::Result<Option<RawEntry>> {
        let dir = self.lock();
        if dir.0.is_null() {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }
        loop {
            Errno::clear();
            // SAFETY: DIR* is live while the lock is held.
            let entry = unsafe { libc::readdir(dir.0) };
            if entry.is_null() {
                return match Errno::last_raw() {
                    0 => Ok(None),
                    code => Err(io::Error::from_raw_os_error(code)),
                };
            }
            // SAFETY: readdir returned a valid dirent that stays valid until the next call.
            let entry = unsafe { &*entry };
            // SAFETY: d_name is NUL-terminated.
            let name = unsafe { CStr::from_ptr(entry.d_name.as_ptr()) }.to_bytes();
            if name == b"." || name == b".." {
                continue;
            }
            return Ok(Some(RawEntry {
                name: name.to_vec(),
                inode: entry.d_ino as u64,
                d_type: entry.d_type as i32,
            }));
        }
    }

    pub fn rewind(&self) {
        let dir = self.lock();
        if !dir.0.is_null() {
            // SAFETY: DIR* is live while the lock is held.
            unsafe { libc::rewinddir(dir.0) };
        }
    }
}

impl Drop for NativeDir {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_skips_dot_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let path = CString::new(dir.path().to_str().unwrap()).unwrap();

        let stream = NativeDir::open(&path).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = stream.next().unwrap() {
            names.push(entry.name);
        }
        names.sort();
        assert_eq!(names, vec![b"a".to_vec(), b"sub".to_vec()]);

        stream.rewind();
        assert!(stream.next().unwrap().is_some());
        stream.close().unwrap();
        stream.close().unwrap();
        assert_eq!(stream.next().unwrap_err().raw_os_error(), Some(libc::EBADF));
    }
}
