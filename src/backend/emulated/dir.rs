use crate::backend::emulated::errors::ErrorTable;
use crate::config::constants::PosixConstants;
use crate::config::types::Result;
use std::fs::{self, FileType, ReadDir};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

struct DirState {
    entries: Option<ReadDir>,
    closed: bool,
}

/// Directory stream over `std::fs::read_dir`.
pub(crate) struct EmulatedDir {
    path: PathBuf,
    /// Descriptor the stream was created from by `fdopendir`, closed with the stream.
    owner_fd: Option<i32>,
    state: Mutex<DirState>,
}

/// Raw entry as read from the host directory.
#[derive(Debug)]
pub(crate) struct RawEntry {
    pub name: Vec<u8>,
    pub path: PathBuf,
    pub file_type: Option<FileType>,
}

impl EmulatedDir {
    pub fn open(path: PathBuf, owner_fd: Option<i32>, errors: &ErrorTable) -> Result<Self> {
        let entries = fs::read_dir(&path).map_err(|e| errors.io_path(&e, &path.to_string_lossy()))?;
        Ok(Self {
            path,
            owner_fd,
            state: Mutex::new(DirState {
                entries: Some(entries),
                closed: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DirState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark closed; returns the descriptor to close on the first call only.
    pub fn close(&self) -> Option<Option<i32>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.closed = true;
        state.entries = None;
        Some(self.owner_fd)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn next(&self, errors: &ErrorTable) -> Result<Option<RawEntry>> {
        let mut state = self.lock();
        if state.closed {
            return Err(errors.err("EBADF"));
        }
        let Some(entries) = state.entries.as_mut() else {
            return Ok(None);
        };
        match entries.next() {
            None => Ok(None),
            Some(Err(e)) => Err(errors.io(&e)),
            Some(Ok(entry)) => Ok(Some(RawEntry {
                name: entry.file_name().as_bytes().to_vec(),
                path: entry.path(),
                file_type: entry.file_type().ok(),
            })),
        }
    }

    pub fn rewind(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.entries = fs::read_dir(&self.path).ok();
        }
    }
}

/// `DT_*` value for a host file type.
pub(crate) fn d_type(constants: &PosixConstants, file_type: Option<FileType>) -> i32 {
    let name = match file_type {
        Some(t) if t.is_dir() => "DT_DIR",
        Some(t) if t.is_file() => "DT_REG",
        Some(t) if t.is_symlink() => "DT_LNK",
        Some(t) if t.is_fifo() => "DT_FIFO",
        Some(t) if t.is_socket() => "DT_SOCK",
        Some(t) if t.is_char_device() => "DT_CHR",
        Some(t) if t.is_block_device() => "DT_BLK",
        _ => "DT_UNKNOWN",
    };
    constants.int(name).unwrap_or(0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::Platform;

    #[test]
    fn test_listing_rewind_and_close() {
        let errors = ErrorTable::new(PosixConstants::for_platform(Platform::Linux));
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), b"x").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();

        let stream = EmulatedDir::open(dir.path().to_path_buf(), None, &errors).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = stream.next(&errors).unwrap() {
            names.push(entry.name);
        }
        names.sort();
        assert_eq!(names, vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(stream.next(&errors).unwrap().is_none());

        stream.rewind();
        assert!(stream.next(&errors).unwrap().is_some());

        assert_eq!(stream.close(), Some(None));
        assert_eq!(stream.close(), None);
        assert_eq!(stream.next(&errors).unwrap_err().errno(), Some(9));
    }

    #[test]
    fn test_d_type_values() {
        let linux = PosixConstants::for_platform(Platform::Linux);
        let dir = tempfile::tempdir().unwrap();
        let t = fs::metadata(dir.path()).unwrap().file_type();
        assert_eq!(d_type(linux, Some(t)), 4);
        assert_eq!(d_type(linux, None), 0);
    }
}
