use crate::backend::emulated::errors::ErrorTable;
use crate::config::types::Result;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::sync::{Mutex, MutexGuard};

struct MapState {
    data: Vec<u8>,
    unmapped: bool,
}

/// Heap copy of a mapping. File-backed shared maps are written back on flush and unmap.
pub(crate) struct EmulatedMmap {
    state: Mutex<MapState>,
    backing: Option<File>,
    offset: u64,
    writable: bool,
}

impl EmulatedMmap {
    pub fn anonymous(length: usize, writable: bool) -> Self {
        Self {
            state: Mutex::new(MapState {
                data: vec![0; length],
                unmapped: false,
            }),
            backing: None,
            offset: 0,
            writable,
        }
    }

    /// Load `length` bytes at `offset`; a zero length maps up to the end of the file.
    /// `backing` is kept only for shared mappings.
    pub fn from_file(
        file: File,
        length: usize,
        offset: u64,
        writable: bool,
        shared: bool,
        errors: &ErrorTable,
    ) -> Result<Self> {
        let size = file.metadata().map_err(|e| errors.io(&e))?.len();
        let length = if length == 0 {
            size.checked_sub(offset).ok_or_else(|| errors.err("EINVAL"))? as usize
        } else {
            length
        };
        let mut data = vec![0; length];
        let available = size.saturating_sub(offset).min(length as u64) as usize;
        file.read_exact_at(&mut data[..available], offset)
            .map_err(|e| errors.io(&e))?;
        Ok(Self {
            state: Mutex::new(MapState {
                data,
                unmapped: false,
            }),
            backing: shared.then_some(file),
            offset,
            writable,
        })
    }

    fn lock(&self) -> MutexGuard<'_, MapState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live<'a>(&'a self, errors: &ErrorTable) -> Result<MutexGuard<'a, MapState>> {
        let state = self.lock();
        if state.unmapped {
            return Err(errors.err("EINVAL"));
        }
        Ok(state)
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn read_byte(&self, index: usize, errors: &ErrorTable) -> Result<u8> {
        let state = self.live(errors)?;
        state.data.get(index).copied().ok_or_else(|| errors.err("EINVAL"))
    }

    pub fn write_byte(&self, index: usize, value: u8, errors: &ErrorTable) -> Result<()> {
        self.write_bytes(index, &[value], errors)
    }

    pub fn read_bytes(&self, index: usize, out: &mut [u8], errors: &ErrorTable) -> Result<usize> {
        let state = self.live(errors)?;
        if index > state.data.len() {
            return Err(errors.err("EINVAL"));
        }
        let n = out.len().min(state.data.len() - index);
        out[..n].copy_from_slice(&state.data[index..index + n]);
        Ok(n)
    }

    pub fn write_bytes(&self, index: usize, data: &[u8], errors: &ErrorTable) -> Result<()> {
        if !self.writable {
            return Err(errors.err("EACCES"));
        }
        let mut state = self.live(errors)?;
        let end = index.checked_add(data.len()).ok_or_else(|| errors.err("EINVAL"))?;
        if end > state.data.len() {
            return Err(errors.err("EINVAL"));
        }
        state.data[index..end].copy_from_slice(data);
        Ok(())
    }

    pub fn flush(&self, offset: usize, length: usize, errors: &ErrorTable) -> Result<()> {
        let state = self.live(errors)?;
        self.write_back(&state, offset, length, errors)
    }

    fn write_back(&self, state: &MapState, offset: usize, length: usize, errors: &ErrorTable) -> Result<()> {
        let Some(file) = &self.backing else {
            return Ok(());
        };
        if !self.writable {
            return Ok(());
        }
        let start = offset.min(state.data.len());
        let end = start.saturating_add(length).min(state.data.len());
        file.write_all_at(&state.data[start..end], self.offset + start as u64)
            .map_err(|e| errors.io(&e))
    }

    /// Flush and drop the contents; later accesses fail with `EINVAL`.
    pub fn unmap(&self, errors: &ErrorTable) -> Result<()> {
        let mut state = self.lock();
        if state.unmapped {
            return Ok(());
        }
        let length = state.data.len();
        self.write_back(&state, 0, length, errors)?;
        state.unmapped = true;
        state.data = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::{Platform, PosixConstants};
    use std::fs::OpenOptions;

    fn errors() -> ErrorTable {
        ErrorTable::new(PosixConstants::for_platform(Platform::Linux))
    }

    #[test]
    fn test_anonymous_map() {
        let map = EmulatedMmap::anonymous(4, true);
        map.write_bytes(1, b"ab", &errors()).unwrap();
        assert_eq!(map.read_byte(2, &errors()).unwrap(), b'b');
        let mut out = [0u8; 8];
        assert_eq!(map.read_bytes(0, &mut out, &errors()).unwrap(), 4);
        assert_eq!(&out[..4], b"\0ab\0");
        assert!(map.write_bytes(3, b"xy", &errors()).is_err());
        map.unmap(&errors()).unwrap();
        assert_eq!(map.read_byte(0, &errors()).unwrap_err().errno(), Some(22));
    }

    #[test]
    fn test_shared_file_map_writes_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m");
        std::fs::write(&path, b"hello world").unwrap();
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();

        let map = EmulatedMmap::from_file(file, 0, 6, true, true, &errors()).unwrap();
        assert_eq!(map.len(), 5);
        map.write_bytes(0, b"WORLD", &errors()).unwrap();
        map.flush(0, 5, &errors()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello WORLD");
    }

    #[test]
    fn test_read_only_map_rejects_writes() {
        let map = EmulatedMmap::anonymous(2, false);
        assert_eq!(map.write_byte(0, 1, &errors()).unwrap_err().errno(), Some(13));
    }
}
