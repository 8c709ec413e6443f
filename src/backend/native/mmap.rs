use nix::errno::Errno;
use std::io;
use std::sync::{Mutex, MutexGuard};

/// A live `mmap` region. Accesses are bounds-checked and serialized with `unmap`.
pub(crate) struct NativeMmap {
    addr: usize,
    len: usize,
    writable: bool,
    unmapped: Mutex<bool>,
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

impl NativeMmap {
    pub fn map(length: usize, prot: i32, flags: i32, fd: i32, offset: i64) -> io::Result<Self> {
        // SAFETY: a null hint lets the kernel pick the address; all other arguments are
        // validated by the kernel.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                length,
                prot,
                flags,
                fd,
                offset as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            addr: addr as usize,
            len: length,
            writable: prot & libc::PROT_WRITE != 0,
            unmapped: Mutex::new(false),
        })
    }

    fn live(&self) -> Result<MutexGuard<'_, bool>, Errno> {
        let unmapped = self.unmapped.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *unmapped {
            return Err(Errno::EINVAL);
        }
        Ok(unmapped)
    }

    fn check(&self, index: usize, count: usize) -> Result<(), Errno> {
        match index.checked_add(count) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Errno::EINVAL),
        }
    }

    pub fn address(&self) -> usize {
        self.addr
    }

    pub fn read_byte(&self, index: usize) -> Result<u8, Errno> {
        let _live = self.live()?;
        self.check(index, 1)?;
        // SAFETY: index is within the live mapping.
        Ok(unsafe { *((self.addr + index) as *const u8) })
    }

    pub fn read_bytes(&self, index: usize, out: &mut [u8]) -> Result<usize, Errno> {
        let _live = self.live()?;
        if index > self.len {
            return Err(Errno::EINVAL);
        }
        let n = out.len().min(self.len - index);
        // SAFETY: [index, index + n) is within the live mapping.
        unsafe {
            std::ptr::copy_nonoverlapping((self.addr + index) as *const u8, out.as_mut_ptr(), n);
        }
        Ok(n)
    }

    pub fn write_bytes(&self, index: usize, data: &[u8]) -> Result<(), Errno> {
        if !self.writable {
            return Err(Errno::EACCES);
        }
        let _live = self.live()?;
        self.check(index, data.len())?;
        // SAFETY: the range is within a live, writable mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), (self.addr + index) as *mut u8, data.len());
        }
        Ok(())
    }

    /// `msync` the pages covering `[offset, offset + length)`.
    pub fn flush(&self, offset: usize, length: usize) -> Result<(), Errno> {
        let _live = self.live()?;
        let offset = offset.min(self.len);
        let length = length.min(self.len - offset);
        let page = page_size();
        let start = (self.addr + offset) / page * page;
        let end = self.addr + offset + length;
        // SAFETY: the page range lies within the live mapping.
        let rc = unsafe { libc::msync(start as *mut libc::c_void, end - start, libc::MS_SYNC) };
        if rc == -1 {
            return Err(Errno::last());
        }
        Ok(())
    }

    pub fn unmap(&self) -> Result<(), Errno> {
        let mut unmapped = self.unmapped.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if *unmapped {
            return Ok(());
        }
        // SAFETY: the region came from mmap and is unmapped exactly once.
        let rc = unsafe { libc::munmap(self.addr as *mut libc::c_void, self.len) };
        if rc == -1 {
            return Err(Errno::last());
        }
        *unmapped = true;
        Ok(())
    }
}

impl Drop for NativeMmap {
    fn drop(&mut self) {
        let _ = self.unmap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_map_access() {
        let map = NativeMmap::map(
            4096,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
        .unwrap();
        map.write_bytes(10, b"xyz").unwrap();
        assert_eq!(map.read_byte(11).unwrap(), b'y');
        assert_eq!(map.read_byte(4096), Err(Errno::EINVAL));
        let mut out = [0u8; 8];
        assert_eq!(map.read_bytes(4093, &mut out).unwrap(), 3);
        map.flush(0, 4096).unwrap_or(());
        map.unmap().unwrap();
        map.unmap().unwrap();
        assert_eq!(map.read_byte(0), Err(Errno::EINVAL));
    }

    #[test]
    fn test_read_only_map_rejects_writes() {
        let map = NativeMmap::map(4096, libc::PROT_READ, libc::MAP_PRIVATE | libc::MAP_ANON, -1, 0).unwrap();
        assert_eq!(map.write_bytes(0, b"a"), Err(Errno::EACCES));
    }
}
