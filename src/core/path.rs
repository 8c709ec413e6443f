use std::ffi::{CString, OsStr};
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Immutable byte path shared by every backend.
///
/// Construction rejects embedded NUL bytes instead of truncating at them, so every
/// `PosixPath` converts to a C string without loss.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PosixPath {
    bytes: Vec<u8>,
    original: Option<String>,
}

impl PosixPath {
    pub fn from_string(path: &str) -> Option<Self> {
        if path.as_bytes().contains(&0) {
            return None;
        }
        Some(Self {
            bytes: path.as_bytes().to_vec(),
            original: Some(path.to_string()),
        })
    }

    pub fn from_bytes(path: &[u8]) -> Option<Self> {
        if path.contains(&0) {
            return None;
        }
        Some(Self {
            bytes: path.to_vec(),
            original: None,
        })
    }

    pub(crate) fn from_os_str(path: &OsStr) -> Option<Self> {
        Self::from_bytes(path.as_bytes())
    }

    /// Bytes up to the first NUL, as C APIs and directory entries hand them out.
    pub(crate) fn from_c_bytes(bytes: &[u8]) -> Self {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        Self {
            bytes: bytes[..end].to_vec(),
            original: None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// The string this path was created from, if it was created from a string.
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// Text form; non UTF-8 bytes are replaced.
    pub fn to_string_lossy(&self) -> String {
        match &self.original {
            Some(s) => s.clone(),
            None => String::from_utf8_lossy(&self.bytes).into_owned(),
        }
    }

    pub fn as_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.bytes))
    }

    pub fn to_cstring(&self) -> CString {
        // Interior NULs are rejected at construction, so this cannot fail.
        CString::new(self.bytes.clone()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.bytes.first() == Some(&b'/')
    }

    /// `self/name`, without doubling a trailing separator.
    pub fn join(&self, name: &[u8]) -> PosixPath {
        let mut bytes = self.bytes.clone();
        if !bytes.is_empty() && bytes.last() != Some(&b'/') {
            bytes.push(b'/');
        }
        bytes.extend_from_slice(name);
        PosixPath {
            bytes,
            original: None,
        }
    }
}

impl fmt::Debug for PosixPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PosixPath({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for PosixPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_nul_rejected() {
        assert!(PosixPath::from_string("a\0b").is_none());
        assert!(PosixPath::from_bytes(b"abc\0").is_none());
        assert!(PosixPath::from_bytes(b"\0").is_none());
    }

    #[test]
    fn test_no_truncation() {
        let p = PosixPath::from_bytes(b"/tmp/x\xff").unwrap();
        assert_eq!(p.as_bytes(), b"/tmp/x\xff");
        assert_eq!(p.to_cstring().as_bytes(), b"/tmp/x\xff");
        assert!(p.original().is_none());
    }

    #[test]
    fn test_string_roundtrip_keeps_original() {
        let p = PosixPath::from_string("/tmp/é").unwrap();
        assert_eq!(p.original(), Some("/tmp/é"));
        assert_eq!(p.to_string_lossy(), "/tmp/é");
    }

    #[test]
    fn test_join() {
        let dir = PosixPath::from_string("/tmp/").unwrap();
        assert_eq!(dir.join(b"f").as_bytes(), b"/tmp/f");
        let dir = PosixPath::from_string("/tmp").unwrap();
        assert_eq!(dir.join(b"f").as_bytes(), b"/tmp/f");
    }
}
