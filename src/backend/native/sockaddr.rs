use crate::config::types::{PosixSupportError, Result};
use crate::core::support::{AddrInfoCursor, UniversalSockAddr};
use crate::core::types::{FamilySockAddr, Inet4SockAddr, Inet6SockAddr, UnixSockAddr};
use nix::errno::Errno;
use std::any::Any;
use std::ffi::CStr;
use std::fmt;
use std::mem::{self, offset_of};
use std::ptr;

/// `sockaddr_storage` plus the length the kernel reported for it.
#[derive(Clone, Copy)]
pub(crate) struct NativeSockAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

fn sun_path_offset() -> usize {
    offset_of!(libc::sockaddr_un, sun_path)
}

/// Longest `sun_path` payload; abstract names need no terminating NUL.
pub(crate) fn unix_path_capacity(path: &[u8]) -> usize {
    let size = mem::size_of::<libc::sockaddr_un>() - sun_path_offset();
    if path.first() == Some(&0) {
        size
    } else {
        size - 1
    }
}

impl NativeSockAddr {
    pub fn empty() -> Self {
        Self {
            // SAFETY: sockaddr_storage is plain old data; all-zero is a valid value.
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    /// Copy `len` bytes of a kernel-provided address.
    ///
    /// # Safety
    /// `addr` must point to at least `len` readable bytes.
    pub unsafe fn from_raw(addr: *const libc::sockaddr, len: libc::socklen_t) -> Self {
        let mut out = Self::empty();
        let len = (len as usize).min(mem::size_of::<libc::sockaddr_storage>());
        if !addr.is_null() {
            ptr::copy_nonoverlapping(
                addr as *const u8,
                &mut out.storage as *mut libc::sockaddr_storage as *mut u8,
                len,
            );
        }
        out.len = len as libc::socklen_t;
        out
    }

    pub fn from_family(addr: &FamilySockAddr) -> Result<Self> {
        let mut out = Self::empty();
        let base = &mut out.storage as *mut libc::sockaddr_storage;
        match addr {
            FamilySockAddr::Inet4(v4) => {
                // SAFETY: sockaddr_in is plain old data.
                let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port.to_be();
                sin.sin_addr = libc::in_addr {
                    s_addr: v4.address.to_be(),
                };
                #[cfg(any(target_os = "macos", target_os = "ios"))]
                {
                    sin.sin_len = mem::size_of::<libc::sockaddr_in>() as u8;
                }
                // SAFETY: sockaddr_storage is large and aligned enough for any sockaddr_*.
                unsafe { ptr::write(base as *mut libc::sockaddr_in, sin) };
                out.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            }
            FamilySockAddr::Inet6(v6) => {
                // SAFETY: sockaddr_in6 is plain old data.
                let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = v6.port.to_be();
                sin6.sin6_flowinfo = v6.flow_info.to_be();
                sin6.sin6_addr = libc::in6_addr { s6_addr: v6.address };
                sin6.sin6_scope_id = v6.scope_id;
                #[cfg(any(target_os = "macos", target_os = "ios"))]
                {
                    sin6.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
                }
                // SAFETY: as above.
                unsafe { ptr::write(base as *mut libc::sockaddr_in6, sin6) };
                out.len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
            }
            FamilySockAddr::Unix(unix) => {
                if unix.path.len() > unix_path_capacity(&unix.path) {
                    return Err(PosixSupportError::InvalidUnixSocketPath);
                }
                // SAFETY: sockaddr_un is plain old data.
                let mut sun: libc::sockaddr_un = unsafe { mem::zeroed() };
                sun.sun_family = libc::AF_UNIX as libc::sa_family_t;
                for (dst, src) in sun.sun_path.iter_mut().zip(&unix.path) {
                    *dst = *src as libc::c_char;
                }
                let terminator = usize::from(!unix.path.is_empty() && unix.path[0] != 0);
                // SAFETY: as above.
                unsafe { ptr::write(base as *mut libc::sockaddr_un, sun) };
                out.len = (sun_path_offset() + unix.path.len() + terminator) as libc::socklen_t;
            }
        }
        Ok(out)
    }

    /// Convert any backend's address, preferring the native representation.
    pub fn from_universal(addr: &dyn UniversalSockAddr) -> Result<Self> {
        if let Some(native) = addr.as_any().downcast_ref::<NativeSockAddr>() {
            return Ok(*native);
        }
        let family = if let Ok(v4) = addr.as_inet4() {
            FamilySockAddr::Inet4(v4)
        } else if let Ok(v6) = addr.as_inet6() {
            FamilySockAddr::Inet6(v6)
        } else {
            FamilySockAddr::Unix(addr.as_unix()?)
        };
        Self::from_family(&family)
    }

    pub fn as_ptr(&self) -> *const libc::sockaddr {
        &self.storage as *const libc::sockaddr_storage as *const libc::sockaddr
    }

    pub fn as_mut_ptr(&mut self) -> *mut libc::sockaddr {
        &mut self.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr
    }

    pub fn len(&self) -> libc::socklen_t {
        self.len
    }

    pub fn len_mut(&mut self) -> &mut libc::socklen_t {
        &mut self.len
    }

    pub fn to_family(&self) -> Option<FamilySockAddr> {
        let base = &self.storage as *const libc::sockaddr_storage;
        match self.storage.ss_family as libc::c_int {
            libc::AF_INET => {
                // SAFETY: the family tag says the storage holds a sockaddr_in.
                let sin = unsafe { &*(base as *const libc::sockaddr_in) };
                Some(FamilySockAddr::Inet4(Inet4SockAddr::new(
                    u16::from_be(sin.sin_port),
                    u32::from_be(sin.sin_addr.s_addr),
                )))
            }
            libc::AF_INET6 => {
                // SAFETY: the family tag says the storage holds a sockaddr_in6.
                let sin6 = unsafe { &*(base as *const libc::sockaddr_in6) };
                Some(FamilySockAddr::Inet6(Inet6SockAddr::new(
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_addr.s6_addr,
                    u32::from_be(sin6.sin6_flowinfo),
                    sin6.sin6_scope_id,
                )))
            }
            libc::AF_UNIX => {
                // SAFETY: the family tag says the storage holds a sockaddr_un.
                let sun = unsafe { &*(base as *const libc::sockaddr_un) };
                let used = (self.len as usize)
                    .saturating_sub(sun_path_offset())
                    .min(sun.sun_path.len());
                let mut path: Vec<u8> = sun.sun_path[..used].iter().map(|c| *c as u8).collect();
                if path.first() != Some(&0) {
                    if let Some(nul) = path.iter().position(|b| *b == 0) {
                        path.truncate(nul);
                    }
                }
                Some(FamilySockAddr::Unix(UnixSockAddr::new(path)))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for NativeSockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_family() {
            Some(addr) => write!(f, "NativeSockAddr({:?})", addr),
            None => write!(f, "NativeSockAddr(family={})", self.storage.ss_family),
        }
    }
}

impl UniversalSockAddr for NativeSockAddr {
    fn family(&self) -> i32 {
        self.storage.ss_family as i32
    }

    fn as_inet4(&self) -> Result<Inet4SockAddr> {
        match self.to_family() {
            Some(FamilySockAddr::Inet4(addr)) => Ok(addr),
            _ => Err(Errno::EINVAL.into()),
        }
    }

    fn as_inet6(&self) -> Result<Inet6SockAddr> {
        match self.to_family() {
            Some(FamilySockAddr::Inet6(addr)) => Ok(addr),
            _ => Err(Errno::EINVAL.into()),
        }
    }

    fn as_unix(&self) -> Result<UnixSockAddr> {
        match self.to_family() {
            Some(FamilySockAddr::Unix(addr)) => Ok(addr),
            _ => Err(Errno::EINVAL.into()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Cursor over a `getaddrinfo` result list; the list is freed on release or drop.
pub(crate) struct NativeAddrInfo {
    head: *mut libc::addrinfo,
    current: *mut libc::addrinfo,
}

// SAFETY: the list is owned exclusively by the cursor and only touched through &mut self
// or immutable reads.
unsafe impl Send for NativeAddrInfo {}

impl NativeAddrInfo {
    /// # Safety
    /// `head` must be a non-null list returned by `getaddrinfo` and not freed elsewhere.
    pub unsafe fn new(head: *mut libc::addrinfo) -> Self {
        Self { head, current: head }
    }

    fn entry(&self) -> &libc::addrinfo {
        assert!(!self.current.is_null(), "address info cursor used after release");
        // SAFETY: current points into the list owned by this cursor until release.
        unsafe { &*self.current }
    }
}

impl fmt::Debug for NativeAddrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAddrInfo")
            .field("released", &self.head.is_null())
            .finish()
    }
}

impl AddrInfoCursor for NativeAddrInfo {
    fn next(&mut self) -> bool {
        let next = self.entry().ai_next;
        if next.is_null() {
            return false;
        }
        self.current = next;
        true
    }

    fn release(&mut self) {
        if !self.head.is_null() {
            // SAFETY: head came from getaddrinfo and is freed exactly once.
            unsafe { libc::freeaddrinfo(self.head) };
            self.head = ptr::null_mut();
            self.current = ptr::null_mut();
        }
    }

    fn flags(&self) -> i32 {
        self.entry().ai_flags
    }

    fn family(&self) -> i32 {
        self.entry().ai_family
    }

    fn sock_type(&self) -> i32 {
        self.entry().ai_socktype
    }

    fn protocol(&self) -> i32 {
        self.entry().ai_protocol
    }

    fn canon_name(&self) -> Option<String> {
        let name = self.entry().ai_canonname;
        if name.is_null() {
            return None;
        }
        // SAFETY: ai_canonname is a NUL-terminated string owned by the list.
        Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }

    fn sock_addr(&self) -> Box<dyn UniversalSockAddr> {
        let entry = self.entry();
        // SAFETY: ai_addr holds ai_addrlen bytes owned by the list.
        Box::new(unsafe { NativeSockAddr::from_raw(entry.ai_addr, entry.ai_addrlen) })
    }
}

impl Drop for NativeAddrInfo {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inet4_network_order() {
        let addr = NativeSockAddr::from_family(&FamilySockAddr::Inet4(Inet4SockAddr::new(
            8080, 0x7f00_0001,
        )))
        .unwrap();
        assert_eq!(addr.family(), libc::AF_INET);
        // SAFETY: storage holds a sockaddr_in.
        let sin = unsafe { &*(addr.as_ptr() as *const libc::sockaddr_in) };
        assert_eq!(sin.sin_port, 8080u16.to_be());
        assert_eq!(addr.as_inet4().unwrap(), Inet4SockAddr::new(8080, 0x7f00_0001));
        assert_eq!(addr.as_inet6().unwrap_err().errno(), Some(libc::EINVAL));
    }

    #[test]
    fn test_unix_path_roundtrip_and_limit() {
        let addr = NativeSockAddr::from_family(&FamilySockAddr::Unix(UnixSockAddr::new(
            b"/tmp/sock".to_vec(),
        )))
        .unwrap();
        assert_eq!(addr.as_unix().unwrap().path, b"/tmp/sock");

        let abstract_name = UnixSockAddr::new(b"\0hidden".to_vec());
        let addr = NativeSockAddr::from_family(&FamilySockAddr::Unix(abstract_name.clone())).unwrap();
        assert_eq!(addr.as_unix().unwrap(), abstract_name);

        let too_long = UnixSockAddr::new(vec![b'x'; 200]);
        assert_eq!(
            NativeSockAddr::from_family(&FamilySockAddr::Unix(too_long)).unwrap_err(),
            PosixSupportError::InvalidUnixSocketPath
        );
    }

    #[test]
    fn test_inet6_fields() {
        let mut ip = [0u8; 16];
        ip[15] = 1;
        let v6 = Inet6SockAddr::new(443, ip, 7, 2);
        let addr = NativeSockAddr::from_family(&FamilySockAddr::Inet6(v6)).unwrap();
        assert_eq!(addr.as_inet6().unwrap(), v6);
    }
}
