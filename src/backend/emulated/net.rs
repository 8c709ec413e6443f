//! Socket addresses, address text parsing and name resolution without native calls.

use crate::backend::emulated::errors::ErrorTable;
use crate::config::constants::PosixConstants;
use crate::config::types::{PosixSupportError, Result};
use crate::core::support::{AddrInfoCursor, UniversalSockAddr};
use crate::core::types::{FamilySockAddr, Inet4SockAddr, Inet6SockAddr, UnixSockAddr};
use std::any::Any;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

#[derive(Clone, Debug)]
pub(crate) struct EmulatedSockAddr {
    family: i32,
    addr: FamilySockAddr,
    errors: ErrorTable,
}

impl EmulatedSockAddr {
    pub fn new(constants: &'static PosixConstants, addr: FamilySockAddr) -> Self {
        let family = match addr {
            FamilySockAddr::Inet4(_) => constants.require("AF_INET"),
            FamilySockAddr::Inet6(_) => constants.require("AF_INET6"),
            FamilySockAddr::Unix(_) => constants.require("AF_UNIX"),
        };
        Self {
            family,
            addr,
            errors: ErrorTable::new(constants),
        }
    }

}

impl UniversalSockAddr for EmulatedSockAddr {
    fn family(&self) -> i32 {
        self.family
    }

    fn as_inet4(&self) -> Result<Inet4SockAddr> {
        match &self.addr {
            FamilySockAddr::Inet4(a) => Ok(*a),
            _ => Err(self.errors.err("EINVAL")),
        }
    }

    fn as_inet6(&self) -> Result<Inet6SockAddr> {
        match &self.addr {
            FamilySockAddr::Inet6(a) => Ok(*a),
            _ => Err(self.errors.err("EINVAL")),
        }
    }

    fn as_unix(&self) -> Result<UnixSockAddr> {
        match &self.addr {
            FamilySockAddr::Unix(a) => Ok(a.clone()),
            _ => Err(self.errors.err("EINVAL")),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Recover the family-specific address from any backend's universal address.
pub(crate) fn family_addr(addr: &dyn UniversalSockAddr) -> Option<FamilySockAddr> {
    if let Some(own) = addr.as_any().downcast_ref::<EmulatedSockAddr>() {
        return Some(own.addr.clone());
    }
    addr.as_inet4()
        .map(FamilySockAddr::Inet4)
        .or_else(|_| addr.as_inet6().map(FamilySockAddr::Inet6))
        .or_else(|_| addr.as_unix().map(FamilySockAddr::Unix))
        .ok()
}

pub(crate) fn inet_pton(constants: &'static PosixConstants, family: i32, src: &str) -> Result<Vec<u8>> {
    if family == constants.require("AF_INET") {
        src.parse::<Ipv4Addr>()
            .map(|a| a.octets().to_vec())
            .map_err(|_| PosixSupportError::InvalidAddress)
    } else if family == constants.require("AF_INET6") {
        src.parse::<Ipv6Addr>()
            .map(|a| a.octets().to_vec())
            .map_err(|_| PosixSupportError::InvalidAddress)
    } else {
        Err(ErrorTable::new(constants).err("EAFNOSUPPORT"))
    }
}

pub(crate) fn inet_ntop(constants: &'static PosixConstants, family: i32, src: &[u8]) -> Result<String> {
    let errors = ErrorTable::new(constants);
    if family == constants.require("AF_INET") {
        let octets: [u8; 4] = src.try_into().map_err(|_| errors.err("EINVAL"))?;
        Ok(Ipv4Addr::from(octets).to_string())
    } else if family == constants.require("AF_INET6") {
        let octets: [u8; 16] = src.try_into().map_err(|_| errors.err("EINVAL"))?;
        Ok(Ipv6Addr::from(octets).to_string())
    } else {
        Err(errors.err("EAFNOSUPPORT"))
    }
}

#[derive(Debug)]
struct AddrInfoEntry {
    flags: i32,
    family: i32,
    sock_type: i32,
    protocol: i32,
    canon_name: Option<String>,
    addr: EmulatedSockAddr,
}

/// Resolution results materialized up front.
#[derive(Debug)]
pub(crate) struct EmulatedAddrInfo {
    entries: Vec<AddrInfoEntry>,
    position: usize,
}

impl EmulatedAddrInfo {
    fn current(&self) -> &AddrInfoEntry {
        match self.entries.get(self.position) {
            Some(entry) => entry,
            None => panic!("address info cursor used after release"),
        }
    }
}

impl AddrInfoCursor for EmulatedAddrInfo {
    fn next(&mut self) -> bool {
        if self.position + 1 < self.entries.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn release(&mut self) {
        self.entries.clear();
    }

    fn flags(&self) -> i32 {
        self.current().flags
    }

    fn family(&self) -> i32 {
        self.current().family
    }

    fn sock_type(&self) -> i32 {
        self.current().sock_type
    }

    fn protocol(&self) -> i32 {
        self.current().protocol
    }

    fn canon_name(&self) -> Option<String> {
        self.current().canon_name.clone()
    }

    fn sock_addr(&self) -> Box<dyn UniversalSockAddr> {
        Box::new(self.current().addr.clone())
    }
}

/// Arguments of an emulated `getaddrinfo`.
pub(crate) struct AddrInfoQuery<'a> {
    pub node: Option<&'a str>,
    pub service: Option<&'a str>,
    pub family: i32,
    pub sock_type: i32,
    pub protocol: i32,
    pub flags: i32,
}

pub(crate) fn getaddrinfo(constants: &'static PosixConstants, query: &AddrInfoQuery<'_>) -> Result<EmulatedAddrInfo> {
    let errors = ErrorTable::new(constants);
    let af_inet = constants.require("AF_INET");
    let af_inet6 = constants.require("AF_INET6");
    let af_unspec = constants.require("AF_UNSPEC");
    if query.family != af_unspec && query.family != af_inet && query.family != af_inet6 {
        return Err(errors.gai("EAI_FAMILY"));
    }
    if query.node.is_none() && query.service.is_none() {
        return Err(errors.gai("EAI_NONAME"));
    }

    // Only numeric services are known without a services database.
    let port = match query.service {
        None | Some("") => 0,
        Some(service) => service.parse::<u16>().map_err(|_| errors.gai("EAI_SERVICE"))?,
    };

    let addrs: Vec<SocketAddr> = match query.node {
        None => {
            let passive = query.flags & constants.require("AI_PASSIVE") != 0;
            let v4 = if passive { Ipv4Addr::UNSPECIFIED } else { Ipv4Addr::LOCALHOST };
            let v6 = if passive { Ipv6Addr::UNSPECIFIED } else { Ipv6Addr::LOCALHOST };
            vec![SocketAddr::new(IpAddr::V6(v6), port), SocketAddr::new(IpAddr::V4(v4), port)]
        }
        Some(node) => match node.parse::<IpAddr>() {
            Ok(ip) => vec![SocketAddr::new(ip, port)],
            Err(_) if query.flags & constants.require("AI_NUMERICHOST") != 0 => {
                return Err(errors.gai("EAI_NONAME"));
            }
            Err(_) => (node, port)
                .to_socket_addrs()
                .map_err(|_| errors.gai("EAI_NONAME"))?
                .collect(),
        },
    };

    let stream = constants.require("SOCK_STREAM");
    let dgram = constants.require("SOCK_DGRAM");
    let sock_types: Vec<(i32, i32)> = match query.sock_type {
        0 => vec![
            (stream, constants.require("IPPROTO_TCP")),
            (dgram, constants.require("IPPROTO_UDP")),
        ],
        t if t == stream => vec![(stream, constants.require("IPPROTO_TCP"))],
        t if t == dgram => vec![(dgram, constants.require("IPPROTO_UDP"))],
        t => vec![(t, query.protocol)],
    };

    let wants_canon = query.flags & constants.require("AI_CANONNAME") != 0;
    let mut entries = Vec::new();
    for addr in addrs {
        let family = if addr.is_ipv4() { af_inet } else { af_inet6 };
        if query.family != af_unspec && query.family != family {
            continue;
        }
        for &(sock_type, protocol) in &sock_types {
            let protocol = if query.protocol != 0 { query.protocol } else { protocol };
            entries.push(AddrInfoEntry {
                flags: query.flags,
                family,
                sock_type,
                protocol,
                canon_name: None,
                addr: EmulatedSockAddr::new(constants, FamilySockAddr::from(addr)),
            });
        }
    }
    if entries.is_empty() {
        return Err(errors.gai("EAI_NONAME"));
    }
    if wants_canon {
        entries[0].canon_name = query.node.map(str::to_string);
    }
    Ok(EmulatedAddrInfo {
        entries,
        position: 0,
    })
}

/// Numeric `getnameinfo`; host names are never looked up in reverse.
pub(crate) fn getnameinfo(constants: &'static PosixConstants, addr: &dyn UniversalSockAddr, flags: i32) -> Result<(String, String)> {
    let errors = ErrorTable::new(constants);
    let std_addr = match family_addr(addr) {
        Some(FamilySockAddr::Inet4(a)) => SocketAddr::V4(a.to_std()),
        Some(FamilySockAddr::Inet6(a)) => SocketAddr::V6(a.to_std()),
        _ => return Err(errors.gai("EAI_FAMILY")),
    };
    let name_required = constants.int("NI_NAMEREQD").is_some_and(|f| flags as i64 & f != 0);
    if name_required && flags & constants.require("NI_NUMERICHOST") == 0 {
        return Err(errors.gai("EAI_NONAME"));
    }
    Ok((std_addr.ip().to_string(), std_addr.port().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::Platform;

    fn linux() -> &'static PosixConstants {
        PosixConstants::for_platform(Platform::Linux)
    }

    #[test]
    fn test_pton_ntop() {
        let af_inet = linux().require("AF_INET");
        let af_inet6 = linux().require("AF_INET6");
        assert_eq!(inet_pton(linux(), af_inet, "127.0.0.1").unwrap(), vec![127, 0, 0, 1]);
        assert_eq!(inet_ntop(linux(), af_inet, &[127, 0, 0, 1]).unwrap(), "127.0.0.1");
        assert_eq!(inet_pton(linux(), af_inet, "127.1"), Err(PosixSupportError::InvalidAddress));
        let v6 = inet_pton(linux(), af_inet6, "::1").unwrap();
        assert_eq!(v6.len(), 16);
        assert_eq!(inet_ntop(linux(), af_inet6, &v6).unwrap(), "::1");
        assert_eq!(inet_ntop(linux(), af_inet, &[1, 2, 3]).unwrap_err().errno(), Some(22));
        assert_eq!(inet_pton(linux(), 12345, "x").unwrap_err().errno(), Some(97));
    }

    #[test]
    fn test_wrong_family_conversion_is_einval() {
        let addr = EmulatedSockAddr::new(
            linux(),
            FamilySockAddr::Inet6(Inet6SockAddr::new(80, Ipv6Addr::LOCALHOST.octets(), 0, 0)),
        );
        assert_eq!(addr.family(), 10);
        assert_eq!(addr.as_inet4().unwrap_err().errno(), Some(22));
        assert_eq!(addr.as_inet6().unwrap().port, 80);
    }

    #[test]
    fn test_getaddrinfo_numeric_host() {
        let query = AddrInfoQuery {
            node: Some("127.0.0.1"),
            service: Some("8080"),
            family: 0,
            sock_type: 0,
            protocol: 0,
            flags: linux().require("AI_CANONNAME"),
        };
        let mut cursor = getaddrinfo(linux(), &query).unwrap();
        assert_eq!(cursor.family(), 2);
        assert_eq!(cursor.sock_type(), 1);
        assert_eq!(cursor.canon_name().as_deref(), Some("127.0.0.1"));
        assert_eq!(cursor.sock_addr().as_inet4().unwrap(), Inet4SockAddr::new(8080, 0x7f00_0001));
        assert!(cursor.next());
        assert_eq!(cursor.sock_type(), 2);
        assert!(cursor.canon_name().is_none());
        assert!(!cursor.next());
        assert_eq!(cursor.sock_type(), 2);
        cursor.release();
        cursor.release();
    }

    #[test]
    fn test_getaddrinfo_errors() {
        let mut query = AddrInfoQuery {
            node: Some("localhost"),
            service: Some("http-alt-not-numeric"),
            family: 0,
            sock_type: 0,
            protocol: 0,
            flags: 0,
        };
        assert!(matches!(
            getaddrinfo(linux(), &query).unwrap_err(),
            PosixSupportError::GetAddrInfo { code: -8, .. }
        ));
        query.service = None;
        query.family = 12345;
        assert!(matches!(
            getaddrinfo(linux(), &query).unwrap_err(),
            PosixSupportError::GetAddrInfo { code: -6, .. }
        ));
    }

    #[test]
    fn test_getnameinfo_numeric() {
        let addr = EmulatedSockAddr::new(linux(), FamilySockAddr::Inet4(Inet4SockAddr::new(443, 0x0a00_0001)));
        let flags = linux().require("NI_NUMERICHOST") | linux().require("NI_NUMERICSERV");
        assert_eq!(
            getnameinfo(linux(), &addr, flags).unwrap(),
            ("10.0.0.1".to_string(), "443".to_string())
        );
    }
}
