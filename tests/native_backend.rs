//! Integration tests for the native backend
//!
//! Files, pipes, sockets, address conversions and child processes on the host.

use posix_support::backend::NativePosixSupport;
use posix_support::core::types::{Buffer, ForkExecRequest, Inet4SockAddr, Inet6SockAddr};
use posix_support::{PosixConstants, PosixPath, PosixSupport, PosixSupportError, SupportConfig, DEFAULT_DIR_FD};

fn native() -> NativePosixSupport {
    NativePosixSupport::from_config(&SupportConfig::default()).unwrap()
}

fn c(name: &str) -> i32 {
    PosixConstants::host().unwrap().require(name)
}

fn path(p: &std::path::Path) -> PosixPath {
    PosixPath::from_string(p.to_str().unwrap()).unwrap()
}

#[test]
fn test_write_fsync_read_back() {
    let posix = native();
    let dir = tempfile::tempdir().unwrap();
    let file = path(&dir.path().join("scenario"));

    let fd = posix
        .openat(DEFAULT_DIR_FD, &file, c("O_WRONLY") | c("O_CREAT"), 0o644)
        .unwrap();
    assert_eq!(posix.write(fd, &Buffer::from_slice(b"0123456789")).unwrap(), 10);
    posix.fsync(fd).unwrap();
    posix.close(fd).unwrap();

    let fd = posix.openat(DEFAULT_DIR_FD, &file, c("O_RDONLY"), 0).unwrap();
    assert_eq!(posix.read(fd, 10).unwrap().as_slice(), b"0123456789");
    assert!(posix.read(fd, 10).unwrap().is_empty());
    posix.close(fd).unwrap();
}

#[test]
fn test_open_missing_file_carries_filename() {
    let posix = native();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");
    let err = posix
        .openat(DEFAULT_DIR_FD, &path(&missing), c("O_RDONLY"), 0)
        .unwrap_err();
    match err {
        PosixSupportError::Posix { code, filename1, .. } => {
            assert_eq!(code, c("ENOENT"));
            assert_eq!(filename1.as_deref(), missing.to_str());
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_pipe_round_trip() {
    let posix = native();
    let [read_end, write_end] = posix.pipe().unwrap();
    assert_eq!(posix.write(write_end, &Buffer::from_slice(b"hello pipe")).unwrap(), 10);
    assert_eq!(posix.read(read_end, 64).unwrap().as_slice(), b"hello pipe");
    posix.close(write_end).unwrap();
    posix.close(read_end).unwrap();
}

#[test]
fn test_socket_bind_ephemeral_port() {
    let posix = native();
    let sock = posix.socket(c("AF_INET"), c("SOCK_STREAM"), 0).unwrap();
    let loopback = Inet4SockAddr::new(0, 0x7f00_0001);
    posix
        .bind(sock, posix.create_universal_sock_addr_inet4(&loopback).as_ref())
        .unwrap();

    let bound = posix.getsockname(sock).unwrap();
    assert_eq!(bound.family(), c("AF_INET"));
    let bound = bound.as_inet4().unwrap();
    assert_ne!(bound.port, 0);
    assert_eq!(bound.address, 0x7f00_0001);
    posix.close(sock).unwrap();
}

#[test]
fn test_universal_address_conversions() {
    let posix = native();
    for (port, address) in [(0u16, 0u32), (80, 0x7f00_0001), (65535, u32::MAX), (8080, 0xc0a8_0101)] {
        let universal = posix.create_universal_sock_addr_inet4(&Inet4SockAddr::new(port, address));
        assert_eq!(universal.as_inet4().unwrap(), Inet4SockAddr::new(port, address));
    }

    let v6 = Inet6SockAddr::new(443, std::net::Ipv6Addr::LOCALHOST.octets(), 0, 0);
    let universal = posix.create_universal_sock_addr_inet6(&v6);
    assert_eq!(universal.as_inet6().unwrap(), v6);
    let err = universal.as_inet4().unwrap_err();
    assert_eq!(err.errno(), Some(c("EINVAL")));
}

#[test]
fn test_inet_pton_ntop() {
    let posix = native();
    let bytes = posix.inet_pton(c("AF_INET"), "127.0.0.1").unwrap();
    assert_eq!(bytes, vec![127, 0, 0, 1]);
    assert_eq!(posix.inet_ntop(c("AF_INET"), &bytes).unwrap(), "127.0.0.1");
}

#[test]
fn test_getaddrinfo_numeric_host() {
    let posix = native();
    let mut cursor = posix
        .getaddrinfo(Some("127.0.0.1"), Some("80"), c("AF_INET"), c("SOCK_STREAM"), 0, 0)
        .unwrap();
    assert_eq!(cursor.family(), c("AF_INET"));
    let addr = cursor.sock_addr().as_inet4().unwrap();
    assert_eq!(addr, Inet4SockAddr::new(80, 0x7f00_0001));
    while cursor.next() {}
    cursor.release();
    cursor.release();
}

#[test]
fn test_fork_exec_and_wait() {
    let posix = native();
    let request = ForkExecRequest::new(
        vec![PosixPath::from_string("/bin/sh").unwrap()],
        vec![b"sh".to_vec(), b"-c".to_vec(), b"exit 3".to_vec()],
    );
    let pid = posix.fork_exec(&request).unwrap();
    assert!(pid > 0);

    let (reaped, status) = posix.waitpid(pid, 0).unwrap();
    assert_eq!(reaped, pid);
    assert!(posix.wifexited(status));
    assert_eq!(posix.wexitstatus(status), 3);
}

#[cfg(target_os = "linux")]
#[test]
fn test_fork_exec_low_source_fd_not_clobbered() {
    let posix = native();
    let [read_end, write_end] = posix.pipe().unwrap();
    let mut request = ForkExecRequest::new(
        vec![PosixPath::from_string("/bin/sh").unwrap()],
        vec![
            b"sh".to_vec(),
            b"-c".to_vec(),
            b"readlink /proc/self/fd/1; readlink /proc/self/fd/2".to_vec(),
        ],
    );
    request.stdout_write_fd = write_end;
    // child stderr is the parent's stdout, which the stdout install replaces
    request.stderr_write_fd = 1;
    let pid = posix.fork_exec(&request).unwrap();
    posix.close(write_end).unwrap();

    let mut output = Vec::new();
    loop {
        let chunk = posix.read(read_end, 256).unwrap();
        if chunk.is_empty() {
            break;
        }
        output.extend_from_slice(chunk.as_slice());
    }
    posix.close(read_end).unwrap();
    let (_, status) = posix.waitpid(pid, 0).unwrap();
    assert!(posix.wifexited(status));

    let output = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2, "unexpected output {:?}", output);
    assert!(lines[0].starts_with("pipe:"));
    assert_ne!(lines[0], lines[1]);
    let parent_stdout = std::fs::read_link("/proc/self/fd/1").unwrap();
    assert_eq!(lines[1], parent_stdout.to_string_lossy());
}

#[test]
fn test_directory_listing() {
    let posix = native();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("one"), b"1").unwrap();
    std::fs::create_dir(dir.path().join("two")).unwrap();

    let stream = posix.opendir(&path(dir.path())).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = posix.readdir(&stream).unwrap() {
        names.push(posix.dir_entry_get_name(&entry).to_string_lossy());
    }
    names.sort();
    assert_eq!(names, vec!["one", "two"]);

    posix.rewinddir(&stream);
    assert!(posix.readdir(&stream).unwrap().is_some());
    posix.closedir(&stream).unwrap();
    posix.closedir(&stream).unwrap();
}

#[test]
fn test_path_rejects_nul() {
    let posix = native();
    assert!(posix.create_path_from_string("a\0b").is_none());
    assert!(posix.create_path_from_bytes(b"\0").is_none());
    let p = posix.create_path_from_bytes(b"/tmp/x").unwrap();
    assert_eq!(posix.get_path_as_bytes(&p), b"/tmp/x".to_vec());
}
