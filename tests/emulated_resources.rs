//! Integration tests for the emulated backend
//!
//! Descriptor allocation, refcounted close and directory streams, driven through the
//! `PosixSupport` interface only.

use posix_support::backend::EmulatedPosixSupport;
use posix_support::core::types::Buffer;
use posix_support::{PosixConstants, PosixPath, PosixSupport, SupportConfig, DEFAULT_DIR_FD};

fn emulated() -> EmulatedPosixSupport {
    EmulatedPosixSupport::from_config(&SupportConfig::default()).unwrap()
}

fn c(name: &str) -> i32 {
    PosixConstants::host().unwrap().require(name)
}

fn path(p: &std::path::Path) -> PosixPath {
    PosixPath::from_string(p.to_str().unwrap()).unwrap()
}

#[test]
fn test_lowest_free_fd_is_reused() {
    let posix = emulated();
    let dir = tempfile::tempdir().unwrap();
    let file = path(&dir.path().join("data"));
    let flags = c("O_RDWR") | c("O_CREAT");

    let fds: Vec<i32> = (0..3)
        .map(|_| posix.openat(DEFAULT_DIR_FD, &file, flags, 0o644).unwrap())
        .collect();
    assert_eq!(fds, vec![3, 4, 5]);

    posix.close(4).unwrap();
    assert_eq!(posix.openat(DEFAULT_DIR_FD, &file, flags, 0o644).unwrap(), 4);
    assert_eq!(posix.openat(DEFAULT_DIR_FD, &file, flags, 0o644).unwrap(), 6);
}

#[test]
fn test_standard_slots_not_reallocated() {
    let posix = emulated();
    let dir = tempfile::tempdir().unwrap();
    let file = path(&dir.path().join("data"));

    posix.close(1).unwrap();
    let fd = posix
        .openat(DEFAULT_DIR_FD, &file, c("O_WRONLY") | c("O_CREAT"), 0o644)
        .unwrap();
    assert!(fd >= 3, "ordinary open reused standard slot {}", fd);
}

#[test]
fn test_dup_keeps_channel_open_until_last_close() {
    let posix = emulated();
    let [read_end, write_end] = posix.pipe().unwrap();
    let copy = posix.dup(write_end).unwrap();
    assert_ne!(copy, write_end);

    posix.close(write_end).unwrap();
    assert_eq!(posix.write(copy, &Buffer::from_slice(b"still open")).unwrap(), 10);
    assert_eq!(posix.read(read_end, 64).unwrap().as_slice(), b"still open");

    posix.close(copy).unwrap();
    // last writer gone: end of file
    assert!(posix.read(read_end, 64).unwrap().is_empty());
    posix.close(read_end).unwrap();
}

#[test]
fn test_close_unknown_fd_is_ebadf() {
    let posix = emulated();
    let err = posix.close(99).unwrap_err();
    assert_eq!(err.errno(), Some(c("EBADF")));
}

#[test]
fn test_closedir_twice_is_harmless() {
    let posix = emulated();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a"), b"").unwrap();
    let stream = posix.opendir(&path(dir.path())).unwrap();
    assert!(posix.readdir(&stream).unwrap().is_some());
    posix.closedir(&stream).unwrap();
    posix.closedir(&stream).unwrap();
}

#[test]
fn test_fdopendir_closes_descriptor_once() {
    let posix = emulated();
    let dir = tempfile::tempdir().unwrap();
    let fd = posix
        .openat(DEFAULT_DIR_FD, &path(dir.path()), c("O_RDONLY") | c("O_DIRECTORY"), 0)
        .unwrap();
    let stream = posix.fdopendir(fd).unwrap();
    posix.closedir(&stream).unwrap();
    posix.closedir(&stream).unwrap();
    assert!(!posix.open_fds().contains(&fd));
}

#[test]
fn test_write_fsync_read_back() {
    let posix = emulated();
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
    posix.close(fd).unwrap();
}

#[test]
fn test_pipe_preserves_order() {
    let posix = emulated();
    let [read_end, write_end] = posix.pipe().unwrap();
    let payload: Vec<u8> = (0..=255u8).collect();
    assert_eq!(posix.write(write_end, &Buffer::from_slice(&payload)).unwrap(), 256);
    posix.close(write_end).unwrap();

    let mut received = Vec::new();
    loop {
        let chunk = posix.read(read_end, 100).unwrap();
        if chunk.is_empty() {
            break;
        }
        received.extend_from_slice(chunk.as_slice());
    }
    assert_eq!(received, payload);
    posix.close(read_end).unwrap();
}

#[test]
fn test_unsupported_operations_report_feature() {
    let posix = emulated();
    let err = posix.socket(c("AF_INET"), c("SOCK_STREAM"), 0).unwrap_err();
    assert!(matches!(err, posix_support::PosixSupportError::UnsupportedFeature(_)));
}
