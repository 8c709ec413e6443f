//! Integration tests for the logging decorator
//!
//! The same call sequence runs against a bare emulated backend and a decorated one; the
//! observable results must match exactly, with call logging on.

use log::LevelFilter;
use posix_support::backend::{EmulatedPosixSupport, LoggingPosixSupport};
use posix_support::core::types::Buffer;
use posix_support::observability::init_logging;
use posix_support::{
    PosixConstants, PosixPath, PosixSupport, PosixSupportError, Result, SupportConfig, DEFAULT_DIR_FD,
};
use std::sync::Arc;

fn c(name: &str) -> i32 {
    PosixConstants::host().unwrap().require(name)
}

fn emulated() -> Arc<dyn PosixSupport> {
    Arc::new(EmulatedPosixSupport::from_config(&SupportConfig::default()).unwrap())
}

#[derive(Debug, PartialEq)]
struct Trace {
    opened: Result<i32>,
    written: Result<usize>,
    seek: Result<i64>,
    read: Result<Buffer>,
    bad_close: Result<()>,
    missing: Result<i32>,
    pipe: Result<[i32; 2]>,
    dup: Result<i32>,
    closed: Vec<Result<()>>,
    unsupported: Result<i32>,
    path_bytes: Vec<u8>,
    nul_path: bool,
}

fn run(posix: &dyn PosixSupport, dir: &std::path::Path) -> Trace {
    let file = PosixPath::from_string(dir.join("log-me").to_str().unwrap()).unwrap();
    let missing = PosixPath::from_string(dir.join("missing").to_str().unwrap()).unwrap();

    let opened = posix.openat(DEFAULT_DIR_FD, &file, c("O_RDWR") | c("O_CREAT"), 0o600);
    let fd = *opened.as_ref().unwrap();
    let written = posix.write(fd, &Buffer::from_slice(&[0u8, 1, 2, 0xff, b'a', b'\'']));
    let seek = posix.lseek(fd, 0, c("SEEK_SET"));
    let read = posix.read(fd, 64);
    let bad_close = posix.close(1234);
    let missing = posix.openat(DEFAULT_DIR_FD, &missing, c("O_RDONLY"), 0);
    let pipe = posix.pipe();
    let [read_end, write_end] = *pipe.as_ref().unwrap();
    let dup = posix.dup(write_end);
    let dup_fd = *dup.as_ref().unwrap();
    let closed = vec![
        posix.close(fd),
        posix.close(read_end),
        posix.close(write_end),
        posix.close(dup_fd),
        posix.close(dup_fd),
    ];
    let unsupported = posix.socket(c("AF_INET"), c("SOCK_STREAM"), 0);

    Trace {
        opened,
        written,
        seek,
        read,
        bad_close,
        missing,
        pipe,
        dup,
        closed,
        unsupported,
        path_bytes: posix.get_path_as_bytes(&file),
        nul_path: posix.create_path_from_string("bad\0path").is_none(),
    }
}

#[test]
fn test_decorator_is_transparent() {
    init_logging(Some(LevelFilter::Trace));
    let direct_dir = tempfile::tempdir().unwrap();
    let logged_dir = tempfile::tempdir().unwrap();

    let direct = run(emulated().as_ref(), direct_dir.path());
    let decorated = LoggingPosixSupport::new(emulated());
    let logged = run(&decorated, logged_dir.path());

    // paths differ only by the scratch directory
    let strip = |t: &Trace, dir: &std::path::Path| {
        let prefix = dir.as_os_str().len();
        t.path_bytes[prefix..].to_vec()
    };
    assert_eq!(strip(&direct, direct_dir.path()), strip(&logged, logged_dir.path()));

    let normalize = |mut t: Trace| {
        t.path_bytes.clear();
        t.missing = t.missing.map_err(|e| match e {
            PosixSupportError::Posix { code, message, .. } => PosixSupportError::Posix {
                code,
                message,
                filename1: None,
                filename2: None,
            },
            other => other,
        });
        t
    };
    assert_eq!(normalize(direct), normalize(logged));
}

#[test]
fn test_decorator_preserves_backend_identity() {
    let inner = emulated();
    let decorated = LoggingPosixSupport::new(Arc::clone(&inner));
    assert_eq!(decorated.get_backend(), inner.get_backend());
    assert_eq!(decorated.strerror(c("ENOENT")), inner.strerror(c("ENOENT")));
    assert!(Arc::ptr_eq(decorated.delegate(), &inner));
}
