//! Integration tests for the image build time backend
//!
//! Build-time redirection to the emulated backend, leak detection at the end of the build
//! and the native-only guard.

use posix_support::backend::{EmulatedPosixSupport, ImageBuildtimePosixSupport, NativePosixSupport};
use posix_support::{
    create_image_buildtime_backend, BuildPhase, PosixConstants, PosixPath, PosixSupport,
    PosixSupportError, SupportConfig, DEFAULT_DIR_FD,
};
use std::sync::Arc;

fn c(name: &str) -> i32 {
    PosixConstants::host().unwrap().require(name)
}

fn path(p: &std::path::Path) -> PosixPath {
    PosixPath::from_string(p.to_str().unwrap()).unwrap()
}

fn build_time() -> Arc<ImageBuildtimePosixSupport> {
    create_image_buildtime_backend(&SupportConfig::default()).unwrap()
}

#[test]
fn test_leaked_fd_blocks_transition() {
    let posix = build_time();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("resource"), b"payload").unwrap();

    let fd = posix
        .openat(DEFAULT_DIR_FD, &path(&dir.path().join("resource")), c("O_RDONLY"), 0)
        .unwrap();
    assert_eq!(posix.read(fd, 7).unwrap().as_slice(), b"payload");

    match posix.finish_build_time() {
        Err(PosixSupportError::LeakedResources { fds, dir_streams }) => {
            assert_eq!(fds, vec![fd]);
            assert_eq!(dir_streams, 0);
        }
        other => panic!("expected leak report, got {:?}", other),
    }
    assert_eq!(posix.phase(), BuildPhase::BuildTime);

    posix.close(fd).unwrap();
    posix.finish_build_time().unwrap();
    assert_eq!(posix.phase(), BuildPhase::RunTime);
    assert_eq!(posix.getpid(), std::process::id() as i64);
}

#[test]
fn test_leaked_dir_stream_reported() {
    let posix = build_time();
    let dir = tempfile::tempdir().unwrap();
    let stream = posix.opendir(&path(dir.path())).unwrap();
    assert!(matches!(
        posix.check_leaking_resources(),
        Err(PosixSupportError::LeakedResources { dir_streams: 1, .. })
    ));
    posix.closedir(&stream).unwrap();
    posix.closedir(&stream).unwrap();
    posix.check_leaking_resources().unwrap();
}

#[test]
fn test_run_time_calls_work_after_clean_build() {
    let posix = build_time();
    posix.finish_build_time().unwrap();
    posix.finish_build_time().unwrap();

    let [read_end, write_end] = posix.pipe().unwrap();
    posix
        .write(write_end, &posix_support::core::types::Buffer::from_slice(b"native"))
        .unwrap();
    assert_eq!(posix.read(read_end, 16).unwrap().as_slice(), b"native");
    posix.close(read_end).unwrap();
    posix.close(write_end).unwrap();
}

#[test]
#[should_panic(expected = "should not reach here")]
fn test_execv_at_build_time_is_fatal() {
    let posix = build_time();
    let sh = PosixPath::from_string("/bin/sh").unwrap();
    let _ = posix.execv(&sh, &[sh.clone()]);
}

#[test]
fn test_explicit_phase_construction() {
    let config = SupportConfig::default();
    let posix = ImageBuildtimePosixSupport::new(
        Arc::new(NativePosixSupport::from_config(&config).unwrap()),
        Arc::new(EmulatedPosixSupport::from_config(&config).unwrap()),
        BuildPhase::RunTime,
    );
    assert_eq!(posix.phase(), BuildPhase::RunTime);
    assert!(posix.open_build_fds().is_empty());
    posix.check_leaking_resources().unwrap();
}
