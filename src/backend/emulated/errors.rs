//! errno values and messages for the emulated backend, taken from the platform table.

use crate::config::constants::PosixConstants;
use crate::config::types::PosixSupportError;
use std::io;

/// Messages keyed by constant name, in lookup priority order.
const MESSAGES: &[(&str, &str)] = &[
    ("EPERM", "Operation not permitted"),
    ("ENOENT", "No such file or directory"),
    ("ESRCH", "No such process"),
    ("EINTR", "Interrupted system call"),
    ("EIO", "Input/output error"),
    ("ENXIO", "No such device or address"),
    ("E2BIG", "Argument list too long"),
    ("ENOEXEC", "Exec format error"),
    ("EBADF", "Bad file descriptor"),
    ("ECHILD", "No child processes"),
    ("EAGAIN", "Resource temporarily unavailable"),
    ("ENOMEM", "Cannot allocate memory"),
    ("EACCES", "Permission denied"),
    ("EFAULT", "Bad address"),
    ("EBUSY", "Device or resource busy"),
    ("EEXIST", "File exists"),
    ("EXDEV", "Invalid cross-device link"),
    ("ENODEV", "No such device"),
    ("ENOTDIR", "Not a directory"),
    ("EISDIR", "Is a directory"),
    ("EINVAL", "Invalid argument"),
    ("ENFILE", "Too many open files in system"),
    ("EMFILE", "Too many open files"),
    ("ENOTTY", "Inappropriate ioctl for device"),
    ("EFBIG", "File too large"),
    ("ENOSPC", "No space left on device"),
    ("ESPIPE", "Illegal seek"),
    ("EROFS", "Read-only file system"),
    ("EMLINK", "Too many links"),
    ("EPIPE", "Broken pipe"),
    ("EDOM", "Numerical argument out of domain"),
    ("ERANGE", "Numerical result out of range"),
    ("EDEADLK", "Resource deadlock avoided"),
    ("ENAMETOOLONG", "File name too long"),
    ("ENOLCK", "No locks available"),
    ("ENOSYS", "Function not implemented"),
    ("ENOTEMPTY", "Directory not empty"),
    ("ELOOP", "Too many levels of symbolic links"),
    ("ENOTSOCK", "Socket operation on non-socket"),
    ("EDESTADDRREQ", "Destination address required"),
    ("EMSGSIZE", "Message too long"),
    ("EPROTOTYPE", "Protocol wrong type for socket"),
    ("ENOPROTOOPT", "Protocol not available"),
    ("EPROTONOSUPPORT", "Protocol not supported"),
    ("EOPNOTSUPP", "Operation not supported"),
    ("ENOTSUP", "Operation not supported"),
    ("EAFNOSUPPORT", "Address family not supported by protocol"),
    ("EADDRINUSE", "Address already in use"),
    ("EADDRNOTAVAIL", "Cannot assign requested address"),
    ("ENETDOWN", "Network is down"),
    ("ENETUNREACH", "Network is unreachable"),
    ("ECONNABORTED", "Software caused connection abort"),
    ("ECONNRESET", "Connection reset by peer"),
    ("ENOBUFS", "No buffer space available"),
    ("EISCONN", "Transport endpoint is already connected"),
    ("ENOTCONN", "Transport endpoint is not connected"),
    ("ETIMEDOUT", "Connection timed out"),
    ("ECONNREFUSED", "Connection refused"),
    ("EHOSTUNREACH", "No route to host"),
    ("EALREADY", "Operation already in progress"),
    ("EINPROGRESS", "Operation now in progress"),
];

const GAI_MESSAGES: &[(&str, &str)] = &[
    ("EAI_BADFLAGS", "Bad value for ai_flags"),
    ("EAI_NONAME", "Name or service not known"),
    ("EAI_AGAIN", "Temporary failure in name resolution"),
    ("EAI_FAIL", "Non-recoverable failure in name resolution"),
    ("EAI_FAMILY", "ai_family not supported"),
    ("EAI_SOCKTYPE", "ai_socktype not supported"),
    ("EAI_SERVICE", "Servname not supported for ai_socktype"),
    ("EAI_MEMORY", "Memory allocation failure"),
    ("EAI_SYSTEM", "System error"),
    ("EAI_OVERFLOW", "Argument buffer overflow"),
];

/// Builds errors whose codes come from the backend's constant table.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ErrorTable {
    constants: &'static PosixConstants,
}

impl ErrorTable {
    pub fn new(constants: &'static PosixConstants) -> Self {
        Self { constants }
    }

    /// Value of an errno constant, `EINVAL`'s Linux value as a last resort.
    pub fn code(&self, name: &str) -> i32 {
        self.constants
            .int(name)
            .or_else(|| self.constants.int("EINVAL"))
            .unwrap_or(22) as i32
    }

    pub fn message(&self, code: i32) -> Option<&'static str> {
        MESSAGES
            .iter()
            .find(|(name, _)| self.constants.int(name) == Some(code as i64))
            .map(|(_, msg)| *msg)
    }

    pub fn strerror(&self, code: i32) -> String {
        self.message(code).unwrap_or("Invalid argument").to_string()
    }

    /// POSIX error for constant `name`.
    pub fn err(&self, name: &str) -> PosixSupportError {
        let code = self.code(name);
        PosixSupportError::posix(code, self.strerror(code))
    }

    pub fn gai(&self, name: &str) -> PosixSupportError {
        let code = self.constants.int(name).unwrap_or(0) as i32;
        let message = GAI_MESSAGES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, m)| *m)
            .unwrap_or("Unknown error");
        PosixSupportError::GetAddrInfo {
            code,
            message: message.to_string(),
        }
    }

    /// Translate a std I/O error; OS errors keep their code, others map by kind.
    pub fn io(&self, err: &io::Error) -> PosixSupportError {
        if let Some(code) = err.raw_os_error() {
            return PosixSupportError::posix(code, self.strerror(code));
        }
        let name = match err.kind() {
            io::ErrorKind::NotFound => "ENOENT",
            io::ErrorKind::PermissionDenied => "EACCES",
            io::ErrorKind::AlreadyExists => "EEXIST",
            io::ErrorKind::WouldBlock => "EAGAIN",
            io::ErrorKind::InvalidInput => "EINVAL",
            io::ErrorKind::BrokenPipe => "EPIPE",
            io::ErrorKind::Interrupted => "EINTR",
            io::ErrorKind::Unsupported => "EOPNOTSUPP",
            io::ErrorKind::OutOfMemory => "ENOMEM",
            io::ErrorKind::AddrInUse => "EADDRINUSE",
            io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
            io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
            io::ErrorKind::ConnectionReset => "ECONNRESET",
            io::ErrorKind::ConnectionAborted => "ECONNABORTED",
            io::ErrorKind::NotConnected => "ENOTCONN",
            io::ErrorKind::TimedOut => "ETIMEDOUT",
            _ => "EIO",
        };
        let code = self.code(name);
        PosixSupportError::posix(code, self.strerror(code))
    }

    pub fn io_path(&self, err: &io::Error, path: &str) -> PosixSupportError {
        self.io(err).with_filename(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::Platform;

    #[test]
    fn test_strerror_per_platform() {
        let linux = ErrorTable::new(PosixConstants::for_platform(Platform::Linux));
        let darwin = ErrorTable::new(PosixConstants::for_platform(Platform::Darwin));
        assert_eq!(linux.strerror(11), "Resource temporarily unavailable");
        assert_eq!(darwin.strerror(35), "Resource temporarily unavailable");
        assert_eq!(darwin.strerror(11), "Resource deadlock avoided");
        assert_eq!(linux.strerror(9999), "Invalid argument");
    }

    #[test]
    fn test_io_error_mapping() {
        let table = ErrorTable::new(PosixConstants::for_platform(Platform::Linux));
        let err = table.io(&io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.errno(), Some(2));
        let err = table.io_path(&io::Error::from_raw_os_error(13), "/x");
        assert_eq!(
            err,
            PosixSupportError::Posix {
                code: 13,
                message: "Permission denied".to_string(),
                filename1: Some("/x".to_string()),
                filename2: None,
            }
        );
    }

    #[test]
    fn test_gai_error() {
        let table = ErrorTable::new(PosixConstants::for_platform(Platform::Linux));
        assert_eq!(
            table.gai("EAI_NONAME"),
            PosixSupportError::GetAddrInfo {
                code: -2,
                message: "Name or service not known".to_string()
            }
        );
    }
}
