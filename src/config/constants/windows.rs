//! Windows (MSVC CRT and Winsock) constant values.
//!
//! Only the subset that has a meaningful Windows counterpart is listed; the POSIX-only
//! names (`O_NOFOLLOW`, `SIGKILL`, `DT_*`) are absent rather than faked.

use super::ConstantTable;
use super::ConstantValue::{Bool, Int};

pub(crate) static TABLE: ConstantTable = &[
    ("O_RDONLY", Int(0)),
    ("O_WRONLY", Int(1)),
    ("O_RDWR", Int(2)),
    ("O_APPEND", Int(0x8)),
    ("O_RANDOM", Int(0x10)),
    ("O_SEQUENTIAL", Int(0x20)),
    ("O_TEMPORARY", Int(0x40)),
    ("O_NOINHERIT", Int(0x80)),
    ("O_CREAT", Int(0x100)),
    ("O_TRUNC", Int(0x200)),
    ("O_EXCL", Int(0x400)),
    ("O_SHORT_LIVED", Int(0x1000)),
    ("O_TEXT", Int(0x4000)),
    ("O_BINARY", Int(0x8000)),
    ("SEEK_SET", Int(0)),
    ("SEEK_CUR", Int(1)),
    ("SEEK_END", Int(2)),
    ("F_OK", Int(0)),
    ("X_OK", Int(1)),
    ("W_OK", Int(2)),
    ("R_OK", Int(4)),
    ("S_IFMT", Int(0xf000)),
    ("S_IFIFO", Int(0x1000)),
    ("S_IFCHR", Int(0x2000)),
    ("S_IFDIR", Int(0x4000)),
    ("S_IFREG", Int(0x8000)),
    ("SIGINT", Int(2)),
    ("SIGILL", Int(4)),
    ("SIGFPE", Int(8)),
    ("SIGSEGV", Int(11)),
    ("SIGTERM", Int(15)),
    ("SIGBREAK", Int(21)),
    ("SIGABRT", Int(22)),
    ("AF_UNSPEC", Int(0)),
    ("AF_UNIX", Int(1)),
    ("AF_INET", Int(2)),
    ("AF_INET6", Int(23)),
    ("SOCK_STREAM", Int(1)),
    ("SOCK_DGRAM", Int(2)),
    ("SOCK_RAW", Int(3)),
    ("SOCK_SEQPACKET", Int(5)),
    ("SOL_SOCKET", Int(0xffff)),
    ("SO_REUSEADDR", Int(0x4)),
    ("SO_KEEPALIVE", Int(0x8)),
    ("SO_BROADCAST", Int(0x20)),
    ("SO_SNDBUF", Int(0x1001)),
    ("SO_RCVBUF", Int(0x1002)),
    ("SO_ERROR", Int(0x1007)),
    ("SO_TYPE", Int(0x1008)),
    ("IPPROTO_IP", Int(0)),
    ("IPPROTO_TCP", Int(6)),
    ("IPPROTO_UDP", Int(17)),
    ("IPPROTO_IPV6", Int(41)),
    ("TCP_NODELAY", Int(1)),
    ("IPV6_V6ONLY", Int(27)),
    ("SHUT_RD", Int(0)),
    ("SHUT_WR", Int(1)),
    ("SHUT_RDWR", Int(2)),
    ("MSG_OOB", Int(0x1)),
    ("MSG_PEEK", Int(0x2)),
    ("MSG_WAITALL", Int(0x8)),
    ("INADDR_ANY", Int(0)),
    ("INADDR_LOOPBACK", Int(0x7f00_0001)),
    ("INADDR_BROADCAST", Int(0xffff_ffff)),
    ("INADDR_NONE", Int(0xffff_ffff)),
    ("AI_PASSIVE", Int(0x1)),
    ("AI_CANONNAME", Int(0x2)),
    ("AI_NUMERICHOST", Int(0x4)),
    ("AI_NUMERICSERV", Int(0x8)),
    ("AI_ALL", Int(0x100)),
    ("AI_ADDRCONFIG", Int(0x400)),
    ("AI_V4MAPPED", Int(0x800)),
    ("NI_NOFQDN", Int(0x1)),
    ("NI_NUMERICHOST", Int(0x2)),
    ("NI_NAMEREQD", Int(0x4)),
    ("NI_NUMERICSERV", Int(0x8)),
    ("NI_DGRAM", Int(0x10)),
    ("NI_MAXHOST", Int(1025)),
    ("NI_MAXSERV", Int(32)),
    ("EAI_MEMORY", Int(8)),
    ("EAI_BADFLAGS", Int(10022)),
    ("EAI_SOCKTYPE", Int(10044)),
    ("EAI_FAMILY", Int(10047)),
    ("EAI_SERVICE", Int(10109)),
    ("EAI_NONAME", Int(11001)),
    ("EAI_AGAIN", Int(11002)),
    ("EAI_FAIL", Int(11003)),
    ("EPERM", Int(1)),
    ("ENOENT", Int(2)),
    ("ESRCH", Int(3)),
    ("EINTR", Int(4)),
    ("EIO", Int(5)),
    ("ENXIO", Int(6)),
    ("E2BIG", Int(7)),
    ("ENOEXEC", Int(8)),
    ("EBADF", Int(9)),
    ("ECHILD", Int(10)),
    ("EAGAIN", Int(11)),
    ("ENOMEM", Int(12)),
    ("EACCES", Int(13)),
    ("EFAULT", Int(14)),
    ("EBUSY", Int(16)),
    ("EEXIST", Int(17)),
    ("EXDEV", Int(18)),
    ("ENODEV", Int(19)),
    ("ENOTDIR", Int(20)),
    ("EISDIR", Int(21)),
    ("EINVAL", Int(22)),
    ("ENFILE", Int(23)),
    ("EMFILE", Int(24)),
    ("ENOTTY", Int(25)),
    ("EFBIG", Int(27)),
    ("ENOSPC", Int(28)),
    ("ESPIPE", Int(29)),
    ("EROFS", Int(30)),
    ("EMLINK", Int(31)),
    ("EPIPE", Int(32)),
    ("EDOM", Int(33)),
    ("ERANGE", Int(34)),
    ("EDEADLK", Int(36)),
    ("ENAMETOOLONG", Int(38)),
    ("ENOLCK", Int(39)),
    ("ENOSYS", Int(40)),
    ("ENOTEMPTY", Int(41)),
    ("EILSEQ", Int(42)),
    ("EADDRINUSE", Int(100)),
    ("EADDRNOTAVAIL", Int(101)),
    ("EAFNOSUPPORT", Int(102)),
    ("EALREADY", Int(103)),
    ("ECONNABORTED", Int(106)),
    ("ECONNREFUSED", Int(107)),
    ("ECONNRESET", Int(108)),
    ("EDESTADDRREQ", Int(109)),
    ("EHOSTUNREACH", Int(110)),
    ("EINPROGRESS", Int(112)),
    ("EISCONN", Int(113)),
    ("ELOOP", Int(114)),
    ("EMSGSIZE", Int(115)),
    ("ENETDOWN", Int(116)),
    ("ENETUNREACH", Int(118)),
    ("ENOBUFS", Int(119)),
    ("ENOPROTOOPT", Int(123)),
    ("ENOTCONN", Int(126)),
    ("ENOTSOCK", Int(128)),
    ("ENOTSUP", Int(129)),
    ("EOPNOTSUPP", Int(130)),
    ("EPROTONOSUPPORT", Int(135)),
    ("EPROTOTYPE", Int(136)),
    ("ETIMEDOUT", Int(138)),
    ("EWOULDBLOCK", Int(140)),
    ("HAVE_FUTIMENS", Bool(false)),
    ("HAVE_UTIMENSAT", Bool(false)),
    ("HAVE_PIPE2", Bool(false)),
    ("HAVE_DUP3", Bool(false)),
];
