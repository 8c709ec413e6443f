//! macOS constant values.

use super::ConstantTable;
use super::ConstantValue::{Bool, Int};

pub(crate) static TABLE: ConstantTable = &[
    ("O_RDONLY", Int(0)),
    ("O_WRONLY", Int(1)),
    ("O_RDWR", Int(2)),
    ("O_ACCMODE", Int(3)),
    ("O_NONBLOCK", Int(0x4)),
    ("O_NDELAY", Int(0x4)),
    ("O_APPEND", Int(0x8)),
    ("O_SHLOCK", Int(0x10)),
    ("O_EXLOCK", Int(0x20)),
    ("O_ASYNC", Int(0x40)),
    ("O_SYNC", Int(0x80)),
    ("O_NOFOLLOW", Int(0x100)),
    ("O_CREAT", Int(0x200)),
    ("O_TRUNC", Int(0x400)),
    ("O_EXCL", Int(0x800)),
    ("O_NOCTTY", Int(0x20000)),
    ("O_DIRECTORY", Int(0x100000)),
    ("O_DSYNC", Int(0x400000)),
    ("O_CLOEXEC", Int(0x1000000)),
    ("SEEK_SET", Int(0)),
    ("SEEK_CUR", Int(1)),
    ("SEEK_END", Int(2)),
    ("SEEK_HOLE", Int(3)),
    ("SEEK_DATA", Int(4)),
    ("F_OK", Int(0)),
    ("X_OK", Int(1)),
    ("W_OK", Int(2)),
    ("R_OK", Int(4)),
    ("AT_FDCWD", Int(-2)),
    ("AT_EACCESS", Int(0x10)),
    ("AT_SYMLINK_NOFOLLOW", Int(0x20)),
    ("AT_SYMLINK_FOLLOW", Int(0x40)),
    ("AT_REMOVEDIR", Int(0x80)),
    ("S_IFMT", Int(0o170000)),
    ("S_IFSOCK", Int(0o140000)),
    ("S_IFLNK", Int(0o120000)),
    ("S_IFREG", Int(0o100000)),
    ("S_IFBLK", Int(0o060000)),
    ("S_IFDIR", Int(0o040000)),
    ("S_IFCHR", Int(0o020000)),
    ("S_IFIFO", Int(0o010000)),
    ("DT_UNKNOWN", Int(0)),
    ("DT_FIFO", Int(1)),
    ("DT_CHR", Int(2)),
    ("DT_DIR", Int(4)),
    ("DT_BLK", Int(6)),
    ("DT_REG", Int(8)),
    ("DT_LNK", Int(10)),
    ("DT_SOCK", Int(12)),
    ("F_GETFD", Int(1)),
    ("F_SETFD", Int(2)),
    ("F_GETFL", Int(3)),
    ("F_SETFL", Int(4)),
    ("FD_CLOEXEC", Int(1)),
    ("F_RDLCK", Int(1)),
    ("F_UNLCK", Int(2)),
    ("F_WRLCK", Int(3)),
    ("LOCK_SH", Int(1)),
    ("LOCK_EX", Int(2)),
    ("LOCK_NB", Int(4)),
    ("LOCK_UN", Int(8)),
    ("WNOHANG", Int(1)),
    ("WUNTRACED", Int(2)),
    ("WCONTINUED", Int(0x10)),
    ("SIGHUP", Int(1)),
    ("SIGINT", Int(2)),
    ("SIGQUIT", Int(3)),
    ("SIGILL", Int(4)),
    ("SIGABRT", Int(6)),
    ("SIGFPE", Int(8)),
    ("SIGKILL", Int(9)),
    ("SIGSEGV", Int(11)),
    ("SIGPIPE", Int(13)),
    ("SIGALRM", Int(14)),
    ("SIGTERM", Int(15)),
    ("SIGSTOP", Int(17)),
    ("SIGCONT", Int(19)),
    ("SIGCHLD", Int(20)),
    ("SIGUSR1", Int(30)),
    ("SIGUSR2", Int(31)),
    ("PROT_NONE", Int(0)),
    ("PROT_READ", Int(1)),
    ("PROT_WRITE", Int(2)),
    ("PROT_EXEC", Int(4)),
    ("MAP_SHARED", Int(1)),
    ("MAP_PRIVATE", Int(2)),
    ("MAP_ANONYMOUS", Int(0x1000)),
    ("_SC_ARG_MAX", Int(1)),
    ("_SC_CHILD_MAX", Int(2)),
    ("_SC_CLK_TCK", Int(3)),
    ("_SC_NGROUPS_MAX", Int(4)),
    ("_SC_OPEN_MAX", Int(5)),
    ("_SC_PAGESIZE", Int(29)),
    ("_SC_PAGE_SIZE", Int(29)),
    ("_SC_NPROCESSORS_CONF", Int(57)),
    ("_SC_NPROCESSORS_ONLN", Int(58)),
    ("_SC_GETPW_R_SIZE_MAX", Int(71)),
    ("_SC_HOST_NAME_MAX", Int(72)),
    ("AF_UNSPEC", Int(0)),
    ("AF_UNIX", Int(1)),
    ("AF_INET", Int(2)),
    ("AF_INET6", Int(30)),
    ("SOCK_STREAM", Int(1)),
    ("SOCK_DGRAM", Int(2)),
    ("SOCK_RAW", Int(3)),
    ("SOCK_SEQPACKET", Int(5)),
    ("SOL_SOCKET", Int(0xffff)),
    ("SO_REUSEADDR", Int(0x4)),
    ("SO_KEEPALIVE", Int(0x8)),
    ("SO_BROADCAST", Int(0x20)),
    ("SO_REUSEPORT", Int(0x200)),
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
    ("MSG_WAITALL", Int(0x40)),
    ("MSG_DONTWAIT", Int(0x80)),
    ("INADDR_ANY", Int(0)),
    ("INADDR_LOOPBACK", Int(0x7f00_0001)),
    ("INADDR_BROADCAST", Int(0xffff_ffff)),
    ("INADDR_NONE", Int(0xffff_ffff)),
    ("UNIX_PATH_MAX", Int(104)),
    ("AI_PASSIVE", Int(0x1)),
    ("AI_CANONNAME", Int(0x2)),
    ("AI_NUMERICHOST", Int(0x4)),
    ("AI_ALL", Int(0x100)),
    ("AI_ADDRCONFIG", Int(0x400)),
    ("AI_V4MAPPED", Int(0x800)),
    ("AI_NUMERICSERV", Int(0x1000)),
    ("NI_NOFQDN", Int(0x1)),
    ("NI_NUMERICHOST", Int(0x2)),
    ("NI_NAMEREQD", Int(0x4)),
    ("NI_NUMERICSERV", Int(0x8)),
    ("NI_DGRAM", Int(0x10)),
    ("NI_MAXHOST", Int(1025)),
    ("NI_MAXSERV", Int(32)),
    ("EAI_ADDRFAMILY", Int(1)),
    ("EAI_AGAIN", Int(2)),
    ("EAI_BADFLAGS", Int(3)),
    ("EAI_FAIL", Int(4)),
    ("EAI_FAMILY", Int(5)),
    ("EAI_MEMORY", Int(6)),
    ("EAI_NODATA", Int(7)),
    ("EAI_NONAME", Int(8)),
    ("EAI_SERVICE", Int(9)),
    ("EAI_SOCKTYPE", Int(10)),
    ("EAI_SYSTEM", Int(11)),
    ("EAI_OVERFLOW", Int(14)),
    ("TIOCGWINSZ", Int(0x40087468)),
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
    ("EDEADLK", Int(11)),
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
    ("EAGAIN", Int(35)),
    ("EWOULDBLOCK", Int(35)),
    ("EINPROGRESS", Int(36)),
    ("EALREADY", Int(37)),
    ("ENOTSOCK", Int(38)),
    ("EDESTADDRREQ", Int(39)),
    ("EMSGSIZE", Int(40)),
    ("EPROTOTYPE", Int(41)),
    ("ENOPROTOOPT", Int(42)),
    ("EPROTONOSUPPORT", Int(43)),
    ("ENOTSUP", Int(45)),
    ("EAFNOSUPPORT", Int(47)),
    ("EADDRINUSE", Int(48)),
    ("EADDRNOTAVAIL", Int(49)),
    ("ENETDOWN", Int(50)),
    ("ENETUNREACH", Int(51)),
    ("ECONNABORTED", Int(53)),
    ("ECONNRESET", Int(54)),
    ("ENOBUFS", Int(55)),
    ("EISCONN", Int(56)),
    ("ENOTCONN", Int(57)),
    ("ETIMEDOUT", Int(60)),
    ("ECONNREFUSED", Int(61)),
    ("ELOOP", Int(62)),
    ("ENAMETOOLONG", Int(63)),
    ("EHOSTUNREACH", Int(65)),
    ("ENOTEMPTY", Int(66)),
    ("ENOLCK", Int(77)),
    ("ENOSYS", Int(78)),
    ("EOPNOTSUPP", Int(102)),
    ("HAVE_FUTIMENS", Bool(false)),
    ("HAVE_UTIMENSAT", Bool(false)),
    ("HAVE_PIPE2", Bool(false)),
    ("HAVE_DUP3", Bool(false)),
];
