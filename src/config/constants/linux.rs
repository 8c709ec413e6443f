//! Linux (x86_64/aarch64 generic ABI) constant values.

use super::ConstantTable;
use super::ConstantValue::{Bool, Int};

pub(crate) static TABLE: ConstantTable = &[
    // open(2)
    ("O_RDONLY", Int(0)),
    ("O_WRONLY", Int(1)),
    ("O_RDWR", Int(2)),
    ("O_ACCMODE", Int(3)),
    ("O_CREAT", Int(0o100)),
    ("O_EXCL", Int(0o200)),
    ("O_NOCTTY", Int(0o400)),
    ("O_TRUNC", Int(0o1000)),
    ("O_APPEND", Int(0o2000)),
    ("O_NONBLOCK", Int(0o4000)),
    ("O_NDELAY", Int(0o4000)),
    ("O_DSYNC", Int(0o10000)),
    ("O_ASYNC", Int(0o20000)),
    ("O_DIRECT", Int(0o40000)),
    ("O_LARGEFILE", Int(0)),
    ("O_DIRECTORY", Int(0o200000)),
    ("O_NOFOLLOW", Int(0o400000)),
    ("O_NOATIME", Int(0o1000000)),
    ("O_CLOEXEC", Int(0o2000000)),
    ("O_SYNC", Int(0o4010000)),
    ("O_RSYNC", Int(0o4010000)),
    ("O_PATH", Int(0o10000000)),
    ("O_TMPFILE", Int(0o20200000)),
    // lseek(2)
    ("SEEK_SET", Int(0)),
    ("SEEK_CUR", Int(1)),
    ("SEEK_END", Int(2)),
    ("SEEK_DATA", Int(3)),
    ("SEEK_HOLE", Int(4)),
    // access(2)
    ("F_OK", Int(0)),
    ("X_OK", Int(1)),
    ("W_OK", Int(2)),
    ("R_OK", Int(4)),
    // *at(2)
    ("AT_FDCWD", Int(-100)),
    ("AT_SYMLINK_NOFOLLOW", Int(0x100)),
    ("AT_REMOVEDIR", Int(0x200)),
    ("AT_EACCESS", Int(0x200)),
    ("AT_SYMLINK_FOLLOW", Int(0x400)),
    // stat(2)
    ("S_IFMT", Int(0o170000)),
    ("S_IFSOCK", Int(0o140000)),
    ("S_IFLNK", Int(0o120000)),
    ("S_IFREG", Int(0o100000)),
    ("S_IFBLK", Int(0o060000)),
    ("S_IFDIR", Int(0o040000)),
    ("S_IFCHR", Int(0o020000)),
    ("S_IFIFO", Int(0o010000)),
    // readdir(3)
    ("DT_UNKNOWN", Int(0)),
    ("DT_FIFO", Int(1)),
    ("DT_CHR", Int(2)),
    ("DT_DIR", Int(4)),
    ("DT_BLK", Int(6)),
    ("DT_REG", Int(8)),
    ("DT_LNK", Int(10)),
    ("DT_SOCK", Int(12)),
    // fcntl(2) / flock(2)
    ("F_GETFD", Int(1)),
    ("F_SETFD", Int(2)),
    ("F_GETFL", Int(3)),
    ("F_SETFL", Int(4)),
    ("FD_CLOEXEC", Int(1)),
    ("F_RDLCK", Int(0)),
    ("F_WRLCK", Int(1)),
    ("F_UNLCK", Int(2)),
    ("LOCK_SH", Int(1)),
    ("LOCK_EX", Int(2)),
    ("LOCK_NB", Int(4)),
    ("LOCK_UN", Int(8)),
    // wait(2)
    ("WNOHANG", Int(1)),
    ("WUNTRACED", Int(2)),
    ("WCONTINUED", Int(8)),
    // signals
    ("SIGHUP", Int(1)),
    ("SIGINT", Int(2)),
    ("SIGQUIT", Int(3)),
    ("SIGILL", Int(4)),
    ("SIGABRT", Int(6)),
    ("SIGFPE", Int(8)),
    ("SIGKILL", Int(9)),
    ("SIGUSR1", Int(10)),
    ("SIGSEGV", Int(11)),
    ("SIGUSR2", Int(12)),
    ("SIGPIPE", Int(13)),
    ("SIGALRM", Int(14)),
    ("SIGTERM", Int(15)),
    ("SIGCHLD", Int(17)),
    ("SIGCONT", Int(18)),
    ("SIGSTOP", Int(19)),
    // mmap(2)
    ("PROT_NONE", Int(0)),
    ("PROT_READ", Int(1)),
    ("PROT_WRITE", Int(2)),
    ("PROT_EXEC", Int(4)),
    ("MAP_SHARED", Int(1)),
    ("MAP_PRIVATE", Int(2)),
    ("MAP_ANONYMOUS", Int(0x20)),
    // sysconf(3)
    ("_SC_ARG_MAX", Int(0)),
    ("_SC_CHILD_MAX", Int(1)),
    ("_SC_CLK_TCK", Int(2)),
    ("_SC_NGROUPS_MAX", Int(3)),
    ("_SC_OPEN_MAX", Int(4)),
    ("_SC_PAGESIZE", Int(30)),
    ("_SC_PAGE_SIZE", Int(30)),
    ("_SC_GETPW_R_SIZE_MAX", Int(70)),
    ("_SC_NPROCESSORS_CONF", Int(83)),
    ("_SC_NPROCESSORS_ONLN", Int(84)),
    ("_SC_HOST_NAME_MAX", Int(180)),
    // sockets
    ("AF_UNSPEC", Int(0)),
    ("AF_UNIX", Int(1)),
    ("AF_INET", Int(2)),
    ("AF_INET6", Int(10)),
    ("SOCK_STREAM", Int(1)),
    ("SOCK_DGRAM", Int(2)),
    ("SOCK_RAW", Int(3)),
    ("SOCK_SEQPACKET", Int(5)),
    ("SOCK_NONBLOCK", Int(0o4000)),
    ("SOCK_CLOEXEC", Int(0o2000000)),
    ("SOL_SOCKET", Int(1)),
    ("SO_REUSEADDR", Int(2)),
    ("SO_TYPE", Int(3)),
    ("SO_ERROR", Int(4)),
    ("SO_BROADCAST", Int(6)),
    ("SO_SNDBUF", Int(7)),
    ("SO_RCVBUF", Int(8)),
    ("SO_KEEPALIVE", Int(9)),
    ("SO_REUSEPORT", Int(15)),
    ("IPPROTO_IP", Int(0)),
    ("IPPROTO_TCP", Int(6)),
    ("IPPROTO_UDP", Int(17)),
    ("IPPROTO_IPV6", Int(41)),
    ("TCP_NODELAY", Int(1)),
    ("IPV6_V6ONLY", Int(26)),
    ("SHUT_RD", Int(0)),
    ("SHUT_WR", Int(1)),
    ("SHUT_RDWR", Int(2)),
    ("MSG_OOB", Int(1)),
    ("MSG_PEEK", Int(2)),
    ("MSG_DONTWAIT", Int(0x40)),
    ("MSG_WAITALL", Int(0x100)),
    ("INADDR_ANY", Int(0)),
    ("INADDR_LOOPBACK", Int(0x7f00_0001)),
    ("INADDR_BROADCAST", Int(0xffff_ffff)),
    ("INADDR_NONE", Int(0xffff_ffff)),
    ("UNIX_PATH_MAX", Int(108)),
    // getaddrinfo(3) / getnameinfo(3)
    ("AI_PASSIVE", Int(0x1)),
    ("AI_CANONNAME", Int(0x2)),
    ("AI_NUMERICHOST", Int(0x4)),
    ("AI_V4MAPPED", Int(0x8)),
    ("AI_ALL", Int(0x10)),
    ("AI_ADDRCONFIG", Int(0x20)),
    ("AI_NUMERICSERV", Int(0x400)),
    ("NI_NUMERICHOST", Int(1)),
    ("NI_NUMERICSERV", Int(2)),
    ("NI_NOFQDN", Int(4)),
    ("NI_NAMEREQD", Int(8)),
    ("NI_DGRAM", Int(16)),
    ("NI_MAXHOST", Int(1025)),
    ("NI_MAXSERV", Int(32)),
    ("EAI_BADFLAGS", Int(-1)),
    ("EAI_NONAME", Int(-2)),
    ("EAI_AGAIN", Int(-3)),
    ("EAI_FAIL", Int(-4)),
    ("EAI_NODATA", Int(-5)),
    ("EAI_FAMILY", Int(-6)),
    ("EAI_SOCKTYPE", Int(-7)),
    ("EAI_SERVICE", Int(-8)),
    ("EAI_ADDRFAMILY", Int(-9)),
    ("EAI_MEMORY", Int(-10)),
    ("EAI_SYSTEM", Int(-11)),
    ("EAI_OVERFLOW", Int(-12)),
    // terminals
    ("TIOCGWINSZ", Int(0x5413)),
    // errno
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
    ("EWOULDBLOCK", Int(11)),
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
    ("EDEADLK", Int(35)),
    ("ENAMETOOLONG", Int(36)),
    ("ENOLCK", Int(37)),
    ("ENOSYS", Int(38)),
    ("ENOTEMPTY", Int(39)),
    ("ELOOP", Int(40)),
    ("ENOTSOCK", Int(88)),
    ("EDESTADDRREQ", Int(89)),
    ("EMSGSIZE", Int(90)),
    ("EPROTOTYPE", Int(91)),
    ("ENOPROTOOPT", Int(92)),
    ("EPROTONOSUPPORT", Int(93)),
    ("EOPNOTSUPP", Int(95)),
    ("ENOTSUP", Int(95)),
    ("EAFNOSUPPORT", Int(97)),
    ("EADDRINUSE", Int(98)),
    ("EADDRNOTAVAIL", Int(99)),
    ("ENETDOWN", Int(100)),
    ("ENETUNREACH", Int(101)),
    ("ECONNABORTED", Int(103)),
    ("ECONNRESET", Int(104)),
    ("ENOBUFS", Int(105)),
    ("EISCONN", Int(106)),
    ("ENOTCONN", Int(107)),
    ("ETIMEDOUT", Int(110)),
    ("ECONNREFUSED", Int(111)),
    ("EHOSTUNREACH", Int(113)),
    ("EALREADY", Int(114)),
    ("EINPROGRESS", Int(115)),
    // capability flags
    ("HAVE_FUTIMENS", Bool(true)),
    ("HAVE_UTIMENSAT", Bool(true)),
    ("HAVE_PIPE2", Bool(true)),
    ("HAVE_DUP3", Bool(true)),
];
