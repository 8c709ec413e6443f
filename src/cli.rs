use crate::backend::create_backend;
use crate::config::constants::{Platform, PosixConstants};
use crate::config::{BackendKind, SupportConfig};
use crate::core::path::PosixPath;
use crate::core::support::{PosixSupport, UniversalSockAddr};
use crate::core::types::DEFAULT_DIR_FD;
use crate::ffi::invoker::DlopenInvoker;
use crate::ffi::library::LibraryContext;
use crate::ffi::modules::{Bz2Support, CtypesSupport, LzmaSupport, ZlibSupport};
use crate::observability::{call_log_level, init_logging};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about = "Inspect the POSIX support layer of this host", long_about = None)]
struct Cli {
    /// Use the emulated backend instead of the native one
    #[arg(long, global = true)]
    emulated: bool,
    /// Log every backend call; repeat for trace level with caller frames
    #[arg(long, global = true, action = ArgAction::Count)]
    log: u8,
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the name of the selected backend
    Backend,
    /// Dump a platform constant table
    Constants {
        /// linux, darwin or windows; defaults to the host
        #[arg(long)]
        platform: Option<String>,
    },
    /// Stat a path and print the result as JSON
    Stat { path: String },
    /// List a directory
    Ls { dir: String },
    /// Resolve a host name
    Resolve { host: String, service: Option<String> },
    /// Probe the optional native libraries
    Libs,
}

fn path(posix: &dyn PosixSupport, value: &str) -> Result<PosixPath> {
    posix
        .create_path_from_string(value)
        .ok_or_else(|| anyhow::anyhow!("path contains a NUL byte: {:?}", value))
}

fn describe(addr: &dyn UniversalSockAddr) -> String {
    if let Ok(v4) = addr.as_inet4() {
        return v4.to_std().to_string();
    }
    if let Ok(v6) = addr.as_inet6() {
        return v6.to_std().to_string();
    }
    match addr.as_unix() {
        Ok(unix) => String::from_utf8_lossy(&unix.path).into_owned(),
        Err(_) => format!("<family {}>", addr.family()),
    }
}

fn dump_constants(platform: Option<&str>) -> Result<()> {
    let table = match platform {
        Some(name) => PosixConstants::for_platform(
            Platform::parse(name).ok_or_else(|| anyhow::anyhow!("unknown platform: {}", name))?,
        ),
        None => PosixConstants::host()?,
    };
    let mut entries: Vec<_> = table.iter().collect();
    entries.sort_by_key(|(name, _)| *name);
    println!("# {} ({} constants)", table.platform(), entries.len());
    for (name, value) in entries {
        println!("{} = {}", name, value);
    }
    Ok(())
}

fn stat(posix: &dyn PosixSupport, target: &str) -> Result<()> {
    let st = posix
        .fstatat(DEFAULT_DIR_FD, &path(posix, target)?, true)
        .with_context(|| format!("stat {}", target))?;
    let report = serde_json::json!({
        "path": target,
        "mode": format!("{:o}", st.mode),
        "ino": st.ino,
        "dev": st.dev,
        "nlink": st.nlink,
        "uid": st.uid,
        "gid": st.gid,
        "size": st.size,
        "atime": st.atime,
        "mtime": st.mtime,
        "ctime": st.ctime,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn list(posix: &dyn PosixSupport, dir: &str) -> Result<()> {
    let stream = posix
        .opendir(&path(posix, dir)?)
        .with_context(|| format!("opendir {}", dir))?;
    let mut names = Vec::new();
    let result = loop {
        match posix.readdir(&stream) {
            Ok(Some(entry)) => names.push((posix.dir_entry_get_name(&entry), posix.dir_entry_get_type(&entry))),
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };
    posix.closedir(&stream)?;
    result?;
    names.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    for (name, d_type) in names {
        println!("{:>3} {}", d_type, name);
    }
    Ok(())
}

fn resolve(posix: &dyn PosixSupport, host: &str, service: Option<&str>) -> Result<()> {
    let af_unspec = PosixConstants::host()?.int("AF_UNSPEC").unwrap_or(0) as i32;
    let mut cursor = posix
        .getaddrinfo(Some(host), service, af_unspec, 0, 0, 0)
        .with_context(|| format!("resolve {}", host))?;
    loop {
        println!(
            "family={} type={} protocol={} address={}",
            cursor.family(),
            cursor.sock_type(),
            cursor.protocol(),
            describe(cursor.sock_addr().as_ref())
        );
        if !cursor.next() {
            break;
        }
    }
    cursor.release();
    Ok(())
}

fn probe_libraries(config: &SupportConfig) {
    let context = LibraryContext::new(
        Arc::new(DlopenInvoker::new()),
        config.native_access,
        config.library_search_paths.clone(),
    );
    let report = |name: &str, outcome: std::result::Result<String, String>| match outcome {
        Ok(version) => println!("{:<8} available ({})", name, version),
        Err(reason) => println!("{:<8} unavailable: {}", name, reason),
    };
    report("zlib", ZlibSupport::new(context.clone()).version().map_err(|e| e.to_string()));
    report("bz2", Bz2Support::new(context.clone()).version().map_err(|e| e.to_string()));
    report("lzma", LzmaSupport::new(context.clone()).version_string().map_err(|e| e.to_string()));
    let ctypes = CtypesSupport::new(context, None);
    report(
        "ctypes",
        if ctypes.is_available() {
            Ok("libc".to_string())
        } else {
            Err("libc could not be loaded".to_string())
        },
    );
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging((cli.log > 0).then(|| call_log_level(cli.log > 1)));

    let mut config = SupportConfig::resolve(cli.config.as_deref())?;
    if cli.emulated {
        config.backend = BackendKind::Emulated;
    }
    if cli.log > 0 {
        config.logging = true;
    }

    match cli.command {
        Commands::Constants { platform } => dump_constants(platform.as_deref()),
        Commands::Libs => {
            probe_libraries(&config);
            Ok(())
        }
        command => {
            let posix = create_backend(&config)?;
            match command {
                Commands::Backend => {
                    println!("{}", posix.get_backend());
                    Ok(())
                }
                Commands::Stat { path } => stat(posix.as_ref(), &path),
                Commands::Ls { dir } => list(posix.as_ref(), &dir),
                Commands::Resolve { host, service } => resolve(posix.as_ref(), &host, service.as_deref()),
                Commands::Constants { .. } | Commands::Libs => Ok(()),
            }
        }
    }
}
