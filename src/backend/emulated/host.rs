//! Host facts readable without native calls: `/proc`, `/etc/passwd`, `std::env::consts`.

use crate::core::types::{PwdResult, UnameResult};
use std::fs;

const PROC_STATUS: &str = "/proc/self/status";
const PASSWD: &str = "/etc/passwd";

/// Ids from a `/proc/<pid>/status` line such as `Uid:\t1000\t1000\t1000\t1000`.
fn status_field(status: &str, key: &str) -> Option<Vec<i64>> {
    let line = status.lines().find(|l| l.starts_with(key))?;
    line[key.len()..]
        .split_whitespace()
        .map(|v| v.parse().ok())
        .collect()
}

/// `(real, effective)` user or group id; `None` when `/proc` is not available.
pub(crate) fn ids(key: &str) -> Option<(i64, i64)> {
    let status = fs::read_to_string(PROC_STATUS).ok()?;
    let values = status_field(&status, key)?;
    Some((*values.first()?, *values.get(1)?))
}

pub(crate) fn groups() -> Option<Vec<i64>> {
    let status = fs::read_to_string(PROC_STATUS).ok()?;
    status_field(&status, "Groups:")
}

/// One `/etc/passwd` line; malformed lines are skipped.
fn parse_passwd_line(line: &str) -> Option<PwdResult> {
    if line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 7 {
        return None;
    }
    Some(PwdResult {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        dir: fields[5].to_string(),
        shell: fields[6].to_string(),
    })
}

pub(crate) fn parse_passwd(content: &str) -> Vec<PwdResult> {
    content.lines().filter_map(parse_passwd_line).collect()
}

pub(crate) fn passwd_entries() -> Vec<PwdResult> {
    fs::read_to_string(PASSWD)
        .map(|content| parse_passwd(&content))
        .unwrap_or_default()
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn hostname() -> String {
    read_trimmed("/proc/sys/kernel/hostname")
        .or_else(|| read_trimmed("/etc/hostname"))
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

pub(crate) fn uname() -> UnameResult {
    let sysname = match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "Darwin".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    };
    UnameResult {
        sysname,
        nodename: hostname(),
        release: read_trimmed("/proc/sys/kernel/osrelease").unwrap_or_default(),
        version: read_trimmed("/proc/sys/kernel/version").unwrap_or_default(),
        machine: std::env::consts::ARCH.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_field() {
        let status = "Name:\tcat\nUid:\t1000\t1001\t1000\t1000\nGroups:\t4 24 27 \n";
        assert_eq!(status_field(status, "Uid:"), Some(vec![1000, 1001, 1000, 1000]));
        assert_eq!(status_field(status, "Groups:"), Some(vec![4, 24, 27]));
        assert_eq!(status_field(status, "Gid:"), None);
    }

    #[test]
    fn test_parse_passwd() {
        let content = "# comment\nroot:x:0:0:root:/root:/bin/bash\nbroken:line\nalice:x:1000:1000:Alice,,,:/home/alice:/bin/zsh\n";
        let entries = parse_passwd(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "alice");
        assert_eq!(entries[1].uid, 1000);
        assert_eq!(entries[1].dir, "/home/alice");
        assert_eq!(entries[1].shell, "/bin/zsh");
    }

    #[test]
    fn test_uname_machine() {
        let info = uname();
        assert_eq!(info.machine, std::env::consts::ARCH);
        assert!(!info.nodename.is_empty());
    }
}
