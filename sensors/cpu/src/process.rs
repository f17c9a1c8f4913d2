//! Per-process CPU counters from `/proc/<pid>/stat` and `/proc/<pid>/status`.
//!
//! Enumeration is best effort: processes exit while we walk `/proc`, some
//! records are unreadable without privileges, and a few are malformed. Any
//! such process is skipped and the rest of the walk continues.

use fanwhy_core::SensorError;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Identity and cumulative CPU time of one process at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSample {
    /// Process id.
    pub pid: u32,
    /// Command name as reported by the kernel; may contain `(`, `)` and spaces.
    pub name: String,
    /// Owning user name, or the numeric uid when it has no passwd entry.
    pub user: String,
    /// `utime + stime` in clock ticks since the process started.
    pub cpu_ticks: u64,
}

/// The fields fanwhy needs from a `/proc/<pid>/stat` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    /// Process id.
    pub pid: u32,
    /// Command name between the outer parentheses.
    pub name: String,
    /// Ticks spent in user mode.
    pub utime: u64,
    /// Ticks spent in kernel mode.
    pub stime: u64,
}

impl StatRecord {
    /// Fields that must follow the name: state through stime.
    const MIN_TRAILING_FIELDS: usize = 13;
    const UTIME_INDEX: usize = 11;
    const STIME_INDEX: usize = 12;

    /// Parse a stat record such as `1234 (my (odd) name) S 1 ...`.
    ///
    /// The name ends at the *last* `)` in the record, since the name itself
    /// may contain closing parentheses.
    ///
    /// # Errors
    ///
    /// Returns a [`SensorError::Parse`] if the parentheses, pid, or tick
    /// fields are missing or malformed.
    pub fn parse(content: &str) -> Result<Self, SensorError> {
        let close = content
            .rfind(')')
            .ok_or_else(|| SensorError::parse("Stat record has no ')'"))?;
        let open = content[..close]
            .find('(')
            .ok_or_else(|| SensorError::parse("Stat record has no '('"))?;

        let pid = content[..open]
            .trim()
            .parse::<u32>()
            .map_err(|e| SensorError::parse_with_source("Invalid pid in stat record", e))?;
        let name = content[open + 1..close].to_owned();

        let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
        if fields.len() < Self::MIN_TRAILING_FIELDS {
            return Err(SensorError::parse(format!(
                "Stat record has {} fields after the name, expected at least {}",
                fields.len(),
                Self::MIN_TRAILING_FIELDS
            )));
        }

        let ticks = |index: usize| {
            fields[index]
                .parse::<u64>()
                .map_err(|e| SensorError::parse_with_source("Invalid tick count in stat record", e))
        };

        Ok(Self {
            pid,
            name,
            utime: ticks(Self::UTIME_INDEX)?,
            stime: ticks(Self::STIME_INDEX)?,
        })
    }

    /// Total CPU ticks attributed to the process.
    #[must_use]
    pub fn cpu_ticks(&self) -> u64 {
        self.utime.saturating_add(self.stime)
    }
}

/// Extract the real uid from a `/proc/<pid>/status` record.
///
/// The `Uid:` line lists real, effective, saved and filesystem uids; the
/// first is the owner.
#[must_use]
pub fn parse_status_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// Resolves numeric uids to user names.
pub trait UserLookup: Send {
    /// The account name for `uid`, if one exists.
    fn name_of(&self, uid: u32) -> Option<String>;
}

/// Looks users up in the system password database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUsers;

impl UserLookup for SystemUsers {
    #[cfg(unix)]
    fn name_of(&self, uid: u32) -> Option<String> {
        use nix::unistd::{Uid, User};

        match User::from_uid(Uid::from_raw(uid)) {
            Ok(user) => user.map(|u| u.name),
            Err(e) => {
                log::trace!("user lookup for uid {uid} failed: {e}");
                None
            }
        }
    }

    #[cfg(not(unix))]
    fn name_of(&self, _uid: u32) -> Option<String> {
        None
    }
}

impl UserLookup for HashMap<u32, String> {
    fn name_of(&self, uid: u32) -> Option<String> {
        self.get(&uid).cloned()
    }
}

/// Source of per-process CPU counters.
pub trait ProcessCounterReader: Send {
    /// Every process visible right now, in enumeration order.
    ///
    /// Never fails as a whole: unreadable processes are left out.
    fn enumerate(&self) -> Vec<ProcessSample>;
}

/// Reads process counters from a procfs tree.
pub struct ProcFsReader {
    root: PathBuf,
    users: Box<dyn UserLookup>,
}

impl ProcFsReader {
    /// Mount point of procfs.
    pub const PROC_ROOT: &'static str = "/proc";

    /// Reader for the real `/proc`, resolving users from the system.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(Self::PROC_ROOT, SystemUsers)
    }

    /// Reader for a procfs-shaped directory (useful for testing).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>, users: impl UserLookup + 'static) -> Self {
        Self {
            root: root.into(),
            users: Box::new(users),
        }
    }

    /// The directory this reader walks.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Numeric entries of the root, ascending.
    fn pids(&self) -> Vec<u32> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("cannot list {}: {e}", self.root.display());
                return Vec::new();
            }
        };
        let mut pids: Vec<u32> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        pids
    }

    fn sample(&self, pid: u32, names: &mut HashMap<u32, String>) -> Result<ProcessSample, SensorError> {
        let dir = self.root.join(pid.to_string());
        let record = StatRecord::parse(&fs::read_to_string(dir.join("stat"))?)?;
        let uid = parse_status_uid(&fs::read_to_string(dir.join("status"))?)
            .ok_or_else(|| SensorError::parse("Status record has no Uid line"))?;

        let user = names
            .entry(uid)
            .or_insert_with(|| self.users.name_of(uid).unwrap_or_else(|| uid.to_string()))
            .clone();

        Ok(ProcessSample {
            pid: record.pid,
            cpu_ticks: record.cpu_ticks(),
            name: record.name,
            user,
        })
    }
}

impl Default for ProcFsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcFsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcFsReader").field("root", &self.root).finish_non_exhaustive()
    }
}

impl ProcessCounterReader for ProcFsReader {
    fn enumerate(&self) -> Vec<ProcessSample> {
        let mut names = HashMap::new();
        self.pids()
            .into_iter()
            .filter_map(|pid| match self.sample(pid, &mut names) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    log::trace!("skipping pid {pid}: {e}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAT_TAIL: &str = "S 1 1234 1234 0 -1 4194560 100 0 0 0 50 30 0 0 20 0 1 0 100 200 0 0";

    fn write_process(root: &Path, pid: u32, stat: &str, status: Option<&str>) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stat"), stat).unwrap();
        if let Some(status) = status {
            fs::write(dir.join("status"), status).unwrap();
        }
    }

    fn status_for(uid: u32) -> String {
        format!("Name:\tproc\nState:\tS (sleeping)\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\nGid:\t0\t0\t0\t0\n")
    }

    #[test]
    fn test_parse_stat_record() {
        let record = StatRecord::parse(&format!("1234 (test_process) {STAT_TAIL}\n")).unwrap();
        assert_eq!(record.pid, 1234);
        assert_eq!(record.name, "test_process");
        assert_eq!(record.utime, 50);
        assert_eq!(record.stime, 30);
        assert_eq!(record.cpu_ticks(), 80);
    }

    #[test]
    fn test_parse_stat_record_with_spaces() {
        let record = StatRecord::parse(&format!("1234 (test process name) {STAT_TAIL}")).unwrap();
        assert_eq!(record.name, "test process name");
        assert_eq!(record.utime, 50);
    }

    #[test]
    fn test_parse_stat_record_with_parentheses_in_name() {
        let record = StatRecord::parse(&format!("42 (evil) S 1 (x)) {STAT_TAIL}")).unwrap();
        assert_eq!(record.pid, 42);
        assert_eq!(record.name, "evil) S 1 (x)");
        assert_eq!(record.utime, 50);
        assert_eq!(record.stime, 30);

        let record = StatRecord::parse(&format!("7 ((sd-pam)) {STAT_TAIL}")).unwrap();
        assert_eq!(record.name, "(sd-pam)");
    }

    #[test]
    fn test_parse_stat_record_rejects_malformed() {
        assert!(StatRecord::parse("").is_err());
        assert!(StatRecord::parse("1234 no parens here").is_err());
        assert!(StatRecord::parse(&format!("abc (name) {STAT_TAIL}")).is_err());
        assert!(StatRecord::parse("1234 (short) S 1 2 3").is_err());
        assert!(StatRecord::parse("1234 (bad) S 1 1 1 0 -1 0 0 0 0 0 x 30").is_err());
    }

    #[test]
    fn test_parse_status_uid() {
        assert_eq!(parse_status_uid(&status_for(1000)), Some(1000));
        assert_eq!(parse_status_uid("Name:\tx\nGid:\t0\n"), None);
        assert_eq!(parse_status_uid("Uid:\tnope\n"), None);
    }

    #[test]
    fn test_enumerate_resolves_users_with_numeric_fallback() {
        let root = TempDir::new().unwrap();
        write_process(root.path(), 10, &format!("10 (alpha) {STAT_TAIL}"), Some(&status_for(1000)));
        write_process(root.path(), 11, &format!("11 (beta) {STAT_TAIL}"), Some(&status_for(4242)));

        let users = HashMap::from([(1000, "alice".to_owned())]);
        let samples = ProcFsReader::with_root(root.path(), users).enumerate();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].pid, 10);
        assert_eq!(samples[0].user, "alice");
        assert_eq!(samples[0].cpu_ticks, 80);
        assert_eq!(samples[1].user, "4242");
    }

    #[test]
    fn test_enumerate_skips_bad_records() {
        let root = TempDir::new().unwrap();
        write_process(root.path(), 1, &format!("1 (init) {STAT_TAIL}"), Some(&status_for(0)));
        // Malformed stat record.
        write_process(root.path(), 2, "2 garbage", Some(&status_for(0)));
        // Status without a Uid line.
        write_process(root.path(), 3, &format!("3 (nouid) {STAT_TAIL}"), Some("Name:\tx\n"));
        // Status missing entirely, as if the process exited mid-walk.
        write_process(root.path(), 4, &format!("4 (gone) {STAT_TAIL}"), None);
        // Directory with no files at all.
        fs::create_dir_all(root.path().join("5")).unwrap();
        // Non-numeric entries are not processes.
        fs::create_dir_all(root.path().join("self")).unwrap();
        fs::write(root.path().join("stat"), "cpu 1 2 3 4 5 6 7 8").unwrap();
        write_process(root.path(), 6, &format!("6 (last) {STAT_TAIL}"), Some(&status_for(0)));

        let users = HashMap::from([(0, "root".to_owned())]);
        let samples = ProcFsReader::with_root(root.path(), users).enumerate();

        let pids: Vec<u32> = samples.iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![1, 6]);
    }

    #[cfg(unix)]
    #[test]
    fn test_enumerate_skips_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        write_process(root.path(), 1, &format!("1 (open) {STAT_TAIL}"), Some(&status_for(0)));
        write_process(root.path(), 2, &format!("2 (locked) {STAT_TAIL}"), Some(&status_for(0)));
        let locked = root.path().join("2").join("stat");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let users = HashMap::from([(0, "root".to_owned())]);
        let samples = ProcFsReader::with_root(root.path(), users).enumerate();

        // Root can still read mode 000 files, so only assert the walk survived.
        assert!(samples.iter().any(|s| s.pid == 1));
    }

    #[test]
    fn test_enumerate_missing_root_is_empty() {
        let reader = ProcFsReader::with_root("/nonexistent/proc", HashMap::new());
        assert!(reader.enumerate().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_users_resolves_root() {
        assert_eq!(SystemUsers.name_of(0).as_deref(), Some("root"));
        assert_eq!(SystemUsers.name_of(u32::MAX - 1), None);
    }

    #[test]
    fn test_enumerate_real_proc() {
        if Path::new("/proc/self/stat").exists() {
            let samples = ProcFsReader::new().enumerate();
            assert!(samples.iter().any(|s| s.pid == std::process::id()));
        }
    }
}
