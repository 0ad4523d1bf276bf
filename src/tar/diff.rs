//! Compare/diff mode (SPEC_FULL §B.4, grounded in
//! `original_source/src/compare.c`).
//!
//! Invoking `stat()` on a live file is an external collaborator's job, but
//! deciding *what counts as the same file* — which fields participate, and
//! what a mismatch is called — is codec domain knowledge, so `diff_entry`
//! takes a plain `LiveStat` description rather than touching a filesystem.

use crate::tar::entry::{FileKind, LogicalEntry, TimeStamp};

/// The subset of `stat(2)` fields `compare.c` checks against an archived
/// entry.
#[derive(Debug, Clone)]
pub struct LiveStat {
    pub size: u64,
    pub mode: u32,
    pub mtime: TimeStamp,
    pub uid: u32,
    pub gid: u32,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub link_target: Option<String>,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub is_char_device: bool,
    pub is_block_device: bool,
    pub is_fifo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Size { archived: u64, live: u64 },
    Mode { archived: u32, live: u32 },
    Mtime { archived: TimeStamp, live: TimeStamp },
    LinkTarget { archived: Option<String>, live: Option<String> },
    DeviceNumber { archived: (u32, u32), live: (u32, u32) },
    FileType,
}

/// Compares an archived [`LogicalEntry`] against a live file description,
/// returning every field that disagrees (spec §7 "Semantic mismatches").
#[must_use]
pub fn diff_entry(entry: &LogicalEntry, live: &LiveStat) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    if !same_file_type(&entry.kind, live) {
        mismatches.push(Mismatch::FileType);
        // A type mismatch makes every other per-type comparison meaningless.
        return mismatches;
    }

    if entry.size != live.size {
        mismatches.push(Mismatch::Size { archived: entry.size, live: live.size });
    }
    if entry.permissions.to_mode() != live.mode & 0o7777 {
        mismatches.push(Mismatch::Mode { archived: entry.permissions.to_mode(), live: live.mode & 0o7777 });
    }
    if entry.mtime != live.mtime {
        mismatches.push(Mismatch::Mtime { archived: entry.mtime, live: live.mtime });
    }

    let archived_target = link_target(&entry.kind);
    if archived_target.as_deref() != live.link_target.as_deref() {
        mismatches.push(Mismatch::LinkTarget { archived: archived_target, live: live.link_target.clone() });
    }

    if let FileKind::CharacterDevice { major, minor } | FileKind::BlockDevice { major, minor } = &entry.kind {
        if (*major, *minor) != (live.dev_major, live.dev_minor) {
            mismatches.push(Mismatch::DeviceNumber {
                archived: (*major, *minor),
                live: (live.dev_major, live.dev_minor),
            });
        }
    }

    mismatches
}

fn same_file_type(kind: &FileKind, live: &LiveStat) -> bool {
    match kind {
        FileKind::Directory => live.is_directory,
        FileKind::SymbolicLink { .. } => live.is_symlink,
        FileKind::CharacterDevice { .. } => live.is_char_device,
        FileKind::BlockDevice { .. } => live.is_block_device,
        FileKind::Fifo => live.is_fifo,
        FileKind::RegularFile | FileKind::HardLink { .. } => {
            !live.is_directory && !live.is_symlink && !live.is_char_device && !live.is_block_device && !live.is_fifo
        }
        FileKind::DumpDir { .. } => live.is_directory,
    }
}

fn link_target(kind: &FileKind) -> Option<String> {
    match kind {
        FileKind::SymbolicLink { target } | FileKind::HardLink { target } => Some(target.as_str().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar::entry::FilePermissions;
    use relative_path::RelativePathBuf;

    fn base_entry() -> LogicalEntry {
        LogicalEntry {
            original_name: "a.txt".into(),
            name: RelativePathBuf::from("a.txt"),
            had_trailing_slash: false,
            kind: FileKind::RegularFile,
            permissions: FilePermissions::from_mode(0o644),
            uid: 1000,
            gid: 1000,
            uname: "user".into(),
            gname: "user".into(),
            size: 6,
            mtime: TimeStamp::from_seconds(1_700_000_000),
            atime: None,
            ctime: None,
            sparse_map: None,
            real_size: 6,
            unrecognized_pax_attributes: Default::default(),
        }
    }

    fn matching_live(entry: &LogicalEntry) -> LiveStat {
        LiveStat {
            size: entry.size,
            mode: entry.permissions.to_mode(),
            mtime: entry.mtime,
            uid: entry.uid,
            gid: entry.gid,
            dev_major: 0,
            dev_minor: 0,
            link_target: None,
            is_directory: false,
            is_symlink: false,
            is_char_device: false,
            is_block_device: false,
            is_fifo: false,
        }
    }

    #[test]
    fn identical_entry_and_stat_produce_no_mismatches() {
        let entry = base_entry();
        let live = matching_live(&entry);
        assert!(diff_entry(&entry, &live).is_empty());
    }

    #[test]
    fn size_and_mtime_mismatches_are_both_reported() {
        let entry = base_entry();
        let mut live = matching_live(&entry);
        live.size = 999;
        live.mtime = TimeStamp::from_seconds(1);
        let mismatches = diff_entry(&entry, &live);
        assert!(mismatches.contains(&Mismatch::Size { archived: 6, live: 999 }));
        assert!(mismatches.iter().any(|m| matches!(m, Mismatch::Mtime { .. })));
    }

    #[test]
    fn file_type_mismatch_short_circuits_other_checks() {
        let entry = base_entry();
        let mut live = matching_live(&entry);
        live.is_directory = true;
        live.size = 999;
        assert_eq!(diff_entry(&entry, &live), vec![Mismatch::FileType]);
    }
}
