//! The Logical Entry (spec §3) and its constituent value types.

use relative_path::RelativePathBuf;

use crate::tar::constants::TarTypeFlag;

/// Nanosecond-precision timestamp (spec §9, Open Question i: the migration
/// commits to nanosecond precision internally and only truncates on write
/// when the target format lacks sub-second support).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct TimeStamp {
    pub seconds_since_epoch: i64,
    pub nanoseconds: u32,
}

impl TimeStamp {
    #[must_use]
    pub fn from_seconds(seconds: i64) -> Self {
        Self { seconds_since_epoch: seconds, nanoseconds: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePermissions {
    pub owner: Permission,
    pub group: Permission,
    pub other: Permission,
    pub set_uid: bool,
    pub set_gid: bool,
    pub sticky: bool,
}

impl Default for FilePermissions {
    fn default() -> Self {
        Self::from_mode(0o644)
    }
}

impl FilePermissions {
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        Self {
            owner: Permission {
                read: mode & 0o400 != 0,
                write: mode & 0o200 != 0,
                execute: mode & 0o100 != 0,
            },
            group: Permission {
                read: mode & 0o040 != 0,
                write: mode & 0o020 != 0,
                execute: mode & 0o010 != 0,
            },
            other: Permission {
                read: mode & 0o004 != 0,
                write: mode & 0o002 != 0,
                execute: mode & 0o001 != 0,
            },
            set_uid: mode & 0o4000 != 0,
            set_gid: mode & 0o2000 != 0,
            sticky: mode & 0o1000 != 0,
        }
    }

    #[must_use]
    pub fn to_mode(self) -> u32 {
        let mut mode = 0u32;
        if self.owner.read { mode |= 0o400; }
        if self.owner.write { mode |= 0o200; }
        if self.owner.execute { mode |= 0o100; }
        if self.group.read { mode |= 0o040; }
        if self.group.write { mode |= 0o020; }
        if self.group.execute { mode |= 0o010; }
        if self.other.read { mode |= 0o004; }
        if self.other.write { mode |= 0o002; }
        if self.other.execute { mode |= 0o001; }
        if self.set_uid { mode |= 0o4000; }
        if self.set_gid { mode |= 0o2000; }
        if self.sticky { mode |= 0o1000; }
        mode
    }
}

/// One `(offset, numbytes)` pair of a sparse map (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparseRun {
    pub offset: u64,
    pub num_bytes: u64,
}

pub type SparseMap = Vec<SparseRun>;

/// One entry of a dumpdir payload (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpDirStatus {
    /// `Y`: included in this dump.
    Included,
    /// `N`: excluded (filtered, foreign filesystem, or unchanged).
    Excluded,
    /// `D`: subdirectory.
    SubDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpDirEntry {
    pub status: DumpDirStatus,
    pub name: String,
}

/// The file-type-specific payload carried by a Logical Entry.
#[derive(Debug, Clone)]
pub enum FileKind {
    RegularFile,
    HardLink { target: RelativePathBuf },
    SymbolicLink { target: RelativePathBuf },
    CharacterDevice { major: u32, minor: u32 },
    BlockDevice { major: u32, minor: u32 },
    Directory,
    Fifo,
    /// GNU incremental-dump directory listing (spec §4.7).
    DumpDir { entries: Vec<DumpDirEntry> },
}

impl FileKind {
    #[must_use]
    pub fn type_flag(&self) -> TarTypeFlag {
        match self {
            FileKind::RegularFile => TarTypeFlag::RegularFile,
            FileKind::HardLink { .. } => TarTypeFlag::HardLink,
            FileKind::SymbolicLink { .. } => TarTypeFlag::SymbolicLink,
            FileKind::CharacterDevice { .. } => TarTypeFlag::CharacterDevice,
            FileKind::BlockDevice { .. } => TarTypeFlag::BlockDevice,
            FileKind::Directory => TarTypeFlag::Directory,
            FileKind::Fifo => TarTypeFlag::Fifo,
            FileKind::DumpDir { .. } => TarTypeFlag::DumpDir,
        }
    }
}

/// The assembled in-memory representation of one archive member (spec §3).
///
/// Built from one main header plus any preceding auxiliary records; never
/// outlives a single pass (spec §3 Lifecycle).
#[derive(Debug, Clone)]
pub struct LogicalEntry {
    /// Name exactly as the primary header stored it, before any pax/long-name
    /// override was merged in.
    pub original_name: String,
    /// Final, normalized name after merging all auxiliary overrides.
    pub name: RelativePathBuf,
    /// True if the caller's original name had a trailing slash (spec §4.3.1).
    pub had_trailing_slash: bool,
    pub kind: FileKind,
    pub permissions: FilePermissions,
    pub uid: u32,
    pub gid: u32,
    pub uname: String,
    pub gname: String,
    pub size: u64,
    pub mtime: TimeStamp,
    pub atime: Option<TimeStamp>,
    pub ctime: Option<TimeStamp>,
    pub sparse_map: Option<SparseMap>,
    /// Logical (uncompressed, fully materialized) file length for sparse
    /// files; equals `size` for non-sparse entries.
    pub real_size: u64,
    pub unrecognized_pax_attributes: hashbrown::HashMap<String, String>,
}

impl LogicalEntry {
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        self.sparse_map.is_some()
    }
}
