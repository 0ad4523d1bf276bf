//! Header byte layouts and the type-flag enumeration (spec §3).
//!
//! The block is interpreted as a tagged variant of parsed-header types laid
//! over a single byte buffer rather than as aliased C unions: each struct
//! below reads only the bytes it owns, mirroring the teacher's
//! `V7Header` / `CommonHeaderAdditions` split but extended with the STAR
//! trailer and the full type-flag set spec.md §3 lists.

use core::str::Utf8Error;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// A single type-flag byte, decoded into its semantic meaning.
///
/// `D`, `M`, `N`, `V` are recognized but never produced by the builder; `N`
/// in particular is a legacy auxiliary (see spec.md §B.3) absorbed by the
/// parser and otherwise dead weight in any archive the builder writes.
#[derive(Debug, Eq, Hash, PartialEq, Clone, Copy)]
pub enum TarTypeFlag {
    RegularFile,
    HardLink,
    SymbolicLink,
    CharacterDevice,
    BlockDevice,
    Directory,
    Fifo,
    ContinuousFile,
    PaxExtendedHeader,
    PaxGlobalExtendedHeader,
    LongNameGnu,
    LongLinkNameGnu,
    SparseOldGnu,
    /// GNU incremental-dump directory listing (spec.md §4.7).
    DumpDir,
    /// GNU multi-volume continuation marker; absorbed with a warning, never
    /// produced (multi-volume splitting is transport, not codec, territory).
    MultiVolumeGnu,
    /// Legacy renamed-name list (spec.md §B.3); parser-only.
    RenamedNameListGnu,
    /// GNU volume header; metadata-only, ignored.
    VolumeHeaderGnu,
    UnknownTypeFlag(u8),
}

impl TarTypeFlag {
    #[must_use]
    pub fn is_auxiliary(&self) -> bool {
        matches!(
            self,
            TarTypeFlag::PaxExtendedHeader
                | TarTypeFlag::PaxGlobalExtendedHeader
                | TarTypeFlag::LongNameGnu
                | TarTypeFlag::LongLinkNameGnu
                | TarTypeFlag::SparseOldGnu
                | TarTypeFlag::RenamedNameListGnu
        )
    }

    #[must_use]
    pub fn is_file_like(&self) -> bool {
        matches!(
            self,
            TarTypeFlag::RegularFile
                | TarTypeFlag::HardLink
                | TarTypeFlag::SymbolicLink
                | TarTypeFlag::CharacterDevice
                | TarTypeFlag::BlockDevice
                | TarTypeFlag::Directory
                | TarTypeFlag::Fifo
                | TarTypeFlag::ContinuousFile
                | TarTypeFlag::DumpDir
        )
    }
}

impl From<u8> for TarTypeFlag {
    fn from(value: u8) -> Self {
        match value {
            b'\0' | b'0' => TarTypeFlag::RegularFile,
            b'1' => TarTypeFlag::HardLink,
            b'2' => TarTypeFlag::SymbolicLink,
            b'3' => TarTypeFlag::CharacterDevice,
            b'4' => TarTypeFlag::BlockDevice,
            b'5' => TarTypeFlag::Directory,
            b'6' => TarTypeFlag::Fifo,
            b'7' => TarTypeFlag::ContinuousFile,
            b'x' => TarTypeFlag::PaxExtendedHeader,
            b'g' => TarTypeFlag::PaxGlobalExtendedHeader,
            b'L' => TarTypeFlag::LongNameGnu,
            b'K' => TarTypeFlag::LongLinkNameGnu,
            b'S' => TarTypeFlag::SparseOldGnu,
            b'D' => TarTypeFlag::DumpDir,
            b'M' => TarTypeFlag::MultiVolumeGnu,
            b'N' => TarTypeFlag::RenamedNameListGnu,
            b'V' => TarTypeFlag::VolumeHeaderGnu,
            other => TarTypeFlag::UnknownTypeFlag(other),
        }
    }
}

impl From<TarTypeFlag> for u8 {
    fn from(value: TarTypeFlag) -> Self {
        match value {
            TarTypeFlag::RegularFile => b'0',
            TarTypeFlag::HardLink => b'1',
            TarTypeFlag::SymbolicLink => b'2',
            TarTypeFlag::CharacterDevice => b'3',
            TarTypeFlag::BlockDevice => b'4',
            TarTypeFlag::Directory => b'5',
            TarTypeFlag::Fifo => b'6',
            TarTypeFlag::ContinuousFile => b'7',
            TarTypeFlag::PaxExtendedHeader => b'x',
            TarTypeFlag::PaxGlobalExtendedHeader => b'g',
            TarTypeFlag::LongNameGnu => b'L',
            TarTypeFlag::LongLinkNameGnu => b'K',
            TarTypeFlag::SparseOldGnu => b'S',
            TarTypeFlag::DumpDir => b'D',
            TarTypeFlag::MultiVolumeGnu => b'M',
            TarTypeFlag::RenamedNameListGnu => b'N',
            TarTypeFlag::VolumeHeaderGnu => b'V',
            TarTypeFlag::UnknownTypeFlag(value) => value,
        }
    }
}

pub(crate) fn find_null_terminator_index(bytes: &[u8]) -> usize {
    bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
}

pub fn parse_null_terminated_str(bytes: &[u8]) -> Result<&str, Utf8Error> {
    let end = find_null_terminator_index(bytes);
    core::str::from_utf8(&bytes[..end])
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderMagicError {
    #[error("unrecognized magic/version bytes: {magic:?}")]
    UnknownMagic { magic: [u8; 8] },
}

/// The historical base layout, shared by every variant's first 345 bytes.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct V7Header {
    pub name_bytes: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub magic_version: [u8; 8],
    /// [`UstarAdditions`], [`GnuAdditions`], or [`StarAdditions`], depending
    /// on `magic_version`; plain zeros for V7.
    pub padding: [u8; 247],
}

impl V7Header {
    pub const MAGIC_VERSION_V7: [u8; 8] = *b"\0\0\0\0\0\0\0\0";
    pub const MAGIC_VERSION_USTAR: [u8; 8] = *b"ustar\x0000";
    pub const MAGIC_VERSION_GNU: [u8; 8] = *b"ustar  \0";

    #[must_use]
    pub fn zeroed() -> Self {
        zerocopy::FromZeros::new_zeroed()
    }

    pub fn parse_name(&self) -> Result<&str, Utf8Error> {
        parse_null_terminated_str(&self.name_bytes)
    }

    pub fn parse_linkname(&self) -> Result<&str, Utf8Error> {
        parse_null_terminated_str(&self.linkname)
    }

    #[must_use]
    pub fn parse_typeflag(&self) -> TarTypeFlag {
        self.typeflag.into()
    }
}

/// Bytes 345..500, shared by ustar, GNU, and STAR.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CommonHeaderAdditions {
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub dev_major: [u8; 8],
    pub dev_minor: [u8; 8],
    /// [`UstarAdditions`] or [`GnuAdditions`].
    pub padding: [u8; 167],
}

impl CommonHeaderAdditions {
    pub fn parse_uname(&self) -> Result<&str, Utf8Error> {
        parse_null_terminated_str(&self.uname)
    }

    pub fn parse_gname(&self) -> Result<&str, Utf8Error> {
        parse_null_terminated_str(&self.gname)
    }
}

/// The trailer used by plain ustar/pax (bytes 500..512 are unused padding).
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct UstarHeaderAdditions {
    pub prefix: [u8; 155],
    pub pad: [u8; 12],
}

impl UstarHeaderAdditions {
    pub fn parse_prefix(&self) -> Result<&str, Utf8Error> {
        parse_null_terminated_str(&self.prefix)
    }
}

/// The trailer used by the STAR format (spec.md §3): a shortened prefix
/// plus an atime/ctime pair.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct StarHeaderAdditions {
    pub prefix: [u8; 131],
    pub atime: [u8; 12],
    pub ctime: [u8; 12],
    pub pad: [u8; 12],
}

impl StarHeaderAdditions {
    pub fn parse_prefix(&self) -> Result<&str, Utf8Error> {
        parse_null_terminated_str(&self.prefix)
    }
}

/// The trailer used by old-GNU and GNU format (bytes 345..500).
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct GnuHeaderAdditions {
    pub atime: [u8; 12],
    pub ctime: [u8; 12],
    pub offset: [u8; 12],
    pub longnames: [u8; 4],
    pub unused: [u8; 1],
    pub sparse: [GnuSparseInstruction; 4],
    pub is_extended: [u8; 1],
    pub real_size: [u8; 12],
    pub padding: [u8; 17],
}

impl GnuHeaderAdditions {
    #[must_use]
    pub fn parse_is_extended(&self) -> bool {
        self.is_extended[0] != 0
    }
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, PartialEq, Eq, Clone, Copy)]
#[repr(C)]
pub struct GnuSparseInstruction {
    pub offset: [u8; 12],
    pub num_bytes: [u8; 12],
}

impl GnuSparseInstruction {
    pub const ZERO: GnuSparseInstruction = GnuSparseInstruction {
        offset: [0; 12],
        num_bytes: [0; 12],
    };

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::ZERO
    }
}

/// A sparse-extension block: 21 additional instructions chained by
/// `is_extended`.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct GnuHeaderExtSparse {
    pub sparse: [GnuSparseInstruction; 21],
    pub is_extended: [u8; 1],
    pub padding: [u8; 7],
}

impl GnuHeaderExtSparse {
    #[must_use]
    pub fn parse_is_extended(&self) -> bool {
        self.is_extended[0] != 0
    }
}

/// Well-known pax key strings (spec.md §4.5, table).
pub mod pax_keys {
    pub const PATH: &str = "path";
    pub const LINKPATH: &str = "linkpath";
    pub const SIZE: &str = "size";
    pub const UID: &str = "uid";
    pub const GID: &str = "gid";
    pub const UNAME: &str = "uname";
    pub const GNAME: &str = "gname";
    pub const ATIME: &str = "atime";
    pub const CTIME: &str = "ctime";
    pub const MTIME: &str = "mtime";
    pub const COMMENT: &str = "comment";
    pub const CHARSET: &str = "charset";

    pub const GNU_SPARSE_SIZE: &str = "GNU.sparse.size";
    pub const GNU_SPARSE_REALSIZE: &str = "GNU.sparse.realsize";
    pub const GNU_SPARSE_NUMBLOCKS: &str = "GNU.sparse.numblocks";
    pub const GNU_SPARSE_OFFSET: &str = "GNU.sparse.offset";
    pub const GNU_SPARSE_NUMBYTES: &str = "GNU.sparse.numbytes";
    pub const GNU_SPARSE_MAP: &str = "GNU.sparse.map";
    pub const GNU_SPARSE_NAME: &str = "GNU.sparse.name";
    pub const GNU_SPARSE_MAJOR: &str = "GNU.sparse.major";
    pub const GNU_SPARSE_MINOR: &str = "GNU.sparse.minor";

    /// Keys delete/override can never touch (spec.md §9, Open Question iii:
    /// the later of the two disagreeing source versions is authoritative).
    pub fn is_protected(key: &str) -> bool {
        key == PATH || key == SIZE || key.starts_with("GNU.sparse.")
    }
}

/// Sentinel name used for `L`/`K` long-name auxiliary headers (spec.md §4.4).
pub const LONG_LINK_SENTINEL_NAME: &str = "././@LongLink";

/// Default extended-header naming templates (spec.md §4.5).
pub const DEFAULT_PAX_LOCAL_TEMPLATE: &str = "././@PaxHeader";
pub const DEFAULT_PAX_GLOBAL_TEMPLATE: &str = "$TMPDIR/GlobalHead.%p.%n";
