//! Tar header family: header layouts, numeric-field-aware builder/parser,
//! pax extended headers, sparse-file codecs, compare/diff, hard-link
//! dedup, and the snapshot/transform companions.

pub mod builder;
pub mod confident;
pub mod constants;
pub mod diff;
pub mod entry;
pub mod errors;
pub mod linkdedup;
pub mod options;
pub mod parser;
pub mod pax;
pub mod snapshot;
pub mod sparse;
pub mod transform;

pub use builder::{build_entry, normalize_name};
pub use confident::{Confidence, ConfidentValue};
pub use constants::{
    CommonHeaderAdditions, GnuHeaderAdditions, GnuHeaderExtSparse, GnuSparseInstruction,
    HeaderMagicError, StarHeaderAdditions, TarTypeFlag, UstarHeaderAdditions, V7Header,
};
pub use diff::{diff_entry, LiveStat, Mismatch};
pub use entry::{
    DumpDirEntry, DumpDirStatus, FileKind, FilePermissions, LogicalEntry, Permission, SparseMap,
    SparseRun, TimeStamp,
};
pub use errors::{
    ArchivePosition, CodecError, CollectingViolationHandler, CorruptFieldContext, ErrorSeverity,
    HeaderError, IgnoringViolationHandler, PaxError, SnapshotError, SparseError,
    StrictViolationHandler, Violation, ViolationHandler,
};
pub use linkdedup::{DeviceInode, LinkDedupTable};
pub use options::{BuilderOptions, CodecContext, Format, ParserLimits, ParserOptions};
pub use parser::{ParsedEntry, TarParser};
pub use pax::{PaxOverride, PaxPattern};
pub use snapshot::{escape_name, unescape_name, DirectoryDecision, Snapshot, SnapshotDirectory};
pub use sparse::SparseFormat;
pub use transform::Transform;
