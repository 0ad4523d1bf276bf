//! Error taxonomy and violation handling (spec §7; SPEC_FULL §A).
//!
//! Mirrors the teacher's `TarParserErrorKind` / `CorruptFieldContext` /
//! `ErrorSeverity` split, generalized to cover the builder as well as the
//! parser and to carry the archive-offset/member-name context spec.md §7
//! requires in every diagnostic.

use core::fmt;

use thiserror::Error;

use crate::core::NumericError;

/// Byte offset (in records, per spec.md §7) at which an error was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchivePosition {
    pub record: u64,
    pub block_in_record: u32,
}

impl fmt::Display for ArchivePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}, block {}", self.record, self.block_in_record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptFieldContext {
    HeaderSize,
    HeaderName,
    HeaderMode,
    HeaderUid,
    HeaderGid,
    HeaderMtime,
    HeaderLinkname,
    HeaderUname,
    HeaderGname,
    HeaderDevMajor,
    HeaderDevMinor,
    HeaderAtime,
    HeaderCtime,
    HeaderRealSize,
    HeaderPrefix,
    HeaderChecksum,
    SparseNumberOfMaps,
    SparseMapOffset,
    SparseMapSize,
    PaxRecordLength,
    PaxRecordKey,
    PaxRecordValue,
}

impl fmt::Display for CorruptFieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HeaderSize => "header.size",
            Self::HeaderName => "header.name",
            Self::HeaderMode => "header.mode",
            Self::HeaderUid => "header.uid",
            Self::HeaderGid => "header.gid",
            Self::HeaderMtime => "header.mtime",
            Self::HeaderLinkname => "header.linkname",
            Self::HeaderUname => "header.uname",
            Self::HeaderGname => "header.gname",
            Self::HeaderDevMajor => "header.dev_major",
            Self::HeaderDevMinor => "header.dev_minor",
            Self::HeaderAtime => "header.atime",
            Self::HeaderCtime => "header.ctime",
            Self::HeaderRealSize => "header.real_size",
            Self::HeaderPrefix => "header.prefix",
            Self::HeaderChecksum => "header.checksum",
            Self::SparseNumberOfMaps => "sparse.number_of_maps",
            Self::SparseMapOffset => "sparse.map_entry.offset",
            Self::SparseMapSize => "sparse.map_entry.size",
            Self::PaxRecordLength => "pax.length_field",
            Self::PaxRecordKey => "pax.key_field",
            Self::PaxRecordValue => "pax.value_field",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("unrecognized magic/version bytes: {magic:?}")]
    UnknownMagicVersion { magic: [u8; 8] },
    #[error("corrupt header: checksum mismatch, expected {expected} got {actual}")]
    ChecksumMismatch { expected: u64, actual: u64 },
    #[error("parsing field {field} failed: {source}")]
    CorruptField {
        field: CorruptFieldContext,
        #[source]
        source: NumericError,
    },
    #[error("name {name:?} cannot be encoded in format {format}: no escape mechanism available")]
    NameEscapeExhausted { name: String, format: &'static str },
    #[error("unexpected end of archive mid-entry")]
    UnexpectedEof,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaxError {
    #[error("malformed extended header: missing equal sign")]
    MissingEqualSign,
    #[error("malformed extended header: length field is not decimal")]
    BadLengthField,
    #[error("malformed extended header: declared length {declared} does not match record")]
    LengthMismatch { declared: usize },
    #[error("key {key:?} is protected and cannot be deleted or overridden")]
    ProtectedKey { key: String },
    #[error("timestamp key {key:?} has a malformed fractional part")]
    BadTimestamp { key: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SparseError {
    #[error("invalid sparse archive member: offset {offset} is negative")]
    NegativeOffset { offset: i128 },
    #[error("invalid sparse archive member: offset {offset} + size {size} exceeds real size {real_size}")]
    RunExceedsRealSize { offset: u64, size: u64, real_size: u64 },
    #[error("invalid sparse archive member: archive file size is negative")]
    NegativeArchiveSize,
    #[error("too many sparse file instructions (limit {limit})")]
    TooManyInstructions { limit: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("malformed snapshot header line")]
    BadHeaderLine,
    #[error("malformed snapshot timestamp line")]
    BadTimestampLine,
    #[error("malformed snapshot directory record: {0:?}")]
    BadDirectoryRecord(String),
    #[error("invalid escape sequence in snapshot name")]
    BadEscape,
}

/// The umbrella error returned by most public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{0}")]
    Header(#[from] HeaderError),
    #[error("{0}")]
    Pax(#[from] PaxError),
    #[error("{0}")]
    Sparse(#[from] SparseError),
    #[error("{0}")]
    Snapshot(#[from] SnapshotError),
    #[error("{0}")]
    Numeric(#[from] NumericError),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(value: std::io::Error) -> Self {
        CodecError::Io(value.to_string())
    }
}

/// Whether a format violation should abort the current entry or be
/// absorbed so the scan can continue (spec §7 propagation policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Fatal,
    Recoverable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub error: CodecError,
    pub severity: ErrorSeverity,
    pub position: ArchivePosition,
    pub member_name: Option<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.error, self.position)?;
        if let Some(name) = &self.member_name {
            write!(f, " (member {name:?})")?;
        }
        Ok(())
    }
}

/// Decides whether a recoverable violation aborts the current entry or is
/// absorbed and scanning continues. Mirrors the teacher's
/// `TarViolationHandler` three-way split (`Strict`/`Collecting`/`Ignoring`).
pub trait ViolationHandler {
    /// Returns `true` if parsing should continue. A `Fatal` violation may
    /// still end parsing even if this returns `true`.
    fn handle(&mut self, violation: Violation) -> bool;
}

pub struct StrictViolationHandler;

impl ViolationHandler for StrictViolationHandler {
    fn handle(&mut self, _violation: Violation) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct CollectingViolationHandler {
    pub violations: Vec<Violation>,
}

impl CollectingViolationHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViolationHandler for CollectingViolationHandler {
    fn handle(&mut self, violation: Violation) -> bool {
        self.violations.push(violation);
        true
    }
}

#[derive(Debug, Default)]
pub struct IgnoringViolationHandler;

impl ViolationHandler for IgnoringViolationHandler {
    fn handle(&mut self, _violation: Violation) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_handler_always_stops() {
        let mut handler = StrictViolationHandler;
        let v = Violation {
            error: CodecError::Header(HeaderError::UnexpectedEof),
            severity: ErrorSeverity::Recoverable,
            position: ArchivePosition::default(),
            member_name: None,
        };
        assert!(!handler.handle(v));
    }

    #[test]
    fn collecting_handler_records_and_continues() {
        let mut handler = CollectingViolationHandler::new();
        let v = Violation {
            error: CodecError::Header(HeaderError::UnexpectedEof),
            severity: ErrorSeverity::Recoverable,
            position: ArchivePosition { record: 3, block_in_record: 1 },
            member_name: Some("a.txt".into()),
        };
        assert!(handler.handle(v));
        assert_eq!(handler.violations.len(), 1);
    }
}
