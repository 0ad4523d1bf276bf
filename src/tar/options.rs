//! Configuration and the `CodecContext` (spec §9 "Global mutable state").
//!
//! The original keeps format choice, limits, and the pax override/delete
//! lists as module-level flags. Here they are collected into a single value
//! threaded explicitly through builder and parser calls; nothing in this
//! crate holds process-wide mutable state.

use hashbrown::HashMap;

use crate::tar::pax::{PaxOverride, PaxPattern};
use crate::tar::transform::Transform;

/// Which on-disk layout a header should be written as, or was detected as
/// on read (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    V7,
    Ustar,
    OldGnu,
    Gnu,
    Pax,
    Star,
}

impl Format {
    #[must_use]
    pub fn supports_long_name_escape(&self) -> bool {
        matches!(self, Format::OldGnu | Format::Gnu)
    }

    #[must_use]
    pub fn supports_pax(&self) -> bool {
        matches!(self, Format::Pax)
    }

    #[must_use]
    pub fn supports_base256(&self) -> bool {
        matches!(self, Format::OldGnu | Format::Gnu)
    }

    #[must_use]
    pub fn supports_prefix_split(&self) -> bool {
        matches!(self, Format::Ustar | Format::Pax | Format::Star)
    }
}

/// Bounds on allocation while parsing untrusted archives, mirroring the
/// teacher's `TarParserLimits`.
#[derive(Debug, Clone)]
pub struct ParserLimits {
    pub max_sparse_instructions: usize,
    pub max_pax_key_value_len: usize,
    pub max_global_attributes: usize,
    pub max_name_len: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_sparse_instructions: 2048,
            max_pax_key_value_len: 1024 * 8,
            max_global_attributes: 1024,
            max_name_len: 1024 * 64,
        }
    }
}

/// Reader-side behavior toggles (spec §4.1, §4.3 "lenient" resync; §4.7
/// ignore-zero-blocks mode).
#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// If set, a single zero block between headers is skipped silently
    /// instead of reported as a warning and scanning continues past it
    /// looking for more entries (spec §4.1).
    pub ignore_zero_blocks: bool,
    /// If set, a header that fails checksum validation triggers forward
    /// resynchronization to the next block that validates, instead of being
    /// a hard parse error (spec §4.3 "FailedHeader").
    pub lenient_resync: bool,
    pub limits: ParserLimits,
    pub initial_global_pax_attributes: HashMap<String, String>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            ignore_zero_blocks: false,
            lenient_resync: true,
            limits: ParserLimits::default(),
            initial_global_pax_attributes: HashMap::new(),
        }
    }
}

/// Writer-side behavior toggles (spec §4.3 name normalization, §4.5 naming
/// templates).
#[derive(Debug, Clone)]
pub struct BuilderOptions {
    pub format: Format,
    /// Number of blocks per physical record (spec §3; default 20).
    pub blocking_factor: usize,
    /// Strip a leading `/` from names instead of preserving it.
    pub strip_leading_slash: bool,
    /// Reject `..` path components that climb above the archive root.
    pub reject_parent_escape: bool,
    pub pax_local_template: String,
    pub pax_global_template: String,
    pub pax_overrides: Vec<PaxOverride>,
    pub pax_deletes: Vec<PaxPattern>,
    /// A compiled `s/REGEX/REPLACE/FLAGS` expression applied to every name
    /// during normalization, mirroring `--transform` (spec.md §6).
    pub name_transform: Option<Transform>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            format: Format::Pax,
            blocking_factor: crate::core::DEFAULT_BLOCKING_FACTOR,
            strip_leading_slash: true,
            reject_parent_escape: true,
            pax_local_template: crate::tar::constants::DEFAULT_PAX_LOCAL_TEMPLATE.to_string(),
            pax_global_template: crate::tar::constants::DEFAULT_PAX_GLOBAL_TEMPLATE.to_string(),
            pax_overrides: Vec::new(),
            pax_deletes: Vec::new(),
            name_transform: None,
        }
    }
}

/// The single value everything threads through; owns the link-dedup and
/// snapshot tables so they are freed together when the context drops
/// (spec §9 "Hash tables").
pub struct CodecContext {
    pub builder: BuilderOptions,
    pub parser: ParserOptions,
    pub link_dedup: crate::tar::linkdedup::LinkDedupTable,
    pub snapshot: crate::tar::snapshot::Snapshot,
}

impl CodecContext {
    #[must_use]
    pub fn new(builder: BuilderOptions, parser: ParserOptions) -> Self {
        Self {
            builder,
            parser,
            link_dedup: crate::tar::linkdedup::LinkDedupTable::new(),
            snapshot: crate::tar::snapshot::Snapshot::default(),
        }
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::new(BuilderOptions::default(), ParserOptions::default())
    }
}
