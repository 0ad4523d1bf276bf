//! Streaming codec for the tar family of archive formats (V7, USTAR,
//! old-GNU, GNU, POSIX pax, STAR).
//!
//! [`core`] holds the leaf-level primitives (block framing, checksums, the
//! numeric field cascade) shared by every header layout. [`tar`] builds on
//! them: header construction and parsing, pax extended headers, sparse
//! files, compare/diff, hard-link dedup, the incremental-snapshot protocol,
//! and the name transform language. Filesystem traversal, option parsing,
//! and transport I/O are left to the caller; this crate only turns file
//! descriptions into archive bytes and back.

pub mod core;
pub mod tar;

pub use crate::core::{
    align_to_block, blocks_for, encode_checksum_field, is_zero_block, signed_checksum,
    unsigned_checksum, Block, BLOCK_SIZE, CHECKSUM_FIELD, DEFAULT_BLOCKING_FACTOR, ZERO_BLOCK,
};
pub use crate::core::{decode_numeric, encode_numeric, NumericError};
pub use crate::tar::*;
