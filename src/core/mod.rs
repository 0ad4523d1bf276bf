//! Leaf-level codec primitives shared by every header format: block framing,
//! checksums, and the numeric field cascade. Nothing in this module knows
//! about tar header layouts.

pub mod block;
pub mod numeric;

pub use block::{
    align_to_block, blocks_for, encode_checksum_field, is_zero_block, signed_checksum,
    unsigned_checksum, Block, BLOCK_SIZE, CHECKSUM_FIELD, DEFAULT_BLOCKING_FACTOR, ZERO_BLOCK,
};
pub use numeric::{decode_numeric, encode_numeric, NumericError};
