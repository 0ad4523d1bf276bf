//! Header builder (spec §4.3 "Builder").
//!
//! The teacher has no writer counterpart (`writer_tar` is commented out in
//! its module tree) — this is built from its data model (constants, the
//! numeric cascade, the pax/sparse codecs) and error/config idioms, written
//! in the same raw-block-buffer style the parser reads back.

use hashbrown::HashMap;

use crate::core::block::{encode_checksum_field, unsigned_checksum, Block, BLOCK_SIZE};
use crate::core::numeric::encode_numeric;
use crate::tar::constants::{pax_keys, TarTypeFlag, LONG_LINK_SENTINEL_NAME};
use crate::tar::entry::{FileKind, LogicalEntry};
use crate::tar::errors::HeaderError;
use crate::tar::options::{BuilderOptions, CodecContext, Format};
use crate::tar::pax::{apply_overrides_and_deletes, encode_payload, format_header_name, format_timestamp};

// Field offsets shared by every layout's first 345 bytes (spec §3).
pub(crate) mod offset {
    pub const NAME: usize = 0;
    pub const MODE: usize = 100;
    pub const UID: usize = 108;
    pub const GID: usize = 116;
    pub const SIZE: usize = 124;
    pub const MTIME: usize = 136;
    pub const CHECKSUM: usize = 148;
    pub const TYPEFLAG: usize = 156;
    pub const LINKNAME: usize = 157;
    pub const MAGIC: usize = 257;
    pub const UNAME: usize = 265;
    pub const GNAME: usize = 297;
    pub const DEV_MAJOR: usize = 329;
    pub const DEV_MINOR: usize = 337;
    pub const USTAR_PREFIX: usize = 345;
    pub const GNU_ATIME: usize = 345;
    pub const GNU_CTIME: usize = 357;
    /// Old-GNU multi-volume continuation offset field (spec §3's
    /// old-GNU layout byte range 369..381); the codec never populates it.
    pub const GNU_OFFSET: usize = 369;
    pub const GNU_SPARSE: usize = 386;
    pub const GNU_IS_EXTENDED: usize = 482;
    pub const GNU_REAL_SIZE: usize = 483;
    pub const STAR_PREFIX: usize = 345;
    pub const STAR_ATIME: usize = 476;
    pub const STAR_CTIME: usize = 488;
}

fn write_str(block: &mut Block, at: usize, width: usize, value: &str) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(width);
    block[at..at + n].copy_from_slice(&bytes[..n]);
}

fn write_field(block: &mut Block, at: usize, width: usize, bytes: &[u8]) {
    block[at..at + width].copy_from_slice(bytes);
}

fn format_magic(format: Format) -> [u8; 8] {
    match format {
        Format::V7 => *b"\0\0\0\0\0\0\0\0",
        Format::OldGnu => *b"ustar  \0",
        Format::Ustar | Format::Gnu | Format::Pax | Format::Star => *b"ustar\x0000",
    }
}

/// Whether `name` contains a `..` component climbing above the archive
/// root (spec §4.3.1, configurable rejection).
fn has_parent_escape(name: &str) -> bool {
    let mut depth: i64 = 0;
    for component in name.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            _ => depth += 1,
        }
    }
    false
}

/// Strips a leading `/` (unless configured to keep it) and validates `..`
/// escapes, returning the normalized name and whether the original name had
/// a trailing slash (spec §4.3.1).
pub fn normalize_name(name: &str, opts: &BuilderOptions) -> Result<(String, bool), HeaderError> {
    let mut normalized = name.to_string();
    if opts.strip_leading_slash {
        while normalized.starts_with('/') {
            normalized.remove(0);
        }
    }
    if let Some(transform) = &opts.name_transform {
        normalized = transform.apply(&normalized);
    }
    let had_trailing_slash = normalized.ends_with('/') && normalized.len() > 1;
    if opts.reject_parent_escape && has_parent_escape(&normalized) {
        return Err(HeaderError::NameEscapeExhausted {
            name: name.to_string(),
            format: "any (rejected: '..' climbs above archive root)",
        });
    }
    Ok((normalized, had_trailing_slash))
}

enum NameEncoding {
    Direct,
    Split { prefix: String, suffix: String },
    LongNameGnu,
    Pax,
}

fn choose_name_encoding(name: &str, format: Format) -> Result<NameEncoding, HeaderError> {
    if name.len() <= 100 {
        return Ok(NameEncoding::Direct);
    }
    if format.supports_prefix_split() {
        let max_prefix = if matches!(format, Format::Star) { 131 } else { 155 };
        if let Some((prefix, suffix)) = split_ustar(name, max_prefix) {
            return Ok(NameEncoding::Split { prefix, suffix });
        }
    }
    if format.supports_long_name_escape() {
        return Ok(NameEncoding::LongNameGnu);
    }
    if format.supports_pax() {
        return Ok(NameEncoding::Pax);
    }
    Err(HeaderError::NameEscapeExhausted { name: name.to_string(), format: format_label(format) })
}

fn split_ustar(name: &str, max_prefix: usize) -> Option<(String, String)> {
    if name.len() > 255 {
        return None;
    }
    let bytes = name.as_bytes();
    let mut best: Option<usize> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'/' {
            continue;
        }
        let prefix_len = i;
        let suffix_len = bytes.len() - i - 1;
        if prefix_len <= max_prefix && suffix_len <= 100 && suffix_len > 0 {
            best = Some(i);
        }
    }
    best.map(|i| (name[..i].to_string(), name[i + 1..].to_string()))
}

fn format_label(format: Format) -> &'static str {
    match format {
        Format::V7 => "v7",
        Format::Ustar => "ustar",
        Format::OldGnu => "old-gnu",
        Format::Gnu => "gnu",
        Format::Pax => "pax",
        Format::Star => "star",
    }
}

/// Builds a long-name (`L`) or long-link (`K`) auxiliary header plus its
/// zero-padded payload (spec §4.4).
fn build_long_name_aux(typeflag: u8, name: &str) -> Vec<u8> {
    let mut payload = name.as_bytes().to_vec();
    payload.push(0);
    let padded_len = crate::core::block::align_to_block(payload.len() as u64) as usize;
    payload.resize(padded_len, 0);

    let mut block = [0u8; BLOCK_SIZE];
    write_str(&mut block, offset::NAME, 100, LONG_LINK_SENTINEL_NAME);
    write_field(&mut block, offset::MODE, 8, &encode_numeric(0, 8, false).unwrap());
    write_field(&mut block, offset::UID, 8, &encode_numeric(0, 8, false).unwrap());
    write_field(&mut block, offset::GID, 8, &encode_numeric(0, 8, false).unwrap());
    write_field(&mut block, offset::SIZE, 12, &encode_numeric((name.len() + 1) as i128, 12, true).unwrap());
    write_field(&mut block, offset::MTIME, 12, &encode_numeric(0, 12, false).unwrap());
    block[offset::TYPEFLAG] = typeflag;
    block[offset::MAGIC..offset::MAGIC + 8].copy_from_slice(&format_magic(Format::Gnu));
    finalize_checksum(&mut block);

    let mut out = Vec::with_capacity(BLOCK_SIZE + payload.len());
    out.extend_from_slice(&block);
    out.extend_from_slice(&payload);
    out
}

/// Builds a pax extended-header (`x`) auxiliary header plus its payload
/// (spec §4.5). `extra_ordered` is appended after the sorted unique
/// attributes without deduplication, for record families spec §4.6
/// legitimately repeats (`GNU.sparse.offset`/`GNU.sparse.numbytes` pairs,
/// one per sparse run) that a `HashMap` cannot represent.
fn build_pax_aux(
    opts: &BuilderOptions,
    dirname: &str,
    basename: &str,
    attrs: &HashMap<String, String>,
    extra_ordered: &[(String, String)],
) -> Vec<u8> {
    let mut sorted: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    sorted.sort_unstable();
    let mut payload = encode_payload(sorted.into_iter());
    for (key, value) in extra_ordered {
        payload.extend(crate::tar::pax::encode_record(key, value));
    }
    let padded_len = crate::core::block::align_to_block(payload.len() as u64) as usize;
    payload.resize(padded_len, 0);

    let header_name = format_header_name(&opts.pax_local_template, dirname, basename, process_id(), None);

    let mut block = [0u8; BLOCK_SIZE];
    write_str(&mut block, offset::NAME, 100, &header_name);
    write_field(&mut block, offset::MODE, 8, &encode_numeric(0o644, 8, false).unwrap());
    write_field(&mut block, offset::UID, 8, &encode_numeric(0, 8, false).unwrap());
    write_field(&mut block, offset::GID, 8, &encode_numeric(0, 8, false).unwrap());
    write_field(&mut block, offset::SIZE, 12, &encode_numeric(payload.len() as i128, 12, true).unwrap());
    write_field(&mut block, offset::MTIME, 12, &encode_numeric(0, 12, false).unwrap());
    block[offset::TYPEFLAG] = TarTypeFlag::PaxExtendedHeader.into();
    block[offset::MAGIC..offset::MAGIC + 8].copy_from_slice(&format_magic(Format::Pax));
    finalize_checksum(&mut block);

    let mut out = Vec::with_capacity(BLOCK_SIZE + payload.len());
    out.extend_from_slice(&block);
    out.extend_from_slice(&payload);
    out
}

fn process_id() -> u32 {
    std::process::id()
}

fn finalize_checksum(block: &mut Block) {
    let sum = unsigned_checksum(block);
    let field = encode_checksum_field(sum);
    block[offset::CHECKSUM..offset::CHECKSUM + 8].copy_from_slice(&field);
}

/// Encodes one numeric field, falling back from octal to base-256 (if the
/// format allows) to a pax-promoted substitute (if the format allows),
/// exactly the cascade spec §4.2 describes.
fn encode_field_with_escape(
    value: i128,
    width: usize,
    format: Format,
    pax_key: &str,
    substitute: i128,
    field_context: crate::tar::errors::CorruptFieldContext,
    pax_attrs: &mut HashMap<String, String>,
) -> Result<Vec<u8>, HeaderError> {
    match encode_numeric(value, width, format.supports_base256()) {
        Ok(bytes) => Ok(bytes),
        Err(_) if format.supports_pax() => {
            pax_attrs.insert(pax_key.to_string(), value.to_string());
            Ok(encode_numeric(substitute, width, false).expect("substitute always fits"))
        }
        Err(source) => Err(HeaderError::CorruptField { field: field_context, source }),
    }
}

/// Builds the auxiliary records plus the main header block for `entry`,
/// ready to be followed on the wire by the entry's data payload. Does not
/// write the payload itself — see [`crate::tar::sparse`] for sparse payload
/// writing, [`crate::tar::snapshot::encode_dumpdir`] for a dumpdir entry's
/// payload, or copy raw bytes directly for a regular file.
pub fn build_entry(ctx: &CodecContext, entry: &LogicalEntry, sequence: u32) -> Result<Vec<u8>, HeaderError> {
    let opts = &ctx.builder;
    let (name, _had_trailing_slash) = normalize_name(entry.name.as_str(), opts)?;
    let mut out = Vec::new();
    let mut pax_attrs: HashMap<String, String> = HashMap::new();

    let name_encoding = choose_name_encoding(&name, opts.format)?;
    if let NameEncoding::Pax = name_encoding {
        pax_attrs.insert(pax_keys::PATH.to_string(), name.clone());
    }
    if let NameEncoding::LongNameGnu = name_encoding {
        out.extend(build_long_name_aux(TarTypeFlag::LongNameGnu.into(), &name));
    }

    let link_target = link_target_of(entry);
    let link_encoding = match &link_target {
        Some(target) => Some(choose_name_encoding(target, opts.format)?),
        None => None,
    };
    if let (Some(NameEncoding::Pax), Some(target)) = (&link_encoding, &link_target) {
        pax_attrs.insert(pax_keys::LINKPATH.to_string(), target.clone());
    }
    if let (Some(NameEncoding::LongNameGnu), Some(target)) = (&link_encoding, &link_target) {
        out.extend(build_long_name_aux(TarTypeFlag::LongLinkNameGnu.into(), target));
    }

    use crate::tar::errors::CorruptFieldContext;
    let mode_bytes = encode_field_with_escape(
        i128::from(entry.permissions.to_mode()),
        8,
        opts.format,
        "SCHILY.mode",
        0,
        CorruptFieldContext::HeaderMode,
        &mut pax_attrs,
    )?;
    let uid_bytes = encode_field_with_escape(
        i128::from(entry.uid),
        8,
        opts.format,
        pax_keys::UID,
        nobody_id(),
        CorruptFieldContext::HeaderUid,
        &mut pax_attrs,
    )?;
    let gid_bytes = encode_field_with_escape(
        i128::from(entry.gid),
        8,
        opts.format,
        pax_keys::GID,
        nobody_id(),
        CorruptFieldContext::HeaderGid,
        &mut pax_attrs,
    )?;
    let size_bytes = encode_field_with_escape(
        i128::from(entry.size),
        12,
        opts.format,
        pax_keys::SIZE,
        0,
        CorruptFieldContext::HeaderSize,
        &mut pax_attrs,
    )?;
    let mtime_bytes = encode_field_with_escape(
        i128::from(entry.mtime.seconds_since_epoch),
        12,
        opts.format,
        pax_keys::MTIME,
        0,
        CorruptFieldContext::HeaderMtime,
        &mut pax_attrs,
    )?;
    if entry.mtime.nanoseconds != 0 && opts.format != Format::Gnu && opts.format != Format::OldGnu {
        pax_attrs.insert(pax_keys::MTIME.to_string(), format_timestamp(entry.mtime));
    }

    // Only pax has a field for atime/ctime outside GNU/old-GNU/STAR's own
    // trailer fields, so it's the only format that needs them promoted.
    if opts.format.supports_pax() {
        if let Some(atime) = entry.atime {
            pax_attrs.insert(pax_keys::ATIME.to_string(), format_timestamp(atime));
        }
        if let Some(ctime) = entry.ctime {
            pax_attrs.insert(pax_keys::CTIME.to_string(), format_timestamp(ctime));
        }
    }

    apply_overrides_and_deletes(&mut pax_attrs, &opts.pax_overrides, &opts.pax_deletes);

    // Sparse files (spec §4.6 "Encoding"): GNU/old-GNU get an inline
    // descriptor set (plus chained extension blocks past four runs) and
    // typeflag `S`; pax gets a 0.0-style extended-header record set
    // instead, since a repeated-key record family round-trips through the
    // wire format even though it cannot live in a `HashMap`.
    let mut pax_sparse_records = Vec::new();
    if let Some(map) = &entry.sparse_map {
        if opts.format.supports_pax() {
            pax_attrs.insert(pax_keys::GNU_SPARSE_SIZE.to_string(), entry.real_size.to_string());
            pax_attrs.insert(pax_keys::GNU_SPARSE_NUMBLOCKS.to_string(), map.len().to_string());
            pax_sparse_records = crate::tar::sparse::encode_pax_0_0(map);
        }
    }

    if (!pax_attrs.is_empty() || !pax_sparse_records.is_empty()) && opts.format.supports_pax() {
        let (dirname, basename) = split_for_template(&name);
        out.extend(build_pax_aux(opts, dirname, basename, &pax_attrs, &pax_sparse_records));
    }
    let _ = sequence;

    let mut block = [0u8; BLOCK_SIZE];
    match &name_encoding {
        NameEncoding::Split { prefix, suffix } => {
            write_str(&mut block, offset::NAME, 100, suffix);
            write_str(&mut block, offset::USTAR_PREFIX, 155, prefix);
        }
        _ => write_str(&mut block, offset::NAME, 100, truncate(&name, 100)),
    }
    write_field(&mut block, offset::MODE, 8, &mode_bytes);
    write_field(&mut block, offset::UID, 8, &uid_bytes);
    write_field(&mut block, offset::GID, 8, &gid_bytes);
    write_field(&mut block, offset::SIZE, 12, &size_bytes);
    write_field(&mut block, offset::MTIME, 12, &mtime_bytes);
    let is_gnu_sparse = entry.sparse_map.is_some() && matches!(opts.format, Format::Gnu | Format::OldGnu);
    block[offset::TYPEFLAG] = if is_gnu_sparse { TarTypeFlag::SparseOldGnu.into() } else { entry.kind.type_flag().into() };
    if let Some(target) = &link_target {
        write_str(&mut block, offset::LINKNAME, 100, truncate(target, 100));
    }
    block[offset::MAGIC..offset::MAGIC + 8].copy_from_slice(&format_magic(opts.format));
    if opts.format != Format::V7 {
        write_str(&mut block, offset::UNAME, 32, &entry.uname);
        write_str(&mut block, offset::GNAME, 32, &entry.gname);
        if let FileKind::CharacterDevice { major, minor } | FileKind::BlockDevice { major, minor } = &entry.kind {
            write_field(&mut block, offset::DEV_MAJOR, 8, &encode_numeric(i128::from(*major), 8, false).unwrap());
            write_field(&mut block, offset::DEV_MINOR, 8, &encode_numeric(i128::from(*minor), 8, false).unwrap());
        }
    }
    match opts.format {
        Format::Gnu | Format::OldGnu => {
            if let Some(atime) = entry.atime {
                write_field(&mut block, offset::GNU_ATIME, 12, &encode_numeric(i128::from(atime.seconds_since_epoch), 12, true).unwrap());
            }
            if let Some(ctime) = entry.ctime {
                write_field(&mut block, offset::GNU_CTIME, 12, &encode_numeric(i128::from(ctime.seconds_since_epoch), 12, true).unwrap());
            }
        }
        Format::Star => {
            if let Some(atime) = entry.atime {
                write_field(&mut block, offset::STAR_ATIME, 12, &encode_numeric(i128::from(atime.seconds_since_epoch), 12, true).unwrap());
            }
            if let Some(ctime) = entry.ctime {
                write_field(&mut block, offset::STAR_CTIME, 12, &encode_numeric(i128::from(ctime.seconds_since_epoch), 12, true).unwrap());
            }
        }
        _ => {}
    }

    let mut extension_blocks: Vec<[u8; BLOCK_SIZE]> = Vec::new();
    if is_gnu_sparse {
        let map = entry.sparse_map.as_ref().expect("is_gnu_sparse implies sparse_map is Some");
        write_field(&mut block, offset::GNU_REAL_SIZE, 12, &encode_numeric(i128::from(entry.real_size), 12, true).unwrap());
        let (inline, extensions) = crate::tar::sparse::encode_old_gnu(map);
        for (i, instr) in inline.iter().enumerate() {
            let at = offset::GNU_SPARSE + i * 24;
            write_field(&mut block, at, 12, &instr.offset);
            write_field(&mut block, at + 12, 12, &instr.num_bytes);
        }
        block[offset::GNU_IS_EXTENDED] = u8::from(!extensions.is_empty());
        for (block_idx, chunk) in extensions.iter().enumerate() {
            let mut ext_block = [0u8; BLOCK_SIZE];
            for (i, instr) in chunk.iter().enumerate() {
                let at = i * 24;
                ext_block[at..at + 12].copy_from_slice(&instr.offset);
                ext_block[at + 12..at + 24].copy_from_slice(&instr.num_bytes);
            }
            if block_idx + 1 < extensions.len() {
                ext_block[21 * 24] = 1;
            }
            extension_blocks.push(ext_block);
        }
    }

    finalize_checksum(&mut block);
    out.extend_from_slice(&block);
    for ext_block in &extension_blocks {
        out.extend_from_slice(ext_block);
    }
    Ok(out)
}

fn nobody_id() -> i128 {
    // "id of the user nobody if available, else -2" (spec §4.2). The codec
    // has no syscall access, so it always uses -2 and lets a caller that
    // knows the real nobody uid/gid override it via pax_overrides.
    -2
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        &s[..max]
    }
}

fn link_target_of(entry: &LogicalEntry) -> Option<String> {
    match &entry.kind {
        FileKind::HardLink { target } | FileKind::SymbolicLink { target } => Some(target.as_str().to_string()),
        _ => None,
    }
}

fn split_for_template(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => ("", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tar::entry::{FilePermissions, TimeStamp};
    use relative_path::RelativePathBuf;

    fn simple_entry(name: &str, size: u64) -> LogicalEntry {
        LogicalEntry {
            original_name: name.to_string(),
            name: RelativePathBuf::from(name),
            had_trailing_slash: false,
            kind: FileKind::RegularFile,
            permissions: FilePermissions::from_mode(0o644),
            uid: 1000,
            gid: 1000,
            uname: "user".into(),
            gname: "user".into(),
            size,
            mtime: TimeStamp::from_seconds(1_700_000_000),
            atime: None,
            ctime: None,
            sparse_map: None,
            real_size: size,
            unrecognized_pax_attributes: Default::default(),
        }
    }

    #[test]
    fn simple_entry_emits_one_header_block_with_valid_checksum() {
        let ctx = CodecContext::default();
        let entry = simple_entry("a.txt", 6);
        let bytes = build_entry(&ctx, &entry, 0).unwrap();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&bytes);
        let checksum_field = &block[offset::CHECKSUM..offset::CHECKSUM + 8];
        let declared = crate::core::decode_numeric(checksum_field).unwrap();
        assert_eq!(declared as u64, unsigned_checksum(&block));
    }

    #[test]
    fn gnu_format_emits_long_name_aux_for_oversize_name() {
        let mut ctx = CodecContext::default();
        ctx.builder.format = Format::Gnu;
        let long_name = "x".repeat(300);
        let entry = simple_entry(&long_name, 0);
        let bytes = build_entry(&ctx, &entry, 0).unwrap();
        assert!(bytes.len() > BLOCK_SIZE);
        assert_eq!(bytes[offset::TYPEFLAG], b'L');
        assert_eq!(&bytes[offset::NAME..offset::NAME + LONG_LINK_SENTINEL_NAME.len()], LONG_LINK_SENTINEL_NAME.as_bytes());
    }

    #[test]
    fn pax_format_promotes_oversize_uid_to_extended_header() {
        let mut ctx = CodecContext::default();
        ctx.builder.format = Format::Pax;
        let mut entry = simple_entry("a.txt", 6);
        entry.uid = 3_000_000_000;
        let bytes = build_entry(&ctx, &entry, 0).unwrap();
        assert_eq!(bytes[offset::TYPEFLAG], b'x');
        let payload_start = BLOCK_SIZE;
        let payload_end = bytes.len() - BLOCK_SIZE;
        let payload = &bytes[payload_start..payload_end];
        let text = core::str::from_utf8(payload).unwrap();
        assert!(text.contains("uid=3000000000"));
    }

    #[test]
    fn name_transform_rewrites_the_name_before_header_encoding() {
        let mut ctx = CodecContext::default();
        ctx.builder.name_transform = Some(crate::tar::transform::Transform::parse("s/^old/new/").unwrap());
        let entry = simple_entry("old/file.txt", 0);
        let bytes = build_entry(&ctx, &entry, 0).unwrap();
        let name_field = &bytes[offset::NAME..offset::NAME + 100];
        let name = crate::tar::constants::parse_null_terminated_str(name_field).unwrap();
        assert_eq!(name, "new/file.txt");
    }

    #[test]
    fn gnu_sparse_entry_gets_sparse_typeflag_and_real_size() {
        let mut ctx = CodecContext::default();
        ctx.builder.format = Format::Gnu;
        let mut entry = simple_entry("sparse.bin", 4);
        entry.sparse_map = Some(vec![crate::tar::entry::SparseRun { offset: 4_194_304, num_bytes: 4 }]);
        entry.real_size = 10_485_760;
        let bytes = build_entry(&ctx, &entry, 0).unwrap();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        assert_eq!(bytes[offset::TYPEFLAG], b'S');
        let real_size = crate::core::decode_numeric(&bytes[offset::GNU_REAL_SIZE..offset::GNU_REAL_SIZE + 12]).unwrap();
        assert_eq!(real_size as u64, 10_485_760);
        let sparse_offset = crate::core::decode_numeric(&bytes[offset::GNU_SPARSE..offset::GNU_SPARSE + 12]).unwrap();
        assert_eq!(sparse_offset as u64, 4_194_304);
    }

    #[test]
    fn pax_sparse_entry_emits_ordered_offset_numbytes_records() {
        let mut ctx = CodecContext::default();
        ctx.builder.format = Format::Pax;
        let mut entry = simple_entry("sparse.bin", 4);
        entry.sparse_map = Some(vec![crate::tar::entry::SparseRun { offset: 100, num_bytes: 4 }]);
        entry.real_size = 1000;
        let bytes = build_entry(&ctx, &entry, 0).unwrap();
        assert_eq!(bytes[offset::TYPEFLAG], b'x');
        let payload = &bytes[BLOCK_SIZE..bytes.len() - BLOCK_SIZE];
        let text = core::str::from_utf8(payload).unwrap();
        assert!(text.contains("GNU.sparse.size=1000"));
        assert!(text.contains("GNU.sparse.numblocks=1"));
        assert!(text.contains("GNU.sparse.offset=100"));
        assert!(text.contains("GNU.sparse.numbytes=4"));
    }
}
