//! Sparse-file codec (spec §4.6).
//!
//! Four on-disk encodings exist for the same logical `SparseMap`: old-GNU
//! inline descriptors (plus chained extension blocks), and three pax
//! variants (1.0 stores the map in the data section; 0.1 stores it as a
//! single comma-separated record; 0.0 stores it as a repeated sequence of
//! `offset`/`numbytes` record pairs). This module only packs/unpacks maps;
//! it never touches a filesystem (that remains the caller's job per
//! spec.md §1's non-goals).

use std::io::{Read, Write};

use crate::core::block::{align_to_block, BLOCK_SIZE};
use crate::tar::constants::{GnuHeaderExtSparse, GnuSparseInstruction};
use crate::tar::entry::{SparseMap, SparseRun};
use crate::tar::errors::SparseError;
use crate::tar::options::ParserLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseFormat {
    GnuOld,
    Gnu0_0,
    Gnu0_1,
    Gnu1_0,
}

impl SparseFormat {
    #[must_use]
    pub fn major_minor(self) -> (u32, u32) {
        match self {
            SparseFormat::GnuOld | SparseFormat::Gnu0_0 => (0, 0),
            SparseFormat::Gnu0_1 => (0, 1),
            SparseFormat::Gnu1_0 => (1, 0),
        }
    }

    #[must_use]
    pub fn from_major_minor(major: u32, minor: u32) -> Option<Self> {
        match (major, minor) {
            (0, 0) => Some(SparseFormat::Gnu0_0),
            (0, 1) => Some(SparseFormat::Gnu0_1),
            (1, 0) => Some(SparseFormat::Gnu1_0),
            _ => None,
        }
    }
}

/// Validates a decoded sparse map against its declared sizes (spec §4.6
/// "Failure modes").
pub fn validate_sparse_map(map: &SparseMap, real_size: u64, archive_size: i128) -> Result<(), SparseError> {
    if archive_size < 0 {
        return Err(SparseError::NegativeArchiveSize);
    }
    for run in map {
        if run.offset.checked_add(run.num_bytes).map_or(true, |end| end > real_size) {
            return Err(SparseError::RunExceedsRealSize {
                offset: run.offset,
                size: run.num_bytes,
                real_size,
            });
        }
    }
    Ok(())
}

/// Scans `source` for runs of non-zero, block-sized chunks and coalesces
/// them into a sparse map (spec §4.6 "Dump path").
///
/// If `bug_for_bug_empty_sentinel` is set, an entirely-zero file produces
/// the historical sentinel run `(size-1, 1)` instead of an empty map, for
/// interoperating with readers that assume at least one run exists
/// (spec §9, Open Question ii).
pub fn dump_sparse_map(
    mut source: impl Read,
    file_size: u64,
    bug_for_bug_empty_sentinel: bool,
) -> std::io::Result<SparseMap> {
    let mut map = SparseMap::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut offset = 0u64;
    let mut run_start: Option<u64> = None;

    loop {
        let read = read_full_or_partial(&mut source, &mut buf)?;
        if read == 0 {
            break;
        }
        let chunk = &buf[..read];
        if chunk.iter().all(|&b| b == 0) {
            if let Some(start) = run_start.take() {
                map.push(SparseRun { offset: start, num_bytes: offset - start });
            }
        } else if run_start.is_none() {
            run_start = Some(offset);
        }
        offset += read as u64;
    }
    if let Some(start) = run_start {
        map.push(SparseRun { offset: start, num_bytes: offset - start });
    }

    if map.is_empty() && file_size > 0 && bug_for_bug_empty_sentinel {
        map.push(SparseRun { offset: file_size - 1, num_bytes: 1 });
    }
    Ok(map)
}

fn read_full_or_partial(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = source.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    if total < buf.len() {
        buf[total..].fill(0);
    }
    Ok(total)
}

/// Copies the payload for each run in `map` from `source` (assumed
/// positioned so that a caller's own seek already placed it at each run's
/// offset before calling) into `dest`, per-run, zero-padding only the final
/// partial block (spec §4.6 "Payload").
pub fn write_sparse_payload(
    mut source: impl Read + std::io::Seek,
    mut dest: impl Write,
    map: &SparseMap,
) -> std::io::Result<()> {
    let total_data: u64 = map.iter().map(|r| r.num_bytes).sum();
    let mut written = 0u64;
    for run in map {
        source.seek(std::io::SeekFrom::Start(run.offset))?;
        let mut remaining = run.num_bytes;
        let mut buf = vec![0u8; BLOCK_SIZE];
        while remaining > 0 {
            let want = remaining.min(BLOCK_SIZE as u64) as usize;
            source.read_exact(&mut buf[..want])?;
            dest.write_all(&buf[..want])?;
            remaining -= want as u64;
            written += want as u64;
        }
    }
    let padded = align_to_block(total_data);
    if padded > written {
        dest.write_all(&vec![0u8; (padded - written) as usize])?;
    }
    Ok(())
}

/// Materializes a sparse file from its map and archived payload, truncating
/// holes in between to zero (spec §4.6 "Extract path").
pub fn extract_sparse_payload(
    mut archive_data: impl Read,
    mut dest: impl Write + std::io::Seek,
    map: &SparseMap,
    real_size: u64,
) -> std::io::Result<()> {
    dest.seek(std::io::SeekFrom::Start(0))?;
    dest.set_len_if_supported(real_size)?;
    for run in map {
        dest.seek(std::io::SeekFrom::Start(run.offset))?;
        let mut remaining = run.num_bytes;
        let mut buf = vec![0u8; BLOCK_SIZE];
        while remaining > 0 {
            let want = remaining.min(BLOCK_SIZE as u64) as usize;
            archive_data.read_exact(&mut buf[..want])?;
            dest.write_all(&buf[..want])?;
            remaining -= want as u64;
        }
    }
    Ok(())
}

/// Extension trait so `extract_sparse_payload` can truncate/extend a
/// generic `Write + Seek` destination without requiring callers to hand in
/// a concrete `File`.
pub trait SetLenIfSupported {
    fn set_len_if_supported(&mut self, len: u64) -> std::io::Result<()>;
}

impl SetLenIfSupported for std::fs::File {
    fn set_len_if_supported(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

impl SetLenIfSupported for std::io::Cursor<Vec<u8>> {
    fn set_len_if_supported(&mut self, len: u64) -> std::io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

/// Splits a map into the old-GNU header's first four inline instructions
/// plus zero or more 21-entry extension blocks (spec §4.6 "Encoding").
#[must_use]
pub fn encode_old_gnu(map: &SparseMap) -> ([GnuSparseInstruction; 4], Vec<[GnuSparseInstruction; 21]>) {
    let mut inline = [GnuSparseInstruction::ZERO; 4];
    for (slot, run) in inline.iter_mut().zip(map.iter()) {
        *slot = instruction_from_run(*run);
    }

    let mut extensions = Vec::new();
    if map.len() > 4 {
        for chunk in map[4..].chunks(21) {
            let mut block = [GnuSparseInstruction::ZERO; 21];
            for (slot, run) in block.iter_mut().zip(chunk.iter()) {
                *slot = instruction_from_run(*run);
            }
            extensions.push(block);
        }
    }
    (inline, extensions)
}

fn instruction_from_run(run: SparseRun) -> GnuSparseInstruction {
    GnuSparseInstruction {
        offset: encode_octal_field(run.offset, 12),
        num_bytes: encode_octal_field(run.num_bytes, 12),
    }
}

fn encode_octal_field(value: u64, width: usize) -> [u8; 12] {
    let encoded = crate::core::encode_numeric(value as i128, width, false)
        .expect("sparse offsets/sizes fit in a 12-byte octal field for any realistic file size");
    let mut out = [0u8; 12];
    out.copy_from_slice(&encoded);
    out
}

/// Decodes the old-GNU inline descriptors plus any chained extension blocks
/// (`is_extended` threading them together) into a flat map.
pub fn decode_old_gnu(
    inline: &[GnuSparseInstruction; 4],
    mut read_extension: impl FnMut() -> std::io::Result<GnuHeaderExtSparse>,
    is_extended: bool,
    limits: &ParserLimits,
) -> std::io::Result<SparseMap> {
    let mut map = SparseMap::new();
    for instr in inline {
        if !instr.is_empty() {
            map.push(run_from_instruction(instr));
        }
    }

    let mut extended = is_extended;
    while extended {
        let block = read_extension()?;
        for instr in &block.sparse {
            if !instr.is_empty() {
                map.push(run_from_instruction(instr));
            }
        }
        if map.len() > limits.max_sparse_instructions {
            break;
        }
        extended = block.parse_is_extended();
    }
    Ok(map)
}

fn run_from_instruction(instr: &GnuSparseInstruction) -> SparseRun {
    let offset = crate::core::decode_numeric(&instr.offset).unwrap_or(0).max(0) as u64;
    let num_bytes = crate::core::decode_numeric(&instr.num_bytes).unwrap_or(0).max(0) as u64;
    SparseRun { offset, num_bytes }
}

/// Encodes the pax 1.0 data-section map: decimal count, then `offset\nsize\n`
/// pairs, block-padded (spec §4.6).
#[must_use]
pub fn encode_pax_1_0(map: &SparseMap) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(map.len().to_string().as_bytes());
    out.push(b'\n');
    for run in map {
        out.extend_from_slice(run.offset.to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(run.num_bytes.to_string().as_bytes());
        out.push(b'\n');
    }
    let padded = align_to_block(out.len() as u64) as usize;
    out.resize(padded, 0);
    out
}

pub fn decode_pax_1_0(data: &[u8]) -> Result<SparseMap, SparseError> {
    decode_pax_1_0_prefixed(data).map(|(map, _)| map)
}

/// Decodes the pax 1.0 map from the front of `data` (which is the entry's
/// raw payload: map header followed immediately by the real non-hole
/// bytes) and also returns the number of block-aligned bytes the map
/// header occupies, so the caller can split off the remaining real data
/// (spec §4.6: GNU.sparse.major/minor `1.0` stores the map in the data
/// section itself rather than in the pax record set).
pub fn decode_pax_1_0_prefixed(data: &[u8]) -> Result<(SparseMap, usize), SparseError> {
    let text = core::str::from_utf8(data).unwrap_or_default();
    let mut consumed = 0usize;
    let mut lines = text.lines();
    let count_line = lines.next().ok_or(SparseError::NegativeOffset { offset: -1 })?;
    let count: usize = count_line.trim().parse().map_err(|_| SparseError::NegativeOffset { offset: -1 })?;
    consumed += count_line.len() + 1;

    let mut map = SparseMap::with_capacity(count);
    for _ in 0..count {
        let offset_line = lines.next().ok_or(SparseError::NegativeOffset { offset: -1 })?;
        let size_line = lines.next().ok_or(SparseError::NegativeOffset { offset: -1 })?;
        consumed += offset_line.len() + 1 + size_line.len() + 1;
        let offset: i128 = offset_line.trim().parse().unwrap_or(-1);
        let size: i128 = size_line.trim().parse().unwrap_or(-1);
        if offset < 0 {
            return Err(SparseError::NegativeOffset { offset });
        }
        map.push(SparseRun { offset: offset as u64, num_bytes: size.max(0) as u64 });
    }
    Ok((map, align_to_block(consumed as u64) as usize))
}

/// Encodes the pax 0.1 comma-separated map (`GNU.sparse.map` value).
#[must_use]
pub fn encode_pax_0_1(map: &SparseMap) -> String {
    let mut parts = Vec::with_capacity(map.len() * 2);
    for run in map {
        parts.push(run.offset.to_string());
        parts.push(run.num_bytes.to_string());
    }
    parts.join(",")
}

pub fn decode_pax_0_1(value: &str) -> Result<SparseMap, SparseError> {
    let numbers: Vec<&str> = value.split(',').collect();
    let mut map = SparseMap::with_capacity(numbers.len() / 2);
    for pair in numbers.chunks(2) {
        if let [offset_str, size_str] = pair {
            let offset: i128 = offset_str.parse().unwrap_or(-1);
            let size: i128 = size_str.parse().unwrap_or(-1);
            if offset < 0 {
                return Err(SparseError::NegativeOffset { offset });
            }
            map.push(SparseRun { offset: offset as u64, num_bytes: size.max(0) as u64 });
        }
    }
    Ok(map)
}

/// Encodes the pax 0.0 record stream: an ordered, repeated sequence of
/// `GNU.sparse.offset`/`GNU.sparse.numbytes` pairs (spec §4.6). These are
/// emitted via [`crate::tar::pax::decode_ordered_records`] on read because a
/// key-unique map would drop all but the last pair.
#[must_use]
pub fn encode_pax_0_0(map: &SparseMap) -> Vec<(String, String)> {
    let mut records = Vec::with_capacity(map.len() * 2);
    for run in map {
        records.push((
            crate::tar::constants::pax_keys::GNU_SPARSE_OFFSET.to_string(),
            run.offset.to_string(),
        ));
        records.push((
            crate::tar::constants::pax_keys::GNU_SPARSE_NUMBYTES.to_string(),
            run.num_bytes.to_string(),
        ));
    }
    records
}

pub fn decode_pax_0_0(records: &[(String, String)]) -> Result<SparseMap, SparseError> {
    use crate::tar::constants::pax_keys::{GNU_SPARSE_NUMBYTES, GNU_SPARSE_OFFSET};
    let mut map = SparseMap::new();
    let mut pending_offset: Option<i128> = None;
    for (key, value) in records {
        if key == GNU_SPARSE_OFFSET {
            pending_offset = value.parse().ok();
        } else if key == GNU_SPARSE_NUMBYTES {
            let offset = pending_offset.take().unwrap_or(-1);
            if offset < 0 {
                return Err(SparseError::NegativeOffset { offset });
            }
            let size: i128 = value.parse().unwrap_or(0);
            map.push(SparseRun { offset: offset as u64, num_bytes: size.max(0) as u64 });
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn dump_finds_single_run_between_holes() {
        let mut content = vec![0u8; 4 * 1024 * 1024];
        content.extend_from_slice(b"data");
        content.extend(vec![0u8; 6 * 1024 * 1024 - 4]);
        let map = dump_sparse_map(Cursor::new(content.clone()), content.len() as u64, false).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].offset, 4 * 1024 * 1024);
        assert_eq!(map[0].num_bytes, 4);
    }

    #[test]
    fn dump_of_all_zero_file_is_empty_unless_bug_for_bug_requested() {
        let content = vec![0u8; 4096];
        let map = dump_sparse_map(Cursor::new(content.clone()), content.len() as u64, false).unwrap();
        assert!(map.is_empty());

        let map = dump_sparse_map(Cursor::new(content.clone()), content.len() as u64, true).unwrap();
        assert_eq!(map, vec![SparseRun { offset: 4095, num_bytes: 1 }]);
    }

    #[test]
    fn old_gnu_round_trip_under_four_instructions() {
        let map = vec![SparseRun { offset: 0, num_bytes: 10 }, SparseRun { offset: 100, num_bytes: 20 }];
        let (inline, extensions) = encode_old_gnu(&map);
        assert!(extensions.is_empty());
        let mut calls = 0;
        let decoded = decode_old_gnu(&inline, || { calls += 1; unreachable!() }, false, &ParserLimits::default()).unwrap();
        assert_eq!(calls, 0);
        assert_eq!(decoded, map);
    }

    #[test]
    fn old_gnu_chains_extension_blocks_past_four_entries() {
        let map: SparseMap = (0..6).map(|i| SparseRun { offset: i * 1000, num_bytes: 5 }).collect();
        let (inline, extensions) = encode_old_gnu(&map);
        assert_eq!(extensions.len(), 1);
        let mut iter = extensions.into_iter();
        let decoded = decode_old_gnu(
            &inline,
            || {
                let block = iter.next().unwrap();
                Ok(GnuHeaderExtSparse { sparse: block, is_extended: [0], padding: [0; 7] })
            },
            true,
            &ParserLimits::default(),
        )
        .unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn pax_1_0_round_trip() {
        let map = vec![SparseRun { offset: 4194304, num_bytes: 4 }];
        let encoded = encode_pax_1_0(&map);
        assert_eq!(encoded.len() % BLOCK_SIZE, 0);
        assert_eq!(decode_pax_1_0(&encoded).unwrap(), map);
    }

    #[test]
    fn pax_1_0_prefixed_reports_consumed_header_length() {
        let map = vec![SparseRun { offset: 0, num_bytes: 4 }];
        let mut payload = encode_pax_1_0(&map);
        let header_len = payload.len();
        payload.extend_from_slice(b"data");
        payload.resize(align_to_block(payload.len() as u64) as usize, 0);
        let (decoded, consumed) = decode_pax_1_0_prefixed(&payload).unwrap();
        assert_eq!(decoded, map);
        assert_eq!(consumed, header_len);
        assert_eq!(&payload[consumed..consumed + 4], b"data");
    }

    #[test]
    fn pax_0_1_round_trip() {
        let map = vec![SparseRun { offset: 0, num_bytes: 10 }, SparseRun { offset: 100, num_bytes: 5 }];
        let encoded = encode_pax_0_1(&map);
        assert_eq!(encoded, "0,10,100,5");
        assert_eq!(decode_pax_0_1(&encoded).unwrap(), map);
    }

    #[test]
    fn pax_0_0_round_trip() {
        let map = vec![SparseRun { offset: 0, num_bytes: 10 }, SparseRun { offset: 100, num_bytes: 5 }];
        let records = encode_pax_0_0(&map);
        assert_eq!(decode_pax_0_0(&records).unwrap(), map);
    }

    #[test]
    fn validate_rejects_run_exceeding_real_size() {
        let map = vec![SparseRun { offset: 10, num_bytes: 100 }];
        assert!(validate_sparse_map(&map, 50, 100).is_err());
        assert!(validate_sparse_map(&map, 200, 100).is_ok());
    }
}
