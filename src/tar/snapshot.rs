//! Incremental-snapshot protocol (spec.md §4.7, grounded in
//! `original_source/src/incremen.c`).
//!
//! An external snapshot file records, per directory, the `(mtime, dev, ino)`
//! seen on a previous dump. The engine consults it to decide whether a
//! directory (and transitively its children) is new, renamed, or merely
//! changed; the decision of *what to stat* and *how to write the result back
//! to disk* stays with the caller, but the table format and the decision
//! rule are codec domain knowledge.

use hashbrown::HashMap;

use crate::tar::entry::{DumpDirEntry, DumpDirStatus, TimeStamp};
use crate::tar::errors::SnapshotError;

/// Current snapshot format version this crate writes (spec.md §4.7).
pub const SNAPSHOT_FORMAT_VERSION: u32 = 2;

/// One directory record of a snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDirectory {
    pub mtime: TimeStamp,
    pub dev: u64,
    pub ino: u64,
    /// Leading `+`: an NFS-mounted directory, where device-number churn is
    /// not itself evidence of a rename (spec.md §4.7).
    pub nfs: bool,
}

/// The outcome of comparing a directory against its snapshot record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryDecision {
    /// Not found in the snapshot: every child must be dumped.
    New,
    /// Found, but `(dev, ino)` differ (after NFS relaxation): treated as a
    /// fresh directory, every child must be dumped.
    Renamed,
    /// Found, same identity. Children are decided individually by their own
    /// mtime/ctime regardless of whether this directory's mtime advanced
    /// (spec.md §4.7: "in-place rewrites don't bump directory mtime").
    Known,
}

/// An in-memory snapshot table (spec.md §4.7, §9 "Hash tables").
///
/// Owned by the caller's `CodecContext`-equivalent state, not by this crate;
/// freed along with whatever holds it.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub dump_time: TimeStamp,
    directories: HashMap<String, SnapshotDirectory>,
}

impl Snapshot {
    #[must_use]
    pub fn new(dump_time: TimeStamp) -> Self {
        Self { dump_time, directories: HashMap::new() }
    }

    /// Looks up `name` and classifies it per spec.md §4.7's decision table,
    /// then (for `New`/`Renamed`) updates the stored record to `(mtime, dev,
    /// ino, nfs)`. `Known` leaves the stored record untouched: the caller
    /// writes the possibly-advanced mtime back explicitly via [`Self::record`]
    /// once the dump of this directory's children completes.
    pub fn decide(&mut self, name: &str, mtime: TimeStamp, dev: u64, ino: u64, nfs: bool) -> DirectoryDecision {
        match self.directories.get(name) {
            None => {
                self.record(name, mtime, dev, ino, nfs);
                DirectoryDecision::New
            }
            Some(existing) => {
                let same_device = nfs_relaxed_eq(existing, dev, nfs);
                if !same_device || existing.ino != ino {
                    self.record(name, mtime, dev, ino, nfs);
                    DirectoryDecision::Renamed
                } else {
                    DirectoryDecision::Known
                }
            }
        }
    }

    pub fn record(&mut self, name: &str, mtime: TimeStamp, dev: u64, ino: u64, nfs: bool) {
        self.directories.insert(name.to_string(), SnapshotDirectory { mtime, dev, ino, nfs });
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SnapshotDirectory> {
        self.directories.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SnapshotDirectory)> {
        self.directories.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parses a snapshot file (spec.md §4.7). Version-0 snapshots (lacking
    /// the `PACKAGE-VERSION-N` header line) are recognized by their first
    /// line being a bare `SEC NSEC` timestamp instead; they are read with
    /// `nsec = 0` and upgraded to the current format on the next write.
    pub fn parse(text: &str) -> Result<Self, SnapshotError> {
        let mut lines = text.lines();
        let first = lines.next().ok_or(SnapshotError::BadHeaderLine)?;

        let timestamp_line = if looks_like_version_header(first) {
            lines.next().ok_or(SnapshotError::BadTimestampLine)?
        } else {
            first
        };

        let dump_time = parse_timestamp_line(timestamp_line)?;
        let mut snapshot = Snapshot::new(dump_time);

        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, dir) = parse_directory_line(line)?;
            snapshot.directories.insert(name, dir);
        }
        Ok(snapshot)
    }

    /// Serializes this table back to snapshot-file text, always in the
    /// current (versioned, nanosecond-precision) format.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = format!("GNU-tar-codec-{SNAPSHOT_FORMAT_VERSION}\n");
        out.push_str(&format!("{} {}\n", self.dump_time.seconds_since_epoch, self.dump_time.nanoseconds));
        let mut names: Vec<&String> = self.directories.keys().collect();
        names.sort();
        for name in names {
            let dir = &self.directories[name];
            let prefix = if dir.nfs { "+" } else { "" };
            out.push_str(&format!(
                "{prefix}{} {} {} {} {}\n",
                dir.mtime.seconds_since_epoch,
                dir.mtime.nanoseconds,
                dir.dev,
                dir.ino,
                escape_name(name)
            ));
        }
        out
    }
}

fn nfs_relaxed_eq(existing: &SnapshotDirectory, dev: u64, nfs: bool) -> bool {
    if existing.nfs || nfs {
        true
    } else {
        existing.dev == dev
    }
}

fn looks_like_version_header(line: &str) -> bool {
    !line.split_whitespace().all(|tok| tok.chars().all(|c| c.is_ascii_digit()))
}

fn parse_timestamp_line(line: &str) -> Result<TimeStamp, SnapshotError> {
    let mut parts = line.split_whitespace();
    let sec: i64 = parts.next().and_then(|s| s.parse().ok()).ok_or(SnapshotError::BadTimestampLine)?;
    let nsec: u32 = parts.next().map_or(Ok(0), |s| s.parse()).map_err(|_| SnapshotError::BadTimestampLine)?;
    if parts.next().is_some() {
        return Err(SnapshotError::BadTimestampLine);
    }
    Ok(TimeStamp { seconds_since_epoch: sec, nanoseconds: nsec })
}

fn parse_directory_line(line: &str) -> Result<(String, SnapshotDirectory), SnapshotError> {
    let (nfs, rest) = match line.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let mut parts = rest.splitn(5, ' ');
    let mtime_sec: i64 =
        parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| SnapshotError::BadDirectoryRecord(line.to_string()))?;
    let mtime_nsec: u32 =
        parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| SnapshotError::BadDirectoryRecord(line.to_string()))?;
    let dev: u64 =
        parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| SnapshotError::BadDirectoryRecord(line.to_string()))?;
    let ino: u64 =
        parts.next().and_then(|s| s.parse().ok()).ok_or_else(|| SnapshotError::BadDirectoryRecord(line.to_string()))?;
    let name_field = parts.next().ok_or_else(|| SnapshotError::BadDirectoryRecord(line.to_string()))?;
    let name = unescape_name(name_field)?;
    Ok((name, SnapshotDirectory { mtime: TimeStamp { seconds_since_epoch: mtime_sec, nanoseconds: mtime_nsec }, dev, ino, nfs }))
}

/// Escapes `\n`, `\r`, `\t`, `\\`, and any other control/non-ASCII byte as
/// `\xxx` (three-digit octal), matching `original_source/src/incremen.c`'s
/// `NAME` field escaping (spec.md §6).
#[must_use]
pub fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            0 => out.push_str("\\000"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:03o}")),
        }
    }
    out
}

/// Reverses [`escape_name`].
pub fn unescape_name(escaped: &str) -> Result<String, SnapshotError> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let next = *bytes.get(i + 1).ok_or(SnapshotError::BadEscape)?;
        match next {
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'0'..=b'7' => {
                let digits = bytes.get(i + 1..i + 4).ok_or(SnapshotError::BadEscape)?;
                if !digits.iter().all(u8::is_ascii_digit) {
                    return Err(SnapshotError::BadEscape);
                }
                let text = core::str::from_utf8(digits).map_err(|_| SnapshotError::BadEscape)?;
                let value = u8::from_str_radix(text, 8).map_err(|_| SnapshotError::BadEscape)?;
                out.push(value);
                i += 4;
            }
            _ => return Err(SnapshotError::BadEscape),
        }
    }
    String::from_utf8(out).map_err(|_| SnapshotError::BadEscape)
}

/// Encodes a dumpdir payload: entries sorted by name (status prefix
/// ignored), each a status byte followed by the NUL-terminated name, the
/// whole list terminated by an extra NUL (spec.md §4.7 "Dumpdir record").
#[must_use]
pub fn encode_dumpdir(entries: &[DumpDirEntry]) -> Vec<u8> {
    let mut sorted: Vec<&DumpDirEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut out = Vec::new();
    for entry in sorted {
        out.push(status_byte(entry.status));
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
    }
    out.push(0);
    out
}

/// Decodes a dumpdir payload produced by [`encode_dumpdir`].
pub fn decode_dumpdir(payload: &[u8]) -> Result<Vec<DumpDirEntry>, SnapshotError> {
    let mut entries = Vec::new();
    let mut rest = payload;
    loop {
        let Some(&status) = rest.first() else { break };
        if status == 0 {
            break;
        }
        let name_start = &rest[1..];
        let nul_at = name_start.iter().position(|&b| b == 0).ok_or(SnapshotError::BadDirectoryRecord(
            "dumpdir entry missing NUL terminator".to_string(),
        ))?;
        let name = core::str::from_utf8(&name_start[..nul_at])
            .map_err(|_| SnapshotError::BadDirectoryRecord("dumpdir entry is not valid UTF-8".to_string()))?
            .to_string();
        entries.push(DumpDirEntry { status: status_from_byte(status)?, name });
        rest = &name_start[nul_at + 1..];
    }
    Ok(entries)
}

fn status_byte(status: DumpDirStatus) -> u8 {
    match status {
        DumpDirStatus::Included => b'Y',
        DumpDirStatus::Excluded => b'N',
        DumpDirStatus::SubDirectory => b'D',
    }
}

fn status_from_byte(byte: u8) -> Result<DumpDirStatus, SnapshotError> {
    match byte {
        b'Y' => Ok(DumpDirStatus::Included),
        b'N' => Ok(DumpDirStatus::Excluded),
        b'D' => Ok(DumpDirStatus::SubDirectory),
        other => {
            Err(SnapshotError::BadDirectoryRecord(format!("unrecognized dumpdir status byte {other:#x}")))
        }
    }
}

/// Decodes a legacy `N`-typeflag renamed-name-list payload: a decimal count
/// line followed by that many `OLD\nNEW\n` pairs (SPEC_FULL §B.3, grounded
/// in `original_source/src/list.c`'s handling of the obsolete rename
/// record). The builder never emits this; only the parser needs to read it.
pub fn decode_renamed_name_list(payload: &[u8]) -> Result<Vec<(String, String)>, SnapshotError> {
    let text = core::str::from_utf8(payload)
        .map_err(|_| SnapshotError::BadDirectoryRecord("renamed-name list is not valid UTF-8".to_string()))?;
    let mut lines = text.lines();
    let count: usize = lines
        .next()
        .ok_or_else(|| SnapshotError::BadDirectoryRecord("renamed-name list missing count line".to_string()))?
        .trim()
        .parse()
        .map_err(|_| SnapshotError::BadDirectoryRecord("renamed-name list count is not a number".to_string()))?;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let old = lines
            .next()
            .ok_or_else(|| SnapshotError::BadDirectoryRecord("renamed-name list truncated".to_string()))?;
        let new = lines
            .next()
            .ok_or_else(|| SnapshotError::BadDirectoryRecord("renamed-name list truncated".to_string()))?;
        pairs.push((old.to_string(), new.to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_and_unescape_round_trip_control_bytes() {
        let name = "weird\nname\\with\ttabs";
        let escaped = escape_name(name);
        assert_eq!(escaped, "weird\\nname\\\\with\\ttabs");
        assert_eq!(unescape_name(&escaped).unwrap(), name);
    }

    #[test]
    fn new_directory_is_reported_new_and_then_known() {
        let mut snapshot = Snapshot::new(TimeStamp::from_seconds(100));
        let decision = snapshot.decide("dir", TimeStamp::from_seconds(1), 1, 2, false);
        assert_eq!(decision, DirectoryDecision::New);
        let decision = snapshot.decide("dir", TimeStamp::from_seconds(1), 1, 2, false);
        assert_eq!(decision, DirectoryDecision::Known);
    }

    #[test]
    fn inode_change_is_reported_as_renamed() {
        let mut snapshot = Snapshot::new(TimeStamp::from_seconds(100));
        snapshot.decide("dir", TimeStamp::from_seconds(1), 1, 2, false);
        let decision = snapshot.decide("dir", TimeStamp::from_seconds(2), 1, 99, false);
        assert_eq!(decision, DirectoryDecision::Renamed);
    }

    #[test]
    fn nfs_directories_ignore_device_number_churn() {
        let mut snapshot = Snapshot::new(TimeStamp::from_seconds(100));
        snapshot.decide("dir", TimeStamp::from_seconds(1), 1, 2, true);
        let decision = snapshot.decide("dir", TimeStamp::from_seconds(2), 77, 2, true);
        assert_eq!(decision, DirectoryDecision::Known);
    }

    #[test]
    fn round_trips_a_snapshot_with_an_nfs_directory_and_an_escaped_name() {
        let mut snapshot = Snapshot::new(TimeStamp { seconds_since_epoch: 1_700_000_000, nanoseconds: 123 });
        snapshot.record("plain", TimeStamp::from_seconds(5), 1, 2, false);
        snapshot.record("weird\nname", TimeStamp { seconds_since_epoch: 6, nanoseconds: 42 }, 3, 4, true);

        let text = snapshot.serialize();
        let parsed = Snapshot::parse(&text).unwrap();
        assert_eq!(parsed.dump_time, snapshot.dump_time);
        assert_eq!(parsed.get("plain"), snapshot.get("plain"));
        let nfs_dir = parsed.get("weird\nname").unwrap();
        assert!(nfs_dir.nfs);
        assert_eq!(nfs_dir.mtime.nanoseconds, 42);
    }

    #[test]
    fn version_0_snapshot_lacks_nanoseconds_and_header_line() {
        let text = "1700000000 0\ndir 5 0 1 2 name\n";
        let snapshot = Snapshot::parse(text).unwrap();
        assert_eq!(snapshot.dump_time, TimeStamp { seconds_since_epoch: 1_700_000_000, nanoseconds: 0 });
    }

    #[test]
    fn dumpdir_payload_round_trips_and_sorts_by_name() {
        let entries = vec![
            DumpDirEntry { status: DumpDirStatus::Included, name: "zeta".to_string() },
            DumpDirEntry { status: DumpDirStatus::Excluded, name: "alpha".to_string() },
            DumpDirEntry { status: DumpDirStatus::SubDirectory, name: "mid".to_string() },
        ];
        let encoded = encode_dumpdir(&entries);
        assert_eq!(encoded.last(), Some(&0));
        let decoded = decode_dumpdir(&encoded).unwrap();
        assert_eq!(decoded[0].name, "alpha");
        assert_eq!(decoded[1].name, "mid");
        assert_eq!(decoded[2].name, "zeta");
    }

    #[test]
    fn renamed_name_list_decodes_count_prefixed_pairs() {
        let payload = b"2\nold1\nnew1\nold2\nnew2\n";
        let pairs = decode_renamed_name_list(payload).unwrap();
        assert_eq!(pairs, vec![("old1".to_string(), "new1".to_string()), ("old2".to_string(), "new2".to_string())]);
    }
}
