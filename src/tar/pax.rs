//! Pax extended header codec (spec §4.5).

use hashbrown::HashMap;

use crate::tar::constants::pax_keys::is_protected;
use crate::tar::entry::TimeStamp;
use crate::tar::errors::PaxError;
use crate::tar::options::ParserLimits;

/// One `key=value` / `key:=value` override from a configuration list.
///
/// `only_if_absent` corresponds to the `:=` form: the override applies only
/// when the key is not already present in the record being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaxOverride {
    pub key: String,
    pub value: String,
    pub only_if_absent: bool,
}

impl PaxOverride {
    pub fn parse(spec: &str) -> Result<Self, PaxError> {
        if let Some((key, value)) = spec.split_once(":=") {
            reject_protected(key)?;
            return Ok(Self { key: key.to_string(), value: value.to_string(), only_if_absent: true });
        }
        if let Some((key, value)) = spec.split_once('=') {
            reject_protected(key)?;
            return Ok(Self { key: key.to_string(), value: value.to_string(), only_if_absent: false });
        }
        Err(PaxError::MissingEqualSign)
    }
}

/// A key-deletion glob pattern (`*`/`?`), matched the way GNU tar's
/// `xheader.c` matches delete patterns against pax keys (shell globbing,
/// not regex — the transform language is the only place this crate uses
/// `regex`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaxPattern(String);

impl PaxPattern {
    pub fn parse(pattern: &str) -> Result<Self, PaxError> {
        reject_protected(pattern)?;
        Ok(Self(pattern.to_string()))
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        glob_match(&self.0, key)
    }
}

fn reject_protected(key: &str) -> Result<(), PaxError> {
    if is_protected(key) {
        return Err(PaxError::ProtectedKey { key: key.to_string() });
    }
    Ok(())
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_inner(&pattern, &text)
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            glob_match_inner(&pattern[1..], text)
                || (!text.is_empty() && glob_match_inner(pattern, &text[1..]))
        }
        Some('?') => !text.is_empty() && glob_match_inner(&pattern[1..], &text[1..]),
        Some(&c) => text.first() == Some(&c) && glob_match_inner(&pattern[1..], &text[1..]),
    }
}

/// Applies a configured override/delete list to a set of decoded or
/// about-to-be-encoded attributes (spec §4.5 "Delete and override policy").
pub fn apply_overrides_and_deletes(
    attrs: &mut HashMap<String, String>,
    overrides: &[PaxOverride],
    deletes: &[PaxPattern],
) {
    attrs.retain(|key, _| !deletes.iter().any(|pattern| pattern.matches(key)));
    for over in overrides {
        if over.only_if_absent {
            attrs.entry(over.key.clone()).or_insert_with(|| over.value.clone());
        } else {
            attrs.insert(over.key.clone(), over.value.clone());
        }
    }
}

/// Encodes one `LEN SP KEY '=' VALUE NL` record, computing the
/// self-referential length by iterating until the digit count stabilizes
/// (spec §4.5).
#[must_use]
pub fn encode_record(key: &str, value: &str) -> Vec<u8> {
    // "LEN KEY=VALUE\n": start from a guess and grow until stable, since
    // appending more digits to LEN can itself push LEN's own length up.
    let fixed_len = 1 /* space */ + key.len() + 1 /* '=' */ + value.len() + 1 /* '\n' */;
    let mut len = fixed_len + 1;
    loop {
        let digit_count = decimal_digits(len);
        let candidate = digit_count + fixed_len;
        if candidate == len {
            break;
        }
        len = candidate;
    }
    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(len.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(key.as_bytes());
    out.push(b'=');
    out.extend_from_slice(value.as_bytes());
    out.push(b'\n');
    debug_assert_eq!(out.len(), len);
    out
}

fn decimal_digits(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Encodes a full pax payload (several records concatenated), in iteration
/// order of `attrs`. Callers that need deterministic output should pass a
/// sorted iterator.
#[must_use]
pub fn encode_payload<'a>(attrs: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in attrs {
        out.extend(encode_record(key, value));
    }
    out
}

/// Decodes a pax payload into a flat key/value map, validating the
/// self-referential length of every record. Later records with a
/// previously-seen key win, per the usual "last one wins" pax convention.
pub fn decode_payload(bytes: &[u8], limits: &ParserLimits) -> Result<HashMap<String, String>, PaxError> {
    let mut attrs = HashMap::new();
    for (key, value) in decode_ordered_records(bytes, limits)? {
        attrs.insert(key, value);
    }
    Ok(attrs)
}

/// Decodes a pax payload preserving record order and duplicate keys.
///
/// Needed for the GNU sparse 0.0/0.1 record stream (spec §4.6), which
/// legitimately repeats `GNU.sparse.offset`/`GNU.sparse.numbytes` many
/// times in sequence; a `HashMap` would silently drop all but the last
/// pair.
pub fn decode_ordered_records(mut bytes: &[u8], limits: &ParserLimits) -> Result<Vec<(String, String)>, PaxError> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        // Stop at a run of padding NULs after the last record.
        if bytes.iter().all(|&b| b == 0) {
            break;
        }
        let space = bytes.iter().position(|&b| b == b' ').ok_or(PaxError::BadLengthField)?;
        let len_text = core::str::from_utf8(&bytes[..space]).map_err(|_| PaxError::BadLengthField)?;
        let declared_len: usize = len_text.parse().map_err(|_| PaxError::BadLengthField)?;
        if declared_len == 0 || declared_len > bytes.len() {
            return Err(PaxError::LengthMismatch { declared: declared_len });
        }
        let record = &bytes[..declared_len];
        if record[declared_len - 1] != b'\n' {
            return Err(PaxError::LengthMismatch { declared: declared_len });
        }
        let body = &record[space + 1..declared_len - 1];
        let eq = body.iter().position(|&b| b == b'=').ok_or(PaxError::MissingEqualSign)?;
        let key = core::str::from_utf8(&body[..eq]).map_err(|_| PaxError::MissingEqualSign)?;
        let value = core::str::from_utf8(&body[eq + 1..]).map_err(|_| PaxError::MissingEqualSign)?;
        if key.len() > limits.max_pax_key_value_len || value.len() > limits.max_pax_key_value_len {
            return Err(PaxError::LengthMismatch { declared: declared_len });
        }
        records.push((key.to_string(), value.to_string()));
        bytes = &bytes[declared_len..];
    }
    Ok(records)
}

/// Parses a pax timestamp value, which may carry a `.NNNNNNNNN` fractional
/// part interpreted as nanoseconds (spec §4.5).
pub fn parse_timestamp(key: &str, value: &str) -> Result<TimeStamp, PaxError> {
    let (seconds_str, nanos_str) = match value.split_once('.') {
        Some((s, n)) => (s, Some(n)),
        None => (value, None),
    };
    let seconds: i64 = seconds_str.parse().map_err(|_| PaxError::BadTimestamp { key: key.to_string() })?;
    let nanoseconds = match nanos_str {
        Some(n) => {
            let mut digits = n.to_string();
            digits.truncate(9);
            while digits.len() < 9 {
                digits.push('0');
            }
            digits.parse().map_err(|_| PaxError::BadTimestamp { key: key.to_string() })?
        }
        None => 0,
    };
    Ok(TimeStamp { seconds_since_epoch: seconds, nanoseconds })
}

#[must_use]
pub fn format_timestamp(ts: TimeStamp) -> String {
    if ts.nanoseconds == 0 {
        ts.seconds_since_epoch.to_string()
    } else {
        format!("{}.{:09}", ts.seconds_since_epoch, ts.nanoseconds)
    }
}

/// Expands an extended-header naming template (spec §4.5): `%d` dirname,
/// `%f` basename, `%p` pid, `%%` literal percent, `%n` sequence number
/// (global headers only).
#[must_use]
pub fn format_header_name(template: &str, dirname: &str, basename: &str, pid: u32, seq: Option<u32>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => out.push_str(dirname),
            Some('f') => out.push_str(basename),
            Some('p') => out.push_str(&pid.to_string()),
            Some('%') => out.push('%'),
            Some('n') => out.push_str(&seq.unwrap_or(1).to_string()),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_length_is_self_consistent() {
        let record = encode_record("path", "a.txt");
        let text = core::str::from_utf8(&record).unwrap();
        let (len_str, _) = text.split_once(' ').unwrap();
        let declared: usize = len_str.parse().unwrap();
        assert_eq!(declared, record.len());
    }

    #[test]
    fn payload_round_trip() {
        let payload = encode_payload([("path", "a.txt"), ("uid", "9999999999")].into_iter());
        let limits = ParserLimits::default();
        let decoded = decode_payload(&payload, &limits).unwrap();
        assert_eq!(decoded.get("path").unwrap(), "a.txt");
        assert_eq!(decoded.get("uid").unwrap(), "9999999999");
    }

    #[test]
    fn timestamp_fraction_round_trip() {
        let ts = parse_timestamp("mtime", "1700000000.123456789").unwrap();
        assert_eq!(ts.seconds_since_epoch, 1_700_000_000);
        assert_eq!(ts.nanoseconds, 123_456_789);
        assert_eq!(format_timestamp(ts), "1700000000.123456789");
    }

    #[test]
    fn protected_keys_reject_override_and_delete() {
        assert!(PaxOverride::parse("size=5").is_err());
        assert!(PaxPattern::parse("GNU.sparse.*").is_err());
        assert!(PaxOverride::parse("comment=hi").is_ok());
    }

    #[test]
    fn delete_pattern_matches_glob() {
        let pattern = PaxPattern::parse("comment*").unwrap();
        assert!(pattern.matches("comment"));
        assert!(pattern.matches("comment.extra"));
        assert!(!pattern.matches("path"));
    }

    #[test]
    fn header_name_template_expands() {
        let name = format_header_name("././@PaxHeader/%d/%f", "dir", "file.txt", 123, None);
        assert_eq!(name, "././@PaxHeader/dir/file.txt");
        let global = format_header_name("/tmp/GlobalHead.%p.%n", "", "", 42, Some(3));
        assert_eq!(global, "/tmp/GlobalHead.42.3");
    }
}
