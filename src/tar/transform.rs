//! Sed-like name transform language (spec.md §6 "External Interfaces",
//! grounded in `original_source/src/transform.c`).
//!
//! Invoked from the header builder's name-normalization step, so the parsed
//! `s/REGEX/REPLACE/FLAGS` expression lives in the core rather than at the
//! CLI boundary. Regex matching itself is delegated to the `regex` crate;
//! unlike the original's POSIX `regex_t`, that crate has no BRE/ERE split,
//! so the `x` flag is accepted for compatibility but does not change how
//! the pattern is compiled.

use regex::{Captures, Regex, RegexBuilder};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid transform expression: expected 's' followed by a delimiter")]
    MissingDelimiter,
    #[error("invalid transform expression: unterminated regex or replacement segment")]
    UnterminatedSegment,
    #[error("invalid transform expression: unknown flag {0:?}")]
    UnknownFlag(char),
    #[error("invalid transform replacement: back reference \\{reference} out of range (pattern has {available} groups)")]
    BackReferenceOutOfRange { reference: usize, available: usize },
    #[error("invalid transform regex: {0}")]
    Regex(#[from] regex::Error),
}

#[derive(Debug, Clone)]
enum ReplaceSegment {
    Literal(String),
    BackRef(usize),
}

/// A compiled `s/REGEX/REPLACE/FLAGS` expression.
#[derive(Debug, Clone)]
pub struct Transform {
    regex: Regex,
    replacement: Vec<ReplaceSegment>,
    /// `g` flag, unless the pattern is anchored (`^...` or `...$`), which
    /// forces first-match-only regardless of the flag (spec.md §6).
    global: bool,
}

impl Transform {
    /// Parses and compiles a transform expression.
    pub fn parse(expr: &str) -> Result<Self, TransformError> {
        let bytes: Vec<char> = expr.chars().collect();
        if bytes.first() != Some(&'s') || bytes.len() < 2 {
            return Err(TransformError::MissingDelimiter);
        }
        let delim = bytes[1];

        let mut i = 2;
        while i < bytes.len() && bytes[i] != delim {
            if bytes[i] == '\\' && i + 1 < bytes.len() {
                i += 1;
            }
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != delim {
            return Err(TransformError::UnterminatedSegment);
        }
        let pattern_end = i;

        let mut j = pattern_end + 1;
        while j < bytes.len() && bytes[j] != delim {
            if bytes[j] == '\\' && j + 1 < bytes.len() {
                j += 1;
            }
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != delim {
            return Err(TransformError::UnterminatedSegment);
        }
        let replacement_end = j;

        let mut global = false;
        let mut case_insensitive = false;
        for flag in &bytes[replacement_end + 1..] {
            match flag {
                'g' => global = true,
                'i' => case_insensitive = true,
                'x' => {}
                other => return Err(TransformError::UnknownFlag(*other)),
            }
        }

        let pattern: String = bytes[2..pattern_end].iter().collect();
        let regex = RegexBuilder::new(&pattern).case_insensitive(case_insensitive).build()?;

        // An anchored pattern can only ever match once per logical position
        // the original tool cared about (a whole name), so global is
        // suppressed the same way transform.c downgrades transform_global
        // to transform_first.
        if pattern.starts_with('^') || pattern.ends_with('$') {
            global = false;
        }

        let replacement_src: String = bytes[pattern_end + 1..replacement_end].iter().collect();
        let replacement = parse_replacement(&replacement_src, regex.captures_len() - 1)?;

        Ok(Self { regex, replacement, global })
    }

    /// Applies the transform to `input`, returning the (possibly) rewritten
    /// string. Matches `transform.c`'s `_transform_name_to_obstack`: the
    /// first flag downgrade aside, replacement stops after the first match
    /// unless `g` was given.
    #[must_use]
    pub fn apply(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut pos = 0;
        loop {
            let Some(caps) = self.regex.captures(&input[pos..]) else {
                out.push_str(&input[pos..]);
                break;
            };
            let whole = caps.get(0).expect("capture group 0 always matches");
            out.push_str(&input[pos..pos + whole.start()]);
            push_replacement(&mut out, &self.replacement, &caps);

            let mut next = pos + whole.end();
            if whole.end() == whole.start() {
                match input[next..].chars().next() {
                    Some(ch) => {
                        out.push(ch);
                        next += ch.len_utf8();
                    }
                    None => {
                        pos = next;
                        break;
                    }
                }
            }
            pos = next;

            if !self.global {
                out.push_str(&input[pos..]);
                break;
            }
            if pos >= input.len() {
                break;
            }
        }
        out
    }
}

fn parse_replacement(src: &str, group_count: usize) -> Result<Vec<ReplaceSegment>, TransformError> {
    let chars: Vec<char> = src.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                let next = chars[i + 1];
                match next {
                    '0'..='9' => {
                        let mut num_end = i + 1;
                        while num_end < chars.len() && chars[num_end].is_ascii_digit() {
                            num_end += 1;
                        }
                        let digits: String = chars[i + 1..num_end].iter().collect();
                        let reference: usize = digits.parse().expect("digit run parses as usize");
                        if reference > group_count {
                            return Err(TransformError::BackReferenceOutOfRange { reference, available: group_count });
                        }
                        flush_literal(&mut segments, &mut literal);
                        segments.push(ReplaceSegment::BackRef(reference));
                        i = num_end;
                    }
                    '\\' => {
                        literal.push('\\');
                        i += 2;
                    }
                    'a' => {
                        literal.push('\u{07}');
                        i += 2;
                    }
                    'b' => {
                        literal.push('\u{08}');
                        i += 2;
                    }
                    'f' => {
                        literal.push('\u{0C}');
                        i += 2;
                    }
                    'n' => {
                        literal.push('\n');
                        i += 2;
                    }
                    'r' => {
                        literal.push('\r');
                        i += 2;
                    }
                    't' => {
                        literal.push('\t');
                        i += 2;
                    }
                    'v' => {
                        literal.push('\u{0B}');
                        i += 2;
                    }
                    '&' => {
                        literal.push('&');
                        i += 2;
                    }
                    other => {
                        // Unrecognized escape: kept verbatim, matching
                        // transform.c's "try to be nice" fallback.
                        literal.push('\\');
                        literal.push(other);
                        i += 2;
                    }
                }
            }
            '&' => {
                flush_literal(&mut segments, &mut literal);
                segments.push(ReplaceSegment::BackRef(0));
                i += 1;
            }
            ch => {
                literal.push(ch);
                i += 1;
            }
        }
    }
    flush_literal(&mut segments, &mut literal);
    Ok(segments)
}

fn flush_literal(segments: &mut Vec<ReplaceSegment>, literal: &mut String) {
    if !literal.is_empty() {
        segments.push(ReplaceSegment::Literal(std::mem::take(literal)));
    }
}

fn push_replacement(out: &mut String, segments: &[ReplaceSegment], caps: &Captures) {
    for segment in segments {
        match segment {
            ReplaceSegment::Literal(text) => out.push_str(text),
            ReplaceSegment::BackRef(n) => {
                if let Some(m) = caps.get(*n) {
                    out.push_str(m.as_str());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_only_first_match_without_g_flag() {
        let t = Transform::parse("s/a/X/").unwrap();
        assert_eq!(t.apply("banana"), "bXnana");
    }

    #[test]
    fn global_flag_replaces_every_match() {
        let t = Transform::parse("s/a/X/g").unwrap();
        assert_eq!(t.apply("banana"), "bXnXnX");
    }

    #[test]
    fn anchored_pattern_forces_non_global_even_with_g_flag() {
        let t = Transform::parse("s/^a/X/g").unwrap();
        assert_eq!(t.apply("aaa"), "Xaa");
    }

    #[test]
    fn backreferences_and_ampersand_are_substituted() {
        let t = Transform::parse("s/(foo)(bar)/[\\2-\\1]/").unwrap();
        assert_eq!(t.apply("foobar"), "[bar-foo]");

        let t2 = Transform::parse("s/foo/<&>/").unwrap();
        assert_eq!(t2.apply("foobar"), "<foo>bar");
    }

    #[test]
    fn case_insensitive_flag_matches_regardless_of_case() {
        let t = Transform::parse("s/readme/README/i").unwrap();
        assert_eq!(t.apply("README.txt"), "README.txt");
        assert_eq!(t.apply("ReadMe.txt"), "README.txt");
    }

    #[test]
    fn custom_delimiter_is_honored() {
        let t = Transform::parse("s,a/b,c,").unwrap();
        assert_eq!(t.apply("a/b/c"), "c/c");
    }

    #[test]
    fn out_of_range_backreference_is_rejected() {
        let err = Transform::parse("s/(a)/\\2/").unwrap_err();
        assert!(matches!(err, TransformError::BackReferenceOutOfRange { reference: 2, available: 1 }));
    }

    #[test]
    fn escaped_control_characters_are_honored_in_replacement() {
        let t = Transform::parse("s/x/\\t/").unwrap();
        assert_eq!(t.apply("axb"), "a\tb");
    }
}
