//! Record splitter: turns a decoded byte stream into `(index, start, end)`
//! records using a literal or regex separator.
//!
//! Offsets are in the decoded coordinate space. The buffer holds the current
//! unemitted record plus one read chunk; scanning resumes behind the last
//! scanned position by a bounded look-behind so a separator straddling a
//! chunk boundary still matches exactly once.

use std::io::{self, Read};

use regex::bytes::Regex;

use crate::codec::stream_error;
use crate::error::{QuarryError, Result};

/// Look-behind window for regex separators. Must be at least the longest
/// separator match the pattern can produce.
const REGEX_LOOKBEHIND: usize = 256;

/// Separator specification: a literal byte string with standard escapes, or
/// a regex when the spec carries the `re:` marker.
#[derive(Debug, Clone)]
pub enum Separator {
    Literal(Vec<u8>),
    Pattern(Regex),
}

impl Separator {
    pub fn parse(spec: &str) -> Result<Self> {
        if let Some(pattern) = spec.strip_prefix("re:") {
            let regex = Regex::new(pattern)
                .map_err(|e| QuarryError::SeparatorCompile(e.to_string()))?;
            if regex.find(b"").is_some() {
                return Err(QuarryError::SeparatorCompile(format!(
                    "pattern `{pattern}` can match the empty string"
                )));
            }
            return Ok(Separator::Pattern(regex));
        }

        let literal = unescape(spec)?;
        if literal.is_empty() {
            return Err(QuarryError::SeparatorCompile(
                "separator must not be empty".to_string(),
            ));
        }
        Ok(Separator::Literal(literal))
    }

    /// Leftmost match at or after `from`, as `(start, end)`.
    fn find(&self, haystack: &[u8], from: usize) -> Option<(usize, usize)> {
        if from >= haystack.len() {
            return None;
        }
        match self {
            Separator::Literal(lit) if lit.is_empty() => None,
            Separator::Literal(lit) => haystack[from..]
                .windows(lit.len())
                .position(|w| w == lit.as_slice())
                .map(|i| (from + i, from + i + lit.len())),
            Separator::Pattern(re) => re.find_at(haystack, from).map(|m| (m.start(), m.end())),
        }
    }

    fn lookbehind(&self) -> usize {
        match self {
            Separator::Literal(lit) => lit.len().saturating_sub(1),
            Separator::Pattern(_) => REGEX_LOOKBEHIND,
        }
    }

    fn is_pattern(&self) -> bool {
        matches!(self, Separator::Pattern(_))
    }
}

/// Unescape a literal separator spec: `\n`, `\t`, `\r`, `\0`, `\\`, `\xNN`.
fn unescape(spec: &str) -> Result<Vec<u8>> {
    let bad = |msg: String| QuarryError::SeparatorCompile(msg);
    let mut out = Vec::with_capacity(spec.len());
    let mut chars = spec.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut utf8 = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('0') => out.push(0),
            Some('\\') => out.push(b'\\'),
            Some('x') => {
                let hi = chars.next();
                let lo = chars.next();
                let (hi, lo) = match (hi, lo) {
                    (Some(h), Some(l)) => (h, l),
                    _ => return Err(bad("truncated \\x escape".to_string())),
                };
                let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                    .map_err(|_| bad(format!("invalid \\x escape \\x{hi}{lo}")))?;
                out.push(byte);
            }
            Some(other) => return Err(bad(format!("unknown escape \\{other}"))),
            None => return Err(bad("trailing backslash".to_string())),
        }
    }
    Ok(out)
}

/// A record in decoded coordinates. `start == end` marks an empty record
/// between adjacent separators; consumers may skip those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub index: u64,
    pub start: u64,
    pub end: u64,
    pub bytes: Vec<u8>,
}

pub struct RecordSplitter<R> {
    reader: R,
    separator: Separator,
    chunk: Vec<u8>,
    /// Unemitted bytes; `buf[0]` sits at decoded offset `buf_offset`.
    buf: Vec<u8>,
    buf_offset: u64,
    /// Scan resume point within `buf`.
    searched: usize,
    next_index: u64,
    eof: bool,
    finished: bool,
}

impl<R: Read> RecordSplitter<R> {
    pub fn new(reader: R, separator: Separator, chunk_size: usize) -> Self {
        Self {
            reader,
            separator,
            chunk: vec![0; chunk_size.max(1)],
            buf: Vec::new(),
            buf_offset: 0,
            searched: 0,
            next_index: 0,
            eof: false,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let n = self.reader.read(&mut self.chunk)?;
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&self.chunk[..n]);
        }
        Ok(())
    }

    fn emit(&mut self, sep_start: usize, sep_end: usize) -> Record {
        let bytes = self.buf[..sep_start].to_vec();
        let start = self.buf_offset;
        let end = start + sep_start as u64;
        self.buf.drain(..sep_end);
        self.buf_offset += sep_end as u64;
        self.searched = 0;

        let index = self.next_index;
        self.next_index += 1;
        Record {
            index,
            start,
            end,
            bytes,
        }
    }
}

impl<R: Read> Iterator for RecordSplitter<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let from = self.searched.saturating_sub(self.separator.lookbehind());
            match self.separator.find(&self.buf, from) {
                Some((start, end)) => {
                    // A regex match touching the unfinalized buffer end may
                    // still grow with more input; hold it back.
                    if self.separator.is_pattern() && end == self.buf.len() && !self.eof {
                        self.searched = start;
                        if let Err(e) = self.fill() {
                            self.finished = true;
                            let offset = self.buf_offset + self.buf.len() as u64;
                            return Some(Err(stream_error(offset, e)));
                        }
                        continue;
                    }
                    debug_assert!(end > start, "separator matched the empty string");
                    return Some(Ok(self.emit(start, end)));
                }
                None => {
                    if self.eof {
                        self.finished = true;
                        if self.buf.is_empty() {
                            return None;
                        }
                        // Trailing partial record with no terminal separator.
                        let bytes = std::mem::take(&mut self.buf);
                        let start = self.buf_offset;
                        let end = start + bytes.len() as u64;
                        self.buf_offset = end;
                        let index = self.next_index;
                        self.next_index += 1;
                        return Some(Ok(Record {
                            index,
                            start,
                            end,
                            bytes,
                        }));
                    }
                    self.searched = self.buf.len();
                    if let Err(e) = self.fill() {
                        self.finished = true;
                        let offset = self.buf_offset + self.buf.len() as u64;
                        return Some(Err(stream_error(offset, e)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn split(input: &[u8], sep: &str, chunk: usize) -> Vec<Record> {
        let splitter = RecordSplitter::new(
            Cursor::new(input.to_vec()),
            Separator::parse(sep).unwrap(),
            chunk,
        );
        splitter.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_literal_newline() {
        let records = split(b"alpha beta\ngamma alpha\n", r"\n", 64 * 1024);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bytes, b"alpha beta");
        assert_eq!((records[0].start, records[0].end), (0, 10));
        assert_eq!(records[1].bytes, b"gamma alpha");
        assert_eq!((records[1].start, records[1].end), (11, 22));
    }

    #[test]
    fn test_trailing_partial_record() {
        let records = split(b"one\ntwo", r"\n", 4);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].bytes, b"two");
        assert_eq!((records[1].start, records[1].end), (4, 7));
    }

    #[test]
    fn test_empty_records_between_adjacent_separators() {
        let records = split(b"a\n\nb\n", r"\n", 8);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].start, records[1].end);
        assert!(records[1].bytes.is_empty());
    }

    #[test]
    fn test_multibyte_literal_across_chunk_boundary() {
        // Separator "--" straddles the 4-byte chunk edge.
        let records = split(b"abc--def--g", r"--", 4);
        let bodies: Vec<&[u8]> = records.iter().map(|r| r.bytes.as_slice()).collect();
        assert_eq!(bodies, vec![b"abc".as_slice(), b"def", b"g"]);
    }

    #[test]
    fn test_regex_separator_spanning_chunk_boundary() {
        // A 5-dash separator straddling a 64-byte chunk edge must match once,
        // identically to a single-buffer reference split.
        let mut input = Vec::new();
        input.extend_from_slice(&b"x".repeat(61));
        input.extend_from_slice(b"-----");
        input.extend_from_slice(b"yyy---zzz");

        let chunked = split(&input, "re:---+", 64);
        let reference = split(&input, "re:---+", input.len() + 1);
        assert_eq!(chunked, reference);

        assert_eq!(chunked.len(), 3);
        assert_eq!(chunked[0].bytes, b"x".repeat(61));
        assert_eq!(chunked[1].bytes, b"yyy");
        assert_eq!(chunked[2].bytes, b"zzz");
        assert_eq!((chunked[1].start, chunked[1].end), (66, 69));
    }

    #[test]
    fn test_regex_at_stream_end_is_not_a_record() {
        let records = split(b"aaa---", "re:-+", 4);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bytes, b"aaa");
    }

    #[test]
    fn test_offsets_are_decoded_coordinates() {
        let input = b"11\n22\n33";
        for chunk in [1, 2, 3, 1024] {
            let records = split(input, r"\n", chunk);
            assert_eq!(records.len(), 3);
            for record in &records {
                let s = record.start as usize;
                let e = record.end as usize;
                assert_eq!(&input[s..e], record.bytes.as_slice());
                assert_eq!(record.index, records.iter().position(|r| r == record).unwrap() as u64);
            }
        }
    }

    #[test]
    fn test_separator_escapes() {
        assert_eq!(unescape(r"\n\t\r\0\\").unwrap(), b"\n\t\r\0\\");
        assert_eq!(unescape(r"\x1e").unwrap(), vec![0x1e]);
        assert_eq!(unescape("abc").unwrap(), b"abc");
        assert!(unescape(r"\q").is_err());
        assert!(unescape(r"\x1").is_err());
        assert!(unescape("a\\").is_err());
    }

    #[test]
    fn test_separator_compile_failures() {
        assert!(matches!(
            Separator::parse("re:["),
            Err(QuarryError::SeparatorCompile(_))
        ));
        assert!(matches!(
            Separator::parse("re:a*"),
            Err(QuarryError::SeparatorCompile(_))
        ));
        assert!(matches!(
            Separator::parse(""),
            Err(QuarryError::SeparatorCompile(_))
        ));
    }
}
