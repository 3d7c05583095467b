//! Record tokenization: lowercase maximal runs of ASCII alphanumerics.
//!
//! Bytes outside `[A-Za-z0-9]` separate tokens, so invalid UTF-8 needs no
//! special handling.

use std::collections::BTreeSet;

/// Iterate the tokens of a record's decoded bytes, in order of appearance.
pub fn tokens(bytes: &[u8]) -> Tokens<'_> {
    Tokens { bytes, pos: 0 }
}

/// The per-record deduplicated token set.
///
/// Each token contributes at most one posting per record; sorted order gives
/// the catalog write path locality in the token keyspace.
pub fn unique_tokens(bytes: &[u8]) -> BTreeSet<String> {
    tokens(bytes).collect()
}

pub struct Tokens<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.pos < self.bytes.len() && !self.bytes[self.pos].is_ascii_alphanumeric() {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() {
            return None;
        }

        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphanumeric() {
            self.pos += 1;
        }

        let mut token = String::with_capacity(self.pos - start);
        for &b in &self.bytes[start..self.pos] {
            token.push(b.to_ascii_lowercase() as char);
        }
        Some(token)
    }
}
