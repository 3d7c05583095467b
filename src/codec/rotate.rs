//! rot / caesar letter rotation over ASCII letters; every other byte passes
//! through untouched.

use std::io::{self, Read};

/// Rotate a letter by `shift` positions (any sign), preserving case.
fn rotate_byte(b: u8, shift: i16) -> u8 {
    let base = match b {
        b'A'..=b'Z' => b'A',
        b'a'..=b'z' => b'a',
        _ => return b,
    };
    let offset = i16::from(b - base);
    base + (offset + shift).rem_euclid(26) as u8
}

/// Rotate every letter in `data` by `shift`.
pub fn rotate_bytes(data: &[u8], shift: i16) -> Vec<u8> {
    data.iter().map(|&b| rotate_byte(b, shift)).collect()
}

/// Streaming per-byte rotation decoder.
pub struct Rotate<R> {
    inner: R,
    shift: i16,
}

impl<R: Read> Rotate<R> {
    /// `rot:N` decodes by rotating right.
    pub fn right(n: u8, inner: R) -> Self {
        Self {
            inner,
            shift: i16::from(n),
        }
    }

    /// `caesar:N` decodes by rotating left.
    pub fn left(n: i8, inner: R) -> Self {
        Self {
            inner,
            shift: -i16::from(n),
        }
    }
}

impl<R: Read> Read for Rotate<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for b in &mut buf[..n] {
            *b = rotate_byte(*b, self.shift);
        }
        Ok(n)
    }
}
