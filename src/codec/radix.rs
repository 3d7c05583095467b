//! Streaming textual decoders: base64, ascii85, hex.
//!
//! All three ignore interior whitespace, decode complete groups as soon as
//! they are available, and fail the stream on an invalid trailing group.

use std::io::{self, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

const SCRATCH_SIZE: usize = 8 * 1024;

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Shared plumbing: raw reads are whitespace-filtered into `clean`, a
/// format-specific step turns complete groups of `clean` into `out`, and
/// `read` serves from `out`.
macro_rules! radix_read_impl {
    ($ty:ident) => {
        impl<R: Read> Read for $ty<R> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                while self.out_pos >= self.out.len() {
                    if self.done {
                        return Ok(0);
                    }
                    self.out.clear();
                    self.out_pos = 0;

                    let n = self.inner.read(&mut self.scratch)?;
                    if n == 0 {
                        self.done = true;
                        self.drain(true)?;
                    } else {
                        for &b in &self.scratch[..n] {
                            if !b.is_ascii_whitespace() {
                                self.clean.push(b);
                            }
                        }
                        self.drain(false)?;
                    }
                }

                let n = buf.len().min(self.out.len() - self.out_pos);
                buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
                self.out_pos += n;
                Ok(n)
            }
        }
    };
}

pub struct Base64Decoder<R> {
    inner: R,
    scratch: Vec<u8>,
    clean: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
    /// A padded quad has been decoded; any further input is an error.
    terminated: bool,
}

impl<R: Read> Base64Decoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            scratch: vec![0; SCRATCH_SIZE],
            clean: Vec::new(),
            out: Vec::new(),
            out_pos: 0,
            done: false,
            terminated: false,
        }
    }

    fn drain(&mut self, at_eof: bool) -> io::Result<()> {
        if self.terminated {
            if self.clean.is_empty() {
                return Ok(());
            }
            return Err(invalid("base64 data after padding"));
        }

        let mut take = self.clean.len() / 4 * 4;
        if at_eof {
            if self.clean.len() % 4 != 0 {
                return Err(invalid("truncated trailing base64 group"));
            }
            take = self.clean.len();
        }

        // Padding may only close the final quad of the stream; a quad whose
        // `=` has not yet seen its fourth character stays pending.
        if let Some(p) = self.clean[..take].iter().position(|&b| b == b'=') {
            let quad_end = (p / 4 + 1) * 4;
            if quad_end <= take {
                take = quad_end;
                self.terminated = true;
            } else {
                take = p / 4 * 4;
            }
        }

        if take == 0 {
            return Ok(());
        }
        let decoded = STANDARD
            .decode(&self.clean[..take])
            .map_err(|e| invalid(format!("invalid base64: {e}")))?;
        self.out.extend_from_slice(&decoded);
        self.clean.drain(..take);

        if self.terminated && !self.clean.is_empty() {
            return Err(invalid("base64 data after padding"));
        }
        Ok(())
    }
}

radix_read_impl!(Base64Decoder);

pub struct HexDecoder<R> {
    inner: R,
    scratch: Vec<u8>,
    clean: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
}

impl<R: Read> HexDecoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            scratch: vec![0; SCRATCH_SIZE],
            clean: Vec::new(),
            out: Vec::new(),
            out_pos: 0,
            done: false,
        }
    }

    fn drain(&mut self, at_eof: bool) -> io::Result<()> {
        if at_eof && self.clean.len() % 2 != 0 {
            return Err(invalid("truncated trailing hex pair"));
        }
        let take = self.clean.len() / 2 * 2;
        if take == 0 {
            return Ok(());
        }
        let decoded = hex::decode(&self.clean[..take])
            .map_err(|e| invalid(format!("invalid hex: {e}")))?;
        self.out.extend_from_slice(&decoded);
        self.clean.drain(..take);
        Ok(())
    }
}

radix_read_impl!(HexDecoder);

pub struct Ascii85Decoder<R> {
    inner: R,
    scratch: Vec<u8>,
    clean: Vec<u8>,
    out: Vec<u8>,
    out_pos: usize,
    done: bool,
    group: Vec<u8>,
}

impl<R: Read> Ascii85Decoder<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            scratch: vec![0; SCRATCH_SIZE],
            clean: Vec::new(),
            out: Vec::new(),
            out_pos: 0,
            done: false,
            group: Vec::with_capacity(5),
        }
    }

    fn decode_group(group: &[u8]) -> io::Result<[u8; 4]> {
        let mut value: u64 = 0;
        for &c in group {
            value = value * 85 + u64::from(c - b'!');
        }
        if value > u64::from(u32::MAX) {
            return Err(invalid("ascii85 group overflows 32 bits"));
        }
        Ok((value as u32).to_be_bytes())
    }

    fn drain(&mut self, at_eof: bool) -> io::Result<()> {
        for i in 0..self.clean.len() {
            let c = self.clean[i];
            match c {
                b'z' if self.group.is_empty() => self.out.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => return Err(invalid("`z` inside an ascii85 group")),
                b'!'..=b'u' => {
                    self.group.push(c);
                    if self.group.len() == 5 {
                        let bytes = Self::decode_group(&self.group)?;
                        self.out.extend_from_slice(&bytes);
                        self.group.clear();
                    }
                }
                _ => return Err(invalid(format!("invalid ascii85 byte 0x{c:02x}"))),
            }
        }
        self.clean.clear();

        if at_eof && !self.group.is_empty() {
            let n = self.group.len();
            if n == 1 {
                return Err(invalid("truncated trailing ascii85 group"));
            }
            while self.group.len() < 5 {
                self.group.push(b'u');
            }
            let bytes = Self::decode_group(&self.group)?;
            self.out.extend_from_slice(&bytes[..n - 1]);
            self.group.clear();
        }
        Ok(())
    }
}

radix_read_impl!(Ascii85Decoder);

/// ascii85 encode, emitting `z` for all-zero groups like the classic tools.
pub fn ascii85_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 5 + 5);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut value = u32::from_be_bytes(word);

        if value == 0 && chunk.len() == 4 {
            out.push(b'z');
            continue;
        }

        let mut digits = [0u8; 5];
        for d in digits.iter_mut().rev() {
            *d = b'!' + (value % 85) as u8;
            value /= 85;
        }
        out.extend_from_slice(&digits[..chunk.len() + 1]);
    }
    out
}
