//! Codec registry: encoding tags resolved to byte-in/byte-out decoders.
//!
//! Every decoder consumes a sequential byte stream and produces a
//! [`DecodedStream`], a sequential reader that also reports how many decoded
//! bytes it has emitted. Offsets everywhere else in the crate live in this
//! decoded coordinate space, which is what makes re-decoding the source
//! during search line up with offsets recorded during import.

pub(crate) mod archive;
mod external;
mod legacy;
mod radix;
mod rotate;

pub use external::ExternalDecoder;

use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::str::FromStr;

use crate::error::{QuarryError, Result};

use legacy::{LineDecoder, LineFraming};
use radix::{Ascii85Decoder, Base64Decoder, HexDecoder};
use rotate::Rotate;

/// A recognized encoding, parsed from its string tag at startup.
///
/// Unknown tags fail with [`QuarryError::CodecUnsupported`] before any data
/// is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Gzip,
    Zlib,
    Bzip2,
    Brotli,
    Base64,
    Ascii85,
    Hex,
    /// Letter rotation right by `n` (decode direction), `rot:13` by default.
    Rot(u8),
    /// Letter rotation left by `n` on decode; `caesar:-n` rotates right.
    Caesar(i8),
    Uuencode,
    Xxencode,
    Zip,
    Tar,
}

/// A decoded byte stream: sequential reads plus a cheap position accessor
/// counting the bytes already emitted.
pub trait DecodedStream: Read {
    fn position(&self) -> u64;
}

impl Codec {
    /// Whether this codec decodes incrementally. Non-streaming codecs buffer
    /// the entire decoded output in memory; callers must consult this before
    /// choosing a strategy for large inputs.
    pub fn streaming(&self) -> bool {
        !matches!(self, Codec::Zip | Codec::Tar)
    }

    /// Environment variable naming an external decoder command usable above
    /// the large-file cutoff, if one exists for this codec.
    pub fn external_decoder_var(&self) -> Option<&'static str> {
        match self {
            Codec::Gzip => Some("QUARRY_GZIP_BIN"),
            Codec::Zlib => Some("QUARRY_ZLIB_BIN"),
            Codec::Bzip2 => Some("QUARRY_BZIP2_BIN"),
            Codec::Brotli => Some("QUARRY_BROTLI_BIN"),
            _ => None,
        }
    }

    /// Wrap `input` in this codec's decoder.
    ///
    /// Streaming codecs return immediately; `zip`/`tar` read and decode the
    /// whole input here.
    pub fn decoder<'r>(&self, input: Box<dyn Read + 'r>) -> Result<Box<dyn DecodedStream + 'r>> {
        Ok(match self {
            Codec::None => Box::new(Counting::new(input)),
            Codec::Gzip => Box::new(Counting::new(flate2::read::MultiGzDecoder::new(input))),
            Codec::Zlib => Box::new(Counting::new(flate2::read::ZlibDecoder::new(input))),
            Codec::Bzip2 => Box::new(Counting::new(bzip2::read::MultiBzDecoder::new(input))),
            Codec::Brotli => Box::new(Counting::new(brotli::Decompressor::new(input, 8 * 1024))),
            Codec::Base64 => Box::new(Counting::new(Base64Decoder::new(input))),
            Codec::Ascii85 => Box::new(Counting::new(Ascii85Decoder::new(input))),
            Codec::Hex => Box::new(Counting::new(HexDecoder::new(input))),
            Codec::Rot(n) => Box::new(Counting::new(Rotate::right(*n, input))),
            Codec::Caesar(n) => Box::new(Counting::new(Rotate::left(*n, input))),
            Codec::Uuencode => Box::new(Counting::new(LineDecoder::new(LineFraming::Uu, input))),
            Codec::Xxencode => Box::new(Counting::new(LineDecoder::new(LineFraming::Xx, input))),
            Codec::Zip => {
                let bytes = archive::unzip_first(input).map_err(|e| QuarryError::decode(0, e))?;
                Box::new(Counting::new(Cursor::new(bytes)))
            }
            Codec::Tar => {
                let bytes = archive::untar_first(input).map_err(|e| QuarryError::decode(0, e))?;
                Box::new(Counting::new(Cursor::new(bytes)))
            }
        })
    }

    /// Decode `input` to completion into memory.
    pub fn decode_all<'r>(&self, input: impl Read + 'r) -> Result<Vec<u8>> {
        let mut stream = self.decoder(Box::new(input))?;
        let mut out = Vec::new();
        stream
            .read_to_end(&mut out)
            .map_err(|e| stream_error(stream.position(), e))?;
        Ok(out)
    }

    /// Encode `data` for fixture generation. Archives and the line-framed
    /// legacy formats have no encode direction.
    pub fn encode_all(&self, data: &[u8]) -> Result<Vec<u8>> {
        use base64::Engine as _;
        match self {
            Codec::None => Ok(data.to_vec()),
            Codec::Gzip => {
                let mut enc =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(data)?;
                Ok(enc.finish()?)
            }
            Codec::Zlib => {
                let mut enc =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                enc.write_all(data)?;
                Ok(enc.finish()?)
            }
            Codec::Bzip2 => {
                let mut enc =
                    bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                enc.write_all(data)?;
                Ok(enc.finish()?)
            }
            Codec::Brotli => {
                let mut out = Vec::new();
                {
                    let mut enc = brotli::CompressorWriter::new(&mut out, 8 * 1024, 5, 22);
                    enc.write_all(data)?;
                }
                Ok(out)
            }
            Codec::Base64 => Ok(base64::engine::general_purpose::STANDARD
                .encode(data)
                .into_bytes()),
            Codec::Ascii85 => Ok(radix::ascii85_encode(data)),
            Codec::Hex => Ok(hex::encode(data).into_bytes()),
            // Decode rotates right by n, so encode rotates the other way.
            Codec::Rot(n) => Ok(rotate::rotate_bytes(data, 26 - i16::from(*n))),
            Codec::Caesar(n) => Ok(rotate::rotate_bytes(data, i16::from(*n))),
            Codec::Uuencode | Codec::Xxencode | Codec::Zip | Codec::Tar => Err(
                QuarryError::InvalidRequest(format!("encoding `{self}` is not generatable")),
            ),
        }
    }
}

impl FromStr for Codec {
    type Err = QuarryError;

    fn from_str(tag: &str) -> Result<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        let unsupported = || QuarryError::CodecUnsupported(tag.clone());

        Ok(match tag.as_str() {
            "none" => Codec::None,
            "gzip" | "gz" => Codec::Gzip,
            "zlib" => Codec::Zlib,
            "bzip2" | "bz2" => Codec::Bzip2,
            "brotli" => Codec::Brotli,
            "base64" => Codec::Base64,
            "ascii85" | "a85" => Codec::Ascii85,
            "hex" | "hexadecimal" | "base16" => Codec::Hex,
            "uuencode" | "uu" => Codec::Uuencode,
            "xxencode" | "xx" => Codec::Xxencode,
            "zip" => Codec::Zip,
            "tar" => Codec::Tar,
            _ => {
                if let Some(rest) = tag.strip_prefix("rot") {
                    let rest = rest.strip_prefix(':').unwrap_or(rest);
                    let n: i32 = if rest.is_empty() {
                        13
                    } else {
                        rest.parse().map_err(|_| unsupported())?
                    };
                    Codec::Rot(n.rem_euclid(26) as u8)
                } else if let Some(rest) = tag.strip_prefix("caesar") {
                    let rest = rest.strip_prefix(':').unwrap_or(rest);
                    let n: i8 = if rest.is_empty() {
                        3
                    } else {
                        rest.parse().map_err(|_| unsupported())?
                    };
                    if !(-24..=24).contains(&n) {
                        return Err(unsupported());
                    }
                    Codec::Caesar(n)
                } else {
                    return Err(unsupported());
                }
            }
        })
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::None => write!(f, "none"),
            Codec::Gzip => write!(f, "gzip"),
            Codec::Zlib => write!(f, "zlib"),
            Codec::Bzip2 => write!(f, "bzip2"),
            Codec::Brotli => write!(f, "brotli"),
            Codec::Base64 => write!(f, "base64"),
            Codec::Ascii85 => write!(f, "ascii85"),
            Codec::Hex => write!(f, "hex"),
            Codec::Rot(n) => write!(f, "rot:{n}"),
            Codec::Caesar(n) => write!(f, "caesar:{n}"),
            Codec::Uuencode => write!(f, "uuencode"),
            Codec::Xxencode => write!(f, "xxencode"),
            Codec::Zip => write!(f, "zip"),
            Codec::Tar => write!(f, "tar"),
        }
    }
}

/// Read adapter that counts emitted bytes; the concrete [`DecodedStream`]
/// behind every codec.
pub struct Counting<R> {
    inner: R,
    emitted: u64,
}

impl<R: Read> Counting<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, emitted: 0 }
    }
}

impl<R: Read> Read for Counting<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.emitted += n as u64;
        Ok(n)
    }
}

impl<R: Read> DecodedStream for Counting<R> {
    fn position(&self) -> u64 {
        self.emitted
    }
}

impl<T: DecodedStream + ?Sized> DecodedStream for Box<T> {
    fn position(&self) -> u64 {
        (**self).position()
    }
}

/// Map a read failure from a decoded stream to a crate error, pinning decode
/// failures to the decoded offset where they surfaced.
pub(crate) fn stream_error(offset: u64, err: io::Error) -> QuarryError {
    if err.kind() == io::ErrorKind::InvalidData {
        QuarryError::decode(offset, err)
    } else {
        QuarryError::Io(err)
    }
}
