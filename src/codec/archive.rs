//! zip / tar archive codecs: the decoded stream is the first regular
//! member's bytes.
//!
//! Both formats need the whole archive in memory (zip reads its central
//! directory from the end), so these codecs declare `streaming = false` and
//! carry a documented memory cost of encoded size + first member size.

use std::io::{self, Cursor, Read};

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Extract the first regular file from a zip archive.
pub fn unzip_first(mut input: impl Read) -> io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;

    let mut archive = zip::ZipArchive::new(Cursor::new(raw))
        .map_err(|e| invalid(format!("invalid zip archive: {e}")))?;
    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .map_err(|e| invalid(format!("invalid zip member: {e}")))?;
        if !member.is_file() {
            continue;
        }
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes)?;
        return Ok(bytes);
    }
    Err(invalid("zip archive contains no regular file"))
}

/// Extract the first regular file from a tar archive.
pub fn untar_first(mut input: impl Read) -> io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;

    let mut archive = tar::Archive::new(Cursor::new(raw));
    for entry in archive.entries()? {
        let mut entry = entry.map_err(|e| invalid(format!("invalid tar entry: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        return Ok(bytes);
    }
    Err(invalid("tar archive contains no regular file"))
}

/// Sniff archive payloads so the fixture generator can unwrap them before
/// encoding.
pub fn sniff(data: &[u8]) -> Option<ArchiveKind> {
    if data.starts_with(b"PK\x03\x04") {
        Some(ArchiveKind::Zip)
    } else if data.len() > 262 && &data[257..262] == b"ustar" {
        Some(ArchiveKind::Tar)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
}
