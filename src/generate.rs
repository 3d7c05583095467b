//! Test fixture generation: encode a payload and repeat it to a target size.
//!
//! The payload comes from a file (archives are unwrapped to their first
//! regular member first) or, with no input at all, from a megabyte of random
//! bytes. Output goes to a caller-named path or an OS-chosen temporary file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::RngCore;
use tracing::{debug, info};

use crate::codec::{archive, Codec};
use crate::error::{QuarryError, Result};

const RANDOM_PAYLOAD_SIZE: usize = 1024 * 1024;

pub struct GenerateOptions {
    pub encoding: Codec,
    pub target_size: u64,
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GenerateSummary {
    pub path: PathBuf,
    pub bytes_written: u64,
    pub repetitions: u64,
}

/// Build a fixture file of at least `target_size` bytes (one repetition
/// minimum, so tiny targets still produce a valid encoded stream).
pub fn run(input: Option<&Path>, options: &GenerateOptions) -> Result<GenerateSummary> {
    if options.encoding == Codec::None && input.is_none() {
        return Err(QuarryError::InvalidRequest(
            "generate needs an encoding or an input file".to_string(),
        ));
    }

    let payload = match input {
        Some(path) => std::fs::read(path)?,
        None => {
            let mut bytes = vec![0u8; RANDOM_PAYLOAD_SIZE];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        }
    };
    if payload.is_empty() {
        return Err(QuarryError::InvalidRequest(
            "generate payload is empty".to_string(),
        ));
    }

    // Unwrap archive payloads so the encoded stream is the member's bytes.
    let payload = match archive::sniff(&payload) {
        Some(archive::ArchiveKind::Zip) => {
            debug!("payload is a zip archive; extracting first member");
            archive::unzip_first(std::io::Cursor::new(payload))
                .map_err(|e| QuarryError::decode(0, e))?
        }
        Some(archive::ArchiveKind::Tar) => {
            debug!("payload is a tar archive; extracting first member");
            archive::untar_first(std::io::Cursor::new(payload))
                .map_err(|e| QuarryError::decode(0, e))?
        }
        None => payload,
    };

    let encoded = options.encoding.encode_all(&payload)?;
    let repetitions = (options.target_size / encoded.len() as u64).max(1);

    let path = match &options.output {
        Some(path) => path.clone(),
        None => {
            let file = tempfile::Builder::new()
                .prefix("quarry_")
                .suffix(".bin")
                .tempfile()?;
            file.into_temp_path().keep().map_err(|e| {
                QuarryError::Io(std::io::Error::other(format!(
                    "cannot keep temporary fixture: {e}"
                )))
            })?
        }
    };

    info!(
        path = %path.display(),
        encoding = %options.encoding,
        unit = encoded.len(),
        repetitions,
        "writing fixture"
    );
    let mut writer = BufWriter::new(File::create(&path)?);
    for _ in 0..repetitions {
        writer.write_all(&encoded)?;
    }
    writer.flush()?;

    Ok(GenerateSummary {
        path,
        bytes_written: encoded.len() as u64 * repetitions,
        repetitions,
    })
}
