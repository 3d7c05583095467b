//! External streaming decoder: the same decoded-stream contract, backed by a
//! spawned subprocess.
//!
//! The search engine selects this above the large-file cutoff when the
//! operator configured a decoder command (for example
//! `QUARRY_GZIP_BIN="gzip -dc"`). Output is consumed through the child's
//! stdout pipe, so memory stays bounded by the pipe buffer regardless of
//! input size.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::error::{QuarryError, Result};

#[derive(Debug)]
pub struct ExternalDecoder {
    child: Child,
    stdout: ChildStdout,
}

impl ExternalDecoder {
    /// Spawn `command` (program plus whitespace-separated arguments) with the
    /// source path appended, stdout piped.
    pub fn spawn(command: &str, source: &Path) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            QuarryError::InvalidRequest("external decoder command is empty".to_string())
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            QuarryError::Io(io::Error::other("external decoder has no stdout pipe"))
        })?;

        Ok(Self { child, stdout })
    }
}

impl Read for ExternalDecoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 {
            // Surface a decoder failure instead of silently truncating.
            if let Ok(Some(status)) = self.child.try_wait() {
                if !status.success() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("external decoder exited with {status}"),
                    ));
                }
            }
        }
        Ok(n)
    }
}

impl Drop for ExternalDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
