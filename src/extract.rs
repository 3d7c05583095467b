//! Forward-cursor range extraction over a decoded stream.
//!
//! The extractor never seeks: it advances a single cursor through the
//! decoded bytes, discarding until each span's start and copying until its
//! end. Callers hand it spans sorted ascending and non-overlapping, which
//! [`merge_spans`] guarantees.

use crate::cancel::CancelToken;
use crate::codec::{stream_error, DecodedStream};
use crate::error::{QuarryError, Result};

/// A half-open byte range `[start, end)` in decoded coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, other: &Span) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// Sort spans by start and merge overlapping or adjacent ones.
pub fn merge_spans(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_by_key(|s| (s.start, s.end));
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

pub struct RangeExtractor<S> {
    stream: S,
    cursor: u64,
    scratch: Vec<u8>,
    cancel: CancelToken,
}

impl<S: DecodedStream> RangeExtractor<S> {
    pub fn new(stream: S, chunk_size: usize, cancel: CancelToken) -> Self {
        Self {
            stream,
            cursor: 0,
            scratch: vec![0; chunk_size.max(1)],
            cancel,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Advance to `span.start` and copy `span` out of the stream. Spans must
    /// arrive in ascending order.
    pub fn copy_span(&mut self, span: Span) -> Result<Vec<u8>> {
        debug_assert!(span.start >= self.cursor, "spans must be ascending");

        while self.cursor < span.start {
            self.cancel.check()?;
            let want = (span.start - self.cursor).min(self.scratch.len() as u64) as usize;
            let n = self
                .stream
                .read(&mut self.scratch[..want])
                .map_err(|e| stream_error(self.stream.position(), e))?;
            if n == 0 {
                return Err(QuarryError::decode(
                    self.cursor,
                    "decoded stream ended before range start",
                ));
            }
            self.cursor += n as u64;
        }

        let mut out = Vec::with_capacity(span.len().min(1 << 20) as usize);
        while self.cursor < span.end {
            self.cancel.check()?;
            let want = (span.end - self.cursor).min(self.scratch.len() as u64) as usize;
            let n = self
                .stream
                .read(&mut self.scratch[..want])
                .map_err(|e| stream_error(self.stream.position(), e))?;
            if n == 0 {
                return Err(QuarryError::decode(
                    self.cursor,
                    "decoded stream ended inside range",
                ));
            }
            out.extend_from_slice(&self.scratch[..n]);
            self.cursor += n as u64;
        }
        Ok(out)
    }
}
