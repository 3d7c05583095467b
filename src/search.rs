//! Search: resolve a term to record ranges, then materialize the records by
//! replaying the source through its codec.
//!
//! The extraction strategy depends on the codec and the encoded size:
//! streaming codecs decode in-process (or through a configured external
//! decoder subprocess above the large-file cutoff); non-streaming codecs
//! fall back to a full-buffer decode whose memory cost is logged.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::catalog::Catalog;
use crate::codec::{Codec, Counting, DecodedStream, ExternalDecoder};
use crate::config::{DEFAULT_CHUNK_SIZE, LARGE_FILE_CUTOFF};
use crate::error::{QuarryError, Result};
use crate::extract::{merge_spans, RangeExtractor, Span};

pub struct SearchOptions {
    /// Read the records from this path instead of the one recorded at
    /// import time (the catalog offsets must still apply).
    pub source_override: Option<PathBuf>,
    pub chunk_size: usize,
    pub cancel: CancelToken,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            source_override: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record_id: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Materialized records in ascending record id order.
    pub hits: Vec<SearchHit>,
    /// Records the index matched; larger than `hits.len()` only when a
    /// decode error cut materialization short.
    pub matched: usize,
    pub elapsed: Duration,
}

pub struct Searcher<'a> {
    catalog: &'a Catalog,
}

impl<'a> Searcher<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn search(&self, term: &str, options: &SearchOptions) -> Result<SearchOutcome> {
        let started = Instant::now();
        let term = term.trim().to_ascii_lowercase();
        self.catalog.verify()?;
        if !self.catalog.is_complete()? {
            warn!("catalog is partial (import did not finish); results reflect the committed prefix");
        }

        let mut record_ids = self.catalog.postings_for(&term)?;
        record_ids.dedup();
        if record_ids.is_empty() {
            info!(%term, "term not in dictionary");
            return Ok(SearchOutcome {
                hits: Vec::new(),
                matched: 0,
                elapsed: started.elapsed(),
            });
        }

        // Ascending record id order is source order, so ranges come out
        // already sorted by start; merging stays as a defensive pass.
        let mut ranges = Vec::with_capacity(record_ids.len());
        for &id in &record_ids {
            let (start, end) = self.catalog.record_range(id)?;
            ranges.push((id, Span::new(start, end)));
        }
        let spans = merge_spans(ranges.iter().map(|(_, s)| *s).collect());

        let source = self.catalog.source_info()?;
        let codec: Codec = source.encoding.parse()?;
        let path = options
            .source_override
            .clone()
            .unwrap_or_else(|| PathBuf::from(&source.path));

        let stream = open_decoded_stream(&codec, &path, options.chunk_size)?;
        let mut extractor = RangeExtractor::new(stream, options.chunk_size, options.cancel.clone());

        let mut hits = Vec::with_capacity(ranges.len());
        let mut pending = ranges.iter().peekable();
        'spans: for span in spans {
            let bytes = match extractor.copy_span(span) {
                Ok(bytes) => bytes,
                Err(QuarryError::Decode { offset, reason }) => {
                    // Keep the prefix of results already materialized.
                    warn!(
                        offset,
                        %reason,
                        "decode error during range extraction; skipping remaining ranges"
                    );
                    break 'spans;
                }
                Err(e) => return Err(e),
            };
            while let Some((id, range)) = pending.peek() {
                if !span.contains(range) {
                    break;
                }
                let lo = (range.start - span.start) as usize;
                let hi = (range.end - span.start) as usize;
                hits.push(SearchHit {
                    record_id: *id,
                    bytes: bytes[lo..hi].to_vec(),
                });
                pending.next();
            }
        }

        let outcome = SearchOutcome {
            matched: record_ids.len(),
            hits,
            elapsed: started.elapsed(),
        };
        info!(
            %term,
            matched = outcome.matched,
            materialized = outcome.hits.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "search finished"
        );
        Ok(outcome)
    }
}

/// Open the decoded view of `path` using the strategy table.
fn open_decoded_stream(
    codec: &Codec,
    path: &Path,
    chunk_size: usize,
) -> Result<Box<dyn DecodedStream>> {
    if !codec.streaming() {
        warn!(
            codec = %codec,
            "non-streaming codec: decoding the entire source into memory"
        );
        let file = File::open(path)?;
        let decoded = codec.decode_all(BufReader::new(file))?;
        return Ok(Box::new(Counting::new(Cursor::new(decoded))));
    }

    let encoded_size = std::fs::metadata(path)?.len();
    if encoded_size > LARGE_FILE_CUTOFF {
        if let Some(var) = codec.external_decoder_var() {
            if let Ok(command) = std::env::var(var) {
                info!(%command, encoded_size, "using external decoder for large source");
                let child = ExternalDecoder::spawn(&command, path)?;
                return Ok(Box::new(Counting::new(child)));
            }
        }
    }

    let file = BufReader::with_capacity(chunk_size.max(1), File::open(path)?);
    codec.decoder(Box::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{self, ImportOptions};
    use std::io::Write;
    use tempfile::TempDir;

    fn import_file(content: &[u8], options: &ImportOptions) -> (TempDir, Catalog, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.bin");
        let mut file = File::create(&source).unwrap();
        file.write_all(content).unwrap();
        drop(file);

        let mut catalog = Catalog::open(tmp.path().join("catalog")).unwrap();
        import::run(
            &mut catalog,
            File::open(&source).unwrap(),
            source.to_str().unwrap(),
            options,
        )
        .unwrap();
        (tmp, catalog, source)
    }

    fn no_acuity() -> ImportOptions {
        ImportOptions {
            acuity: 0,
            ..ImportOptions::default()
        }
    }

    #[test]
    fn test_search_returns_records_in_source_order() {
        let (_tmp, catalog, _) =
            import_file(b"alpha beta\ngamma alpha\n", &no_acuity());
        let searcher = Searcher::new(&catalog);

        let outcome = searcher.search("alpha", &SearchOptions::default()).unwrap();
        assert_eq!(outcome.matched, 2);
        let bodies: Vec<&[u8]> = outcome.hits.iter().map(|h| h.bytes.as_slice()).collect();
        assert_eq!(bodies, vec![b"alpha beta".as_slice(), b"gamma alpha"]);
        assert_eq!(outcome.hits[0].record_id, 0);
        assert_eq!(outcome.hits[1].record_id, 1);

        let outcome = searcher.search("gamma", &SearchOptions::default()).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].bytes, b"gamma alpha");
    }

    #[test]
    fn test_missing_term_is_empty_not_error() {
        let (_tmp, catalog, _) = import_file(b"alpha\n", &no_acuity());
        let outcome = Searcher::new(&catalog)
            .search("delta", &SearchOptions::default())
            .unwrap();
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.matched, 0);
    }

    #[test]
    fn test_term_is_normalized_to_lowercase() {
        let (_tmp, catalog, _) = import_file(b"Alpha\n", &no_acuity());
        let outcome = Searcher::new(&catalog)
            .search("  ALPHA ", &SearchOptions::default())
            .unwrap();
        assert_eq!(outcome.hits.len(), 1);
    }

    #[test]
    fn test_adjacent_records_merge_into_one_span() {
        // Single-byte separator keeps ranges non-adjacent; a two-record term
        // still exercises span slicing within one merged extraction pass.
        let (_tmp, catalog, _) = import_file(b"x y\nx z\nother\n", &no_acuity());
        let outcome = Searcher::new(&catalog)
            .search("x", &SearchOptions::default())
            .unwrap();
        let bodies: Vec<&[u8]> = outcome.hits.iter().map(|h| h.bytes.as_slice()).collect();
        assert_eq!(bodies, vec![b"x y".as_slice(), b"x z"]);
    }

    #[test]
    fn test_source_override() {
        let (tmp, catalog, source) = import_file(b"alpha beta\n", &no_acuity());
        let moved = tmp.path().join("moved.bin");
        std::fs::rename(&source, &moved).unwrap();

        // Recorded path is gone now.
        assert!(Searcher::new(&catalog)
            .search("alpha", &SearchOptions::default())
            .is_err());

        let options = SearchOptions {
            source_override: Some(moved),
            ..SearchOptions::default()
        };
        let outcome = Searcher::new(&catalog).search("alpha", &options).unwrap();
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].bytes, b"alpha beta");
    }

    #[test]
    fn test_truncated_source_preserves_result_prefix() {
        let (tmp, catalog, source) = import_file(b"alpha one\nfiller\nalpha two\n", &no_acuity());
        // Chop the source so the second match's range runs past EOF.
        let content = std::fs::read(&source).unwrap();
        std::fs::write(&source, &content[..12]).unwrap();
        let _ = tmp;

        let outcome = Searcher::new(&catalog)
            .search("alpha", &SearchOptions::default())
            .unwrap();
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].bytes, b"alpha one");
    }
}
