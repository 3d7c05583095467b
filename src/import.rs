//! Streaming import pipeline: codec -> splitter -> tokenizer -> catalog.
//!
//! Memory held at any point: one in-flight record, the splitter's look-behind
//! window, and one uncommitted write batch. Peak residency is a function of
//! the largest record and the batch size, never of the source's total size.

use std::io::Read;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::catalog::{AcuityReport, Catalog};
use crate::codec::Codec;
use crate::config::{DEFAULT_ACUITY, DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE};
use crate::error::Result;
use crate::splitter::{RecordSplitter, Separator};
use crate::tokenizer;

pub struct ImportOptions {
    pub encoding: Codec,
    pub separator: Separator,
    pub chunk_size: usize,
    /// Minimum per-token occurrence count kept after import; 0 disables the
    /// compaction pass.
    pub acuity: u64,
    /// Records per catalog commit.
    pub batch_size: usize,
    pub cancel: CancelToken,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            encoding: Codec::None,
            separator: Separator::Literal(vec![b'\n']),
            chunk_size: DEFAULT_CHUNK_SIZE,
            acuity: DEFAULT_ACUITY,
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub records: u64,
    pub tokens_before: u64,
    pub tokens_after: u64,
    pub occurrences: u64,
    pub elapsed: Duration,
    pub acuity: Option<AcuityReport>,
}

/// Reset `catalog` and populate it from `input`.
///
/// `source_path` is recorded for search-time re-decoding; pass `<stdin>`
/// for piped input (searches will then need a source override).
///
/// Any error aborts the import and leaves a committed-prefix catalog that
/// must be discarded and re-run; the completeness marker stays unset.
pub fn run(
    catalog: &mut Catalog,
    input: impl Read,
    source_path: &str,
    options: &ImportOptions,
) -> Result<ImportSummary> {
    let started = Instant::now();
    let tag = options.encoding.to_string();
    info!(
        source = source_path,
        encoding = %tag,
        chunk_size = options.chunk_size,
        "starting import"
    );

    catalog.reset()?;
    catalog.put_encoding(&tag)?;
    catalog.put_source(source_path, &tag)?;

    let decoded = options.encoding.decoder(Box::new(input))?;
    let splitter = RecordSplitter::new(decoded, options.separator.clone(), options.chunk_size);

    let batch_size = options.batch_size.max(1) as u64;
    let mut records = 0u64;
    for record in splitter {
        let record = record?;
        if record.start == record.end {
            continue;
        }

        let record_id = catalog.append_record(record.start, record.end)?;
        for token in tokenizer::unique_tokens(&record.bytes) {
            let token_id = catalog.upsert_token(&token)?;
            catalog.add_posting(token_id, record_id)?;
        }

        records += 1;
        if records % batch_size == 0 {
            options.cancel.check()?;
            catalog.commit()?;
            debug!(records, "committed batch");
            if records % 100_000 == 0 {
                info!(records, "import progress");
            }
        }
    }
    options.cancel.check()?;
    catalog.commit()?;

    let before = catalog.stats();
    let acuity = if options.acuity > 0 {
        Some(catalog.apply_acuity(options.acuity)?)
    } else {
        None
    };
    catalog.mark_complete()?;

    let after = catalog.stats();
    let summary = ImportSummary {
        records: after.records,
        tokens_before: before.tokens,
        tokens_after: after.tokens,
        occurrences: after.occurrences,
        elapsed: started.elapsed(),
        acuity,
    };
    info!(
        records = summary.records,
        tokens_before = summary.tokens_before,
        tokens_after = summary.tokens_after,
        occurrences = summary.occurrences,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "import finished"
    );
    Ok(summary)
}
