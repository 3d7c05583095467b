use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{QuarryError, Result};

const META_ENCODING: &[u8] = b"encoding";
const META_SOURCE: &[u8] = b"source";
const META_COUNTERS: &[u8] = b"counters";
const META_GENERATION: &[u8] = b"generation";
const META_COMPLETE: &[u8] = b"complete";

/// Value stored under a token's text in the token dictionary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TokenEntry {
    id: u64,
    count: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Counters {
    records: u64,
    tokens: u64,
    next_token_id: u64,
    postings: u64,
}

/// Row counts as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    pub records: u64,
    pub tokens: u64,
    pub occurrences: u64,
}

/// Source descriptor written once per import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    pub path: String,
    pub encoding: String,
}

/// Outcome of an acuity compaction pass.
#[derive(Debug, Clone, Copy)]
pub struct AcuityReport {
    pub threshold: u64,
    pub tokens_before: u64,
    pub tokens_removed: u64,
    pub tokens_after: u64,
    pub elapsed: Duration,
}

/// Single-writer, multi-reader inverted index over one source file.
///
/// Five logical tables live in one Fjall keyspace (journal = write-ahead
/// log, one directory on disk):
///
/// - `meta`: encoding tag, source descriptor, counters, completeness marker
/// - `records`: record id (u64 BE) -> `[start, end)` decoded offsets
/// - `tokens_<g>`: token text -> `TokenEntry { id, count }`
/// - `postings_<g>`: token id BE ++ record id BE -> ()
///
/// Tokens and postings carry a generation suffix so acuity compaction can
/// rewrite survivors into fresh partitions and drop the old ones whole,
/// reclaiming space and rebuilding the index in one pass.
pub struct Catalog {
    path: PathBuf,
    keyspace: Keyspace,
    meta: PartitionHandle,
    records: PartitionHandle,
    tokens: PartitionHandle,
    postings: PartitionHandle,
    generation: u64,
    counters: Counters,
}

impl Catalog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let keyspace = Config::new(&path).open()?;
        let meta = keyspace.open_partition("meta", PartitionCreateOptions::default())?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;

        let generation = match meta.get(META_GENERATION)? {
            Some(raw) => decode_u64(raw.as_ref())
                .ok_or_else(|| QuarryError::CatalogCorrupt("bad generation marker".into()))?,
            None => 0,
        };
        let tokens = keyspace.open_partition(
            &format!("tokens_{generation}"),
            PartitionCreateOptions::default(),
        )?;
        let postings = keyspace.open_partition(
            &format!("postings_{generation}"),
            PartitionCreateOptions::default(),
        )?;

        let counters = match meta.get(META_COUNTERS)? {
            Some(raw) => bincode::deserialize(raw.as_ref())?,
            None => Counters::default(),
        };

        Ok(Self {
            path,
            keyspace,
            meta,
            records,
            tokens,
            postings,
            generation,
            counters,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check reader-facing invariants. A record table without an encoding
    /// row means an interrupted reset; such a catalog must be re-imported.
    pub fn verify(&self) -> Result<()> {
        if self.counters.records > 0 && self.meta.get(META_ENCODING)?.is_none() {
            return Err(QuarryError::CatalogCorrupt(
                "record table is non-empty but no encoding row exists; reset and re-import"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Truncate all five tables for a fresh import.
    pub fn reset(&mut self) -> Result<()> {
        for partition in [&self.records, &self.tokens, &self.postings] {
            let keys = partition
                .iter()
                .map(|item| item.map(|(key, _)| key))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for key in keys {
                partition.remove(key)?;
            }
        }
        for key in [META_ENCODING, META_SOURCE, META_COUNTERS, META_COMPLETE] {
            self.meta.remove(key)?;
        }
        self.counters = Counters::default();
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(catalog = %self.path.display(), "catalog reset");
        Ok(())
    }

    pub fn put_encoding(&mut self, tag: &str) -> Result<()> {
        self.meta.insert(META_ENCODING, tag.as_bytes())?;
        Ok(())
    }

    pub fn put_source(&mut self, path: &str, encoding: &str) -> Result<()> {
        let info = SourceInfo {
            path: path.to_string(),
            encoding: encoding.to_string(),
        };
        self.meta.insert(META_SOURCE, bincode::serialize(&info)?)?;
        Ok(())
    }

    pub fn source_info(&self) -> Result<SourceInfo> {
        let raw = self.meta.get(META_SOURCE)?.ok_or_else(|| {
            QuarryError::CatalogCorrupt("no source row; import first".to_string())
        })?;
        Ok(bincode::deserialize(raw.as_ref())?)
    }

    /// Append a record's decoded byte range, allocating the next dense id.
    pub fn append_record(&mut self, start: u64, end: u64) -> Result<u64> {
        debug_assert!(end > start, "empty record appended");
        let id = self.counters.records;
        let mut value = [0u8; 16];
        value[..8].copy_from_slice(&start.to_be_bytes());
        value[8..].copy_from_slice(&end.to_be_bytes());
        self.records.insert(id.to_be_bytes(), value)?;
        self.counters.records += 1;
        Ok(id)
    }

    /// Insert a token or bump its occurrence count; returns the token id.
    pub fn upsert_token(&mut self, value: &str) -> Result<u64> {
        match self.tokens.get(value.as_bytes())? {
            Some(raw) => {
                let mut entry: TokenEntry = bincode::deserialize(raw.as_ref())?;
                entry.count += 1;
                self.tokens
                    .insert(value.as_bytes(), bincode::serialize(&entry)?)?;
                Ok(entry.id)
            }
            None => {
                let entry = TokenEntry {
                    id: self.counters.next_token_id,
                    count: 1,
                };
                self.tokens
                    .insert(value.as_bytes(), bincode::serialize(&entry)?)?;
                self.counters.next_token_id += 1;
                self.counters.tokens += 1;
                Ok(entry.id)
            }
        }
    }

    /// Record that `token_id` occurs in `record_id`. Idempotent per pair.
    pub fn add_posting(&mut self, token_id: u64, record_id: u64) -> Result<()> {
        let key = posting_key(token_id, record_id);
        if self.postings.contains_key(key)? {
            return Ok(());
        }
        self.postings.insert(key, [0u8; 0])?;
        self.counters.postings += 1;
        Ok(())
    }

    /// Record ids containing `value`, ascending. Empty on a dictionary miss.
    pub fn postings_for(&self, value: &str) -> Result<Vec<u64>> {
        let Some(raw) = self.tokens.get(value.as_bytes())? else {
            return Ok(Vec::new());
        };
        let entry: TokenEntry = bincode::deserialize(raw.as_ref())?;

        let mut record_ids = Vec::new();
        for item in self.postings.prefix(entry.id.to_be_bytes()) {
            let (key, _) = item?;
            let record_id = key
                .as_ref()
                .get(8..16)
                .and_then(decode_u64)
                .ok_or_else(|| QuarryError::CatalogCorrupt("malformed posting key".into()))?;
            record_ids.push(record_id);
        }
        Ok(record_ids)
    }

    /// Occurrence count for a token, if present.
    pub fn token_count(&self, value: &str) -> Result<Option<u64>> {
        match self.tokens.get(value.as_bytes())? {
            Some(raw) => {
                let entry: TokenEntry = bincode::deserialize(raw.as_ref())?;
                Ok(Some(entry.count))
            }
            None => Ok(None),
        }
    }

    /// Decoded byte range `[start, end)` of a record.
    pub fn record_range(&self, record_id: u64) -> Result<(u64, u64)> {
        let raw = self.records.get(record_id.to_be_bytes())?.ok_or_else(|| {
            QuarryError::CatalogCorrupt(format!("record {record_id} is referenced but missing"))
        })?;
        let raw = raw.as_ref();
        let (start, end) = match (raw.get(..8).and_then(decode_u64), raw.get(8..16).and_then(decode_u64)) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(QuarryError::CatalogCorrupt(format!(
                    "record {record_id} has a malformed range row"
                )))
            }
        };
        Ok((start, end))
    }

    /// Flush the current write batch through the journal to disk.
    pub fn commit(&mut self) -> Result<()> {
        self.meta
            .insert(META_COUNTERS, bincode::serialize(&self.counters)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    /// Mark the import as finished; absent after a cancelled or failed run.
    pub fn mark_complete(&mut self) -> Result<()> {
        self.meta.insert(META_COMPLETE, [1])?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self.meta.get(META_COMPLETE)?.is_some())
    }

    /// Delete every token with `count < threshold` and its postings, then
    /// rewrite the survivors into a fresh partition generation. The rewrite
    /// is the reclamation pass: dropping the old partitions releases their
    /// space and the copy rebuilds both indexes densely.
    pub fn apply_acuity(&mut self, threshold: u64) -> Result<AcuityReport> {
        let started = Instant::now();
        let tokens_before = self.counters.tokens;

        let next_gen = self.generation + 1;
        let new_tokens = self.keyspace.open_partition(
            &format!("tokens_{next_gen}"),
            PartitionCreateOptions::default(),
        )?;
        let new_postings = self.keyspace.open_partition(
            &format!("postings_{next_gen}"),
            PartitionCreateOptions::default(),
        )?;

        let mut survivors: HashSet<u64> = HashSet::new();
        let mut removed = 0u64;
        for item in self.tokens.iter() {
            let (key, value) = item?;
            let entry: TokenEntry = bincode::deserialize(value.as_ref())?;
            if entry.count < threshold {
                removed += 1;
            } else {
                survivors.insert(entry.id);
                new_tokens.insert(key, value)?;
            }
        }

        let mut kept_postings = 0u64;
        for item in self.postings.iter() {
            let (key, _) = item?;
            let token_id = key
                .as_ref()
                .get(..8)
                .and_then(decode_u64)
                .ok_or_else(|| QuarryError::CatalogCorrupt("malformed posting key".into()))?;
            if survivors.contains(&token_id) {
                new_postings.insert(key, [0u8; 0])?;
                kept_postings += 1;
            }
        }

        let old_tokens = std::mem::replace(&mut self.tokens, new_tokens);
        let old_postings = std::mem::replace(&mut self.postings, new_postings);
        self.keyspace.delete_partition(old_tokens)?;
        self.keyspace.delete_partition(old_postings)?;

        self.generation = next_gen;
        self.counters.tokens = tokens_before - removed;
        self.counters.postings = kept_postings;
        self.meta
            .insert(META_GENERATION, next_gen.to_be_bytes())?;
        self.commit()?;

        let report = AcuityReport {
            threshold,
            tokens_before,
            tokens_removed: removed,
            tokens_after: tokens_before - removed,
            elapsed: started.elapsed(),
        };
        info!(
            threshold,
            removed = report.tokens_removed,
            remaining = report.tokens_after,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "acuity compaction finished"
        );
        Ok(report)
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            records: self.counters.records,
            tokens: self.counters.tokens,
            occurrences: self.counters.postings,
        }
    }
}

fn posting_key(token_id: u64, record_id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&token_id.to_be_bytes());
    key[8..].copy_from_slice(&record_id.to_be_bytes());
    key
}

fn decode_u64(raw: &[u8]) -> Option<u64> {
    raw.try_into().ok().map(u64::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_catalog() -> (TempDir, Catalog) {
        let tmp = TempDir::new().unwrap();
        let catalog = Catalog::open(tmp.path().join("catalog")).unwrap();
        (tmp, catalog)
    }

    #[test]
    fn test_record_ids_are_dense_and_ordered() {
        let (_tmp, mut catalog) = open_catalog();
        assert_eq!(catalog.append_record(0, 10).unwrap(), 0);
        assert_eq!(catalog.append_record(11, 22).unwrap(), 1);
        assert_eq!(catalog.append_record(23, 30).unwrap(), 2);
        catalog.commit().unwrap();

        assert_eq!(catalog.record_range(1).unwrap(), (11, 22));
        assert_eq!(catalog.stats().records, 3);
    }

    #[test]
    fn test_upsert_token_counts_and_ids() {
        let (_tmp, mut catalog) = open_catalog();
        let a = catalog.upsert_token("alpha").unwrap();
        let b = catalog.upsert_token("beta").unwrap();
        let a2 = catalog.upsert_token("alpha").unwrap();
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(catalog.token_count("alpha").unwrap(), Some(2));
        assert_eq!(catalog.token_count("beta").unwrap(), Some(1));
        assert_eq!(catalog.token_count("gamma").unwrap(), None);
    }

    #[test]
    fn test_posting_idempotence() {
        let (_tmp, mut catalog) = open_catalog();
        let t = catalog.upsert_token("alpha").unwrap();
        catalog.add_posting(t, 7).unwrap();
        catalog.add_posting(t, 7).unwrap();
        catalog.add_posting(t, 3).unwrap();

        assert_eq!(catalog.postings_for("alpha").unwrap(), vec![3, 7]);
        assert_eq!(catalog.stats().occurrences, 2);
    }

    #[test]
    fn test_postings_miss_is_empty_not_error() {
        let (_tmp, catalog) = open_catalog();
        assert!(catalog.postings_for("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_apply_acuity_strict_threshold() {
        let (_tmp, mut catalog) = open_catalog();
        // "common" in 5 records, "edge" in 3, "rare" in 1.
        for record in 0..5u64 {
            let t = catalog.upsert_token("common").unwrap();
            catalog.add_posting(t, record).unwrap();
        }
        for record in 0..3u64 {
            let t = catalog.upsert_token("edge").unwrap();
            catalog.add_posting(t, record).unwrap();
        }
        let t = catalog.upsert_token("rare").unwrap();
        catalog.add_posting(t, 0).unwrap();
        catalog.commit().unwrap();

        let report = catalog.apply_acuity(3).unwrap();
        assert_eq!(report.tokens_before, 3);
        assert_eq!(report.tokens_removed, 1);
        assert_eq!(report.tokens_after, 2);

        // Strict `<`: count == threshold survives.
        assert_eq!(catalog.token_count("edge").unwrap(), Some(3));
        assert_eq!(catalog.token_count("rare").unwrap(), None);
        assert!(catalog.postings_for("rare").unwrap().is_empty());
        assert_eq!(catalog.postings_for("common").unwrap().len(), 5);
        assert_eq!(catalog.stats().occurrences, 8);
    }

    #[test]
    fn test_reset_truncates_everything() {
        let (_tmp, mut catalog) = open_catalog();
        catalog.put_encoding("gzip").unwrap();
        catalog.put_source("/data/in.gz", "gzip").unwrap();
        let id = catalog.append_record(0, 4).unwrap();
        let t = catalog.upsert_token("x").unwrap();
        catalog.add_posting(t, id).unwrap();
        catalog.mark_complete().unwrap();

        catalog.reset().unwrap();
        assert_eq!(catalog.stats(), CatalogStats { records: 0, tokens: 0, occurrences: 0 });
        assert!(!catalog.is_complete().unwrap());
        assert!(catalog.postings_for("x").unwrap().is_empty());
        assert!(catalog.source_info().is_err());
    }

    #[test]
    fn test_verify_flags_missing_encoding_row() {
        let (_tmp, mut catalog) = open_catalog();
        catalog.append_record(0, 4).unwrap();
        catalog.commit().unwrap();
        assert!(matches!(
            catalog.verify(),
            Err(QuarryError::CatalogCorrupt(_))
        ));

        catalog.put_encoding("none").unwrap();
        assert!(catalog.verify().is_ok());
    }

    #[test]
    fn test_state_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog");
        {
            let mut catalog = Catalog::open(&path).unwrap();
            catalog.put_encoding("none").unwrap();
            catalog.put_source("/data/in.txt", "none").unwrap();
            let id = catalog.append_record(0, 5).unwrap();
            let t = catalog.upsert_token("hello").unwrap();
            catalog.add_posting(t, id).unwrap();
            catalog.apply_acuity(1).unwrap();
            catalog.mark_complete().unwrap();
        }

        let catalog = Catalog::open(&path).unwrap();
        catalog.verify().unwrap();
        assert!(catalog.is_complete().unwrap());
        assert_eq!(catalog.postings_for("hello").unwrap(), vec![0]);
        assert_eq!(catalog.record_range(0).unwrap(), (0, 5));
        assert_eq!(catalog.source_info().unwrap().path, "/data/in.txt");
    }
}
