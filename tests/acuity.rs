//! Acuity compaction end-to-end: low-frequency vocabulary disappears from
//! the index while frequent terms keep their full posting sets.

use std::fs::File;
use std::io::Write;

use tempfile::TempDir;

use quarry::catalog::Catalog;
use quarry::import::{self, ImportOptions};
use quarry::search::{SearchOptions, Searcher};

/// 1000 records: `common` in 800 of them, `rare` in 3.
fn fixture_content() -> Vec<u8> {
    let mut content = Vec::new();
    for i in 0..1000 {
        let mut line = format!("record {i}");
        if i % 5 != 4 {
            line.push_str(" common");
        }
        if i < 3 {
            line.push_str(" rare");
        }
        line.push('\n');
        content.extend_from_slice(line.as_bytes());
    }
    content
}

fn import_with_acuity(acuity: u64) -> (TempDir, Catalog) {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source.txt");
    File::create(&source)
        .unwrap()
        .write_all(&fixture_content())
        .unwrap();

    let mut catalog = Catalog::open(tmp.path().join("catalog")).unwrap();
    import::run(
        &mut catalog,
        File::open(&source).unwrap(),
        source.to_str().unwrap(),
        &ImportOptions {
            acuity,
            ..ImportOptions::default()
        },
    )
    .unwrap();
    (tmp, catalog)
}

#[test]
fn s3_acuity_filter_drops_rare_keeps_common() {
    let (_tmp, catalog) = import_with_acuity(5);
    let searcher = Searcher::new(&catalog);

    let outcome = searcher.search("common", &SearchOptions::default()).unwrap();
    assert_eq!(outcome.hits.len(), 800);
    for hit in &outcome.hits {
        assert!(hit.bytes.windows(6).any(|w| w == b"common"));
    }

    // Filtered below the threshold: zero results, not an error.
    let outcome = searcher.search("rare", &SearchOptions::default()).unwrap();
    assert!(outcome.hits.is_empty());
    assert_eq!(outcome.matched, 0);
}

#[test]
fn acuity_soundness_every_survivor_meets_threshold() {
    let (_tmp, catalog) = import_with_acuity(5);

    assert_eq!(catalog.token_count("rare").unwrap(), None);
    assert!(catalog.token_count("common").unwrap().unwrap() >= 5);
    assert!(catalog.token_count("record").unwrap().unwrap() >= 5);

    // Record rows are untouched by compaction.
    assert_eq!(catalog.stats().records, 1000);
    assert_eq!(catalog.record_range(0).unwrap().0, 0);
}

#[test]
fn acuity_zero_disables_the_pass() {
    let (_tmp, catalog) = import_with_acuity(0);
    assert_eq!(catalog.postings_for("rare").unwrap(), vec![0, 1, 2]);

    let outcome = Searcher::new(&catalog)
        .search("rare", &SearchOptions::default())
        .unwrap();
    assert_eq!(outcome.hits.len(), 3);
}

#[test]
fn acuity_report_counts_removed_vocabulary() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("source.txt");
    File::create(&source)
        .unwrap()
        .write_all(&fixture_content())
        .unwrap();

    let mut catalog = Catalog::open(tmp.path().join("catalog")).unwrap();
    let summary = import::run(
        &mut catalog,
        File::open(&source).unwrap(),
        source.to_str().unwrap(),
        &ImportOptions {
            acuity: 5,
            ..ImportOptions::default()
        },
    )
    .unwrap();

    let report = summary.acuity.unwrap();
    assert_eq!(report.threshold, 5);
    assert_eq!(report.tokens_before, summary.tokens_before);
    assert_eq!(report.tokens_after, summary.tokens_after);
    assert_eq!(
        report.tokens_before - report.tokens_removed,
        report.tokens_after
    );
    // `rare` went, `common`, `record`, and the frequent digit tokens stayed.
    assert!(report.tokens_removed > 0);
    assert!(summary.tokens_after < summary.tokens_before);
}
