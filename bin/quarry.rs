use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;

use quarry::catalog::Catalog;
use quarry::codec::Codec;
use quarry::config::{parse_byte_size, DEFAULT_BATCH_SIZE};
use quarry::error::QuarryError;
use quarry::generate::{self, GenerateOptions};
use quarry::import::{self, ImportOptions};
use quarry::search::{SearchOptions, Searcher};
use quarry::splitter::Separator;
use quarry::CancelToken;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Indexed token search over large encoded record files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index a source file (or stdin) into a catalog
    Import {
        /// Source path, or `-` for stdin
        source: String,

        /// Encoding tag (none, gzip, zlib, bzip2, brotli, base64, ascii85,
        /// hex, rot:N, caesar:N, uuencode, xxencode, zip, tar)
        #[arg(long, short, env = "QUARRY_ENCODING", default_value = "none")]
        encoding: String,

        /// Record separator: literal with escapes, or `re:` + regex
        #[arg(long, short, default_value = r"\n")]
        separator: String,

        /// Read chunk size (integer, optional K/KB/M/MB/G/GB; bare = KiB)
        #[arg(long, default_value = "64")]
        chunk: String,

        /// Minimum token occurrence count kept after import (0 disables)
        #[arg(long, default_value_t = 5)]
        acuity: u64,

        /// Catalog directory
        #[arg(long, env = "QUARRY_CATALOG", default_value = "quarry.idx")]
        catalog: PathBuf,
    },

    /// Search the catalog for a term and print matching records
    Search {
        /// Whole-word term to look up
        term: String,

        /// Catalog directory
        #[arg(long, env = "QUARRY_CATALOG", default_value = "quarry.idx")]
        catalog: PathBuf,

        /// Read records from this path instead of the imported one
        #[arg(long)]
        source: Option<PathBuf>,

        /// Read chunk size for the decoded stream
        #[arg(long, default_value = "64")]
        chunk: String,

        /// Records displayed before eliding the rest
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Bytes of each record displayed before truncation
        #[arg(long, default_value_t = 500)]
        width: usize,
    },

    /// Generate an encoded test fixture by repeating a payload
    Generate {
        /// Payload file; archives contribute their first member. Random
        /// bytes are used when omitted.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Encoding to apply to the payload
        #[arg(long, short, default_value = "none")]
        encoding: String,

        /// Target output size (integer, optional K/KB/M/MB/G/GB; bare = KiB)
        #[arg(long, default_value = "100GB")]
        target_size: String,

        /// Output path (an OS temporary file when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("quarry: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Import {
            source,
            encoding,
            separator,
            chunk,
            acuity,
            catalog,
        } => {
            let options = ImportOptions {
                encoding: encoding.parse::<Codec>()?,
                separator: Separator::parse(&separator)?,
                chunk_size: parse_byte_size(&chunk)? as usize,
                acuity,
                batch_size: DEFAULT_BATCH_SIZE,
                cancel: CancelToken::new(),
            };

            let mut catalog = Catalog::open(&catalog)?;
            let summary = if source == "-" {
                let stdin = std::io::stdin().lock();
                import::run(&mut catalog, stdin, "<stdin>", &options).or_partial_note()?
            } else {
                let file = open_source(&source)?;
                import::run(&mut catalog, file, &source, &options).or_partial_note()?
            };

            println!("Records:           {}", summary.records);
            println!("Unique tokens:     {}", summary.tokens_after);
            if let Some(report) = &summary.acuity {
                println!(
                    "Acuity {} removed:  {} tokens in {:.2}s",
                    report.threshold,
                    report.tokens_removed,
                    report.elapsed.as_secs_f64()
                );
                println!("Tokens before:     {}", summary.tokens_before);
            }
            println!("Token occurrences: {}", summary.occurrences);
            println!("Elapsed:           {:.2}s", summary.elapsed.as_secs_f64());
            Ok(())
        }

        Command::Search {
            term,
            catalog,
            source,
            chunk,
            limit,
            width,
        } => {
            let catalog = Catalog::open(&catalog)?;
            let options = SearchOptions {
                source_override: source,
                chunk_size: parse_byte_size(&chunk)? as usize,
                cancel: CancelToken::new(),
            };
            let outcome = Searcher::new(&catalog).search(&term, &options)?;

            for (i, hit) in outcome.hits.iter().take(limit).enumerate() {
                println!("--- record {} (id {}) ---", i + 1, hit.record_id);
                let text = String::from_utf8_lossy(&hit.bytes);
                if text.len() > width {
                    let cut = text
                        .char_indices()
                        .map(|(i, _)| i)
                        .take_while(|&i| i <= width)
                        .last()
                        .unwrap_or(0);
                    println!("{}...", &text[..cut]);
                } else {
                    println!("{text}");
                }
            }
            if outcome.hits.len() > limit {
                println!("... and {} more results", outcome.hits.len() - limit);
            }
            println!(
                "{} results in {:.3}s",
                outcome.hits.len(),
                outcome.elapsed.as_secs_f64()
            );
            Ok(())
        }

        Command::Generate {
            input,
            encoding,
            target_size,
            output,
        } => {
            let options = GenerateOptions {
                encoding: encoding.parse::<Codec>()?,
                target_size: parse_byte_size(&target_size)?,
                output,
            };
            let summary = generate::run(input.as_deref(), &options)?;
            info!(
                repetitions = summary.repetitions,
                "fixture generation finished"
            );
            println!(
                "Generated {} ({} bytes)",
                summary.path.display(),
                summary.bytes_written
            );
            Ok(())
        }
    }
}

fn open_source(path: &str) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| QuarryError::Io(std::io::Error::new(e.kind(), format!("{path}: {e}"))))?;
    Ok(BufReader::new(file))
}

// Imports that fail mid-stream leave a committed prefix behind; say so.
trait ImportDiagnostic<T> {
    fn or_partial_note(self) -> anyhow::Result<T>;
}

impl<T> ImportDiagnostic<T> for quarry::Result<T> {
    fn or_partial_note(self) -> anyhow::Result<T> {
        self.map_err(|e| {
            if e.leaves_partial_catalog() {
                anyhow::anyhow!("{e}; import aborted; catalog is partial; rerun required")
            } else {
                anyhow::anyhow!(e)
            }
        })
    }
}
