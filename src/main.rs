use anyhow::{Context, Result};
use clap::Parser;
use pst_search::error::Error;
use pst_search::manifest::Manifest;
use pst_search::store::{ReadpstConfig, ReadpstStore};
use pst_search::{Exporter, FilterCriteria, RawCriteria, Traversal};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// PST file to search.
    #[arg(env = "PST_FILE")]
    pst_file: PathBuf,

    /// Directory the matching messages are saved to.
    #[arg(long, env = "PST_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Sender contains (case-insensitive).
    #[arg(long, env = "PST_SENDER")]
    sender: Option<String>,

    /// Any recipient contains (case-insensitive).
    #[arg(long, env = "PST_RECIPIENT")]
    recipient: Option<String>,

    /// Subject contains (case-insensitive).
    #[arg(long, env = "PST_SUBJECT")]
    subject: Option<String>,

    /// Body text contains (case-insensitive).
    #[arg(long, env = "PST_BODY")]
    body: Option<String>,

    /// Sent at or after (YYYY-MM-DD HH:MM:SS, GMT+3).
    #[arg(long, env = "PST_SENT_AFTER")]
    sent_after: Option<String>,

    /// Sent at or before (YYYY-MM-DD HH:MM:SS, GMT+3).
    #[arg(long, env = "PST_SENT_BEFORE")]
    sent_before: Option<String>,

    /// Received at or after (YYYY-MM-DD HH:MM:SS, GMT+3).
    #[arg(long, env = "PST_RECEIVED_AFTER")]
    received_after: Option<String>,

    /// Received at or before (YYYY-MM-DD HH:MM:SS, GMT+3).
    #[arg(long, env = "PST_RECEIVED_BEFORE")]
    received_before: Option<String>,

    /// Hours of sending, HH-HH (e.g. 8-17 or 22-6).
    #[arg(long, env = "PST_SENT_TIME")]
    sent_time: Option<String>,

    /// Hours of receipt, HH-HH (e.g. 8-17 or 22-6).
    #[arg(long, env = "PST_RECEIVED_TIME")]
    received_time: Option<String>,

    /// Where readpst unpacks the archive; a temporary directory when unset.
    #[arg(long, env = "WORK_DIR")]
    work_dir: Option<PathBuf>,

    #[arg(long, env = "READPST_PATH", default_value = "readpst")]
    readpst_path: String,

    /// Skip writing manifest.json.
    #[arg(long, env = "PST_NO_MANIFEST")]
    no_manifest: bool,
}

impl Args {
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria::from(RawCriteria {
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            sent_after: self.sent_after.clone(),
            sent_before: self.sent_before.clone(),
            received_after: self.received_after.clone(),
            received_before: self.received_before.clone(),
            sent_time: self.sent_time.clone(),
            received_time: self.received_time.clone(),
        })
    }
}

fn count_txt_files(dir: &Path) -> usize {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "txt"))
        .count()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let started = Instant::now();

    let criteria = args.criteria();
    if criteria.is_empty() {
        warn!("no filters given, every message matches");
    }

    let exporter = Exporter::new(&args.output_dir)
        .with_context(|| format!("prepare output dir {}", args.output_dir.display()))?;
    info!(dir = %args.output_dir.display(), "matches will be saved");

    let config = ReadpstConfig {
        readpst_path: args.readpst_path.clone(),
        work_dir: args.work_dir.clone(),
    };
    let store = ReadpstStore::open(&args.pst_file, &config).map_err(|source| Error::Container {
        path: args.pst_file.clone(),
        source,
    })?;

    let summary = Traversal::new(&criteria, Some(&exporter)).run(&store);

    if !args.no_manifest {
        let manifest = Manifest::new(
            &args.pst_file,
            exporter.output_dir(),
            &summary,
            started.elapsed(),
        )
        .context("build manifest")?;
        let path = manifest
            .write(exporter.output_dir())
            .context("write manifest")?;
        info!(path = %path.display(), "manifest written");
    }

    println!(
        "\nOK processed={} matched={} saved_txt={} failed={} duration_s={:.2}",
        summary.processed,
        summary.matched,
        count_txt_files(exporter.output_dir()),
        summary.failed,
        started.elapsed().as_secs_f64()
    );

    Ok(())
}
