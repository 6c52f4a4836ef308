//! CLI binary for acta-tally.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, drives a crawl and/or batch, and writes reports.

use acta_tally::directory::{DirectoryClient, DEFAULT_BASE_URL, DEFAULT_LEVEL};
use acta_tally::{
    report, BatchOrchestrator, BatchOutput, BatchProgressCallback, CancelFlag, ExtractionConfig, Outcome,
    ProgressCallback, TableTemplate, ThresholdParams, UnitDescriptor, UnitProcessor,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::{stream, Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one line per unit that did
/// not succeed. Units complete out of order, so lines carry the table number.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>5}/{len} actas  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Reading");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_units: usize) {
        self.bar.set_length(total_units as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_units} mesas…"))
        ));
    }

    fn on_unit_complete(&self, done: usize, total: usize, table_number: u32, outcome: Outcome) {
        let mark = match outcome {
            Outcome::Success => None,
            Outcome::NoDocument => Some(dim("–")),
            Outcome::Cancelled => Some(yellow("⊘")),
            Outcome::ExtractionError | Outcome::InfrastructureError => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                Some(red("✗"))
            }
        };
        if let Some(mark) = mark {
            self.bar.println(format!(
                "  {mark} [{done}/{total}] Mesa {table_number:<6} {}",
                dim(outcome.as_str())
            ));
        }
        self.bar.inc(1);
    }

    fn on_task_failure(&self, table_number: u32, error: &str) {
        self.bar
            .println(format!("  {} Task for mesa {table_number} died: {}", red("✘"), red(error)));
    }

    fn on_batch_complete(&self, total_units: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        eprintln!(
            "{} {}/{} actas read  ({} failed)",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&success_count.to_string()),
            total_units,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List every mesa of Copán (department 04) without reading anything
  actas crawl --department 04 --department-name "COPÁN" -o mesas_copan.json

  # Crawl and read in one go
  actas run --department 04 --department-name "COPÁN"

  # Read a previously crawled unit list, 8 workers
  actas batch mesas_copan.json --concurrency 8

  # Re-read only what is already in the local store (no network)
  actas batch mesas_copan.json --offline

  # Check a template against one local acta, keeping the stage images
  actas read actas_pdf/mesa_12_0401.pdf --template layout.json --debug-dir debug

OUTCOMES:
  SUCCESS               all categories read (values with no digits are 0, listed in `unread`)
  NO_DOCUMENT           the mesa has no published acta
  EXTRACTION_ERROR      download, rasterisation or recognition failed; see `error`
  INFRASTRUCTURE_ERROR  the worker died before producing a result
  CANCELLED             interrupted (Ctrl-C) before the mesa started

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH       Path to libpdfium; the system library is used otherwise
  ACTAS_TESSERACT       tesseract executable (default: tesseract)
  RUST_LOG              Log filter, overrides --verbose/--quiet
"#;

#[derive(Parser, Debug)]
#[command(
    name = "actas",
    version,
    about = "Read vote tallies from published election actas",
    long_about = "Crawl the electoral authority's acta directory, download each mesa's acta, \
and read the printed per-party vote counts with tesseract. Every mesa yields one record \
with an explicit outcome.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, global = true, env = "ACTAS_VERBOSE")]
    verbose: bool,

    #[arg(short, long, global = true, env = "ACTAS_QUIET")]
    quiet: bool,

    #[arg(long, global = true, env = "ACTAS_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk the directory and write the unit list as JSON.
    Crawl {
        #[command(flatten)]
        source: DirectoryArgs,

        #[arg(short, long, default_value = "mesas.json")]
        output: PathBuf,
    },
    /// Crawl a department, then read every acta.
    Run {
        #[command(flatten)]
        source: DirectoryArgs,

        #[command(flatten)]
        extract: ExtractArgs,

        #[command(flatten)]
        out: ReportArgs,
    },
    /// Read every acta in a unit list file.
    Batch {
        units: PathBuf,

        #[command(flatten)]
        extract: ExtractArgs,

        #[command(flatten)]
        out: ReportArgs,
    },
    /// Read one local acta and print its table.
    Read {
        pdf: PathBuf,

        #[command(flatten)]
        extract: ExtractArgs,
    },
}

#[derive(Args, Debug)]
struct DirectoryArgs {
    /// Department code, e.g. 04.
    #[arg(long, env = "ACTAS_DEPARTMENT")]
    department: String,

    /// Department display name used on every record.
    #[arg(long, env = "ACTAS_DEPARTMENT_NAME")]
    department_name: String,

    #[arg(long, env = "ACTAS_API_BASE", default_value = DEFAULT_BASE_URL)]
    api_base: String,

    /// Election level (01 = presidential).
    #[arg(long, env = "ACTAS_LEVEL", default_value = DEFAULT_LEVEL)]
    level: String,

    #[arg(long, env = "ACTAS_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[arg(short, long, env = "ACTAS_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    #[arg(long, env = "ACTAS_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Table layout descriptor (JSON); defaults to the presidential acta.
    #[arg(long, env = "ACTAS_TEMPLATE")]
    template: Option<PathBuf>,

    #[arg(long, env = "ACTAS_THRESHOLD_WINDOW", default_value_t = 35)]
    threshold_window: u32,

    #[arg(long, env = "ACTAS_THRESHOLD_BIAS", default_value_t = 11)]
    threshold_bias: i16,

    #[arg(long, env = "ACTAS_STORE", default_value = "actas_pdf")]
    store: PathBuf,

    /// Base URL for relative document references.
    #[arg(long, env = "ACTAS_DOCUMENT_BASE")]
    document_base: Option<String>,

    /// Serve documents from the local store only.
    #[arg(long, env = "ACTAS_OFFLINE")]
    offline: bool,

    #[arg(long, env = "ACTAS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[arg(long, env = "ACTAS_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    #[arg(long, env = "ACTAS_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    #[arg(long, env = "ACTAS_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Write each acta's table crop, binarised table and row bands here.
    #[arg(long, env = "ACTAS_DEBUG_DIR")]
    debug_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[arg(long, env = "ACTAS_JSON_OUT", default_value = "resultados_presidente.json")]
    json_out: PathBuf,

    #[arg(long, env = "ACTAS_CSV_OUT", default_value = "resultados_presidente.csv")]
    csv_out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces per-unit INFO lines when it is shown.
    let batch_command = matches!(cli.command, Command::Run { .. } | Command::Batch { .. });
    let show_progress = batch_command && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::Crawl { source, output } => {
            let units = crawl(&source).await?;
            report::write_units(&output, &units).context("Failed to write unit list")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} mesas  →  {}",
                    green("✔"),
                    units.len(),
                    bold(&output.display().to_string())
                );
            }
        }
        Command::Run {
            source,
            extract,
            out,
        } => {
            let units = crawl(&source).await?;
            let config = build_config(&extract, progress_cb)?;
            let output = run_units(&extract, &config, units).await?;
            write_reports(&out, &output, cli.quiet)?;
        }
        Command::Batch {
            units,
            extract,
            out,
        } => {
            let units = report::read_units(&units).context("Failed to read unit list")?;
            let config = build_config(&extract, progress_cb)?;
            let output = run_units(&extract, &config, units).await?;
            write_reports(&out, &output, cli.quiet)?;
        }
        Command::Read { pdf, extract } => {
            let config = build_config(&extract, None)?;
            read_one(&config, &pdf).await?;
        }
    }

    Ok(())
}

async fn crawl(source: &DirectoryArgs) -> Result<Vec<UnitDescriptor>> {
    let client = DirectoryClient::new(&source.api_base, &source.level, source.api_timeout)?;
    client
        .collect_units(&source.department, &source.department_name)
        .await
        .context("Directory crawl failed")
}

fn build_config(args: &ExtractArgs, progress_cb: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let template = match &args.template {
        Some(path) => TableTemplate::from_json_file(path)?,
        None => TableTemplate::presidential(),
    };

    let mut builder = ExtractionConfig::builder()
        .concurrency(args.concurrency)
        .dpi(args.dpi)
        .template(template)
        .threshold(ThresholdParams {
            window: args.threshold_window,
            bias: args.threshold_bias,
        })
        .store_dir(&args.store)
        .download_timeout_secs(args.download_timeout)
        .max_fetch_retries(args.max_retries)
        .tesseract_bin(&args.tesseract)
        .ocr_language(&args.ocr_lang);

    if let Some(ref base) = args.document_base {
        builder = builder.document_base_url(base);
    }
    if let Some(ref lib) = args.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(ref dir) = args.debug_dir {
        builder = builder.debug_dir(dir);
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }

    Ok(builder.build()?)
}

fn processor_for(args: &ExtractArgs, config: &ExtractionConfig) -> Result<UnitProcessor> {
    if !args.offline {
        return Ok(UnitProcessor::from_config(config)?);
    }
    let processor = UnitProcessor::new(
        Arc::new(acta_tally::DocumentStore::new(&config.store_dir)),
        Arc::new(acta_tally::PdfiumRasterizer::new(config)),
        Arc::new(acta_tally::TesseractCli::from_config(config)),
        config.template.clone(),
        config.threshold,
    );
    Ok(match &config.debug_dir {
        Some(dir) => processor.with_debug_dir(dir),
        None => processor,
    })
}

async fn run_units(args: &ExtractArgs, config: &ExtractionConfig, units: Vec<UnitDescriptor>) -> Result<BatchOutput> {
    let processor = Arc::new(processor_for(args, config)?);
    let orchestrator = BatchOrchestrator::new(processor, config);

    // First Ctrl-C stops dispatching; running units finish and the reports
    // are still written. A second Ctrl-C exits at once.
    let signals = Box::pin(stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|_| ((), ()))
    }));
    tokio::spawn(on_interrupts(signals, orchestrator.cancel_flag(), || {
        eprintln!("{}", red("Aborted: no reports written"));
        std::process::exit(130);
    }));

    Ok(orchestrator.run_batch(units).await)
}

/// First interrupt cancels the batch; a second one calls `abort`.
async fn on_interrupts<S, A>(mut signals: S, cancel: CancelFlag, abort: A)
where
    S: Stream<Item = ()> + Unpin,
    A: FnOnce(),
{
    if signals.next().await.is_none() {
        return;
    }
    warn!("Interrupted: finishing running units, cancelling the rest (Ctrl-C again to abort)");
    cancel.cancel();
    if signals.next().await.is_some() {
        abort();
    }
}

fn write_reports(out: &ReportArgs, output: &BatchOutput, quiet: bool) -> Result<()> {
    report::write_json(&out.json_out, &output.records).context("Failed to write JSON report")?;
    report::write_csv(&out.csv_out, &output.records).context("Failed to write CSV report")?;

    if !quiet {
        let s = &output.stats;
        eprintln!(
            "{}  {} ok  {} no document  {} errors  {} infrastructure  {} cancelled  {}ms",
            if s.extraction_error + s.infrastructure_error == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            s.success,
            s.no_document,
            s.extraction_error,
            s.infrastructure_error,
            s.cancelled,
            s.total_duration_ms,
        );
        eprintln!("   → {}", bold(&out.json_out.display().to_string()));
        eprintln!("   → {}", bold(&out.csv_out.display().to_string()));
    }
    Ok(())
}

async fn read_one(config: &ExtractionConfig, pdf: &Path) -> Result<()> {
    if !pdf.is_file() {
        bail!("No such file: {}", pdf.display());
    }
    let processor = Arc::new(UnitProcessor::from_config(config)?);
    let path = pdf.to_path_buf();
    let rows = tokio::task::spawn_blocking(move || processor.read_document(&path))
        .await
        .context("Reader task failed")?
        .with_context(|| format!("Failed to read {}", pdf.display()))?;

    println!("{}", bold(&pdf.display().to_string()));
    for (category, value) in rows {
        match value {
            Some(v) => println!("  {:<8} {:>7}", category.code(), v),
            None => println!("  {:<8} {:>7}  {}", category.code(), 0, yellow("unread")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn first_interrupt_cancels_second_aborts() {
        let cancel = CancelFlag::new();
        let aborted = AtomicBool::new(false);
        on_interrupts(stream::iter([(), ()]), cancel.clone(), || {
            aborted.store(true, Ordering::SeqCst)
        })
        .await;
        assert!(cancel.is_cancelled());
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn single_interrupt_only_cancels() {
        let cancel = CancelFlag::new();
        let aborted = AtomicBool::new(false);
        on_interrupts(stream::iter([()]), cancel.clone(), || {
            aborted.store(true, Ordering::SeqCst)
        })
        .await;
        assert!(cancel.is_cancelled());
        assert!(!aborted.load(Ordering::SeqCst));
    }

    #[test]
    fn debug_dir_flag_reaches_the_config() {
        let cli = Cli::try_parse_from(["actas", "read", "a.pdf", "--debug-dir", "dbg"]).unwrap();
        let Command::Read { extract, .. } = cli.command else {
            panic!("expected read");
        };
        let config = build_config(&extract, None).unwrap();
        assert_eq!(config.debug_dir, Some(PathBuf::from("dbg")));
    }
}
