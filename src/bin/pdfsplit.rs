//! CLI binary for pdfsplit.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SplitConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfsplit::pipeline::input::resolve_local;
use pdfsplit::{
    inspect, split_document, split_intermediate, PageSelection, ProgressCallback,
    RenderFailurePolicy, ShardInfo, SplitConfig, SplitProgressCallback, Stage,
    DEFAULT_INTERMEDIATE_PATH, DEFAULT_OUTPUT_DIR,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const MIB: f64 = 1024.0 * 1024.0;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

fn mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / MIB)
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one bar that is re-armed for each stage, with
/// a log line per failed page and per finished shard.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl SplitProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_prefix(format!("{stage:<10}"));
        self.bar.set_message("");
        self.bar.reset_eta();
    }

    fn on_page_complete(&self, _stage: Stage, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
        self.bar.inc(1);
    }

    fn on_page_error(&self, stage: Stage, page_num: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<10} page {:>3}  {}",
            red("✗"),
            stage.to_string(),
            page_num,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_shard_complete(&self, index: usize, pages: usize, size_bytes: u64) {
        self.bar.println(format!(
            "  {} shard {:>3}  {:>4} pages  {}",
            green("✓"),
            index,
            pages,
            dim(&mb(size_bytes)),
        ));
    }

    fn on_run_complete(&self, shards: usize, written_pages: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} pages written to {} shard(s)",
                green("✔"),
                bold(&written_pages.to_string()),
                bold(&shards.to_string())
            );
        } else {
            eprintln!(
                "{} {} pages written to {} shard(s)  ({} page failure(s))",
                cyan("⚠"),
                bold(&written_pages.to_string()),
                bold(&shards.to_string()),
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Split into ./split_pdfs/split_1.pdf, split_2.pdf, … (4.3 MB each at most)
  pdfsplit document.pdf

  # Custom output folder and intermediate file
  pdfsplit document.pdf --output-folder parts --temp-pdf /tmp/big.pdf

  # Smaller shards, lower resolution
  pdfsplit --max-size-mb 2 --dpi 150 --quality 80 scan.pdf

  # Only pages 10-40
  pdfsplit --pages 10-40 book.pdf

  # Split an existing PDF as-is, without rasterising it
  pdfsplit --split-only already_flat.pdf

  # Inspect PDF metadata
  pdfsplit --inspect-only document.pdf

  # Machine-readable summary
  pdfsplit --json --no-progress document.pdf > result.json

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (file or directory)
  PDFSPLIT_*        Any option, e.g. PDFSPLIT_DPI=200, PDFSPLIT_MAX_SIZE_MB=8
  RUST_LOG          Override the log filter (e.g. RUST_LOG=pdfsplit=debug)

SETUP:
  PDFium renders the source pages and must be installed as a shared library.
  Prebuilt binaries: https://github.com/bblanchon/pdfium-binaries/releases
  Then either put it on the loader path or set PDFIUM_LIB_PATH.
  --split-only works without pdfium.
"#;

/// Split a PDF into size-bounded PDF files via a rasterised copy.
#[derive(Parser, Debug)]
#[command(
    name = "pdfsplit",
    version,
    about = "Split a PDF into size-bounded PDF files via a rasterised copy",
    long_about = "Render every page of a PDF to JPEG, rebuild the pages into one image-only \
PDF, and split that greedily into split_1.pdf, split_2.pdf, … so that each file stops growing \
once it reaches the size ceiling.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input PDF file.
    input: PathBuf,

    /// Directory for the output shards.
    #[arg(long = "output-folder", alias = "output_folder", env = "PDFSPLIT_OUTPUT_FOLDER",
          default_value = DEFAULT_OUTPUT_DIR)]
    output_folder: PathBuf,

    /// Path of the intermediate rasterised PDF (deleted after the run).
    #[arg(long = "temp-pdf", alias = "temp_pdf", env = "PDFSPLIT_TEMP_PDF",
          default_value = DEFAULT_INTERMEDIATE_PATH)]
    temp_pdf: PathBuf,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDFSPLIT_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// JPEG quality (1–100).
    #[arg(long, env = "PDFSPLIT_QUALITY", default_value_t = 95,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Size ceiling per output file, in MB (MiB; fractions allowed).
    #[arg(long = "max-size-mb", env = "PDFSPLIT_MAX_SIZE_MB", default_value_t = 4.3)]
    max_size_mb: f64,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFSPLIT_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSPLIT_PASSWORD")]
    password: Option<String>,

    /// Directory for the temporary page images (default: a private temp dir).
    #[arg(long, env = "PDFSPLIT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// File-name prefix of the output shards.
    #[arg(long, env = "PDFSPLIT_PREFIX", default_value = "split")]
    prefix: String,

    /// Path to the pdfium shared library (file or directory).
    #[arg(long, env = "PDFSPLIT_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Stop the run when a page fails to render instead of skipping it.
    #[arg(long, env = "PDFSPLIT_ABORT_ON_RENDER_ERROR")]
    abort_on_render_error: bool,

    /// Split the input as-is, skipping rendering and assembly.
    #[arg(long, conflicts_with = "inspect_only")]
    split_only: bool,

    /// Print PDF metadata only, no splitting.
    #[arg(long)]
    inspect_only: bool,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "PDFSPLIT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFSPLIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSPLIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSPLIT_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose mode always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
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
        Some(CliProgressCallback::new() as Arc<dyn SplitProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, &config).context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            println!("Size:         {}", mb(meta.file_size_bytes));
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
        }
        return Ok(());
    }

    // ── Split-only mode ──────────────────────────────────────────────────
    if cli.split_only {
        let path = resolve_local(&cli.input).context("Cannot read input")?;
        let report = split_intermediate(&path, &config).context("Split failed")?;
        if let Some(cb) = config.progress_callback.as_ref() {
            cb.on_run_complete(report.shards.len(), report.written_pages());
        }

        if cli.json {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialise output")?;
            println!("{json}");
        } else if !cli.quiet && !show_progress {
            print_shards(&report.shards);
            eprintln!(
                "Split {} pages into {} shard(s)",
                report.written_pages(),
                report.shards.len()
            );
        }
        return Ok(());
    }

    // ── Full run ─────────────────────────────────────────────────────────
    let output = split_document(&cli.input, &config).context("Split failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        if !show_progress {
            print_shards(&output.shards);
            for err in &output.page_errors {
                eprintln!("  {} {}", red("✗"), err);
            }
        }
        eprintln!(
            "{}  {}/{} pages  {} shard(s)  {}ms  →  {}",
            if output.page_errors.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            output.stats.written_pages,
            output.stats.selected_pages,
            output.stats.shard_count,
            output.stats.total_duration_ms,
            bold(&cli.output_folder.display().to_string()),
        );
    }

    Ok(())
}

fn print_shards(shards: &[ShardInfo]) {
    for shard in shards {
        let range = match (shard.pages.first(), shard.pages.last()) {
            (Some(first), Some(last)) if first != last => format!("pages {first}-{last}"),
            (Some(only), _) => format!("page {only}"),
            _ => String::new(),
        };
        eprintln!(
            "  {}  {:<12}  {}",
            shard.path.display(),
            range,
            dim(&mb(shard.size_bytes))
        );
    }
}

/// Map CLI args to `SplitConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SplitConfig> {
    let pages: PageSelection = cli.pages.parse().context("Invalid --pages")?;
    let policy = if cli.abort_on_render_error {
        RenderFailurePolicy::Abort
    } else {
        RenderFailurePolicy::Skip
    };

    let mut builder = SplitConfig::builder()
        .dpi(cli.dpi)
        .jpeg_quality(cli.quality)
        .max_shard_mib(cli.max_size_mb)
        .output_dir(&cli.output_folder)
        .intermediate_path(&cli.temp_pdf)
        .shard_prefix(&cli.prefix)
        .pages(pages)
        .render_failure(policy);

    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
