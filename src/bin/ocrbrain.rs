//! CLI binary for ocrbrain.
//!
//! A thin shim over the library crate: loads settings, makes sure the model
//! artifact is on disk, builds the engine and runs one batch.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocrbrain::settings::DEFAULT_CONFIG_DIR;
use ocrbrain::{
    BatchProgressCallback, BatchRunner, BatchSummary, DocumentType, EngineHandle, OcrConfig,
    OcrError, PdfiumRasterizer, ProgressCallback, Region, Settings, VlmEngine,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over files, one log line per finished file.
struct CliProgressCallback {
    bar: ProgressBar,
    file_started: Mutex<Option<Instant>>,
    /// Echo streamed tokens to stderr.
    stream: bool,
}

impl CliProgressCallback {
    fn new(stream: bool) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Discovering inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
            stream,
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("OCR");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total_files: usize, _path: &str) {
        if let Ok(mut t) = self.file_started.lock() {
            *t = Some(Instant::now());
        }
    }

    fn on_page_start(&self, path: &str, page_num: usize, total_pages: usize) {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        self.bar.set_message(format!("{name} p{page_num}/{total_pages}"));
    }

    fn on_token(&self, piece: &str) {
        if self.stream {
            self.bar.suspend(|| {
                let mut err = io::stderr().lock();
                let _ = err.write_all(piece.as_bytes());
                let _ = err.flush();
            });
        }
    }

    fn on_file_complete(&self, path: &str, output: &Path) {
        self.bar.println(format!(
            "  {} {}  →  {}  {}",
            green("✓"),
            path,
            dim(&output.display().to_string()),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, path: &str, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg = match first_line.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &first_line[..cut]),
            None => first_line.to_string(),
        };

        self.bar.println(format!(
            "  {} {}  {}  {}",
            red("✗"),
            path,
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.bar.finish_and_clear();
        if summary.skipped > 0 {
            eprintln!(
                "{} {} PDF(s) produced no pages and were skipped",
                cyan("⚠"),
                summary.skipped
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One image, plain text
  ocrbrain -i scan.png

  # A directory of images and PDFs, formatted output
  ocrbrain -i ./inbox --ocrtype format -o ./results

  # Only the region [x0, y0, x1, y1] (source pixels) in red ink
  ocrbrain -i invoice.jpg --box "[120, 40, 900, 210]" --color red

  # Remote input
  ocrbrain -i https://example.com/paper.pdf

OUTPUT:
  One <basename>.json per input file in the output directory, one JSON object
  per line. Image results append; PDF results replace the file.

CONFIGURATION (config/appDev.yaml, then config/models.yaml):
  ocr:
    modelPath: ./models/got-ocr2
    downloadUrl: https://…/model.safetensors
    provider: ollama        # optional, engine endpoint
    model: got-ocr2         # optional

ENVIRONMENT VARIABLES:
  OCRBRAIN_CONFIG_DIR     Directory holding the YAML settings
  EDGEQUAKE_LLM_PROVIDER  Engine endpoint provider (when not in config)
  EDGEQUAKE_MODEL         Engine model id (when not in config)
  PDFIUM_LIB_PATH         Path to an existing libpdfium (skips auto-download)
  OCRBRAIN_CACHE_DIR      Override the default pdfium cache directory
"#;

/// OCR images and PDFs into JSON with a vision-language model.
#[derive(Parser, Debug)]
#[command(
    name = "ocrbrain",
    version,
    about = "OCR images and PDFs into JSON with a vision-language model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image, PDF, directory, or HTTP/HTTPS URL.
    #[arg(short, long)]
    input: String,

    /// Directory receiving the JSON results.
    #[arg(
        short = 'o',
        long = "output_dir",
        env = "OCRBRAIN_OUTPUT_DIR",
        default_value = "results"
    )]
    output_dir: PathBuf,

    /// Transcription type.
    #[arg(long, value_enum, default_value = "plain")]
    ocrtype: OcrTypeArg,

    /// Region hint in source pixels: "[x, y]" or "[x0, y0, x1, y1]".
    #[arg(long = "box", value_parser = parse_region)]
    region: Option<Region>,

    /// Colour hint, e.g. red.
    #[arg(long)]
    color: Option<String>,

    /// Directory holding appDev.yaml and models.yaml.
    #[arg(long, env = "OCRBRAIN_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: PathBuf,

    /// Engine provider; overrides ocr.provider.
    #[arg(long)]
    provider: Option<String>,

    /// Engine model id; overrides ocr.model.
    #[arg(long)]
    model: Option<String>,

    /// Rendering DPI for PDF pages (72–600).
    #[arg(long, env = "OCRBRAIN_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Echo generated text to stderr while it is produced.
    #[arg(long)]
    stream: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCRBRAIN_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "OCRBRAIN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCRBRAIN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCRBRAIN_QUIET")]
    quiet: bool,
}

impl Cli {
    /// Default tracing filter when `RUST_LOG` is unset.
    fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrTypeArg {
    Plain,
    Format,
}

impl From<OcrTypeArg> for DocumentType {
    fn from(v: OcrTypeArg) -> Self {
        match v {
            OcrTypeArg::Plain => DocumentType::Plain,
            OcrTypeArg::Format => DocumentType::Formatted,
        }
    }
}

fn parse_region(s: &str) -> Result<Region, String> {
    let region: Region = s.parse().map_err(|e: OcrError| e.to_string())?;
    region.validate().map_err(|e| e.to_string())?;
    Ok(region)
}

fn byte_bar(prefix: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix(prefix);
    bar.set_message("Connecting…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn report(bar: &ProgressBar) -> impl Fn(u64, Option<u64>) + '_ {
    move |downloaded, total| {
        if let Some(t) = total {
            if bar.length().unwrap_or(0) != t {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = cli.log_filter();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Settings ─────────────────────────────────────────────────────────
    let settings = Settings::load_dir(&cli.config_dir)
        .with_context(|| format!("Failed to load settings from {}", cli.config_dir.display()))?;
    let model = settings.model_settings()?;
    let target = model.download_target()?;

    // ── Model artifact ───────────────────────────────────────────────────
    // block_in_place keeps the progress closure borrow valid while the
    // blocking download runs off the executor's hot path.
    let ready = if show_progress && !target.destination.exists() {
        let bar = byte_bar("Model");
        let on_progress = report(&bar);
        let ok =
            tokio::task::block_in_place(|| model_fetch::ensure(&target, Some(&on_progress)));
        if ok {
            bar.finish_with_message("ready ✓");
        } else {
            bar.abandon_with_message("failed");
        }
        ok
    } else {
        tokio::task::block_in_place(|| model_fetch::ensure(&target, None))
    };
    if !ready {
        return Err(OcrError::ArtifactFetchFailed {
            url: target.url.clone(),
            destination: target.destination.clone(),
        }
        .into());
    }

    // ── PDF engine ───────────────────────────────────────────────────────
    // Provisioned up front so the download shows a bar; a failure here only
    // affects PDF inputs, which then fail individually.
    if !model_fetch::is_pdfium_cached() {
        let result = if show_progress {
            let bar = byte_bar("PDF engine");
            let on_progress = report(&bar);
            let r = tokio::task::block_in_place(|| {
                model_fetch::ensure_pdfium_library(Some(&on_progress))
            });
            bar.finish_and_clear();
            r
        } else {
            tokio::task::block_in_place(|| model_fetch::ensure_pdfium_library(None))
        };
        if let Err(e) = result {
            tracing::warn!("PDFium unavailable, PDF inputs will fail: {}", e);
        }
    }

    // ── Engine ───────────────────────────────────────────────────────────
    let provider = cli.provider.as_deref().or(model.provider.as_deref());
    let model_id = cli.model.as_deref().or(model.model.as_deref());
    let engine = VlmEngine::from_settings(provider, model_id)?;

    // ── Build config ─────────────────────────────────────────────────────
    let cli_cb = show_progress.then(|| CliProgressCallback::new(cli.stream));
    let mut builder = OcrConfig::builder()
        .document_type(cli.ocrtype.into())
        .dpi(cli.dpi)
        .output_dir(&cli.output_dir)
        .stream_tokens(cli.stream)
        .download_timeout_secs(cli.download_timeout);
    if let Some(region) = cli.region.clone() {
        builder = builder.region(region);
    }
    if let Some(color) = cli.color.clone() {
        builder = builder.color(color);
    }
    if let Some(cb) = &cli_cb {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    } else if cli.stream {
        builder = builder.progress_callback(Arc::new(StderrTokens) as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let rasterizer = PdfiumRasterizer::new(config.dpi);
    let runner = BatchRunner::new(EngineHandle::new(engine), rasterizer, config);

    let summary = match runner.run(&cli.input).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(cb) = &cli_cb {
                cb.bar.finish_and_clear();
            }
            if e.is_fatal() {
                return Err(e.into());
            }
            // Bad input is reported with a zero exit.
            tracing::error!("{}", e);
            eprintln!("{} {}", red("✘"), e);
            return Ok(());
        }
    };

    if !cli.quiet {
        let mark = if summary.failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {}/{} file(s) written  {}  →  {}",
            mark,
            bold(&summary.written.to_string()),
            summary.discovered,
            dim(&format!(
                "{} failed, {} skipped",
                summary.failed, summary.skipped
            )),
            bold(&cli.output_dir.display().to_string()),
        );
    }

    Ok(())
}

/// Token echo used when the progress bar is off.
struct StderrTokens;

impl BatchProgressCallback for StderrTokens {
    fn on_token(&self, piece: &str) {
        let mut err = io::stderr().lock();
        let _ = err.write_all(piece.as_bytes());
        let _ = err.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ocrbrain", "-i", "scan.png"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn log_filter_defaults_to_info_with_or_without_progress() {
        assert_eq!(parse(&[]).log_filter(), "info");
        assert_eq!(parse(&["--no-progress"]).log_filter(), "info");
        assert_eq!(parse(&["-v"]).log_filter(), "debug");
        assert_eq!(parse(&["-q"]).log_filter(), "error");
    }
}
