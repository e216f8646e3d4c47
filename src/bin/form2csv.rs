//! CLI binary for edgequake-form2csv.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and writes the CSV.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_form2csv::extract::write_csv_atomic;
use edgequake_form2csv::{
    extract, inspect, ExtractionConfig, ExtractionOutput, ExtractionProgressCallback,
    FieldSchema, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a progress bar over forms plus one log line
/// per form.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the form currently in flight.
    form_started: Mutex<Option<Instant>>,
    malformed: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` tells us how many forms there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            form_started: Mutex::new(None),
            malformed: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} forms  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn take_elapsed_secs(&self) -> f64 {
        self.form_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn abandon(&self) {
        self.bar.abandon();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_forms: usize, discarded_pages: usize) {
        self.activate_bar(total_forms);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_forms} forms…"))
        ));
        if discarded_pages > 0 {
            self.bar.println(format!(
                "  {} {} trailing page(s) without a partner will be skipped",
                yellow("⚠"),
                discarded_pages
            ));
        }
    }

    fn on_form_start(&self, form_num: usize, _total: usize) {
        if let Ok(mut t) = self.form_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("form {form_num}"));
    }

    fn on_form_complete(&self, form_num: usize, total: usize, resolved_fields: usize) {
        let secs = self.take_elapsed_secs();
        self.bar.println(format!(
            "  {} Form {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            form_num,
            total,
            dim(&format!("{resolved_fields:>3} fields")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_form_error(&self, form_num: usize, total: usize, error: &str) {
        let secs = self.take_elapsed_secs();
        self.malformed.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Form {:>3}/{:<3}  {}  {}",
            yellow("⚠"),
            form_num,
            total,
            yellow(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_forms: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let malformed = self.malformed.load(Ordering::SeqCst);
        if malformed == 0 {
            eprintln!(
                "{} {} forms extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} forms extracted  ({} left as N/A)",
                yellow("⚠"),
                bold(&success_count.to_string()),
                total_forms,
                yellow(&malformed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract to stdout
  form2csv surveys.pdf

  # Extract to a file
  form2csv surveys.pdf -o responses.csv

  # Custom field list, one name per line
  form2csv --fields-file fields.txt surveys.pdf -o responses.csv

  # Route through another provider
  form2csv --provider anthropic --model claude-sonnet-4-20250514 surveys.pdf

  # Extract from a URL
  form2csv https://example.com/scans/surveys.pdf -o responses.csv

  # Count pages and forms (no API key needed)
  form2csv --inspect-only surveys.pdf

INPUT LAYOUT:
  Every form is exactly two consecutive pages: pages 1+2 are form 1,
  pages 3+4 are form 2, and so on. A final page without a partner is
  skipped with a warning.

OUTPUT:
  One CSV row per form, columns in field order. Fields the model could not
  read are written as N/A.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key for the chat-completions endpoint
  ANTHROPIC_API_KEY       Used when --provider anthropic
  GEMINI_API_KEY          Used when --provider gemini
  PDFIUM_LIB_PATH         Directory or file of an existing libpdfium
  RUST_LOG                Override the log filter (e.g. edgequake_form2csv=debug)
"#;

/// Extract handwritten survey forms from a scanned PDF into CSV.
#[derive(Parser, Debug)]
#[command(
    name = "form2csv",
    version,
    about = "Extract handwritten two-page survey forms from a scanned PDF into CSV",
    long_about = "Render each page of a scanned PDF, send every two-page form to a vision \
language model and write one CSV row per form. Works with any OpenAI-compatible \
chat-completions endpoint, or any edgequake-llm provider via --provider.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write CSV to this file instead of stdout.
    #[arg(short, long, env = "FORM2CSV_OUTPUT")]
    output: Option<PathBuf>,

    /// Vision model ID.
    #[arg(long, env = "FORM2CSV_MODEL", default_value = edgequake_form2csv::config::DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider (anthropic, gemini, ollama, …) instead of the
    /// direct chat-completions client.
    #[arg(long, env = "FORM2CSV_PROVIDER")]
    provider: Option<String>,

    /// API key for the chat-completions endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat-completions URL.
    #[arg(long, env = "FORM2CSV_ENDPOINT", default_value = edgequake_form2csv::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// File with one field name per line (blank lines and `#` comments skipped).
    /// Default: the retreat feedback form.
    #[arg(long, env = "FORM2CSV_FIELDS_FILE")]
    fields_file: Option<PathBuf>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "FORM2CSV_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max tokens the model may generate per form.
    #[arg(long, env = "FORM2CSV_MAX_TOKENS", default_value_t = 1000)]
    max_tokens: usize,

    /// Retries per form on transport failure before giving up.
    #[arg(long, env = "FORM2CSV_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-form request timeout in seconds.
    #[arg(long, env = "FORM2CSV_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// JPEG quality for rendered pages (1–100).
    #[arg(long, env = "FORM2CSV_JPEG_QUALITY", default_value_t = 95,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FORM2CSV_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print page and form counts only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "FORM2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FORM2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FORM2CSV_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless verbose is on.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input, cli.download_timeout)
            .await
            .context("Failed to inspect PDF")?;
        println!("File:          {}", cli.input);
        if let Some(ref t) = info.title {
            println!("Title:         {}", t);
        }
        if let Some(ref a) = info.author {
            println!("Author:        {}", a);
        }
        if let Some(ref p) = info.producer {
            println!("Producer:      {}", p);
        }
        println!("PDF Version:   {}", info.pdf_version);
        println!("Pages:         {}", info.page_count);
        println!("Forms:         {}", info.form_count);
        if info.has_trailing_page {
            println!("Trailing page: yes (will be skipped)");
        }
        return Ok(());
    }

    let schema = load_schema(&cli).await?;

    let progress: Option<Arc<CliProgressCallback>> = if show_progress {
        Some(CliProgressCallback::new_dynamic())
    } else {
        None
    };
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ExtractionProgressCallback>),
    )?;

    // ── Run extraction ───────────────────────────────────────────────────
    let started = Instant::now();
    let result = tokio::select! {
        res = extract(&cli.input, &schema, &config) => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };
    // The losing branch is dropped by now; an interrupted run has already
    // removed its page store.
    let output = match result {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
            if let Some(ref cb) = progress {
                cb.abandon();
            }
            return Err(e).context("Extraction failed");
        }
        None => {
            if let Some(ref cb) = progress {
                cb.abandon();
            }
            eprintln!("{} interrupted, no CSV written", red("✘"));
            std::process::exit(130);
        }
    };

    // ── Write CSV ────────────────────────────────────────────────────────
    if let Some(ref path) = cli.output {
        write_csv_atomic(&output.dataset, path)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let csv = output.dataset.to_csv().context("Failed to serialise CSV")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(&csv)
            .context("Failed to write to stdout")?;
        handle.flush().ok();
    }

    if !cli.quiet {
        print_summary(&output, cli.output.as_ref(), started);
    }

    Ok(())
}

fn print_summary(output: &ExtractionOutput, path: Option<&PathBuf>, started: Instant) {
    let stats = &output.stats;
    let target = path
        .map(|p| bold(&p.display().to_string()))
        .unwrap_or_else(|| dim("stdout"));
    eprintln!(
        "{}  {} forms  {} pages  {:.1}s  →  {}",
        if stats.malformed_replies == 0 {
            green("✔")
        } else {
            yellow("⚠")
        },
        stats.forms,
        stats.total_pages,
        started.elapsed().as_secs_f64(),
        target,
    );
    eprintln!(
        "   {} fields read  /  {} N/A",
        dim(&stats.resolved_fields.to_string()),
        dim(&stats.unresolved_fields.to_string()),
    );
    if stats.discarded_pages > 0 {
        eprintln!(
            "   {} trailing page(s) skipped",
            yellow(&stats.discarded_pages.to_string())
        );
    }
    for err in &output.form_errors {
        eprintln!("   {} {}", yellow("⚠"), err);
    }
}

/// Field list from `--fields-file`, or the built-in retreat feedback schema.
async fn load_schema(cli: &Cli) -> Result<FieldSchema> {
    match cli.fields_file {
        Some(ref path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read fields file {:?}", path))?;
            FieldSchema::from_lines(&text).context("Invalid fields file")
        }
        None => Ok(FieldSchema::retreat_feedback()),
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .model(cli.model.clone())
        .endpoint(cli.endpoint.clone())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .jpeg_quality(cli.jpeg_quality)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
