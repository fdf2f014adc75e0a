//! CLI binary for pdf-autograder.
//!
//! `serve` runs the web front end; `grade` grades a batch from the terminal
//! and writes the same text report and CSV the browser offers for download.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_autograder::web::auth::AuthConfig;
use pdf_autograder::web::{DEFAULT_BIND, DEFAULT_MAX_UPLOAD_MB};
use pdf_autograder::{
    grade, start_server, write_reports, AppState, GradingConfig, GradingProgressCallback,
    GradingReport, LogProgressCallback, ProgressCallback, ServerConfig, UploadedPdf,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

/// Shorten `s` to at most `max` characters, appending an ellipsis.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over students, with a log line per page above it.
///
/// Page events of one student may arrive out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<HashMap<String, Instant>>,
    page_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner);
        bar.set_prefix("Preparing");
        bar.set_message("Reading answer key…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
            page_errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, name: &str) -> f64 {
        self.started
            .lock()
            .ok()
            .and_then(|m| m.get(name).map(|t| t.elapsed().as_secs_f64()))
            .unwrap_or(0.0)
    }
}

impl GradingProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, students: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} students  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(students as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Grading");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Grading {students} submission(s)…"))
        ));
    }

    fn on_answer_key_ready(&self, page_count: usize, text_len: usize) {
        self.bar.println(format!(
            "  {} Answer key  {}",
            green("✓"),
            dim(&format!("{page_count} pages, {text_len} chars")),
        ));
    }

    fn on_student_start(&self, name: &str, index: usize, total: usize) {
        if let Ok(mut m) = self.started.lock() {
            m.insert(name.to_string(), Instant::now());
        }
        self.bar.println(format!(
            "{} {}",
            cyan("▸"),
            bold(&format!("[{index}/{total}] {name}"))
        ));
        self.bar.set_message(name.to_string());
    }

    fn on_page_complete(&self, _name: &str, page_num: usize, total_pages: usize, text_len: usize) {
        self.bar.println(format!(
            "    {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{text_len:>5} chars")),
        ));
    }

    fn on_page_error(&self, _name: &str, page_num: usize, total_pages: usize, error: &str) {
        self.page_errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "    {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&truncate(error, 80)),
        ));
    }

    fn on_student_complete(&self, name: &str, score: &str, error: Option<&str>) {
        let secs = self.elapsed_secs(name);
        let line = match error {
            None => format!(
                "  {} {}  {}  {}",
                green("✔"),
                name,
                bold(score),
                dim(&format!("{secs:.1}s"))
            ),
            Some(e) => format!(
                "  {} {}  {}  {}",
                red("✘"),
                name,
                red(&truncate(e, 80)),
                dim(&format!("{secs:.1}s"))
            ),
        };
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, students: usize, graded: usize) {
        self.bar.finish_and_clear();
        let skipped = self.page_errors.load(Ordering::SeqCst);
        if graded == students {
            eprintln!(
                "{} {} submissions graded",
                green("✔"),
                bold(&graded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} submissions graded  ({} failed)",
                if graded == 0 { red("✘") } else { cyan("⚠") },
                bold(&graded.to_string()),
                students,
                red(&(students - graded).to_string()),
            );
        }
        if skipped > 0 {
            eprintln!("   {} page(s) skipped", red(&skipped.to_string()));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Web front end with Auth0 login
  autograder serve

  # Local web front end, no login
  autograder serve --no-auth --bind 127.0.0.1:3000

  # Grade from the terminal
  autograder grade --key key.pdf alice.pdf bob.pdf --out-dir results/

  # Single student with an explicit name
  autograder grade --key key.pdf scan.pdf --student-name "Ada Lovelace"

  # Another provider
  autograder grade --provider openai --model gpt-4.1 --key key.pdf *.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY             Google Gemini API key (default provider)
  AUTOGRADER_PROVIDER        Override provider (gemini, openai, anthropic, ollama)
  AUTOGRADER_MODEL           Override model ID (default gemini-2.0-flash)
  AUTH0_DOMAIN               Auth0 tenant, e.g. example.eu.auth0.com
  AUTH0_CLIENT_ID            Auth0 application client id
  AUTH0_CLIENT_SECRET        Auth0 application client secret
  AUTH0_CALLBACK_URL         Redirect URI registered with Auth0
  AUTH0_LOGOUT_URL           Where Auth0 sends the browser after logout
  AUTOGRADER_BIND            Address for `serve`
  AUTOGRADER_MAX_UPLOAD_MB   Upload limit for one grading request
  PDFIUM_LIB_PATH            Directory or file of an existing libpdfium

  Variables may also be placed in a .env file in the working directory.
"#;

/// Grade handwritten answer sheets against an answer key.
#[derive(Parser, Debug)]
#[command(
    name = "autograder",
    version,
    about = "Grade handwritten PDF answer sheets against an answer key",
    long_about = "Extracts the answer key's text, transcribes each student's handwritten pages \
with a multimodal model, and asks the model to compare them. Runs as a web app (`serve`) or \
from the terminal (`grade`).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    model: ModelArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "AUTOGRADER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "AUTOGRADER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web front end.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "AUTOGRADER_BIND", default_value = DEFAULT_BIND)]
        bind: String,

        /// Serve without Auth0 login.
        #[arg(long, env = "AUTOGRADER_NO_AUTH")]
        no_auth: bool,

        /// Upload limit for one grading request, in MiB.
        #[arg(long, env = "AUTOGRADER_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_MB)]
        max_upload_mb: usize,
    },

    /// Grade student PDFs from the terminal.
    Grade {
        /// Answer key PDF (digital, with a text layer).
        #[arg(short, long)]
        key: PathBuf,

        /// Student PDFs (scanned handwriting).
        #[arg(required = true)]
        students: Vec<PathBuf>,

        /// Directory for grading_results.txt and student_scores.csv.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Name to use when exactly one student PDF is given.
        #[arg(long)]
        student_name: Option<String>,

        /// Print the full report as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "AUTOGRADER_NO_PROGRESS")]
        no_progress: bool,
    },
}

/// Model and rendering options shared by both subcommands.
#[derive(Args, Debug)]
struct ModelArgs {
    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(long, global = true, env = "AUTOGRADER_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gemini-2.0-flash, gemini-2.5-pro, gpt-4.1).
    #[arg(long, global = true, env = "AUTOGRADER_MODEL")]
    model: Option<String>,

    /// Rendering DPI for handwritten pages (72–400).
    #[arg(long, global = true, env = "AUTOGRADER_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Pages of one student transcribed at once.
    #[arg(short, long, global = true, env = "AUTOGRADER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per model call.
    #[arg(long, global = true, env = "AUTOGRADER_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "AUTOGRADER_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, global = true, env = "AUTOGRADER_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Per-call timeout in seconds.
    #[arg(long, global = true, env = "AUTOGRADER_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // The progress bar replaces INFO logs in `grade`; `serve` always logs.
    let show_progress = match &cli.command {
        Command::Grade {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        Command::Serve { .. } => false,
    };
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

    match cli.command {
        Command::Serve {
            ref bind,
            no_auth,
            max_upload_mb,
        } => {
            let auth = if no_auth {
                tracing::warn!("Login disabled: anyone who can reach the server can grade");
                None
            } else {
                Some(AuthConfig::from_env().context(
                    "Auth0 is not configured (set AUTH0_* variables or pass --no-auth)",
                )?)
            };
            let config = build_config(&cli.model, Arc::new(LogProgressCallback), true)?;
            let state = AppState::new(config, auth.clone()).context("Failed to start server")?;
            let server = ServerConfig {
                bind: bind.clone(),
                max_upload_mb,
                auth,
            };
            start_server(&server, state)
                .await
                .with_context(|| format!("Server on {} stopped", server.bind))?;
        }
        Command::Grade {
            ref key,
            ref students,
            ref out_dir,
            ref student_name,
            json,
            ..
        } => {
            let progress: ProgressCallback = if show_progress {
                CliProgressCallback::new() as Arc<dyn GradingProgressCallback>
            } else {
                Arc::new(LogProgressCallback)
            };
            let config = build_config(&cli.model, progress, false)?;

            let key = read_upload(key).await?;
            let mut uploads = Vec::with_capacity(students.len());
            for path in students {
                uploads.push(read_upload(path).await?);
            }

            let report = grade(&key, &uploads, student_name.as_deref(), &config)
                .await
                .context("Grading failed")?;

            let (text_path, csv_path) = write_reports(&report, out_dir)
                .await
                .context("Failed to write reports")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else {
                print_summary(&report);
            }

            if !cli.quiet {
                eprintln!(
                    "   {} tokens in  /  {} tokens out  ·  {}ms total",
                    dim(&report.stats.total_input_tokens.to_string()),
                    dim(&report.stats.total_output_tokens.to_string()),
                    report.stats.total_duration_ms,
                );
                eprintln!(
                    "   {}  {}",
                    bold(&text_path.display().to_string()),
                    bold(&csv_path.display().to_string()),
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `GradingConfig`.
///
/// Page images are only kept for the web results page.
fn build_config(
    args: &ModelArgs,
    progress: ProgressCallback,
    keep_page_images: bool,
) -> Result<GradingConfig> {
    let mut builder = GradingConfig::builder()
        .dpi(args.dpi)
        .concurrency(args.concurrency)
        .max_retries(args.max_retries)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .api_timeout_secs(args.api_timeout)
        .keep_page_images(keep_page_images)
        .progress_callback(progress);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }

    builder.build().context("Invalid configuration")
}

async fn read_upload(path: &Path) -> Result<UploadedPdf> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedPdf::new(file_name, bytes))
}

/// Table of name, score and pages on stdout.
fn print_summary(report: &GradingReport) {
    let width = report
        .submissions
        .iter()
        .map(|s| s.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Student".len());

    println!("{:<width$}  {:<12}  Pages", "Student", "Score");
    println!("{:<width$}  {:<12}  ─────", "─".repeat(width), "─".repeat(12));
    for s in &report.submissions {
        let pages = if s.pages.is_empty() {
            "-".to_string()
        } else {
            format!("{}/{}", s.pages.len() - s.failed_pages(), s.pages.len())
        };
        let score = match s.error {
            Some(_) => "error".to_string(),
            None => s.display_score(),
        };
        println!("{:<width$}  {:<12}  {}", s.name, score, pages);
    }
}
