//! CLI binary for svgr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use svgr::config::DEFAULT_API_URL;
use svgr::entitlement::EntitlementStore;
use svgr::locale::resolve_language;
use svgr::{
    convert_batch_to_files, inspect, ConversionConfig, ConversionProgressCallback, ConversionStats,
    CreditNotice, DirLocaleProvider, ExportFormat, ExportOutcome, FileConversion,
    HttpEntitlementStore, IdentityProvider, ImageInfo, ProgressCallback, StaticTokenIdentity,
    Translator, APP_NAME,
};
use tokio::task::JoinHandle;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with a file counter; one log line per conversion and export.
/// Files finish out of order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    translator: Arc<Translator>,
}

impl CliProgressCallback {
    fn new(total: usize, translator: Arc<Translator>) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {pos:>3}/{len} files  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix(translator.t("converting").to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar, translator })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_convert_start(&self, file_name: &str) {
        self.bar.set_message(file_name.to_string());
    }

    fn on_convert_complete(&self, file_name: &str, svg_len: usize) {
        self.bar.println(format!(
            "  {} {:<32}  {}",
            green("✓"),
            file_name,
            dim(&format!("{svg_len:>7} bytes SVG")),
        ));
        self.bar.inc(1);
    }

    fn on_convert_error(&self, file_name: &str, error: &str) {
        let msg = truncate(error.lines().next().unwrap_or(error), 80);
        self.bar
            .println(format!("  {} {:<32}  {}", red("✗"), file_name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_export_saved(&self, path: &Path, _bytes_written: usize) {
        let text = self
            .translator
            .t_with("saved", &[("path", &path.display().to_string())]);
        self.bar.println(format!("    {}", dim(&text)));
    }

    fn on_export_blocked(&self, balance: i64) {
        self.bar.println(format!(
            "    {} {}",
            yellow("⚠"),
            yellow(&format!("{}: {balance}", self.translator.t("credits.currentBalance")))
        ));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one image, write logo.svg into the current directory
  svgr convert logo.png

  # Higher quality, transparent background, PDF and SVG into ./out
  svgr convert --quality 8 --transparent --format both -o out photo.jpg

  # Batch, four at a time, JSON report on stdout
  svgr convert --concurrency 4 --json scans/*.png > report.json

  # Image metadata only (no network)
  svgr inspect photo.webp

  # Show balance and packages, then buy one
  # (add --credits to convert to gate exports on the balance)
  svgr --token "$TOKEN" credits
  svgr --token "$TOKEN" credits --buy pack_100

ENVIRONMENT VARIABLES:
  SVGR_API_URL       Conversion and credits API base URL
  SVGR_TOKEN         Bearer token sent with every request
  SVGR_LANG          Interface language (en, fr, de, ja, zh-hant, ...)
  SVGR_LOCALES_DIR   Directory holding {lang}/svgr.json translation tables
  SVGR_CREDITS       Enable the credit gate in front of exports
  RUST_LOG           Override log filtering (e.g. svgr=debug)
"#;

/// Convert raster images to SVG and PDF through a vectorisation service.
#[derive(Parser, Debug)]
#[command(
    name = "svgr",
    version,
    about = "Convert raster images to SVG and PDF through a vectorisation service",
    long_about = "Upload PNG, JPEG, WEBP, BMP or GIF images to a raster-to-vector \
conversion service and save the returned drawing as SVG, or as a one-page PDF sized \
to the drawing.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base URL of the conversion and credits API.
    #[arg(long, global = true, env = "SVGR_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer token for authenticated requests.
    #[arg(long, global = true, env = "SVGR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Interface language; falls back to $LANG, then English.
    #[arg(long, global = true, env = "SVGR_LANG")]
    lang: Option<String>,

    /// Directory with `{lang}/svgr.json` translation tables.
    #[arg(long, global = true, env = "SVGR_LOCALES_DIR")]
    locales_dir: Option<PathBuf>,

    /// Gate exports on the account's credit balance.
    #[arg(long, global = true, env = "SVGR_CREDITS")]
    credits: bool,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "SVGR_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SVGR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "SVGR_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "SVGR_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert images and export the results.
    Convert(ConvertArgs),

    /// Print image metadata without converting.
    Inspect {
        /// Image file to read.
        input: PathBuf,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show the credit balance and packages, or buy one.
    Credits {
        /// Package id to purchase.
        #[arg(long, value_name = "PACKAGE")]
        buy: Option<String>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Image files (PNG, JPEG, WEBP, BMP, GIF).
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Directory for exported files. Default: current directory.
    #[arg(short, long, env = "SVGR_OUTPUT_DIR")]
    output: Option<PathBuf>,

    /// Export format.
    #[arg(long, value_enum, default_value = "svg")]
    format: FormatArg,

    /// Quality level; clamped to 1..=10.
    #[arg(long, env = "SVGR_QUALITY", default_value_t = 5, allow_negative_numbers = true)]
    quality: i64,

    /// Ask the service to drop the background.
    #[arg(long, env = "SVGR_TRANSPARENT")]
    transparent: bool,

    /// Number of files converted at once.
    #[arg(short, long, env = "SVGR_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Print a JSON report on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Svg,
    Pdf,
    Both,
}

impl FormatArg {
    fn formats(self) -> Vec<ExportFormat> {
        match self {
            FormatArg::Svg => vec![ExportFormat::Svg],
            FormatArg::Pdf => vec![ExportFormat::Pdf],
            FormatArg::Both => vec![ExportFormat::Svg, ExportFormat::Pdf],
        }
    }
}

/// Per-file entry of the `--json` report.
#[derive(Serialize)]
struct FileReport {
    input: PathBuf,
    image: Option<ImageInfo>,
    stats: Option<ConversionStats>,
    exports: Vec<ExportReport>,
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum ExportReport {
    Saved {
        path: PathBuf,
        format: ExportFormat,
        bytes_written: usize,
    },
    Blocked {
        balance: i64,
        purchase_route: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active.
    let json = match &cli.command {
        Command::Convert(args) => args.json,
        Command::Inspect { json, .. } | Command::Credits { json, .. } => *json,
    };
    let show_progress = !cli.quiet && !cli.no_progress && !json;
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

    let translator = Arc::new(load_translator(&cli).await);

    match &cli.command {
        Command::Inspect { input, json } => run_inspect(input, *json).await,
        Command::Credits { buy, json } => run_credits(&cli, &translator, buy.as_deref(), *json).await,
        Command::Convert(args) => run_convert(&cli, args, translator, show_progress).await,
    }
}

async fn load_translator(cli: &Cli) -> Translator {
    let requested = cli.lang.clone().or_else(|| std::env::var("LANG").ok());
    match &cli.locales_dir {
        Some(dir) => Translator::load(&DirLocaleProvider::new(dir), requested.as_deref()).await,
        None => Translator::with_table(resolve_language(requested.as_deref()), Default::default()),
    }
}

fn identity(cli: &Cli) -> Option<Arc<dyn IdentityProvider>> {
    cli.token
        .as_ref()
        .map(|t| Arc::new(StaticTokenIdentity::new(t.clone())) as Arc<dyn IdentityProvider>)
}

/// Credit store for `--credits`, with the balance loaded up front.
///
/// A failed first load leaves the balance unknown, which the gate treats as
/// optimistic.
async fn entitlement_store(cli: &Cli) -> Result<Arc<HttpEntitlementStore>> {
    let store = HttpEntitlementStore::new(&cli.api_url, cli.timeout, identity(cli))
        .context("Failed to set up the credits client")?;
    if let Err(e) = store.refresh_balance().await {
        warn!("Could not load credit balance: {}", e);
    }
    Ok(Arc::new(store))
}

fn purchase_route(translator: &Translator) -> String {
    format!("/{}/credits", translator.language())
}

// ── inspect ──────────────────────────────────────────────────────────────

async fn run_inspect(input: &Path, json: bool) -> Result<()> {
    let info = inspect(input)
        .await
        .with_context(|| format!("Failed to inspect {}", input.display()))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
        );
    } else {
        println!("File:         {}", info.file_name);
        println!("Type:         {}", info.mime_type);
        println!("Size:         {} bytes", info.byte_size);
        match info.dimensions {
            Some(d) => println!("Dimensions:   {}x{}", d.width, d.height),
            None => println!("Dimensions:   unknown"),
        }
    }
    Ok(())
}

// ── credits ──────────────────────────────────────────────────────────────

async fn run_credits(
    cli: &Cli,
    translator: &Translator,
    buy: Option<&str>,
    json: bool,
) -> Result<()> {
    if cli.token.is_none() {
        anyhow::bail!("{}", translator.t("credits.loginRequired"));
    }
    let store = entitlement_store(cli).await?;
    let offering = svgr::config::DEFAULT_OFFERING_ID;

    if let Some(package_id) = buy {
        let receipt = store
            .purchase(package_id, offering)
            .await
            .with_context(|| format!("Failed to purchase package '{package_id}'"))?;
        if json {
            println!(
                "{}",
                serde_json::to_string_pretty(&receipt).context("Failed to serialise receipt")?
            );
        } else {
            if let Some(url) = &receipt.checkout_url {
                println!("Complete the purchase at {}", bold(url));
            }
            if let Some(balance) = receipt.balance {
                println!("{}: {}", translator.t("credits.currentBalance"), balance);
            }
        }
        return Ok(());
    }

    let packages = store
        .packages(offering)
        .await
        .context("Failed to load credit packages")?;
    let balance = store.cached_balance();

    if json {
        let body = serde_json::json!({ "balance": balance, "packages": packages });
        println!(
            "{}",
            serde_json::to_string_pretty(&body).context("Failed to serialise credits")?
        );
        return Ok(());
    }

    println!("{}", bold(translator.t("credits.title")));
    match balance {
        Some(b) => println!(
            "{}: {} {}",
            translator.t("credits.currentBalance"),
            b,
            translator.t("credits.unit")
        ),
        None => println!("{}: ?", translator.t("credits.currentBalance")),
    }
    if packages.is_empty() {
        println!("{}", dim(translator.t("credits.noProducts")));
    }
    for p in &packages {
        println!(
            "  {:<20} {:>6} {}  {}",
            p.id,
            p.credits,
            translator.t("credits.unit"),
            dim(p.price.as_deref().unwrap_or(""))
        );
    }
    Ok(())
}

// ── convert ──────────────────────────────────────────────────────────────

async fn run_convert(
    cli: &Cli,
    args: &ConvertArgs,
    translator: Arc<Translator>,
    show_progress: bool,
) -> Result<()> {
    let progress =
        show_progress.then(|| CliProgressCallback::new(args.inputs.len(), translator.clone()));
    let config = build_config(cli, args, &translator, progress.clone()).await?;
    let out_dir = args.output.clone().unwrap_or_else(|| PathBuf::from("."));

    if !cli.quiet && !args.json {
        eprintln!("{} {}", bold(APP_NAME), dim(translator.t("tagline")));
    }

    let items = convert_batch_to_files(&args.inputs, &out_dir, &args.format.formats(), &config)
        .await
        .context("Invalid configuration")?;

    if let Some(p) = &progress {
        p.finish();
    }

    let mut reports = Vec::with_capacity(items.len());
    let mut usage_tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut blocked: Option<CreditNotice> = None;
    let mut failed = 0usize;

    for item in items {
        match item.result {
            Ok(conversion) => {
                let (report, tasks, notice) = report_for(item.input, conversion);
                usage_tasks.extend(tasks);
                blocked = blocked.or(notice);
                reports.push(report);
            }
            Err(e) => {
                failed += 1;
                if progress.is_none() && !cli.quiet && !args.json {
                    eprintln!("{} {}: {}", red("✗"), item.input.display(), e);
                }
                reports.push(FileReport {
                    input: item.input,
                    image: None,
                    stats: None,
                    exports: Vec::new(),
                    error: Some(e.to_string()),
                });
            }
        }
    }

    // Usage records are fire-and-forget, but the runtime must not shut down
    // under them.
    for task in usage_tasks {
        let _ = task.await;
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&reports, &translator, progress.is_none());
    }

    if let Some(notice) = blocked {
        eprintln!(
            "{} {}",
            yellow("⚠"),
            translator.t_with("credits.insufficient", &[("route", &notice.purchase_route)])
        );
    }
    if failed > 0 {
        anyhow::bail!(
            "{}: {failed} of {} files",
            translator.t("conversionFailed"),
            reports.len()
        );
    }
    Ok(())
}

fn report_for(
    input: PathBuf,
    conversion: FileConversion,
) -> (FileReport, Vec<JoinHandle<()>>, Option<CreditNotice>) {
    let mut tasks = Vec::new();
    let mut notice = None;
    let exports = conversion
        .exports
        .into_iter()
        .map(|outcome| match outcome {
            ExportOutcome::Saved {
                receipt,
                usage_task,
            } => {
                tasks.extend(usage_task);
                ExportReport::Saved {
                    path: receipt.path,
                    format: receipt.format,
                    bytes_written: receipt.bytes_written,
                }
            }
            ExportOutcome::Blocked(n) => {
                let report = ExportReport::Blocked {
                    balance: n.balance,
                    purchase_route: n.purchase_route.clone(),
                };
                notice = Some(n);
                report
            }
        })
        .collect();

    let report = FileReport {
        input,
        image: Some(conversion.output.image),
        stats: Some(conversion.output.stats),
        exports,
        error: None,
    };
    (report, tasks, notice)
}

fn print_summary(reports: &[FileReport], translator: &Translator, per_file: bool) {
    let ok = reports.iter().filter(|r| r.error.is_none()).count();
    if per_file {
        for r in reports.iter().filter(|r| r.error.is_none()) {
            for e in &r.exports {
                if let ExportReport::Saved { path, .. } = e {
                    eprintln!(
                        "{} {}",
                        green("✓"),
                        translator.t_with("saved", &[("path", &path.display().to_string())])
                    );
                }
            }
        }
    }
    let total_ms: u64 = reports
        .iter()
        .filter_map(|r| r.stats.as_ref())
        .map(|s| s.total_duration_ms)
        .max()
        .unwrap_or(0);
    eprintln!(
        "{}  {}/{} files  {}ms",
        if ok == reports.len() {
            green("✔")
        } else {
            red("✘")
        },
        ok,
        reports.len(),
        total_ms
    );
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(
    cli: &Cli,
    args: &ConvertArgs,
    translator: &Translator,
    progress: Option<Arc<CliProgressCallback>>,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .api_url(&cli.api_url)
        .quality(args.quality)
        .transparent_background(args.transparent)
        .request_timeout_secs(cli.timeout)
        .concurrency(args.concurrency)
        .purchase_route(purchase_route(translator));

    if let Some(identity) = identity(cli) {
        builder = builder.identity(identity);
    }
    if cli.credits {
        builder = builder.entitlements(entitlement_store(cli).await? as Arc<dyn EntitlementStore>);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb as ProgressCallback);
    }

    builder.build().context("Invalid configuration")
}
