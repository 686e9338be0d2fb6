use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use trustwipe::device::{list_block_devices, probe_size};
use trustwipe::engine::{Outcome, WipeEngine, WipeSummary};
use trustwipe::locate::{
    locate_personal_data, LocateReport, BROWSER_DATA_PATTERNS, PERSONAL_DATA_PATTERNS,
};
use trustwipe::progress::{human_bytes, ProgressSample};
use trustwipe::report::{JsonReportSink, ReportMetadata, ReportSink};
use trustwipe::{
    CancelToken, EngineConfig, SafetyClassifier, Target, WipeMethod, WipeOptions,
};

#[derive(Parser)]
#[command(name = "trustwipe")]
#[command(about = "Secure storage sanitization with safety classification and wipe reports")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List block devices with their safety classification
    List,

    /// Show the safety verdict for one device
    Classify {
        /// Device path (e.g. /dev/sdb)
        device: String,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Wipe a block device
    Wipe {
        /// Device path (e.g. /dev/sdb)
        device: String,

        /// Wiping method (zeros, random, dod, gutmann, parallel, lightning)
        #[arg(short, long, default_value = "zeros")]
        method: String,

        /// Number of passes (zeros/random only)
        #[arg(short, long)]
        passes: Option<u32>,

        /// Worker count for the parallel method
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip the typed confirmation (DANGEROUS!)
        #[arg(long)]
        yes: bool,

        /// Disable O_DIRECT writes
        #[arg(long)]
        no_direct_io: bool,

        /// Directory for the JSON wipe report
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Skip writing a report
        #[arg(long)]
        no_report: bool,
    },

    /// Enumerate personal data files matching the configured patterns
    Locate {
        /// Include browser profiles and caches
        #[arg(long)]
        browsers: bool,

        /// Additional glob patterns
        #[arg(long)]
        pattern: Vec<String>,
    },

    /// Overwrite and remove personal data files, preserving the OS
    WipeFiles {
        /// Wiping method (zeros, random, dod)
        #[arg(short, long, default_value = "zeros")]
        method: String,

        /// Number of passes (zeros/random only)
        #[arg(short, long)]
        passes: Option<u32>,

        /// Include browser profiles and caches
        #[arg(long)]
        browsers: bool,

        /// Additional glob patterns
        #[arg(long)]
        pattern: Vec<String>,

        /// Overwrite but keep the files in place
        #[arg(long)]
        keep_files: bool,

        /// Skip the typed confirmation (DANGEROUS!)
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.debug {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::List => cmd_list(),
        Commands::Classify { device, json } => cmd_classify(&device, json),
        Commands::Wipe {
            device,
            method,
            passes,
            workers,
            yes,
            no_direct_io,
            report_dir,
            no_report,
        } => {
            cmd_wipe(
                &device,
                &method,
                passes,
                workers,
                yes,
                no_direct_io,
                report_dir,
                no_report,
            )
            .await
        }
        Commands::Locate { browsers, pattern } => cmd_locate(browsers, &pattern),
        Commands::WipeFiles {
            method,
            passes,
            browsers,
            pattern,
            keep_files,
            yes,
        } => cmd_wipe_files(&method, passes, browsers, &pattern, keep_files, yes).await,
    }
}

fn cmd_list() -> Result<()> {
    let classifier = SafetyClassifier::system_default();
    let devices = list_block_devices()?;

    if devices.is_empty() {
        println!("No block devices found");
        return Ok(());
    }

    println!(
        "{:<14} {:>10}  {:<24} {}",
        "DEVICE", "SIZE", "MODEL", "STATUS"
    );
    for dev in devices {
        let verdict = classifier.classify(&dev.path);
        let status = if verdict.safe {
            "safe to wipe".green().to_string()
        } else {
            "PROTECTED (system)".red().bold().to_string()
        };
        println!(
            "{:<14} {:>10}  {:<24} {}",
            dev.path.display().to_string(),
            human_bytes(dev.size_bytes as f64),
            dev.model.as_deref().unwrap_or("-"),
            status
        );
    }
    Ok(())
}

fn cmd_classify(device: &str, json: bool) -> Result<()> {
    let classifier = SafetyClassifier::system_default();
    let verdict = classifier.classify(Path::new(device));

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
        return Ok(());
    }

    println!("Safety check for {}", device.bold());
    if verdict.safe {
        println!("  {}", "DEVICE IS SAFE FOR WIPING".green().bold());
    } else {
        println!("  {}", "DANGER! DEVICE IS NOT SAFE!".red().bold());
    }
    for reason in &verdict.reasons {
        println!("  - {}", reason);
    }
    if !verdict.mounted_user_paths.is_empty() {
        println!("  user data mounted: {}", verdict.mounted_user_paths.join(", "));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_wipe(
    device: &str,
    method_name: &str,
    passes: Option<u32>,
    workers: Option<usize>,
    yes: bool,
    no_direct_io: bool,
    report_dir: Option<PathBuf>,
    no_report: bool,
) -> Result<()> {
    let config = EngineConfig {
        use_direct_io: !no_direct_io,
        ..Default::default()
    };
    let method = parse_method(method_name, workers, &config)?;

    // Show what is about to be destroyed before asking for confirmation.
    let path = Path::new(device);
    let verdict = SafetyClassifier::system_default().classify(path);
    if !verdict.safe {
        println!("{}", "WIPE BLOCKED FOR SAFETY".red().bold());
        for reason in &verdict.reasons {
            println!("  - {}", reason);
        }
        bail!("device {} failed the safety check", device);
    }

    let size = probe_size(path)?;
    println!("Target:  {}", device.bold());
    println!("Size:    {}", human_bytes(size as f64));
    println!("Method:  {}", method.name());

    if !yes && !confirm_destruction(path)? {
        println!("Cancelled.");
        return Ok(());
    }

    let engine = WipeEngine::new(config);
    let cancel = install_signal_handlers()?;
    let (tx, rx) = mpsc::channel(64);

    let handle = engine.submit(
        Target::device(path),
        method,
        WipeOptions {
            passes,
            ..Default::default()
        },
        Some(tx),
        cancel,
    )?;
    let renderer = tokio::spawn(render_progress(rx));

    let outcome = handle.wait().await;
    let _ = renderer.await;

    match outcome {
        Outcome::Completed(summary) => {
            print_summary(&summary);
            if !no_report {
                let dir = report_dir.unwrap_or_else(JsonReportSink::default_directory);
                let report = JsonReportSink::new(dir)
                    .record(&summary, &device_metadata(path))
                    .map_err(|e| anyhow!("report write failed: {}", e))?;
                println!("Report:  {}", report.display());
            }
            Ok(())
        }
        other => finish_with(other),
    }
}

fn cmd_locate(browsers: bool, extra: &[String]) -> Result<()> {
    let report = gather(browsers, extra);

    for file in &report.files {
        println!("{}", file.display());
    }
    eprintln!(
        "{} files, {}",
        report.files.len(),
        human_bytes(report.total_bytes() as f64)
    );
    for error in &report.errors {
        eprintln!(
            "{} {}: {}",
            "warning:".yellow(),
            error.pattern,
            error.detail
        );
    }
    Ok(())
}

async fn cmd_wipe_files(
    method_name: &str,
    passes: Option<u32>,
    browsers: bool,
    extra: &[String],
    keep_files: bool,
    yes: bool,
) -> Result<()> {
    let config = EngineConfig::default();
    let method = parse_method(method_name, None, &config)?;
    if matches!(
        method,
        WipeMethod::Gutmann | WipeMethod::ParallelRandom { .. } | WipeMethod::Lightning
    ) {
        bail!("method {} is device-only", method.name());
    }

    let report = gather(browsers, extra);
    if report.files.is_empty() {
        println!("No personal data files matched.");
        return Ok(());
    }

    println!(
        "About to overwrite {} files ({})",
        report.files.len().to_string().bold(),
        human_bytes(report.total_bytes() as f64)
    );
    for error in &report.errors {
        eprintln!(
            "{} {}: {}",
            "warning:".yellow(),
            error.pattern,
            error.detail
        );
    }

    if !yes && !confirm_typed("WIPE FILES")? {
        println!("Cancelled.");
        return Ok(());
    }

    let engine = WipeEngine::new(config);
    let cancel = install_signal_handlers()?;
    let (tx, rx) = mpsc::channel(64);

    let handle = engine.submit(
        Target::files(report.files),
        method,
        WipeOptions {
            passes,
            remove_files: !keep_files,
        },
        Some(tx),
        cancel,
    )?;
    let renderer = tokio::spawn(render_progress(rx));

    let outcome = handle.wait().await;
    let _ = renderer.await;

    match outcome {
        Outcome::Completed(summary) => {
            print_summary(&summary);
            Ok(())
        }
        other => finish_with(other),
    }
}

fn gather(browsers: bool, extra: &[String]) -> LocateReport {
    let mut patterns: Vec<String> = PERSONAL_DATA_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect();
    if browsers {
        patterns.extend(BROWSER_DATA_PATTERNS.iter().map(|p| p.to_string()));
    }
    patterns.extend(extra.iter().cloned());
    locate_personal_data(&patterns)
}

fn parse_method(
    name: &str,
    workers: Option<usize>,
    config: &EngineConfig,
) -> Result<WipeMethod> {
    Ok(match name {
        "zeros" => WipeMethod::Zeros,
        "random" => WipeMethod::Random,
        "dod" => WipeMethod::DoD5220,
        "gutmann" => WipeMethod::Gutmann,
        "parallel" => WipeMethod::ParallelRandom {
            workers: workers.unwrap_or(config.max_workers),
        },
        "lightning" => WipeMethod::Lightning,
        other => bail!(
            "unknown method '{}' (expected zeros, random, dod, gutmann, parallel, lightning)",
            other
        ),
    })
}

/// Destructive operations require retyping the target name, the same
/// barrier the original GUI put in front of the start button.
fn confirm_destruction(path: &Path) -> Result<bool> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| "DEVICE".to_string());
    println!(
        "\n{}",
        "WARNING: this permanently erases ALL data and cannot be undone!"
            .red()
            .bold()
    );
    confirm_typed(&format!("WIPE {}", name))
}

fn confirm_typed(expected: &str) -> Result<bool> {
    print!("Type '{}' to confirm: ", expected.bold());
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim() == expected)
}

/// SIGINT/SIGTERM flip the cancellation flag; the engine winds down cleanly
/// instead of the process dying mid-write.
fn install_signal_handlers() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.as_flag())?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel.as_flag())?;
    Ok(cancel)
}

async fn render_progress(mut rx: mpsc::Receiver<ProgressSample>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(sample) = rx.recv().await {
        let bar = bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(sample.total_bytes);
            bar.set_style(
                ProgressStyle::with_template(
                    "[{bar:40.red/black}] {percent:>3}% {bytes}/{total_bytes} {msg}",
                )
                .expect("static template")
                .progress_chars("#>-"),
            );
            bar
        });

        bar.set_position(sample.bytes_written.min(sample.total_bytes));
        let eta = sample
            .eta
            .map(|d| humantime::format_duration(Duration::from_secs(d.as_secs())).to_string())
            .unwrap_or_else(|| "-".to_string());
        bar.set_message(format!(
            "{}/s (peak {}/s) ETA {}",
            human_bytes(sample.instantaneous_mb_s * 1024.0 * 1024.0),
            human_bytes(sample.peak_mb_s * 1024.0 * 1024.0),
            eta
        ));
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn print_summary(summary: &WipeSummary) {
    println!("\n{}", "WIPE COMPLETED SUCCESSFULLY".green().bold());
    println!("Target:  {}", summary.target);
    println!(
        "Passes:  {} ({})",
        summary.pass_count,
        summary.method.name()
    );
    println!("Written: {}", human_bytes(summary.bytes_written as f64));
    println!(
        "Time:    {} (avg {:.1} MB/s, peak {:.1} MB/s)",
        humantime::format_duration(Duration::from_secs(summary.elapsed_secs as u64)),
        summary.average_mb_s,
        summary.peak_mb_s
    );
}

fn finish_with(outcome: Outcome) -> Result<()> {
    match outcome {
        Outcome::Completed(_) => Ok(()),
        Outcome::Blocked { reasons } => {
            println!("{}", "WIPE BLOCKED FOR SAFETY".red().bold());
            for reason in &reasons {
                println!("  - {}", reason);
            }
            bail!("safety veto")
        }
        Outcome::Cancelled {
            bytes_written,
            elapsed,
        } => {
            println!(
                "{} after {} in {}",
                "Wipe cancelled".yellow().bold(),
                human_bytes(bytes_written as f64),
                humantime::format_duration(Duration::from_secs(elapsed.as_secs()))
            );
            bail!("cancelled")
        }
        Outcome::Failed {
            error,
            bytes_written,
        } => {
            println!(
                "{} after {}: {}",
                "Wipe FAILED".red().bold(),
                human_bytes(bytes_written as f64),
                error
            );
            bail!("wipe failed: {}", error)
        }
    }
}

/// Best-effort device metadata for the report.
fn device_metadata(path: &Path) -> ReportMetadata {
    let mut metadata: ReportMetadata = BTreeMap::new();

    if let Ok(hostname) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        metadata.insert("hostname".to_string(), hostname.trim().to_string());
    }
    if let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) {
        for (key, sys_file) in [
            ("model", "model"),
            ("vendor", "vendor"),
            ("serial", "serial"),
        ] {
            if let Ok(value) =
                std::fs::read_to_string(format!("/sys/block/{}/device/{}", name, sys_file))
            {
                metadata.insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    metadata
}
