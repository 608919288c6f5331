//! pano-ingest - stitch and upload dual-fisheye camera footage.
//!
//! Waits for the camera, optionally stages its segments on local disk,
//! pairs lens tracks, stitches each recording, uploads the result and
//! removes the local copy once the upload is confirmed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};

use pano_core::config::{ConfigManager, Settings};
use pano_core::device::wait_for_mount;
use pano_core::logging::{init_tracing, LogCallback, LogLevel};
use pano_core::models::UnpairedPolicy;
use pano_core::orchestrator::{CancelHandle, Coordinator, PipelineError};
use pano_core::staging::stage_segments;

#[derive(Parser, Debug)]
#[command(name = "pano-ingest", author, version, about, long_about = None)]
struct Cli {
    /// Settings file (default: ~/.config/pano-ingest/settings.toml)
    #[arg(short, long, global = true, env = "PANO_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Debug output on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stitch, upload and clean up every recording on the source
    Run(RunArgs),
    /// Show how segments would be paired, without touching anything
    Plan(RunArgs),
    /// Write the settings file with defaults and comments
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Folder to scan instead of the configured one
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Folder for stitched files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Destination bucket
    #[arg(short, long)]
    bucket: Option<String>,

    /// Wait for the camera to be mounted first
    #[arg(short, long)]
    wait: bool,

    /// What to do with recordings that have only one lens track
    #[arg(long, value_enum)]
    unpaired: Option<UnpairedArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum UnpairedArg {
    SingleTrack,
    Skip,
}

impl From<UnpairedArg> for UnpairedPolicy {
    fn from(arg: UnpairedArg) -> Self {
        match arg {
            UnpairedArg::SingleTrack => UnpairedPolicy::SingleTrack,
            UnpairedArg::Skip => UnpairedPolicy::Skip,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.unwrap_or_else(ConfigManager::default_path);

    match cli.command {
        Command::InitConfig { force } => init_config(config_path, force),
        Command::Plan(args) => {
            let manager = load_settings(config_path, &args, cli.verbose, ConfigWrite::Never)?;
            plan(manager.into_settings(), &args)
        }
        Command::Run(args) => {
            let manager = load_settings(config_path, &args, cli.verbose, ConfigWrite::Allowed)?;
            manager
                .ensure_dirs_exist()
                .context("creating output folders")?;
            run(manager.into_settings(), &args)
        }
    }
}

fn init_config(path: PathBuf, force: bool) -> Result<ExitCode> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let manager = ConfigManager::new(&path);
    manager
        .save()
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default settings to {}", path.display());
    Ok(ExitCode::SUCCESS)
}

/// Whether loading may create or normalize the settings file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConfigWrite {
    Allowed,
    Never,
}

/// Load settings, apply command-line overrides, start console logging.
fn load_settings(
    path: PathBuf,
    args: &RunArgs,
    verbose: bool,
    write: ConfigWrite,
) -> Result<ConfigManager> {
    let mut manager = ConfigManager::new(&path);
    let loaded = match write {
        ConfigWrite::Allowed => manager.load_or_create(),
        ConfigWrite::Never => manager.load_or_default(),
    };
    loaded.with_context(|| format!("loading settings from {}", path.display()))?;
    let settings = manager.settings_mut();

    if let Some(ref output) = args.output {
        settings.paths.output_folder = output.to_string_lossy().into_owned();
    }
    if let Some(ref bucket) = args.bucket {
        settings.upload.bucket = bucket.clone();
    }
    if let Some(policy) = args.unpaired {
        settings.pipeline.unpaired = policy.into();
    }
    if verbose {
        settings.logging.level = LogLevel::Debug;
    }

    init_tracing(settings.logging.level);
    tracing::debug!("Settings loaded from {}", path.display());
    Ok(manager)
}

/// Folder the catalog scans: the explicit source, else staging or device.
fn scan_root(settings: &Settings, args: &RunArgs) -> PathBuf {
    match args.source {
        Some(ref source) => source.clone(),
        None if settings.device.copy_to_staging => settings.paths.staging_dir().to_path_buf(),
        None => settings.paths.source_dir().to_path_buf(),
    }
}

fn plan(settings: Settings, args: &RunArgs) -> Result<ExitCode> {
    let root = scan_root(&settings, args);
    let coordinator = Coordinator::from_settings(settings);
    let plan = coordinator
        .plan(&root)
        .with_context(|| format!("cataloging {}", root.display()))?;

    println!("{} unit(s) in {}", plan.units().len(), plan.scan.root.display());
    for unit in plan.units() {
        println!("  {}", unit.label());
        for member in unit.members() {
            println!("      {:<9} {}", member.role().to_string(), member.path().display());
        }
    }
    for warning in &plan.resolution.warnings {
        println!("  warning: {}", warning);
    }
    for rejected in &plan.scan.rejected {
        println!("  rejected: {} ({})", rejected.path.display(), rejected.reason);
    }

    Ok(ExitCode::SUCCESS)
}

fn run(settings: Settings, args: &RunArgs) -> Result<ExitCode> {
    let cancel = CancelHandle::new();
    install_interrupt_handler(cancel.clone())?;

    if args.wait && args.source.is_none() {
        wait_for_mount(
            settings.paths.source_dir(),
            settings.device.poll_interval(),
            settings.device.timeout(),
            &cancel,
        )
        .context("waiting for camera")?;
    }

    if settings.device.copy_to_staging && args.source.is_none() {
        let report = stage_segments(
            settings.paths.source_dir(),
            settings.paths.staging_dir(),
            &settings.catalog.format(),
            &cancel,
        )
        .context("copying segments to staging")?;
        println!(
            "Staged {} new file(s), {} already present",
            report.copied.len(),
            report.already_present
        );
    }

    let root = scan_root(&settings, args);
    let echo: LogCallback = Arc::new(|line: &str| println!("{}", line));
    let coordinator = Coordinator::from_settings(settings)
        .with_cancel_handle(cancel)
        .with_log_callback(echo);

    let summary = match coordinator.run(&root) {
        Ok(summary) => summary,
        Err(PipelineError::RunCancelled) => {
            println!("Cancelled before any recording was processed");
            return Ok(ExitCode::from(130));
        }
        Err(e) => return Err(e).with_context(|| format!("processing {}", root.display())),
    };

    println!();
    println!("{}", summary);

    Ok(if summary.is_clean() && !summary.cancelled {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// First Ctrl-C finishes the current recording, the second kills tools.
fn install_interrupt_handler(cancel: CancelHandle) -> Result<()> {
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            eprintln!("\nStopping after the current recording (Ctrl-C again to abort)");
            cancel.cancel();
        } else {
            eprintln!("\nAborting");
            cancel.abort();
        }
    })
    .context("installing Ctrl-C handler")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_overrides() {
        let cli = Cli::parse_from([
            "pano-ingest",
            "--verbose",
            "run",
            "--source",
            "/media/card",
            "--bucket",
            "archive",
            "--unpaired",
            "skip",
        ]);
        assert!(cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.source, Some(PathBuf::from("/media/card")));
        assert_eq!(args.bucket.as_deref(), Some("archive"));
        assert!(matches!(args.unpaired, Some(UnpairedArg::Skip)));
        assert!(!args.wait);
    }

    fn no_overrides() -> RunArgs {
        RunArgs {
            source: None,
            output: None,
            bucket: None,
            wait: false,
            unpaired: None,
        }
    }

    #[test]
    fn plan_settings_do_not_create_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pano-ingest").join("settings.toml");
        let mut args = no_overrides();
        args.bucket = Some("archive".to_string());

        let manager = load_settings(path.clone(), &args, false, ConfigWrite::Never).unwrap();

        assert_eq!(manager.settings().upload.bucket, "archive");
        assert!(!path.exists());
    }

    #[test]
    fn run_settings_create_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        load_settings(path.clone(), &no_overrides(), false, ConfigWrite::Allowed).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn explicit_source_wins_over_staging() {
        let mut settings = Settings::default();
        settings.device.copy_to_staging = true;
        let mut args = no_overrides();
        assert_eq!(scan_root(&settings, &args), settings.paths.staging_dir());

        args.source = Some(PathBuf::from("/media/card"));
        assert_eq!(scan_root(&settings, &args), PathBuf::from("/media/card"));

        settings.device.copy_to_staging = false;
        args.source = None;
        assert_eq!(scan_root(&settings, &args), settings.paths.source_dir());
    }
}
