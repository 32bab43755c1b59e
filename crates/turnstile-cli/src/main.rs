use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use turnstile_core::{crop, dataset};
use turnstile_hw::Camera;
use turnstile_sinks::{csv_log, AttemptSink, RemoteLog};
use turnstiled::{pipeline, Config};

#[derive(Parser)]
#[command(name = "turnstile", about = "Turnstile entry kiosk CLI")]
struct Cli {
    /// TOML config file (defaults to $TURNSTILE_CONFIG, then built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Capture one frame from the configured camera and save it
    Snapshot {
        /// Output image path (format chosen by extension)
        output: PathBuf,
    },
    /// List enrolled identities and their reference image counts
    Dataset,
    /// Identify the largest face in a still image
    Identify {
        /// Image to identify
        image: PathBuf,
    },
    /// Look up a member in the remote members table
    Member {
        /// Member name (case-insensitive)
        name: String,
    },
    /// Show the most recent entries of the local attempt log
    Attempts {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Devices = cli.command {
        return list_devices();
    }

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Snapshot { output } => snapshot(&config, output),
        Commands::Dataset => show_dataset(&config),
        Commands::Identify { image } => identify(&config, image),
        Commands::Member { name } => member(&config, &name),
        Commands::Attempts { limit } => attempts(&config, limit),
    }
}

fn list_devices() -> Result<()> {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
        return Ok(());
    }
    for d in devices {
        println!("{:>2}  {:<14} {} ({}, {})", d.index, d.path, d.name, d.driver, d.bus);
    }
    Ok(())
}

fn snapshot(config: &Config, output: PathBuf) -> Result<()> {
    let mut camera = Camera::open(config.camera_index, config.frame_width, config.frame_height)
        .with_context(|| format!("cannot open camera {}", config.camera_index))?;
    let frame = camera.capture_frame().context("frame capture failed")?;
    frame
        .image
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Saved {}x{} frame from {} to {}",
        frame.width(),
        frame.height(),
        camera.device_path,
        output.display()
    );
    Ok(())
}

fn show_dataset(config: &Config) -> Result<()> {
    let root = &config.dataset_dir;
    if !dataset::is_ready(root) {
        println!("Dataset {} is empty or missing", root.display());
        return Ok(());
    }

    let identities = dataset::identities(root);
    let total: usize = identities.values().sum();
    println!("Dataset {}: {} identities, {} images", root.display(), identities.len(), total);
    for (name, count) in identities {
        println!("  {name:<24} {count}");
    }
    Ok(())
}

fn identify(config: &Config, path: PathBuf) -> Result<()> {
    let image = image::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgb8();

    let mut locator = pipeline::face_locator(config)?;
    let Some(face) = locator.locate(&image) else {
        bail!("no face found in {}", path.display());
    };

    let mut matcher = pipeline::identity_matcher(config)?;
    let result = matcher.recognize(&crop(&image, &face, config.crop_padding));

    let report = serde_json::json!({
        "image": path.display().to_string(),
        "face": face,
        "result": result,
        "decision": result.decision_reason(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn member(config: &Config, name: &str) -> Result<()> {
    let remote = RemoteLog::connect(&config.remote());
    if !remote.is_enabled() {
        bail!("remote service is not configured (set supabase_url and supabase_key)");
    }

    match remote.query_member(name) {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No member found for {name:?}"),
    }
    Ok(())
}

fn attempts(config: &Config, limit: usize) -> Result<()> {
    let path = &config.local_log_file;
    if !path.exists() {
        println!("No attempts logged yet ({})", path.display());
        return Ok(());
    }

    let records = csv_log::read_recent(path, limit)
        .with_context(|| format!("failed to read {}", path.display()))?;
    for r in records {
        println!(
            "{}  {:<7} {:<20} {:.4}  {}",
            r.timestamp.to_rfc3339(),
            r.granted_or_denied.to_string(),
            r.detected_name,
            r.confidence,
            r.reason
        );
    }
    Ok(())
}
