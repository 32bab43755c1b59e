use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use turnstile_hw::Camera;
use turnstiled::{pipeline, shutdown, surface, Config, DecisionLoop, HeadlessSurface, LoopSettings, StopReason};

#[derive(Parser)]
#[command(name = "turnstiled", about = "Turnstile entry kiosk", version)]
struct Args {
    /// TOML config file (defaults to $TURNSTILE_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "turnstiled starting");

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    let camera = match Camera::open(config.camera_index, config.frame_width, config.frame_height) {
        Ok(camera) => camera,
        Err(e) => {
            eprintln!("turnstiled: cannot open camera {}: {e}", config.camera_index);
            return Ok(ExitCode::FAILURE);
        }
    };

    let locator = pipeline::face_locator(&config).context("failed to load face detector")?;
    let matcher = pipeline::identity_matcher(&config).context("failed to load face recognizer")?;
    let sinks = pipeline::attempt_sinks(&config);

    let quit = shutdown::install().context("failed to install signal handlers")?;
    let surface = HeadlessSurface::new(quit, config.snapshot_path.clone(), config.snapshot_every_n_frames)
        .with_font(surface::find_font(config.overlay_font.as_deref()));

    tracing::info!(
        width = camera.width,
        height = camera.height,
        device = %camera.device_path,
        "turnstiled ready"
    );

    let decision_loop = DecisionLoop::new(
        camera,
        surface,
        locator,
        matcher,
        sinks,
        LoopSettings {
            every_n_frames: config.recognition_every_n_frames,
            crop_padding: config.crop_padding,
        },
    );

    match decision_loop.run() {
        StopReason::QuitRequested => {
            tracing::info!("turnstiled shutting down");
            Ok(ExitCode::SUCCESS)
        }
        StopReason::SourceFailed(e) => {
            eprintln!("turnstiled: camera stopped delivering frames: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
