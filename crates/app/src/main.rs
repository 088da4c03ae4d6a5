use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use preset_visualiser_core::{
    scan_presets, AbortSignal, AppConfig, CaptureHub, ConfigService, ElementState,
    FolderPicker, HeadlessWindowSystem, RenderableElement, SharedConfig, SpectrumEngineFactory,
    TracingStatusSink, Visualiser, VisualiserError, VisualiserServices, WindowEventSink,
    WindowHandle,
};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cpal-capture")]
mod capture;
mod source;

use source::{AudioSource, ToneSource};

const DEFAULT_CONFIG: &str = "preset-visualiser.json";

fn main() -> preset_visualiser_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_session(args),
        Commands::Scan { directory } => run_scan(&directory),
        Commands::SetPresets { directory, config } => set_presets(&directory, &config),
    }
}

fn run_session(args: RunArgs) -> preset_visualiser_core::Result<()> {
    let config = SharedConfig::open(&args.config)?;
    if let Some(presets) = &args.presets {
        // Command-line override; not written back to the config file.
        let mut snapshot = config.snapshot();
        snapshot.presets.directory = presets.to_string_lossy().into_owned();
        return run_with_config(SharedConfig::new(snapshot), args);
    }
    run_with_config(config, args)
}

fn run_with_config(config: SharedConfig, args: RunArgs) -> preset_visualiser_core::Result<()> {
    let settings = config.snapshot();
    let width = args.width.unwrap_or(settings.render.width);
    let height = args.height.unwrap_or(settings.render.height);
    tracing::info!(
        presets = %settings.presets.directory,
        seconds = args.seconds,
        width,
        height,
        "starting session"
    );

    let hub = Arc::new(CaptureHub::new());
    let window_system = Arc::new(HeadlessWindowSystem::new());
    let services = VisualiserServices {
        window_system: window_system.clone(),
        engines: Arc::new(SpectrumEngineFactory::default()),
        capture: hub.clone(),
        config: Arc::new(config),
        status: Arc::new(TracingStatusSink),
        folders: Arc::new(FixedFolder(args.switch_to.clone())),
        target_fps: settings.render.target_fps,
    };

    let mut element = Visualiser::create(WindowHandle(1), services);
    if element.state() != ElementState::Live {
        return Err(VisualiserError::msg("visualiser failed to start"));
    }
    element.on_resize(width, height);

    let source = start_audio(&args, hub, &settings)?;

    let total = Duration::try_from_secs_f32(args.seconds.max(0.0))
        .map_err(|err| VisualiserError::msg(format!("invalid session length: {err}")))?;
    if args.switch_to.is_some() {
        thread::sleep(total / 2);
        element.on_double_click();
        thread::sleep(total - total / 2);
    } else {
        thread::sleep(total);
    }

    drop(source);
    let ticks = element.ticks();
    let stats = element.frame_stats().unwrap_or_default();
    let playlist = element.playlist_size();
    element.on_destroy();

    tracing::info!(
        ticks,
        presents = window_system.swap_count(),
        playlist,
        preset = ?stats.preset_index,
        bass = stats.bass,
        mid = stats.mid,
        treble = stats.treble,
        "session finished"
    );
    Ok(())
}

fn start_audio(
    args: &RunArgs,
    hub: Arc<CaptureHub>,
    settings: &AppConfig,
) -> preset_visualiser_core::Result<AudioSource> {
    #[cfg(feature = "cpal-capture")]
    if args.capture {
        return Ok(AudioSource::Input(capture::InputCapture::start(hub)?));
    }
    #[cfg(not(feature = "cpal-capture"))]
    if args.capture {
        tracing::warn!("built without `cpal-capture`, falling back to the tone generator");
    }
    let tone = ToneSource::start(hub, &settings.audio, args.tone_hz, args.f64)?;
    Ok(AudioSource::Tone(tone))
}

fn run_scan(directory: &Path) -> preset_visualiser_core::Result<()> {
    let outcome = scan_presets(directory, &AbortSignal::new())?;
    for entry in &outcome.entries {
        println!("{}\t{}", entry.display_name, entry.path.display());
    }
    tracing::info!(count = outcome.entries.len(), "scan finished");
    Ok(())
}

fn set_presets(directory: &Path, config: &Path) -> preset_visualiser_core::Result<()> {
    let canonical = directory
        .canonicalize()
        .map_err(|source| VisualiserError::DirectoryUnavailable {
            path: directory.to_path_buf(),
            source,
        })?;
    let store = SharedConfig::open(config)?;
    store.set_preset_directory(&canonical.to_string_lossy())?;
    tracing::info!(
        directory = %canonical.display(),
        config = %config.display(),
        "preset directory saved"
    );
    Ok(())
}

/// Folder "dialog" answering with a directory given on the command line.
struct FixedFolder(Option<PathBuf>);

impl FolderPicker for FixedFolder {
    fn pick_folder(&self, title: &str) -> Option<PathBuf> {
        tracing::debug!(title, folder = ?self.0, "folder requested");
        self.0.clone()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive preset visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a headless visualiser session.
    Run(RunArgs),
    /// List the presets found below a directory.
    Scan {
        directory: PathBuf,
    },
    /// Persist the preset directory in the config file.
    SetPresets {
        directory: PathBuf,
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Preset directory, overriding the config file for this session.
    #[arg(short, long)]
    presets: Option<PathBuf>,
    /// Session length in seconds.
    #[arg(short, long, default_value_t = 5.0)]
    seconds: f32,
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Frequency of the generated test tone.
    #[arg(long, default_value_t = 110.0)]
    tone_hz: f32,
    /// Deliver the test tone as 64-bit samples.
    #[arg(long)]
    f64: bool,
    /// Capture from the default input device (needs the `cpal-capture` feature).
    #[arg(long)]
    capture: bool,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Switch to this preset folder halfway through, as a double-click would.
    #[arg(long)]
    switch_to: Option<PathBuf>,
}
