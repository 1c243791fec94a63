use anyhow::{Context, Result};
use clap::Parser;
use fddc_core::allocator::Allocator;
use fddc_core::config::{self, MapsConfig};
use fddc_core::controller::{EventSource, FileController, LiveController};
use fddc_core::drive::DEFAULT_TRACK_LIMIT;
use fddc_core::error::FddcError;
use fddc_core::gpio::SimGpio;
use fddc_core::midi;
use fddc_core::pacer::Pacer;
use fddc_core::player;
use fddc_core::pulse::PulseGenerator;
use log::info;
#[cfg(feature = "visualize")]
use log::warn;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    about = "Drives an array of floppy drives as audio-rate stepper voices from MIDI input",
    long_about = None
)]
struct Args {
    /// MIDI files to play in order. With none given, reads live input from
    /// --midi-device instead.
    files: Vec<PathBuf>,

    /// Set channel I's drive map: -m I:d1,d2,...
    #[arg(short = 'm', long = "map", value_name = "I:D1,D2,...")]
    map: Vec<String>,

    /// Set channel I's voices-per-note: -r I:N
    #[arg(short = 'r', long = "req", value_name = "I:N")]
    req: Vec<String>,

    /// Override the compiled-in drive pin-out with a JSON file.
    #[arg(long)]
    pinout: Option<PathBuf>,

    /// Path to the per-file channel map configuration.
    #[arg(long, default_value = "maps.json")]
    maps: PathBuf,

    /// Live MIDI device to read from when no files are given.
    #[arg(long, default_value = "/dev/midi1")]
    midi_device: PathBuf,

    /// Maximum head travel from the origin, in tracks.
    #[arg(long, default_value_t = DEFAULT_TRACK_LIMIT)]
    track_limit: i32,

    #[cfg(feature = "visualize")]
    /// Show a read-only terminal view of drive state while playing.
    #[arg(long)]
    visualize: bool,

    /// Increase log verbosity (-v, -vv, ...).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity.
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn init_logging(args: &Args) {
    let level = if args.quiet {
        log::LevelFilter::Warn
    } else {
        match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn apply_cli_overrides(allocator: &mut Allocator, args: &Args, drive_count: usize) -> Result<()> {
    for spec in &args.map {
        let (channel, drives) = config::parse_map_spec(spec)
            .with_context(|| format!("invalid -m spec {spec:?}"))?;
        for &drive in &drives {
            if drive >= drive_count {
                return Err(FddcError::DriveOutOfRange(drive, drive_count).into());
            }
        }
        allocator.set_channel_map(channel, drives);
    }
    for spec in &args.req {
        let (channel, n) =
            config::parse_req_spec(spec).with_context(|| format!("invalid -r spec {spec:?}"))?;
        allocator.set_voices_per_note(channel, n);
    }
    Ok(())
}

fn apply_file_config(
    allocator: &mut Allocator,
    maps: &MapsConfig,
    file: &Path,
    drive_count: usize,
) -> Result<()> {
    let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    let Some(cfg) = maps.get(name) else {
        return Ok(());
    };
    for (channel, drives) in &cfg.map {
        if let Ok(channel) = channel.parse() {
            for &drive in drives {
                if drive >= drive_count {
                    return Err(FddcError::DriveOutOfRange(drive, drive_count).into());
                }
            }
            allocator.set_channel_map(channel, drives.clone());
        }
    }
    for (channel, n) in &cfg.req {
        if let Ok(channel) = channel.parse() {
            allocator.set_voices_per_note(channel, *n);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let pinout = match &args.pinout {
        Some(path) => config::load_pinout(path).context("loading --pinout")?,
        None => config::default_pinout(),
    };
    info!("{} drives configured", pinout.len());

    let maps: MapsConfig = if args.maps.exists() {
        config::load_maps(&args.maps).context("loading maps.json")?
    } else {
        MapsConfig::new()
    };

    let mut gpio = SimGpio::new();
    #[cfg(feature = "rppal")]
    let mut gpio = fddc_core::gpio::rpi::RppalGpio::new().context("initializing GPIO")?;

    let (mut generator, bank) = PulseGenerator::new(&mut gpio, &pinout, args.track_limit)
        .context("configuring drive pins")?;
    generator.start(gpio);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Release);
        })
        .context("installing SIGINT handler")?;
    }

    #[cfg(feature = "visualize")]
    let visualizer_handle = if args.visualize {
        let drives = Arc::clone(&bank.drives);
        let running = Arc::clone(&running);
        Some(std::thread::spawn(move || {
            if let Err(e) = fddc_core::visualizer::run(drives, running) {
                warn!("visualizer exited with error: {e}");
            }
        }))
    } else {
        None
    };

    let drive_count = pinout.len();
    let mut allocator = Allocator::new(bank);
    apply_cli_overrides(&mut allocator, &args, drive_count)?;

    if args.files.is_empty() {
        info!("no files given, entering live mode on {:?}", args.midi_device);
        let mut source =
            LiveController::open(&args.midi_device).context("opening MIDI device")?;
        player::run(&mut source, &mut allocator, &running);
    } else {
        for file in &args.files {
            if !running.load(Ordering::Acquire) {
                break;
            }
            apply_file_config(&mut allocator, &maps, file, drive_count)?;

            info!("now playing {}", file.display());
            let bytes = std::fs::read(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let score = midi::parse(&bytes)
                .with_context(|| format!("parsing {}", file.display()))?;

            let rx = Pacer::new(score, Arc::clone(&running)).start();
            let mut source = FileController::new(rx);
            player::run(&mut source, &mut allocator, &running);
        }
    }

    #[cfg(feature = "visualize")]
    if let Some(handle) = visualizer_handle {
        let _ = handle.join();
    }

    generator.stop();
    Ok(())
}
