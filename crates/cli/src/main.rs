mod settings;
mod snapshot_sink;

use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{Receiver, Sender};

use rudolph_core::capture::frame_source::FrameSource;
use rudolph_core::capture::infrastructure::camera_factory::create_camera;
use rudolph_core::detection::domain::engine_kind::{EngineKind, EngineSelector};
use rudolph_core::detection::infrastructure::detection_bridge::DetectionBridge;
use rudolph_core::effects::infrastructure::effect_factory::{create_effect, EffectKind};
use rudolph_core::pipeline::domain::frame_sink::{FrameSink, ProcessedFrame};
use rudolph_core::pipeline::frame_pipeline::{FramePipeline, PipelineConfig};
use rudolph_core::pipeline::infrastructure::channel_sink::ChannelSink;
use rudolph_core::pipeline::pipeline_logger::StdoutPipelineLogger;

use settings::Settings;
use snapshot_sink::SnapshotSink;

const DISPLAY_QUEUE: usize = 2;

/// Live webcam face effects driven by an external landmark detector.
///
/// Type `dlib` or `mediapipe` on stdin to switch engines, `quit` to stop.
#[derive(Parser, Debug)]
#[command(name = "rudolph")]
struct Cli {
    /// Camera device: index, device path, or "synthetic".
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,

    /// Detection engine: dlib or mediapipe.
    #[arg(long)]
    engine: Option<EngineKind>,

    /// Overlay: nose or contour.
    #[arg(long)]
    effect: Option<EffectKind>,

    /// Interpreter used to launch the detector.
    #[arg(long)]
    python: Option<PathBuf>,

    /// Detector entry script.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Unix socket the detector listens on.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Connect to an already running detector instead of launching one.
    #[arg(long)]
    attach: bool,

    /// Wait this many milliseconds after launch instead of for the ready line.
    #[arg(long)]
    warm_up_ms: Option<u64>,

    /// Give up on a detector reply after this many milliseconds.
    #[arg(long)]
    response_timeout_ms: Option<u64>,

    /// Kill the detector if it has not exited shortly after shutdown.
    #[arg(long)]
    kill_on_stop: bool,

    /// Write processed frames as PNG into this directory.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Save one snapshot every N processed frames.
    #[arg(long)]
    snapshot_every: Option<u64>,

    /// Stop automatically after this many seconds.
    #[arg(long)]
    duration: Option<u64>,

    /// Persist the effective settings for next time.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::load();
    apply_overrides(&mut settings, &cli);
    validate(&settings)?;

    if cli.save_settings {
        match settings.save() {
            Ok(path) => log::info!("Settings saved to {}", path.display()),
            Err(e) => log::warn!("Could not save settings: {e}"),
        }
    }

    let camera = create_camera(&settings.device)?;
    let source = FrameSource::new(camera, settings.capture_config());
    let bridge = Arc::new(DetectionBridge::new(settings.bridge_config()));
    let selector = bridge.engine_selector();

    let (display_tx, display_rx) = crossbeam_channel::bounded(DISPLAY_QUEUE);
    let snapshots = match &cli.snapshot_dir {
        Some(dir) => Some(SnapshotSink::new(dir, settings.snapshot_every).map_err(|e| e as Box<dyn std::error::Error>)?),
        None => None,
    };
    let display = std::thread::Builder::new()
        .name("display".to_string())
        .spawn(move || run_display(display_rx, snapshots))?;

    let mut pipeline = FramePipeline::new(
        source,
        bridge,
        create_effect(settings.effect),
        Box::new(ChannelSink::new(display_tx)),
        Box::new(StdoutPipelineLogger::default()),
        PipelineConfig::default(),
    );

    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    install_ctrlc(quit_tx.clone())?;
    spawn_command_reader(selector, quit_tx)?;

    pipeline.start()?;
    log::info!(
        "Running with {} engine and {} effect",
        pipeline.engine(),
        settings.effect
    );

    wait_for_quit(&quit_rx, cli.duration.map(Duration::from_secs));

    pipeline.stop();
    log::info!(
        "Processed {} frames, dropped {} while busy",
        pipeline.processed_frames(),
        pipeline.dropped_frames()
    );
    // Dropping the pipeline drops the channel sender and ends the display thread.
    drop(pipeline);
    if display.join().is_err() {
        log::error!("Display thread panicked");
    }
    Ok(())
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(device) = &cli.device {
        settings.device = device.clone();
    }
    if let Some(width) = cli.width {
        settings.width = width;
    }
    if let Some(height) = cli.height {
        settings.height = height;
    }
    if let Some(fps) = cli.fps {
        settings.fps = fps;
    }
    if let Some(engine) = cli.engine {
        settings.engine = engine;
    }
    if let Some(effect) = cli.effect {
        settings.effect = effect;
    }
    if let Some(python) = &cli.python {
        settings.python = python.clone();
    }
    if let Some(script) = &cli.script {
        settings.script = Some(script.clone());
    }
    if let Some(socket) = &cli.socket {
        settings.socket = socket.clone();
    }
    if cli.attach {
        settings.attach = true;
    }
    if cli.warm_up_ms.is_some() {
        settings.warm_up_ms = cli.warm_up_ms;
    }
    if cli.response_timeout_ms.is_some() {
        settings.response_timeout_ms = cli.response_timeout_ms;
    }
    if cli.kill_on_stop {
        settings.kill_on_stop = true;
    }
    if let Some(every) = cli.snapshot_every {
        settings.snapshot_every = every;
    }
}

fn validate(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if settings.width == 0 || settings.height == 0 {
        return Err(format!(
            "Capture size must be positive, got {}x{}",
            settings.width, settings.height
        )
        .into());
    }
    if settings.fps == 0 || settings.fps > 240 {
        return Err(format!("FPS must be between 1 and 240, got {}", settings.fps).into());
    }
    if settings.snapshot_every == 0 {
        return Err("Snapshot interval must be at least 1".into());
    }
    Ok(())
}

/// Consumes processed frames off the pipeline thread until the sender drops.
fn run_display(frames: Receiver<ProcessedFrame>, mut snapshots: Option<SnapshotSink>) {
    let mut detected = 0u64;
    let mut total = 0u64;
    for processed in frames {
        total += 1;
        if processed.detection.is_detected() {
            detected += 1;
        }
        if let Some(sink) = snapshots.as_mut() {
            if let Err(e) = sink.present(&processed.frame, &processed.detection) {
                log::warn!("Snapshot failed: {e}");
            }
        }
    }
    log::info!("Displayed {total} frames, face found in {detected}");
}

fn install_ctrlc(quit: Sender<()>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        let _ = quit.try_send(());
    })
}

fn spawn_command_reader(selector: EngineSelector, quit: Sender<()>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(Command::Engine(engine)) => {
                        selector.set(engine);
                        log::info!("Switched to {engine} engine");
                    }
                    Some(Command::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => log::warn!("Unknown command {:?}", line.trim()),
                }
            }
            let _ = quit.try_send(());
        })?;
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Command {
    Engine(EngineKind),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => line.parse().ok().map(Command::Engine),
    }
}

fn wait_for_quit(quit: &Receiver<()>, limit: Option<Duration>) {
    match limit {
        Some(limit) => {
            let _ = quit.recv_timeout(limit);
        }
        None => {
            let _ = quit.recv();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("dlib", Some(Command::Engine(EngineKind::Dlib)))]
    #[case(" MediaPipe ", Some(Command::Engine(EngineKind::MediaPipe)))]
    #[case("quit", Some(Command::Quit))]
    #[case("Q", Some(Command::Quit))]
    #[case("sparkles", None)]
    #[case("", None)]
    fn test_parse_command(#[case] line: &str, #[case] expected: Option<Command>) {
        assert_eq!(parse_command(line), expected);
    }

    #[test]
    fn test_cli_overrides_stored_settings() {
        let cli = Cli::try_parse_from([
            "rudolph",
            "--device",
            "synthetic",
            "--engine",
            "dlib",
            "--effect",
            "contour",
            "--attach",
            "--fps",
            "15",
        ])
        .unwrap();
        let mut settings = Settings {
            width: 640,
            ..Settings::default()
        };
        apply_overrides(&mut settings, &cli);

        assert_eq!(settings.device, "synthetic");
        assert_eq!(settings.engine, EngineKind::Dlib);
        assert_eq!(settings.effect, EffectKind::Contour);
        assert!(settings.attach);
        assert_eq!(settings.fps, 15);
        assert_eq!(settings.width, 640);
    }

    #[test]
    fn test_absent_flags_keep_settings() {
        let cli = Cli::try_parse_from(["rudolph"]).unwrap();
        let stored = Settings {
            engine: EngineKind::Dlib,
            attach: true,
            ..Settings::default()
        };
        let mut settings = stored.clone();
        apply_overrides(&mut settings, &cli);
        assert_eq!(settings, stored);
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        assert!(Cli::try_parse_from(["rudolph", "--engine", "opencv"]).is_err());
    }

    #[rstest]
    #[case(0, 720, 30, 1)]
    #[case(1280, 720, 0, 1)]
    #[case(1280, 720, 30, 0)]
    fn test_validate_rejects(
        #[case] width: u32,
        #[case] height: u32,
        #[case] fps: u32,
        #[case] every: u64,
    ) {
        let settings = Settings {
            width,
            height,
            fps,
            snapshot_every: every,
            ..Settings::default()
        };
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(validate(&Settings::default()).is_ok());
    }
}
