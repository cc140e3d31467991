use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread;

use anyhow::Result;
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use seeker_core::clock::{Clock, SystemClock};
use seeker_core::logger;
use seeker_core::orchestrator::{Engine, SessionReport};
use seeker_core::platform::replay::ReplayDetector;
use seeker_core::platform::stub::{NullDetector, StubDetector};
use seeker_core::platform::{create_platform, Detector};
use seeker_core::settings::Config;
use seeker_core::state::Control;

const USAGE: &str = "usage: seeker [--config <path>] [--stub] [--replay <file>] [--probe] [--headless]";

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let force_stub = has_flag(&args, "--stub");
    let probe = has_flag(&args, "--probe");
    let headless = has_flag(&args, "--headless");

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let config_path = flag_value(&args, "--config")
        .map(PathBuf::from)
        .unwrap_or_else(|| cwd.join("config.json"));
    let replay_path = flag_value(&args, "--replay").map(PathBuf::from);

    logger::init(&cwd.join("logs"))?;
    if probe || headless {
        logger::set_echo(true);
    }

    let config = Config::load(&config_path);
    if !config_path.exists() {
        match config.save(&config_path) {
            Ok(()) => logger::info(&format!("wrote default config to {}", config_path.display())),
            Err(e) => logger::warn(&format!("could not write default config: {:#}", e)),
        }
    }
    logger::info(&format!("config: {}", config_path.display()));

    let platform = create_platform(force_stub, config.capture_region);
    let detector = create_detector(&config, force_stub, replay_path.as_deref())?;
    let control = Control::shared();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    stop_on_interrupt(&control)?;

    let mut engine = Engine::new(
        &config,
        platform.capture,
        detector,
        platform.input,
        clock,
        Arc::clone(&control),
    );

    if probe {
        engine.probe()?;
        return Ok(());
    }
    if headless {
        print_report(&engine.run());
        return Ok(());
    }

    let (snap_tx, snap_rx) = mpsc::sync_channel(1);
    let mut engine = engine.with_snapshots(snap_tx);

    // Wire logger to TUI
    let (log_tx, log_rx) = mpsc::channel::<String>();
    logger::set_tui_sender(log_tx);
    logger::info("seeker started");

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Engine loop on a background thread, TUI on the main thread
    let engine_thread = thread::spawn(move || engine.run());

    let mut app = seeker_tui::App::new(Arc::clone(&control), snap_rx, log_rx, config.preview.show);
    let result = seeker_tui::event::run(&mut terminal, &mut app);

    control.stop();
    // Releases the snapshot receiver so the engine's final publish cannot block.
    drop(app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    logger::clear_tui_sender();

    match engine_thread.join() {
        Ok(report) => print_report(&report),
        Err(_) => eprintln!("engine thread panicked, see logs/seeker.log"),
    }
    result
}

/// Ctrl+C asks the engine to stop so the session still ends through its
/// final statistics. In raw mode the TUI sees Ctrl+C as a key instead.
fn stop_on_interrupt(control: &Arc<Control>) -> Result<()> {
    ctrlc::set_handler(interrupt_handler(Arc::clone(control)))?;
    Ok(())
}

fn interrupt_handler(control: Arc<Control>) -> impl FnMut() + Send + 'static {
    move || {
        logger::warn("interrupt received, stopping");
        control.stop();
    }
}

/// Replay file wins, then the synthetic detector; otherwise nothing is detected.
fn create_detector(config: &Config, force_stub: bool, replay: Option<&Path>) -> Result<Box<dyn Detector>> {
    let threshold = config.model.confidence_threshold;
    let region = config.capture_region;
    if let Some(path) = replay {
        logger::info(&format!("replaying detections from {}", path.display()));
        return Ok(Box::new(ReplayDetector::load(path, region, threshold)?));
    }
    if force_stub {
        return Ok(Box::new(StubDetector::new(region, threshold)));
    }
    logger::warn("no detector backend attached, frames will yield no detections (try --stub or --replay <file>)");
    Ok(Box::new(NullDetector))
}

fn print_report(report: &SessionReport) {
    let snap = &report.snapshot;
    let stats = &snap.stats;
    println!("session over: {}", report.reason.as_str());
    println!(
        "  runtime {:.1}m | detections {} | actions {} (attack {} / pickup {} / interact {}) | searches {}",
        snap.elapsed.as_secs_f64() / 60.0,
        stats.detections,
        stats.actions_performed,
        stats.attacks,
        stats.pickups,
        stats.interactions,
        stats.searches_performed,
    );
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
