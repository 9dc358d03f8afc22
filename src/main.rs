use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use log::info;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::time::{interval, Duration, Instant};

use altimeter_rs::sensors::simulated::{BaroProfile, GpsProfile};
use altimeter_rs::sensors::{
    BarometricSource, GpsSource, SimulatedBarometer, SimulatedGps, TermuxBarometer, TermuxGps,
};
use altimeter_rs::{AltimeterConfig, AltimeterSession, AltimeterStatus, StartReport};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceKind {
    Simulated,
    Termux,
}

#[derive(Parser, Debug)]
#[command(name = "altimeter")]
#[command(about = "Barometric + GPS altimeter readout", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Sensor backend
    #[arg(long, value_enum, default_value = "simulated")]
    source: SourceKind,

    /// JSON config file (missing fields take defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Meters per revolution of the GPS dial (overrides config)
    #[arg(long)]
    gps_period: Option<f64>,

    /// Run without the barometer (GPS-only)
    #[arg(long)]
    no_baro: bool,

    /// Output directory for status files
    #[arg(long, default_value = "altimeter_sessions")]
    output_dir: PathBuf,
}

fn build_sources(
    args: &Args,
    config: &AltimeterConfig,
) -> (Box<dyn BarometricSource>, Box<dyn GpsSource>) {
    let baro_interval = Duration::from_millis(config.baro_interval_ms);
    let gps_interval = Duration::from_millis(config.gps_interval_ms);

    let barometer: Box<dyn BarometricSource> = match (args.no_baro, args.source) {
        (true, _) => Box::new(SimulatedBarometer::unavailable()),
        (false, SourceKind::Simulated) => Box::new(SimulatedBarometer::new(BaroProfile {
            interval: baro_interval,
            ..Default::default()
        })),
        (false, SourceKind::Termux) => Box::new(TermuxBarometer::new(baro_interval)),
    };

    let gps: Box<dyn GpsSource> = match args.source {
        SourceKind::Simulated => Box::new(SimulatedGps::new(GpsProfile {
            interval: gps_interval,
            ..Default::default()
        })),
        SourceKind::Termux => Box::new(TermuxGps::new(gps_interval)),
    };

    (barometer, gps)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AltimeterConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AltimeterConfig::default(),
    };
    if let Some(period) = args.gps_period {
        config.gps_dial_period_m = period;
    }
    config.validate()?;

    info!("[{}] Altimeter starting", ts_now());
    info!("  Duration: {} seconds (0=continuous)", args.duration);
    info!("  Source: {:?}", args.source);
    info!("  GPS dial: {} m/rev", config.gps_dial_period_m);
    info!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let (barometer, gps) = build_sources(&args, &config);
    let mut session = AltimeterSession::new(barometer, gps, &config);
    let report = session.start()?;
    if report.gps_only() {
        info!("[SESSION] barometer unavailable, GPS-only mode");
    }

    let start = Instant::now();
    let status_path = args.output_dir.join("live_status.json");
    run_status_loop(
        &session,
        &config,
        report,
        args.duration,
        start,
        &status_path,
        tokio::signal::ctrl_c(),
    )
    .await;

    session.stop();

    let final_status = AltimeterStatus::new(
        session.snapshot(),
        &config,
        start.elapsed().as_secs(),
        report.barometer,
        report.gps,
    );
    let final_path = args
        .output_dir
        .join(format!("status_{}_final.json", ts_now_clean()));
    final_status
        .save(&final_path)
        .with_context(|| format!("writing {}", final_path.display()))?;

    println!("\n=== Final Readout ===");
    println!("{}", final_status.format_line());
    println!(
        "Barometer updates: {}, GPS fixes: {}",
        final_status.snapshot.baro_updates, final_status.snapshot.gps_updates
    );
    println!("Saved to {}", final_path.display());

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum LoopExit {
    DurationReached,
    Interrupted,
}

/// Periodic status until `duration` elapses (0 = never) or `shutdown` resolves.
async fn run_status_loop<B, G, F>(
    session: &AltimeterSession<B, G>,
    config: &AltimeterConfig,
    report: StartReport,
    duration: u64,
    start: Instant,
    status_path: &Path,
    shutdown: F,
) -> LoopExit
where
    B: BarometricSource,
    G: GpsSource,
    F: Future,
{
    let mut ticker = interval(Duration::from_secs(config.status_interval_secs.max(1)));
    // One shutdown future for the whole loop so a signal during a tick is not lost
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let uptime = start.elapsed().as_secs();
                let status = AltimeterStatus::new(
                    session.snapshot(),
                    config,
                    uptime,
                    report.barometer,
                    report.gps,
                );
                info!("[{}] {}", ts_now(), status.format_line());
                save_status(&status, status_path);

                if duration > 0 && uptime >= duration {
                    info!("[{}] Duration reached, stopping...", ts_now());
                    return LoopExit::DurationReached;
                }
            }
            _ = &mut shutdown => {
                info!("[{}] Interrupted, stopping...", ts_now());
                return LoopExit::Interrupted;
            }
        }
    }
}

fn save_status(status: &AltimeterStatus, path: &Path) {
    if let Err(e) = status.save(path) {
        log::warn!("[STATUS] failed to write {}: {}", path.display(), e);
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
