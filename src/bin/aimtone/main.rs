//! The `aimtone` binary. Run with `RUST_LOG=info` (or `debug`) to see what
//! the guidance loop decides each cycle.
//!
//! Example:
//!
//! ```text
//! cargo run --features streaming -- run --source stdin --lidar /dev/ttyUSB0
//! ```

use aimtone::{
    args::{CommandTask, DetectionSource, GuideArgs, RenderCommand, RunCommand},
    config::GuidanceConfig,
    gui::{device_selector, monitor},
    playback::{AudioOutput, SilentOutput},
    position_classifier::{PositionClassifier, TargetPosition},
    range_sensor::{NoRangeSensor, PolledRangeSensor, RangeSensor},
    serial_lidar::SerialLidar,
    supervisor::PlaybackSupervisor,
    target_detector::{BouncingTarget, LineDetector, TargetDetector},
    tone_synthesizer::ToneSynthesizer,
    wav_export::write_cycles,
};

use clap::Parser;
use log::{info, warn};
use std::{error::Error, io, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

/// How often the background poller reads the rangefinder.
const RANGE_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> ExitCode {
    env_logger::init();
    let args = GuideArgs::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("aimtone: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: GuideArgs) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => GuidanceConfig::from_path(path)?,
        None => GuidanceConfig::default(),
    };

    match args.command {
        CommandTask::Run(cmd) => guide(&config, cmd),
        CommandTask::Render(cmd) => render(&config, cmd),
        CommandTask::Ports => {
            for port in SerialLidar::available_ports()? {
                println!("{}", port.to_string_lossy());
            }
            Ok(())
        }
        CommandTask::Config(cmd) => {
            config.to_path(&cmd.outfile)?;
            info!("Wrote configuration to {}", cmd.outfile.display());
            Ok(())
        }
    }
}

fn render(config: &GuidanceConfig, cmd: RenderCommand) -> Result<(), Box<dyn Error>> {
    let position = TargetPosition::new(cmd.x, cmd.y);
    let (shaping, classification) = PositionClassifier::new(config).process(position);
    info!("{} classifies as {}: {:?}", position, classification, shaping);

    let tone = ToneSynthesizer::new(config)
        .synthesize(classification, &shaping)
        .ok_or("position has no sound")?;
    let frames = write_cycles(&cmd.outfile, &tone, cmd.cycles)?;
    println!(
        "{} -> {} ({} frames) written to {}",
        position,
        classification,
        frames,
        cmd.outfile.display()
    );
    Ok(())
}

fn audio_output(mute: bool) -> Arc<dyn AudioOutput> {
    #[cfg(feature = "streaming")]
    if !mute {
        return Arc::new(aimtone::rodio_output::RodioOutput);
    }
    #[cfg(not(feature = "streaming"))]
    if !mute {
        warn!("Built without the streaming feature, running silently");
    }
    Arc::new(SilentOutput)
}

fn lidar_port(cmd: &RunCommand) -> Result<Option<PathBuf>, Box<dyn Error>> {
    if cmd.select_lidar {
        return Ok(device_selector(SerialLidar::available_ports()?)?);
    }
    Ok(cmd.lidar.clone())
}

fn range_sensor(cmd: &RunCommand) -> Result<Box<dyn RangeSensor + Send>, Box<dyn Error>> {
    match lidar_port(cmd)? {
        Some(port) => {
            let lidar = SerialLidar::open(&port)?;
            Ok(Box::new(PolledRangeSensor::spawn(
                lidar,
                RANGE_POLL_INTERVAL,
            )))
        }
        None => {
            info!("No rangefinder, distances will be unknown");
            Ok(Box::new(NoRangeSensor))
        }
    }
}

fn detector(
    config: &GuidanceConfig,
    cmd: &RunCommand,
) -> Box<dyn TargetDetector<Item = Option<TargetPosition>> + Send> {
    match cmd.source {
        DetectionSource::Simulate => Box::new(
            BouncingTarget::new(config.frame)
                .with_lag(cmd.lag_min..=cmd.lag_max)
                .with_drop_rate(cmd.drop_rate),
        ),
        DetectionSource::Stdin => Box::new(
            LineDetector::new(io::BufReader::new(io::stdin()))
                .with_legacy_sentinel(cmd.legacy_sentinel),
        ),
    }
}

fn guide(config: &GuidanceConfig, cmd: RunCommand) -> Result<(), Box<dyn Error>> {
    let sensor = range_sensor(&cmd)?;
    let output = audio_output(cmd.mute);
    info!("Guiding through {}", output.name());

    let mut supervisor = PlaybackSupervisor::new(config, sensor, output);
    let detector = detector(config, &cmd);

    if cmd.monitor {
        let summary = monitor(detector, supervisor)?;
        info!("Monitor closed: {:?}", summary);
        return Ok(());
    }

    for detection in detector {
        supervisor.run_cycle(detection);
    }
    info!("Detection source closed, stopping");
    supervisor.shutdown();
    Ok(())
}
