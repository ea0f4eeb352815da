//! Commandline argument parser using clap for AimTone

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Top-level arguments of the `aimtone` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct GuideArgs {
    #[command(subcommand, long_about)]
    /// What to do: guide, render a sound, list ports, or dump the config
    pub command: CommandTask,

    /// RON file to read the guidance configuration from. Defaults are used
    /// for anything it leaves out
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
}

/// The subcommands of `aimtone`.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Run the guidance loop, one cycle per detection
    #[command(about)]
    Run(RunCommand),

    /// Synthesize the sound for a single position into a WAV file
    #[command(about)]
    Render(RenderCommand),

    /// List the serial ports a rangefinder could be attached to
    #[command(about)]
    Ports,

    /// Write the effective configuration out as RON
    #[command(about)]
    Config(ConfigCommand),
}

/// Where detections come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DetectionSource {
    /// A simulated target bouncing around the frame
    #[default]
    Simulate,
    /// One `x y` or `none` per line on stdin
    Stdin,
}

/// Options for the guidance loop.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RunCommand {
    /// Where to read detections from
    #[arg(short = 's', long = "source", value_enum, default_value_t)]
    pub source: DetectionSource,

    /// Treat a detection at exactly (0, 0) as "no target"
    #[arg(long = "legacy-sentinel")]
    pub legacy_sentinel: bool,

    /// Serial port of the rangefinder
    #[arg(short = 'l', long = "lidar", conflicts_with = "select_lidar")]
    pub lidar: Option<PathBuf>,

    /// Pick the rangefinder's serial port interactively
    #[arg(long = "select-lidar")]
    pub select_lidar: bool,

    /// Run without an audio device. Builds without the `streaming` feature
    /// are always muted
    #[arg(short = 'm', long = "mute")]
    pub mute: bool,

    /// Show a live terminal monitor instead of plain logs
    #[arg(long = "monitor")]
    pub monitor: bool,

    /// Shortest simulated detector lag, in seconds
    #[arg(long = "lag-min", default_value_t = 0.9)]
    pub lag_min: f64,

    /// Longest simulated detector lag, in seconds
    #[arg(long = "lag-max", default_value_t = 3.0)]
    pub lag_max: f64,

    /// Probability that the simulated detector misses a frame
    #[arg(long = "drop-rate", default_value_t = 0.0)]
    pub drop_rate: f64,
}

/// Options for rendering a single position to WAV.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RenderCommand {
    /// Horizontal pixel position of the target
    #[arg(short = 'x', long = "x", allow_negative_numbers = true)]
    pub x: i32,

    /// Vertical pixel position of the target
    #[arg(short = 'y', long = "y", allow_negative_numbers = true)]
    pub y: i32,

    /// Filename for the WAV output to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,

    /// Number of sound cycles to write
    #[arg(short = 'n', long = "cycles", default_value_t = 4)]
    pub cycles: u32,
}

/// Options for dumping the configuration.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct ConfigCommand {
    /// Filename for the configuration to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn run_defaults() {
        let args = GuideArgs::try_parse_from(["aimtone", "run"]).unwrap();
        assert_eq!(args.config, None);
        match args.command {
            CommandTask::Run(run) => {
                assert_eq!(run.source, DetectionSource::Simulate);
                assert!(!run.mute);
                assert!(!run.legacy_sentinel);
                assert_eq!(run.lidar, None);
                assert_eq!(run.drop_rate, 0.0);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn global_config_after_subcommand() {
        let args = GuideArgs::try_parse_from([
            "aimtone", "run", "--source", "stdin", "--mute", "--config", "guide.ron",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("guide.ron")));
        assert!(matches!(
            args.command,
            CommandTask::Run(RunCommand {
                source: DetectionSource::Stdin,
                mute: true,
                ..
            })
        ));
    }

    #[test]
    fn render_accepts_negative_positions() {
        let args = GuideArgs::try_parse_from([
            "aimtone", "render", "--x", "-20", "--y", "240", "--out", "tone.wav",
        ])
        .unwrap();
        match args.command {
            CommandTask::Render(render) => {
                assert_eq!((render.x, render.y), (-20, 240));
                assert_eq!(render.cycles, 4);
            }
            other => panic!("expected render, got {:?}", other),
        }
    }

    #[test]
    fn mute_help_mentions_the_streaming_feature() {
        let command = GuideArgs::command();
        let run = command.find_subcommand("run").unwrap();
        let mute = run
            .get_arguments()
            .find(|arg| arg.get_id() == "mute")
            .unwrap();
        assert!(mute.get_help().unwrap().to_string().contains("streaming"));
    }

    #[test]
    fn lidar_and_select_lidar_conflict() {
        assert!(GuideArgs::try_parse_from([
            "aimtone",
            "run",
            "--lidar",
            "/dev/ttyUSB0",
            "--select-lidar"
        ])
        .is_err());
    }
}
