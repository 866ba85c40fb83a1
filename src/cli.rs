// Command-line interface definitions for voxrec
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "voxrec")]
#[command(author, version, about = "Record audio to WAV and play it back")]
#[command(long_about = "
Voxrec records audio from an input device into a WAV file and plays WAV
files back through an output device.

USAGE:
  Run `voxrec` (or `voxrec record`), press ENTER to start recording and
  ENTER again to stop. The recording is saved as 16-bit PCM.

  List devices with `voxrec devices`, then pick one with --device N, or
  choose interactively with --select.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record from an input device (default if no command specified)
    Record(RecordArgs),

    /// Play a WAV file through an output device
    Play {
        /// WAV file to play (defaults to the configured recording output)
        file: Option<std::path::PathBuf>,

        #[command(flatten)]
        device: DeviceArgs,

        /// Frames per write
        #[arg(long, value_name = "N")]
        frames_per_buffer: Option<u32>,
    },

    /// List input and output devices
    Devices,

    /// Print a WAV file's header and check it is 16-bit PCM mono
    Check {
        /// WAV file to check
        file: std::path::PathBuf,
    },

    /// Show current configuration
    Config {
        /// Print the default configuration template instead
        #[arg(long)]
        default: bool,

        /// Write the effective configuration to the config file
        /// (the --config path, or the default location)
        #[arg(long, conflicts_with = "default")]
        write: bool,
    },
}

#[derive(Args, Default)]
pub struct RecordArgs {
    /// Output WAV file (defaults to the configured recording output)
    pub output: Option<std::path::PathBuf>,

    #[command(flatten)]
    pub device: DeviceArgs,

    /// Sample rate in Hz
    #[arg(long, value_name = "HZ")]
    pub rate: Option<u32>,

    /// Number of channels (1 or 2)
    #[arg(long, value_name = "N")]
    pub channels: Option<u16>,

    /// Frames per read; also the worst-case stop latency
    #[arg(long, value_name = "N")]
    pub frames_per_buffer: Option<u32>,

    /// Stop automatically after this many seconds instead of waiting for ENTER
    #[arg(long, value_name = "SECS")]
    pub duration: Option<f64>,

    /// Play the recording back once saved
    #[arg(long)]
    pub play: bool,
}

#[derive(Args, Default)]
pub struct DeviceArgs {
    /// Device index (see `voxrec devices`)
    #[arg(short, long, value_name = "N", conflicts_with = "select")]
    pub device: Option<usize>,

    /// Choose the device interactively
    #[arg(long)]
    pub select: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["voxrec"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_record_args() {
        let cli = Cli::parse_from([
            "voxrec",
            "-vv",
            "record",
            "take.wav",
            "--device",
            "2",
            "--rate",
            "44100",
            "--duration",
            "1.5",
            "--play",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Commands::Record(args)) => {
                assert_eq!(args.output, Some(std::path::PathBuf::from("take.wav")));
                assert_eq!(args.device.device, Some(2));
                assert!(!args.device.select);
                assert_eq!(args.rate, Some(44100));
                assert_eq!(args.duration, Some(1.5));
                assert!(args.play);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_device_and_select_conflict() {
        let result = Cli::try_parse_from(["voxrec", "play", "a.wav", "--device", "1", "--select"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_requires_file() {
        assert!(Cli::try_parse_from(["voxrec", "check"]).is_err());
        let cli = Cli::parse_from(["voxrec", "check", "a.wav"]);
        assert!(matches!(cli.command, Some(Commands::Check { .. })));
    }

    #[test]
    fn test_config_write() {
        let cli = Cli::try_parse_from(["voxrec", "config", "--write"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                default: false,
                write: true
            })
        ));
        assert!(Cli::try_parse_from(["voxrec", "config", "--write", "--default"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommands_each_get_a_man_page() {
        use clap::CommandFactory;
        let names: Vec<String> = Cli::command()
            .get_subcommands()
            .map(|sub| sub.get_name().to_string())
            .collect();
        assert_eq!(names, ["record", "play", "devices", "check", "config"]);
    }
}
