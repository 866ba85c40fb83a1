//! Voxrec - record audio to WAV and play it back
//!
//! Run with `voxrec` or `voxrec record` to make a recording.
//! Use `voxrec play <file>` to play a WAV file.
//! Use `voxrec devices` to list audio devices.

use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voxrec::audio::{self, AudioHost, Direction};
use voxrec::cli::{Cli, Commands, DeviceArgs, RecordArgs};
use voxrec::config::{self, Config};
use voxrec::trigger::{ConsoleTrigger, TimedTrigger, Trigger};
use voxrec::{playback, session, wav};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("voxrec={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or_else(|| Commands::Record(RecordArgs::default())) {
        Commands::Record(args) => run_record(config, args)?,

        Commands::Play {
            file,
            device,
            frames_per_buffer,
        } => {
            let path = file.unwrap_or_else(|| config.recording.output.clone());
            let fpb = frames_per_buffer.unwrap_or(config.audio.frames_per_buffer);
            let host = audio::create_host(&config.audio)?;
            let device = choose_device(
                host.as_ref(),
                Direction::Playback,
                &device,
                config.audio.output_device,
            )?;
            run_play(host.as_ref(), &path, device, fpb)?;
        }

        Commands::Devices => show_devices(&config)?,

        Commands::Check { file } => check_file(&file)?,

        Commands::Config { default, write } => {
            if default {
                print!("{}", config::DEFAULT_CONFIG);
            } else if write {
                let path = cli
                    .config
                    .or_else(Config::default_path)
                    .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
                config::save_config(&config, &path)?;
                println!("Configuration written to {:?}", path);
            } else {
                show_config(&config)?;
            }
        }
    }

    Ok(())
}

/// Resolve `--device` / `--select` against the configured default
fn choose_device(
    host: &dyn AudioHost,
    direction: Direction,
    args: &DeviceArgs,
    configured: Option<usize>,
) -> anyhow::Result<Option<usize>> {
    if args.select {
        let index =
            audio::devices::prompt_for_device(host, direction, io::stdin().lock(), io::stdout())?;
        return Ok(Some(index));
    }
    Ok(args.device.or(configured))
}

fn run_record(mut config: Config, args: RecordArgs) -> anyhow::Result<()> {
    // Apply CLI overrides
    if let Some(rate) = args.rate {
        config.audio.sample_rate = rate;
    }
    if let Some(channels) = args.channels {
        config.audio.channels = channels;
    }
    if let Some(fpb) = args.frames_per_buffer {
        config.audio.frames_per_buffer = fpb;
    }
    let output = args.output.unwrap_or_else(|| config.recording.output.clone());
    let play_after = args.play || config.recording.play_after;

    let host = audio::create_host(&config.audio)?;
    tracing::debug!("Audio host: {}", host.name());
    let device = choose_device(
        host.as_ref(),
        Direction::Capture,
        &args.device,
        config.audio.input_device,
    )?;

    let mut trigger: Box<dyn Trigger> = match args.duration {
        Some(secs) => {
            let duration = Duration::try_from_secs_f64(secs)
                .map_err(|e| anyhow::anyhow!("Invalid --duration {}: {}", secs, e))?;
            Box::new(TimedTrigger::new(duration))
        }
        None => Box::new(ConsoleTrigger::stdio()),
    };

    let header = session::record_to_file(
        host.as_ref(),
        config.stream_config(),
        device,
        trigger.as_mut(),
        &output,
    )?;
    println!(
        "Saved {:.2}s to {}",
        header.duration().as_secs_f64(),
        output.display()
    );

    if play_after {
        let output_device = config.audio.output_device;
        run_play(
            host.as_ref(),
            &output,
            output_device,
            config.audio.frames_per_buffer,
        )?;
    }

    Ok(())
}

fn run_play(
    host: &dyn AudioHost,
    path: &Path,
    device: Option<usize>,
    frames_per_buffer: u32,
) -> anyhow::Result<()> {
    let summary = playback::play(host, path, device, frames_per_buffer)?;
    println!(
        "Played {:.2}s from {}",
        summary.duration.as_secs_f64(),
        path.display()
    );
    Ok(())
}

fn show_devices(config: &Config) -> anyhow::Result<()> {
    let host = audio::create_host(&config.audio)?;
    let list = audio::list_devices(host.as_ref())?;
    let default_input = host.default_device(Direction::Capture)?;
    let default_output = host.default_device(Direction::Playback)?;

    println!("Audio host: {}\n", host.name());

    println!("Microphones:");
    if list.microphones.is_empty() {
        println!("  (none)");
    }
    for device in &list.microphones {
        let marker = if Some(device.id) == default_input {
            " (default)"
        } else {
            ""
        };
        println!(
            "  {}. {} [{} ch]{}",
            device.id, device.name, device.max_input_channels, marker
        );
    }

    println!("\nSpeakers:");
    if list.speakers.is_empty() {
        println!("  (none)");
    }
    for device in &list.speakers {
        let marker = if Some(device.id) == default_output {
            " (default)"
        } else {
            ""
        };
        println!(
            "  {}. {} [{} ch]{}",
            device.id, device.name, device.max_output_channels, marker
        );
    }

    Ok(())
}

fn check_file(path: &Path) -> anyhow::Result<()> {
    let header = wav::read_header(path)?;
    println!("File: {}", path.display());
    println!("  channels = {}", header.channels);
    println!("  sample_width = {}", header.sample_width);
    println!("  frame_rate = {}", header.frame_rate);
    println!("  compression = {}", header.compression);
    println!("  frames = {}", header.frame_count);
    println!("  duration = {:.2}s", header.duration().as_secs_f64());

    wav::validate_pcm16_mono(&header)?;
    println!("\nOK: 16-bit PCM mono");
    Ok(())
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[audio]");
    println!("  host = {:?}", config.audio.host);
    println!("  sample_rate = {}", config.audio.sample_rate);
    println!("  channels = {}", config.audio.channels);
    println!("  frames_per_buffer = {}", config.audio.frames_per_buffer);
    if let Some(device) = config.audio.input_device {
        println!("  input_device = {}", device);
    }
    if let Some(device) = config.audio.output_device {
        println!("  output_device = {}", device);
    }

    println!("\n[recording]");
    println!("  output = {:?}", config.recording.output);
    println!("  play_after = {}", config.recording.play_after);

    println!("\n---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );

    Ok(())
}
