// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{crate_version, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing_subscriber::EnvFilter;

use pulso::config::{parse_duration, Session};
use pulso::render::render_offline;
use pulso::{audio, ChannelSink, Notification, NullSink};

/// Notifications buffered between the render thread and the printer.
const NOTIFICATION_QUEUE: usize = 1024;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sample-accurate rhythmic pattern player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Prints the compiled onset table of a session.
    Inspect {
        /// The path to the session file.
        session_path: String,
    },
    /// Plays a session through its configured output device.
    Play {
        /// The path to the session file.
        session_path: String,
        /// How long to play for, e.g. 30s or 2m. Plays until interrupted if unset.
        #[arg[short, long]]
        duration: Option<String>,
    },
    /// Renders a session to a 32-bit float stereo WAV file.
    Render {
        /// The path to the session file.
        session_path: String,
        /// The WAV file to write.
        output_path: String,
        /// How much audio to render.
        #[arg[short, long, default_value = "10s"]]
        duration: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Inspect { session_path } => {
            let session = Session::load(&PathBuf::from(&session_path))?;
            let pattern = session.compile();

            println!(
                "Tempo: {} bpm, sample rate: {} Hz",
                pattern.tempo(),
                pattern.sample_rate()
            );
            println!(
                "Eighth note: {} samples, cycle: {} samples ({:.1} ms)",
                pattern.eighth_samples(),
                pattern.cycle_length(),
                pattern.cycle_length() as f64 * 1000.0 / pattern.sample_rate().max(1) as f64,
            );

            if pattern.onsets().is_empty() {
                println!("No onsets.");
                return Ok(());
            }

            println!("Onsets (count: {}):", pattern.onsets().len());
            for onset in pattern.onsets() {
                println!(
                    "- {:>8} ({:>8.1} ms) {:<14} pan={:+.2} section={} k={}",
                    onset.when,
                    pattern.time_ms(onset.when),
                    onset.role,
                    onset.pan,
                    onset.section,
                    onset.k
                );
            }
        }
        Commands::Play {
            session_path,
            duration,
        } => {
            let duration = duration.as_deref().map(parse_duration).transpose()?;
            let session = Session::load(&PathBuf::from(&session_path))?;

            let (sink, notifications) = ChannelSink::bounded(NOTIFICATION_QUEUE);
            let sink = Arc::new(sink);
            let metronome = session.metronome(sink.clone())?;
            metronome.start()?;

            let started = Instant::now();
            loop {
                let wait = match duration {
                    Some(duration) => match duration.checked_sub(started.elapsed()) {
                        Some(remaining) => remaining,
                        None => break,
                    },
                    None => Duration::from_secs(1),
                };

                match notifications.recv_timeout(wait) {
                    Ok(Notification::Onset(event)) => println!(
                        "section={} k={} time={:.1}ms",
                        event.section, event.k, event.time_ms
                    ),
                    Ok(Notification::Transport { playing: true }) => println!("Playing."),
                    Ok(Notification::Transport { playing: false }) => break,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            metronome.stop()?;
            if sink.dropped() > 0 {
                println!("{} notifications were dropped.", sink.dropped());
            }
            println!("Stopped.");
        }
        Commands::Render {
            session_path,
            output_path,
            duration,
        } => {
            let duration = parse_duration(&duration)?;
            let session = Session::load(&PathBuf::from(&session_path))?;
            let sample_rate = session.audio().sample_rate();
            let frames = (duration.as_secs_f64() * sample_rate as f64).round() as usize;

            let samples = render_offline(
                Arc::new(session.compile()),
                Arc::new(session.load_bank()),
                sample_rate,
                session.volume(),
                frames,
                session.audio().block_size(),
                &NullSink,
            );

            let spec = WavSpec {
                channels: 2,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            };
            let mut writer = WavWriter::create(&output_path, spec)?;
            for sample in samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;

            println!("Wrote {} frames to {}.", frames, output_path);
        }
    }

    Ok(())
}
