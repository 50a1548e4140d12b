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
use std::time::Duration;

use cartbridge::console::{Command, Console};
use cartbridge::session::CartridgeSession;
use cartbridge::voice::{self, oscillator::Oscillator};
use cartbridge::{audio, config, midi};
use clap::{crate_version, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PUMP_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Plays a cartridge synthesizer from MIDI devices and the keyboard."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input/output devices.
    MidiDevices {},
    /// Starts a session and reads commands from the console.
    Start {
        /// The path to the session config.
        config_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
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
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start { config_path } => {
            let config = config::Session::deserialize(&PathBuf::from(&config_path))?;
            run(config).await?;
        }
    }

    Ok(())
}

async fn run(config: config::Session) -> Result<(), Box<dyn Error>> {
    // The oscillator has to run at whatever rate the device settles on.
    let output = match audio::get_output(config.audio()) {
        Ok(output) => Some(output),
        Err(e) => {
            warn!(err = e.to_string(), "Audio output unavailable, continuing silently.");
            None
        }
    };
    let sample_rate = output
        .as_ref()
        .and_then(|output| output.format().ok())
        .map(|format| format.sample_rate)
        .unwrap_or_else(|| config.audio().sample_rate());

    let voice = voice::shared(Oscillator::new(sample_rate, config.cartridge()));
    let mut session = CartridgeSession::new(&config, voice);

    let audio_ready = match output {
        Some(output) => match session.initialize_audio_with(output) {
            Ok(pull) => {
                info!(pull = format!("{:?}", pull), "Audio initialized.");
                true
            }
            Err(e) => {
                warn!(err = e.to_string(), "Audio output unavailable, continuing silently.");
                false
            }
        },
        None => false,
    };
    if let Err(e) = session.initialize_devices() {
        warn!(err = e.to_string(), "MIDI unavailable, continuing keyboard only.");
    }

    session.load_cartridge(session.configured_cartridge());
    if audio_ready {
        session.start()?;
    }

    let (commands_tx, mut commands_rx) = mpsc::channel::<Command>(16);
    let console = Console::new().spawn(commands_tx);
    let mut pump = tokio::time::interval(PUMP_INTERVAL);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            command = commands_rx.recv() => {
                match command {
                    Some(Command::Quit) | None => break,
                    Some(command) => handle(&mut session, command),
                }
            }
            _ = pump.tick() => {
                session.pump();
            }
            _ = &mut interrupted => {
                info!("Interrupted.");
                break;
            }
        }
    }

    session.all_notes_off();
    session.dispose();
    // The console task is parked on stdin and can't be joined.
    drop(console);
    Ok(())
}

fn handle(session: &mut CartridgeSession, command: Command) {
    match command {
        Command::Key { key, pressed } => {
            let action = session.key(key, pressed);
            info!(key = key.to_string(), action = format!("{:?}", action), "Key.");
        }
        Command::NoteOn { note, velocity } => session.note_on(note, velocity),
        Command::NoteOff { note } => session.note_off(note),
        Command::AllNotesOff => {
            let stopped = session.all_notes_off();
            info!(stopped, "All notes off.");
        }
        Command::Load(cartridge) => session.load_cartridge(cartridge),
        Command::Set { parameter, value } => {
            let outcome = session.set_parameter(&parameter, value);
            info!(parameter, value, outcome = %outcome, "Set parameter.");
        }
        Command::Volume(volume) => {
            let outcome = session.set_parameter("volume", volume);
            info!(volume, outcome = %outcome, "Set volume.");
        }
        Command::Reset => {
            if let Err(e) = session.reset() {
                warn!(err = e.to_string(), "Unable to reset.");
            }
        }
        Command::Start => {
            if let Err(e) = session.start() {
                warn!(err = e.to_string(), "Unable to start.");
            }
        }
        Command::Stop => {
            if let Err(e) = session.stop() {
                warn!(err = e.to_string(), "Unable to stop.");
            }
        }
        Command::Status => {
            let audio = session.audio();
            println!("Cartridge: {}", session.cartridge());
            println!("Audio: {:?}", audio.state());
            if let Some(format) = audio.format() {
                println!(
                    "Format: {} Hz, {} channel(s), {} frames ({:.1} ms)",
                    format.sample_rate,
                    format.channels,
                    format.buffer_size,
                    format.latency().as_secs_f64() * 1000.0
                );
            }
            println!("Volume: {:.3}", audio.volume());
            println!("Failed samples: {}", audio.failed_samples());
            println!("Active notes: {:?}", session.active_notes());
            println!("Effects: {:?}", session.effects());
            for device in session.router().input_devices() {
                println!("- in: {}", device);
            }
            for device in session.router().output_devices() {
                println!("- out: {}", device);
            }
        }
        Command::Quit => {}
    }
}
