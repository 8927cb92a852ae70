//! audio-play: command-queue audio player CLI.
//!
//! Opens an output device with CPAL, decodes files with Symphonia, and drives
//! them through the `audio-play` player.
//!
//! ## Modes
//! - `play <path>`: play one file to the end.
//! - `pcm <path>`: play a raw 16-bit clip through the direct PCM path.
//! - `console`: read play/stop/pause/resume/vol/state/status commands from stdin.

mod cli;
mod config;
mod console;
mod runtime;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,audio_play=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let cfg = config::CliConfig::from_args(&args)?;
    let rt = runtime::start(&cfg)?;

    let player_for_signal = rt.player.clone();
    let _ = ctrlc::set_handler(move || {
        let _ = player_for_signal.deinit();
        std::process::exit(130);
    });

    let result = match args.cmd.unwrap_or(cli::Command::Console) {
        cli::Command::Play { path } => rt.play_file(&path),
        cli::Command::Pcm {
            path,
            rate,
            channels,
        } => rt.play_pcm_file(&path, rate, channels),
        cli::Command::Console => rt.console(),
    };

    rt.player.deinit()?;
    result
}
