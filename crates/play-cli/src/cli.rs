use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "audio-play", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Sysfs GPIO number of the amplifier enable line (omit to run without one)
    #[arg(long)]
    pub amp_gpio: Option<u32>,

    /// Initial volume, 0-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub volume: Option<u8>,

    /// TOML config file; command-line flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Give up enqueueing a command after this many milliseconds (default: wait)
    #[arg(long)]
    pub send_timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Play a media file to the end
    Play {
        /// Path to an audio file (wav, flac, mp3, ...)
        path: PathBuf,
    },

    /// Play a raw signed 16-bit little-endian PCM clip
    Pcm {
        /// Path to the raw sample file
        path: PathBuf,

        /// Source sample rate in Hz
        #[arg(long, default_value_t = 22_050)]
        rate: u32,

        /// Interleaved channel count (1 or 2)
        #[arg(long, default_value_t = 1)]
        channels: u8,
    },

    /// Read player commands from stdin (default)
    Console,
}
