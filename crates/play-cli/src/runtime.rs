//! CLI runtime helpers.
//!
//! Builds the player on top of the CPAL output and runs the play, pcm and
//! console modes.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use audio_play::amp::{EnableLine, NoopLine, SysfsGpioLine};
use audio_play::bus::SharedBus;
use audio_play::output::CpalOutput;
use audio_play::pipeline::{DecodeEngine, PlaybackState};
use audio_play::{AudioPlayer, device};

use crate::config::CliConfig;
use crate::console::{self, ConsoleCommand};

const START_TIMEOUT: Duration = Duration::from_secs(2);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Player plus the concrete output it writes to.
pub struct Runtime {
    pub player: Arc<AudioPlayer>,
    output: Arc<CpalOutput>,
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Open the output device and initialize a player.
pub fn start(cfg: &CliConfig) -> Result<Runtime> {
    let player_cfg = cfg.player.clone();
    let output = Arc::new(CpalOutput::open(
        cfg.device.as_deref(),
        player_cfg.target_rate,
        player_cfg.output_buffer_seconds,
        player_cfg.default_volume,
    )?);
    tracing::info!(device = %output.device_name(), "output device");

    let line: Box<dyn EnableLine> = match cfg.amp_gpio {
        Some(pin) => {
            tracing::info!(pin, "amplifier enable line");
            Box::new(SysfsGpioLine::new(pin))
        }
        None => Box::new(NoopLine),
    };
    let engine = DecodeEngine::new(player_cfg.target_rate, player_cfg.decode_chunk_frames);

    let player = Arc::new(AudioPlayer::new(
        player_cfg,
        Box::new(engine),
        output.clone(),
        line,
        SharedBus::new(),
    ));
    player.init().context("init player")?;
    Ok(Runtime { player, output })
}

impl Runtime {
    /// Play one file and return once it has finished.
    pub fn play_file(&self, path: &Path) -> Result<()> {
        let path = std::fs::canonicalize(path).with_context(|| format!("resolve {:?}", path))?;
        let url = format!("file://{}", path.display());
        self.player.play(&url)?;
        self.wait_for_track()?;
        self.output.drain(DRAIN_TIMEOUT);
        Ok(())
    }

    fn wait_for_track(&self) -> Result<()> {
        let started_at = Instant::now();
        let mut started = false;
        loop {
            let state = self.player.get_state();
            match state {
                PlaybackState::Running | PlaybackState::Paused => started = true,
                PlaybackState::Finished => return Ok(()),
                PlaybackState::Error => anyhow::bail!("playback failed"),
                PlaybackState::Stopped if started => return Ok(()),
                PlaybackState::Stopped => {
                    if started_at.elapsed() > START_TIMEOUT {
                        anyhow::bail!("playback did not start (missing or unreadable file?)");
                    }
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Play a raw s16le clip through the direct PCM path.
    pub fn play_pcm_file(&self, path: &Path, rate: u32, channels: u8) -> Result<()> {
        let raw = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
        let samples: Vec<i16> = raw
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        tracing::info!(samples = samples.len(), rate_hz = rate, channels, "pcm clip");
        self.player.play_pcm(&samples, rate, channels, false)?;
        self.output.drain(DRAIN_TIMEOUT);
        Ok(())
    }

    /// Read commands from stdin until `quit` or end of input.
    pub fn console(&self) -> Result<()> {
        println!("{}", console::HELP);
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = line.context("read stdin")?;
            let cmd = match console::parse_line(&line) {
                Ok(Some(cmd)) => cmd,
                Ok(None) => continue,
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            };
            if cmd == ConsoleCommand::Quit {
                break;
            }
            if let Err(e) = self.apply(cmd) {
                println!("error: {e:#}");
            }
        }
        Ok(())
    }

    fn apply(&self, cmd: ConsoleCommand) -> Result<()> {
        match cmd {
            ConsoleCommand::Play(url) => self.player.play(&url)?,
            ConsoleCommand::Stop => self.player.stop()?,
            ConsoleCommand::Pause => self.player.pause()?,
            ConsoleCommand::Resume => self.player.resume()?,
            ConsoleCommand::Volume(v) => self.player.set_volume(v)?,
            ConsoleCommand::State => println!("{}", self.player.get_state()),
            ConsoleCommand::Status => {
                println!("{}", serde_json::to_string_pretty(&self.player.status())?)
            }
            ConsoleCommand::Help => println!("{}", console::HELP),
            ConsoleCommand::Quit => {}
        }
        Ok(())
    }
}
