//! Effective CLI configuration: optional TOML file overlaid by flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use audio_play::PlayerConfig;

use crate::cli::Args;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub device: Option<String>,
    pub amp_gpio: Option<u32>,
    pub volume: Option<u8>,
    pub player: PlayerConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<CliConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }

    /// Load the file named by `--config` (if any) and apply the flags on top.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cfg.apply_args(args);
        if let Some(volume) = cfg.volume {
            anyhow::ensure!(volume <= 100, "volume {volume} out of range 0..=100");
            cfg.player.default_volume = volume;
        }
        Ok(cfg)
    }

    fn apply_args(&mut self, args: &Args) {
        if args.device.is_some() {
            self.device = args.device.clone();
        }
        if args.amp_gpio.is_some() {
            self.amp_gpio = args.amp_gpio;
        }
        if args.volume.is_some() {
            self.volume = args.volume;
        }
        if let Some(ms) = args.send_timeout_ms {
            self.player.send_timeout = Some(Duration::from_millis(ms));
        }
    }
}
