//! Command-queue audio playback with a direct PCM path.
//!
//! [`AudioPlayer`] accepts play/stop/pause/resume commands onto a bounded
//! queue drained by a single worker, drives the pipeline engine and the
//! speaker amplifier, and plays short in-memory clips synchronously.

pub mod amp;
pub mod bus;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod resample;
pub mod status;
mod worker;

#[cfg(test)]
mod testing;

pub use config::PlayerConfig;
pub use error::{PlayerError, Result};
pub use player::AudioPlayer;
