//! Commands carried from the dispatcher to the playback worker.

use std::fmt;

use crate::error::{PlayerError, Result};

/// Url of a media file, bounded to the player's url buffer size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaUrl(String);

impl MediaUrl {
    /// Validate `url` against `max_len` bytes.
    ///
    /// Empty and oversized urls are rejected rather than truncated: a truncated
    /// path would open the wrong file or none at all.
    pub fn new(url: &str, max_len: usize) -> Result<Self> {
        if url.is_empty() {
            return Err(PlayerError::invalid("empty url"));
        }
        if url.len() > max_len {
            return Err(PlayerError::invalid(format!(
                "url is {} bytes, limit is {max_len}",
                url.len()
            )));
        }
        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commands accepted by the playback worker, processed in submission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Play(MediaUrl),
    Stop,
    Pause,
    Resume,
    Deinit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Deinit => "deinit",
        }
    }
}
