use std::time::Duration;

use serde::Deserialize;

/// Tuning parameters for the player, its command queue and the direct PCM path.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Capacity of the command channel feeding the playback worker.
    pub queue_capacity: usize,
    /// Longest accepted media url, in bytes.
    pub max_url_len: usize,
    /// Fixed output sample rate (Hz); everything is converted to this rate.
    pub target_rate: u32,
    /// Frames per chunk handed to the output device on the direct PCM path.
    pub pcm_chunk_frames: usize,
    /// Chunks of silence written after a PCM clip to flush downstream buffers.
    pub flush_chunks: usize,
    /// Delay between asserting the amplifier and the first PCM chunk.
    #[serde(with = "millis")]
    pub startup_delay: Duration,
    /// Volume (percent) a fresh player starts with.
    pub default_volume: u8,
    /// When set, blocking dispatch gives up after this long with `QueueFull`.
    #[serde(with = "opt_millis")]
    pub send_timeout: Option<Duration>,
    /// Decoder/resampler chunk size in frames for file playback.
    pub decode_chunk_frames: usize,
    /// Target buffering (seconds) of the output device queue.
    pub output_buffer_seconds: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            max_url_len: 127,
            target_rate: 44_100,
            pcm_chunk_frames: 512,
            flush_chunks: 2,
            startup_delay: Duration::from_millis(50),
            default_volume: 95,
            send_timeout: None,
            decode_chunk_frames: 1024,
            output_buffer_seconds: 0.25,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod opt_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
