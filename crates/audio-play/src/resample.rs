//! Linear-interpolation resampler for the direct PCM path.
//!
//! Converts a short in-memory clip (mono or stereo `i16`, any rate) to the
//! fixed output layout: interleaved stereo at the target rate, one chunk at a
//! time.
//!
//! For output frame `i`:
//! - `src_pos = i / ratio`, `src_idx = floor(src_pos)`, `frac = src_pos - src_idx`
//! - near the end (`src_idx >= frames - 1`) the last pair is used with `frac = 1.0`
//! - `out = s0 + frac * (s1 - s0)`

use crate::error::{PlayerError, Result};

/// One direct-play conversion: source clip plus the derived output geometry.
#[derive(Debug)]
pub struct PcmJob<'a> {
    samples: &'a [i16],
    frames: usize,
    source_rate: u32,
    channels: usize,
    ratio: f64,
}

impl<'a> PcmJob<'a> {
    /// Validate the clip and compute `ratio = target_rate / source_rate`.
    ///
    /// `samples` is interleaved; a trailing partial frame is ignored.
    pub fn new(
        samples: &'a [i16],
        source_rate: u32,
        channels: u8,
        target_rate: u32,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(PlayerError::invalid("empty pcm buffer"));
        }
        if source_rate == 0 || target_rate == 0 {
            return Err(PlayerError::invalid("sample rate must be non-zero"));
        }
        let channels = match channels {
            1 | 2 => channels as usize,
            other => {
                return Err(PlayerError::invalid(format!(
                    "unsupported channel count {other}"
                )));
            }
        };
        let frames = samples.len() / channels;
        if frames == 0 {
            return Err(PlayerError::invalid("pcm buffer shorter than one frame"));
        }
        Ok(Self {
            samples,
            frames,
            source_rate,
            channels,
            ratio: target_rate as f64 / source_rate as f64,
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// `floor(input_frames * ratio)`.
    pub fn output_frames(&self) -> usize {
        (self.frames as f64 * self.ratio).floor() as usize
    }

    /// Source position for output frame `i` after the end-of-clip clamp.
    ///
    /// Returns `(src_idx, frac)`; `src_idx + 1` is always a valid frame when
    /// the clip has at least two frames.
    pub fn source_position(&self, i: usize) -> (usize, f64) {
        if self.frames < 2 {
            return (0, 0.0);
        }
        let src_pos = i as f64 / self.ratio;
        let src_idx = src_pos.floor() as usize;
        if src_idx >= self.frames - 1 {
            (self.frames - 2, 1.0)
        } else {
            (src_idx, src_pos - src_idx as f64)
        }
    }

    /// Interpolated `(left, right)` for output frame `i`.
    ///
    /// Mono clips feed both outputs; stereo clips interpolate each channel on
    /// its own.
    pub fn frame(&self, i: usize) -> (i16, i16) {
        let (idx, frac) = self.source_position(i);
        let left = self.interpolate(idx, frac, 0);
        let right = if self.channels == 2 {
            self.interpolate(idx, frac, 1)
        } else {
            left
        };
        (left, right)
    }

    /// Fill `out` (interleaved stereo) with output frames starting at `start`.
    ///
    /// Returns the number of frames written; zero once the clip is exhausted.
    pub fn render_into(&self, start: usize, out: &mut Vec<i16>, max_frames: usize) -> usize {
        out.clear();
        let end = self.output_frames().min(start.saturating_add(max_frames));
        for i in start..end {
            let (l, r) = self.frame(i);
            out.push(l);
            out.push(r);
        }
        end.saturating_sub(start)
    }

    fn sample(&self, frame: usize, ch: usize) -> i16 {
        self.samples[frame * self.channels + ch]
    }

    fn interpolate(&self, idx: usize, frac: f64, ch: usize) -> i16 {
        let s0 = self.sample(idx, ch) as f64;
        if self.frames < 2 {
            return s0 as i16;
        }
        let s1 = self.sample(idx + 1, ch) as f64;
        let v = s0 + frac * (s1 - s0);
        v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_all(samples: &[i16], source_rate: u32, channels: u8) -> Vec<i16> {
        let job = PcmJob::new(samples, source_rate, channels, 44_100).unwrap();
        let mut out = Vec::new();
        job.render_into(0, &mut out, job.output_frames());
        out
    }

    #[test]
    fn output_frames_is_floor_of_ratio() {
        let samples = vec![0i16; 100];
        let job = PcmJob::new(&samples, 22_050, 1, 44_100).unwrap();
        assert_eq!(job.output_frames(), 200);

        let job = PcmJob::new(&samples, 48_000, 1, 44_100).unwrap();
        assert_eq!(job.output_frames(), (100.0f64 * 44_100.0 / 48_000.0).floor() as usize);

        let job = PcmJob::new(&samples, 8_000, 1, 44_100).unwrap();
        assert_eq!(job.output_frames(), 551);
    }

    #[test]
    fn clamp_reproduces_last_sample() {
        let samples: Vec<i16> = vec![100, 200, 300, 400];
        let job = PcmJob::new(&samples, 22_050, 1, 44_100).unwrap();
        let last = job.output_frames() - 1;
        assert_eq!(job.source_position(last), (2, 1.0));
        assert_eq!(job.frame(last), (400, 400));
    }

    #[test]
    fn stereo_keeps_both_channels() {
        let samples: Vec<i16> = vec![10, -10, 20, -20, 30, -30, 40, -40];
        let out = render_all(&samples, 44_100, 2);
        assert_eq!(out, samples);
    }

    #[test]
    fn single_frame_repeats() {
        let out = render_all(&[123], 22_050, 1);
        assert_eq!(out, vec![123, 123, 123, 123]);
    }

    #[test]
    fn render_into_walks_in_chunks() {
        let samples = vec![7i16; 300];
        let job = PcmJob::new(&samples, 22_050, 1, 44_100).unwrap();
        let mut buf = Vec::new();
        let mut start = 0;
        let mut chunks = 0;
        loop {
            let n = job.render_into(start, &mut buf, 512);
            if n == 0 {
                break;
            }
            assert_eq!(buf.len(), n * 2);
            start += n;
            chunks += 1;
        }
        assert_eq!(start, 600);
        assert_eq!(chunks, 2);
    }

    #[test]
    fn rejects_invalid_arguments() {
        assert!(matches!(
            PcmJob::new(&[], 44_100, 1, 44_100),
            Err(PlayerError::InvalidArgument(_))
        ));
        assert!(matches!(
            PcmJob::new(&[1, 2], 0, 1, 44_100),
            Err(PlayerError::InvalidArgument(_))
        ));
        assert!(matches!(
            PcmJob::new(&[1, 2], 44_100, 3, 44_100),
            Err(PlayerError::InvalidArgument(_))
        ));
        assert!(matches!(
            PcmJob::new(&[1], 44_100, 2, 44_100),
            Err(PlayerError::InvalidArgument(_))
        ));
    }
}
