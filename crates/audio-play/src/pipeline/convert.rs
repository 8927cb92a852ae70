//! Rate conversion of decoded audio to the fixed output rate.
//!
//! Wraps Rubato's asynchronous sinc resampler in a push-style converter: the
//! decode loop feeds arbitrary-length interleaved blocks, the converter
//! processes whole chunks as soon as enough input is buffered and returns
//! whatever output those chunks produced. `flush` drains the partial tail.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

pub(crate) struct RateConverter {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    chunk_frames: usize,
    pending: Vec<f32>,
    out: Vec<f32>,
    indexing: Indexing,
}

impl RateConverter {
    /// Converter from `src_rate` to `dst_rate` for `channels` interleaved channels.
    pub(crate) fn new(
        src_rate: u32,
        dst_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self> {
        let f_ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };

        let chunk_frames = chunk_frames.max(1);
        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;

        // Headroom for the ratio plus the relative-ratio slack above.
        let out_frames = (chunk_frames as f64 * f_ratio * 1.2).ceil() as usize + 64;

        Ok(Self {
            resampler: Box::new(resampler),
            channels,
            chunk_frames,
            pending: Vec::with_capacity(chunk_frames * channels * 2),
            out: vec![0.0; out_frames * channels],
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    /// Buffer `input` and convert every complete chunk.
    pub(crate) fn push(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(input);
        let chunk_samples = self.chunk_frames * self.channels;
        let mut produced = Vec::new();
        while self.pending.len() >= chunk_samples {
            let chunk: Vec<f32> = self.pending.drain(..chunk_samples).collect();
            self.process(&chunk, None, &mut produced)?;
        }
        Ok(produced)
    }

    /// Convert whatever input remains, padded by the resampler.
    pub(crate) fn flush(&mut self) -> Result<Vec<f32>> {
        let mut produced = Vec::new();
        let tail_frames = self.pending.len() / self.channels;
        if tail_frames == 0 {
            return Ok(produced);
        }
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(self.chunk_frames * self.channels, 0.0);
        self.process(&chunk, Some(tail_frames), &mut produced)?;
        Ok(produced)
    }

    fn process(
        &mut self,
        chunk: &[f32],
        partial_len: Option<usize>,
        produced: &mut Vec<f32>,
    ) -> Result<()> {
        let input = InterleavedSlice::new(chunk, self.channels, self.chunk_frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let out_capacity_frames = self.out.len() / self.channels;
        let mut output =
            InterleavedSlice::new_mut(&mut self.out, self.channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = partial_len;

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input, &mut output, Some(&self.indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;

        produced.extend_from_slice(&self.out[..nbr_out * self.channels]);
        Ok(())
    }
}
