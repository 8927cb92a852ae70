//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config at the player's fixed output rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose an output config that runs at exactly `rate_hz` with at least two
/// channels, preferring float formats.
///
/// The player never converts on the device side, so a device that cannot run
/// at the fixed rate is an error rather than a fallback.
pub fn pick_output_config(
    device: &cpal::Device,
    rate_hz: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= rate_hz && rate_hz <= r.max_sample_rate())
        .filter(|r| r.channels() >= 2)
        .min_by_key(|r| (sample_format_rank(r.sample_format()), r.channels()))
        .map(|r| r.with_sample_rate(rate_hz))
        .ok_or_else(|| anyhow!("No stereo output config at {rate_hz} Hz"))
}

/// Prefer a fixed buffer size if the device advertises a range.
///
/// Returns `None` when the device only supports its default buffer size.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            clamp_buffer_frames(*min, *max),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn clamp_buffer_frames(min: u32, max: u32) -> u32 {
    // Short UI clips should start promptly; keep the device buffer small.
    const TARGET_FRAMES: u32 = 1024;
    TARGET_FRAMES.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_format_rank_prefers_float() {
        use cpal::SampleFormat::{F32, I16, U8};
        assert!(sample_format_rank(F32) < sample_format_rank(I16));
        assert!(sample_format_rank(I16) < sample_format_rank(U8));
    }

    #[test]
    fn clamp_buffer_frames_respects_device_range() {
        assert_eq!(clamp_buffer_frames(64, 4096), 1024);
        assert_eq!(clamp_buffer_frames(2048, 8192), 2048);
        assert_eq!(clamp_buffer_frames(16, 256), 256);
        assert_eq!(clamp_buffer_frames(512, 0), 512);
    }

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB Audio DAC", "usb"));
        assert!(!matches_device_name("HDMI", "usb"));
    }
}
