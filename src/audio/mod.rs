//! PCM conversions between the voice gateway and the recognizer.
//!
//! Discord delivers 48kHz interleaved stereo `i16`; Whisper wants 16kHz mono
//! `f32` in `-1.0..1.0`.

use anyhow::Result;

mod resample;
pub use resample::Resample;

/// Sample rate Whisper models are trained on.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Converts interleaved `i16` samples to mono `f32` by averaging channels.
pub fn downmix(samples: &[i16], channels: u16) -> Vec<f32> {
    let n = channels.max(1) as usize;
    samples
        .chunks(n)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
            sum / frame.len() as f32
        })
        .collect()
}

/// Prepares captured audio for transcription.
pub fn to_whisper_input(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<f32>> {
    let mono = downmix(samples, channels);
    Resample {
        samplerate_in: sample_rate,
        samplerate_out: WHISPER_SAMPLE_RATE,
        channels: 1,
    }
    .run(&mono)
}

/// Length of `samples` interleaved frames, in milliseconds.
pub fn duration_ms(samples: usize, sample_rate: u32, channels: u16) -> u64 {
    let per_second = sample_rate as u64 * channels.max(1) as u64;
    if per_second == 0 {
        return 0;
    }
    samples as u64 * 1000 / per_second
}
