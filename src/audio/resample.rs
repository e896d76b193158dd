use anyhow::{Context, Result};
use samplerate::{ConverterType, convert};

#[derive(Clone, Copy, Debug)]
pub struct Resample {
    pub samplerate_in: u32,
    pub samplerate_out: u32,
    pub channels: u16,
}

impl Resample {
    pub fn is_identity(&self) -> bool {
        self.samplerate_in == self.samplerate_out
    }

    pub fn run(&self, data: &[f32]) -> Result<Vec<f32>> {
        if self.is_identity() || data.is_empty() {
            return Ok(data.to_vec());
        }
        convert(
            self.samplerate_in,
            self.samplerate_out,
            self.channels as _,
            ConverterType::SincBestQuality,
            data,
        )
        .context(format!(
            "Resampling {}Hz to {}Hz",
            self.samplerate_in, self.samplerate_out
        ))
    }
}
