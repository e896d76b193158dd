//! Writing utterances to disk.
//!
//! Each utterance is stored as `<speaker>-<start epoch ms>` in the recordings
//! directory, either as a WAV file or as headerless PCM.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::debug;

use crate::capture::Utterance;
use crate::config::RecordingFormat;
use crate::error::Error;

/// File name stem for an utterance.
pub fn file_stem(utterance: &Utterance) -> String {
    let millis = utterance
        .started_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}-{}", sanitize(&utterance.speaker.name), millis)
}

/// Keeps names usable as file names on every platform.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ' ');
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Writes `utterance` into `dir` and returns the created file.
pub fn write(
    utterance: &Utterance,
    dir: &Path,
    format: RecordingFormat,
    sample_rate: u32,
    channels: u16,
) -> Result<PathBuf, Error> {
    std::fs::create_dir_all(dir)?;
    let stem = file_stem(utterance);
    let path = match format {
        RecordingFormat::Wav => {
            let path = dir.join(format!("{stem}.wav"));
            write_wav(&path, &utterance.samples, sample_rate, channels)?;
            path
        }
        RecordingFormat::Raw => {
            let path = dir.join(format!("{stem}.pcm"));
            write_raw(&path, &utterance.samples)?;
            path
        }
    };
    debug!("Wrote {} samples to {}", utterance.samples.len(), path.display());
    Ok(path)
}

fn write_wav(path: &Path, samples: &[i16], sample_rate: u32, channels: u16) -> Result<(), Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn write_raw(path: &Path, samples: &[i16]) -> Result<(), Error> {
    let mut out = BufWriter::new(File::create(path)?);
    for sample in samples {
        out.write_all(&sample.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}
