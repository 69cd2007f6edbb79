//! WAV export of synthesized sample buffers.

use std::path::Path;

use crate::Result;

/// Write mono 16-bit samples to a WAV file at `sample_rate`.
pub fn write_wav<P: AsRef<Path>>(path: P, sample_rate: u32, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| crate::SoundError::Export(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| crate::SoundError::Export(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| crate::SoundError::Export(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_wav_round_trips_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..441).map(|i| (i * 64) as i16).collect();

        write_wav(&path, 22_050, &samples).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 22_050);
        let back: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(back, samples);
    }
}
