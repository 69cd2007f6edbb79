//! Audio subsystem configuration.
//!
//! One [`AudioConfig`] is built at process configuration time and consumed
//! by [`crate::driver::MusicSystem::new`]; nothing here is reconfigurable
//! at runtime. Defaults reproduce the classic hardware arrangement the
//! engine was written for: Sound Blaster at 0x220 on IRQ 5 / DMA 5, AdLib
//! at 0x388, 22050 Hz with a 50 ms buffer, and a 600 Hz system timer.

use serde::{Deserialize, Serialize};

use crate::sequencer::Tempo;
use crate::{Result, SoundError};

/// Which backend a build of the system drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// OPL3 FM synthesis chip
    FmSynth,
    /// Sound Blaster 16 PCM mixer
    PcmMixer,
}

/// Static configuration for the audio subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Active backend for this configuration
    pub backend: BackendKind,
    /// Sound Blaster base port
    pub sb_base: u16,
    /// AdLib/OPL3 base port
    pub adlib_base: u16,
    /// Playback-completion interrupt line (2, 5, 7 or 10)
    pub irq_line: u8,
    /// 16-bit DMA channel (5-7)
    pub dma_channel: u8,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Playback buffer length in milliseconds (both halves together)
    pub buffer_ms: u32,
    /// Physical address of the playback buffer as seen by the DMA
    /// controller; must sit below the 16 MiB ISA limit
    pub dma_buffer_addr: u32,
    /// System timer target rate in ticks per second
    pub timer_hz: u32,
    /// Track tempo driving the sequencer cadence
    pub tempo: Tempo,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            backend: BackendKind::PcmMixer,
            sb_base: 0x220,
            adlib_base: 0x388,
            irq_line: 5,
            dma_channel: 5,
            sample_rate: 22_050,
            buffer_ms: 50,
            dma_buffer_addr: 0x0009_0000,
            timer_hz: 600,
            tempo: Tempo::default(),
        }
    }
}

impl AudioConfig {
    /// Playback buffer length in samples (both halves together).
    pub fn buffer_samples(&self) -> usize {
        (self.sample_rate * self.buffer_ms / 1000) as usize
    }

    /// Check the configuration against the hardware's hard limits.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.irq_line, 2 | 5 | 7 | 10) {
            return Err(SoundError::Config(format!(
                "IRQ {} is not routable through the mixer",
                self.irq_line
            )));
        }
        if !(5..=7).contains(&self.dma_channel) {
            return Err(SoundError::Config(format!(
                "DMA channel {} is not a 16-bit channel",
                self.dma_channel
            )));
        }
        if !(5_000..=44_100).contains(&self.sample_rate) {
            return Err(SoundError::Config(format!(
                "sample rate {} outside DSP range",
                self.sample_rate
            )));
        }
        if self.buffer_ms == 0 || self.buffer_samples() < 2 {
            return Err(SoundError::Config("playback buffer is empty".into()));
        }
        if self.buffer_samples() % 2 != 0 {
            return Err(SoundError::Config(
                "playback buffer must split into equal halves".into(),
            ));
        }
        if self.dma_buffer_addr >= 1 << 24 {
            return Err(SoundError::Config(format!(
                "DMA buffer at {:#x} is beyond the ISA address limit",
                self.dma_buffer_addr
            )));
        }
        if self.timer_hz == 0 {
            return Err(SoundError::Config("timer rate must be nonzero".into()));
        }
        if self.tempo.bpm == 0 || self.tempo.ticks_per_beat == 0 {
            return Err(SoundError::Config("tempo must be nonzero".into()));
        }
        if self.tempo.samples_per_tick(self.sample_rate) == 0 {
            return Err(SoundError::Config(
                "tempo leaves no samples between ticks".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AudioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_samples(), 1102);
    }

    #[test]
    fn test_rejects_unroutable_irq() {
        let config = AudioConfig {
            irq_line: 3,
            ..AudioConfig::default()
        };
        assert!(matches!(config.validate(), Err(SoundError::Config(_))));
    }

    #[test]
    fn test_rejects_8bit_dma_channel() {
        let config = AudioConfig {
            dma_channel: 1,
            ..AudioConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = AudioConfig {
            backend: BackendKind::FmSynth,
            ..AudioConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: AudioConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AudioConfig = serde_json::from_str(r#"{"sample_rate": 11025}"#).unwrap();
        assert_eq!(config.sample_rate, 11_025);
        assert_eq!(config.sb_base, 0x220);
    }
}
