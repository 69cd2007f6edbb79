//! Music sequencer contract and tempo arithmetic.
//!
//! The sequencer itself lives outside this crate; what is in scope is its
//! cadence and call signature. Whichever backend owns musical time invokes
//! [`Sequencer::tick`] synchronously from its own timing context: the PCM
//! mixer once per synthesized quantum from the playback interrupt, the FM
//! driver once per mainline pump with the number of hardware timer ticks
//! elapsed. The sequencer never runs on its own clock.

use serde::{Deserialize, Serialize};

use crate::notes::{Note, Waveform};

/// Command surface the sequencer issues notes through.
///
/// Both backends implement this with identical voice addressing; the
/// sequencer stays agnostic of which chip is actually sounding.
///
/// # Panics
///
/// All methods treat an out-of-range voice index as a checked precondition
/// failure and panic.
pub trait VoiceCommands {
    /// Start (or stop, with [`crate::notes::NOTE_NONE`]) a note on `voice`.
    fn set_note(&mut self, voice: u8, octave: u8, note: Note);

    /// Select the voice's waveform and volume as a unit.
    fn set_wave(&mut self, voice: u8, wave: Waveform, volume: u8);

    /// Set the voice's volume alone.
    fn set_volume(&mut self, voice: u8, volume: u8);

    /// Set the global output volume (0-255).
    fn set_master_volume(&mut self, volume: u8);
}

/// A music sequencer driven by the active backend.
///
/// `elapsed_ticks` is explicit so a caller that cannot guarantee one call
/// per tick (the FM path's mainline pump) can let the sequencer catch up;
/// the PCM path always passes 1. Implementations must not block: they run
/// inside the caller's interrupt time budget.
pub trait Sequencer: Send {
    /// Advance song state by `elapsed_ticks` and issue any due commands
    /// through `sink` before returning.
    fn tick(&mut self, elapsed_ticks: u32, sink: &mut dyn VoiceCommands);
}

/// Track tempo: beats per minute and sequencer ticks per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tempo {
    /// Beats per minute
    pub bpm: u32,
    /// Sequencer ticks per beat
    pub ticks_per_beat: u32,
}

impl Tempo {
    /// Beats per thousand seconds, the intermediate the sample math uses.
    #[inline]
    pub fn beats_per_ms(&self) -> u32 {
        self.bpm * 1000 / 60
    }

    /// Number of output samples between sequencer ticks at `sample_rate`.
    pub fn samples_per_tick(&self, sample_rate: u32) -> u32 {
        sample_rate * 1000 / self.beats_per_ms() / self.ticks_per_beat
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo {
            bpm: 150,
            ticks_per_beat: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tempo_sample_quantum() {
        // 150 BPM, 16 ticks/beat at 22050 Hz: 22050*1000/2500/16
        let tempo = Tempo::default();
        assert_eq!(tempo.beats_per_ms(), 2500);
        assert_eq!(tempo.samples_per_tick(22050), 551);
    }

    #[test]
    fn test_faster_tempo_shrinks_quantum() {
        let slow = Tempo {
            bpm: 120,
            ticks_per_beat: 16,
        };
        let fast = Tempo {
            bpm: 240,
            ticks_per_beat: 16,
        };
        assert!(fast.samples_per_tick(22050) < slow.samples_per_tick(22050));
    }
}
