//! Shared per-voice command state.
//!
//! Mainline command calls and the interrupt-context fill routine share
//! this state without locking: each voice's note, waveform and volume
//! live in one `AtomicU32` command word, so a command publishes all three
//! in a single store and the fill routine can never observe a torn
//! combination (e.g. a new octave with an old note). Mainline is the only
//! writer; the fill routine only loads.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::notes::{pack_note, Note, Waveform, NUM_VOICES};
use crate::sequencer::VoiceCommands;

const NOTE_SHIFT: u32 = 16;
const WAVE_SHIFT: u32 = 8;

/// Decoded snapshot of one voice's command word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceState {
    /// Packed octave/note byte (`(octave << 4) | note`)
    pub packed_note: u8,
    /// Raw waveform id
    pub waveform: u8,
    /// Voice volume, 0-255
    pub volume: u8,
}

/// The eight-voice command bank plus the master volume.
#[derive(Debug, Default)]
pub struct VoiceBank {
    voices: [AtomicU32; NUM_VOICES],
    master: AtomicU8,
}

impl VoiceBank {
    /// Create a bank with every voice silent at the default waveform and
    /// the master volume at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every voice to silence and the master volume to zero.
    pub fn reset(&self) {
        for voice in &self.voices {
            voice.store(0, Ordering::Relaxed);
        }
        self.master.store(0, Ordering::Relaxed);
    }

    fn check_voice(voice: u8) -> usize {
        assert!(
            (voice as usize) < NUM_VOICES,
            "voice {voice} out of range (0..{NUM_VOICES})"
        );
        voice as usize
    }

    /// Atomically load one voice's command word.
    #[inline]
    pub fn snapshot(&self, voice: usize) -> VoiceState {
        let word = self.voices[voice].load(Ordering::Relaxed);
        VoiceState {
            packed_note: (word >> NOTE_SHIFT) as u8,
            waveform: (word >> WAVE_SHIFT) as u8,
            volume: word as u8,
        }
    }

    /// Current master volume.
    #[inline]
    pub fn master(&self) -> u8 {
        self.master.load(Ordering::Relaxed)
    }

    /// Store a new packed note, preserving waveform and volume.
    pub fn set_note(&self, voice: u8, octave: u8, note: Note) {
        let index = Self::check_voice(voice);
        assert!(
            (octave as usize) < crate::notes::OCTAVE_STEP.len(),
            "octave {octave} out of range"
        );
        let word = self.voices[index].load(Ordering::Relaxed);
        let word = (word & 0x0000_FFFF) | ((pack_note(octave, note) as u32) << NOTE_SHIFT);
        self.voices[index].store(word, Ordering::Relaxed);
    }

    /// Store waveform and volume together, preserving the note.
    pub fn set_wave(&self, voice: u8, wave: Waveform, volume: u8) {
        let index = Self::check_voice(voice);
        let word = self.voices[index].load(Ordering::Relaxed);
        let word = (word & 0xFFFF_0000) | ((wave.id() as u32) << WAVE_SHIFT) | volume as u32;
        self.voices[index].store(word, Ordering::Relaxed);
    }

    /// Store a new volume, preserving note and waveform.
    pub fn set_volume(&self, voice: u8, volume: u8) {
        let index = Self::check_voice(voice);
        let word = self.voices[index].load(Ordering::Relaxed);
        let word = (word & 0xFFFF_FF00) | volume as u32;
        self.voices[index].store(word, Ordering::Relaxed);
    }

    /// Store the master volume.
    pub fn set_master(&self, volume: u8) {
        self.master.store(volume, Ordering::Relaxed);
    }
}

/// Cloneable command handle over a shared [`VoiceBank`].
///
/// This is what the sequencer receives as its command sink on the PCM
/// path, and what [`crate::pcm::SbMixer`] forwards its own command calls
/// through.
#[derive(Clone)]
pub struct VoiceHandle(pub(crate) std::sync::Arc<VoiceBank>);

impl VoiceHandle {
    /// Create a command handle over `bank`.
    pub fn new(bank: std::sync::Arc<VoiceBank>) -> Self {
        VoiceHandle(bank)
    }
}

impl VoiceCommands for VoiceHandle {
    fn set_note(&mut self, voice: u8, octave: u8, note: Note) {
        self.0.set_note(voice, octave, note);
    }

    fn set_wave(&mut self, voice: u8, wave: Waveform, volume: u8) {
        self.0.set_wave(voice, wave, volume);
    }

    fn set_volume(&mut self, voice: u8, volume: u8) {
        self.0.set_volume(voice, volume);
    }

    fn set_master_volume(&mut self, volume: u8) {
        self.0.set_master(volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::NOTE_A;

    #[test]
    fn test_new_bank_is_silent() {
        let bank = VoiceBank::new();
        for voice in 0..NUM_VOICES {
            let state = bank.snapshot(voice);
            assert_eq!(state.packed_note, 0);
            assert_eq!(state.volume, 0);
        }
        assert_eq!(bank.master(), 0);
    }

    #[test]
    fn test_note_write_preserves_wave_and_volume() {
        let bank = VoiceBank::new();
        bank.set_wave(2, Waveform::Triangle, 200);
        bank.set_note(2, 4, NOTE_A);

        let state = bank.snapshot(2);
        assert_eq!(state.packed_note, (4 << 4) | NOTE_A);
        assert_eq!(state.waveform, Waveform::Triangle.id());
        assert_eq!(state.volume, 200);
    }

    #[test]
    fn test_wave_and_volume_publish_together() {
        let bank = VoiceBank::new();
        bank.set_note(0, 3, NOTE_A);
        bank.set_wave(0, Waveform::Noise, 90);

        let state = bank.snapshot(0);
        assert_eq!(state.packed_note, (3 << 4) | NOTE_A);
        assert_eq!(state.waveform, Waveform::Noise.id());
        assert_eq!(state.volume, 90);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_voice_out_of_range_panics() {
        VoiceBank::new().set_volume(8, 1);
    }
}
