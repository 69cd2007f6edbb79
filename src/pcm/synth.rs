//! Interrupt-context sample synthesis.
//!
//! [`SynthEngine::fill`] produces one half-buffer per call, entirely
//! inside the playback interrupt's time budget: per-sample it advances
//! the sequencer clock, walks all eight voices with 24.8 fixed-point
//! phase accumulation, and mixes them under per-voice and master volume.
//!
//! All amplitude math is integer, with volumes as 0-255 fractions of
//! full scale (divide by 256, trading exact unity gain for shifts).
//! There is no clipping stage: summing many voices at high volume wraps
//! through the sample width, an accepted limitation of the format.

use std::sync::Arc;

use crate::notes::{note_scaled_freq, unpack_note, Waveform, NOTE_NONE, NUM_VOICES};
use crate::pcm::voice::{VoiceBank, VoiceHandle};
use crate::pcm::waveforms::{table_for, NoiseLfsr, PHASE_FRAC_BITS, WAVE_LEN_FIX};
use crate::sequencer::{Sequencer, Tempo};

/// The half-buffer synthesis engine.
///
/// Owned exclusively by the playback interrupt handler; the phase
/// accumulators and tick countdown in here are never touched by
/// mainline code.
pub struct SynthEngine {
    voices: Arc<VoiceBank>,
    commands: VoiceHandle,
    sequencer: Box<dyn Sequencer>,
    noise: NoiseLfsr,
    /// 24.8 fixed-point wavetable positions, one per voice.
    phases: [i32; NUM_VOICES],
    sample_rate: i32,
    samples_per_tick: u32,
    tick_countdown: u32,
}

impl SynthEngine {
    /// Create an engine over the shared voice bank.
    pub fn new(
        voices: Arc<VoiceBank>,
        sequencer: Box<dyn Sequencer>,
        sample_rate: u32,
        tempo: Tempo,
    ) -> Self {
        let samples_per_tick = tempo.samples_per_tick(sample_rate);
        SynthEngine {
            commands: VoiceHandle(Arc::clone(&voices)),
            voices,
            sequencer,
            noise: NoiseLfsr::new(),
            phases: [0; NUM_VOICES],
            sample_rate: sample_rate as i32,
            samples_per_tick,
            tick_countdown: samples_per_tick,
        }
    }

    /// Samples between sequencer ticks.
    pub fn samples_per_tick(&self) -> u32 {
        self.samples_per_tick
    }

    /// Synthesize `out.len()` samples.
    ///
    /// Every `samples_per_tick` samples the sequencer's tick callback
    /// runs once, synchronously, with the voice bank as its command
    /// sink. Silent voices hold their phase at zero and contribute
    /// nothing.
    pub fn fill(&mut self, out: &mut [i16]) {
        for slot in out.iter_mut() {
            self.tick_countdown -= 1;
            if self.tick_countdown == 0 {
                self.tick_countdown = self.samples_per_tick;
                self.sequencer.tick(1, &mut self.commands);
            }

            let mut mix: i32 = 0;
            for voice in 0..NUM_VOICES {
                let state = self.voices.snapshot(voice);
                let (octave, note) = unpack_note(state.packed_note);
                if note == NOTE_NONE {
                    self.phases[voice] = 0;
                    continue;
                }

                let increment =
                    note_scaled_freq(octave, note) * (1 << PHASE_FRAC_BITS) / self.sample_rate;
                self.phases[voice] = (self.phases[voice] + increment) % WAVE_LEN_FIX;

                let wave = Waveform::from_id(state.waveform).unwrap_or(Waveform::Sine);
                let value = match table_for(wave) {
                    Some(table) => table[(self.phases[voice] >> PHASE_FRAC_BITS) as usize] as i32,
                    None => self.noise.next_byte() as i32,
                };
                mix += value * 128 * state.volume as i32 / 256;
            }

            *slot = (mix * self.voices.master() as i32 / 256) as i16;
        }
    }
}
