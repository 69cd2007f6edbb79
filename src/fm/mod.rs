//! OPL3 FM synthesis backend.
//!
//! Drives a two-operator FM chip through an index/data port pair plus a
//! secondary "high" bank used only for the chip-enable handshake. The
//! chip does not expose voices as a contiguous address range: each voice
//! owns two operator slots looked up in two disjoint address tables, and
//! its frequency/key state lives in the A0/B0 registers addressed by the
//! first slot.
//!
//! ## Register banks (offsets added to an operator/voice slot)
//!
//! | Base | Register | Description |
//! |------|----------|-------------|
//! | 0x20 | TVSM     | Tremolo / vibrato / sustain / multiplier |
//! | 0x40 | KSL      | Key scale / output level |
//! | 0x60 | AD       | Attack / decay |
//! | 0x80 | SR       | Sustain / release |
//! | 0xA0 | FNUM LO  | F-number low byte (per voice) |
//! | 0xB0 | KEY      | Key-on, block, F-number high bits (per voice) |
//! | 0xC0 | FB/SYN   | Feedback / synthesis type (per voice) |
//! | 0xE0 | WAVE     | Waveform select |

pub mod patches;

use crate::bus::{IrqDispatcher, PortBus};
use crate::notes::{Note, Waveform, NOTE_NONE};
use crate::sequencer::VoiceCommands;
use crate::Result;
use patches::{Patch, ELECTRIC_PIANO, SNARE_DRUM};

/// Voices the chip exposes through the slot tables below.
pub const FM_VOICES: usize = 6;

/// First-operator slot for each voice.
const OPERATOR_1_SLOT: [u8; FM_VOICES] = [0, 1, 2, 6, 7, 8];

/// Second-operator slot for each voice.
const OPERATOR_2_SLOT: [u8; FM_VOICES] = [3, 4, 5, 9, 10, 11];

/// Per-semitone F-numbers, aligned index-for-index with
/// [`crate::notes::SEMITONE_HZ`].
const FNUMBERS: [u16; 12] = [
    342, 363, 385, 408, 432, 458, 485, 514, 544, 577, 611, 647,
];

const REG_WAVEFORM_ENABLE: u8 = 0x01;
const REG_TVSM: u8 = 0x20;
const REG_KSL: u8 = 0x40;
const REG_ATTACK_DECAY: u8 = 0x60;
const REG_SUSTAIN_RELEASE: u8 = 0x80;
const REG_FNUM_LO: u8 = 0xA0;
const REG_KEY: u8 = 0xB0;
const REG_FEEDBACK: u8 = 0xC0;
const REG_WAVE_SELECT: u8 = 0xE0;

/// High-bank register enabling OPL3 mode.
const REG_OPL3_ENABLE: u8 = 0x05;

/// Waveform-select enable bit in register 0x01.
const WAVEFORM_ENABLE_BIT: u8 = 0b0010_0000;

/// Key-on bit in the 0xB0 bank.
const KEY_ON: u8 = 0b0010_0000;

/// The FM synthesis backend.
///
/// Instrument assignment must precede the first note on a voice; there
/// are no ordering constraints between voices. The chip has no global
/// attenuator, so the master-volume call is a documented no-op.
pub struct FmSynth<B: PortBus> {
    bus: B,
    base: u16,
    /// Last composed key-register byte per voice, so key-off can clear
    /// the key-on bit without recomputing the F-number.
    key_cache: [u8; FM_VOICES],
}

impl<B: PortBus> FmSynth<B> {
    /// Create a backend over the index/data port pair at `base`.
    pub fn new(bus: B, base: u16) -> Self {
        FmSynth {
            bus,
            base,
            key_cache: [0; FM_VOICES],
        }
    }

    /// Write `value` to primary-bank register `index`.
    fn write_reg(&mut self, index: u8, value: u8) {
        self.bus.write_port(self.base, index);
        self.bus.write_port(self.base + 1, value);
    }

    /// Write `value` to high-bank register `index`.
    fn write_reg_high(&mut self, index: u8, value: u8) {
        self.bus.write_port(self.base + 2, index);
        self.bus.write_port(self.base + 3, value);
    }

    fn check_voice(voice: u8) -> usize {
        assert!(
            (voice as usize) < FM_VOICES,
            "voice {voice} out of range for the FM backend (0..{FM_VOICES})"
        );
        voice as usize
    }

    /// Program both operators of `voice` from `patch`.
    ///
    /// Writes the full operator register set through both slot tables,
    /// the voice's feedback/synthesis register, and clears the voice's
    /// frequency/key registers to zero, a chip-enforced side effect:
    /// changing an instrument silences the voice until the next note.
    pub fn assign_instrument(&mut self, voice: u8, patch: &Patch) {
        let index = Self::check_voice(voice);

        let slot = OPERATOR_1_SLOT[index];
        self.write_reg(REG_TVSM + slot, patch.op1.trem_vib_sus_mul);
        self.write_reg(REG_KSL + slot, patch.op1.key_scale_level);
        self.write_reg(REG_ATTACK_DECAY + slot, patch.op1.attack_decay);
        self.write_reg(REG_SUSTAIN_RELEASE + slot, patch.op1.sustain_release);
        self.write_reg(REG_WAVE_SELECT + slot, patch.op1.waveform);

        let slot2 = OPERATOR_2_SLOT[index];
        self.write_reg(REG_TVSM + slot2, patch.op2.trem_vib_sus_mul);
        self.write_reg(REG_KSL + slot2, patch.op2.key_scale_level);
        self.write_reg(REG_ATTACK_DECAY + slot2, patch.op2.attack_decay);
        self.write_reg(REG_SUSTAIN_RELEASE + slot2, patch.op2.sustain_release);
        self.write_reg(REG_WAVE_SELECT + slot2, patch.op2.waveform);

        self.write_reg(REG_FEEDBACK + voice, patch.feedback_synth);

        self.write_reg(REG_FNUM_LO + slot, 0);
        self.write_reg(REG_KEY + slot, 0);
        self.key_cache[index] = 0;
    }

    /// Key `note` at `octave` on `voice`, or key the voice off when
    /// `note` is [`NOTE_NONE`].
    ///
    /// A key-off is always issued first so a sounding note retriggers
    /// its envelope.
    pub fn set_note(&mut self, voice: u8, octave: u8, note: Note) {
        let index = Self::check_voice(voice);
        assert!(octave < 8, "octave {octave} does not fit the 3-bit block");
        let slot = OPERATOR_1_SLOT[index];

        self.write_reg(REG_KEY + slot, self.key_cache[index] & !KEY_ON);
        if note == NOTE_NONE {
            return;
        }

        let fnum = FNUMBERS[note as usize];
        self.write_reg(REG_FNUM_LO + slot, (fnum & 0xFF) as u8);
        let key = ((fnum >> 8) & 0b11) as u8 | (octave << 2) | KEY_ON;
        self.key_cache[index] = key;
        self.write_reg(REG_KEY + slot, key);
    }

    /// Accepted for interface uniformity; the chip has no global
    /// attenuation register, so this has no observable effect.
    pub fn set_master_volume(&mut self, _volume: u8) {}
}

impl<B: PortBus> VoiceCommands for FmSynth<B> {
    fn set_note(&mut self, voice: u8, octave: u8, note: Note) {
        FmSynth::set_note(self, voice, octave, note);
    }

    /// Selects the patch for the voice's part: [`Waveform::Noise`] maps
    /// to the percussion patch, everything else to the melodic patch.
    /// The volume argument is ignored: per-voice level is part of the
    /// patch's key-scale/output-level bytes.
    fn set_wave(&mut self, voice: u8, wave: Waveform, _volume: u8) {
        let patch = match wave {
            Waveform::Noise => &SNARE_DRUM,
            _ => &ELECTRIC_PIANO,
        };
        self.assign_instrument(voice, patch);
    }

    fn set_volume(&mut self, voice: u8, _volume: u8) {
        Self::check_voice(voice);
    }

    fn set_master_volume(&mut self, volume: u8) {
        FmSynth::set_master_volume(self, volume);
    }
}

impl<B: PortBus> crate::backend::SoundBackend for FmSynth<B> {
    /// One-time chip enable: OPL3 mode on the high bank, then extended
    /// waveform selection on the primary bank. Installs no handler -
    /// musical time on this path comes from the system timer.
    fn initialize(&mut self, _dispatcher: &mut dyn IrqDispatcher) -> Result<()> {
        self.write_reg_high(REG_OPL3_ENABLE, 1);
        self.write_reg(REG_WAVEFORM_ENABLE, WAVEFORM_ENABLE_BIT);
        log::debug!("fm: chip enabled, waveform select on");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoundBackend;
    use crate::notes::NOTE_A;
    use crate::sim::{SimBus, SimDispatcher};

    fn synth() -> (FmSynth<SimBus>, SimBus) {
        let bus = SimBus::new(0x220, 0x388);
        (FmSynth::new(bus.clone(), 0x388), bus)
    }

    #[test]
    fn test_initialize_enables_chip() {
        let (mut fm, bus) = synth();
        fm.initialize(&mut SimDispatcher::new()).unwrap();
        assert_eq!(bus.opl_reg_high(0x05), 1);
        assert_eq!(bus.opl_reg(0x01), WAVEFORM_ENABLE_BIT);
    }

    #[test]
    fn test_assign_instrument_register_image() {
        let (mut fm, bus) = synth();
        fm.assign_instrument(3, &ELECTRIC_PIANO);

        // Voice 3 occupies operator slots 6 and 9.
        assert_eq!(bus.opl_reg(0x26), ELECTRIC_PIANO.op1.trem_vib_sus_mul);
        assert_eq!(bus.opl_reg(0x46), ELECTRIC_PIANO.op1.key_scale_level);
        assert_eq!(bus.opl_reg(0x66), ELECTRIC_PIANO.op1.attack_decay);
        assert_eq!(bus.opl_reg(0x86), ELECTRIC_PIANO.op1.sustain_release);
        assert_eq!(bus.opl_reg(0xE6), ELECTRIC_PIANO.op1.waveform);
        assert_eq!(bus.opl_reg(0x29), ELECTRIC_PIANO.op2.trem_vib_sus_mul);
        assert_eq!(bus.opl_reg(0x49), ELECTRIC_PIANO.op2.key_scale_level);
        assert_eq!(bus.opl_reg(0x69), ELECTRIC_PIANO.op2.attack_decay);
        assert_eq!(bus.opl_reg(0x89), ELECTRIC_PIANO.op2.sustain_release);
        assert_eq!(bus.opl_reg(0xE9), ELECTRIC_PIANO.op2.waveform);
        assert_eq!(bus.opl_reg(0xC3), ELECTRIC_PIANO.feedback_synth);
    }

    #[test]
    fn test_assign_instrument_clears_frequency_registers() {
        let (mut fm, bus) = synth();
        fm.set_note(0, 4, NOTE_A);
        assert_ne!(bus.opl_reg(0xB0), 0);

        fm.assign_instrument(0, &SNARE_DRUM);
        assert_eq!(bus.opl_reg(0xA0), 0);
        assert_eq!(bus.opl_reg(0xB0), 0);
    }

    #[test]
    fn test_set_note_packs_fnum_block_keyon() {
        let (mut fm, bus) = synth();
        fm.set_note(0, 4, NOTE_A);

        // A -> F-number 577 = 0x241.
        assert_eq!(bus.opl_reg(0xA0), 0x41);
        assert_eq!(bus.opl_reg(0xB0), 0b10 | (4 << 2) | KEY_ON);
    }

    #[test]
    fn test_key_off_reuses_cached_byte() {
        let (mut fm, bus) = synth();
        fm.set_note(1, 2, NOTE_A);
        let keyed = bus.opl_reg(0xB1);
        assert_ne!(keyed & KEY_ON, 0);

        fm.set_note(1, 0, NOTE_NONE);
        assert_eq!(bus.opl_reg(0xB1), keyed & !KEY_ON);
        // Key-off must leave the frequency low byte alone.
        assert_eq!(bus.opl_reg(0xA1), (577 & 0xFF) as u8);
    }

    #[test]
    fn test_silence_leaves_operator_registers_untouched() {
        let (mut fm, bus) = synth();
        fm.assign_instrument(2, &ELECTRIC_PIANO);
        fm.set_note(2, 3, NOTE_A);
        fm.set_note(2, 0, NOTE_NONE);

        // Voice 2 operators are slots 2 and 5.
        assert_eq!(bus.opl_reg(0x62), ELECTRIC_PIANO.op1.attack_decay);
        assert_eq!(bus.opl_reg(0x85), ELECTRIC_PIANO.op2.sustain_release);
        assert_eq!(bus.opl_reg(0xC2), ELECTRIC_PIANO.feedback_synth);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_voice_out_of_range_panics() {
        let (mut fm, _bus) = synth();
        fm.set_note(6, 0, NOTE_A);
    }

    #[test]
    fn test_master_volume_is_noop() {
        let (mut fm, bus) = synth();
        let before = bus.write_count();
        fm.set_master_volume(200);
        assert_eq!(bus.write_count(), before);
    }
}
