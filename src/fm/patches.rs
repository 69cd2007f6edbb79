//! Instrument patches: fixed two-operator register images.
//!
//! A patch fully determines both operators' register contents for a
//! voice; assigning one is the only way operator registers ever change
//! (the per-note path only touches the frequency/key registers). The two
//! patches below are process-wide constants: melody, harmony and bass
//! parts share the piano, percussion gets the drum.

/// Register image for one FM operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    /// Attack/decay rates (0x60 bank)
    pub attack_decay: u8,
    /// Sustain level / release rate (0x80 bank)
    pub sustain_release: u8,
    /// Key scale level / output attenuation (0x40 bank)
    pub key_scale_level: u8,
    /// Waveform select (0xE0 bank)
    pub waveform: u8,
    /// Tremolo, vibrato, sustain and frequency multiplier bits (0x20 bank)
    pub trem_vib_sus_mul: u8,
}

/// A complete two-operator instrument definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Patch {
    /// Feedback depth and synthesis-type bits (0xC0 bank)
    pub feedback_synth: u8,
    /// Modulator operator
    pub op1: Operator,
    /// Carrier operator
    pub op2: Operator,
}

/// Melodic instrument used for melody, harmony and bass parts.
pub const ELECTRIC_PIANO: Patch = Patch {
    feedback_synth: 0b0011_0010,
    op1: Operator {
        attack_decay: 0xF1,
        sustain_release: 0xC8,
        key_scale_level: 0b0101_0111,
        waveform: 0,
        trem_vib_sus_mul: 0b0000_0001,
    },
    op2: Operator {
        attack_decay: 0xF1,
        sustain_release: 0xD8,
        key_scale_level: 0b0000_0000,
        waveform: 0,
        trem_vib_sus_mul: 0b0010_0001,
    },
};

/// Percussion instrument.
pub const SNARE_DRUM: Patch = Patch {
    feedback_synth: 0b0011_1110,
    op1: Operator {
        attack_decay: 0xF0,
        sustain_release: 0x00,
        key_scale_level: 0b0000_0000,
        waveform: 2,
        trem_vib_sus_mul: 0b0000_1100,
    },
    op2: Operator {
        attack_decay: 0xF6,
        sustain_release: 0x16,
        key_scale_level: 0b0000_0000,
        waveform: 0,
        trem_vib_sus_mul: 0b0000_0100,
    },
};
