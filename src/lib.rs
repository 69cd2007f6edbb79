//! Interrupt-driven music synthesis core for ISA sound hardware.
//!
//! Drives one of two mutually exclusive sound devices from a fixed-rate
//! hardware timer or the device's own playback interrupt, producing music
//! in real time inside interrupt context:
//!
//! - an OPL3 FM synthesis chip, programmed register by register with
//!   two-operator instrument patches ([`fm`])
//! - a Sound Blaster 16, playing a double-buffered stream of samples
//!   synthesized per interrupt with fixed-point wavetable voices ([`pcm`])
//!
//! # Features
//! - Eight-voice command surface shared by both backends
//! - Bounded-retry DSP reset handshake with diagnostic failure codes
//! - 24.8 fixed-point phase accumulation over signed-8-bit wavetables
//! - PIT-based system timer with nearest-divisor rate selection
//! - Simulated bus ([`sim`]) so everything above runs on a host
//!
//! # Crate feature flags
//! - `fm` (default): OPL3 FM synthesis backend
//! - `pcm` (default): Sound Blaster 16 PCM mixer backend
//! - `export-wav` (opt-in): WAV rendering via `hound`
//!
//! # Quick start
//! ```
//! use isa_sound::driver::MusicSystem;
//! use isa_sound::sequencer::{Sequencer, VoiceCommands};
//! use isa_sound::sim::{SimBus, SimDispatcher};
//! use isa_sound::{notes, AudioConfig};
//!
//! struct OneNote;
//!
//! impl Sequencer for OneNote {
//!     fn tick(&mut self, _elapsed: u32, sink: &mut dyn VoiceCommands) {
//!         sink.set_master_volume(255);
//!         sink.set_wave(0, notes::Waveform::Sine, 255);
//!         sink.set_note(0, 4, notes::NOTE_A);
//!     }
//! }
//!
//! let config = AudioConfig::default();
//! let bus = SimBus::new(config.sb_base, config.adlib_base);
//! let mut dispatcher = SimDispatcher::new();
//! let mut system = MusicSystem::new(bus, &config, Box::new(OneNote)).unwrap();
//! system.initialize(&mut dispatcher).unwrap();
//! // Each playback interrupt now synthesizes half a buffer:
//! dispatcher.raise(config.irq_line);
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod bus;
pub mod config;
#[cfg(any(feature = "fm", feature = "pcm"))]
pub mod driver;
pub mod notes;
pub mod sequencer;
pub mod sim;
pub mod timer;

#[cfg(feature = "fm")]
pub mod fm;
#[cfg(feature = "pcm")]
pub mod pcm;

#[cfg(feature = "export-wav")]
pub mod export;

pub use backend::SoundBackend;
pub use config::{AudioConfig, BackendKind};
pub use notes::{Note, Waveform, NUM_VOICES};
pub use sequencer::{Sequencer, Tempo, VoiceCommands};

/// Error type for audio subsystem operations.
///
/// The hardware-detection variants are fatal to process startup: the
/// display form of each is the single human-readable diagnostic line the
/// process halts with.
#[derive(thiserror::Error, Debug)]
pub enum SoundError {
    /// DSP reset handshake failed: acknowledgement absent/wrong
    /// (reason 1) or version below the supported minimum (reason 3),
    /// with the observed byte as diagnostic.
    #[error("FAILED TO RESET SB16: {reason}/{diagnostic}")]
    ResetFailed {
        /// Numeric failure reason code
        reason: u8,
        /// Raw status or packed version byte observed
        diagnostic: u8,
    },

    /// The mixer reports a different playback interrupt line than the
    /// one configured.
    #[error("SB16 HAS INCORRECT IRQ: {actual}")]
    IrqMismatch {
        /// Line (or raw select value, if undecodable) the card reported
        actual: u8,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Audio file write error
    #[cfg(feature = "export-wav")]
    #[error("Audio file write error: {0}")]
    Export(String),
}

/// Result type for audio subsystem operations.
pub type Result<T> = std::result::Result<T, SoundError>;
