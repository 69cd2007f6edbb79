//! Backend trait abstraction for the two sound paths.
//!
//! Exactly one backend is active per configured system. Both present the
//! same command surface ([`VoiceCommands`]) plus a one-time [`initialize`]
//! that brings the hardware to a playing state; backend-specific calls
//! (`assign_instrument`, `set_waveform`) remain inherent methods on the
//! concrete types.
//!
//! [`initialize`]: SoundBackend::initialize

use crate::bus::IrqDispatcher;
use crate::sequencer::VoiceCommands;
use crate::Result;

/// Common interface for the sound backends.
///
/// Implemented by [`crate::fm::FmSynth`] and [`crate::pcm::SbMixer`]; the
/// configured variant is selected once via [`crate::driver::MusicSystem`].
pub trait SoundBackend: VoiceCommands + Send {
    /// Bring the device to a playing state.
    ///
    /// Performs detection/reset where the hardware requires it, programs
    /// the register base state, and installs any interrupt handler the
    /// backend owns via `dispatcher`. Detection and configuration failures
    /// are fatal to startup: the returned error's display form is the
    /// diagnostic line the process halts with.
    fn initialize(&mut self, dispatcher: &mut dyn IrqDispatcher) -> Result<()>;
}
