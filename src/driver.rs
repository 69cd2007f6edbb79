//! Backend selection and the FM-path timing glue.
//!
//! Exactly one backend is active per configured system; the choice is
//! made once, here, from [`AudioConfig::backend`]: there is no runtime
//! switching. On the PCM path the playback interrupt owns musical time
//! end to end; on the FM path the system timer's interrupt only counts
//! ticks, and mainline [`pump`](MusicSystem::pump) calls forward the
//! elapsed count to the sequencer.

use crate::bus::{IrqDispatcher, PortBus};
use crate::config::{AudioConfig, BackendKind};
use crate::notes::{Note, Waveform};
use crate::sequencer::{Sequencer, VoiceCommands};
use crate::Result;

#[cfg(feature = "fm")]
use crate::fm::FmSynth;
#[cfg(feature = "fm")]
use crate::timer::PitTimer;

#[cfg(feature = "pcm")]
use crate::pcm::SbMixer;

/// FM build: timer-driven music dispatch.
///
/// The timer handler increments its counter and nothing else; this glue
/// hands the accumulated tick delta to the sequencer from mainline, so
/// the sequencer can catch up in one call after a busy stretch.
#[cfg(feature = "fm")]
pub struct FmMusic<B: PortBus + Clone + Send + 'static> {
    timer: PitTimer<B>,
    synth: FmSynth<B>,
    sequencer: Box<dyn Sequencer>,
    last_ticks: u32,
}

#[cfg(feature = "fm")]
impl<B: PortBus + Clone + Send + 'static> FmMusic<B> {
    /// Program the timer and enable the chip.
    pub fn initialize(&mut self, dispatcher: &mut dyn IrqDispatcher) -> Result<()> {
        self.timer.initialize(dispatcher);
        self.last_ticks = 0;
        crate::backend::SoundBackend::initialize(&mut self.synth, dispatcher)
    }

    /// Forward timer ticks elapsed since the last pump to the sequencer.
    pub fn pump(&mut self) {
        let now = self.timer.ticks();
        let elapsed = now.wrapping_sub(self.last_ticks);
        if elapsed > 0 {
            self.last_ticks = now;
            self.sequencer.tick(elapsed, &mut self.synth);
        }
    }

    /// The underlying synth, for direct instrument programming.
    pub fn synth(&mut self) -> &mut FmSynth<B> {
        &mut self.synth
    }

    /// The system timer owned by this driver.
    pub fn timer(&self) -> &PitTimer<B> {
        &self.timer
    }
}

/// The configured audio system: one backend, selected at build time.
pub enum MusicSystem<B: PortBus + Clone + Send + 'static> {
    /// FM synthesis, timed by the system timer
    #[cfg(feature = "fm")]
    Fm(FmMusic<B>),
    /// PCM mixing, timed by the playback interrupt
    #[cfg(feature = "pcm")]
    Pcm(SbMixer<B>),
}

impl<B: PortBus + Clone + Send + 'static> MusicSystem<B> {
    /// Select and construct the configured backend.
    ///
    /// Validates `config` first; an unvalidatable configuration is fatal
    /// the same way a failed device detection is.
    pub fn new(bus: B, config: &AudioConfig, sequencer: Box<dyn Sequencer>) -> Result<Self> {
        config.validate()?;
        Ok(match config.backend {
            #[cfg(feature = "fm")]
            BackendKind::FmSynth => MusicSystem::Fm(FmMusic {
                timer: PitTimer::new(bus.clone(), config.timer_hz),
                synth: FmSynth::new(bus, config.adlib_base),
                sequencer,
                last_ticks: 0,
            }),
            #[cfg(feature = "pcm")]
            BackendKind::PcmMixer => MusicSystem::Pcm(SbMixer::new(bus, config, sequencer)),
            #[allow(unreachable_patterns)]
            other => {
                return Err(crate::SoundError::Config(format!(
                    "backend {other:?} not compiled into this build"
                )))
            }
        })
    }

    /// Initialize the active backend (and, on the FM path, the timer).
    pub fn initialize(&mut self, dispatcher: &mut dyn IrqDispatcher) -> Result<()> {
        match self {
            #[cfg(feature = "fm")]
            MusicSystem::Fm(fm) => fm.initialize(dispatcher),
            #[cfg(feature = "pcm")]
            MusicSystem::Pcm(pcm) => crate::backend::SoundBackend::initialize(pcm, dispatcher),
        }
    }

    /// Advance mainline-driven timing. A no-op on the PCM path, where
    /// the playback interrupt drives the sequencer directly.
    pub fn pump(&mut self) {
        match self {
            #[cfg(feature = "fm")]
            MusicSystem::Fm(fm) => fm.pump(),
            #[cfg(feature = "pcm")]
            MusicSystem::Pcm(_) => {}
        }
    }
}

impl<B: PortBus + Clone + Send + 'static> VoiceCommands for MusicSystem<B> {
    fn set_note(&mut self, voice: u8, octave: u8, note: Note) {
        match self {
            #[cfg(feature = "fm")]
            MusicSystem::Fm(fm) => fm.synth.set_note(voice, octave, note),
            #[cfg(feature = "pcm")]
            MusicSystem::Pcm(pcm) => VoiceCommands::set_note(pcm, voice, octave, note),
        }
    }

    fn set_wave(&mut self, voice: u8, wave: Waveform, volume: u8) {
        match self {
            #[cfg(feature = "fm")]
            MusicSystem::Fm(fm) => VoiceCommands::set_wave(&mut fm.synth, voice, wave, volume),
            #[cfg(feature = "pcm")]
            MusicSystem::Pcm(pcm) => VoiceCommands::set_wave(pcm, voice, wave, volume),
        }
    }

    fn set_volume(&mut self, voice: u8, volume: u8) {
        match self {
            #[cfg(feature = "fm")]
            MusicSystem::Fm(fm) => VoiceCommands::set_volume(&mut fm.synth, voice, volume),
            #[cfg(feature = "pcm")]
            MusicSystem::Pcm(pcm) => VoiceCommands::set_volume(pcm, voice, volume),
        }
    }

    fn set_master_volume(&mut self, volume: u8) {
        match self {
            #[cfg(feature = "fm")]
            MusicSystem::Fm(fm) => fm.synth.set_master_volume(volume),
            #[cfg(feature = "pcm")]
            MusicSystem::Pcm(pcm) => VoiceCommands::set_master_volume(pcm, volume),
        }
    }
}

#[cfg(all(test, feature = "fm"))]
mod tests {
    use super::*;
    use crate::notes::NOTE_A;
    use crate::sim::{SimBus, SimDispatcher};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct TickRecorder(Arc<AtomicU32>);

    impl Sequencer for TickRecorder {
        fn tick(&mut self, elapsed: u32, sink: &mut dyn VoiceCommands) {
            self.0.fetch_add(elapsed, Ordering::Relaxed);
            sink.set_note(0, 4, NOTE_A);
        }
    }

    fn fm_system() -> (MusicSystem<SimBus>, SimBus, SimDispatcher, Arc<AtomicU32>) {
        let config = AudioConfig {
            backend: BackendKind::FmSynth,
            ..AudioConfig::default()
        };
        let bus = SimBus::new(config.sb_base, config.adlib_base);
        let mut dispatcher = SimDispatcher::new();
        let seen = Arc::new(AtomicU32::new(0));
        let mut system = MusicSystem::new(
            bus.clone(),
            &config,
            Box::new(TickRecorder(Arc::clone(&seen))),
        )
        .unwrap();
        system.initialize(&mut dispatcher).unwrap();
        (system, bus, dispatcher, seen)
    }

    #[test]
    fn test_pump_without_ticks_is_silent() {
        let (mut system, _bus, _dispatcher, seen) = fm_system();
        system.pump();
        assert_eq!(seen.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_pump_forwards_elapsed_ticks() {
        let (mut system, bus, mut dispatcher, seen) = fm_system();
        for _ in 0..5 {
            dispatcher.raise(0);
        }
        system.pump();
        assert_eq!(seen.load(Ordering::Relaxed), 5);
        // The sequencer's note command reached the chip.
        assert_ne!(bus.opl_reg(0xB0), 0);

        // A second pump with no new ticks does nothing further.
        system.pump();
        assert_eq!(seen.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_selection_rejects_invalid_config() {
        let config = AudioConfig {
            irq_line: 9,
            ..AudioConfig::default()
        };
        let bus = SimBus::new(0x220, 0x388);
        struct Idle;
        impl Sequencer for Idle {
            fn tick(&mut self, _elapsed: u32, _sink: &mut dyn VoiceCommands) {}
        }
        assert!(MusicSystem::new(bus, &config, Box::new(Idle)).is_err());
    }
}
