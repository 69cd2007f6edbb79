//! Sound Blaster 16 PCM mixer backend.
//!
//! Owns the full lifecycle of the DMA-driven digital audio path: DSP
//! reset and detection, interrupt routing, playback arming, and the
//! real-time synthesis that runs inside the playback interrupt.
//!
//! The playback buffer is double-sized: while the card drains one half
//! over auto-initialized DMA, the interrupt handler synthesizes the
//! other. Nothing guards the boundary in hardware: writing the half
//! being drained corrupts audio, it does not crash. The flip flag
//! and the synthesis state are therefore owned exclusively by the
//! handler.

pub mod dma;
pub mod dsp;
pub mod synth;
pub mod voice;
pub mod waveforms;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::SoundBackend;
use crate::bus::{IrqDispatcher, PortBus, PIC1_COMMAND, PIC2_COMMAND, PIC_EOI};
use crate::config::AudioConfig;
use crate::notes::{Note, Waveform};
use crate::sequencer::{Sequencer, VoiceCommands};
use crate::{Result, SoundError};
use dsp::{Dsp, DspFormat};
use synth::SynthEngine;
use voice::VoiceBank;
use waveforms::{WAVE_LEN, WAVE_SINE};

/// The PCM mixer backend.
///
/// Command calls (`set_note`, `set_waveform`, volumes) publish state the
/// interrupt-context fill routine consumes on its next quantum; none of
/// them touch the hardware. Only [`initialize`](SoundBackend::initialize)
/// programs the card, and once armed, playback runs until process
/// teardown: there is no stop path.
pub struct SbMixer<B: PortBus + Clone + Send + 'static> {
    bus: B,
    base: u16,
    irq_line: u8,
    dma_channel: u8,
    sample_rate: u32,
    dma_buffer_addr: u32,
    dsp: Dsp<B>,
    voices: Arc<VoiceBank>,
    buffer: Arc<Mutex<Vec<i16>>>,
    /// Consumed by `initialize` when the handler is built.
    sequencer: Option<(Box<dyn Sequencer>, crate::sequencer::Tempo)>,
}

impl<B: PortBus + Clone + Send + 'static> SbMixer<B> {
    /// Create a mixer from `config`, owning `sequencer` until the
    /// playback handler is installed.
    pub fn new(bus: B, config: &AudioConfig, sequencer: Box<dyn Sequencer>) -> Self {
        SbMixer {
            dsp: Dsp::new(bus.clone(), config.sb_base),
            bus,
            base: config.sb_base,
            irq_line: config.irq_line,
            dma_channel: config.dma_channel,
            sample_rate: config.sample_rate,
            dma_buffer_addr: config.dma_buffer_addr,
            voices: Arc::new(VoiceBank::new()),
            buffer: Arc::new(Mutex::new(vec![0i16; config.buffer_samples()])),
            sequencer: Some((sequencer, config.tempo)),
        }
    }

    /// Shared handle to the playback buffer (both halves).
    pub fn get_buffer(&self) -> Arc<Mutex<Vec<i16>>> {
        Arc::clone(&self.buffer)
    }

    /// Shared handle to the voice command bank.
    pub fn voices(&self) -> Arc<VoiceBank> {
        Arc::clone(&self.voices)
    }

    /// Store waveform selection and volume for `voice` as a unit.
    pub fn set_waveform(&mut self, voice: u8, wave: Waveform, volume: u8) {
        self.voices.set_wave(voice, wave, volume);
    }

    /// Install the playback handler and verify the mixer routes the
    /// expected interrupt line.
    fn configure(&mut self, dispatcher: &mut dyn IrqDispatcher) -> Result<()> {
        let (sequencer, tempo) = self
            .sequencer
            .take()
            .ok_or_else(|| SoundError::Config("mixer already initialized".into()))?;

        let mut synth = SynthEngine::new(
            Arc::clone(&self.voices),
            sequencer,
            self.sample_rate,
            tempo,
        );
        let buffer = Arc::clone(&self.buffer);
        let mut bus = self.bus.clone();
        let base = self.base;
        let mut flip = false;

        dispatcher.install_handler(
            self.irq_line,
            Box::new(move || {
                flip = !flip;
                {
                    let mut samples = buffer.lock();
                    let half = samples.len() / 2;
                    let start = if flip { 0 } else { half };
                    synth.fill(&mut samples[start..start + half]);
                }
                // Acknowledge at the device, then both controllers.
                let _ = bus.read_port(base + dsp::ACK_16);
                bus.write_port(PIC1_COMMAND, PIC_EOI);
                bus.write_port(PIC2_COMMAND, PIC_EOI);
            }),
        );

        let select = dsp::irq_select_value(self.irq_line).ok_or_else(|| {
            SoundError::Config(format!("IRQ {} is not routable", self.irq_line))
        })?;
        self.bus
            .write_port(self.base + dsp::MIXER, dsp::MIXER_REG_IRQ_SELECT);
        self.bus.write_port(self.base + dsp::MIXER_DATA, select);

        self.bus
            .write_port(self.base + dsp::MIXER, dsp::MIXER_REG_IRQ_SELECT);
        let reported = self.bus.read_port(self.base + dsp::MIXER_DATA);
        let line = dsp::irq_select_line(reported).unwrap_or(reported);
        if line != self.irq_line {
            log::error!("dsp: mixer reports IRQ {line}, expected {}", self.irq_line);
            return Err(SoundError::IrqMismatch { actual: line });
        }

        self.dsp.mark_ready();
        Ok(())
    }

    /// Seed the first wavetable-length quantum of the buffer so the
    /// first DMA pass plays a defined waveform rather than whatever the
    /// memory held.
    fn preload_buffer(&self) {
        let mut samples = self.buffer.lock();
        for (slot, &value) in samples.iter_mut().zip(WAVE_SINE.iter()) {
            *slot = value as i16 * 128;
        }
        debug_assert!(samples.len() >= WAVE_LEN);
    }
}

impl<B: PortBus + Clone + Send + 'static> VoiceCommands for SbMixer<B> {
    fn set_note(&mut self, voice: u8, octave: u8, note: Note) {
        self.voices.set_note(voice, octave, note);
    }

    fn set_wave(&mut self, voice: u8, wave: Waveform, volume: u8) {
        self.voices.set_wave(voice, wave, volume);
    }

    fn set_volume(&mut self, voice: u8, volume: u8) {
        self.voices.set_volume(voice, volume);
    }

    fn set_master_volume(&mut self, volume: u8) {
        self.voices.set_master(volume);
    }
}

impl<B: PortBus + Clone + Send + 'static> SoundBackend for SbMixer<B> {
    /// Reset the DSP, verify interrupt routing, program auto-init DMA
    /// over the whole buffer, set the sample rate and start 16-bit
    /// signed mono auto-init playback.
    fn initialize(&mut self, dispatcher: &mut dyn IrqDispatcher) -> Result<()> {
        self.dsp.reset()?;
        self.configure(dispatcher)?;

        let buffer_samples = self.buffer.lock().len() as u32;
        dma::program_auto_init(
            &mut self.bus,
            self.dma_channel,
            self.dma_buffer_addr,
            buffer_samples,
        );

        self.dsp.set_sample_rate(self.sample_rate as u16);

        self.voices.reset();
        self.preload_buffer();

        let sample_count = (buffer_samples / 2 - 1) as u16;
        self.dsp
            .write(dsp::CMD_PROGRAM_16 | dsp::CMD_MODE_AUTO_INIT | dsp::CMD_MODE_PLAY);
        self.dsp.write(DspFormat::SIGNED.bits());
        self.dsp.write((sample_count & 0xFF) as u8);
        self.dsp.write((sample_count >> 8) as u8);

        self.dsp.write(dsp::CMD_SPEAKER_ON);
        self.dsp.write(dsp::CMD_CONTINUE_16);

        log::info!(
            "pcm: armed {} samples at {} Hz on IRQ {} / DMA {}",
            buffer_samples,
            self.sample_rate,
            self.irq_line,
            self.dma_channel
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{NOTE_A, NOTE_NONE};
    use crate::sim::{SimBus, SimDispatcher};

    struct IdleSequencer;

    impl Sequencer for IdleSequencer {
        fn tick(&mut self, _elapsed: u32, _sink: &mut dyn VoiceCommands) {}
    }

    fn armed_mixer() -> (SbMixer<SimBus>, SimBus, SimDispatcher) {
        let config = AudioConfig::default();
        let bus = SimBus::new(config.sb_base, config.adlib_base);
        let mut dispatcher = SimDispatcher::new();
        let mut mixer = SbMixer::new(bus.clone(), &config, Box::new(IdleSequencer));
        mixer.initialize(&mut dispatcher).unwrap();
        (mixer, bus, dispatcher)
    }

    #[test]
    fn test_initialize_issues_play_command_block() {
        let (_mixer, bus, _dispatcher) = armed_mixer();
        let commands = bus.dsp_commands();

        // Rate programming (hi, lo), the auto-init play block with its
        // half-buffer sample count minus one (550 = 0x0226), then the
        // speaker-on / continue-16 go pair.
        assert!(
            commands.ends_with(&[0x41, 0x56, 0x22, 0xB6, 0x10, 0x26, 0x02, 0xD1, 0xD6]),
            "unexpected command stream {commands:02x?}"
        );
    }

    #[test]
    fn test_initialize_preloads_sine_quantum() {
        let (mixer, _bus, _dispatcher) = armed_mixer();
        let buffer = mixer.get_buffer();
        let samples = buffer.lock();
        assert_eq!(samples[64], 127 * 128);
        assert_eq!(samples[192], -127 * 128);
    }

    #[test]
    fn test_irq_mismatch_is_fatal() {
        let config = AudioConfig::default();
        let bus = SimBus::new(config.sb_base, config.adlib_base);
        bus.set_irq_report(Some(0x4)); // card claims IRQ 7
        let mut mixer = SbMixer::new(bus, &config, Box::new(IdleSequencer));
        let err = mixer.initialize(&mut SimDispatcher::new()).unwrap_err();
        assert!(matches!(err, SoundError::IrqMismatch { actual: 7 }));
        assert_eq!(err.to_string(), "SB16 HAS INCORRECT IRQ: 7");
    }

    #[test]
    fn test_reset_failure_propagates() {
        let config = AudioConfig::default();
        let bus = SimBus::new(config.sb_base, config.adlib_base);
        bus.set_dsp_ack(Some(0x13));
        let mut mixer = SbMixer::new(bus, &config, Box::new(IdleSequencer));
        let err = mixer.initialize(&mut SimDispatcher::new()).unwrap_err();
        assert!(matches!(err, SoundError::ResetFailed { reason: 1, .. }));
    }

    #[test]
    fn test_handler_fills_alternating_halves() {
        let (mut mixer, _bus, mut dispatcher) = armed_mixer();
        mixer.set_wave(0, Waveform::Square, 255);
        mixer.set_master_volume(255);
        mixer.set_note(0, 4, NOTE_A);

        let buffer = mixer.get_buffer();
        let half = buffer.lock().len() / 2;

        dispatcher.raise(5);
        let first: Vec<i16> = buffer.lock()[..half].to_vec();
        assert!(first.iter().any(|&s| s != 0), "first half untouched");

        dispatcher.raise(5);
        let second: Vec<i16> = buffer.lock()[half..].to_vec();
        assert!(second.iter().any(|&s| s != 0), "second half untouched");
    }

    #[test]
    fn test_handler_acknowledges_device_and_controllers() {
        let (_mixer, bus, mut dispatcher) = armed_mixer();
        let before = bus.ack16_reads();
        dispatcher.raise(5);
        assert_eq!(bus.ack16_reads(), before + 1);
        assert!(bus.port_writes(PIC1_COMMAND).contains(&PIC_EOI));
        assert!(bus.port_writes(PIC2_COMMAND).contains(&PIC_EOI));
    }

    #[test]
    fn test_commands_have_no_hardware_effect() {
        let (mut mixer, bus, _dispatcher) = armed_mixer();
        let before = bus.write_count();
        mixer.set_note(0, 4, NOTE_A);
        mixer.set_waveform(1, Waveform::Noise, 80);
        mixer.set_volume(2, 10);
        mixer.set_master_volume(100);
        mixer.set_note(0, 0, NOTE_NONE);
        assert_eq!(bus.write_count(), before);
    }

    #[test]
    fn test_second_initialize_rejected() {
        let (mut mixer, _bus, mut dispatcher) = armed_mixer();
        assert!(matches!(
            mixer.initialize(&mut dispatcher),
            Err(SoundError::Config(_))
        ));
    }
}
