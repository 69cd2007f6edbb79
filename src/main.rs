//! Offline renderer: runs the PCM mixer against the simulated bus and
//! writes the synthesized stream to a WAV file.
//!
//! Usage: `isa-render [OUTPUT.wav] [CONFIG.json] [SECONDS]`
//!
//! The built-in demo sequencer plays a short three-part loop (bass,
//! melody, snare) through exactly the same driver path a machine build
//! would use; only the bus and interrupt dispatch are simulated.

use std::env;
use std::fs;

use anyhow::{Context, Result};

use isa_sound::driver::MusicSystem;
use isa_sound::export::write_wav;
use isa_sound::notes::{
    Waveform, NOTE_A, NOTE_AS, NOTE_B, NOTE_E, NOTE_FS, NOTE_GS, NOTE_NONE,
};
use isa_sound::sequencer::{Sequencer, VoiceCommands};
use isa_sound::sim::{SimBus, SimDispatcher};
use isa_sound::{AudioConfig, BackendKind};

/// Three-part demo loop: one bar of bass eighths, a melody arpeggio and
/// a snare on the off-beats.
struct DemoSequencer {
    tick: u32,
}

impl DemoSequencer {
    fn new() -> Self {
        DemoSequencer { tick: 0 }
    }
}

impl Sequencer for DemoSequencer {
    fn tick(&mut self, elapsed: u32, sink: &mut dyn VoiceCommands) {
        for _ in 0..elapsed {
            if self.tick == 0 {
                sink.set_master_volume(255);
                sink.set_wave(0, Waveform::Triangle, 180);
                sink.set_wave(1, Waveform::Sine, 220);
                sink.set_wave(2, Waveform::Noise, 110);
            }

            let beat = self.tick / 16;
            let sub = self.tick % 16;

            if sub % 8 == 0 {
                let bass = [NOTE_A, NOTE_E, NOTE_FS, NOTE_E][(beat % 4) as usize];
                sink.set_note(0, 2, bass);
            }

            if sub % 4 == 0 {
                let melody = [
                    NOTE_A, NOTE_B, NOTE_GS, NOTE_E, NOTE_FS, NOTE_AS, NOTE_B, NOTE_GS,
                ][((beat * 4 + sub / 4) % 8) as usize];
                sink.set_note(1, 4, melody);
            }

            if sub == 8 {
                sink.set_note(2, 4, NOTE_A);
            } else if sub == 12 {
                sink.set_note(2, 0, NOTE_NONE);
            }

            self.tick = self.tick.wrapping_add(1);
        }
    }
}

fn load_config(path: Option<&str>) -> Result<AudioConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {path}"))?
        }
        None => AudioConfig::default(),
    };
    // This tool always renders the digital path.
    config.backend = BackendKind::PcmMixer;
    config.validate().context("validating config")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let output = args.get(1).map(String::as_str).unwrap_or("render.wav");
    let config = load_config(args.get(2).map(String::as_str))?;
    let seconds: f64 = args
        .get(3)
        .map(|s| s.parse().context("parsing SECONDS"))
        .transpose()?
        .unwrap_or(8.0);

    let bus = SimBus::new(config.sb_base, config.adlib_base);
    let mut dispatcher = SimDispatcher::new();
    let mut system = MusicSystem::new(bus, &config, Box::new(DemoSequencer::new()))
        .context("selecting backend")?;
    system
        .initialize(&mut dispatcher)
        .context("arming playback")?;

    let buffer = match &system {
        MusicSystem::Pcm(mixer) => mixer.get_buffer(),
        #[allow(unreachable_patterns)]
        _ => unreachable!("render tool forces the PCM backend"),
    };

    let half = buffer.lock().len() / 2;
    let total_samples = (config.sample_rate as f64 * seconds) as usize;
    let passes = total_samples.div_ceil(half);

    println!(
        "Rendering {passes} half-buffers ({:.1}s at {} Hz)...",
        seconds, config.sample_rate
    );

    let mut rendered = Vec::with_capacity(passes * half);
    let mut front = true;
    for _ in 0..passes {
        // Each raised interrupt synthesizes the half the card is not
        // draining; collect halves in playback order.
        dispatcher.raise(config.irq_line);
        let samples = buffer.lock();
        let start = if front { 0 } else { half };
        rendered.extend_from_slice(&samples[start..start + half]);
        front = !front;
    }
    rendered.truncate(total_samples);

    write_wav(output, config.sample_rate, &rendered).context("writing WAV")?;
    println!("Wrote {} samples to {output}", rendered.len());
    Ok(())
}
