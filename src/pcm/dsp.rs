//! Sound Blaster 16 DSP protocol.
//!
//! Covers the reset handshake that brings the DSP into a known state, the
//! version gate, command submission, and the mixer's interrupt routing
//! register. The handshake is a small state machine:
//!
//! ```text
//! Unreset -> ResetPulsed -> AwaitingAck -> VersionChecked -> Ready
//!                                |               |
//!                                v               v
//!                      Failed(reason=1)   Failed(reason=3)
//! ```
//!
//! Failures are fatal to startup; the error's display form is the
//! diagnostic line the process halts with.
//!
//! ## Port map (offsets from the card base)
//!
//! | Offset | Register | Description |
//! |--------|----------|-------------|
//! | 0x4    | MIXER    | Mixer register index |
//! | 0x5    | MIXER DATA | Mixer register data |
//! | 0x6    | RESET    | DSP reset line |
//! | 0xA    | READ     | DSP read data |
//! | 0xC    | WRITE    | DSP write data / write status |
//! | 0xE    | READ STATUS | Data-available flag (bit 7) / 8-bit ack |
//! | 0xF    | ACK 16   | 16-bit transfer interrupt ack |

use bitflags::bitflags;

use crate::bus::PortBus;
use crate::{Result, SoundError};

/// Mixer register index port offset.
pub const MIXER: u16 = 0x4;
/// Mixer register data port offset.
pub const MIXER_DATA: u16 = 0x5;
/// DSP reset port offset.
pub const RESET: u16 = 0x6;
/// DSP read-data port offset.
pub const READ: u16 = 0xA;
/// DSP write-data/status port offset.
pub const WRITE: u16 = 0xC;
/// DSP read-status port offset (bit 7 = data available).
pub const READ_STATUS: u16 = 0xE;
/// 16-bit transfer interrupt acknowledge port offset.
pub const ACK_16: u16 = 0xF;

/// Set the output sample rate (hi byte, lo byte follow).
pub const CMD_SET_OUTPUT_RATE: u8 = 0x41;
/// Turn the speaker output on.
pub const CMD_SPEAKER_ON: u8 = 0xD1;
/// Continue 16-bit auto-init DMA.
pub const CMD_CONTINUE_16: u8 = 0xD6;
/// Query DSP version (major, minor follow on the read port).
pub const CMD_VERSION: u8 = 0xE1;

/// Base of the 16-bit program-transfer command block.
pub const CMD_PROGRAM_16: u8 = 0xB0;
/// Auto-initialize mode bit of the program-transfer command.
pub const CMD_MODE_AUTO_INIT: u8 = 0x06;
/// Playback direction bit pattern (record would set 0x08).
pub const CMD_MODE_PLAY: u8 = 0x00;

/// Mixer register selecting the playback interrupt line.
pub const MIXER_REG_IRQ_SELECT: u8 = 0x80;

/// Byte the DSP posts on the read port after a successful reset.
pub const RESET_ACK: u8 = 0xAA;

/// Lowest DSP major version with 16-bit auto-init support.
pub const MIN_DSP_MAJOR: u8 = 4;

/// Failure reason: acknowledgement absent or wrong during detection.
pub const FAIL_DETECT: u8 = 1;
/// Failure reason: DSP version below the supported minimum.
pub const FAIL_VERSION: u8 = 3;

/// Iteration ceiling for the detection poll.
///
/// This is a bounded busy poll, not a wall-clock timeout: the bound is
/// calibration-sensitive and must be re-tuned if execution speed changes
/// drastically. Override per instance with [`Dsp::with_limits`].
pub const DETECT_POLL_LIMIT: usize = 1_000_000;

/// Spin iterations holding the reset line high before releasing it.
pub const RESET_SETTLE_SPINS: usize = 1_000_000;

bitflags! {
    /// Sample format byte following the program-transfer command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DspFormat: u8 {
        /// Signed samples (unsigned when clear)
        const SIGNED = 0x10;
        /// Stereo (mono when clear)
        const STEREO = 0x20;
    }
}

/// Reset handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPhase {
    /// No reset attempted yet
    Unreset,
    /// Reset line pulsed, acknowledgement not yet polled
    ResetPulsed,
    /// Polling for the acknowledgement byte
    AwaitingAck,
    /// Acknowledged and version accepted
    VersionChecked,
    /// Mixer/IRQ configuration verified; device usable
    Ready,
}

/// DSP access over the card's port window.
pub struct Dsp<B: PortBus> {
    bus: B,
    base: u16,
    phase: ResetPhase,
    poll_limit: usize,
    settle_spins: usize,
}

impl<B: PortBus> Dsp<B> {
    /// Create a DSP handle at `base` with the default poll bounds.
    pub fn new(bus: B, base: u16) -> Self {
        Self::with_limits(bus, base, DETECT_POLL_LIMIT, RESET_SETTLE_SPINS)
    }

    /// Create a DSP handle with explicit detection/settle bounds.
    pub fn with_limits(bus: B, base: u16, poll_limit: usize, settle_spins: usize) -> Self {
        Dsp {
            bus,
            base,
            phase: ResetPhase::Unreset,
            poll_limit,
            settle_spins,
        }
    }

    /// Current handshake phase.
    pub fn phase(&self) -> ResetPhase {
        self.phase
    }

    /// Mark mixer/IRQ configuration verified.
    pub fn mark_ready(&mut self) {
        self.phase = ResetPhase::Ready;
    }

    /// Wait (bounded) for the DSP to accept a byte, then write it.
    pub fn write(&mut self, value: u8) {
        for _ in 0..self.poll_limit {
            if self.bus.read_port(self.base + WRITE) & 0x80 == 0 {
                break;
            }
            std::hint::spin_loop();
        }
        self.bus.write_port(self.base + WRITE, value);
    }

    /// Wait (bounded) for data, then read it. Returns 0 if the DSP never
    /// posts anything: hardware is assumed to succeed or hang, not fail.
    pub fn read(&mut self) -> u8 {
        for _ in 0..self.poll_limit {
            if self.bus.read_port(self.base + READ_STATUS) & 0x80 != 0 {
                return self.bus.read_port(self.base + READ);
            }
            std::hint::spin_loop();
        }
        0
    }

    /// Poll for the reset acknowledgement within the iteration bound.
    fn detect_ack(&mut self) -> Option<u8> {
        for _ in 0..self.poll_limit {
            if self.bus.read_port(self.base + READ_STATUS) & 0x80 != 0 {
                return Some(self.bus.read_port(self.base + READ));
            }
            std::hint::spin_loop();
        }
        None
    }

    /// Run the reset handshake through the version gate.
    ///
    /// On success the phase is left at [`ResetPhase::VersionChecked`] and
    /// the DSP version is returned; the caller completes the state
    /// machine by verifying interrupt routing and calling
    /// [`mark_ready`](Dsp::mark_ready).
    pub fn reset(&mut self) -> Result<(u8, u8)> {
        self.bus.write_port(self.base + RESET, 1);
        for _ in 0..self.settle_spins {
            std::hint::spin_loop();
        }
        self.bus.write_port(self.base + RESET, 0);
        self.phase = ResetPhase::ResetPulsed;

        self.phase = ResetPhase::AwaitingAck;
        let status = self.detect_ack().unwrap_or(0);
        if status != RESET_ACK {
            log::error!("dsp: no reset acknowledgement (observed {status:#04x})");
            return Err(SoundError::ResetFailed {
                reason: FAIL_DETECT,
                diagnostic: status,
            });
        }

        self.bus.write_port(self.base + WRITE, CMD_VERSION);
        let major = self.read();
        let minor = self.read();
        if major < MIN_DSP_MAJOR {
            log::error!("dsp: unsupported version {major}.{minor}");
            return Err(SoundError::ResetFailed {
                reason: FAIL_VERSION,
                diagnostic: (major << 4) | minor,
            });
        }

        self.phase = ResetPhase::VersionChecked;
        log::info!("dsp: version {major}.{minor}");
        Ok((major, minor))
    }

    /// Program the output sample rate.
    pub fn set_sample_rate(&mut self, hz: u16) {
        self.write(CMD_SET_OUTPUT_RATE);
        self.write((hz >> 8) as u8);
        self.write((hz & 0xFF) as u8);
    }
}

/// Mixer IRQ-select value for an interrupt line, if routable.
pub fn irq_select_value(line: u8) -> Option<u8> {
    match line {
        2 => Some(0x1),
        5 => Some(0x2),
        7 => Some(0x4),
        10 => Some(0x8),
        _ => None,
    }
}

/// Decode a mixer IRQ-select register value back to a line number.
pub fn irq_select_line(value: u8) -> Option<u8> {
    match value {
        0x1 => Some(2),
        0x2 => Some(5),
        0x4 => Some(7),
        0x8 => Some(10),
        _ => None,
    }
}
