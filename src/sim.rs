//! Simulated hardware for host-side tests and offline rendering.
//!
//! [`SimBus`] models just enough of the port-mapped devices this crate
//! drives to let the drivers run unmodified: the OPL3 register file,
//! the DSP handshake, command port and IRQ-select mixer register (with
//! the `pcm` feature), plus raw write capture of everything else.
//! [`SimDispatcher`] stands in for the system's interrupt dispatch;
//! tests fire lines by hand with [`SimDispatcher::raise`].
//!
//! Failure injection for the reset handshake:
//! - [`SimBus::set_dsp_ack`]: wrong byte, or `None` for a silent card
//! - [`SimBus::set_dsp_version`]: downlevel DSP
//! - [`SimBus::set_irq_report`]: mixer claiming a different line

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::{IrqDispatcher, IrqHandler, PortBus};

#[cfg(feature = "pcm")]
use crate::pcm::dsp;
#[cfg(feature = "pcm")]
use std::collections::VecDeque;

/// DSP/mixer model behind the card's port window.
#[cfg(feature = "pcm")]
struct DspSim {
    base: u16,
    ack: Option<u8>,
    version: (u8, u8),
    reset_line: u8,
    read_queue: VecDeque<u8>,
    commands: Vec<u8>,
    ack16_reads: usize,
    mixer_index: u8,
    mixer_regs: [u8; 256],
    irq_report: Option<u8>,
}

#[cfg(feature = "pcm")]
impl DspSim {
    fn new(base: u16) -> Self {
        DspSim {
            base,
            ack: Some(dsp::RESET_ACK),
            version: (4, 5),
            reset_line: 0,
            read_queue: VecDeque::new(),
            commands: Vec::new(),
            ack16_reads: 0,
            mixer_index: 0,
            mixer_regs: [0; 256],
            irq_report: None,
        }
    }

    fn read(&mut self, port: u16) -> Option<u8> {
        match port.checked_sub(self.base)? {
            dsp::READ_STATUS => Some(if self.read_queue.is_empty() { 0 } else { 0x80 }),
            dsp::READ => Some(self.read_queue.pop_front().unwrap_or(0)),
            dsp::WRITE => Some(0), // always ready for a command
            dsp::ACK_16 => {
                self.ack16_reads += 1;
                Some(0)
            }
            dsp::MIXER_DATA => {
                if self.mixer_index == dsp::MIXER_REG_IRQ_SELECT {
                    if let Some(report) = self.irq_report {
                        return Some(report);
                    }
                }
                Some(self.mixer_regs[self.mixer_index as usize])
            }
            _ => None,
        }
    }

    fn write(&mut self, port: u16, value: u8) {
        let Some(offset) = port.checked_sub(self.base) else {
            return;
        };
        match offset {
            dsp::RESET => {
                // Falling edge completes the pulse and posts the ack.
                if self.reset_line == 1 && value == 0 {
                    if let Some(ack) = self.ack {
                        self.read_queue.push_back(ack);
                    }
                }
                self.reset_line = value;
            }
            dsp::WRITE => {
                self.commands.push(value);
                if value == dsp::CMD_VERSION {
                    let (major, minor) = self.version;
                    self.read_queue.push_back(major);
                    self.read_queue.push_back(minor);
                }
            }
            dsp::MIXER => self.mixer_index = value,
            dsp::MIXER_DATA => self.mixer_regs[self.mixer_index as usize] = value,
            _ => {}
        }
    }
}

struct SimState {
    adlib_base: u16,

    // OPL3: latched index per bank plus the register files.
    opl_index: u8,
    opl_index_high: u8,
    opl_regs: [u8; 256],
    opl_regs_high: [u8; 256],

    #[cfg(feature = "pcm")]
    dsp: DspSim,

    // Raw write capture for everything (DMA, PIC, PIT, ...).
    writes: Vec<(u16, u8)>,
}

/// Cloneable simulated port bus; clones share one device state.
#[derive(Clone)]
pub struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl SimBus {
    /// Create a bus with a healthy card at `sb_base` and a chip at
    /// `adlib_base`.
    pub fn new(sb_base: u16, adlib_base: u16) -> Self {
        #[cfg(not(feature = "pcm"))]
        let _ = sb_base;
        SimBus {
            state: Arc::new(Mutex::new(SimState {
                adlib_base,
                opl_index: 0,
                opl_index_high: 0,
                opl_regs: [0; 256],
                opl_regs_high: [0; 256],
                #[cfg(feature = "pcm")]
                dsp: DspSim::new(sb_base),
                writes: Vec::new(),
            })),
        }
    }

    /// Script the reset acknowledgement: a wrong byte, or `None` for a
    /// card that never answers.
    #[cfg(feature = "pcm")]
    pub fn set_dsp_ack(&self, ack: Option<u8>) {
        self.state.lock().dsp.ack = ack;
    }

    /// Script the DSP version response.
    #[cfg(feature = "pcm")]
    pub fn set_dsp_version(&self, major: u8, minor: u8) {
        self.state.lock().dsp.version = (major, minor);
    }

    /// Script the IRQ-select readback to a value other than what the
    /// driver programmed.
    #[cfg(feature = "pcm")]
    pub fn set_irq_report(&self, value: Option<u8>) {
        self.state.lock().dsp.irq_report = value;
    }

    /// Primary-bank OPL register value.
    pub fn opl_reg(&self, index: u8) -> u8 {
        self.state.lock().opl_regs[index as usize]
    }

    /// High-bank OPL register value.
    pub fn opl_reg_high(&self, index: u8) -> u8 {
        self.state.lock().opl_regs_high[index as usize]
    }

    /// Every byte written to the DSP command port, in order.
    #[cfg(feature = "pcm")]
    pub fn dsp_commands(&self) -> Vec<u8> {
        self.state.lock().dsp.commands.clone()
    }

    /// Mixer register value.
    #[cfg(feature = "pcm")]
    pub fn mixer_reg(&self, index: u8) -> u8 {
        self.state.lock().dsp.mixer_regs[index as usize]
    }

    /// Number of reads of the 16-bit interrupt-ack port.
    #[cfg(feature = "pcm")]
    pub fn ack16_reads(&self) -> usize {
        self.state.lock().dsp.ack16_reads
    }

    /// All values written to `port`, in order.
    pub fn port_writes(&self, port: u16) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(p, _)| *p == port)
            .map(|&(_, v)| v)
            .collect()
    }

    /// Total number of port writes seen.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes.len()
    }
}

impl PortBus for SimBus {
    fn read_port(&mut self, port: u16) -> u8 {
        #[cfg(feature = "pcm")]
        if let Some(value) = self.state.lock().dsp.read(port) {
            return value;
        }
        #[cfg(not(feature = "pcm"))]
        let _ = port;
        0
    }

    fn write_port(&mut self, port: u16, value: u8) {
        let mut state = self.state.lock();
        state.writes.push((port, value));
        let adlib = state.adlib_base;
        match port {
            p if p == adlib => state.opl_index = value,
            p if p == adlib + 1 => {
                let index = state.opl_index;
                state.opl_regs[index as usize] = value;
            }
            p if p == adlib + 2 => state.opl_index_high = value,
            p if p == adlib + 3 => {
                let index = state.opl_index_high;
                state.opl_regs_high[index as usize] = value;
            }
            _ => {
                #[cfg(feature = "pcm")]
                state.dsp.write(port, value);
            }
        }
    }
}

/// Simulated interrupt dispatch: a handler table plus a manual trigger.
#[derive(Default)]
pub struct SimDispatcher {
    handlers: HashMap<u8, IrqHandler>,
}

impl SimDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire interrupt `line`, invoking its handler if one is installed.
    pub fn raise(&mut self, line: u8) {
        if let Some(handler) = self.handlers.get_mut(&line) {
            handler();
        }
    }

    /// Whether a handler is installed on `line`.
    pub fn has_handler(&self, line: u8) -> bool {
        self.handlers.contains_key(&line)
    }
}

impl IrqDispatcher for SimDispatcher {
    fn install_handler(&mut self, line: u8, handler: IrqHandler) {
        self.handlers.insert(line, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opl_register_capture() {
        let mut bus = SimBus::new(0x220, 0x388);
        bus.write_port(0x388, 0x60);
        bus.write_port(0x389, 0xF1);
        assert_eq!(bus.opl_reg(0x60), 0xF1);
        assert_eq!(bus.opl_reg(0x61), 0);
    }

    #[cfg(feature = "pcm")]
    #[test]
    fn test_reset_pulse_posts_ack() {
        let mut bus = SimBus::new(0x220, 0x388);
        assert_eq!(bus.read_port(0x220 + dsp::READ_STATUS) & 0x80, 0);
        bus.write_port(0x220 + dsp::RESET, 1);
        bus.write_port(0x220 + dsp::RESET, 0);
        assert_ne!(bus.read_port(0x220 + dsp::READ_STATUS) & 0x80, 0);
        assert_eq!(bus.read_port(0x220 + dsp::READ), dsp::RESET_ACK);
    }

    #[cfg(feature = "pcm")]
    #[test]
    fn test_version_command_queues_two_bytes() {
        let mut bus = SimBus::new(0x220, 0x388);
        bus.set_dsp_version(4, 13);
        bus.write_port(0x220 + dsp::WRITE, dsp::CMD_VERSION);
        assert_eq!(bus.read_port(0x220 + dsp::READ), 4);
        assert_eq!(bus.read_port(0x220 + dsp::READ), 13);
    }

    #[test]
    fn test_dispatcher_raise_reaches_handler() {
        let mut dispatcher = SimDispatcher::new();
        let hits = Arc::new(Mutex::new(0u32));
        let hits_in = Arc::clone(&hits);
        dispatcher.install_handler(5, Box::new(move || *hits_in.lock() += 1));

        assert!(dispatcher.has_handler(5));
        dispatcher.raise(5);
        dispatcher.raise(7); // no handler, no effect
        assert_eq!(*hits.lock(), 1);
    }
}
