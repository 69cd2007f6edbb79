//! ISA DMA controller programming for 16-bit playback.
//!
//! The 16-bit channels (5-7) live on the second 8237 controller, which
//! counts in words: the buffer offset is written divided by two and the
//! transfer length as a word count minus one. The sequence is the
//! classic one: mask the channel, clear the byte-pointer flip-flop,
//! select the mode, write offset/length/page, unmask.
//!
//! ## Controller 2 ports
//!
//! | Port | Register | Description |
//! |------|----------|-------------|
//! | 0xD4 | MASK     | Single-channel mask |
//! | 0xD6 | MODE     | Transfer mode |
//! | 0xD8 | CLEAR FF | Byte-pointer flip-flop reset |
//! | 0xC4/0xC8/0xCC | ADDR  | Channel 5/6/7 base offset |
//! | 0xC6/0xCA/0xCE | COUNT | Channel 5/6/7 word count |
//! | 0x8B/0x89/0x8A | PAGE  | Channel 5/6/7 page |

use crate::bus::PortBus;

const DMA2_MASK: u16 = 0xD4;
const DMA2_MODE: u16 = 0xD6;
const DMA2_CLEAR_FLIP_FLOP: u16 = 0xD8;

/// Mask-register bit that disables the addressed channel.
const MASK_DISABLE: u8 = 0x04;

/// Mode bits: single transfer, address increment, auto-initialize,
/// read-from-memory (memory -> device).
const MODE_AUTO_PLAYBACK: u8 = 0x58;

fn addr_port(channel: u8) -> u16 {
    match channel {
        5 => 0xC4,
        6 => 0xC8,
        _ => 0xCC,
    }
}

fn count_port(channel: u8) -> u16 {
    match channel {
        5 => 0xC6,
        6 => 0xCA,
        _ => 0xCE,
    }
}

fn page_port(channel: u8) -> u16 {
    match channel {
        5 => 0x8B,
        6 => 0x89,
        _ => 0x8A,
    }
}

/// Program `channel` for an auto-initializing playback transfer covering
/// `len_words` 16-bit samples at physical address `buf_addr`.
///
/// The channel re-arms itself at the end of every pass; once unmasked it
/// runs until process teardown: there is no stop path in this driver.
pub fn program_auto_init<B: PortBus>(bus: &mut B, channel: u8, buf_addr: u32, len_words: u32) {
    let chan = channel % 4;

    bus.write_port(DMA2_MASK, MASK_DISABLE + chan);
    bus.write_port(DMA2_CLEAR_FLIP_FLOP, 0);
    bus.write_port(DMA2_MODE, MODE_AUTO_PLAYBACK + chan);

    // The 16-bit controller addresses words, not bytes.
    let offset = ((buf_addr / 2) & 0xFFFF) as u16;
    bus.write_port(addr_port(channel), (offset & 0xFF) as u8);
    bus.write_port(addr_port(channel), (offset >> 8) as u8);

    let count = len_words - 1;
    bus.write_port(count_port(channel), (count & 0xFF) as u8);
    bus.write_port(count_port(channel), ((count >> 8) & 0xFF) as u8);

    bus.write_port(page_port(channel), (buf_addr >> 16) as u8);

    bus.write_port(DMA2_MASK, chan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimBus;

    #[test]
    fn test_channel5_program_sequence() {
        let mut bus = SimBus::new(0x220, 0x388);
        program_auto_init(&mut bus, 5, 0x0009_0000, 1102);

        assert_eq!(bus.port_writes(DMA2_MASK), vec![0x05, 0x01]);
        assert_eq!(bus.port_writes(DMA2_CLEAR_FLIP_FLOP), vec![0]);
        assert_eq!(bus.port_writes(DMA2_MODE), vec![0x59]);

        // 0x90000 / 2 = 0x48000 -> offset 0x8000 within the 64K word page.
        assert_eq!(bus.port_writes(0xC4), vec![0x00, 0x80]);
        // 1102 words -> count 1101 = 0x044D.
        assert_eq!(bus.port_writes(0xC6), vec![0x4D, 0x04]);
        assert_eq!(bus.port_writes(0x8B), vec![0x09]);
    }

    #[test]
    fn test_channel_ports_distinct() {
        for channel in 5..=7u8 {
            assert_ne!(addr_port(channel), count_port(channel));
        }
        assert_eq!(page_port(6), 0x89);
    }
}
