//! Hardware collaborator seams.
//!
//! The audio core never touches ports or the interrupt controller setup
//! directly; it goes through these two traits so the same driver code runs
//! against real port I/O in a kernel build and against [`crate::sim`] on a
//! host. Both collaborators are assumed infallible: port access either
//! succeeds or hangs, it never fails softly.

/// Byte-granularity port I/O over the ISA address space.
///
/// Implementations are expected to be cheap to clone: a real-hardware
/// implementation is a zero-sized wrapper around `in`/`out` instructions,
/// and the simulator shares its interior state between clones. Cloning is
/// what lets an interrupt handler carry its own handle.
pub trait PortBus: Send {
    /// Read one byte from `port`.
    fn read_port(&mut self, port: u16) -> u8;

    /// Write one byte to `port`.
    fn write_port(&mut self, port: u16, value: u8);
}

/// An installed interrupt handler.
///
/// Handlers run in interrupt context with their own line masked for the
/// duration of the call; they must not block or allocate.
pub type IrqHandler = Box<dyn FnMut() + Send>;

/// Interrupt line dispatch, provided by the surrounding system.
pub trait IrqDispatcher {
    /// Register `handler` to be invoked whenever `line` fires.
    ///
    /// Installing a second handler on the same line replaces the first.
    fn install_handler(&mut self, line: u8, handler: IrqHandler);
}

/// Primary interrupt controller command port.
pub const PIC1_COMMAND: u16 = 0x20;

/// Secondary interrupt controller command port.
pub const PIC2_COMMAND: u16 = 0xA0;

/// End-of-interrupt command byte, written to both controllers after a
/// handler on a cascaded line completes.
pub const PIC_EOI: u8 = 0x20;
