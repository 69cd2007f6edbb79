//! System timer (Intel 8253/8254 PIT, channel 0).
//!
//! Generates the periodic interrupt that serves as the wall clock for
//! music timing on the FM path. The input clock is a fixed, non-integer
//! frequency; the achievable tick rate is `PIT_HZ / divisor` for an
//! integer divisor, so callers must take their timing from
//! [`PitTimer::actual_hz`], not from the target they asked for.
//!
//! ## Register Map
//!
//! | Port | Register | Description |
//! |------|----------|-------------|
//! | 0x40 | CH0 DATA | Channel 0 reload value (lo then hi byte) |
//! | 0x43 | CONTROL  | Mode/command word |

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::bus::{IrqDispatcher, PortBus};

/// PIT input clock in Hz. Not an integer: the oscillator runs at
/// 105/88 of the NTSC color burst.
pub const PIT_HZ: f64 = 1_193_181.666;

/// Channel 0 data port.
const PIT_CH0_DATA: u16 = 0x40;

/// Mode/command port.
const PIT_CONTROL: u16 = 0x43;

/// Control word: channel 0, lobyte/hibyte access, rate generator.
const PIT_SET: u8 = 0x36;

/// Interrupt line the PIT fires on.
const TIMER_IRQ_LINE: u8 = 0;

/// Compute the channel-0 divisor whose rate lies closest to `target_hz`.
///
/// Clamped to the 16-bit reload range; a target above the input clock
/// saturates at divisor 1.
pub fn divisor_for(target_hz: u32) -> u16 {
    let divisor = (PIT_HZ / target_hz as f64).round();
    divisor.clamp(1.0, u16::MAX as f64) as u16
}

/// The periodic system timer.
///
/// [`initialize`] programs the divisor and installs the tick handler; the
/// handler does nothing but one atomic increment, so [`ticks`] is safe to
/// read from any context. The counter is reset only at initialization and
/// wraps at the `u32` boundary.
///
/// [`initialize`]: PitTimer::initialize
/// [`ticks`]: PitTimer::ticks
pub struct PitTimer<B: PortBus> {
    bus: B,
    target_hz: u32,
    divisor: u16,
    actual_hz: f64,
    ticks: Arc<AtomicU32>,
}

impl<B: PortBus> PitTimer<B> {
    /// Create a timer aiming for `target_hz` ticks per second.
    pub fn new(bus: B, target_hz: u32) -> Self {
        let divisor = divisor_for(target_hz);
        PitTimer {
            bus,
            target_hz,
            divisor,
            actual_hz: PIT_HZ / divisor as f64,
            ticks: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Program the hardware divisor, zero the tick counter and install
    /// the tick handler on interrupt line 0.
    ///
    /// Timer programming cannot fail; an unreachable target rate simply
    /// yields the nearest achievable one.
    pub fn initialize(&mut self, dispatcher: &mut dyn IrqDispatcher) {
        self.bus.write_port(PIT_CONTROL, PIT_SET);
        self.bus.write_port(PIT_CH0_DATA, (self.divisor & 0xFF) as u8);
        self.bus.write_port(PIT_CH0_DATA, (self.divisor >> 8) as u8);

        self.ticks.store(0, Ordering::Relaxed);
        let ticks = Arc::clone(&self.ticks);
        dispatcher.install_handler(
            TIMER_IRQ_LINE,
            Box::new(move || {
                ticks.fetch_add(1, Ordering::Relaxed);
            }),
        );

        log::info!(
            "timer: target {} Hz, divisor {} -> {:.3} Hz actual",
            self.target_hz,
            self.divisor,
            self.actual_hz
        );
    }

    /// Elapsed ticks since initialization (wrapping, single atomic load).
    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// The programmed divisor.
    pub fn divisor(&self) -> u16 {
        self.divisor
    }

    /// The achieved tick rate in Hz. May differ slightly from the target;
    /// downstream timing math must use this value.
    pub fn actual_hz(&self) -> f64 {
        self.actual_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimBus, SimDispatcher};
    use approx::assert_relative_eq;

    #[test]
    fn test_divisor_is_closest_for_600hz() {
        // 1193181.666 / 600 = 1988.64, so 1989 is the nearest divisor.
        assert_eq!(divisor_for(600), 1989);
    }

    #[test]
    fn test_divisor_rounds_to_nearest_rate() {
        for target in [18, 100, 600, 1000, 8000, 22050] {
            let divisor = divisor_for(target) as f64;
            let achieved = PIT_HZ / divisor;
            for neighbor in [divisor - 1.0, divisor + 1.0] {
                if !(1.0..=u16::MAX as f64).contains(&neighbor) {
                    continue;
                }
                let other = PIT_HZ / neighbor;
                assert!(
                    (achieved - target as f64).abs() <= (other - target as f64).abs(),
                    "divisor {divisor} not optimal for {target} Hz"
                );
            }
        }
    }

    #[test]
    fn test_divisor_saturates_above_input_clock() {
        assert_eq!(divisor_for(2_000_000), 1);
    }

    #[test]
    fn test_actual_rate_near_target() {
        let bus = SimBus::new(0x220, 0x388);
        let timer = PitTimer::new(bus, 600);
        assert_relative_eq!(timer.actual_hz(), 599.890, epsilon = 0.01);
    }

    #[test]
    fn test_handler_counts_interrupts() {
        let bus = SimBus::new(0x220, 0x388);
        let mut dispatcher = SimDispatcher::new();
        let mut timer = PitTimer::new(bus, 600);
        timer.initialize(&mut dispatcher);

        assert_eq!(timer.ticks(), 0);
        for _ in 0..37 {
            dispatcher.raise(0);
        }
        assert_eq!(timer.ticks(), 37);
    }

    #[test]
    fn test_initialize_programs_divisor_ports() {
        let bus = SimBus::new(0x220, 0x388);
        let mut dispatcher = SimDispatcher::new();
        let mut timer = PitTimer::new(bus.clone(), 600);
        timer.initialize(&mut dispatcher);

        let writes = bus.port_writes(PIT_CH0_DATA);
        assert_eq!(writes, vec![(1989 & 0xFF) as u8, (1989 >> 8) as u8]);
        assert_eq!(bus.port_writes(PIT_CONTROL), vec![PIT_SET]);
    }
}
