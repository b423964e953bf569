//! Interrupt-side halves of a split [`Uart`](crate::Uart).
//!
//! [`Uart::split`](crate::Uart::split) parks the receive producer in an [`RxSlot`] and the
//! transmit consumer plus the backend in a [`TxSlot`], typically `static`s reached from the RX
//! and TX-ready interrupt handlers. The main loop keeps a [`Port`](crate::Port) and never locks
//! on the receive or transmit FIFOs themselves; the only critical sections it enters are the
//! bounded [`TxSlot::on_tx_ready`] drains, because the main loop and the TX-ready interrupt
//! both feed the same transmitter.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::{CriticalSection, Mutex};

use crate::backend::Backend;
use crate::ring_buffer::{Consumer, Producer};
use crate::uart::drain;

/// The RX interrupt's end of a split driver: the receive producer and the overflow counter.
///
/// ```
/// # use uart_core::RxSlot;
/// static RX: RxSlot<'static> = RxSlot::new();
///
/// // In the RX interrupt handler:
/// fn on_rx_irq(byte: u8) {
///     RX.on_rx_byte(byte);
/// }
/// # on_rx_irq(0);
/// assert_eq!(RX.overflow_count(), 1);
/// ```
pub struct RxSlot<'a> {
    pub(crate) producer: Mutex<RefCell<Option<Producer<'a>>>>,
    /// Received bytes that never made it into the FIFO. Saturates.
    ///
    /// Only stored to inside a critical section, so load-then-store cannot lose an update.
    dropped: AtomicU32,
}

impl<'a> RxSlot<'a> {
    /// Creates a slot with no driver attached.
    pub const fn new() -> Self {
        Self {
            producer: Mutex::new(RefCell::new(None)),
            dropped: AtomicU32::new(0),
        }
    }

    /// RX interrupt entry point: queues one received byte.
    ///
    /// A byte that cannot be queued is counted in [`RxSlot::overflow_count`], whether the
    /// receive FIFO was full, no driver is attached yet, or the slot is busy further up the
    /// call stack. Returns `true` if the byte was queued.
    pub fn on_rx_byte(&self, byte: u8) -> bool {
        critical_section::with(|cs| {
            let queued = match self.producer.borrow(cs).try_borrow_mut() {
                Ok(mut producer) => producer.as_mut().is_some_and(|p| p.push(byte)),
                Err(_) => false,
            };
            if !queued {
                self.count_lost(cs, 1);
            }
            queued
        })
    }

    /// Number of received bytes lost since the last clear. Saturates at `u32::MAX`.
    #[inline]
    pub fn overflow_count(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resets the overflow counter to zero.
    pub fn clear_overflow(&self) {
        critical_section::with(|_| self.dropped.store(0, Ordering::Relaxed));
    }

    pub(crate) fn count_lost(&self, _cs: CriticalSection<'_>, n: u32) {
        let dropped = self.dropped.load(Ordering::Relaxed);
        self.dropped
            .store(dropped.saturating_add(n), Ordering::Relaxed);
    }
}

impl Default for RxSlot<'_> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct Transmitter<'a, B> {
    pub(crate) tx: Consumer<'a>,
    pub(crate) backend: B,
}

/// The transmit end of a split driver: the transmit consumer and the backend.
///
/// Shared between the TX-ready interrupt and [`Port::write`](crate::Port::write), which both
/// drain through [`TxSlot::on_tx_ready`].
pub struct TxSlot<'a, B> {
    pub(crate) transmitter: Mutex<RefCell<Option<Transmitter<'a, B>>>>,
}

impl<'a, B> TxSlot<'a, B> {
    /// Creates a slot with no driver attached.
    pub const fn new() -> Self {
        Self {
            transmitter: Mutex::new(RefCell::new(None)),
        }
    }
}

impl<B> Default for TxSlot<'_, B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, B: Backend> TxSlot<'a, B> {
    /// TX-ready interrupt entry point: forwards queued bytes while the backend is ready.
    ///
    /// Runs inside one critical section, at most one backend write per queued byte. Returns
    /// `false` if no driver is attached or the slot is busy further up the call stack.
    pub fn on_tx_ready(&self) -> bool {
        self.with(|t| drain(&mut t.tx, &mut t.backend)).is_some()
    }

    /// Runs `f` on the attached backend inside a critical section.
    ///
    /// Returns `None` if no driver is attached or the slot is busy further up the call stack.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        self.with(|t| f(&mut t.backend))
    }

    fn with<R>(&self, f: impl FnOnce(&mut Transmitter<'a, B>) -> R) -> Option<R> {
        critical_section::with(|cs| {
            let mut slot = self.transmitter.borrow(cs).try_borrow_mut().ok()?;
            slot.as_mut().map(f)
        })
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::backend::stub::StubBackend;
    use crate::ring_buffer::RingBuffer;
    use crate::uart::Uart;

    #[test]
    fn empty_slots_count_lost_bytes() {
        let rx: RxSlot<'_> = RxSlot::new();
        let tx: TxSlot<'_, StubBackend<'_>> = TxSlot::new();
        assert!(!rx.on_rx_byte(1));
        assert!(!rx.on_rx_byte(2));
        assert_eq!(rx.overflow_count(), 2);
        assert!(!tx.on_tx_ready());
        assert_eq!(tx.with_backend(|b| b.baud()), None);
    }

    #[test]
    fn byte_refused_by_busy_slot_is_counted() {
        let mut sink = [0; 1];
        let (mut rx_storage, mut tx_storage) = ([0; 4], [0; 1]);
        let mut rx = RingBuffer::new(&mut rx_storage);
        let mut tx = RingBuffer::new(&mut tx_storage);
        let rx_slot = RxSlot::new();
        let tx_slot = TxSlot::new();
        let uart = Uart::new(StubBackend::new(&mut sink), 9600, &mut rx, &mut tx).unwrap();
        let Ok(port) = uart.split(&rx_slot, &tx_slot) else {
            panic!("slots were free");
        };

        critical_section::with(|cs| {
            let _held = rx_slot.producer.borrow(cs).borrow_mut();
            assert!(!rx_slot.on_rx_byte(0x42));
        });
        assert_eq!(port.rx_available(), 0);
        assert_eq!(port.overflow_count(), 1);

        assert!(rx_slot.on_rx_byte(0x43));
        assert_eq!(port.rx_available(), 1);
        assert_eq!(port.overflow_count(), 1);
    }

    #[test]
    fn overflow_counter_saturates() {
        let rx: RxSlot<'_> = RxSlot::new();
        critical_section::with(|cs| rx.count_lost(cs, u32::MAX - 1));
        for b in 0..3 {
            rx.on_rx_byte(b);
        }
        assert_eq!(rx.overflow_count(), u32::MAX);
        rx.clear_overflow();
        assert_eq!(rx.overflow_count(), 0);
    }

    #[test]
    fn nested_drain_is_refused() {
        let mut sink = [0; 4];
        let (mut rx_storage, mut tx_storage) = ([0; 1], [0; 4]);
        let mut rx = RingBuffer::new(&mut rx_storage);
        let mut tx = RingBuffer::new(&mut tx_storage);
        let rx_slot = RxSlot::new();
        let tx_slot = TxSlot::new();
        let uart = Uart::new(StubBackend::new(&mut sink), 9600, &mut rx, &mut tx).unwrap();
        let Ok(_port) = uart.split(&rx_slot, &tx_slot) else {
            panic!("slots were free");
        };

        assert_eq!(tx_slot.with_backend(|_| tx_slot.on_tx_ready()), Some(false));
        assert!(tx_slot.on_tx_ready());
    }
}
