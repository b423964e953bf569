//! The main-loop end of a split driver.

use core::fmt;

use crate::backend::Backend;
use crate::ring_buffer::{Consumer, Producer};
use crate::shared::{RxSlot, TxSlot};
use crate::uart::{dequeue, echo, effective_echo_chunk, enqueue};

/// Main-loop handle of a [`Uart`](crate::Uart) split with
/// [`Uart::split`](crate::Uart::split).
///
/// Holds the receive consumer and the transmit producer, so reading, queueing and echoing never
/// mask interrupts. Only kicking the transmitter goes through the shared [`TxSlot`].
///
/// ```
/// # use uart_core::{Backend, RingBuffer, RxSlot, TxSlot, Uart};
/// # struct Null;
/// # impl Backend for Null {
/// #     fn init(&mut self, _baud: u32) -> bool { true }
/// #     fn tx_ready(&mut self) -> bool { true }
/// #     fn tx_write(&mut self, _byte: u8) {}
/// # }
/// static RX: RxSlot<'static> = RxSlot::new();
/// static TX: TxSlot<'static, Null> = TxSlot::new();
///
/// let rx = Box::leak(Box::new(RingBuffer::new(Box::leak(Box::new([0u8; 16])))));
/// let tx = Box::leak(Box::new(RingBuffer::new(Box::leak(Box::new([0u8; 16])))));
/// let uart = Uart::new(Null, 115_200, rx, tx).unwrap();
/// let Ok(mut port) = uart.split(&RX, &TX) else { unreachable!() };
///
/// // RX interrupt:
/// RX.on_rx_byte(b'a');
///
/// // Main loop:
/// assert_eq!(port.echo_pump(), 1);
/// assert_eq!(port.tx_queued(), 0);
/// ```
pub struct Port<'a, B> {
    rx: Consumer<'a>,
    tx: Producer<'a>,
    rx_slot: &'a RxSlot<'a>,
    tx_slot: &'a TxSlot<'a, B>,
    /// As configured; zero means [`DEFAULT_ECHO_CHUNK`](crate::DEFAULT_ECHO_CHUNK).
    echo_chunk: usize,
}

impl<'a, B: Backend> Port<'a, B> {
    pub(crate) fn new(
        rx: Consumer<'a>,
        tx: Producer<'a>,
        rx_slot: &'a RxSlot<'a>,
        tx_slot: &'a TxSlot<'a, B>,
        echo_chunk: usize,
    ) -> Self {
        Self {
            rx,
            tx,
            rx_slot,
            tx_slot,
            echo_chunk,
        }
    }

    /// Drains the transmit FIFO into the backend, see [`TxSlot::on_tx_ready`].
    #[inline]
    pub fn service_tx(&self) -> bool {
        self.tx_slot.on_tx_ready()
    }

    /// Queues as much of `data` as fits, then kicks the transmitter.
    ///
    /// Returns the number of leading bytes of `data` that were queued.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let queued = enqueue(&mut self.tx, data);
        self.service_tx();
        queued
    }

    /// Copies up to `out.len()` received bytes into `out`, returning how many were copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        dequeue(&mut self.rx, out)
    }

    /// Bytes waiting in the receive FIFO.
    #[inline]
    pub fn rx_available(&self) -> usize {
        self.rx.len()
    }

    /// Bytes waiting in the transmit FIFO.
    #[inline]
    pub fn tx_queued(&self) -> usize {
        self.tx.len()
    }

    /// Space left in the transmit FIFO.
    #[inline]
    pub fn tx_free(&self) -> usize {
        self.tx.free()
    }

    /// Sends what has been received so far straight back out, see
    /// [`Uart::echo_pump`](crate::Uart::echo_pump).
    ///
    /// Bytes the RX interrupt queues while this runs are left for the next call.
    pub fn echo_pump(&mut self) -> usize {
        let chunk = effective_echo_chunk(self.echo_chunk);
        let Self { rx, tx, tx_slot, .. } = self;
        echo(rx, chunk, |bytes| {
            let queued = enqueue(tx, bytes);
            tx_slot.on_tx_ready();
            queued
        })
    }

    /// Number of received bytes lost since the last clear, see [`RxSlot::overflow_count`].
    #[inline]
    pub fn overflow_count(&self) -> u32 {
        self.rx_slot.overflow_count()
    }

    /// Resets the overflow counter to zero.
    #[inline]
    pub fn clear_overflow(&self) {
        self.rx_slot.clear_overflow();
    }

    /// Sets how many bytes [`Port::echo_pump`] moves per chunk.
    #[inline]
    pub fn set_echo_chunk_size(&mut self, bytes: usize) {
        self.echo_chunk = bytes;
    }

    /// The echo chunk size as last configured.
    #[inline]
    pub fn echo_chunk_size(&self) -> usize {
        self.echo_chunk
    }

    /// Runs `f` on the backend inside a critical section, see [`TxSlot::with_backend`].
    #[inline]
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> Option<R> {
        self.tx_slot.with_backend(f)
    }
}

impl<B: Backend> fmt::Write for Port<'_, B> {
    /// Queues `s`; fails if the transmit FIFO could not take all of it.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.write(s.as_bytes()) == s.len() {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::backend::stub::StubBackend;
    use crate::ring_buffer::RingBuffer;
    use crate::uart::Uart;

    extern crate std;

    #[test]
    fn isr_and_main_take_turns() {
        let mut sink = [0; 8];
        let (mut rx_storage, mut tx_storage) = ([0; 4], [0; 4]);
        let mut rx = RingBuffer::new(&mut rx_storage);
        let mut tx = RingBuffer::new(&mut tx_storage);
        let rx_slot = RxSlot::new();
        let tx_slot = TxSlot::new();
        let mut uart = Uart::new(StubBackend::new(&mut sink), 9600, &mut rx, &mut tx).unwrap();
        uart.set_echo_chunk_size(3);
        uart.backend_mut().set_tx_credit(Some(0));
        let Ok(mut port) = uart.split(&rx_slot, &tx_slot) else {
            panic!("slots were free");
        };
        assert_eq!(port.echo_chunk_size(), 3);

        // "Interrupt" side.
        for &b in b"ping" {
            assert!(rx_slot.on_rx_byte(b));
        }
        assert!(!rx_slot.on_rx_byte(b'!'));

        // "Main loop" side.
        assert_eq!(port.rx_available(), 4);
        assert_eq!(port.overflow_count(), 1);
        assert_eq!(port.echo_pump(), 4);
        assert_eq!(port.tx_queued(), 4);

        // TX-ready interrupt drains the queue.
        port.with_backend(|b| b.set_tx_credit(None));
        assert!(tx_slot.on_tx_ready());
        assert_eq!(port.tx_queued(), 0);
        assert_eq!(port.with_backend(|b| b.sent() == b"ping"), Some(true));

        port.clear_overflow();
        assert_eq!(port.overflow_count(), 0);
    }

    #[test]
    fn split_carries_overflow_over() {
        let mut sink = [0; 1];
        let (mut rx_storage, mut tx_storage) = ([0; 1], [0; 1]);
        let mut rx = RingBuffer::new(&mut rx_storage);
        let mut tx = RingBuffer::new(&mut tx_storage);
        let rx_slot = RxSlot::new();
        let tx_slot = TxSlot::new();
        let mut uart = Uart::new(StubBackend::new(&mut sink), 9600, &mut rx, &mut tx).unwrap();
        uart.ingest(1);
        uart.ingest(2);
        // A byte arriving before the split has nowhere to go.
        rx_slot.on_rx_byte(3);

        let Ok(port) = uart.split(&rx_slot, &tx_slot) else {
            panic!("slots were free");
        };
        assert_eq!(port.overflow_count(), 2);
        assert_eq!(port.rx_available(), 1);
    }

    #[test]
    fn split_into_occupied_slots_hands_driver_back() {
        let mut sink_a = [0; 1];
        let mut sink_b = [0; 1];
        let (mut rx_a, mut tx_a, mut rx_b, mut tx_b) = ([0; 1], [0; 1], [0; 1], [0; 1]);
        let mut rx_a = RingBuffer::new(&mut rx_a);
        let mut tx_a = RingBuffer::new(&mut tx_a);
        let mut rx_b = RingBuffer::new(&mut rx_b);
        let mut tx_b = RingBuffer::new(&mut tx_b);
        let rx_slot = RxSlot::new();
        let tx_slot = TxSlot::new();

        let first = Uart::new(StubBackend::new(&mut sink_a), 9600, &mut rx_a, &mut tx_a).unwrap();
        let second = Uart::new(StubBackend::new(&mut sink_b), 4800, &mut rx_b, &mut tx_b).unwrap();
        let Ok(_port) = first.split(&rx_slot, &tx_slot) else {
            panic!("slots were free");
        };

        let Err(second) = second.split(&rx_slot, &tx_slot) else {
            panic!("slots were taken");
        };
        assert_eq!(second.backend().baud(), Some(4800));
        assert_eq!(tx_slot.with_backend(|b| b.baud()), Some(Some(9600)));
    }

    #[test]
    fn reading_does_not_wait_on_transmitter() {
        let mut sink = [0; 4];
        let (mut rx_storage, mut tx_storage) = ([0; 4], [0; 4]);
        let mut rx = RingBuffer::new(&mut rx_storage);
        let mut tx = RingBuffer::new(&mut tx_storage);
        let rx_slot = RxSlot::new();
        let tx_slot = TxSlot::new();
        let uart = Uart::new(StubBackend::new(&mut sink), 9600, &mut rx, &mut tx).unwrap();
        let Ok(mut port) = uart.split(&rx_slot, &tx_slot) else {
            panic!("slots were free");
        };
        rx_slot.on_rx_byte(b'x');

        // With the transmitter held, the receive path still works.
        tx_slot.with_backend(|_| {
            let mut out = [0; 2];
            assert_eq!(port.read(&mut out), 1);
            assert_eq!(out[0], b'x');
            assert!(rx_slot.on_rx_byte(b'y'));
        });
        assert_eq!(port.rx_available(), 1);
    }

    #[test]
    fn interrupt_thread_feeds_main_loop() {
        const COUNT: usize = 10_000;
        let mut sink = [0; 1];
        let (mut rx_storage, mut tx_storage) = ([0; 16], [0; 1]);
        let mut rx = RingBuffer::new(&mut rx_storage);
        let mut tx = RingBuffer::new(&mut tx_storage);
        let rx_slot = RxSlot::new();
        let tx_slot = TxSlot::new();
        let uart = Uart::new(StubBackend::new(&mut sink), 9600, &mut rx, &mut tx).unwrap();
        let Ok(mut port) = uart.split(&rx_slot, &tx_slot) else {
            panic!("slots were free");
        };

        let mut seen = 0;
        let mut buf = [0; 8];
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..COUNT {
                    rx_slot.on_rx_byte(i as u8);
                }
            });
            // Every byte is either read here or counted as lost over there.
            while seen + (port.overflow_count() as usize) < COUNT {
                seen += port.read(&mut buf);
            }
        });
        assert_eq!(seen + port.overflow_count() as usize, COUNT);
        assert_eq!(port.rx_available(), 0);
    }
}
