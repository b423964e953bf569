//! The driver core: two FIFOs bound to a [`Backend`].
//!
//! Receive path: the RX interrupt hands each byte to [`Uart::ingest`], application code drains
//! with [`Uart::read`]. Transmit path: application code queues with [`Uart::write`], and
//! [`Uart::service_tx`] (main loop or TX-ready interrupt) forwards queued bytes while the
//! hardware accepts them.
//!
//! A [`Uart`] is driven from one context. To drive it from interrupts and the main loop at the
//! same time, [`Uart::split`] it: the FIFOs are lock-free SPSC queues, so each side only ever
//! touches its own half.
//!
//! No operation blocks. Backpressure shows up as short counts, and receive data loss as the
//! overflow counter.

use core::fmt;

use crate::backend::Backend;
use crate::port::Port;
use crate::ring_buffer::{Consumer, Producer, RingBuffer};
use crate::shared::{RxSlot, Transmitter, TxSlot};

/// Echo chunk used by [`Uart::echo_pump`] when none (or zero) is configured.
pub const DEFAULT_ECHO_CHUNK: usize = 32;

/// Upper bound on the echo chunk, i.e. the size of the on-stack bounce buffer.
///
/// Larger configured chunks are clamped to this.
pub const MAX_ECHO_CHUNK: usize = 64;

/// Error returned by [`Uart::new`] when initialization fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// The receive storage has zero length.
    RxBufferEmpty,
    /// The transmit storage has zero length.
    TxBufferEmpty,
    /// [`Backend::init`] rejected the requested baud rate.
    Backend,
}

/// A UART driver instance.
///
/// Owns the backend and both halves of both FIFOs; borrows the [`RingBuffer`]s for `'a`.
pub struct Uart<'a, B> {
    backend: B,
    rx_in: Producer<'a>,
    rx_out: Consumer<'a>,
    tx_in: Producer<'a>,
    tx_out: Consumer<'a>,
    /// Bytes dropped by [`Uart::ingest`] because the receive FIFO was full. Saturates.
    rx_overflow: u32,
    /// As configured; zero means [`DEFAULT_ECHO_CHUNK`].
    echo_chunk: usize,
}

impl<'a, B: Backend> Uart<'a, B> {
    /// Brings up a driver over `backend` at `baud`, using the given FIFOs.
    ///
    /// Capacities are validated before the backend is touched. Both FIFOs are emptied and split
    /// before [`Backend::init`] runs; if that fails the whole driver, backend included, is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - [`InitError::RxBufferEmpty`]: `rx` has zero capacity
    /// - [`InitError::TxBufferEmpty`]: `tx` has zero capacity
    /// - [`InitError::Backend`]: the backend failed to initialize
    pub fn new(
        mut backend: B,
        baud: u32,
        rx: &'a mut RingBuffer<'_>,
        tx: &'a mut RingBuffer<'_>,
    ) -> Result<Self, InitError> {
        if rx.capacity() == 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("uart: refusing empty rx storage");
            return Err(InitError::RxBufferEmpty);
        }
        if tx.capacity() == 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("uart: refusing empty tx storage");
            return Err(InitError::TxBufferEmpty);
        }

        let (rx_in, rx_out) = rx.split();
        let (tx_in, tx_out) = tx.split();

        if !backend.init(baud) {
            #[cfg(feature = "defmt")]
            defmt::warn!("uart: backend init failed at {=u32} baud", baud);
            return Err(InitError::Backend);
        }

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "uart: up at {=u32} baud, rx {=usize} B, tx {=usize} B",
            baud,
            rx_in.capacity(),
            tx_in.capacity()
        );

        Ok(Self {
            backend,
            rx_in,
            rx_out,
            tx_in,
            tx_out,
            rx_overflow: 0,
            echo_chunk: DEFAULT_ECHO_CHUNK,
        })
    }

    /// Queues one received byte.
    ///
    /// If the receive FIFO is full the incoming byte is dropped (bytes already queued win) and
    /// the overflow counter goes up. Never touches the backend.
    #[inline]
    pub fn ingest(&mut self, byte: u8) {
        if !self.rx_in.push(byte) {
            self.rx_overflow = self.rx_overflow.saturating_add(1);
        }
    }

    /// Moves bytes the backend has pending on its polling receive path through
    /// [`Uart::ingest`].
    ///
    /// Takes at most one more byte than the receive FIFO holds per call, so a receiver that
    /// never reports empty cannot stall the caller; call again to keep draining. Returns how
    /// many bytes were taken from hardware, including any that overflowed.
    pub fn poll_rx(&mut self) -> usize {
        let budget = self.rx_in.capacity() + 1;
        let mut taken = 0;
        while taken < budget && self.backend.rx_available() {
            let byte = self.backend.rx_read();
            self.ingest(byte);
            taken += 1;
        }
        taken
    }

    /// Forwards queued bytes to the backend until it stops being ready or the FIFO runs dry.
    pub fn service_tx(&mut self) {
        drain(&mut self.tx_out, &mut self.backend);
    }

    /// Queues as much of `data` as fits, then kicks the transmitter.
    ///
    /// Returns the number of leading bytes of `data` that were queued. A full FIFO truncates the
    /// write; the rest of `data` is left to the caller.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let queued = enqueue(&mut self.tx_in, data);
        self.service_tx();
        queued
    }

    /// Copies up to `out.len()` received bytes into `out`.
    ///
    /// Returns the number of bytes copied; fewer than requested if the FIFO ran dry.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        dequeue(&mut self.rx_out, out)
    }

    /// Bytes waiting in the receive FIFO.
    #[inline]
    pub fn rx_available(&self) -> usize {
        self.rx_out.len()
    }

    /// Bytes waiting in the transmit FIFO.
    #[inline]
    pub fn tx_queued(&self) -> usize {
        self.tx_out.len()
    }

    /// Space left in the transmit FIFO.
    #[inline]
    pub fn tx_free(&self) -> usize {
        self.tx_in.free()
    }

    /// Sends everything received so far straight back out, one chunk at a time.
    ///
    /// Each chunk goes through [`Uart::write`], so the transmitter is kicked between chunks.
    /// Bytes the transmit FIFO cannot take are dropped. Returns the number of bytes queued for
    /// transmission.
    pub fn echo_pump(&mut self) -> usize {
        let chunk = effective_echo_chunk(self.echo_chunk);
        let Self {
            backend,
            rx_out,
            tx_in,
            tx_out,
            ..
        } = self;
        echo(rx_out, chunk, |bytes| {
            let queued = enqueue(tx_in, bytes);
            drain(tx_out, backend);
            queued
        })
    }

    /// Number of received bytes dropped because the receive FIFO was full.
    ///
    /// Saturates at `u32::MAX` instead of wrapping.
    #[inline]
    pub fn overflow_count(&self) -> u32 {
        self.rx_overflow
    }

    /// Resets the overflow counter to zero.
    #[inline]
    pub fn clear_overflow(&mut self) {
        self.rx_overflow = 0;
    }

    /// Sets how many bytes [`Uart::echo_pump`] moves per chunk.
    ///
    /// Zero selects [`DEFAULT_ECHO_CHUNK`]; values above [`MAX_ECHO_CHUNK`] are clamped when
    /// used. The value is stored as given.
    #[inline]
    pub fn set_echo_chunk_size(&mut self, bytes: usize) {
        self.echo_chunk = bytes;
    }

    /// The echo chunk size as last configured.
    #[inline]
    pub fn echo_chunk_size(&self) -> usize {
        self.echo_chunk
    }

    /// Shared access to the backend.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Exclusive access to the backend.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Tears the driver down, handing the backend back. Queued bytes are discarded.
    pub fn release(self) -> B {
        self.backend
    }

    /// Splits the driver across execution contexts.
    ///
    /// The receive producer moves into `rx_slot` for the RX interrupt, the transmit consumer and
    /// the backend move into `tx_slot` for the TX-ready interrupt, and the returned [`Port`]
    /// keeps the main-loop halves. Overflows counted so far carry over to `rx_slot`.
    ///
    /// # Errors
    ///
    /// Hands the driver back untouched if either slot is already occupied or is borrowed further
    /// up the call stack.
    pub fn split(
        self,
        rx_slot: &'a RxSlot<'a>,
        tx_slot: &'a TxSlot<'a, B>,
    ) -> Result<Port<'a, B>, Self> {
        critical_section::with(|cs| {
            let Ok(mut producer) = rx_slot.producer.borrow(cs).try_borrow_mut() else {
                return Err(self);
            };
            let Ok(mut transmitter) = tx_slot.transmitter.borrow(cs).try_borrow_mut() else {
                return Err(self);
            };
            if producer.is_some() || transmitter.is_some() {
                return Err(self);
            }

            let Self {
                backend,
                rx_in,
                rx_out,
                tx_in,
                tx_out,
                rx_overflow,
                echo_chunk,
            } = self;
            *producer = Some(rx_in);
            *transmitter = Some(Transmitter {
                tx: tx_out,
                backend,
            });
            rx_slot.count_lost(cs, rx_overflow);

            #[cfg(feature = "defmt")]
            defmt::debug!("uart: split across contexts");

            Ok(Port::new(rx_out, tx_in, rx_slot, tx_slot, echo_chunk))
        })
    }
}

impl<B: Backend> fmt::Write for Uart<'_, B> {
    /// Queues `s`; fails if the transmit FIFO could not take all of it.
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.write(s.as_bytes()) == s.len() {
            Ok(())
        } else {
            Err(fmt::Error)
        }
    }
}

/// Pushes the longest prefix of `data` that fits, returning its length.
pub(crate) fn enqueue(tx: &mut Producer<'_>, data: &[u8]) -> usize {
    let mut queued = 0;
    for &byte in data {
        if !tx.push(byte) {
            break;
        }
        queued += 1;
    }
    queued
}

/// Pops into `out` until it is full or the FIFO is empty.
pub(crate) fn dequeue(rx: &mut Consumer<'_>, out: &mut [u8]) -> usize {
    let mut n = 0;
    for slot in out.iter_mut() {
        match rx.pop() {
            Some(byte) => *slot = byte,
            None => break,
        }
        n += 1;
    }
    n
}

/// Feeds `backend` from `tx` while it is ready.
pub(crate) fn drain<B: Backend>(tx: &mut Consumer<'_>, backend: &mut B) {
    while backend.tx_ready() {
        match tx.pop() {
            Some(byte) => backend.tx_write(byte),
            None => break,
        }
    }
}

pub(crate) fn effective_echo_chunk(configured: usize) -> usize {
    match configured {
        0 => DEFAULT_ECHO_CHUNK,
        n => n.min(MAX_ECHO_CHUNK),
    }
}

/// Moves what `rx` holds on entry through `write` in chunks of at most `chunk` bytes.
///
/// Bytes arriving during the call are left for the next one.
pub(crate) fn echo(
    rx: &mut Consumer<'_>,
    chunk: usize,
    mut write: impl FnMut(&[u8]) -> usize,
) -> usize {
    let mut bounce = [0u8; MAX_ECHO_CHUNK];
    let mut pending = rx.len();
    let mut echoed = 0;

    while pending > 0 {
        let want = pending.min(chunk);
        let got = dequeue(rx, &mut bounce[..want]);
        if got == 0 {
            break;
        }
        pending -= got;
        echoed += write(&bounce[..got]);
    }

    echoed
}
