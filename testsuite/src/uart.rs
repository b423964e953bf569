//! PL011 backend for the LM3S6965 UARTs (QEMU testing only).
//!
//! Clock gating and pin muxing are skipped; QEMU does not model them.
//!
//! QEMU serial port mapping: `qemu-system-arm ... -serial <uart0> -serial <uart1>`
//! The first `-serial` argument maps to UART0, the second to UART1, etc.

use core::ptr::{with_exposed_provenance, with_exposed_provenance_mut};
use uart_core::Backend;

const UART0_BASE: usize = 0x4000_C000;

const UART_DR_OFFSET: usize = 0x000; // Data Register
const UART_FR_OFFSET: usize = 0x018; // Flag Register
const UART_IBRD_OFFSET: usize = 0x024; // Integer Baud-Rate Divisor
const UART_FBRD_OFFSET: usize = 0x028; // Fractional Baud-Rate Divisor
const UART_LCRH_OFFSET: usize = 0x02C; // Line Control
const UART_CTL_OFFSET: usize = 0x030; // Control

const UART_FR_RXFE: u32 = 0x10; // Receive FIFO Empty
const UART_FR_TXFF: u32 = 0x20; // Transmit FIFO Full
const UART_LCRH_FEN: u32 = 0x10; // FIFO Enable
const UART_LCRH_WLEN_8: u32 = 0x60; // 8 data bits
const UART_CTL_UARTEN: u32 = 0x001;
const UART_CTL_TXE: u32 = 0x100;
const UART_CTL_RXE: u32 = 0x200;

/// Reset value of the LM3S6965 system clock (precision internal oscillator).
const SYSCLK_HZ: u32 = 12_000_000;

/// One memory-mapped PL011 instance.
pub struct Lm3sUart {
    base: usize,
}

impl Lm3sUart {
    /// UART0, wired to QEMU's first `-serial` backend.
    pub const fn uart0() -> Self {
        Self { base: UART0_BASE }
    }

    fn read_reg(&self, offset: usize) -> u32 {
        let reg = with_exposed_provenance::<u32>(self.base + offset);
        unsafe { reg.read_volatile() }
    }

    fn write_reg(&mut self, offset: usize, value: u32) {
        let reg = with_exposed_provenance_mut::<u32>(self.base + offset);
        unsafe { reg.write_volatile(value) }
    }
}

/// Baud-rate divisor in 1/64ths, rounded to nearest, or `None` if it does not fit the
/// 16.6 fixed-point IBRD/FBRD pair.
fn divisor(baud: u32) -> Option<u32> {
    if baud == 0 {
        return None;
    }
    // SYSCLK / (16 * baud) * 64, with one extra bit for rounding.
    let div = (8 * u64::from(SYSCLK_HZ) / u64::from(baud)).div_ceil(2);
    let div = u32::try_from(div).ok()?;
    let ibrd = div >> 6;
    (1..=0xFFFF).contains(&ibrd).then_some(div)
}

impl Backend for Lm3sUart {
    fn init(&mut self, baud: u32) -> bool {
        let Some(div) = divisor(baud) else {
            return false;
        };

        self.write_reg(UART_CTL_OFFSET, 0);
        self.write_reg(UART_IBRD_OFFSET, div >> 6);
        self.write_reg(UART_FBRD_OFFSET, div & 0x3F);
        // LCRH must be written after the divisors to latch them.
        self.write_reg(UART_LCRH_OFFSET, UART_LCRH_WLEN_8 | UART_LCRH_FEN);
        self.write_reg(
            UART_CTL_OFFSET,
            UART_CTL_UARTEN | UART_CTL_TXE | UART_CTL_RXE,
        );
        true
    }

    fn tx_ready(&mut self) -> bool {
        self.read_reg(UART_FR_OFFSET) & UART_FR_TXFF == 0
    }

    fn tx_write(&mut self, byte: u8) {
        self.write_reg(UART_DR_OFFSET, u32::from(byte));
    }

    fn rx_available(&mut self) -> bool {
        self.read_reg(UART_FR_OFFSET) & UART_FR_RXFE == 0
    }

    fn rx_read(&mut self) -> u8 {
        // Bits 8..12 carry framing/parity/break/overrun flags.
        (self.read_reg(UART_DR_OFFSET) & 0xFF) as u8
    }
}

/// A backend whose transmitter can be switched off, to provoke backpressure on an emulated
/// line that is otherwise always ready.
pub struct Gated<B> {
    inner: B,
    open: bool,
}

impl<B> Gated<B> {
    /// Wraps `inner` with the gate closed.
    pub const fn closed(inner: B) -> Self {
        Self { inner, open: false }
    }

    /// Opens or closes the transmit gate.
    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }
}

impl<B: Backend> Backend for Gated<B> {
    fn init(&mut self, baud: u32) -> bool {
        self.inner.init(baud)
    }

    fn tx_ready(&mut self) -> bool {
        self.open && self.inner.tx_ready()
    }

    fn tx_write(&mut self, byte: u8) {
        self.inner.tx_write(byte)
    }

    fn rx_available(&mut self) -> bool {
        self.inner.rx_available()
    }

    fn rx_read(&mut self) -> u8 {
        self.inner.rx_read()
    }
}
