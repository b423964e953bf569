#![no_std]

pub mod uart;

use cortex_m_semihosting::debug::{self, EXIT_FAILURE, EXIT_SUCCESS};
use panic_semihosting as _;
use uart_core::{Backend, Port, Uart};

pub use cortex_m_rt::entry;

/// Baud rate used by every example.
pub const BAUD: u32 = 115_200;

pub fn exit_success() -> ! {
    debug::exit(EXIT_SUCCESS);
    #[allow(clippy::empty_loop)]
    loop {}
}

pub fn exit_failure() -> ! {
    debug::exit(EXIT_FAILURE);
    #[allow(clippy::empty_loop)]
    loop {}
}

/// Services the transmitter until the transmit FIFO is empty.
///
/// Spins forever if the backend never becomes ready, so only use this with an open line.
pub fn flush<B: Backend>(uart: &mut Uart<'_, B>) {
    while uart.tx_queued() > 0 {
        uart.service_tx();
    }
}

/// Kicks the transmitter of a split driver until the transmit FIFO is empty.
///
/// Each kick is its own short critical section, so interrupts get in between.
pub fn flush_port<B: Backend>(port: &mut Port<'_, B>) {
    while port.tx_queued() > 0 {
        port.service_tx();
    }
}
