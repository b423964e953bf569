//! Formatted output through `core::fmt::Write`, plus an idle polling receive path.

#![no_std]
#![no_main]

use core::fmt::Write;
use cortex_m_semihosting::hprintln;
use testsuite::uart::Lm3sUart;
use testsuite::{BAUD, entry, exit_failure, exit_success, flush};
use uart_core::{RingBuffer, Uart};

#[entry]
fn main() -> ! {
    hprintln!("uart-core console test");

    let rx = cortex_m::singleton!(: [u8; 8] = [0; 8]).unwrap();
    let tx = cortex_m::singleton!(: [u8; 32] = [0; 32]).unwrap();
    let rx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(rx)).unwrap();
    let tx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(tx)).unwrap();
    let Ok(mut uart) = Uart::new(Lm3sUart::uart0(), BAUD, rx, tx) else {
        hprintln!("init failed");
        exit_failure();
    };

    let mut ok = 0;
    for i in 0..3 {
        if writeln!(uart, "count = {}", i).is_ok() {
            ok += 1;
        }
    }
    flush(&mut uart);
    hprintln!("writes ok {}", ok);

    // Nothing is attached to UART0's input.
    hprintln!("polled {} bytes", uart.poll_rx());

    exit_success();
}
