//! A stalled transmitter turns writes into short counts; nothing is lost once it resumes.

#![no_std]
#![no_main]

use cortex_m_semihosting::hprintln;
use testsuite::uart::{Gated, Lm3sUart};
use testsuite::{BAUD, entry, exit_failure, exit_success};
use uart_core::{RingBuffer, Uart};

const MESSAGE: &[u8] = b"The quick brown fox jumps over the lazy dog\n";

#[entry]
fn main() -> ! {
    hprintln!("uart-core backpressure test");

    let rx = cortex_m::singleton!(: [u8; 4] = [0; 4]).unwrap();
    let tx = cortex_m::singleton!(: [u8; 8] = [0; 8]).unwrap();
    let rx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(rx)).unwrap();
    let tx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(tx)).unwrap();
    let Ok(mut uart) = Uart::new(Gated::closed(Lm3sUart::uart0()), BAUD, rx, tx) else {
        hprintln!("init failed");
        exit_failure();
    };

    let queued = uart.write(MESSAGE);
    hprintln!("first write queued {} of {}", queued, MESSAGE.len());
    hprintln!("second write queued {}", uart.write(&MESSAGE[queued..]));

    uart.backend_mut().set_open(true);
    uart.service_tx();

    let mut rest = &MESSAGE[queued..];
    let mut writes = 0;
    while !rest.is_empty() {
        let n = uart.write(rest);
        rest = &rest[n..];
        writes += 1;
    }
    hprintln!("drained in {} writes", writes);
    hprintln!("tx queued {}", uart.tx_queued());

    exit_success();
}
