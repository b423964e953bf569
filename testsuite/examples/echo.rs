//! Bytes pushed in from the "RX interrupt" come back out of UART0 unchanged.

#![no_std]
#![no_main]

use cortex_m_semihosting::hprintln;
use testsuite::uart::Lm3sUart;
use testsuite::{BAUD, entry, exit_failure, exit_success, flush_port};
use uart_core::{RingBuffer, RxSlot, TxSlot, Uart};

static RX: RxSlot<'static> = RxSlot::new();
static TX: TxSlot<'static, Lm3sUart> = TxSlot::new();

#[entry]
fn main() -> ! {
    hprintln!("uart-core echo test");

    let rx = cortex_m::singleton!(: [u8; 16] = [0; 16]).unwrap();
    let tx = cortex_m::singleton!(: [u8; 8] = [0; 8]).unwrap();
    let rx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(rx)).unwrap();
    let tx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(tx)).unwrap();
    let Ok(mut uart) = Uart::new(Lm3sUart::uart0(), BAUD, rx, tx) else {
        hprintln!("init failed");
        exit_failure();
    };
    uart.set_echo_chunk_size(4);
    let Ok(mut port) = uart.split(&RX, &TX) else {
        hprintln!("slots taken");
        exit_failure();
    };

    // Stand-in for the RX interrupt handler.
    for &b in b"hello, uart\n" {
        RX.on_rx_byte(b);
    }

    let echoed = port.echo_pump();
    flush_port(&mut port);
    hprintln!("echoed {} bytes", echoed);
    hprintln!("overflow {}", port.overflow_count());

    exit_success();
}
