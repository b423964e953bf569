//! A full receive FIFO drops the newest bytes and counts them.

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
    hprintln!("uart-core overflow test");

    let rx = cortex_m::singleton!(: [u8; 4] = [0; 4]).unwrap();
    let tx = cortex_m::singleton!(: [u8; 8] = [0; 8]).unwrap();
    let rx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(rx)).unwrap();
    let tx = cortex_m::singleton!(: RingBuffer<'static> = RingBuffer::new(tx)).unwrap();
    let Ok(uart) = Uart::new(Lm3sUart::uart0(), BAUD, rx, tx) else {
        hprintln!("init failed");
        exit_failure();
    };
    let Ok(mut port) = uart.split(&RX, &TX) else {
        hprintln!("slots taken");
        exit_failure();
    };

    for &b in b"abcdef" {
        RX.on_rx_byte(b);
    }

    hprintln!("rx available {}", port.rx_available());
    hprintln!("overflow {}", port.overflow_count());

    let mut buf = [0; 8];
    let n = port.read(&mut buf);
    hprintln!("read {} bytes", n);
    port.write(&buf[..n]);
    port.write(b"\n");
    flush_port(&mut port);

    port.clear_overflow();
    port.clear_overflow();
    hprintln!("overflow after clear {}", port.overflow_count());

    exit_success();
}
