//! Deterministic stand-in for a UART peripheral.
//!
//! Transmitted bytes land in a caller-supplied sink, received bytes are replayed from a
//! caller-supplied script, and transmit readiness is rationed with a byte credit so tests can
//! model a slow or stalled line.

use super::Backend;

/// A scripted [`Backend`] for host tests.
#[derive(Debug)]
pub struct StubBackend<'a> {
    sink: &'a mut [u8],
    sent: usize,
    script: &'a [u8],
    received: usize,
    /// Bytes the transmitter accepts before reporting "not ready". `None` means no limit.
    credit: Option<usize>,
    init_ok: bool,
    baud: Option<u32>,
}

impl<'a> StubBackend<'a> {
    /// Creates a stub that is always ready to transmit and has nothing to receive.
    ///
    /// Bytes written past the end of `sink` are silently discarded, like a wire nobody listens
    /// to.
    pub fn new(sink: &'a mut [u8]) -> Self {
        Self {
            sink,
            sent: 0,
            script: &[],
            received: 0,
            credit: None,
            init_ok: true,
            baud: None,
        }
    }

    /// Replays `script` through the polling receive path.
    pub fn with_rx_script(mut self, script: &'a [u8]) -> Self {
        self.script = script;
        self.received = 0;
        self
    }

    /// Makes [`Backend::init`] report failure.
    pub fn failing_init(mut self) -> Self {
        self.init_ok = false;
        self
    }

    /// Limits how many more bytes the transmitter accepts. `None` lifts the limit.
    pub fn set_tx_credit(&mut self, credit: Option<usize>) {
        self.credit = credit;
    }

    /// Remaining transmit credit, `None` if unlimited.
    pub fn tx_credit(&self) -> Option<usize> {
        self.credit
    }

    /// Bytes that made it onto the wire, in order.
    pub fn sent(&self) -> &[u8] {
        &self.sink[..self.sent]
    }

    /// Baud rate of the last [`Backend::init`] call.
    pub fn baud(&self) -> Option<u32> {
        self.baud
    }

    /// Script bytes not yet read through [`Backend::rx_read`].
    pub fn rx_remaining(&self) -> usize {
        self.script.len() - self.received
    }
}

impl Backend for StubBackend<'_> {
    fn init(&mut self, baud: u32) -> bool {
        self.baud = Some(baud);
        self.init_ok
    }

    fn tx_ready(&mut self) -> bool {
        self.credit.is_none_or(|c| c > 0)
    }

    fn tx_write(&mut self, byte: u8) {
        if let Some(slot) = self.sink.get_mut(self.sent) {
            *slot = byte;
            self.sent += 1;
        }
        if let Some(c) = self.credit.as_mut() {
            *c = c.saturating_sub(1);
        }
    }

    fn rx_available(&mut self) -> bool {
        self.received < self.script.len()
    }

    fn rx_read(&mut self) -> u8 {
        match self.script.get(self.received) {
            Some(&byte) => {
                self.received += 1;
                byte
            }
            None => 0,
        }
    }
}
