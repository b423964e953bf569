//! The hardware capability set the driver core is generic over.

#[cfg(any(test, feature = "stub"))]
pub mod stub;

/// Register-level access to one UART peripheral.
///
/// [`crate::Uart`] only ever talks to hardware through this trait, so the same core runs against
/// a memory-mapped peripheral on target and against [`stub::StubBackend`] in host tests.
///
/// Implementations must not block: every method is called from interrupt context as well as
/// from the main loop.
pub trait Backend {
    /// Configures the peripheral for `baud` bits per second.
    ///
    /// Returns `false` if the peripheral could not be brought up at that rate.
    fn init(&mut self, baud: u32) -> bool;

    /// Whether the transmitter can accept another byte right now.
    fn tx_ready(&mut self) -> bool;

    /// Hands one byte to the transmitter.
    ///
    /// Only called after [`Backend::tx_ready`] returned `true`.
    fn tx_write(&mut self, byte: u8);

    /// Whether a received byte is waiting in the peripheral.
    ///
    /// Only used by polling deployments (see [`crate::Uart::poll_rx`]); interrupt-driven
    /// backends may keep the default, which reports nothing.
    #[inline]
    fn rx_available(&mut self) -> bool {
        false
    }

    /// Takes one received byte from the peripheral.
    ///
    /// Only called after [`Backend::rx_available`] returned `true`.
    #[inline]
    fn rx_read(&mut self) -> u8 {
        0
    }
}

impl<B: Backend + ?Sized> Backend for &mut B {
    #[inline]
    fn init(&mut self, baud: u32) -> bool {
        (**self).init(baud)
    }

    #[inline]
    fn tx_ready(&mut self) -> bool {
        (**self).tx_ready()
    }

    #[inline]
    fn tx_write(&mut self, byte: u8) {
        (**self).tx_write(byte)
    }

    #[inline]
    fn rx_available(&mut self) -> bool {
        (**self).rx_available()
    }

    #[inline]
    fn rx_read(&mut self) -> u8 {
        (**self).rx_read()
    }
}
