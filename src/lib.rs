#![no_std]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub use backend::Backend;
pub use port::Port;
pub use ring_buffer::{Consumer, Producer, RingBuffer};
pub use shared::{RxSlot, TxSlot};
pub use uart::{DEFAULT_ECHO_CHUNK, InitError, MAX_ECHO_CHUNK, Uart};

pub mod backend;
mod port;
mod ring_buffer;
mod shared;
mod uart;
