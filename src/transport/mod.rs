//! A framed duplex transport abstraction for embedded systems
//!
//! The connection engine does not care what carries its frames. Anything
//! that can send a complete framed message and hand back complete inbound
//! frames can back the engine: a WebSocket wrapper, a length-prefixed TCP
//! stream, a serial link with its own framing. Implementations provide
//! their own error type; the engine treats any transport failure as opaque.

#![deny(unsafe_code)]

/// A duplex channel that moves whole frames.
///
/// Frames are treated as atomic units: `send` either transmits the whole
/// frame or fails, and `receive` only ever yields complete frames. Partial
/// delivery is the implementation's problem to hide.
pub trait Channel {
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Send one complete frame.
    fn send(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Receive one complete frame into `buf`, returning its length.
    ///
    /// Returns `Ok(0)` when no frame is pending. A frame larger than `buf`
    /// must be dropped by the implementation, not truncated into it.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}
