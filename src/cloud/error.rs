//! Common error types for cloud operations

/// A common error type for cloud operations.
///
/// This enum defines the errors the connection engine can report. It is
/// designed to be simple and portable for `no_std` environments. Errors
/// reach the caller through one of two routes: synchronously as the return
/// value of the operation that failed, or asynchronously through the
/// handler the caller registered for the request.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A bounded table (pending requests or subscriptions) is full.
    ///
    /// This is an admission-control boundary, not a transient glitch: the
    /// caller must retry later or drop the request. Nothing is evicted.
    Capacity,
    /// No response arrived within the configured request timeout.
    ///
    /// Delivered through the request's handler, never returned directly.
    Timeout,
    /// The cloud session dropped while the request was outstanding.
    ///
    /// Delivered through the handlers of every affected request when the
    /// session is lost. Re-establishing the session does not replay them.
    ConnectionLost,
    /// The operation requires an active cloud session.
    NotConnected,
    /// The channel failed to send.
    Transport,
    /// A value did not fit its fixed buffer or could not be encoded.
    Serialization,
    /// An inbound frame violated the wire protocol.
    Protocol,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Capacity => defmt::write!(f, "Capacity"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionLost => defmt::write!(f, "ConnectionLost"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::Transport => defmt::write!(f, "Transport"),
            Error::Serialization => defmt::write!(f, "Serialization"),
            Error::Protocol => defmt::write!(f, "Protocol"),
        }
    }
}
