use thiserror::Error;

/// Errors raised by [`crate::session::Session`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("session name already set")]
    AlreadySet,
    #[error("session suffix must be exactly two ASCII bytes")]
    BadSuffix,
}

/// Errors raised while parsing or iterating a MoldUDP64 packet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet shorter than the 20-byte header")]
    Malformed,
    #[error("message length prefix overruns the packet")]
    LengthOverrun,
    #[error("message length {0} exceeds the maximum of 1450 bytes")]
    TooLarge(usize),
}

/// Byte position of a failure while parsing an `inet:` address string.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("malformed address at byte {position}: {reason}")]
pub struct AddressError {
    pub position: usize,
    pub reason: &'static str,
}
