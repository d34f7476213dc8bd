use molbus_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("message length {0} exceeds the 1450-byte maximum")]
    TooLarge(usize),
    #[error("packet is full, call send() before acquiring another message")]
    PacketFull,
    #[error("session name not yet set")]
    SessionNotSet,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RewindError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
