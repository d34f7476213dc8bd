use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad rewind address: {0}")]
    BadAddress(#[from] molbus_protocol::AddressError),
}
