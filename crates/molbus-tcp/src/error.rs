use thiserror::Error;

#[derive(Debug, Error)]
pub enum TcpError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: length prefix {0}")]
    MalformedFrame(i16),
    #[error("store error: {0}")]
    Store(#[from] molbus_store::StoreError),
    #[error("inactivity timeout waiting for a frame")]
    InactivityTimeout,
}
