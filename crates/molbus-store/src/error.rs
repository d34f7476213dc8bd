use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sequence number {seq} out of range [1, {count}]")]
    OutOfRange { seq: u64, count: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("destination buffer too small: need {need}, have {have}")]
    DestinationTooSmall { need: usize, have: usize },
}
