use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("message length {0} exceeds the 1450-byte maximum")]
    TooLarge(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
