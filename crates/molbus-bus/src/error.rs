use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Publish(#[from] molbus_sequencer::PublishError),
    #[error(transparent)]
    Command(#[from] molbus_commands::CommandError),
}
