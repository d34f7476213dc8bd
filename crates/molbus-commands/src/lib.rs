//! Command-channel components: [`CommandPublisher`] (C7) delivers each
//! command into the event stream exactly once via retransmit-until-echoed;
//! [`CommandReceiver`] (C8) is the sequencer-side intake for it.

pub mod command_publisher;
pub mod command_receiver;
pub mod error;

pub use command_publisher::CommandPublisher;
pub use command_receiver::CommandReceiver;
pub use error::CommandError;
