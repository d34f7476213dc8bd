//! TCP unicast variant (C9): same wire format at the message layer, with
//! length-prefixed framing plus heartbeats instead of MoldUDP64 packets.

pub mod error;
pub mod frame;
pub mod message_publisher;
pub mod message_receiver;

pub use error::TcpError;
pub use frame::Frame;
pub use message_publisher::MessagePublisher;
pub use message_receiver::MessageReceiver;
