//! Wire-level types shared by every role in the bus: the session identity
//! (C1), the MoldUDP64 packet header/message codec (C3), the `inet:`
//! address format (§6), and the opaque message-schema descriptor.

pub mod address;
pub mod error;
pub mod packet;
pub mod schema;
pub mod session;

pub use address::Address;
pub use error::{AddressError, PacketError, SessionError};
pub use packet::{Header, Messages, HEADER_LEN, MAX_BODY_LEN, MAX_MESSAGE_LEN, MTU};
pub use schema::Schema;
pub use session::{Session, SessionName};
