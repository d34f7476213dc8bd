//! Shared plumbing used by the sequencer, receiver, command and TCP
//! crates: a timer [`Scheduler`], listener [`dispatch`](dispatch::ByteDispatcher)
//! fan-out, the command bus's [`ring`](ring::PacketRing) of outstanding
//! packets, and the [`Activator`] failure-policy hook.

pub mod activator;
pub mod dispatch;
pub mod net;
pub mod ring;
pub mod scheduler;

pub use activator::{Activator, LoggingActivator};
pub use dispatch::ByteDispatcher;
pub use net::{bind_event_socket, resolve};
pub use ring::{PacketRing, PacketSlot};
pub use scheduler::{Scheduler, TaskId};
