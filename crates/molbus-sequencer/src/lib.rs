//! Sequencer-side components: builds and persists the event stream
//! ([`EventPublisher`], C4) and serves rewind/discovery requests against
//! the shared store ([`Rewinder`], C5).

pub mod error;
pub mod event_publisher;
pub mod rewinder;

pub use error::{PublishError, RewindError};
pub use event_publisher::EventPublisher;
pub use rewinder::Rewinder;
