//! Facade layer (C10): [`BusServer`] for the sequencer side, [`BusClient`]
//! for the subscriber side, composing every lower-level crate into the two
//! entry points applications actually use.

pub mod bus_client;
pub mod bus_server;
pub mod error;

pub use bus_client::{BusClient, Provider};
pub use bus_server::{Acquired, BusServer};
pub use error::BusError;
