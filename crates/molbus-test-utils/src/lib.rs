//! Shared test utilities: a fixed-offset demo [`Schema`](molbus_protocol::Schema),
//! loopback UDP socket helpers, and a full publisher/receiver harness —
//! used by the library crates' integration tests and the demo binaries.

pub mod harness;
pub mod schema;
pub mod udp;

pub use harness::LoopbackHarness;
pub use schema::{build_application_definition, build_message, DemoSchema};
pub use udp::{bind_loopback, loopback_pair};
