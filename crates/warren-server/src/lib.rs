//! Warren TCP server
//!
//! Socket front end for the `warren` session engine: bind/listen/accept,
//! one tokio task per connection, and cooperative shutdown. Sessions share
//! nothing mutable; each gets a clone of the immutable jail handle and its
//! own transport.
//!
//! The connection registry is owned here, not by the session core. Sessions
//! only see a shutdown receiver and check it between commands, so shutdown
//! is cooperative at safe points rather than preemptive.

mod registry;
mod server;

pub use registry::{ConnectionGuard, ConnectionRegistry};
pub use server::{BoundServer, Server, ServerConfig, shutdown_signal};
