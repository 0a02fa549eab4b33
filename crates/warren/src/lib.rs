//! Warren: jailed directory browsing over a line protocol
//!
//! Warren serves a single directory subtree ("the jail") to remote clients
//! over a line-oriented text protocol. Clients navigate with `CD`, enumerate
//! with `LIST`, and replay stored command files with `@name`; no client path,
//! however constructed, can resolve outside the jail.
//!
//! This crate is the session protocol engine only: command parsing and
//! dispatch, the jailed path resolver, the directory lister, and the bounded
//! script executor. Socket setup and the interactive client live in the
//! `warren-server` and `warren-cli` crates.

mod command;
mod jail;
pub mod limits;
mod list;
mod session;

pub use command::Command;
pub use jail::{Jail, ResolveError};
pub use list::{EntryKind, Lister};
pub use session::{CloseReason, Flow, Session};
