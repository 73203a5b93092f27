//! Protocol parsers (component G): ASCII and binary memcached command
//! framing, emitting the shared `Command` records `crate::exec` runs.

pub mod ascii;
pub mod binary;
pub mod command;

pub use command::{Command, Framing, IncrDecrArgs, Protocol, StoreArgs};
