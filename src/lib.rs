//! depot: a small multi-client TCP file depot server and its CLI client.
//!
//! The server admits up to a configured number of concurrent clients,
//! assigns each a sequential identity, and serves a newline-delimited text
//! protocol: echo with acknowledgement, session status, file listing,
//! length-prefixed file download, and clean disconnect. Session history is
//! kept in memory for the life of the process.

pub mod client;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod repository;
pub mod server;
