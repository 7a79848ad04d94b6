//! Utilities for testing code built on the message router: a simple message type with its own
//!  frame format, a transport that is fed through a channel, and channel / SFTP collaborators
//!  that record what they see.
//!
//! They are used for testing the router itself, but they are exported for application testing
//!  as well, which is why this is regular (non-#[cfg(test)]) code.

pub mod message;
pub mod transport;
pub mod channel;
pub mod sftp;
