//! Message routing core for an SSH client: many logical channels multiplexed over a single,
//!  strictly ordered transport that is shared by an arbitrary number of application threads.
//!
//! ## Design goals
//!
//! * Exactly one thread at a time reads from the transport. Reading is exposed to the rest of
//!   the stack as 'give me my next message', and whichever thread happens to do the actual read
//!   routes messages for other consumers to their message stores
//! * Threads waiting for a message block without polling the transport themselves, and are woken
//!   when something new may have arrived for them
//! * Two modes of operation:
//!   * *unbuffered*: a thread that finds nothing in its store becomes the reader for one message
//!     (if no other thread is reading at that time), dispatches it and hands over to the next
//!     thread
//!   * *buffered*: a dedicated 'message pump' thread reads continuously, and all application
//!     threads just wait to be notified. Errors encountered by the pump are handed to the next
//!     application thread asking for a message
//! * Messages for a given channel are delivered in the order they were read from the transport.
//!    There is no ordering guarantee across channels.
//! * Pipelined request / response on top of this for bulk transfers (SFTP writes): keep a
//!    configurable number of requests in flight, consuming acknowledgements in submission order
//!
//! ## Non-goals
//!
//! Framing, encryption, key exchange, authentication and formatting of protocol requests are
//!  handled elsewhere. This crate consumes them through [routing::transport::FrameReader],
//!  [routing::transport::MessageDecoder] and [sftp::file_requests::FileRequests].
//!
//! ## Lock order
//!
//! The only nested locking is the channel table's lock being held while the synchronizer's
//!  state is locked (for opening and closing message stores, and for delivering a dispatched
//!  message to the store of a channel that is still allocated). All other locks (transport reader,
//!  pump state, shutdown hooks, thread exit hook) are never held while acquiring another lock.

pub mod routing;
pub mod sftp;
pub mod test_util;
