use std::time::Duration;
use crate::routing::message::ChannelId;


/// Errors returned to callers waiting for a message.
///
/// Running out of channel slots is not an error: [crate::routing::message_router::MessageRouter::allocate_channel]
///  returns `None` for that.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No qualifying message arrived in time. The caller decides whether to retry.
    #[error("the message was not received before the specified timeout period ({timeout:?})")]
    Timeout {
        timeout: Duration,
    },

    /// Reading or decoding a frame failed. In buffered mode, each failure of the message pump is
    ///  reported to exactly one waiting caller.
    #[error("transport failure: {0:#}")]
    TransportFailure(#[source] anyhow::Error),

    /// The caller waits for a channel that is not (or no longer) allocated
    #[error("channel {0} is not allocated")]
    UnknownChannel(ChannelId),
}

impl RouterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RouterError::Timeout { .. })
    }
}
