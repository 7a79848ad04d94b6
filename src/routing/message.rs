use std::fmt::{Debug, Display, Formatter};


/// A [ChannelId] is the index of a channel's slot in the router's channel table. Slots are reused
///  after a channel is freed, so an id identifies a channel only while that channel is allocated.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChannelId(pub usize);

impl ChannelId {
    pub const fn new(index: usize) -> ChannelId {
        ChannelId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl Debug for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}


/// A decoded protocol message. Messages are immutable once they are decoded, and they are
///  handed between threads: the thread reading a message from the transport is often not the
///  thread consuming it.
///
/// `Clone` is required for messages that a store retains after they were observed (see
///  [MessageObserver]). Message types with big payloads should make cloning cheap, e.g. by
///  holding their payload in `bytes::Bytes`.
pub trait Message: Clone + Send + 'static {
    /// The channel this message is addressed to, or `None` for messages that are not associated
    ///  with a channel (e.g. global requests or key exchange messages)
    fn channel_id(&self) -> Option<ChannelId>;
}


/// A predicate on messages. This is used for two distinct purposes:
/// * callers waiting for a message pass an observer to select the messages they are interested in
/// * each message store has an observer deciding which messages the store *retains* after they
///    were handed out. This is for messages that all waiters on a channel should see, e.g. a
///    notification that the channel was closed by the peer
pub trait MessageObserver<M>: Send + Sync {
    fn wants_notification(&self, message: &M) -> bool;
}

impl <M, F> MessageObserver<M> for F
where F: Fn(&M) -> bool + Send + Sync
{
    fn wants_notification(&self, message: &M) -> bool {
        self(message)
    }
}

/// Observer that accepts every message
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMessage;
impl <M> MessageObserver<M> for AnyMessage {
    fn wants_notification(&self, _message: &M) -> bool {
        true
    }
}

/// Observer that rejects every message. This is the store observer of the global message store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMessage;
impl <M> MessageObserver<M> for NoMessage {
    fn wants_notification(&self, _message: &M) -> bool {
        false
    }
}
