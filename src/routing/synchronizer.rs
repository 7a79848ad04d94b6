use std::cmp::min;
use std::sync::Arc;
use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, trace, warn};
use crate::routing::error::RouterError;
use crate::routing::message::{ChannelId, Message, MessageObserver};
use crate::routing::message_store::MessageStore;


/// The thread currently allowed to read from the transport. A thread that owns the block can
///  request it again (e.g. when a channel handler called during dispatch waits for a message),
///  so ownership is counted.
#[derive(Debug)]
struct BlockOwner {
    thread: ThreadId,
    depth: usize,
}

struct SyncState<M> {
    owner: Option<BlockOwner>,
    global: MessageStore<M>,
    /// indexed by channel slot, `None` for free slots
    channels: Vec<Option<MessageStore<M>>>,
}

impl <M: Message> SyncState<M> {
    fn store_mut(&mut self, store: Option<ChannelId>) -> Result<&mut MessageStore<M>, RouterError> {
        match store {
            None => Ok(&mut self.global),
            Some(id) => self.channels.get_mut(id.index())
                .and_then(Option::as_mut)
                .ok_or(RouterError::UnknownChannel(id)),
        }
    }

    fn try_acquire(&mut self, thread: ThreadId, buffered: bool) -> bool {
        match &mut self.owner {
            Some(owner) if owner.thread == thread => {
                owner.depth += 1;
                trace!("reentrant block request from {:?} (depth {})", thread, owner.depth);
                true
            }
            Some(_) => false,
            // in buffered mode, only the message pump reads
            None if buffered => false,
            None => {
                self.owner = Some(BlockOwner { thread, depth: 1 });
                true
            }
        }
    }

    fn release(&mut self, thread: ThreadId) -> bool {
        match &mut self.owner {
            Some(owner) if owner.thread == thread => {
                owner.depth -= 1;
                if owner.depth == 0 {
                    self.owner = None;
                }
                true
            }
            _ => false,
        }
    }
}


/// The [Synchronizer] coordinates access to the transport between threads waiting for messages.
///  At any given time, at most one thread (the 'block owner') reads from the transport, and all
///  other threads waiting for a message are parked until they are notified that something may
///  have arrived for them.
///
/// All message stores live inside the synchronizer's state and are guarded by the same lock as
///  the block owner. A reader adds a message to its store *before* releasing the block and
///  notifying waiters, and waiters check their stores and park atomically with regard to that
///  lock, so no notification can get lost.
pub struct Synchronizer<M> {
    buffered: bool,
    poll_interval: Duration,
    state: Mutex<SyncState<M>>,
    waiting: Condvar,
}

impl <M: Message> Synchronizer<M> {
    pub fn new(buffered: bool, max_channels: usize, poll_interval: Duration) -> Synchronizer<M> {
        let mut channels = Vec::with_capacity(max_channels);
        channels.resize_with(max_channels, || None);

        Synchronizer {
            buffered,
            poll_interval,
            state: Mutex::new(SyncState {
                owner: None,
                global: MessageStore::global(),
                channels,
            }),
            waiting: Condvar::new(),
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Registers a thread's interest in a message from a given store (`None` for the global
    ///  store).
    ///
    /// * If the store has a message the observer wants, it is moved to `holder` and the call
    ///   returns `false`.
    /// * If the calling thread is granted the block, the call returns `true`. The caller must then
    ///   read and dispatch a single message, and call [Synchronizer::release_block] afterwards -
    ///   no matter whether reading succeeded.
    /// * Otherwise the calling thread parks until it is notified or `max_wait` (capped by the
    ///   poll interval) has passed, and the call returns `false`.
    pub fn request_block(
        &self,
        store: Option<ChannelId>,
        observer: &dyn MessageObserver<M>,
        holder: &mut Option<M>,
        max_wait: Option<Duration>,
    ) -> Result<bool, RouterError> {
        let mut state = self.state.lock();

        if let Some(message) = state.store_mut(store)?.next_message(observer) {
            *holder = Some(message);
            return Ok(false);
        }

        if state.try_acquire(thread::current().id(), self.buffered) {
            return Ok(true);
        }

        let wait = max_wait
            .map(|w| min(w, self.poll_interval))
            .unwrap_or(self.poll_interval);
        self.waiting.wait_for(&mut state, wait);
        Ok(false)
    }

    /// Registers the calling thread as block owner, waiting for a thread currently owning the
    ///  block to release it. This is for the message pump, which keeps the block for its entire
    ///  life time.
    pub fn acquire_block_for_pump(&self) {
        let current = thread::current().id();

        let mut state = self.state.lock();
        while state.owner.as_ref().is_some_and(|o| o.thread != current) {
            self.waiting.wait(&mut state);
        }
        match &mut state.owner {
            Some(owner) => owner.depth += 1,
            None => state.owner = Some(BlockOwner { thread: current, depth: 1 }),
        }
        debug!("{:?} acquired the block for the message pump", current);
    }

    /// Releases the block previously granted to the calling thread, and wakes all waiting
    ///  threads so they can check their stores and compete for the block.
    pub fn release_block(&self) {
        let current = thread::current().id();
        {
            let mut state = self.state.lock();
            if !state.release(current) {
                warn!("{:?} released a block it does not own - ignoring", current);
            }
        }
        self.waiting.notify_all();
    }

    /// Wakes all waiting threads so they re-check their stores
    pub fn release_waiting(&self) {
        self.waiting.notify_all();
    }

    pub fn is_block_owner(&self, thread: ThreadId) -> bool {
        self.state.lock().owner.as_ref()
            .is_some_and(|o| o.thread == thread)
    }

    /// Adds a message to the destination channel's store if that channel is allocated, and to
    ///  the global store otherwise.
    ///
    /// NB: This does not notify waiting threads - that is done when the block is released (or
    ///      explicitly by the message pump)
    pub fn deliver(&self, destination: Option<ChannelId>, message: M) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let channel_store = destination
            .and_then(|id| state.channels.get_mut(id.index()))
            .and_then(Option::as_mut);
        match channel_store {
            Some(store) => store.add_message(message),
            None => {
                if let Some(id) = destination {
                    debug!("channel {} is not allocated - adding message to the global store", id);
                }
                state.global.add_message(message)
            }
        }
    }

    pub fn open_store(&self, channel: ChannelId, observer: Arc<dyn MessageObserver<M>>) {
        let mut state = self.state.lock();
        match state.channels.get_mut(channel.index()) {
            Some(slot) => *slot = Some(MessageStore::new(observer)),
            None => warn!("no store slot for channel {} - this is a bug", channel),
        }
    }

    /// Removes a channel's store, discarding messages that were not picked up yet. Threads
    ///  waiting on that channel are woken and fail with [RouterError::UnknownChannel].
    pub fn close_store(&self, channel: ChannelId) {
        let removed = {
            let mut state = self.state.lock();
            state.channels.get_mut(channel.index())
                .and_then(Option::take)
        };
        if let Some(store) = removed {
            if !store.is_empty() {
                debug!("discarding {} unprocessed messages for channel {}", store.len(), channel);
            }
        }
        self.waiting.notify_all();
    }

    /// number of messages in a store, or `None` if there is no such store
    pub fn queued_messages(&self, store: Option<ChannelId>) -> Option<usize> {
        self.state.lock().store_mut(store)
            .ok()
            .map(|s| s.len())
    }
}
