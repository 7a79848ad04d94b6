use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use crate::routing::channel_table::{ChannelHandler, ChannelTable};
use crate::routing::error::RouterError;
use crate::routing::message::{ChannelId, Message, MessageObserver};
use crate::routing::message_pump::PumpState;
use crate::routing::router_config::RouterConfig;
use crate::routing::synchronizer::Synchronizer;
use crate::routing::transport::{FrameReader, GlobalMessageHandler, MessageDecoder};


/// Called once when the router is stopped. Errors (and panics) are logged and do not keep the
///  remaining hooks from running.
pub type ShutdownHook = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;


/// The seam between the router and its consumers: 'wait for the next message of this channel'.
///  This is what higher-level protocol code (e.g. the SFTP write stream) depends on.
pub trait MessageSource<M>: Send + Sync {
    fn next_message(&self, channel: Option<ChannelId>, observer: &dyn MessageObserver<M>, timeout: Option<Duration>) -> Result<M, RouterError>;
}


/// The [MessageRouter] is where all parts of message routing come together. It owns the
///  transport's reader side, the channel table and the message stores, and it provides the
///  single blocking operation for consumers: [MessageRouter::next_message].
///
/// Message decoding and handling of global messages are protocol specific and injected as
///  capabilities `D` and `G`.
pub struct MessageRouter<M, D, G> {
    config: RouterConfig,
    reader: Mutex<Box<dyn FrameReader>>,
    decoder: D,
    global_handler: G,
    sync: Synchronizer<M>,
    channels: Mutex<ChannelTable<M>>,
    pub(crate) pump: Mutex<PumpState>,
    shutdown_hooks: Mutex<Vec<ShutdownHook>>,
    thread_exit_hook: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

/// Releases the block when it goes out of scope, so a failing (or panicking) read cannot leave
///  the block owned and starve all other waiting threads
struct BlockGuard<'a, M: Message>(&'a Synchronizer<M>);
impl <M: Message> Drop for BlockGuard<'_, M> {
    fn drop(&mut self) {
        self.0.release_block();
    }
}

impl <M, D, G> MessageRouter<M, D, G>
where
    M: Message,
    D: MessageDecoder<M>,
    G: GlobalMessageHandler<M>,
{
    pub fn new(
        config: RouterConfig,
        reader: Box<dyn FrameReader>,
        decoder: D,
        global_handler: G,
    ) -> anyhow::Result<MessageRouter<M, D, G>> {
        config.validate()?;

        debug!("initializing {} message router with {} channel slots", if config.buffered { "buffered" } else { "unbuffered" }, config.max_channels);
        Ok(MessageRouter {
            sync: Synchronizer::new(config.buffered, config.max_channels, config.wait_poll_interval),
            channels: Mutex::new(ChannelTable::new(config.max_channels)),
            reader: Mutex::new(reader),
            decoder,
            global_handler,
            pump: Default::default(),
            shutdown_hooks: Default::default(),
            thread_exit_hook: Default::default(),
            config,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn is_buffered(&self) -> bool {
        self.config.buffered
    }

    pub fn max_channels(&self) -> usize {
        self.config.max_channels
    }

    /// number of currently allocated channels
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.channels.lock().active_channels()
    }

    pub fn is_blocking_thread(&self, thread: ThreadId) -> bool {
        self.sync.is_block_owner(thread)
    }

    pub(crate) fn synchronizer(&self) -> &Synchronizer<M> {
        &self.sync
    }

    /// Allocates a slot in the channel table and an empty message store for the channel.
    ///
    /// Returns `None` if all slots are taken - callers are expected to refuse opening the channel
    ///  in that case.
    pub fn allocate_channel(&self, handler: Arc<dyn ChannelHandler<M>>) -> Option<ChannelId> {
        let observer = handler.store_observer();

        let mut channels = self.channels.lock();
        match channels.allocate(handler) {
            Some(id) => {
                self.sync.open_store(id, observer);
                debug!("allocated channel {}", id);
                Some(id)
            }
            None => {
                debug!("all {} channel slots are taken", channels.capacity());
                None
            }
        }
    }

    /// Frees a channel's slot and discards its message store. This is a no-op if the slot is
    ///  free already or was allocated to a different channel in the meantime.
    pub fn free_channel(&self, channel: ChannelId, handler: &Arc<dyn ChannelHandler<M>>) {
        let mut channels = self.channels.lock();
        if channels.free(channel, handler) {
            self.sync.close_store(channel);
            debug!("freed channel {}", channel);
        }
        else {
            trace!("channel {} was freed before", channel);
        }
    }

    pub fn add_shutdown_hook(&self, hook: impl FnOnce() -> anyhow::Result<()> + Send + 'static) {
        self.shutdown_hooks.lock().push(Box::new(hook));
    }

    /// Registers code to run on the message pump's thread whenever that thread terminates (for
    ///  whatever reason). If the pump is restarted, the hook runs again when the new pump exits.
    pub fn set_thread_exit_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.thread_exit_hook.lock() = Some(Arc::new(hook));
    }

    pub(crate) fn on_thread_exit(&self) {
        // the hook may register a different hook, so it must not run under the lock
        let hook = self.thread_exit_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Waits for the next message for a given channel (`None` for the global message store)
    ///  that the observer is interested in. If `timeout` is `None`, this waits indefinitely.
    ///
    /// The calling thread may end up reading messages from the transport for other channels
    ///  while it waits.
    pub fn next_message(
        &self,
        channel: Option<ChannelId>,
        observer: &dyn MessageObserver<M>,
        timeout: Option<Duration>,
    ) -> Result<M, RouterError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        if self.config.verbose {
            match channel {
                Some(id) => trace!("waiting for message in the store of channel {}", id),
                None => trace!("waiting for message in the global store"),
            }
        }

        let mut holder = None;
        loop {
            if self.config.buffered {
                if let Some(e) = self.take_pump_error() {
                    debug!("message pump failed - reporting to this caller: {:#}", e);
                    return Err(RouterError::TransportFailure(e));
                }
            }

            let max_wait = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if self.sync.request_block(channel, observer, &mut holder, max_wait)? {
                let _block = BlockGuard(&self.sync);
                if self.config.verbose {
                    trace!("block for message");
                }
                self.block_for_message()
                    .map_err(RouterError::TransportFailure)?;
            }

            if let Some(message) = holder.take() {
                return Ok(message);
            }

            if let (Some(deadline), Some(timeout)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    debug!("message timeout reached after {:?}", timeout);
                    return Err(RouterError::Timeout { timeout });
                }
            }
        }
    }

    /// Reads a single message from the transport and dispatches it. Only the block owner may
    ///  call this.
    pub(crate) fn block_for_message(&self) -> anyhow::Result<()> {
        let frame = self.reader.lock().read_next_frame()?;
        let message = self.decoder.decode(frame)?;
        if self.config.verbose {
            trace!("read next message");
        }

        let destination = message.channel_id()
            .and_then(|id| self.channels.lock().get(id).map(|handler| (id, handler)));

        let processed = match &destination {
            Some((_, handler)) => handler.process_channel_message(&message),
            None => self.global_handler.process_global_message(&message),
        };

        if processed {
            if self.config.verbose {
                trace!("message was processed by its destination");
            }
            return Ok(());
        }

        // The channel may have been freed (and its slot reallocated) while its handler ran. The
        //  channel table stays locked until the message is in its store, which is the same lock
        //  order as allocation.
        let channels = self.channels.lock();
        let store = destination
            .filter(|(id, handler)| channels.is_held_by(*id, handler))
            .map(|(id, _)| id);
        if store.is_none() && message.channel_id().is_some() {
            debug!("channel {:?} is not allocated - adding message to the global store", message.channel_id());
        }
        self.sync.deliver(store, message);
        Ok(())
    }

    /// Shuts the router down: The message pump (if any) is stopped, and all shutdown hooks
    ///  are run in the order they were registered.
    pub fn stop(&self) {
        self.signal_closing_state();
        self.stop_pump();

        let hooks = std::mem::take(&mut *self.shutdown_hooks.lock());
        debug!("running {} shutdown hooks", hooks.len());
        for (idx, hook) in hooks.into_iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(hook)) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("shutdown hook #{} failed: {:#}", idx, e),
                Err(_) => warn!("shutdown hook #{} panicked", idx),
            }
        }

        self.sync.release_waiting();
    }
}

impl <M, D, G> MessageSource<M> for MessageRouter<M, D, G>
where
    M: Message,
    D: MessageDecoder<M>,
    G: GlobalMessageHandler<M>,
{
    fn next_message(&self, channel: Option<ChannelId>, observer: &dyn MessageObserver<M>, timeout: Option<Duration>) -> Result<M, RouterError> {
        MessageRouter::next_message(self, channel, observer, timeout)
    }
}
