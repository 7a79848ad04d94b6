use bytes::Bytes;
#[cfg(test)] use mockall::automock;


/// This is the abstraction of the underlying transport, introduced to keep framing, decryption
///  and MAC verification out of the routing code and to facilitate mocking the I/O away for
///  testing.
///
/// The router guarantees that only one thread at a time calls this, and that it is not called
///  concurrently with itself, so implementations can block.
#[cfg_attr(test, automock)]
pub trait FrameReader: Send + 'static {
    /// Blocks until the next complete frame is available. An error means the transport is
    ///  unusable.
    fn read_next_frame(&mut self) -> anyhow::Result<Bytes>;
}


/// Turns a frame into a typed message
pub trait MessageDecoder<M>: Send + Sync + 'static {
    fn decode(&self, frame: Bytes) -> anyhow::Result<M>;
}

impl <M, F> MessageDecoder<M> for F
where F: Fn(Bytes) -> anyhow::Result<M> + Send + Sync + 'static
{
    fn decode(&self, frame: Bytes) -> anyhow::Result<M> {
        self(frame)
    }
}


/// Gets the first look at every message that has no (allocated) destination channel. Returning
///  `true` means the message was fully handled and is not added to the global message store.
///
/// NB: This is called by whichever thread happens to read the message from the transport, so
///      it should not block
pub trait GlobalMessageHandler<M>: Send + Sync + 'static {
    fn process_global_message(&self, message: &M) -> bool;
}

impl <M, F> GlobalMessageHandler<M> for F
where F: Fn(&M) -> bool + Send + Sync + 'static
{
    fn process_global_message(&self, message: &M) -> bool {
        self(message)
    }
}

/// Adds all global messages to the global message store
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreGlobalMessages;
impl <M> GlobalMessageHandler<M> for StoreGlobalMessages {
    fn process_global_message(&self, _message: &M) -> bool {
        false
    }
}
