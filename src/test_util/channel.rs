use std::sync::Arc;
use parking_lot::Mutex;
use crate::routing::channel_table::ChannelHandler;
use crate::routing::message::MessageObserver;
use crate::test_util::message::TestMessage;


/// A channel for tests. It records every message that is offered to it, handles (i.e. consumes)
///  messages with a payload starting with the configured prefix, and has its store retain
///  close messages.
#[derive(Default)]
pub struct TestChannel {
    consumed_prefix: Option<Vec<u8>>,
    offered: Mutex<Vec<TestMessage>>,
}

impl TestChannel {
    pub fn new() -> Arc<TestChannel> {
        Arc::new(TestChannel::default())
    }

    pub fn consuming(prefix: &[u8]) -> Arc<TestChannel> {
        Arc::new(TestChannel {
            consumed_prefix: Some(prefix.to_vec()),
            offered: Default::default(),
        })
    }

    pub fn offered_seqs(&self) -> Vec<u64> {
        self.offered.lock()
            .iter()
            .map(|m| m.seq)
            .collect()
    }
}

impl ChannelHandler<TestMessage> for TestChannel {
    fn process_channel_message(&self, message: &TestMessage) -> bool {
        self.offered.lock().push(message.clone());

        self.consumed_prefix.as_ref()
            .map(|prefix| message.payload.starts_with(prefix))
            .unwrap_or(false)
    }

    fn store_observer(&self) -> Arc<dyn MessageObserver<TestMessage>> {
        Arc::new(|m: &TestMessage| m.is_close())
    }
}
