use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;
use crate::routing::message::{Message, MessageObserver, NoMessage};


/// The queue of messages that were read from the transport for a given consumer (a channel, or
///  the 'global' consumer for messages without a channel), but that were not picked up yet.
///
/// The store does no filtering of its own when messages are added - deciding where a message
///  belongs is the router's job. It is not synchronized either: all access happens while holding
///  the [crate::routing::synchronizer::Synchronizer]'s lock.
pub struct MessageStore<M> {
    messages: VecDeque<M>,
    /// decides which messages remain in the store after they were handed out
    observer: Arc<dyn MessageObserver<M>>,
}

impl <M: Message> MessageStore<M> {
    pub fn new(observer: Arc<dyn MessageObserver<M>>) -> MessageStore<M> {
        MessageStore {
            messages: VecDeque::new(),
            observer,
        }
    }

    /// The store for messages that are not associated with an (allocated) channel. It does not
    ///  retain any messages.
    pub fn global() -> MessageStore<M> {
        Self::new(Arc::new(NoMessage))
    }

    pub fn add_message(&mut self, message: M) {
        self.messages.push_back(message);
    }

    pub fn has_message(&self, observer: &dyn MessageObserver<M>) -> bool {
        self.messages.iter()
            .any(|m| observer.wants_notification(m))
    }

    /// Returns the oldest message the observer is interested in. The message is removed from the
    ///  store unless the store's own observer asks for it to be retained, in which case a copy
    ///  is returned.
    pub fn next_message(&mut self, observer: &dyn MessageObserver<M>) -> Option<M> {
        let idx = self.messages.iter()
            .position(|m| observer.wants_notification(m))?;

        if self.observer.wants_notification(&self.messages[idx]) {
            trace!("returning retained message at position {}", idx);
            return Some(self.messages[idx].clone());
        }
        self.messages.remove(idx)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::routing::message::AnyMessage;
    use crate::test_util::message::TestMessage;
    use super::*;

    fn store_with(observer: Arc<dyn MessageObserver<TestMessage>>, seqs: &[u64]) -> MessageStore<TestMessage> {
        let mut store = MessageStore::new(observer);
        for &seq in seqs {
            store.add_message(TestMessage::data(None, seq, b""));
        }
        store
    }

    #[test]
    fn test_fifo() {
        let mut store = store_with(Arc::new(NoMessage), &[1, 2, 3]);

        assert_eq!(store.len(), 3);
        assert_eq!(store.next_message(&AnyMessage).map(|m| m.seq), Some(1));
        assert_eq!(store.next_message(&AnyMessage).map(|m| m.seq), Some(2));
        assert_eq!(store.next_message(&AnyMessage).map(|m| m.seq), Some(3));
        assert_eq!(store.next_message(&AnyMessage), None);
        assert!(store.is_empty());
    }

    #[rstest]
    #[case::first(vec![1,2,3], 1, Some(1), vec![2,3])]
    #[case::middle(vec![1,2,3], 2, Some(2), vec![1,3])]
    #[case::last(vec![1,2,3], 3, Some(3), vec![1,2])]
    #[case::oldest_of_several(vec![4,2,4], 4, Some(4), vec![2,4])]
    #[case::none(vec![1,2,3], 5, None, vec![1,2,3])]
    #[case::empty(vec![], 1, None, vec![])]
    fn test_next_message_selects(#[case] initial: Vec<u64>, #[case] wanted: u64, #[case] expected: Option<u64>, #[case] remaining: Vec<u64>) {
        let mut store = store_with(Arc::new(NoMessage), &initial);

        let observer = move |m: &TestMessage| m.seq == wanted;
        assert_eq!(store.has_message(&observer), expected.is_some());
        assert_eq!(store.next_message(&observer).map(|m| m.seq), expected);

        let mut actual_remaining = Vec::new();
        while let Some(msg) = store.next_message(&AnyMessage) {
            actual_remaining.push(msg.seq);
        }
        assert_eq!(actual_remaining, remaining);
    }

    #[test]
    fn test_retained_message() {
        let sticky = |m: &TestMessage| m.is_close();

        let mut store = MessageStore::<TestMessage>::new(Arc::new(sticky));
        store.add_message(TestMessage::data(None, 1, b"a"));
        store.add_message(TestMessage::close(None, 2));

        assert_eq!(store.next_message(&AnyMessage).map(|m| m.seq), Some(1));
        assert_eq!(store.next_message(&AnyMessage).map(|m| m.seq), Some(2));
        assert_eq!(store.next_message(&AnyMessage).map(|m| m.seq), Some(2));
        assert_eq!(store.len(), 1);
    }
}
