use std::sync::Arc;
use bit_set::BitSet;
use crate::routing::message::{ChannelId, MessageObserver, NoMessage};


/// The router's view of a channel. Channels themselves (windows, data streams, requests, ...)
///  are implemented outside the router.
pub trait ChannelHandler<M>: Send + Sync {
    /// Gives the channel a first look at a message addressed to it, before it is added to the
    ///  channel's message store. Returning `true` means the message was fully handled and is not
    ///  added to the store.
    ///
    /// NB: This is called by whichever thread happens to read the message from the transport
    fn process_channel_message(&self, message: &M) -> bool;

    /// The observer for the channel's message store, determining which messages remain in the
    ///  store after they were handed out. The default is to retain nothing.
    fn store_observer(&self) -> Arc<dyn MessageObserver<M>> {
        Arc::new(NoMessage)
    }
}


/// Fixed-size table of channel slots. A channel's [ChannelId] is the index of its slot.
///
/// This is not synchronized - the router holds it in a mutex.
pub struct ChannelTable<M> {
    slots: Vec<Option<Arc<dyn ChannelHandler<M>>>>,
    active: BitSet,
}

impl <M> ChannelTable<M> {
    pub fn new(capacity: usize) -> ChannelTable<M> {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        ChannelTable {
            slots,
            active: BitSet::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Puts the handler into the lowest free slot, returning `None` if all slots are taken
    pub fn allocate(&mut self, handler: Arc<dyn ChannelHandler<M>>) -> Option<ChannelId> {
        let idx = self.slots.iter().position(Option::is_none)?;
        self.slots[idx] = Some(handler);
        self.active.insert(idx);
        Some(ChannelId::new(idx))
    }

    /// Frees a channel's slot, but only if it is (still) held by the given handler: A duplicate
    ///  free must not remove a different channel that was allocated the same slot in the meantime.
    ///
    /// Returns `true` iff the slot was freed.
    pub fn free(&mut self, channel: ChannelId, handler: &Arc<dyn ChannelHandler<M>>) -> bool {
        if !self.is_held_by(channel, handler) {
            return false;
        }
        self.slots[channel.index()] = None;
        self.active.remove(channel.index());
        true
    }

    /// `true` iff the channel's slot is currently held by the given handler
    pub fn is_held_by(&self, channel: ChannelId, handler: &Arc<dyn ChannelHandler<M>>) -> bool {
        self.slots.get(channel.index())
            .and_then(Option::as_ref)
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(handler)))
    }

    pub fn get(&self, channel: ChannelId) -> Option<Arc<dyn ChannelHandler<M>>> {
        self.slots.get(channel.index())
            .and_then(Option::clone)
    }

    /// number of allocated channels
    pub fn len(&self) -> usize {
        self.active.count()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.active.iter()
            .map(ChannelId::new)
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::test_util::channel::TestChannel;
    use crate::test_util::message::TestMessage;
    use super::*;

    fn handler() -> Arc<dyn ChannelHandler<TestMessage>> {
        TestChannel::new()
    }

    #[test]
    fn test_allocate_until_full_then_reuse() {
        let mut table = ChannelTable::new(2);
        let first = handler();
        let second = handler();

        assert_eq!(table.allocate(first.clone()), Some(ChannelId::new(0)));
        assert_eq!(table.allocate(second.clone()), Some(ChannelId::new(1)));
        assert_eq!(table.allocate(handler()), None);
        assert_eq!(table.len(), 2);

        assert!(table.free(ChannelId::new(0), &first));
        assert_eq!(table.len(), 1);
        assert_eq!(table.active_channels(), vec![ChannelId::new(1)]);

        assert_eq!(table.allocate(handler()), Some(ChannelId::new(0)));
        assert_eq!(table.active_channels(), vec![ChannelId::new(0), ChannelId::new(1)]);
    }

    #[rstest]
    #[case::empty_slot(false, false)]
    #[case::other_handler(true, false)]
    fn test_free_ignored(#[case] occupy_with_other: bool, #[case] expected_freed: bool) {
        let mut table = ChannelTable::new(3);
        let mine = handler();
        let other = handler();
        if occupy_with_other {
            table.allocate(other.clone());
        }

        assert_eq!(table.free(ChannelId::new(0), &mine), expected_freed);
        assert_eq!(table.len(), usize::from(occupy_with_other));
        assert_eq!(table.get(ChannelId::new(0)).is_some(), occupy_with_other);
    }

    #[test]
    fn test_duplicate_free_after_reallocation() {
        let mut table = ChannelTable::new(1);
        let old = handler();
        let new = handler();

        let id = table.allocate(old.clone()).unwrap();
        assert!(table.free(id, &old));
        assert_eq!(table.allocate(new.clone()), Some(id));

        assert!(!table.free(id, &old));
        assert!(Arc::ptr_eq(&table.get(id).unwrap(), &new));
    }

    #[rstest]
    #[case::holder(0, true)]
    #[case::other_slot(1, false)]
    #[case::free_slot(2, false)]
    #[case::out_of_range(7, false)]
    fn test_is_held_by(#[case] slot: usize, #[case] expected: bool) {
        let mut table = ChannelTable::new(3);
        let mine = handler();
        table.allocate(mine.clone());
        table.allocate(handler());

        assert_eq!(table.is_held_by(ChannelId::new(slot), &mine), expected);
        assert_eq!(table.len(), 2);
        assert_eq!(table.active_channels().len(), table.len());
    }

    #[rstest]
    #[case::in_range(ChannelId::new(2), false)]
    #[case::out_of_range(ChannelId::new(3), false)]
    fn test_free_unallocated(#[case] channel: ChannelId, #[case] expected: bool) {
        let mut table = ChannelTable::<TestMessage>::new(3);
        assert_eq!(table.free(channel, &handler()), expected);
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 3);
    }
}
