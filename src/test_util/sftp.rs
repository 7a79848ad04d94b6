use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use anyhow::bail;
use parking_lot::Mutex;
use crate::routing::error::RouterError;
use crate::routing::message::{ChannelId, MessageObserver};
use crate::routing::message_router::MessageSource;
use crate::sftp::file_requests::{FileRequests, RequestId, StatusCode, StatusResponse};
use crate::test_util::message::TestMessage;
use crate::test_util::transport::FrameFeed;


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Write { request_id: u32, offset: u64, len: usize },
    Ack(u32),
    Close,
}

/// The file contents as assembled from write requests
#[derive(Default)]
struct RemoteFile {
    data: Vec<u8>,
    closed: bool,
}

impl RemoteFile {
    fn write(&mut self, offset: u64, data: &[u8]) {
        let offset = offset as usize;
        if self.data.len() < offset + data.len() {
            self.data.resize(offset + data.len(), 0);
        }
        self.data[offset..offset + data.len()].copy_from_slice(data);
    }
}

fn status_for(channel: ChannelId, request_id: u32, failing: Option<u32>) -> TestMessage {
    if failing == Some(request_id) {
        TestMessage::status(Some(channel), RequestId(request_id), StatusCode::Failure.into(), "disk full")
    }
    else {
        TestMessage::status(Some(channel), RequestId(request_id), StatusCode::Ok.into(), "")
    }
}


/// A single-threaded SFTP server stand-in: acknowledgements for write requests are queued
///  immediately, and the server doubles as the [MessageSource] they are picked up from. It keeps
///  a log of requests and acknowledgements in the order they happened.
pub struct ScriptedFileServer {
    channel: ChannelId,
    failing: Option<u32>,
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    next_id: u32,
    acks: VecDeque<TestMessage>,
    events: Vec<FileEvent>,
    file: RemoteFile,
}

impl ScriptedFileServer {
    pub fn new(channel: ChannelId) -> Arc<ScriptedFileServer> {
        Arc::new(ScriptedFileServer {
            channel,
            failing: None,
            state: Default::default(),
        })
    }

    /// the request with the given id is acknowledged with a failure status
    pub fn failing_request(channel: ChannelId, request_id: u32) -> Arc<ScriptedFileServer> {
        Arc::new(ScriptedFileServer {
            channel,
            failing: Some(request_id),
            state: Default::default(),
        })
    }

    pub fn events(&self) -> Vec<FileEvent> {
        self.state.lock().events.clone()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().file.data.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().file.closed
    }

    /// the maximum number of write requests that were in flight at the same time
    pub fn max_unacknowledged(&self) -> usize {
        let mut current = 0usize;
        let mut max = 0;
        for event in self.events() {
            match event {
                FileEvent::Write { .. } => current += 1,
                FileEvent::Ack(_) => current -= 1,
                FileEvent::Close => {}
            }
            max = max.max(current);
        }
        max
    }
}

impl FileRequests for ScriptedFileServer {
    fn post_write_request(&self, _handle: &[u8], offset: u64, data: &[u8]) -> anyhow::Result<RequestId> {
        let mut state = self.state.lock();
        let request_id = state.next_id;
        state.next_id += 1;

        state.file.write(offset, data);
        state.events.push(FileEvent::Write { request_id, offset, len: data.len() });
        state.acks.push_back(status_for(self.channel, request_id, self.failing));
        Ok(RequestId(request_id))
    }

    fn close_handle(&self, _handle: &[u8]) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        if state.file.closed {
            bail!("handle was closed before");
        }
        state.file.closed = true;
        state.events.push(FileEvent::Close);
        Ok(())
    }
}

impl MessageSource<TestMessage> for ScriptedFileServer {
    fn next_message(&self, channel: Option<ChannelId>, observer: &dyn MessageObserver<TestMessage>, timeout: Option<Duration>) -> Result<TestMessage, RouterError> {
        if channel != Some(self.channel) {
            return Err(RouterError::UnknownChannel(channel.unwrap_or(ChannelId::new(usize::MAX))));
        }

        let mut state = self.state.lock();
        let Some(idx) = state.acks.iter().position(|m| observer.wants_notification(m)) else {
            return Err(RouterError::Timeout { timeout: timeout.unwrap_or_default() });
        };
        let ack = state.acks.remove(idx).unwrap();
        if let Some(reply) = ack.status_response() {
            state.events.push(FileEvent::Ack(reply.request_id.0));
        }
        Ok(ack)
    }
}


/// An SFTP server stand-in that acknowledges write requests by sending status messages through
///  a test transport, for use with a real router
pub struct FeedingFileServer {
    channel: ChannelId,
    feed: FrameFeed,
    failing: Option<u32>,
    next_id: AtomicU32,
    file: Mutex<RemoteFile>,
}

impl FeedingFileServer {
    pub fn new(channel: ChannelId, feed: FrameFeed, failing: Option<u32>) -> Arc<FeedingFileServer> {
        Arc::new(FeedingFileServer {
            channel,
            feed,
            failing,
            next_id: AtomicU32::new(0),
            file: Default::default(),
        })
    }

    pub fn contents(&self) -> Vec<u8> {
        self.file.lock().data.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().closed
    }
}

impl FileRequests for FeedingFileServer {
    fn post_write_request(&self, _handle: &[u8], offset: u64, data: &[u8]) -> anyhow::Result<RequestId> {
        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.file.lock().write(offset, data);
        self.feed.send(&status_for(self.channel, request_id, self.failing));
        Ok(RequestId(request_id))
    }

    fn close_handle(&self, _handle: &[u8]) -> anyhow::Result<()> {
        self.file.lock().closed = true;
        Ok(())
    }
}
