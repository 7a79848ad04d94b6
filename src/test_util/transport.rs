use anyhow::anyhow;
use bytes::Bytes;
use crossbeam::channel as cbchan;
use tracing::trace;
use crate::routing::transport::FrameReader;
use crate::test_util::message::TestMessage;


/// Creates a transport for tests: frames sent through the returned [FrameFeed] are read by the
///  returned [ChannelFrameReader] in the order they were sent. Reading blocks while there is no
///  frame, and fails once all feeds are dropped - similar to a socket that was closed by the peer.
pub fn frame_channel() -> (FrameFeed, ChannelFrameReader) {
    let (sender, receiver) = cbchan::unbounded();
    (FrameFeed { sender }, ChannelFrameReader { frames: receiver })
}

#[derive(Clone)]
pub struct FrameFeed {
    sender: cbchan::Sender<anyhow::Result<Bytes>>,
}

impl FrameFeed {
    pub fn send(&self, message: &TestMessage) {
        self.send_frame(message.to_frame());
    }

    pub fn send_frame(&self, frame: Bytes) {
        // the reader may be gone already, which is fine for tests
        let _ = self.sender.send(Ok(frame));
    }

    /// the next read fails with the given error
    pub fn fail(&self, error: &str) {
        let _ = self.sender.send(Err(anyhow!(error.to_string())));
    }
}

pub struct ChannelFrameReader {
    frames: cbchan::Receiver<anyhow::Result<Bytes>>,
}

impl FrameReader for ChannelFrameReader {
    fn read_next_frame(&mut self) -> anyhow::Result<Bytes> {
        match self.frames.recv() {
            Ok(frame) => {
                trace!("test transport: read frame {:?}", frame.as_ref().map(|f| f.len()));
                frame
            }
            Err(_) => Err(anyhow!("transport closed")),
        }
    }
}
