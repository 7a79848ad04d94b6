use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use crate::routing::message::{ChannelId, Message};
use crate::sftp::file_requests::{RequestId, StatusReply, StatusResponse};


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestMessageKind {
    Data,
    /// the peer closed the channel - channel stores of [crate::test_util::channel::TestChannel]
    ///  retain these
    Close,
    Status { request_id: RequestId, code: u32 },
}

/// Message type for tests, with a trivial frame format (all numbers BE):
///
/// ```ascii
/// 0:  kind (u8): 0 = data, 1 = close, 2 = status
/// 1:  channel id (u32), or FFFFFFFF for global messages
/// 5:  sequence number (u64)
/// 13: (status only) request id (u32), status code (u32)
/// *:  payload
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage {
    pub channel: Option<ChannelId>,
    pub seq: u64,
    pub kind: TestMessageKind,
    pub payload: Bytes,
}

impl TestMessage {
    const KIND_DATA: u8 = 0;
    const KIND_CLOSE: u8 = 1;
    const KIND_STATUS: u8 = 2;
    const NO_CHANNEL: u32 = u32::MAX;

    pub fn data(channel: Option<ChannelId>, seq: u64, payload: &[u8]) -> TestMessage {
        TestMessage {
            channel,
            seq,
            kind: TestMessageKind::Data,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    pub fn close(channel: Option<ChannelId>, seq: u64) -> TestMessage {
        TestMessage {
            channel,
            seq,
            kind: TestMessageKind::Close,
            payload: Bytes::new(),
        }
    }

    pub fn status(channel: Option<ChannelId>, request_id: RequestId, code: u32, message: &str) -> TestMessage {
        TestMessage {
            channel,
            seq: 0,
            kind: TestMessageKind::Status { request_id, code },
            payload: Bytes::copy_from_slice(message.as_bytes()),
        }
    }

    pub fn is_close(&self) -> bool {
        self.kind == TestMessageKind::Close
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        let kind = match self.kind {
            TestMessageKind::Data => Self::KIND_DATA,
            TestMessageKind::Close => Self::KIND_CLOSE,
            TestMessageKind::Status { .. } => Self::KIND_STATUS,
        };
        buf.put_u8(kind);
        buf.put_u32(self.channel
            .map(|c| c.index() as u32)
            .unwrap_or(Self::NO_CHANNEL));
        buf.put_u64(self.seq);
        if let TestMessageKind::Status { request_id, code } = self.kind {
            buf.put_u32(request_id.0);
            buf.put_u32(code);
        }
        buf.put_slice(&self.payload);
    }

    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.ser(&mut buf);
        buf.freeze()
    }

    pub fn deser(mut frame: Bytes) -> anyhow::Result<TestMessage> {
        if frame.remaining() < 13 {
            bail!("frame too short: {} bytes", frame.remaining());
        }
        let raw_kind = frame.get_u8();
        let channel = match frame.get_u32() {
            Self::NO_CHANNEL => None,
            raw => Some(ChannelId::new(raw as usize)),
        };
        let seq = frame.get_u64();

        let kind = match raw_kind {
            Self::KIND_DATA => TestMessageKind::Data,
            Self::KIND_CLOSE => TestMessageKind::Close,
            Self::KIND_STATUS => {
                if frame.remaining() < 8 {
                    bail!("status frame too short");
                }
                let request_id = RequestId(frame.get_u32());
                let code = frame.get_u32();
                TestMessageKind::Status { request_id, code }
            }
            other => bail!("invalid message kind {}", other),
        };

        Ok(TestMessage {
            channel,
            seq,
            kind,
            payload: frame,
        })
    }
}

impl Message for TestMessage {
    fn channel_id(&self) -> Option<ChannelId> {
        self.channel
    }
}

impl StatusResponse for TestMessage {
    fn status_response(&self) -> Option<StatusReply<'_>> {
        match self.kind {
            TestMessageKind::Status { request_id, code } => Some(StatusReply {
                request_id,
                code,
                message: std::str::from_utf8(&self.payload).unwrap_or(""),
            }),
            _ => None,
        }
    }
}
