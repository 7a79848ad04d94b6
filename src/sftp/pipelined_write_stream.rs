use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use bytes::Bytes;
use tracing::{debug, trace, warn};
use crate::routing::message::{ChannelId, Message};
use crate::routing::message_router::MessageSource;
use crate::sftp::error::WriteStreamError;
use crate::sftp::file_requests::{FileRequests, RequestId, StatusResponse};
use crate::sftp::write_stream_config::WriteStreamConfig;


/// Writes to a remote file through an SFTP handle that was opened elsewhere.
///
/// Write requests are sent without waiting for their acknowledgements, which keeps the
///  connection busy for bulk transfers. Only when more than
///  [WriteStreamConfig::max_outstanding_requests] requests are in flight, the stream waits for
///  the oldest one's acknowledgement. The write position advances when a request is sent, so it
///  may be ahead of the acknowledged data by up to that many requests.
///
/// Data is not known to be written before [PipelinedWriteStream::flush] or
///  [PipelinedWriteStream::close] returned successfully. Failures of individual requests are
///  reported by whichever call waits for their acknowledgement.
pub struct PipelinedWriteStream<M> {
    config: WriteStreamConfig,
    requests: Arc<dyn FileRequests>,
    messages: Arc<dyn MessageSource<M>>,
    channel: ChannelId,
    handle: Bytes,
    position: u64,
    /// in the order the requests were sent
    outstanding: VecDeque<RequestId>,
    closed: bool,
}

impl <M: Message + StatusResponse> PipelinedWriteStream<M> {
    /// `channel` is the SFTP session's channel: acknowledgements are read from its message
    ///  store.
    pub fn new(
        config: WriteStreamConfig,
        requests: Arc<dyn FileRequests>,
        messages: Arc<dyn MessageSource<M>>,
        channel: ChannelId,
        handle: Bytes,
    ) -> Result<PipelinedWriteStream<M>, WriteStreamError> {
        config.validate()
            .map_err(WriteStreamError::Config)?;
        if handle.is_empty() {
            return Err(WriteStreamError::InvalidHandle);
        }

        Ok(PipelinedWriteStream {
            outstanding: VecDeque::with_capacity(config.max_outstanding_requests + 1),
            config,
            requests,
            messages,
            channel,
            handle,
            position: 0,
            closed: false,
        })
    }

    /// the offset in the file where the next write goes
    pub fn position(&self) -> u64 {
        self.position
    }

    /// number of write requests that were sent but not acknowledged yet
    pub fn outstanding_requests(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), WriteStreamError> {
        self.ensure_open()?;

        for chunk in data.chunks(self.config.max_chunk_len) {
            let request_id = self.requests.post_write_request(&self.handle, self.position, chunk)
                .map_err(WriteStreamError::Request)?;
            trace!("sent write request {} for {} bytes at offset {}", request_id, chunk.len(), self.position);

            self.outstanding.push_back(request_id);
            self.position += chunk.len() as u64;

            while self.outstanding.len() > self.config.max_outstanding_requests {
                self.await_oldest()?;
            }
        }
        Ok(())
    }

    pub fn write_byte(&mut self, b: u8) -> Result<(), WriteStreamError> {
        self.write(&[b])
    }

    /// Waits for the acknowledgements of all outstanding requests
    pub fn flush(&mut self) -> Result<(), WriteStreamError> {
        self.ensure_open()?;
        self.drain()
    }

    /// Waits for all outstanding requests to be acknowledged and closes the handle. If a request
    ///  failed, that failure is returned and the handle remains open.
    ///
    /// Closing a closed stream does nothing.
    pub fn close(&mut self) -> Result<(), WriteStreamError> {
        if self.closed {
            return Ok(());
        }

        self.drain()?;
        self.requests.close_handle(&self.handle)
            .map_err(WriteStreamError::Request)?;
        self.closed = true;
        debug!("closed write stream after {} bytes", self.position);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), WriteStreamError> {
        if self.closed {
            return Err(WriteStreamError::Closed);
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), WriteStreamError> {
        if !self.outstanding.is_empty() {
            debug!("waiting for {} outstanding write requests", self.outstanding.len());
        }
        while !self.outstanding.is_empty() {
            self.await_oldest()?;
        }
        Ok(())
    }

    /// NB: The request is removed from the window before its acknowledgement arrives, so a
    ///      failed request does not block subsequent draining
    fn await_oldest(&mut self) -> Result<(), WriteStreamError> {
        let Some(request_id) = self.outstanding.pop_front() else {
            return Ok(());
        };

        let is_ack = move |m: &M| m.status_response()
            .is_some_and(|reply| reply.request_id == request_id);
        let response = self.messages.next_message(Some(self.channel), &is_ack, self.config.ack_timeout)?;

        match response.status_response() {
            Some(reply) if reply.is_ok() => {
                trace!("write request {} acknowledged", request_id);
                Ok(())
            }
            Some(reply) => {
                debug!("write request {} failed with status {}: {}", request_id, reply.code, reply.message);
                Err(WriteStreamError::ProtocolStatus {
                    request_id,
                    code: reply.code,
                    message: reply.message.to_string(),
                })
            }
            None => Err(WriteStreamError::UnexpectedResponse(request_id)),
        }
    }
}

impl <M: Message + StatusResponse> io::Write for PipelinedWriteStream<M> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PipelinedWriteStream::write(self, buf)
            .map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        PipelinedWriteStream::flush(self)
            .map_err(io::Error::other)
    }
}

impl <M> Drop for PipelinedWriteStream<M> {
    fn drop(&mut self) {
        if !self.closed && !self.outstanding.is_empty() {
            warn!("write stream dropped without closing - {} write requests were not acknowledged", self.outstanding.len());
        }
    }
}
