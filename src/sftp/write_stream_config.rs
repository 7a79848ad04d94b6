use std::time::Duration;
use anyhow::bail;


pub struct WriteStreamConfig {
    /// Data is written in chunks of at most this size, one request per chunk. 32768 is the
    ///  maximum that all SFTP servers are required to accept.
    pub max_chunk_len: usize,

    /// The number of write requests that may be in flight before the stream starts waiting for
    ///  acknowledgements
    pub max_outstanding_requests: usize,

    /// How long to wait for each acknowledgement, `None` for no timeout
    pub ack_timeout: Option<Duration>,
}

impl Default for WriteStreamConfig {
    fn default() -> Self {
        WriteStreamConfig {
            max_chunk_len: 32768,
            max_outstanding_requests: 100,
            ack_timeout: None,
        }
    }
}

impl WriteStreamConfig {
    pub fn new(max_outstanding_requests: usize) -> WriteStreamConfig {
        WriteStreamConfig {
            max_outstanding_requests,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_chunk_len == 0 {
            bail!("chunk length must be positive");
        }
        if self.max_outstanding_requests == 0 {
            bail!("at least one request must be allowed in flight");
        }
        Ok(())
    }
}
