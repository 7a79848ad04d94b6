use std::time::Duration;
use anyhow::bail;


pub struct RouterConfig {
    /// The size of the channel table, i.e. the maximum number of channels that can be open at
    ///  the same time. The table is allocated once, and opening a channel fails if it is full.
    pub max_channels: usize,

    /// In buffered mode, a dedicated thread (the 'message pump') reads from the transport
    ///  continuously. Otherwise application threads waiting for a message take turns reading.
    pub buffered: bool,

    /// Waiting threads re-check for messages (and for errors reported by the message pump) at
    ///  least this often, even if they are not notified.
    pub wait_poll_interval: Duration,

    /// Logs every routing step at TRACE level. This is very noisy, even for TRACE.
    pub verbose: bool,

    /// Name of the message pump's thread. If the thread starting the pump has a name containing
    ///  '-', the part up to and including the first '-' is prepended.
    pub pump_thread_name: String,
}

impl RouterConfig {
    pub fn new(max_channels: usize) -> RouterConfig {
        RouterConfig {
            max_channels,
            buffered: false,
            wait_poll_interval: Duration::from_secs(1),
            verbose: false,
            pump_thread_name: "message-pump".to_string(),
        }
    }

    pub fn new_buffered(max_channels: usize) -> RouterConfig {
        RouterConfig {
            buffered: true,
            ..Self::new(max_channels)
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_channels == 0 {
            bail!("the channel table must have room for at least one channel");
        }
        if self.wait_poll_interval.is_zero() {
            bail!("wait poll interval must be positive");
        }
        Ok(())
    }
}
