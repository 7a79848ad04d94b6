use std::fmt::{Display, Formatter};
#[cfg(test)] use mockall::automock;
use num_enum::{IntoPrimitive, TryFromPrimitive};


/// Identifies an SFTP request. The server echoes it in its response.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RequestId(pub u32);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}


/// see https://datatracker.ietf.org/doc/html/draft-ietf-secsh-filexfer-02#section-7
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
pub enum StatusCode {
    Ok = 0,
    Eof = 1,
    NoSuchFile = 2,
    PermissionDenied = 3,
    Failure = 4,
    BadMessage = 5,
    NoConnection = 6,
    ConnectionLost = 7,
    OpUnsupported = 8,
}


/// The contents of an SSH_FXP_STATUS response. The code is kept raw because servers may send
///  codes beyond the ones defined in [StatusCode].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct StatusReply<'a> {
    pub request_id: RequestId,
    pub code: u32,
    pub message: &'a str,
}

impl StatusReply<'_> {
    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::try_from(self.code).ok()
    }

    pub fn is_ok(&self) -> bool {
        self.code == u32::from(StatusCode::Ok)
    }
}

/// Implemented by message types that can carry an SFTP status response
pub trait StatusResponse {
    fn status_response(&self) -> Option<StatusReply<'_>>;
}


/// Formatting and sending of SFTP requests, which happens outside this crate. Sending a request
///  does not wait for the response - responses arrive as messages on the SFTP channel.
#[cfg_attr(test, automock)]
pub trait FileRequests: Send + Sync {
    /// Sends an SSH_FXP_WRITE request, returning its request id
    fn post_write_request(&self, handle: &[u8], offset: u64, data: &[u8]) -> anyhow::Result<RequestId>;

    /// Closes a file handle, waiting for the server's confirmation
    fn close_handle(&self, handle: &[u8]) -> anyhow::Result<()>;
}
