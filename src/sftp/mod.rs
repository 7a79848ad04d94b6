pub mod file_requests;
pub mod write_stream_config;
pub mod pipelined_write_stream;
pub mod error;
