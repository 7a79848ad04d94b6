pub mod message;
pub mod message_store;
pub mod synchronizer;
pub mod channel_table;
pub mod message_router;
mod message_pump;
pub mod router_config;
pub mod transport;
pub mod error;
