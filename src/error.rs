//! Error taxonomy for the streaming pipeline.
//!
//! A not-yet-received frame is **not** an error; see
//! [`Frame::Pending`](crate::frame_store::Frame).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// A chunk arrived out of order, twice, or after the session ended.
    #[error("chunk integrity violation: expected index {expected}, received {received}")]
    Integrity { expected: u64, received: u64 },

    /// The other end of the producer/consumer channel is gone.
    #[error("transport closed")]
    TransportClosed,

    #[error("failed to spawn producer worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;
