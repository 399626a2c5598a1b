//! Networking layer between the commands and the server nodes.
//!
//! Commands only talk to the [`Transport`] trait. [`TcpTransport`] is the default implementation,
//! keeping a pool of TCP connections per node.

pub use self::{
    host::{Host, ToHosts},
    transport::{FrameStream, TcpTransport, Transport},
};
pub(crate) use self::connection::Connection;

mod connection;
mod host;
mod parser;
mod pool;
mod transport;

use crate::{commands::buffer::BufferError, ResultCode};

type Result<T, E = NetError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("no more connections available in the pool")]
    NoMoreConnections,
    #[error("could not open network connection to `{0}`")]
    FailedOpening(Host),
    #[error("network operation timed out")]
    Timeout,
    #[error("I/O related error")]
    Io(#[from] std::io::Error),
    #[error("invalid frame received")]
    Buffer(#[from] BufferError),
    #[error("authentication failed: {0}")]
    Authenticate(ResultCode),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseHostError {
    #[error("invalid address string")]
    InvalidArgument,
    #[error("invalid port number")]
    PortNumber(#[source] std::num::ParseIntError),
}
