//! Error and Result types for the Aerospike client.
//!
//! Every fallible client call returns [`Error`], which folds the errors of the individual layers
//! (network, wire decoding, cluster management) into one type. Use [`Error::kind`] to react to
//! the broad category of a failure instead of matching every variant.
//!
//! # Examples
//!
//! Handling an error returned by the client.
//!
//! ```rust,no_run
//! use windpike::{
//!     errors::ErrorKind,
//!     policies::{BasePolicy, ClientPolicy},
//!     Bins, Client, Key, ResultCode,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new(&ClientPolicy::default(), &"localhost:3000")
//!         .await
//!         .expect("Failed to connect to cluster");
//!
//!     let key = Key::new("test", "test", "someKey");
//!     match client.get(&BasePolicy::default(), &key, Bins::All).await {
//!         Ok(Some(record)) => match record.time_to_live() {
//!             None => println!("record never expires"),
//!             Some(duration) => println!("ttl: {} secs", duration.as_secs()),
//!         },
//!         Ok(None) => println!("No such record: {key}"),
//!         Err(err) => match err.kind() {
//!             ErrorKind::Server(ResultCode::Timeout) | ErrorKind::Timeout => {
//!                 println!("Server was too slow: {err}");
//!             }
//!             _ => println!("Error fetching record: {err:#?}"),
//!         },
//!     }
//! }
//! ```

use std::borrow::Cow;

pub use crate::{
    cluster::{ClusterError, NodeError},
    commands::{buffer::BufferError, ParseParticleError},
    msgpack::MsgpackError,
    net::{NetError, ParseHostError},
    value::ParticleError,
};
use crate::ResultCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error of all client operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Communication with a node failed, or no connection could be acquired.
    #[error("network error")]
    Network(#[from] NetError),
    /// The total timeout of the command's policy passed before it completed.
    #[error("command timed out after {attempts} attempt(s)")]
    Timeout { attempts: usize },
    /// The server answered with a result code describing a failure.
    #[error("server error: {0}")]
    Server(ResultCode),
    /// A filter expression attached to the command's policy rejected the record, so the command
    /// was not applied.
    #[error("record was filtered out by the policy's filter expression")]
    FilteredOut,
    /// A user defined function failed while running on the server.
    #[error("UDF failed ({code}): {message}")]
    Udf { code: ResultCode, message: String },
    /// The server response could not be decoded.
    #[error("invalid server response")]
    Parse(#[from] ParseError),
    /// A value can't be sent to the server in the requested position.
    #[error("invalid value")]
    Value(#[from] ParticleError),
    /// One of the arguments passed to the client is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),
    #[error("failed parsing host value")]
    ParseHost(#[from] ParseHostError),
    #[error("cluster error")]
    Cluster(#[from] ClusterError),
    /// The cluster currently has no active node to send the command to.
    #[error("no nodes available")]
    NoNodes,
}

/// Broad category of an [`Error`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Network,
    Timeout,
    Server(ResultCode),
    Parse,
    /// The caller passed a value or argument the client refuses to send. Nothing was sent to the
    /// server.
    ClientContract,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Cluster(_) | Self::NoNodes => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Server(code) => ErrorKind::Server(*code),
            Self::FilteredOut => ErrorKind::Server(ResultCode::FilteredOut),
            Self::Udf { code, .. } => ErrorKind::Server(*code),
            Self::Parse(_) => ErrorKind::Parse,
            Self::Value(_) | Self::InvalidArgument(_) | Self::ParseHost(_) => {
                ErrorKind::ClientContract
            }
        }
    }

    /// Result code reported by the server, if the error originates from a server response.
    #[must_use]
    pub fn result_code(&self) -> Option<ResultCode> {
        match self.kind() {
            ErrorKind::Server(code) => Some(code),
            _ => None,
        }
    }

    /// Whether sending the same command again may succeed.
    pub(crate) fn is_retriable(&self) -> bool {
        match self {
            Self::Network(_) | Self::NoNodes => true,
            Self::Server(code) => code.is_retriable(),
            _ => false,
        }
    }

    pub(crate) fn invalid_argument(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<BufferError> for Error {
    fn from(value: BufferError) -> Self {
        Self::Parse(value.into())
    }
}

/// Malformed or unexpected content in a server response.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("buffer error")]
    Buffer(#[from] BufferError),
    #[error("MessagePack error")]
    Msgpack(#[from] MsgpackError),
    #[error("invalid particle")]
    Particle(#[from] ParticleError),
    #[error("Base64 decoding error")]
    Base64(#[from] base64::DecodeError),
    #[error("unexpected info response: {0}")]
    Info(String),
    #[error("batch response references unknown record index {0}")]
    BatchIndex(u32),
}
