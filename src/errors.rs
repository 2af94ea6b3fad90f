//! Errors of this crate.

use std::{fmt, sync::Arc};

use rmp::{
    decode::{MarkerReadError, NumValueReadError, ValueReadError},
    encode::{RmpWriteErr, ValueWriteError},
};
use rmpv::Value;

/// Error, returned from Tarantool in response to a request.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{description} (code {code})")]
pub struct ErrorResponse {
    /// Error class, i.e. low 15 bits of the response code.
    pub code: u32,
    pub description: String,
    /// Extended error payload, if the server sent one.
    pub extra: Option<Value>,
}

impl ErrorResponse {
    pub fn new(code: u32, description: String, extra: Option<Value>) -> Self {
        Self {
            code,
            description,
            extra,
        }
    }
}

/// Represents all errors of this crate.
///
/// Cloneable so a single underlying failure can be delivered to every
/// request which was in flight when it happened.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error response from Tarantool.
    #[error("Error response: {0}")]
    Response(#[from] ErrorResponse),
    /// Authentication refused by server.
    #[error("Authentication failure: {0}")]
    Auth(ErrorResponse),
    /// `call` or `eval` returned an error as the second element of the
    /// response tuple (Lua `nil, err` convention).
    #[error("Call or eval error: {0}")]
    CallEval(Value),

    /// Errors related to encoding requests.
    #[error(transparent)]
    Encode(#[from] EncodingError),
    /// Errors related to decoding responses.
    #[error(transparent)]
    Decode(#[from] DecodingError),

    /// Underlying TCP connection error.
    #[error("Connection error: {0}")]
    Io(#[source] Arc<tokio::io::Error>),
    /// Timeout while establishing connection.
    #[error("Connect timeout")]
    ConnectTimeout,
    /// Timeout of a request.
    #[error("Timeout")]
    Timeout,
    /// Connection closed on this side.
    #[error("Connection closed by client")]
    ClientClosed,
    /// Underlying connection closed on the server side.
    #[error("Connection closed by server")]
    ConnectionClosed,
    /// Sync value collided with a request already in flight.
    #[error("Duplicated sync '{0}'")]
    DuplicatedSync(u32),

    /// Pool was built without addresses.
    #[error("addrs should not be empty")]
    EmptyAddrs,
    /// Pool check timeout must be positive.
    #[error("wrong check timeout, must be greater than 0")]
    WrongCheckTimeout,
    /// No instance of the pool is currently reachable.
    #[error("no active connections")]
    NoActiveConnections,
    /// No read-write instance in the pool.
    #[error("Can't find rw instance in pool")]
    NoRwInstance,
    /// No read-only instance in the pool.
    #[error("Can't find ro instance in pool")]
    NoRoInstance,
}

impl From<tokio::io::Error> for Error {
    fn from(value: tokio::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<CodecDecodeError> for Error {
    fn from(value: CodecDecodeError) -> Self {
        match value {
            CodecDecodeError::Io(x) => Self::Io(x),
            CodecDecodeError::Decode(x) => Self::Decode(x),
            CodecDecodeError::Closed => Self::ConnectionClosed,
        }
    }
}

impl From<CodecEncodeError> for Error {
    fn from(value: CodecEncodeError) -> Self {
        match value {
            CodecEncodeError::Io(x) => x.into(),
            CodecEncodeError::Encode(x) => Self::Encode(x),
        }
    }
}

/// Error of encoding a request into MessagePack.
#[derive(Clone, Debug, thiserror::Error)]
#[error("Failed to encode value into MessagePack: {0}")]
pub struct EncodingError(Arc<anyhow::Error>);

impl EncodingError {
    pub(crate) fn new(err: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(err.into()))
    }
}

impl<E> From<ValueWriteError<E>> for EncodingError
where
    E: RmpWriteErr + Send + Sync,
{
    fn from(value: ValueWriteError<E>) -> Self {
        Self::new(value)
    }
}

impl From<rmp_serde::encode::Error> for EncodingError {
    fn from(value: rmp_serde::encode::Error) -> Self {
        Self::new(value)
    }
}

impl From<std::io::Error> for EncodingError {
    fn from(value: std::io::Error) -> Self {
        Self::new(value)
    }
}

/// Error of decoding a server payload.
#[derive(Clone, Debug)]
pub struct DecodingError {
    kind: Arc<DecodingErrorDetails>,
    /// Part of the payload where the error occured.
    location: Option<&'static str>,
}

impl std::error::Error for DecodingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodingErrorDetails {
    /// Type of the decoded value was unexpected.
    #[error("Type mismatch, expected '{expected}', actual '{actual}'")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },
    /// Key missing in response.
    #[error("Missing key '{0}'")]
    MissingKey(&'static str),
    /// Tuple had not enough elements.
    #[error("Invalid tuple length, expected {expected}, actual {actual}")]
    InvalidTupleLength { expected: usize, actual: usize },
    /// First byte of the frame length prefix was not the `uint32` marker.
    #[error("Invalid frame length marker 0x{0:02x}")]
    BadLengthMarker(u8),
    /// Greeting was shorter than 128 bytes or carried a bad salt.
    #[error("Malformed greeting: {0}")]
    Greeting(&'static str),
    /// Error from the underlying MessagePack parser.
    #[error("MessagePack error: {0}")]
    MessagePack(#[source] anyhow::Error),
}

impl DecodingError {
    fn new(kind: DecodingErrorDetails) -> Self {
        Self {
            kind: Arc::new(kind),
            location: None,
        }
    }

    pub(crate) fn type_mismatch(expected: &'static str, actual: impl Into<String>) -> Self {
        Self::new(DecodingErrorDetails::TypeMismatch {
            expected,
            actual: actual.into(),
        })
    }

    pub(crate) fn missing_key(key: &'static str) -> Self {
        Self::new(DecodingErrorDetails::MissingKey(key))
    }

    pub(crate) fn invalid_tuple_length(expected: usize, actual: usize) -> Self {
        Self::new(DecodingErrorDetails::InvalidTupleLength { expected, actual })
    }

    pub(crate) fn bad_length_marker(marker: u8) -> Self {
        Self::new(DecodingErrorDetails::BadLengthMarker(marker))
    }

    pub(crate) fn greeting(reason: &'static str) -> Self {
        Self::new(DecodingErrorDetails::Greeting(reason))
    }

    pub(crate) fn message_pack(err: impl Into<anyhow::Error>) -> Self {
        Self::new(DecodingErrorDetails::MessagePack(err.into()))
    }

    pub(crate) fn in_location(mut self, location: &'static str) -> Self {
        self.location = Some(location);
        self
    }

    pub fn kind(&self) -> &DecodingErrorDetails {
        &self.kind
    }
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{} (in {})", self.kind, location),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl From<ValueReadError> for DecodingError {
    fn from(value: ValueReadError) -> Self {
        Self::message_pack(value)
    }
}

impl From<NumValueReadError> for DecodingError {
    fn from(value: NumValueReadError) -> Self {
        Self::message_pack(value)
    }
}

impl From<MarkerReadError> for DecodingError {
    fn from(value: MarkerReadError) -> Self {
        Self::message_pack(value.0)
    }
}

impl From<rmpv::decode::Error> for DecodingError {
    fn from(value: rmpv::decode::Error) -> Self {
        Self::message_pack(value)
    }
}

impl From<rmpv::ext::Error> for DecodingError {
    fn from(value: rmpv::ext::Error) -> Self {
        Self::message_pack(value)
    }
}

/// Error of the frame decoding half of the codec.
#[derive(Clone, Debug, thiserror::Error)]
pub(crate) enum CodecDecodeError {
    #[error("{0}")]
    Io(Arc<tokio::io::Error>),
    #[error(transparent)]
    Decode(#[from] DecodingError),
    /// Stream ended, i.e. server closed the connection.
    #[error("Connection closed by server")]
    Closed,
}

impl From<tokio::io::Error> for CodecDecodeError {
    fn from(value: tokio::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

/// Error of the frame encoding half of the codec.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CodecEncodeError {
    #[error(transparent)]
    Io(#[from] tokio::io::Error),
    #[error(transparent)]
    Encode(#[from] EncodingError),
}
