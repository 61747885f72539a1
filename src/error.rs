//! Crate & protocol level errors.
//!
//! Every failure surfaced by this crate is one of the [`Error`] variants.
//! Nothing in the transport retries on its own; callers decide whether a
//! failed request is worth sending again, to which broker, and when.
use std::{any::Any, fmt, io, result, sync::Arc};

use bytes::Bytes;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error as ThisError;

pub type Result<T> = result::Result<T, Error>;

/// Errors produced while talking to a Kafka/Redpanda cluster.
///
/// The type is `Clone` because a single broker connect attempt may be
/// awaited by many callers, all of whom receive the same outcome.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
    /// Socket level failure: refused, reset, unreachable, or a failed TLS
    /// handshake.
    #[error("connection error: {0:?}")]
    ConnectionError(io::ErrorKind),

    /// Local TLS configuration problem: unreadable CA file, bad key.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The connection closed while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The broker does not accept the API version this client speaks.
    #[error("API {api_key} version {api_version} is not supported by the broker (supported {min_version}..={max_version})")]
    UnsupportedVersion {
        api_key: i16,
        api_version: i16,
        min_version: i16,
        max_version: i16,
    },

    /// The broker answered, but reported an error code.
    #[error(transparent)]
    BrokerProtocol(#[from] BrokerProtocolError),

    /// The buffer ended before a field could be read.
    #[error("truncated message")]
    TruncatedMessage,

    /// Could not parse the data.
    #[error("parsing error: invalid data ({} bytes)", .0.len())]
    ParsingError(Bytes),

    /// A value does not fit the wire representation.
    #[error("encoding error")]
    EncodingError,

    /// The broker announced a frame larger than this client accepts.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: u32, max: u32 },

    /// The broker sent a correlation id nobody is waiting for.
    #[error("unmatched correlation id {0}")]
    UnmatchedCorrelationId(i32),

    #[error("SASL authentication failed: {0}")]
    SaslAuthFailed(String),

    /// A request was issued on a broker that has not finished connecting.
    #[error("broker is not connected")]
    NotConnected,

    /// No known address for this node id, even after a metadata refresh.
    #[error("unknown broker {0}")]
    UnknownBroker(i32),

    #[error("missing broker config options")]
    MissingBrokerConfigOptions,
}

impl Error {
    /// True for failures of the socket itself rather than of a request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::ConnectionError(_) | Error::ConnectionClosed
        )
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        use Error::*;
        match (self, other) {
            (ConnectionError(a), ConnectionError(b)) => a == b,
            (TlsError(a), TlsError(b)) => a == b,
            (ConnectionClosed, ConnectionClosed) => true,
            (
                UnsupportedVersion {
                    api_key: a,
                    api_version: b,
                    min_version: c,
                    max_version: d,
                },
                UnsupportedVersion {
                    api_key: w,
                    api_version: x,
                    min_version: y,
                    max_version: z,
                },
            ) => (a, b, c, d) == (w, x, y, z),
            (BrokerProtocol(a), BrokerProtocol(b)) => a == b,
            (TruncatedMessage, TruncatedMessage) => true,
            (ParsingError(a), ParsingError(b)) => a == b,
            (EncodingError, EncodingError) => true,
            (FrameTooLarge { size: a, max: b }, FrameTooLarge { size: c, max: d }) => {
                (a, b) == (c, d)
            }
            (UnmatchedCorrelationId(a), UnmatchedCorrelationId(b)) => a == b,
            (SaslAuthFailed(a), SaslAuthFailed(b)) => a == b,
            (NotConnected, NotConnected) => true,
            (UnknownBroker(a), UnknownBroker(b)) => a == b,
            (MissingBrokerConfigOptions, MissingBrokerConfigOptions) => true,
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::ConnectionError(e.kind())
    }
}

/// A decoded response that carried a non-zero error code.
///
/// The whole decoded response travels along as the partial result so the
/// caller can still inspect the entries that did succeed.
#[derive(Clone)]
pub struct BrokerProtocolError {
    pub error_code: i16,
    pub code: KafkaCode,
    pub error_message: Option<String>,
    partial_result: Option<Arc<dyn Any + Send + Sync>>,
}

impl BrokerProtocolError {
    pub fn new(error_code: i16, error_message: Option<String>) -> Self {
        Self {
            error_code,
            code: KafkaCode::from_code(error_code),
            error_message,
            partial_result: None,
        }
    }

    pub fn with_partial_result<T: Any + Send + Sync>(mut self, partial: T) -> Self {
        self.partial_result = Some(Arc::new(partial));
        self
    }

    /// The response decoded alongside the error, if it has type `T`.
    pub fn partial_result<T: Any>(&self) -> Option<&T> {
        self.partial_result.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for BrokerProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerProtocolError")
            .field("error_code", &self.error_code)
            .field("code", &self.code)
            .field("error_message", &self.error_message)
            .field("has_partial_result", &self.partial_result.is_some())
            .finish()
    }
}

impl fmt::Display for BrokerProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broker returned {:?} ({})", self.code, self.error_code)?;
        if let Some(message) = &self.error_message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for BrokerProtocolError {}

impl PartialEq for BrokerProtocolError {
    fn eq(&self, other: &Self) -> bool {
        self.error_code == other.error_code && self.error_message == other.error_message
    }
}

/// Various errors reported by a remote Kafka server.
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum KafkaCode {
    /// An unexpected server error
    Unknown = -1,
    #[default]
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// There is currently no leader for this partition and hence it
    /// is unavailable for writes.
    LeaderNotAvailable = 5,
    /// The client's metadata is out of date.
    NotLeaderForPartition = 6,
    RequestTimedOut = 7,
    BrokerNotAvailable = 8,
    ReplicaNotAvailable = 9,
    MessageSizeTooLarge = 10,
    StaleControllerEpoch = 11,
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The coordinator is loading and hence can't process requests.
    CoordinatorLoadInProgress = 14,
    /// The coordinator is not available.
    CoordinatorNotAvailable = 15,
    /// This is not the correct coordinator.
    NotCoordinator = 16,
    InvalidTopic = 17,
    RecordListTooLarge = 18,
    NotEnoughReplicas = 19,
    NotEnoughReplicasAfterAppend = 20,
    InvalidRequiredAcks = 21,
    IllegalGeneration = 22,
    InconsistentGroupProtocol = 23,
    InvalidGroupId = 24,
    UnknownMemberId = 25,
    InvalidSessionTimeout = 26,
    RebalanceInProgress = 27,
    InvalidCommitOffsetSize = 28,
    TopicAuthorizationFailed = 29,
    GroupAuthorizationFailed = 30,
    ClusterAuthorizationFailed = 31,
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    TopicAlreadyExists = 36,
    InvalidPartitions = 37,
    InvalidReplicationFactor = 38,
    InvalidReplicaAssignment = 39,
    InvalidConfig = 40,
    /// This is not the correct controller for this cluster.
    NotController = 41,
    InvalidRequest = 42,
    UnsupportedForMessageFormat = 43,
    PolicyViolation = 44,
    OutOfOrderSequenceNumber = 45,
    DuplicateSequenceNumber = 46,
    InvalidProducerEpoch = 47,
    InvalidTxnState = 48,
    InvalidProducerIdMapping = 49,
    InvalidTransactionTimeout = 50,
    ConcurrentTransactions = 51,
    TransactionCoordinatorFenced = 52,
    TransactionalIdAuthorizationFailed = 53,
    SecurityDisabled = 54,
    OperationNotAttempted = 55,
    KafkaStorageError = 56,
    LogDirNotFound = 57,
    /// SASL Authentication failed.
    SaslAuthenticationFailed = 58,
    UnknownProducerId = 59,
    ReassignmentInProgress = 60,
    DelegationTokenAuthDisabled = 61,
    DelegationTokenNotFound = 62,
    DelegationTokenOwnerMismatch = 63,
    DelegationTokenRequestNotAllowed = 64,
    DelegationTokenAuthorizationFailed = 65,
    DelegationTokenExpired = 66,
    InvalidPrincipalType = 67,
    NonEmptyGroup = 68,
    GroupIdNotFound = 69,
    FetchSessionIdNotFound = 70,
    InvalidFetchSessionEpoch = 71,
    ListenerNotFound = 72,
    TopicDeletionDisabled = 73,
    FencedLeaderEpoch = 74,
    UnknownLeaderEpoch = 75,
    UnsupportedCompressionType = 76,
    StaleBrokerEpoch = 77,
    OffsetNotAvailable = 78,
    MemberIdRequired = 79,
    PreferredLeaderNotAvailable = 80,
    GroupMaxSizeReached = 81,
    FencedInstanceId = 82,
}

impl KafkaCode {
    /// Maps a wire error code, falling back to [`KafkaCode::Unknown`].
    pub fn from_code(code: i16) -> Self {
        FromPrimitive::from_i16(code).unwrap_or(KafkaCode::Unknown)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kafka_code_from_code() {
        assert_eq!(KafkaCode::from_code(0), KafkaCode::None);
        assert_eq!(KafkaCode::from_code(15), KafkaCode::CoordinatorNotAvailable);
        assert_eq!(KafkaCode::from_code(35), KafkaCode::UnsupportedVersion);
        assert_eq!(KafkaCode::from_code(58), KafkaCode::SaslAuthenticationFailed);
        assert_eq!(KafkaCode::from_code(999), KafkaCode::Unknown);
        assert_eq!(KafkaCode::from_code(-100), KafkaCode::Unknown);
    }

    #[test]
    fn broker_error_carries_partial_result() {
        let err = BrokerProtocolError::new(15, Some("not yet".to_owned()))
            .with_partial_result(vec![1_i32, 2, 3]);

        assert_eq!(err.code, KafkaCode::CoordinatorNotAvailable);
        assert_eq!(err.partial_result::<Vec<i32>>(), Some(&vec![1, 2, 3]));
        assert!(err.partial_result::<String>().is_none());
        assert!(err.to_string().contains("not yet"));
    }

    #[test]
    fn cloned_errors_compare_equal() {
        let err = Error::from(BrokerProtocolError::new(3, None));
        assert_eq!(err.clone(), err);
        assert_ne!(err, Error::ConnectionClosed);
    }

    #[test]
    fn connection_errors_are_classified() {
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::from(io::Error::from(io::ErrorKind::ConnectionRefused)).is_connection_error());
        assert!(!Error::TruncatedMessage.is_connection_error());
        assert!(!Error::TlsError("no certificates in ca.pem".to_owned()).is_connection_error());
    }
}
