//! Connection & communication with a broker.
//!
//! # Network Module
//!
//! Kafka uses a binary protocol over TCP. The protocol defines all APIs as
//! request response message pairs. All messages are size delimited.
//!
//! The client initiates a socket connection and then writes a sequence of
//! request messages and reads back the corresponding response messages.
//! TCP is happier if you maintain persistent connections used for many
//! requests to amortize the cost of the TCP handshake.
//!
//! Requests are pipelined: a [`Connection`](connection::Connection) keeps
//! writing while earlier requests are still waiting on the broker, and
//! every response is handed to its caller by correlation id, not by
//! arrival order.
//!
//! The server has a configurable maximum limit on request size and any
//! request that exceeds this limit will result in the socket being
//! disconnected.

use std::{fmt, str::FromStr};

#[cfg(feature = "serde")]
use serde_derive::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

pub mod connection;
pub mod sasl;
pub mod tcp;
pub mod tls;

/// Host and port of one broker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerAddress {
    type Err = Error;

    /// Parse `host:port`. IPv6 hosts may be bracketed, as in `[::1]:9092`.
    fn from_str(s: &str) -> Result<Self> {
        let Some((host, port)) = s.rsplit_once(':') else {
            tracing::error!("ERROR: Broker address {} has no port", s);
            return Err(Error::MissingBrokerConfigOptions);
        };
        let port = port.parse::<u16>().map_err(|err| {
            tracing::error!("ERROR: Invalid port in broker address {}: {:?}", s, err);
            Error::MissingBrokerConfigOptions
        })?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            tracing::error!("ERROR: Broker address {} has no host", s);
            return Err(Error::MissingBrokerConfigOptions);
        }
        Ok(Self::new(host, port))
    }
}

/// A byte stream a [`Connection`](connection::Connection) can run over:
/// plain TCP, TLS, or an in-memory pipe.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
