//! # Brokerlink
//! Rust-native Kafka protocol transport and cluster session layer.
//!
//! This crate is the piece every Kafka client sits on: the binary codec,
//! typed request/response pairs, a connection that multiplexes many
//! in-flight requests over one socket, the broker connect sequence
//! (version negotiation, SASL), and topology aware routing across a
//! cluster. Producers, consumers and admin tooling are built on top of it
//! through a single operation: send a typed request, get a typed response.
//!
//! ## Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as Tokio, Nom to do the heavy lifting
//! - Pipelined requests, matched to responses by correlation id
//! - No silent retries: every failure reaches the caller as a typed [`Error`](prelude::Error)
//!
//! ## Table of contents
//! - [Getting started](#getting-started)
//!     - [Cluster](#cluster)
//!     - [Broker](#broker)
//!     - [Defining a request](#defining-a-request)
//! - [Resources](#resources)
//!
//! ## Getting started
//! Include the following snippet in your `Cargo.toml` dependencies:
//! ```toml
//! brokerlink = "0.1"
//! ```
//!
//! ### Cluster
//! A [`Cluster`](prelude::Cluster) connects to the first reachable bootstrap
//! broker and routes requests from there. To instantiate one, start with a
//! [`ClientBuilder`](prelude::ClientBuilder).
//! ```ignore
//! use brokerlink::prelude::{protocol, ClientBuilder, SaslConfig};
//!
//! let cluster = ClientBuilder::new(vec!["127.0.0.1:9092".to_string()])?
//!     .sasl(SaslConfig::scram_sha_512("admin", "admin-secret"))
//!     .connect()
//!     .await?;
//!
//! let metadata = cluster.refresh_metadata(&["my-topic"]).await?;
//! println!("controller is {:?}", cluster.controller_id().await);
//!
//! let coordinator = cluster
//!     .send_request::<protocol::FindCoordinator>(&protocol::FindCoordinatorRequest::group("my-group"))
//!     .await?;
//! ```
//!
//! ### Broker
//! A [`Broker`](prelude::Broker) is one authenticated connection. Its
//! [`connect`](prelude::Broker::connect) runs at most once, however many
//! tasks call it.
//! ```ignore
//! use brokerlink::prelude::{protocol, Broker, ConnectionConfig};
//!
//! let broker = Broker::new(ConnectionConfig::new("localhost:9092".parse()?));
//! broker.connect().await?;
//! let metadata = broker
//!     .send_request::<protocol::Metadata>(&protocol::MetadataRequest::brokers_only())
//!     .await?;
//! ```
//!
//! ### Defining a request
//! Every call is a type implementing [`Api`](prelude::protocol::Api): its
//! api key and version, a body encoder and a response parser. Framing,
//! headers and correlation are handled by the connection.
//!
//! ## Resources
//! - [Kafka Protocol Spec](https://kafka.apache.org/protocol.html)
//! - [Confluence Docs](https://cwiki.apache.org/confluence/display/KAFKA/A+Guide+To+The+Kafka+Protocol)

mod broker;
mod cluster;
mod config;
mod encode;
mod error;
mod network;
mod parser;
mod protocol;

pub const DEFAULT_CLIENT_ID: &str = "brokerlink";

pub mod prelude {
    //! Main export of various structures and methods
    //!
    //! - [`Cluster`] routes requests across brokers and tracks the topology.
    //! - [`Broker`] is one authenticated connection with its connect state machine.
    //! - [`Connection`] is the raw multiplexed socket, for users who want to
    //!   drive the protocol themselves.
    //!
    //! For those looking to handle the specific requests and responses that
    //! make up the Kafka protocol, visit the [protocol module].
    //!
    //! [protocol module]: protocol
    pub use crate::broker::{check_api_versions, Broker, BrokerState};
    pub use crate::cluster::{Cluster, ClusterTopology};
    pub use crate::config::{ClientBuilder, ClientConfig, ConnectionConfig, TlsConfig};
    pub use crate::error::{BrokerProtocolError, Error, KafkaCode, Result};
    pub use crate::network::connection::{Connection, ResponseHandle};
    pub use crate::network::sasl::{plain_auth_bytes, SaslConfig, ScramClient, ScramDigest};
    pub use crate::network::{BrokerAddress, Transport};
    pub use crate::DEFAULT_CLIENT_ID;

    pub use bytes;

    pub mod encode {
        pub use crate::encode::*;
    }

    pub mod parser {
        pub use crate::parser::*;
    }

    pub mod protocol {
        pub use crate::protocol::*;
    }
}
