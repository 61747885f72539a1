//! One authenticated connection to one broker.
//!
//! A [`Broker`] drives its [`Connection`] through the connect sequence:
//!
//! 1. `Connecting`: open the socket (TLS if configured).
//! 2. `NegotiatingVersions`: ask the broker which API versions it accepts
//!    and make sure every API this client speaks is among them.
//! 3. `SaslHandshake`: announce the SASL mechanism, if SASL is configured.
//! 4. `SaslAuthenticate`: exchange credentials.
//! 5. `Ready`.
//!
//! Any failing step leaves the broker `Failed`. The sequence runs at most
//! once per broker: concurrent and later callers of [`Broker::connect`]
//! share the outcome of the first run until [`Broker::disconnect`] resets it.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{
    config::ConnectionConfig,
    error::{Error, Result},
    network::{connection::Connection, sasl, BrokerAddress},
    protocol::{self, Api, ApiDescriptor, ApiVersionRange, ApiVersions, ApiVersionsRequest},
};

type ConnectAttempt = Shared<BoxFuture<'static, Result<()>>>;

/// Where a broker is in its connect sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerState {
    Disconnected,
    Connecting,
    NegotiatingVersions,
    SaslHandshake,
    SaslAuthenticate,
    Ready,
    Failed,
}

struct Session {
    state: BrokerState,
    connection: Option<Connection>,
    attempt: Option<ConnectAttempt>,
    api_versions: Vec<ApiVersionRange>,
    /// Bumped on every disconnect so a stale attempt cannot touch a newer session.
    generation: u64,
}

impl Session {
    /// `Ready` over a connection the broker has since closed reads as
    /// `Disconnected`.
    fn current_state(&self) -> BrokerState {
        match (&self.state, &self.connection) {
            (BrokerState::Ready, Some(connection)) if connection.is_closed() => {
                BrokerState::Disconnected
            }
            (state, _) => *state,
        }
    }

    /// Forget a connection lost while `Ready` so the next connect dials again.
    fn reset_if_lost(&mut self) -> Option<Connection> {
        if self.current_state() == self.state {
            return None;
        }
        self.generation += 1;
        self.attempt = None;
        self.state = BrokerState::Disconnected;
        self.connection.take()
    }
}

struct BrokerInner {
    config: ConnectionConfig,
    session: Mutex<Session>,
}

impl BrokerInner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the session if it still belongs to `generation`.
    fn update<F: FnOnce(&mut Session)>(&self, generation: u64, f: F) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        f(&mut session);
        true
    }

    fn transition(&self, generation: u64, state: BrokerState) -> bool {
        let current = self.update(generation, |session| session.state = state);
        if current {
            tracing::debug!("Broker {} is {:?}", self.config.address, state);
        }
        current
    }
}

/// Client side handle to one broker.
///
/// Clones share the same connection and state.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("address", &self.inner.config.address)
            .field("state", &self.state())
            .finish()
    }
}

impl Broker {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                config,
                session: Mutex::new(Session {
                    state: BrokerState::Disconnected,
                    connection: None,
                    attempt: None,
                    api_versions: vec![],
                    generation: 0,
                }),
            }),
        }
    }

    pub fn state(&self) -> BrokerState {
        self.inner.session().current_state()
    }

    pub fn address(&self) -> &BrokerAddress {
        &self.inner.config.address
    }

    /// Version ranges the broker reported during the last connect.
    pub fn api_versions(&self) -> Vec<ApiVersionRange> {
        self.inner.session().api_versions.clone()
    }

    pub(crate) fn same_broker(&self, other: &Broker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run the connect sequence, or join the one already started.
    ///
    /// A broker whose connection was closed by the peer after becoming
    /// ready connects again. A failed attempt is returned as is until
    /// [`disconnect`](Self::disconnect).
    ///
    /// ### Example
    /// ```ignore
    /// let broker = brokerlink::prelude::Broker::new(config);
    /// broker.connect().await?;
    /// let metadata = broker
    ///     .send_request::<brokerlink::prelude::protocol::Metadata>(&brokerlink::prelude::protocol::MetadataRequest::brokers_only())
    ///     .await?;
    /// ```
    pub async fn connect(&self) -> Result<()> {
        let (attempt, lost) = {
            let mut session = self.inner.session();
            let lost = session.reset_if_lost();
            let attempt = match session.attempt.clone() {
                Some(attempt) => attempt,
                None => {
                    let attempt = connect_sequence(self.inner.clone(), session.generation)
                        .boxed()
                        .shared();
                    session.attempt = Some(attempt.clone());
                    attempt
                }
            };
            (attempt, lost)
        };
        if let Some(connection) = lost {
            tracing::debug!(
                "Connection to {} was lost, reconnecting",
                self.inner.config.address
            );
            connection.disconnect().await;
        }
        attempt.await
    }

    /// Close the connection and go back to `Disconnected`.
    pub async fn disconnect(&self) {
        let connection = {
            let mut session = self.inner.session();
            session.generation += 1;
            session.attempt = None;
            session.state = BrokerState::Disconnected;
            session.connection.take()
        };
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
        tracing::debug!("Broker {} is Disconnected", self.inner.config.address);
    }

    /// Send a request over the ready connection and wait for the response.
    pub async fn send_request<A: Api>(&self, request: &A::Request) -> Result<A::Response> {
        let connection = {
            let session = self.inner.session();
            match (&session.state, &session.connection) {
                (BrokerState::Ready, Some(connection)) => connection.clone(),
                _ => return Err(Error::NotConnected),
            }
        };
        connection.send_request::<A>(request).await
    }
}

async fn connect_sequence(inner: Arc<BrokerInner>, generation: u64) -> Result<()> {
    let result = run_connect_sequence(&inner, generation).await;
    if let Err(err) = &result {
        tracing::error!(
            "ERROR: Connecting to broker {} failed {:?}",
            inner.config.address,
            err
        );
        let mut connection = None;
        inner.update(generation, |session| {
            session.state = BrokerState::Failed;
            connection = session.connection.take();
        });
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
    }
    result
}

async fn run_connect_sequence(inner: &BrokerInner, generation: u64) -> Result<()> {
    let config = &inner.config;

    inner.transition(generation, BrokerState::Connecting);
    let connection = Connection::connect(config).await?;
    let current = inner.update(generation, |session| {
        session.connection = Some(connection.clone());
    });
    if !current {
        connection.disconnect().await;
        return Err(Error::ConnectionClosed);
    }

    inner.transition(generation, BrokerState::NegotiatingVersions);
    let versions = connection
        .send_request::<ApiVersions>(&ApiVersionsRequest)
        .await?;
    check_api_versions(&protocol::api_by_key(), &versions.api_keys)?;
    inner.update(generation, |session| {
        session.api_versions = versions.api_keys;
    });

    if let Some(sasl_config) = &config.sasl {
        inner.transition(generation, BrokerState::SaslHandshake);
        sasl::handshake(&connection, sasl_config).await?;

        inner.transition(generation, BrokerState::SaslAuthenticate);
        sasl::authenticate(&connection, sasl_config).await?;
    }

    if !inner.transition(generation, BrokerState::Ready) {
        // disconnected while connecting
        return Err(Error::ConnectionClosed);
    }
    Ok(())
}

/// Every API this client speaks must fall within the range the broker
/// reports for it. Keys the client does not use are ignored.
pub fn check_api_versions(
    supported: &HashMap<i16, ApiDescriptor>,
    ranges: &[ApiVersionRange],
) -> Result<()> {
    for range in ranges {
        let Some(api) = supported.get(&range.api_key) else {
            continue;
        };
        if !range.contains(api.api_version) {
            tracing::error!(
                "ERROR: Broker supports {} versions {}..={}, client speaks {}",
                api.name,
                range.min_version,
                range.max_version,
                api.api_version
            );
            return Err(Error::UnsupportedVersion {
                api_key: range.api_key,
                api_version: api.api_version,
                min_version: range.min_version,
                max_version: range.max_version,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{FindCoordinator, Metadata, MetadataRequest};

    fn range(api_key: i16, min_version: i16, max_version: i16) -> ApiVersionRange {
        ApiVersionRange {
            api_key,
            min_version,
            max_version,
        }
    }

    #[test]
    fn versions_within_range() {
        let ranges = [range(3, 0, 12), range(10, 0, 4), range(18, 0, 3)];
        assert!(check_api_versions(&protocol::api_by_key(), &ranges).is_ok());
    }

    #[test]
    fn version_outside_range() {
        let ranges = [range(3, 0, 12), range(10, 2, 3)];
        assert_eq!(
            check_api_versions(&protocol::api_by_key(), &ranges),
            Err(Error::UnsupportedVersion {
                api_key: 10,
                api_version: FindCoordinator::DESCRIPTOR.api_version,
                min_version: 2,
                max_version: 3,
            })
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let ranges = [range(0, 9, 11), range(1, 12, 16), range(9999, 0, 0)];
        assert!(check_api_versions(&protocol::api_by_key(), &ranges).is_ok());
    }

    #[tokio::test]
    async fn fresh_broker_is_not_ready() {
        let broker = Broker::new(ConnectionConfig::new(BrokerAddress::new("localhost", 9092)));
        assert_eq!(broker.state(), BrokerState::Disconnected);
        assert!(broker.api_versions().is_empty());
        assert_eq!(
            broker
                .send_request::<Metadata>(&MetadataRequest::brokers_only())
                .await
                .unwrap_err(),
            Error::NotConnected
        );
    }

    #[tokio::test]
    async fn failed_connect_is_memoized_until_disconnect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let broker = Broker::new(ConnectionConfig::new(BrokerAddress::new("127.0.0.1", port)));
        let err = broker.connect().await.unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(broker.state(), BrokerState::Failed);
        assert_eq!(broker.connect().await.unwrap_err(), err);

        broker.disconnect().await;
        assert_eq!(broker.state(), BrokerState::Disconnected);
    }
}
