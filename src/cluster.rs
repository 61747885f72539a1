//! Topology aware routing across the brokers of a cluster.
//!
//! A [`Cluster`] starts from a seed broker picked among the bootstrap
//! addresses. Metadata responses fill in the [`ClusterTopology`]: which
//! node id lives at which address, and which node is the controller.
//! Requests go to the seed by default, or to a node id, in which case the
//! broker for that node is created and connected on first use.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    broker::{Broker, BrokerState},
    config::ClientConfig,
    error::{Error, Result},
    network::BrokerAddress,
    protocol::{Api, Metadata, MetadataRequest, MetadataResponse},
};

/// Last known layout of the cluster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterTopology {
    pub cluster_id: Option<String>,
    pub brokers: HashMap<i32, BrokerAddress>,
    pub controller_id: Option<i32>,
}

impl ClusterTopology {
    /// Build the topology described by a metadata response.
    pub fn from_metadata(metadata: &MetadataResponse) -> Self {
        Self {
            cluster_id: metadata.cluster_id.clone(),
            brokers: metadata
                .brokers
                .iter()
                .filter_map(|broker| match broker.addr() {
                    Some(addr) => Some((broker.node_id, addr)),
                    None => {
                        tracing::warn!(
                            "Ignoring broker {} advertising invalid port {}",
                            broker.node_id,
                            broker.port
                        );
                        None
                    }
                })
                .collect(),
            controller_id: (metadata.controller_id >= 0).then_some(metadata.controller_id),
        }
    }

    pub fn address(&self, node_id: i32) -> Option<&BrokerAddress> {
        self.brokers.get(&node_id)
    }
}

#[derive(Default)]
struct ClusterState {
    seed: Option<Broker>,
    brokers: HashMap<i32, Broker>,
    topology: ClusterTopology,
    /// Bumped on every disconnect so a bootstrap still running cannot
    /// install its seed afterwards.
    generation: u64,
}

/// Connected view of a Kafka/Redpanda cluster.
///
/// Cloning is cheap and every clone shares the same brokers.
///
/// ### Example
/// ```ignore
/// let config = brokerlink::prelude::ClientBuilder::new(vec!["127.0.0.1:9092".to_string()])?.build();
/// let cluster = brokerlink::prelude::Cluster::new(config);
/// cluster.connect().await?;
///
/// // topic administration has to go to the controller
/// cluster.refresh_metadata::<&str>(&[]).await?;
/// if let Some(controller_id) = cluster.controller_id().await {
///     cluster.set_seed_broker(controller_id).await?;
/// }
/// ```
#[derive(Clone)]
pub struct Cluster {
    config: Arc<ClientConfig>,
    state: Arc<Mutex<ClusterState>>,
    /// Serializes bootstrap runs. The state lock is never held across I/O.
    bootstrap: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("bootstrap", &self.config.bootstrap)
            .finish()
    }
}

impl Cluster {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(ClusterState::default())),
            bootstrap: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect the seed broker, trying the bootstrap addresses in order.
    ///
    /// Returns the last error if no address could be connected, or
    /// [`Error::ConnectionClosed`] if the cluster was disconnected meanwhile.
    pub async fn connect(&self) -> Result<()> {
        let bootstrapping = self.bootstrap.lock().await;
        let (seed, generation) = {
            let state = self.state.lock().await;
            (state.seed.clone(), state.generation)
        };
        if let Some(seed) = seed {
            drop(bootstrapping);
            return seed.connect().await;
        }

        let mut propagated_err = None;
        for address in self.config.bootstrap.iter() {
            tracing::debug!("Bootstrapping from {}", address);
            let broker = Broker::new(self.config.connection_config(address.clone()));
            match broker.connect().await {
                Ok(()) => {
                    let mut state = self.state.lock().await;
                    if state.generation != generation {
                        drop(state);
                        tracing::debug!("Cluster disconnected while bootstrapping from {}", address);
                        broker.disconnect().await;
                        return Err(Error::ConnectionClosed);
                    }
                    tracing::info!("Connected to seed broker {}", address);
                    state.seed = Some(broker);
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!("Could not connect to bootstrap broker {} {:?}", address, err);
                    broker.disconnect().await;
                    propagated_err = Some(err);
                }
            }
        }

        tracing::error!("ERROR: No bootstrap broker could be connected");
        Err(propagated_err.unwrap_or(Error::MissingBrokerConfigOptions))
    }

    async fn seed(&self) -> Result<Broker> {
        self.state
            .lock()
            .await
            .seed
            .clone()
            .ok_or(Error::NotConnected)
    }

    /// Send a request to the seed broker.
    pub async fn send_request<A: Api>(&self, request: &A::Request) -> Result<A::Response> {
        self.seed().await?.send_request::<A>(request).await
    }

    /// Send a request to the broker with the given node id.
    pub async fn send_request_to<A: Api>(
        &self,
        node_id: i32,
        request: &A::Request,
    ) -> Result<A::Response> {
        let broker = self.broker(node_id).await?;
        broker.connect().await?;
        broker.send_request::<A>(request).await
    }

    /// Fetch metadata from the seed broker and replace the topology with it.
    ///
    /// An empty topic list asks for brokers and controller only.
    pub async fn refresh_metadata<T: AsRef<str>>(&self, topics: &[T]) -> Result<MetadataResponse> {
        let request = MetadataRequest::for_topics(topics);
        match self.send_request::<Metadata>(&request).await {
            Ok(metadata) => {
                self.apply_topology(ClusterTopology::from_metadata(&metadata))
                    .await;
                Ok(metadata)
            }
            Err(Error::BrokerProtocol(err)) => {
                // topic errors still carry a usable broker list
                if let Some(metadata) = err.partial_result::<MetadataResponse>() {
                    self.apply_topology(ClusterTopology::from_metadata(metadata))
                        .await;
                }
                Err(Error::BrokerProtocol(err))
            }
            Err(err) => Err(err),
        }
    }

    async fn apply_topology(&self, topology: ClusterTopology) {
        let stale = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let stale_ids: Vec<i32> = state
                .brokers
                .iter()
                .filter(|(node_id, broker)| topology.address(**node_id) != Some(broker.address()))
                .map(|(node_id, _)| *node_id)
                .collect();

            let mut stale = vec![];
            for node_id in stale_ids {
                if let Some(broker) = state.brokers.remove(&node_id) {
                    let is_seed = state
                        .seed
                        .as_ref()
                        .is_some_and(|seed| seed.same_broker(&broker));
                    if !is_seed {
                        stale.push(broker);
                    }
                }
            }

            tracing::debug!(
                "Topology has {} brokers, controller {:?}",
                topology.brokers.len(),
                topology.controller_id
            );
            state.topology = topology;
            stale
        };

        for broker in stale {
            tracing::debug!("Dropping stale broker {}", broker.address());
            broker.disconnect().await;
        }
    }

    /// The pooled broker for `node_id`, refreshing metadata once if the
    /// node is not in the topology.
    async fn broker(&self, node_id: i32) -> Result<Broker> {
        if let Some(broker) = self.pooled_broker(node_id).await {
            return Ok(broker);
        }
        tracing::debug!("Node {} is unknown, refreshing metadata", node_id);
        self.refresh_metadata::<&str>(&[]).await?;
        self.pooled_broker(node_id)
            .await
            .ok_or(Error::UnknownBroker(node_id))
    }

    /// A broker whose last connect failed is replaced by a fresh one, so
    /// the next request dials the node again.
    async fn pooled_broker(&self, node_id: i32) -> Option<Broker> {
        let mut state = self.state.lock().await;
        if let Some(broker) = state.brokers.get(&node_id) {
            if broker.state() != BrokerState::Failed {
                return Some(broker.clone());
            }
            tracing::debug!("Replacing failed broker for node {}", node_id);
            state.brokers.remove(&node_id);
        }
        let address = state.topology.address(node_id)?.clone();
        let broker = Broker::new(self.config.connection_config(address));
        state.brokers.insert(node_id, broker.clone());
        Some(broker)
    }

    /// Route seed requests to `node_id` from now on, typically the controller.
    pub async fn set_seed_broker(&self, node_id: i32) -> Result<()> {
        let broker = self.broker(node_id).await?;
        broker.connect().await?;

        let previous = {
            let mut state = self.state.lock().await;
            let previous = state.seed.replace(broker.clone());
            // the old seed stays alive if it is also pooled under a node id
            previous.filter(|previous| {
                !previous.same_broker(&broker)
                    && !state.brokers.values().any(|pooled| pooled.same_broker(previous))
            })
        };
        if let Some(previous) = previous {
            previous.disconnect().await;
        }
        tracing::debug!("Seed broker is now node {} at {}", node_id, broker.address());
        Ok(())
    }

    /// Snapshot of the last known topology.
    pub async fn topology(&self) -> ClusterTopology {
        self.state.lock().await.topology.clone()
    }

    pub async fn controller_id(&self) -> Option<i32> {
        self.state.lock().await.topology.controller_id
    }

    /// Disconnect the seed and every pooled broker.
    pub async fn disconnect(&self) {
        let brokers: Vec<Broker> = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            state.generation += 1;
            state
                .seed
                .take()
                .into_iter()
                .chain(state.brokers.drain().map(|(_, broker)| broker))
                .collect()
        };
        for broker in brokers {
            broker.disconnect().await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::MetadataBroker;

    fn metadata() -> MetadataResponse {
        MetadataResponse {
            cluster_id: Some("cluster-a".to_owned()),
            controller_id: 2,
            brokers: vec![
                MetadataBroker {
                    node_id: 1,
                    host: "kafka-1".to_owned(),
                    port: 9092,
                    rack: None,
                },
                MetadataBroker {
                    node_id: 2,
                    host: "kafka-2".to_owned(),
                    port: 9093,
                    rack: Some("r2".to_owned()),
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn topology_from_metadata() {
        let topology = ClusterTopology::from_metadata(&metadata());
        assert_eq!(topology.cluster_id.as_deref(), Some("cluster-a"));
        assert_eq!(topology.controller_id, Some(2));
        assert_eq!(
            topology.address(2),
            Some(&BrokerAddress::new("kafka-2", 9093))
        );
        assert_eq!(topology.address(3), None);
    }

    #[test]
    fn brokers_with_invalid_ports_are_skipped() {
        let mut metadata = metadata();
        metadata.brokers[0].port = -1;
        metadata.brokers.push(MetadataBroker {
            node_id: 3,
            host: "kafka-3".to_owned(),
            port: 70000,
            rack: None,
        });

        let topology = ClusterTopology::from_metadata(&metadata);
        assert_eq!(topology.brokers.len(), 1);
        assert_eq!(topology.address(1), None);
        assert_eq!(topology.address(3), None);
        assert!(topology.address(2).is_some());
    }

    #[test]
    fn unknown_controller() {
        let mut metadata = metadata();
        metadata.controller_id = -1;
        assert_eq!(ClusterTopology::from_metadata(&metadata).controller_id, None);
    }

    #[tokio::test]
    async fn requests_need_a_seed() {
        let cluster = Cluster::new(ClientConfig::new(vec![BrokerAddress::new("localhost", 9092)]));
        assert_eq!(
            cluster
                .send_request::<Metadata>(&MetadataRequest::brokers_only())
                .await
                .unwrap_err(),
            Error::NotConnected
        );
        // routing to an unknown node refreshes metadata, which needs the seed too
        assert_eq!(
            cluster
                .send_request_to::<Metadata>(7, &MetadataRequest::brokers_only())
                .await
                .unwrap_err(),
            Error::NotConnected
        );
        assert_eq!(cluster.topology().await, ClusterTopology::default());
    }

    #[tokio::test]
    async fn no_bootstrap_brokers() {
        let cluster = Cluster::new(ClientConfig::new(vec![]));
        assert_eq!(
            cluster.connect().await.unwrap_err(),
            Error::MissingBrokerConfigOptions
        );
    }
}
