//! Client configuration.
//!
//! A [`ClientConfig`] describes how to reach a cluster: the bootstrap
//! addresses, the client id stamped on every request, and the optional
//! SASL and TLS settings. Each broker connection is then built from a
//! [`ConnectionConfig`] derived from it.
//!
//! ### Example
//! ```ignore
//! let cluster = brokerlink::prelude::ClientBuilder::new(vec!["127.0.0.1:9092".to_string()])?
//!     .client_id("my-service".to_string())
//!     .sasl(brokerlink::prelude::SaslConfig::plain("admin", "admin-secret"))
//!     .connect()
//!     .await?;
//! ```
use std::path::PathBuf;

#[cfg(feature = "serde")]
use serde_derive::Deserialize;

use crate::{
    cluster::Cluster,
    error::{Error, Result},
    network::{sasl::SaslConfig, BrokerAddress},
    DEFAULT_CLIENT_ID,
};

/// TLS options. When no CA certificate is given the webpki roots are trusted.
///
/// Supplying both `client_cert` and `client_key` enables mutual TLS.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TlsConfig {
    /// PEM file holding the certificate authorities to trust.
    pub ca_cert: Option<PathBuf>,
    /// PEM file holding the client certificate chain.
    pub client_cert: Option<PathBuf>,
    /// PEM file holding the client private key (PKCS#8, PKCS#1 or SEC1).
    pub client_key: Option<PathBuf>,
    /// Name to verify the broker certificate against, defaults to the broker host.
    pub server_name: Option<String>,
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    pub fn client_auth(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }

    pub fn server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }
}

/// Everything needed to open and authenticate one broker connection.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionConfig {
    pub client_id: Option<String>,
    pub address: BrokerAddress,
    pub sasl: Option<SaslConfig>,
    pub tls: Option<TlsConfig>,
}

impl ConnectionConfig {
    /// A plaintext, unauthenticated connection using the default client id.
    pub fn new(address: BrokerAddress) -> Self {
        Self {
            client_id: Some(DEFAULT_CLIENT_ID.to_owned()),
            address,
            sasl: None,
            tls: None,
        }
    }
}

/// Cluster wide configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct ClientConfig {
    /// Addresses tried in order until one broker connects.
    pub bootstrap: Vec<BrokerAddress>,
    #[cfg_attr(feature = "serde", serde(default = "default_client_id"))]
    pub client_id: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub sasl: Option<SaslConfig>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tls: Option<TlsConfig>,
}

#[cfg(feature = "serde")]
fn default_client_id() -> Option<String> {
    Some(DEFAULT_CLIENT_ID.to_owned())
}

impl ClientConfig {
    pub fn new(bootstrap: Vec<BrokerAddress>) -> Self {
        Self {
            bootstrap,
            client_id: Some(DEFAULT_CLIENT_ID.to_owned()),
            sasl: None,
            tls: None,
        }
    }

    /// Connection settings for one broker of this cluster.
    pub fn connection_config(&self, address: BrokerAddress) -> ConnectionConfig {
        ConnectionConfig {
            client_id: self.client_id.clone(),
            address,
            sasl: self.sasl.clone(),
            tls: self.tls.clone(),
        }
    }
}

/// Configure a [`Cluster`].
///
/// ### Example
/// ```ignore
/// let bootstrap_addrs = vec!["127.0.0.1:9092".to_string()];
///
/// let config = brokerlink::prelude::ClientBuilder::new(bootstrap_addrs)?
///     .client_id("reporting".to_string())
///     .tls(brokerlink::prelude::TlsConfig::new().ca_cert("ca.pem"))
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Start a client builder from `host:port` strings. To complete, use
    /// [`build`](Self::build) or [`connect`](Self::connect).
    pub fn new(bootstrap_addrs: Vec<String>) -> Result<Self> {
        if bootstrap_addrs.is_empty() {
            tracing::error!("ERROR: No bootstrap addresses given");
            return Err(Error::MissingBrokerConfigOptions);
        }
        let bootstrap = bootstrap_addrs
            .iter()
            .map(|addr| addr.parse())
            .collect::<Result<Vec<BrokerAddress>>>()?;

        Ok(Self {
            config: ClientConfig::new(bootstrap),
        })
    }

    /// The client id sent in the header of every request.
    pub fn client_id(mut self, client_id: String) -> Self {
        self.config.client_id = Some(client_id);
        self
    }

    /// Send requests with a null client id.
    pub fn no_client_id(mut self) -> Self {
        self.config.client_id = None;
        self
    }

    pub fn sasl(mut self, sasl: SaslConfig) -> Self {
        self.config.sasl = Some(sasl);
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }

    /// Build the config and connect a [`Cluster`] with it.
    pub async fn connect(self) -> Result<Cluster> {
        let cluster = Cluster::new(self.build());
        cluster.connect().await?;
        Ok(cluster)
    }
}
