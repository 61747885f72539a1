//! Connect to a SASL_SSL listener and look up a group coordinator.
//!
//! Credentials come from `KAFKA_USERNAME` / `KAFKA_PASSWORD`, the broker
//! certificate is checked against `ca.pem`.

use std::env;

use brokerlink::prelude::{
    protocol::{FindCoordinator, FindCoordinatorRequest},
    ClientBuilder, Error, SaslConfig, TlsConfig,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .init();

    let username = env::var("KAFKA_USERNAME").unwrap_or_else(|_| "myuser".to_owned());
    let password = env::var("KAFKA_PASSWORD").unwrap_or_else(|_| "pass1234".to_owned());

    tracing::info!("Connecting to cluster");
    let cluster = ClientBuilder::new(vec!["localhost:9093".to_string()])?
        .client_id("sasl-tls-demo".to_string())
        .sasl(SaslConfig::scram_sha_512(username, password))
        .tls(TlsConfig::new().ca_cert("ca.pem"))
        .connect()
        .await
        .map_err(|err| {
            tracing::error!("{:?}", err);
            err
        })?;

    let response = cluster
        .send_request::<FindCoordinator>(&FindCoordinatorRequest::group("demo-group"))
        .await?;
    for coordinator in response.coordinators {
        tracing::info!(
            "Group {} is coordinated by node {} at {}:{}",
            coordinator.key,
            coordinator.node_id,
            coordinator.host,
            coordinator.port
        );
    }

    cluster.disconnect().await;
    Ok(())
}
