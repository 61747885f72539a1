//! Plain TCP socket establishment.

use tokio::net::{lookup_host, TcpStream};
use tracing::instrument;

use super::BrokerAddress;
use crate::error::{Error, Result};

/// Resolve `address` and connect to the first socket address that accepts.
///
/// Nagle is disabled; requests are written as whole frames.
#[instrument(name = "tcp-connect", level = "debug")]
pub async fn connect(address: &BrokerAddress) -> Result<TcpStream> {
    let addrs = lookup_host((address.host.as_str(), address.port))
        .await
        .map_err(|err| {
            tracing::error!(
                "ERROR: Could not resolve host {} and port {} {:?}",
                address.host,
                address.port,
                err
            );
            Error::ConnectionError(err.kind())
        })?;

    let mut propagated_err: Option<Error> = None;
    for addr in addrs {
        tracing::debug!("Connecting to {}", addr);
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => {
                tracing::debug!("Could not connect to {}: {:?}", addr, err);
                propagated_err = Some(Error::ConnectionError(err.kind()));
            }
        }
    }

    Err(propagated_err.unwrap_or(Error::ConnectionError(std::io::ErrorKind::NotFound)))
}
