//! TLS on top of a broker TCP socket, backed by rustls.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, rustls, TlsConnector};
use tracing::instrument;

use super::BrokerAddress;
use crate::{
    config::TlsConfig,
    error::{Error, Result},
};

/// Build a rustls connector from the client TLS options.
///
/// Without a CA file the webpki roots are trusted. A client certificate
/// and key, when both are set, are presented for mutual TLS.
pub fn connector(config: &TlsConfig) -> Result<TlsConnector> {
    let mut root_cert_store = rustls::RootCertStore::empty();
    match &config.ca_cert {
        Some(cafile) => {
            for cert in load_certs(cafile)? {
                root_cert_store
                    .add(cert)
                    .map_err(|err| Error::TlsError(format!("bad CA certificate: {}", err)))?;
            }
        }
        None => root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(root_cert_store);
    let client_config = match (&config.client_cert, &config.client_key) {
        (Some(cert), Some(key)) => {
            tracing::debug!("Using client certificate {}", cert.display());
            builder
                .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
                .map_err(|err| Error::TlsError(format!("bad client certificate: {}", err)))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(Error::TlsError(
                "client_cert and client_key must be given together".to_owned(),
            ))
        }
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// Run the TLS handshake over an established TCP stream.
#[instrument(name = "tls-connect", level = "debug", skip(stream, config))]
pub async fn connect(
    stream: TcpStream,
    address: &BrokerAddress,
    config: &TlsConfig,
) -> Result<TlsStream<TcpStream>> {
    let connector = connector(config)?;
    let name = config
        .server_name
        .clone()
        .unwrap_or_else(|| address.host.clone());
    let domain = ServerName::try_from(name)
        .map_err(|err| Error::TlsError(format!("invalid server name: {}", err)))?;

    let stream = connector.connect(domain, stream).await.map_err(|err| {
        tracing::error!("ERROR: TLS handshake with {} failed {:?}", address, err);
        Error::ConnectionError(err.kind())
    })?;
    tracing::debug!("TLS established with {}", address);
    Ok(stream)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|err| Error::TlsError(format!("cannot open {}: {}", path.display(), err)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|err| Error::TlsError(format!("cannot read {}: {}", path.display(), err)))?;
    if certs.is_empty() {
        return Err(Error::TlsError(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|err| Error::TlsError(format!("cannot read {}: {}", path.display(), err)))?
        .ok_or_else(|| Error::TlsError(format!("no private key in {}", path.display())))
}
